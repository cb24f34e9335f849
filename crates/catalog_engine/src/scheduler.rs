use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use engine_logging::{engine_info, engine_warn};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

pub type TaskId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Fired { task_id: TaskId, name: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("could not start scheduler runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

enum SchedulerCommand {
    Add {
        task_id: TaskId,
        name: String,
        delay: Duration,
    },
    Remove {
        task_id: TaskId,
    },
    Toggle {
        task_id: TaskId,
    },
    Shutdown,
}

struct ScheduledTask {
    name: String,
    due: Instant,
    /// `None` while paused.
    timer: Option<CancellationToken>,
}

/// One-shot delayed tasks on a background thread with its own runtime.
/// The host only sends commands and drains events; dropping the scheduler
/// stops the thread.
pub struct Scheduler {
    cmd_tx: mpsc::Sender<SchedulerCommand>,
    event_rx: mpsc::Receiver<SchedulerEvent>,
    next_id: AtomicU64,
    worker: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn start() -> Result<Self, SchedulerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()?;
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("scheduler".into())
            .spawn(move || run_worker(runtime, cmd_rx, event_tx))?;
        Ok(Self {
            cmd_tx,
            event_rx,
            next_id: AtomicU64::new(1),
            worker: Some(worker),
        })
    }

    /// Fires `name` once after `delay`.
    pub fn add(&self, name: impl Into<String>, delay: Duration) -> TaskId {
        let task_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.send(SchedulerCommand::Add {
            task_id,
            name: name.into(),
            delay,
        });
        task_id
    }

    pub fn remove(&self, task_id: TaskId) {
        self.send(SchedulerCommand::Remove { task_id });
    }

    /// Pauses a pending task, or resumes a paused one. A task resumed past
    /// its due time fires right away.
    pub fn toggle(&self, task_id: TaskId) {
        self.send(SchedulerCommand::Toggle { task_id });
    }

    pub fn try_recv(&self) -> Option<SchedulerEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<SchedulerEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn send(&self, command: SchedulerCommand) {
        if self.cmd_tx.send(command).is_err() {
            engine_warn!("Scheduler thread is gone; command dropped");
        }
    }

    fn shutdown(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.cmd_tx.send(SchedulerCommand::Shutdown);
            if worker.join().is_err() {
                engine_warn!("Scheduler thread panicked");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    runtime: Runtime,
    cmd_rx: mpsc::Receiver<SchedulerCommand>,
    event_tx: mpsc::Sender<SchedulerEvent>,
) {
    let mut tasks: HashMap<TaskId, ScheduledTask> = HashMap::new();
    while let Ok(command) = cmd_rx.recv() {
        match command {
            SchedulerCommand::Add {
                task_id,
                name,
                delay,
            } => {
                let due = Instant::now() + delay;
                let timer = arm(&runtime, task_id, &name, due, &event_tx);
                tasks.insert(
                    task_id,
                    ScheduledTask {
                        name,
                        due,
                        timer: Some(timer),
                    },
                );
            }
            SchedulerCommand::Remove { task_id } => {
                if let Some(task) = tasks.remove(&task_id) {
                    if let Some(timer) = task.timer {
                        timer.cancel();
                    }
                    engine_info!("Removed task {task_id} ({})", task.name);
                }
            }
            SchedulerCommand::Toggle { task_id } => {
                let Some(task) = tasks.get_mut(&task_id) else {
                    continue;
                };
                match task.timer.take() {
                    Some(timer) => {
                        timer.cancel();
                        engine_info!("Paused task {task_id} ({})", task.name);
                    }
                    None => {
                        task.timer = Some(arm(&runtime, task_id, &task.name, task.due, &event_tx));
                        engine_info!("Resumed task {task_id} ({})", task.name);
                    }
                }
            }
            SchedulerCommand::Shutdown => break,
        }
    }
    for task in tasks.into_values() {
        if let Some(timer) = task.timer {
            timer.cancel();
        }
    }
    runtime.shutdown_background();
}

fn arm(
    runtime: &Runtime,
    task_id: TaskId,
    name: &str,
    due: Instant,
    event_tx: &mpsc::Sender<SchedulerEvent>,
) -> CancellationToken {
    let token = CancellationToken::new();
    let cancelled = token.clone();
    let name = name.to_string();
    let event_tx = event_tx.clone();
    runtime.spawn(async move {
        tokio::select! {
            _ = cancelled.cancelled() => {}
            _ = tokio::time::sleep_until(due.into()) => {
                engine_info!("Executed task {task_id} ({name})");
                let _ = event_tx.send(SchedulerEvent::Fired { task_id, name });
            }
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Scheduler, SchedulerEvent};

    #[test]
    fn task_fires_once() {
        let scheduler = Scheduler::start().unwrap();
        let id = scheduler.add("nightly", Duration::from_millis(20));
        assert_eq!(
            scheduler.recv_timeout(Duration::from_secs(2)),
            Some(SchedulerEvent::Fired {
                task_id: id,
                name: "nightly".into()
            })
        );
        assert_eq!(scheduler.recv_timeout(Duration::from_millis(100)), None);
        scheduler.stop();
    }

    #[test]
    fn removed_and_paused_tasks_stay_silent() {
        let scheduler = Scheduler::start().unwrap();
        let removed = scheduler.add("removed", Duration::from_millis(50));
        let paused = scheduler.add("paused", Duration::from_millis(50));
        scheduler.remove(removed);
        scheduler.toggle(paused);
        assert_eq!(scheduler.recv_timeout(Duration::from_millis(200)), None);

        scheduler.toggle(paused);
        assert_eq!(
            scheduler.recv_timeout(Duration::from_secs(2)),
            Some(SchedulerEvent::Fired {
                task_id: paused,
                name: "paused".into()
            })
        );
    }
}
