use std::sync::{Arc, Mutex};

use catalog_core::{ProgressAggregator, ProgressFn, StageTracker};
use pretty_assertions::assert_eq;

fn recorder() -> (ProgressFn, Arc<Mutex<Vec<u8>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let f: ProgressFn = Arc::new(move |p| sink.lock().unwrap().push(p));
    (f, seen)
}

#[test]
fn tracker_reports_every_item_and_hundred_once() {
    let (f, seen) = recorder();
    let tracker = StageTracker::new(4, f);
    for _ in 0..4 {
        tracker.item_done();
    }
    tracker.settle();

    assert_eq!(*seen.lock().unwrap(), vec![25, 50, 75, 100]);
}

#[test]
fn tracker_settles_early_on_cancellation() {
    let (f, seen) = recorder();
    let tracker = StageTracker::new(10, f);
    tracker.item_done();
    tracker.item_done();
    tracker.settle();
    tracker.item_done();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec![10, 20, 100]);
    assert_eq!(seen.iter().filter(|p| **p == 100).count(), 1);
}

#[test]
fn empty_stage_still_reaches_hundred() {
    let (f, seen) = recorder();
    let tracker = StageTracker::new(0, f);
    tracker.settle();
    assert_eq!(*seen.lock().unwrap(), vec![100]);
}

#[test]
fn aggregator_weights_stages_evenly() {
    let (f, seen) = recorder();
    let aggregator = ProgressAggregator::new(2, f);

    let first = aggregator.stage(0);
    first(50);
    first(100);
    let second = aggregator.stage(1);
    second(50);
    second(100);
    aggregator.finish();

    assert_eq!(*seen.lock().unwrap(), vec![25, 50, 75, 100]);
}

#[test]
fn aggregator_never_goes_backwards() {
    let (f, seen) = recorder();
    let aggregator = ProgressAggregator::new(3, f);
    aggregator.stage(1)(90);
    aggregator.stage(0)(10);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec![63, 63]);
}

#[test]
fn aggregator_finish_settles_after_cancelled_first_stage() {
    let (f, seen) = recorder();
    let aggregator = ProgressAggregator::new(3, f);
    aggregator.stage(0)(100);
    aggregator.finish();
    aggregator.finish();

    assert_eq!(*seen.lock().unwrap(), vec![33, 100]);
}
