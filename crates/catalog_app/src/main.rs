mod commands;
mod logging;
mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use catalog_core::PipelineStage;
use clap::{Args, Parser, Subcommand};
use engine_logging::engine_error;

use crate::logging::LogDestination;
use crate::settings::AppSettings;

/// Exit status of a run that stopped early (cancelled or aborted).
const EXIT_INTERRUPTED: u8 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "collector",
    version,
    about = "Collects product catalogs and competitor pages from storefronts"
)]
struct Cli {
    /// Settings file (RON). Created with defaults when missing.
    #[arg(long, default_value = settings::SETTINGS_FILENAME)]
    config: PathBuf,
    /// Log to collector.log only.
    #[arg(short, long)]
    quiet: bool,
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the selected stages from scratch.
    Scrape(StageArgs),
    /// Continue an interrupted run from its checkpoint.
    Resume(StageArgs),
    /// Download product gallery images, skipping ones already on disk.
    Images(ItemArgs),
}

#[derive(Debug, Args)]
struct ItemArgs {
    /// Link list to use instead of the one named in the settings.
    #[arg(long)]
    links: Option<PathBuf>,
    /// First identifier to process.
    #[arg(long)]
    from: Option<String>,
    /// Last identifier to process.
    #[arg(long)]
    to: Option<String>,
    /// Use the concurrent session whatever the settings say.
    #[arg(long)]
    concurrent: bool,
    /// Wait this many seconds before starting.
    #[arg(long, value_name = "SECONDS")]
    after: Option<u64>,
}

#[derive(Debug, Args)]
struct StageArgs {
    #[command(flatten)]
    items: ItemArgs,
    /// Comma-separated subset of: variants, competitors, export.
    #[arg(long, value_delimiter = ',', value_parser = parse_stage)]
    stages: Vec<PipelineStage>,
}

fn parse_stage(raw: &str) -> Result<PipelineStage, String> {
    PipelineStage::parse(raw)
        .filter(|stage| PipelineStage::EXECUTABLE.contains(stage))
        .ok_or_else(|| format!("unknown stage `{raw}` (expected variants, competitors or export)"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let destination = if cli.quiet {
        LogDestination::File
    } else {
        LogDestination::Both
    };
    logging::initialize(destination, cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            engine_error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

enum Job {
    Pipeline {
        stages: Vec<PipelineStage>,
        resume: bool,
    },
    Images,
}

fn run(cli: Cli) -> Result<ExitCode> {
    let settings = AppSettings::load_or_init(&cli.config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let cancel = commands::watch_ctrl_c(&runtime);
    let hooks = commands::run_hooks(cancel.clone());

    let (args, job) = match cli.command {
        Command::Scrape(args) => (
            args.items,
            Job::Pipeline {
                stages: args.stages,
                resume: false,
            },
        ),
        Command::Resume(args) => (
            args.items,
            Job::Pipeline {
                stages: args.stages,
                resume: true,
            },
        ),
        Command::Images(args) => (args, Job::Images),
    };
    let items = commands::load_items(
        &settings,
        args.links.as_deref(),
        args.from.as_deref(),
        args.to.as_deref(),
    )?;

    if let Some(seconds) = args.after {
        if !commands::wait_for_start("collector run", Duration::from_secs(seconds), &cancel)? {
            println!("cancelled before start");
            return Ok(ExitCode::from(EXIT_INTERRUPTED));
        }
    }

    let interrupted = match job {
        Job::Pipeline { stages, resume } => {
            let summary = commands::run_pipeline(
                &runtime,
                &settings,
                &items,
                &stages,
                resume,
                args.concurrent,
                &hooks,
            );
            println!("{}", summary.report());
            summary.interrupted()
        }
        Job::Images => {
            let report = runtime.block_on(commands::collect_images(
                &settings,
                &items,
                args.concurrent,
                &hooks,
            ))?;
            println!("{}", report.line());
            report.interrupted()
        }
    };
    if interrupted || cancel.load(Ordering::SeqCst) {
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn stages_parse_from_a_comma_list() {
        let cli = Cli::try_parse_from(["collector", "scrape", "--stages", "competitors,export"])
            .unwrap();
        let Command::Scrape(args) = cli.command else {
            panic!("expected scrape");
        };
        assert_eq!(args.stages, vec![PipelineStage::Competitors, PipelineStage::Export]);
    }

    #[test]
    fn done_is_not_a_runnable_stage() {
        assert!(parse_stage("done").is_err());
        assert!(Cli::try_parse_from(["collector", "resume", "--stages", "later"]).is_err());
    }

    #[test]
    fn images_accept_a_range() {
        let cli = Cli::try_parse_from(["collector", "images", "--from", "A2", "--to", "A9"])
            .unwrap();
        let Command::Images(args) = cli.command else {
            panic!("expected images");
        };
        assert_eq!(args.from.as_deref(), Some("A2"));
        assert_eq!(args.to.as_deref(), Some("A9"));
        assert_eq!(cli.config, PathBuf::from(settings::SETTINGS_FILENAME));
    }
}
