use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::Style;

use gooze::cancel::{cancel_pair, CancelToken};
use gooze::config::{self, Settings};
use gooze::orchestrator::TestRunner;
use gooze::progress::{ConsoleSink, NullSink};
use gooze::workflow::{
    estimate_args_from, MergeArgs, TestArgs, ViewArgs, Workflow,
};

#[derive(Parser)]
#[command(name = "gooze", version, about = "Mutation testing for Go projects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output directory for mutation testing reports
    #[arg(short = 'o', long, global = true)]
    output: Option<PathBuf>,

    /// Disable cached incremental runs (re-test everything)
    #[arg(long, global = true)]
    no_cache: bool,

    /// Exclude files matching regex (can be repeated)
    #[arg(short = 'x', long = "exclude", global = true)]
    exclude: Vec<String>,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Path to the log output file
    #[arg(long, global = true)]
    log_output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List source files and the number of applicable mutations
    List {
        /// Paths to scan; append /... for recursive descent (default ./...)
        paths: Vec<String>,
        /// Output JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// Run mutation testing
    Run {
        /// Paths to scan; append /... for recursive descent (default ./...)
        paths: Vec<String>,
        /// Number of parallel workers for mutation testing
        #[arg(short = 'p', long)]
        parallel: Option<usize>,
        /// Shard index and total count in the format INDEX/TOTAL (e.g. 0/3)
        #[arg(short = 's', long)]
        shard: Option<String>,
        /// Per-mutation test timeout in seconds
        #[arg(long)]
        mutation_timeout: Option<u64>,
    },
    /// Replay a saved reports directory
    View,
    /// Fold sharded report directories into the base
    Merge,
}

fn main() {
    let cli = Cli::parse();
    process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let mut settings = match Settings::load(Path::new(".")) {
        Ok(settings) => settings,
        Err(e) => {
            print_error(&format!("Failed to load configuration: {e:#}"));
            return 1;
        }
    };
    apply_flags(&mut settings, &cli);

    let log_path = cli
        .log_output
        .clone()
        .unwrap_or_else(|| settings.log_filename.clone());
    if let Err(e) = config::init_logging(&log_path, settings.verbose) {
        print_error(&format!("Failed to set up logging: {e:#}"));
        return 1;
    }

    let token = install_interrupt_handler();

    let outcome = match cli.command {
        Commands::List { paths, json } => {
            let workflow = if json {
                Workflow::new(Arc::new(NullSink), TestRunner::default())
            } else {
                Workflow::new(Arc::new(ConsoleSink), TestRunner::default())
            };
            let args = estimate_args_from(&settings, paths);
            workflow.estimate(&args, &token).map(|entries| {
                if json {
                    println!(
                        "{}",
                        serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
                    );
                }
            })
        }
        Commands::Run {
            paths,
            parallel,
            shard,
            mutation_timeout,
        } => {
            let workflow = Workflow::new(Arc::new(ConsoleSink), TestRunner::default());
            let (shard_index, total_shards) = parse_shard_flag(shard.as_deref());
            let args = TestArgs {
                estimate: estimate_args_from(&settings, paths),
                threads: parallel.unwrap_or(settings.parallel),
                shard_index,
                total_shards,
                mutation_timeout: mutation_timeout
                    .map(Duration::from_secs)
                    .unwrap_or(settings.mutation_timeout),
            };
            workflow.test(&args, &token).map(|_| ())
        }
        Commands::View => {
            let workflow = Workflow::new(Arc::new(ConsoleSink), TestRunner::default());
            let args = ViewArgs {
                reports: settings.output.clone(),
            };
            workflow.view(&args).map(|_| ())
        }
        Commands::Merge => {
            let workflow = Workflow::new(Arc::new(ConsoleSink), TestRunner::default());
            let args = MergeArgs {
                reports: settings.output.clone(),
            };
            workflow.merge(&args)
        }
    };

    match outcome {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            print_error(&format!("{e}"));
            1
        }
    }
}

fn apply_flags(settings: &mut Settings, cli: &Cli) {
    if let Some(output) = &cli.output {
        settings.output = output.clone();
    }
    if cli.no_cache {
        settings.no_cache = true;
    }
    if !cli.exclude.is_empty() {
        settings.exclude = cli.exclude.clone();
    }
    if cli.verbose {
        settings.verbose = true;
    }
}

/// Parse `--shard INDEX/TOTAL`, falling back to an unsharded run on any
/// malformed value.
fn parse_shard_flag(shard: Option<&str>) -> (u32, u32) {
    let Some(shard) = shard else {
        return (0, 1);
    };

    let Some((index, total)) = shard.split_once('/') else {
        return (0, 1);
    };

    match (index.trim().parse::<u32>(), total.trim().parse::<u32>()) {
        (Ok(index), Ok(total)) if total > 0 && index < total => (index, total),
        _ => (0, 1),
    }
}

/// Ctrl-C fires the cancellation token; in-flight mutations become timeouts
/// and the run winds down cleanly.
fn install_interrupt_handler() -> CancelToken {
    let (canceller, token) = cancel_pair();
    let slot = Mutex::new(Some(canceller));

    let result = ctrlc::set_handler(move || {
        if let Some(canceller) = slot.lock().unwrap().take() {
            canceller.cancel();
        }
    });

    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to install interrupt handler");
    }

    token
}

fn print_error(msg: &str) {
    let style = Style::new().red().bold();
    eprintln!("{} {}", style.apply_to("✗"), msg);
}
