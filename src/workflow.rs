use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::config;
use crate::discover;
use crate::error::Error;
use crate::model::{status_for, Mutation, Report, TestStatus};
use crate::mutagens;
use crate::orchestrator::{Orchestrator, TestRunner};
use crate::progress::{EstimateEntry, Mode, ProgressSink};
use crate::reports::{self, ReportStore};
use crate::scheduler;

/// Arguments shared by `estimate` and the front half of `test`.
#[derive(Debug, Clone)]
pub struct EstimateArgs {
    pub paths: Vec<String>,
    pub exclude: Vec<String>,
    pub use_cache: bool,
    pub reports: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TestArgs {
    pub estimate: EstimateArgs,
    pub threads: usize,
    pub shard_index: u32,
    pub total_shards: u32,
    pub mutation_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ViewArgs {
    pub reports: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MergeArgs {
    pub reports: PathBuf,
}

/// Wires the four user-visible operations over discovery, generation,
/// orchestration and the report store.
pub struct Workflow {
    sink: Arc<dyn ProgressSink>,
    runner: TestRunner,
}

impl Workflow {
    pub fn new(sink: Arc<dyn ProgressSink>, runner: TestRunner) -> Self {
        Workflow { sink, runner }
    }

    /// Count the mutations the current tree would produce, grouped by
    /// (source, type). The entries are returned as well as emitted, so the
    /// caller can render them differently (e.g. as JSON).
    pub fn estimate(
        &self,
        args: &EstimateArgs,
        token: &CancelToken,
    ) -> Result<Vec<EstimateEntry>, Error> {
        self.sink.start(Mode::Estimate);
        tracing::info!("estimating mutations");

        let mutations = self.collect_mutations(args, 1, token)?;

        let mut counts: BTreeMap<(PathBuf, String), usize> = BTreeMap::new();
        for mutation in &mutations {
            *counts
                .entry((
                    mutation.source.origin.path.clone(),
                    mutation.mutation_type.name.clone(),
                ))
                .or_insert(0) += 1;
        }

        let entries: Vec<EstimateEntry> = counts
            .into_iter()
            .map(|((path, type_name), count)| EstimateEntry {
                path,
                type_name,
                count,
            })
            .collect();

        self.sink.estimation(&entries);
        self.sink.wait();
        self.sink.close();

        Ok(entries)
    }

    /// Run every mutant of the selected shard through the orchestrator and
    /// persist the reports. Returns the mutation score.
    pub fn test(&self, args: &TestArgs, token: &CancelToken) -> Result<f64, Error> {
        self.sink.start(Mode::Test);
        tracing::info!(
            threads = args.threads,
            shard_index = args.shard_index,
            total_shards = args.total_shards,
            "starting mutation testing"
        );
        self.sink
            .concurrency_info(args.threads, args.shard_index, args.total_shards);

        let reports_dir =
            shard_reports_dir(&args.estimate.reports, args.shard_index, args.total_shards);

        let all_mutations = self.collect_mutations(&args.estimate, args.threads, token)?;
        tracing::debug!(count = all_mutations.len(), "generated mutations");

        let shard: Vec<Mutation> = all_mutations
            .into_iter()
            .filter(|m| scheduler::in_shard(&m.id, args.shard_index, args.total_shards))
            .collect();
        tracing::debug!(count = shard.len(), "sharded mutations");
        self.sink.upcoming_tests(shard.len());

        let store = Mutex::new(ReportStore::open(&reports_dir)?);
        let orchestrator = Orchestrator::new(self.runner.clone(), args.mutation_timeout);

        let errors: Mutex<Vec<Error>> = Mutex::new(Vec::new());
        let failed = AtomicBool::new(false);
        let threads = args.threads.max(1);

        let (tx, rx) = crossbeam_channel::bounded::<Mutation>(scheduler::buffer_size(threads));

        std::thread::scope(|scope| {
            for worker_id in 0..threads {
                let rx = rx.clone();
                let store = &store;
                let errors = &errors;
                let failed = &failed;
                let orchestrator = &orchestrator;
                let sink = &self.sink;

                scope.spawn(move || {
                    for mutation in rx.iter() {
                        if failed.load(Ordering::SeqCst) {
                            return;
                        }

                        sink.starting_test(&mutation, worker_id);

                        let result = match orchestrator.test_mutation(&mutation, token) {
                            Ok(result) => result,
                            Err(err) => {
                                errors.lock().unwrap().push(err);
                                continue;
                            }
                        };

                        let mut report = Report {
                            source: mutation.source.clone(),
                            result: result.clone(),
                            diff: None,
                        };
                        if status_for(&result, &mutation) == TestStatus::Survived {
                            report.diff = survived_diff(&mutation);
                        }

                        if let Err(err) = store.lock().unwrap().append(&report) {
                            // Persistence failures abort the run.
                            failed.store(true, Ordering::SeqCst);
                            errors.lock().unwrap().push(err);
                            return;
                        }

                        sink.completed_test(&mutation, &result);
                    }
                });
            }

            for mutation in shard {
                if failed.load(Ordering::SeqCst) {
                    break;
                }
                if tx.send(mutation).is_err() {
                    break;
                }
            }
            drop(tx);
        });

        if let Some(err) = errors.into_inner().unwrap().into_iter().next() {
            return Err(err);
        }

        let store = store.into_inner().unwrap();
        let score = store.score()?;
        tracing::info!(score, "calculated mutation score");
        self.sink.mutation_score(score);

        store.regenerate_index()?;
        store.close()?;

        self.sink.wait();
        self.sink.close();

        Ok(score)
    }

    /// Replay a saved reports directory as synthetic progress events.
    pub fn view(&self, args: &ViewArgs) -> Result<f64, Error> {
        if !args.reports.is_dir() {
            return Err(Error::input(&args.reports, "reports directory not found"));
        }

        self.sink.start(Mode::Test);
        tracing::info!(path = %args.reports.display(), "loading mutation test reports");

        let store = ReportStore::open(&args.reports)?;

        let mut items: Vec<(Mutation, crate::model::MutationResult)> = Vec::new();
        store.range(|_, report| {
            // BTreeMap iteration is already ordered by type name then version.
            for (mutation_type, entries) in &report.result {
                for entry in entries {
                    let mutation = Mutation {
                        id: entry.mutation_id.clone(),
                        source: report.source.clone(),
                        mutation_type: mutation_type.clone(),
                        mutated_code: Vec::new(),
                        diff: if entry.status == TestStatus::Survived {
                            report.diff.clone()
                        } else {
                            None
                        },
                    };

                    let mut result = crate::model::MutationResult::new();
                    result.insert(mutation_type.clone(), vec![entry.clone()]);
                    items.push((mutation, result));
                }
            }
            Ok(())
        })?;

        self.sink.upcoming_tests(items.len());

        for (mutation, result) in &items {
            self.sink.starting_test(mutation, 0);
            self.sink.completed_test(mutation, result);
        }

        let score = store.score()?;
        self.sink.mutation_score(score);
        self.sink.wait();
        self.sink.close();

        Ok(score)
    }

    /// Fold `shard_*` subdirectories into the base reports directory.
    pub fn merge(&self, args: &MergeArgs) -> Result<(), Error> {
        if args.reports.as_os_str().is_empty() {
            return Err(Error::input("", "reports directory path is required"));
        }

        tracing::info!(path = %args.reports.display(), "merging sharded reports");
        reports::merge_shards(&args.reports)
    }

    /// Discover sources, apply the incremental cache filter, and stream all
    /// mutants into a vector.
    fn collect_mutations(
        &self,
        args: &EstimateArgs,
        threads: usize,
        token: &CancelToken,
    ) -> Result<Vec<Mutation>, Error> {
        let excludes = discover::compile_excludes(&args.exclude)?;

        let paths = if args.paths.is_empty() {
            vec!["./...".to_string()]
        } else {
            args.paths.clone()
        };

        let sources = discover::discover_sources(&paths, &excludes, token)?;

        let sources = if args.use_cache && !args.reports.as_os_str().is_empty() {
            reports::changed_sources(&args.reports, &sources)?
        } else {
            sources
        };

        let source_rx = scheduler::source_channel(sources, threads);
        let (mutation_rx, error_rx) =
            scheduler::stream_mutations(source_rx, Vec::new(), threads, token.clone());

        let mutations: Vec<Mutation> = mutation_rx.iter().collect();

        if let Ok(err) = error_rx.try_recv() {
            return Err(err);
        }

        Ok(mutations)
    }
}

/// Reports land in a `shard_<i>` subdirectory during a sharded run.
pub fn shard_reports_dir(base: &Path, shard_index: u32, total_shards: u32) -> PathBuf {
    if total_shards <= 1 {
        return base.to_path_buf();
    }

    base.join(format!("{}{}", reports::SHARD_DIR_PREFIX, shard_index))
}

fn survived_diff(mutation: &Mutation) -> Option<String> {
    let original = std::fs::read(&mutation.source.origin.path).ok()?;
    Some(mutagens::unified_diff(&original, &mutation.mutated_code))
}

/// Default arguments derived from settings, shared by the CLI commands.
pub fn estimate_args_from(settings: &config::Settings, paths: Vec<String>) -> EstimateArgs {
    EstimateArgs {
        paths,
        exclude: settings.exclude.clone(),
        use_cache: !settings.no_cache,
        reports: settings.output.clone(),
    }
}
