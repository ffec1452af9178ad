use std::path::PathBuf;

use console::Style;
use serde::Serialize;

use crate::model::{status_for, Mutation, MutationResult, TestStatus};

/// Which operation is running, for the sink's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Estimate,
    Test,
}

/// One row of the estimate summary: mutant count per (source, type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EstimateEntry {
    pub path: PathBuf,
    pub type_name: String,
    pub count: usize,
}

/// Event interface consumed by the external UI.
///
/// Events arrive in the order documented here: `start`, then (test mode)
/// `concurrency_info` and `upcoming_tests`, then interleaved
/// `starting_test`/`completed_test` pairs, then `mutation_score`, then
/// `close`. `wait` blocks until the sink has finished presenting.
pub trait ProgressSink: Send + Sync {
    fn start(&self, mode: Mode);
    fn concurrency_info(&self, threads: usize, shard_index: u32, total_shards: u32);
    fn upcoming_tests(&self, count: usize);
    fn starting_test(&self, mutation: &Mutation, thread_id: usize);
    fn completed_test(&self, mutation: &Mutation, result: &MutationResult);
    fn estimation(&self, entries: &[EstimateEntry]);
    fn mutation_score(&self, score: f64);
    fn close(&self);
    fn wait(&self);
}

/// Plain-text sink writing coloured lines to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn start(&self, mode: Mode) {
        let style = Style::new().bold();
        match mode {
            Mode::Estimate => println!("{}", style.apply_to("gooze: estimating mutations")),
            Mode::Test => println!("{}", style.apply_to("gooze: running mutation tests")),
        }
    }

    fn concurrency_info(&self, threads: usize, shard_index: u32, total_shards: u32) {
        let dim = Style::new().dim();
        if total_shards > 1 {
            println!(
                "  {} {} workers, shard {}/{}",
                dim.apply_to("·"),
                threads,
                shard_index,
                total_shards,
            );
        } else {
            println!("  {} {} workers", dim.apply_to("·"), threads);
        }
    }

    fn upcoming_tests(&self, count: usize) {
        let dim = Style::new().dim();
        println!("  {} {} mutations to test", dim.apply_to("·"), count);
    }

    fn starting_test(&self, mutation: &Mutation, thread_id: usize) {
        let dim = Style::new().dim();
        println!(
            "  {} [{}] {} {}",
            dim.apply_to("▸"),
            thread_id,
            mutation.mutation_type.name,
            mutation.id,
        );
    }

    fn completed_test(&self, mutation: &Mutation, result: &MutationResult) {
        let (mark, style) = match status_for(result, mutation) {
            TestStatus::Killed => ("✓ killed", Style::new().green()),
            TestStatus::Survived => ("! survived", Style::new().yellow().bold()),
            TestStatus::Skipped => ("· skipped", Style::new().dim()),
            TestStatus::Timeout => ("· timeout", Style::new().dim()),
            TestStatus::Error => ("✗ error", Style::new().red().bold()),
        };

        println!(
            "  {} {} {}:{}",
            style.apply_to(mark),
            mutation.id,
            mutation.source.origin.path.display(),
            mutation.mutation_type.name,
        );
    }

    fn estimation(&self, entries: &[EstimateEntry]) {
        let total: usize = entries.iter().map(|e| e.count).sum();

        for entry in entries {
            println!(
                "  {:>5}  {}  {}",
                entry.count,
                entry.type_name,
                entry.path.display(),
            );
        }

        let style = Style::new().bold();
        println!("{} {} mutations", style.apply_to("total:"), total);
    }

    fn mutation_score(&self, score: f64) {
        let pct = score * 100.0;
        let style = if score >= 1.0 {
            Style::new().green().bold()
        } else {
            Style::new().yellow().bold()
        };
        println!("{}", style.apply_to(format!("mutation score: {pct:.1}%")));
    }

    fn close(&self) {}

    fn wait(&self) {}
}

/// Sink that swallows every event. Used by tests and library callers that
/// bring their own presentation.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn start(&self, _mode: Mode) {}
    fn concurrency_info(&self, _threads: usize, _shard_index: u32, _total_shards: u32) {}
    fn upcoming_tests(&self, _count: usize) {}
    fn starting_test(&self, _mutation: &Mutation, _thread_id: usize) {}
    fn completed_test(&self, _mutation: &Mutation, _result: &MutationResult) {}
    fn estimation(&self, _entries: &[EstimateEntry]) {}
    fn mutation_score(&self, _score: f64) {}
    fn close(&self) {}
    fn wait(&self) {}
}
