use std::collections::HashSet;
use std::path::Path;

use gooze::cancel::{cancel_pair, CancelToken};
use gooze::discover;
use gooze::model::{Mutation, Source, SourceFile};
use gooze::scheduler::{
    buffer_size, in_shard, shard_stream, source_channel, stream_mutations,
};

fn write_source(dir: &Path, name: &str, content: &str) -> Source {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();

    Source {
        origin: SourceFile {
            hash: discover::hash_file(&path).unwrap(),
            path,
        },
        test: None,
    }
}

const CALC_SOURCE: &str = r#"package main

func calc(a, b int) int {
	if a > b && a != 0 {
		return a + b
	}
	return a - b
}
"#;

fn stream_all(sources: Vec<Source>, token: CancelToken) -> (Vec<Mutation>, Option<gooze::error::Error>) {
    let rx = source_channel(sources, 2);
    let (mutations_rx, errors_rx) = stream_mutations(rx, Vec::new(), 2, token);
    let mutations: Vec<Mutation> = mutations_rx.iter().collect();
    let error = errors_rx.try_recv().ok();
    (mutations, error)
}

#[test]
fn buffer_size_is_at_least_one() {
    assert_eq!(buffer_size(0), 1);
    assert_eq!(buffer_size(1), 1);
    assert_eq!(buffer_size(8), 8);
}

#[test]
fn streaming_yields_every_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "calc.go", CALC_SOURCE);

    let (streamed, error) = stream_all(vec![source.clone()], CancelToken::unfired());
    assert!(error.is_none());

    let direct =
        gooze::mutagens::generate(&source, &[], &CancelToken::unfired()).unwrap();
    assert_eq!(streamed.len(), direct.len());

    let streamed_ids: Vec<&str> = streamed.iter().map(|m| m.id.as_str()).collect();
    let direct_ids: Vec<&str> = direct.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(streamed_ids, direct_ids);
}

#[test]
fn unparseable_sources_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let broken = write_source(dir.path(), "broken.go", "package main\n\nfunc {{{\n");
    let good = write_source(dir.path(), "calc.go", CALC_SOURCE);

    let (streamed, error) = stream_all(vec![broken, good], CancelToken::unfired());
    assert!(error.is_none());
    assert!(!streamed.is_empty());
    for mutation in &streamed {
        assert!(mutation.source.origin.path.ends_with("calc.go"));
    }
}

#[test]
fn missing_source_stops_the_stream_with_an_error() {
    let missing = Source {
        origin: SourceFile {
            path: Path::new("/no/such/file.go").to_path_buf(),
            hash: String::new(),
        },
        test: None,
    };

    let (streamed, error) = stream_all(vec![missing], CancelToken::unfired());
    assert!(streamed.is_empty());
    assert!(error.is_some());
}

#[test]
fn cancellation_closes_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "calc.go", CALC_SOURCE);

    let (canceller, token) = cancel_pair();
    canceller.cancel();

    let (streamed, _error) = stream_all(vec![source], token);
    assert!(streamed.is_empty());
}

// --- sharding ---

#[test]
fn shards_partition_the_mutant_set() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "calc.go", CALC_SOURCE);
    let mutations =
        gooze::mutagens::generate(&source, &[], &CancelToken::unfired()).unwrap();
    assert!(mutations.len() >= 12);

    let total = 3u32;
    let all_ids: HashSet<&str> = mutations.iter().map(|m| m.id.as_str()).collect();

    let mut union: HashSet<&str> = HashSet::new();
    for shard_index in 0..total {
        for mutation in &mutations {
            if in_shard(&mutation.id, shard_index, total) {
                // Disjoint: no mutant may land in two shards.
                assert!(union.insert(mutation.id.as_str()), "{} twice", mutation.id);
            }
        }
    }

    assert_eq!(union, all_ids);
}

#[test]
fn shard_membership_is_deterministic() {
    for id in ["abc", "def", "0123456789abcdef"] {
        for total in [2u32, 3, 5] {
            let first: Vec<bool> = (0..total).map(|i| in_shard(id, i, total)).collect();
            let second: Vec<bool> = (0..total).map(|i| in_shard(id, i, total)).collect();
            assert_eq!(first, second);
            assert_eq!(first.iter().filter(|b| **b).count(), 1);
        }
    }
}

#[test]
fn single_shard_passes_everything_through() {
    assert!(in_shard("anything", 0, 1));
    assert!(in_shard("anything", 0, 0));
}

#[test]
fn shard_stream_filters_by_membership() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_source(dir.path(), "calc.go", CALC_SOURCE);
    let mutations =
        gooze::mutagens::generate(&source, &[], &CancelToken::unfired()).unwrap();

    let total = 3u32;
    let mut collected = Vec::new();
    for shard_index in 0..total {
        let (tx, rx) = crossbeam_channel::unbounded();
        for mutation in &mutations {
            tx.send(mutation.clone()).unwrap();
        }
        drop(tx);

        let out = shard_stream(rx, shard_index, total, 2, CancelToken::unfired());
        collected.extend(out.iter().map(|m| m.id));
    }

    let mut expected: Vec<String> = mutations.iter().map(|m| m.id.clone()).collect();
    expected.sort();
    collected.sort();
    assert_eq!(collected, expected);
}
