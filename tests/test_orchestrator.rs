use std::path::Path;
use std::time::Duration;

use gooze::cancel::{cancel_pair, CancelToken};
use gooze::discover;
use gooze::model::{status_for, Mutation, MutationType, Source, SourceFile, TestStatus};
use gooze::orchestrator::{Orchestrator, TestRunner};

const APP_SOURCE: &str = "package app\n\nfunc Ok() bool {\n\treturn true\n}\n";
const TEST_SOURCE: &str = "package app\n\nimport \"testing\"\n\nfunc TestOk(t *testing.T) {}\n";

/// Lay out a minimal Go project and return a mutation against it.
fn fixture(dir: &Path, with_test: bool) -> Mutation {
    std::fs::write(dir.join("go.mod"), "module example.com/app\n").unwrap();
    let origin_path = dir.join("app.go");
    std::fs::write(&origin_path, APP_SOURCE).unwrap();

    let test = if with_test {
        let test_path = dir.join("app_test.go");
        std::fs::write(&test_path, TEST_SOURCE).unwrap();
        Some(SourceFile {
            hash: discover::hash_file(&test_path).unwrap(),
            path: test_path,
        })
    } else {
        None
    };

    Mutation {
        id: "0123456789abcdef".to_string(),
        source: Source {
            origin: SourceFile {
                hash: discover::hash_file(&origin_path).unwrap(),
                path: origin_path,
            },
            test,
        },
        mutation_type: MutationType::boolean(),
        mutated_code: APP_SOURCE.replace("true", "false").into_bytes(),
        diff: None,
    }
}

/// A runner command that ignores the appended test path.
fn runner(program: &str, args: &[&str]) -> TestRunner {
    TestRunner {
        program: program.to_string(),
        args: args.iter().map(|s| s.to_string()).collect(),
    }
}

#[test]
fn passing_tests_mean_the_mutant_survived() {
    let dir = tempfile::tempdir().unwrap();
    let mutation = fixture(dir.path(), true);

    let orchestrator = Orchestrator::new(runner("true", &[]), Duration::from_secs(5));
    let result = orchestrator
        .test_mutation(&mutation, &CancelToken::unfired())
        .unwrap();

    assert_eq!(status_for(&result, &mutation), TestStatus::Survived);
}

#[test]
fn failing_tests_kill_the_mutant() {
    let dir = tempfile::tempdir().unwrap();
    let mutation = fixture(dir.path(), true);

    let orchestrator = Orchestrator::new(runner("false", &[]), Duration::from_secs(5));
    let result = orchestrator
        .test_mutation(&mutation, &CancelToken::unfired())
        .unwrap();

    assert_eq!(status_for(&result, &mutation), TestStatus::Killed);
}

#[test]
fn missing_test_short_circuits_to_survived() {
    let dir = tempfile::tempdir().unwrap();
    let mutation = fixture(dir.path(), false);

    // The runner would kill everything; it must not even be invoked.
    let orchestrator = Orchestrator::new(runner("false", &[]), Duration::from_secs(5));
    let result = orchestrator
        .test_mutation(&mutation, &CancelToken::unfired())
        .unwrap();

    assert_eq!(status_for(&result, &mutation), TestStatus::Survived);
}

#[test]
fn slow_runner_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let mutation = fixture(dir.path(), true);

    let orchestrator = Orchestrator::new(
        runner("sh", &["-c", "sleep 5", "gooze-test"]),
        Duration::from_millis(200),
    );
    let result = orchestrator
        .test_mutation(&mutation, &CancelToken::unfired())
        .unwrap();

    assert_eq!(status_for(&result, &mutation), TestStatus::Timeout);
}

#[test]
fn unspawnable_runner_maps_to_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let mutation = fixture(dir.path(), true);

    let orchestrator = Orchestrator::new(
        runner("/no/such/binary-gooze", &[]),
        Duration::from_secs(5),
    );
    let result = orchestrator
        .test_mutation(&mutation, &CancelToken::unfired())
        .unwrap();

    assert_eq!(status_for(&result, &mutation), TestStatus::Timeout);
}

#[test]
fn cancelled_token_yields_timeout_without_running() {
    let dir = tempfile::tempdir().unwrap();
    let mutation = fixture(dir.path(), true);

    let (canceller, token) = cancel_pair();
    canceller.cancel();

    let orchestrator = Orchestrator::new(runner("true", &[]), Duration::from_secs(5));
    let result = orchestrator.test_mutation(&mutation, &token).unwrap();

    assert_eq!(status_for(&result, &mutation), TestStatus::Timeout);
}

#[test]
fn the_original_tree_is_never_touched() {
    let dir = tempfile::tempdir().unwrap();
    let mutation = fixture(dir.path(), true);

    let orchestrator = Orchestrator::new(runner("true", &[]), Duration::from_secs(5));
    orchestrator
        .test_mutation(&mutation, &CancelToken::unfired())
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.path().join("app.go")).unwrap(),
        APP_SOURCE
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("app_test.go")).unwrap(),
        TEST_SOURCE
    );
}

#[test]
fn empty_origin_is_a_hard_error() {
    let mutation = Mutation {
        id: "deadbeefdeadbeef".to_string(),
        source: Source {
            origin: SourceFile {
                path: std::path::PathBuf::new(),
                hash: String::new(),
            },
            test: None,
        },
        mutation_type: MutationType::boolean(),
        mutated_code: b"package app\n".to_vec(),
        diff: None,
    };

    let orchestrator = Orchestrator::new(TestRunner::default(), Duration::from_secs(5));
    assert!(orchestrator
        .test_mutation(&mutation, &CancelToken::unfired())
        .is_err());
}

#[test]
fn result_contains_exactly_the_mutation_id() {
    let dir = tempfile::tempdir().unwrap();
    let mutation = fixture(dir.path(), true);

    let orchestrator = Orchestrator::new(runner("true", &[]), Duration::from_secs(5));
    let result = orchestrator
        .test_mutation(&mutation, &CancelToken::unfired())
        .unwrap();

    let entries = result.get(&mutation.mutation_type).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].mutation_id, mutation.id);
}
