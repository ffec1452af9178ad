use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A file in the project under test, identified by its content hash.
///
/// The hash (hex SHA-256 of the file bytes) is the file's identity for cache
/// lookups; the path is where it was found at discovery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub hash: String,
}

/// A mutable source paired with its companion test, if one exists.
///
/// A source without a test can still be mutated; all of its mutants are
/// classified `Survived` without running anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub origin: SourceFile,
    pub test: Option<SourceFile>,
}

/// Category of mutation, with a rule version.
///
/// The version is bumped whenever a rule's output set changes; it feeds the
/// mutation ID so previously cached verdicts stop matching.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MutationType {
    pub name: String,
    pub version: u32,
}

impl MutationType {
    pub fn new(name: &str, version: u32) -> Self {
        MutationType {
            name: name.to_string(),
            version,
        }
    }

    pub fn arithmetic() -> Self {
        Self::new("arithmetic", 1)
    }

    pub fn boolean() -> Self {
        Self::new("boolean", 1)
    }

    pub fn numbers() -> Self {
        Self::new("numbers", 1)
    }

    pub fn comparison() -> Self {
        Self::new("comparison", 1)
    }

    pub fn logical() -> Self {
        Self::new("logical", 1)
    }

    pub fn unary() -> Self {
        Self::new("unary", 1)
    }

    pub fn branch() -> Self {
        Self::new("branch", 1)
    }

    pub fn statement() -> Self {
        Self::new("statement", 1)
    }

    pub fn loops() -> Self {
        Self::new("loop", 1)
    }

    /// Every built-in mutation type, including the ones outside the default set.
    pub fn all() -> Vec<MutationType> {
        vec![
            Self::arithmetic(),
            Self::boolean(),
            Self::numbers(),
            Self::comparison(),
            Self::logical(),
            Self::unary(),
            Self::branch(),
            Self::statement(),
            Self::loops(),
        ]
    }

    /// The default set used when the caller does not name types explicitly.
    ///
    /// `statement` and `loop` are deliberately absent: their semantics are
    /// still being pinned down against a test corpus, so they only run when
    /// requested by name.
    pub fn defaults() -> Vec<MutationType> {
        vec![
            Self::arithmetic(),
            Self::boolean(),
            Self::numbers(),
            Self::comparison(),
            Self::logical(),
            Self::unary(),
            Self::branch(),
        ]
    }
}

/// A single mutant: a complete replacement body for the origin file.
///
/// `source` is a copy of the discovery metadata, not a live handle, so a
/// mutation is self-contained for serialisation. The diff is only attached
/// once the mutant is known to have survived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub id: String,
    pub source: Source,
    pub mutation_type: MutationType,
    pub mutated_code: Vec<u8>,
    pub diff: Option<String>,
}

/// Verdict for one mutant after the test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    Killed,
    Survived,
    Skipped,
    Timeout,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub mutation_id: String,
    pub status: TestStatus,
    pub error: Option<String>,
}

/// Verdicts grouped by mutation type. At most one entry per mutation ID.
pub type MutationResult = BTreeMap<MutationType, Vec<ResultEntry>>;

/// Build a single-entry result for one mutation.
pub fn result_for_status(mutation: &Mutation, status: TestStatus) -> MutationResult {
    result_with_error(mutation, status, None)
}

pub fn result_with_error(
    mutation: &Mutation,
    status: TestStatus,
    error: Option<String>,
) -> MutationResult {
    let mut result = MutationResult::new();
    result.insert(
        mutation.mutation_type.clone(),
        vec![ResultEntry {
            mutation_id: mutation.id.clone(),
            status,
            error,
        }],
    );
    result
}

/// Look up the verdict a result holds for the given mutation.
///
/// Entries for a different mutation ID are not guessed at; that would inflate
/// the score and attach an incorrect diff.
pub fn status_for(result: &MutationResult, mutation: &Mutation) -> TestStatus {
    let Some(entries) = result.get(&mutation.mutation_type) else {
        return TestStatus::Error;
    };

    for entry in entries {
        if entry.mutation_id == mutation.id {
            return entry.status;
        }
    }

    TestStatus::Error
}

/// Persisted outcome for every mutant of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub source: Source,
    pub result: MutationResult,
    pub diff: Option<String>,
}

/// Where a code element sits in the file: package level, `init`, or a
/// regular function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    Global,
    Init,
    Function,
}

/// A line range in a source file with its scope classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeScope {
    pub kind: ScopeKind,
    pub start_line: usize,
    pub end_line: usize,
    pub name: String,
}

/// Scope classification for a line, defaulting to function scope.
pub fn scope_for_line(scopes: &[CodeScope], line: usize) -> ScopeKind {
    for scope in scopes {
        if line >= scope.start_line && line <= scope.end_line {
            return scope.kind;
        }
    }

    ScopeKind::Function
}
