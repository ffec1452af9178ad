use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use regex::Regex;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::model::{Source, SourceFile};

/// Suffix marking companion test files. A file carrying it is never a
/// source in its own right.
pub const TEST_SUFFIX: &str = "_test.go";

const SOURCE_EXT: &str = "go";

/// Marker appended to a root to request recursive descent, Go-style:
/// `./...`, `./pkg/...`.
const RECURSIVE_MARKER: &str = "...";

/// Directories never descended into during discovery.
const SKIP_DIRS: &[&str] = &[".git", ".hg", ".svn", "vendor", "node_modules"];

/// A scan root with its recursion flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Root {
    pub dir: PathBuf,
    pub recursive: bool,
}

/// Split the recursive marker off a raw root argument.
pub fn parse_root(raw: &str) -> Root {
    let trimmed = raw.trim();

    if trimmed == RECURSIVE_MARKER {
        return Root {
            dir: PathBuf::from("."),
            recursive: true,
        };
    }

    match trimmed.strip_suffix(RECURSIVE_MARKER) {
        Some(prefix) => {
            let dir = prefix.trim_end_matches('/');
            Root {
                dir: PathBuf::from(if dir.is_empty() { "." } else { dir }),
                recursive: true,
            }
        }
        None => Root {
            dir: PathBuf::from(trimmed),
            recursive: false,
        },
    }
}

/// Compile exclude patterns up front so a bad regex aborts before any
/// mutation is produced.
pub fn compile_excludes(patterns: &[String]) -> Result<Vec<Regex>, Error> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(Error::from))
        .collect()
}

/// Enumerate candidate sources under the given roots.
///
/// Excludes are matched against the path relative to the walked root and
/// applied before hashing. The result is sorted by origin hash so shard
/// assignment is stable regardless of filesystem enumeration order.
pub fn discover_sources(
    roots: &[String],
    excludes: &[Regex],
    token: &CancelToken,
) -> Result<Vec<Source>, Error> {
    let mut by_path: BTreeMap<PathBuf, Source> = BTreeMap::new();

    for raw in roots {
        let root = parse_root(raw);
        collect_root(&root, excludes, token, &mut by_path)?;
    }

    let mut sources: Vec<Source> = by_path.into_values().collect();
    sources.sort_by(|a, b| a.origin.hash.cmp(&b.origin.hash));

    tracing::debug!(count = sources.len(), "discovered sources");

    Ok(sources)
}

fn collect_root(
    root: &Root,
    excludes: &[Regex],
    token: &CancelToken,
    by_path: &mut BTreeMap<PathBuf, Source>,
) -> Result<(), Error> {
    let max_depth = if root.recursive { usize::MAX } else { 1 };

    let walker = WalkDir::new(&root.dir)
        .follow_links(false)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !SKIP_DIRS.contains(&name.as_ref())
        });

    for entry in walker {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.dir.clone());
            Error::input(path, e.to_string())
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !is_candidate_source(path) {
            continue;
        }

        let relative = path.strip_prefix(&root.dir).unwrap_or(path);
        let relative_str = relative.to_string_lossy();
        if excludes.iter().any(|rx| rx.is_match(&relative_str)) {
            tracing::debug!(path = %path.display(), "excluded source");
            continue;
        }

        if by_path.contains_key(path) {
            continue;
        }

        let source = pair_with_test(path)?;
        by_path.insert(path.to_path_buf(), source);
    }

    Ok(())
}

/// A source candidate: a `.go` file that is not itself a test.
fn is_candidate_source(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some(SOURCE_EXT) {
        return false;
    }

    !path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(TEST_SUFFIX))
}

/// Path of the companion test by the naming convention, next to the source.
pub fn companion_test_path(source_path: &Path) -> Option<PathBuf> {
    let stem = source_path.file_stem()?.to_str()?;
    let candidate = source_path.with_file_name(format!("{stem}{TEST_SUFFIX}"));

    candidate.is_file().then_some(candidate)
}

fn pair_with_test(path: &Path) -> Result<Source, Error> {
    let origin = SourceFile {
        path: path.to_path_buf(),
        hash: hash_file(path)?,
    };

    let test = match companion_test_path(path) {
        Some(test_path) => Some(SourceFile {
            hash: hash_file(&test_path)?,
            path: test_path,
        }),
        None => None,
    };

    Ok(Source { origin, test })
}

/// Streaming SHA-256 over the file's bytes, hex encoded.
pub fn hash_file(path: &Path) -> Result<String, Error> {
    let mut file =
        std::fs::File::open(path).map_err(|e| Error::input(path, format!("open: {e}")))?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| Error::input(path, format!("read: {e}")))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
