use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::{Report, Source, TestStatus};
use crate::spill::Spill;

pub const MANIFEST_FILE: &str = "manifest";
pub const SPILL_FILE: &str = "reports.spill";
pub const INDEX_FILE: &str = "index.dat";

/// Prefix of per-shard subdirectories inside a reports directory.
pub const SHARD_DIR_PREFIX: &str = "shard_";

const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Bytes per index entry: 32-byte source hash + 8-byte big-endian offset.
const INDEX_ENTRY_LEN: usize = 40;

#[derive(Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub created_at_ms: u64,
}

/// Reports directory: a manifest, an append log of `Report` records, and an
/// index from source hash to the byte offset of its first report.
pub struct ReportStore {
    dir: PathBuf,
    spill: Spill<Report>,
}

impl ReportStore {
    /// Open (or initialise) a reports directory for appending and reading.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| Error::persistence(&dir, format!("create reports dir: {e}")))?;

        ensure_manifest(&dir)?;
        let spill = Spill::open(dir.join(SPILL_FILE))?;

        Ok(ReportStore { dir, spill })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> u64 {
        self.spill.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spill.is_empty()
    }

    pub fn append(&mut self, report: &Report) -> Result<u64, Error> {
        self.spill.append(report)
    }

    pub fn append_batch(&mut self, reports: &[Report]) -> Result<(), Error> {
        for report in reports {
            self.append(report)?;
        }

        Ok(())
    }

    pub fn get(&self, index: u64) -> Result<Report, Error> {
        self.spill.get(index)
    }

    pub fn range(
        &self,
        f: impl FnMut(u64, Report) -> Result<(), Error>,
    ) -> Result<(), Error> {
        self.spill.range(f)
    }

    /// Load every report into memory, in insertion order.
    pub fn reports(&self) -> Result<Vec<Report>, Error> {
        let mut out = Vec::with_capacity(self.spill.len() as usize);
        self.spill.range(|_, report| {
            out.push(report);
            Ok(())
        })?;

        Ok(out)
    }

    /// killed / (killed + survived). An empty store scores 1.0; a store
    /// whose entries are all skipped, timed out or errored scores 0.0.
    pub fn score(&self) -> Result<f64, Error> {
        if self.spill.is_empty() {
            return Ok(1.0);
        }

        let mut killed = 0u64;
        let mut total = 0u64;

        self.spill.range(|_, report| {
            for entries in report.result.values() {
                for entry in entries {
                    match entry.status {
                        TestStatus::Killed => {
                            killed += 1;
                            total += 1;
                        }
                        TestStatus::Survived => {
                            total += 1;
                        }
                        TestStatus::Skipped | TestStatus::Timeout | TestStatus::Error => {}
                    }
                }
            }
            Ok(())
        })?;

        if total == 0 {
            return Ok(0.0);
        }

        Ok(killed as f64 / total as f64)
    }

    /// Rewrite `index.dat` from the current spill contents.
    pub fn regenerate_index(&self) -> Result<(), Error> {
        let mut entries: Vec<([u8; 32], u64)> = Vec::new();
        let mut seen = HashSet::new();

        self.spill.range(|index, report| {
            let hash = decode_hash(&self.dir, &report.source.origin.hash)?;
            if seen.insert(hash) {
                let offset = self.spill.byte_offset(index).unwrap_or(0);
                entries.push((hash, offset));
            }
            Ok(())
        })?;

        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let path = self.dir.join(INDEX_FILE);
        let mut buf = Vec::with_capacity(entries.len() * INDEX_ENTRY_LEN);
        for (hash, offset) in &entries {
            buf.extend_from_slice(hash);
            buf.extend_from_slice(&offset.to_be_bytes());
        }

        let mut file = std::fs::File::create(&path)
            .map_err(|e| Error::persistence(&path, format!("create index: {e}")))?;
        file.write_all(&buf)
            .map_err(|e| Error::persistence(&path, format!("write index: {e}")))?;

        tracing::debug!(path = %path.display(), entries = entries.len(), "regenerated index");

        Ok(())
    }

    pub fn close(self) -> Result<(), Error> {
        self.spill.close()
    }
}

fn ensure_manifest(dir: &Path) -> Result<(), Error> {
    let path = dir.join(MANIFEST_FILE);

    if path.is_file() {
        let bytes = std::fs::read(&path)
            .map_err(|e| Error::persistence(&path, format!("read manifest: {e}")))?;
        let manifest: Manifest = bincode::deserialize(&bytes)
            .map_err(|e| Error::persistence(&path, format!("decode manifest: {e}")))?;
        if manifest.schema_version == 0 || manifest.schema_version > MANIFEST_SCHEMA_VERSION {
            return Err(Error::persistence(
                &path,
                format!("unsupported manifest schema {}", manifest.schema_version),
            ));
        }
        return Ok(());
    }

    let manifest = Manifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        created_at_ms: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0),
    };

    let bytes = bincode::serialize(&manifest)
        .map_err(|e| Error::persistence(&path, format!("encode manifest: {e}")))?;
    std::fs::write(&path, bytes)
        .map_err(|e| Error::persistence(&path, format!("write manifest: {e}")))?;

    Ok(())
}

/// Source hashes present in the on-disk index, as hex strings.
pub fn index_hashes(dir: &Path) -> Result<HashSet<String>, Error> {
    let path = dir.join(INDEX_FILE);
    if !path.is_file() {
        return Ok(HashSet::new());
    }

    let bytes =
        std::fs::read(&path).map_err(|e| Error::persistence(&path, format!("read index: {e}")))?;
    if bytes.len() % INDEX_ENTRY_LEN != 0 {
        return Err(Error::persistence(&path, "index size is not a whole number of entries"));
    }

    let mut hashes = HashSet::with_capacity(bytes.len() / INDEX_ENTRY_LEN);
    for entry in bytes.chunks_exact(INDEX_ENTRY_LEN) {
        hashes.insert(encode_hash(&entry[..32]));
    }

    Ok(hashes)
}

/// Subset of `sources` whose hash is absent from the existing index; the
/// rest are assumed up to date. Reports for hashes that no longer belong to
/// any discovered source are dropped from the store.
pub fn changed_sources(dir: &Path, sources: &[Source]) -> Result<Vec<Source>, Error> {
    let cached = index_hashes(dir)?;
    if cached.is_empty() {
        return Ok(sources.to_vec());
    }

    let current: HashSet<&str> = sources.iter().map(|s| s.origin.hash.as_str()).collect();
    let stale: HashSet<String> = cached
        .iter()
        .filter(|hash| !current.contains(hash.as_str()))
        .cloned()
        .collect();

    if !stale.is_empty() {
        clean_reports(dir, &stale)?;
    }

    let changed: Vec<Source> = sources
        .iter()
        .filter(|s| !cached.contains(&s.origin.hash))
        .cloned()
        .collect();

    tracing::debug!(
        total = sources.len(),
        changed = changed.len(),
        stale = stale.len(),
        "cache filter applied"
    );

    Ok(changed)
}

/// Drop every report whose source hash is in `stale`, rewriting the spill
/// and the index.
pub fn clean_reports(dir: &Path, stale: &HashSet<String>) -> Result<(), Error> {
    let store = ReportStore::open(dir)?;
    let retained: Vec<Report> = store
        .reports()?
        .into_iter()
        .filter(|r| !stale.contains(&r.source.origin.hash))
        .collect();
    drop(store);

    let tmp_path = dir.join(format!("{SPILL_FILE}.tmp"));
    let mut tmp = Spill::create(&tmp_path)?;
    tmp.append_batch(&retained)?;
    tmp.close()?;

    std::fs::rename(&tmp_path, dir.join(SPILL_FILE))
        .map_err(|e| Error::persistence(dir, format!("replace spill: {e}")))?;

    ReportStore::open(dir)?.regenerate_index()
}

/// Shard subdirectories of `base`, sorted lexicographically.
pub fn find_shard_dirs(base: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut dirs = Vec::new();

    let entries = match std::fs::read_dir(base) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dirs),
        Err(e) => return Err(Error::persistence(base, format!("read reports dir: {e}"))),
    };

    for entry in entries {
        let entry =
            entry.map_err(|e| Error::persistence(base, format!("read reports dir: {e}")))?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with(SHARD_DIR_PREFIX)
        {
            dirs.push(entry.path());
        }
    }

    dirs.sort();

    Ok(dirs)
}

/// Concatenate every `shard_*` spill into the base directory, preserving
/// pre-existing base content, then regenerate the index and delete the
/// shard directories.
pub fn merge_shards(base: &Path) -> Result<(), Error> {
    let shard_dirs = find_shard_dirs(base)?;

    let mut store = ReportStore::open(base)?;

    for shard_dir in &shard_dirs {
        let shard = Spill::<Report>::open(shard_dir.join(SPILL_FILE))?;
        let mut batch = Vec::with_capacity(shard.len() as usize);
        shard.range(|_, report| {
            batch.push(report);
            Ok(())
        })?;
        store.append_batch(&batch)?;
        tracing::debug!(shard = %shard_dir.display(), count = batch.len(), "merged shard");
    }

    store.regenerate_index()?;
    store.close()?;

    for shard_dir in &shard_dirs {
        std::fs::remove_dir_all(shard_dir)
            .map_err(|e| Error::persistence(shard_dir, format!("remove shard dir: {e}")))?;
    }

    Ok(())
}

fn decode_hash(dir: &Path, hex: &str) -> Result<[u8; 32], Error> {
    let bytes = hex.as_bytes();
    if bytes.len() != 64 {
        return Err(Error::persistence(
            dir,
            format!("source hash {hex:?} is not a sha-256 digest"),
        ));
    }

    let mut out = [0u8; 32];
    for (i, pair) in bytes.chunks_exact(2).enumerate() {
        let hi = hex_nibble(pair[0]);
        let lo = hex_nibble(pair[1]);
        match (hi, lo) {
            (Some(hi), Some(lo)) => out[i] = (hi << 4) | lo,
            _ => {
                return Err(Error::persistence(
                    dir,
                    format!("source hash {hex:?} is not valid hex"),
                ))
            }
        }
    }

    Ok(out)
}

fn encode_hash(raw: &[u8]) -> String {
    raw.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}
