use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;

/// Encoding version stamped into every record frame. Bump on incompatible
/// layout changes; additive struct fields do not require a bump.
const SCHEMA_VERSION: u16 = 1;

/// Bytes before the payload: u32 payload length + u16 schema tag.
const FRAME_HEADER_LEN: u64 = 6;

/// Append-only typed log on disk with random-access reads.
///
/// Records are framed as `[len: u32 le][schema: u16 le][bincode payload]` so
/// the file is self-delimiting: reopening after a crash reads exactly the
/// records that were fully written and ignores a truncated tail.
///
/// One exclusive writer; `get` and `range` open independent read cursors, so
/// readers can coexist with the writer as long as they snapshot `len` first
/// (which `range` does).
pub struct Spill<T> {
    path: PathBuf,
    file: File,
    offsets: Vec<u64>,
    end: u64,
    _marker: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> Spill<T> {
    /// Create a new, empty spill, truncating anything at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::persistence(&path, format!("create spill: {e}")))?;

        Ok(Spill {
            path,
            file,
            offsets: Vec::new(),
            end: 0,
            _marker: PhantomData,
        })
    }

    /// Open an existing spill (or start a fresh one), scanning its frames to
    /// recover the record count. A partial final frame is dropped.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::persistence(&path, format!("open spill: {e}")))?;

        let (offsets, end) = scan_frames(&path, &mut file)?;
        // Drop any partial tail so later readers never see it.
        file.set_len(end)
            .map_err(|e| Error::persistence(&path, format!("truncate spill: {e}")))?;
        file.seek(SeekFrom::Start(end))
            .map_err(|e| Error::persistence(&path, format!("seek spill: {e}")))?;

        Ok(Spill {
            path,
            file,
            offsets,
            end,
            _marker: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.offsets.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Byte offset of the record frame at `index`, if it exists.
    pub fn byte_offset(&self, index: u64) -> Option<u64> {
        self.offsets.get(index as usize).copied()
    }

    /// Append one record, returning its index.
    pub fn append(&mut self, item: &T) -> Result<u64, Error> {
        let payload = bincode::serialize(item)
            .map_err(|e| Error::persistence(&self.path, format!("encode record: {e}")))?;

        let mut frame = Vec::with_capacity(payload.len() + FRAME_HEADER_LEN as usize);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
        frame.extend_from_slice(&payload);

        self.file
            .write_all(&frame)
            .map_err(|e| Error::persistence(&self.path, format!("append record: {e}")))?;

        let index = self.offsets.len() as u64;
        self.offsets.push(self.end);
        self.end += frame.len() as u64;
        tracing::trace!(path = %self.path.display(), index, "appended spill record");

        Ok(index)
    }

    pub fn append_batch(&mut self, items: &[T]) -> Result<(), Error> {
        for item in items {
            self.append(item)?;
        }

        Ok(())
    }

    /// Read the record at `index` through an independent cursor.
    pub fn get(&self, index: u64) -> Result<T, Error> {
        let Some(offset) = self.byte_offset(index) else {
            return Err(Error::persistence(
                &self.path,
                format!("index {index} out of bounds (length {})", self.len()),
            ));
        };

        let mut reader = File::open(&self.path)
            .map_err(|e| Error::persistence(&self.path, format!("open for get: {e}")))?;
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::persistence(&self.path, format!("seek for get: {e}")))?;

        match read_frame(&self.path, &mut reader)? {
            Some(item) => Ok(item),
            None => Err(Error::persistence(
                &self.path,
                format!("record {index} truncated"),
            )),
        }
    }

    /// Iterate records `[0, len())` in insertion order. The length is
    /// snapshotted on entry, so records appended concurrently are not seen.
    pub fn range(
        &self,
        mut f: impl FnMut(u64, T) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let snapshot = self.len();
        let file = File::open(&self.path)
            .map_err(|e| Error::persistence(&self.path, format!("open for range: {e}")))?;
        let mut reader = BufReader::new(file);

        for index in 0..snapshot {
            match read_frame(&self.path, &mut reader)? {
                Some(item) => f(index, item)?,
                None => {
                    return Err(Error::persistence(
                        &self.path,
                        format!("record {index} truncated"),
                    ))
                }
            }
        }

        Ok(())
    }

    pub fn close(mut self) -> Result<(), Error> {
        self.file
            .flush()
            .map_err(|e| Error::persistence(&self.path, format!("flush spill: {e}")))
    }
}

/// Read one frame; `Ok(None)` means a clean or truncated end of input.
fn read_frame<T: DeserializeOwned>(
    path: &Path,
    reader: &mut impl Read,
) -> Result<Option<T>, Error> {
    let mut header = [0u8; FRAME_HEADER_LEN as usize];
    match read_exact_or_eof(reader, &mut header) {
        Ok(true) => {}
        Ok(false) => return Ok(None),
        Err(e) => return Err(Error::persistence(path, format!("read frame header: {e}"))),
    }

    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let schema = u16::from_le_bytes([header[4], header[5]]);
    if schema == 0 || schema > SCHEMA_VERSION {
        return Err(Error::persistence(
            path,
            format!("unknown spill schema tag {schema}"),
        ));
    }

    let mut payload = vec![0u8; len];
    match read_exact_or_eof(reader, &mut payload) {
        Ok(true) => {}
        Ok(false) => return Ok(None),
        Err(e) => return Err(Error::persistence(path, format!("read frame payload: {e}"))),
    }

    let item = bincode::deserialize(&payload)
        .map_err(|e| Error::persistence(path, format!("decode record: {e}")))?;

    Ok(Some(item))
}

/// Fill `buf` completely, or report a clean EOF with `Ok(false)` if the input
/// ends before the first byte. A partial fill also reports `Ok(false)`: the
/// record was never completely written.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }

    Ok(true)
}

fn scan_frames(path: &Path, file: &mut File) -> Result<(Vec<u64>, u64), Error> {
    file.seek(SeekFrom::Start(0))
        .map_err(|e| Error::persistence(path, format!("seek spill: {e}")))?;

    let mut reader = BufReader::new(file);
    let mut offsets = Vec::new();
    let mut cursor = 0u64;

    loop {
        let mut header = [0u8; FRAME_HEADER_LEN as usize];
        match read_exact_or_eof(&mut reader, &mut header) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => return Err(Error::persistence(path, format!("scan spill: {e}"))),
        }

        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let schema = u16::from_le_bytes([header[4], header[5]]);
        if schema == 0 || schema > SCHEMA_VERSION {
            return Err(Error::persistence(
                path,
                format!("unknown spill schema tag {schema}"),
            ));
        }

        let mut payload = vec![0u8; len as usize];
        match read_exact_or_eof(&mut reader, &mut payload) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => return Err(Error::persistence(path, format!("scan spill: {e}"))),
        }

        offsets.push(cursor);
        cursor += FRAME_HEADER_LEN + len;
    }

    Ok((offsets, cursor))
}
