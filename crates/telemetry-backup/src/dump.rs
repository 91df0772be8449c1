//! Dump and restore of named metric stores.
//!
//! File layout: one gzip stream containing [`DumpEntry`] JSON objects
//! written back-to-back.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::hash::Hash;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Deserializer;
use tracing::{debug, info, warn};

use telemetry_state::{MemStore, RawValue, Uncancellable};

use crate::error::{BackupError, BackupResult};

/// Stores participating in a dump, by name.
pub type Stores<K> = BTreeMap<String, MemStore<K, RawValue>>;

/// One persisted key, tagged with the store it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpEntry<'a, K> {
    pub store: Cow<'a, str>,
    pub key: K,
    pub value: Cow<'a, [u8]>,
}

/// Outcome of a restore. Entries are applied one by one; failures that do
/// not prevent reading further entries are collected in `errors`.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: usize,
    pub errors: Vec<BackupError>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether the entry stream was read to its end.
    pub fn is_complete(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| matches!(e, BackupError::Decode(_)))
    }
}

fn all_empty<K, V>(stores: &BTreeMap<String, MemStore<K, V>>) -> bool
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    stores.values().all(|store| store.is_empty())
}

/// Add the execute bit to every permission group that has the read bit, so
/// directories created for a dump file stay traversable.
pub fn with_traversal_bits(mode: u32) -> u32 {
    let mut mode = mode & 0o777;
    for shift in [0, 3, 6] {
        if mode & (0o4 << shift) != 0 {
            mode |= 0o1 << shift;
        }
    }
    mode
}

// ── Dump ───────────────────────────────────────────────────────────

/// Write one entry per stored key into `out`. Returns the entry count.
///
/// Fails with [`BackupError::Empty`] when no entry was written.
pub fn dump<K, W>(stores: &Stores<K>, mut out: W) -> BackupResult<usize>
where
    K: Serialize + Eq + Hash + Clone,
    W: Write,
{
    let mut written = 0;
    for (name, store) in stores {
        store.for_each(&Uncancellable, |key, value| {
            let entry = DumpEntry {
                store: Cow::Borrowed(name.as_str()),
                key,
                value: Cow::Borrowed(&value[..]),
            };
            serde_json::to_writer(&mut out, &entry).map_err(BackupError::Encode)?;
            written += 1;
            Ok::<(), BackupError>(())
        })?;
    }
    if written == 0 {
        return Err(BackupError::Empty);
    }
    Ok(written)
}

/// Sibling path the dump is written to before it replaces `path`.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Dump `stores` into a gzip file at `path` with permission bits `mode`.
/// Missing parent directories are created with [`with_traversal_bits`]`(mode)`.
///
/// The dump is written to a staging file and renamed over `path` only once
/// it is complete and non-empty, so a failed or empty dump never replaces
/// a previous one.
pub fn dump_to_file<K>(path: &Path, stores: &Stores<K>, mode: u32) -> BackupResult<usize>
where
    K: Serialize + Eq + Hash + Clone,
{
    if all_empty(stores) {
        return Err(BackupError::Empty);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dirs(parent, with_traversal_bits(mode)).map_err(BackupError::io(parent))?;
    }

    let staging = staging_path(path);
    let result = write_gzip(&staging, stores, mode).and_then(|written| {
        fs::rename(&staging, path).map_err(BackupError::io(path))?;
        Ok(written)
    });
    let written = match result {
        Ok(written) => written,
        Err(e) => {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
    };

    debug!(path = %path.display(), entries = written, "stores dumped");
    Ok(written)
}

fn write_gzip<K>(path: &Path, stores: &Stores<K>, mode: u32) -> BackupResult<usize>
where
    K: Serialize + Eq + Hash + Clone,
{
    let file = create_truncated(path, mode).map_err(BackupError::io(path))?;

    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let written = dump(stores, &mut encoder)?;
    let buffered = encoder.finish().map_err(BackupError::io(path))?;
    let file = buffered
        .into_inner()
        .map_err(|e| BackupError::io(path)(e.into_error()))?;
    file.sync_all().map_err(BackupError::io(path))?;
    Ok(written)
}

#[cfg(unix)]
fn create_dirs(dir: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(mode).create(dir)
}

#[cfg(not(unix))]
fn create_dirs(dir: &Path, _mode: u32) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn create_truncated(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

#[cfg(not(unix))]
fn create_truncated(path: &Path, _mode: u32) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

// ── Restore ────────────────────────────────────────────────────────

/// Read entries from `input` and apply each to the store its tag names.
///
/// Unknown store tags and malformed values are recorded and skipped. A
/// decode failure stops reading; entries applied before it stay applied.
pub fn restore<K, R>(input: R, stores: &Stores<K>) -> RestoreReport
where
    K: DeserializeOwned + Eq + Hash + Clone,
    R: Read,
{
    let mut report = RestoreReport::default();

    for entry in Deserializer::from_reader(input).into_iter::<DumpEntry<'static, K>>() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.errors.push(BackupError::Decode(e));
                break;
            }
        };

        let Some(store) = stores.get(entry.store.as_ref()) else {
            report
                .errors
                .push(BackupError::UnknownStore(entry.store.into_owned()));
            continue;
        };

        let Ok(raw) = RawValue::try_from(entry.value.as_ref()) else {
            warn!(store = %entry.store, len = entry.value.len(), "skipping malformed value");
            report.errors.push(BackupError::MalformedValue {
                store: entry.store.into_owned(),
                len: entry.value.len(),
            });
            continue;
        };

        store.set(entry.key, raw);
        report.restored += 1;
    }

    report
}

/// Restore `stores` from the gzip dump at `path`.
///
/// With `remove`, the file is deleted once it has been read to the end; a
/// failed deletion is added to the report without undoing the restore.
pub fn restore_from_file<K>(path: &Path, stores: &Stores<K>, remove: bool) -> BackupResult<RestoreReport>
where
    K: DeserializeOwned + Eq + Hash + Clone,
{
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => BackupError::NotFound(path.to_path_buf()),
        _ => BackupError::io(path)(e),
    })?;

    let mut report = restore(BufReader::new(GzDecoder::new(BufReader::new(file))), stores);

    if remove && report.is_complete() {
        if let Err(source) = fs::remove_file(path) {
            report.errors.push(BackupError::Remove {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    info!(
        path = %path.display(),
        restored = report.restored,
        errors = report.errors.len(),
        "stores restored"
    );
    Ok(report)
}
