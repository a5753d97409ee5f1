//! Durable staging queue
//!
//! Proposals wait here between submission and reconciliation. Layout:
//!
//! ```text
//! <repo>/staging/
//! ├── abc.json          one file per unresolved intent
//! ├── deploy%2Fweb.json intent "deploy/web"
//! └── .staging-XXXX.tmp in-flight write, skipped by drain
//! ```
//!
//! The entry path is derived solely from the intent id, so a second enqueue
//! for the same id replaces the first. Writes go through a temporary file
//! and an atomic rename; a drain never observes a half-written entry.
//! Temporary files older than [`STALE_TEMP_AGE`] are left over from a crash
//! mid-write and are deleted by the next drain.

use crate::error::StagingError;
use crate::proposal::{Proposal, ProposalValidator};
use std::fmt::Write as _;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Name of the staging directory under the repository root
pub const STAGING_DIR: &str = "staging";

/// Extension of staged entries
pub const ENTRY_EXTENSION: &str = "json";

const TEMP_PREFIX: &str = ".staging-";

/// Age after which an unrenamed temporary file is considered abandoned
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(300);

/// Handle to one staged entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryHandle {
    path: PathBuf,
}

impl EntryHandle {
    /// Full path of the entry
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name of the entry, for logging
    #[must_use]
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl std::fmt::Display for EntryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// Filesystem-backed holding area for proposals awaiting reconciliation
#[derive(Debug, Clone)]
pub struct StagingQueue {
    root: PathBuf,
}

impl StagingQueue {
    /// Queue rooted at `<repo_path>/staging`
    ///
    /// Nothing is created until the first enqueue.
    #[must_use]
    pub fn new(repo_path: impl AsRef<Path>) -> Self {
        Self {
            root: repo_path.as_ref().join(STAGING_DIR),
        }
    }

    /// Staging directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the entry for `intent_id` is stored at
    #[must_use]
    pub fn entry_path(&self, intent_id: &str) -> PathBuf {
        self.root.join(entry_file_name(intent_id))
    }

    /// Whether an unconsumed entry exists for `intent_id`
    #[must_use]
    pub fn contains(&self, intent_id: &str) -> bool {
        self.entry_path(intent_id).is_file()
    }

    /// Durably stage a proposal
    ///
    /// Replaces any unconsumed entry with the same intent id.
    ///
    /// # Errors
    /// - `StagingError::Validation` if the proposal is incomplete; nothing is
    ///   written
    /// - `StagingError::Io` if the directory cannot be created or the entry
    ///   cannot be written
    pub fn enqueue(&self, proposal: &Proposal) -> Result<EntryHandle, StagingError> {
        ProposalValidator::validate(proposal)?;

        let data = serde_json::to_vec(proposal).map_err(StagingError::Serialize)?;

        fs::create_dir_all(&self.root).map_err(|e| StagingError::io_error(&self.root, e))?;

        let path = self.entry_path(&proposal.intent_id);

        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(".tmp")
            .tempfile_in(&self.root)
            .map_err(|e| StagingError::io_error(&self.root, e))?;
        tmp.write_all(&data)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StagingError::io_error(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| StagingError::io_error(&path, e.error))?;

        tracing::debug!(
            intent_id = %proposal.intent_id,
            path = %path.display(),
            "proposal staged"
        );

        Ok(EntryHandle { path })
    }

    /// List staged entries for reconciliation
    ///
    /// A missing staging directory is an empty queue. Every regular file is
    /// an entry except in-flight temporary files. Entries are read and parsed
    /// lazily, in file name order. Entries are never removed here; callers
    /// remove what they have applied.
    ///
    /// # Errors
    /// - `StagingError::Io` if the staging directory exists but cannot be listed
    pub fn drain(&self) -> Result<Drain, StagingError> {
        let listing = match fs::read_dir(&self.root) {
            Ok(listing) => listing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Drain::empty()),
            Err(e) => return Err(StagingError::io_error(&self.root, e)),
        };

        let mut paths = Vec::new();
        for entry in listing {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(
                        dir = %self.root.display(),
                        error = %e,
                        "skipping unreadable staging entry"
                    );
                    continue;
                }
            };
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                discard_if_stale(&entry);
                continue;
            }
            paths.push(entry.path());
        }
        paths.sort();

        Ok(Drain {
            paths: paths.into_iter(),
        })
    }

    /// Delete a staged entry
    ///
    /// An entry that is already gone counts as removed.
    ///
    /// # Errors
    /// - `StagingError::Io` if the file exists but cannot be deleted
    pub fn remove(&self, entry: &EntryHandle) -> Result<(), StagingError> {
        match fs::remove_file(&entry.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StagingError::io_error(&entry.path, e)),
        }
    }
}

/// Lazy sequence of staged entries produced by [`StagingQueue::drain`]
#[derive(Debug)]
pub struct Drain {
    paths: std::vec::IntoIter<PathBuf>,
}

impl Drain {
    fn empty() -> Self {
        Self {
            paths: Vec::new().into_iter(),
        }
    }
}

impl Iterator for Drain {
    type Item = (EntryHandle, Result<Proposal, StagingError>);

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        let parsed = read_entry(&path);
        Some((EntryHandle { path }, parsed))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

impl ExactSizeIterator for Drain {}

fn discard_if_stale(entry: &fs::DirEntry) {
    let modified = entry.metadata().and_then(|m| m.modified());
    let age = match modified {
        Ok(modified) => SystemTime::now().duration_since(modified).unwrap_or_default(),
        Err(_) => return,
    };
    if age < STALE_TEMP_AGE {
        return;
    }

    let path = entry.path();
    match fs::remove_file(&path) {
        Ok(()) => tracing::warn!(
            path = %path.display(),
            age = ?age,
            "removed abandoned temp file"
        ),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove abandoned temp file"
        ),
    }
}

fn read_entry(path: &Path) -> Result<Proposal, StagingError> {
    let content = fs::read(path).map_err(|e| StagingError::io_error(path, e))?;
    let proposal: Proposal =
        serde_json::from_slice(&content).map_err(|e| StagingError::parse_error(path, e))?;
    // Entries dropped in by hand bypass enqueue
    ProposalValidator::validate(&proposal)?;
    Ok(proposal)
}

/// File name for an intent id
///
/// Bytes outside `[A-Za-z0-9_.-]` and a leading `.` are written as `%XX`.
/// `%` itself is always escaped, so distinct ids never share a name.
#[must_use]
pub fn entry_file_name(intent_id: &str) -> String {
    let mut name = String::with_capacity(intent_id.len() + ENTRY_EXTENSION.len() + 1);
    for (i, byte) in intent_id.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric()
            || matches!(byte, b'_' | b'-')
            || (byte == b'.' && i > 0);
        if keep {
            name.push(char::from(byte));
        } else {
            let _ = write!(name, "%{byte:02X}");
        }
    }
    name.push('.');
    name.push_str(ENTRY_EXTENSION);
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProposalError;
    use tempfile::TempDir;

    fn queue() -> (TempDir, StagingQueue) {
        let dir = TempDir::new().unwrap();
        let queue = StagingQueue::new(dir.path());
        (dir, queue)
    }

    #[test]
    fn plain_ids_keep_their_name() {
        assert_eq!(entry_file_name("abc"), "abc.json");
        assert_eq!(entry_file_name("task-1_v2.final"), "task-1_v2.final.json");
    }

    #[test]
    fn unsafe_ids_are_escaped() {
        assert_eq!(entry_file_name("a/b"), "a%2Fb.json");
        assert_eq!(entry_file_name(".."), "%2E..json");
        assert_eq!(entry_file_name("100%"), "100%25.json");
        assert_eq!(entry_file_name("é"), "%C3%A9.json");
    }

    #[test]
    fn escaping_is_injective() {
        assert_ne!(entry_file_name("a/b"), entry_file_name("a%2Fb"));
    }

    #[test]
    fn enqueue_creates_directory_lazily() {
        let (_dir, queue) = queue();
        assert!(!queue.root().exists());

        let handle = queue.enqueue(&Proposal::new("abc", "x=1")).unwrap();
        assert!(queue.root().is_dir());
        assert_eq!(handle.path(), queue.entry_path("abc"));
        assert!(queue.contains("abc"));
    }

    #[test]
    fn entry_holds_serialized_proposal() {
        let (_dir, queue) = queue();
        let proposal = Proposal::new("abc", "x=1").provisional(true);
        queue.enqueue(&proposal).unwrap();

        let raw = fs::read_to_string(queue.entry_path("abc")).unwrap();
        let stored: Proposal = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, proposal);
    }

    #[test]
    fn invalid_proposal_writes_nothing() {
        let (_dir, queue) = queue();
        let err = queue.enqueue(&Proposal::new("abc", "")).unwrap_err();
        assert!(matches!(
            err,
            StagingError::Validation(ProposalError::MissingDeltaPatch)
        ));
        assert!(!queue.root().exists());
    }

    #[test]
    fn later_enqueue_replaces_entry() {
        let (_dir, queue) = queue();
        queue.enqueue(&Proposal::new("abc", "x=1")).unwrap();
        queue.enqueue(&Proposal::new("abc", "x=2")).unwrap();

        let entries: Vec<_> = queue.drain().unwrap().collect();
        assert_eq!(entries.len(), 1);
        let proposal = entries[0].1.as_ref().unwrap();
        assert_eq!(proposal.delta_patch, "x=2");
    }

    #[test]
    fn drain_of_missing_directory_is_empty() {
        let (_dir, queue) = queue();
        assert_eq!(queue.drain().unwrap().len(), 0);
    }

    fn age(path: &Path, by: Duration) {
        let file = fs::File::options().write(true).open(path).unwrap();
        let times = fs::FileTimes::new().set_modified(SystemTime::now() - by);
        file.set_times(times).unwrap();
    }

    #[test]
    fn drain_is_sorted_and_skips_dirs_and_temp_files() {
        let (_dir, queue) = queue();
        queue.enqueue(&Proposal::new("b", "p")).unwrap();
        queue.enqueue(&Proposal::new("a", "p")).unwrap();
        fs::create_dir(queue.root().join("nested")).unwrap();
        fs::write(queue.root().join(".staging-partial.tmp"), b"{").unwrap();

        let ids: Vec<String> = queue
            .drain()
            .unwrap()
            .map(|(_, parsed)| parsed.unwrap().intent_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(queue.root().join(".staging-partial.tmp").exists());
    }

    #[test]
    fn hand_placed_dot_file_is_an_entry() {
        let (_dir, queue) = queue();
        fs::create_dir_all(queue.root()).unwrap();
        fs::write(
            queue.root().join(".x.json"),
            br#"{"intent_id":"x","delta_patch":"p"}"#,
        )
        .unwrap();

        let entries: Vec<_> = queue.drain().unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].1.as_ref().unwrap().intent_id, "x");
    }

    #[test]
    fn abandoned_temp_file_is_cleared() {
        let (_dir, queue) = queue();
        fs::create_dir_all(queue.root()).unwrap();
        let stale = queue.root().join(".staging-crashed.tmp");
        let fresh = queue.root().join(".staging-writing.tmp");
        fs::write(&stale, b"{\"intent").unwrap();
        fs::write(&fresh, b"{\"intent").unwrap();
        age(&stale, STALE_TEMP_AGE + Duration::from_secs(60));

        assert_eq!(queue.drain().unwrap().len(), 0);
        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn enqueue_reports_io_when_staging_is_a_file() {
        let (_dir, queue) = queue();
        fs::write(queue.root(), b"").unwrap();

        let err = queue.enqueue(&Proposal::new("abc", "x=1")).unwrap_err();
        assert!(matches!(err, StagingError::Io { .. }));
        assert!(err.is_retryable());
        assert!(!err.is_validation());
    }

    #[test]
    fn corrupt_entry_is_reported_and_kept() {
        let (_dir, queue) = queue();
        fs::create_dir_all(queue.root()).unwrap();
        let corrupt = queue.root().join("broken.json");
        fs::write(&corrupt, b"not json").unwrap();

        for _ in 0..2 {
            let entries: Vec<_> = queue.drain().unwrap().collect();
            assert_eq!(entries.len(), 1);
            assert!(matches!(entries[0].1, Err(StagingError::Parse { .. })));
        }
        assert!(corrupt.exists());
    }

    #[test]
    fn hand_written_incomplete_entry_is_rejected() {
        let (_dir, queue) = queue();
        fs::create_dir_all(queue.root()).unwrap();
        fs::write(queue.root().join("empty.json"), br#"{"intent_id":""}"#).unwrap();

        let (_, parsed) = queue.drain().unwrap().next().unwrap();
        assert!(matches!(
            parsed,
            Err(StagingError::Validation(ProposalError::MissingIntentId))
        ));
    }

    #[test]
    fn remove_deletes_entry_and_tolerates_missing() {
        let (_dir, queue) = queue();
        let handle = queue.enqueue(&Proposal::new("abc", "x=1")).unwrap();

        queue.remove(&handle).unwrap();
        assert!(!queue.contains("abc"));
        queue.remove(&handle).unwrap();
        assert_eq!(queue.drain().unwrap().len(), 0);
    }
}
