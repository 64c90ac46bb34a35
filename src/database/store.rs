use super::models::HashRecord;
use super::StoreError;
use crate::core::fingerprint::Fingerprint;
use crate::core::frame::FrameRef;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// File-backed `video_hashes` relation.
///
/// Every operation opens its own connection and drops it before returning,
/// so the store can be shared freely and holds no handle between calls.
#[derive(Debug, Clone)]
pub struct HashStore {
    path: PathBuf,
}

impl HashStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Create the store handle and make sure the relation exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(path);
        store.initialize()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Idempotently create the relation and its unique phash index.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS video_hashes (
                video_name TEXT NOT NULL,
                frame_path TEXT NOT NULL,
                phash TEXT NOT NULL
            )",
            [],
        )?;

        // Files written without the index may already break uniqueness
        let repeated: i64 = conn.query_row(
            "SELECT COUNT(phash) - COUNT(DISTINCT phash) FROM video_hashes",
            [],
            |row| row.get(0),
        )?;
        if repeated > 0 {
            return Err(StoreError::DuplicateRows(repeated));
        }

        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_video_hashes_phash ON video_hashes(phash)",
            [],
        )?;

        Ok(())
    }

    /// Insert each (frame, phash) pair whose phash is not stored yet, in
    /// batch order, so the earliest frame wins a phash repeated within it.
    ///
    /// Rows are committed one at a time; a failure mid-batch leaves earlier
    /// rows in place. Existing phashes are skipped without error.
    pub fn store(
        &self,
        video_name: &str,
        frame_hashes: &[(FrameRef, Fingerprint)],
    ) -> Result<(), StoreError> {
        let conn = self.connect()?;
        let mut exists = conn.prepare_cached(
            "SELECT EXISTS(SELECT 1 FROM video_hashes WHERE phash = ?1)",
        )?;
        // The unique index is the real guard; the lookup above only saves a write.
        let mut insert = conn.prepare_cached(
            "INSERT OR IGNORE INTO video_hashes (video_name, frame_path, phash) VALUES (?1, ?2, ?3)",
        )?;

        let mut inserted = 0usize;
        for (frame, phash) in frame_hashes {
            let present: bool = exists.query_row(params![phash.as_str()], |row| row.get(0))?;
            if present {
                continue;
            }
            inserted += insert.execute(params![video_name, frame.as_str(), phash.as_str()])?;
        }

        log::debug!(
            "Stored {} of {} hashes for {}",
            inserted,
            frame_hashes.len(),
            video_name
        );
        Ok(())
    }

    /// True iff some record already carries exactly this phash.
    pub fn check_duplicate(&self, phash: &Fingerprint) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let present = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM video_hashes WHERE phash = ?1)",
            params![phash.as_str()],
            |row| row.get(0),
        )?;
        Ok(present)
    }

    /// The record owning `phash`, if any.
    pub fn find(&self, phash: &Fingerprint) -> Result<Option<HashRecord>, StoreError> {
        let conn = self.connect()?;
        let record = conn
            .query_row(
                "SELECT video_name, frame_path, phash FROM video_hashes WHERE phash = ?1 LIMIT 1",
                params![phash.as_str()],
                HashRecord::from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// All records in insertion order, optionally limited to one video.
    pub fn records(&self, video_name: Option<&str>) -> Result<Vec<HashRecord>, StoreError> {
        let conn = self.connect()?;
        let records = match video_name {
            Some(name) => {
                let mut stmt = conn.prepare(
                    "SELECT video_name, frame_path, phash FROM video_hashes
                     WHERE video_name = ?1 ORDER BY rowid",
                )?;
                let rows = stmt.query_map(params![name], HashRecord::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT video_name, frame_path, phash FROM video_hashes ORDER BY rowid",
                )?;
                let rows = stmt.query_map([], HashRecord::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(records)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM video_hashes", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, HashStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = HashStore::open(temp_dir.path().join("hashes.db")).unwrap();
        (temp_dir, store)
    }

    fn batch(pairs: &[(&str, &str)]) -> Vec<(FrameRef, Fingerprint)> {
        pairs
            .iter()
            .map(|(frame, hash)| (FrameRef::from(*frame), Fingerprint::new(*hash)))
            .collect()
    }

    fn assert_unique(store: &HashStore) {
        let records = store.records(None).unwrap();
        let distinct: HashSet<_> = records.iter().map(|r| r.phash.clone()).collect();
        assert_eq!(distinct.len(), records.len());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (_temp_dir, store) = temp_store();
        store.initialize().unwrap();
        store.initialize().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("hashes.db");
        let store = HashStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
    }

    #[test]
    fn test_empty_store_has_no_duplicates() {
        let (_temp_dir, store) = temp_store();
        assert!(!store.check_duplicate(&Fingerprint::new("c3a1f0e0d0b09080")).unwrap());
        assert!(store.find(&Fingerprint::new("c3a1f0e0d0b09080")).unwrap().is_none());
    }

    #[test]
    fn test_store_then_check() {
        let (_temp_dir, store) = temp_store();
        let hashes = batch(&[
            ("frames/clip/frame_0.jpg", "aaaa000000000000"),
            ("frames/clip/frame_10.jpg", "bbbb000000000000"),
            ("frames/clip/frame_20.jpg", "cccc000000000000"),
        ]);

        store.store("clip", &hashes).unwrap();

        assert_eq!(store.count().unwrap(), 3);
        for (_, phash) in &hashes {
            assert!(store.check_duplicate(phash).unwrap());
        }
        assert!(!store.check_duplicate(&Fingerprint::new("dddd000000000000")).unwrap());
    }

    #[test]
    fn test_store_is_idempotent() {
        let (_temp_dir, store) = temp_store();
        let hashes = batch(&[("a/frame_0", "01"), ("a/frame_10", "02")]);

        store.store("a", &hashes).unwrap();
        let once = store.records(None).unwrap();
        store.store("a", &hashes).unwrap();
        let twice = store.records(None).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_phash_is_unique_across_videos() {
        let (_temp_dir, store) = temp_store();
        store.store("first", &batch(&[("first/frame_0", "ff00")])).unwrap();
        store
            .store("second", &batch(&[("second/frame_0", "ff00"), ("second/frame_10", "ff01")]))
            .unwrap();

        assert_eq!(store.count().unwrap(), 2);
        let owner = store.find(&Fingerprint::new("ff00")).unwrap().unwrap();
        assert_eq!(owner.video_name, "first");
        assert_eq!(owner.frame_path, "first/frame_0");
        assert_unique(&store);
    }

    #[test]
    fn test_repeated_hash_within_batch_stored_once() {
        let (_temp_dir, store) = temp_store();
        store
            .store("clip", &batch(&[("clip/frame_0", "abcd"), ("clip/frame_10", "abcd")]))
            .unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert_unique(&store);
    }

    #[test]
    fn test_earliest_frame_wins_repeated_hash() {
        let (_temp_dir, store) = temp_store();
        // frame_100 sorts before frame_20 as a string
        store
            .store("w", &batch(&[("w/frame_20", "ab"), ("w/frame_100", "ab")]))
            .unwrap();

        let owner = store.find(&Fingerprint::new("ab")).unwrap().unwrap();
        assert_eq!(owner.frame_path, "w/frame_20");
    }

    #[test]
    fn test_records_filtered_by_video() {
        let (_temp_dir, store) = temp_store();
        store.store("a", &batch(&[("a/frame_0", "01"), ("a/frame_10", "02")])).unwrap();
        store.store("b", &batch(&[("b/frame_0", "03")])).unwrap();

        let a = store.records(Some("a")).unwrap();
        assert_eq!(a.len(), 2);
        assert!(a.iter().all(|r| r.video_name == "a"));
        assert_eq!(store.records(Some("missing")).unwrap().len(), 0);
        assert_eq!(store.records(None).unwrap().len(), 3);
    }

    #[test]
    fn test_unique_index_rejects_direct_duplicate_insert() {
        let (_temp_dir, store) = temp_store();
        store.store("a", &batch(&[("a/frame_0", "01")])).unwrap();

        let conn = Connection::open(store.path()).unwrap();
        let result = conn.execute(
            "INSERT INTO video_hashes (video_name, frame_path, phash) VALUES ('b', 'b/frame_0', '01')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_legacy_file_with_duplicates_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE video_hashes (video_name TEXT, frame_path TEXT, phash TEXT);
                 INSERT INTO video_hashes VALUES ('a', 'a/frame_0', '01');
                 INSERT INTO video_hashes VALUES ('b', 'b/frame_0', '01');",
            )
            .unwrap();
        }

        let result = HashStore::open(&path);
        assert!(matches!(result, Err(StoreError::DuplicateRows(1))));
    }

    #[test]
    fn test_legacy_file_without_duplicates_is_upgraded() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE video_hashes (video_name TEXT, frame_path TEXT, phash TEXT);
                 INSERT INTO video_hashes VALUES ('a', 'a/frame_0', '01');",
            )
            .unwrap();
        }

        let store = HashStore::open(&path).unwrap();
        assert!(store.check_duplicate(&Fingerprint::new("01")).unwrap());
        store.store("b", &batch(&[("b/frame_0", "01")])).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_legacy_null_phashes_are_not_repeats() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE video_hashes (video_name TEXT, frame_path TEXT, phash TEXT);
                 INSERT INTO video_hashes VALUES ('a', 'a/frame_0', NULL);
                 INSERT INTO video_hashes VALUES ('a', 'a/frame_10', NULL);
                 INSERT INTO video_hashes VALUES ('b', 'b/frame_0', '01');",
            )
            .unwrap();
        }

        let store = HashStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 3);
        assert!(store.check_duplicate(&Fingerprint::new("01")).unwrap());
    }

    #[test]
    fn test_unwritable_location_fails() {
        let temp_dir = TempDir::new().unwrap();
        // A regular file cannot act as a parent directory
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"").unwrap();

        let store = HashStore::new(blocker.join("hashes.db"));
        assert!(store.initialize().is_err());
        assert!(store.store("a", &batch(&[("a/frame_0", "01")])).is_err());
    }

    #[test]
    fn test_concurrent_writers_keep_phash_unique() {
        let (_temp_dir, store) = temp_store();
        let store = Arc::new(store);
        let hashes: Vec<(FrameRef, Fingerprint)> = (0..50)
            .map(|i| (FrameRef::new(format!("v/frame_{}", i)), Fingerprint::new(format!("{:016x}", i))))
            .collect();
        let hashes = Arc::new(hashes);

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let store = Arc::clone(&store);
                let hashes = Arc::clone(&hashes);
                thread::spawn(move || store.store(&format!("worker{}", worker), &hashes))
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(store.count().unwrap(), 50);
        assert_unique(&store);
    }
}
