//! Mastery ledger implementations.
//!
//! [`FileLedger`] keeps one small JSON file per key and replaces it with a
//! write-to-temp-then-rename, so a write for one term can never clobber a
//! different term's record, even when several processes share the
//! directory. [`MemoryLedger`] is the in-process equivalent for tests and
//! throwaway runs.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::error::PersistenceError;
use crate::model::{LoginRecord, MasteryRecord, StudentId};
use crate::sampling::fnv1a;
use crate::traits::{LedgerSnapshot, MasteryLedger};

type MasteryKey = (StudentId, String, String);

/// Apply an upsert to an existing record: mastered stays true and the
/// timestamp never moves backwards.
fn upsert(
    existing: Option<MasteryRecord>,
    student: &StudentId,
    unit: &str,
    term: &str,
    timestamp: DateTime<Utc>,
) -> MasteryRecord {
    match existing {
        Some(mut record) => {
            record.mastered = true;
            record.timestamp = record.timestamp.max(timestamp);
            record
        }
        None => MasteryRecord {
            student: student.clone(),
            unit: unit.to_string(),
            term: term.to_string(),
            mastered: true,
            timestamp,
        },
    }
}

// ---------------------------------------------------------------------------
// In-memory ledger
// ---------------------------------------------------------------------------

/// Ledger held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: RwLock<BTreeMap<MasteryKey, MasteryRecord>>,
    logins: RwLock<BTreeMap<StudentId, LoginRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mastery records stored.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MasteryLedger for MemoryLedger {
    async fn record_mastery(
        &self,
        student: &StudentId,
        unit: &str,
        term: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<MasteryRecord, PersistenceError> {
        let key = (student.clone(), unit.to_string(), term.to_string());
        let mut records = self.records.write().await;
        let record = upsert(records.remove(&key), student, unit, term, timestamp);
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn mastered_terms(
        &self,
        student: &StudentId,
        unit: &str,
    ) -> Result<BTreeSet<String>, PersistenceError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.student == *student && r.unit == unit && r.mastered)
            .map(|r| r.term.clone())
            .collect())
    }

    async fn all_records(
        &self,
        student: &StudentId,
    ) -> Result<BTreeMap<(String, String), MasteryRecord>, PersistenceError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.student == *student)
            .map(|r| ((r.unit.clone(), r.term.clone()), r.clone()))
            .collect())
    }

    async fn record_login(
        &self,
        student: &StudentId,
        timestamp: DateTime<Utc>,
    ) -> Result<LoginRecord, PersistenceError> {
        let record = LoginRecord {
            student: student.clone(),
            last_login: timestamp,
        };
        self.logins
            .write()
            .await
            .insert(student.clone(), record.clone());
        Ok(record)
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot, PersistenceError> {
        Ok(LedgerSnapshot {
            records: self.records.read().await.values().cloned().collect(),
            logins: self.logins.read().await.values().cloned().collect(),
        })
    }
}

// ---------------------------------------------------------------------------
// File-backed ledger
// ---------------------------------------------------------------------------

const LOGIN_FILE: &str = "login.json";
const MASTERY_DIR: &str = "mastery";

/// Longest encoded name kept readable on disk. With the hash suffix and
/// `.json` a component stays well under the common 255-byte limit.
const MAX_PLAIN_COMPONENT: usize = 120;

/// Ledger stored as one JSON file per key under a root directory:
///
/// ```text
/// <root>/<block>/<first>+<last>/login.json
/// <root>/<block>/<first>+<last>/mastery/<unit>/<term>.json
/// ```
///
/// Every record carries its full key, so readers never decode paths.
#[derive(Debug)]
pub struct FileLedger {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileLedger {
    /// Open (creating if needed) a ledger rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| io_error(&root, e))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn student_dir(&self, student: &StudentId) -> PathBuf {
        self.root.join(component(&student.block)).join(format!(
            "{}+{}",
            component(&student.first_name),
            component(&student.last_name)
        ))
    }

    fn unit_dir(&self, student: &StudentId, unit: &str) -> PathBuf {
        self.student_dir(student)
            .join(MASTERY_DIR)
            .join(component(unit))
    }

    fn record_path(&self, student: &StudentId, unit: &str, term: &str) -> PathBuf {
        self.unit_dir(student, unit)
            .join(format!("{}.json", component(term)))
    }
}

/// File name for one key part.
///
/// Percent-encoding (dots included) makes any name safe, and never emits
/// `+` or `@`. Names with uppercase letters, or too long once encoded, get a
/// lower-cased prefix plus `@` and a hash of the exact name, so they stay
/// distinct on case-insensitive filesystems and within name length limits.
fn component(raw: &str) -> String {
    let encoded = urlencoding::encode(raw).replace('.', "%2E");
    if encoded.len() <= MAX_PLAIN_COMPONENT && !raw.chars().any(char::is_uppercase) {
        return encoded;
    }
    let mut prefix = encoded.to_ascii_lowercase();
    prefix.truncate(MAX_PLAIN_COMPONENT);
    format!("{prefix}@{:016x}", fnv1a(raw.as_bytes()))
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.display().to_string(),
        source,
    }
}

async fn blocking<T, F>(f: F) -> Result<T, PersistenceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PersistenceError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PersistenceError::Unavailable(format!("ledger task failed: {e}")))?
}

/// Read and decode one JSON record; a missing file is `None`.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistenceError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(io_error(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| PersistenceError::Corrupt {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}

/// Replace `path` atomically: write a temp file beside it, flush, rename.
fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let parent = path
        .parent()
        .ok_or_else(|| PersistenceError::Unavailable(format!("no parent for {}", path.display())))?;
    std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;

    let json = serde_json::to_vec_pretty(value).map_err(|e| PersistenceError::Corrupt {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| io_error(parent, e))?;
    tmp.write_all(&json).map_err(|e| io_error(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| io_error(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| io_error(path, e.error))?;
    Ok(())
}

/// JSON files directly inside `dir`; a missing directory is empty.
fn json_files(dir: &Path) -> Result<Vec<PathBuf>, PersistenceError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(dir, e)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| io_error(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Subdirectories of `dir`; a missing directory is empty.
fn subdirs(dir: &Path) -> Result<Vec<PathBuf>, PersistenceError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(dir, e)),
    };
    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| io_error(dir, e))?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn read_student_records(student_dir: &Path) -> Result<Vec<MasteryRecord>, PersistenceError> {
    let mut records = Vec::new();
    for unit_dir in subdirs(&student_dir.join(MASTERY_DIR))? {
        for file in json_files(&unit_dir)? {
            if let Some(record) = read_json::<MasteryRecord>(&file)? {
                records.push(record);
            }
        }
    }
    Ok(records)
}

#[async_trait]
impl MasteryLedger for FileLedger {
    async fn record_mastery(
        &self,
        student: &StudentId,
        unit: &str,
        term: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<MasteryRecord, PersistenceError> {
        let path = self.record_path(student, unit, term);
        let (student, unit, term) = (student.clone(), unit.to_string(), term.to_string());

        let _guard = self.write_lock.lock().await;
        blocking(move || {
            let existing = read_json::<MasteryRecord>(&path)?;
            let record = upsert(existing, &student, &unit, &term, timestamp);
            write_json_atomic(&path, &record)?;
            Ok(record)
        })
        .await
    }

    async fn mastered_terms(
        &self,
        student: &StudentId,
        unit: &str,
    ) -> Result<BTreeSet<String>, PersistenceError> {
        let unit_dir = self.unit_dir(student, unit);
        let unit = unit.to_string();
        blocking(move || {
            let mut terms = BTreeSet::new();
            for file in json_files(&unit_dir)? {
                if let Some(record) = read_json::<MasteryRecord>(&file)? {
                    if record.mastered && record.unit == unit {
                        terms.insert(record.term);
                    }
                }
            }
            Ok(terms)
        })
        .await
    }

    async fn all_records(
        &self,
        student: &StudentId,
    ) -> Result<BTreeMap<(String, String), MasteryRecord>, PersistenceError> {
        let student_dir = self.student_dir(student);
        blocking(move || {
            Ok(read_student_records(&student_dir)?
                .into_iter()
                .map(|r| ((r.unit.clone(), r.term.clone()), r))
                .collect())
        })
        .await
    }

    async fn record_login(
        &self,
        student: &StudentId,
        timestamp: DateTime<Utc>,
    ) -> Result<LoginRecord, PersistenceError> {
        let path = self.student_dir(student).join(LOGIN_FILE);
        let record = LoginRecord {
            student: student.clone(),
            last_login: timestamp,
        };

        let _guard = self.write_lock.lock().await;
        blocking(move || {
            write_json_atomic(&path, &record)?;
            Ok(record)
        })
        .await
    }

    async fn snapshot(&self) -> Result<LedgerSnapshot, PersistenceError> {
        let root = self.root.clone();
        blocking(move || {
            let mut snapshot = LedgerSnapshot::default();
            for block_dir in subdirs(&root)? {
                for student_dir in subdirs(&block_dir)? {
                    if let Some(login) = read_json::<LoginRecord>(&student_dir.join(LOGIN_FILE))? {
                        snapshot.logins.push(login);
                    }
                    snapshot.records.extend(read_student_records(&student_dir)?);
                }
            }
            Ok(snapshot)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, hour, 0, 0).unwrap()
    }

    fn student(first: &str, last: &str, block: &str) -> StudentId {
        StudentId {
            first_name: first.into(),
            last_name: last.into(),
            block: block.into(),
        }
    }

    fn ada() -> StudentId {
        student("Ada", "Lovelace", "First")
    }

    async fn idempotent_upsert(ledger: &dyn MasteryLedger) {
        ledger
            .record_mastery(&ada(), "Unit 1", "doctrine", at(9))
            .await
            .unwrap();
        ledger
            .record_mastery(&ada(), "Unit 1", "doctrine", at(11))
            .await
            .unwrap();

        let all = ledger.all_records(&ada()).await.unwrap();
        assert_eq!(all.len(), 1);
        let record = &all[&("Unit 1".to_string(), "doctrine".to_string())];
        assert!(record.mastered);
        assert_eq!(record.timestamp, at(11));

        // an older re-affirmation never moves the timestamp back
        let record = ledger
            .record_mastery(&ada(), "Unit 1", "doctrine", at(7))
            .await
            .unwrap();
        assert_eq!(record.timestamp, at(11));
    }

    async fn keys_are_independent(ledger: &dyn MasteryLedger) {
        ledger
            .record_mastery(&ada(), "Unit 1", "doctrine", at(9))
            .await
            .unwrap();
        ledger
            .record_mastery(&student("Ada", "Lovelace", "Second"), "Unit 1", "tariff", at(9))
            .await
            .unwrap();
        ledger
            .record_mastery(&student("Grace", "Hopper", "First"), "Unit 1", "tariff", at(9))
            .await
            .unwrap();

        let mastered = ledger.mastered_terms(&ada(), "Unit 1").await.unwrap();
        assert_eq!(mastered, BTreeSet::from(["doctrine".to_string()]));
        assert!(ledger
            .mastered_terms(&ada(), "Unit 2")
            .await
            .unwrap()
            .is_empty());
    }

    async fn name_split_is_part_of_the_key(ledger: &dyn MasteryLedger) {
        let mary_ann = student("Mary Ann", "Smith", "First");
        let mary = student("Mary", "Ann Smith", "First");
        assert_eq!(mary_ann.display_name(), mary.display_name());

        ledger
            .record_mastery(&mary_ann, "Unit 1", "doctrine", at(9))
            .await
            .unwrap();
        ledger.record_login(&mary_ann, at(8)).await.unwrap();
        ledger.record_login(&mary, at(10)).await.unwrap();

        assert!(ledger.mastered_terms(&mary, "Unit 1").await.unwrap().is_empty());
        assert!(ledger.all_records(&mary).await.unwrap().is_empty());
        assert_eq!(ledger.all_records(&mary_ann).await.unwrap().len(), 1);

        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(snapshot.logins.len(), 2);
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].student, mary_ann);
    }

    #[tokio::test]
    async fn memory_ledger_is_idempotent() {
        let ledger = MemoryLedger::new();
        idempotent_upsert(&ledger).await;
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn memory_ledger_keys_are_independent() {
        keys_are_independent(&MemoryLedger::new()).await;
    }

    #[tokio::test]
    async fn memory_ledger_keeps_first_and_last_name_apart() {
        name_split_is_part_of_the_key(&MemoryLedger::new()).await;
    }

    #[tokio::test]
    async fn file_ledger_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path()).unwrap();
        idempotent_upsert(&ledger).await;
        assert_eq!(ledger.snapshot().await.unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn file_ledger_keys_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        keys_are_independent(&FileLedger::open(dir.path()).unwrap()).await;
    }

    #[tokio::test]
    async fn file_ledger_keeps_first_and_last_name_apart() {
        let dir = tempfile::tempdir().unwrap();
        name_split_is_part_of_the_key(&FileLedger::open(dir.path()).unwrap()).await;
    }

    #[tokio::test]
    async fn file_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = FileLedger::open(dir.path()).unwrap();
            ledger
                .record_mastery(&ada(), "Unit 1", "doctrine", at(9))
                .await
                .unwrap();
            ledger.record_login(&ada(), at(8)).await.unwrap();
        }
        let ledger = FileLedger::open(dir.path()).unwrap();
        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.logins.len(), 1);
        assert_eq!(snapshot.logins[0].last_login, at(8));
        assert_eq!(snapshot.logins[0].student, ada());
    }

    #[tokio::test]
    async fn file_ledger_handles_awkward_names() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path()).unwrap();
        for term in ["..", "a/b", "U.S. Constitution", "naïve"] {
            ledger
                .record_mastery(&ada(), "Unit 1", term, at(9))
                .await
                .unwrap();
        }
        let mastered = ledger.mastered_terms(&ada(), "Unit 1").await.unwrap();
        assert_eq!(mastered.len(), 4);
        assert!(mastered.contains("a/b"));
        assert!(mastered.contains(".."));
    }

    #[tokio::test]
    async fn file_ledger_handles_long_non_ascii_names() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path()).unwrap();
        let long_term = "é".repeat(200);
        let long_unit = "Ünité ".repeat(40);

        ledger
            .record_mastery(&ada(), &long_unit, &long_term, at(9))
            .await
            .unwrap();

        let mastered = ledger.mastered_terms(&ada(), &long_unit).await.unwrap();
        assert_eq!(mastered, BTreeSet::from([long_term.clone()]));
        let path = ledger.record_path(&ada(), &long_unit, &long_term);
        for part in path.strip_prefix(dir.path()).unwrap().components() {
            assert!(part.as_os_str().len() < 255);
        }
    }

    #[tokio::test]
    async fn file_ledger_terms_differing_only_in_case_use_distinct_files() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path()).unwrap();
        ledger
            .record_mastery(&ada(), "Unit 1", "Tariff", at(9))
            .await
            .unwrap();
        ledger
            .record_mastery(&ada(), "Unit 1", "tariff", at(9))
            .await
            .unwrap();

        let upper = ledger.record_path(&ada(), "Unit 1", "Tariff");
        let lower = ledger.record_path(&ada(), "Unit 1", "tariff");
        let folded = |p: &Path| p.to_string_lossy().to_lowercase();
        assert_ne!(folded(upper.as_path()), folded(lower.as_path()));

        let mastered = ledger.mastered_terms(&ada(), "Unit 1").await.unwrap();
        assert_eq!(mastered.len(), 2);
    }

    #[test]
    fn plain_names_stay_readable() {
        assert_eq!(component("doctrine"), "doctrine");
        assert_eq!(component("a b.c"), "a%20b%2Ec");
        assert!(component("Unit 1").starts_with("unit%201@"));
        assert_ne!(component("Unit 1"), component("UNIT 1"));
    }

    #[tokio::test]
    async fn file_ledger_login_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path()).unwrap();
        ledger.record_login(&ada(), at(8)).await.unwrap();
        ledger.record_login(&ada(), at(10)).await.unwrap();
        let snapshot = ledger.snapshot().await.unwrap();
        assert_eq!(snapshot.logins.len(), 1);
        assert_eq!(snapshot.logins[0].last_login, at(10));
        assert!(snapshot.records.is_empty());
    }

    #[tokio::test]
    async fn file_ledger_corrupt_record_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::open(dir.path()).unwrap();
        ledger
            .record_mastery(&ada(), "Unit 1", "doctrine", at(9))
            .await
            .unwrap();
        let path = ledger.record_path(&ada(), "Unit 1", "doctrine");
        std::fs::write(&path, "{ not json").unwrap();

        let err = ledger.mastered_terms(&ada(), "Unit 1").await.unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_distinct_terms_all_persist() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(FileLedger::open(dir.path()).unwrap());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move {
                    ledger
                        .record_mastery(&ada(), "Unit 1", &format!("term-{i}"), at(9))
                        .await
                })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        // a second handle on the same directory sees every write
        let other = FileLedger::open(dir.path()).unwrap();
        let mastered = other.mastered_terms(&ada(), "Unit 1").await.unwrap();
        assert_eq!(mastered.len(), 16);
    }

    #[tokio::test]
    async fn concurrent_distinct_terms_memory() {
        let ledger = MemoryLedger::new();
        let student = ada();
        let (a, b) = tokio::join!(
            ledger.record_mastery(&student, "Unit 1", "doctrine", at(9)),
            ledger.record_mastery(&student, "Unit 1", "tariff", at(9)),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(ledger.len().await, 2);
    }
}
