//! Audit trail of completed assessments.
//!
//! Backends:
//! - `Sqlite`: `audit_logs` table, one row per case, `ai_response` holds JSON
//! - `File`: JSON Lines flat file, one record per line, appended
//! - `Disabled`: case ids are still issued but nothing is stored
//!
//! Case ids are `H` followed by six random digits and are unique within a store.
//! Blocking storage work runs on the tokio blocking pool.
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CommonError;
use crate::sections::SectionMap;

const MAX_CASE_ID_ATTEMPTS: u32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub case_id: String,
    pub timestamp: String,
    pub clinical_context: String,
    pub clinical_question: String,
    pub response: String,
    pub sections: SectionMap,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    /// Client-reported time of the assessment; defaults to the storage time.
    pub timestamp: Option<String>,
    pub clinical_context: String,
    pub clinical_question: String,
    pub response: String,
    pub sections: SectionMap,
}

impl NewAuditRecord {
    fn into_record(self, case_id: String, created_at: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            case_id,
            timestamp: self
                .timestamp
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| created_at.to_rfc3339()),
            clinical_context: self.clinical_context,
            clinical_question: self.clinical_question,
            response: self.response,
            sections: self.sections,
            created_at,
        }
    }
}

/// JSON stored in the `ai_response` column.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    sections: SectionMap,
}

pub fn generate_case_id<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("H{}", rng.gen_range(100_000..=999_999))
}

/// A fresh case id that is not checked against any store.
pub fn new_case_id() -> String {
    generate_case_id(&mut rand::thread_rng())
}

fn unique_case_id(mut taken: impl FnMut(&str) -> Result<bool, CommonError>) -> Result<String, CommonError> {
    let mut rng = rand::thread_rng();
    for _ in 0..MAX_CASE_ID_ATTEMPTS {
        let candidate = generate_case_id(&mut rng);
        if !taken(&candidate)? {
            return Ok(candidate);
        }
    }
    Err(CommonError::CaseIdExhausted {
        attempts: MAX_CASE_ID_ATTEMPTS,
    })
}

pub enum AuditStore {
    Sqlite(SqliteAuditStore),
    File(FileAuditStore),
    Disabled,
}

impl AuditStore {
    pub fn backend(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::File(_) => "file",
            Self::Disabled => "none",
        }
    }

    pub async fn record(&self, new: NewAuditRecord) -> Result<AuditRecord, CommonError> {
        let record = match self {
            Self::Sqlite(store) => store.record(new).await?,
            Self::File(store) => store.record(new).await?,
            Self::Disabled => new.into_record(new_case_id(), Utc::now()),
        };
        info!(case_id = %record.case_id, backend = self.backend(), "assessment recorded");
        Ok(record)
    }

    /// All stored records, newest first.
    pub async fn list(&self) -> Result<Vec<AuditRecord>, CommonError> {
        match self {
            Self::Sqlite(store) => store.list().await,
            Self::File(store) => store.list().await,
            Self::Disabled => Ok(Vec::new()),
        }
    }
}

#[derive(Clone)]
pub struct SqliteAuditStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAuditStore {
    pub fn open(path: &Path) -> Result<Self, CommonError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, CommonError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CommonError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                case_id TEXT UNIQUE,
                clinical_context TEXT,
                clinical_question TEXT,
                ai_response TEXT,
                timestamp TEXT,
                created_at TEXT
            )",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CommonError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CommonError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| CommonError::Task("sqlite connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| CommonError::Task(e.to_string()))?
    }

    pub async fn record(&self, new: NewAuditRecord) -> Result<AuditRecord, CommonError> {
        self.with_conn(move |conn| {
            let case_id = unique_case_id(|candidate| {
                let existing: Option<String> = conn
                    .query_row(
                        "SELECT case_id FROM audit_logs WHERE case_id = ?1",
                        params![candidate],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(existing.is_some())
            })?;

            let record = new.into_record(case_id, Utc::now());
            let stored = serde_json::to_string(&StoredResponse {
                response: record.response.clone(),
                sections: record.sections.clone(),
            })?;
            conn.execute(
                "INSERT INTO audit_logs (case_id, clinical_context, clinical_question, ai_response, timestamp, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.case_id,
                    record.clinical_context,
                    record.clinical_question,
                    stored,
                    record.timestamp,
                    record.created_at,
                ],
            )?;
            Ok(record)
        })
        .await
    }

    pub async fn list(&self) -> Result<Vec<AuditRecord>, CommonError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT case_id, clinical_context, clinical_question, ai_response, timestamp, created_at
                 FROM audit_logs ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt.query_map([], |row| {
                let raw: String = row.get(3)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    raw,
                    row.get::<_, String>(4)?,
                    row.get::<_, DateTime<Utc>>(5)?,
                ))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (case_id, clinical_context, clinical_question, raw, timestamp, created_at) = row?;
                let stored = serde_json::from_str::<StoredResponse>(&raw).unwrap_or_else(|e| {
                    warn!(error = %e, case_id = %case_id, "stored ai_response is not valid JSON, keeping raw text");
                    StoredResponse {
                        response: raw.clone(),
                        sections: SectionMap::new(),
                    }
                });
                records.push(AuditRecord {
                    case_id,
                    timestamp,
                    clinical_context,
                    clinical_question,
                    response: stored.response,
                    sections: stored.sections,
                    created_at,
                });
            }
            Ok(records)
        })
        .await
    }
}

#[derive(Clone)]
pub struct FileAuditStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl FileAuditStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn record(&self, new: NewAuditRecord) -> Result<AuditRecord, CommonError> {
        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);
        tokio::task::spawn_blocking(move || {
            let _guard = lock
                .lock()
                .map_err(|_| CommonError::Task("audit file lock poisoned".to_string()))?;
            let taken: HashSet<String> = read_records(&path)?
                .into_iter()
                .map(|r| r.case_id)
                .collect();
            let case_id = unique_case_id(|candidate| Ok(taken.contains(candidate)))?;
            let record = new.into_record(case_id, Utc::now());

            let mut line = serde_json::to_string(&record)?;
            line.push('\n');
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(line.as_bytes())?;
            Ok(record)
        })
        .await
        .map_err(|e| CommonError::Task(e.to_string()))?
    }

    pub async fn list(&self) -> Result<Vec<AuditRecord>, CommonError> {
        let path = self.path.clone();
        let lock = Arc::clone(&self.lock);
        tokio::task::spawn_blocking(move || {
            let _guard = lock
                .lock()
                .map_err(|_| CommonError::Task("audit file lock poisoned".to_string()))?;
            let mut records = read_records(&path)?;
            records.reverse();
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(records)
        })
        .await
        .map_err(|e| CommonError::Task(e.to_string()))?
    }
}

fn read_records(path: &Path) -> Result<Vec<AuditRecord>, CommonError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                error = %e,
                line_number = idx + 1,
                path = %path.display(),
                "skipping malformed audit line"
            ),
        }
    }
    Ok(records)
}
