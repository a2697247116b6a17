use std::path::PathBuf;

use heart_common::audit::{AuditStore, FileAuditStore, SqliteAuditStore};
use heart_common::openai::OpenAiClientConfig;
use heart_common::polling::PollPolicy;

use crate::error::AppError;

const DEFAULT_ASSISTANT_ID: &str = "asst_qCeKG8yoFLKfbwQANHV28xNX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditBackend {
    Sqlite(PathBuf),
    File(PathBuf),
    Disabled,
}

impl AuditBackend {
    pub fn parse(kind: &str, db_path: &str, file_path: &str) -> Result<Self, AppError> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "" | "sqlite" => Ok(Self::Sqlite(PathBuf::from(db_path))),
            "file" | "jsonl" => Ok(Self::File(PathBuf::from(file_path))),
            "none" | "off" | "disabled" => Ok(Self::Disabled),
            other => Err(AppError::Config(format!(
                "unknown HEART_AUDIT_BACKEND {other:?} (expected sqlite, file or none)"
            ))),
        }
    }

    pub fn open(&self) -> Result<AuditStore, AppError> {
        Ok(match self {
            Self::Sqlite(path) => AuditStore::Sqlite(SqliteAuditStore::open(path)?),
            Self::File(path) => AuditStore::File(FileAuditStore::new(path)),
            Self::Disabled => AuditStore::Disabled,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub assistant_id: String,
    pub openai: OpenAiClientConfig,
    pub poll: PollPolicy,
    pub audit: AuditBackend,
}

impl Config {
    /// Required:
    /// - `OPENAI_API_KEY`
    ///
    /// Optional:
    /// - `OPENAI_ASSISTANT_ID` (default: the HEART assistant)
    /// - `OPENAI_BASE_URL`, `OPENAI_TIMEOUT_SECS`, `OPENAI_MAX_ERROR_BODY_BYTES`
    /// - `HEART_LISTEN_ADDR` (default: "0.0.0.0:5000")
    /// - `HEART_POLL_INTERVAL_MS`, `HEART_POLL_TIMEOUT_SECS`
    /// - `HEART_AUDIT_BACKEND` (sqlite | file | none, default: sqlite)
    /// - `HEART_AUDIT_DB` (default: "heart_audit.db")
    /// - `HEART_AUDIT_FILE` (default: "heart_audit.jsonl")
    pub fn from_env() -> Result<Self, AppError> {
        let openai = OpenAiClientConfig::from_env();
        if openai.api_key.is_empty() {
            return Err(AppError::Config(
                "OPENAI_API_KEY environment variable is required".to_string(),
            ));
        }

        let assistant_id = std::env::var("OPENAI_ASSISTANT_ID")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_ASSISTANT_ID.to_string());

        let listen_addr =
            std::env::var("HEART_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());

        let audit = AuditBackend::parse(
            &std::env::var("HEART_AUDIT_BACKEND").unwrap_or_default(),
            &std::env::var("HEART_AUDIT_DB").unwrap_or_else(|_| "heart_audit.db".to_string()),
            &std::env::var("HEART_AUDIT_FILE").unwrap_or_else(|_| "heart_audit.jsonl".to_string()),
        )?;

        Ok(Self {
            listen_addr,
            assistant_id,
            openai,
            poll: PollPolicy::from_env(),
            audit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_backend_parsing() {
        assert_eq!(
            AuditBackend::parse("", "a.db", "a.jsonl").unwrap(),
            AuditBackend::Sqlite(PathBuf::from("a.db"))
        );
        assert_eq!(
            AuditBackend::parse(" File ", "a.db", "a.jsonl").unwrap(),
            AuditBackend::File(PathBuf::from("a.jsonl"))
        );
        assert_eq!(
            AuditBackend::parse("none", "a.db", "a.jsonl").unwrap(),
            AuditBackend::Disabled
        );
        assert!(matches!(
            AuditBackend::parse("postgres", "a.db", "a.jsonl"),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn open_creates_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        let store = AuditBackend::Sqlite(path.clone()).open().unwrap();
        assert_eq!(store.backend(), "sqlite");
        assert!(path.exists());
    }
}
