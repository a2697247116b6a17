/// Error types shared by the HEART service crates.
///
/// These cover infrastructure failures (audit storage, flat-file I/O, JSON encoding).
/// Application-specific errors are defined in the server crate and wrap `CommonError`
/// via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("audit file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("audit storage task failed: {0}")]
    Task(String),

    #[error("could not allocate a unique case id after {attempts} attempts")]
    CaseIdExhausted { attempts: u32 },
}
