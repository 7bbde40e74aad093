use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::limits::MAX_ROWS_PER_FETCH;
use crate::model::FilterSet;
use crate::rows::{filter_rows, Row};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError(pub String);

impl SourceError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query source: {}", self.0)
    }
}

impl std::error::Error for SourceError {}

/// The read side of the external service: flat rows for a filter set.
#[async_trait]
pub trait QuerySource: Send + Sync {
    async fn fetch(&self, filters: &FilterSet) -> Result<Vec<Row>, SourceError>;
}

/// Reads a JSON array of rows from disk on every fetch and narrows it to
/// the requested filters.
pub struct JsonRowsSource {
    path: PathBuf,
}

impl JsonRowsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl QuerySource for JsonRowsSource {
    async fn fetch(&self, filters: &FilterSet) -> Result<Vec<Row>, SourceError> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|e| SourceError::new(format!("{}: {e}", self.path.display())))?;
        let rows: Vec<Row> = serde_json::from_slice(&raw)
            .map_err(|e| SourceError::new(format!("{}: {e}", self.path.display())))?;
        if rows.len() > MAX_ROWS_PER_FETCH {
            return Err(SourceError::new(format!("{} rows exceeds the fetch limit", rows.len())));
        }
        let total = rows.len();
        let rows = filter_rows(rows, filters);
        debug!(path = %self.path.display(), total, kept = rows.len(), "rows loaded");
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn scratch(name: &str, body: &str) -> PathBuf {
        static SEQ: AtomicUsize = AtomicUsize::new(0);
        let n = SEQ.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("planline-{}-{n}-{name}", std::process::id()));
        std::fs::write(&path, body).unwrap();
        path
    }

    const ROWS: &str = r#"[
        {"type": "department", "id": "01HZ0000000000000000000001", "name": "Design"},
        {"type": "team", "id": "01HZ0000000000000000000002", "department_id": "01HZ0000000000000000000001", "name": "Structures"},
        {"type": "employee", "id": "01HZ0000000000000000000003", "team_id": "01HZ0000000000000000000002", "name": "Ada", "employment_rate": 1.0},
        {"type": "calendar_event", "date": "2024-01-08T00:00:00", "kind": "Holiday"}
    ]"#;

    #[tokio::test]
    async fn reads_rows_from_disk() {
        let path = scratch("rows.json", ROWS);
        let source = JsonRowsSource::new(&path);
        let rows = source.fetch(&FilterSet::default()).await.unwrap();
        assert_eq!(rows.len(), 4);
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn missing_file_is_source_error() {
        let source = JsonRowsSource::new(std::env::temp_dir().join("planline-definitely-missing.json"));
        let err = source.fetch(&FilterSet::default()).await.unwrap_err();
        assert!(err.to_string().starts_with("query source:"));
    }

    #[tokio::test]
    async fn malformed_json_is_source_error() {
        let path = scratch("bad.json", "[{\"type\": \"nope\"}]");
        let source = JsonRowsSource::new(&path);
        assert!(source.fetch(&FilterSet::default()).await.is_err());
        std::fs::remove_file(path).ok();
    }
}
