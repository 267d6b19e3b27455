//! Persistent storage for signature requests and sessions.
//!
//! The orchestrator only depends on the [`SignatureStore`] trait. The bundled
//! implementation uses SQLite with two tables:
//! - `signature_requests` keyed by request id
//! - `signature_sessions` keyed by session id, indexed by request id,
//!   status and provider correlation id for reconciliation sweeps

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

use crate::provider::ProviderId;
use crate::request::{SignatureRequest, SignatureStatus};
use crate::session::SignatureSession;
use crate::SigningError;

/// Record store used by the orchestrator.
pub trait SignatureStore: Send + Sync {
    /// Insert or replace a request.
    fn save_request(&self, request: &SignatureRequest) -> Result<(), SigningError>;

    fn get_request(&self, id: Uuid) -> Result<Option<SignatureRequest>, SigningError>;

    /// Insert or replace a session.
    fn save_session(&self, session: &SignatureSession) -> Result<(), SigningError>;

    fn get_session(&self, id: Uuid) -> Result<Option<SignatureSession>, SigningError>;

    /// All sessions opened for a request, oldest first.
    fn sessions_for_request(&self, request_id: Uuid) -> Result<Vec<SignatureSession>, SigningError>;

    /// Sessions whose mirrored status is one of `statuses`.
    fn sessions_with_status(
        &self,
        statuses: &[SignatureStatus],
    ) -> Result<Vec<SignatureSession>, SigningError>;

    /// Most recent session bound to a provider correlation id.
    fn find_session_by_correlation(
        &self,
        provider: &ProviderId,
        correlation_id: &str,
    ) -> Result<Option<SignatureSession>, SigningError>;
}

/// SQLite-backed [`SignatureStore`].
pub struct SqliteSignatureStore {
    conn: Mutex<Connection>,
}

impl SqliteSignatureStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SigningError> {
        let conn = Connection::open(path)
            .map_err(|e| SigningError::Storage(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, SigningError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            SigningError::Storage(format!("Failed to open in-memory database: {}", e))
        })?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SigningError> {
        self.conn
            .lock()
            .map_err(|e| SigningError::Storage(format!("Lock error: {}", e)))
    }

    fn init_schema(&self) -> Result<(), SigningError> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS signature_requests (
                id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                provider TEXT,
                correlation_id TEXT,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS signature_sessions (
                id TEXT PRIMARY KEY,
                request_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                status TEXT NOT NULL,
                correlation_id TEXT,
                created_at TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_request ON signature_sessions(request_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON signature_sessions(status);
            CREATE INDEX IF NOT EXISTS idx_sessions_correlation
                ON signature_sessions(provider, correlation_id);",
        )
        .map_err(|e| SigningError::Storage(format!("Failed to create schema: {}", e)))?;

        tracing::debug!("Signature store schema initialized");
        Ok(())
    }

    /// Number of stored requests.
    pub fn request_count(&self) -> Result<usize, SigningError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM signature_requests", [], |row| row.get(0))
            .map_err(|e| SigningError::Storage(format!("Query error: {}", e)))?;
        Ok(count as usize)
    }

    fn query_sessions(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<SignatureSession>, SigningError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| SigningError::Storage(format!("Query error: {}", e)))?;

        let rows = stmt
            .query_map(params, |row| row.get::<_, String>(0))
            .map_err(|e| SigningError::Storage(format!("Query error: {}", e)))?;

        let mut sessions = Vec::new();
        for row in rows {
            let data = row.map_err(|e| SigningError::Storage(format!("Row error: {}", e)))?;
            sessions.push(serde_json::from_str(&data)?);
        }
        Ok(sessions)
    }
}

impl SignatureStore for SqliteSignatureStore {
    fn save_request(&self, request: &SignatureRequest) -> Result<(), SigningError> {
        let data = serde_json::to_string(request)?;
        let conn = self.lock()?;

        conn.execute(
            "INSERT OR REPLACE INTO signature_requests
                (id, status, provider, correlation_id, data, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                request.id.to_string(),
                request.status.as_str(),
                request.provider.as_ref().map(|p| p.as_str().to_string()),
                request.correlation_id,
                data,
                chrono::Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| SigningError::Storage(format!("Failed to save request: {}", e)))?;

        tracing::debug!(request_id = %request.id, status = %request.status, "Saved signature request");
        Ok(())
    }

    fn get_request(&self, id: Uuid) -> Result<Option<SignatureRequest>, SigningError> {
        let conn = self.lock()?;

        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM signature_requests WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SigningError::Storage(format!("Query error: {}", e)))?;

        data.map(|d| serde_json::from_str(&d).map_err(SigningError::from))
            .transpose()
    }

    fn save_session(&self, session: &SignatureSession) -> Result<(), SigningError> {
        let data = serde_json::to_string(session)?;
        let conn = self.lock()?;

        conn.execute(
            "INSERT OR REPLACE INTO signature_sessions
                (id, request_id, provider, status, correlation_id, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.session_id.to_string(),
                session.request_id.to_string(),
                session.provider.as_str(),
                session.status.as_str(),
                session.correlation_id,
                session.created_at.to_rfc3339(),
                data,
            ],
        )
        .map_err(|e| SigningError::Storage(format!("Failed to save session: {}", e)))?;

        tracing::debug!(
            session_id = %session.session_id,
            status = %session.status,
            "Saved signature session"
        );
        Ok(())
    }

    fn get_session(&self, id: Uuid) -> Result<Option<SignatureSession>, SigningError> {
        let conn = self.lock()?;
        let mut sessions = Self::query_sessions(
            &conn,
            "SELECT data FROM signature_sessions WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(sessions.pop())
    }

    fn sessions_for_request(&self, request_id: Uuid) -> Result<Vec<SignatureSession>, SigningError> {
        let conn = self.lock()?;
        Self::query_sessions(
            &conn,
            "SELECT data FROM signature_sessions WHERE request_id = ?1 ORDER BY created_at, rowid",
            params![request_id.to_string()],
        )
    }

    fn sessions_with_status(
        &self,
        statuses: &[SignatureStatus],
    ) -> Result<Vec<SignatureSession>, SigningError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT data FROM signature_sessions WHERE status IN ({}) ORDER BY created_at, rowid",
            placeholders
        );

        let conn = self.lock()?;
        Self::query_sessions(&conn, &sql, params_from_iter(statuses.iter().map(|s| s.as_str())))
    }

    fn find_session_by_correlation(
        &self,
        provider: &ProviderId,
        correlation_id: &str,
    ) -> Result<Option<SignatureSession>, SigningError> {
        let conn = self.lock()?;
        let mut sessions = Self::query_sessions(
            &conn,
            "SELECT data FROM signature_sessions
             WHERE provider = ?1 AND correlation_id = ?2
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            params![provider.as_str(), correlation_id],
        )?;
        Ok(sessions.pop())
    }
}
