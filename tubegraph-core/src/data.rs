use crate::error::{StoreError, StoreResult};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tubegraph_crawler::{CrawlCheckpoint, NodeId};

/// Crawl session persistence. Each completed BFS level is stored as a
/// checkpoint; the latest one wins.
pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(SessionStatus::Running),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            "failed" => Ok(SessionStatus::Failed),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// Crawl parameters recorded with a session so it can be resumed alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub max_depth: usize,
    pub workers: usize,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: SessionStatus,
    pub seeds: Vec<NodeId>,
    pub configuration: Option<SessionConfig>,
    /// Level of the latest checkpoint, if any was stored.
    pub checkpoint_level: Option<usize>,
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Database {
    pub fn new(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS crawl_sessions (
                id TEXT PRIMARY KEY,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'cancelled', 'failed')),
                seeds TEXT NOT NULL,      -- JSON array of video ids
                configuration TEXT        -- JSON SessionConfig
            );

            CREATE TABLE IF NOT EXISTS checkpoints (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                level INTEGER NOT NULL,
                visited TEXT NOT NULL,    -- JSON array of video ids
                edges TEXT NOT NULL,      -- JSON array of edge records
                created_at INTEGER NOT NULL,
                FOREIGN KEY(session_id) REFERENCES crawl_sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON checkpoints(session_id, id);
            ",
        )?;
        Ok(())
    }

    pub fn create_session(
        &self,
        seeds: &[NodeId],
        configuration: Option<&SessionConfig>,
    ) -> StoreResult<String> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let seeds_json = serde_json::to_string(seeds)?;
        let config_json = configuration.map(serde_json::to_string).transpose()?;

        self.conn.execute(
            "INSERT INTO crawl_sessions (id, start_time, status, seeds, configuration) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &session_id,
                current_timestamp(),
                SessionStatus::Running.as_str(),
                seeds_json,
                config_json
            ],
        )?;

        Ok(session_id)
    }

    pub fn save_checkpoint(&self, session_id: &str, checkpoint: &CrawlCheckpoint) -> StoreResult<()> {
        let mut visited: Vec<&NodeId> = checkpoint.visited.iter().collect();
        visited.sort();

        self.conn.execute(
            "INSERT INTO checkpoints (session_id, level, visited, edges, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                checkpoint.level as i64,
                serde_json::to_string(&visited)?,
                serde_json::to_string(&checkpoint.edges)?,
                current_timestamp()
            ],
        )?;
        Ok(())
    }

    /// Latest checkpoint of a session, `None` when none was stored yet.
    pub fn load_checkpoint(&self, session_id: &str) -> StoreResult<Option<CrawlCheckpoint>> {
        let row = self
            .conn
            .query_row(
                "SELECT level, visited, edges FROM checkpoints WHERE session_id = ?1 ORDER BY id DESC LIMIT 1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((level, visited, edges)) = row else {
            return Ok(None);
        };

        Ok(Some(CrawlCheckpoint {
            visited: serde_json::from_str(&visited)?,
            edges: serde_json::from_str(&edges)?,
            level: level as usize,
        }))
    }

    pub fn complete_session(&self, session_id: &str) -> StoreResult<()> {
        self.finish_session(session_id, SessionStatus::Completed)
    }

    pub fn cancel_session(&self, session_id: &str) -> StoreResult<()> {
        self.finish_session(session_id, SessionStatus::Cancelled)
    }

    pub fn fail_session(&self, session_id: &str) -> StoreResult<()> {
        self.finish_session(session_id, SessionStatus::Failed)
    }

    /// Put a finished session back into the running state for a resume.
    pub fn reopen_session(&self, session_id: &str) -> StoreResult<()> {
        let updated = self.conn.execute(
            "UPDATE crawl_sessions SET status = ?1, end_time = NULL WHERE id = ?2",
            params![SessionStatus::Running.as_str(), session_id],
        )?;
        if updated == 0 {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    fn finish_session(&self, session_id: &str, status: SessionStatus) -> StoreResult<()> {
        let updated = self.conn.execute(
            "UPDATE crawl_sessions SET status = ?1, end_time = ?2 WHERE id = ?3",
            params![status.as_str(), current_timestamp(), session_id],
        )?;
        if updated == 0 {
            return Err(StoreError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> StoreResult<Option<SessionRecord>> {
        let mut stmt = self.conn.prepare(&Self::session_query("WHERE s.id = ?1"))?;
        let mut rows = stmt.query(params![session_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::session_from_row(row)?)),
            None => Ok(None),
        }
    }

    /// All sessions, newest first.
    pub fn list_sessions(&self) -> StoreResult<Vec<SessionRecord>> {
        let mut stmt = self
            .conn
            .prepare(&Self::session_query("ORDER BY s.start_time DESC, s.rowid DESC"))?;
        let mut rows = stmt.query([])?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(Self::session_from_row(row)?);
        }
        Ok(sessions)
    }

    fn session_query(tail: &str) -> String {
        format!(
            "SELECT s.id, s.start_time, s.end_time, s.status, s.seeds, s.configuration,
                    (SELECT c.level FROM checkpoints c WHERE c.session_id = s.id ORDER BY c.id DESC LIMIT 1)
             FROM crawl_sessions s {}",
            tail
        )
    }

    fn session_from_row(row: &rusqlite::Row<'_>) -> StoreResult<SessionRecord> {
        let status: String = row.get(3)?;
        let seeds: String = row.get(4)?;
        let configuration: Option<String> = row.get(5)?;
        let checkpoint_level: Option<i64> = row.get(6)?;

        Ok(SessionRecord {
            id: row.get(0)?,
            start_time: row.get(1)?,
            end_time: row.get(2)?,
            status: status.parse().unwrap_or(SessionStatus::Failed),
            seeds: serde_json::from_str(&seeds)?,
            configuration: configuration
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            checkpoint_level: checkpoint_level.map(|level| level as usize),
        })
    }
}
