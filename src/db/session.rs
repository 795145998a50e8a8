//! Session repository: per-session append-only conversation history

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::OptionalExtension;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, Type, ValueRef};
use uuid::Uuid;

use super::{DbConn, DbPool};
use crate::{Error, Result};

/// A conversation session
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One side of an exchange in a session
#[derive(Debug, Clone)]
pub struct Turn {
    pub id: String,
    pub session_id: String,
    /// Position within the session, starting at 1
    pub seq: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Turn author
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Storage name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(FromSqlError::Other(format!("unknown role: {other}").into())),
        }
    }
}

/// Session repository
#[derive(Clone)]
pub struct SessionRepo {
    pool: DbPool,
}

impl SessionRepo {
    /// Create a new session repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| Error::Database(e.to_string()))
    }

    /// List session ids, most recently updated first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self.list_all()?.into_iter().map(|s| s.id).collect())
    }

    /// List all sessions, most recently updated first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_all(&self) -> Result<Vec<Session>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, created_at, updated_at FROM sessions
             ORDER BY updated_at DESC, id ASC",
        )?;

        let sessions = stmt
            .query_map([], |row| {
                Ok(Session {
                    id: row.get(0)?,
                    created_at: parse_datetime(row, 1)?,
                    updated_at: parse_datetime(row, 2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(sessions)
    }

    /// Find a session by id
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn find(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn()?;

        let session = conn
            .query_row(
                "SELECT id, created_at, updated_at FROM sessions WHERE id = ?1",
                [session_id],
                |row| {
                    Ok(Session {
                        id: row.get(0)?,
                        created_at: parse_datetime(row, 1)?,
                        updated_at: parse_datetime(row, 2)?,
                    })
                },
            )
            .optional()?;

        Ok(session)
    }

    /// Full history of a session in conversation order
    ///
    /// Returns an empty list for unknown sessions.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn history(&self, session_id: &str) -> Result<Vec<Turn>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, session_id, seq, role, content, created_at
             FROM turns WHERE session_id = ?1
             ORDER BY seq ASC",
        )?;

        let turns = stmt
            .query_map([session_id], |row| {
                Ok(Turn {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    seq: row.get(2)?,
                    role: row.get(3)?,
                    content: row.get(4)?,
                    created_at: parse_datetime(row, 5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(turns)
    }

    /// Append a user utterance and its assistant reply in one transaction
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn append_exchange(
        &self,
        session_id: &str,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(Turn, Turn)> {
        let mut turns = self.append(
            session_id,
            &[(Role::User, user_text), (Role::Assistant, assistant_text)],
        )?;
        let assistant = turns.pop();
        let user = turns.pop();
        user.zip(assistant)
            .ok_or_else(|| Error::Database("exchange not stored".to_string()))
    }

    fn append(&self, session_id: &str, entries: &[(Role, &str)]) -> Result<Vec<Turn>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let now = Utc::now();
        let now_str = now.to_rfc3339_opts(SecondsFormat::Micros, true);

        tx.execute(
            "INSERT INTO sessions (id, created_at, updated_at) VALUES (?1, ?2, ?2)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
            [session_id, now_str.as_str()],
        )?;

        let mut seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM turns WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;

        let mut stored = Vec::with_capacity(entries.len());
        for (role, content) in entries {
            seq += 1;
            let id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO turns (id, session_id, seq, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![&id, session_id, seq, role.as_str(), content, &now_str],
            )?;
            stored.push(Turn {
                id,
                session_id: session_id.to_string(),
                seq,
                role: *role,
                content: (*content).to_string(),
                created_at: now,
            });
        }

        tx.commit()?;
        Ok(stored)
    }

    /// Delete a session and its history
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if there is no such session, or error if
    /// database operation fails
    pub fn delete(&self, session_id: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM turns WHERE session_id = ?1", [session_id])?;
        let removed = tx.execute("DELETE FROM sessions WHERE id = ?1", [session_id])?;
        tx.commit()?;

        if removed == 0 {
            return Err(Error::NotFound(format!("session {session_id}")));
        }
        tracing::info!(session_id = %session_id, "session deleted");
        Ok(())
    }

    /// Count turns in a session
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn turn_count(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM turns WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;

        Ok(usize::try_from(count).unwrap_or(0))
    }
}

fn parse_datetime(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn setup() -> SessionRepo {
        SessionRepo::new(init_memory().unwrap())
    }

    #[test]
    fn test_session_created_on_first_turn() {
        let repo = setup();
        assert!(repo.find("session_1").unwrap().is_none());

        repo.append_exchange("session_1", "Hello", "Hi there").unwrap();

        assert!(repo.find("session_1").unwrap().is_some());
        assert_eq!(repo.list_ids().unwrap(), vec!["session_1".to_string()]);
    }

    #[test]
    fn test_exchange_keeps_order() {
        let repo = setup();

        repo.append_exchange("s", "What is GOOGL at?", "It is at $170.00.")
            .unwrap();
        repo.append_exchange("s", "And in rupees?", "About 14,000 INR.")
            .unwrap();

        let history = repo.history("s").unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(
            history.iter().map(|t| t.seq).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[3].content, "About 14,000 INR.");
    }

    #[test]
    fn test_delete_removes_session_and_turns() {
        let repo = setup();
        repo.append_exchange("keep", "a", "b").unwrap();
        repo.append_exchange("drop", "c", "d").unwrap();

        repo.delete("drop").unwrap();
        assert!(matches!(repo.delete("drop"), Err(Error::NotFound(_))));

        assert_eq!(repo.list_ids().unwrap(), vec!["keep".to_string()]);
        assert!(repo.history("drop").unwrap().is_empty());
        assert_eq!(repo.turn_count("keep").unwrap(), 2);
    }

    #[test]
    fn test_history_of_unknown_session_is_empty() {
        let repo = setup();
        assert!(repo.history("nobody").unwrap().is_empty());
        assert_eq!(repo.turn_count("nobody").unwrap(), 0);
    }

    #[test]
    fn test_corrupt_rows_fail_loudly() {
        let repo = setup();
        repo.append_exchange("s", "hi", "hello").unwrap();

        let conn = repo.conn().unwrap();
        conn.execute("UPDATE turns SET role = 'narrator' WHERE seq = 2", [])
            .unwrap();
        drop(conn);
        assert!(matches!(repo.history("s"), Err(Error::Sqlite(_))));

        let conn = repo.conn().unwrap();
        conn.execute("UPDATE turns SET role = 'assistant'", []).unwrap();
        conn.execute("UPDATE sessions SET updated_at = 'yesterday'", [])
            .unwrap();
        drop(conn);
        assert_eq!(repo.history("s").unwrap().len(), 2);
        assert!(matches!(repo.list_ids(), Err(Error::Sqlite(_))));
    }
}
