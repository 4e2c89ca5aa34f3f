//! SQLite persistence for people, timeline events, and cooldown entries.
//!
//! The engine only sees the [`RecognitionStore`] trait; the SQLite
//! implementation keeps face encodings as JSON text and timestamps as
//! RFC 3339 strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use facelink_core::types::{EventKind, FaceVector, Person, TimelineEvent};
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("person not found: {0}")]
    PersonNotFound(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Persistence consumed by the recognition engine.
#[async_trait]
pub trait RecognitionStore: Send + Sync {
    async fn list_people(&self) -> Result<Vec<Person>, StoreError>;
    async fn get_person(&self, id: &str) -> Result<Option<Person>, StoreError>;
    async fn add_person(
        &self,
        name: &str,
        relationship: &str,
        reminder: Option<&str>,
    ) -> Result<Person, StoreError>;
    /// Replace a person's encoding wholesale.
    async fn set_person_vector(&self, id: &str, vector: &FaceVector) -> Result<(), StoreError>;
    /// Remove a person together with their cooldown entry.
    async fn remove_person(&self, id: &str) -> Result<bool, StoreError>;
    async fn append_event(&self, event: &TimelineEvent) -> Result<(), StoreError>;
    async fn recent_events(&self, limit: u32) -> Result<Vec<TimelineEvent>, StoreError>;
    async fn load_cooldowns(&self) -> Result<Vec<(String, DateTime<Utc>)>, StoreError>;
    async fn upsert_cooldown(&self, person_id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS people (
    id           TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    relationship TEXT NOT NULL,
    reminder     TEXT,
    photo_path   TEXT,
    face_vector  TEXT,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS timeline_events (
    id         TEXT PRIMARY KEY,
    kind       TEXT NOT NULL,
    timestamp  TEXT NOT NULL,
    person_id  TEXT,
    confidence REAL,
    notes      TEXT
);
CREATE TABLE IF NOT EXISTS recognition_cooldowns (
    person_id          TEXT PRIMARY KEY,
    last_recognized_at TEXT NOT NULL
);
";

pub struct SqliteStore {
    conn: Connection,
}

/// Raw people row before JSON/timestamp parsing.
type PersonRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
);

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    fn row_to_person(row: PersonRow) -> Result<Person, StoreError> {
        let (id, name, relationship, reminder, photo_path, face_vector, created_at, updated_at) =
            row;
        let vector = face_vector
            .map(|json| {
                serde_json::from_str::<FaceVector>(&json)
                    .map_err(|e| StoreError::Corrupt(format!("encoding for {id}: {e}")))
            })
            .transpose()?;
        Ok(Person {
            created_at: parse_ts(&created_at, &id)?,
            updated_at: parse_ts(&updated_at, &id)?,
            id,
            name,
            relationship,
            reminder,
            photo_path,
            vector,
        })
    }
}

fn parse_ts(s: &str, context: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp for {context}: {e}")))
}

#[async_trait]
impl RecognitionStore for SqliteStore {
    async fn list_people(&self) -> Result<Vec<Person>, StoreError> {
        let rows: Vec<PersonRow> = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, relationship, reminder, photo_path, face_vector,
                            created_at, updated_at
                     FROM people ORDER BY created_at, id",
                )?;
                let rows = stmt
                    .query_map([], |r| {
                        Ok((
                            r.get(0)?,
                            r.get(1)?,
                            r.get(2)?,
                            r.get(3)?,
                            r.get(4)?,
                            r.get(5)?,
                            r.get(6)?,
                            r.get(7)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(Self::row_to_person).collect()
    }

    async fn get_person(&self, id: &str) -> Result<Option<Person>, StoreError> {
        let id_owned = id.to_string();
        let row: Option<PersonRow> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, relationship, reminder, photo_path, face_vector,
                            created_at, updated_at
                     FROM people WHERE id = ?1",
                )?;
                let mut rows = stmt.query_map([id_owned], |r| {
                    Ok((
                        r.get(0)?,
                        r.get(1)?,
                        r.get(2)?,
                        r.get(3)?,
                        r.get(4)?,
                        r.get(5)?,
                        r.get(6)?,
                        r.get(7)?,
                    ))
                })?;
                rows.next().transpose().map_err(Into::into)
            })
            .await?;

        row.map(Self::row_to_person).transpose()
    }

    async fn add_person(
        &self,
        name: &str,
        relationship: &str,
        reminder: Option<&str>,
    ) -> Result<Person, StoreError> {
        let now = Utc::now();
        let person = Person {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            relationship: relationship.to_string(),
            reminder: reminder.map(str::to_string),
            photo_path: None,
            vector: None,
            created_at: now,
            updated_at: now,
        };

        let row = person.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO people (id, name, relationship, reminder, photo_path,
                                         face_vector, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5, ?5)",
                    rusqlite::params![
                        row.id,
                        row.name,
                        row.relationship,
                        row.reminder,
                        row.created_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(person)
    }

    async fn set_person_vector(&self, id: &str, vector: &FaceVector) -> Result<(), StoreError> {
        let json = serde_json::to_string(vector)
            .map_err(|e| StoreError::Corrupt(format!("serialize encoding: {e}")))?;
        let id_owned = id.to_string();
        let now = Utc::now().to_rfc3339();

        let updated = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE people SET face_vector = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![json, now, id_owned],
                )?;
                Ok(n)
            })
            .await?;

        if updated == 0 {
            return Err(StoreError::PersonNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn remove_person(&self, id: &str) -> Result<bool, StoreError> {
        let id_owned = id.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "DELETE FROM recognition_cooldowns WHERE person_id = ?1",
                    [&id_owned],
                )?;
                let n = tx.execute("DELETE FROM people WHERE id = ?1", [&id_owned])?;
                tx.commit()?;
                Ok(n > 0)
            })
            .await?;
        Ok(removed)
    }

    async fn append_event(&self, event: &TimelineEvent) -> Result<(), StoreError> {
        let row = event.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO timeline_events (id, kind, timestamp, person_id, confidence, notes)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        row.id,
                        row.kind.as_str(),
                        row.timestamp.to_rfc3339(),
                        row.person_id,
                        row.confidence,
                        row.notes,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn recent_events(&self, limit: u32) -> Result<Vec<TimelineEvent>, StoreError> {
        type EventRow = (String, String, String, Option<String>, Option<f64>, Option<String>);
        let rows: Vec<EventRow> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, kind, timestamp, person_id, confidence, notes
                     FROM timeline_events ORDER BY timestamp DESC, id LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map([limit], |r| {
                        Ok((
                            r.get(0)?,
                            r.get(1)?,
                            r.get(2)?,
                            r.get(3)?,
                            r.get(4)?,
                            r.get(5)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, kind, timestamp, person_id, confidence, notes)| {
                let kind = EventKind::parse(&kind)
                    .ok_or_else(|| StoreError::Corrupt(format!("event kind {kind:?} for {id}")))?;
                Ok(TimelineEvent {
                    timestamp: parse_ts(&timestamp, &id)?,
                    id,
                    kind,
                    person_id,
                    confidence: confidence.map(|c| c as f32),
                    notes,
                })
            })
            .collect()
    }

    async fn load_cooldowns(&self) -> Result<Vec<(String, DateTime<Utc>)>, StoreError> {
        let rows: Vec<(String, String)> = self
            .conn
            .call(|conn| {
                let mut stmt = conn
                    .prepare("SELECT person_id, last_recognized_at FROM recognition_cooldowns")?;
                let rows = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(id, ts)| {
                let at = parse_ts(&ts, &id)?;
                Ok((id, at))
            })
            .collect()
    }

    async fn upsert_cooldown(&self, person_id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let id = person_id.to_string();
        let ts = at.to_rfc3339();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO recognition_cooldowns (person_id, last_recognized_at)
                     VALUES (?1, ?2)
                     ON CONFLICT(person_id) DO UPDATE SET
                         last_recognized_at = excluded.last_recognized_at",
                    rusqlite::params![id, ts],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
