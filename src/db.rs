use crate::analyzer::ScoreSet;
use crate::fallacies::{FallacyFinding, FallacyKind, Severity};
use chrono::{Duration, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    For,
    Against,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::For => "for",
            Position::Against => "against",
        }
    }

    pub fn opposite(&self) -> Position {
        match self {
            Position::For => Position::Against,
            Position::Against => Position::For,
        }
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "for" => Ok(Position::For),
            "against" => Ok(Position::Against),
            other => Err(format!("position must be 'for' or 'against', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebateStatus {
    Active,
    Completed,
    Abandoned,
}

impl DebateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateStatus::Active => "active",
            DebateStatus::Completed => "completed",
            DebateStatus::Abandoned => "abandoned",
        }
    }
}

impl FromStr for DebateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(DebateStatus::Active),
            "completed" => Ok(DebateStatus::Completed),
            "abandoned" => Ok(DebateStatus::Abandoned),
            other => Err(format!("unknown debate status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown message role: {}", other)),
        }
    }
}

// Enums live in TEXT columns under their wire names.
macro_rules! sql_text_enum {
    ($($ty:ty => $to_str:ident),* $(,)?) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.$to_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value.as_str()?.parse().map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    )*};
}

sql_text_enum!(
    Position => as_str,
    DebateStatus => as_str,
    Role => as_str,
    Severity => as_str,
    FallacyKind => label,
);

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Debate {
    pub id: String,
    pub user_id: String,
    pub topic: String,
    pub position: Position,
    /// Persona key of the opponent.
    pub opponent_type: String,
    pub status: DebateStatus,
    pub turn_count: i64,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DebateMessage {
    pub id: String,
    pub debate_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallacies: Option<Vec<FallacyFinding>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoreSet>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggedFallacy {
    pub id: String,
    pub debate_id: String,
    pub message_id: String,
    pub fallacy_type: FallacyKind,
    pub description: String,
    pub severity: Severity,
    pub detected_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct AverageScores {
    pub clarity: f64,
    pub evidence: f64,
    pub logic: f64,
    pub persuasiveness: f64,
    pub overall: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct UserAnalytics {
    pub total_debates: i64,
    /// User turns in the window that had at least one fallacy flagged.
    pub total_fallacies: i64,
    pub average_scores: AverageScores,
}

/// Fixed-width UTC timestamps so TEXT comparison matches time order.
fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn now() -> String {
    timestamp(Utc::now())
}

const DEBATE_COLUMNS: &str =
    "id, user_id, topic, position, opponent_type, status, turn_count, created_at, completed_at";

fn debate_from_row(row: &Row<'_>) -> rusqlite::Result<Debate> {
    Ok(Debate {
        id: row.get(0)?,
        user_id: row.get(1)?,
        topic: row.get(2)?,
        position: row.get(3)?,
        opponent_type: row.get(4)?,
        status: row.get(5)?,
        turn_count: row.get(6)?,
        created_at: row.get(7)?,
        completed_at: row.get(8)?,
    })
}

const MESSAGE_COLUMNS: &str = "id, debate_id, role, content, created_at, fallacies_detected, \
     clarity_score, evidence_score, logic_score, persuasiveness_score";

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<DebateMessage> {
    let fallacies = match row.get::<_, Option<String>>(5)? {
        Some(json) => Some(
            serde_json::from_str::<Vec<FallacyFinding>>(&json)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        ),
        None => None,
    };
    let parts: (Option<i32>, Option<i32>, Option<i32>, Option<i32>) =
        (row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?);
    let scores = match parts {
        (Some(c), Some(e), Some(l), Some(p)) => Some(ScoreSet::from_parts(c, e, l, p)),
        _ => None,
    };

    Ok(DebateMessage {
        id: row.get(0)?,
        debate_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        fallacies,
        scores,
    })
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn new(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch("
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS debates (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                topic TEXT NOT NULL,
                position TEXT NOT NULL,
                opponent_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                turn_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );
            CREATE TABLE IF NOT EXISTS debate_messages (
                id TEXT PRIMARY KEY,
                debate_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                fallacies_detected TEXT,
                clarity_score INTEGER,
                evidence_score INTEGER,
                logic_score INTEGER,
                persuasiveness_score INTEGER,
                overall_score INTEGER,
                created_at TEXT NOT NULL,
                FOREIGN KEY (debate_id) REFERENCES debates(id)
            );
            CREATE TABLE IF NOT EXISTS logical_fallacies (
                id TEXT PRIMARY KEY,
                debate_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                fallacy_type TEXT NOT NULL,
                description TEXT NOT NULL,
                severity TEXT NOT NULL,
                detected_at TEXT NOT NULL,
                FOREIGN KEY (debate_id) REFERENCES debates(id),
                FOREIGN KEY (message_id) REFERENCES debate_messages(id)
            );
            CREATE INDEX IF NOT EXISTS idx_debates_user ON debates(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_messages_debate ON debate_messages(debate_id, created_at);
        ")?;

        Ok(Self { conn: Mutex::new(conn) })
    }

    /// A panic while holding the lock leaves the connection itself usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Users ──

    pub fn create_user(&self, email: &str, name: &str) -> Result<User, rusqlite::Error> {
        let conn = self.conn();
        let id = Uuid::new_v4().to_string();
        let now = now();
        conn.execute(
            "INSERT INTO users (id, email, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, email, name, now, now],
        )?;
        Ok(User { id, email: email.to_string(), name: name.to_string(), created_at: now.clone(), updated_at: now })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, email, name, created_at, updated_at FROM users WHERE email = ?1",
            params![email],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    email: row.get(1)?,
                    name: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            },
        )
        .optional()
    }

    pub fn user_exists(&self, user_id: &str) -> Result<bool, rusqlite::Error> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users WHERE id = ?1", params![user_id], |r| r.get(0))?;
        Ok(count > 0)
    }

    // ── Debates ──

    pub fn create_debate(
        &self,
        user_id: &str,
        topic: &str,
        position: Position,
        opponent_type: &str,
    ) -> Result<Debate, rusqlite::Error> {
        let conn = self.conn();
        let id = Uuid::new_v4().to_string();
        let now = now();
        conn.execute(
            "INSERT INTO debates (id, user_id, topic, position, opponent_type, status, turn_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![id, user_id, topic, position, opponent_type, DebateStatus::Active, now],
        )?;
        Ok(Debate {
            id,
            user_id: user_id.to_string(),
            topic: topic.to_string(),
            position,
            opponent_type: opponent_type.to_string(),
            status: DebateStatus::Active,
            turn_count: 0,
            created_at: now,
            completed_at: None,
        })
    }

    pub fn get_debate(&self, debate_id: &str) -> Result<Option<Debate>, rusqlite::Error> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {DEBATE_COLUMNS} FROM debates WHERE id = ?1"),
            params![debate_id],
            debate_from_row,
        )
        .optional()
    }

    /// Newest first.
    pub fn get_user_debates(&self, user_id: &str) -> Result<Vec<Debate>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DEBATE_COLUMNS} FROM debates WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], debate_from_row)?;
        rows.collect()
    }

    pub fn increment_turn_count(&self, debate_id: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        conn.execute("UPDATE debates SET turn_count = turn_count + 1 WHERE id = ?1", params![debate_id])?;
        Ok(())
    }

    pub fn complete_debate(&self, debate_id: &str) -> Result<(), rusqlite::Error> {
        let conn = self.conn();
        conn.execute(
            "UPDATE debates SET status = ?1, completed_at = ?2 WHERE id = ?3",
            params![DebateStatus::Completed, now(), debate_id],
        )?;
        Ok(())
    }

    // ── Messages ──

    /// Store a user turn with its analysis. The message row and its fallacy
    /// ledger rows are written in one transaction.
    pub fn add_user_message(
        &self,
        debate_id: &str,
        content: &str,
        scores: &ScoreSet,
        fallacies: &[FallacyFinding],
    ) -> Result<DebateMessage, rusqlite::Error> {
        let fallacies_json = serde_json::to_string(fallacies)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let id = Uuid::new_v4().to_string();
        let now = now();
        tx.execute(
            "INSERT INTO debate_messages (id, debate_id, role, content, fallacies_detected,
                clarity_score, evidence_score, logic_score, persuasiveness_score, overall_score, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                debate_id,
                Role::User,
                content,
                fallacies_json,
                scores.clarity(),
                scores.evidence(),
                scores.logic(),
                scores.persuasiveness(),
                scores.overall(),
                now
            ],
        )?;
        for finding in fallacies {
            tx.execute(
                "INSERT INTO logical_fallacies (id, debate_id, message_id, fallacy_type, description, severity, detected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    Uuid::new_v4().to_string(),
                    debate_id,
                    id,
                    finding.kind,
                    finding.description,
                    finding.severity,
                    now
                ],
            )?;
        }
        tx.commit()?;

        Ok(DebateMessage {
            id,
            debate_id: debate_id.to_string(),
            role: Role::User,
            content: content.to_string(),
            created_at: now,
            fallacies: Some(fallacies.to_vec()),
            scores: Some(*scores),
        })
    }

    pub fn add_assistant_message(&self, debate_id: &str, content: &str) -> Result<DebateMessage, rusqlite::Error> {
        let conn = self.conn();
        let id = Uuid::new_v4().to_string();
        let now = now();
        conn.execute(
            "INSERT INTO debate_messages (id, debate_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, debate_id, Role::Assistant, content, now],
        )?;
        Ok(DebateMessage {
            id,
            debate_id: debate_id.to_string(),
            role: Role::Assistant,
            content: content.to_string(),
            created_at: now,
            fallacies: None,
            scores: None,
        })
    }

    /// Chronological; insertion order breaks timestamp ties.
    pub fn get_debate_messages(&self, debate_id: &str) -> Result<Vec<DebateMessage>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM debate_messages WHERE debate_id = ?1 ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map(params![debate_id], message_from_row)?;
        rows.collect()
    }

    /// Most recent first.
    pub fn get_debate_fallacies(&self, debate_id: &str) -> Result<Vec<LoggedFallacy>, rusqlite::Error> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, debate_id, message_id, fallacy_type, description, severity, detected_at
             FROM logical_fallacies WHERE debate_id = ?1 ORDER BY detected_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![debate_id], |row| {
            Ok(LoggedFallacy {
                id: row.get(0)?,
                debate_id: row.get(1)?,
                message_id: row.get(2)?,
                fallacy_type: row.get(3)?,
                description: row.get(4)?,
                severity: row.get(5)?,
                detected_at: row.get(6)?,
            })
        })?;
        rows.collect()
    }

    // ── Analytics ──

    /// Totals and score averages for the trailing `days` days. With no scored
    /// turns every average is 0.
    pub fn get_user_analytics(&self, user_id: &str, days: i64) -> Result<UserAnalytics, rusqlite::Error> {
        let conn = self.conn();
        let since = timestamp(Utc::now() - Duration::days(days));

        let total_debates: i64 = conn.query_row(
            "SELECT COUNT(*) FROM debates WHERE user_id = ?1 AND created_at >= ?2",
            params![user_id, since],
            |r| r.get(0),
        )?;

        let total_fallacies: i64 = conn.query_row(
            "SELECT COUNT(*) FROM debate_messages dm
             JOIN debates d ON dm.debate_id = d.id
             WHERE d.user_id = ?1 AND dm.role = 'user'
               AND dm.fallacies_detected IS NOT NULL AND dm.fallacies_detected != '[]'
               AND dm.created_at >= ?2",
            params![user_id, since],
            |r| r.get(0),
        )?;

        let average_scores = conn.query_row(
            "SELECT AVG(clarity_score), AVG(evidence_score), AVG(logic_score),
                    AVG(persuasiveness_score), AVG(overall_score)
             FROM debate_messages dm
             JOIN debates d ON dm.debate_id = d.id
             WHERE d.user_id = ?1 AND dm.role = 'user' AND dm.created_at >= ?2",
            params![user_id, since],
            |r| {
                Ok(AverageScores {
                    clarity: r.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                    evidence: r.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                    logic: r.get::<_, Option<f64>>(2)?.unwrap_or(0.0),
                    persuasiveness: r.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    overall: r.get::<_, Option<f64>>(4)?.unwrap_or(0.0),
                })
            },
        )?;

        Ok(UserAnalytics { total_debates, total_fallacies, average_scores })
    }
}
