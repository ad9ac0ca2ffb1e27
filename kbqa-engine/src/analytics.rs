//! Interaction analytics backed by SQLite.
//!
//! Every answered query produces one [`InteractionRecord`]. Writes happen on
//! a detached task after the response is already on its way, so a slow or
//! broken database never delays or fails an answer.

use crate::error::Result;
use chrono::Utc;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Schema version written to the `analytics_meta` table. Bump when the
/// interactions schema changes and extend `migrate` accordingly.
const DB_VERSION: i64 = 2;

/// One recorded question/answer exchange.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub session_id: String,
    /// ISO-8601 timestamp, UTC.
    pub timestamp: String,
    pub query_text: String,
    pub response_time_seconds: f64,
    /// `None` when no source document backed the answer.
    pub source_document_id: Option<String>,
}

impl InteractionRecord {
    pub fn new(
        session_id: impl Into<String>,
        query_text: impl Into<String>,
        response_time_seconds: f64,
        source_document_id: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: Utc::now().to_rfc3339(),
            query_text: query_text.into(),
            response_time_seconds,
            source_document_id,
        }
    }
}

/// Per-category interaction count in a usage summary.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionTypeCount {
    pub question_type: String,
    pub count: i64,
}

/// Aggregated usage over a trailing window of days.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total_interactions: i64,
    pub unique_sessions: i64,
    pub avg_response_time_seconds: f64,
    pub question_types: Vec<QuestionTypeCount>,
    pub time_period: String,
}

/// SQLite-backed analytics store. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct AnalyticsSink {
    pool: SqlitePool,
}

impl AnalyticsSink {
    /// Open (creating if missing) the analytics database at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let sink = Self { pool };
        sink.migrate().await?;
        Ok(sink)
    }

    /// Open an in-memory database, for tests.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let sink = Self { pool };
        sink.migrate().await?;
        Ok(sink)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS analytics_meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current: Option<i64> =
            sqlx::query("SELECT value FROM analytics_meta WHERE key = 'version'")
                .fetch_optional(&self.pool)
                .await?
                .map(|row| row.get(0));

        if current.is_none_or(|v| v < DB_VERSION) {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS interactions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    session_id TEXT NOT NULL,
                    query_text TEXT NOT NULL,
                    question_type TEXT NOT NULL,
                    response_time_seconds REAL NOT NULL,
                    source_document_id TEXT
                )",
            )
            .execute(&self.pool)
            .await?;
            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_interactions_session
                 ON interactions(session_id)",
            )
            .execute(&self.pool)
            .await?;
            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_interactions_question_type
                 ON interactions(question_type)",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "INSERT INTO analytics_meta (key, value) VALUES ('version', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = ?1",
            )
            .bind(DB_VERSION)
            .execute(&self.pool)
            .await?;
            info!("analytics schema at version {DB_VERSION}");
        }

        Ok(())
    }

    /// Persist one interaction.
    pub async fn record(&self, record: &InteractionRecord) -> Result<()> {
        let question_type = classify_question(&record.query_text);
        sqlx::query(
            "INSERT INTO interactions
                (timestamp, session_id, query_text, question_type,
                 response_time_seconds, source_document_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&record.timestamp)
        .bind(&record.session_id)
        .bind(&record.query_text)
        .bind(question_type)
        .bind(record.response_time_seconds)
        .bind(&record.source_document_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Summarize the last `days` days of interactions.
    pub async fn summary(&self, days: i64) -> Result<AnalyticsSummary> {
        let cutoff = "datetime('now', '-' || ?1 || ' days')";

        let totals = sqlx::query(&format!(
            "SELECT COUNT(*),
                    COUNT(DISTINCT session_id),
                    COALESCE(AVG(response_time_seconds), 0.0)
             FROM interactions
             WHERE timestamp >= {cutoff}"
        ))
        .bind(days)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT question_type, COUNT(*) AS n
             FROM interactions
             WHERE timestamp >= {cutoff}
             GROUP BY question_type
             ORDER BY n DESC, question_type"
        ))
        .bind(days)
        .fetch_all(&self.pool)
        .await?;

        Ok(AnalyticsSummary {
            total_interactions: totals.get(0),
            unique_sessions: totals.get(1),
            avg_response_time_seconds: totals.get(2),
            question_types: rows
                .into_iter()
                .map(|row| QuestionTypeCount {
                    question_type: row.get(0),
                    count: row.get(1),
                })
                .collect(),
            time_period: format!("last {days} days"),
        })
    }

    /// Total rows in the interactions table, regardless of age.
    pub async fn interaction_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) FROM interactions")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get(0))
    }
}

/// Coarse question category used for the usage summary.
pub fn classify_question(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if has(&["price", "pricing", "cost", "plan", "subscription", "billing"]) {
        "pricing"
    } else if has(&["install", "setup", "set up", "configure", "getting started"]) {
        "setup"
    } else if has(&["error", "fail", "broken", "crash", "not working", "issue", "problem"]) {
        "troubleshooting"
    } else if has(&["integrate", "integration", "api", "webhook", "connect"]) {
        "integration"
    } else if has(&["feature", "support", "can it", "does it", "how do", "how to"]) {
        "features"
    } else {
        "general"
    }
}
