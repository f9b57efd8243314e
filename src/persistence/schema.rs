//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` — safe to
//! re-run on every server startup. Produces a convergent result.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// Creates both durable tables idempotently. Safe to call on every startup.
///
/// `job_reference` and `resume_reference` are opaque foreign strings with
/// no FK constraint: timeline history is audit data and must survive
/// job-catalog cleanup.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS session (
    id                  TEXT PRIMARY KEY NOT NULL,
    job_reference       TEXT NOT NULL,
    resume_reference    TEXT NOT NULL,
    status              TEXT NOT NULL CHECK(status IN ('queued','running','paused','completed','failed')),
    current_step        TEXT,
    current_thought     TEXT,
    screenshot_location TEXT,
    tab_index           INTEGER,
    error_detail        TEXT,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    completed_at        TEXT
);

CREATE TABLE IF NOT EXISTS timeline_event (
    session_id          TEXT NOT NULL,
    seq                 INTEGER NOT NULL,
    event_type          TEXT NOT NULL CHECK(event_type IN ('thought','tool_call','screenshot','error','pause','resume')),
    timestamp           TEXT NOT NULL,
    content             TEXT NOT NULL,
    metadata            TEXT,
    screenshot_location TEXT,
    PRIMARY KEY (session_id, seq)
);

CREATE INDEX IF NOT EXISTS idx_session_status ON session(status);
CREATE INDEX IF NOT EXISTS idx_timeline_session ON timeline_event(session_id);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
