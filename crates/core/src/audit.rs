//! # Audit Log
//!
//! SQLite-backed record of run inputs and outputs. All writes go through a
//! dedicated background task over a bounded channel, so callers never block
//! on the database. [`AuditLog::close`] drains whatever is still queued.

use anyhow::{Context, Result};
use chrono::Local;
use rusqlite::{params, Connection};
use serde_json::{json, Value};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Queue depth before fire-and-forget writes start being dropped.
const WRITE_QUEUE_DEPTH: usize = 64;

/// One stored run record.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRecord {
    pub id: i64,
    pub input: Option<String>,
    pub output: Option<String>,
    pub details: Option<String>,
    pub datetime: String,
}

enum AuditOp {
    Insert {
        input: Option<String>,
        output: Option<String>,
        details: Option<String>,
        reply: Option<oneshot::Sender<i64>>,
    },
    Update {
        id: i64,
        output: Option<String>,
        details: Option<String>,
    },
    Fetch {
        id: i64,
        reply: oneshot::Sender<Option<AuditRecord>>,
    },
    FetchAll {
        reply: oneshot::Sender<Vec<AuditRecord>>,
    },
    FetchBetween {
        start: String,
        end: String,
        reply: oneshot::Sender<Vec<AuditRecord>>,
    },
    Count {
        reply: oneshot::Sender<i64>,
    },
    Delete {
        id: i64,
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to the audit database and its writer task.
pub struct AuditLog {
    tx: mpsc::Sender<AuditOp>,
    writer: JoinHandle<()>,
}

impl AuditLog {
    /// Open (or create) the database and spawn the writer task.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(path).context("Failed to open audit database")?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                input TEXT,
                output TEXT,
                details TEXT DEFAULT NULL,
                datetime TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
            [],
        )
        .context("Failed to create audit schema")?;

        let (tx, rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let writer = tokio::spawn(writer_loop(conn, rx));

        Ok(Self { tx, writer })
    }

    /// Open a run record and hand back a guard that can complete it.
    pub async fn begin(&self, input: &Value) -> Result<AuditEntry> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(AuditOp::Insert {
                input: Some(input.to_string()),
                output: None,
                details: None,
                reply: Some(reply_tx),
            })
            .await
            .context("Audit writer is not running")?;

        let id = reply_rx.await.context("Audit writer dropped the insert")?;
        Ok(AuditEntry {
            id,
            tx: self.tx.clone(),
            output: None,
            details: None,
            finished: false,
        })
    }

    /// Fire-and-forget insert. Dropped with a warning when the queue is full.
    pub fn record(&self, input: Option<Value>, output: Option<Value>, details: Option<Value>) {
        let op = AuditOp::Insert {
            input: input.map(|v| v.to_string()),
            output: output.map(stamp_output),
            details: details.map(|v| v.to_string()),
            reply: None,
        };
        if let Err(e) = self.tx.try_send(op) {
            tracing::warn!("Audit record dropped: {}", e);
        }
    }

    pub async fn fetch(&self, id: i64) -> Result<Option<AuditRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(AuditOp::Fetch { id, reply: reply_tx })
            .await
            .context("Audit writer is not running")?;
        reply_rx.await.context("Audit writer dropped the fetch")
    }

    /// Every stored record in id order.
    pub async fn fetch_all(&self) -> Result<Vec<AuditRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(AuditOp::FetchAll { reply: reply_tx })
            .await
            .context("Audit writer is not running")?;
        reply_rx.await.context("Audit writer dropped the fetch")
    }

    /// Records whose row timestamp falls inside `[start, end]`.
    pub async fn fetch_between(&self, start: &str, end: &str) -> Result<Vec<AuditRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(AuditOp::FetchBetween {
                start: start.to_string(),
                end: end.to_string(),
                reply: reply_tx,
            })
            .await
            .context("Audit writer is not running")?;
        reply_rx.await.context("Audit writer dropped the fetch")
    }

    pub async fn count(&self) -> Result<i64> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(AuditOp::Count { reply: reply_tx })
            .await
            .context("Audit writer is not running")?;
        reply_rx.await.context("Audit writer dropped the count")
    }

    /// Delete one record; returns whether a row was removed.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(AuditOp::Delete { id, reply: reply_tx })
            .await
            .context("Audit writer is not running")?;
        reply_rx.await.context("Audit writer dropped the delete")
    }

    /// Drain the queue and stop the writer. Outstanding [`AuditEntry`] guards
    /// keep the writer alive, so finish them first.
    pub async fn close(self) -> Result<()> {
        let Self { tx, writer } = self;
        drop(tx);
        writer.await.context("Audit writer panicked")?;
        Ok(())
    }
}

/// Run-scoped audit record: input captured at creation, output and details
/// written back when the guard finishes (or is dropped).
pub struct AuditEntry {
    id: i64,
    tx: mpsc::Sender<AuditOp>,
    output: Option<Value>,
    details: Option<Value>,
    finished: bool,
}

impl AuditEntry {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn set_output(&mut self, output: Value) {
        self.output = Some(output);
    }

    pub fn set_details(&mut self, details: Value) {
        self.details = Some(details);
    }

    /// Write the buffered output and details back to the record.
    pub fn finish(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if self.output.is_none() && self.details.is_none() {
            return;
        }
        let op = AuditOp::Update {
            id: self.id,
            output: self.output.take().map(stamp_output),
            details: self.details.take().map(|v| v.to_string()),
        };
        if let Err(e) = self.tx.try_send(op) {
            tracing::warn!(id = self.id, "Audit update dropped: {}", e);
        }
    }
}

impl Drop for AuditEntry {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Serialize an output value with a completion timestamp folded in.
fn stamp_output(output: Value) -> String {
    let stamp = Local::now().format(DATETIME_FORMAT).to_string();
    match output {
        Value::Object(mut entries) => {
            entries.insert("datetime".to_string(), Value::String(stamp));
            Value::Object(entries).to_string()
        }
        Value::String(text) => json!({"output": text, "datetime": stamp}).to_string(),
        other => other.to_string(),
    }
}

async fn writer_loop(conn: Connection, mut rx: mpsc::Receiver<AuditOp>) {
    while let Some(op) = rx.recv().await {
        if let Err(e) = apply(&conn, op) {
            tracing::warn!("Audit operation failed: {}", e);
        }
    }
    tracing::debug!("Audit writer drained");
}

fn apply(conn: &Connection, op: AuditOp) -> Result<()> {
    match op {
        AuditOp::Insert {
            input,
            output,
            details,
            reply,
        } => {
            conn.execute(
                "INSERT INTO records (input, output, details) VALUES (?1, ?2, ?3)",
                params![input, output, details],
            )?;
            if let Some(reply) = reply {
                let _ = reply.send(conn.last_insert_rowid());
            }
            Ok(())
        }

        AuditOp::Update { id, output, details } => {
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM records WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            if exists == 0 {
                tracing::warn!(id, "Audit update for unknown record");
                return Ok(());
            }

            match (output, details) {
                (Some(output), Some(details)) => conn.execute(
                    "UPDATE records SET output = ?1, details = ?2 WHERE id = ?3",
                    params![output, details, id],
                )?,
                (Some(output), None) => conn.execute(
                    "UPDATE records SET output = ?1 WHERE id = ?2",
                    params![output, id],
                )?,
                (None, Some(details)) => conn.execute(
                    "UPDATE records SET details = ?1 WHERE id = ?2",
                    params![details, id],
                )?,
                (None, None) => 0,
            };
            Ok(())
        }

        AuditOp::Fetch { id, reply } => {
            let record = conn
                .query_row(
                    "SELECT id, input, output, details, datetime FROM records WHERE id = ?1",
                    params![id],
                    row_to_record,
                )
                .ok();
            let _ = reply.send(record);
            Ok(())
        }

        AuditOp::FetchAll { reply } => {
            let mut stmt = conn
                .prepare("SELECT id, input, output, details, datetime FROM records ORDER BY id")?;
            let rows = stmt.query_map([], row_to_record)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            let _ = reply.send(records);
            Ok(())
        }

        AuditOp::FetchBetween { start, end, reply } => {
            let mut stmt = conn.prepare(
                "SELECT id, input, output, details, datetime FROM records \
                 WHERE datetime BETWEEN ?1 AND ?2 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![start, end], row_to_record)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            let _ = reply.send(records);
            Ok(())
        }

        AuditOp::Count { reply } => {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
            let _ = reply.send(count);
            Ok(())
        }

        AuditOp::Delete { id, reply } => {
            let removed = conn.execute("DELETE FROM records WHERE id = ?1", params![id])?;
            let _ = reply.send(removed > 0);
            Ok(())
        }
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
    Ok(AuditRecord {
        id: row.get(0)?,
        input: row.get(1)?,
        output: row.get(2)?,
        details: row.get(3)?,
        datetime: row.get(4)?,
    })
}
