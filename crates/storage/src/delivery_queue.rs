// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Volute Contributors

//! Durable `delivery_queue` table (§3, §5 "append-only for queued, delete
//! on flush, transactionally consistent"). Backs message holding while a
//! mind sleeps.

use crate::error::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use volute_core::{InboundMessage, QueueStatus, QueuedMessage};

pub struct DeliveryQueue {
    conn: Mutex<Connection>,
}

impl DeliveryQueue {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS delivery_queue (
                seq      INTEGER PRIMARY KEY AUTOINCREMENT,
                id       TEXT NOT NULL UNIQUE,
                mind     TEXT NOT NULL,
                session  TEXT NOT NULL,
                channel  TEXT NOT NULL,
                sender   TEXT,
                status   TEXT NOT NULL,
                payload  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS delivery_queue_mind_idx ON delivery_queue(mind);",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Insert one held message, status `sleep-queued` (§3).
    pub fn enqueue(&self, msg: &QueuedMessage) -> Result<()> {
        let payload = serde_json::to_string(&msg.payload)?;
        let status = serde_json::to_string(&msg.status)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO delivery_queue (id, mind, session, channel, sender, status, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![msg.id, msg.mind, msg.session, msg.channel, msg.sender, status, payload],
        )?;
        Ok(())
    }

    /// Every row held for `mind`, in insertion (arrival) order — the order
    /// `flushQueuedMessages` must preserve on wake (§8).
    pub fn for_mind(&self, mind: &str) -> Result<Vec<QueuedMessage>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, mind, session, channel, sender, status, payload
             FROM delivery_queue WHERE mind = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![mind], |row| {
            let status_raw: String = row.get(5)?;
            let payload_raw: String = row.get(6)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                status_raw,
                payload_raw,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, mind, session, channel, sender, status_raw, payload_raw) = row?;
            let status: QueueStatus = serde_json::from_str(&status_raw)?;
            let payload: InboundMessage = serde_json::from_str(&payload_raw)?;
            out.push(QueuedMessage { id, mind, session, channel, sender, status, payload });
        }
        Ok(out)
    }

    pub fn count_for_mind(&self, mind: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM delivery_queue WHERE mind = ?1", params![mind], |r| r.get(0))?;
        Ok(count as u64)
    }

    /// Delete every row for `mind` — called once all queued messages have
    /// been flushed through DeliveryManager on wake.
    pub fn clear_mind(&self, mind: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM delivery_queue WHERE mind = ?1", params![mind])?;
        Ok(())
    }
}
