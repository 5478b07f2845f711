//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! Lifecycle, coordinator, and read services call store methods —
//! they never execute SQL directly.
//!
//! Write contention is resolved per-row with a compare-and-swap on the
//! explicit version column; no global lock, so concurrent
//! investigations are fully independent.

use crate::{
    error::{EngineError, EngineResult},
    event::EventLogEntry,
    investigation::{
        Investigation, InvestigationProgress, InvestigationSettings, InvestigationStatus,
        LifecycleStage,
    },
    types::Version,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

pub struct InvestigationStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file/URI
}

impl InvestigationStore {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        // Concurrent analyzer workers write through their own connections;
        // let SQLite wait out short write locks instead of failing.
        conn.busy_timeout(std::time::Duration::from_millis(5_000))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an isolated in-memory database (single-connection tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// Open a shared in-memory database. Multiple connections opened
    /// through [`reopen`](Self::reopen) see the same data, which is what
    /// the concurrent-writer paths need. The database lives as long as
    /// at least one connection stays open.
    pub fn in_memory_shared(tag: &str) -> EngineResult<Self> {
        Self::open(&format!("file:{tag}?mode=memory&cache=shared"))
    }

    /// Open a new connection to the same database. For plain in-memory
    /// databases this returns an isolated database; concurrent paths
    /// must use [`in_memory_shared`](Self::in_memory_shared) or a file.
    pub fn reopen(&self) -> EngineResult<Self> {
        match &self.path {
            Some(p) => Self::open(p),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_investigations.sql"))?;
        Ok(())
    }

    // ── Investigation rows ─────────────────────────────────────────

    pub fn insert_investigation(&self, inv: &Investigation) -> EngineResult<()> {
        let settings_json = match &inv.settings {
            Some(s) => Some(serde_json::to_string(s)?),
            None => None,
        };
        let progress_json = serde_json::to_string(&inv.progress)?;
        let result = self.conn.execute(
            "INSERT INTO investigation (investigation_id, owner_id, lifecycle_stage, status,
                settings_json, progress_json, version, created_at, updated_at, last_accessed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                inv.investigation_id,
                inv.owner_id,
                inv.lifecycle_stage.as_str(),
                inv.status.as_str(),
                settings_json,
                progress_json,
                inv.version,
                inv.created_at.to_rfc3339(),
                inv.updated_at.to_rfc3339(),
                inv.last_accessed.map(|t| t.to_rfc3339()),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(EngineError::AlreadyExists {
                    investigation_id: inv.investigation_id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_investigation(&self, investigation_id: &str) -> EngineResult<Option<Investigation>> {
        let row = self
            .conn
            .query_row(
                "SELECT investigation_id, owner_id, lifecycle_stage, status,
                        settings_json, progress_json, version, created_at, updated_at, last_accessed
                 FROM investigation WHERE investigation_id = ?1",
                params![investigation_id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                        r.get::<_, Option<String>>(4)?,
                        r.get::<_, String>(5)?,
                        r.get::<_, i64>(6)?,
                        r.get::<_, String>(7)?,
                        r.get::<_, String>(8)?,
                        r.get::<_, Option<String>>(9)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, owner, stage, status, settings_json, progress_json, version, created, updated, accessed)) =
            row
        else {
            return Ok(None);
        };

        let settings: Option<InvestigationSettings> = match settings_json {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };
        let progress: InvestigationProgress = serde_json::from_str(&progress_json)?;

        Ok(Some(Investigation {
            investigation_id: id,
            owner_id: owner,
            lifecycle_stage: parse_stage(&stage)?,
            status: parse_status(&status)?,
            settings,
            progress,
            version,
            created_at: parse_ts(&created)?,
            updated_at: parse_ts(&updated)?,
            last_accessed: accessed.as_deref().map(parse_ts).transpose()?,
        }))
    }

    /// Compare-and-swap write: persists `inv` only if the stored version
    /// still equals `expected_version`. A lost race reports the stored
    /// version so the caller can re-read and retry.
    pub fn update_investigation_cas(
        &self,
        inv: &Investigation,
        expected_version: Version,
    ) -> EngineResult<()> {
        let settings_json = match &inv.settings {
            Some(s) => Some(serde_json::to_string(s)?),
            None => None,
        };
        let progress_json = serde_json::to_string(&inv.progress)?;
        let rows = self.conn.execute(
            "UPDATE investigation
             SET owner_id = ?1, lifecycle_stage = ?2, status = ?3, settings_json = ?4,
                 progress_json = ?5, version = ?6, updated_at = ?7
             WHERE investigation_id = ?8 AND version = ?9",
            params![
                inv.owner_id,
                inv.lifecycle_stage.as_str(),
                inv.status.as_str(),
                settings_json,
                progress_json,
                inv.version,
                inv.updated_at.to_rfc3339(),
                inv.investigation_id,
                expected_version,
            ],
        )?;
        if rows == 0 {
            return match self.get_investigation(&inv.investigation_id)? {
                None => Err(EngineError::NotFound),
                Some(current) => Err(EngineError::VersionConflict {
                    expected: expected_version,
                    actual:   current.version,
                }),
            };
        }
        Ok(())
    }

    /// Stamp a read. Deliberately not versioned: observing an
    /// investigation is not a mutation of it.
    pub fn touch_last_accessed(
        &self,
        investigation_id: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        self.conn.execute(
            "UPDATE investigation SET last_accessed = ?1 WHERE investigation_id = ?2",
            params![at.to_rfc3339(), investigation_id],
        )?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO investigation_event (event_id, investigation_id, event_type, payload, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.event_id,
                entry.investigation_id,
                entry.event_type,
                entry.payload,
                entry.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn events_for_investigation(
        &self,
        investigation_id: &str,
    ) -> EngineResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT event_id, investigation_id, event_type, payload, recorded_at
             FROM investigation_event
             WHERE investigation_id = ?1
             ORDER BY rowid ASC",
        )?;
        let raw = stmt
            .query_map(params![investigation_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(raw.len());
        for (event_id, investigation_id, event_type, payload, recorded_at) in raw {
            entries.push(EventLogEntry {
                event_id,
                investigation_id,
                event_type,
                payload,
                recorded_at: parse_ts(&recorded_at)?,
            });
        }
        Ok(entries)
    }
}

// ── Column parsing ───────────────────────────────────────────────────────────

fn parse_stage(s: &str) -> EngineResult<LifecycleStage> {
    LifecycleStage::from_db(s)
        .ok_or_else(|| EngineError::Other(anyhow::anyhow!("unknown lifecycle_stage '{s}'")))
}

fn parse_status(s: &str) -> EngineResult<InvestigationStatus> {
    InvestigationStatus::from_db(s)
        .ok_or_else(|| EngineError::Other(anyhow::anyhow!("unknown status '{s}'")))
}

fn parse_ts(s: &str) -> EngineResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| anyhow::anyhow!("bad timestamp '{s}': {e}"))?
        .with_timezone(&Utc))
}
