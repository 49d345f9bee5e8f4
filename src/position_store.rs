//! Persistent per-position memo.
//!
//! Records are keyed by [`PositionKey`], so every move order that reaches a
//! position shares one record. Access goes through [`PositionHandle`]: at
//! most one handle per key is open at a time, and dropping (or committing)
//! the handle writes the record back.

use chess::{Board, ChessMove};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::analysis::AnalysisOutcome;
use crate::errors::{Result, TacticMinerError};
use crate::position::PositionKey;
use crate::stats::MoveStat;
use crate::tactic::Tactic;

/// Everything known about one position. Fields are filled at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    top_moves: Option<Vec<MoveStat>>,
    analysis: Option<AnalysisOutcome>,
    tactic: Option<Tactic>,
    /// Index of this position on `tactic`'s forced line; `None` off any tactic
    tactic_ply: Option<usize>,
}

impl PositionRecord {
    pub fn top_moves(&self) -> Option<&[MoveStat]> {
        self.top_moves.as_deref()
    }

    /// Returns false and keeps the old value if statistics are already cached
    pub fn set_top_moves(&mut self, moves: Vec<MoveStat>) -> bool {
        if self.top_moves.is_some() {
            return false;
        }
        self.top_moves = Some(moves);
        true
    }

    pub fn analysis(&self) -> Option<&AnalysisOutcome> {
        self.analysis.as_ref()
    }

    pub fn set_analysis(&mut self, analysis: AnalysisOutcome) -> bool {
        if self.analysis.is_some() {
            return false;
        }
        self.analysis = Some(analysis);
        true
    }

    pub fn tactic(&self) -> Option<&Tactic> {
        self.tactic.as_ref()
    }

    pub fn tactic_ply(&self) -> Option<usize> {
        self.tactic_ply
    }

    pub fn in_tactic(&self) -> bool {
        self.tactic.is_some()
    }

    pub fn starts_tactic(&self) -> bool {
        self.in_tactic() && self.tactic_ply == Some(0)
    }

    /// Place this position on `tactic` at `ply`. A position already on a
    /// tactic stays where it is.
    pub fn mark_tactic(&mut self, tactic: Tactic, ply: usize) -> bool {
        if self.tactic.is_some() {
            return false;
        }
        self.tactic = Some(tactic);
        self.tactic_ply = Some(ply);
        true
    }

    /// The solution move played from this position, if it lies on a tactic
    /// and the line continues from it.
    pub fn forced_move(&self) -> Option<ChessMove> {
        let tactic = self.tactic.as_ref()?;
        tactic.solution.get(self.tactic_ply?).copied()
    }
}

/// SQLite-backed memo of [`PositionRecord`]s
pub struct PositionStore {
    path: Option<PathBuf>,
    conn: RefCell<Option<Connection>>,
    checked_out: RefCell<HashSet<PositionKey>>,
}

impl PositionStore {
    /// Store backed by the database file at `path`; call [`open`](Self::open) before use
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            conn: RefCell::new(None),
            checked_out: RefCell::new(HashSet::new()),
        }
    }

    /// Already-open store that lives only as long as it stays open
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_tables(&conn)?;
        Ok(Self {
            path: None,
            conn: RefCell::new(Some(conn)),
            checked_out: RefCell::new(HashSet::new()),
        })
    }

    pub fn open(&self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        let path = self.path.as_ref().ok_or_else(|| {
            TacticMinerError::ConfigurationError("an in-memory store cannot be reopened".to_string())
        })?;

        let conn = Connection::open(path)?;
        create_tables(&conn)?;
        debug!(path = %path.display(), "position store opened");
        *self.conn.borrow_mut() = Some(conn);
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        let open = self.checked_out.borrow().len();
        if open > 0 {
            warn!(open, "closing position store with positions still checked out");
        }
        if let Some(conn) = self.conn.borrow_mut().take() {
            conn.close().map_err(|(_, e)| TacticMinerError::from(e))?;
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.conn.borrow().is_some()
    }

    /// Check out the record for `board`'s position.
    ///
    /// Fails with `AlreadyCheckedOut` while another handle for the same key
    /// is alive; that only happens when a caller re-enters itself.
    pub fn load(&self, board: &Board) -> Result<PositionHandle<'_>> {
        let key = PositionKey::of(board);
        if !self.is_open() {
            return Err(TacticMinerError::StoreNotOpen);
        }
        if self.checked_out.borrow().contains(&key) {
            return Err(TacticMinerError::AlreadyCheckedOut(key.to_string()));
        }

        let record = self.read(&key)?.unwrap_or_default();
        self.checked_out.borrow_mut().insert(key.clone());

        Ok(PositionHandle {
            store: self,
            key,
            record,
            committed: false,
        })
    }

    /// Number of stored positions
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.borrow();
        let conn = conn.as_ref().ok_or(TacticMinerError::StoreNotOpen)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM positions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn read(&self, key: &PositionKey) -> Result<Option<PositionRecord>> {
        let conn = self.conn.borrow();
        let conn = conn.as_ref().ok_or(TacticMinerError::StoreNotOpen)?;

        let bytes: Option<Vec<u8>> = conn
            .query_row(
                "SELECT record FROM positions WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match bytes {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &PositionKey, record: &PositionRecord) -> Result<()> {
        let conn = self.conn.borrow();
        let conn = conn.as_ref().ok_or(TacticMinerError::StoreNotOpen)?;

        let bytes = bincode::serialize(record)?;
        let updated_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        conn.execute(
            "INSERT OR REPLACE INTO positions (key, record, updated_at) VALUES (?1, ?2, ?3)",
            params![key.as_str(), bytes, updated_at],
        )?;
        Ok(())
    }

    /// Write `record` back and release the checkout. The checkout is released
    /// even when the write fails.
    fn commit(&self, key: &PositionKey, record: &PositionRecord) -> Result<()> {
        if !self.checked_out.borrow().contains(key) {
            return Err(TacticMinerError::NotCheckedOut(key.to_string()));
        }

        let written = self.write(key, record);
        self.checked_out.borrow_mut().remove(key);
        written
    }
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS positions (
            key TEXT PRIMARY KEY,
            record BLOB NOT NULL,
            updated_at INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    Ok(())
}

/// Exclusive, mutable view of one position's record
pub struct PositionHandle<'a> {
    store: &'a PositionStore,
    key: PositionKey,
    record: PositionRecord,
    committed: bool,
}

impl PositionHandle<'_> {
    pub fn key(&self) -> &PositionKey {
        &self.key
    }

    /// Write back now and surface any storage error
    pub fn commit(mut self) -> Result<()> {
        self.committed = true;
        self.store.commit(&self.key, &self.record)
    }
}

impl Deref for PositionHandle<'_> {
    type Target = PositionRecord;

    fn deref(&self) -> &PositionRecord {
        &self.record
    }
}

impl DerefMut for PositionHandle<'_> {
    fn deref_mut(&mut self) -> &mut PositionRecord {
        &mut self.record
    }
}

impl Drop for PositionHandle<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        if let Err(e) = self.store.commit(&self.key, &self.record) {
            error!(key = %self.key, error = %e, "failed to commit position record");
        }
    }
}
