//! # Opening Tactics
//!
//! Mines forced tactical sequences from the lines people actually play.
//!
//! Starting from a fixed position, the search walks the tree of popular
//! continuations breadth-first (move popularity comes from an opening
//! explorer), asks a UCI engine for the two best lines in every position and
//! keeps the positions where one move is clearly better than the rest. Such
//! a forced move is followed until the line resolves; lines that end in mate
//! or win material are written out as puzzles.
//!
//! ## Features
//!
//! - **Transposition-aware memo**: per-position statistics, analyses and
//!   tactic membership live in SQLite, keyed by a FEN without move counters,
//!   so re-running a search never repeats engine or network work
//! - **Exclusive checkouts**: each position record is read-modify-written
//!   through a scoped handle that commits on every exit path
//! - **Branch selection**: follow the top N moves, the moves covering a share
//!   of all games, or both, with a minimum game count
//! - **Forced-line detection**: mates straight from the principal variation,
//!   other lines extended while they stay forced, capture or check
//!
//! ## Quick Start
//!
//! ```no_run
//! use opening_tactics::{run_search, LichessExplorer, PositionStore, SearchParams, TacticStore, UciEngine};
//!
//! # fn main() -> opening_tactics::Result<()> {
//! let params = SearchParams::from_file("italian.json")?;
//! let store = PositionStore::new("positions.db");
//! let tactics = TacticStore::new("puzzles")?;
//! let mut engine = UciEngine::spawn(&params.engine)?;
//! let stats = LichessExplorer::new(params.stats.clone());
//!
//! let summary = run_search(&params, &store, &tactics, &mut engine, stats)?;
//! println!("{} new tactics", summary.tactics_found);
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod errors;
pub mod position;
pub mod score;

pub mod analysis;
pub mod config;
pub mod engine;
pub mod explorer;
pub mod position_store;
pub mod search;
pub mod stats;
pub mod tactic;
pub mod tactic_store;

// Re-export commonly used types
pub use errors::{Result, TacticMinerError};

pub use analysis::{Analysis, AnalysisOutcome, Force, ScoredPv};
pub use config::{EngineParams, ExplorerParams, SearchParams, StatsParams, TacticParams};
pub use engine::{AnalysisEngine, UciEngine};
pub use explorer::{filter_top_moves, Explorer};
pub use position::{Line, PositionKey};
pub use position_store::{PositionHandle, PositionRecord, PositionStore};
pub use score::{PovScore, Score, ScoreRecord};
pub use search::{mark_tactic_positions, run_search, SearchSummary, TacticSearch};
pub use stats::{LichessExplorer, MoveStat, StatsProvider};
pub use tactic::{Tactic, TacticDetector, TacticRecord};
pub use tactic_store::TacticStore;
