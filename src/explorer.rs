use chess::ChessMove;
use std::collections::VecDeque;
use tracing::trace;

use crate::config::ExplorerParams;
use crate::errors::Result;
use crate::position::Line;
use crate::position_store::PositionStore;
use crate::stats::{MoveStat, StatsProvider};

/// Pick the branches worth following from popularity-ordered statistics.
///
/// `top_n` truncates the list first. Walking the rest in order, a move with
/// fewer than `min_games` games ends the walk, and the walk also ends right
/// after the accepted moves' share of all games (counted over the untruncated
/// list) exceeds `top_percent`.
pub fn filter_top_moves(moves: &[MoveStat], params: &ExplorerParams) -> Vec<ChessMove> {
    let total: u64 = moves.iter().map(MoveStat::games).sum();
    let candidates = match params.top_n {
        Some(n) => &moves[..n.min(moves.len())],
        None => moves,
    };

    let mut accepted = Vec::new();
    let mut cumulative: u64 = 0;

    for stat in candidates {
        if let Some(min_games) = params.min_games {
            if stat.games() < min_games {
                break;
            }
        }

        accepted.push(stat.mv);

        if let Some(percent) = params.top_percent {
            cumulative += stat.games();
            // cumulative / total > percent / 100, kept in integers
            if cumulative * 100 > u64::from(percent) * total {
                break;
            }
        }
    }

    accepted
}

/// Breadth-first walk over the positions reachable from a start position.
///
/// Each position is yielded before its children are chosen, so the
/// consumer can mark it as part of a tactic first; such positions then get
/// the tactic's next move as their only child instead of statistical
/// branches.
pub struct Explorer<'a, S: StatsProvider> {
    start: Line,
    params: ExplorerParams,
    store: &'a PositionStore,
    stats: S,
    queue: VecDeque<Line>,
    last_emitted: Option<Line>,
    failed: bool,
}

impl<'a, S: StatsProvider> Explorer<'a, S> {
    pub fn new(start: Line, params: ExplorerParams, store: &'a PositionStore, stats: S) -> Result<Self> {
        params.validate()?;
        let queue = VecDeque::from([start.clone()]);
        Ok(Self {
            start,
            params,
            store,
            stats,
            queue,
            last_emitted: None,
            failed: false,
        })
    }

    /// Begin again from the start position
    pub fn restart(&mut self) {
        self.queue = VecDeque::from([self.start.clone()]);
        self.last_emitted = None;
        self.failed = false;
    }

    /// Moves to follow out of `line`'s position
    pub fn branch_moves(&mut self, line: &Line) -> Result<Vec<ChessMove>> {
        let mut position = self.store.load(line.board())?;

        let moves = if position.in_tactic() {
            position.forced_move().into_iter().collect()
        } else {
            if position.top_moves().is_none() {
                let fetched = self.stats.top_moves(line.board())?;
                position.set_top_moves(fetched);
            }
            filter_top_moves(position.top_moves().unwrap_or_default(), &self.params)
        };

        position.commit()?;
        Ok(moves)
    }

    fn expand(&mut self, line: Line) -> Result<()> {
        if line.ply() >= self.params.max_depth {
            return Ok(());
        }

        let moves = self.branch_moves(&line)?;
        trace!(line = %line, children = moves.len(), "expanding position");
        for mv in moves {
            self.queue.push_back(line.play(mv)?);
        }
        Ok(())
    }
}

impl<S: StatsProvider> Iterator for Explorer<'_, S> {
    type Item = Result<Line>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        if let Some(line) = self.last_emitted.take() {
            if let Err(e) = self.expand(line) {
                self.failed = true;
                return Some(Err(e));
            }
        }

        let line = self.queue.pop_front()?;
        self.last_emitted = Some(line.clone());
        Some(Ok(line))
    }
}
