//! One full mining pass: explore, analyse, detect, persist.

use tracing::{debug, info, warn};

use crate::analysis::AnalysisOutcome;
use crate::config::SearchParams;
use crate::engine::AnalysisEngine;
use crate::errors::Result;
use crate::explorer::Explorer;
use crate::position::{moves_to_uci, Line};
use crate::position_store::PositionStore;
use crate::stats::StatsProvider;
use crate::tactic::{Tactic, TacticDetector};
use crate::tactic_store::TacticStore;

/// Counters for one search pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSummary {
    pub positions_examined: usize,
    pub known_tactic_positions: usize,
    pub tactics_found: usize,
    pub tactics_rejected: usize,
    pub engine_queries: usize,
}

/// Put every position along `tactic`'s solution (after its first move) on
/// the tactic, so later expansion follows the solution instead of the
/// statistics.
pub fn mark_tactic_positions(tactic: &Tactic, store: &PositionStore) -> Result<()> {
    for (ply, board) in tactic.line_positions() {
        let mut position = store.load(&board)?;
        if !position.mark_tactic(tactic.clone(), ply) {
            debug!(key = %position.key(), ply, "position already lies on another tactic");
        }
        position.commit()?;
    }
    Ok(())
}

/// Drives exploration and tactic detection over the whole tree
pub struct TacticSearch<'a> {
    params: &'a SearchParams,
    store: &'a PositionStore,
    tactics: &'a TacticStore,
    detector: TacticDetector,
}

impl<'a> TacticSearch<'a> {
    pub fn new(params: &'a SearchParams, store: &'a PositionStore, tactics: &'a TacticStore) -> Self {
        Self {
            params,
            store,
            tactics,
            detector: TacticDetector::new(params.tactics.forced_threshold),
        }
    }

    pub fn run<E, S>(&self, engine: &mut E, stats: S) -> Result<SearchSummary>
    where
        E: AnalysisEngine + ?Sized,
        S: StatsProvider,
    {
        let start = Line::from_fen(&self.params.start_fen)?;
        self.tactics.store_root(start.root_fen())?;

        let explorer = Explorer::new(start, self.params.search.clone(), self.store, stats)?;
        let mut summary = SearchSummary::default();

        for line in explorer {
            let line = line?;
            summary.positions_examined += 1;
            self.examine(&line, engine, &mut summary)?;
        }

        info!(
            examined = summary.positions_examined,
            on_known_tactics = summary.known_tactic_positions,
            found = summary.tactics_found,
            rejected = summary.tactics_rejected,
            engine_queries = summary.engine_queries,
            "search finished"
        );
        Ok(summary)
    }

    fn examine<E: AnalysisEngine + ?Sized>(
        &self,
        line: &Line,
        engine: &mut E,
        summary: &mut SearchSummary,
    ) -> Result<()> {
        let mut position = self.store.load(line.board())?;

        if position.in_tactic() {
            summary.known_tactic_positions += 1;
            if let (true, Some(tactic)) = (position.starts_tactic(), position.tactic()) {
                info!(line = %line, tactic = %tactic, "known tactic");
            } else {
                debug!(line = %line, ply = ?position.tactic_ply(), "on a known tactic");
            }
            return position.commit();
        }

        if position.analysis().is_none() {
            let outcome = AnalysisOutcome::from(engine.analyse(line.board())?);
            summary.engine_queries += 1;
            position.set_analysis(outcome);
        }
        let analysis = match position.analysis().and_then(AnalysisOutcome::analysis) {
            Some(analysis) => analysis.clone(),
            None => {
                debug!(line = %line, "game over");
                return position.commit();
            }
        };

        let tactic = match self.detector.find_in_position(line, &analysis, engine)? {
            Some(tactic) => tactic,
            None => return position.commit(),
        };

        if !tactic.is_worth_keeping() {
            summary.tactics_rejected += 1;
            debug!(
                line = %line,
                solution = %moves_to_uci(&tactic.solution).join(" "),
                balance = tactic.material_balance(),
                "forced line wins nothing"
            );
            return position.commit();
        }

        position.mark_tactic(tactic.clone(), 0);
        position.commit()?;
        mark_tactic_positions(&tactic, self.store)?;

        let file = self.tactics.store(&tactic)?;
        summary.tactics_found += 1;
        info!(line = %line, tactic = %tactic, file = %file.display(), "new tactic");
        Ok(())
    }
}

/// Open the position store, run one pass and close the store again
pub fn run_search<E, S>(
    params: &SearchParams,
    store: &PositionStore,
    tactics: &TacticStore,
    engine: &mut E,
    stats: S,
) -> Result<SearchSummary>
where
    E: AnalysisEngine + ?Sized,
    S: StatsProvider,
{
    store.open()?;
    let result = TacticSearch::new(params, store, tactics).run(engine, stats);
    if let Err(e) = store.close() {
        warn!(error = %e, "position store did not close cleanly");
    }
    result
}
