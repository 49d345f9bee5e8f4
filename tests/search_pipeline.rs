//! Search Pipeline Tests
//!
//! Drives full mining passes with a scripted engine and scripted move
//! statistics, so every position's evaluation and popularity is known up
//! front.

use chess::{Board, BoardStatus, ChessMove, MoveGen};
use opening_tactics::{
    run_search, Analysis, AnalysisEngine, Line, MoveStat, PositionKey, PositionStore, PovScore, Result,
    Score, ScoredPv, SearchParams, StatsProvider, TacticSearch, TacticStore,
};
use std::collections::HashMap;
use std::fs;
use std::str::FromStr;

fn mv(uci: &str) -> ChessMove {
    ChessMove::from_str(uci).unwrap()
}

fn line(fen: &str, ucis: &[&str]) -> Line {
    let ucis: Vec<String> = ucis.iter().map(|m| m.to_string()).collect();
    Line::from_uci(fen, &ucis).unwrap()
}

fn analysis(board: &Board, lines: &[(&str, Score)]) -> Analysis {
    let turn = board.side_to_move();
    let result = lines
        .iter()
        .map(|(uci, score)| ScoredPv::new(vec![mv(uci)], PovScore::new(*score, turn)).unwrap())
        .collect();
    Analysis::new("scripted", 20, turn, result).unwrap()
}

/// Answers from a script; unscripted positions get two equal quiet lines
#[derive(Default)]
struct ScriptedEngine {
    script: HashMap<PositionKey, Analysis>,
    queries: usize,
}

impl ScriptedEngine {
    fn with(mut self, fen: &str, moves: &[&str], lines: &[(&str, Score)]) -> Self {
        let line = line(fen, moves);
        self.script.insert(line.key(), analysis(line.board(), lines));
        self
    }
}

impl AnalysisEngine for ScriptedEngine {
    fn analyse(&mut self, board: &Board) -> Result<Option<Analysis>> {
        self.queries += 1;
        if board.status() != BoardStatus::Ongoing {
            return Ok(None);
        }
        if let Some(analysis) = self.script.get(&PositionKey::of(board)) {
            return Ok(Some(analysis.clone()));
        }

        let legal: Vec<ChessMove> = MoveGen::new_legal(board).collect();
        let first = legal[0].to_string();
        let second = legal.get(1).unwrap_or(&legal[0]).to_string();
        Ok(Some(analysis(board, &[(first.as_str(), Score::Cp(0)), (second.as_str(), Score::Cp(0))])))
    }
}

/// Popularity from a script; unscripted positions have no games
#[derive(Default)]
struct ScriptedStats {
    script: HashMap<PositionKey, Vec<MoveStat>>,
    calls: usize,
}

impl ScriptedStats {
    fn with(mut self, fen: &str, moves: &[&str], popular: &[(&str, u64)]) -> Self {
        let line = line(fen, moves);
        let stats = popular
            .iter()
            .map(|(uci, games)| MoveStat::new(mv(uci), *games, 0, 0))
            .collect();
        self.script.insert(line.key(), stats);
        self
    }
}

impl StatsProvider for ScriptedStats {
    fn top_moves(&mut self, board: &Board) -> Result<Vec<MoveStat>> {
        self.calls += 1;
        Ok(self.script.get(&PositionKey::of(board)).cloned().unwrap_or_default())
    }
}

fn params(start_fen: &str, max_depth: usize, top_n: usize) -> SearchParams {
    let raw = format!(
        r#"{{
            "start_fen": "{}",
            "engine": {{"exec": "/usr/bin/stockfish", "depth": 20}},
            "search": {{"max_depth": {}, "top_n": {}}}
        }}"#,
        start_fen, max_depth, top_n
    );
    SearchParams::from_json(&raw).unwrap()
}

const BACK_RANK: &str = "3r2k1/5ppp/8/8/8/8/5PPP/3R2K1 b - - 0 1";

fn back_rank_script() -> (ScriptedEngine, ScriptedStats) {
    let engine = ScriptedEngine::default().with(
        BACK_RANK,
        &["g8h8"],
        &[("d1d8", Score::Mate(1)), ("g1f1", Score::Cp(0))],
    );
    let stats = ScriptedStats::default().with(BACK_RANK, &[], &[("h7h6", 60), ("g8h8", 40)]);
    (engine, stats)
}

#[test]
fn test_mate_after_popular_blunder_is_stored() {
    let dir = tempfile::tempdir().unwrap();
    let store = PositionStore::new(dir.path().join("positions.db"));
    let tactics = TacticStore::new(dir.path().join("puzzles")).unwrap();
    let params = params(BACK_RANK, 1, 2);
    let (mut engine, mut stats) = back_rank_script();

    let summary = run_search(&params, &store, &tactics, &mut engine, &mut stats).unwrap();

    assert_eq!(summary.positions_examined, 3);
    assert_eq!(summary.tactics_found, 1);
    assert_eq!(summary.engine_queries, 3);
    assert_eq!(stats.calls, 1);

    let file = dir.path().join("puzzles").join("g8h8.json");
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(file).unwrap()).unwrap();
    assert_eq!(json["variation_start"], serde_json::json!(BACK_RANK));
    assert_eq!(json["variation"], serde_json::json!(["g8h8"]));
    assert_eq!(json["score"], serde_json::json!({"mate": 1, "cp": null}));
    assert_eq!(json["solution"], serde_json::json!(["d1d8"]));

    let root = fs::read_to_string(dir.path().join("puzzles").join("root.fen")).unwrap();
    assert_eq!(root.trim(), BACK_RANK);

    let listed = tactics.list().unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_mate());
}

#[test]
fn test_second_pass_reuses_the_memo() {
    let dir = tempfile::tempdir().unwrap();
    let store = PositionStore::new(dir.path().join("positions.db"));
    let tactics = TacticStore::new(dir.path().join("puzzles")).unwrap();
    let params = params(BACK_RANK, 1, 2);

    let (mut engine, mut stats) = back_rank_script();
    run_search(&params, &store, &tactics, &mut engine, &mut stats).unwrap();

    let (mut engine, mut stats) = back_rank_script();
    let summary = run_search(&params, &store, &tactics, &mut engine, &mut stats).unwrap();

    assert_eq!(summary.positions_examined, 3);
    assert_eq!(summary.engine_queries, 0);
    assert_eq!(summary.known_tactic_positions, 1);
    assert_eq!(summary.tactics_found, 0);
    assert_eq!(engine.queries, 0);
    assert_eq!(stats.calls, 0);
}

#[test]
fn test_free_rook_is_followed_through_the_reply() {
    let fen = "4k3/8/8/8/8/8/r7/R3K3 w - - 0 1";
    let store = PositionStore::in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let tactics = TacticStore::new(dir.path()).unwrap();
    let params = params(fen, 1, 1);

    let mut engine = ScriptedEngine::default()
        .with(fen, &[], &[("a1a2", Score::Cp(500)), ("e1d1", Score::Cp(0))])
        .with(fen, &["a1a2"], &[("e8d7", Score::Cp(-500)), ("e8e7", Score::Cp(-500))]);

    let summary = TacticSearch::new(&params, &store, &tactics)
        .run(&mut engine, ScriptedStats::default())
        .unwrap();

    assert_eq!(summary.tactics_found, 1);
    // The explorer follows the solution into the known tactic
    assert_eq!(summary.positions_examined, 2);
    assert_eq!(summary.known_tactic_positions, 1);

    let found = tactics.list().unwrap();
    assert_eq!(found.len(), 1);
    let tactic = &found[0];
    assert_eq!(tactic.solution, vec![mv("a1a2"), mv("e8d7")]);
    assert_eq!(tactic.material_balance(), 5);
    assert_eq!(tactic.score.white(), Score::Cp(500));
    assert!(dir.path().join("root.json").exists());

    let after_capture = line(fen, &["a1a2"]);
    let position = store.load(after_capture.board()).unwrap();
    assert_eq!(position.tactic_ply(), Some(1));
    assert_eq!(position.forced_move(), Some(mv("e8d7")));
}

#[test]
fn test_even_trade_is_rejected() {
    let fen = "r3k3/8/1n6/8/8/8/8/R3K3 w - - 0 1";
    let store = PositionStore::in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let tactics = TacticStore::new(dir.path()).unwrap();
    let params = params(fen, 0, 1);

    let mut engine = ScriptedEngine::default()
        .with(fen, &[], &[("a1a8", Score::Cp(50)), ("e1d2", Score::Cp(-100))])
        .with(fen, &["a1a8"], &[("b6a8", Score::Cp(0)), ("e8e7", Score::Cp(-500))])
        .with(fen, &["a1a8", "b6a8"], &[("e1d2", Score::Cp(0)), ("e1e2", Score::Cp(0))]);

    let summary = TacticSearch::new(&params, &store, &tactics)
        .run(&mut engine, ScriptedStats::default())
        .unwrap();

    assert_eq!(summary.positions_examined, 1);
    assert_eq!(summary.tactics_found, 0);
    assert_eq!(summary.tactics_rejected, 1);
    assert!(tactics.list().unwrap().is_empty());

    let root = store.load(&Board::from_str(fen).unwrap()).unwrap();
    assert!(!root.in_tactic());
    assert!(root.analysis().is_some());
}

#[test]
fn test_transpositions_share_one_analysis() {
    let start = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    let store = PositionStore::in_memory().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let tactics = TacticStore::new(dir.path()).unwrap();
    let params = params(start, 4, 2);

    let stats = ScriptedStats::default()
        .with(start, &[], &[("g1f3", 100), ("b1c3", 50)])
        .with(start, &["g1f3"], &[("g8f6", 80)])
        .with(start, &["b1c3"], &[("b8c6", 30)])
        .with(start, &["g1f3", "g8f6"], &[("b1c3", 20)])
        .with(start, &["b1c3", "b8c6"], &[("g1f3", 20)])
        .with(start, &["g1f3", "g8f6", "b1c3"], &[("b8c6", 10)])
        .with(start, &["b1c3", "b8c6", "g1f3"], &[("g8f6", 10)]);
    let mut engine = ScriptedEngine::default();

    let summary = TacticSearch::new(&params, &store, &tactics)
        .run(&mut engine, stats)
        .unwrap();

    assert_eq!(summary.positions_examined, 9);
    assert_eq!(summary.engine_queries, 8);
    assert_eq!(engine.queries, 8);
    assert_eq!(summary.tactics_found, 0);
    assert_eq!(store.len().unwrap(), 8);
}

#[test]
fn test_closed_store_stops_the_search() {
    let dir = tempfile::tempdir().unwrap();
    let store = PositionStore::new(dir.path().join("positions.db"));
    let tactics = TacticStore::new(dir.path().join("puzzles")).unwrap();
    let params = params(BACK_RANK, 1, 2);
    let (mut engine, stats) = back_rank_script();

    let result = TacticSearch::new(&params, &store, &tactics).run(&mut engine, stats);
    assert!(matches!(result, Err(opening_tactics::TacticMinerError::StoreNotOpen)));
    assert_eq!(engine.queries, 0);
}
