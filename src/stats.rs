use chess::{Board, ChessMove};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StatsParams;
use crate::errors::resilience::retry_while_rate_limited;
use crate::errors::{Result, TacticMinerError};
use crate::position::{parse_uci_move, serde_uci};

/// Crowd results for one candidate move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveStat {
    #[serde(with = "serde_uci::single")]
    pub mv: ChessMove,
    pub white: u64,
    pub black: u64,
    pub draws: u64,
}

impl MoveStat {
    pub fn new(mv: ChessMove, white: u64, black: u64, draws: u64) -> Self {
        Self { mv, white, black, draws }
    }

    /// Popularity: games played with this move, whatever the result
    pub fn games(&self) -> u64 {
        self.white + self.black + self.draws
    }
}

/// Source of move popularity for a position
pub trait StatsProvider {
    /// Candidate moves ordered by descending popularity
    fn top_moves(&mut self, board: &Board) -> Result<Vec<MoveStat>>;
}

impl<P: StatsProvider + ?Sized> StatsProvider for &mut P {
    fn top_moves(&mut self, board: &Board) -> Result<Vec<MoveStat>> {
        (**self).top_moves(board)
    }
}

/// Stable sort by descending game count; equal counts keep provider order
pub fn sort_by_popularity(moves: &mut [MoveStat]) {
    moves.sort_by(|a, b| b.games().cmp(&a.games()));
}

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    moves: Vec<ExplorerMove>,
}

#[derive(Debug, Deserialize)]
struct ExplorerMove {
    uci: String,
    white: u64,
    black: u64,
    draws: u64,
}

/// Lichess opening explorer client
pub struct LichessExplorer {
    params: StatsParams,
    agent: ureq::Agent,
}

impl LichessExplorer {
    pub fn new(params: StatsParams) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("opening-tactics/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { params, agent }
    }

    fn fetch(&self, fen: &str) -> Result<ExplorerResponse> {
        let response = self
            .agent
            .get(&self.params.url)
            .query("speeds", &self.params.speeds)
            .query("ratings", &self.params.ratings)
            .query("fen", fen)
            .query("topGames", "0")
            .query("recentGames", "0")
            .call();

        match response {
            Ok(response) => Ok(response.into_json()?),
            Err(ureq::Error::Status(429, _)) => Err(TacticMinerError::RateLimited(
                "opening explorer returned 429".to_string(),
            )),
            Err(ureq::Error::Status(code, _)) => Err(TacticMinerError::StatsError(format!(
                "opening explorer returned HTTP {} for {}",
                code, fen
            ))),
            Err(e) => Err(TacticMinerError::StatsError(e.to_string())),
        }
    }
}

impl StatsProvider for LichessExplorer {
    fn top_moves(&mut self, board: &Board) -> Result<Vec<MoveStat>> {
        let fen = board.to_string();
        let wait = Duration::from_secs(self.params.rate_limit_wait_secs);
        let response = retry_while_rate_limited("opening explorer", wait, || self.fetch(&fen))?;

        let mut moves = parse_moves(board, response.moves);
        sort_by_popularity(&mut moves);
        debug!(fen = %fen, candidates = moves.len(), "fetched move statistics");
        Ok(moves)
    }
}

fn parse_moves(board: &Board, raw: Vec<ExplorerMove>) -> Vec<MoveStat> {
    raw.into_iter()
        .filter_map(|entry| match parse_uci_move(board, &entry.uci) {
            Ok(mv) => Some(MoveStat::new(mv, entry.white, entry.black, entry.draws)),
            Err(e) => {
                warn!(uci = %entry.uci, error = %e, "skipping unusable explorer move");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn stat(uci: &str, white: u64, black: u64, draws: u64) -> MoveStat {
        MoveStat::new(ChessMove::from_str(uci).unwrap(), white, black, draws)
    }

    #[test]
    fn test_games_sums_outcomes() {
        assert_eq!(stat("e2e4", 1, 2, 3).games(), 6);
    }

    #[test]
    fn test_sort_is_stable_for_ties() {
        let mut moves = vec![
            stat("d2d4", 5, 5, 0),
            stat("e2e4", 20, 10, 0),
            stat("c2c4", 4, 4, 2),
        ];
        sort_by_popularity(&mut moves);
        let order: Vec<String> = moves.iter().map(|m| m.mv.to_string()).collect();
        assert_eq!(order, vec!["e2e4", "d2d4", "c2c4"]);
    }

    #[test]
    fn test_parse_explorer_payload() {
        let payload = r#"{
            "white": 100, "draws": 20, "black": 80,
            "moves": [
                {"uci": "e1h1", "san": "O-O", "white": 10, "draws": 2, "black": 5},
                {"uci": "a1a8", "san": "??", "white": 1, "draws": 0, "black": 0},
                {"uci": "d2d3", "san": "Qd3", "white": 3, "draws": 1, "black": 1}
            ],
            "topGames": []
        }"#;
        let response: ExplorerResponse = serde_json::from_str(payload).unwrap();
        let board = Board::from_str("r3k2r/pppq1ppp/2n2n2/3pp3/3PP3/2N2N2/PPPQ1PPP/R3K2R w KQkq - 0 1").unwrap();

        let moves = parse_moves(&board, response.moves);
        let ucis: Vec<String> = moves.iter().map(|m| m.mv.to_string()).collect();
        assert_eq!(ucis, vec!["e1g1", "d2d3"]);
        assert_eq!(moves[0].games(), 17);
    }
}
