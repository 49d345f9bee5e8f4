use chess::{ChessMove, Color};
use serde::{Deserialize, Serialize};

use std::convert::TryFrom;

use crate::errors::{Result, TacticMinerError};
use crate::malformed_analysis;
use crate::position::serde_uci;
use crate::score::{PovScore, Score};

/// One principal variation with its evaluation; never empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedPv")]
pub struct ScoredPv {
    #[serde(with = "serde_uci::moves")]
    pv: Vec<ChessMove>,
    score: PovScore,
}

#[derive(Deserialize)]
struct UncheckedPv {
    #[serde(with = "serde_uci::moves")]
    pv: Vec<ChessMove>,
    score: PovScore,
}

impl TryFrom<UncheckedPv> for ScoredPv {
    type Error = TacticMinerError;

    fn try_from(raw: UncheckedPv) -> Result<Self> {
        ScoredPv::new(raw.pv, raw.score)
    }
}

impl ScoredPv {
    pub fn new(pv: Vec<ChessMove>, score: PovScore) -> Result<Self> {
        if pv.is_empty() {
            return Err(malformed_analysis!("principal variation is empty"));
        }
        Ok(Self { pv, score })
    }

    pub fn pv(&self) -> &[ChessMove] {
        &self.pv
    }

    pub fn score(&self) -> PovScore {
        self.score
    }

    pub fn first_move(&self) -> ChessMove {
        self.pv[0]
    }
}

/// Gap between the best and second best line. `Unbounded` covers only
/// moves and lines where either side is mating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Force {
    Unbounded,
    Centipawns(i32),
}

impl Force {
    pub fn exceeds(&self, threshold: i32) -> bool {
        match self {
            Force::Unbounded => true,
            Force::Centipawns(gap) => *gap > threshold,
        }
    }
}

/// Multi-PV engine result for one position, best line first. Holds at
/// least one line, all scored for `turn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedAnalysis")]
pub struct Analysis {
    engine: String,
    depth: u32,
    #[serde(with = "serde_uci::color")]
    turn: Color,
    result: Vec<ScoredPv>,
}

#[derive(Deserialize)]
struct UncheckedAnalysis {
    engine: String,
    depth: u32,
    #[serde(with = "serde_uci::color")]
    turn: Color,
    result: Vec<ScoredPv>,
}

impl TryFrom<UncheckedAnalysis> for Analysis {
    type Error = TacticMinerError;

    fn try_from(raw: UncheckedAnalysis) -> Result<Self> {
        Analysis::new(raw.engine, raw.depth, raw.turn, raw.result)
    }
}

impl Analysis {
    pub fn new(engine: impl Into<String>, depth: u32, turn: Color, result: Vec<ScoredPv>) -> Result<Self> {
        if result.is_empty() {
            return Err(malformed_analysis!("engine returned no principal variation"));
        }
        if let Some(pv) = result.iter().find(|pv| pv.score.turn != turn) {
            return Err(malformed_analysis!(
                "line {} is scored for the wrong side",
                pv.pv.first().map(|mv| mv.to_string()).unwrap_or_default()
            ));
        }
        Ok(Self {
            engine: engine.into(),
            depth,
            turn,
            result,
        })
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    pub fn lines(&self) -> &[ScoredPv] {
        &self.result
    }

    pub fn best(&self) -> &ScoredPv {
        &self.result[0]
    }

    pub fn alternate(&self) -> Option<&ScoredPv> {
        self.result.get(1)
    }

    pub fn best_move(&self) -> ChessMove {
        self.best().first_move()
    }

    pub fn evaluation(&self) -> PovScore {
        self.best().score
    }

    pub fn only_move(&self) -> bool {
        self.alternate().is_none()
    }

    /// Either side is mating on the best line
    pub fn is_mate(&self) -> bool {
        self.best().score.is_mate()
    }

    /// The side to move mates on the best line
    pub fn delivers_mate(&self) -> bool {
        matches!(self.best().score.relative, Score::Mate(n) if n > 0)
    }

    pub fn force(&self) -> Force {
        if self.is_mate() {
            return Force::Unbounded;
        }
        let alternate = match self.alternate() {
            Some(alternate) => alternate,
            None => return Force::Unbounded,
        };

        match (self.best().score.relative, alternate.score.relative) {
            (Score::Cp(best), Score::Cp(alt)) => Force::Centipawns(best - alt),
            _ => Force::Unbounded,
        }
    }

    pub fn is_forced(&self, threshold: i32) -> bool {
        self.force().exceeds(threshold)
    }
}

/// Memoized engine outcome for a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnalysisOutcome {
    /// Checkmate or stalemate on the board; nothing to analyse
    GameOver,
    Analysed(Analysis),
}

impl From<Option<Analysis>> for AnalysisOutcome {
    fn from(analysis: Option<Analysis>) -> Self {
        match analysis {
            Some(analysis) => AnalysisOutcome::Analysed(analysis),
            None => AnalysisOutcome::GameOver,
        }
    }
}

impl AnalysisOutcome {
    pub fn analysis(&self) -> Option<&Analysis> {
        match self {
            AnalysisOutcome::Analysed(analysis) => Some(analysis),
            AnalysisOutcome::GameOver => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TacticMinerError;
    use std::str::FromStr;

    fn pv(moves: &[&str], score: Score) -> ScoredPv {
        let moves = moves.iter().map(|m| ChessMove::from_str(m).unwrap()).collect();
        ScoredPv::new(moves, PovScore::new(score, Color::White)).unwrap()
    }

    fn analysis(lines: Vec<ScoredPv>) -> Analysis {
        Analysis::new("stockfish", 20, Color::White, lines).unwrap()
    }

    #[test]
    fn test_gap_between_lines() {
        let a = analysis(vec![pv(&["e2e4"], Score::Cp(250)), pv(&["d2d4"], Score::Cp(40))]);
        assert_eq!(a.force(), Force::Centipawns(210));
        assert!(a.is_forced(100));
        assert!(!a.is_forced(210));
    }

    #[test]
    fn test_only_move_is_forced() {
        let a = analysis(vec![pv(&["e1d1"], Score::Cp(-30))]);
        assert!(a.only_move());
        assert_eq!(a.force(), Force::Unbounded);
        assert!(a.is_forced(10_000));
    }

    #[test]
    fn test_mate_on_either_line_is_unbounded() {
        let mating = analysis(vec![pv(&["d1d8"], Score::Mate(1)), pv(&["d1d2"], Score::Cp(300))]);
        assert!(mating.delivers_mate());
        assert_eq!(mating.force(), Force::Unbounded);

        let mated = analysis(vec![pv(&["g8h8"], Score::Mate(-2)), pv(&["g8f8"], Score::Mate(-1))]);
        assert!(mated.is_mate());
        assert!(!mated.delivers_mate());

        let alt_blunders = analysis(vec![pv(&["e2e4"], Score::Cp(10)), pv(&["f2f3"], Score::Mate(-3))]);
        assert_eq!(alt_blunders.force(), Force::Unbounded);
    }

    #[test]
    fn test_empty_result_is_malformed() {
        let error = Analysis::new("stockfish", 20, Color::White, vec![]).unwrap_err();
        assert!(matches!(error, TacticMinerError::MalformedAnalysis(_)));

        let error = ScoredPv::new(vec![], PovScore::new(Score::Cp(0), Color::White)).unwrap_err();
        assert!(matches!(error, TacticMinerError::MalformedAnalysis(_)));
    }

    #[test]
    fn test_decoding_rejects_empty_lines() {
        let valid = analysis(vec![pv(&["e2e4"], Score::Cp(30))]);

        let mut no_lines = serde_json::to_value(&valid).unwrap();
        no_lines["result"] = serde_json::json!([]);
        assert!(serde_json::from_value::<Analysis>(no_lines).is_err());

        let mut empty_pv = serde_json::to_value(&valid).unwrap();
        empty_pv["result"][0]["pv"] = serde_json::json!([]);
        assert!(serde_json::from_value::<Analysis>(empty_pv).is_err());

        // Same field layout as a stored record, with the lines missing
        let corrupted = bincode::serialize(&("stockfish", 20u32, "white", Vec::<ScoredPv>::new())).unwrap();
        assert!(bincode::deserialize::<Analysis>(&corrupted).is_err());
        assert!(bincode::deserialize::<Analysis>(&bincode::serialize(&valid).unwrap()).is_ok());
    }

    #[test]
    fn test_outcome_survives_bincode() {
        let outcome = AnalysisOutcome::Analysed(analysis(vec![
            pv(&["e2e4", "e7e5"], Score::Cp(30)),
            pv(&["d2d4"], Score::Cp(25)),
        ]));
        let bytes = bincode::serialize(&outcome).unwrap();
        let decoded: AnalysisOutcome = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, outcome);
    }
}
