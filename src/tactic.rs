use chess::{Board, BoardStatus, ChessMove, Color, Piece};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::convert::TryFrom;
use std::fmt;
use tracing::debug;

use crate::analysis::Analysis;
use crate::engine::AnalysisEngine;
use crate::errors::{Result, TacticMinerError};
use crate::position::{captured_piece, gives_check, moves_to_uci, parse_uci_move, san_line, Line, PositionKey};
use crate::score::{PovScore, Score, ScoreRecord};

pub fn piece_value(piece: Piece) -> i32 {
    match piece {
        Piece::Pawn => 1,
        Piece::Knight => 3,
        Piece::Bishop => 3,
        Piece::Rook => 5,
        Piece::Queen => 9,
        Piece::King => 0,
    }
}

/// A forced line found from a position reached in the search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TacticRecord", try_from = "TacticRecord")]
pub struct Tactic {
    /// FEN of the search root
    pub variation_start: String,
    /// Moves from the search root to the tactic's first position
    pub variation: Vec<ChessMove>,
    /// Evaluation reached when the line resolved
    pub score: PovScore,
    pub solution: Vec<ChessMove>,
    position: Board,
}

/// Persisted form of a [`Tactic`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticRecord {
    pub variation_start: String,
    pub variation: Vec<String>,
    /// White-relative
    pub score: ScoreRecord,
    pub solution: Vec<String>,
}

impl Tactic {
    pub fn new(line: &Line, score: PovScore, solution: Vec<ChessMove>) -> Self {
        Self {
            variation_start: line.root_fen().to_string(),
            variation: line.moves().to_vec(),
            score,
            solution,
            position: *line.board(),
        }
    }

    /// Board where the solution starts
    pub fn position(&self) -> &Board {
        &self.position
    }

    /// Side playing the tactic
    pub fn color(&self) -> Color {
        self.position.side_to_move()
    }

    /// Board after the whole solution has been played
    pub fn final_position(&self) -> Board {
        self.solution
            .iter()
            .fold(self.position, |board, &mv| board.make_move_new(mv))
    }

    /// The line ends in mate for the side playing the tactic, either by its
    /// score or because the last move checkmates on the board
    pub fn is_mate(&self) -> bool {
        if matches!(self.score.pov(self.color()), Score::Mate(n) if n > 0) {
            return true;
        }
        let end = self.final_position();
        end.status() == BoardStatus::Checkmate && end.side_to_move() != self.color()
    }

    /// Moves from the search root in numbered SAN
    pub fn variation_san(&self) -> Result<String> {
        san_line(&self.variation_start, &[], &self.variation)
    }

    /// Solution in numbered SAN, move numbers continuing from the variation
    pub fn solution_san(&self) -> Result<String> {
        san_line(&self.variation_start, &self.variation, &self.solution)
    }

    /// Net material won by the side playing the tactic over the solution
    pub fn material_balance(&self) -> i32 {
        let color = self.color();
        let mut board = self.position;
        let mut balance = 0;

        for &mv in &self.solution {
            if let Some((piece, owner)) = captured_piece(&board, mv) {
                if owner == color {
                    balance -= piece_value(piece);
                } else {
                    balance += piece_value(piece);
                }
            }
            board = board.make_move_new(mv);
        }
        balance
    }

    pub fn wins_material(&self) -> bool {
        self.material_balance() > 0
    }

    /// Mates, or comes out ahead in material
    pub fn is_worth_keeping(&self) -> bool {
        self.is_mate() || self.wins_material()
    }

    /// Unique per search root; derived from the moves that reach the tactic
    pub fn filename(&self) -> String {
        if self.variation.is_empty() {
            return "root.json".to_string();
        }
        format!("{}.json", moves_to_uci(&self.variation).join("-"))
    }

    /// Boards along the solution after the first move, paired with their
    /// index on the line. The final position is not included.
    pub fn line_positions(&self) -> Vec<(usize, Board)> {
        let mut board = self.position;
        let mut positions = Vec::new();

        for (ply, &mv) in self.solution.iter().enumerate() {
            if ply > 0 {
                positions.push((ply, board));
            }
            board = board.make_move_new(mv);
        }
        positions
    }

    pub fn to_record(&self) -> TacticRecord {
        TacticRecord {
            variation_start: self.variation_start.clone(),
            variation: moves_to_uci(&self.variation),
            score: ScoreRecord::from_pov(&self.score),
            solution: moves_to_uci(&self.solution),
        }
    }

    pub fn from_record(record: TacticRecord) -> Result<Self> {
        let line = Line::from_uci(&record.variation_start, &record.variation)?;
        let score = record.score.to_score().ok_or_else(|| {
            TacticMinerError::ValidationError {
                field: "score".to_string(),
                value: format!("{:?}", record.score),
                expected: "exactly one of mate or cp".to_string(),
            }
        })?;

        let mut board = *line.board();
        let mut solution = Vec::with_capacity(record.solution.len());
        for uci in &record.solution {
            let mv = parse_uci_move(&board, uci)?;
            board = board.make_move_new(mv);
            solution.push(mv);
        }

        let turn = line.board().side_to_move();
        Ok(Self::new(&line, PovScore::from_white(score, turn), solution))
    }
}

impl From<Tactic> for TacticRecord {
    fn from(tactic: Tactic) -> Self {
        tactic.to_record()
    }
}

impl TryFrom<TacticRecord> for Tactic {
    type Error = TacticMinerError;

    fn try_from(record: TacticRecord) -> Result<Self> {
        Tactic::from_record(record)
    }
}

impl fmt::Display for Tactic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let solution = self
            .solution_san()
            .unwrap_or_else(|_| moves_to_uci(&self.solution).join(" "));
        write!(f, "{} {}", self.score, solution)
    }
}

/// Recognizes positions that start a forced line and follows the line
/// until it resolves.
#[derive(Debug, Clone)]
pub struct TacticDetector {
    forced_threshold: i32,
}

impl TacticDetector {
    pub fn new(forced_threshold: i32) -> Self {
        Self { forced_threshold }
    }

    pub fn forced_threshold(&self) -> i32 {
        self.forced_threshold
    }

    /// A mate for the side to move is taken as-is from the principal
    /// variation. Otherwise, a forced best move is extended through the
    /// engine; anything else is not a tactic.
    pub fn find_in_position<E: AnalysisEngine + ?Sized>(
        &self,
        line: &Line,
        analysis: &Analysis,
        engine: &mut E,
    ) -> Result<Option<Tactic>> {
        if analysis.delivers_mate() {
            return Ok(Some(Tactic::new(line, analysis.evaluation(), analysis.best().pv().to_vec())));
        }
        if analysis.is_mate() {
            // Being mated is the opponent's tactic, found one ply earlier
            return Ok(None);
        }
        if !analysis.is_forced(self.forced_threshold) {
            return Ok(None);
        }

        let (solution, score) = self.calculate_forced_sequence(line.board(), analysis, engine)?;
        Ok(Some(Tactic::new(line, score, solution)))
    }

    /// Follow best moves while the line stays forced, the last move
    /// captured, or the last move gave check.
    pub fn calculate_forced_sequence<E: AnalysisEngine + ?Sized>(
        &self,
        start: &Board,
        analysis: &Analysis,
        engine: &mut E,
    ) -> Result<(Vec<ChessMove>, PovScore)> {
        let mut board = *start;
        let mut analysis = analysis.clone();
        let mut seen: HashSet<PositionKey> = HashSet::from([PositionKey::of(&board)]);
        let mut solution = Vec::new();

        loop {
            let mv = analysis.best_move();
            let score = analysis.evaluation();
            let captured = captured_piece(&board, mv).is_some();

            if !board.legal(mv) {
                return Err(TacticMinerError::InvalidMove(format!(
                    "engine suggested illegal move {} in {}",
                    mv, board
                )));
            }
            solution.push(mv);
            board = board.make_move_new(mv);

            if !seen.insert(PositionKey::of(&board)) {
                debug!(solution = %moves_to_uci(&solution).join(" "), "forced line repeats, stopping");
                return Ok((solution, score));
            }

            let next = match engine.analyse(&board)? {
                Some(next) => next,
                None => return Ok((solution, score)),
            };

            let keep_going = next.is_forced(self.forced_threshold) || captured || gives_check(&board);
            if !keep_going {
                return Ok((solution, score));
            }
            analysis = next;
        }
    }
}
