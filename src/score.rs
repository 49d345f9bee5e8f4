use chess::Color;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Neg;

use crate::position::serde_uci;

/// Engine evaluation from one side's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    /// Moves to mate; positive when the side holding the score mates
    Mate(i32),
    /// Centipawns
    Cp(i32),
}

impl Score {
    pub fn is_mate(&self) -> bool {
        matches!(self, Score::Mate(_))
    }

    pub fn mate(&self) -> Option<i32> {
        match self {
            Score::Mate(n) => Some(*n),
            Score::Cp(_) => None,
        }
    }

    pub fn cp(&self) -> Option<i32> {
        match self {
            Score::Cp(cp) => Some(*cp),
            Score::Mate(_) => None,
        }
    }
}

impl Neg for Score {
    type Output = Score;

    fn neg(self) -> Score {
        match self {
            Score::Mate(n) => Score::Mate(-n),
            Score::Cp(cp) => Score::Cp(-cp),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Mate(n) if *n >= 0 => write!(f, "#+{}", n),
            Score::Mate(n) => write!(f, "#{}", n),
            Score::Cp(cp) => write!(f, "{:+}", cp),
        }
    }
}

/// Score relative to the side to move, as UCI engines report it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PovScore {
    pub relative: Score,
    #[serde(with = "serde_uci::color")]
    pub turn: Color,
}

impl PovScore {
    pub fn new(relative: Score, turn: Color) -> Self {
        Self { relative, turn }
    }

    pub fn pov(&self, color: Color) -> Score {
        if color == self.turn {
            self.relative
        } else {
            -self.relative
        }
    }

    pub fn white(&self) -> Score {
        self.pov(Color::White)
    }

    pub fn is_mate(&self) -> bool {
        self.relative.is_mate()
    }

    /// Rebuild from a White-relative score for a position with `turn` to move
    pub fn from_white(score: Score, turn: Color) -> Self {
        let relative = if turn == Color::White { score } else { -score };
        Self { relative, turn }
    }
}

impl fmt::Display for PovScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.white())
    }
}

/// Persisted score form: exactly one field set, always White-relative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub mate: Option<i32>,
    pub cp: Option<i32>,
}

impl From<Score> for ScoreRecord {
    fn from(score: Score) -> Self {
        Self {
            mate: score.mate(),
            cp: score.cp(),
        }
    }
}

impl ScoreRecord {
    pub fn from_pov(score: &PovScore) -> Self {
        score.white().into()
    }

    pub fn to_score(self) -> Option<Score> {
        match (self.mate, self.cp) {
            (Some(n), None) => Some(Score::Mate(n)),
            (None, Some(cp)) => Some(Score::Cp(cp)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mate_record_is_white_relative() {
        let score = PovScore::new(Score::Mate(2), Color::Black);

        let record = ScoreRecord::from_pov(&score);
        assert_eq!(record, ScoreRecord { mate: Some(-2), cp: None });

        let parsed = PovScore::from_white(record.to_score().unwrap(), Color::Black);
        assert_eq!(parsed.relative, Score::Mate(2));
        assert_eq!(parsed.turn, Color::Black);
    }

    #[test]
    fn test_cp_record_is_white_relative() {
        let score = PovScore::new(Score::Cp(123), Color::Black);

        let record = ScoreRecord::from_pov(&score);
        assert_eq!(record, ScoreRecord { mate: None, cp: Some(-123) });

        let parsed = PovScore::from_white(record.to_score().unwrap(), Color::Black);
        assert_eq!(parsed.relative, Score::Cp(123));
    }

    #[test]
    fn test_record_json_shape() {
        let record = ScoreRecord::from(Score::Mate(1));
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json, serde_json::json!({"mate": 1, "cp": null}));
    }

    #[test]
    fn test_record_needs_exactly_one_field() {
        assert_eq!(ScoreRecord { mate: None, cp: None }.to_score(), None);
        assert_eq!(ScoreRecord { mate: Some(1), cp: Some(5) }.to_score(), None);
    }
}
