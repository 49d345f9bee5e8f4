use chess::{Board, BoardStatus, ChessMove, Color, File, Piece, Square};
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, Chess, Position as _};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Result, TacticMinerError};
use crate::invalid_position;

/// Canonical identity of a position: piece placement, side to move,
/// castling rights and en-passant target. Move counters are dropped so
/// transpositions and repeated positions share one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionKey(String);

impl PositionKey {
    pub fn of(board: &Board) -> Self {
        Self::from_fen(&board.to_string())
    }

    /// Key of a full or truncated FEN string
    pub fn from_fen(fen: &str) -> Self {
        let fields: Vec<&str> = fen.split_whitespace().take(4).collect();
        PositionKey(fields.join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn parse_fen(fen: &str) -> Result<Board> {
    Board::from_str(fen).map_err(|e| invalid_position!("{}: {}", fen, e))
}

/// Parse a UCI move and check it is legal in `board`.
///
/// Castling written as king-takes-rook (`e1h1`) is rewritten to the
/// king-two-squares form the board expects.
pub fn parse_uci_move(board: &Board, uci: &str) -> Result<ChessMove> {
    let parsed = ChessMove::from_str(uci)
        .map_err(|_| TacticMinerError::InvalidMove(format!("cannot parse '{}'", uci)))?;
    let mv = normalize_castling(board, parsed);

    if board.legal(mv) {
        Ok(mv)
    } else {
        Err(TacticMinerError::InvalidMove(format!(
            "'{}' is illegal in {}",
            uci, board
        )))
    }
}

fn normalize_castling(board: &Board, mv: ChessMove) -> ChessMove {
    let source = mv.get_source();
    let dest = mv.get_dest();

    if board.piece_on(source) != Some(Piece::King) || board.color_on(dest) != board.color_on(source) {
        return mv;
    }
    if board.piece_on(dest) != Some(Piece::Rook) || source.get_rank() != dest.get_rank() {
        return mv;
    }

    let file = if dest.get_file().to_index() > source.get_file().to_index() { File::G } else { File::C };
    ChessMove::new(source, Square::make_square(source.get_rank(), file), None)
}

/// Whether `mv` removes an enemy piece, en passant included.
pub fn is_capture(board: &Board, mv: ChessMove) -> bool {
    captured_piece(board, mv).is_some()
}

/// Piece and colour removed from the board by `mv`, if any.
pub fn captured_piece(board: &Board, mv: ChessMove) -> Option<(Piece, Color)> {
    let dest = mv.get_dest();
    if let (Some(piece), Some(color)) = (board.piece_on(dest), board.color_on(dest)) {
        return Some((piece, color));
    }

    // En passant: pawn changes file onto an empty square
    let source = mv.get_source();
    if board.piece_on(source) == Some(Piece::Pawn) && source.get_file() != dest.get_file() {
        return Some((Piece::Pawn, !board.side_to_move()));
    }

    None
}

pub fn gives_check(board: &Board) -> bool {
    board.checkers().popcnt() > 0
}

/// Checkmate, stalemate or a dead position by insufficient material.
///
/// Repetition and move-count draws need the game history, which a bare
/// board does not carry, so they are not detected here.
pub fn is_game_over(board: &Board) -> bool {
    board.status() != BoardStatus::Ongoing || has_insufficient_material(board)
}

/// Neither side can ever mate: bare kings, a single minor piece, or only
/// bishops that all stand on one square colour.
pub fn has_insufficient_material(board: &Board) -> bool {
    let heavy = *board.pieces(Piece::Pawn) | *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);
    if heavy.popcnt() > 0 {
        return false;
    }

    let knights = board.pieces(Piece::Knight).popcnt();
    let bishops = *board.pieces(Piece::Bishop);
    if knights + bishops.popcnt() <= 1 {
        return true;
    }
    if knights > 0 {
        return false;
    }

    let mut shades = bishops.map(|sq| (sq.get_rank().to_index() + sq.get_file().to_index()) % 2);
    let first = shades.next();
    shades.all(|shade| Some(shade) == first)
}

pub fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "white",
        Color::Black => "black",
    }
}

pub fn moves_to_uci(moves: &[ChessMove]) -> Vec<String> {
    moves.iter().map(|mv| mv.to_string()).collect()
}

/// Render `moves` in numbered SAN (`6. Nxe5 Bxd1 7. Bxf7+`), starting after
/// `prefix` has been played from `fen`. The FEN's move number is kept.
pub fn san_line(fen: &str, prefix: &[ChessMove], moves: &[ChessMove]) -> Result<String> {
    let setup: Fen = fen.parse().map_err(|e| invalid_position!("{}: {}", fen, e))?;
    let mut position: Chess = setup
        .into_position(CastlingMode::Standard)
        .map_err(|e| invalid_position!("{}: {}", fen, e))?;

    for &mv in prefix {
        let played = to_shakmaty_move(&position, mv)?;
        position.play_unchecked(&played);
    }

    let mut tokens = Vec::with_capacity(moves.len() * 3 / 2 + 1);
    for (i, &mv) in moves.iter().enumerate() {
        let played = to_shakmaty_move(&position, mv)?;
        match position.turn() {
            shakmaty::Color::White => tokens.push(format!("{}.", position.fullmoves())),
            shakmaty::Color::Black if i == 0 => tokens.push(format!("{}...", position.fullmoves())),
            shakmaty::Color::Black => {}
        }
        tokens.push(SanPlus::from_move_and_play_unchecked(&mut position, &played).to_string());
    }
    Ok(tokens.join(" "))
}

fn to_shakmaty_move(position: &Chess, mv: ChessMove) -> Result<shakmaty::Move> {
    let uci: Uci = mv
        .to_string()
        .parse()
        .map_err(|e| TacticMinerError::InvalidMove(format!("'{}': {}", mv, e)))?;
    uci.to_move(position)
        .map_err(|e| TacticMinerError::InvalidMove(format!("'{}': {}", mv, e)))
}

/// A position reached from the search root, remembering how it was reached.
#[derive(Debug, Clone)]
pub struct Line {
    root_fen: String,
    moves: Vec<ChessMove>,
    board: Board,
}

impl Line {
    pub fn from_fen(fen: &str) -> Result<Self> {
        let board = parse_fen(fen)?;
        Ok(Self {
            root_fen: fen.trim().to_string(),
            moves: Vec::new(),
            board,
        })
    }

    /// Replay UCI moves from `fen`
    pub fn from_uci(fen: &str, moves: &[String]) -> Result<Self> {
        let mut line = Self::from_fen(fen)?;
        for uci in moves {
            let mv = parse_uci_move(&line.board, uci)?;
            line = line.play(mv)?;
        }
        Ok(line)
    }

    /// New line extended by `mv`
    pub fn play(&self, mv: ChessMove) -> Result<Self> {
        if !self.board.legal(mv) {
            return Err(TacticMinerError::InvalidMove(format!(
                "'{}' is illegal in {}",
                mv, self.board
            )));
        }

        let mut moves = self.moves.clone();
        moves.push(mv);
        Ok(Self {
            root_fen: self.root_fen.clone(),
            moves,
            board: self.board.make_move_new(mv),
        })
    }

    pub fn root_fen(&self) -> &str {
        &self.root_fen
    }

    pub fn moves(&self) -> &[ChessMove] {
        &self.moves
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn ply(&self) -> usize {
        self.moves.len()
    }

    pub fn key(&self) -> PositionKey {
        PositionKey::of(&self.board)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.moves.is_empty() {
            return f.write_str("(root)");
        }
        f.write_str(&moves_to_uci(&self.moves).join(" "))
    }
}

/// `#[serde(with = ...)]` adapters for `chess` types
pub mod serde_uci {
    pub mod moves {
        use chess::ChessMove;
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use std::str::FromStr;

        pub fn serialize<S: Serializer>(moves: &[ChessMove], serializer: S) -> Result<S::Ok, S::Error> {
            super::super::moves_to_uci(moves).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ChessMove>, D::Error> {
            let raw = Vec::<String>::deserialize(deserializer)?;
            raw.iter()
                .map(|uci| {
                    ChessMove::from_str(uci).map_err(|_| D::Error::custom(format!("bad UCI move '{}'", uci)))
                })
                .collect()
        }
    }

    pub mod single {
        use chess::ChessMove;
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};
        use std::str::FromStr;

        pub fn serialize<S: Serializer>(mv: &ChessMove, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&mv.to_string())
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ChessMove, D::Error> {
            let raw = String::deserialize(deserializer)?;
            ChessMove::from_str(&raw).map_err(|_| D::Error::custom(format!("bad UCI move '{}'", raw)))
        }
    }

    pub mod color {
        use chess::Color;
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(color: &Color, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(super::super::color_name(*color))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
            match String::deserialize(deserializer)?.as_str() {
                "white" => Ok(Color::White),
                "black" => Ok(Color::Black),
                other => Err(D::Error::custom(format!("unknown colour '{}'", other))),
            }
        }
    }
}
