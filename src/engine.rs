//! UCI analysis engine wrapper
//!
//! Spawns an engine process, configures it once and answers multi-PV
//! analysis requests for single positions.

use chess::{Board, ChessMove};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::str::FromStr;
use tracing::{debug, info, warn};

use crate::analysis::{Analysis, ScoredPv};
use crate::config::EngineParams;
use crate::errors::{Result, TacticMinerError};
use crate::malformed_analysis;
use crate::position::is_game_over;
use crate::score::{PovScore, Score};

/// Number of principal variations requested per position
pub const MULTI_PV: usize = 2;

/// Options the search sets itself; user configuration may not override them
pub const MANAGED_OPTIONS: &[&str] = &["MultiPV", "Ponder", "UCI_Chess960"];

/// Anything that can produce the top two scored lines for a position
pub trait AnalysisEngine {
    /// `Ok(None)` means the game is over in `board`
    fn analyse(&mut self, board: &Board) -> Result<Option<Analysis>>;
}

impl<E: AnalysisEngine + ?Sized> AnalysisEngine for &mut E {
    fn analyse(&mut self, board: &Board) -> Result<Option<Analysis>> {
        (**self).analyse(board)
    }
}

/// External engine spoken to over the UCI protocol
pub struct UciEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    name: String,
    depth: u32,
    closed: bool,
}

impl UciEngine {
    pub fn spawn(params: &EngineParams) -> Result<Self> {
        let mut process = Command::new(&params.exec)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                TacticMinerError::EngineError(format!("Failed to start {}: {}", params.exec.display(), e))
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| TacticMinerError::EngineError("Failed to get stdin".to_string()))?;
        let stdout = BufReader::new(
            process
                .stdout
                .take()
                .ok_or_else(|| TacticMinerError::EngineError("Failed to get stdout".to_string()))?,
        );

        let mut engine = Self {
            process,
            stdin,
            stdout,
            name: engine_name(&params.exec),
            depth: params.depth,
            closed: false,
        };
        engine.initialize(&params.options)?;

        info!(engine = %engine.name, depth = engine.depth, "analysis engine ready");
        Ok(engine)
    }

    fn initialize(&mut self, options: &BTreeMap<String, String>) -> Result<()> {
        self.send_command("uci")?;
        self.wait_for("uciok")?;

        for (name, value) in options {
            if MANAGED_OPTIONS.contains(&name.as_str()) {
                return Err(TacticMinerError::ConfigurationError(format!(
                    "Tried setting managed option: {}",
                    name
                )));
            }
            self.send_command(&format!("setoption name {} value {}", name, value))?;
        }
        self.send_command(&format!("setoption name MultiPV value {}", MULTI_PV))?;
        self.send_command("setoption name Ponder value false")?;

        self.send_command("isready")?;
        self.wait_for("readyok")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn send_command(&mut self, command: &str) -> Result<()> {
        debug!(command, "uci >");
        writeln!(self.stdin, "{}", command)
            .map_err(|e| TacticMinerError::EngineError(format!("Send failed: {}", e)))?;
        self.stdin
            .flush()
            .map_err(|e| TacticMinerError::EngineError(format!("Flush failed: {}", e)))?;
        Ok(())
    }

    fn read_response(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| TacticMinerError::EngineError(format!("Read failed: {}", e)))?;
        if read == 0 {
            return Err(TacticMinerError::EngineError(
                "Engine closed its output".to_string(),
            ));
        }
        Ok(line.trim().to_string())
    }

    fn wait_for(&mut self, token: &str) -> Result<()> {
        loop {
            if self.read_response()? == token {
                return Ok(());
            }
        }
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.send_command("quit")?;
        self.process
            .wait()
            .map_err(|e| TacticMinerError::EngineError(format!("Failed to close: {}", e)))?;
        Ok(())
    }
}

impl AnalysisEngine for UciEngine {
    fn analyse(&mut self, board: &Board) -> Result<Option<Analysis>> {
        if is_game_over(board) {
            return Ok(None);
        }

        self.send_command(&format!("position fen {}", board))?;
        self.send_command(&format!("go depth {}", self.depth))?;

        let mut lines: BTreeMap<usize, InfoLine> = BTreeMap::new();
        loop {
            let response = self.read_response()?;
            if response.starts_with("bestmove") {
                break;
            }
            if let Some(info) = InfoLine::parse(&response) {
                lines.insert(info.multipv, info);
            }
        }

        let turn = board.side_to_move();
        let result = lines
            .into_values()
            .take(MULTI_PV)
            .map(|info| info.into_scored_pv(turn))
            .collect::<Result<Vec<_>>>()?;

        Analysis::new(self.name.clone(), self.depth, turn, result).map(Some)
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "engine did not shut down cleanly");
            let _ = self.process.kill();
        }
    }
}

fn engine_name(exec: &Path) -> String {
    exec.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| exec.display().to_string())
}

/// The parts of an `info` line we keep
#[derive(Debug, Clone, PartialEq)]
struct InfoLine {
    multipv: usize,
    score: Option<Score>,
    pv: Vec<String>,
}

impl InfoLine {
    /// Only lines carrying a `pv` or a `score` are of interest; `info string`
    /// and `currmove` chatter is ignored.
    fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        if tokens.next() != Some("info") {
            return None;
        }

        let mut multipv = 1;
        let mut score = None;
        let mut pv = Vec::new();
        let mut relevant = false;

        while let Some(token) = tokens.next() {
            match token {
                "string" => return None,
                "multipv" => {
                    multipv = tokens.next()?.parse().ok()?;
                }
                "score" => {
                    relevant = true;
                    score = match (tokens.next(), tokens.next().and_then(|v| v.parse().ok())) {
                        (Some("cp"), Some(value)) => Some(Score::Cp(value)),
                        (Some("mate"), Some(value)) => Some(Score::Mate(value)),
                        _ => None,
                    };
                }
                "pv" => {
                    relevant = true;
                    pv = tokens.by_ref().map(str::to_string).collect();
                }
                _ => {}
            }
        }

        if relevant {
            Some(Self { multipv, score, pv })
        } else {
            None
        }
    }

    fn into_scored_pv(self, turn: chess::Color) -> Result<ScoredPv> {
        let score = self
            .score
            .ok_or_else(|| malformed_analysis!("line {} has no score", self.multipv))?;
        if self.pv.is_empty() {
            return Err(malformed_analysis!("line {} has no principal variation", self.multipv));
        }

        let pv = self
            .pv
            .iter()
            .map(|uci| {
                ChessMove::from_str(uci)
                    .map_err(|_| malformed_analysis!("line {} has unreadable move '{}'", self.multipv, uci))
            })
            .collect::<Result<Vec<_>>>()?;

        ScoredPv::new(pv, PovScore::new(score, turn))
    }
}
