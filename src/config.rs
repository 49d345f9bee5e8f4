use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::MANAGED_OPTIONS;
use crate::errors::Result;
use crate::position::parse_fen;
use crate::{add_context, config_error, validation_error};

/// Run parameters, read from a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub start_fen: String,
    pub engine: EngineParams,
    pub search: ExplorerParams,
    #[serde(default)]
    pub tactics: TacticParams,
    #[serde(default)]
    pub stats: StatsParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineParams {
    pub exec: PathBuf,
    pub depth: u32,
    /// Passed to the engine as `setoption` commands
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Branch selection for the breadth-first traversal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplorerParams {
    pub max_depth: usize,
    #[serde(default)]
    pub min_games: Option<u64>,
    #[serde(default)]
    pub top_percent: Option<u32>,
    #[serde(default)]
    pub top_n: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TacticParams {
    /// Minimum centipawn gap between the two best lines for a move to count as forced
    #[serde(default = "default_forced_threshold")]
    pub forced_threshold: i32,
}

impl Default for TacticParams {
    fn default() -> Self {
        Self {
            forced_threshold: default_forced_threshold(),
        }
    }
}

fn default_forced_threshold() -> i32 {
    100
}

/// Opening explorer endpoint and query filters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsParams {
    #[serde(default = "default_stats_url")]
    pub url: String,
    #[serde(default = "default_speeds")]
    pub speeds: String,
    #[serde(default = "default_ratings")]
    pub ratings: String,
    #[serde(default = "default_rate_limit_wait_secs")]
    pub rate_limit_wait_secs: u64,
}

impl Default for StatsParams {
    fn default() -> Self {
        Self {
            url: default_stats_url(),
            speeds: default_speeds(),
            ratings: default_ratings(),
            rate_limit_wait_secs: default_rate_limit_wait_secs(),
        }
    }
}

fn default_stats_url() -> String {
    "https://explorer.lichess.ovh/lichess".to_string()
}

fn default_speeds() -> String {
    "bullet,blitz,rapid,classical,correspondence".to_string()
}

fn default_ratings() -> String {
    "1600,1800,2000,2200,2500".to_string()
}

fn default_rate_limit_wait_secs() -> u64 {
    60
}

impl SearchParams {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = add_context!(
            fs::read_to_string(path).map_err(Into::into),
            format!("Reading parameters from {}", path.display())
        )?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let params: SearchParams = serde_json::from_str(raw)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        parse_fen(&self.start_fen)?;

        if self.engine.depth == 0 {
            return Err(validation_error!("engine.depth", 0, "a positive search depth"));
        }
        if let Some(name) = self
            .engine
            .options
            .keys()
            .find(|name| MANAGED_OPTIONS.contains(&name.as_str()))
        {
            return Err(config_error!("engine option '{}' is managed by the search", name));
        }

        self.search.validate()
    }
}

impl ExplorerParams {
    pub fn validate(&self) -> Result<()> {
        if self.top_percent.is_none() && self.top_n.is_none() {
            return Err(config_error!("top_percent or top_n must be set"));
        }
        if let Some(percent) = self.top_percent {
            if percent == 0 || percent > 100 {
                return Err(validation_error!("search.top_percent", percent, "1..=100"));
            }
        }
        if self.top_n == Some(0) {
            return Err(validation_error!("search.top_n", 0, "at least 1"));
        }
        Ok(())
    }
}
