use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::Result;
use crate::tactic::Tactic;

/// One JSON file per discovered tactic
pub struct TacticStore {
    path: PathBuf,
}

impl TacticStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the search root next to its tactics
    pub fn store_root(&self, fen: &str) -> Result<()> {
        fs::write(self.path.join("root.fen"), format!("{}\n", fen))?;
        Ok(())
    }

    pub fn store(&self, tactic: &Tactic) -> Result<PathBuf> {
        let filename = self.path.join(tactic.filename());
        let json = serde_json::to_string_pretty(&tactic.to_record())?;
        fs::write(&filename, json)?;
        debug!(file = %filename.display(), "tactic stored");
        Ok(filename)
    }

    /// Every stored tactic, ordered by filename
    pub fn list(&self) -> Result<Vec<Tactic>> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.path)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        files
            .iter()
            .map(|file| -> Result<Tactic> {
                let raw = fs::read_to_string(file)?;
                Ok(serde_json::from_str(&raw)?)
            })
            .collect()
    }
}
