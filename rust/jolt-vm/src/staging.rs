//! On-disk staging of synthesized units.
//!
//! Every compiled unit is written under a per-session directory so a user
//! can inspect exactly what was built. The layout is:
//!
//! ```text
//! <staging_root>/session-<uuid>/
//! +-- index.json      # unit name -> file, source hash, members
//! +-- <Unit>.java     # one file per compiled unit
//! ```
//!
//! The directory is created on the first write and removed by
//! [`Staging::remove_all`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use jolt_core::MemberSignature;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid staging index: {0}")]
    Index(#[from] serde_json::Error),
}

fn io_error(path: &Path, source: std::io::Error) -> StagingError {
    StagingError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedUnit {
    pub file: String,
    pub source_hash: String,
    pub members: Vec<MemberSignature>,
}

#[derive(Debug)]
pub struct Staging {
    dir: PathBuf,
    index: BTreeMap<String, StagedUnit>,
}

/// Hex SHA-256 digest of unit source text.
pub fn source_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

impl Staging {
    /// A fresh session directory below `root`. Nothing touches the disk yet.
    pub fn new(root: &Path) -> Self {
        let dir = root.join(format!("session-{}", uuid::Uuid::new_v4()));
        Self {
            dir,
            index: BTreeMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry(&self, unit: &str) -> Option<&StagedUnit> {
        self.index.get(unit)
    }

    pub fn units(&self) -> impl Iterator<Item = (&String, &StagedUnit)> {
        self.index.iter()
    }

    /// Write the unit's source and record it in the index.
    pub fn write(&mut self, unit: &str, source: &str) -> Result<(), StagingError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let file = format!("{}.java", unit);
        let path = self.dir.join(&file);
        std::fs::write(&path, source).map_err(|e| io_error(&path, e))?;

        let staged = StagedUnit {
            file,
            source_hash: source_hash(source),
            members: self
                .index
                .get(unit)
                .map(|e| e.members.clone())
                .unwrap_or_default(),
        };
        self.index.insert(unit.to_string(), staged);
        self.save_index()
    }

    /// Record the members the loaded unit exposes.
    pub fn record_members(
        &mut self,
        unit: &str,
        members: Vec<MemberSignature>,
    ) -> Result<(), StagingError> {
        if let Some(entry) = self.index.get_mut(unit) {
            entry.members = members;
            self.save_index()?;
        }
        Ok(())
    }

    pub fn remove(&mut self, unit: &str) -> Result<(), StagingError> {
        if let Some(entry) = self.index.remove(unit) {
            let path = self.dir.join(&entry.file);
            if path.exists() {
                std::fs::remove_file(&path).map_err(|e| io_error(&path, e))?;
            }
            self.save_index()?;
        }
        Ok(())
    }

    /// Delete the whole session directory.
    pub fn remove_all(&mut self) -> Result<(), StagingError> {
        self.index.clear();
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        }
        Ok(())
    }

    fn save_index(&self) -> Result<(), StagingError> {
        if !self.dir.exists() {
            return Ok(());
        }
        let path = self.dir.join("index.json");
        let json = serde_json::to_string_pretty(&self.index)?;
        std::fs::write(&path, json).map_err(|e| io_error(&path, e))
    }

    pub fn load_index(dir: &Path) -> Result<BTreeMap<String, StagedUnit>, StagingError> {
        let path = dir.join("index.json");
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| io_error(&path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("jolt-staging-{}-{}", name, std::process::id()))
    }

    #[test]
    fn write_creates_file_and_index() {
        let root = scratch("write");
        let mut staging = Staging::new(&root);
        assert!(!staging.dir().exists());

        staging.write("Eval", "public class Eval {}").unwrap();
        let file = staging.dir().join("Eval.java");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "public class Eval {}");

        let index = Staging::load_index(staging.dir()).unwrap();
        assert_eq!(index["Eval"].source_hash, source_hash("public class Eval {}"));

        staging.remove_all().unwrap();
        assert!(!staging.dir().exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn remove_drops_one_unit() {
        let root = scratch("remove");
        let mut staging = Staging::new(&root);
        staging.write("A", "class A {}").unwrap();
        staging.write("B", "class B {}").unwrap();
        staging.remove("A").unwrap();

        assert!(staging.entry("A").is_none());
        assert!(!staging.dir().join("A.java").exists());
        assert!(staging.dir().join("B.java").exists());

        staging.remove_all().unwrap();
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn hash_is_stable_hex() {
        let h = source_hash("x");
        assert_eq!(h.len(), 64);
        assert_eq!(h, source_hash("x"));
        assert_ne!(h, source_hash("y"));
    }
}
