//! File-backed roster
//!
//! The file is re-read on every lookup so external tools can rewrite it at
//! any time. Format is chosen by extension:
//!
//! ```toml
//! [teams]
//! Red = ["alice"]
//! Blue = ["bob", "carol"]
//! ```
//!
//! or the equivalent JSON object `{"teams": {"Red": ["alice"]}}`.

use super::Roster;
use crate::error::{RosterError, RosterResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
struct RosterFile {
    #[serde(default)]
    teams: HashMap<String, BTreeSet<String>>,
}

/// Roster read from a JSON or TOML file
#[derive(Debug, Clone)]
pub struct FileRoster {
    path: PathBuf,
}

impl FileRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> RosterResult<RosterFile> {
        let display = self.path.display().to_string();
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| RosterError::Io {
                path: display.clone(),
                source,
            })?;

        let extension = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("json") => serde_json::from_str(&contents).map_err(|e| RosterError::Parse {
                path: display,
                message: e.to_string(),
            }),
            Some("toml") => toml::from_str(&contents).map_err(|e| RosterError::Parse {
                path: display,
                message: e.to_string(),
            }),
            _ => Err(RosterError::UnsupportedFormat(display)),
        }
    }
}

#[async_trait]
impl Roster for FileRoster {
    async fn entries(&self, team: &str) -> RosterResult<BTreeSet<String>> {
        let mut file = self.read().await?;
        Ok(file.teams.remove(team).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.toml");
        std::fs::write(&path, "[teams]\nRed = [\"alice\"]\nBlue = [\"bob\", \"carol\"]\n").unwrap();

        let roster = FileRoster::new(&path);
        assert_eq!(roster.entries("Blue").await.unwrap().len(), 2);
        assert!(roster.entries("Red").await.unwrap().contains("alice"));
        assert!(roster.entries("Green").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_json_and_picks_up_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        std::fs::write(&path, r#"{"teams": {"Red": ["alice"]}}"#).unwrap();

        let roster = FileRoster::new(&path);
        assert!(roster.entries("Red").await.unwrap().contains("alice"));

        std::fs::write(&path, r#"{"teams": {"Red": ["dave"]}}"#).unwrap();
        let entries = roster.entries("Red").await.unwrap();
        assert!(entries.contains("dave"));
        assert!(!entries.contains("alice"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let roster = FileRoster::new(dir.path().join("absent.toml"));
        assert!(matches!(
            roster.entries("Red").await,
            Err(RosterError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.yaml");
        std::fs::write(&path, "teams: {}").unwrap();

        assert!(matches!(
            FileRoster::new(&path).entries("Red").await,
            Err(RosterError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            FileRoster::new(&path).entries("Red").await,
            Err(RosterError::Parse { .. })
        ));
    }
}
