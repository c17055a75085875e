use super::definition::Journey;
use super::schema::{Validatable, ValidationError};
use glob::glob;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Glob error: {0}")]
    Glob(#[from] glob::PatternError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

pub struct JourneyLoader;

impl JourneyLoader {
    pub fn from_yaml_str(content: &str) -> Result<Journey, LoaderError> {
        let journey: Journey = serde_yaml::from_str(content)?;
        journey.validate()?;
        Ok(journey)
    }

    pub fn load_file(path: &Path) -> Result<Journey, LoaderError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate every `*.yaml` under `path`, keeping each file's outcome.
    pub fn scan_dir(path: &Path) -> Result<Vec<(PathBuf, Result<Journey, LoaderError>)>, LoaderError> {
        let pattern = path.join("**/*.yaml");
        let pattern_str = pattern.to_str().unwrap_or("*.yaml");

        let mut files: Vec<PathBuf> = glob(pattern_str)?.flatten().collect();
        files.sort();
        Ok(files
            .into_iter()
            .map(|file_path| {
                let loaded = Self::load_file(&file_path);
                (file_path, loaded)
            })
            .collect())
    }

    /// Load every valid journey under `path`, sorted by name. Files that fail
    /// to parse or validate are reported and skipped.
    pub fn load_from_dir(path: &Path) -> Result<Vec<Journey>, LoaderError> {
        let mut journeys = Vec::new();

        for (file_path, loaded) in Self::scan_dir(path)? {
            match loaded {
                Ok(journey) => journeys.push(journey),
                Err(e) => {
                    tracing::warn!("Skipping journey file {:?}: {}", file_path, e);
                }
            }
        }

        journeys.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(journeys)
    }
}
