//! Configuration loading for the StoryMind pipeline.
//!
//! Mirrors the teacher daemon's config shape: an all-`Option` nested struct
//! deserialized from TOML, with accessor methods that fall back to the
//! spec's reference defaults. API keys are never read from this file; they
//! come from the environment only (see `llm::LlmClient::from_env` and
//! `image::HttpImageProvider::from_env`).

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// First ~35 windows / ~35,000 characters, per the name extractor's prefix budget.
pub const DEFAULT_PREFIX_CHARS: usize = 35_000;
/// Maximum names returned by the name extractor.
pub const DEFAULT_NAME_LIMIT: usize = 50;
/// Retrieval breadth for profile synthesis.
pub const DEFAULT_RETRIEVAL_K: usize = 7;
/// Pause between profile synthesis calls, in seconds.
pub const DEFAULT_PROFILE_PACING_SECS: u64 = 4;
/// Default image aspect ratio.
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";
/// Default shared stylistic anchor for portrait prompts.
pub const DEFAULT_STYLE: &str =
    "realistic portrait, photorealistic, highly detailed, studio lighting, neutral background";
/// Target window length in characters.
pub const DEFAULT_WINDOW_CHARS: usize = 1000;
/// Overlap between adjacent windows, in characters.
pub const DEFAULT_WINDOW_OVERLAP: usize = 200;
/// Fuzzy-match similarity threshold for alias deduplication.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub pipeline: Option<PipelineConfig>,
    pub llm: Option<LlmConfig>,
    pub images: Option<ImagesConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PipelineConfig {
    pub prefix_chars: Option<usize>,
    pub name_limit: Option<usize>,
    pub retrieval_k: Option<usize>,
    pub profile_pacing_secs: Option<u64>,
    pub fuzzy_threshold: Option<f64>,
    pub semantic_dedup: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct LlmConfig {
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ImagesConfig {
    pub style: Option<String>,
    pub aspect_ratio: Option<String>,
}

impl Config {
    pub fn prefix_chars(&self) -> usize {
        self.pipeline
            .as_ref()
            .and_then(|p| p.prefix_chars)
            .unwrap_or(DEFAULT_PREFIX_CHARS)
    }

    pub fn name_limit(&self) -> usize {
        self.pipeline
            .as_ref()
            .and_then(|p| p.name_limit)
            .unwrap_or(DEFAULT_NAME_LIMIT)
    }

    pub fn retrieval_k(&self) -> usize {
        self.pipeline
            .as_ref()
            .and_then(|p| p.retrieval_k)
            .unwrap_or(DEFAULT_RETRIEVAL_K)
    }

    pub fn profile_pacing_secs(&self) -> u64 {
        self.pipeline
            .as_ref()
            .and_then(|p| p.profile_pacing_secs)
            .unwrap_or(DEFAULT_PROFILE_PACING_SECS)
    }

    pub fn fuzzy_threshold(&self) -> f64 {
        self.pipeline
            .as_ref()
            .and_then(|p| p.fuzzy_threshold)
            .unwrap_or(DEFAULT_FUZZY_THRESHOLD)
    }

    pub fn semantic_dedup(&self) -> bool {
        self.pipeline
            .as_ref()
            .and_then(|p| p.semantic_dedup)
            .unwrap_or(false)
    }

    pub fn llm_model(&self) -> String {
        self.llm
            .as_ref()
            .and_then(|l| l.model.clone())
            .unwrap_or_else(|| "claude-3-haiku-20240307".to_string())
    }

    pub fn llm_base_url(&self) -> String {
        self.llm
            .as_ref()
            .and_then(|l| l.base_url.clone())
            .unwrap_or_else(|| "https://api.anthropic.com/v1".to_string())
    }

    pub fn style(&self) -> String {
        self.images
            .as_ref()
            .and_then(|i| i.style.clone())
            .unwrap_or_else(|| DEFAULT_STYLE.to_string())
    }

    pub fn aspect_ratio(&self) -> String {
        self.images
            .as_ref()
            .and_then(|i| i.aspect_ratio.clone())
            .unwrap_or_else(|| DEFAULT_ASPECT_RATIO.to_string())
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "storymind")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config =
        toml::from_str(&contents).context("Failed to parse config file as TOML")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.prefix_chars(), DEFAULT_PREFIX_CHARS);
        assert_eq!(config.name_limit(), DEFAULT_NAME_LIMIT);
        assert_eq!(config.retrieval_k(), DEFAULT_RETRIEVAL_K);
        assert_eq!(config.profile_pacing_secs(), DEFAULT_PROFILE_PACING_SECS);
        assert!(!config.semantic_dedup());
        assert_eq!(config.aspect_ratio(), DEFAULT_ASPECT_RATIO);
    }

    #[test]
    fn test_config_overrides() {
        let config = Config {
            pipeline: Some(PipelineConfig {
                name_limit: Some(10),
                semantic_dedup: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(config.name_limit(), 10);
        assert!(config.semantic_dedup());
        assert_eq!(config.retrieval_k(), DEFAULT_RETRIEVAL_K);
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let config = load_config(Path::new("/nonexistent/storymind/config.toml")).unwrap();
        assert_eq!(config.name_limit(), DEFAULT_NAME_LIMIT);
    }
}
