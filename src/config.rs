use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::board::{DecodeMode, START_PLACEMENT};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    // Position new games start from. May carry a side-to-move field.
    pub start_fen: String,
    // Reject off-board placements instead of dropping them.
    pub strict_decode: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            start_fen: format!("{} w", START_PLACEMENT),
            strict_decode: false,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => {
                let content = fs::read_to_string(p)
                    .with_context(|| format!("failed to read config {}", p.display()))?;
                Self::from_yaml(&content)
                    .with_context(|| format!("failed to parse config {}", p.display()))
            }
            _ => Ok(Self::default()),
        }
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn decode_mode(&self) -> DecodeMode {
        if self.strict_decode {
            DecodeMode::Strict
        } else {
            DecodeMode::Lenient
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.decode_mode(), DecodeMode::Lenient);
        assert!(cfg.start_fen.starts_with(START_PLACEMENT));
        assert_eq!(Config::from_yaml("").unwrap(), cfg);
        assert_eq!(Config::load(None).unwrap(), cfg);
        assert_eq!(
            Config::load(Some(Path::new("/nonexistent/chess-ledger.yaml"))).unwrap(),
            cfg
        );
    }

    #[test]
    fn test_from_yaml() {
        let cfg = Config::from_yaml("strict_decode: true\n").unwrap();
        assert_eq!(cfg.decode_mode(), DecodeMode::Strict);
        assert_eq!(cfg.start_fen, Config::default().start_fen);

        let cfg = Config::from_yaml("start_fen: \"8/8/8/8/8/8/8/4K2k b\"\n").unwrap();
        assert_eq!(cfg.start_fen, "8/8/8/8/8/8/8/4K2k b");
        assert!(!cfg.strict_decode);

        assert!(Config::from_yaml("strict_decode: [1, 2]").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("chess-ledger-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.yaml");
        fs::write(&good, "strict_decode: true\n").unwrap();
        assert_eq!(Config::load(Some(good.as_path())).unwrap().decode_mode(), DecodeMode::Strict);

        let bad = dir.join("bad.yaml");
        fs::write(&bad, "strict_decode: [1, 2]\n").unwrap();
        let err = Config::load(Some(bad.as_path())).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse config"), "{:#}", err);

        // a directory exists but cannot be read as a file
        let err = Config::load(Some(dir.as_path())).unwrap_err();
        assert!(err.to_string().starts_with("failed to read config"), "{:#}", err);

        fs::remove_dir_all(&dir).unwrap();
    }
}
