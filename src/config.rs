use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub app: AppConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the story API (e.g. "https://story-api.dicoding.dev/v1")
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Origin the application shell is served from. Root-relative manifest
  /// entries are resolved against it.
  #[serde(default = "default_origin")]
  pub origin: String,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      origin: default_origin(),
    }
  }
}

fn default_origin() -> String {
  "http://localhost:8080".to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./cerita.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/cerita/config.yaml
  /// 4. ~/.config/cerita/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/cerita/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("cerita.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("cerita").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the story API token from environment variables.
  ///
  /// Checks CERITA_TOKEN first, then DICODING_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("CERITA_TOKEN")
      .or_else(|_| std::env::var("DICODING_TOKEN"))
      .map_err(|_| {
        eyre!("Story API token not found. Set CERITA_TOKEN or DICODING_TOKEN environment variable.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_full_config() {
    let config: Config = serde_yaml::from_str(
      "api:\n  url: https://story-api.dicoding.dev/v1\napp:\n  origin: https://stories.test\n",
    )
    .unwrap();

    assert_eq!(config.api.url, "https://story-api.dicoding.dev/v1");
    assert_eq!(config.app.origin, "https://stories.test");
  }

  #[test]
  fn test_app_section_is_optional() {
    let config: Config =
      serde_yaml::from_str("api:\n  url: https://story-api.dicoding.dev/v1\n").unwrap();

    assert_eq!(config.app.origin, "http://localhost:8080");
  }
}
