use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::Namespace;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Opaque per-install key; keeps installs sharing one database apart
  pub install_key: String,
  /// Explicit table prefix, used instead of the one derived from `install_key`
  pub table_prefix: Option<String>,
  /// Cache database location (defaults to the platform data directory)
  pub database_path: Option<PathBuf>,
  pub remote: RemoteConfig,
  pub connectivity: ConnectivityConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      install_key: "default".to_string(),
      table_prefix: None,
      database_path: None,
      remote: RemoteConfig::default(),
      connectivity: ConnectivityConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
  pub countries_url: String,
  pub universities_url: String,
  /// Region passed to the countries API
  pub region: String,
  /// Upper bound for one remote sync before falling back to the cache
  pub timeout_secs: u64,
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      countries_url: "https://restcountries.com/v3.1".to_string(),
      universities_url: "http://universities.hipolabs.com".to_string(),
      region: "africa".to_string(),
      timeout_secs: 5,
    }
  }
}

impl RemoteConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
  /// host:port dialed to decide whether we are online
  pub probe_addr: String,
  pub interval_secs: u64,
  pub probe_timeout_ms: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_addr: "restcountries.com:443".to_string(),
      interval_secs: 3,
      probe_timeout_ms: 1500,
    }
  }
}

impl ConnectivityConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs.max(1))
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.probe_timeout_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./afriuni.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/afriuni/config.yaml
  ///
  /// Without any file the defaults are used. `AFRIUNI_INSTALL_KEY` overrides
  /// the install key either way.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    if let Ok(key) = std::env::var("AFRIUNI_INSTALL_KEY") {
      config.install_key = key;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("afriuni.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("afriuni").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  fn validate(&self) -> Result<()> {
    if self.install_key.trim().is_empty() {
      return Err(eyre!("install_key must not be empty"));
    }
    if self.remote.timeout_secs == 0 {
      return Err(eyre!("remote.timeout_secs must be at least 1"));
    }
    for url in [&self.remote.countries_url, &self.remote.universities_url] {
      url::Url::parse(url).map_err(|e| eyre!("Invalid remote URL {:?}: {}", url, e))?;
    }
    self.namespace()?;
    Ok(())
  }

  /// Table namespace for this install.
  pub fn namespace(&self) -> Result<Namespace> {
    match &self.table_prefix {
      Some(prefix) => Ok(Namespace::with_prefix(prefix)?),
      None => Ok(Namespace::derive(&self.install_key)),
    }
  }
}
