//! Poetry's virtualenv settings, resolved the way Poetry resolves them:
//! environment variables, then the project's `poetry.toml`, then the global
//! `config.toml`, then built-in defaults.

use log::debug;
use std::path::{Path, PathBuf};

use crate::{EnvError, Result};

const CACHE_DIR_PLACEHOLDER: &str = "{cache-dir}";

/// The subset of Poetry configuration that decides where environments live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoetrySettings {
    pub cache_dir: PathBuf,
    pub virtualenvs_path: PathBuf,
    /// `virtualenvs.in-project`; `None` when unset.
    pub in_project: Option<bool>,
}

/// Raw values before defaults are applied.
#[derive(Debug, Default)]
struct RawSettings {
    cache_dir: Option<String>,
    virtualenvs_path: Option<String>,
    in_project: Option<bool>,
}

impl RawSettings {
    /// Fill unset values from a lower-precedence source.
    fn or(self, other: RawSettings) -> RawSettings {
        RawSettings {
            cache_dir: self.cache_dir.or(other.cache_dir),
            virtualenvs_path: self.virtualenvs_path.or(other.virtualenvs_path),
            in_project: self.in_project.or(other.in_project),
        }
    }
}

impl PoetrySettings {
    /// Load settings for the project rooted at `project_root` from the
    /// process environment and Poetry's config files.
    pub fn load(project_root: &Path) -> Result<Self> {
        let global = match global_config_path() {
            Some(path) => read_config(&path)?,
            None => None,
        };
        let local = read_config(&project_root.join("poetry.toml"))?;
        Self::from_sources(|key| std::env::var(key).ok(), local.as_ref(), global.as_ref())
    }

    /// Resolve settings from explicit sources. `env` looks up environment
    /// variables; `local` and `global` are parsed `poetry.toml` /
    /// `config.toml` documents.
    pub fn from_sources(
        env: impl Fn(&str) -> Option<String>,
        local: Option<&toml::Value>,
        global: Option<&toml::Value>,
    ) -> Result<Self> {
        let from_env = RawSettings {
            cache_dir: env("POETRY_CACHE_DIR"),
            virtualenvs_path: env("POETRY_VIRTUALENVS_PATH"),
            in_project: env("POETRY_VIRTUALENVS_IN_PROJECT")
                .map(|v| parse_bool("virtualenvs.in-project", &v))
                .transpose()?,
        };

        let mut raw = from_env;
        for doc in [local, global].into_iter().flatten() {
            raw = raw.or(raw_from_document(doc)?);
        }

        let cache_dir = raw
            .cache_dir
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_dir);
        let virtualenvs_path = match raw.virtualenvs_path {
            Some(path) => expand_cache_dir(&path, &cache_dir),
            None => cache_dir.join("virtualenvs"),
        };

        let settings = PoetrySettings {
            cache_dir,
            virtualenvs_path,
            in_project: raw.in_project,
        };
        debug!("Resolved Poetry settings: {:?}", settings);
        Ok(settings)
    }
}

fn raw_from_document(doc: &toml::Value) -> Result<RawSettings> {
    let venvs = doc.get("virtualenvs");
    let in_project = match venvs.and_then(|v| v.get("in-project")) {
        None => None,
        Some(toml::Value::Boolean(b)) => Some(*b),
        Some(toml::Value::String(s)) => Some(parse_bool("virtualenvs.in-project", s)?),
        Some(other) => {
            return Err(EnvError::InvalidSetting {
                key: "virtualenvs.in-project".to_string(),
                value: other.to_string(),
            })
        }
    };

    Ok(RawSettings {
        cache_dir: doc
            .get("cache-dir")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        virtualenvs_path: venvs
            .and_then(|v| v.get("path"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        in_project,
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(EnvError::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn expand_cache_dir(path: &str, cache_dir: &Path) -> PathBuf {
    if path.contains(CACHE_DIR_PLACEHOLDER) {
        PathBuf::from(path.replace(CACHE_DIR_PLACEHOLDER, &cache_dir.display().to_string()))
    } else {
        PathBuf::from(path)
    }
}

/// Read a Poetry config file, returning `None` if it does not exist.
fn read_config(path: &Path) -> Result<Option<toml::Value>> {
    if !path.is_file() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let doc = toml::from_str(&content).map_err(|source| EnvError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Loaded Poetry config from {:?}", path);
    Ok(Some(doc))
}

fn global_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("POETRY_CONFIG_DIR") {
        return Some(PathBuf::from(dir).join("config.toml"));
    }
    dirs::config_dir().map(|d| d.join("pypoetry").join("config.toml"))
}

/// Poetry's default cache directory for this platform.
pub fn default_cache_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("C:\\"))
            .join("pypoetry")
            .join("Cache")
    }
    #[cfg(not(target_os = "windows"))]
    {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("pypoetry")
    }
}
