//! pyproject.toml discovery and kernel preferences.
//!
//! Kernel options live under `[tool.jupyter.kernel]`:
//!
//! ```toml
//! [tool.jupyter.kernel]
//! name = "demo"           # registry key, defaults to the project name
//! display = "Demo (3.12)" # shown in the launcher, defaults to the project name
//! icon = "assets/logo.png"
//! ```

use log::debug;
use std::path::{Path, PathBuf};

/// Errors raised while reading project configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No pyproject.toml found in {0} or any parent directory")]
    NotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Project has no name (set tool.poetry.name or project.name)")]
    MissingName,
}

/// A parsed pyproject.toml.
#[derive(Debug, Clone)]
pub struct Project {
    path: PathBuf,
    data: toml::Value,
}

/// Kernel settings requested by the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelOptions {
    pub name: String,
    pub display: String,
    pub icon: Option<PathBuf>,
}

impl Project {
    /// Locate and load the pyproject.toml governing `start`.
    ///
    /// A relative `start` is resolved against the current directory first, so
    /// the project root is always absolute.
    pub fn discover(start: &Path) -> Result<Self, ConfigError> {
        let start = if start.is_absolute() {
            start.to_path_buf()
        } else {
            let cwd = std::env::current_dir().map_err(|source| ConfigError::Read {
                path: start.to_path_buf(),
                source,
            })?;
            cwd.join(start)
        };
        let path =
            find_pyproject(&start).ok_or_else(|| ConfigError::NotFound(start.clone()))?;
        Self::load(&path)
    }

    /// Load a pyproject.toml from an explicit path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let data = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded project configuration from {:?}", path);
        Ok(Self::from_value(path, data))
    }

    /// Wrap an already-parsed document located at `path`.
    pub fn from_value(path: impl Into<PathBuf>, data: toml::Value) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory containing pyproject.toml.
    pub fn root(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    pub fn data(&self) -> &toml::Value {
        &self.data
    }

    fn get_str(&self, keys: &str) -> Option<&str> {
        optional_chain(&self.data, keys).and_then(|v| v.as_str())
    }

    /// The project name: `tool.poetry.name`, else `project.name`.
    pub fn name(&self) -> Option<&str> {
        self.get_str("tool.poetry.name")
            .or_else(|| self.get_str("project.name"))
    }

    /// Resolve the kernel name, display name and icon, falling back to the
    /// project name for the first two.
    pub fn kernel_options(&self) -> Result<KernelOptions, ConfigError> {
        let project_name = self.name();

        let name = self
            .get_str("tool.jupyter.kernel.name")
            .or(project_name)
            .ok_or(ConfigError::MissingName)?;
        let display = self
            .get_str("tool.jupyter.kernel.display")
            .or(project_name)
            .ok_or(ConfigError::MissingName)?;
        let icon = self
            .get_str("tool.jupyter.kernel.icon")
            .map(|icon| self.root().join(icon));

        Ok(KernelOptions {
            name: name.to_string(),
            display: display.to_string(),
            icon,
        })
    }
}

/// Follow a dotted key path (`"tool.poetry.name"`) through nested tables.
///
/// Returns `None` as soon as a key is missing or an intermediate value is not
/// a table.
pub fn optional_chain<'a>(root: &'a toml::Value, keys: &str) -> Option<&'a toml::Value> {
    keys.split('.')
        .try_fold(root, |value, key| value.as_table()?.get(key))
}

/// Find a pyproject.toml file by walking up from the given path.
pub fn find_pyproject(start_path: &Path) -> Option<PathBuf> {
    let start_dir = if start_path.is_file() {
        start_path.parent()?
    } else {
        start_path
    };

    start_dir
        .ancestors()
        .map(|dir| dir.join("pyproject.toml"))
        .find(|candidate| candidate.is_file())
}
