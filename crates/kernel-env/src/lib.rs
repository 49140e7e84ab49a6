//! Poetry virtual environment discovery.
//!
//! This crate answers two questions about a Poetry project without invoking
//! Poetry itself:
//!
//! - Which virtual environments belong to the project, in the order Poetry
//!   would list them (in-project `.venv` first, then the centrally cached
//!   `<name>-<hash>-py*` environments)
//! - Whether a given distribution (e.g. `ipykernel`) is installed in one of
//!   them
//!
//! ```ignore
//! use kernel_env::{EnvironmentProvider, PoetryEnvManager};
//!
//! let manager = PoetryEnvManager::new("demo", project_root)?;
//! if let Some(venv) = manager.list()?.into_iter().next() {
//!     println!("{} ipykernel={}", venv.python_str(), venv.has_package("ipykernel"));
//! }
//! ```

pub mod poetry;
pub mod settings;
pub mod venv;

use std::path::PathBuf;

pub use poetry::{generate_env_name, PoetryEnvManager};
pub use settings::PoetrySettings;
pub use venv::{canonicalize_name, VirtualEnv};

/// Errors raised while locating environments.
#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value {value:?} for setting {key}")]
    InvalidSetting { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, EnvError>;

/// Source of the virtual environments associated with a project.
pub trait EnvironmentProvider {
    /// Environments for the project, most preferred first.
    fn list(&self) -> Result<Vec<VirtualEnv>>;
}
