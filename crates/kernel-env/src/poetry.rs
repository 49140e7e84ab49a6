//! Enumerates a Poetry project's virtual environments.
//!
//! Poetry keeps project environments either inside the project (`.venv`) or
//! under `virtualenvs.path`, named `<sanitized-name>-<cwd-hash>-py<X.Y>`.

use base64::Engine;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::settings::PoetrySettings;
use crate::venv::{canonicalize_name, VirtualEnv};
use crate::{EnvironmentProvider, Result};

const MAX_ENV_NAME_LEN: usize = 42;

/// Locates environments for a single Poetry project.
#[derive(Debug, Clone)]
pub struct PoetryEnvManager {
    project_name: String,
    project_root: PathBuf,
    settings: PoetrySettings,
}

impl PoetryEnvManager {
    /// Create a manager for the project, loading Poetry's settings from the
    /// environment and config files.
    pub fn new(project_name: &str, project_root: impl Into<PathBuf>) -> Result<Self> {
        let project_root = project_root.into();
        let settings = PoetrySettings::load(&project_root)?;
        Ok(Self::with_settings(project_name, project_root, settings))
    }

    /// Like [`PoetryEnvManager::new`] but with explicit settings.
    pub fn with_settings(
        project_name: &str,
        project_root: impl Into<PathBuf>,
        settings: PoetrySettings,
    ) -> Self {
        Self {
            project_name: project_name.to_string(),
            project_root: project_root.into(),
            settings,
        }
    }

    /// The in-project environment location (`<root>/.venv`).
    pub fn in_project_venv(&self) -> PathBuf {
        self.project_root.join(".venv")
    }

    fn in_project_venv_exists(&self) -> bool {
        if self.settings.in_project == Some(false) {
            return false;
        }
        self.in_project_venv().is_dir()
    }

    /// The `<name>-<hash>` prefix Poetry uses for this project's cached envs.
    pub fn env_name(&self) -> String {
        generate_env_name(&canonicalize_name(&self.project_name), &self.project_root)
    }
}

impl EnvironmentProvider for PoetryEnvManager {
    fn list(&self) -> Result<Vec<VirtualEnv>> {
        let mut envs = Vec::new();

        if self.in_project_venv_exists() {
            envs.push(VirtualEnv::new(self.in_project_venv()));
        }

        let prefix = format!("{}-py", self.env_name());
        let venvs_dir = &self.settings.virtualenvs_path;
        debug!("Looking for {}* in {:?}", prefix, venvs_dir);

        if venvs_dir.is_dir() {
            let mut cached: Vec<PathBuf> = std::fs::read_dir(venvs_dir)?
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
                .map(|e| e.path())
                .collect();
            cached.sort();
            envs.extend(cached.into_iter().map(VirtualEnv::new));
        }

        info!(
            "Found {} environment(s) for project {}",
            envs.len(),
            self.project_name
        );
        Ok(envs)
    }
}

/// Compute Poetry's environment name for a project: the sanitized,
/// lowercased name followed by the first 8 characters of the URL-safe base64
/// SHA-256 of the project directory.
pub fn generate_env_name(name: &str, project_root: &Path) -> String {
    let sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|c| match c {
            ' ' | '$' | '`' | '!' | '*' | '@' | '"' | '\\' | '\r' | '\n' | '\t' => '_',
            other => other,
        })
        .take(MAX_ENV_NAME_LEN)
        .collect();

    let cwd = normalized_path(project_root);
    let digest = Sha256::digest(cwd.as_bytes());
    let encoded = base64::engine::general_purpose::URL_SAFE.encode(digest);

    format!("{}-{}", sanitized, &encoded[..8])
}

/// The resolved project directory, case-folded where the filesystem is
/// case-insensitive.
fn normalized_path(path: &Path) -> String {
    let real = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let real = real.display().to_string();

    #[cfg(target_os = "windows")]
    {
        real.strip_prefix(r"\\?\")
            .unwrap_or(&real)
            .replace('/', "\\")
            .to_lowercase()
    }
    #[cfg(not(target_os = "windows"))]
    {
        real
    }
}
