//! Kernel descriptors (`kernel.json`) and the staging directory they are
//! installed from.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::TempDir;

/// Module run by the interpreter to start the kernel.
pub const LAUNCHER_MODULE: &str = "ipykernel_launcher";

/// Placeholder Jupyter substitutes with the connection file path.
pub const CONNECTION_FILE_PLACEHOLDER: &str = "{connection_file}";

/// Icon shipped with the tool, used when the project does not configure one.
pub const DEFAULT_ICON: &[u8] = include_bytes!("../assets/logo.png");

pub const KERNEL_JSON: &str = "kernel.json";
pub const LOGO_32: &str = "logo-32x32.png";
pub const LOGO_64: &str = "logo-64x64.png";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptMode {
    #[default]
    Signal,
    Message,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelMetadata {
    #[serde(default)]
    pub debugger: bool,
}

/// The contents of `kernel.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpec {
    pub argv: Vec<String>,
    pub display_name: String,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub interrupt_mode: InterruptMode,
    pub language: String,
    #[serde(default)]
    pub metadata: KernelMetadata,
}

impl KernelSpec {
    /// A Python kernel launched by `python -m ipykernel_launcher`.
    pub fn for_interpreter(python: &str, display_name: &str) -> Self {
        Self {
            argv: vec![
                python.to_string(),
                "-m".to_string(),
                LAUNCHER_MODULE.to_string(),
                "-f".to_string(),
                CONNECTION_FILE_PLACEHOLDER.to_string(),
            ],
            display_name: display_name.to_string(),
            env: BTreeMap::new(),
            interrupt_mode: InterruptMode::Signal,
            language: "python".to_string(),
            metadata: KernelMetadata { debugger: true },
        }
    }
}

/// A kernel directory materialized in a temporary location, ready to be
/// copied into the registry. The directory is deleted when this is dropped.
#[derive(Debug)]
pub struct StagedKernel {
    dir: TempDir,
}

impl StagedKernel {
    /// Write `kernel.json` and both logo renditions into a fresh temporary
    /// directory.
    pub fn write(spec: &KernelSpec, icon: &[u8]) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("poetry-jupyter-").tempdir()?;

        std::fs::write(dir.path().join(LOGO_32), icon)?;
        std::fs::write(dir.path().join(LOGO_64), icon)?;

        let json = serde_json::to_string_pretty(spec)?;
        std::fs::write(dir.path().join(KERNEL_JSON), json)?;

        debug!("Staged kernel {:?} at {:?}", spec.display_name, dir.path());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Whether `name` is acceptable as a registry key: ASCII letters, digits,
/// `.`, `_` and `-`.
pub fn is_valid_kernel_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
