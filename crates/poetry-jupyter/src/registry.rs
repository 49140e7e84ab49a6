//! The host's Jupyter kernel registry.
//!
//! [`KernelRegistry`] is the seam between the commands and wherever kernels
//! are actually stored. [`JupyterRegistry`] works against the real Jupyter
//! data directories; tests substitute an in-memory registry.

use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::kernelspec::{is_valid_kernel_name, KernelSpec, KERNEL_JSON};

/// Errors raised by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid kernel name {0:?}: use only letters, numbers, '.', '_' and '-'")]
    InvalidName(String),

    #[error("No such kernel: {0}")]
    NoSuchKernel(String),
}

/// An installed kernelspec, tagged with its registry key and location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledKernel {
    pub key: String,
    pub resource_dir: PathBuf,
    pub argv: Vec<String>,
    pub display_name: String,
    pub language: String,
}

impl InstalledKernel {
    pub fn from_spec(key: &str, resource_dir: &Path, spec: KernelSpec) -> Self {
        Self {
            key: key.to_string(),
            resource_dir: resource_dir.to_path_buf(),
            argv: spec.argv,
            display_name: spec.display_name,
            language: spec.language,
        }
    }
}

/// A store of installed kernelspecs keyed by name.
pub trait KernelRegistry {
    /// Every kernelspec visible on this host.
    fn list_all(&self) -> Result<Vec<InstalledKernel>, RegistryError>;

    /// Copy the kernel directory at `source_dir` into the registry under
    /// `name`, replacing any kernel with the same key. Returns the installed
    /// resource directory.
    fn install(&self, source_dir: &Path, name: &str, user: bool) -> Result<PathBuf, RegistryError>;

    /// Delete the kernel registered under `name`, returning the directory
    /// that was removed.
    fn remove(&self, name: &str) -> Result<PathBuf, RegistryError>;
}

/// Find the first kernel launched by exactly `python`.
///
/// Paths are compared as strings; no normalization is applied.
pub fn find_for_interpreter(
    registry: &dyn KernelRegistry,
    python: &str,
) -> Result<Option<InstalledKernel>, RegistryError> {
    let kernels = registry.list_all()?;
    debug!("Scanning {} kernelspec(s) for {}", kernels.len(), python);
    Ok(kernels
        .into_iter()
        .find(|k| k.argv.first().map(String::as_str) == Some(python)))
}

/// Kernel registry backed by Jupyter's data directories.
#[derive(Debug, Clone)]
pub struct JupyterRegistry {
    user_kernels_dir: PathBuf,
    system_kernels_dir: PathBuf,
    search_jupyter_path: bool,
}

impl Default for JupyterRegistry {
    fn default() -> Self {
        Self {
            user_kernels_dir: user_data_dir().join("kernels"),
            system_kernels_dir: system_data_dir().join("kernels"),
            search_jupyter_path: true,
        }
    }
}

impl JupyterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry confined to a single kernels directory, ignoring the rest
    /// of the Jupyter search path.
    pub fn with_kernels_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            user_kernels_dir: dir.clone(),
            system_kernels_dir: dir,
            search_jupyter_path: false,
        }
    }

    pub fn user_kernels_dir(&self) -> &Path {
        &self.user_kernels_dir
    }

    fn kernels_dir(&self, user: bool) -> &Path {
        if user {
            &self.user_kernels_dir
        } else {
            &self.system_kernels_dir
        }
    }

    fn jupyter_path_kernels(&self) -> Result<Vec<InstalledKernel>, RegistryError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let specs = runtime.block_on(runtimelib::list_kernelspecs());

        Ok(specs
            .into_iter()
            .map(|s| InstalledKernel {
                key: s.kernel_name,
                resource_dir: s.path,
                argv: s.kernelspec.argv,
                display_name: s.kernelspec.display_name,
                language: s.kernelspec.language,
            })
            .collect())
    }
}

impl KernelRegistry for JupyterRegistry {
    fn list_all(&self) -> Result<Vec<InstalledKernel>, RegistryError> {
        let mut by_key: BTreeMap<String, InstalledKernel> = BTreeMap::new();

        if self.search_jupyter_path {
            for kernel in self.jupyter_path_kernels()? {
                by_key.entry(kernel.key.clone()).or_insert(kernel);
            }
        }

        // The install target takes precedence over anything found elsewhere
        for kernel in read_kernels_dir(&self.user_kernels_dir)? {
            by_key.insert(kernel.key.clone(), kernel);
        }

        Ok(by_key.into_values().collect())
    }

    fn install(&self, source_dir: &Path, name: &str, user: bool) -> Result<PathBuf, RegistryError> {
        if !is_valid_kernel_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        let name = name.to_lowercase();
        let destination = self.kernels_dir(user).join(&name);

        if destination.exists() {
            warn!("Replacing existing kernelspec at {:?}", destination);
            std::fs::remove_dir_all(&destination)?;
        }

        copy_dir_all(source_dir, &destination)?;
        info!("Installed kernelspec {} in {:?}", name, destination);
        Ok(destination)
    }

    fn remove(&self, name: &str) -> Result<PathBuf, RegistryError> {
        let name = name.to_lowercase();

        let resource_dir = self
            .list_all()?
            .into_iter()
            .find(|k| k.key == name)
            .map(|k| k.resource_dir)
            .ok_or_else(|| RegistryError::NoSuchKernel(name.clone()))?;

        std::fs::remove_dir_all(&resource_dir)?;
        info!("Removed kernelspec {} from {:?}", name, resource_dir);
        Ok(resource_dir)
    }
}

/// Read every `<dir>/<key>/kernel.json`. Unreadable specs are skipped.
pub fn read_kernels_dir(dir: &Path) -> Result<Vec<InstalledKernel>, RegistryError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e.into()),
    };

    let mut kernels = Vec::new();
    for entry in entries.filter_map(|e| e.ok()) {
        let resource_dir = entry.path();
        let spec_path = resource_dir.join(KERNEL_JSON);
        if !spec_path.is_file() {
            continue;
        }

        let parsed = std::fs::read_to_string(&spec_path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<KernelSpec>(&s).map_err(|e| e.to_string()));
        match parsed {
            Ok(spec) => {
                let key = entry.file_name().to_string_lossy().to_lowercase();
                kernels.push(InstalledKernel::from_spec(&key, &resource_dir, spec));
            }
            Err(e) => warn!("Skipping unreadable kernelspec {:?}: {}", spec_path, e),
        }
    }
    kernels.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(kernels)
}

fn copy_dir_all(source: &Path, destination: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(destination)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Jupyter's per-user data directory.
pub fn user_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("JUPYTER_DATA_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("Library")
            .join("Jupyter")
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("jupyter")
    }
}

/// Jupyter's system-wide data directory.
pub fn system_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("PROGRAMDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData"))
            .join("jupyter")
    }
    #[cfg(not(target_os = "windows"))]
    {
        PathBuf::from("/usr/local/share/jupyter")
    }
}

/// Directories Jupyter searches for kernelspecs, highest precedence first:
/// `JUPYTER_PATH` entries, the user data dir, then the system data dirs.
pub fn kernel_search_dirs() -> Vec<PathBuf> {
    let mut data_dirs: Vec<PathBuf> = std::env::var_os("JUPYTER_PATH")
        .map(|paths| std::env::split_paths(&paths).collect())
        .unwrap_or_default();
    data_dirs.push(user_data_dir());
    data_dirs.push(system_data_dir());
    #[cfg(not(target_os = "windows"))]
    data_dirs.push(PathBuf::from("/usr/share/jupyter"));

    data_dirs.into_iter().map(|d| d.join("kernels")).collect()
}

/// The first directory nested under `Library/Jupyter/kernels`, if any.
pub fn find_library_kernels_dir(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .find(|dir| dir.ends_with("Library/Jupyter/kernels"))
        .cloned()
}

/// On macOS, the kernel search directory under `Library/Jupyter`, which
/// differs from the generic application-support location. `None` elsewhere.
pub fn preferred_spec_prefix() -> Option<PathBuf> {
    if !cfg!(target_os = "macos") {
        return None;
    }
    find_library_kernels_dir(&kernel_search_dirs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernelspec::StagedKernel;
    use serial_test::serial;
    use tempfile::TempDir;

    fn write_kernel(dir: &Path, key: &str, python: &str) {
        let kernel_dir = dir.join(key);
        std::fs::create_dir_all(&kernel_dir).unwrap();
        let spec = KernelSpec::for_interpreter(python, key);
        std::fs::write(
            kernel_dir.join(KERNEL_JSON),
            serde_json::to_string(&spec).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_read_kernels_dir() {
        let temp = TempDir::new().unwrap();
        write_kernel(temp.path(), "beta", "/envs/b/bin/python");
        write_kernel(temp.path(), "alpha", "/envs/a/bin/python");
        std::fs::create_dir(temp.path().join("empty")).unwrap();
        std::fs::create_dir(temp.path().join("broken")).unwrap();
        std::fs::write(temp.path().join("broken").join(KERNEL_JSON), "{not json").unwrap();

        let kernels = read_kernels_dir(temp.path()).unwrap();
        let keys: Vec<&str> = kernels.iter().map(|k| k.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "beta"]);
        assert_eq!(kernels[0].resource_dir, temp.path().join("alpha"));
        assert_eq!(kernels[0].argv[0], "/envs/a/bin/python");
    }

    #[test]
    fn test_read_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(read_kernels_dir(&temp.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_find_for_interpreter() {
        let temp = TempDir::new().unwrap();
        write_kernel(temp.path(), "other", "/envs/q/bin/python");
        write_kernel(temp.path(), "p", "/envs/p/bin/python");
        let registry = JupyterRegistry::with_kernels_dir(temp.path());

        let found = find_for_interpreter(&registry, "/envs/p/bin/python").unwrap();
        assert_eq!(found.map(|k| k.key), Some("p".to_string()));

        let missing = find_for_interpreter(&registry, "/envs/p/bin/python3").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_empty_argv_listed_but_never_matched() {
        let temp = TempDir::new().unwrap();
        let empty_dir = temp.path().join("aaa-empty");
        std::fs::create_dir_all(&empty_dir).unwrap();
        std::fs::write(
            empty_dir.join(KERNEL_JSON),
            r#"{"argv": [], "display_name": "Empty", "language": "python"}"#,
        )
        .unwrap();
        write_kernel(temp.path(), "zzz-p", "/envs/p/bin/python");
        let registry = JupyterRegistry::with_kernels_dir(temp.path());

        let kernels = read_kernels_dir(temp.path()).unwrap();
        assert_eq!(kernels.len(), 2);
        assert_eq!(kernels[0].key, "aaa-empty");
        assert!(kernels[0].argv.is_empty());

        let found = find_for_interpreter(&registry, "/envs/p/bin/python").unwrap();
        assert_eq!(found.map(|k| k.key), Some("zzz-p".to_string()));
        assert!(find_for_interpreter(&registry, "").unwrap().is_none());
    }

    #[test]
    fn test_install_and_remove() {
        let temp = TempDir::new().unwrap();
        let registry = JupyterRegistry::with_kernels_dir(temp.path().join("kernels"));

        let spec = KernelSpec::for_interpreter("/envs/p/bin/python", "Demo");
        let staged = StagedKernel::write(&spec, b"png").unwrap();
        let installed = registry.install(staged.path(), "Demo", true).unwrap();

        assert_eq!(installed, temp.path().join("kernels").join("demo"));
        assert!(installed.join(KERNEL_JSON).is_file());
        assert!(installed.join("logo-32x32.png").is_file());

        let kernels = registry.list_all().unwrap();
        assert_eq!(kernels.len(), 1);
        assert_eq!(kernels[0].display_name, "Demo");

        let removed = registry.remove("demo").unwrap();
        assert_eq!(removed, installed);
        assert!(!installed.exists());
        assert!(registry.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_install_replaces_existing() {
        let temp = TempDir::new().unwrap();
        write_kernel(temp.path(), "demo", "/old/python");
        std::fs::write(temp.path().join("demo").join("stale.txt"), "x").unwrap();
        let registry = JupyterRegistry::with_kernels_dir(temp.path());

        let spec = KernelSpec::for_interpreter("/new/python", "demo");
        let staged = StagedKernel::write(&spec, b"png").unwrap();
        let installed = registry.install(staged.path(), "demo", true).unwrap();

        assert!(!installed.join("stale.txt").exists());
        assert_eq!(registry.list_all().unwrap()[0].argv[0], "/new/python");
    }

    #[test]
    fn test_install_rejects_invalid_name() {
        let temp = TempDir::new().unwrap();
        let registry = JupyterRegistry::with_kernels_dir(temp.path());
        let source = TempDir::new().unwrap();

        let err = registry.install(source.path(), "bad name", true).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidName(_)));
        assert!(std::fs::read_dir(temp.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_remove_unknown_kernel() {
        let temp = TempDir::new().unwrap();
        let registry = JupyterRegistry::with_kernels_dir(temp.path());
        assert!(matches!(
            registry.remove("ghost"),
            Err(RegistryError::NoSuchKernel(_))
        ));
    }

    #[test]
    #[serial]
    fn test_user_data_dir_env_override() {
        std::env::set_var("JUPYTER_DATA_DIR", "/custom/jupyter");
        let dir = user_data_dir();
        std::env::remove_var("JUPYTER_DATA_DIR");
        assert_eq!(dir, PathBuf::from("/custom/jupyter"));
    }

    #[test]
    fn test_find_library_kernels_dir() {
        let dirs = vec![
            PathBuf::from("/opt/jupyter/kernels"),
            PathBuf::from("/Users/me/Library/Jupyter/kernels"),
            PathBuf::from("/Library/Jupyter/kernels"),
        ];
        assert_eq!(
            find_library_kernels_dir(&dirs),
            Some(PathBuf::from("/Users/me/Library/Jupyter/kernels"))
        );
        assert_eq!(
            find_library_kernels_dir(&[PathBuf::from("/usr/share/jupyter/kernels")]),
            None
        );
    }

    #[test]
    #[serial]
    fn test_kernel_search_dirs_honor_jupyter_path() {
        std::env::set_var("JUPYTER_PATH", "/first/jupyter");
        std::env::set_var("JUPYTER_DATA_DIR", "/custom/data");
        let dirs = kernel_search_dirs();
        std::env::remove_var("JUPYTER_PATH");
        std::env::remove_var("JUPYTER_DATA_DIR");

        assert_eq!(dirs[0], PathBuf::from("/first/jupyter/kernels"));
        assert_eq!(dirs[1], PathBuf::from("/custom/data/kernels"));
        assert!(dirs.contains(&system_data_dir().join("kernels")));
    }

    #[test]
    #[serial]
    fn test_preferred_spec_prefix_follows_search_path() {
        std::env::remove_var("JUPYTER_PATH");
        std::env::set_var("JUPYTER_DATA_DIR", "/custom/data");
        let prefix = preferred_spec_prefix();
        std::env::remove_var("JUPYTER_DATA_DIR");

        // No search directory sits under Library/Jupyter any more
        assert!(prefix.is_none());
    }
}
