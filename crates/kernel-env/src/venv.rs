//! Virtual environments on disk and the packages installed in them.

use log::debug;
use std::path::{Path, PathBuf};

/// A virtual environment directory and the interpreter inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualEnv {
    pub path: PathBuf,
    pub python: PathBuf,
}

impl VirtualEnv {
    /// Wrap an environment directory, deriving the interpreter path from the
    /// platform layout.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let python = python_path_for_env(&path);
        Self { path, python }
    }

    /// The interpreter path as a string, exactly as kernelspecs record it.
    pub fn python_str(&self) -> String {
        self.python.display().to_string()
    }

    /// All site-packages directories that exist in this environment.
    pub fn site_packages(&self) -> Vec<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            let dir = self.path.join("Lib").join("site-packages");
            if dir.is_dir() {
                vec![dir]
            } else {
                vec![]
            }
        }
        #[cfg(not(target_os = "windows"))]
        {
            let mut dirs = Vec::new();
            for lib in ["lib", "lib64"] {
                let Ok(entries) = std::fs::read_dir(self.path.join(lib)) else {
                    continue;
                };
                let mut found: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_name().to_string_lossy().starts_with("python"))
                    .map(|e| e.path().join("site-packages"))
                    .filter(|p| p.is_dir())
                    .collect();
                found.sort();
                for dir in found {
                    // lib64 is commonly a symlink to lib
                    if !dirs.iter().any(|d: &PathBuf| same_dir(d, &dir)) {
                        dirs.push(dir);
                    }
                }
            }
            dirs
        }
    }

    /// Find installed distributions named `name`, returning their metadata
    /// directories (`*.dist-info` or `*.egg-info`) along with any top-level
    /// package directory or `<name>.py` module of the same name.
    pub fn find_package(&self, name: &str) -> Vec<PathBuf> {
        let wanted = canonicalize_name(name);
        let mut matches = Vec::new();

        for site in self.site_packages() {
            let Ok(entries) = std::fs::read_dir(&site) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let file_name = entry.file_name();
                let file_name = file_name.to_string_lossy();
                let dist = match file_name
                    .strip_suffix(".dist-info")
                    .or_else(|| file_name.strip_suffix(".egg-info"))
                {
                    Some(stem) => stem.split('-').next().unwrap_or(stem),
                    // An importable module or package without metadata
                    None => match file_name.strip_suffix(".py") {
                        Some(module) => module,
                        None if entry.path().is_dir() => file_name.as_ref(),
                        None => continue,
                    },
                };
                if canonicalize_name(dist) == wanted {
                    matches.push(entry.path());
                }
            }
        }

        debug!(
            "Found {} distribution(s) for {} in {:?}",
            matches.len(),
            name,
            self.path
        );
        matches
    }

    /// Whether a distribution named `name` is installed.
    pub fn has_package(&self, name: &str) -> bool {
        !self.find_package(name).is_empty()
    }
}

fn python_path_for_env(venv_path: &Path) -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        venv_path.join("Scripts").join("python.exe")
    }
    #[cfg(not(target_os = "windows"))]
    {
        venv_path.join("bin").join("python")
    }
}

#[cfg(not(target_os = "windows"))]
fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Normalize a distribution name (PEP 503): lowercase, with runs of `-`, `_`
/// and `.` collapsed to a single `-`.
pub fn canonicalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn site_packages(venv: &Path) -> PathBuf {
        #[cfg(target_os = "windows")]
        let dir = venv.join("Lib").join("site-packages");
        #[cfg(not(target_os = "windows"))]
        let dir = venv.join("lib").join("python3.12").join("site-packages");
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_canonicalize_name() {
        assert_eq!(canonicalize_name("ipykernel"), "ipykernel");
        assert_eq!(canonicalize_name("Jupyter_Client"), "jupyter-client");
        assert_eq!(canonicalize_name("zope..interface"), "zope-interface");
        assert_eq!(canonicalize_name("a-_.b"), "a-b");
    }

    #[test]
    fn test_python_path_layout() {
        let venv = VirtualEnv::new("/envs/p");
        #[cfg(not(target_os = "windows"))]
        assert_eq!(venv.python_str(), "/envs/p/bin/python");
        #[cfg(target_os = "windows")]
        assert!(venv.python.ends_with("Scripts/python.exe"));
    }

    #[test]
    fn test_find_package_dist_info() {
        let temp = TempDir::new().unwrap();
        let site = site_packages(temp.path());
        std::fs::create_dir(site.join("ipykernel-6.29.5.dist-info")).unwrap();
        std::fs::create_dir(site.join("ipykernel")).unwrap();

        let venv = VirtualEnv::new(temp.path());
        let mut found = venv.find_package("ipykernel");
        found.sort();
        assert_eq!(
            found,
            vec![site.join("ipykernel"), site.join("ipykernel-6.29.5.dist-info")]
        );
        assert!(venv.has_package("IPyKernel"));
    }

    #[test]
    fn test_find_package_egg_info_and_normalized_names() {
        let temp = TempDir::new().unwrap();
        let site = site_packages(temp.path());
        std::fs::create_dir(site.join("jupyter_client-8.6.0.egg-info")).unwrap();

        let venv = VirtualEnv::new(temp.path());
        assert!(venv.has_package("jupyter-client"));
        assert!(!venv.has_package("jupyter"));
    }

    #[test]
    fn test_package_dir_without_metadata_is_installed() {
        let temp = TempDir::new().unwrap();
        let site = site_packages(temp.path());
        std::fs::create_dir(site.join("ipykernel")).unwrap();

        let venv = VirtualEnv::new(temp.path());
        assert!(venv.has_package("ipykernel"));
        assert_eq!(venv.find_package("ipykernel"), vec![site.join("ipykernel")]);
    }

    #[test]
    fn test_single_module_file_is_installed() {
        let temp = TempDir::new().unwrap();
        let site = site_packages(temp.path());
        std::fs::write(site.join("ipykernel_launcher.py"), "").unwrap();
        std::fs::write(site.join("README.txt"), "").unwrap();

        let venv = VirtualEnv::new(temp.path());
        assert!(venv.has_package("ipykernel_launcher"));
        assert!(!venv.has_package("ipykernel"));
        assert!(!venv.has_package("readme"));
    }

    #[test]
    fn test_missing_site_packages() {
        let temp = TempDir::new().unwrap();
        let venv = VirtualEnv::new(temp.path().join("nope"));
        assert!(venv.site_packages().is_empty());
        assert!(!venv.has_package("ipykernel"));
    }
}
