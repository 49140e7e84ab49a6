//! Register a Poetry project's virtual environment as a Jupyter kernel.
//!
//! - [`config`]: pyproject.toml discovery and `[tool.jupyter.kernel]` options
//! - [`registry`]: enumerating, installing and removing kernelspecs
//! - [`kernelspec`]: the `kernel.json` record and its staging directory
//! - [`commands`]: the `show`, `install` and `remove` commands
//!
//! Environment discovery lives in the `kernel-env` crate.

pub mod commands;
pub mod config;
pub mod kernelspec;
pub mod registry;

pub use commands::{CommandError, Confirm, ExitStatus, JupyterCommand, TerminalPrompt};
pub use config::{optional_chain, KernelOptions, Project};
pub use kernelspec::{KernelSpec, StagedKernel};
pub use registry::{find_for_interpreter, InstalledKernel, JupyterRegistry, KernelRegistry};
