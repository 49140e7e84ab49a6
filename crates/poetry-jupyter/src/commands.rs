//! The `jupyter show|install|remove` commands.
//!
//! Each command checks its preconditions before touching the registry and
//! reports a single line per outcome. Unmet preconditions are not errors:
//! they print a message and return [`ExitStatus::Failure`]. Only unexpected
//! failures (I/O, registry, environment discovery) surface as
//! [`CommandError`].

use kernel_env::{EnvError, EnvironmentProvider, VirtualEnv};
use log::{debug, info};
use std::io::{BufRead, Write};

use crate::config::{ConfigError, KernelOptions, Project};
use crate::kernelspec::{is_valid_kernel_name, KernelSpec, StagedKernel, DEFAULT_ICON};
use crate::registry::{
    find_for_interpreter, preferred_spec_prefix, InstalledKernel, KernelRegistry, RegistryError,
};

/// Distribution that must be installed in the environment to run a kernel.
pub const RUNTIME_PACKAGE: &str = "ipykernel";

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Process exit status reported by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    Failure,
}

impl ExitStatus {
    pub fn code(self) -> u8 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::Failure => 1,
        }
    }
}

/// A yes/no confirmation gate.
pub trait Confirm {
    fn confirm(&self, question: &str, default: bool) -> std::io::Result<bool>;
}

/// Asks on stderr and reads the answer from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt {
    /// Answer every question with its default without reading stdin.
    pub no_interaction: bool,
}

impl Confirm for TerminalPrompt {
    fn confirm(&self, question: &str, default: bool) -> std::io::Result<bool> {
        if self.no_interaction {
            return Ok(default);
        }

        let hint = if default { "[Y/n]" } else { "[y/N]" };
        eprint!("{} {} ", question, hint);
        std::io::stderr().flush()?;

        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        Ok(parse_answer(&answer, default))
    }
}

/// Interpret a typed answer; empty input (or EOF) yields `default`.
pub fn parse_answer(answer: &str, default: bool) -> bool {
    match answer.trim().to_ascii_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}

/// Binds a project to its environment provider, registry and prompt.
pub struct JupyterCommand<'a> {
    project: &'a Project,
    envs: &'a dyn EnvironmentProvider,
    registry: &'a dyn KernelRegistry,
    prompt: &'a dyn Confirm,
}

impl<'a> JupyterCommand<'a> {
    pub fn new(
        project: &'a Project,
        envs: &'a dyn EnvironmentProvider,
        registry: &'a dyn KernelRegistry,
        prompt: &'a dyn Confirm,
    ) -> Self {
        Self {
            project,
            envs,
            registry,
            prompt,
        }
    }

    pub fn requested_kernel_opts(&self) -> Result<KernelOptions, CommandError> {
        Ok(self.project.kernel_options()?)
    }

    /// The project's preferred environment, if any has been created.
    pub fn venv(&self) -> Result<Option<VirtualEnv>, CommandError> {
        Ok(self.envs.list()?.into_iter().next())
    }

    /// Whether the kernel runtime package is installed in the project's
    /// environment. False when there is no environment.
    pub fn has_runtime_support(&self) -> Result<bool, CommandError> {
        Ok(self
            .venv()?
            .map(|venv| venv.has_package(RUNTIME_PACKAGE))
            .unwrap_or(false))
    }

    /// The installed kernel launched by this project's interpreter.
    pub fn kernelspec_for_project(&self) -> Result<Option<InstalledKernel>, CommandError> {
        let Some(venv) = self.venv()? else {
            return Ok(None);
        };
        Ok(find_for_interpreter(self.registry, &venv.python_str())?)
    }

    pub fn show(&self, out: &mut dyn Write) -> Result<ExitStatus, CommandError> {
        if self.venv()?.is_none() {
            writeln!(out, "No virtualenv has been created for this project yet.")?;
            return Ok(ExitStatus::Failure);
        }

        if let Some(prefix) = preferred_spec_prefix() {
            debug!("Preferred kernelspec prefix: {:?}", prefix);
        }

        let Some(spec) = self.kernelspec_for_project()? else {
            let kernel = self.requested_kernel_opts()?;
            writeln!(out, "Kernel {} has not yet been installed.", kernel.name)?;
            return Ok(ExitStatus::Failure);
        };

        writeln!(
            out,
            "{} ({})",
            spec.display_name,
            spec.resource_dir.display()
        )?;
        Ok(ExitStatus::Success)
    }

    pub fn install(&self, out: &mut dyn Write) -> Result<ExitStatus, CommandError> {
        if let Some(spec) = self.kernelspec_for_project()? {
            writeln!(out, "Kernel {} is already installed!", spec.key)?;
            return Ok(ExitStatus::Failure);
        }

        if !self.has_runtime_support()? {
            writeln!(out, "{} is not installed in this project!", RUNTIME_PACKAGE)?;
            writeln!(
                out,
                "You can install it with poetry add {} -G dev",
                RUNTIME_PACKAGE
            )?;
            return Ok(ExitStatus::Failure);
        }

        let kernel = self.requested_kernel_opts()?;

        if let Some(icon) = &kernel.icon {
            if !icon.is_file() {
                writeln!(out, "Requested icon {} does not exist!", icon.display())?;
                return Ok(ExitStatus::Failure);
            }
        }

        if !is_valid_kernel_name(&kernel.name) {
            writeln!(
                out,
                "Kernel name {} is invalid: use only letters, numbers, '.', '_' and '-'.",
                kernel.name
            )?;
            return Ok(ExitStatus::Failure);
        }

        let Some(venv) = self.venv()? else {
            writeln!(out, "No virtualenv has been created for this project yet.")?;
            return Ok(ExitStatus::Failure);
        };

        let icon_data = match &kernel.icon {
            Some(path) => std::fs::read(path)?,
            None => DEFAULT_ICON.to_vec(),
        };

        let spec = KernelSpec::for_interpreter(&venv.python_str(), &kernel.display);
        let staged = StagedKernel::write(&spec, &icon_data)?;
        let installed = self.registry.install(staged.path(), &kernel.name, true)?;
        drop(staged);

        info!("Kernel {} installed at {:?}", kernel.name, installed);
        writeln!(out, "Kernel {} has been installed!", kernel.name)?;
        Ok(ExitStatus::Success)
    }

    pub fn remove(&self, out: &mut dyn Write) -> Result<ExitStatus, CommandError> {
        let Some(spec) = self.kernelspec_for_project()? else {
            let kernel = self.requested_kernel_opts()?;
            writeln!(out, "Kernel {} is not installed!", kernel.name)?;
            return Ok(ExitStatus::Failure);
        };

        let question = format!("Really remove kernel {}?", spec.key);
        if !self.prompt.confirm(&question, false)? {
            debug!("Removal of {} declined", spec.key);
            return Ok(ExitStatus::Success);
        }

        self.registry.remove(&spec.key)?;

        writeln!(out)?;
        writeln!(out, "Successfully removed kernel {}.", spec.key)?;
        Ok(ExitStatus::Success)
    }
}
