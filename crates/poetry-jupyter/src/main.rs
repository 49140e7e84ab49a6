use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kernel_env::PoetryEnvManager;
use log::debug;
use poetry_jupyter::{ExitStatus, JupyterCommand, JupyterRegistry, Project, TerminalPrompt};

#[derive(Parser)]
#[command(name = "poetry-jupyter", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// The working directory for the project (default: current directory)
    #[arg(short = 'C', long, global = true)]
    directory: Option<PathBuf>,

    /// Do not ask any interactive question
    #[arg(short = 'n', long, global = true)]
    no_interaction: bool,

    /// Log level
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Jupyter kernel commands for this project
    Jupyter {
        #[command(subcommand)]
        command: JupyterCommands,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum JupyterCommands {
    /// Show Jupyter kernels in this project
    Show,
    /// Register this project as a Jupyter kernel
    Install,
    /// Remove this project's Jupyter kernel
    Remove,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    match run(cli) {
        Ok(status) => ExitCode::from(status.code()),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(ExitStatus::Failure.code())
        }
    }
}

fn run(cli: Cli) -> Result<ExitStatus> {
    let directory = match cli.directory {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    let project = Project::discover(&directory)?;
    debug!("Using project at {:?}", project.path());

    // Environments are named after the project, not the kernel override
    let project_name = project
        .name()
        .or_else(|| project.root().file_name().and_then(|n| n.to_str()))
        .unwrap_or_default()
        .to_string();
    let envs = PoetryEnvManager::new(&project_name, project.root())?;
    let registry = JupyterRegistry::new();
    let prompt = TerminalPrompt {
        no_interaction: cli.no_interaction,
    };

    let command = JupyterCommand::new(&project, &envs, &registry, &prompt);
    let mut stdout = std::io::stdout().lock();

    let Commands::Jupyter { command: action } = cli.command;
    let status = match action {
        JupyterCommands::Show => command.show(&mut stdout)?,
        JupyterCommands::Install => command.install(&mut stdout)?,
        JupyterCommands::Remove => command.remove(&mut stdout)?,
    };
    Ok(status)
}
