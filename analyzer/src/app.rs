//! Core application

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::cli::{self, Commands};
use crate::core::config::AppConfig;
use crate::core::constants::{APP_NAME, APP_NAME_LOWER, ENV_LOG};
use crate::core::output::{Report, write_report};
use crate::domain::pipeline::{CommReport, LifecycleReport, Reconstructor};
use crate::utils::file::{expand_path, open_trace};

pub struct CoreApp {
    pub config: AppConfig,
    pub reconstructor: Reconstructor,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();

        let (cli_config, command) = cli::parse();
        Self::init_logging(cli_config.debug);

        tracing::debug!(app = APP_NAME, "Application starting");
        tracing::trace!(command = ?command, "Parsed command");

        let config = AppConfig::load(&cli_config)?;
        let app = Self::init(config);
        app.execute(command).await
    }

    pub fn init(config: AppConfig) -> Self {
        if config.debug {
            tracing::info!(config = ?config, "Debug mode enabled");
        }
        let names = config.command_names();
        tracing::debug!(commands = names.len(), "Command table ready");
        let reconstructor = Reconstructor::new(config.pipeline_settings(), names);
        Self {
            config,
            reconstructor,
        }
    }

    /// Run one subcommand and write its report.
    pub async fn execute(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Comm { file } => {
                let comm = self.analyze_comm(&file).await?;
                self.emit(Report {
                    comm: Some(&comm),
                    lifecycle: None,
                })
            }
            Commands::Control { file } => {
                let lifecycle = self.analyze_control(&file).await?;
                self.emit(Report {
                    comm: None,
                    lifecycle: Some(&lifecycle),
                })
            }
            Commands::Combined { comm, control } => {
                let (comm, lifecycle) =
                    tokio::try_join!(self.analyze_comm(&comm), self.analyze_control(&control))?;
                self.emit(Report {
                    comm: Some(&comm),
                    lifecycle: Some(&lifecycle),
                })
            }
        }
    }

    pub async fn analyze_comm(&self, file: &Path) -> Result<CommReport> {
        let path = expand_path(&file.to_string_lossy());
        let reader = open_trace(&path)
            .with_context(|| format!("Failed to open communication trace: {}", path.display()))?;
        let report = if self.config.pipeline.staged {
            self.reconstructor.comm_staged(reader).await
        } else {
            self.reconstructor.comm(reader)
        };
        report.with_context(|| format!("Failed to analyze communication trace: {}", path.display()))
    }

    pub async fn analyze_control(&self, file: &Path) -> Result<LifecycleReport> {
        let path = expand_path(&file.to_string_lossy());
        let reader = open_trace(&path)
            .with_context(|| format!("Failed to open control trace: {}", path.display()))?;
        let report = if self.config.pipeline.staged {
            self.reconstructor.lifecycle_staged(reader).await
        } else {
            self.reconstructor.lifecycle(reader)
        };
        report.with_context(|| format!("Failed to analyze control trace: {}", path.display()))
    }

    fn emit(&self, report: Report<'_>) -> Result<()> {
        write_report(&report, &self.config.output)
    }

    fn init_logging(debug: bool) {
        let level = if debug { "debug" } else { "info" };
        let default_filter = format!("{},{}={}", level, APP_NAME_LOWER, level);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        // stdout carries the report
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }
}
