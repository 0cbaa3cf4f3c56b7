use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::names::CommandNames;
use crate::domain::parse::LifecycleMarkers;
use crate::domain::pipeline::{PipelineSettings, default_base_date};
use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_CHANNEL_CAPACITY, DEFAULT_DECODE_WORKERS,
    DEFAULT_FINISHED_MARKER, DEFAULT_STARTED_MARKER, MAX_DECODE_WORKERS,
};

// =============================================================================
// Output Format Enum
// =============================================================================

/// Report output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

// =============================================================================
// File Config
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct LifecycleFileConfig {
    pub started_marker: Option<String>,
    pub finished_marker: Option<String>,
    pub base_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    pub staged: Option<bool>,
    pub decode_workers: Option<usize>,
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutputFileConfig {
    pub format: Option<OutputFormat>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub lifecycle: Option<LifecycleFileConfig>,
    pub pipeline: Option<PipelineFileConfig>,
    pub output: Option<OutputFileConfig>,
    /// Command id (as string key) to action name, merged over the built-in table
    pub commands: Option<HashMap<String, String>>,
    pub debug: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(lifecycle) = other.lifecycle {
            let current = self
                .lifecycle
                .get_or_insert_with(LifecycleFileConfig::default);
            if lifecycle.started_marker.is_some() {
                tracing::trace!(
                    marker = ?lifecycle.started_marker,
                    "Merging lifecycle.started_marker"
                );
                current.started_marker = lifecycle.started_marker;
            }
            if lifecycle.finished_marker.is_some() {
                tracing::trace!(
                    marker = ?lifecycle.finished_marker,
                    "Merging lifecycle.finished_marker"
                );
                current.finished_marker = lifecycle.finished_marker;
            }
            if lifecycle.base_date.is_some() {
                tracing::trace!(base_date = ?lifecycle.base_date, "Merging lifecycle.base_date");
                current.base_date = lifecycle.base_date;
            }
        }

        if let Some(pipeline) = other.pipeline {
            let current = self.pipeline.get_or_insert_with(PipelineFileConfig::default);
            if pipeline.staged.is_some() {
                tracing::trace!(staged = ?pipeline.staged, "Merging pipeline.staged");
                current.staged = pipeline.staged;
            }
            if pipeline.decode_workers.is_some() {
                tracing::trace!(
                    workers = ?pipeline.decode_workers,
                    "Merging pipeline.decode_workers"
                );
                current.decode_workers = pipeline.decode_workers;
            }
            if pipeline.channel_capacity.is_some() {
                tracing::trace!(
                    capacity = ?pipeline.channel_capacity,
                    "Merging pipeline.channel_capacity"
                );
                current.channel_capacity = pipeline.channel_capacity;
            }
        }

        if let Some(output) = other.output {
            let current = self.output.get_or_insert_with(OutputFileConfig::default);
            if output.format.is_some() {
                tracing::trace!(format = ?output.format, "Merging output.format");
                current.format = output.format;
            }
        }

        // Command entries merge per id
        if let Some(commands) = other.commands {
            tracing::trace!(count = commands.len(), "Merging commands");
            self.commands
                .get_or_insert_with(HashMap::new)
                .extend(commands);
        }

        if other.debug.is_some() {
            self.debug = other.debug;
        }
    }
}

// =============================================================================
// Runtime Config
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub markers: LifecycleMarkers,
    pub base_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub staged: bool,
    pub decode_workers: usize,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// `None` writes to stdout
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub lifecycle: LifecycleConfig,
    pub pipeline: PipelineConfig,
    pub output: OutputConfig,
    /// Entries layered over the built-in command table
    pub commands: HashMap<u32, String>,
    pub debug: bool,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.ctrlscope/ctrlscope.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Load from profile dir (~/.ctrlscope/ctrlscope.json) - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. Load from CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        Self::from_layers(file_config, cli)
    }

    /// Layer defaults -> file config -> CLI/env overrides
    fn from_layers(file_config: FileConfig, cli: &CliConfig) -> Result<Self> {
        let file_lifecycle = file_config.lifecycle.unwrap_or_default();
        let file_pipeline = file_config.pipeline.unwrap_or_default();
        let file_output = file_config.output.unwrap_or_default();

        let lifecycle = LifecycleConfig {
            markers: LifecycleMarkers {
                started: file_lifecycle
                    .started_marker
                    .unwrap_or_else(|| DEFAULT_STARTED_MARKER.to_string()),
                finished: file_lifecycle
                    .finished_marker
                    .unwrap_or_else(|| DEFAULT_FINISHED_MARKER.to_string()),
            },
            base_date: cli
                .base_date
                .or(file_lifecycle.base_date)
                .unwrap_or_else(default_base_date),
        };

        // --staged only enables; the file decides otherwise
        let pipeline = PipelineConfig {
            staged: cli.staged || file_pipeline.staged.unwrap_or(false),
            decode_workers: cli
                .workers
                .or(file_pipeline.decode_workers)
                .unwrap_or(DEFAULT_DECODE_WORKERS),
            channel_capacity: file_pipeline
                .channel_capacity
                .unwrap_or(DEFAULT_CHANNEL_CAPACITY),
        };

        let output = OutputConfig {
            format: cli.format.or(file_output.format).unwrap_or_default(),
            path: cli.output.clone(),
        };

        let commands = parse_command_entries(file_config.commands.unwrap_or_default())?;

        let config = Self {
            lifecycle,
            pipeline,
            output,
            commands,
            debug: cli.debug || file_config.debug.unwrap_or(false),
        };

        config.validate()?;

        tracing::debug!(
            staged = config.pipeline.staged,
            workers = config.pipeline.decode_workers,
            format = %config.output.format,
            base_date = %config.lifecycle.base_date,
            command_overrides = config.commands.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        let markers = &self.lifecycle.markers;
        if markers.started.trim().is_empty() || markers.finished.trim().is_empty() {
            anyhow::bail!("Configuration error: lifecycle markers must not be empty");
        }
        if markers.started == markers.finished {
            anyhow::bail!(
                "Configuration error: lifecycle.started_marker and lifecycle.finished_marker \
                 cannot be the same ('{}')",
                markers.started
            );
        }

        if self.pipeline.decode_workers == 0 || self.pipeline.decode_workers > MAX_DECODE_WORKERS {
            anyhow::bail!(
                "Configuration error: pipeline.decode_workers must be between 1 and {} (got {})",
                MAX_DECODE_WORKERS,
                self.pipeline.decode_workers
            );
        }
        if self.pipeline.channel_capacity == 0 {
            anyhow::bail!("Configuration error: pipeline.channel_capacity must be greater than 0");
        }

        if let Some((id, _)) = self.commands.iter().find(|(_, name)| name.trim().is_empty()) {
            anyhow::bail!("Configuration error: commands.{} has an empty name", id);
        }

        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            markers: self.lifecycle.markers.clone(),
            base_date: self.lifecycle.base_date,
            decode_workers: self.pipeline.decode_workers,
            channel_capacity: self.pipeline.channel_capacity,
        }
    }

    /// Built-in command table with configured entries applied.
    pub fn command_names(&self) -> CommandNames {
        CommandNames::builtin().with_overrides(&self.commands)
    }
}

/// Convert `"id": "NAME"` entries to numeric ids
fn parse_command_entries(entries: HashMap<String, String>) -> Result<HashMap<u32, String>> {
    entries
        .into_iter()
        .map(|(key, name)| {
            let id = key.trim().parse::<u32>().with_context(|| {
                format!(
                    "Configuration error: commands key '{}' is not a command id",
                    key
                )
            })?;
            Ok((id, name))
        })
        .collect()
}

/// Get the profile config path (~/.ctrlscope/ctrlscope.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::domain::names::ActionName;

    fn layered(json: &str, cli: &CliConfig) -> Result<AppConfig> {
        let file_config: FileConfig = serde_json::from_str(json).unwrap();
        AppConfig::from_layers(file_config, cli)
    }

    #[test]
    fn test_output_format_serde() {
        let format: OutputFormat = serde_json::from_str(r#""json""#).unwrap();
        assert_eq!(format, OutputFormat::Json);
        assert_eq!(OutputFormat::Text.to_string(), "text");
    }

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "lifecycle": { "started_marker": "BEGIN", "finished_marker": "END", "base_date": "2024-09-24" },
            "pipeline": { "staged": true, "decode_workers": 2, "channel_capacity": 16 },
            "output": { "format": "json" },
            "commands": { "4096": "CUSTOM_MOVE" },
            "debug": true
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        let lifecycle = config.lifecycle.as_ref().unwrap();
        assert_eq!(lifecycle.started_marker.as_deref(), Some("BEGIN"));
        assert_eq!(lifecycle.base_date, NaiveDate::from_ymd_opt(2024, 9, 24));
        assert_eq!(config.pipeline.as_ref().unwrap().decode_workers, Some(2));
        assert_eq!(
            config.output.as_ref().unwrap().format,
            Some(OutputFormat::Json)
        );
        assert_eq!(
            config.commands.as_ref().unwrap().get("4096").map(String::as_str),
            Some("CUSTOM_MOVE")
        );
        assert_eq!(config.debug, Some(true));
    }

    #[test]
    fn test_file_config_parse_empty() {
        let config: FileConfig = serde_json::from_str("{}").unwrap();
        assert!(config.lifecycle.is_none());
        assert!(config.commands.is_none());
    }

    #[test]
    fn test_file_config_parse_extra_fields() {
        let json = r#"{ "pipeline": { "staged": true }, "unknown_field": 123 }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.pipeline.as_ref().unwrap().staged, Some(true));
        assert_eq!(config.extra.get("unknown_field").unwrap(), 123);
    }

    #[test]
    fn test_app_config_rejects_bad_command_id() {
        let result = layered(
            r#"{ "commands": { "not-a-number": "X" } }"#,
            &CliConfig::default(),
        );
        let message = result.unwrap_err().to_string();
        assert!(message.contains("not-a-number"));
    }

    #[test]
    fn test_file_config_merge() {
        let mut base: FileConfig = serde_json::from_str(
            r#"{
                "lifecycle": { "started_marker": "BEGIN", "finished_marker": "END" },
                "pipeline": { "decode_workers": 2, "channel_capacity": 16 },
                "commands": { "517": "STOP", "4096": "CUSTOM" },
                "debug": false
            }"#,
        )
        .unwrap();
        let overlay: FileConfig = serde_json::from_str(
            r#"{
                "lifecycle": { "finished_marker": "DONE" },
                "pipeline": { "decode_workers": 8 },
                "commands": { "517": "HALT_NOW" },
                "debug": true
            }"#,
        )
        .unwrap();

        base.merge(overlay);

        let lifecycle = base.lifecycle.as_ref().unwrap();
        assert_eq!(lifecycle.started_marker.as_deref(), Some("BEGIN"));
        assert_eq!(lifecycle.finished_marker.as_deref(), Some("DONE"));
        let pipeline = base.pipeline.as_ref().unwrap();
        assert_eq!(pipeline.decode_workers, Some(8));
        assert_eq!(pipeline.channel_capacity, Some(16));
        let commands = base.commands.as_ref().unwrap();
        assert_eq!(commands.get("517").map(String::as_str), Some("HALT_NOW"));
        assert_eq!(commands.get("4096").map(String::as_str), Some("CUSTOM"));
        assert_eq!(base.debug, Some(true));
    }

    #[test]
    fn test_app_config_defaults() {
        let config = layered("{}", &CliConfig::default()).unwrap();

        assert_eq!(config.lifecycle.markers, LifecycleMarkers::default());
        assert_eq!(config.lifecycle.base_date, default_base_date());
        assert!(!config.pipeline.staged);
        assert_eq!(config.pipeline.decode_workers, DEFAULT_DECODE_WORKERS);
        assert_eq!(config.pipeline.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(config.output.path.is_none());
        assert!(!config.debug);
    }

    #[test]
    fn test_app_config_cli_override() {
        let cli = CliConfig {
            format: Some(OutputFormat::Json),
            output: Some(PathBuf::from("report.json")),
            staged: true,
            workers: Some(3),
            base_date: NaiveDate::from_ymd_opt(2024, 1, 2),
            ..Default::default()
        };
        let json = r#"{
            "lifecycle": { "base_date": "2020-05-05" },
            "pipeline": { "decode_workers": 12 },
            "output": { "format": "text" }
        }"#;
        let config = layered(json, &cli).unwrap();

        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.path, Some(PathBuf::from("report.json")));
        assert!(config.pipeline.staged);
        assert_eq!(config.pipeline.decode_workers, 3);
        assert_eq!(
            config.lifecycle.base_date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn test_app_config_file_enables_staged() {
        let config = layered(
            r#"{ "pipeline": { "staged": true } }"#,
            &CliConfig::default(),
        )
        .unwrap();
        assert!(config.pipeline.staged);
    }

    #[test]
    fn test_app_config_validation_empty_marker() {
        let result = layered(
            r#"{ "lifecycle": { "started_marker": "  " } }"#,
            &CliConfig::default(),
        );
        let message = result.unwrap_err().to_string();
        assert!(message.contains("must not be empty"));
    }

    #[test]
    fn test_app_config_validation_same_markers() {
        let result = layered(
            r#"{ "lifecycle": { "started_marker": "X", "finished_marker": "X" } }"#,
            &CliConfig::default(),
        );
        let message = result.unwrap_err().to_string();
        assert!(message.contains("cannot be the same"));
    }

    #[test]
    fn test_app_config_validation_workers() {
        let cli = CliConfig {
            workers: Some(0),
            ..Default::default()
        };
        assert!(layered("{}", &cli).is_err());

        let cli = CliConfig {
            workers: Some(MAX_DECODE_WORKERS + 1),
            ..Default::default()
        };
        assert!(layered("{}", &cli).is_err());
    }

    #[test]
    fn test_app_config_validation_channel_capacity() {
        let result = layered(
            r#"{ "pipeline": { "channel_capacity": 0 } }"#,
            &CliConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_app_config_validation_empty_command_name() {
        let result = layered(r#"{ "commands": { "4096": "" } }"#, &CliConfig::default());
        let message = result.unwrap_err().to_string();
        assert!(message.contains("commands.4096"));
    }

    #[test]
    fn test_command_names_apply_overrides() {
        let config = layered(
            r#"{ "commands": { "517": "EMERGENCY_HALT", "4096": "CUSTOM" } }"#,
            &CliConfig::default(),
        )
        .unwrap();
        let names = config.command_names();
        assert_eq!(
            names.resolve(517),
            ActionName::Resolved("EMERGENCY_HALT".to_string())
        );
        let custom = ActionName::Resolved("CUSTOM".to_string());
        assert_eq!(names.resolve(4096), custom);
        assert_eq!(
            names.resolve(514),
            ActionName::Resolved("HOME_GRP".to_string())
        );
    }

    #[test]
    fn test_pipeline_settings_from_config() {
        let cli = CliConfig {
            workers: Some(2),
            ..Default::default()
        };
        let settings = layered(r#"{ "lifecycle": { "started_marker": "GO" } }"#, &cli)
            .unwrap()
            .pipeline_settings();
        assert_eq!(settings.decode_workers, 2);
        assert_eq!(settings.markers.started, "GO");
        assert_eq!(settings.markers.finished, DEFAULT_FINISHED_MARKER);
    }

    #[test]
    fn test_app_config_load_from_cli_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "pipeline": {{ "decode_workers": 6 }}, "typo_section": {{}} }}"#
        )
        .unwrap();
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.pipeline.decode_workers, 6);
    }

    #[test]
    fn test_app_config_load_missing_cli_path() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/nonexistent/ctrlscope.json")),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_app_config_load_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let cli = CliConfig {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Failed to parse config file"));
    }
}
