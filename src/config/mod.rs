//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{
    CliArgs, Command, EngineOverrides, EstimateArgs, LoggingOverrides, RenderArgs, VariablesArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "meshworks";
const DEFAULT_JOBS_CONCURRENCY: u32 = 2;
const DEFAULT_RATE_LIMIT_MAX: u32 = 5;
const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 1000;
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_HISTORY_COMPLETED: usize = 100;
const DEFAULT_HISTORY_FAILED: usize = 200;
const DEFAULT_DESIGN_DIR: &str = "designs";
const DEFAULT_RENDER_DIR: &str = "public/renders";
const DEFAULT_GEOMETRY_PATH: &str = "openscad";
const DEFAULT_GEOMETRY_BACKEND: &str = "manifold";
const DEFAULT_PREVIEW_WIDTH: u32 = 800;
const DEFAULT_PREVIEW_HEIGHT: u32 = 600;
const DEFAULT_COLOR_SCHEME: &str = "Tomorrow Night";
const DEFAULT_CAMERA_DISTANCE: f64 = 500.0;
const DEFAULT_SLICER_PATH: &str = "tools/squashfs-root/AppRun";
const DEFAULT_SLICER_CONFIG: &str = "tools/config.ini";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub jobs: JobsSettings,
    pub storage: StorageSettings,
    pub engines: EngineSettings,
    pub profiles: ProfileSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub concurrency: NonZeroU32,
    pub rate_limit_max: NonZeroU32,
    pub rate_limit_window: Duration,
    pub wait_timeout: Duration,
    pub history_completed: usize,
    pub history_failed: usize,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub design_dir: PathBuf,
    pub render_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub geometry_path: PathBuf,
    pub geometry_backend: String,
    pub preview_width: NonZeroU32,
    pub preview_height: NonZeroU32,
    pub color_scheme: String,
    pub camera_distance: f64,
    pub slicer_path: PathBuf,
    pub slicer_config: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileSettings {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("MESHWORKS").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_logging_overrides(&cli.logging);
    match &cli.command {
        Command::Render(args) => raw.apply_engine_overrides(&args.overrides),
        Command::Estimate(args) => {
            if let Some(path) = args.profiles_path.as_ref() {
                raw.profiles.path = Some(path.clone());
            }
        }
        Command::Variables(_) => {}
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    jobs: RawJobsSettings,
    storage: RawStorageSettings,
    engines: RawEngineSettings,
    profiles: RawProfileSettings,
}

impl RawSettings {
    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_engine_overrides(&mut self, overrides: &EngineOverrides) {
        if let Some(path) = overrides.geometry_path.as_ref() {
            self.engines.geometry_path = Some(path.clone());
        }
        if let Some(path) = overrides.slicer_path.as_ref() {
            self.engines.slicer_path = Some(path.clone());
        }
        if let Some(path) = overrides.slicer_config.as_ref() {
            self.engines.slicer_config = Some(path.clone());
        }
        if let Some(dir) = overrides.design_dir.as_ref() {
            self.storage.design_dir = Some(dir.clone());
        }
        if let Some(dir) = overrides.render_dir.as_ref() {
            self.storage.render_dir = Some(dir.clone());
        }
        if let Some(value) = overrides.concurrency {
            self.jobs.concurrency = Some(value);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            jobs,
            storage,
            engines,
            profiles,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            jobs: build_jobs_settings(jobs)?,
            storage: build_storage_settings(storage)?,
            engines: build_engine_settings(engines)?,
            profiles: ProfileSettings {
                path: profiles
                    .path
                    .filter(|path| !path.as_os_str().is_empty()),
            },
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let concurrency = jobs.concurrency.unwrap_or(DEFAULT_JOBS_CONCURRENCY);
    let rate_limit_max = jobs.rate_limit_max.unwrap_or(DEFAULT_RATE_LIMIT_MAX);

    let window_ms = jobs
        .rate_limit_window_ms
        .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_MS);
    if window_ms == 0 {
        return Err(LoadError::invalid(
            "jobs.rate_limit_window_ms",
            "must be greater than zero",
        ));
    }

    let wait_timeout_secs = jobs.wait_timeout_secs.unwrap_or(DEFAULT_WAIT_TIMEOUT_SECS);
    if wait_timeout_secs == 0 {
        return Err(LoadError::invalid(
            "jobs.wait_timeout_secs",
            "must be greater than zero",
        ));
    }

    Ok(JobsSettings {
        concurrency: non_zero_u32(concurrency.into(), "jobs.concurrency")?,
        rate_limit_max: non_zero_u32(rate_limit_max.into(), "jobs.rate_limit_max")?,
        rate_limit_window: Duration::from_millis(window_ms),
        wait_timeout: Duration::from_secs(wait_timeout_secs),
        history_completed: jobs.history_completed.unwrap_or(DEFAULT_HISTORY_COMPLETED),
        history_failed: jobs.history_failed.unwrap_or(DEFAULT_HISTORY_FAILED),
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let design_dir = non_empty_path(
        storage.design_dir,
        DEFAULT_DESIGN_DIR,
        "storage.design_dir",
    )?;
    let render_dir = non_empty_path(
        storage.render_dir,
        DEFAULT_RENDER_DIR,
        "storage.render_dir",
    )?;
    if design_dir == render_dir {
        return Err(LoadError::invalid(
            "storage.render_dir",
            "must differ from storage.design_dir",
        ));
    }

    Ok(StorageSettings {
        design_dir,
        render_dir,
    })
}

fn build_engine_settings(engines: RawEngineSettings) -> Result<EngineSettings, LoadError> {
    let geometry_path = non_empty_path(
        engines.geometry_path,
        DEFAULT_GEOMETRY_PATH,
        "engines.geometry_path",
    )?;
    let slicer_path = non_empty_path(
        engines.slicer_path,
        DEFAULT_SLICER_PATH,
        "engines.slicer_path",
    )?;
    let slicer_config = non_empty_path(
        engines.slicer_config,
        DEFAULT_SLICER_CONFIG,
        "engines.slicer_config",
    )?;

    let geometry_backend = engines
        .geometry_backend
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_GEOMETRY_BACKEND.to_string());
    if geometry_backend.is_empty() {
        return Err(LoadError::invalid(
            "engines.geometry_backend",
            "must not be empty",
        ));
    }

    let color_scheme = engines
        .color_scheme
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_COLOR_SCHEME.to_string());

    let camera_distance = engines.camera_distance.unwrap_or(DEFAULT_CAMERA_DISTANCE);
    if !camera_distance.is_finite() || camera_distance <= 0.0 {
        return Err(LoadError::invalid(
            "engines.camera_distance",
            "must be a positive number",
        ));
    }

    Ok(EngineSettings {
        geometry_path,
        geometry_backend,
        preview_width: non_zero_u32(
            engines.preview_width.unwrap_or(DEFAULT_PREVIEW_WIDTH).into(),
            "engines.preview_width",
        )?,
        preview_height: non_zero_u32(
            engines
                .preview_height
                .unwrap_or(DEFAULT_PREVIEW_HEIGHT)
                .into(),
            "engines.preview_height",
        )?,
        color_scheme,
        camera_distance,
        slicer_path,
        slicer_config,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    concurrency: Option<u32>,
    rate_limit_max: Option<u32>,
    rate_limit_window_ms: Option<u64>,
    wait_timeout_secs: Option<u64>,
    history_completed: Option<usize>,
    history_failed: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    design_dir: Option<PathBuf>,
    render_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEngineSettings {
    geometry_path: Option<PathBuf>,
    geometry_backend: Option<String>,
    preview_width: Option<u32>,
    preview_height: Option<u32>,
    color_scheme: Option<String>,
    camera_distance: Option<f64>,
    slicer_path: Option<PathBuf>,
    slicer_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawProfileSettings {
    path: Option<PathBuf>,
}

fn non_empty_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests;
