use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use serde_json::Value;

use crate::domain::jobs::OutputKind;

/// Command-line arguments for the meshworks binary.
#[derive(Debug, Parser)]
#[command(
    name = "meshworks",
    version,
    about = "Render, export and slice parametric models"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "MESHWORKS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run one job through the render queue and print its result as JSON.
    Render(Box<RenderArgs>),
    /// Price a print from slicer metadata and stored profiles.
    Estimate(EstimateArgs),
    /// List the customizable variables of a SCAD source file.
    Variables(VariablesArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct EngineOverrides {
    /// Override the geometry engine executable.
    #[arg(long = "geometry-path", value_name = "PATH")]
    pub geometry_path: Option<PathBuf>,

    /// Override the slicer executable.
    #[arg(long = "slicer-path", value_name = "PATH")]
    pub slicer_path: Option<PathBuf>,

    /// Override the default slicer configuration file.
    #[arg(long = "slicer-config", value_name = "PATH")]
    pub slicer_config: Option<PathBuf>,

    /// Override the design (scratch) directory.
    #[arg(long = "design-dir", value_name = "PATH")]
    pub design_dir: Option<PathBuf>,

    /// Override the render output directory.
    #[arg(long = "render-dir", value_name = "PATH")]
    pub render_dir: Option<PathBuf>,

    /// Override the number of concurrent jobs.
    #[arg(long = "jobs-concurrency", value_name = "COUNT")]
    pub concurrency: Option<u32>,
}

#[derive(Debug, Args, Clone)]
#[command(group(
    ArgGroup::new("input")
        .required(true)
        .args(["scad_file", "design", "mesh"])
))]
pub struct RenderArgs {
    #[command(flatten)]
    pub overrides: EngineOverrides,

    /// Read inline SCAD source from this file.
    #[arg(long = "scad-file", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub scad_file: Option<PathBuf>,

    /// Use a stored design by reference.
    #[arg(long, value_name = "REF")]
    pub design: Option<String>,

    /// Use an uploaded mesh by reference.
    #[arg(long, value_name = "REF")]
    pub mesh: Option<String>,

    /// Output kind: preview, stl, obj, 3mf or gcode.
    #[arg(long, default_value = "preview", value_parser = parse_output_kind)]
    pub kind: OutputKind,

    /// Camera preset (top|bottom|front|back|left|right|iso) or a raw camera value.
    #[arg(long)]
    pub camera: Option<String>,

    /// Camera distance used with presets.
    #[arg(long)]
    pub distance: Option<f64>,

    /// Color scheme for previews.
    #[arg(long = "color-scheme", value_name = "NAME")]
    pub color_scheme: Option<String>,

    /// Variable override as `name=<json literal>`; may be repeated.
    #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, Value)>,

    /// Slicer configuration file replacing the default.
    #[arg(long = "printer-config", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub printer_config: Option<PathBuf>,

    /// Stored printer whose slicer configuration override and power draw are used.
    #[arg(long, value_name = "ID")]
    pub printer: Option<i64>,

    /// Stored filament used to price gcode results.
    #[arg(long, value_name = "ID")]
    pub filament: Option<i64>,

    /// Seconds to wait for the result; defaults to `jobs.wait_timeout_secs`.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct EstimateArgs {
    /// Filament length as reported by the slicer, e.g. `1234.5mm`.
    #[arg(long = "filament-used", value_name = "LENGTH")]
    pub filament_used: String,

    /// Print time as reported by the slicer, e.g. `1h 2m 3s`.
    #[arg(long = "time", value_name = "DURATION")]
    pub estimated_time: String,

    #[arg(long, value_name = "ID")]
    pub printer: i64,

    #[arg(long, value_name = "ID")]
    pub filament: i64,

    /// Override the profile store file.
    #[arg(long = "profiles", value_name = "PATH")]
    pub profiles_path: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct VariablesArgs {
    /// SCAD source file to scan.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

fn parse_output_kind(value: &str) -> Result<OutputKind, String> {
    value.parse().map_err(|err: crate::domain::error::DomainError| err.to_string())
}

/// Parse `name=value`. The value is read as JSON; anything that is not valid JSON
/// is taken as a plain string.
pub(crate) fn parse_param(value: &str) -> Result<(String, Value), String> {
    let (name, raw) = value
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got `{value}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("parameter name must not be empty".to_string());
    }
    let parsed = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), parsed))
}
