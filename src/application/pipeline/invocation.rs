//! Command lines for the geometry engine and the slicer.

use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

use serde_json::Value;

use crate::{
    config::EngineSettings,
    domain::jobs::{Job, OutputKind},
};

use super::error::Tool;

/// Parameter names that steer rendering instead of being injected as variables.
const RESERVED_PARAMETERS: [&str; 5] = [
    "camera",
    "distance",
    "colorScheme",
    "texture",
    "renderSettings",
];

/// Named viewpoints as `translate x,y,z` + `rotate x,y,z`.
const CAMERA_PRESETS: [(&str, &str); 7] = [
    ("top", "0,0,0,0,0,0"),
    ("bottom", "0,0,0,180,0,0"),
    ("front", "0,0,0,90,0,0"),
    ("back", "0,0,0,270,0,0"),
    ("left", "0,0,0,90,0,90"),
    ("right", "0,0,0,90,0,270"),
    ("iso", "0,0,0,60,0,45"),
];

pub fn camera_preset(name: &str) -> Option<&'static str> {
    let name = name.trim();
    CAMERA_PRESETS
        .iter()
        .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
        .map(|(_, tuple)| *tuple)
}

/// Engine locations and rendering defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub geometry_path: PathBuf,
    pub geometry_backend: String,
    pub preview_width: u32,
    pub preview_height: u32,
    pub color_scheme: String,
    pub camera_distance: f64,
    pub slicer_path: PathBuf,
    pub slicer_config: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            geometry_path: PathBuf::from("openscad"),
            geometry_backend: "manifold".to_string(),
            preview_width: 800,
            preview_height: 600,
            color_scheme: "Tomorrow Night".to_string(),
            camera_distance: 500.0,
            slicer_path: PathBuf::from("tools/squashfs-root/AppRun"),
            slicer_config: PathBuf::from("tools/config.ini"),
        }
    }
}

impl From<&EngineSettings> for EngineConfig {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            geometry_path: settings.geometry_path.clone(),
            geometry_backend: settings.geometry_backend.clone(),
            preview_width: settings.preview_width.get(),
            preview_height: settings.preview_height.get(),
            color_scheme: settings.color_scheme.clone(),
            camera_distance: settings.camera_distance,
            slicer_path: settings.slicer_path.clone(),
            slicer_config: settings.slicer_config.clone(),
        }
    }
}

/// One external process to run, plus the artifact it must leave behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub tool: Tool,
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub expected_output: PathBuf,
}

impl Invocation {
    fn new(tool: Tool, program: &Path, expected_output: PathBuf) -> Self {
        Self {
            tool,
            program: program.to_path_buf(),
            args: Vec::new(),
            expected_output,
        }
    }

    fn arg(&mut self, value: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(value.as_ref().to_os_string());
        self
    }

    /// Arguments as UTF-8 (lossy), for logging and assertions.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in self.args_lossy() {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

/// Geometry engine command line for `job`, reading `input` and writing `output`.
pub fn geometry_invocation(
    config: &EngineConfig,
    job: &Job,
    input: &Path,
    output: &Path,
) -> Invocation {
    let mut invocation = Invocation::new(
        Tool::GeometryEngine,
        &config.geometry_path,
        output.to_path_buf(),
    );
    invocation
        .arg("-o")
        .arg(output)
        .arg(format!("--backend={}", config.geometry_backend));

    if job.output() == OutputKind::Preview {
        push_preview_args(&mut invocation, config, job);
    }

    for (name, literal) in variable_overrides(job) {
        invocation.arg("-D").arg(format!("{name}={literal}"));
    }

    invocation.arg(input);
    invocation
}

/// Slicer command line turning `mesh` into machine code at `output`.
pub fn slicer_invocation(
    config: &EngineConfig,
    slicer_config: &Path,
    mesh: &Path,
    output: &Path,
) -> Invocation {
    let mut invocation = Invocation::new(Tool::Slicer, &config.slicer_path, output.to_path_buf());
    invocation
        .arg("--export-gcode")
        .arg("--load")
        .arg(slicer_config)
        .arg("-o")
        .arg(output)
        .arg(mesh);
    invocation
}

fn push_preview_args(invocation: &mut Invocation, config: &EngineConfig, job: &Job) {
    invocation.arg(format!(
        "--imgsize={},{}",
        config.preview_width, config.preview_height
    ));

    match camera_option(job) {
        Some(camera) => {
            let argument = match camera_preset(&camera) {
                Some(tuple) => {
                    let distance = distance_option(job).unwrap_or(config.camera_distance);
                    format!("--camera={tuple},{distance}")
                }
                None => format!("--camera={camera}"),
            };
            invocation.arg(argument);
        }
        None => {
            invocation.arg("--autocenter").arg("--viewall");
        }
    }

    let scheme = color_scheme_option(job).unwrap_or_else(|| config.color_scheme.clone());
    invocation.arg(format!("--colorscheme={scheme}"));
}

/// Options win over same-named parameters.
fn camera_option(job: &Job) -> Option<String> {
    non_empty(job.options().camera.clone())
        .or_else(|| non_empty(string_parameter(job, "camera")))
}

fn color_scheme_option(job: &Job) -> Option<String> {
    non_empty(job.options().color_scheme.clone())
        .or_else(|| non_empty(string_parameter(job, "colorScheme")))
}

fn distance_option(job: &Job) -> Option<f64> {
    job.options()
        .distance
        .or_else(|| match job.parameters().get("distance") {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => text.trim().parse().ok(),
            _ => None,
        })
        .filter(|distance| distance.is_finite() && *distance > 0.0)
}

fn string_parameter(job: &Job, name: &str) -> Option<String> {
    match job.parameters().get(name) {
        Some(Value::String(text)) => Some(text.clone()),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

/// `(name, literal)` pairs for every injectable parameter, in name order.
///
/// Nulls, reserved names and values with no literal form (objects) are skipped.
pub fn variable_overrides(job: &Job) -> Vec<(String, String)> {
    job.parameters()
        .iter()
        .filter(|(name, _)| !RESERVED_PARAMETERS.contains(&name.as_str()))
        .filter_map(|(name, value)| scad_literal(value).map(|literal| (name.clone(), literal)))
        .collect()
}

/// Render a parameter value as a geometry-engine literal.
pub fn scad_literal(value: &Value) -> Option<String> {
    match value {
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => Some(format!("\"{}\"", text.replace('"', "\\\""))),
        Value::Array(_) => serde_json::to_string(value).ok(),
        Value::Null | Value::Object(_) => None,
    }
}
