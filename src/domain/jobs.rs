//! Job requests, identities and results exchanged with the render queue.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

/// Literal reported for metadata fields the slicer output did not yield.
pub const UNKNOWN_METADATA: &str = "Unknown";

/// Queue-assigned identity of a job. Every file a job touches is named after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// `job-<id>.<ext>`: primary pipeline output, and the intermediate STL of gcode jobs.
    pub fn output_filename(&self, extension: &str) -> String {
        format!("job-{}.{extension}", self.0)
    }

    /// `render-<id>.gcode`: sliced output.
    pub fn gcode_filename(&self) -> String {
        format!("render-{}.gcode", self.0)
    }

    /// `temp-input-<id>.scad`: inline source written to the scratch directory.
    pub fn temp_input_filename(&self) -> String {
        format!("temp-input-{}.scad", self.0)
    }

    /// `temp-config-<id>.ini`: caller-supplied slicer configuration.
    pub fn temp_config_filename(&self) -> String {
        format!("temp-config-{}.ini", self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshFormat {
    Stl,
    Obj,
    #[serde(rename = "3mf")]
    ThreeMf,
}

impl MeshFormat {
    pub fn extension(self) -> &'static str {
        match self {
            MeshFormat::Stl => "stl",
            MeshFormat::Obj => "obj",
            MeshFormat::ThreeMf => "3mf",
        }
    }
}

/// What a job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Preview,
    Mesh(MeshFormat),
    Gcode,
}

impl OutputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputKind::Preview => "preview",
            OutputKind::Mesh(format) => format.extension(),
            OutputKind::Gcode => "gcode",
        }
    }

    /// Extension of the file the geometry engine writes for this kind.
    pub fn geometry_extension(self) -> &'static str {
        match self {
            OutputKind::Preview => "png",
            OutputKind::Mesh(format) => format.extension(),
            OutputKind::Gcode => MeshFormat::Stl.extension(),
        }
    }
}

impl FromStr for OutputKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "preview" | "png" => Ok(OutputKind::Preview),
            "stl" => Ok(OutputKind::Mesh(MeshFormat::Stl)),
            "obj" => Ok(OutputKind::Mesh(MeshFormat::Obj)),
            "3mf" => Ok(OutputKind::Mesh(MeshFormat::ThreeMf)),
            "gcode" => Ok(OutputKind::Gcode),
            other => Err(DomainError::validation(format!(
                "unsupported output kind `{other}`"
            ))),
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the job's input comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum InputSource {
    /// Source text supplied with the request.
    Inline(String),
    /// Reference to a stored design (`<ref>.scad` in the design directory).
    StoredDesign(String),
    /// Reference to an uploaded mesh file in the render directory.
    StoredMesh(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    pub camera: Option<String>,
    pub distance: Option<f64>,
    pub color_scheme: Option<String>,
    /// Slicer configuration text replacing the default config file.
    pub printer_config: Option<String>,
}

/// Named parameter values injected into the geometry engine.
pub type JobParameters = BTreeMap<String, serde_json::Value>;

/// A job as submitted by the caller, before the queue assigns an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub output: OutputKind,
    pub input: InputSource,
    #[serde(default)]
    pub options: JobOptions,
    #[serde(default)]
    pub parameters: JobParameters,
}

impl JobRequest {
    pub fn new(output: OutputKind, input: InputSource) -> Self {
        Self {
            output,
            input,
            options: JobOptions::default(),
            parameters: JobParameters::new(),
        }
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }
}

/// An immutable job with its queue-assigned identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: JobId,
    request: JobRequest,
}

impl Job {
    pub fn new(id: JobId, request: JobRequest) -> Self {
        Self { id, request }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn output(&self) -> OutputKind {
        self.request.output
    }

    pub fn input(&self) -> &InputSource {
        &self.request.input
    }

    pub fn options(&self) -> &JobOptions {
        &self.request.options
    }

    pub fn parameters(&self) -> &JobParameters {
        &self.request.parameters
    }
}

/// Advisory slicer metadata. Fields fall back to [`UNKNOWN_METADATA`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintMetadata {
    pub filament_used: String,
    pub estimated_time: String,
}

impl PrintMetadata {
    pub fn unknown() -> Self {
        Self {
            filament_used: UNKNOWN_METADATA.to_string(),
            estimated_time: UNKNOWN_METADATA.to_string(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.filament_used != UNKNOWN_METADATA && self.estimated_time != UNKNOWN_METADATA
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub output_filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PrintMetadata>,
}

impl JobResult {
    pub fn artifact(output_filename: impl Into<String>) -> Self {
        Self {
            output_filename: output_filename.into(),
            metadata: None,
        }
    }

    pub fn sliced(output_filename: impl Into<String>, metadata: PrintMetadata) -> Self {
        Self {
            output_filename: output_filename.into(),
            metadata: Some(metadata),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_derived_from_the_id() {
        let id = JobId::from_uuid(Uuid::nil());
        let nil = "00000000-0000-0000-0000-000000000000";

        assert_eq!(id.output_filename("png"), format!("job-{nil}.png"));
        assert_eq!(id.gcode_filename(), format!("render-{nil}.gcode"));
        assert_eq!(id.temp_input_filename(), format!("temp-input-{nil}.scad"));
        assert_eq!(id.temp_config_filename(), format!("temp-config-{nil}.ini"));
    }

    #[test]
    fn distinct_ids_never_share_a_filename() {
        let ids: Vec<JobId> = (0..64).map(|_| JobId::new()).collect();
        let mut names = std::collections::HashSet::new();
        for id in &ids {
            for name in [
                id.output_filename("stl"),
                id.gcode_filename(),
                id.temp_input_filename(),
                id.temp_config_filename(),
            ] {
                assert!(names.insert(name), "filename collision for {id}");
            }
        }
    }

    #[test]
    fn output_kind_parses_mesh_formats() {
        assert_eq!(
            "3MF".parse::<OutputKind>().expect("3mf"),
            OutputKind::Mesh(MeshFormat::ThreeMf)
        );
        assert_eq!("gcode".parse::<OutputKind>().expect("gcode"), OutputKind::Gcode);
        assert!("step".parse::<OutputKind>().is_err());
    }

    #[test]
    fn gcode_jobs_render_an_intermediate_stl() {
        assert_eq!(OutputKind::Gcode.geometry_extension(), "stl");
        assert_eq!(OutputKind::Preview.geometry_extension(), "png");
    }
}
