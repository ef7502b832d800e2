use std::{fmt, io, path::PathBuf};

use thiserror::Error;

/// External engines a job may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    GeometryEngine,
    Slicer,
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::GeometryEngine => "geometry_engine",
            Tool::Slicer => "slicer",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tool::GeometryEngine => f.write_str("geometry engine"),
            Tool::Slicer => f.write_str("slicer"),
        }
    }
}

const SIGKILL: i32 = 9;
const SIGTERM: i32 = 15;

/// Why a tool process ended on a signal rather than an exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    /// `SIGKILL`, which in practice is the kernel's out-of-memory killer.
    OutOfMemory,
    /// `SIGTERM` from outside the pipeline.
    Terminated,
    Signal(i32),
}

impl KillReason {
    pub fn from_signal(signal: i32) -> Self {
        match signal {
            SIGKILL => KillReason::OutOfMemory,
            SIGTERM => KillReason::Terminated,
            other => KillReason::Signal(other),
        }
    }
}

impl fmt::Display for KillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KillReason::OutOfMemory => f.write_str("Memory Limit Exceeded (OOM)"),
            KillReason::Terminated => f.write_str("Process Terminated"),
            KillReason::Signal(signal) => write!(f, "Killed by signal {signal}"),
        }
    }
}

/// Fatal job failures. None of these are retried.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("input not found: {reference}")]
    InputNotFound { reference: String },
    #[error("failed to prepare job file {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn {tool}: {source}")]
    SpawnFailure {
        tool: Tool,
        #[source]
        source: io::Error,
    },
    #[error("{tool} failed: Exit Code {code}")]
    ToolExitFailure {
        tool: Tool,
        code: i32,
        stderr: String,
    },
    #[error("{tool} failed: {reason}")]
    ToolKilled {
        tool: Tool,
        reason: KillReason,
        stderr: String,
    },
    #[error("{tool} exited with 0 but {} was not produced", path.display())]
    OutputMissing { tool: Tool, path: PathBuf },
}

impl JobError {
    pub fn workspace(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Workspace {
            path: path.into(),
            source,
        }
    }

    /// Stable label used for metrics and history records.
    pub fn label(&self) -> &'static str {
        match self {
            JobError::InputNotFound { .. } => "input_not_found",
            JobError::Workspace { .. } => "workspace",
            JobError::SpawnFailure { .. } => "spawn_failure",
            JobError::ToolExitFailure { .. } => "tool_exit_failure",
            JobError::ToolKilled {
                reason: KillReason::OutOfMemory,
                ..
            } => "tool_killed_oom",
            JobError::ToolKilled { .. } => "tool_killed",
            JobError::OutputMissing { .. } => "output_missing",
        }
    }

    /// Human-readable classification for the submitting caller.
    pub fn classification(&self) -> String {
        match self {
            JobError::InputNotFound { .. } => "Input not found".to_string(),
            JobError::Workspace { .. } => "Job files could not be prepared".to_string(),
            JobError::SpawnFailure { tool, .. } => format!("Failed to spawn {tool}"),
            JobError::ToolExitFailure { code, .. } => format!("Exit Code {code}"),
            JobError::ToolKilled { reason, .. } => reason.to_string(),
            JobError::OutputMissing { tool, .. } => format!("{tool} produced no output"),
        }
    }

    /// Captured diagnostics from the failing tool, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            JobError::ToolExitFailure { stderr, .. } | JobError::ToolKilled { stderr, .. } => {
                Some(stderr.as_str())
            }
            _ => None,
        }
    }

    pub fn tool(&self) -> Option<Tool> {
        match self {
            JobError::SpawnFailure { tool, .. }
            | JobError::ToolExitFailure { tool, .. }
            | JobError::ToolKilled { tool, .. }
            | JobError::OutputMissing { tool, .. } => Some(*tool),
            JobError::InputNotFound { .. } | JobError::Workspace { .. } => None,
        }
    }
}
