//! Spawning the external engines and classifying how they ended.

use std::{io, process::Stdio, time::Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::jobs::JobId;

use super::{
    error::{JobError, KillReason},
    invocation::Invocation,
};

/// Captured outcome of one finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, absent when the process died on a signal.
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a prepared [`Invocation`] to completion.
///
/// `Err` means the process never started; any process that ran yields `Ok`.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> io::Result<ProcessExit>;
}

/// Runs invocations as real child processes with a null stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcessRunner;

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, invocation: &Invocation) -> io::Result<ProcessExit> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .output()
            .await?;

        Ok(ProcessExit {
            code: output.status.code(),
            signal: exit_signal(&output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Run one tool step of `job_id` and require its artifact to exist afterwards.
pub(crate) async fn run_tool(
    runner: &dyn ProcessRunner,
    invocation: &Invocation,
    job_id: JobId,
) -> Result<(), JobError> {
    let started_at = Instant::now();
    let tool = invocation.tool;
    debug!(
        target = "application::pipeline::process",
        op = "process::run_tool",
        job_id = %job_id,
        tool = tool.as_str(),
        command = %invocation.command_line(),
        "Spawning tool"
    );

    let exit = runner.run(invocation).await.map_err(|err| {
        warn!(
            target = "application::pipeline::process",
            op = "process::run_tool",
            result = "error",
            job_id = %job_id,
            tool = tool.as_str(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            error_code = "spawn_failure",
            error = %err,
            "Failed to spawn tool"
        );
        JobError::SpawnFailure { tool, source: err }
    })?;

    if !exit.success() {
        let error = classify_failure(invocation, exit);
        warn!(
            target = "application::pipeline::process",
            op = "process::run_tool",
            result = "error",
            job_id = %job_id,
            tool = tool.as_str(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            error_code = error.label(),
            classification = %error.classification(),
            stderr = error.stderr().unwrap_or_default(),
            "Tool invocation failed"
        );
        return Err(error);
    }

    let produced = tokio::fs::try_exists(&invocation.expected_output)
        .await
        .unwrap_or(false);
    if !produced {
        warn!(
            target = "application::pipeline::process",
            op = "process::run_tool",
            result = "error",
            job_id = %job_id,
            tool = tool.as_str(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            error_code = "output_missing",
            path = %invocation.expected_output.display(),
            "Tool exited cleanly without producing its output"
        );
        return Err(JobError::OutputMissing {
            tool,
            path: invocation.expected_output.clone(),
        });
    }

    info!(
        target = "application::pipeline::process",
        op = "process::run_tool",
        result = "ok",
        job_id = %job_id,
        tool = tool.as_str(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "Tool finished"
    );
    Ok(())
}

fn classify_failure(invocation: &Invocation, exit: ProcessExit) -> JobError {
    let tool = invocation.tool;
    match (exit.code, exit.signal) {
        (Some(code), _) => JobError::ToolExitFailure {
            tool,
            code,
            stderr: exit.stderr,
        },
        (None, Some(signal)) => JobError::ToolKilled {
            tool,
            reason: KillReason::from_signal(signal),
            stderr: exit.stderr,
        },
        // Neither code nor signal: report it the way an unknown exit is reported.
        (None, None) => JobError::ToolExitFailure {
            tool,
            code: -1,
            stderr: exit.stderr,
        },
    }
}


#[cfg(all(test, unix))]
mod system_tests {
    use super::*;
    use crate::application::pipeline::error::Tool;
    use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf};
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("fake-tool");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        let mut perms = fs::metadata(&path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("set perms");
        path
    }

    fn invocation(program: PathBuf, output: PathBuf) -> Invocation {
        Invocation {
            tool: Tool::Slicer,
            program,
            args: vec![output.clone().into_os_string()],
            expected_output: output,
        }
    }

    #[tokio::test]
    async fn surfaces_exit_codes_and_stderr() {
        let dir = TempDir::new().expect("temp dir");
        let program = script(&dir, "echo \"boom\" >&2\nexit 3");
        let err = run_tool(
            &SystemProcessRunner,
            &invocation(program, dir.path().join("out.gcode")),
            JobId::new(),
        )
        .await
        .expect_err("exit failure");

        match err {
            JobError::ToolExitFailure { tool, code, stderr } => {
                assert_eq!(tool, Tool::Slicer);
                assert_eq!(code, 3);
                assert!(stderr.contains("boom"), "stderr did not propagate: {stderr}");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reports_signals() {
        let dir = TempDir::new().expect("temp dir");
        let program = script(&dir, "kill -TERM $$");
        let err = run_tool(
            &SystemProcessRunner,
            &invocation(program, dir.path().join("out.gcode")),
            JobId::new(),
        )
        .await
        .expect_err("terminated");
        assert!(matches!(
            err,
            JobError::ToolKilled {
                reason: KillReason::Terminated,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn missing_binaries_are_spawn_failures() {
        let dir = TempDir::new().expect("temp dir");
        let err = run_tool(
            &SystemProcessRunner,
            &invocation(dir.path().join("absent"), dir.path().join("out.gcode")),
            JobId::new(),
        )
        .await
        .expect_err("spawn failure");
        assert!(matches!(err, JobError::SpawnFailure { .. }));
    }

    #[tokio::test]
    async fn writes_output_through_arguments() {
        let dir = TempDir::new().expect("temp dir");
        let program = script(&dir, "echo ok > \"$1\"");
        let output = dir.path().join("out.gcode");
        run_tool(
            &SystemProcessRunner,
            &invocation(program, output.clone()),
            JobId::new(),
        )
        .await
        .expect("tool succeeds");
        assert!(output.exists());
    }
}
