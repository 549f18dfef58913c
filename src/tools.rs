//! tools.rs
//!
//! Child-process plumbing for the external collaborators (yt-dlp, ffmpeg,
//! basic-pitch, whackercmd, file). Everything here is fail-fast: a tool
//! exiting nonzero aborts the pipeline with a diagnostic naming the tool.

use std::env;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};

#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("`{0}` is not installed or not on PATH")]
    NotFound(String),
    #[error("`{tool}` exited with {status}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
    },
}

fn program_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

/// Run a tool, letting its output stream to the console so long-running
/// steps (downloads, transcription, encodes) give live feedback.
pub fn run(cmd: &mut Command) -> Result<()> {
    let tool = program_name(cmd);
    let status = cmd.status().map_err(|err| match err.kind() {
        ErrorKind::NotFound => anyhow::Error::new(ToolError::NotFound(tool.clone())),
        _ => anyhow::Error::new(err).context(format!("spawning `{tool}`")),
    })?;
    if !status.success() {
        return Err(ToolError::Failed { tool, status }.into());
    }
    Ok(())
}

/// Run a tool and capture its stdout as trimmed UTF-8.
pub fn output(cmd: &mut Command) -> Result<String> {
    let tool = program_name(cmd);
    let out = cmd.output().map_err(|err| match err.kind() {
        ErrorKind::NotFound => anyhow::Error::new(ToolError::NotFound(tool.clone())),
        _ => anyhow::Error::new(err).context(format!("spawning `{tool}`")),
    })?;
    if !out.status.success() {
        return Err(ToolError::Failed {
            tool,
            status: out.status,
        }
        .into());
    }
    let text = String::from_utf8(out.stdout).with_context(|| format!("`{tool}` output"))?;
    Ok(text.trim().to_string())
}

/// Look an executable up on PATH, like `which`.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}
