//! Child process execution with a deadline.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::error::{ErrorCode, Result, SkyreelError};

/// Run `program` to completion, killing it if `limit` elapses first.
///
/// A non-zero exit is returned as `Ok`; callers decide what it means.
pub async fn run<I, S>(program: &Path, args: I, limit: Duration) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            SkyreelError::with_internal(
                ErrorCode::ProcessControlError,
                "Failed to launch a helper program",
                format!("{} spawn failed: {}", program.display(), e),
            )
        })?;

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => {
            tracing::warn!(
                program = %program.display(),
                timeout_secs = limit.as_secs(),
                "Helper program timed out, process killed"
            );
            Err(SkyreelError::timeout(program.display().to_string(), limit))
        }
    }
}

/// Last non-empty line of a process's stderr.
pub fn stderr_tail(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}
