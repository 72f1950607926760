//! Subprocess runner shared by the ADB and HDC backends.

use std::process::Output;
use std::time::Duration;

use tokio::process::Command;

use super::backend::DeviceError;

/// Run `program prefix.. args..` and wait for it, bounded by `timeout`.
///
/// A non-zero exit status is an error carrying stderr.
pub(crate) async fn run(
    program: &str,
    prefix: &[String],
    args: &[&str],
    timeout: Duration,
) -> Result<Output, DeviceError> {
    tracing::debug!("{} {} {}", program, prefix.join(" "), args.join(" "));

    let child = Command::new(program)
        .args(prefix)
        .args(args)
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| DeviceError::Timeout(timeout))??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DeviceError::CommandFailed(format!(
            "{} {}: {}",
            program,
            args.first().copied().unwrap_or_default(),
            stderr.trim()
        )));
    }

    Ok(output)
}

/// Stdout of a successful command as lossy UTF-8.
pub(crate) fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}
