//! Child process output capture for the build step.

use tokio::io::AsyncReadExt;
use tokio::process::Child;

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

fn exit_code_from_parts(code: Option<i32>, _signal: Option<i32>) -> Option<i32> {
    if let Some(code) = code {
        return Some(code);
    }
    #[cfg(unix)]
    {
        if let Some(signal) = _signal {
            return Some(128 + signal);
        }
    }
    None
}

/// Exit code of a finished process; signal-terminated processes map to 128+signal on Unix.
pub(crate) fn exit_status_code(status: &std::process::ExitStatus) -> Option<i32> {
    let code = status.code();
    #[cfg(unix)]
    let signal = status.signal();
    #[cfg(not(unix))]
    let signal = None;
    exit_code_from_parts(code, signal)
}

/// Everything a finished child wrote, decoded lossily
#[derive(Debug, Clone, Default)]
pub(crate) struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CapturedOutput {
    /// stdout followed by stderr, each under a header when non-empty
    pub fn combined(&self) -> String {
        let mut output = String::new();
        if !self.stdout.is_empty() {
            output.push_str("=== stdout ===\n");
            output.push_str(&self.stdout);
            if !self.stdout.ends_with('\n') {
                output.push('\n');
            }
        }
        if !self.stderr.is_empty() {
            output.push_str("=== stderr ===\n");
            output.push_str(&self.stderr);
            if !self.stderr.ends_with('\n') {
                output.push('\n');
            }
        }
        output
    }
}

/// Read stdout and stderr concurrently so neither pipe can fill and block the
/// child, then wait for it to exit.
pub(crate) async fn capture_output(child: &mut Child) -> std::io::Result<CapturedOutput> {
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let stdout_fut = async move {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_pipe {
            out.read_to_end(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };

    let stderr_fut = async move {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_pipe {
            err.read_to_end(&mut buf).await?;
        }
        Ok::<_, std::io::Error>(buf)
    };

    let (stdout, stderr) = match tokio::try_join!(stdout_fut, stderr_fut) {
        Ok(result) => result,
        Err(e) => {
            let _ = child.kill().await;
            return Err(e);
        }
    };

    let status = child.wait().await?;

    Ok(CapturedOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: exit_status_code(&status),
        success: status.success(),
    })
}
