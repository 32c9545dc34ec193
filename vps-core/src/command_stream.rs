// Standard library
use std::ffi::OsStr;
use std::thread;
use std::time::{Duration, Instant};

// External crates
use crate::error::{CoreError, Result};
use duct::cmd;
use tracing::debug;
use which::which;

/// Interval between exit checks while waiting on a bounded command
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lines of output kept in error messages
const ERROR_CONTEXT_LINES: usize = 50;

/// Render a program and its argument vector for logs and error messages.
/// The rendering is for humans only; commands are never executed through a shell.
pub fn format_command<A: AsRef<OsStr>>(program: &str, args: &[A]) -> String {
    let mut rendered = program.to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.as_ref().to_string_lossy());
    }
    rendered
}

fn tail(output: &str) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let start = lines.len().saturating_sub(ERROR_CONTEXT_LINES);
    lines[start..].join("\n")
}

/// Run a program with an explicit argument list and capture its combined output.
///
/// stderr is merged into stdout. A non-zero exit status becomes `CoreError::Command`
/// carrying the tail of the output. When `timeout` is set and exceeded the child is
/// killed and `CoreError::Timeout` is returned.
pub fn run_command<A: AsRef<OsStr>>(
    program: &str,
    args: &[A],
    timeout: Option<Duration>,
) -> Result<String> {
    let full_command = format_command(program, args);
    debug!(command = %full_command, "running command");

    let handle = cmd(program, args)
        .stderr_to_stdout()
        .stdout_capture()
        .unchecked()
        .start()
        .map_err(|e| CoreError::Command(format!("Failed to start '{}': {}", full_command, e)))?;

    let output = match timeout {
        None => handle.wait().map_err(|e| {
            CoreError::Command(format!("Error waiting for '{}': {}", full_command, e))
        })?,
        Some(limit) => {
            let start = Instant::now();
            loop {
                match handle.try_wait() {
                    Ok(Some(output)) => break output,
                    Ok(None) if start.elapsed() >= limit => {
                        let _ = handle.kill();
                        return Err(CoreError::Timeout(format!(
                            "'{}' did not finish within {}s",
                            full_command,
                            limit.as_secs_f64()
                        )));
                    }
                    Ok(None) => thread::sleep(POLL_INTERVAL),
                    Err(e) => {
                        return Err(CoreError::Command(format!(
                            "Error waiting for '{}': {}",
                            full_command, e
                        )));
                    }
                }
            }
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        return Err(CoreError::Command(format!(
            "'{}' exited with code {:?}\n{}",
            full_command,
            output.status.code(),
            tail(&stdout)
        )));
    }

    Ok(stdout)
}

/// Checks if a command-line tool is available in the system's PATH.
pub fn is_tool_installed(tool_name: &str) -> bool {
    which(tool_name).is_ok()
}
