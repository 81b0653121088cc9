use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::Command;
use tracing::{debug, trace, warn};

use crate::{JudgeConfig, JudgeError, ProcessOutput};

/// Utility for spawning judge processes
pub struct ProcessSpawner;

impl ProcessSpawner {
    /// Spawn a process and capture its output, killing it when the
    /// configured timeout elapses
    pub async fn spawn(
        binary: &Path,
        args: &[&str],
        config: &JudgeConfig,
    ) -> Result<ProcessOutput, JudgeError> {
        let start = Instant::now();

        debug!(
            binary = %binary.display(),
            arg_count = args.len(),
            working_dir = %config.working_dir.display(),
            "Spawning judge process"
        );

        let mut cmd = Command::new(binary);
        cmd.args(args)
            .current_dir(&config.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null()) // Non-interactive
            .kill_on_drop(true);

        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;

        let stdout_handle = child
            .stdout
            .take()
            .ok_or_else(|| JudgeError::ConfigError("stdout was not captured".to_string()))?;
        let stderr_handle = child
            .stderr
            .take()
            .ok_or_else(|| JudgeError::ConfigError("stderr was not captured".to_string()))?;

        let run = async {
            let (stdout, stderr) = capture(
                BufReader::new(stdout_handle).lines(),
                BufReader::new(stderr_handle).lines(),
            )
            .await?;
            let status = child.wait().await?;
            Ok::<_, JudgeError>((stdout, stderr, status))
        };

        let (stdout, stderr, status) = match config.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        binary = %binary.display(),
                        timeout_ms = limit.as_millis(),
                        "Judge process timed out, killing it"
                    );
                    return Err(JudgeError::Timeout(limit));
                }
            },
            None => run.await?,
        };

        let duration = start.elapsed();
        let exit_code = status.code().unwrap_or(-1);

        debug!(
            exit_code,
            duration_ms = duration.as_millis(),
            stdout_len = stdout.len(),
            "Judge process completed"
        );

        Ok(ProcessOutput::new(stdout, stderr, exit_code, duration))
    }
}

/// Read both streams concurrently until stdout closes
async fn capture<O, E>(
    mut stdout_reader: Lines<BufReader<O>>,
    mut stderr_reader: Lines<BufReader<E>>,
) -> Result<(String, String), JudgeError>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout = String::new();
    let mut stderr = String::new();
    let mut stderr_open = true;

    loop {
        tokio::select! {
            biased;

            result = stdout_reader.next_line() => {
                match result {
                    Ok(Some(line)) => {
                        trace!(line = %line, "stdout");
                        push_line(&mut stdout, &line);
                    }
                    Ok(None) => {
                        // stdout closed, drain what is left on stderr
                        while let Ok(Some(line)) = stderr_reader.next_line().await {
                            trace!(line = %line, "stderr");
                            push_line(&mut stderr, &line);
                        }
                        break;
                    }
                    Err(e) => {
                        return Err(JudgeError::ExecutionFailed {
                            exit_code: -1,
                            stderr: format!("Failed to read stdout: {}", e),
                        });
                    }
                }
            }
            result = stderr_reader.next_line(), if stderr_open => {
                match result {
                    Ok(Some(line)) => {
                        trace!(line = %line, "stderr");
                        push_line(&mut stderr, &line);
                    }
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        return Err(JudgeError::ExecutionFailed {
                            exit_code: -1,
                            stderr: format!("Failed to read stderr: {}", e),
                        });
                    }
                }
            }
        }
    }

    Ok((stdout, stderr))
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(line);
}
