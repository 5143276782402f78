//! External toolchain invocation.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ToolchainConfig;
use crate::error::{ConfigKey, FlashError, Result};
use crate::workspace::BuildWorkspace;

/// Lines of toolchain output kept for failure reports.
const LOG_TAIL_LINES: usize = 20;

/// Outcome of one toolchain run that reached process exit.
#[derive(Debug)]
pub struct Invocation {
    pub status: ExitStatus,
    pub log_tail: String,
    pub duration: Duration,
}

impl Invocation {
    /// Treat a non-zero exit as a failed build.
    pub fn into_result(self) -> Result<Self> {
        if self.status.success() {
            Ok(self)
        } else {
            Err(FlashError::BuildFailed {
                exit_code: self.status.code(),
                log_tail: self.log_tail,
            })
        }
    }
}

/// Launches the configured compiler as a structured argument list.
#[derive(Debug, Clone)]
pub struct Toolchain {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Toolchain {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &ToolchainConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), config.timeout())
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Substitute placeholders inside each argument. No argument is ever split or joined.
    pub fn render_args(&self, target: &str, workspace: &BuildWorkspace) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{target}", target)
                    .replace("{source_root}", ".")
                    .replace("{build_dir}", workspace.build_dir())
            })
            .collect()
    }

    /// Run the toolchain for `target` inside `workspace` and wait for it to exit.
    ///
    /// The toolchain runs in its own process group. The whole group is
    /// killed if it outlives the timeout or if the returned future is
    /// dropped, and any processes it leaves behind are killed on exit.
    pub async fn invoke(&self, workspace: &BuildWorkspace, target: Option<&str>) -> Result<Invocation> {
        let target = match target.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(FlashError::ConfigMissing(ConfigKey::Target)),
        };

        let args = self.render_args(target, workspace);
        info!("Invoking {} {:?} in {}", self.program, args, workspace.root().display());

        let start = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(&args)
            .current_dir(workspace.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|source| FlashError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let mut group = ProcessGroup::of(&child);

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(FlashError::io(workspace.root(), e)),
            Err(_elapsed) => {
                group.kill();
                warn!("Toolchain timed out after {:?}; killed", self.timeout);
                return Err(FlashError::Timeout {
                    timeout: self.timeout,
                });
            }
        };

        let duration = start.elapsed();
        let log_tail = tail(&output.stdout, &output.stderr);
        for line in log_tail.lines() {
            debug!(target: "flash_core::toolchain::output", "{}", line);
        }
        info!("Toolchain exited with {} in {:?}", output.status, duration);

        Ok(Invocation {
            status: output.status,
            log_tail,
            duration,
        })
    }
}

/// Kills every process in the toolchain's group when dropped.
struct ProcessGroup {
    #[cfg(unix)]
    pgid: Option<libc::pid_t>,
}

impl ProcessGroup {
    fn of(child: &tokio::process::Child) -> Self {
        #[cfg(unix)]
        {
            Self {
                pgid: child.id().and_then(|pid| libc::pid_t::try_from(pid).ok()),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = child;
            Self {}
        }
    }

    fn kill(&mut self) {
        #[cfg(unix)]
        {
            if let Some(pgid) = self.pgid.take() {
                // ESRCH here just means the group already exited.
                if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
                    debug!("Killed toolchain process group {}", pgid);
                }
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Last lines of combined output, stdout first.
fn tail(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = stdout.lines().chain(stderr.lines()).collect();
    let skip = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines[skip..].join("\n")
}
