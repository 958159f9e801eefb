//! Package-manager orchestration.
//!
//! The only component permitted to perform external-process I/O in the
//! core. The executable is spawned once per call; stdout and stderr are
//! forwarded to the host's own streams in real time while being captured
//! into one combined buffer.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;

/// Default package-manager executable.
pub const DEFAULT_PROGRAM: &str = "npm";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PmOptions {
    pub registry: Option<String>,
    pub proxy: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PmOutput {
    pub code: i32,
    /// Interleaved stdout + stderr as captured.
    pub output: String,
}

impl PmOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PmError {
    /// The executable could not be found. A distinct fatal condition, not
    /// a normal non-zero exit.
    #[error("Package manager '{program}' is not installed")]
    NotInstalled { program: String },

    #[error("Failed to spawn package manager: {0}")]
    Spawn(std::io::Error),

    #[error("Failed to capture package manager output: {0}")]
    Io(std::io::Error),
}

/// Seam over the external package-manager executable.
#[async_trait]
pub trait PackageRunner: Send + Sync {
    async fn run(
        &self,
        command: &str,
        modules: &[String],
        dir: &Path,
        options: &PmOptions,
        env: &HashMap<String, String>,
    ) -> Result<PmOutput, PmError>;
}

/// Spawns the package manager as a subprocess.
pub struct NpmRunner {
    program: String,
}

impl NpmRunner {
    pub fn new() -> Self {
        Self {
            program: DEFAULT_PROGRAM.into(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn build_args(command: &str, modules: &[String], options: &PmOptions) -> Vec<String> {
        let mut args = vec![command.to_string()];
        args.extend(modules.iter().cloned());
        args.push("--save".into());
        if let Some(registry) = &options.registry {
            args.push(format!("--registry={}", registry));
        }
        if let Some(proxy) = &options.proxy {
            args.push(format!("--proxy={}", proxy));
        }
        args
    }
}

impl Default for NpmRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PackageRunner for NpmRunner {
    async fn run(
        &self,
        command: &str,
        modules: &[String],
        dir: &Path,
        options: &PmOptions,
        env: &HashMap<String, String>,
    ) -> Result<PmOutput, PmError> {
        let args = Self::build_args(command, modules, options);
        tracing::debug!(program = %self.program, ?args, "spawning package manager");

        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(dir)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PmError::NotInstalled {
                        program: self.program.clone(),
                    }
                } else {
                    PmError::Spawn(e)
                }
            })?;

        let captured = Arc::new(Mutex::new(String::new()));
        let out_task = child.stdout.take().map(|stdout| {
            tokio::spawn(forward(stdout, tokio::io::stdout(), captured.clone()))
        });
        let err_task = child.stderr.take().map(|stderr| {
            tokio::spawn(forward(stderr, tokio::io::stderr(), captured.clone()))
        });

        let status = child.wait().await.map_err(PmError::Io)?;
        for task in [out_task, err_task].into_iter().flatten() {
            task.await
                .map_err(|e| PmError::Io(std::io::Error::other(e)))?
                .map_err(PmError::Io)?;
        }

        let output = captured
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default();
        Ok(PmOutput {
            code: status.code().unwrap_or(-1),
            output,
        })
    }
}

async fn forward<R, W>(
    mut reader: R,
    mut writer: W,
    captured: Arc<Mutex<String>>,
) -> Result<(), std::io::Error>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        if let Ok(mut captured) = captured.lock() {
            captured.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
    }
    Ok(())
}
