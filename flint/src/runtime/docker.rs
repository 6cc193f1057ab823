//! Docker implementation of [`ContainerRuntime`] driving the `docker` CLI.
//!
//! Each operation spawns one `docker` process and maps its exit status and
//! stderr onto [`RuntimeError`]. Image pulls are exposed as a line stream
//! over the child's stdout.

use super::{BindSource, Binding, ContainerRuntime, PullEvent, PullStream, TaskSpec, Volume};
use crate::utils::errors::RuntimeError;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::{Output, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

/// Label attached to every task container so leftovers are identifiable.
const TASK_LABEL: &str = "flint.task=true";

/// Container runtime backed by the `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: String,
}

impl DockerCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Acquire a runtime handle, failing fast when the daemon is unreachable.
    pub async fn connect(bin: impl Into<String>) -> Result<Self, RuntimeError> {
        let runtime = Self::new(bin);
        runtime.ping().await?;
        debug!(bin = %runtime.bin, "Connected to container runtime");
        Ok(runtime)
    }

    /// Release the handle. Consumes `self` so it cannot be used afterwards.
    pub async fn close(self) {
        debug!(bin = %self.bin, "Released container runtime");
    }

    async fn output(&self, args: &[String]) -> Result<Output, RuntimeError> {
        debug!(bin = %self.bin, ?args, "Running runtime command");
        Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_error(&self.bin, e))
    }

    /// Run a command and return its stdout, mapping failures to [`RuntimeError`].
    async fn run(&self, op: &str, args: Vec<String>) -> Result<String, RuntimeError> {
        let output = self.output(&args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(command_error(op, output.status.code(), stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn spawn_error(bin: &str, err: std::io::Error) -> RuntimeError {
    if err.kind() == std::io::ErrorKind::NotFound {
        RuntimeError::Unavailable(format!("{} executable not found", bin))
    } else {
        RuntimeError::Io(err)
    }
}

fn is_daemon_unreachable(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("cannot connect to the docker daemon")
        || lower.contains("is the docker daemon running")
        || lower.contains("error during connect")
}

fn command_error(op: &str, code: Option<i32>, stderr: String) -> RuntimeError {
    if is_daemon_unreachable(&stderr) {
        RuntimeError::Unavailable(stderr)
    } else {
        RuntimeError::Command {
            op: op.to_string(),
            code,
            stderr,
        }
    }
}

/// Quote one `--mount` field; the CLI splits the value as CSV.
fn csv_field(field: String) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field
    }
}

/// Render a binding as a `--mount` value.
fn mount_arg(binding: &Binding) -> String {
    let (kind, source) = match &binding.source {
        BindSource::Volume(name) => ("volume", name.clone()),
        BindSource::HostPath(path) => ("bind", path.display().to_string()),
    };
    let mut arg = format!(
        "type={},{},{}",
        kind,
        csv_field(format!("source={}", source)),
        csv_field(format!("target={}", binding.target))
    );
    if binding.is_read_only() {
        arg.push_str(",readonly");
    }
    arg
}

fn create_args(spec: &TaskSpec) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "--label".to_string(),
        TASK_LABEL.to_string(),
    ];
    for binding in &spec.bindings {
        args.push("--mount".to_string());
        args.push(mount_arg(binding));
    }
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

/// One line of `docker volume ls --format '{{json .}}'`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VolumeLsEntry {
    name: String,
    #[serde(default)]
    driver: String,
    #[serde(default)]
    mountpoint: String,
    #[serde(default)]
    labels: String,
}

/// Parse the comma-joined `key=value` label list the CLI prints.
fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

fn parse_volume_line(line: &str) -> Result<Volume, RuntimeError> {
    let entry: VolumeLsEntry = serde_json::from_str(line)
        .map_err(|e| RuntimeError::Parse(format!("volume listing: {}", e)))?;
    Ok(Volume {
        name: entry.name,
        driver: entry.driver,
        mountpoint: entry.mountpoint,
        labels: parse_labels(&entry.labels),
    })
}

enum PullState {
    Reading {
        lines: Lines<BufReader<ChildStdout>>,
        child: Child,
        stderr: JoinHandle<String>,
    },
    Done,
}

/// Collect a child's stderr in the background so a full pipe never stalls it.
fn drain_stderr(child: &mut Child) -> JoinHandle<String> {
    let pipe = child.stderr.take();
    tokio::spawn(async move {
        let mut stderr = String::new();
        if let Some(mut pipe) = pipe {
            if let Err(e) = pipe.read_to_string(&mut stderr).await {
                debug!(error = %e, "Reading pull stderr failed");
            }
        }
        stderr
    })
}

/// Reap a pull process whose stdout reached EOF.
async fn finish_pull(
    mut child: Child,
    stderr: JoinHandle<String>,
    reference: &str,
) -> Result<(), RuntimeError> {
    let status = child.wait().await?;
    let stderr = stderr.await.unwrap_or_default();
    if status.success() {
        Ok(())
    } else {
        Err(command_error(
            &format!("pull {}", reference),
            status.code(),
            stderr.trim().to_string(),
        ))
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn ping(&self) -> Result<(), RuntimeError> {
        let args = vec![
            "version".to_string(),
            "--format".to_string(),
            "{{.Server.Version}}".to_string(),
        ];
        match self.run("version", args).await {
            Ok(version) => {
                debug!(version = %version.trim(), "Container runtime reachable");
                Ok(())
            }
            Err(RuntimeError::Command { stderr, .. }) => Err(RuntimeError::Unavailable(stderr)),
            Err(e) => Err(e),
        }
    }

    async fn image_exists(&self, reference: &str) -> Result<bool, RuntimeError> {
        let args = vec![
            "image".to_string(),
            "inspect".to_string(),
            "--format".to_string(),
            "{{.Id}}".to_string(),
            reference.to_string(),
        ];
        let output = self.output(&args).await?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_daemon_unreachable(&stderr) {
            return Err(RuntimeError::Unavailable(stderr.trim().to_string()));
        }
        Ok(false)
    }

    async fn pull_image(&self, reference: &str) -> Result<PullStream, RuntimeError> {
        let mut child = Command::new(&self.bin)
            .args(["pull", reference])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(&self.bin, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::Parse("pull process has no stdout".to_string()))?;
        let lines = BufReader::new(stdout).lines();
        let stderr = drain_stderr(&mut child);
        let reference = reference.to_string();

        let events = stream::unfold(PullState::Reading { lines, child, stderr }, move |state| {
            let reference = reference.clone();
            async move {
                match state {
                    PullState::Done => None,
                    PullState::Reading { mut lines, mut child, stderr } => match lines.next_line().await {
                        Ok(Some(status)) => Some((
                            Ok(PullEvent { status }),
                            PullState::Reading { lines, child, stderr },
                        )),
                        Ok(None) => match finish_pull(child, stderr, &reference).await {
                            Ok(()) => None,
                            Err(e) => Some((Err(e), PullState::Done)),
                        },
                        Err(e) => {
                            stderr.abort();
                            let _ = child.kill().await;
                            Some((Err(RuntimeError::Io(e)), PullState::Done))
                        }
                    },
                }
            }
        });

        Ok(events.boxed())
    }

    async fn list_volumes(&self, label: Option<&str>) -> Result<Vec<Volume>, RuntimeError> {
        let mut args = vec![
            "volume".to_string(),
            "ls".to_string(),
            "--format".to_string(),
            "{{json .}}".to_string(),
        ];
        if let Some(label) = label {
            args.push("--filter".to_string());
            args.push(format!("label={}", label));
        }

        let stdout = self.run("volume ls", args).await?;
        stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(parse_volume_line)
            .collect()
    }

    async fn create_volume(&self, name: &str) -> Result<(), RuntimeError> {
        let args = vec!["volume".to_string(), "create".to_string(), name.to_string()];
        self.run("volume create", args).await?;
        Ok(())
    }

    async fn create_container(&self, spec: &TaskSpec) -> Result<String, RuntimeError> {
        let stdout = self.run("create", create_args(spec)).await?;
        let id = stdout.trim();
        if id.is_empty() {
            return Err(RuntimeError::Parse("create returned no container id".to_string()));
        }
        Ok(id.to_string())
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.run("start", vec!["start".to_string(), id.to_string()]).await?;
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, RuntimeError> {
        let stdout = self.run("wait", vec!["wait".to_string(), id.to_string()]).await?;
        let raw = stdout.trim();
        raw.parse::<i64>()
            .map_err(|_| RuntimeError::Parse(format!("wait returned {:?}", raw)))
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        let args = vec!["rm".to_string(), "--force".to_string(), id.to_string()];
        self.run("rm", args).await?;
        Ok(())
    }
}
