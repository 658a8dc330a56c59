//! Docker CLI runtime.
//!
//! Every call shells out to the `docker` binary with a bounded timeout.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ContainerRef, ContainerRuntime, ContainerSpec, ObservedState, ProcessList, RuntimeError};

const DEFAULT_DOCKER_BIN: &str = "/usr/bin/docker";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const LOG_TAIL_LINES: &str = "1000";

/// [`ContainerRuntime`] backed by the docker command line.
#[derive(Debug, Clone)]
pub struct DockerCli {
    docker_path: PathBuf,
    timeout: Duration,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_BIN)
    }
}

impl DockerCli {
    pub fn new(docker_path: impl Into<PathBuf>) -> Self {
        Self {
            docker_path: docker_path.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command_line(&self, args: &[&str]) -> String {
        format!("{} {}", self.docker_path.display(), args.join(" "))
    }

    /// Run a docker command, returning raw output whatever the exit status.
    async fn run(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        debug!(cmd = %self.command_line(args), "Executing docker");

        let output = Command::new(&self.docker_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(source)) => Err(RuntimeError::Exec {
                command: self.command_line(args),
                source,
            }),
            Err(_) => Err(RuntimeError::Timeout {
                operation: self.command_line(args),
                timeout: self.timeout,
            }),
        }
    }

    /// Run a docker command, failing unless it exits 0.
    async fn run_success(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        let output = self.run(args).await?;
        if output.status.success() {
            return Ok(output);
        }
        Err(command_error(self.command_line(args), &output))
    }
}

/// Error for a docker command that exited non-zero.
///
/// A CLI that cannot reach the daemon is reported as [`RuntimeError::Unavailable`].
pub fn command_error(command: String, output: &Output) -> RuntimeError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.contains("Cannot connect to the Docker daemon") {
        return RuntimeError::Unavailable(stderr);
    }
    RuntimeError::CommandFailed {
        command,
        status: output.status.to_string(),
        stderr,
    }
}

/// Arguments for `docker run` creating the container for `spec`.
pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];

    if spec.options.privileged {
        args.push("--privileged".to_string());
    }
    if let Some(network) = &spec.options.network {
        args.push("--network".to_string());
        args.push(network.clone());
    }
    for bind in &spec.options.binds {
        args.push("-v".to_string());
        args.push(bind.clone());
    }
    for port in &spec.options.ports {
        args.push("-p".to_string());
        args.push(port.clone());
    }
    for (key, value) in &spec.options.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }

    args.push(spec.image_ref());
    args
}

/// Map `docker inspect -f "{{.State.Status}} {{.State.ExitCode}}"` output.
pub fn parse_status(output: &str) -> Result<ObservedState, RuntimeError> {
    let mut parts = output.split_whitespace();
    let status = parts
        .next()
        .ok_or_else(|| RuntimeError::UnexpectedOutput("empty inspect output".to_string()))?;
    let exit_code: i64 = parts.next().and_then(|c| c.parse().ok()).unwrap_or(0);

    match status {
        "running" | "paused" => Ok(ObservedState::Running),
        "created" | "restarting" => Ok(ObservedState::Starting),
        "exited" if exit_code == 0 => Ok(ObservedState::Stopped),
        "exited" | "dead" => Ok(ObservedState::Failed),
        "removing" => Ok(ObservedState::Stopped),
        other => Err(RuntimeError::UnexpectedOutput(format!(
            "unknown container status '{other}'"
        ))),
    }
}

/// Parse the table printed by `docker top`.
///
/// The last column (CMD) may itself contain spaces, so each row is split into
/// at most as many fields as there are titles.
pub fn parse_top(output: &str) -> ProcessList {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return ProcessList::default();
    };

    let titles: Vec<String> = header.split_whitespace().map(str::to_string).collect();
    let columns = titles.len();

    let processes = lines
        .map(|line| {
            let mut row = Vec::with_capacity(columns);
            let mut rest = line.trim_start();
            while row.len() + 1 < columns {
                match rest.split_once(char::is_whitespace) {
                    Some((field, tail)) => {
                        row.push(field.to_string());
                        rest = tail.trim_start();
                    }
                    None => break,
                }
            }
            row.push(rest.trim_end().to_string());
            row
        })
        .collect();

    ProcessList { titles, processes }
}

fn is_missing_container(output: &Output) -> bool {
    String::from_utf8_lossy(&output.stderr).contains("No such")
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn status(&self, container: &ContainerRef) -> Result<ObservedState, RuntimeError> {
        let output = self
            .run(&[
                "inspect",
                "-f",
                "{{.State.Status}} {{.State.ExitCode}}",
                container.as_str(),
            ])
            .await?;

        if !output.status.success() {
            if is_missing_container(&output) {
                return Ok(ObservedState::Stopped);
            }
            return Err(command_error(format!("docker inspect {container}"), &output));
        }

        parse_status(&String::from_utf8_lossy(&output.stdout))
    }

    async fn start(&self, spec: &ContainerSpec) -> Result<ContainerRef, RuntimeError> {
        // A stale container holding the name would make `run` fail.
        self.run(&["rm", "-f", &spec.name]).await?;

        let args = run_args(spec);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_success(&arg_refs).await?;

        let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if id.is_empty() {
            return Err(RuntimeError::UnexpectedOutput(
                "docker run printed no container id".to_string(),
            ));
        }

        info!(name = %spec.name, image = %spec.image_ref(), container = %id, "Container started");
        Ok(ContainerRef::new(id))
    }

    async fn stop(&self, container: &ContainerRef) -> Result<(), RuntimeError> {
        let output = self.run(&["stop", container.as_str()]).await?;
        if output.status.success() || is_missing_container(&output) {
            return Ok(());
        }
        Err(command_error(format!("docker stop {container}"), &output))
    }

    async fn restart(&self, container: &ContainerRef) -> Result<serde_json::Value, RuntimeError> {
        self.run_success(&["restart", container.as_str()]).await?;
        Ok(serde_json::json!({
            "container": container.as_str(),
            "restarted": true,
        }))
    }

    async fn top(&self, container: &ContainerRef) -> Result<ProcessList, RuntimeError> {
        let output = self.run_success(&["top", container.as_str()]).await?;
        Ok(parse_top(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn logs(&self, container: &ContainerRef) -> Result<String, RuntimeError> {
        let output = self
            .run_success(&["logs", "--tail", LOG_TAIL_LINES, container.as_str()])
            .await?;

        // Containers write to both streams; keep them together.
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}
