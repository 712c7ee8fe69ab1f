//! Thin adapter over the emulation service: a Speculos container managed
//! through the `docker` CLI. Image management, device emulation, and the
//! emulator's own control protocol all live on the other side of it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::Instant;

/// Emulator image sessions run in: Speculos plus the Zondax build toolchain.
pub const EMU_IMAGE: &str = "zondax/builder-zemu:latest";

/// Speculos entrypoint inside the image.
const SPECULOS: &str = "/home/zondax/speculos/speculos.py";

/// Mount point for the application binary's directory inside the container.
const APP_MOUNT: &str = "/project/app";

/// Container-name prefix shared by every launcher-started session. The
/// stop-all sweep filters on it.
const CONTAINER_PREFIX: &str = "zemu-";

/// Checks that the emulator image is present locally and pulls it if not.
/// Idempotent. A cold pull can take minutes; progress goes to the inherited
/// stdout.
pub async fn ensure_image_available() -> Result<()> {
    let inspect = Command::new("docker")
        .args(["image", "inspect", EMU_IMAGE])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .context("run `docker image inspect`")?;
    if inspect.success() {
        tracing::debug!(image = EMU_IMAGE, "emulator image already present");
        return Ok(());
    }

    tracing::info!(image = EMU_IMAGE, "pulling emulator image");
    let pull = Command::new("docker")
        .args(["pull", EMU_IMAGE])
        .status()
        .await
        .context("run `docker pull`")?;
    if !pull.success() {
        bail!("docker pull {EMU_IMAGE} exited with {pull}");
    }
    Ok(())
}

/// Session start configuration. `Default` carries the service-side defaults;
/// callers override the fields they care about.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Device model handed to Speculos unvalidated.
    pub model: String,
    /// Follow the container's log stream into the launcher's own output.
    pub logging: bool,
    /// Extra Speculos command-line arguments, appended verbatim.
    pub custom: String,
    /// How long to wait for the API port to accept connections.
    pub start_timeout: Duration,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            model: "nanos".to_string(),
            logging: false,
            custom: String::new(),
            start_timeout: Duration::from_secs(30),
        }
    }
}

/// Handle for one emulator container. Construction performs no I/O; the
/// container exists only once `start` has run.
#[derive(Debug)]
pub struct Session {
    app_path: PathBuf,
    api_port: String,
    container: String,
}

impl Session {
    /// `api_port` stays a raw token: the launcher does not validate it, the
    /// container runtime rejects a bad publish spec.
    pub fn new(app_path: impl Into<PathBuf>, api_port: &str) -> Self {
        Self {
            app_path: app_path.into(),
            api_port: api_port.to_string(),
            container: format!("{CONTAINER_PREFIX}{}", std::process::id()),
        }
    }

    pub fn container_name(&self) -> &str {
        &self.container
    }

    /// Starts the emulator container and returns once its API port accepts
    /// connections. The readiness poll is skipped when the port token never
    /// parsed; in that case `docker run` has already rejected the publish
    /// spec or will bind nothing useful.
    pub async fn start(&self, opts: StartOptions) -> Result<()> {
        let args = self.run_args(&opts)?;
        let run = Command::new("docker")
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("run `docker run`")?;
        if !run.status.success() {
            bail!(
                "docker run exited with {}: {}",
                run.status,
                String::from_utf8_lossy(&run.stderr).trim()
            );
        }

        if opts.logging {
            follow_logs(&self.container);
        }

        if let Some(port) = crate::parse_api_port(&self.api_port) {
            wait_for_api(port, opts.start_timeout).await?;
        }
        tracing::info!(
            container = %self.container,
            port = %self.api_port,
            "emulator session started"
        );
        Ok(())
    }

    /// Argument vector for `docker run`, program name excluded.
    fn run_args(&self, opts: &StartOptions) -> Result<Vec<String>> {
        let app_path = std::path::absolute(&self.app_path)
            .with_context(|| format!("resolve {}", self.app_path.display()))?;
        let app_file = app_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .context("application binary path has no file name")?;
        let app_dir = app_path
            .parent()
            .map(Path::to_path_buf)
            .context("application binary path has no parent directory")?;

        // Speculos is invoked through a shell so quoted custom arguments
        // (e.g. the seed flag) split the way the emulator expects.
        let mut speculos = format!(
            "{SPECULOS} --display headless --api-port {port} --model {model}",
            port = self.api_port,
            model = opts.model,
        );
        if !opts.custom.is_empty() {
            speculos.push(' ');
            speculos.push_str(&opts.custom);
        }
        speculos.push(' ');
        speculos.push_str(APP_MOUNT);
        speculos.push('/');
        speculos.push_str(&app_file);

        Ok(vec![
            "run".into(),
            "--detach".into(),
            "--rm".into(),
            "--name".into(),
            self.container.clone(),
            "--publish".into(),
            format!("{port}:{port}", port = self.api_port),
            "--volume".into(),
            format!("{}:{APP_MOUNT}:ro", app_dir.display()),
            EMU_IMAGE.into(),
            "bash".into(),
            "-c".into(),
            speculos,
        ])
    }
}

/// Stops every launcher-started emulator container on the host, not just the
/// one this invocation created. Best effort; callers log a failure and move
/// on.
pub async fn stop_all_sessions() -> Result<()> {
    let list = Command::new("docker")
        .args(list_args())
        .output()
        .await
        .context("run `docker ps`")?;
    if !list.status.success() {
        bail!(
            "docker ps exited with {}: {}",
            list.status,
            String::from_utf8_lossy(&list.stderr).trim()
        );
    }

    let stdout = String::from_utf8_lossy(&list.stdout);
    let ids: Vec<&str> = stdout.lines().filter(|id| !id.is_empty()).collect();
    if ids.is_empty() {
        tracing::debug!("no emulator containers running");
        return Ok(());
    }

    tracing::info!(count = ids.len(), "stopping emulator containers");
    let stop = Command::new("docker")
        .args(stop_args(&ids))
        .stdout(Stdio::null())
        .status()
        .await
        .context("run `docker stop`")?;
    if !stop.success() {
        bail!("docker stop exited with {stop}");
    }
    Ok(())
}

/// Argument vector for the `docker ps` listing the sweep starts from. Only
/// containers carrying the launcher prefix match the filter.
fn list_args() -> Vec<String> {
    vec![
        "ps".into(),
        "--quiet".into(),
        "--filter".into(),
        format!("name={CONTAINER_PREFIX}"),
    ]
}

/// Argument vector for `docker stop` over the listed container ids.
fn stop_args(ids: &[&str]) -> Vec<String> {
    std::iter::once("stop")
        .chain(ids.iter().copied())
        .map(str::to_string)
        .collect()
}

/// Streams the container's log output into `tracing` until the container
/// exits. Fire-and-forget observation; never joined.
fn follow_logs(container: &str) {
    let container = container.to_string();
    tokio::spawn(async move {
        let child = Command::new("docker")
            .args(["logs", "--follow", &container])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(err) => {
                tracing::warn!(container = %container, "failed to follow emulator logs: {err}");
                return;
            }
        };

        // Speculos writes to both streams; surface both at the same level.
        if let Some(stdout) = child.stdout.take() {
            spawn_line_logger(container.clone(), stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_logger(container.clone(), stderr);
        }
        let _ = child.wait().await;
    });
}

fn spawn_line_logger<R>(container: String, stream: R)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::info!(target: "emulator", container = %container, "{line}");
        }
    });
}

/// Polls the emulator's API port until it accepts a TCP connection.
async fn wait_for_api(port: u16, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(_) => return Ok(()),
            Err(err) if Instant::now() >= deadline => {
                return Err(err).with_context(|| {
                    format!("emulator API on port {port} not ready after {timeout:?}")
                });
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
}
