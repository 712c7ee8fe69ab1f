#![forbid(unsafe_code)]

use anyhow::Result;
use speculos_launch::{
    ensure_image_available, launch_options, stop_all_sessions, Config, Session,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let argv: Vec<String> = std::env::args().collect();
    let cfg = Config::from_invocation(&argv);
    tracing::info!(
        app = %cfg.app_path.display(),
        model = %cfg.model,
        api_port = %cfg.api_port,
        "starting emulator session"
    );

    // Strict sequencing: the image must be present before the session starts,
    // and a pull failure must short-circuit the whole launch.
    ensure_image_available().await?;
    let session = Session::new(&cfg.app_path, &cfg.api_port);
    session.start(launch_options(&cfg.model)).await?;

    wait_for_shutdown().await;

    tracing::info!("received interrupt, closing");
    if let Err(err) = stop_all_sessions().await {
        tracing::warn!("failed to stop emulator containers: {err:#}");
    }
    Ok(())
}

/// Suspends until SIGINT or SIGTERM. A true scheduler-yielding wait; the task
/// parks until a signal future resolves.
async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = sigterm => {}
    }
}
