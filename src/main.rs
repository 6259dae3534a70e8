use anyhow::Context;
use clap::Parser;
use page_audit::{exit_status, setup_logging, Cli, CliRunner};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    setup_logging(args.verbose)?;

    info!("Starting page-audit v{}", env!("CARGO_PKG_VERSION"));

    // Setup graceful shutdown
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let _shutdown_handler = setup_shutdown_handler(shutdown_tx);

    let runner = CliRunner::new();
    // Fatal errors are printed once, by anyhow, when main returns
    let exit_code =
        exit_status(runner.run(args.command, shutdown_rx).await).context("audit could not run")?;

    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}

fn setup_shutdown_handler(shutdown_tx: broadcast::Sender<()>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received SIGINT");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM");
                    }
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                if signal::ctrl_c().await.is_err() {
                    return;
                }
                info!("Received SIGINT");
            }
        }

        let _ = shutdown_tx.send(());
    })
}
