use clap::Parser;
use event_warden::Result;

mod run;
mod serve;

#[derive(Debug, clap::Parser)]
#[clap(name = "warden", version, about = "Runs one backend process per event window")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    Run(run::Run),
    Serve(serve::Serve),
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    match args.command {
        Command::Run(run) => run.run().await,
        Command::Serve(serve) => serve.run().await,
    }
}

/// Resolves on the first SIGINT/SIGTERM (ctrl-c elsewhere).
pub(crate) async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }
    #[cfg(not(unix))]
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for ctrl-c: {e}");
    }
    info!("received signal, shutting down");
}
