//! The launcher itself.

use crate::config::CliConfig;
use anyhow::{Context, Result};
use corelib::{ClientFactory, Message};
use harness::{start_node, NetworkBootstrap};
use replication::SimNetwork;
use std::sync::Arc;
use streaming::MessageStreamConsumer;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

impl CliConfig {
    /// Start the mesh and print the watched stream until Ctrl+C.
    pub async fn run(self) -> Result<()> {
        init_tracing(self.verbose);
        tracing::info!("start-mesh v{} starting", env!("CARGO_PKG_VERSION"));

        let dev_nodes = self.dev_nodes()?;
        let (main_name, main_config) = self.main_node()?;

        let network = SimNetwork::new();
        let factory = ClientFactory::new(Arc::new(network));

        let main = match start_node(&factory, &main_name, main_config).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::error!(node = %main_name, error = %err, "main node failed to start");
                None
            }
        };

        let bootstrap = NetworkBootstrap::new(factory).seed(self.seeding());
        let (cluster, report) = bootstrap
            .run(dev_nodes)
            .await
            .context("no dev node could be started")?;

        if let Some(report) = &report {
            for failure in &report.failures {
                tracing::warn!(
                    from = %failure.from,
                    to = %failure.to,
                    stage = %failure.stage,
                    error = %failure.error,
                    "seeding incomplete"
                );
            }
        }

        let watched = cluster
            .handles()
            .first()
            .cloned()
            .context("cluster has no node to watch")?;
        tracing::info!(node = %watched, msg_type = %self.watch, "watching. Press Ctrl+C to stop.");

        let stop = CancellationToken::new();
        tokio::spawn({
            let stop = stop.clone();
            async move {
                shutdown_signal().await;
                tracing::info!("shutdown signal received");
                stop.cancel();
            }
        });

        let outcome = MessageStreamConsumer::new(&watched, self.watch.as_str())
            .drain_until(stop, print_message)
            .await;

        cluster.close();
        if let Some(main) = main {
            main.close();
        }

        let summary = outcome?;
        tracing::info!(delivered = summary.delivered, end = ?summary.end, "stopped");
        Ok(())
    }
}

fn print_message(message: Message) {
    println!(
        "{} #{} {}",
        message.author,
        message.sequence,
        message.content.to_json()
    );
}

fn init_tracing(verbosity: u8) {
    let mut filter = EnvFilter::from_default_env();

    if std::env::var("RUST_LOG").is_err() {
        let level = match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        if let Ok(directive) = level.parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (Ok(mut sigint), Ok(mut sigterm)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) else {
            tracing::error!("failed to install signal handlers");
            return std::future::pending().await;
        };
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
