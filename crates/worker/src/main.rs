use anyhow::Context;
use postmaster_events::{Dispatcher, Subscription, TokenVerifier};
use postmaster_pipeline::{
    EmailConfirmationNotice, EventPipeline, FsTemplateStore, Notification, TemplateRenderer,
};
use postmaster_worker::{telemetry, ConsumerLoop, LoopExit, WorkerConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        broker = ?config.broker,
        templates_dir = %config.templates_dir.display(),
        "Configuration loaded"
    );

    // --- Pipeline ---
    let verifier = TokenVerifier::new(&config.token).context("Invalid token configuration")?;
    let transport = config.transport.build();
    let pipeline = EventPipeline::<EmailConfirmationNotice, _, _>::new(
        verifier,
        TemplateRenderer::new(FsTemplateStore::new(&config.templates_dir)),
        Dispatcher::new(transport),
        config.mailer.clone(),
    );
    let consumer = ConsumerLoop::new(pipeline);

    // --- Broker subscription ---
    let subscription = Subscription::open(&config.broker, EmailConfirmationNotice::ROUTING_KEY)
        .await
        .context("Failed to subscribe to broker")?;
    tracing::info!(queue = subscription.queue(), "Subscribed");

    // --- Run until shutdown or stream end ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let summary = consumer.run(subscription.deliveries(), cancel).await;

    if let Err(e) = subscription.close().await {
        tracing::warn!(error = %e, "Failed to close broker subscription cleanly");
    }

    match summary.exit {
        LoopExit::Cancelled => {
            tracing::info!("Graceful shutdown complete");
            Ok(())
        }
        LoopExit::StreamClosed => anyhow::bail!("Broker delivery stream closed unexpectedly"),
    }
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
