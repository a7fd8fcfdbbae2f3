//! Owns the worker fleet: N topic connectors plus the feed publisher.
//!
//! One watch channel fans the shutdown out to every task. On a signal the
//! connectors abandon their in-flight batches (redelivered next boot) and the
//! publisher performs its forced drain; the supervisor waits for all of them
//! before returning.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::publisher::ScoresFeedPublisher;

#[async_trait]
pub trait Connector: Send + Sync {
    async fn execute(&self, shutdown: watch::Receiver<bool>);
}

pub struct Supervisor {
    connectors: Vec<Arc<dyn Connector>>,
    publisher: Arc<ScoresFeedPublisher>,
}

impl Supervisor {
    pub fn new(connectors: Vec<Arc<dyn Connector>>, publisher: Arc<ScoresFeedPublisher>) -> Self {
        Self {
            connectors,
            publisher,
        }
    }

    /// Run until an interrupt/terminate/quit signal arrives, then drain.
    pub async fn run(&self) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(wait_for_shutdown_signal(shutdown_tx));
        self.run_until(shutdown_rx).await;
    }

    /// Run until `shutdown` flips. Split out from [`run`] so tests drive the
    /// shutdown themselves.
    ///
    /// [`run`]: Supervisor::run
    pub async fn run_until(&self, shutdown: watch::Receiver<bool>) {
        let mut handles = Vec::with_capacity(self.connectors.len() + 1);

        {
            let publisher = Arc::clone(&self.publisher);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move { publisher.execute(shutdown).await }));
        }

        for connector in &self.connectors {
            let connector = Arc::clone(connector);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move { connector.execute(shutdown).await }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task failed");
            }
        }
        info!("all workers drained");
    }
}

async fn wait_for_shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut quit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }

    info!("shutdown signal received, draining workers");
    let _ = shutdown_tx.send(true);
}
