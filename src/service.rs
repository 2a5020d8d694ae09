//! Process lifecycle: one constructed service owning the dispatcher, the
//! reaper, and the HTTP API, torn down together on signal.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::jobs::{Dispatcher, Reaper};
use crate::metrics::MonitorMetrics;
use crate::server::{AppState, HttpServer};
use crate::store::Store;

pub struct MonitorService {
    config: Config,
    store: Arc<dyn Store>,
    metrics: Arc<MonitorMetrics>,
    shutdown_tx: broadcast::Sender<()>,
}

impl MonitorService {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(4);
        Self {
            config,
            store,
            metrics: Arc::new(MonitorMetrics::default()),
            shutdown_tx,
        }
    }

    pub fn store(&self) -> Arc<dyn Store> {
        Arc::clone(&self.store)
    }

    pub fn metrics(&self) -> Arc<MonitorMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Spawn the background loops. Returned handles finish after
    /// [`shutdown`](Self::shutdown).
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.store),
            self.config.crawler.clone(),
            self.config.reaper.clone(),
            self.config.dispatcher.clone(),
            Arc::clone(&self.metrics),
        );
        let dispatcher_rx = self.shutdown_tx.subscribe();
        let dispatcher_handle = tokio::spawn(async move {
            dispatcher.run(dispatcher_rx).await;
        });

        let reaper = Reaper::new(Arc::clone(&self.store), self.config.reaper.clone());
        let reaper_rx = self.shutdown_tx.subscribe();
        let reaper_handle = tokio::spawn(async move {
            reaper.run(reaper_rx).await;
        });

        vec![dispatcher_handle, reaper_handle]
    }

    /// Serve the HTTP API until shutdown. No-op when disabled.
    pub async fn serve(&self) -> Result<()> {
        if !self.config.http.enabled {
            info!("HTTP API disabled");
            let mut rx = self.shutdown_tx.subscribe();
            let _ = rx.recv().await;
            return Ok(());
        }

        let server = HttpServer::new(
            self.config.http.clone(),
            AppState {
                store: Arc::clone(&self.store),
                metrics: Arc::clone(&self.metrics),
            },
        );
        server.run(self.shutdown_tx.subscribe()).await
    }

    /// Broadcast shutdown to every loop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// start -> serve -> shutdown on SIGINT.
    pub async fn run(&self) -> Result<()> {
        let handles = self.start();

        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(());
            }
        });

        let serve_result = self.serve().await;
        self.shutdown();
        for handle in handles {
            let _ = handle.await;
        }
        serve_result
    }
}
