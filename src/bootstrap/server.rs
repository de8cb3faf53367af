use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::collector::{Collector, CollectorOptions, SocketMutator};
use crate::config::Config;
use crate::labels::LabelMap;
use crate::pipeline::{Pipeline, PushSocket, QueueProducer};
use crate::proto::{Cisco, Huawei, Nokia};

use super::shutdown::Shutdown;

/// Top-level owner of the per-protocol (listener, dispatch loop)
/// pairs.
///
/// Startup: metrics exporter, label mapping, delivery pipeline, then
/// one collector per configured protocol. Shutdown: a single trigger
/// stops all listeners and cancels in-flight streams, then each
/// collector is joined, listener first and dispatch loop second, so a
/// queue is only ever drained after its server stopped.
pub struct Server {
    config: Arc<Config>,
    shutdown: Arc<Shutdown>,
}

impl Server {
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self {
            config: Arc::new(config),
            shutdown: Shutdown::new(),
        })
    }

    /// Run until a termination signal arrives.
    pub async fn run(self) -> Result<()> {
        if let Some(address) = self.config.telemetry.metrics_address {
            PrometheusBuilder::new()
                .with_http_listener(address)
                .install()
                .context("failed to install metrics exporter")?;
            info!(%address, "metrics exporter started");
        }

        // Shared label mapping, refreshed on SIGHUP
        let labels = LabelMap::from_file(self.config.labels.path.as_deref())?;

        let pipeline = Arc::new(self.build_pipeline());

        // One collector per configured protocol; a bind failure is
        // fatal for startup.
        let mutator = Arc::new(SocketMutator::new(self.config.socket.bind_device.clone()));
        let mut collectors = Vec::new();

        if let Some(config) = &self.config.collectors.cisco {
            collectors.push(
                Collector::spawn::<Cisco>(
                    CollectorOptions::from_config::<Cisco>(config, mutator.clone()),
                    pipeline.clone(),
                    labels.clone(),
                    &self.shutdown,
                )
                .await
                .with_context(|| format!("failed to bind cisco listener on {}", config.address))?,
            );
        }
        if let Some(config) = &self.config.collectors.nokia {
            collectors.push(
                Collector::spawn::<Nokia>(
                    CollectorOptions::from_config::<Nokia>(config, mutator.clone()),
                    pipeline.clone(),
                    labels.clone(),
                    &self.shutdown,
                )
                .await
                .with_context(|| format!("failed to bind nokia listener on {}", config.address))?,
            );
        }
        if let Some(config) = &self.config.collectors.huawei {
            collectors.push(
                Collector::spawn::<Huawei>(
                    CollectorOptions::from_config::<Huawei>(config, mutator.clone()),
                    pipeline.clone(),
                    labels.clone(),
                    &self.shutdown,
                )
                .await
                .with_context(|| format!("failed to bind huawei listener on {}", config.address))?,
            );
        }

        for collector in &collectors {
            info!(
                protocol = collector.protocol(),
                address = %collector.local_addr(),
                "collector started"
            );
        }

        info!(collectors = collectors.len(), "dialoutd started");

        self.wait_for_shutdown(&labels).await;

        info!("stopping listeners and draining streams");
        self.shutdown.trigger();

        // Listeners stop and in-flight streams are cancelled before
        // each completion queue drains to closure.
        for collector in collectors {
            collector.join().await;
        }

        info!("dialoutd stopped");
        Ok(())
    }

    fn build_pipeline(&self) -> Pipeline {
        let mut pipeline = Pipeline::new();

        if let Some(queue) = &self.config.delivery.queue {
            let (producer, mut consumer) = QueueProducer::new(queue.capacity);
            pipeline.add_sink(Box::new(producer));

            // Standalone deployments drain the queue here; embedders
            // attach their own consumer instead.
            tokio::spawn(async move {
                while let Some(payload) = consumer.recv().await {
                    trace!(key = %payload.key, bytes = payload.body.len(), "queue payload drained");
                }
            });
        }

        if let Some(push) = &self.config.delivery.push {
            pipeline.add_sink(Box::new(PushSocket::spawn(
                push.endpoint.clone(),
                push.buffer,
                self.shutdown.subscribe(),
            )));
        }

        pipeline
    }

    /// Wait for SIGINT/SIGTERM; SIGHUP rebuilds the label mapping.
    #[cfg(unix)]
    async fn wait_for_shutdown(&self, labels: &LabelMap) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt =
            signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut terminate =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut hangup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");

        loop {
            tokio::select! {
                _ = interrupt.recv() => {
                    info!("received SIGINT");
                    break;
                }
                _ = terminate.recv() => {
                    info!("received SIGTERM");
                    break;
                }
                _ = hangup.recv() => {
                    match &self.config.labels.path {
                        Some(path) => match labels.refresh_from(path) {
                            Ok(entries) => info!(entries, "label mapping refreshed on SIGHUP"),
                            Err(error) => warn!(%error, "label refresh failed; keeping previous mapping"),
                        },
                        None => debug!("SIGHUP ignored: no label file configured"),
                    }
                }
            }
        }
    }

    #[cfg(not(unix))]
    async fn wait_for_shutdown(&self, _labels: &LabelMap) {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
        info!("received Ctrl+C");
    }
}
