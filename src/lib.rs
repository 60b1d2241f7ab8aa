pub mod api;
pub mod booking;
pub mod config;
pub mod db;
pub mod engine;
pub mod gateway;
pub mod notifications;
pub mod pricing;
pub mod util;

pub use db::DbPool;

use std::sync::Arc;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;

use crate::booking::flow::DraftStore;
use crate::engine::confirmation::ConfirmationTracker;
use crate::gateway::PaymentGateway;
use crate::notifications::AckMailer;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub gateway: Arc<dyn PaymentGateway>,
    pub mailer: Arc<AckMailer>,
    pub drafts: DraftStore,
    pub confirmations: ConfirmationTracker,
    /// Cancelled on shutdown; stops confirmation workers between attempts.
    pub shutdown: CancellationToken,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool, gateway: Arc<dyn PaymentGateway>) -> Self {
        let mailer = Arc::new(AckMailer::new(config.email.clone()));
        Self {
            config,
            db,
            gateway,
            mailer,
            drafts: DraftStore::new(),
            confirmations: ConfirmationTracker::new(),
            shutdown: CancellationToken::new(),
            metrics_handle: None,
        }
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
