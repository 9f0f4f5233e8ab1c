//! Metrics for observability.
//!
//! Every component records through the `metrics` facade; nothing is exported
//! unless a recorder is installed. [`MetricsExporter`] installs a Prometheus
//! recorder whose rendered text can be logged or served by the embedding
//! application.
//!
//! # Example
//!
//! ```rust,no_run
//! use caption_client_runtime::metrics::MetricsExporter;
//!
//! let mut exporter = MetricsExporter::new();
//! exporter.install()?;
//! // ... run the client ...
//! if let Some(text) = exporter.render() {
//!     println!("{text}");
//! }
//! # Ok::<(), caption_client_runtime::metrics::MetricsError>(())
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus recorder for the client process.
#[derive(Default)]
pub struct MetricsExporter {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsExporter")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl MetricsExporter {
    /// Create an exporter; nothing is recorded until [`install`](Self::install).
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Install the Prometheus recorder globally.
    ///
    /// # Errors
    ///
    /// Returns error if the recorder can not be built or installed.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g., in tests), this logs a
    /// warning and succeeds without a handle.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[
                    0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0,
                ],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                self.handle = Some(handle);
                tracing::info!("Metrics recorder installed");
                Ok(())
            },
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            },
        }
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this exporter did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    // Store
    describe_counter!("store.dispatch.total", "Actions reduced by the store");
    describe_counter!("store.dispatch.rejected", "Actions rejected during shutdown");
    describe_counter!("store.dispatch.reentrant", "Reentrant dispatches rejected");
    describe_counter!("store.invariant.violations", "Reducer invariant violations");
    describe_histogram!("store.reducer.duration_seconds", "Time spent in the root reducer");
    describe_counter!("store.effects.executed", "Effects executed, by type");
    describe_counter!("store.handler.invocations", "Effect handler invocations, by handler");

    // Bus
    describe_counter!("bus.actions.published", "Actions published on the bus");
    describe_counter!("bus.actions.delivered", "Action deliveries to subscribers");

    // Correlator
    describe_counter!("correlator.request.total", "Requests issued, by type");
    describe_counter!("correlator.request.timeout", "Requests that timed out");
    describe_counter!("correlator.request.transport_error", "Requests that could not be sent");
    describe_counter!("correlator.response.unmatched", "Correlated frames with no pending request");
    describe_histogram!("correlator.request.duration_seconds", "Request round-trip time");
    describe_gauge!("correlator.pending", "In-flight requests");

    // Application
    describe_counter!("app.request.failed", "Client requests that ended in an error, by type");
    describe_counter!("app.notifications", "Notifications shown to the user");

    // Transport
    describe_gauge!("transport.connected", "1 while a connection is installed");
    describe_counter!("transport.frames.sent", "Frames written");
    describe_counter!("transport.frames.received", "Frames read");
    describe_counter!("transport.frames.malformed", "Inbound frames that failed to decode");
    describe_counter!("transport.send.rejected", "Sends rejected while disconnected");
    describe_counter!("transport.connect.failed", "Failed connection attempts");
    describe_counter!("transport.connection.lost", "Connections lost");
    describe_counter!("transport.reconnect.attempts", "Reconnection attempts");
    describe_counter!("transport.reconnect.success", "Successful reconnections");
    describe_counter!("transport.reconnect.exhausted", "Reconnect loops that gave up");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exporter_starts_uninstalled() {
        let exporter = MetricsExporter::new();
        assert!(exporter.render().is_none());
    }

    #[test]
    fn test_exporter_renders_recorded_metrics() {
        let mut exporter = MetricsExporter::new();
        exporter.install().unwrap();

        counter!("store.dispatch.total").increment(1);

        // Another test may have installed the recorder first; then there is
        // no handle, but recording still works.
        if let Some(rendered) = exporter.render() {
            assert!(rendered.contains("store_dispatch_total"));
        }
    }
}
