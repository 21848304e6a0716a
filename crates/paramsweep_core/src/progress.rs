//! Fire-and-forget progress events, one per sample.

use std::sync::Arc;
use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SweepError};

/// Emitted after every sample when progress publication is enabled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub worker_number: usize,
    /// Local row index
    pub iteration: usize,
    pub solve_status: bool,
    /// Wall time of the sample in seconds
    pub solve_time: f64,
}

impl ProgressEvent {
    /// JSON body for transports
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SweepError::Config(format!("failed to encode progress event: {e}")))
    }
}

/// Progress transport. Delivery is unacknowledged; a sink must not block the
/// worker on a slow consumer.
pub trait ProgressSink: Send + Sync {
    fn publish(&self, address: &str, event: &ProgressEvent);
}

/// Sink that forwards `(address, event)` pairs into a channel
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: Sender<(String, ProgressEvent)>,
}

impl ChannelProgressSink {
    pub fn new(tx: Sender<(String, ProgressEvent)>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn publish(&self, address: &str, event: &ProgressEvent) {
        if self.tx.send((address.to_string(), event.clone())).is_err() {
            debug!(
                worker = event.worker_number,
                "Progress receiver dropped; event discarded"
            );
        }
    }
}

/// Per-worker publisher; a no-op unless enabled
#[derive(Clone)]
pub struct ProgressPublisher {
    sink: Option<Arc<dyn ProgressSink>>,
    address: String,
}

impl ProgressPublisher {
    /// A publisher that never publishes
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            sink: None,
            address: String::new(),
        }
    }

    /// Fails when publication is enabled without a transport.
    pub fn new(
        enabled: bool,
        address: impl Into<String>,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> Result<Self> {
        if !enabled {
            return Ok(Self::disabled());
        }
        let Some(sink) = sink else {
            return Err(SweepError::ProgressTransportUnavailable);
        };
        Ok(Self {
            sink: Some(sink),
            address: address.into(),
        })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn publish(&self, worker_number: usize, iteration: usize, solve_status: bool, solve_time: f64) {
        if let Some(sink) = &self.sink {
            sink.publish(
                &self.address,
                &ProgressEvent {
                    worker_number,
                    iteration,
                    solve_status,
                    solve_time,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_enabled_without_sink_is_error() {
        assert!(matches!(
            ProgressPublisher::new(true, "http://localhost:8888", None),
            Err(SweepError::ProgressTransportUnavailable)
        ));
    }

    #[test]
    fn test_disabled_never_publishes() {
        let (tx, rx) = channel();
        let sink: Arc<dyn ProgressSink> = Arc::new(ChannelProgressSink::new(tx));
        let publisher = ProgressPublisher::new(false, "addr", Some(sink)).unwrap();
        publisher.publish(0, 0, true, 0.1);
        assert!(!publisher.is_enabled());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_sink_delivers_events() {
        let (tx, rx) = channel();
        let sink: Arc<dyn ProgressSink> = Arc::new(ChannelProgressSink::new(tx));
        let publisher = ProgressPublisher::new(true, "addr", Some(sink)).unwrap();
        publisher.publish(1, 4, false, 0.5);

        let (address, event) = rx.recv().unwrap();
        assert_eq!(address, "addr");
        assert_eq!(event.worker_number, 1);
        assert_eq!(event.iteration, 4);
        assert!(!event.solve_status);
    }

    #[test]
    fn test_publish_after_receiver_dropped_is_silent() {
        let (tx, rx) = channel();
        drop(rx);
        let sink: Arc<dyn ProgressSink> = Arc::new(ChannelProgressSink::new(tx));
        let publisher = ProgressPublisher::new(true, "addr", Some(sink)).unwrap();
        publisher.publish(0, 0, true, 0.0);
    }

    #[test]
    fn test_event_json_field_names() {
        let event = ProgressEvent {
            worker_number: 2,
            iteration: 3,
            solve_status: true,
            solve_time: 0.25,
        };
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["worker_number"], 2);
        assert_eq!(json["solve_time"], 0.25);
    }
}
