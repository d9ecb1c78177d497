//! Location sampling as a cancelable subscription. The platform (or a test)
//! implements `FixSource`; the sampler owns the subscription lifecycle.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::warn;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SensorError;
use crate::geo::GeoFix;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct SamplerOptions {
    pub high_accuracy: bool,
    /// Give up on an individual fix request after this long.
    pub timeout: Duration,
    /// Oldest cached fix the source may hand back.
    pub max_fix_age: Duration,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
            max_fix_age: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SamplerEvent {
    Fix(GeoFix),
    Error(SensorError),
}

/// Capability the host platform implements to deliver position updates.
/// Fixes arrive in timestamp order; the subscription ends when the token
/// is cancelled.
pub trait FixSource: Send + Sync {
    fn subscribe(
        &self,
        options: &SamplerOptions,
        tx: mpsc::Sender<SamplerEvent>,
        cancel: CancellationToken,
    ) -> Result<(), SensorError>;
}

/// Owns one subscription at a time. `start()` hands back the event stream;
/// `stop()` (or drop) cancels the underlying subscription.
pub struct LocationSampler {
    source: Arc<dyn FixSource>,
    options: SamplerOptions,
    cancel: Option<CancellationToken>,
}

impl LocationSampler {
    pub fn new(source: Arc<dyn FixSource>, options: SamplerOptions) -> Self {
        Self {
            source,
            options,
            cancel: None,
        }
    }

    pub fn start(&mut self) -> Result<mpsc::Receiver<SamplerEvent>, SensorError> {
        if self.cancel.is_some() {
            return Err(SensorError::Unavailable("sampler already running".into()));
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        self.source.subscribe(&self.options, tx, cancel.clone())?;
        self.cancel = Some(cancel);
        Ok(rx)
    }

    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for LocationSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bridge source for hosts that surface location updates as callbacks:
/// the UI shell pushes each platform fix in and every live subscription
/// receives it. Doubles as the synthetic source in tests.
#[derive(Default)]
pub struct ChannelFixSource {
    subscriptions: Mutex<Vec<(mpsc::Sender<SamplerEvent>, CancellationToken)>>,
}

impl ChannelFixSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_fix(&self, fix: GeoFix) {
        self.broadcast(SamplerEvent::Fix(fix));
    }

    pub fn push_error(&self, error: SensorError) {
        self.broadcast(SamplerEvent::Error(error));
    }

    fn broadcast(&self, event: SamplerEvent) {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscriptions.retain(|(tx, cancel)| {
            if cancel.is_cancelled() {
                return false;
            }
            if tx.try_send(event.clone()).is_err() {
                warn!("dropping location event; subscriber is gone or backed up");
            }
            true
        });
    }
}

impl FixSource for ChannelFixSource {
    fn subscribe(
        &self,
        _options: &SamplerOptions,
        tx: mpsc::Sender<SamplerEvent>,
        cancel: CancellationToken,
    ) -> Result<(), SensorError> {
        let mut subscriptions = self
            .subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscriptions.push((tx, cancel));
        Ok(())
    }
}
