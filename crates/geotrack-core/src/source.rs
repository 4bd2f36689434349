//! Position stream source abstraction.
//!
//! A [`PositionSource`] wraps a positioning capability (GPS receiver, OS
//! location service, a recorded trace). Opening it yields a [`FixStream`];
//! every successful open must be paired with exactly one
//! [`PositionSource::close`]. [`Subscription`] enforces that pairing: it
//! releases the source when dropped, whatever ends the consumption.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use tracing::debug;

use geotrack_types::RawFix;

use crate::error::{Error, Result};

/// Boxed stream of fixes produced by an open source.
///
/// The stream is unbounded. An `Err` item means the capability became
/// unavailable; the stream ends right after it.
pub type FixStream = Pin<Box<dyn Stream<Item = Result<RawFix>> + Send>>;

/// Options passed to a source when it is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOptions {
    /// Target spacing between fixes.
    pub interval: Duration,
    /// Fixes closer than this to the previous accepted one are ignored.
    pub min_displacement_m: f64,
    /// Channel capacity for sources that buffer internally.
    pub buffer_size: usize,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            min_displacement_m: 5.0,
            buffer_size: 64,
        }
    }
}

impl SourceOptions {
    /// Create options with a specific fix interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Set the minimum displacement.
    #[must_use]
    pub fn min_displacement(mut self, meters: f64) -> Self {
        self.min_displacement_m = meters;
        self
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::invalid_config("buffer_size must be > 0"));
        }
        if self.interval.is_zero() {
            return Err(Error::invalid_config("interval must be > 0"));
        }
        if !self.min_displacement_m.is_finite() || self.min_displacement_m < 0.0 {
            return Err(Error::invalid_config(
                "min_displacement_m must be a finite, non-negative number",
            ));
        }
        Ok(())
    }
}

/// A positioning capability that can be subscribed to.
///
/// Implementations must be object safe; the pipeline holds sources as
/// `Arc<dyn PositionSource>`.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Whether the foreground location grant is present.
    fn has_permission(&self) -> bool;

    /// Whether the background location grant is present.
    ///
    /// Sources without a separate background grant report `true`.
    fn has_background_permission(&self) -> bool {
        true
    }

    /// Start delivering fixes.
    ///
    /// Fails with [`Error::Permission`] when the grant is missing.
    async fn open(&self, options: &SourceOptions) -> Result<FixStream>;

    /// Release the subscription established by [`open`](Self::open).
    fn close(&self);

    /// Best-effort single fix. Returns `None` if nothing is available.
    async fn current_position(&self) -> Option<RawFix>;
}

/// Check the permission and open `source`, returning a release guard.
pub async fn subscribe(
    source: Arc<dyn PositionSource>,
    options: &SourceOptions,
) -> Result<Subscription> {
    Subscription::open(source, options).await
}

/// An open source subscription that releases the source on drop.
///
/// [`PositionSource::close`] runs exactly once per `Subscription`, either
/// from [`release`](Self::release) or from `Drop`.
pub struct Subscription {
    source: Arc<dyn PositionSource>,
    stream: FixStream,
    released: bool,
}

impl Subscription {
    /// Check the permission and open the source.
    pub async fn open(source: Arc<dyn PositionSource>, options: &SourceOptions) -> Result<Self> {
        if !source.has_permission() {
            return Err(Error::permission("location permission not granted"));
        }

        let stream = source.open(options).await?;
        debug!("Position source opened");

        Ok(Self {
            source,
            stream,
            released: false,
        })
    }

    /// Release the source now.
    pub fn release(mut self) {
        self.release_once();
    }

    /// Whether the source has been released.
    pub fn is_released(&self) -> bool {
        self.released
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.source.close();
            debug!("Position source released");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl Stream for Subscription {
    type Item = Result<RawFix>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.released {
            return Poll::Ready(None);
        }
        self.stream.as_mut().poll_next(cx)
    }
}
