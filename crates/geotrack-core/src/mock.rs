//! Mock position source for testing.
//!
//! [`MockPositionSource`] implements [`PositionSource`] without any real
//! positioning hardware. Each open replays a scripted list of fixes and then
//! either ends, fails with [`Error::SourceUnavailable`], or stays open so
//! that more fixes can be pushed while a test runs.
//!
//! # Features
//!
//! - **Permission toggles**: revoke or grant the foreground and background grants
//! - **Failure injection**: end the stream with an error after the script
//! - **Live pushing**: keep the stream open and feed fixes one by one
//! - **Open/close accounting**: assert the source was released exactly once

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;

use geotrack_types::RawFix;

use crate::error::{Error, Result};
use crate::source::{FixStream, PositionSource, SourceOptions};

type FixSender = mpsc::UnboundedSender<Result<RawFix>>;

/// A scripted position source for tests and demos.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use futures::StreamExt;
/// use geotrack_core::{MockPositionSource, SourceOptions, Subscription};
/// use geotrack_types::RawFix;
///
/// #[tokio::main]
/// async fn main() {
///     let source = Arc::new(
///         MockPositionSource::new().with_fixes(vec![RawFix::new(48.85, 2.35, 1)]),
///     );
///     let mut sub = Subscription::open(source.clone(), &SourceOptions::default())
///         .await
///         .unwrap();
///     assert!(sub.next().await.unwrap().is_ok());
///     assert!(sub.next().await.is_none());
/// }
/// ```
pub struct MockPositionSource {
    permission: AtomicBool,
    background_permission: AtomicBool,
    script: Mutex<Vec<RawFix>>,
    failure: Mutex<Option<String>>,
    hold_open: AtomicBool,
    live: Mutex<Option<FixSender>>,
    current: Mutex<Option<RawFix>>,
    open_count: AtomicU32,
    close_count: AtomicU32,
}

impl std::fmt::Debug for MockPositionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPositionSource")
            .field("permission", &self.permission.load(Ordering::Relaxed))
            .field("open_count", &self.open_count())
            .field("close_count", &self.close_count())
            .finish()
    }
}

impl Default for MockPositionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPositionSource {
    /// Create a mock source with both grants present and an empty script.
    pub fn new() -> Self {
        Self {
            permission: AtomicBool::new(true),
            background_permission: AtomicBool::new(true),
            script: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            hold_open: AtomicBool::new(false),
            live: Mutex::new(None),
            current: Mutex::new(None),
            open_count: AtomicU32::new(0),
            close_count: AtomicU32::new(0),
        }
    }

    /// Fixes delivered, in order, on every open.
    #[must_use]
    pub fn with_fixes(self, fixes: Vec<RawFix>) -> Self {
        *lock(&self.script) = fixes;
        self
    }

    /// After the scripted fixes, fail with `SourceUnavailable(reason)`.
    #[must_use]
    pub fn then_fail(self, reason: impl Into<String>) -> Self {
        *lock(&self.failure) = Some(reason.into());
        self
    }

    /// After the scripted fixes, keep the stream open until closed.
    #[must_use]
    pub fn hold_open(self) -> Self {
        self.hold_open.store(true, Ordering::SeqCst);
        self
    }

    /// Start without the foreground grant.
    #[must_use]
    pub fn without_permission(self) -> Self {
        self.permission.store(false, Ordering::SeqCst);
        self
    }

    /// Generate `count` fixes wandering away from `(latitude, longitude)`.
    ///
    /// Each step moves roughly 10 to 50 meters in a random direction, so a
    /// 5 meter displacement filter accepts all of them.
    pub fn random_walk(latitude: f64, longitude: f64, count: usize, start_ms: i64) -> Vec<RawFix> {
        const DEG_PER_METER: f64 = 1.0 / 111_320.0;

        let mut fixes = Vec::with_capacity(count);
        let (mut lat, mut lon) = (latitude, longitude);
        for i in 0..count {
            fixes.push(
                RawFix::builder(lat, lon)
                    .accuracy(3.0 + rand::random::<f32>() * 7.0)
                    .provider("mock")
                    .timestamp_ms(start_ms + i as i64 * 1_000)
                    .build(),
            );
            let step = 10.0 + rand::random::<f64>() * 40.0;
            let heading = rand::random::<f64>() * std::f64::consts::TAU;
            lat += step * heading.cos() * DEG_PER_METER;
            lon += step * heading.sin() * DEG_PER_METER / lat.to_radians().cos().max(0.01);
        }
        fixes
    }

    /// Grant or revoke the foreground permission.
    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    /// Grant or revoke the background permission.
    pub fn set_background_permission(&self, granted: bool) {
        self.background_permission.store(granted, Ordering::SeqCst);
    }

    /// Set the value returned by [`PositionSource::current_position`].
    pub fn set_current(&self, fix: Option<RawFix>) {
        *lock(&self.current) = fix;
    }

    /// Deliver a fix on the currently open stream.
    ///
    /// Returns `false` if no stream is held open.
    pub fn push(&self, fix: RawFix) -> bool {
        match lock(&self.live).as_ref() {
            Some(tx) => tx.send(Ok(fix)).is_ok(),
            None => false,
        }
    }

    /// Fail the currently open stream with `SourceUnavailable(reason)`.
    ///
    /// The stream ends right after the error.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        match lock(&self.live).take() {
            Some(tx) => tx.send(Err(Error::source_unavailable(reason))).is_ok(),
            None => false,
        }
    }

    /// Number of times the source has been opened.
    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Number of times the source has been closed.
    pub fn close_count(&self) -> u32 {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PositionSource for MockPositionSource {
    fn has_permission(&self) -> bool {
        self.permission.load(Ordering::SeqCst)
    }

    fn has_background_permission(&self) -> bool {
        self.background_permission.load(Ordering::SeqCst)
    }

    async fn open(&self, _options: &SourceOptions) -> Result<FixStream> {
        if !self.has_permission() {
            return Err(Error::permission("mock permission revoked"));
        }
        self.open_count.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = mpsc::unbounded_channel();
        for fix in lock(&self.script).iter() {
            let _ = tx.send(Ok(fix.clone()));
        }

        if let Some(reason) = lock(&self.failure).clone() {
            let _ = tx.send(Err(Error::source_unavailable(reason)));
        } else if self.hold_open.load(Ordering::SeqCst) {
            *lock(&self.live) = Some(tx);
        }

        let stream = stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        });
        Ok(Box::pin(stream))
    }

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.live).take();
    }

    async fn current_position(&self) -> Option<RawFix> {
        lock(&self.current).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
