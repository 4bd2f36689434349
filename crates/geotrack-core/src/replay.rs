//! Replay of recorded position traces.
//!
//! A trace is a JSON-lines file with one [`RawFix`] per line, in the same
//! camelCase layout produced by `geotrack export`. Fixes are emitted at the
//! configured interval by a background task that stops when the source is
//! closed.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use geotrack_types::{RawFix, now_millis};

use crate::error::{Error, Result};
use crate::source::{FixStream, PositionSource, SourceOptions};

/// A [`PositionSource`] that plays back a JSON-lines trace file.
#[derive(Debug)]
pub struct ReplaySource {
    path: PathBuf,
    restamp: bool,
    cancel_token: Mutex<Option<CancellationToken>>,
    last_fix: Arc<Mutex<Option<RawFix>>>,
}

impl ReplaySource {
    /// Replay the trace at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            restamp: false,
            cancel_token: Mutex::new(None),
            last_fix: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace recorded timestamps with the time each fix is emitted.
    #[must_use]
    pub fn restamp(mut self, restamp: bool) -> Self {
        self.restamp = restamp;
        self
    }

    /// Path of the trace file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PositionSource for ReplaySource {
    /// A trace is "granted" when the file exists.
    fn has_permission(&self) -> bool {
        self.path.is_file()
    }

    async fn open(&self, options: &SourceOptions) -> Result<FixStream> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::source_unavailable(format!("cannot read {}: {e}", self.path.display()))
        })?;

        let (tx, rx) = mpsc::channel(options.buffer_size.max(1));
        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();
        if let Some(previous) = lock(&self.cancel_token).replace(cancel_token) {
            previous.cancel();
        }

        let period = options.interval;
        let restamp = self.restamp;
        let last_fix = Arc::clone(&self.last_fix);
        let path = self.path.display().to_string();

        tokio::spawn(async move {
            let mut ticker = interval(period);
            let lines = contents
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty());

            for (index, line) in lines {
                tokio::select! {
                    _ = task_token.cancelled() => {
                        debug!("Replay cancelled, stopping gracefully");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                let item = match serde_json::from_str::<RawFix>(line) {
                    Ok(mut fix) => {
                        if restamp {
                            fix.timestamp_ms = now_millis();
                        }
                        *lock(&last_fix) = Some(fix.clone());
                        Ok(fix)
                    }
                    Err(e) => {
                        warn!("Unreadable fix at {}:{}: {}", path, index + 1, e);
                        Err(Error::source_unavailable(format!(
                            "{path}:{}: {e}",
                            index + 1
                        )))
                    }
                };

                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    return;
                }
            }
            debug!("Replay of {} finished", path);
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            let item = rx.recv().await?;
            Some((item, rx))
        });
        Ok(Box::pin(stream))
    }

    fn close(&self) {
        if let Some(token) = lock(&self.cancel_token).take() {
            token.cancel();
        }
    }

    async fn current_position(&self) -> Option<RawFix> {
        lock(&self.last_fix).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
