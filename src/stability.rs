// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Detects when a freshly arrived file has stopped being written

use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Size-convergence stability check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityProbe {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for StabilityProbe {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            interval: Duration::from_millis(500),
        }
    }
}

impl StabilityProbe {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Wait for the file to be stable (not being written)
    ///
    /// Stable means two consecutive polls saw the same, nonzero size. A read
    /// error only resets the comparison; the probe keeps polling until the
    /// timeout. An empty file never counts as stable.
    pub async fn wait(&self, path: &Path) -> bool {
        let start = Instant::now();
        let mut last_size: Option<u64> = None;

        while start.elapsed() < self.timeout {
            match std::fs::metadata(path) {
                Ok(meta) => {
                    let size = meta.len();
                    if size > 0 && last_size == Some(size) {
                        return true;
                    }
                    debug!("File {:?} not settled yet, size: {}", path, size);
                    last_size = Some(size);
                }
                Err(e) => {
                    debug!("Cannot stat {:?} during stability check: {}", path, e);
                    last_size = None;
                }
            }

            tokio::time::sleep(self.interval).await;
        }

        false
    }
}
