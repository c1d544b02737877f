//! Refresh coordination
//!
//! A single [`RefreshCoordinator`] is shared by every consumer of one tree.
//! It serializes rebuilds through a busy flag and decides whether a request
//! can be served by a partial rebuild.
//!
//! Waiting is bounded: when the flag stays set past the timeout, the waiter
//! assumes the holder is gone, clears the flag and proceeds.

use crate::builder::BuildKind;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default time to wait for an in-flight rebuild
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Busy flag poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Why a rebuild was requested
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "sourceType")]
pub enum RefreshRequest {
    /// Re-read every source type
    All,
    /// Re-read a single source type
    SourceType(String),
    /// Configuration changed; everything must be rebuilt from scratch
    ConfigChanged,
}

/// How a request will be served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshPlan {
    /// Scope of the build pass
    pub kind: BuildKind,
    /// Drop all builder state before building
    pub invalidate: bool,
}

/// Serializes rebuilds of one tree
#[derive(Debug)]
pub struct RefreshCoordinator {
    busy: AtomicBool,
    timeout: Duration,
    poll_interval: Duration,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RefreshCoordinator {
    /// Create a coordinator with the default timeout
    #[must_use]
    pub const fn new() -> Self {
        Self::with_timeout(DEFAULT_REFRESH_TIMEOUT)
    }

    /// Create a coordinator with a custom wait timeout
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            busy: AtomicBool::new(false),
            timeout,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Whether a rebuild is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Wait until no rebuild is in flight.
    ///
    /// Returns `false` if the wait timed out; the busy flag has then been
    /// cleared.
    pub async fn wait_for_refresh_complete(&self) -> bool {
        let deadline = Instant::now() + self.timeout;
        while self.is_busy() {
            if Instant::now() >= deadline {
                warn!(
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "Abandoning wait for in-flight refresh"
                );
                self.busy.store(false, Ordering::Release);
                return false;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        true
    }

    /// Wait for any in-flight rebuild, then mark a new one as started
    pub async fn begin(&self) -> RefreshGuard<'_> {
        loop {
            self.wait_for_refresh_complete().await;
            if let Some(guard) = self.try_begin() {
                return guard;
            }
        }
    }

    /// Mark a rebuild as started unless one is already in flight
    pub fn try_begin(&self) -> Option<RefreshGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| {
                debug!("Refresh started");
                RefreshGuard { coordinator: self }
            })
    }

    /// Decide how to serve a request given whether a tree already exists
    #[must_use]
    pub fn plan(request: &RefreshRequest, has_tree: bool) -> RefreshPlan {
        match request {
            RefreshRequest::SourceType(source_type) if has_tree => RefreshPlan {
                kind: BuildKind::SourceType(source_type.clone()),
                invalidate: false,
            },
            RefreshRequest::SourceType(_) | RefreshRequest::All => RefreshPlan {
                kind: BuildKind::Full,
                invalidate: false,
            },
            RefreshRequest::ConfigChanged => RefreshPlan {
                kind: BuildKind::Full,
                invalidate: true,
            },
        }
    }
}

/// Clears the busy flag when dropped
#[derive(Debug)]
pub struct RefreshGuard<'a> {
    coordinator: &'a RefreshCoordinator,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.busy.store(false, Ordering::Release);
        debug!("Refresh finished");
    }
}
