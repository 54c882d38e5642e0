//! Process-wide readiness state.
//!
//! Transitions only move forward: `starting -> ready` or
//! `starting -> degraded`, decided once by the startup sequence. The probe
//! handler reads a snapshot without touching the pipeline.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Starting,
    Ready,
    Degraded,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Starting => write!(f, "starting"),
            HealthStatus::Ready => write!(f, "ready"),
            HealthStatus::Degraded => write!(f, "degraded"),
        }
    }
}

const STARTING: u8 = 0;
const READY: u8 = 1;
const DEGRADED: u8 = 2;

/// Shared handle to the readiness flag. Cloning shares the same state.
#[derive(Clone)]
pub struct HealthState {
    inner: Arc<AtomicU8>,
}

impl HealthState {
    pub fn new() -> Self {
        Self { inner: Arc::new(AtomicU8::new(STARTING)) }
    }

    pub fn status(&self) -> HealthStatus {
        match self.inner.load(Ordering::Acquire) {
            READY => HealthStatus::Ready,
            DEGRADED => HealthStatus::Degraded,
            _ => HealthStatus::Starting,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.load(Ordering::Acquire) == READY
    }

    /// Marks the process ready. Only valid from `starting`; returns whether
    /// the transition happened.
    pub fn mark_ready(&self) -> bool {
        self.inner
            .compare_exchange(STARTING, READY, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Marks startup as failed. Only valid from `starting`; returns whether
    /// the transition happened.
    pub fn mark_degraded(&self) -> bool {
        self.inner
            .compare_exchange(STARTING, DEGRADED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}
