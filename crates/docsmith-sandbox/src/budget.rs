//! Cooperative resource accounting.
//!
//! Every statement, expression node and loop iteration charges the
//! [`Budget`]. Every 256 steps the budget polls the wall-clock deadline and
//! the [`CancelToken`], so even a tight loop with no I/O is interrupted
//! within a bounded number of steps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};

/// Steps between two deadline and cancellation polls.
const POLL_INTERVAL: u64 = 256;

/// Bytes of string output covered by one step.
const BYTES_PER_STEP: usize = 32;

/// Shared flag that asks a running execution to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Step, deadline and size accounting for one execution.
#[derive(Debug)]
pub struct Budget {
    steps: u64,
    max_steps: u64,
    started: Instant,
    deadline: Option<Instant>,
    timeout_ms: u64,
    max_string_bytes: usize,
    token: CancelToken,
}

impl Budget {
    pub fn new(config: &SandboxConfig, token: CancelToken) -> Self {
        let started = Instant::now();
        Self {
            steps: 0,
            max_steps: config.max_steps,
            started,
            deadline: started.checked_add(config.timeout()),
            timeout_ms: config.timeout_ms,
            max_string_bytes: config.max_string_bytes,
            token,
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Charge a single step.
    pub fn tick(&mut self) -> Result<()> {
        self.charge(1)
    }

    /// Charge `steps` at once, polling if a poll boundary was crossed.
    pub fn charge(&mut self, steps: u64) -> Result<()> {
        let before = self.steps;
        self.steps = self.steps.saturating_add(steps);
        if self.steps > self.max_steps {
            return Err(SandboxError::StepLimit {
                limit: self.max_steps,
            });
        }
        if before / POLL_INTERVAL != self.steps / POLL_INTERVAL {
            self.poll()?;
        }
        Ok(())
    }

    /// Check the cancellation token and the deadline now.
    pub fn poll(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(SandboxError::Timeout {
                limit_ms: self.timeout_ms,
            });
        }
        Ok(())
    }

    /// Validate a string about to be produced and charge for building it.
    pub fn string(&mut self, bytes: usize) -> Result<()> {
        if bytes > self.max_string_bytes {
            return Err(SandboxError::Limit {
                what: "string size in bytes",
                limit: self.max_string_bytes,
            });
        }
        self.charge(1 + (bytes / BYTES_PER_STEP) as u64)
    }

    /// Charge for materializing or walking `len` collection elements.
    pub fn elements(&mut self, len: usize) -> Result<()> {
        self.charge(1 + len as u64)
    }
}
