//! Failure accounting and quarantine for individual signers.
//!
//! A signer that fails `failure_threshold` operations in a row is taken out of
//! rotation and a restoration task is scheduled for `cooldown` later. Every
//! quarantine gets a fresh generation number; a restoration only applies if
//! the generation it was scheduled for is still the current one, so a timer
//! left over from an earlier quarantine can never lift a later one.

use chrono::{
    DateTime,
    Utc,
};
use std::time::Duration;
use tokio::{
    runtime::Handle,
    task::AbortHandle,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HealthTransition {
    Healthy,
    Degraded { consecutive_failures: u32 },
    Quarantined { generation: u64 },
}

#[derive(Debug)]
struct Quarantine {
    generation: u64,
    restore_task: Option<AbortHandle>,
}

#[derive(Debug, Default)]
pub(crate) struct SignerHealth {
    pub(crate) consecutive_failures: u32,
    pub(crate) success_count: u64,
    pub(crate) error_count: u64,
    pub(crate) last_error: Option<DateTime<Utc>>,
    quarantine: Option<Quarantine>,
    generation: u64,
}

impl SignerHealth {
    pub(crate) fn is_available(&self) -> bool {
        self.quarantine.is_none()
    }

    pub(crate) fn record_success(&mut self) -> HealthTransition {
        self.success_count += 1;
        self.consecutive_failures = 0;
        self.last_error = None;
        HealthTransition::Healthy
    }

    pub(crate) fn record_failure(&mut self, threshold: u32) -> HealthTransition {
        self.error_count += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(Utc::now());
        if self.quarantine.is_some() || self.consecutive_failures < threshold {
            return HealthTransition::Degraded {
                consecutive_failures: self.consecutive_failures,
            };
        }
        self.generation += 1;
        self.quarantine = Some(Quarantine {
            generation: self.generation,
            restore_task: None,
        });
        HealthTransition::Quarantined {
            generation: self.generation,
        }
    }

    /// Remembers the pending restoration so a manual restore can cancel it.
    pub(crate) fn attach_restore_task(&mut self, generation: u64, task: AbortHandle) {
        match &mut self.quarantine {
            Some(quarantine) if quarantine.generation == generation => {
                quarantine.restore_task = Some(task);
            }
            _ => task.abort(),
        }
    }

    /// Timer path: lifts the quarantine only if it is the one the timer was
    /// scheduled for.
    pub(crate) fn restore_if_current(&mut self, generation: u64) -> bool {
        match &self.quarantine {
            Some(quarantine) if quarantine.generation == generation => {
                self.quarantine = None;
                self.consecutive_failures = 0;
                true
            }
            _ => false,
        }
    }

    /// Manual path: lifts any quarantine and cancels its restoration task.
    pub(crate) fn restore(&mut self) -> bool {
        let Some(quarantine) = self.quarantine.take() else {
            return false;
        };
        if let Some(task) = quarantine.restore_task {
            task.abort();
        }
        self.consecutive_failures = 0;
        true
    }
}

#[derive(Clone, Debug)]
pub(crate) struct HealthMonitor {
    failure_threshold: u32,
    cooldown: Duration,
}

impl HealthMonitor {
    pub(crate) fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
        }
    }

    pub(crate) fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub(crate) fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Runs `restore` once the cooldown has elapsed. Without a Tokio runtime
    /// nothing is scheduled and the signer stays quarantined until restored
    /// by hand.
    pub(crate) fn schedule_restoration(
        &self,
        restore: impl FnOnce() + Send + 'static,
    ) -> Option<AbortHandle> {
        let cooldown = self.cooldown;
        let runtime = Handle::try_current().ok()?;
        let task = runtime.spawn(async move {
            tokio::time::sleep(cooldown).await;
            restore();
        });
        Some(task.abort_handle())
    }
}
