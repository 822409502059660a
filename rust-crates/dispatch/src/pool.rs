use crate::{
    DispatchConfig,
    Error,
    Result,
    health::{
        HealthMonitor,
        HealthTransition,
        SignerHealth,
    },
    stats::SignerStats,
};
use chrono::{
    DateTime,
    Utc,
};
use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        Weak,
    },
};


/// Position of a signer in the pool, stable for the process lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignerId(usize);

impl SignerId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SignerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Configuration-time description of one signing identity.
pub struct SignerSpec<C> {
    pub name: String,
    pub address: String,
    pub credential: C,
}

impl<C> SignerSpec<C> {
    pub fn new(name: impl Into<String>, address: impl Into<String>, credential: C) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            credential,
        }
    }
}

/// What a unit of work receives: the identity it was bound to and that
/// identity's credential.
pub struct SignerHandle<C> {
    id: SignerId,
    name: Arc<str>,
    address: Arc<str>,
    credential: Arc<C>,
}

impl<C> SignerHandle<C> {
    pub fn id(&self) -> SignerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn credential(&self) -> &C {
        &self.credential
    }

    pub fn credential_arc(&self) -> Arc<C> {
        self.credential.clone()
    }
}

impl<C> Clone for SignerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            address: self.address.clone(),
            credential: self.credential.clone(),
        }
    }
}

impl<C> fmt::Debug for SignerHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct SlotState {
    busy: bool,
    last_used: Option<DateTime<Utc>>,
    health: SignerHealth,
}

#[derive(Debug)]
struct PoolState {
    cursor: usize,
    slots: Vec<SlotState>,
}

impl PoolState {
    fn is_eligible(&self, index: usize) -> bool {
        let slot = &self.slots[index];
        slot.health.is_available() && !slot.busy
    }

    fn select(&mut self) -> Option<usize> {
        let len = self.slots.len();
        let found = (0..len)
            .map(|offset| (self.cursor + offset) % len)
            .find(|&index| self.is_eligible(index))?;
        self.cursor = (found + 1) % len;
        Some(found)
    }

    fn mark_busy(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.busy = true;
        slot.last_used = Some(Utc::now());
    }
}

struct PoolInner<C> {
    handles: Vec<SignerHandle<C>>,
    state: Mutex<PoolState>,
    monitor: HealthMonitor,
}

impl<C> PoolInner<C> {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn restore_if_current(&self, index: usize, generation: u64) {
        let restored = self.lock().slots[index]
            .health
            .restore_if_current(generation);
        if restored {
            tracing::info!(
                "{} is available again after cooldown",
                self.handles[index].name
            );
        }
    }
}

/// The fixed set of signers plus their busy/health state.
///
/// Selection, busy-marking and release all go through one mutex, so two
/// callers can never be handed the same free signer.
pub struct SignerPool<C> {
    inner: Arc<PoolInner<C>>,
}

impl<C> Clone for SignerPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Send + Sync + 'static> SignerPool<C> {
    pub fn new(specs: Vec<SignerSpec<C>>, config: &DispatchConfig) -> Result<Self> {
        if specs.is_empty() {
            return Err(Error::NoSignersConfigured);
        }
        config.validate()?;
        let handles: Vec<_> = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                tracing::info!("initialised {}: {}", spec.name, spec.address);
                SignerHandle {
                    id: SignerId(index),
                    name: spec.name.into(),
                    address: spec.address.into(),
                    credential: Arc::new(spec.credential),
                }
            })
            .collect();
        tracing::info!("signer pool ready with {} signers", handles.len());
        let slots = handles.iter().map(|_| SlotState::default()).collect();
        let monitor =
            HealthMonitor::new(config.failure_threshold, config.quarantine_cooldown());
        Ok(Self {
            inner: Arc::new(PoolInner {
                handles,
                state: Mutex::new(PoolState { cursor: 0, slots }),
                monitor,
            }),
        })
    }

    /// Next healthy, idle signer in round-robin order. Advances the cursor
    /// but does not reserve the signer; dispatch uses [`Self::acquire`].
    pub fn select_available(&self) -> Option<SignerHandle<C>> {
        let index = self.inner.lock().select()?;
        Some(self.inner.handles[index].clone())
    }

    pub fn mark_busy(&self, id: SignerId) {
        if self.contains(id) {
            self.inner.lock().mark_busy(id.0);
            tracing::debug!("{} marked busy", self.inner.handles[id.0].name);
        } else {
            tracing::warn!("mark_busy for unknown signer {id}");
        }
    }

    /// Selects and reserves a signer in a single critical section.
    pub fn acquire(&self) -> Option<SignerHandle<C>> {
        let index = {
            let mut state = self.inner.lock();
            let index = state.select()?;
            state.mark_busy(index);
            index
        };
        let handle = &self.inner.handles[index];
        tracing::debug!("{} marked busy", handle.name);
        Some(handle.clone())
    }

    /// Frees a signer and feeds the outcome into its failure accounting. On
    /// reaching the failure threshold the signer is quarantined and a
    /// restoration is scheduled for after the cooldown.
    pub fn release(&self, id: SignerId, outcome: Outcome) {
        if !self.contains(id) {
            tracing::warn!("release for unknown signer {id}");
            return;
        }
        let name = &self.inner.handles[id.0].name;
        let mut state = self.inner.lock();
        let slot = &mut state.slots[id.0];
        if !slot.busy {
            tracing::warn!("{name} released while not busy; ignoring");
            return;
        }
        slot.busy = false;
        let transition = match outcome {
            Outcome::Success => slot.health.record_success(),
            Outcome::Failure => slot
                .health
                .record_failure(self.inner.monitor.failure_threshold()),
        };
        match transition {
            HealthTransition::Healthy => {}
            HealthTransition::Degraded {
                consecutive_failures,
            } => {
                tracing::debug!("{name} failed ({consecutive_failures} in a row)");
            }
            HealthTransition::Quarantined { generation } => {
                let weak: Weak<PoolInner<C>> = Arc::downgrade(&self.inner);
                let index = id.0;
                let restore = move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.restore_if_current(index, generation);
                    }
                };
                match self.inner.monitor.schedule_restoration(restore) {
                    Some(task) => {
                        slot.health.attach_restore_task(generation, task);
                        tracing::warn!(
                            "{name} quarantined after repeated failures; retrying in {:?}",
                            self.inner.monitor.cooldown()
                        );
                    }
                    None => tracing::warn!(
                        "{name} quarantined but no runtime is available to restore it; \
                         manual restore required"
                    ),
                }
            }
        }
        tracing::debug!("{name} released (outcome {outcome:?})");
    }

    /// Lifts a quarantine ahead of its cooldown. Returns whether the signer
    /// was quarantined.
    pub fn restore(&self, id: SignerId) -> bool {
        if !self.contains(id) {
            return false;
        }
        let restored = self.inner.lock().slots[id.0].health.restore();
        if restored {
            tracing::info!("{} manually restored", self.inner.handles[id.0].name);
        }
        restored
    }
}

impl<C> SignerPool<C> {
    pub fn len(&self) -> usize {
        self.inner.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.handles.is_empty()
    }

    pub fn contains(&self, id: SignerId) -> bool {
        id.0 < self.inner.handles.len()
    }

    /// First configured signer, for read-only calls. Never reserves it.
    pub fn primary(&self) -> SignerHandle<C> {
        self.inner.handles[0].clone()
    }

    pub fn handle(&self, id: SignerId) -> Option<SignerHandle<C>> {
        self.inner.handles.get(id.0).cloned()
    }

    pub fn handles(&self) -> impl Iterator<Item = &SignerHandle<C>> {
        self.inner.handles.iter()
    }

    pub fn is_available(&self, id: SignerId) -> bool {
        self.contains(id) && self.inner.lock().slots[id.0].health.is_available()
    }

    pub fn is_busy(&self, id: SignerId) -> bool {
        self.contains(id) && self.inner.lock().slots[id.0].busy
    }

    pub fn consecutive_failures(&self, id: SignerId) -> u32 {
        if !self.contains(id) {
            return 0;
        }
        self.inner.lock().slots[id.0].health.consecutive_failures
    }

    /// Per-signer view taken under a single lock.
    pub(crate) fn signer_stats(&self) -> Vec<SignerStats> {
        let state = self.inner.lock();
        self.inner
            .handles
            .iter()
            .zip(state.slots.iter())
            .map(|(handle, slot)| SignerStats {
                id: handle.id.0,
                name: handle.name.to_string(),
                address: handle.address.to_string(),
                available: slot.health.is_available(),
                busy: slot.busy,
                success_count: slot.health.success_count,
                error_count: slot.health.error_count,
                consecutive_failures: slot.health.consecutive_failures,
                last_used: slot.last_used,
                last_error: slot.health.last_error,
            })
            .collect()
    }
}
