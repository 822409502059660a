//! Transaction dispatch core for the slot machine backend.
//!
//! A fixed pool of server wallets ("signers") can each have at most one
//! state-changing call in flight, because every signer's transactions must be
//! sequenced by nonce. The [`Dispatcher`] hands incoming work to a free signer
//! immediately, parks the rest in a bounded FIFO [`AdmissionQueue`], and drains
//! that queue as signers free up. Signers that fail repeatedly are quarantined
//! for a cooldown and restored automatically.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod job;
pub mod pool;
pub mod queue;
pub mod stats;

pub use config::DispatchConfig;
pub use dispatcher::Dispatcher;
pub use error::{
    DispatchError,
    Error,
};
pub use job::{
    Ticket,
    WorkId,
};
pub use pool::{
    Outcome,
    SignerHandle,
    SignerId,
    SignerPool,
    SignerSpec,
};
pub use queue::AdmissionQueue;
pub use stats::{
    DetailedStats,
    QueueStats,
    SignerStats,
    StatsAggregator,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;
