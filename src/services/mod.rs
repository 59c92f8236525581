// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod agent;
pub mod delivery;
pub mod feishu;
pub mod normalize;
pub mod queue;

pub use agent::SubmissionAgent;
pub use delivery::{DeliveryOutcome, HttpTransport, Transport};
pub use feishu::{CachedCredential, CredentialCache, FeishuClient};
pub use normalize::{normalize, Normalized, PayloadShape};
pub use queue::{DrainReport, FileQueueStore, MemoryQueueStore, QueueStore, RetryQueue};
