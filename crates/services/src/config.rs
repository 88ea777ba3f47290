use domain::CancellationPolicy;
use serde::{Deserialize, Serialize};

/// Business policies chosen at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// What happens to consumed materials when an order is canceled.
    pub cancellation_policy: CancellationPolicy,
}

impl ServiceConfig {
    pub fn with_cancellation_policy(mut self, policy: CancellationPolicy) -> Self {
        self.cancellation_policy = policy;
        self
    }
}
