// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Failure-counting retry guard with a two-phase policy: failures below the
//! threshold carry no penalty; at and past the threshold the cooldown grows
//! exponentially from `base_backoff`, capped at `max_backoff`.
//!
//! One breaker instance guards one resource. Mutation is not synchronized;
//! concurrent callers need their own lock.

use crate::core::constants::breaker;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

pub struct CircuitBreaker {
    max_failures: u32,
    base_backoff_ms: u64,
    max_backoff_ms: u64,
    failure_count: u32,
    last_failure_at: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
}

/// Observability snapshot. RFC 3339 timestamps; no mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerState {
    pub failure_count: u32,
    pub last_failure_at: Option<String>,
    pub next_retry_at: Option<String>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(
            breaker::DEFAULT_MAX_FAILURES,
            breaker::DEFAULT_BASE_BACKOFF_MS,
            breaker::DEFAULT_MAX_BACKOFF_MS,
        )
    }
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_failures,
            base_backoff_ms,
            max_backoff_ms,
            failure_count: 0,
            last_failure_at: None,
            next_retry_at: None,
        }
    }

    /// The sole gate callers must consult before an attempt.
    pub fn can_attempt(&self, now: DateTime<Utc>) -> bool {
        match self.next_retry_at {
            Some(retry_at) => now >= retry_at,
            None => true,
        }
    }

    /// Clears all counters and any active cooldown.
    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.last_failure_at = None;
        self.next_retry_at = None;
    }

    /// Counts a failure. Below the threshold no cooldown is set; at or past
    /// it the cooldown is `min(max, base * 2^(count - max_failures))`.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.failure_count += 1;
        self.last_failure_at = Some(now);

        if self.failure_count >= self.max_failures {
            let exponent = self.failure_count - self.max_failures;
            let backoff_ms = if exponent >= 63 {
                self.max_backoff_ms
            } else {
                self.base_backoff_ms
                    .saturating_mul(1u64 << exponent)
                    .min(self.max_backoff_ms)
            };
            self.next_retry_at = Some(now + Duration::milliseconds(backoff_ms as i64));
        }
    }

    /// The instant at which attempts become allowed again, if a cooldown
    /// is active.
    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.next_retry_at
    }

    pub fn state(&self) -> BreakerState {
        BreakerState {
            failure_count: self.failure_count,
            last_failure_at: self.last_failure_at.map(|t| t.to_rfc3339()),
            next_retry_at: self.next_retry_at.map(|t| t.to_rfc3339()),
        }
    }
}
