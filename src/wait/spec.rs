// This file is part of the terraform-provider-cloudcmd project
//
// Copyright (C) ANEO, 2024-2024. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License")
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

use std::collections::BTreeSet;
use std::time::Duration;

use super::error::WaitError;

/// Synthetic status reported when the refresh callback cannot find the object anymore
pub const DELETED: &str = "DELETED";

pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// How a single convergence wait should behave.
///
/// A `WaitSpec` is built for one create/update/delete operation, used for one
/// call to [`WaitSpec::wait`], and then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSpec {
    pub pending: BTreeSet<String>,
    pub target: BTreeSet<String>,
    /// Time to wait before the first refresh
    pub delay: Duration,
    /// Fixed interval between refreshes, exponential backoff when `None`
    pub poll_interval: Option<Duration>,
    /// Lower bound of the backoff interval
    pub min_interval: Duration,
    pub timeout: Duration,
    /// Number of consecutive "not found" results tolerated before giving up
    pub not_found_checks: u32,
    /// Number of consecutive target observations required for success
    pub continuous_target_occurrence: u32,
}

impl WaitSpec {
    pub fn new<P, T>(pending: P, target: T, timeout: Duration) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        Self {
            pending: pending.into_iter().map(Into::into).collect(),
            target: target.into_iter().map(Into::into).collect(),
            delay: Duration::ZERO,
            poll_interval: None,
            min_interval: Duration::ZERO,
            timeout,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            continuous_target_occurrence: 1,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = Some(poll_interval);
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_not_found_checks(mut self, not_found_checks: u32) -> Self {
        self.not_found_checks = not_found_checks;
        self
    }

    pub fn with_continuous_target_occurrence(mut self, occurrence: u32) -> Self {
        self.continuous_target_occurrence = occurrence.max(1);
        self
    }

    /// Whether a missing object should be reported as the [`DELETED`] status
    pub fn tracks_deletion(&self) -> bool {
        self.pending.contains(DELETED) || self.target.contains(DELETED)
    }

    /// Check that pending and target states are disjoint and that a target exists
    pub fn validate(&self, id: &str) -> Result<(), WaitError> {
        let overlap: Vec<String> = self.pending.intersection(&self.target).cloned().collect();
        if !overlap.is_empty() {
            return Err(WaitError::InvalidSpec {
                id: id.to_owned(),
                reason: format!(
                    "states are both pending and target: {}",
                    overlap.join(", ")
                ),
            });
        }
        if self.target.is_empty() {
            return Err(WaitError::InvalidSpec {
                id: id.to_owned(),
                reason: "no target state".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_defaults() {
        let spec = WaitSpec::new(["BUILD"], ["ACTIVE"], Duration::from_secs(5));
        assert_eq!(spec.delay, Duration::ZERO);
        assert_eq!(spec.poll_interval, None);
        assert_eq!(spec.not_found_checks, DEFAULT_NOT_FOUND_CHECKS);
        assert_eq!(spec.continuous_target_occurrence, 1);
        assert!(spec.validate("db").is_ok());
    }

    #[test]
    fn overlapping_states_are_rejected() {
        let spec = WaitSpec::new(["BUILD", "ACTIVE"], ["ACTIVE"], Duration::from_secs(5));
        match spec.validate("db") {
            Err(WaitError::InvalidSpec { id, reason }) => {
                assert_eq!(id, "db");
                assert!(reason.contains("ACTIVE"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn empty_target_is_rejected() {
        let spec = WaitSpec::new(["BUILD"], Vec::<String>::new(), Duration::from_secs(5));
        assert!(matches!(
            spec.validate("db"),
            Err(WaitError::InvalidSpec { .. })
        ));
    }

    #[test]
    fn deletion_tracking() {
        let spec = WaitSpec::new(["ACTIVE"], [DELETED], Duration::from_secs(5));
        assert!(spec.tracks_deletion());
        let spec = WaitSpec::new(["BUILD"], ["ACTIVE"], Duration::from_secs(5));
        assert!(!spec.tracks_deletion());
    }

    #[test]
    fn continuous_target_occurrence_is_at_least_one() {
        let spec = WaitSpec::new(["BUILD"], ["ACTIVE"], Duration::from_secs(5))
            .with_continuous_target_occurrence(0);
        assert_eq!(spec.continuous_target_occurrence, 1);
    }
}
