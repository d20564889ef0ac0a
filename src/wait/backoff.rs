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

use std::time::Duration;

const INITIAL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_INTERVAL: Duration = Duration::from_secs(10);
/// Poll intervals at or above this bound are ignored in favor of the backoff
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(180);

/// Interval between two refreshes: either fixed or exponential
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    current: Duration,
    min_interval: Duration,
    poll_interval: Option<Duration>,
}

impl Backoff {
    pub(crate) fn new(min_interval: Duration, poll_interval: Option<Duration>) -> Self {
        Self {
            current: INITIAL_INTERVAL,
            min_interval,
            poll_interval: poll_interval.filter(|interval| *interval < MAX_POLL_INTERVAL),
        }
    }

    /// Interval before the next refresh.
    ///
    /// `grow` is false while confirming a repeated target observation, so the
    /// confirmation polls do not slow down.
    pub(crate) fn next_interval(&mut self, grow: bool) -> Duration {
        if grow {
            self.current = self.current.saturating_mul(2);
        }
        if let Some(interval) = self.poll_interval {
            return interval;
        }
        if self.current < self.min_interval {
            self.current = self.min_interval;
        } else if self.current > MAX_INTERVAL {
            self.current = MAX_INTERVAL;
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_up_to_the_cap() {
        let mut backoff = Backoff::new(Duration::ZERO, None);
        let intervals: Vec<_> = (0..9).map(|_| backoff.next_interval(true)).collect();
        assert_eq!(
            intervals,
            [200, 400, 800, 1600, 3200, 6400, 10000, 10000, 10000]
                .map(Duration::from_millis)
                .to_vec()
        );
    }

    #[test]
    fn min_interval_is_a_floor() {
        let mut backoff = Backoff::new(Duration::from_secs(3), None);
        assert_eq!(backoff.next_interval(true), Duration::from_secs(3));
        assert_eq!(backoff.next_interval(true), Duration::from_secs(6));
        assert_eq!(backoff.next_interval(true), Duration::from_secs(10));
    }

    #[test]
    fn poll_interval_is_fixed() {
        let mut backoff = Backoff::new(Duration::from_secs(3), Some(Duration::from_secs(1)));
        for _ in 0..5 {
            assert_eq!(backoff.next_interval(true), Duration::from_secs(1));
        }
    }

    #[test]
    fn oversized_poll_interval_falls_back_to_backoff() {
        let mut backoff = Backoff::new(Duration::ZERO, Some(Duration::from_secs(600)));
        assert_eq!(backoff.next_interval(true), Duration::from_millis(200));
    }

    #[test]
    fn confirmation_does_not_grow() {
        let mut backoff = Backoff::new(Duration::ZERO, None);
        assert_eq!(backoff.next_interval(true), Duration::from_millis(200));
        assert_eq!(backoff.next_interval(false), Duration::from_millis(200));
        assert_eq!(backoff.next_interval(true), Duration::from_millis(400));
    }
}
