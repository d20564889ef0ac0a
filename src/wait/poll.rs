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

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::Backoff;
use super::error::WaitError;
use super::spec::{WaitSpec, DELETED};

/// Outcome of one call to a refresh callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    Found { payload: T, status: String },
    NotFound,
}

impl<T> Observation<T> {
    pub fn found(payload: T, status: impl Into<String>) -> Self {
        Observation::Found {
            payload,
            status: status.into(),
        }
    }
}

/// Classification of an observed status against a [`WaitSpec`]
#[derive(Debug)]
pub enum PollState<T> {
    Pending { payload: Option<T>, status: String },
    Target { payload: Option<T>, status: String },
    Error(WaitError),
}

/// Successful end of a wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converged<T> {
    /// Payload of the last refresh, `None` when the object was found deleted
    pub payload: Option<T>,
    pub status: String,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Sleep until `until`, returning `false` if `cancel` fired first
pub(crate) async fn pause(cancel: &CancellationToken, until: Instant) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = sleep_until(until) => true,
    }
}

impl WaitSpec {
    pub fn classify<T>(
        &self,
        id: &str,
        elapsed: Duration,
        payload: Option<T>,
        status: String,
    ) -> PollState<T> {
        if self.target.contains(&status) {
            PollState::Target { payload, status }
        } else if self.pending.contains(&status) {
            PollState::Pending { payload, status }
        } else {
            PollState::Error(WaitError::UnexpectedState {
                id: id.to_owned(),
                status,
                expected: self.target.iter().cloned().collect(),
                elapsed,
            })
        }
    }

    /// Poll `refresh` until the observed status reaches one of the target states.
    ///
    /// Fails as soon as the callback errors, reports a status outside of the
    /// pending and target sets, the object stays missing for more than
    /// `not_found_checks` polls, `timeout` elapses, or `cancel` fires.
    pub async fn wait<T, F, Fut>(
        &self,
        id: &str,
        cancel: &CancellationToken,
        mut refresh: F,
    ) -> Result<Converged<T>, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Observation<T>>>,
    {
        self.validate(id)?;

        let start = Instant::now();
        let deadline = start + self.timeout;
        let mut backoff = Backoff::new(self.min_interval, self.poll_interval);
        let mut next = start + self.delay;
        let mut last_status: Option<String> = None;
        let mut attempts = 0u32;
        let mut not_found = 0u32;
        let mut target_seen = 0u32;

        debug!(
            event = "wait.started",
            id,
            pending = ?self.pending,
            target = ?self.target,
            timeout_ms = self.timeout.as_millis() as u64,
        );

        loop {
            let cancelled = !pause(cancel, next.min(deadline)).await || cancel.is_cancelled();
            if cancelled {
                warn!(event = "wait.cancelled", id, attempts, last_status = ?last_status);
                return Err(WaitError::Cancelled {
                    id: id.to_owned(),
                    last_status,
                    elapsed: start.elapsed(),
                });
            }
            if Instant::now() >= deadline {
                return Err(self.timed_out(id, last_status, attempts));
            }

            attempts += 1;
            let observation = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(event = "wait.cancelled", id, attempts, last_status = ?last_status);
                    return Err(WaitError::Cancelled {
                        id: id.to_owned(),
                        last_status,
                        elapsed: start.elapsed(),
                    });
                }
                result = timeout_at(deadline, refresh()) => match result {
                    Err(_) => return Err(self.timed_out(id, last_status, attempts)),
                    Ok(Err(source)) => {
                        warn!(event = "wait.refresh_failed", id, attempts, error = %source);
                        return Err(WaitError::Refresh {
                            id: id.to_owned(),
                            last_status,
                            elapsed: start.elapsed(),
                            source,
                        });
                    }
                    Ok(Ok(observation)) => observation,
                },
            };

            let (payload, status) = match observation {
                Observation::Found { payload, status } => (Some(payload), status),
                Observation::NotFound if self.tracks_deletion() => (None, DELETED.to_owned()),
                Observation::NotFound => {
                    not_found += 1;
                    target_seen = 0;
                    debug!(event = "wait.not_found", id, attempts, not_found);
                    if not_found > self.not_found_checks {
                        return Err(WaitError::NotFound {
                            id: id.to_owned(),
                            retries: not_found,
                            elapsed: start.elapsed(),
                        });
                    }
                    next = Instant::now() + backoff.next_interval(true);
                    continue;
                }
            };
            not_found = 0;

            debug!(event = "wait.observed", id, attempts, status = %status);

            let grow = match self.classify(id, start.elapsed(), payload, status) {
                PollState::Target { payload, status } => {
                    target_seen += 1;
                    if target_seen >= self.continuous_target_occurrence {
                        let elapsed = start.elapsed();
                        info!(
                            event = "wait.converged",
                            id,
                            status = %status,
                            attempts,
                            elapsed_ms = elapsed.as_millis() as u64,
                        );
                        return Ok(Converged {
                            payload,
                            status,
                            attempts,
                            elapsed,
                        });
                    }
                    last_status = Some(status);
                    false
                }
                PollState::Pending { status, .. } => {
                    target_seen = 0;
                    last_status = Some(status);
                    true
                }
                PollState::Error(err) => {
                    warn!(event = "wait.unexpected_state", id, attempts, error = %err);
                    return Err(err);
                }
            };

            next = Instant::now() + backoff.next_interval(grow);
        }
    }

    fn timed_out(&self, id: &str, last_status: Option<String>, attempts: u32) -> WaitError {
        warn!(event = "wait.timeout", id, attempts, last_status = ?last_status);
        WaitError::Timeout {
            id: id.to_owned(),
            last_status,
            expected: self.target.iter().cloned().collect(),
            timeout: self.timeout,
        }
    }
}
