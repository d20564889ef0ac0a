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

use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::backoff::Backoff;
use super::error::WaitError;
use super::poll::pause;

const RETRY_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Failure of one attempt in [`retry`]
#[derive(Debug)]
pub enum RetryError {
    Retryable(anyhow::Error),
    NonRetryable(anyhow::Error),
}

impl RetryError {
    pub fn retryable(err: impl Into<anyhow::Error>) -> Self {
        RetryError::Retryable(err.into())
    }

    pub fn non_retryable(err: impl Into<anyhow::Error>) -> Self {
        RetryError::NonRetryable(err.into())
    }
}

/// Call `f` until it succeeds, fails with a non-retryable error, or `timeout` elapses.
///
/// The attempt in flight when the deadline passes is abandoned; the last
/// retryable error is reported as the cause.
pub async fn retry<T, F, Fut>(
    id: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    mut f: F,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RetryError>>,
{
    let start = Instant::now();
    let deadline = start + timeout;
    let mut backoff = Backoff::new(RETRY_MIN_INTERVAL, None);
    let mut attempts = 0u32;
    let mut last_error = None;

    loop {
        attempts += 1;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = timeout_at(deadline, f()) => Some(result),
        };

        match result {
            None => {
                return Err(WaitError::Cancelled {
                    id: id.to_owned(),
                    last_status: None,
                    elapsed: start.elapsed(),
                })
            }
            Some(Ok(Ok(value))) => return Ok(value),
            Some(Ok(Err(RetryError::NonRetryable(source)))) => {
                return Err(WaitError::Failed {
                    id: id.to_owned(),
                    attempts,
                    elapsed: start.elapsed(),
                    source,
                })
            }
            Some(Ok(Err(RetryError::Retryable(source)))) => {
                debug!(event = "retry.attempt_failed", id, attempts, error = %source);
                last_error = Some(source);
            }
            Some(Err(_)) => (),
        }

        let next = Instant::now() + backoff.next_interval(true);
        if next >= deadline || Instant::now() >= deadline {
            if !pause(cancel, deadline).await {
                return Err(WaitError::Cancelled {
                    id: id.to_owned(),
                    last_status: None,
                    elapsed: start.elapsed(),
                });
            }
            warn!(event = "retry.exhausted", id, attempts);
            let source =
                last_error.unwrap_or_else(|| anyhow::anyhow!("timed out after {timeout:?}"));
            return Err(WaitError::Exhausted {
                id: id.to_owned(),
                attempts,
                elapsed: start.elapsed(),
                source,
            });
        }
        if !pause(cancel, next).await {
            return Err(WaitError::Cancelled {
                id: id.to_owned(),
                last_status: None,
                elapsed: start.elapsed(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use anyhow::anyhow;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let value = retry("volume", Duration::from_secs(60), &cancel, || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if call < 2 {
                Err(RetryError::retryable(anyhow!("409 conflict")))
            } else {
                Ok("attached")
            })
        })
        .await
        .unwrap();

        assert_eq!(value, "attached");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_stops_immediately() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry("volume", Duration::from_secs(60), &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err(RetryError::non_retryable(anyhow!("403 forbidden"))))
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, WaitError::Failed { attempts: 1, .. }));
        assert!(!err.to_string().contains("refresh"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_keeps_last_error() {
        let cancel = CancellationToken::new();

        let start = Instant::now();
        let result: Result<(), _> = retry("volume", Duration::from_secs(5), &cancel, || {
            std::future::ready(Err(RetryError::retryable(anyhow!("volume busy"))))
        })
        .await;

        match result {
            Err(WaitError::Exhausted {
                attempts, source, ..
            }) => {
                assert!(attempts > 1);
                assert_eq!(source.to_string(), "volume busy");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = retry("volume", Duration::from_secs(60), &cancel, || {
            std::future::ready(Err(RetryError::retryable(anyhow!("volume busy"))))
        })
        .await;

        assert!(matches!(result, Err(WaitError::Cancelled { .. })));
    }
}
