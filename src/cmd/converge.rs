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

use std::borrow::Cow;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tf_provider::value::{Value, ValueList, ValueString};
use tf_provider::{AttributePath, Diagnostics};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::connection::{Connection, ExecutionResult};
use crate::utils::{parse_duration, WithCmd, WithEnv};
use crate::wait::{
    retry, Converged, Observation, RetryError, WaitError, WaitSpec, DEFAULT_NOT_FOUND_CHECKS,
    DELETED,
};

use super::state::{StateCmd, StateRefresh, StateTimeouts, StateWait};
use super::{with_env, DEFAULT_TIMEOUT};

/// Timeouts of the three write operations of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_TIMEOUT,
            update: DEFAULT_TIMEOUT,
            delete: DEFAULT_TIMEOUT,
        }
    }
}

pub(super) fn parse_timeout(value: &ValueString) -> Result<Duration> {
    match value.as_deref_option() {
        Some(text) => parse_duration(text),
        None => Ok(DEFAULT_TIMEOUT),
    }
}

impl<'a> StateTimeouts<'a> {
    pub(super) fn resolve(&self) -> Result<Timeouts> {
        Ok(Timeouts {
            create: parse_timeout(&self.create).context("invalid `create` timeout")?,
            update: parse_timeout(&self.update).context("invalid `update` timeout")?,
            delete: parse_timeout(&self.delete).context("invalid `delete` timeout")?,
        })
    }
}

pub(super) fn resolve_timeouts(
    diags: &mut Diagnostics,
    timeouts: &Value<StateTimeouts>,
) -> Option<Timeouts> {
    let Value::Value(timeouts) = timeouts else {
        return Some(Timeouts::default());
    };
    match timeouts.resolve() {
        Ok(timeouts) => Some(timeouts),
        Err(err) => {
            diags.error(
                "Invalid timeout",
                format!("{err:#}"),
                AttributePath::new("timeouts").index(0),
            );
            None
        }
    }
}

fn optional_duration(value: &ValueString) -> Result<Option<Duration>> {
    value.as_deref_option().map(parse_duration).transpose()
}

fn states<'b>(values: &'b ValueList<ValueString<'_>>) -> Vec<&'b str> {
    values
        .iter()
        .flatten()
        .filter_map(|state| state.as_deref_option())
        .collect()
}

impl<'a> StateWait<'a> {
    /// Build the spec of one wait; `default_target` applies when no target is configured
    pub(super) fn spec(&self, timeout: Duration, default_target: &[&str]) -> Result<WaitSpec> {
        let mut target = states(&self.target);
        if target.is_empty() {
            target = default_target.to_vec();
        }
        let mut spec = WaitSpec::new(states(&self.pending), target, timeout);

        if let Some(delay) = optional_duration(&self.delay).context("invalid `delay`")? {
            spec = spec.with_delay(delay);
        }
        if let Some(interval) =
            optional_duration(&self.poll_interval).context("invalid `poll_interval`")?
        {
            spec = spec.with_poll_interval(interval);
        }
        if let Some(interval) =
            optional_duration(&self.min_interval).context("invalid `min_interval`")?
        {
            spec = spec.with_min_interval(interval);
        }

        let not_found_checks = self
            .not_found_checks
            .unwrap_or(DEFAULT_NOT_FOUND_CHECKS as i64);
        spec = spec.with_not_found_checks(
            u32::try_from(not_found_checks)
                .map_err(|_| anyhow!("`not_found_checks` must be positive"))?,
        );
        let occurrence = self.continuous_target_occurrence.unwrap_or(1);
        spec = spec.with_continuous_target_occurrence(
            u32::try_from(occurrence)
                .map_err(|_| anyhow!("`continuous_target_occurrence` must be positive"))?,
        );

        Ok(spec)
    }
}

/// Run the `refresh` command of an object and classify its result
pub(super) struct Probe<'p, C> {
    pub connect: &'p C,
    pub refresh: &'p StateRefresh<'p>,
    pub env: &'p [(Cow<'p, str>, Cow<'p, str>)],
}

impl<'p, C: Connection> Probe<'p, C> {
    pub(super) async fn observe(&self) -> Result<Observation<String>> {
        let res = self
            .connect
            .execute(
                self.refresh.cmd(),
                self.refresh.dir(),
                with_env(self.env, self.refresh.env()),
            )
            .await
            .context("failed to run `refresh`")?;
        classify(&res, self.refresh.not_found_exit_code.as_ref_option().copied())
    }

    /// Observe the object once, outside of any wait.
    ///
    /// A missing object yields `DELETED` and a warning; a failing `refresh` is
    /// a warning as well, leaving the status unknown.
    pub(super) async fn status(&self, diags: &mut Diagnostics, id: &str) -> Option<String> {
        match self.observe().await {
            Ok(observation) => {
                if matches!(observation, Observation::NotFound) {
                    diags.root_warning(
                        "Object not found",
                        format!("`{id}` does not exist anymore."),
                    );
                }
                Some(observed_status(&observation).to_owned())
            }
            Err(err) => {
                diags.warning(
                    "Failed to refresh the object",
                    format!("{err:#}"),
                    AttributePath::new("refresh").index(0).attribute("cmd"),
                );
                None
            }
        }
    }

    /// Wait for the object to converge, reporting failures in `diags`
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn converge(
        &self,
        diags: &mut Diagnostics,
        id: &str,
        wait: &StateWait<'_>,
        timeout: Duration,
        default_target: &[&str],
        cancel: &CancellationToken,
        attr_path: AttributePath,
    ) -> Option<String> {
        let spec = match wait.spec(timeout, default_target) {
            Ok(spec) => spec,
            Err(err) => {
                diags.error("Invalid wait", format!("{err:#}"), attr_path);
                return None;
            }
        };

        match spec.wait(id, cancel, move || self.observe()).await {
            Ok(Converged { status, .. }) => Some(status),
            Err(err) => {
                warn!(
                    event = "converge.failed",
                    id = err.id(),
                    last_status = err.last_status(),
                );
                let summary = match &err {
                    WaitError::Cancelled { .. } => format!("Wait for `{}` interrupted", err.id()),
                    _ => format!("`{}` did not converge", err.id()),
                };
                diags.error(summary, err.to_string(), attr_path);
                None
            }
        }
    }
}

/// Exit code `not_found`, or an empty output, means the object does not exist
pub(super) fn classify(
    res: &ExecutionResult,
    not_found: Option<i64>,
) -> Result<Observation<String>> {
    if not_found == Some(res.status as i64) {
        return Ok(Observation::NotFound);
    }
    if res.status != 0 {
        return Err(anyhow!(
            "`refresh` failed with status code {}: {}",
            res.status,
            res.stderr.trim()
        ));
    }
    match res.first_line() {
        "" => Ok(Observation::NotFound),
        status => Ok(Observation::found(res.stdout.clone(), status)),
    }
}

/// Status reported for an observation outside of any wait
pub(super) fn observed_status(observation: &Observation<String>) -> &str {
    match observation {
        Observation::Found { status, .. } => status,
        Observation::NotFound => DELETED,
    }
}

/// Run a lifecycle command, attempting it again while it exits with one of its `retry_exit_codes`
pub(super) async fn run_cmd<C: Connection>(
    connect: &C,
    id: &str,
    cmd: &StateCmd<'_>,
    env: &[(Cow<'_, str>, Cow<'_, str>)],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ExecutionResult> {
    let retryable: Vec<i64> = cmd
        .retry_exit_codes
        .iter()
        .flatten()
        .filter_map(|code| code.as_ref_option().copied())
        .collect();
    let retryable = retryable.as_slice();

    let res = retry(id, timeout, cancel, move || async move {
        let res = connect
            .execute(cmd.cmd(), cmd.dir(), with_env(env, cmd.env()))
            .await
            .map_err(RetryError::NonRetryable)?;
        if retryable.contains(&(res.status as i64)) {
            Err(RetryError::retryable(anyhow!(
                "exited with status code {}: {}",
                res.status,
                res.stderr.trim()
            )))
        } else {
            Ok(res)
        }
    })
    .await?;
    Ok(res)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::connection::ConnectionScript;

    fn string(s: &str) -> ValueString<'_> {
        Value::Value(Cow::from(s))
    }

    fn result(status: i32, stdout: &str) -> ExecutionResult {
        ExecutionResult {
            status,
            stdout: stdout.to_owned(),
            stderr: "boom\n".to_owned(),
        }
    }

    #[test]
    fn classify_refresh_output() {
        assert_eq!(
            classify(&result(0, "ACTIVE\nextra\n"), None).unwrap(),
            Observation::found("ACTIVE\nextra\n".to_owned(), "ACTIVE")
        );
        assert_eq!(classify(&result(0, "\n"), None).unwrap(), Observation::NotFound);
        assert_eq!(classify(&result(4, ""), Some(4)).unwrap(), Observation::NotFound);
        let err = classify(&result(1, ""), Some(4)).unwrap_err();
        assert_eq!(err.to_string(), "`refresh` failed with status code 1: boom");
    }

    #[test]
    fn wait_spec_from_block() {
        let wait = StateWait {
            pending: Value::Value(vec![string("BUILD"), Value::Null]),
            target: Value::Value(vec![string("ACTIVE")]),
            delay: string("10s"),
            poll_interval: string("5s"),
            min_interval: Value::Null,
            not_found_checks: Value::Value(3),
            continuous_target_occurrence: Value::Null,
        };
        let spec = wait.spec(Duration::from_secs(60), &[]).unwrap();

        assert_eq!(
            spec,
            WaitSpec::new(["BUILD"], ["ACTIVE"], Duration::from_secs(60))
                .with_delay(Duration::from_secs(10))
                .with_poll_interval(Duration::from_secs(5))
                .with_not_found_checks(3)
        );
    }

    #[test]
    fn wait_spec_default_target() {
        let wait = StateWait {
            pending: Value::Value(vec![string("ACTIVE")]),
            ..Default::default()
        };
        let spec = wait.spec(Duration::from_secs(60), &[DELETED]).unwrap();
        assert!(spec.target.contains(DELETED));
        assert!(spec.tracks_deletion());
    }

    #[test]
    fn wait_spec_rejects_bad_values() {
        let wait = StateWait {
            delay: string("soon"),
            ..Default::default()
        };
        assert!(wait.spec(Duration::from_secs(60), &["ACTIVE"]).is_err());

        let wait = StateWait {
            not_found_checks: Value::Value(-1),
            ..Default::default()
        };
        assert!(wait.spec(Duration::from_secs(60), &["ACTIVE"]).is_err());
    }

    #[test]
    fn timeouts_default_and_override() {
        let mut diags = Diagnostics::default();
        assert_eq!(
            resolve_timeouts(&mut diags, &Value::Null),
            Some(Timeouts::default())
        );

        let timeouts = Value::Value(StateTimeouts {
            create: string("45m"),
            update: Value::Null,
            delete: string("1h"),
        });
        assert_eq!(
            resolve_timeouts(&mut diags, &timeouts),
            Some(Timeouts {
                create: Duration::from_secs(45 * 60),
                update: DEFAULT_TIMEOUT,
                delete: Duration::from_secs(3600),
            })
        );
        assert!(diags.errors.is_empty());

        let timeouts = Value::Value(StateTimeouts {
            create: string("forever"),
            ..Default::default()
        });
        assert_eq!(resolve_timeouts(&mut diags, &timeouts), None);
        assert!(!diags.errors.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn converge_on_refresh_command() {
        let connect = ConnectionScript::default()
            .on("show", 0, "BUILD\n")
            .on("show", 0, "ACTIVE\n");
        let refresh = StateRefresh {
            cmd: string("show"),
            ..Default::default()
        };
        let env = vec![(Cow::from("ID"), Cow::from("db-1"))];
        let probe = Probe {
            connect: &connect,
            refresh: &refresh,
            env: &env,
        };
        let wait = StateWait {
            pending: Value::Value(vec![string("BUILD")]),
            target: Value::Value(vec![string("ACTIVE")]),
            poll_interval: string("1s"),
            ..Default::default()
        };

        let mut diags = Diagnostics::default();
        let status = probe
            .converge(
                &mut diags,
                "db-1",
                &wait,
                Duration::from_secs(10),
                &[],
                &CancellationToken::new(),
                AttributePath::new("create_wait").index(0),
            )
            .await;

        assert_eq!(status.as_deref(), Some("ACTIVE"));
        assert!(diags.errors.is_empty());
        assert_eq!(connect.commands(), vec!["show", "show"]);
        assert_eq!(connect.env_of(0, "ID").as_deref(), Some("db-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn converge_reports_unexpected_status() {
        let connect = ConnectionScript::default().on("show", 0, "ERROR\n");
        let refresh = StateRefresh {
            cmd: string("show"),
            ..Default::default()
        };
        let env = Vec::new();
        let probe = Probe {
            connect: &connect,
            refresh: &refresh,
            env: &env,
        };
        let wait = StateWait {
            pending: Value::Value(vec![string("BUILD")]),
            target: Value::Value(vec![string("ACTIVE")]),
            ..Default::default()
        };

        let mut diags = Diagnostics::default();
        let status = probe
            .converge(
                &mut diags,
                "db-1",
                &wait,
                Duration::from_secs(10),
                &[],
                &CancellationToken::new(),
                AttributePath::new("create_wait").index(0),
            )
            .await;

        assert_eq!(status, None);
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn converge_reports_interruption() {
        let connect = ConnectionScript::default().on("show", 0, "BUILD\n");
        let refresh = StateRefresh {
            cmd: string("show"),
            ..Default::default()
        };
        let env = Vec::new();
        let probe = Probe {
            connect: &connect,
            refresh: &refresh,
            env: &env,
        };
        let wait = StateWait {
            pending: Value::Value(vec![string("BUILD")]),
            target: Value::Value(vec![string("ACTIVE")]),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut diags = Diagnostics::default();
        let status = probe
            .converge(
                &mut diags,
                "db-1",
                &wait,
                Duration::from_secs(10),
                &[],
                &cancel,
                AttributePath::new("create_wait").index(0),
            )
            .await;

        assert_eq!(status, None);
        assert_eq!(diags.errors.len(), 1);
        assert_eq!(diags.errors[0].summary, "Wait for `db-1` interrupted");
    }

    #[tokio::test(start_paused = true)]
    async fn run_cmd_retries_listed_exit_codes() {
        let connect = ConnectionScript::default()
            .on("attach", 75, "")
            .on("attach", 0, "done\n");
        let cmd = StateCmd {
            cmd: string("attach"),
            retry_exit_codes: Value::Value(vec![Value::Value(75)]),
            env: Value::Value(BTreeMap::new()),
            ..Default::default()
        };

        let res = run_cmd(
            &connect,
            "vol-1",
            &cmd,
            &[],
            Duration::from_secs(60),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(res.status, 0);
        assert_eq!(connect.commands().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn run_cmd_keeps_other_failures() {
        let connect = ConnectionScript::default().on("attach", 1, "");
        let cmd = StateCmd {
            cmd: string("attach"),
            retry_exit_codes: Value::Value(vec![Value::Value(75)]),
            ..Default::default()
        };

        let res = run_cmd(
            &connect,
            "vol-1",
            &cmd,
            &[],
            Duration::from_secs(60),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(res.status, 1);
        assert_eq!(connect.commands().len(), 1);
    }
}
