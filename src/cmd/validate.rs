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

use async_trait::async_trait;
use tf_provider::value::{Value, ValueList, ValueMap, ValueNumber, ValueString};
use tf_provider::{AttributePath, Diagnostics};

use crate::utils::{parse_duration, WithValidate};
use crate::wait::DELETED;

use super::state::{
    DataSourceState, ResourceState, StateCmd, StateRead, StateRefresh, StateTimeouts, StateWait,
};

fn validate_cmd(diags: &mut Diagnostics, cmd: &ValueString, attr_path: AttributePath) {
    if let Value::Value(cmd) = cmd {
        if cmd.trim().is_empty() {
            diags.error_short("`cmd` should not be empty", attr_path.attribute("cmd"));
        }
    }
}

fn validate_duration(diags: &mut Diagnostics, duration: &ValueString, attr_path: AttributePath) {
    if let Value::Value(duration) = duration {
        if let Err(err) = parse_duration(duration) {
            diags.error("Invalid duration", format!("{err:#}"), attr_path);
        }
    }
}

fn validate_concurrency(diags: &mut Diagnostics, concurrency: &ValueNumber) {
    if let Value::Value(concurrency) = concurrency {
        if *concurrency < 1 {
            diags.error_short(
                "`command_concurrency` must be at least 1",
                AttributePath::new("command_concurrency"),
            );
        }
    }
}

fn validate_reads(diags: &mut Diagnostics, reads: &ValueMap<Value<StateRead>>) {
    for (name, read) in reads.iter().flatten() {
        if let Value::Value(read) = read {
            validate_cmd(
                diags,
                &read.cmd,
                AttributePath::new("read").key(name.to_string()),
            );
        }
    }
}

fn fully_known(states: &ValueList<ValueString>) -> bool {
    match states {
        Value::Value(states) => states.iter().all(|state| !state.is_unknown()),
        Value::Null => true,
        Value::Unknown => false,
    }
}

/// Check one wait block: it needs a `refresh` command and consistent states
fn validate_wait(
    diags: &mut Diagnostics,
    name: &str,
    wait: &Value<StateWait>,
    refresh: &Value<StateRefresh>,
    default_target: &[&str],
) {
    let Value::Value(wait) = wait else {
        return;
    };
    let attr_path = AttributePath::new(name.to_owned()).index(0);
    if refresh.is_null() {
        diags.error(
            format!("`{name}` requires a `refresh` block"),
            "The status of the object is given by the `refresh` command.",
            attr_path.clone(),
        );
    }

    for (field, duration) in [
        ("delay", &wait.delay),
        ("poll_interval", &wait.poll_interval),
        ("min_interval", &wait.min_interval),
    ] {
        validate_duration(diags, duration, attr_path.clone().attribute(field));
    }

    if !fully_known(&wait.pending) || !fully_known(&wait.target) {
        return;
    }
    let checked = wait
        .spec(Duration::ZERO, default_target)
        .map_err(|err| format!("{err:#}"))
        .and_then(|spec| spec.validate(name).map_err(|err| err.to_string()));
    if let Err(reason) = checked {
        diags.error("Invalid wait", reason, attr_path);
    }
}

fn validate_timeouts(diags: &mut Diagnostics, timeouts: &Value<StateTimeouts>) {
    let Value::Value(timeouts) = timeouts else {
        return;
    };
    let attr_path = AttributePath::new("timeouts").index(0);
    for (name, timeout) in [
        ("create", &timeouts.create),
        ("update", &timeouts.update),
        ("delete", &timeouts.delete),
    ] {
        validate_duration(diags, timeout, attr_path.clone().attribute(name));
    }
}

#[async_trait]
impl<'a> WithValidate for ResourceState<'a> {
    async fn validate(&self, diags: &mut Diagnostics, _attr_path: AttributePath) {
        let cmds: [(&str, &Value<StateCmd>); 3] = [
            ("create", &self.create),
            ("update", &self.update),
            ("destroy", &self.destroy),
        ];
        for (name, cmd) in cmds {
            if let Value::Value(cmd) = cmd {
                validate_cmd(diags, &cmd.cmd, AttributePath::new(name.to_owned()).index(0));
                for code in cmd.retry_exit_codes.iter().flatten() {
                    if matches!(code, Value::Value(0)) {
                        diags.error_short(
                            "A successful exit code cannot be retried",
                            AttributePath::new(name.to_owned()).index(0).attribute("retry_exit_codes"),
                        );
                    }
                }
            }
        }
        if let Value::Value(refresh) = &self.refresh {
            validate_cmd(diags, &refresh.cmd, AttributePath::new("refresh").index(0));
        }
        validate_reads(diags, &self.read);
        validate_concurrency(diags, &self.command_concurrency);

        validate_wait(diags, "create_wait", &self.create_wait, &self.refresh, &[]);
        validate_wait(diags, "update_wait", &self.update_wait, &self.refresh, &[]);
        validate_wait(
            diags,
            "destroy_wait",
            &self.destroy_wait,
            &self.refresh,
            &[DELETED],
        );
        if matches!(self.update_wait, Value::Value(_)) && self.update.is_null() {
            diags.warning(
                "`update_wait` without `update`",
                "Changing the inputs replaces the object, so `update_wait` is never used.",
                AttributePath::new("update_wait").index(0),
            );
        }
        validate_timeouts(diags, &self.timeouts);
    }
}

#[async_trait]
impl<'a> WithValidate for DataSourceState<'a> {
    async fn validate(&self, diags: &mut Diagnostics, _attr_path: AttributePath) {
        if let Value::Value(refresh) = &self.refresh {
            validate_cmd(diags, &refresh.cmd, AttributePath::new("refresh").index(0));
        }
        validate_reads(diags, &self.read);
        validate_concurrency(diags, &self.command_concurrency);
        validate_wait(diags, "wait", &self.wait, &self.refresh, &[]);
        validate_duration(diags, &self.timeout, AttributePath::new("timeout"));
    }
}
