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

use futures::{stream, StreamExt};
use tf_provider::value::{Value, ValueMap, ValueNumber, ValueString};
use tf_provider::{AttributePath, Diagnostics};
use tracing::debug;

use crate::{
    connection::Connection,
    utils::{WithEnv, WithRead},
};

use super::{
    state::{DataSourceState, ResourceState},
    with_env,
};

const DEFAULT_CONCURRENCY: i64 = 4;

impl<'a> ResourceState<'a> {
    /// Run the `read` command of every unknown output
    pub(super) async fn read<'b, C: Connection>(
        &mut self,
        diags: &mut Diagnostics,
        connect: &C,
        env: &[(Cow<'b, str>, Cow<'b, str>)],
        faillible: bool,
    ) -> Option<()> {
        let target = ReadTarget {
            attribute: "state",
            outputs: &mut self.state,
            faillible,
        };
        read_all(diags, connect, &self.read, target, env, self.command_concurrency).await
    }
}

impl<'a> DataSourceState<'a> {
    pub(super) async fn read<'b, C: Connection>(
        &mut self,
        diags: &mut Diagnostics,
        connect: &C,
        env: &[(Cow<'b, str>, Cow<'b, str>)],
    ) -> Option<()> {
        let target = ReadTarget {
            attribute: "outputs",
            outputs: &mut self.outputs,
            faillible: false,
        };
        read_all(diags, connect, &self.read, target, env, self.command_concurrency).await
    }
}

/// Outputs being read, and how their failures are reported
struct ReadTarget<'o, 'a> {
    attribute: &'static str,
    outputs: &'o mut ValueMap<'a, ValueString<'a>>,
    faillible: bool,
}

async fn read_all<'a, 'b, C, R>(
    diags: &mut Diagnostics,
    connect: &C,
    reads: &ValueMap<'a, Value<R>>,
    target: ReadTarget<'_, 'a>,
    env: &[(Cow<'b, str>, Cow<'b, str>)],
    concurrency: ValueNumber,
) -> Option<()>
where
    C: Connection,
    R: WithRead + WithEnv<Env = ValueMap<'a, ValueString<'a>>>,
{
    let ReadTarget {
        attribute,
        outputs,
        faillible,
    } = target;
    let outputs = outputs.as_mut_option()?;

    let reads_default = Default::default();
    let reads = reads.as_ref().unwrap_or(&reads_default);

    let concurrency = concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1) as usize;

    let mut pending = Vec::new();
    for (name, value) in outputs.iter_mut().filter(|(_, value)| value.is_unknown()) {
        let Some(Value::Value(read)) = reads.get(name) else {
            diags.error(
                "Unknown output has no `read` block associated",
                format!("The output `{attribute}.{name}` is unknown, and there is no known `read[\"{name}\"]` block to give it a value."),
                AttributePath::new(attribute).key(name.to_string()),
            );
            continue;
        };
        pending.push(async move {
            let result = connect
                .execute(read.cmd(), read.dir(), with_env(env, read.env()))
                .await;
            (name, value, read, result)
        });
    }

    let results: Vec<_> = stream::iter(pending)
        .buffer_unordered(concurrency)
        .collect()
        .await;

    for (name, value, read, result) in results {
        let attr_path = AttributePath::new("read")
            .key(name.to_string())
            .attribute("cmd");
        *value = Value::Null;
        let report: fn(&mut Diagnostics, String, String, AttributePath) =
            if faillible || read.faillible() {
                Diagnostics::warning
            } else {
                Diagnostics::error
            };

        let res = match result {
            Ok(res) => res,
            Err(err) => {
                report(
                    diags,
                    "Failed to read the object".to_string(),
                    format!("{err:#}"),
                    attr_path,
                );
                continue;
            }
        };
        debug!(event = "read.completed", output = %name, status = res.status);
        if res.status != 0 {
            report(
                diags,
                format!("`read` failed with status code: {}", res.status),
                res.stderr,
                attr_path,
            );
            continue;
        }
        if !res.stderr.is_empty() {
            diags.warning(
                "`read` succeeded but stderr was not empty",
                res.stderr,
                attr_path,
            );
        }

        let mut stdout = res.stdout;
        if read.strip_trailing_newline() && stdout.ends_with('\n') {
            stdout.pop();
        }
        *value = Value::Value(Cow::Owned(stdout));
    }

    Some(())
}
