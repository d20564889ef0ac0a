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

use anyhow::{Context, Result};
use async_process::{Command, Stdio};
use async_trait::async_trait;
use tracing::debug;

use super::{Connection, ExecutionResult};

/// Run commands on the machine running Terraform, through `sh -c`
#[derive(Debug, Default, Clone)]
pub struct ConnectionLocal {}

#[async_trait]
impl Connection for ConnectionLocal {
    async fn execute<'b, I, K, V>(&self, cmd: &str, dir: &str, env: I) -> Result<ExecutionResult>
    where
        I: IntoIterator<Item = (&'b K, &'b V)> + Send + Sync + 'b,
        I::IntoIter: Send + Sync + 'b,
        K: AsRef<str> + Send + Sync + 'b,
        V: AsRef<str> + Send + Sync + 'b,
    {
        let mut command = Command::new("sh");
        if !dir.is_empty() {
            command.current_dir(dir);
        }
        command
            .arg("-c")
            .arg(cmd)
            .envs(env.into_iter().map(|(k, v)| (k.as_ref(), v.as_ref())))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(event = "connection.execute", cmd, dir);
        let output = command
            .output()
            .await
            .with_context(|| format!("failed to spawn `{cmd}`"))?;

        Ok(ExecutionResult {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
