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

use anyhow::Result;
use async_trait::async_trait;

pub mod local;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    /// First line of stdout, without surrounding whitespace
    pub fn first_line(&self) -> &str {
        self.stdout.lines().next().unwrap_or("").trim()
    }
}

#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// execute a command over the connection
    async fn execute<'b, I, K, V>(&self, cmd: &str, dir: &str, env: I) -> Result<ExecutionResult>
    where
        I: IntoIterator<Item = (&'b K, &'b V)> + Send + Sync + 'b,
        I::IntoIter: Send + Sync + 'b,
        K: AsRef<str> + Send + Sync + 'b,
        V: AsRef<str> + Send + Sync + 'b;
}

#[cfg(test)]
type Script = std::collections::HashMap<String, std::collections::VecDeque<ExecutionResult>>;

/// Connection replaying canned results, recording the commands it was given
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ConnectionScript {
    pub results: std::sync::Mutex<Script>,
    pub calls: std::sync::Mutex<Vec<(String, Vec<(String, String)>)>>,
}

#[cfg(test)]
impl ConnectionScript {
    pub fn on(self, cmd: &str, status: i32, stdout: &str) -> Self {
        self.results
            .lock()
            .unwrap()
            .entry(cmd.to_owned())
            .or_default()
            .push_back(ExecutionResult {
                status,
                stdout: stdout.to_owned(),
                stderr: String::new(),
            });
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(cmd, _)| cmd.clone())
            .collect()
    }

    pub fn env_of(&self, index: usize, key: &str) -> Option<String> {
        let calls = self.calls.lock().unwrap();
        calls[index]
            .1
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

#[cfg(test)]
#[async_trait]
impl Connection for ConnectionScript {
    async fn execute<'b, I, K, V>(&self, cmd: &str, _dir: &str, env: I) -> Result<ExecutionResult>
    where
        I: IntoIterator<Item = (&'b K, &'b V)> + Send + Sync + 'b,
        I::IntoIter: Send + Sync + 'b,
        K: AsRef<str> + Send + Sync + 'b,
        V: AsRef<str> + Send + Sync + 'b,
    {
        let env = env
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect();
        self.calls.lock().unwrap().push((cmd.to_owned(), env));

        let mut results = self.results.lock().unwrap();
        let queue = results
            .get_mut(cmd)
            .ok_or_else(|| anyhow::anyhow!("unexpected command `{cmd}`"))?;
        // The last result repeats once the queue is drained
        let result = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        result.ok_or_else(|| anyhow::anyhow!("no result for `{cmd}`"))
    }
}
