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

use crate::utils::DisplayJoinable;

/// Terminal failures of a convergence wait.
///
/// The poller never retries on its own behalf: every variant ends the wait and
/// the caller decides whether the whole operation should be attempted again.
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("invalid wait for '{id}': {reason}")]
    InvalidSpec { id: String, reason: String },

    #[error("failed to refresh '{id}' after {elapsed:?}: {source:#}")]
    Refresh {
        id: String,
        last_status: Option<String>,
        elapsed: Duration,
        #[source]
        source: anyhow::Error,
    },

    #[error(
        "unexpected state '{status}' for '{id}', wanted target '{}'",
        .expected.iter().join_with("', '")
    )]
    UnexpectedState {
        id: String,
        status: String,
        expected: Vec<String>,
        elapsed: Duration,
    },

    #[error("couldn't find '{id}' ({retries} retries)")]
    NotFound {
        id: String,
        retries: u32,
        elapsed: Duration,
    },

    #[error(
        "timeout while waiting for '{id}' to become '{}' (last state: '{}', timeout: {timeout:?})",
        .expected.iter().join_with("', '"),
        .last_status.as_deref().unwrap_or("")
    )]
    Timeout {
        id: String,
        last_status: Option<String>,
        expected: Vec<String>,
        timeout: Duration,
    },

    #[error(
        "wait for '{id}' cancelled after {elapsed:?} (last state: '{}')",
        .last_status.as_deref().unwrap_or("")
    )]
    Cancelled {
        id: String,
        last_status: Option<String>,
        elapsed: Duration,
    },

    #[error("operation on '{id}' failed after {attempts} attempts: {source:#}")]
    Failed {
        id: String,
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: anyhow::Error,
    },

    #[error("giving up on '{id}' after {attempts} attempts: {source:#}")]
    Exhausted {
        id: String,
        attempts: u32,
        elapsed: Duration,
        #[source]
        source: anyhow::Error,
    },
}

impl WaitError {
    /// Identifier of the object the wait was about
    pub fn id(&self) -> &str {
        match self {
            WaitError::InvalidSpec { id, .. }
            | WaitError::Refresh { id, .. }
            | WaitError::UnexpectedState { id, .. }
            | WaitError::NotFound { id, .. }
            | WaitError::Timeout { id, .. }
            | WaitError::Cancelled { id, .. }
            | WaitError::Failed { id, .. }
            | WaitError::Exhausted { id, .. } => id,
        }
    }

    /// Last status observed before the failure, if any
    pub fn last_status(&self) -> Option<&str> {
        match self {
            WaitError::Refresh { last_status, .. }
            | WaitError::Timeout { last_status, .. }
            | WaitError::Cancelled { last_status, .. } => last_status.as_deref(),
            WaitError::UnexpectedState { status, .. } => Some(status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_states() {
        let err = WaitError::Timeout {
            id: "db-1".to_owned(),
            last_status: Some("BUILD".to_owned()),
            expected: vec!["ACTIVE".to_owned(), "READY".to_owned()],
            timeout: Duration::from_secs(5),
        };
        assert_eq!(
            err.to_string(),
            "timeout while waiting for 'db-1' to become 'ACTIVE', 'READY' (last state: 'BUILD', timeout: 5s)"
        );
        assert_eq!(err.id(), "db-1");
        assert_eq!(err.last_status(), Some("BUILD"));
    }

    #[test]
    fn unexpected_state_message() {
        let err = WaitError::UnexpectedState {
            id: "fw".to_owned(),
            status: "ERROR".to_owned(),
            expected: vec!["ACTIVE".to_owned()],
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(
            err.to_string(),
            "unexpected state 'ERROR' for 'fw', wanted target 'ACTIVE'"
        );
        assert_eq!(err.last_status(), Some("ERROR"));
    }

    #[test]
    fn refresh_error_keeps_source() {
        let err = WaitError::Refresh {
            id: "share".to_owned(),
            last_status: None,
            elapsed: Duration::ZERO,
            source: anyhow::anyhow!("connection refused"),
        };
        assert!(err.to_string().ends_with("connection refused"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn failed_operation_message() {
        let err = WaitError::Failed {
            id: "db-1".to_owned(),
            attempts: 1,
            elapsed: Duration::ZERO,
            source: anyhow::anyhow!("quota exceeded"),
        };
        assert_eq!(
            err.to_string(),
            "operation on 'db-1' failed after 1 attempts: quota exceeded"
        );
        assert_eq!(err.last_status(), None);
    }
}
