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

//! Convergence of asynchronously provisioned objects.
//!
//! A [`WaitSpec`] describes which statuses are still in progress and which ones
//! mean success; [`WaitSpec::wait`] polls a refresh callback until the object
//! converges. [`retry`] re-runs an operation failing with retryable errors.

mod backoff;
mod error;
mod poll;
mod retry;
mod spec;

pub use error::WaitError;
pub use poll::{Converged, Observation};
pub use retry::{retry, RetryError};
pub use spec::{WaitSpec, DEFAULT_NOT_FOUND_CHECKS, DELETED};
