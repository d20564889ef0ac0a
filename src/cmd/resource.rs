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
use std::collections::BTreeSet;
use std::fmt::Debug;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use tokio::time::Instant;
use tracing::info;

use tf_provider::value::{Value, ValueEmpty, ValueMap, ValueString};
use tf_provider::{schema::Schema, AttributePath, Diagnostics, Resource};

use crate::connection::Connection;
use crate::context::ProviderHandle;
use crate::utils::{WithNormalize, WithSchema, WithValidate};
use crate::wait::DELETED;

use super::converge::{resolve_timeouts, run_cmd, Probe};
use super::normalize::unknown_outputs;
use super::operation_env;
use super::state::{ResourceState, StateCmd};

#[derive(Debug, Default)]
pub struct CmdResource<C: Connection> {
    pub(super) connect: C,
    pub(super) handle: ProviderHandle,
}

impl<C: Connection> CmdResource<C> {
    pub fn new(connect: C, handle: ProviderHandle) -> Self {
        Self { connect, handle }
    }

    /// Run a lifecycle command, reporting its failures in `diags`
    #[allow(clippy::too_many_arguments)]
    async fn run<'b>(
        &self,
        diags: &mut Diagnostics,
        name: &str,
        id: &str,
        cmd: &StateCmd<'_>,
        env: &[(Cow<'b, str>, Cow<'b, str>)],
        timeout: std::time::Duration,
        cancel: &tokio_util::sync::CancellationToken,
    ) -> Option<String> {
        let attr_path = AttributePath::new(name.to_owned()).index(0).attribute("cmd");
        match run_cmd(&self.connect, id, cmd, env, timeout, cancel).await {
            Ok(res) if res.status == 0 => {
                if !res.stderr.is_empty() {
                    diags.warning(
                        format!("`{name}` succeeded but stderr was not empty"),
                        res.stderr,
                        attr_path,
                    );
                }
                Some(res.stdout)
            }
            Ok(res) => {
                diags.error(
                    format!("`{name}` failed with status code: {}", res.status),
                    res.stderr,
                    attr_path,
                );
                None
            }
            Err(err) => {
                diags.error(format!("Failed to {name} the object"), format!("{err:#}"), attr_path);
                None
            }
        }
    }
}

#[async_trait]
impl<C> Resource for CmdResource<C>
where
    C: Connection,
    C: Debug,
{
    type State<'a> = ResourceState<'a>;
    type PrivateState<'a> = ValueEmpty;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(ResourceState::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        config.validate(diags, Default::default()).await;

        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let context = self.handle.context(diags)?;
        let id = state.id.as_str();
        let env = operation_env(
            context,
            &[(&state.inputs, "INPUT_"), (&state.state, "STATE_")],
            Some(id),
        );

        let mut next = state.clone();
        if let Value::Value(refresh) = &state.refresh {
            let probe = Probe {
                connect: &self.connect,
                refresh,
                env: &env,
            };
            match probe.status(diags, id).await.as_deref() {
                // Removed outside of Terraform: dropping it from the state plans its creation
                Some(DELETED) => {
                    info!(event = "resource.vanished", id);
                    return None;
                }
                Some(status) => next.status = Value::Value(Cow::Owned(status.to_owned())),
                None => (),
            }
        }

        next.state = unknown_outputs(&next.read);
        next.read(diags, &self.connect, &env, true).await;
        next.settle();

        Some((next, private_state))
    }

    async fn plan_create<'a>(
        &self,
        diags: &mut Diagnostics,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let mut state = proposed_state;
        state.id = ValueString::Unknown;
        state.status = match state.refresh {
            Value::Value(_) => ValueString::Unknown,
            _ => ValueString::Null,
        };
        state.state = Value::Unknown;
        state.normalize(diags);

        Some((state, Default::default()))
    }

    async fn plan_update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        proposed_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(
        Self::State<'a>,
        Self::PrivateState<'a>,
        Vec<tf_provider::AttributePath>,
    )> {
        let value_map_default = Default::default();
        let mut state = proposed_state.clone();
        state.normalize(diags);

        let previous_state = prior_state.state.as_ref().unwrap_or(&value_map_default);
        let previous_reads_default = Default::default();
        let previous_reads = prior_state.read.as_ref().unwrap_or(&previous_reads_default);

        match &state.read {
            Value::Value(reads) => {
                // Outputs whose `read` changed are read again
                state.state = Value::Value(
                    reads
                        .iter()
                        .map(|(name, read)| {
                            (
                                name.clone(),
                                match (previous_reads.get(name), previous_state.get(name)) {
                                    (_, None) => Value::Unknown,
                                    (None, Some(val)) => val.clone(),
                                    (Some(previous_read), Some(val)) => {
                                        if previous_read == read {
                                            val.clone()
                                        } else {
                                            Value::Unknown
                                        }
                                    }
                                },
                            )
                        })
                        .collect(),
                );
            }
            Value::Null => {
                state.read = Value::Value(Default::default());
                state.state = Value::Value(Default::default());
            }
            Value::Unknown => {
                state.state = Value::Unknown;
            }
        }

        // Imported objects have no inputs yet: they adopt the configured ones
        let imported = prior_state.inputs.is_null();
        let modified = if imported {
            Default::default()
        } else {
            find_modified(&prior_state.inputs, &proposed_state.inputs)
        };

        let mut trigger_replace = Vec::new();
        if !modified.is_empty() && state.update.is_null() {
            trigger_replace = modified
                .into_iter()
                .map(|name| AttributePath::new("inputs").key(name.to_owned()))
                .collect();
        } else if imported || !modified.is_empty() {
            if let Value::Value(outputs) = &mut state.state {
                for value in outputs.values_mut() {
                    *value = Value::Unknown;
                }
            }
            if matches!(state.refresh, Value::Value(_)) {
                state.status = Value::Unknown;
            }
        }

        Some((state, prior_private_state, trigger_replace))
    }

    async fn plan_destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        prior_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::PrivateState<'a>> {
        if prior_state.inputs.is_null() && prior_state.destroy.is_null() {
            diags.root_warning(
                "Destroy ignored on newly imported resource",
                "The resource has just been imported and need to be applied once in order to know how it should be destroyed.\nAs it has not been applied since import, it will be removed from state without calling the destroy command."
            );
        }
        Some(prior_private_state)
    }

    async fn create<'a>(
        &self,
        diags: &mut Diagnostics,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let context = self.handle.context(diags)?;
        let timeouts = resolve_timeouts(diags, &planned_state.timeouts)?;
        let cancel = self.handle.cancellation();
        let deadline = Instant::now() + timeouts.create;

        let mut state = planned_state.clone();
        state.normalize(diags);

        let mut id = None;
        if let Value::Value(create) = &planned_state.create {
            let env = operation_env(context, &[(&planned_state.inputs, "INPUT_")], None);
            let stdout = self
                .run(diags, "create", "create", create, &env, timeouts.create, &cancel)
                .await?;
            id = stdout
                .lines()
                .next()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned);
        }
        let id = id.unwrap_or_else(random_id);
        state.id = Value::Value(Cow::Owned(id.clone()));
        info!(event = "resource.created", id = %id);

        let env = operation_env(context, &[(&planned_state.inputs, "INPUT_")], Some(&id));
        if let Value::Value(refresh) = &planned_state.refresh {
            let probe = Probe {
                connect: &self.connect,
                refresh,
                env: &env,
            };
            let status = if let Value::Value(wait) = &planned_state.create_wait {
                probe
                    .converge(
                        diags,
                        &id,
                        wait,
                        deadline.saturating_duration_since(Instant::now()),
                        &[],
                        &cancel,
                        AttributePath::new("create_wait").index(0),
                    )
                    .await
            } else {
                probe.status(diags, &id).await
            };
            match status {
                Some(status) => state.status = Value::Value(Cow::Owned(status)),
                // The object exists: keep it in the state so Terraform taints it
                None if matches!(planned_state.create_wait, Value::Value(_)) => {
                    state.settle();
                    return Some((state, private_state));
                }
                None => (),
            }
        }

        state.read(diags, &self.connect, &env, false).await;
        state.settle();

        Some((state, private_state))
    }

    async fn update<'a>(
        &self,
        diags: &mut Diagnostics,
        prior_state: Self::State<'a>,
        planned_state: Self::State<'a>,
        _config_state: Self::State<'a>,
        private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let context = self.handle.context(diags)?;
        let timeouts = resolve_timeouts(diags, &planned_state.timeouts)?;
        let cancel = self.handle.cancellation();
        let deadline = Instant::now() + timeouts.update;

        let mut state = planned_state.clone();
        state.normalize(diags);
        let id = prior_state.id.as_str();
        state.id = prior_state.id.clone();

        let env = operation_env(
            context,
            &[
                (&planned_state.inputs, "INPUT_"),
                (&prior_state.inputs, "PREVIOUS_"),
                (&prior_state.state, "STATE_"),
            ],
            Some(id),
        );

        let modified = !prior_state.inputs.is_null()
            && !find_modified(&prior_state.inputs, &planned_state.inputs).is_empty();
        if modified {
            if let Value::Value(update) = &planned_state.update {
                self.run(diags, "update", id, update, &env, timeouts.update, &cancel)
                    .await?;
                info!(event = "resource.updated", id);
            }
        }

        if let (true, Value::Value(refresh)) = (state.status.is_unknown(), &planned_state.refresh) {
            let probe = Probe {
                connect: &self.connect,
                refresh,
                env: &env,
            };
            let status = match (&planned_state.update_wait, modified) {
                (Value::Value(wait), true) => {
                    probe
                        .converge(
                            diags,
                            id,
                            wait,
                            deadline.saturating_duration_since(Instant::now()),
                            &[],
                            &cancel,
                            AttributePath::new("update_wait").index(0),
                        )
                        .await
                }
                _ => probe.status(diags, id).await,
            };
            if let Some(status) = status {
                state.status = Value::Value(Cow::Owned(status));
            }
        }

        if diags.errors.is_empty() {
            state.read(diags, &self.connect, &env, false).await;
        }
        state.settle();

        Some((state, private_state))
    }

    async fn destroy<'a>(
        &self,
        diags: &mut Diagnostics,
        state: Self::State<'a>,
        _planned_private_state: Self::PrivateState<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<()> {
        let context = self.handle.context(diags)?;
        let timeouts = resolve_timeouts(diags, &state.timeouts)?;
        let cancel = self.handle.cancellation();
        let deadline = Instant::now() + timeouts.delete;

        let id = state.id.as_str();
        let env = operation_env(
            context,
            &[(&state.inputs, "INPUT_"), (&state.state, "STATE_")],
            Some(id),
        );

        if let Value::Value(destroy) = &state.destroy {
            self.run(diags, "destroy", id, destroy, &env, timeouts.delete, &cancel)
                .await?;
        }

        if let (Value::Value(wait), Value::Value(refresh)) = (&state.destroy_wait, &state.refresh) {
            let probe = Probe {
                connect: &self.connect,
                refresh,
                env: &env,
            };
            probe
                .converge(
                    diags,
                    id,
                    wait,
                    deadline.saturating_duration_since(Instant::now()),
                    &[DELETED],
                    &cancel,
                    AttributePath::new("destroy_wait").index(0),
                )
                .await?;
        }

        info!(event = "resource.destroyed", id);
        Some(())
    }

    async fn import<'a>(
        &self,
        diags: &mut Diagnostics,
        id: String,
    ) -> Option<(Self::State<'a>, Self::PrivateState<'a>)> {
        let id = id.trim();
        if id.is_empty() {
            diags.root_error(
                "Invalid import id",
                "The import id must be the identifier of the object.",
            );
            return None;
        }

        let state = ResourceState {
            id: Value::Value(Cow::Owned(id.to_owned())),
            inputs: Value::Null,
            state: Value::Value(Default::default()),
            status: Value::Null,
            read: Value::Value(Default::default()),
            ..Default::default()
        };
        info!(event = "resource.imported", id);
        Some((state, Default::default()))
    }
}

/// Names of the inputs differing between the state and the plan
fn find_modified<'b>(
    state: &'b ValueMap<'_, ValueString<'_>>,
    plan: &'b ValueMap<'_, ValueString<'_>>,
) -> BTreeSet<&'b str> {
    match (state, plan) {
        (Value::Value(state), Value::Value(plan)) => {
            let mut modified = BTreeSet::new();

            for (k, x) in state {
                if plan.get(k) != Some(x) {
                    modified.insert(k.as_ref());
                }
            }
            for k in plan.keys() {
                if !state.contains_key(k) {
                    modified.insert(k.as_ref());
                }
            }

            modified
        }
        (_, Value::Value(plan)) => plan.keys().map(|k| k.as_ref()).collect(),
        (Value::Value(state), _) => state.keys().map(|k| k.as_ref()).collect(),
        _ => Default::default(),
    }
}

fn random_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(30)
        .map(char::from)
        .collect()
}
