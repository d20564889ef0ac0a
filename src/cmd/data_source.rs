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
use std::fmt::Debug;

use async_trait::async_trait;
use tracing::debug;

use tf_provider::schema::Schema;
use tf_provider::value::{Value, ValueEmpty};
use tf_provider::{AttributePath, DataSource, Diagnostics};

use crate::connection::Connection;
use crate::context::ProviderHandle;
use crate::utils::{WithNormalize, WithSchema, WithValidate};

use super::converge::{parse_timeout, Probe};
use super::operation_env;
use super::state::DataSourceState;

#[derive(Debug, Default)]
pub struct CmdDataSource<C: Connection> {
    pub(super) connect: C,
    pub(super) handle: ProviderHandle,
}

impl<C: Connection> CmdDataSource<C> {
    pub fn new(connect: C, handle: ProviderHandle) -> Self {
        Self { connect, handle }
    }
}

#[async_trait]
impl<C> DataSource for CmdDataSource<C>
where
    C: Connection,
    C: Debug,
{
    type State<'a> = DataSourceState<'a>;
    type ProviderMetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(DataSourceState::schema())
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::State<'a>) -> Option<()> {
        config.validate(diags, AttributePath::default()).await;

        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn read<'a>(
        &self,
        diags: &mut Diagnostics,
        config: Self::State<'a>,
        _provider_meta_state: Self::ProviderMetaState<'a>,
    ) -> Option<Self::State<'a>> {
        let context = self.handle.context(diags)?;
        let timeout = match parse_timeout(&config.timeout) {
            Ok(timeout) => timeout,
            Err(err) => {
                diags.error("Invalid timeout", format!("{err:#}"), AttributePath::new("timeout"));
                return None;
            }
        };

        // The `id` input, when given, names the object in messages and commands
        let id = config
            .inputs
            .as_ref_option()
            .and_then(|inputs| inputs.get("id"))
            .and_then(|id| id.as_deref_option());
        let env = operation_env(context, &[(&config.inputs, "INPUT_")], id);
        let id = id.unwrap_or("data source");

        let mut state = config.clone();
        state.normalize(diags);

        if let Value::Value(refresh) = &config.refresh {
            let probe = Probe {
                connect: &self.connect,
                refresh,
                env: &env,
            };
            let status = if let Value::Value(wait) = &config.wait {
                let cancel = self.handle.cancellation();
                let status = probe
                    .converge(
                        diags,
                        id,
                        wait,
                        timeout,
                        &[],
                        &cancel,
                        AttributePath::new("wait").index(0),
                    )
                    .await?;
                Some(status)
            } else {
                probe.status(diags, id).await
            };
            debug!(event = "data_source.observed", id, status = status.as_deref());
            if let Some(status) = status {
                state.status = Value::Value(Cow::Owned(status));
            }
        }
        if state.status.is_unknown() {
            state.status = Value::Null;
        }

        state.read(diags, &self.connect, &env).await;

        Some(state)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tf_provider::value::ValueString;

    use super::*;
    use crate::cmd::state::{StateRead, StateRefresh, StateWait};
    use crate::connection::ConnectionScript;
    use crate::context::ProviderContext;

    fn string(s: &str) -> ValueString<'_> {
        Value::Value(Cow::from(s))
    }

    fn data_source(connect: ConnectionScript) -> CmdDataSource<ConnectionScript> {
        let handle = ProviderHandle::default();
        handle.configure(ProviderContext::default()).unwrap();
        CmdDataSource::new(connect, handle)
    }

    fn share() -> DataSourceState<'static> {
        DataSourceState {
            inputs: Value::Value(BTreeMap::from([(Cow::from("id"), string("share-1"))])),
            read: Value::Value(BTreeMap::from([(
                Cow::from("path"),
                Value::Value(StateRead {
                    cmd: string("get path"),
                    ..Default::default()
                }),
            )])),
            refresh: Value::Value(StateRefresh {
                cmd: string("show"),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_before_reading() {
        let data_source = data_source(
            ConnectionScript::default()
                .on("show", 0, "creating\n")
                .on("show", 0, "available\n")
                .on("get path", 0, "/exports/share-1\n"),
        );
        let mut config = share();
        config.wait = Value::Value(StateWait {
            pending: Value::Value(vec![string("creating")]),
            target: Value::Value(vec![string("available")]),
            poll_interval: string("2s"),
            ..Default::default()
        });

        let mut diags = Diagnostics::default();
        let state = data_source
            .read(&mut diags, config, Default::default())
            .await
            .unwrap();

        assert!(diags.errors.is_empty());
        assert_eq!(state.status, string("available"));
        assert_eq!(
            state.outputs.as_ref_option().unwrap()[&Cow::from("path")],
            string("/exports/share-1")
        );
        assert_eq!(data_source.connect.env_of(0, "ID").as_deref(), Some("share-1"));
    }

    #[tokio::test]
    async fn refreshes_once_without_wait() {
        let data_source = data_source(
            ConnectionScript::default()
                .on("show", 0, "creating\n")
                .on("get path", 0, "/exports/share-1\n"),
        );

        let mut diags = Diagnostics::default();
        let state = data_source
            .read(&mut diags, share(), Default::default())
            .await
            .unwrap();

        assert_eq!(state.status, string("creating"));
        assert_eq!(data_source.connect.commands(), vec!["show", "get path"]);
    }

    #[tokio::test]
    async fn no_id_without_id_input() {
        let data_source = data_source(
            ConnectionScript::default()
                .on("show", 0, "available\n")
                .on("get path", 0, "/exports\n"),
        );
        let mut config = share();
        config.inputs = Value::Value(BTreeMap::from([(Cow::from("name"), string("exports"))]));

        let mut diags = Diagnostics::default();
        let state = data_source
            .read(&mut diags, config, Default::default())
            .await
            .unwrap();

        assert_eq!(state.status, string("available"));
        assert_eq!(data_source.connect.env_of(0, "ID"), None);
        assert_eq!(
            data_source.connect.env_of(0, "INPUT_name").as_deref(),
            Some("exports")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_wait_reads_nothing() {
        let data_source = data_source(ConnectionScript::default().on("show", 0, "error\n"));
        let mut config = share();
        config.wait = Value::Value(StateWait {
            target: Value::Value(vec![string("available")]),
            ..Default::default()
        });

        let mut diags = Diagnostics::default();
        let state = data_source.read(&mut diags, config, Default::default()).await;

        assert!(state.is_none());
        assert_eq!(diags.errors.len(), 1);
        assert_eq!(data_source.connect.commands(), vec!["show"]);
    }
}
