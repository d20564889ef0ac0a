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

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use tf_provider::schema::{Attribute, AttributeConstraint, AttributeType};
use tf_provider::value::{ValueMap, ValueString};
use tf_provider::schema::{Block, Description, Schema};
use tf_provider::value::{Value, ValueEmpty};
use tf_provider::{map, AttributePath, Diagnostics, Provider};

use crate::{
    cmd::{CmdDataSource, CmdResource},
    connection::local::ConnectionLocal,
    context::{ProviderContext, ProviderHandle},
};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig<'a> {
    #[serde(borrow = "'a")]
    pub region: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub endpoint: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub token: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub env: ValueMap<'a, ValueString<'a>>,
}

impl<'a> ProviderConfig<'a> {
    fn context(&self) -> ProviderContext {
        let owned = |value: &ValueString| value.as_deref_option().map(str::to_owned);
        ProviderContext {
            region: owned(&self.region),
            endpoint: owned(&self.endpoint),
            token: owned(&self.token),
            env: self
                .env
                .iter()
                .flatten()
                .filter_map(|(k, v)| Some((k.to_string(), v.as_deref_option()?.to_owned())))
                .collect::<BTreeMap<_, _>>(),
        }
    }
}

/// Provider driving cloud objects through their command line client
#[derive(Debug, Default, Clone)]
pub struct CloudProvider {
    handle: ProviderHandle,
}

impl CloudProvider {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            handle: ProviderHandle::new(shutdown),
        }
    }
}

fn attribute(attr_type: AttributeType, description: &str, sensitive: bool) -> Attribute {
    Attribute {
        attr_type,
        description: Description::plain(description),
        constraint: AttributeConstraint::Optional,
        sensitive,
        ..Default::default()
    }
}

#[async_trait]
impl Provider for CloudProvider {
    type Config<'a> = ProviderConfig<'a>;
    type MetaState<'a> = ValueEmpty;

    fn schema(&self, _diags: &mut Diagnostics) -> Option<Schema> {
        Some(Schema {
            version: 1,
            block: Block {
                attributes: map! {
                    "region" => attribute(
                        AttributeType::String,
                        "Region given to the commands as CLOUD_REGION",
                        false,
                    ),
                    "endpoint" => attribute(
                        AttributeType::String,
                        "API endpoint given to the commands as CLOUD_ENDPOINT",
                        false,
                    ),
                    "token" => attribute(
                        AttributeType::String,
                        "Authentication token given to the commands as CLOUD_TOKEN",
                        true,
                    ),
                    "env" => attribute(
                        AttributeType::Map(AttributeType::String.into()),
                        "Environment variables given to every command",
                        false,
                    ),
                },
                description: Description::plain("cloudcmd"),
                ..Default::default()
            },
        })
    }

    async fn validate<'a>(&self, diags: &mut Diagnostics, config: Self::Config<'a>) -> Option<()> {
        if let Value::Value(endpoint) = &config.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                diags.error(
                    "Invalid endpoint",
                    format!("`{endpoint}` is not an http:// or https:// URL"),
                    AttributePath::new("endpoint"),
                );
            }
        }

        if diags.errors.is_empty() {
            Some(())
        } else {
            None
        }
    }

    async fn configure<'a>(
        &self,
        diags: &mut Diagnostics,
        terraform_version: String,
        config: Self::Config<'a>,
    ) -> Option<()> {
        let context = config.context();
        info!(
            event = "provider.configured",
            terraform_version = %terraform_version,
            region = context.region.as_deref(),
            endpoint = context.endpoint.as_deref(),
        );
        if self.handle.configure(context).is_err() {
            diags.root_error(
                "Provider is already configured",
                "The provider cannot be configured more than once.",
            );
            return None;
        }
        Some(())
    }

    fn get_resources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<std::collections::HashMap<String, Box<dyn tf_provider::DynamicResource>>>
    {
        Some(map! {
            "resource" => CmdResource::new(ConnectionLocal::default(), self.handle.clone()),
        })
    }

    fn get_data_sources(
        &self,
        _diags: &mut Diagnostics,
    ) -> Option<
        std::collections::HashMap<String, Box<dyn tf_provider::DynamicDataSource>>,
    > {
        Some(map! {
            "resource" => CmdDataSource::new(ConnectionLocal::default(), self.handle.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    #[tokio::test]
    async fn rejects_non_http_endpoint() {
        let provider = CloudProvider::default();
        let config = ProviderConfig {
            endpoint: Value::Value(Cow::from("ftp://cloud.example")),
            ..Default::default()
        };

        let mut diags = Diagnostics::default();
        assert_eq!(provider.validate(&mut diags, config).await, None);
        assert_eq!(diags.errors.len(), 1);
    }

    #[tokio::test]
    async fn configure_once() {
        let provider = CloudProvider::default();
        let config = ProviderConfig {
            region: Value::Value(Cow::from("RegionOne")),
            token: Value::Value(Cow::from("secret")),
            ..Default::default()
        };

        let mut diags = Diagnostics::default();
        assert_eq!(
            provider
                .configure(&mut diags, "1.9.0".to_owned(), config.clone())
                .await,
            Some(())
        );
        let context = provider.handle.context(&mut diags).unwrap();
        assert_eq!(context.region.as_deref(), Some("RegionOne"));
        assert_eq!(context.token.as_deref(), Some("secret"));

        assert_eq!(
            provider
                .configure(&mut diags, "1.9.0".to_owned(), config)
                .await,
            None
        );
        assert_eq!(diags.errors.len(), 1);
    }
}
