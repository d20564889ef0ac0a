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
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use tf_provider::Diagnostics;
use tokio_util::sync::CancellationToken;

/// Settings shared by every command run by the provider
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProviderContext {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl ProviderContext {
    /// Environment exposed to the commands of every resource
    pub fn env(&self) -> Vec<(Cow<'_, str>, Cow<'_, str>)> {
        [
            ("CLOUD_REGION", &self.region),
            ("CLOUD_ENDPOINT", &self.endpoint),
            ("CLOUD_TOKEN", &self.token),
        ]
        .into_iter()
        .filter_map(|(name, value)| Some((Cow::from(name), Cow::from(value.as_deref()?))))
        .chain(
            self.env
                .iter()
                .map(|(k, v)| (Cow::from(k.as_str()), Cow::from(v.as_str()))),
        )
        .collect()
    }
}

/// Handle given to resources and data sources at registration.
///
/// Terraform registers resources before configuring the provider, so the
/// context is filled later, once, by `configure`.
#[derive(Debug, Default, Clone)]
pub struct ProviderHandle {
    context: Arc<OnceLock<ProviderContext>>,
    shutdown: CancellationToken,
}

impl ProviderHandle {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            context: Default::default(),
            shutdown,
        }
    }

    /// Set the context; fails if the provider was already configured
    pub fn configure(&self, context: ProviderContext) -> Result<(), ProviderContext> {
        self.context.set(context)
    }

    /// Context of a configured provider, reporting an error otherwise
    pub fn context(&self, diags: &mut Diagnostics) -> Option<&ProviderContext> {
        let context = self.context.get();
        if context.is_none() {
            diags.root_error(
                "Provider is not configured",
                "The provider must be configured before resources can be managed.",
            );
        }
        context
    }

    /// Token cancelled when the provider is asked to stop
    pub fn cancellation(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_contains_set_values_only() {
        let context = ProviderContext {
            region: Some("RegionOne".to_owned()),
            endpoint: None,
            token: Some("secret".to_owned()),
            env: BTreeMap::from([("OS_CLOUD".to_owned(), "devstack".to_owned())]),
        };

        let env: Vec<(String, String)> = context
            .env()
            .into_iter()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            env,
            vec![
                ("CLOUD_REGION".to_owned(), "RegionOne".to_owned()),
                ("CLOUD_TOKEN".to_owned(), "secret".to_owned()),
                ("OS_CLOUD".to_owned(), "devstack".to_owned()),
            ]
        );
    }

    #[test]
    fn configure_only_once() {
        let handle = ProviderHandle::default();
        let mut diags = Diagnostics::default();
        assert!(handle.context(&mut diags).is_none());
        assert!(!diags.errors.is_empty());

        assert!(handle.configure(ProviderContext::default()).is_ok());
        assert!(handle.configure(ProviderContext::default()).is_err());

        let mut diags = Diagnostics::default();
        assert!(handle.context(&mut diags).is_some());
        assert!(diags.errors.is_empty());
    }

    #[test]
    fn cancellation_follows_shutdown() {
        let shutdown = CancellationToken::new();
        let handle = ProviderHandle::new(shutdown.clone());
        let token = handle.cancellation();
        assert!(!token.is_cancelled());
        shutdown.cancel();
        assert!(token.is_cancelled());
    }
}
