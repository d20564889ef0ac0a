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
use std::time::Duration;

use tf_provider::value::{ValueMap, ValueString};

use crate::context::ProviderContext;

mod converge;
mod data_source;
mod normalize;
mod read;
mod resource;
mod state;
mod validate;

pub use data_source::CmdDataSource;
pub use resource::CmdResource;

/// Time allowed to an operation without a `timeouts` entry
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Environment shared by every command of an operation: provider settings first,
/// then the prefixed maps, then the identifier of the object
fn operation_env<'a>(
    context: &'a ProviderContext,
    envs: &[(&'a ValueMap<'a, ValueString<'a>>, &'a str)],
    id: Option<&'a str>,
) -> Vec<(Cow<'a, str>, Cow<'a, str>)> {
    let mut env = context.env();
    env.extend(prepare_envs(envs));
    if let Some(id) = id {
        env.push((Cow::from("ID"), Cow::from(id)));
    }
    env
}

fn prepare_envs<'a>(
    envs: &[(&'a ValueMap<'a, ValueString<'a>>, &'a str)],
) -> Vec<(Cow<'a, str>, Cow<'a, str>)> {
    envs.iter()
        .flat_map(|(env, prefix)| {
            env.iter().flatten().filter_map(|(k, v)| {
                Some((
                    Cow::Owned(format!("{}{}", *prefix, k)),
                    Cow::Borrowed(v.as_deref_option()?),
                ))
            })
        })
        .collect()
}

fn with_env<'a>(
    base_env: &'a [(Cow<'a, str>, Cow<'a, str>)],
    extra_env: &'a ValueMap<'a, ValueString<'a>>,
) -> impl Iterator<Item = (&'a Cow<'a, str>, &'a Cow<'a, str>)> {
    base_env.iter().map(|(k, v)| (k, v)).chain(
        extra_env
            .iter()
            .flatten()
            .filter_map(|(k, v)| Some((k, v.as_ref_option()?))),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tf_provider::value::Value;

    use super::*;

    #[test]
    fn operation_env_order() {
        let context = ProviderContext {
            region: Some("RegionOne".to_owned()),
            ..Default::default()
        };
        let inputs: ValueMap<ValueString> = Value::Value(BTreeMap::from([
            (Cow::from("flavor"), Value::Value(Cow::from("m1.small"))),
            (Cow::from("ignored"), Value::Null),
        ]));
        let env = operation_env(&context, &[(&inputs, "INPUT_")], Some("db-1"));

        let env: Vec<(&str, &str)> = env.iter().map(|(k, v)| (k.as_ref(), v.as_ref())).collect();
        assert_eq!(
            env,
            vec![
                ("CLOUD_REGION", "RegionOne"),
                ("INPUT_flavor", "m1.small"),
                ("ID", "db-1"),
            ]
        );
    }

    #[test]
    fn command_env_comes_last() {
        let base = vec![(Cow::from("ID"), Cow::from("db-1"))];
        let extra: ValueMap<ValueString> = Value::Value(BTreeMap::from([(
            Cow::from("OS_CLOUD"),
            Value::Value(Cow::from("devstack")),
        )]));

        let env: Vec<(&str, &str)> = with_env(&base, &extra)
            .map(|(k, v)| (k.as_ref(), v.as_ref()))
            .collect();
        assert_eq!(env, vec![("ID", "db-1"), ("OS_CLOUD", "devstack")]);
    }
}
