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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tf_provider::map;
use tf_provider::schema::{
    Attribute, AttributeConstraint, AttributeType, Block, Description, NestedBlock, Schema,
};
use tf_provider::value::{self, Value, ValueBool, ValueList, ValueMap, ValueNumber, ValueString};

use crate::utils::{WithCmd, WithEnv, WithRead, WithSchema};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCmd<'a> {
    #[serde(borrow = "'a")]
    pub cmd: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub dir: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub env: ValueMap<'a, ValueString<'a>>,
    pub retry_exit_codes: ValueList<ValueNumber>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRead<'a> {
    #[serde(borrow = "'a")]
    pub cmd: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub dir: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub env: ValueMap<'a, ValueString<'a>>,
    pub strip_trailing_newline: ValueBool,
    pub faillible: ValueBool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRefresh<'a> {
    #[serde(borrow = "'a")]
    pub cmd: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub dir: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub env: ValueMap<'a, ValueString<'a>>,
    pub not_found_exit_code: ValueNumber,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateWait<'a> {
    #[serde(borrow = "'a")]
    pub pending: ValueList<ValueString<'a>>,
    #[serde(borrow = "'a")]
    pub target: ValueList<ValueString<'a>>,
    #[serde(borrow = "'a")]
    pub delay: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub poll_interval: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub min_interval: ValueString<'a>,
    pub not_found_checks: ValueNumber,
    pub continuous_target_occurrence: ValueNumber,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTimeouts<'a> {
    #[serde(borrow = "'a")]
    pub create: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub update: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub delete: ValueString<'a>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState<'a> {
    #[serde(borrow = "'a")]
    pub id: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub inputs: ValueMap<'a, ValueString<'a>>,
    #[serde(borrow = "'a")]
    pub state: ValueMap<'a, ValueString<'a>>,
    #[serde(borrow = "'a")]
    pub status: ValueString<'a>,
    pub command_concurrency: ValueNumber,
    #[serde(borrow = "'a")]
    pub read: ValueMap<'a, Value<StateRead<'a>>>,
    #[serde(with = "value::serde_as_vec")]
    #[serde(borrow = "'a")]
    pub create: Value<StateCmd<'a>>,
    #[serde(with = "value::serde_as_vec")]
    #[serde(borrow = "'a")]
    pub update: Value<StateCmd<'a>>,
    #[serde(with = "value::serde_as_vec")]
    #[serde(borrow = "'a")]
    pub destroy: Value<StateCmd<'a>>,
    #[serde(with = "value::serde_as_vec")]
    #[serde(borrow = "'a")]
    pub refresh: Value<StateRefresh<'a>>,
    #[serde(with = "value::serde_as_vec")]
    #[serde(borrow = "'a")]
    pub create_wait: Value<StateWait<'a>>,
    #[serde(with = "value::serde_as_vec")]
    #[serde(borrow = "'a")]
    pub update_wait: Value<StateWait<'a>>,
    #[serde(with = "value::serde_as_vec")]
    #[serde(borrow = "'a")]
    pub destroy_wait: Value<StateWait<'a>>,
    #[serde(with = "value::serde_as_vec")]
    #[serde(borrow = "'a")]
    pub timeouts: Value<StateTimeouts<'a>>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceState<'a> {
    #[serde(borrow = "'a")]
    pub inputs: ValueMap<'a, ValueString<'a>>,
    #[serde(borrow = "'a")]
    pub outputs: ValueMap<'a, ValueString<'a>>,
    #[serde(borrow = "'a")]
    pub status: ValueString<'a>,
    #[serde(borrow = "'a")]
    pub timeout: ValueString<'a>,
    pub command_concurrency: ValueNumber,
    #[serde(borrow = "'a")]
    pub read: ValueMap<'a, Value<StateRead<'a>>>,
    #[serde(with = "value::serde_as_vec")]
    #[serde(borrow = "'a")]
    pub refresh: Value<StateRefresh<'a>>,
    #[serde(with = "value::serde_as_vec")]
    #[serde(borrow = "'a")]
    pub wait: Value<StateWait<'a>>,
}

impl<'a> WithCmd for StateCmd<'a> {
    fn cmd(&self) -> &str {
        self.cmd.as_str()
    }
    fn dir(&self) -> &str {
        self.dir.as_str()
    }
}

impl<'a> WithEnv for StateCmd<'a> {
    type Env = ValueMap<'a, ValueString<'a>>;

    fn env(&self) -> &Self::Env {
        &self.env
    }
}

impl<'a> WithCmd for StateRead<'a> {
    fn cmd(&self) -> &str {
        self.cmd.as_str()
    }
    fn dir(&self) -> &str {
        self.dir.as_str()
    }
}

impl<'a> WithEnv for StateRead<'a> {
    type Env = ValueMap<'a, ValueString<'a>>;

    fn env(&self) -> &Self::Env {
        &self.env
    }
}

impl<'a> WithRead for StateRead<'a> {
    fn strip_trailing_newline(&self) -> bool {
        self.strip_trailing_newline.unwrap_or(true)
    }
    fn faillible(&self) -> bool {
        self.faillible.unwrap_or(false)
    }
}

impl<'a> WithCmd for StateRefresh<'a> {
    fn cmd(&self) -> &str {
        self.cmd.as_str()
    }
    fn dir(&self) -> &str {
        self.dir.as_str()
    }
}

impl<'a> WithEnv for StateRefresh<'a> {
    type Env = ValueMap<'a, ValueString<'a>>;

    fn env(&self) -> &Self::Env {
        &self.env
    }
}

fn attribute(
    attr_type: AttributeType,
    constraint: AttributeConstraint,
    description: &str,
) -> Attribute {
    Attribute {
        attr_type,
        description: Description::plain(description),
        constraint,
        ..Default::default()
    }
}

fn cmd_attributes(what: &str) -> HashMap<String, Attribute> {
    map! {
        "cmd" => attribute(
            AttributeType::String,
            AttributeConstraint::Required,
            &format!("Command to {what}"),
        ),
        "dir" => attribute(
            AttributeType::String,
            AttributeConstraint::Optional,
            "Directory where the command is executed",
        ),
        "env" => attribute(
            AttributeType::Map(AttributeType::String.into()),
            AttributeConstraint::Optional,
            "Extra environment variables given to the command",
        ),
    }
}

fn cmd_block(what: &str) -> NestedBlock {
    let mut attributes = cmd_attributes(what);
    attributes.insert(
        "retry_exit_codes".to_owned(),
        attribute(
            AttributeType::List(AttributeType::Number.into()),
            AttributeConstraint::Optional,
            "Exit codes meaning the command should be attempted again",
        ),
    );
    NestedBlock::Optional(Block {
        attributes,
        description: Description::plain(format!("Command to {what}")),
        ..Default::default()
    })
}

fn read_block() -> NestedBlock {
    let mut attributes = cmd_attributes("read the output");
    attributes.insert(
        "strip_trailing_newline".to_owned(),
        attribute(
            AttributeType::Bool,
            AttributeConstraint::Optional,
            "Remove the trailing newline of the output (default: true)",
        ),
    );
    attributes.insert(
        "faillible".to_owned(),
        attribute(
            AttributeType::Bool,
            AttributeConstraint::Optional,
            "Report a failure of the command as a warning instead of an error",
        ),
    );
    NestedBlock::Map(Block {
        attributes,
        description: Description::plain("Commands reading the outputs of the object"),
        ..Default::default()
    })
}

fn refresh_block() -> NestedBlock {
    let mut attributes = cmd_attributes("print the current status of the object");
    attributes.insert(
        "not_found_exit_code".to_owned(),
        attribute(
            AttributeType::Number,
            AttributeConstraint::Optional,
            "Exit code meaning the object does not exist",
        ),
    );
    NestedBlock::Optional(Block {
        attributes,
        description: Description::plain(
            "Command printing the status of the object on its first line of output",
        ),
        ..Default::default()
    })
}

fn wait_block(what: &str) -> NestedBlock {
    let states = |description| {
        attribute(
            AttributeType::List(AttributeType::String.into()),
            AttributeConstraint::Optional,
            description,
        )
    };
    let duration = |description| {
        attribute(
            AttributeType::String,
            AttributeConstraint::Optional,
            description,
        )
    };
    NestedBlock::Optional(Block {
        attributes: map! {
            "pending" => states("Statuses meaning the operation is still in progress"),
            "target" => states("Statuses meaning the operation succeeded"),
            "delay" => duration("Time to wait before the first refresh"),
            "poll_interval" => duration("Fixed time between two refreshes"),
            "min_interval" => duration("Minimal time between two refreshes when backing off"),
            "not_found_checks" => attribute(
                AttributeType::Number,
                AttributeConstraint::Optional,
                "Number of times the object may be missing before failing",
            ),
            "continuous_target_occurrence" => attribute(
                AttributeType::Number,
                AttributeConstraint::Optional,
                "Number of consecutive target statuses required",
            ),
        },
        description: Description::plain(format!("Wait for the object to converge {what}")),
        ..Default::default()
    })
}

impl<'a> WithSchema for ResourceState<'a> {
    fn schema() -> Schema {
        let duration = |description| {
            attribute(
                AttributeType::String,
                AttributeConstraint::Optional,
                description,
            )
        };
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "id" => attribute(
                        AttributeType::String,
                        AttributeConstraint::Computed,
                        "Identifier of the object",
                    ),
                    "inputs" => attribute(
                        AttributeType::Map(AttributeType::String.into()),
                        AttributeConstraint::Optional,
                        "Inputs given to the commands as INPUT_* variables",
                    ),
                    "state" => attribute(
                        AttributeType::Map(AttributeType::String.into()),
                        AttributeConstraint::Computed,
                        "Outputs of the read commands",
                    ),
                    "status" => attribute(
                        AttributeType::String,
                        AttributeConstraint::Computed,
                        "Last observed status of the object",
                    ),
                    "command_concurrency" => attribute(
                        AttributeType::Number,
                        AttributeConstraint::Optional,
                        "Maximal number of read commands run concurrently (default: 4)",
                    ),
                },
                blocks: map! {
                    "read" => read_block(),
                    "create" => cmd_block("create the object"),
                    "update" => cmd_block("update the object in place"),
                    "destroy" => cmd_block("destroy the object"),
                    "refresh" => refresh_block(),
                    "create_wait" => wait_block("after creation"),
                    "update_wait" => wait_block("after an update"),
                    "destroy_wait" => wait_block("after destruction"),
                    "timeouts" => NestedBlock::Optional(Block {
                        attributes: map! {
                            "create" => duration("Time allowed to create the object (default: 20m)"),
                            "update" => duration("Time allowed to update the object (default: 20m)"),
                            "delete" => duration("Time allowed to destroy the object (default: 20m)"),
                        },
                        description: Description::plain("Operation timeouts"),
                        ..Default::default()
                    }),
                },
                description: Description::plain(
                    "Cloud object managed by commands, converging on its asynchronous status",
                ),
                ..Default::default()
            },
        }
    }
}

impl<'a> WithSchema for DataSourceState<'a> {
    fn schema() -> Schema {
        Schema {
            version: 1,
            block: Block {
                version: 1,
                attributes: map! {
                    "inputs" => attribute(
                        AttributeType::Map(AttributeType::String.into()),
                        AttributeConstraint::Optional,
                        "Inputs given to the commands as INPUT_* variables",
                    ),
                    "outputs" => attribute(
                        AttributeType::Map(AttributeType::String.into()),
                        AttributeConstraint::Computed,
                        "Outputs of the read commands",
                    ),
                    "status" => attribute(
                        AttributeType::String,
                        AttributeConstraint::Computed,
                        "Observed status of the object",
                    ),
                    "timeout" => attribute(
                        AttributeType::String,
                        AttributeConstraint::Optional,
                        "Time allowed for the object to converge (default: 20m)",
                    ),
                    "command_concurrency" => attribute(
                        AttributeType::Number,
                        AttributeConstraint::Optional,
                        "Maximal number of read commands run concurrently (default: 4)",
                    ),
                },
                blocks: map! {
                    "read" => read_block(),
                    "refresh" => refresh_block(),
                    "wait" => wait_block("before reading"),
                },
                description: Description::plain("Read a cloud object once it has converged"),
                ..Default::default()
            },
        }
    }
}
