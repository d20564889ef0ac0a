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

use tf_provider::value::{Value, ValueMap, ValueString};
use tf_provider::Diagnostics;

use crate::utils::WithNormalize;

use super::state::{DataSourceState, ResourceState};

impl<'a> WithNormalize for ResourceState<'a> {
    fn normalize(&mut self, _diags: &mut Diagnostics) {
        if self.id.is_null() {
            self.id = Value::Unknown;
        }
        if self.inputs.is_null() {
            self.inputs = Value::Value(Default::default());
        }
        if self.read.is_null() {
            self.read = Value::Value(Default::default());
        }
        if self.state.is_unknown() || self.state.is_null() {
            self.state = unknown_outputs(&self.read);
        }
    }
}

impl<'a> WithNormalize for DataSourceState<'a> {
    fn normalize(&mut self, _diags: &mut Diagnostics) {
        if self.inputs.is_null() {
            self.inputs = Value::Value(Default::default());
        }
        if self.read.is_null() {
            self.read = Value::Value(Default::default());
        }
        self.outputs = unknown_outputs(&self.read);
        self.status = Value::Unknown;
    }
}

impl<'a> ResourceState<'a> {
    /// Replace every value still unknown by null, once no command can give it a value
    pub(super) fn settle(&mut self) {
        if self.id.is_unknown() {
            self.id = Value::Null;
        }
        if self.status.is_unknown() {
            self.status = Value::Null;
        }
        if let Value::Value(outputs) = &mut self.state {
            for value in outputs.values_mut() {
                if value.is_unknown() {
                    *value = Value::Null;
                }
            }
        } else {
            self.state = Value::Value(Default::default());
        }
    }
}

/// One unknown output per `read` block, forcing all of them to be read
pub(super) fn unknown_outputs<'a, R>(reads: &ValueMap<'a, R>) -> ValueMap<'a, ValueString<'a>> {
    Value::Value(
        reads
            .iter()
            .flatten()
            .map(|(name, _)| (name.clone(), Value::Unknown))
            .collect(),
    )
}
