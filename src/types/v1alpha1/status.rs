// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
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

pub mod state;

use kube::KubeSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, KubeSchema)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// RFC 3339 timestamp of the last status change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconcile: Option<String>,

    /// Version number to readiness of that version.
    #[serde(default)]
    pub versions: BTreeMap<i32, bool>,
}

impl Status {
    /// JSON merge patch turning `self` into `next`. A merge patch only drops
    /// keys set to null, so versions missing from `next` are nulled.
    pub fn merge_patch(&self, next: &Status) -> Value {
        let mut versions = Map::new();
        for version in self.versions.keys() {
            if !next.versions.contains_key(version) {
                versions.insert(version.to_string(), Value::Null);
            }
        }
        for (version, ready) in &next.versions {
            versions.insert(version.to_string(), Value::Bool(*ready));
        }

        json!({
            "lastReconcile": next.last_reconcile,
            "versions": versions,
        })
    }
}
