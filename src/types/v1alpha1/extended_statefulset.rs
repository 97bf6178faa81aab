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

mod volume_management;
mod workloads;

pub use volume_management::is_volume_management;
pub use workloads::{desired_version, statefulset_version, template_signature};

use crate::types;
use crate::types::error::NoNamespaceSnafu;
use crate::types::v1alpha1::annotations;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::{CustomResource, KubeSchema, Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use snafu::OptionExt;

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, KubeSchema, Default)]
#[kube(
    group = "quarks.cloudfoundry.org",
    version = "v1alpha1",
    kind = "ExtendedStatefulSet",
    namespaced,
    status = "crate::types::v1alpha1::status::Status",
    shortname = "ests",
    plural = "extendedstatefulsets",
    singular = "extendedstatefulset",
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    crates(serde_json = "k8s_openapi::serde_json")
)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedStatefulSetSpec {
    /// Stamp a hash of all referenced ConfigMaps and Secrets on the pod template,
    /// so a config change produces a new StatefulSet version.
    #[serde(default)]
    pub update_on_config_change: bool,

    /// Node label that carries the availability zone name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone_node_label: Option<String>,

    /// One versioned StatefulSet is created per zone. Empty means zoneless.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub zones: Vec<String>,

    pub template: appsv1::StatefulSet,
}

/// Availability zone slot a versioned StatefulSet is pinned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Zone<'a> {
    pub index: usize,
    pub name: &'a str,
}

impl ExtendedStatefulSet {
    pub fn namespace(&self) -> Result<String, types::error::Error> {
        ResourceExt::namespace(self).context(NoNamespaceSnafu)
    }

    pub fn name(&self) -> String {
        ResourceExt::name_any(self)
    }

    /// a new owner reference for extended statefulset
    pub fn new_owner_ref(&self) -> metav1::OwnerReference {
        metav1::OwnerReference {
            api_version: Self::api_version(&()).to_string(),
            kind: Self::kind(&()).to_string(),
            name: self.name(),
            uid: self.meta().uid.clone().unwrap_or_default(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Whether `sts` is controlled by this resource.
    pub fn owns(&self, sts: &appsv1::StatefulSet) -> bool {
        let Some(uid) = self.meta().uid.as_deref() else {
            return false;
        };

        sts.owner_references()
            .iter()
            .any(|owner| owner.controller == Some(true) && owner.uid == uid)
    }

    pub fn zone_node_label(&self) -> &str {
        self.spec
            .zone_node_label
            .as_deref()
            .filter(|label| !label.is_empty())
            .unwrap_or(annotations::DEFAULT_ZONE_NODE_LABEL)
    }

    /// Zone slots to generate StatefulSets for; a single `None` when zoneless.
    pub fn zones(&self) -> Vec<Option<Zone<'_>>> {
        if self.spec.zones.is_empty() {
            return vec![None];
        }

        self.spec
            .zones
            .iter()
            .enumerate()
            .map(|(index, name)| Some(Zone { index, name }))
            .collect()
    }

    pub fn desired_replicas(&self) -> i32 {
        self.spec
            .template
            .spec
            .as_ref()
            .and_then(|spec| spec.replicas)
            .unwrap_or(1)
    }

    pub fn has_volume_claim_templates(&self) -> bool {
        self.spec
            .template
            .spec
            .as_ref()
            .and_then(|spec| spec.volume_claim_templates.as_ref())
            .is_some_and(|claims| !claims.is_empty())
    }

    fn zoned_name(&self, zone: Option<Zone<'_>>) -> String {
        match zone {
            Some(zone) => format!("{}-z{}", self.name(), zone.index),
            None => self.name(),
        }
    }

    /// `<parent>[-z<i>]-v<version>`
    pub fn versioned_statefulset_name(&self, zone: Option<Zone<'_>>, version: i32) -> String {
        format!("{}-v{}", self.zoned_name(zone), version)
    }

    /// `volumemanagement-<parent>[-z<i>]`
    pub fn volume_management_name(&self, zone: Option<Zone<'_>>) -> String {
        format!(
            "{}{}",
            annotations::VOLUME_MANAGEMENT_PREFIX,
            self.zoned_name(zone)
        )
    }

    /// Claim name referenced from the versioned pod template. The pod webhook
    /// appends the pod ordinal to reach the PVC created by the volume-management
    /// StatefulSet.
    pub fn claim_reference_name(&self, claim: &str, zone: Option<Zone<'_>>) -> String {
        format!("{}-{}", claim, self.volume_management_name(zone))
    }

    /// Name of the PVC the volume-management StatefulSet creates for `ordinal`.
    pub fn claim_name(&self, claim: &str, zone: Option<Zone<'_>>, ordinal: i32) -> String {
        format!("{}-{}", self.claim_reference_name(claim, zone), ordinal)
    }
}
