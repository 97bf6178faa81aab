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

use super::workloads::{inject_zone, zone_metadata};
use super::{ExtendedStatefulSet, Zone};
use crate::types;
use crate::types::v1alpha1::{annotations, rollout};
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::ResourceExt;
use std::collections::BTreeMap;

const VOLUME_MANAGEMENT_CONTAINER: &str = "volume-management";

/// Whether `sts` is a disposable volume-management StatefulSet.
pub fn is_volume_management(sts: &appsv1::StatefulSet) -> bool {
    sts.labels()
        .get(annotations::VOLUME_MANAGEMENT)
        .is_some_and(|v| v == "true")
}

impl ExtendedStatefulSet {
    /// Builds the StatefulSet whose only purpose is to get the claim templates
    /// bound before the real pods are scheduled.
    ///
    /// The StatefulSet controller names its PVCs `<claim>-<sts>-<ordinal>`,
    /// which is exactly the claim reference the versioned pods mount.
    pub fn new_volume_management_statefulset(
        &self,
        zone: Option<Zone<'_>>,
    ) -> Result<appsv1::StatefulSet, types::error::Error> {
        let name = self.volume_management_name(zone);
        let replicas = self.desired_replicas();
        let template = &self.spec.template;

        let mut labels = template.labels().clone();
        labels.insert(annotations::VOLUME_MANAGEMENT.to_owned(), "true".to_owned());
        let mut sts_annotations = template.annotations().clone();
        rollout::strip_rollout_annotations(&mut sts_annotations);
        zone_metadata(self, zone, &mut labels, &mut sts_annotations)?;

        let mut spec = template.spec.clone().unwrap_or_default();
        spec.replicas = Some(replicas);
        spec.update_strategy = None;
        spec.selector
            .match_labels
            .get_or_insert_with(BTreeMap::new)
            .insert(annotations::STATEFULSET_NAME.to_owned(), name.clone());

        let claims = spec.volume_claim_templates.take().unwrap_or_default();
        let image = spec
            .template
            .spec
            .as_ref()
            .and_then(|s| s.containers.first())
            .and_then(|c| c.image.clone());

        let pod_metadata = spec.template.metadata.get_or_insert_with(Default::default);
        let pod_labels = pod_metadata.labels.get_or_insert_with(BTreeMap::new);
        pod_labels.insert(annotations::STATEFULSET_NAME.to_owned(), name.clone());
        pod_labels.insert(annotations::VOLUME_MANAGEMENT.to_owned(), "true".to_owned());

        let pod_spec = spec.template.spec.get_or_insert_with(Default::default);
        pod_spec.init_containers = None;
        pod_spec.containers = vec![corev1::Container {
            name: VOLUME_MANAGEMENT_CONTAINER.to_owned(),
            image,
            command: Some(vec!["/bin/sh".to_owned(), "-c".to_owned()]),
            args: Some(vec!["sleep infinity".to_owned()]),
            volume_mounts: Some(
                claims
                    .iter()
                    .map(|claim| corev1::VolumeMount {
                        name: claim.name_any(),
                        mount_path: format!("/mnt/{}", claim.name_any()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }];

        inject_zone(&mut spec.template, self.zone_node_label(), zone, replicas);

        spec.volume_claim_templates = Some(claims);

        Ok(appsv1::StatefulSet {
            metadata: metav1::ObjectMeta {
                name: Some(name),
                namespace: self.namespace().ok(),
                owner_references: Some(vec![self.new_owner_ref()]),
                labels: Some(labels),
                annotations: Some(sts_annotations),
                ..Default::default()
            },
            spec: Some(spec),
            status: None,
        })
    }

    pub fn new_volume_management_statefulsets(
        &self,
    ) -> Result<Vec<appsv1::StatefulSet>, types::error::Error> {
        self.zones()
            .into_iter()
            .map(|zone| self.new_volume_management_statefulset(zone))
            .collect()
    }

    /// Names of every PVC the versioned pods will mount, per zone and ordinal.
    pub fn desired_claim_names(&self) -> Vec<String> {
        let claims: Vec<String> = self
            .spec
            .template
            .spec
            .as_ref()
            .and_then(|s| s.volume_claim_templates.as_ref())
            .map(|templates| templates.iter().map(|c| c.name_any()).collect())
            .unwrap_or_default();

        let replicas = self.desired_replicas();
        let mut names = Vec::new();
        for zone in self.zones() {
            for claim in &claims {
                for ordinal in 0..replicas {
                    names.push(self.claim_name(claim, zone, ordinal));
                }
            }
        }
        names
    }
}
