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

use super::{ExtendedStatefulSet, Zone};
use crate::types;
use crate::types::error::{InvalidAnnotationSnafu, MissingAnnotationSnafu};
use crate::types::v1alpha1::{annotations, rollout};
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::ResourceExt;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Reads the version annotation every owned StatefulSet must carry.
pub fn statefulset_version(sts: &appsv1::StatefulSet) -> Result<i32, types::error::Error> {
    let name = sts.name_any();
    let raw = sts
        .annotations()
        .get(annotations::VERSION)
        .ok_or_else(|| {
            MissingAnnotationSnafu {
                name: name.clone(),
                key: annotations::VERSION,
            }
            .build()
        })?;

    raw.parse::<i32>().map_err(|_| {
        InvalidAnnotationSnafu {
            name,
            key: annotations::VERSION,
            value: raw.clone(),
        }
        .build()
    })
}

/// Hex SHA-256 over everything that shapes the generated StatefulSets.
pub fn template_signature(
    ests: &ExtendedStatefulSet,
    template: &appsv1::StatefulSet,
) -> Result<String, types::error::Error> {
    let payload = serde_json::to_vec(&serde_json::json!({
        "template": template,
        "zones": ests.spec.zones,
        "zoneNodeLabel": ests.zone_node_label(),
    }))?;

    Ok(hex::encode(Sha256::digest(&payload)))
}

/// Version the generated StatefulSets should carry, given the newest existing one.
pub fn desired_version(
    actual: Option<&appsv1::StatefulSet>,
    signature: &str,
) -> Result<i32, types::error::Error> {
    let Some(actual) = actual else {
        return Ok(1);
    };

    let version = statefulset_version(actual)?;
    let unchanged = actual
        .annotations()
        .get(annotations::STATEFULSET_SHA1)
        .is_some_and(|sha| sha == signature);

    Ok(if unchanged { version } else { version + 1 })
}

fn set_env(container: &mut corev1::Container, name: &str, value: String) {
    let env = container.env.get_or_insert_with(Vec::new);
    env.retain(|e| e.name != name);
    env.push(corev1::EnvVar {
        name: name.to_owned(),
        value: Some(value),
        ..Default::default()
    });
}

/// Pins a pod template to `zone` and exposes the zone to every container.
///
/// The node selector requirement is added to every existing term because
/// terms are ORed by the scheduler.
pub(super) fn inject_zone(
    template: &mut corev1::PodTemplateSpec,
    zone_node_label: &str,
    zone: Option<Zone<'_>>,
    replicas: i32,
) {
    let metadata = template.metadata.get_or_insert_with(Default::default);
    let pod_spec = template.spec.get_or_insert_with(Default::default);

    if let Some(zone) = zone {
        let labels = metadata.labels.get_or_insert_with(BTreeMap::new);
        labels.insert(annotations::AZ_INDEX.to_owned(), zone.index.to_string());
        labels.insert(annotations::AZ_NAME.to_owned(), zone.name.to_owned());

        let pod_annotations = metadata.annotations.get_or_insert_with(BTreeMap::new);
        pod_annotations.insert(annotations::AZ_INDEX.to_owned(), zone.index.to_string());
        pod_annotations.insert(annotations::AZ_NAME.to_owned(), zone.name.to_owned());

        let requirement = corev1::NodeSelectorRequirement {
            key: zone_node_label.to_owned(),
            operator: "In".to_owned(),
            values: Some(vec![zone.name.to_owned()]),
        };

        let node_selector = pod_spec
            .affinity
            .get_or_insert_with(Default::default)
            .node_affinity
            .get_or_insert_with(Default::default)
            .required_during_scheduling_ignored_during_execution
            .get_or_insert_with(Default::default);

        if node_selector.node_selector_terms.is_empty() {
            node_selector
                .node_selector_terms
                .push(corev1::NodeSelectorTerm::default());
        }

        for term in node_selector.node_selector_terms.iter_mut() {
            term.match_expressions
                .get_or_insert_with(Vec::new)
                .push(requirement.clone());
        }
    }

    let az_index = zone.map(|z| z.index + 1).unwrap_or(1);
    for container in pod_spec
        .containers
        .iter_mut()
        .chain(pod_spec.init_containers.iter_mut().flatten())
    {
        if let Some(zone) = zone {
            set_env(container, "KUBE_AZ", zone.name.to_owned());
            set_env(container, "BOSH_AZ", zone.name.to_owned());
            set_env(container, "CF_OPERATOR_AZ", zone.name.to_owned());
        }
        set_env(container, "AZ_INDEX", az_index.to_string());
        set_env(container, "REPLICAS", replicas.to_string());
    }
}

/// Labels and annotations identifying the zone on the StatefulSet object itself.
pub(super) fn zone_metadata(
    ests: &ExtendedStatefulSet,
    zone: Option<Zone<'_>>,
    labels: &mut BTreeMap<String, String>,
    sts_annotations: &mut BTreeMap<String, String>,
) -> Result<(), types::error::Error> {
    labels.insert(annotations::QUARKS_STATEFULSET_NAME.to_owned(), ests.name());

    if !ests.spec.zones.is_empty() {
        sts_annotations.insert(
            annotations::ZONES.to_owned(),
            serde_json::to_string(&ests.spec.zones)?,
        );
    }

    if let Some(zone) = zone {
        labels.insert(annotations::AZ_INDEX.to_owned(), zone.index.to_string());
        labels.insert(annotations::AZ_NAME.to_owned(), zone.name.to_owned());
        sts_annotations.insert(annotations::AZ_INDEX.to_owned(), zone.index.to_string());
        sts_annotations.insert(annotations::AZ_NAME.to_owned(), zone.name.to_owned());
    }

    Ok(())
}

impl ExtendedStatefulSet {
    /// Generates the immutable StatefulSet for one zone slot of `version`.
    ///
    /// `template` is the prepared template (secret references rewritten, config
    /// hash stamped), not necessarily `spec.template` verbatim.
    pub fn new_versioned_statefulset(
        &self,
        template: &appsv1::StatefulSet,
        zone: Option<Zone<'_>>,
        version: i32,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<appsv1::StatefulSet, types::error::Error> {
        let name = self.versioned_statefulset_name(zone, version);
        let replicas = self.desired_replicas();

        let mut labels = template.labels().clone();
        let mut sts_annotations = template.annotations().clone();
        zone_metadata(self, zone, &mut labels, &mut sts_annotations)?;
        sts_annotations.insert(annotations::VERSION.to_owned(), version.to_string());
        sts_annotations.insert(annotations::STATEFULSET_SHA1.to_owned(), signature.to_owned());

        let mut spec = template.spec.clone().unwrap_or_default();
        spec.replicas = Some(replicas);

        spec.selector
            .match_labels
            .get_or_insert_with(BTreeMap::new)
            .insert(annotations::STATEFULSET_NAME.to_owned(), name.clone());

        let pod_metadata = spec.template.metadata.get_or_insert_with(Default::default);
        let pod_labels = pod_metadata.labels.get_or_insert_with(BTreeMap::new);
        pod_labels.insert(annotations::STATEFULSET_NAME.to_owned(), name.clone());
        pod_labels.insert(annotations::QUARKS_STATEFULSET_NAME.to_owned(), self.name());

        inject_zone(&mut spec.template, self.zone_node_label(), zone, replicas);

        // Claims are provisioned by the volume-management StatefulSet and
        // referenced directly, so the versioned copy must not carry templates.
        if let Some(claims) = spec.volume_claim_templates.take() {
            let pod_spec = spec.template.spec.get_or_insert_with(Default::default);
            let volumes = pod_spec.volumes.get_or_insert_with(Vec::new);

            for claim in claims {
                let claim_name = claim.name_any();
                volumes.retain(|v| v.name != claim_name);
                volumes.push(corev1::Volume {
                    name: claim_name.clone(),
                    persistent_volume_claim: Some(corev1::PersistentVolumeClaimVolumeSource {
                        claim_name: self.claim_reference_name(&claim_name, zone),
                        read_only: None,
                    }),
                    ..Default::default()
                });
            }
        }

        let mut sts = appsv1::StatefulSet {
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
        };

        if rollout::is_rollout_enabled(&sts) {
            rollout::configure_for_initial_rollout(&mut sts, now);
        }

        Ok(sts)
    }

    /// All StatefulSets (one per zone slot) making up `version`.
    pub fn new_versioned_statefulsets(
        &self,
        template: &appsv1::StatefulSet,
        version: i32,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<appsv1::StatefulSet>, types::error::Error> {
        self.zones()
            .into_iter()
            .map(|zone| self.new_versioned_statefulset(template, zone, version, signature, now))
            .collect()
    }
}
