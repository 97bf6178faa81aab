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

use crate::context::{self, Context};
use crate::types::v1alpha1::annotations;
use k8s_openapi::api::core::v1 as corev1;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// ConfigMaps and Secrets a pod spec depends on.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConfigReferences {
    pub config_maps: BTreeSet<String>,
    pub secrets: BTreeSet<String>,
}

pub fn referenced_configs(pod_spec: &corev1::PodSpec) -> ConfigReferences {
    let mut refs = ConfigReferences::default();

    for volume in pod_spec.volumes.iter().flatten() {
        if let Some(cm) = &volume.config_map {
            refs.config_maps.insert(cm.name.clone());
        }
        if let Some(name) = volume.secret.as_ref().and_then(|s| s.secret_name.as_ref()) {
            refs.secrets.insert(name.clone());
        }
    }

    for container in pod_spec
        .containers
        .iter()
        .chain(pod_spec.init_containers.iter().flatten())
    {
        for source in container.env.iter().flatten().filter_map(|e| e.value_from.as_ref()) {
            if let Some(cm) = &source.config_map_key_ref {
                refs.config_maps.insert(cm.name.clone());
            }
            if let Some(secret) = &source.secret_key_ref {
                refs.secrets.insert(secret.name.clone());
            }
        }

        for source in container.env_from.iter().flatten() {
            if let Some(cm) = &source.config_map_ref {
                refs.config_maps.insert(cm.name.clone());
            }
            if let Some(secret) = &source.secret_ref {
                refs.secrets.insert(secret.name.clone());
            }
        }
    }

    refs
}

#[derive(Serialize)]
struct ConfigSnapshot<'a> {
    config_maps: BTreeMap<String, Option<&'a BTreeMap<String, String>>>,
    secrets: BTreeMap<String, Option<&'a BTreeMap<String, k8s_openapi::ByteString>>>,
}

/// Hex SHA-256 over the data of the given configs, keyed by name.
pub fn config_signature(
    config_maps: &[corev1::ConfigMap],
    secrets: &[corev1::Secret],
) -> Result<String, serde_json::Error> {
    let snapshot = ConfigSnapshot {
        config_maps: config_maps
            .iter()
            .map(|cm| (cm.metadata.name.clone().unwrap_or_default(), cm.data.as_ref()))
            .collect(),
        secrets: secrets
            .iter()
            .map(|s| (s.metadata.name.clone().unwrap_or_default(), s.data.as_ref()))
            .collect(),
    };

    Ok(hex::encode(Sha256::digest(serde_json::to_vec(&snapshot)?)))
}

/// Fetches every referenced config (missing ones are skipped) and stamps their
/// combined signature on the pod template.
pub async fn stamp_config_signature(
    ctx: &Context,
    namespace: &str,
    pod_template: &mut corev1::PodTemplateSpec,
) -> Result<(), context::Error> {
    let Some(pod_spec) = pod_template.spec.as_ref() else {
        return Ok(());
    };
    let refs = referenced_configs(pod_spec);

    let mut config_maps = Vec::new();
    for name in &refs.config_maps {
        if let Some(cm) = ctx.get_opt::<corev1::ConfigMap>(name, namespace).await? {
            config_maps.push(cm);
        }
    }

    let mut secrets = Vec::new();
    for name in &refs.secrets {
        if let Some(secret) = ctx.get_opt::<corev1::Secret>(name, namespace).await? {
            secrets.push(secret);
        }
    }

    let signature = config_signature(&config_maps, &secrets)?;
    pod_template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(annotations::CONFIG_SHA1.to_owned(), signature);

    Ok(())
}
