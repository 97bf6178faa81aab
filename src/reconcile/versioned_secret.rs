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

//! Read side of versioned secrets: immutable `<name>-v<N>` snapshots of a
//! logical secret, of which pod templates should always use the newest.

use crate::context::{self, Context};
use crate::types::v1alpha1::annotations;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;
use kube::api::ListParams;
use std::collections::BTreeMap;
use tracing::debug;

/// Splits `<name>-v<N>` into its logical name and version.
pub fn split_versioned_name(name: &str) -> Option<(&str, i32)> {
    let (base, version) = name.rsplit_once("-v")?;
    if base.is_empty() {
        return None;
    }
    version.parse().ok().map(|v| (base, v))
}

pub fn versioned_name(base: &str, version: i32) -> String {
    format!("{base}-v{version}")
}

#[derive(Debug, Default)]
pub struct VersionedSecretStore {
    secrets: BTreeMap<String, BTreeMap<i32, corev1::Secret>>,
}

impl VersionedSecretStore {
    pub fn from_secrets(secrets: impl IntoIterator<Item = corev1::Secret>) -> Self {
        let mut store = Self::default();
        for secret in secrets {
            let is_versioned = secret
                .labels()
                .get(annotations::SECRET_KIND)
                .is_some_and(|kind| kind == annotations::SECRET_KIND_VERSIONED);
            if !is_versioned {
                continue;
            }

            let name = secret.name_any();
            let Some((base, version)) = split_versioned_name(&name) else {
                continue;
            };

            store
                .secrets
                .entry(base.to_owned())
                .or_default()
                .insert(version, secret);
        }
        store
    }

    pub async fn load(ctx: &Context, namespace: &str) -> Result<Self, context::Error> {
        let selector = format!(
            "{}={}",
            annotations::SECRET_KIND,
            annotations::SECRET_KIND_VERSIONED
        );
        let secrets = ctx
            .list::<corev1::Secret>(namespace, &ListParams::default().labels(&selector))
            .await?;
        Ok(Self::from_secrets(secrets))
    }

    pub fn latest_version(&self, base: &str) -> Option<i32> {
        self.secrets.get(base)?.keys().next_back().copied()
    }

    pub fn latest(&self, base: &str) -> Option<&corev1::Secret> {
        self.secrets.get(base)?.values().next_back()
    }

    pub fn get(&self, base: &str, version: i32) -> Option<&corev1::Secret> {
        self.secrets.get(base)?.get(&version)
    }

    /// The newest name for a reference to any version of a known secret.
    fn latest_reference(&self, reference: &str) -> Option<String> {
        let (base, _) = split_versioned_name(reference)?;
        let latest = self.latest_version(base)?;
        let name = versioned_name(base, latest);
        (name != reference).then_some(name)
    }

    fn rewrite(&self, reference: &mut String) -> bool {
        match self.latest_reference(reference) {
            Some(latest) => {
                debug!("rewriting secret reference {} to {}", reference, latest);
                *reference = latest;
                true
            }
            None => false,
        }
    }

    /// Points every secret volume and env reference at the newest version.
    pub fn rewrite_references(&self, pod_spec: &mut corev1::PodSpec) -> bool {
        let mut changed = false;

        for volume in pod_spec.volumes.iter_mut().flatten() {
            if let Some(name) = volume.secret.as_mut().and_then(|s| s.secret_name.as_mut()) {
                changed |= self.rewrite(name);
            }
        }

        for container in pod_spec
            .containers
            .iter_mut()
            .chain(pod_spec.init_containers.iter_mut().flatten())
        {
            for env in container.env.iter_mut().flatten() {
                if let Some(key_ref) = env
                    .value_from
                    .as_mut()
                    .and_then(|v| v.secret_key_ref.as_mut())
                {
                    changed |= self.rewrite(&mut key_ref.name);
                }
            }

            for source in container.env_from.iter_mut().flatten() {
                if let Some(secret_ref) = source.secret_ref.as_mut() {
                    changed |= self.rewrite(&mut secret_ref.name);
                }
            }
        }

        changed
    }
}
