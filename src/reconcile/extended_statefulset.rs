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

use super::cleanup::{cleanup_versions, version_readiness};
use super::configs::{referenced_configs, stamp_config_signature};
use super::versioned_secret::{VersionedSecretStore, split_versioned_name};
use super::volume_management::provision_volumes;
use super::{Error, with_deadline};
use crate::context::{self, Context};
use crate::types;
use crate::types::v1alpha1::annotations;
use crate::types::v1alpha1::extended_statefulset::{
    ExtendedStatefulSet, desired_version, is_volume_management, statefulset_version,
    template_signature,
};
use crate::types::v1alpha1::rollout::spec_replicas;
use crate::types::v1alpha1::status::Status;
use chrono::Utc;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;
use kube::api::ListParams;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::runtime::reflector::{ObjectRef, Store};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const REQUEUE_WHILE_PENDING: Duration = Duration::from_secs(5);

/// Maps a pod event to the resource its StatefulSet was generated from.
pub fn owning_extended_statefulset(pod: &corev1::Pod) -> Option<ObjectRef<ExtendedStatefulSet>> {
    let name = pod.labels().get(annotations::QUARKS_STATEFULSET_NAME)?;
    let namespace = pod.namespace()?;
    Some(ObjectRef::new(name).within(&namespace))
}

/// Whether `ests` has to be reconciled when the named config changes: always
/// for a newer versioned secret it references, otherwise only when it
/// tracks config changes.
pub fn references_config(ests: &ExtendedStatefulSet, name: &str, versioned: bool) -> bool {
    let Some(pod_spec) = ests
        .spec
        .template
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
    else {
        return false;
    };
    let refs = referenced_configs(pod_spec);

    if versioned && let Some((base, _)) = split_versioned_name(name) {
        let same_base = |r: &String| split_versioned_name(r).is_some_and(|(b, _)| b == base);
        if refs.secrets.iter().any(same_base) {
            return true;
        }
    }

    ests.spec.update_on_config_change
        && (refs.config_maps.contains(name) || refs.secrets.contains(name))
}

/// Maps a ConfigMap or Secret event to every cached resource depending on it.
pub fn extended_statefulsets_for_config<K: ResourceExt>(
    store: &Store<ExtendedStatefulSet>,
    config: &K,
) -> Vec<ObjectRef<ExtendedStatefulSet>> {
    let name = config.name_any();
    let namespace = config.namespace();
    let versioned = config
        .labels()
        .get(annotations::SECRET_KIND)
        .is_some_and(|kind| kind == annotations::SECRET_KIND_VERSIONED);

    store
        .state()
        .iter()
        .filter(|ests| ests.namespace().ok() == namespace)
        .filter(|ests| references_config(ests, &name, versioned))
        .map(|ests| ObjectRef::from_obj(ests.as_ref()))
        .collect()
}

/// Owned, non volume-management StatefulSets sorted by version.
pub fn versioned_statefulsets(
    ests: &ExtendedStatefulSet,
    sets: Vec<appsv1::StatefulSet>,
) -> Result<Vec<appsv1::StatefulSet>, types::error::Error> {
    let mut owned = Vec::new();
    for sts in sets {
        if ests.owns(&sts) && !is_volume_management(&sts) {
            let version = statefulset_version(&sts)?;
            owned.push((version, sts));
        }
    }
    owned.sort_by_key(|(version, _)| *version);
    Ok(owned.into_iter().map(|(_, sts)| sts).collect())
}

/// Volumes must be pre-provisioned for the first version and on scale-up.
pub fn needs_volume_provisioning(
    ests: &ExtendedStatefulSet,
    actual: Option<&appsv1::StatefulSet>,
) -> bool {
    ests.has_volume_claim_templates()
        && actual.is_none_or(|sts| ests.desired_replicas() > spec_replicas(sts))
}

/// Desired StatefulSets that do not exist yet.
pub fn missing_statefulsets(
    desired: Vec<appsv1::StatefulSet>,
    existing: &[appsv1::StatefulSet],
) -> Vec<appsv1::StatefulSet> {
    desired
        .into_iter()
        .filter(|sts| !existing.iter().any(|e| e.name_any() == sts.name_any()))
        .collect()
}

/// The template the versions are generated from: secret references resolved
/// to their newest version and, if requested, the config hash stamped.
async fn prepare_template(
    ctx: &Context,
    ests: &ExtendedStatefulSet,
    namespace: &str,
) -> Result<appsv1::StatefulSet, context::Error> {
    let mut template = ests.spec.template.clone();
    template.metadata.namespace = Some(namespace.to_owned());

    let pod_template = &mut template.spec.get_or_insert_with(Default::default).template;

    let secrets = VersionedSecretStore::load(ctx, namespace).await?;
    if let Some(pod_spec) = pod_template.spec.as_mut() {
        secrets.rewrite_references(pod_spec);
    }

    if ests.spec.update_on_config_change {
        stamp_config_signature(ctx, namespace, pod_template).await?;
    }

    Ok(template)
}

async fn list_versions(
    ctx: &Context,
    ests: &ExtendedStatefulSet,
    namespace: &str,
) -> Result<Vec<appsv1::StatefulSet>, context::Error> {
    let selector = format!("{}={}", annotations::QUARKS_STATEFULSET_NAME, ests.name());
    let sets = ctx
        .list::<appsv1::StatefulSet>(namespace, &ListParams::default().labels(&selector))
        .await?;
    Ok(versioned_statefulsets(ests, sets)?)
}

pub async fn reconcile_extended_statefulset(
    ests: Arc<ExtendedStatefulSet>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    with_deadline(
        ests.name(),
        ctx.config.reconcile_timeout(),
        reconcile(ests, &ctx),
    )
    .await
}

async fn reconcile(ests: Arc<ExtendedStatefulSet>, ctx: &Context) -> Result<Action, Error> {
    let ns = ests.namespace()?;
    let Some(ests) = ctx.get_opt::<ExtendedStatefulSet>(&ests.name(), &ns).await? else {
        return Ok(Action::await_change());
    };

    if ests.metadata.deletion_timestamp.is_some() {
        debug!("{} is being deleted", ests.name());
        return Ok(Action::await_change());
    }

    let owned = list_versions(ctx, &ests, &ns).await?;
    let actual = owned.last();

    let template = prepare_template(ctx, &ests, &ns).await?;
    let signature = template_signature(&ests, &template)?;
    let desired = desired_version(actual, &signature)?;

    if needs_volume_provisioning(&ests, actual) && provision_volumes(ctx, &ests, &ns).await? {
        debug!("{} waits for volume provisioning", ests.name());
        return Ok(Action::requeue(REQUEUE_WHILE_PENDING));
    }

    let generated = ests.new_versioned_statefulsets(&template, desired, &signature, Utc::now())?;
    for sts in missing_statefulsets(generated, &owned) {
        let name = sts.name_any();
        info!("creating {} version {} as {}", ests.name(), desired, name);

        if let Err(e) = ctx.create(&sts, &ns).await
            && !e.is_conflict()
        {
            return Err(e.into());
        }

        ctx.record(
            &ests,
            EventType::Normal,
            "VersionCreated",
            &format!("Created StatefulSet {name} for version {desired}"),
        )
        .await?;
    }

    let owned = list_versions(ctx, &ests, &ns).await?;
    let mut versions = version_readiness(ctx, &owned, &ns).await?;

    let removed = cleanup_versions(ctx, &ests, &owned, &versions, &ns).await?;
    versions.retain(|version, _| !removed.contains(version));

    let current = ests.status.clone().unwrap_or_default();
    if current.versions != versions {
        let next = Status {
            last_reconcile: Some(Utc::now().to_rfc3339()),
            versions: versions.clone(),
        };
        ctx.patch_status::<ExtendedStatefulSet, _>(&ests.name(), &ns, &current.merge_patch(&next))
            .await?;
    }

    if versions.get(&desired).copied().unwrap_or(false) {
        Ok(Action::await_change())
    } else {
        debug!("version {} of {} is not ready yet", desired, ests.name());
        Ok(Action::requeue(REQUEUE_WHILE_PENDING))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn generate(ests: &ExtendedStatefulSet, version: i32) -> Vec<appsv1::StatefulSet> {
        let template = ests.spec.template.clone();
        let signature = template_signature(ests, &template).unwrap();
        ests.new_versioned_statefulsets(&template, version, &signature, Utc::now())
            .unwrap()
    }

    #[test]
    fn test_second_pass_creates_nothing() {
        let ests = crate::tests::create_test_ests(2, &["a", "b", "c"]);
        let existing = generate(&ests, 1);
        assert_eq!(missing_statefulsets(generate(&ests, 1), &[]).len(), 3);
        assert!(missing_statefulsets(generate(&ests, 1), &existing).is_empty());
    }

    #[test]
    fn test_partial_zone_loop_converges() {
        let ests = crate::tests::create_test_ests(2, &["a", "b", "c"]);
        let existing = generate(&ests, 1).into_iter().take(1).collect::<Vec<_>>();

        let missing: Vec<_> = missing_statefulsets(generate(&ests, 1), &existing)
            .iter()
            .map(|s| s.name_any())
            .collect();
        assert_eq!(missing, vec!["test-ests-z1-v1", "test-ests-z2-v1"]);
    }

    #[test]
    fn test_unchanged_template_keeps_version() {
        let mut ests = crate::tests::create_test_ests(1, &[]);
        let template = ests.spec.template.clone();
        let signature = template_signature(&ests, &template).unwrap();
        let v1 = generate(&ests, 1).remove(0);

        assert_eq!(desired_version(Some(&v1), &signature).unwrap(), 1);

        ests.spec.template.spec.as_mut().unwrap().template.spec.as_mut().unwrap().containers[0]
            .image = Some("busybox:1.37".to_string());
        let template = ests.spec.template.clone();
        let signature = template_signature(&ests, &template).unwrap();
        assert_eq!(desired_version(Some(&v1), &signature).unwrap(), 2);
    }

    #[test]
    fn test_versioned_statefulsets_filters_and_sorts() {
        let ests = crate::tests::create_test_ests_with_claims(1, &[], &["store"]);
        let v2 = generate(&ests, 2).remove(0);
        let v1 = generate(&ests, 1).remove(0);
        let vm = ests.new_volume_management_statefulset(None).unwrap();
        let mut foreign = generate(&ests, 3).remove(0);
        foreign.metadata.owner_references = None;

        let owned = versioned_statefulsets(&ests, vec![v2, vm, foreign, v1]).unwrap();
        let names: Vec<_> = owned.iter().map(|s| s.name_any()).collect();
        assert_eq!(names, vec!["test-ests-v1", "test-ests-v2"]);
    }

    #[test]
    fn test_owned_statefulset_without_version_is_an_error() {
        let ests = crate::tests::create_test_ests(1, &[]);
        let mut broken = generate(&ests, 1).remove(0);
        broken.annotations_mut().remove(annotations::VERSION);

        assert!(versioned_statefulsets(&ests, vec![broken]).is_err());
    }

    #[test]
    fn test_volume_provisioning_on_first_version_and_scale_up() {
        let ests = crate::tests::create_test_ests_with_claims(3, &[], &["store"]);
        assert!(needs_volume_provisioning(&ests, None));

        let current = generate(&ests, 1).remove(0);
        assert!(!needs_volume_provisioning(&ests, Some(&current)));

        let scaled = crate::tests::create_test_ests_with_claims(5, &[], &["store"]);
        assert!(needs_volume_provisioning(&scaled, Some(&current)));

        let no_claims = crate::tests::create_test_ests(3, &[]);
        assert!(!needs_volume_provisioning(&no_claims, None));
    }

    #[test]
    fn test_pod_maps_to_owning_resource() {
        let mut pod = crate::tests::create_test_pod("test-ests-v1-0", true, "rev");
        assert!(owning_extended_statefulset(&pod).is_none());

        pod.labels_mut().insert(
            annotations::QUARKS_STATEFULSET_NAME.to_owned(),
            "test-ests".to_owned(),
        );
        let object_ref = owning_extended_statefulset(&pod).unwrap();
        assert_eq!(object_ref.name, "test-ests");
        assert_eq!(object_ref.namespace.as_deref(), Some("default"));
    }

    #[test]
    fn test_config_references_trigger_reconcile() {
        let mut ests = crate::tests::create_test_ests(1, &[]);
        let pod_spec = ests
            .spec
            .template
            .spec
            .as_mut()
            .unwrap()
            .template
            .spec
            .as_mut()
            .unwrap();
        pod_spec.volumes = Some(vec![
            corev1::Volume {
                name: "manifest".to_string(),
                secret: Some(corev1::SecretVolumeSource {
                    secret_name: Some("manifest-v1".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            corev1::Volume {
                name: "config".to_string(),
                config_map: Some(corev1::ConfigMapVolumeSource {
                    name: "app-config".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]);

        assert!(references_config(&ests, "manifest-v2", true));
        assert!(!references_config(&ests, "other-v2", true));
        assert!(!references_config(&ests, "app-config", false));

        ests.spec.update_on_config_change = true;
        assert!(references_config(&ests, "app-config", false));
        assert!(!references_config(&ests, "unrelated", false));
    }

    mod api {
        use super::*;
        use crate::tests::{ApiCall, api_error, api_list, mock_context};
        use http::{Method, StatusCode};
        use serde_json::Value;
        use std::collections::BTreeMap;

        /// A version as it exists in the cluster, its current revision backed
        /// by ready pods.
        fn deployed(ests: &ExtendedStatefulSet, version: i32) -> appsv1::StatefulSet {
            let mut template = ests.spec.template.clone();
            template.metadata.namespace = Some("default".to_string());
            let signature = template_signature(ests, &template).unwrap();
            let mut sts = ests
                .new_versioned_statefulsets(&template, version, &signature, Utc::now())
                .unwrap()
                .remove(0);
            let revision = format!("rev-v{version}");
            crate::tests::set_status(&mut sts, 1, 1, 1, &revision, &revision);
            sts
        }

        fn with_status(versions: &[(i32, bool)]) -> ExtendedStatefulSet {
            let mut ests = crate::tests::create_test_ests(1, &[]);
            ests.status = Some(Status {
                last_reconcile: None,
                versions: versions.iter().copied().collect(),
            });
            ests
        }

        fn serve(
            ests: ExtendedStatefulSet,
            sets: Vec<appsv1::StatefulSet>,
        ) -> impl FnMut(&ApiCall) -> (StatusCode, Value) + Send + 'static {
            move |call| {
                let path = call.path.as_str();
                if path.ends_with("/extendedstatefulsets/test-ests")
                    || path.ends_with("/extendedstatefulsets/test-ests/status")
                {
                    return (StatusCode::OK, serde_json::to_value(&ests).unwrap());
                }
                if path.ends_with("/statefulsets") && call.method == Method::GET {
                    let items = sets.iter().map(|s| serde_json::to_value(s).unwrap());
                    return api_list(items.collect());
                }
                if path.ends_with("/secrets") {
                    return api_list(vec![]);
                }
                if path.ends_with("/pods") {
                    let pod = crate::tests::create_test_pod("test-ests-v1-0", true, "rev");
                    return api_list(vec![serde_json::to_value(pod).unwrap()]);
                }
                if call.method == Method::DELETE
                    && let Some(sts) = sets.iter().find(|s| path.ends_with(&s.name_any()))
                {
                    return (StatusCode::OK, serde_json::to_value(sts).unwrap());
                }
                api_error(404, "NotFound")
            }
        }

        #[tokio::test]
        async fn test_deleted_version_is_removed_from_status() {
            let ests = with_status(&[(1, true), (2, true)]);
            let sets = vec![deployed(&ests, 1), deployed(&ests, 2)];
            let (ctx, log) = mock_context(serve(ests.clone(), sets));

            let action = reconcile_extended_statefulset(Arc::new(ests.clone()), ctx)
                .await
                .unwrap();
            assert_eq!(action, Action::await_change());

            let writes = log.writes();
            assert_eq!(writes.len(), 2);
            assert_eq!(writes[0].0, Method::DELETE);
            assert!(writes[0].1.ends_with("/statefulsets/test-ests-v1"));
            assert_eq!(writes[1].0, Method::PATCH);

            let patch = log
                .calls()
                .into_iter()
                .find(|call| call.method == Method::PATCH)
                .unwrap()
                .body;
            assert_eq!(patch["status"]["versions"]["1"], Value::Null);

            let mut stored = serde_json::to_value(&ests).unwrap();
            json_patch::merge(&mut stored, &patch);
            let stored: ExtendedStatefulSet = serde_json::from_value(stored).unwrap();
            assert_eq!(
                stored.status.unwrap().versions,
                BTreeMap::from([(2, true)])
            );
        }

        #[tokio::test]
        async fn test_converged_resource_writes_nothing() {
            let ests = with_status(&[(2, true)]);
            let sets = vec![deployed(&ests, 2)];
            let (ctx, log) = mock_context(serve(ests.clone(), sets));

            let action = reconcile_extended_statefulset(Arc::new(ests), ctx)
                .await
                .unwrap();

            assert_eq!(action, Action::await_change());
            assert!(log.writes().is_empty());
        }
    }
}
