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

//! Retirement of superseded StatefulSet versions.

use crate::context::{self, Context};
use crate::types;
use crate::types::v1alpha1::annotations;
use crate::types::v1alpha1::extended_statefulset::{ExtendedStatefulSet, statefulset_version};
use crate::utils::pod::is_pod_ready;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;
use kube::api::ListParams;
use kube::runtime::events::EventType;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Greatest version with at least one ready StatefulSet behind it.
pub fn max_available_version(versions: &BTreeMap<i32, bool>) -> Option<i32> {
    versions
        .iter()
        .filter(|(_, ready)| **ready)
        .map(|(version, _)| *version)
        .next_back()
}

/// StatefulSets strictly older than `max_available`. Newer ones are kept even
/// when not ready, they may be an in-flight rollout.
pub fn versions_to_delete(
    sets: &[appsv1::StatefulSet],
    max_available: i32,
) -> Result<Vec<&appsv1::StatefulSet>, types::error::Error> {
    let mut obsolete = Vec::new();
    for sts in sets {
        if statefulset_version(sts)? < max_available {
            obsolete.push(sts);
        }
    }
    Ok(obsolete)
}

/// Whether any pod of the StatefulSet's current revision is ready.
pub async fn is_statefulset_ready(
    ctx: &Context,
    sts: &appsv1::StatefulSet,
    namespace: &str,
) -> Result<bool, context::Error> {
    let Some(revision) = sts
        .status
        .as_ref()
        .and_then(|status| status.current_revision.as_ref())
    else {
        return Ok(false);
    };

    let selector = format!("{}={}", annotations::CONTROLLER_REVISION_HASH, revision);
    let pods = ctx
        .list::<corev1::Pod>(namespace, &ListParams::default().labels(&selector))
        .await?;

    Ok(pods.iter().any(is_pod_ready))
}

/// Readiness per version. With zones a version is only ready once every one
/// of its StatefulSets is.
pub async fn version_readiness(
    ctx: &Context,
    sets: &[appsv1::StatefulSet],
    namespace: &str,
) -> Result<BTreeMap<i32, bool>, context::Error> {
    let mut versions = BTreeMap::new();
    for sts in sets {
        let version = statefulset_version(sts)?;
        let ready = is_statefulset_ready(ctx, sts, namespace).await?;
        versions
            .entry(version)
            .and_modify(|all: &mut bool| *all &= ready)
            .or_insert(ready);
    }
    Ok(versions)
}

/// Deletes every version below the greatest ready one and returns the
/// versions that are gone.
pub async fn cleanup_versions(
    ctx: &Context,
    ests: &ExtendedStatefulSet,
    sets: &[appsv1::StatefulSet],
    versions: &BTreeMap<i32, bool>,
    namespace: &str,
) -> Result<BTreeSet<i32>, context::Error> {
    let mut removed = BTreeSet::new();
    let Some(max_available) = max_available_version(versions) else {
        return Ok(removed);
    };

    for sts in versions_to_delete(sets, max_available)? {
        let name = sts.name_any();
        removed.insert(statefulset_version(sts)?);
        info!("deleting obsolete version {} of {}", name, ests.name());

        match ctx.delete::<appsv1::StatefulSet>(&name, namespace).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        }

        ctx.record(
            ests,
            EventType::Normal,
            "VersionDeleted",
            &format!("Deleted StatefulSet {name}, version {max_available} is available"),
        )
        .await?;
    }

    Ok(removed)
}
