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

use super::{Error, with_deadline};
use crate::context::{self, Context};
use crate::types::error::NoNamespaceSnafu;
use crate::types::v1alpha1::extended_statefulset::{ExtendedStatefulSet, is_volume_management};
use crate::types::v1alpha1::rollout::spec_replicas;
use crate::utils::pod::{is_pod_ready, pod_name};
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;
use kube::api::ListParams;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use snafu::OptionExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Whether every ordinal of `sts` has a ready pod. A missing pod counts as
/// not ready.
pub async fn all_pods_ready(
    ctx: &Context,
    sts: &appsv1::StatefulSet,
    namespace: &str,
) -> Result<bool, context::Error> {
    let name = sts.name_any();
    for ordinal in 0..spec_replicas(sts) {
        let pod = ctx
            .get_opt::<corev1::Pod>(&pod_name(&name, ordinal), namespace)
            .await?;
        if !pod.as_ref().is_some_and(is_pod_ready) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Whether every claim in `desired` exists as a PVC.
pub async fn claims_exist(
    ctx: &Context,
    desired: &[String],
    namespace: &str,
) -> Result<bool, context::Error> {
    if desired.is_empty() {
        return Ok(true);
    }

    let existing: BTreeSet<String> = ctx
        .list::<corev1::PersistentVolumeClaim>(namespace, &ListParams::default())
        .await?
        .iter()
        .map(|pvc| pvc.name_any())
        .collect();

    Ok(desired.iter().all(|name| existing.contains(name)))
}

/// Makes sure the claims of `ests` are bound before its versioned pods are
/// created. Returns `true` while provisioning is still in progress.
pub async fn provision_volumes(
    ctx: &Context,
    ests: &ExtendedStatefulSet,
    namespace: &str,
) -> Result<bool, context::Error> {
    let desired = ests.new_volume_management_statefulsets()?;

    let mut in_progress = false;
    for sts in &desired {
        if ctx
            .get_opt::<appsv1::StatefulSet>(&sts.name_any(), namespace)
            .await?
            .is_some()
        {
            debug!("waiting for volume management statefulset {}", sts.name_any());
            in_progress = true;
        }
    }
    if in_progress {
        return Ok(true);
    }

    if claims_exist(ctx, &ests.desired_claim_names(), namespace).await? {
        return Ok(false);
    }

    for sts in &desired {
        info!("creating volume management statefulset {}", sts.name_any());
        if let Err(e) = ctx.create(sts, namespace).await
            && !e.is_conflict()
        {
            return Err(e);
        }
        ctx.record(
            ests,
            EventType::Normal,
            "VolumeManagementCreated",
            &format!("Created {} to provision volumes", sts.name_any()),
        )
        .await?;
    }

    Ok(true)
}

pub async fn reconcile_volume_management(
    sts: Arc<appsv1::StatefulSet>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    with_deadline(
        sts.name_any(),
        ctx.config.reconcile_timeout(),
        reconcile(sts, &ctx),
    )
    .await
}

async fn reconcile(sts: Arc<appsv1::StatefulSet>, ctx: &Context) -> Result<Action, Error> {
    let name = sts.name_any();
    let ns = sts.namespace().context(NoNamespaceSnafu)?;

    let Some(latest) = ctx.get_opt::<appsv1::StatefulSet>(&name, &ns).await? else {
        return Ok(Action::await_change());
    };

    if !is_volume_management(&latest) || latest.metadata.deletion_timestamp.is_some() {
        return Ok(Action::await_change());
    }

    if !all_pods_ready(ctx, &latest, &ns).await? {
        debug!("volume management statefulset {} is not ready yet", name);
        return Ok(Action::requeue(Duration::from_secs(10)));
    }

    info!("volumes of {} are provisioned, deleting it", name);
    ctx.delete::<appsv1::StatefulSet>(&name, &ns).await?;
    ctx.record(
        &latest,
        EventType::Normal,
        "VolumeManagementDeleted",
        "All volume claims are bound",
    )
    .await?;

    Ok(Action::await_change())
}
