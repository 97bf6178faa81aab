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

//! `/mutate-statefulsets`: stamps rollout control on create and on template
//! changes.

use super::error::{BadRequestSnafu, PatchSnafu, Result};
use super::{decode, deny_bad_request, into_review};
use crate::types::v1alpha1::rollout::{configure_for_rollout, is_rollout_enabled};
use axum::Json;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1 as appsv1;
use kube::ResourceExt;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use snafu::ResultExt;
use tracing::{debug, info};

/// Whether the pod template differs structurally between two revisions.
pub fn pod_template_changed(old: &appsv1::StatefulSet, new: &appsv1::StatefulSet) -> bool {
    let template = |sts: &appsv1::StatefulSet| {
        sts.spec
            .as_ref()
            .map(|spec| serde_json::to_value(&spec.template).unwrap_or_default())
    };
    template(old) != template(new)
}

/// Admission decision for one request. Requests the mutator does not care
/// about are allowed unchanged.
pub fn mutate(req: &AdmissionRequest<DynamicObject>, now: DateTime<Utc>) -> Result<AdmissionResponse> {
    let res = AdmissionResponse::from(req);

    let Some(object) = req.object.as_ref() else {
        return Ok(res);
    };

    let sts: appsv1::StatefulSet = match decode(object) {
        Ok(sts) => sts,
        Err(e) => return Ok(deny_bad_request(res, e)),
    };

    if !is_rollout_enabled(&sts) {
        return Ok(res);
    }

    let reconfigure = match req.operation {
        Operation::Create => true,
        Operation::Update => {
            let Some(old_object) = req.old_object.as_ref() else {
                return Ok(deny_bad_request(res, "update request without old object"));
            };
            match decode::<appsv1::StatefulSet>(old_object) {
                Ok(old) => pod_template_changed(&old, &sts),
                Err(e) => return Ok(deny_bad_request(res, e)),
            }
        }
        _ => false,
    };

    if !reconfigure {
        debug!("statefulset {} unchanged, passing through", sts.name_any());
        return Ok(res);
    }

    let mut mutated = sts.clone();
    configure_for_rollout(&mut mutated, now);
    info!(
        "configured {} for rollout on {:?}",
        sts.name_any(),
        req.operation
    );

    let before = serde_json::to_value(&sts).context(super::error::JsonSnafu)?;
    let after = serde_json::to_value(&mutated).context(super::error::JsonSnafu)?;
    res.with_patch(json_patch::diff(&before, &after))
        .context(PatchSnafu)
}

pub async fn mutate_statefulsets(
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Result<Json<AdmissionReview<DynamicObject>>> {
    let req: AdmissionRequest<DynamicObject> = review.try_into().map_err(|e| {
        BadRequestSnafu {
            message: format!("{e}"),
        }
        .build()
    })?;

    let res = mutate(&req, Utc::now())?;
    Ok(into_review(res))
}
