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

//! `/mutate-pods`: points the claim references of versioned pods at the PVC
//! of their own ordinal.

use super::error::{BadRequestSnafu, JsonSnafu, PatchSnafu, Result};
use super::{decode, deny_bad_request, into_review};
use crate::types::v1alpha1::annotations;
use crate::utils::pod::pod_ordinal;
use axum::Json;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use snafu::ResultExt;
use tracing::debug;

const POD_NAME_LABEL: &str = "statefulset.kubernetes.io/pod-name";

fn ordinal_of(pod: &corev1::Pod) -> Option<i32> {
    pod.metadata
        .name
        .as_deref()
        .and_then(pod_ordinal)
        .or_else(|| pod.labels().get(POD_NAME_LABEL).and_then(|n| pod_ordinal(n)))
}

fn is_claim_reference(claim_name: &str) -> bool {
    claim_name.contains(&format!("-{}", annotations::VOLUME_MANAGEMENT_PREFIX))
}

/// Appends the ordinal to every volume-management claim reference. Returns
/// `false` if the pod is not a versioned pod or was already mutated.
pub fn bind_claims_to_ordinal(pod: &mut corev1::Pod) -> bool {
    if !pod.labels().contains_key(annotations::QUARKS_STATEFULSET_NAME)
        || pod.labels().contains_key(annotations::POD_ORDINAL)
    {
        return false;
    }

    let Some(ordinal) = ordinal_of(pod) else {
        return false;
    };

    let volumes = pod
        .spec
        .iter_mut()
        .flat_map(|spec| spec.volumes.iter_mut().flatten());
    for volume in volumes {
        if let Some(claim) = volume.persistent_volume_claim.as_mut()
            && is_claim_reference(&claim.claim_name)
        {
            claim.claim_name = format!("{}-{}", claim.claim_name, ordinal);
        }
    }

    pod.labels_mut()
        .insert(annotations::POD_ORDINAL.to_owned(), ordinal.to_string());
    true
}

pub fn mutate(req: &AdmissionRequest<DynamicObject>) -> Result<AdmissionResponse> {
    let res = AdmissionResponse::from(req);

    if req.operation != Operation::Create {
        return Ok(res);
    }
    let Some(object) = req.object.as_ref() else {
        return Ok(res);
    };

    let pod: corev1::Pod = match decode(object) {
        Ok(pod) => pod,
        Err(e) => return Ok(deny_bad_request(res, e)),
    };

    let mut mutated = pod.clone();
    if !bind_claims_to_ordinal(&mut mutated) {
        return Ok(res);
    }
    debug!("bound claims of pod {} to its ordinal", mutated.name_any());

    let before = serde_json::to_value(&pod).context(JsonSnafu)?;
    let after = serde_json::to_value(&mutated).context(JsonSnafu)?;
    res.with_patch(json_patch::diff(&before, &after))
        .context(PatchSnafu)
}

pub async fn mutate_pods(
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Result<Json<AdmissionReview<DynamicObject>>> {
    let req: AdmissionRequest<DynamicObject> = review.try_into().map_err(|e| {
        BadRequestSnafu {
            message: format!("{e}"),
        }
        .build()
    })?;

    Ok(into_review(mutate(&req)?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::webhook::tests::{admission_request, apply_patch};

    fn versioned_pod(name: &str) -> corev1::Pod {
        let mut pod = crate::tests::create_test_pod(name, false, "rev");
        pod.labels_mut().insert(
            annotations::QUARKS_STATEFULSET_NAME.to_owned(),
            "test-ests".to_owned(),
        );
        pod.spec = Some(corev1::PodSpec {
            volumes: Some(vec![
                corev1::Volume {
                    name: "store".to_string(),
                    persistent_volume_claim: Some(corev1::PersistentVolumeClaimVolumeSource {
                        claim_name: "store-volumemanagement-test-ests-z1".to_string(),
                        read_only: None,
                    }),
                    ..Default::default()
                },
                corev1::Volume {
                    name: "other".to_string(),
                    persistent_volume_claim: Some(corev1::PersistentVolumeClaimVolumeSource {
                        claim_name: "shared-data".to_string(),
                        read_only: None,
                    }),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        });
        pod
    }

    fn claim_names(pod: &corev1::Pod) -> Vec<String> {
        pod.spec
            .as_ref()
            .unwrap()
            .volumes
            .as_ref()
            .unwrap()
            .iter()
            .map(|v| v.persistent_volume_claim.as_ref().unwrap().claim_name.clone())
            .collect()
    }

    #[test]
    fn test_claim_references_get_the_pod_ordinal() {
        let pod = versioned_pod("test-ests-z1-v2-3");
        let req = admission_request("CREATE", &pod, None);

        let res = mutate(&req).unwrap();
        assert!(res.allowed);

        let patched: corev1::Pod = apply_patch(&pod, &res);
        assert_eq!(
            claim_names(&patched),
            vec!["store-volumemanagement-test-ests-z1-3", "shared-data"]
        );
        assert_eq!(
            patched.labels().get(annotations::POD_ORDINAL).map(String::as_str),
            Some("3")
        );
    }

    #[test]
    fn test_mutation_is_applied_once() {
        let mut pod = versioned_pod("test-ests-v1-0");
        assert!(bind_claims_to_ordinal(&mut pod));
        assert!(!bind_claims_to_ordinal(&mut pod));
        assert_eq!(claim_names(&pod)[0], "store-volumemanagement-test-ests-z1-0");
    }

    #[test]
    fn test_unrelated_pods_pass_through() {
        let pod = crate::tests::create_test_pod("web-0", true, "rev");
        let res = mutate(&admission_request("CREATE", &pod, None)).unwrap();
        assert!(res.allowed);
        assert!(res.patch.is_none());
    }
}
