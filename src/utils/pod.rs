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

use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;

/// Whether the pod reports the `Ready` condition as `True`.
pub fn is_pod_ready(pod: &corev1::Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

/// Ordinal of a StatefulSet pod, parsed from its `<sts>-<ordinal>` name.
pub fn pod_ordinal(pod_name: &str) -> Option<i32> {
    let (_, ordinal) = pod_name.rsplit_once('-')?;
    ordinal.parse().ok()
}

/// Name of the pod with `ordinal` in StatefulSet `sts_name`.
pub fn pod_name(sts_name: &str, ordinal: i32) -> String {
    format!("{sts_name}-{ordinal}")
}

/// Name of the StatefulSet controlling the pod, if any.
pub fn owning_statefulset(pod: &corev1::Pod) -> Option<String> {
    pod.owner_references()
        .iter()
        .find(|owner| owner.kind == "StatefulSet" && owner.controller == Some(true))
        .map(|owner| owner.name.clone())
}
