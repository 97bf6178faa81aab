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

//! Mutating admission webhooks served next to the controllers.

use axum::Json;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionResponse, AdmissionReview};
use serde::de::DeserializeOwned;

pub mod error;
pub mod pod;
pub mod registration;
pub mod server;
pub mod statefulset;

pub const MUTATE_STATEFULSETS_PATH: &str = "/mutate-statefulsets";
pub const MUTATE_PODS_PATH: &str = "/mutate-pods";

/// Decodes the raw admission object into a typed resource.
pub(crate) fn decode<T: DeserializeOwned>(obj: &DynamicObject) -> Result<T, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(obj)?)
}

/// Denies with HTTP 400 semantics, used when the object cannot be decoded.
pub(crate) fn deny_bad_request(res: AdmissionResponse, reason: impl ToString) -> AdmissionResponse {
    let mut res = res.deny(reason.to_string());
    res.result.code = 400;
    res
}

pub(crate) fn into_review(res: AdmissionResponse) -> Json<AdmissionReview<DynamicObject>> {
    Json(res.into_review())
}
