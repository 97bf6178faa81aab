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

use crate::types::error::{Error, UnknownRolloutStateSnafu};
use crate::types::v1alpha1::annotations;
use k8s_openapi::api::apps::v1 as appsv1;
use kube::ResourceExt;
use std::str::FromStr;
use strum::{Display, EnumString};

/// Canary rollout state, persisted as the `canary-rollout` annotation.
///
/// `Done` and `Failed` are terminal until the admission webhook observes a new
/// template and resets the cycle to `Pending`.
#[derive(Clone, Copy, Debug, Display, EnumString, PartialEq, Eq)]
pub enum RolloutState {
    #[strum(serialize = "Pending")]
    Pending,

    #[strum(serialize = "CanaryUpscale")]
    CanaryUpscale,

    #[strum(serialize = "Canary")]
    Canary,

    #[strum(serialize = "Rollout")]
    Rollout,

    #[strum(serialize = "Done")]
    Done,

    #[strum(serialize = "Failed")]
    Failed,
}

impl RolloutState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RolloutState::Done | RolloutState::Failed)
    }

    /// Reads the state annotation. `Ok(None)` means no rollout was ever configured.
    pub fn from_statefulset(sts: &appsv1::StatefulSet) -> Result<Option<Self>, Error> {
        let Some(raw) = sts.annotations().get(annotations::CANARY_ROLLOUT) else {
            return Ok(None);
        };

        RolloutState::from_str(raw).map(Some).map_err(|_| {
            UnknownRolloutStateSnafu {
                name: sts.name_any(),
                state: raw.clone(),
            }
            .build()
        })
    }
}
