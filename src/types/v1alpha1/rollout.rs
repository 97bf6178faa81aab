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

//! Rollout-control metadata carried on native StatefulSets.

use crate::types::error::{Error, InvalidAnnotationSnafu};
use crate::types::v1alpha1::annotations;
use crate::types::v1alpha1::status::state::RolloutState;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1 as appsv1;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::time::Duration;

pub fn is_rollout_enabled(sts: &appsv1::StatefulSet) -> bool {
    sts.annotations()
        .get(annotations::CANARY_ROLLOUT_ENABLED)
        .is_some_and(|v| v == "true")
}

pub fn partition(sts: &appsv1::StatefulSet) -> Option<i32> {
    sts.spec
        .as_ref()?
        .update_strategy
        .as_ref()?
        .rolling_update
        .as_ref()?
        .partition
}

pub fn set_partition(sts: &mut appsv1::StatefulSet, partition: i32) {
    let strategy = sts
        .spec
        .get_or_insert_with(Default::default)
        .update_strategy
        .get_or_insert_with(Default::default);

    strategy.type_ = Some("RollingUpdate".to_owned());
    strategy
        .rolling_update
        .get_or_insert_with(Default::default)
        .partition = Some(partition);
}

pub fn set_state(sts: &mut appsv1::StatefulSet, state: RolloutState) {
    sts.annotations_mut()
        .insert(annotations::CANARY_ROLLOUT.to_owned(), state.to_string());
}

pub fn spec_replicas(sts: &appsv1::StatefulSet) -> i32 {
    sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1)
}

/// `(replicas, ready, updated)` as reported by the StatefulSet controller.
pub fn status_replicas(sts: &appsv1::StatefulSet) -> (i32, i32, i32) {
    sts.status.as_ref().map_or((0, 0, 0), |s| {
        (
            s.replicas,
            s.ready_replicas.unwrap_or(0),
            s.updated_replicas.unwrap_or(0),
        )
    })
}

fn stamp(sts: &mut appsv1::StatefulSet, state: RolloutState, partition: i32, now: DateTime<Utc>) {
    set_state(sts, state);
    sts.annotations_mut().insert(
        annotations::UPDATE_START_TIME.to_owned(),
        now.timestamp().to_string(),
    );
    set_partition(sts, partition);
}

/// Restarts the rollout cycle after a template change.
pub fn configure_for_rollout(sts: &mut appsv1::StatefulSet, now: DateTime<Utc>) {
    let (current, _, _) = status_replicas(sts);
    let partition = spec_replicas(sts).min(current).max(0);
    stamp(sts, RolloutState::Pending, partition, now);
}

/// Configuration for a StatefulSet that has no previous revision to canary against.
pub fn configure_for_initial_rollout(sts: &mut appsv1::StatefulSet, now: DateTime<Utc>) {
    stamp(sts, RolloutState::CanaryUpscale, 0, now);
}

fn millis_annotation(
    sts: &appsv1::StatefulSet,
    key: &'static str,
) -> Result<Option<Duration>, Error> {
    let Some(raw) = sts.annotations().get(key) else {
        return Ok(None);
    };

    raw.trim()
        .parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|_| {
            InvalidAnnotationSnafu {
                name: sts.name_any(),
                key,
                value: raw.clone(),
            }
            .build()
        })
}

/// `None` means the rollout never times out.
pub fn update_watch_time(sts: &appsv1::StatefulSet) -> Result<Option<Duration>, Error> {
    millis_annotation(sts, annotations::UPDATE_WATCH_TIME_MS)
}

/// `None` means the canary never times out.
pub fn canary_watch_time(sts: &appsv1::StatefulSet) -> Result<Option<Duration>, Error> {
    millis_annotation(sts, annotations::CANARY_WATCH_TIME_MS)
}

pub fn update_start_time(sts: &appsv1::StatefulSet) -> Result<DateTime<Utc>, Error> {
    let name = sts.name_any();
    let raw = sts
        .annotations()
        .get(annotations::UPDATE_START_TIME)
        .cloned()
        .unwrap_or_default();

    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| {
            InvalidAnnotationSnafu {
                name,
                key: annotations::UPDATE_START_TIME,
                value: raw,
            }
            .build()
        })
}

/// Removes every rollout-control key, used for objects the rollout must ignore.
pub fn strip_rollout_annotations(annotations_map: &mut BTreeMap<String, String>) {
    for key in [
        annotations::CANARY_ROLLOUT_ENABLED,
        annotations::CANARY_ROLLOUT,
        annotations::CANARY_WATCH_TIME_MS,
        annotations::UPDATE_WATCH_TIME_MS,
        annotations::UPDATE_START_TIME,
    ] {
        annotations_map.remove(key);
    }
}
