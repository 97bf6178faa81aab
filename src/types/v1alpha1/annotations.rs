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

//! Annotation and label keys shared by the controllers and the webhooks.
//!
//! Rollout state lives entirely in the annotations of the native StatefulSet,
//! so these keys are the persisted schema of the operator.

pub const GROUP: &str = "quarks.cloudfoundry.org";

/// Opts a StatefulSet into the canary rollout machinery when set to `"true"`.
pub const CANARY_ROLLOUT_ENABLED: &str = const_str::concat!(GROUP, "/canary-rollout-enabled");

/// Current [`RolloutState`](super::status::state::RolloutState).
pub const CANARY_ROLLOUT: &str = const_str::concat!(GROUP, "/canary-rollout");

/// Canary budget in milliseconds, measured from the update start time.
pub const CANARY_WATCH_TIME_MS: &str = const_str::concat!(GROUP, "/canary-watch-time-ms");

/// Overall rollout budget in milliseconds, measured from the update start time.
pub const UPDATE_WATCH_TIME_MS: &str = const_str::concat!(GROUP, "/update-watch-time-ms");

/// Unix seconds at which the current rollout was configured.
pub const UPDATE_START_TIME: &str = const_str::concat!(GROUP, "/update-start-time");

pub const VERSION: &str = const_str::concat!(GROUP, "/version");
pub const STATEFULSET_SHA1: &str = const_str::concat!(GROUP, "/statefulset-sha1");
pub const CONFIG_SHA1: &str = const_str::concat!(GROUP, "/config-sha1");

pub const AZ_INDEX: &str = const_str::concat!(GROUP, "/az-index");
pub const AZ_NAME: &str = const_str::concat!(GROUP, "/az-name");
pub const ZONES: &str = const_str::concat!(GROUP, "/zones");

pub const QUARKS_STATEFULSET_NAME: &str = const_str::concat!(GROUP, "/quarks-statefulset-name");
pub const STATEFULSET_NAME: &str = const_str::concat!(GROUP, "/statefulset-name");
pub const VOLUME_MANAGEMENT: &str = const_str::concat!(GROUP, "/volume-management");
pub const POD_ORDINAL: &str = const_str::concat!(GROUP, "/pod-ordinal");
pub const MONITORED: &str = const_str::concat!(GROUP, "/monitored");

pub const SECRET_KIND: &str = const_str::concat!(GROUP, "/secret-kind");
pub const SECRET_KIND_VERSIONED: &str = "versionedSecret";
pub const SECRET_VERSION: &str = const_str::concat!(GROUP, "/secret-version");

/// Label set by the native StatefulSet controller on every pod it creates.
pub const CONTROLLER_REVISION_HASH: &str = "controller-revision-hash";

pub const VOLUME_MANAGEMENT_PREFIX: &str = "volumemanagement-";

pub const DEFAULT_ZONE_NODE_LABEL: &str = "failure-domain.beta.kubernetes.io/zone";
