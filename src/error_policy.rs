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

use crate::context::Context;
use crate::reconcile::Error;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Shared by every controller. A vanished object is not retried; everything
/// else, conflicts included, goes back through the controller backoff.
pub fn error_policy<K: ResourceExt>(object: Arc<K>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_not_found() {
        debug!("{} is gone: {}", object.name_any(), error);
        Action::await_change()
    } else {
        error!("reconcile of {} failed: {}", object.name_any(), error);
        Action::requeue(Duration::from_secs(5))
    }
}
