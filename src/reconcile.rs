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

use crate::{context, types};
use kube::runtime::controller::Action;
use snafu::Snafu;
use std::future::Future;
use std::time::Duration;

pub mod cleanup;
pub mod configs;
pub mod extended_statefulset;
pub mod rollout;
pub mod versioned_secret;
pub mod volume_management;

pub use extended_statefulset::reconcile_extended_statefulset;
pub use rollout::reconcile_rollout;
pub use volume_management::reconcile_volume_management;

#[derive(Snafu, Debug)]
pub enum Error {
    #[snafu(transparent)]
    Context { source: context::Error },

    #[snafu(transparent)]
    Types { source: types::error::Error },

    #[snafu(display("reconcile of '{}' did not finish within {:?}", name, timeout))]
    Timeout { name: String, timeout: Duration },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Context { source } if source.is_not_found())
    }
}

/// Bounds a single reconcile call. Hitting the deadline only fails this
/// attempt; the controller retries it through the error policy.
pub(crate) async fn with_deadline<F>(name: String, timeout: Duration, fut: F) -> Result<Action, Error>
where
    F: Future<Output = Result<Action, Error>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => TimeoutSnafu { name, timeout }.fail(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_turns_slow_reconcile_into_timeout() {
        let result = with_deadline("slow".to_string(), Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Action::await_change())
        })
        .await;

        assert!(matches!(result, Err(Error::Timeout { .. })));
        assert!(!result.is_err_and(|e| e.is_not_found()));
    }

    #[tokio::test]
    async fn test_deadline_passes_through_fast_reconcile() {
        let result = with_deadline("fast".to_string(), Duration::from_secs(5), async {
            Ok(Action::requeue(Duration::from_secs(1)))
        })
        .await;

        assert_eq!(result.ok(), Some(Action::requeue(Duration::from_secs(1))));
    }
}
