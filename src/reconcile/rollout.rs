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

//! Canary-then-partitioned rollout of a single StatefulSet.
//!
//! The state lives in the `canary-rollout` annotation and the rolling update
//! partition. Every pass re-reads the StatefulSet, computes one [`Step`] and
//! writes it back with a conditional replace; waiting is expressed as a
//! requeue, never as a blocking wait.

use super::{Error, with_deadline};
use crate::context::Context;
use crate::types;
use crate::types::error::NoNamespaceSnafu;
use crate::types::v1alpha1::annotations;
use crate::types::v1alpha1::extended_statefulset::is_volume_management;
use crate::types::v1alpha1::rollout::{
    canary_watch_time, is_rollout_enabled, partition, set_partition, set_state, spec_replicas,
    status_replicas, update_start_time, update_watch_time,
};
use crate::types::v1alpha1::status::state::RolloutState;
use crate::utils::pod::{is_pod_ready, pod_name};
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::ResourceExt;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use snafu::OptionExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound for the requeue interval while a rollout is active.
pub const MAX_REQUEUE: Duration = Duration::from_secs(60);

/// Outcome of one pass of the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Step {
    pub state: RolloutState,
    pub partition: i32,
    pub requeue_after: Option<Duration>,
}

/// Whether a StatefulSet event concerns an active rollout.
pub fn should_reconcile_rollout(sts: &appsv1::StatefulSet) -> bool {
    is_rollout_enabled(sts)
        && !is_volume_management(sts)
        && partition(sts).is_some()
        && sts.annotations().contains_key(annotations::CANARY_ROLLOUT)
}

fn is_updated(pod: &corev1::Pod, update_revision: Option<&str>) -> bool {
    let Some(update_revision) = update_revision else {
        return false;
    };
    pod.labels()
        .get(annotations::CONTROLLER_REVISION_HASH)
        .is_some_and(|rev| rev == update_revision)
}

/// Time left of `budget`, or `None` if there is no budget.
fn remaining(budget: Option<Duration>, elapsed: Duration) -> Option<Duration> {
    budget.map(|b| b.saturating_sub(elapsed))
}

/// Computes the next state and partition.
///
/// `partition_pod` is the pod at the current partition ordinal, if it exists.
/// Returns `Ok(None)` for StatefulSets that are not under rollout control.
pub fn next_step(
    sts: &appsv1::StatefulSet,
    partition_pod: Option<&corev1::Pod>,
    now: DateTime<Utc>,
) -> Result<Option<Step>, types::error::Error> {
    if !is_rollout_enabled(sts) {
        return Ok(None);
    }
    let Some(state) = RolloutState::from_statefulset(sts)? else {
        return Ok(None);
    };
    let Some(current) = partition(sts) else {
        return Ok(None);
    };

    let hold = |state| Step {
        state,
        partition: current,
        requeue_after: None,
    };

    if state.is_terminal() {
        return Ok(Some(hold(state)));
    }

    let update_budget = update_watch_time(sts)?;
    let canary_budget = canary_watch_time(sts)?;
    let elapsed = if update_budget.is_some() || canary_budget.is_some() {
        (now - update_start_time(sts)?).to_std().unwrap_or_default()
    } else {
        Duration::ZERO
    };

    if update_budget.is_some_and(|budget| elapsed >= budget) {
        return Ok(Some(hold(RolloutState::Failed)));
    }

    let desired = spec_replicas(sts);
    let (replicas, ready, updated) = status_replicas(sts);
    let scaling_up = replicas < desired;

    let (next_state, next_partition) = match state {
        RolloutState::Pending if scaling_up || current == 0 => {
            (RolloutState::CanaryUpscale, current)
        }
        RolloutState::Pending => (RolloutState::Canary, current - 1),

        RolloutState::CanaryUpscale => {
            if replicas == desired && ready == desired {
                if current > 0 {
                    (RolloutState::Rollout, current - 1)
                } else if updated == desired {
                    (RolloutState::Done, 0)
                } else {
                    (state, current)
                }
            } else {
                (state, current)
            }
        }

        RolloutState::Canary if canary_budget.is_some_and(|budget| elapsed >= budget) => {
            (RolloutState::Failed, current)
        }

        RolloutState::Canary | RolloutState::Rollout if scaling_up => {
            (RolloutState::CanaryUpscale, current)
        }

        // Scaled down below the partition: the pod at the partition ordinal
        // will never exist.
        RolloutState::Canary | RolloutState::Rollout if current >= desired => {
            if desired > 0 {
                (state, desired - 1)
            } else {
                (RolloutState::Done, 0)
            }
        }

        RolloutState::Canary | RolloutState::Rollout => {
            let update_revision = sts
                .status
                .as_ref()
                .and_then(|status| status.update_revision.as_deref());
            let pod_done = partition_pod
                .is_some_and(|pod| is_pod_ready(pod) && is_updated(pod, update_revision));

            if !pod_done {
                (state, current)
            } else if current > 0 {
                (RolloutState::Rollout, current - 1)
            } else if ready == desired && updated == desired {
                (RolloutState::Done, 0)
            } else {
                (state, current)
            }
        }

        RolloutState::Done | RolloutState::Failed => (state, current),
    };

    let requeue_after = if next_state.is_terminal() {
        None
    } else {
        let canary_left = if next_state == RolloutState::Canary {
            remaining(canary_budget, elapsed)
        } else {
            None
        };
        [remaining(update_budget, elapsed), canary_left]
            .into_iter()
            .flatten()
            .chain([MAX_REQUEUE])
            .min()
    };

    Ok(Some(Step {
        state: next_state,
        partition: next_partition,
        requeue_after,
    }))
}

/// Ordinals whose pods are deleted when not ready after the partition moved
/// from `old` to `new`.
pub fn crossed_ordinals(old: i32, new: i32) -> std::ops::Range<i32> {
    new..old.max(new)
}

async fn delete_non_ready_pods(
    ctx: &Context,
    sts_name: &str,
    namespace: &str,
    ordinals: std::ops::Range<i32>,
) -> Result<(), Error> {
    for ordinal in ordinals {
        let name = pod_name(sts_name, ordinal);
        let Some(pod) = ctx.get_opt::<corev1::Pod>(&name, namespace).await? else {
            continue;
        };

        if is_pod_ready(&pod) {
            continue;
        }

        info!("deleting non-ready pod {} after partition move", name);
        match ctx.delete::<corev1::Pod>(&name, namespace).await {
            Err(e) if !e.is_not_found() => return Err(e.into()),
            _ => {}
        }
    }
    Ok(())
}

pub async fn reconcile_rollout(
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
        debug!("statefulset {} is gone", name);
        return Ok(Action::await_change());
    };

    if !should_reconcile_rollout(&latest) {
        return Ok(Action::await_change());
    }

    let old_partition = partition(&latest).unwrap_or_default();
    let old_state = RolloutState::from_statefulset(&latest)?;

    let partition_pod = ctx
        .get_opt::<corev1::Pod>(&pod_name(&name, old_partition), &ns)
        .await?;

    let Some(step) = next_step(&latest, partition_pod.as_ref(), Utc::now())? else {
        return Ok(Action::await_change());
    };

    if old_state == Some(step.state) && old_partition == step.partition {
        debug!("rollout of {} unchanged in {}", name, step.state);
        return Ok(step.requeue_after.map_or_else(Action::await_change, Action::requeue));
    }

    // Pods go first: once the partition is written the move is no longer
    // visible to a retry.
    if step.partition < old_partition {
        delete_non_ready_pods(
            ctx,
            &name,
            &ns,
            crossed_ordinals(old_partition, step.partition),
        )
        .await?;
    }

    let mut updated = latest.clone();
    set_state(&mut updated, step.state);
    set_partition(&mut updated, step.partition);
    ctx.replace(&updated, &ns).await?;

    info!(
        "rollout of {}: {:?} -> {}, partition {} -> {}",
        name, old_state, step.state, old_partition, step.partition
    );

    match step.state {
        RolloutState::Done => {
            ctx.record(
                &latest,
                EventType::Normal,
                "RolloutDone",
                &format!("Rollout of {name} finished"),
            )
            .await?
        }
        RolloutState::Failed => {
            ctx.record(
                &latest,
                EventType::Warning,
                "RolloutFailed",
                &format!("Rollout of {name} exceeded its watch time at partition {old_partition}"),
            )
            .await?
        }
        _ => {}
    }

    Ok(step.requeue_after.map_or_else(Action::await_change, Action::requeue))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::v1alpha1::rollout::{configure_for_initial_rollout, configure_for_rollout};
    use chrono::TimeDelta;
    use std::collections::BTreeMap;

    const OLD: &str = "rev-old";
    const NEW: &str = "rev-new";

    /// Just enough of a cluster to drive the state machine: one StatefulSet,
    /// its pods by ordinal, and a count of writes the rollout issued.
    struct Cluster {
        sts: appsv1::StatefulSet,
        pods: BTreeMap<i32, corev1::Pod>,
        writes: usize,
        deleted: Vec<i32>,
        now: DateTime<Utc>,
        partitions: Vec<i32>,
    }

    impl Cluster {
        fn new(replicas: i32) -> Self {
            let mut sts = crate::tests::create_test_statefulset("db", replicas);
            sts.annotations_mut()
                .insert(annotations::CANARY_ROLLOUT_ENABLED.to_owned(), "true".to_owned());
            Self {
                sts,
                pods: BTreeMap::new(),
                writes: 0,
                deleted: Vec::new(),
                now: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
                partitions: Vec::new(),
            }
        }

        /// A healthy StatefulSet fully on the old revision.
        fn healthy(replicas: i32) -> Self {
            let mut cluster = Self::new(replicas);
            for ordinal in 0..replicas {
                cluster.set_pod(ordinal, true, OLD);
            }
            cluster.sync_status(OLD);
            cluster
        }

        /// What the admission webhook and the StatefulSet controller do on a
        /// template change: restamp the rollout and publish a new revision.
        fn change_template(&mut self) {
            configure_for_rollout(&mut self.sts, self.now);
            self.sync_status(NEW);
        }

        fn set_pod(&mut self, ordinal: i32, ready: bool, revision: &str) {
            self.pods.insert(
                ordinal,
                crate::tests::create_test_pod(&pod_name("db", ordinal), ready, revision),
            );
        }

        fn sync_status(&mut self, update_revision: &str) {
            let replicas = self.pods.len() as i32;
            let ready = self.pods.values().filter(|p| is_pod_ready(p)).count() as i32;
            let updated = self
                .pods
                .values()
                .filter(|p| is_updated(p, Some(update_revision)))
                .count() as i32;
            crate::tests::set_status(&mut self.sts, replicas, ready, updated, OLD, update_revision);
        }

        fn state(&self) -> RolloutState {
            RolloutState::from_statefulset(&self.sts).unwrap().unwrap()
        }

        fn partition(&self) -> i32 {
            partition(&self.sts).unwrap()
        }

        /// Applies one step to the in-memory cluster: a write only on change
        /// and deletion of crossed non-ready pods.
        fn reconcile(&mut self) -> Step {
            let old_state = self.state();
            let old_partition = self.partition();
            let pod = self.pods.get(&old_partition).cloned();

            let step = next_step(&self.sts, pod.as_ref(), self.now).unwrap().unwrap();

            if step.state != old_state || step.partition != old_partition {
                self.writes += 1;
                set_state(&mut self.sts, step.state);
                set_partition(&mut self.sts, step.partition);
                self.partitions.push(step.partition);

                if step.partition < old_partition {
                    for ordinal in crossed_ordinals(old_partition, step.partition) {
                        if self.pods.get(&ordinal).is_some_and(|p| !is_pod_ready(p)) {
                            self.pods.remove(&ordinal);
                            self.deleted.push(ordinal);
                        }
                    }
                }
            }
            step
        }

        fn advance(&mut self, millis: i64) {
            self.now += TimeDelta::milliseconds(millis);
        }
    }

    #[test]
    fn test_fresh_statefulset_reaches_done_after_all_pods_ready() {
        let mut cluster = Cluster::new(4);
        configure_for_initial_rollout(&mut cluster.sts, cluster.now);

        for ordinal in 0..4 {
            cluster.reconcile();
            assert_eq!(cluster.state(), RolloutState::CanaryUpscale);
            cluster.set_pod(ordinal, true, NEW);
            cluster.sync_status(NEW);
        }

        cluster.reconcile();
        assert_eq!(cluster.state(), RolloutState::Done);
        assert_eq!(cluster.partition(), 0);
        assert_eq!(cluster.writes, 1);
    }

    #[test]
    fn test_template_change_rolls_pods_from_the_highest_ordinal() {
        let mut cluster = Cluster::healthy(4);
        cluster.change_template();
        assert_eq!(cluster.partition(), 4);

        cluster.reconcile();
        assert_eq!(cluster.state(), RolloutState::Canary);
        assert_eq!(cluster.partition(), 3);

        for ordinal in (0..4).rev() {
            // Still the old pod: nothing moves.
            cluster.reconcile();
            assert_eq!(cluster.partition(), ordinal);

            cluster.set_pod(ordinal, true, NEW);
            cluster.sync_status(NEW);
            cluster.reconcile();
        }

        assert_eq!(cluster.state(), RolloutState::Done);
        assert_eq!(cluster.partitions, vec![3, 2, 1, 0, 0]);
        assert!(cluster.deleted.is_empty());
    }

    #[test]
    fn test_canary_timeout_fails_without_moving_partition() {
        let mut cluster = Cluster::healthy(4);
        cluster
            .sts
            .annotations_mut()
            .insert(annotations::CANARY_WATCH_TIME_MS.to_owned(), "30000".to_owned());
        cluster.change_template();

        cluster.reconcile();
        assert_eq!(cluster.state(), RolloutState::Canary);
        cluster.set_pod(3, false, NEW);
        cluster.sync_status(NEW);

        cluster.advance(10_000);
        let step = cluster.reconcile();
        assert_eq!(step.state, RolloutState::Canary);
        assert_eq!(step.requeue_after, Some(Duration::from_secs(20)));

        cluster.advance(20_000);
        cluster.reconcile();
        assert_eq!(cluster.state(), RolloutState::Failed);
        assert_eq!(cluster.partition(), 3);

        cluster.advance(60_000);
        let writes = cluster.writes;
        let step = cluster.reconcile();
        assert_eq!(step.requeue_after, None);
        assert_eq!(cluster.writes, writes);
        assert_eq!(cluster.partition(), 3);
        assert!(cluster.pods.contains_key(&3));
        assert!(cluster.deleted.is_empty());
    }

    #[test]
    fn test_scale_up_mid_rollout_switches_to_canary_upscale() {
        let mut cluster = Cluster::healthy(4);
        cluster.change_template();
        cluster.reconcile();
        for ordinal in [3, 2] {
            cluster.set_pod(ordinal, true, NEW);
            cluster.sync_status(NEW);
            cluster.reconcile();
        }
        assert_eq!(cluster.state(), RolloutState::Rollout);
        assert_eq!(cluster.partition(), 1);

        cluster.sts.spec.as_mut().unwrap().replicas = Some(5);
        cluster.reconcile();
        assert_eq!(cluster.state(), RolloutState::CanaryUpscale);
        assert_eq!(cluster.partition(), 1);

        // The new pod is not ready yet.
        cluster.set_pod(4, false, NEW);
        cluster.sync_status(NEW);
        cluster.reconcile();
        assert_eq!(cluster.state(), RolloutState::CanaryUpscale);

        cluster.set_pod(4, true, NEW);
        cluster.sync_status(NEW);
        cluster.reconcile();
        assert_eq!(cluster.state(), RolloutState::Rollout);
        assert_eq!(cluster.partition(), 0);

        cluster.set_pod(1, true, NEW);
        cluster.set_pod(0, true, NEW);
        cluster.sync_status(NEW);
        cluster.reconcile();
        assert_eq!(cluster.state(), RolloutState::Done);
    }

    #[test]
    fn test_global_timeout_takes_precedence() {
        let mut cluster = Cluster::healthy(2);
        cluster
            .sts
            .annotations_mut()
            .insert(annotations::UPDATE_WATCH_TIME_MS.to_owned(), "5000".to_owned());
        cluster.change_template();
        cluster.reconcile();
        cluster.set_pod(1, true, NEW);
        cluster.sync_status(NEW);

        cluster.advance(5_000);
        cluster.reconcile();
        assert_eq!(cluster.state(), RolloutState::Failed);
        assert_eq!(cluster.partition(), 1);
    }

    #[test]
    fn test_missing_start_time_with_watch_time_is_an_error() {
        let mut cluster = Cluster::healthy(2);
        cluster.change_template();
        let sts_annotations = cluster.sts.annotations_mut();
        sts_annotations.insert(annotations::UPDATE_WATCH_TIME_MS.to_owned(), "5000".to_owned());
        sts_annotations.remove(annotations::UPDATE_START_TIME);

        assert!(next_step(&cluster.sts, None, cluster.now).is_err());
    }

    #[test]
    fn test_partition_move_deletes_crossed_non_ready_pod() {
        let mut cluster = Cluster::healthy(3);
        cluster.set_pod(1, false, OLD);
        cluster.sync_status(OLD);
        cluster.change_template();

        cluster.reconcile();
        cluster.set_pod(2, true, NEW);
        cluster.sync_status(NEW);
        cluster.reconcile();

        assert_eq!(cluster.partition(), 1);
        assert_eq!(cluster.deleted, vec![1]);
    }

    #[test]
    fn test_partition_never_increases_within_a_rollout() {
        let mut cluster = Cluster::healthy(5);
        cluster.change_template();

        let mut last = cluster.partition();
        for ordinal in (0..5).rev() {
            for _ in 0..3 {
                cluster.reconcile();
                assert!(cluster.partition() <= last);
                last = cluster.partition();
            }
            cluster.set_pod(ordinal, true, NEW);
            cluster.sync_status(NEW);
        }
        cluster.reconcile();

        assert_eq!(cluster.state(), RolloutState::Done);
        let (_, ready, updated) = status_replicas(&cluster.sts);
        assert_eq!((ready, updated, spec_replicas(&cluster.sts)), (5, 5, 5));
    }

    #[test]
    fn test_reconcile_is_idempotent_while_waiting() {
        let mut cluster = Cluster::healthy(3);
        cluster.change_template();
        cluster.reconcile();
        let writes = cluster.writes;

        for _ in 0..5 {
            let step = cluster.reconcile();
            assert_eq!(step.requeue_after, Some(MAX_REQUEUE));
        }
        assert_eq!(cluster.writes, writes);
    }

    #[test]
    fn test_done_requires_all_pods_updated() {
        let mut cluster = Cluster::new(2);
        configure_for_initial_rollout(&mut cluster.sts, cluster.now);
        cluster.set_pod(0, true, NEW);
        cluster.set_pod(1, true, OLD);
        cluster.sync_status(NEW);

        let step = cluster.reconcile();
        assert_eq!(step.state, RolloutState::CanaryUpscale);
    }

    #[test]
    fn test_statefulsets_outside_rollout_are_ignored() {
        let sts = crate::tests::create_test_statefulset("db", 1);
        assert!(!should_reconcile_rollout(&sts));
        assert_eq!(next_step(&sts, None, Utc::now()).unwrap(), None);

        let mut cluster = Cluster::new(1);
        assert!(!should_reconcile_rollout(&cluster.sts));
        configure_for_initial_rollout(&mut cluster.sts, cluster.now);
        assert!(should_reconcile_rollout(&cluster.sts));
    }

    #[test]
    fn test_scale_down_below_partition_moves_partition_to_last_ordinal() {
        let mut cluster = Cluster::healthy(4);
        cluster.change_template();
        cluster.reconcile();
        assert_eq!((cluster.state(), cluster.partition()), (RolloutState::Canary, 3));

        cluster.sts.spec.as_mut().unwrap().replicas = Some(2);
        cluster.pods.retain(|ordinal, _| *ordinal < 2);
        cluster.sync_status(NEW);

        cluster.reconcile();
        assert_eq!((cluster.state(), cluster.partition()), (RolloutState::Canary, 1));

        cluster.set_pod(1, true, NEW);
        cluster.sync_status(NEW);
        cluster.reconcile();
        assert_eq!((cluster.state(), cluster.partition()), (RolloutState::Rollout, 0));
    }

    mod api {
        use super::*;
        use crate::reconcile::Error;
        use crate::tests::{ApiCall, api_error, mock_context};
        use crate::utils::pod::pod_ordinal;
        use http::{Method, StatusCode};
        use serde_json::Value;

        const STS_PATH: &str = "/apis/apps/v1/namespaces/default/statefulsets/db";
        const POD_PATH: &str = "/api/v1/namespaces/default/pods/";

        /// Serves one StatefulSet and its pods; `conflict` rejects every replace.
        fn serve(
            mut sts: appsv1::StatefulSet,
            mut pods: BTreeMap<i32, corev1::Pod>,
            conflict: bool,
        ) -> impl FnMut(&ApiCall) -> (StatusCode, Value) + Send + 'static {
            move |call| {
                if call.path == STS_PATH {
                    if call.method == Method::GET {
                        return (StatusCode::OK, serde_json::to_value(&sts).unwrap());
                    }
                    if call.method == Method::PUT && !conflict {
                        sts = serde_json::from_value(call.body.clone()).unwrap();
                        return (StatusCode::OK, call.body.clone());
                    }
                    return api_error(409, "Conflict");
                }

                let Some(ordinal) = call.path.strip_prefix(POD_PATH).and_then(pod_ordinal) else {
                    return api_error(404, "NotFound");
                };
                let pod = if call.method == Method::DELETE {
                    pods.remove(&ordinal)
                } else {
                    pods.get(&ordinal).cloned()
                };
                match pod {
                    Some(pod) => (StatusCode::OK, serde_json::to_value(&pod).unwrap()),
                    None => api_error(404, "NotFound"),
                }
            }
        }

        /// Canary at partition 2 of 3 with the canary pod done and pod 1 stuck.
        fn canary_done() -> Cluster {
            let mut cluster = Cluster::healthy(3);
            cluster.set_pod(1, false, OLD);
            cluster.change_template();
            cluster.reconcile();
            cluster.set_pod(2, true, NEW);
            cluster.sync_status(NEW);
            cluster
        }

        #[tokio::test]
        async fn test_missing_statefulset_is_not_an_error() {
            let (ctx, log) = mock_context(|_| api_error(404, "NotFound"));
            let sts = Cluster::healthy(2).sts;

            let action = reconcile_rollout(Arc::new(sts), ctx).await.unwrap();

            assert_eq!(action, Action::await_change());
            assert_eq!(log.calls().len(), 1);
            assert!(log.writes().is_empty());
        }

        #[tokio::test]
        async fn test_pods_are_deleted_before_the_partition_is_written() {
            let cluster = canary_done();
            let sts = cluster.sts.clone();
            let (ctx, log) = mock_context(serve(cluster.sts, cluster.pods, false));

            reconcile_rollout(Arc::new(sts), ctx).await.unwrap();

            assert_eq!(
                log.writes(),
                vec![
                    (Method::DELETE, format!("{POD_PATH}db-1")),
                    (Method::PUT, STS_PATH.to_string()),
                ]
            );
            let written: appsv1::StatefulSet = log
                .calls()
                .into_iter()
                .find(|call| call.method == Method::PUT)
                .map(|call| serde_json::from_value(call.body).unwrap())
                .unwrap();
            assert_eq!(partition(&written), Some(1));
            assert_eq!(
                RolloutState::from_statefulset(&written).unwrap(),
                Some(RolloutState::Rollout)
            );
        }

        #[tokio::test]
        async fn test_second_pass_without_changes_writes_nothing() {
            let cluster = canary_done();
            let sts = cluster.sts.clone();
            let (ctx, log) = mock_context(serve(cluster.sts, cluster.pods, false));

            reconcile_rollout(Arc::new(sts.clone()), ctx.clone()).await.unwrap();
            log.clear();

            let action = reconcile_rollout(Arc::new(sts), ctx).await.unwrap();

            assert!(log.writes().is_empty());
            assert_eq!(action, Action::requeue(MAX_REQUEUE));
        }

        #[tokio::test]
        async fn test_conflict_on_replace_is_surfaced() {
            let mut cluster = Cluster::healthy(3);
            cluster.change_template();
            let sts = cluster.sts.clone();
            let (ctx, log) = mock_context(serve(cluster.sts, cluster.pods, true));

            let err = reconcile_rollout(Arc::new(sts), ctx).await.unwrap_err();

            assert!(matches!(&err, Error::Context { source } if source.is_conflict()));
            assert_eq!(log.writes(), vec![(Method::PUT, STS_PATH.to_string())]);
        }
    }
}
