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

use crate::config::OperatorConfig;
use crate::context::Context;
use crate::error_policy::error_policy;
use crate::reconcile::extended_statefulset::{extended_statefulsets_for_config, owning_extended_statefulset};
use crate::reconcile::{reconcile_extended_statefulset, reconcile_rollout, reconcile_volume_management};
use crate::types::v1alpha1::annotations;
use crate::types::v1alpha1::extended_statefulset::ExtendedStatefulSet;
use crate::utils::pod::owning_statefulset;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{Controller, controller, watcher};
use kube::{Api, Client, CustomResourceExt, Resource, ResourceExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub mod config;
mod context;
mod error_policy;
pub mod reconcile;
pub mod types;
pub mod utils;
pub mod webhook;


fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    <K as Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

fn statefulset_of(pod: &corev1::Pod) -> Option<ObjectRef<appsv1::StatefulSet>> {
    let name = owning_statefulset(pod)?;
    let namespace = pod.namespace()?;
    Some(ObjectRef::new(&name).within(&namespace))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Logs to stdout, filtered by `RUST_LOG` and `info` by default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_level(true)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();
}

pub async fn run(config: OperatorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::try_default().await?;
    let namespace = config.watch_namespace.clone();
    let ns = namespace.as_deref();
    let controller_config = controller::Config::default().concurrency(config.max_concurrent_reconciles);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("received shutdown signal");
            shutdown.cancel();
        }
    });

    let context = Arc::new(Context::new(client.clone(), config.clone()));

    let ests_controller = Controller::new(api::<ExtendedStatefulSet>(&client, ns), watcher::Config::default());
    let store = ests_controller.store();
    let config_store = store.clone();
    let ests_controller = ests_controller
        .with_config(controller_config.clone())
        .owns(api::<appsv1::StatefulSet>(&client, ns), watcher::Config::default())
        .watches(
            api::<corev1::Pod>(&client, ns),
            watcher::Config::default().labels(annotations::QUARKS_STATEFULSET_NAME),
            |pod| owning_extended_statefulset(&pod),
        )
        .watches(
            api::<corev1::Secret>(&client, ns),
            watcher::Config::default(),
            move |secret| extended_statefulsets_for_config(&store, &secret),
        )
        .watches(
            api::<corev1::ConfigMap>(&client, ns),
            watcher::Config::default(),
            move |config_map| extended_statefulsets_for_config(&config_store, &config_map),
        )
        .graceful_shutdown_on(shutdown.clone().cancelled_owned())
        .run(reconcile_extended_statefulset, error_policy, context.clone())
        .for_each(|res| async move {
            match res {
                Ok((ests, _)) => debug!("reconciled extended statefulset {}", ests.name),
                Err(e) => warn!("extended statefulset reconcile failed: {}", e),
            }
        });

    let rollout_controller = Controller::new(api::<appsv1::StatefulSet>(&client, ns), watcher::Config::default())
        .with_config(controller_config.clone())
        .watches(
            api::<corev1::Pod>(&client, ns),
            watcher::Config::default(),
            |pod| statefulset_of(&pod),
        )
        .graceful_shutdown_on(shutdown.clone().cancelled_owned())
        .run(reconcile_rollout, error_policy, context.clone())
        .for_each(|res| async move {
            match res {
                Ok((sts, _)) => debug!("reconciled rollout of {}", sts.name),
                Err(e) => warn!("rollout reconcile failed: {}", e),
            }
        });

    let volume_management_selector = format!("{}=true", annotations::VOLUME_MANAGEMENT);
    let volume_management_controller = Controller::new(
        api::<appsv1::StatefulSet>(&client, ns),
        watcher::Config::default().labels(&volume_management_selector),
    )
    .with_config(controller_config)
    .watches(
        api::<corev1::Pod>(&client, ns),
        watcher::Config::default().labels(&volume_management_selector),
        |pod| statefulset_of(&pod),
    )
    .graceful_shutdown_on(shutdown.clone().cancelled_owned())
    .run(reconcile_volume_management, error_policy, context)
    .for_each(|res| async move {
        match res {
            Ok((sts, _)) => debug!("reconciled volume management {}", sts.name),
            Err(e) => warn!("volume management reconcile failed: {}", e),
        }
    });

    let webhook_server = async {
        let result = webhook::server::run(&config.webhook, shutdown.clone()).await;
        if let Err(e) = &result {
            error!("webhook server failed: {}", e);
            shutdown.cancel();
        }
        result
    };

    info!(
        "starting controllers in {}",
        namespace.as_deref().unwrap_or("all namespaces")
    );
    let (_, _, _, webhook_result) = tokio::join!(
        ests_controller,
        rollout_controller,
        volume_management_controller,
        webhook_server
    );
    webhook_result?;

    info!("operator stopped");
    Ok(())
}

async fn output(file: Option<String>) -> Result<Pin<Box<dyn AsyncWrite + Send>>, std::io::Error> {
    Ok(if let Some(file) = file {
        Box::pin(
            tokio::fs::OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(file)
                .await?,
        )
    } else {
        Box::pin(tokio::io::stdout())
    })
}

pub async fn crd(file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = output(file).await?;

    writer
        .write_all(serde_yaml_ng::to_string(&ExtendedStatefulSet::crd())?.as_bytes())
        .await?;
    writer.flush().await?;

    Ok(())
}

/// Writes the webhook registration. The configured certificate, if any, is
/// used as CA bundle, which fits self-signed webhook certificates.
pub async fn webhook_config(config: &OperatorConfig, file: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let ca_bundle = match config.webhook.webhook_cert_file.as_deref() {
        Some(path) => Some(tokio::fs::read(path).await?),
        None => None,
    };
    let configuration = webhook::registration::webhook_configuration(config, ca_bundle.as_deref());

    let mut writer = output(file).await?;
    writer
        .write_all(serde_yaml_ng::to_string(&configuration)?.as_bytes())
        .await?;
    writer.flush().await?;

    Ok(())
}
