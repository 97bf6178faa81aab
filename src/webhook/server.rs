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

use super::error::{AddressSnafu, Result, ServeSnafu, TlsSnafu};
use super::{MUTATE_PODS_PATH, MUTATE_STATEFULSETS_PATH, pod, statefulset};
use crate::config::WebhookConfig;
use crate::utils::tls;
use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use snafu::ResultExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub fn router() -> Router {
    Router::new()
        .route(MUTATE_STATEFULSETS_PATH, post(statefulset::mutate_statefulsets))
        .route(MUTATE_PODS_PATH, post(pod::mutate_pods))
        .route("/healthz", get(health_check))
        .layer(TraceLayer::new_for_http())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Serves the webhooks over TLS until `shutdown` fires. Returns immediately
/// when no certificate is configured.
pub async fn run(config: &WebhookConfig, shutdown: CancellationToken) -> Result<()> {
    let (Some(cert_file), Some(key_file)) = (
        config.webhook_cert_file.as_deref(),
        config.webhook_key_file.as_deref(),
    ) else {
        warn!("no webhook certificate configured, admission webhooks are disabled");
        return Ok(());
    };

    let address = format!("{}:{}", config.webhook_host, config.webhook_port);
    let addr: SocketAddr = address.parse().context(AddressSnafu {
        address: address.clone(),
    })?;

    let server_config = tls::server_config_from_files(cert_file, key_file)
        .await
        .context(TlsSnafu)?;
    let rustls_config = RustlsConfig::from_config(Arc::new(server_config));

    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            shutdown.cancelled().await;
            info!("shutting down webhook server");
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        }
    });

    info!("webhook server listening on https://{}", addr);
    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle)
        .serve(router().into_make_service())
        .await
        .context(ServeSnafu)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::v1alpha1::annotations;
    use crate::webhook::tests::admission_review;
    use axum::body::Body;
    use axum::http::{Request, header};
    use k8s_openapi::api::apps::v1 as appsv1;
    use kube::ResourceExt;
    use tower::ServiceExt;

    async fn post_json(path: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = router()
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_statefulset_review_round_trip() {
        let mut sts = crate::tests::create_test_statefulset("db", 2);
        sts.annotations_mut()
            .insert(annotations::CANARY_ROLLOUT_ENABLED.to_owned(), "true".to_owned());

        let review = admission_review::<appsv1::StatefulSet>("CREATE", &sts, None);
        let (status, body) = post_json(MUTATE_STATEFULSETS_PATH, review).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "AdmissionReview");
        assert_eq!(body["response"]["uid"], "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert_eq!(body["response"]["allowed"], true);
        assert_eq!(body["response"]["patchType"], "JSONPatch");
    }

    #[tokio::test]
    async fn test_review_without_request_is_bad_request() {
        let (status, body) = post_json(
            MUTATE_PODS_PATH,
            serde_json::json!({ "apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "BadRequest");
    }

    #[tokio::test]
    async fn test_run_without_certificate_is_disabled() {
        let config = crate::config::OperatorConfig::default().webhook;
        run(&config, CancellationToken::new()).await.unwrap();
    }
}
