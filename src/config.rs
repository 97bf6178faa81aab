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

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Args, Clone, Debug)]
pub struct OperatorConfig {
    /// Restrict all controllers to one namespace. Watches every namespace if unset.
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Deadline for a single reconcile call.
    #[arg(long, env = "CTR_TIMEOUT_SECS", default_value_t = 30)]
    pub reconcile_timeout_secs: u64,

    /// Upper bound of concurrent reconciles per controller.
    #[arg(long, env = "MAX_WORKERS", default_value_t = 4)]
    pub max_concurrent_reconciles: u16,

    /// Value of the monitored namespace label the webhooks are scoped to.
    #[arg(long, env = "MONITORED_ID", default_value = "quarks")]
    pub monitored_id: String,

    #[command(flatten)]
    pub webhook: WebhookConfig,
}

#[derive(Args, Clone, Debug)]
pub struct WebhookConfig {
    #[arg(long, env = "WEBHOOK_HOST", default_value = "0.0.0.0")]
    pub webhook_host: String,

    #[arg(long, env = "WEBHOOK_PORT", default_value_t = 2999)]
    pub webhook_port: u16,

    /// PEM certificate. The webhook server is not started without it.
    #[arg(long, env = "WEBHOOK_CERT_FILE")]
    pub webhook_cert_file: Option<PathBuf>,

    #[arg(long, env = "WEBHOOK_KEY_FILE")]
    pub webhook_key_file: Option<PathBuf>,

    #[arg(long, env = "WEBHOOK_SERVICE_NAME", default_value = "quarks-statefulset-webhook")]
    pub webhook_service_name: String,

    #[arg(long, env = "WEBHOOK_SERVICE_NAMESPACE", default_value = "default")]
    pub webhook_service_namespace: String,
}

impl OperatorConfig {
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            reconcile_timeout_secs: 30,
            max_concurrent_reconciles: 4,
            monitored_id: "quarks".to_owned(),
            webhook: WebhookConfig {
                webhook_host: "0.0.0.0".to_owned(),
                webhook_port: 2999,
                webhook_cert_file: None,
                webhook_key_file: None,
                webhook_service_name: "quarks-statefulset-webhook".to_owned(),
                webhook_service_namespace: "default".to_owned(),
            },
        }
    }
}
