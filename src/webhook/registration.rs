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

//! The `MutatingWebhookConfiguration` that registers the admission endpoints.

use super::{MUTATE_PODS_PATH, MUTATE_STATEFULSETS_PATH};
use crate::config::OperatorConfig;
use crate::types::v1alpha1::annotations;
use k8s_openapi::ByteString;
use k8s_openapi::api::admissionregistration::v1 as admissionv1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use std::collections::BTreeMap;

pub const CONFIGURATION_NAME: &str = "quarks-statefulset-hook";

fn rule(group: &str, resource: &str, operations: &[&str]) -> admissionv1::RuleWithOperations {
    admissionv1::RuleWithOperations {
        api_groups: Some(vec![group.to_owned()]),
        api_versions: Some(vec!["v1".to_owned()]),
        operations: Some(operations.iter().map(|op| (*op).to_owned()).collect()),
        resources: Some(vec![resource.to_owned()]),
        scope: Some("Namespaced".to_owned()),
    }
}

fn webhook(
    config: &OperatorConfig,
    name: &str,
    path: &str,
    rule: admissionv1::RuleWithOperations,
    ca_bundle: Option<&[u8]>,
) -> admissionv1::MutatingWebhook {
    admissionv1::MutatingWebhook {
        name: name.to_owned(),
        admission_review_versions: vec!["v1".to_owned()],
        client_config: admissionv1::WebhookClientConfig {
            ca_bundle: ca_bundle.map(|ca| ByteString(ca.to_vec())),
            service: Some(admissionv1::ServiceReference {
                name: config.webhook.webhook_service_name.clone(),
                namespace: config.webhook.webhook_service_namespace.clone(),
                path: Some(path.to_owned()),
                port: Some(i32::from(config.webhook.webhook_port)),
            }),
            url: None,
        },
        failure_policy: Some("Fail".to_owned()),
        side_effects: "None".to_owned(),
        namespace_selector: Some(metav1::LabelSelector {
            match_labels: Some(BTreeMap::from([(
                annotations::MONITORED.to_owned(),
                config.monitored_id.clone(),
            )])),
            ..Default::default()
        }),
        rules: Some(vec![rule]),
        timeout_seconds: Some(30),
        ..Default::default()
    }
}

/// Builds the registration for both webhooks. `ca_bundle` is the PEM the API
/// server uses to verify the webhook certificate.
pub fn webhook_configuration(
    config: &OperatorConfig,
    ca_bundle: Option<&[u8]>,
) -> admissionv1::MutatingWebhookConfiguration {
    admissionv1::MutatingWebhookConfiguration {
        metadata: metav1::ObjectMeta {
            name: Some(CONFIGURATION_NAME.to_owned()),
            ..Default::default()
        },
        webhooks: Some(vec![
            webhook(
                config,
                const_str::concat!("mutate-statefulsets.", annotations::GROUP),
                MUTATE_STATEFULSETS_PATH,
                rule("apps", "statefulsets", &["CREATE", "UPDATE"]),
                ca_bundle,
            ),
            webhook(
                config,
                const_str::concat!("mutate-pods.", annotations::GROUP),
                MUTATE_PODS_PATH,
                rule("", "pods", &["CREATE"]),
                ca_bundle,
            ),
        ]),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_both_endpoints() {
        let mut config = OperatorConfig::default();
        config.monitored_id = "cf".to_owned();
        config.webhook.webhook_service_namespace = "operators".to_owned();

        let hooks = webhook_configuration(&config, Some(b"pem")).webhooks.unwrap();
        assert_eq!(hooks.len(), 2);

        let sts = &hooks[0];
        assert_eq!(sts.name, "mutate-statefulsets.quarks.cloudfoundry.org");
        assert_eq!(sts.failure_policy.as_deref(), Some("Fail"));
        let rule = &sts.rules.as_ref().unwrap()[0];
        assert_eq!(rule.api_groups.as_ref().unwrap(), &["apps"]);
        assert_eq!(rule.operations.as_ref().unwrap(), &["CREATE", "UPDATE"]);

        let service = sts.client_config.service.as_ref().unwrap();
        assert_eq!(service.namespace, "operators");
        assert_eq!(service.path.as_deref(), Some("/mutate-statefulsets"));
        assert_eq!(service.port, Some(2999));
        assert_eq!(sts.client_config.ca_bundle.as_ref().unwrap().0, b"pem");

        let selector = sts.namespace_selector.as_ref().unwrap().match_labels.as_ref().unwrap();
        assert_eq!(selector.get(annotations::MONITORED).map(String::as_str), Some("cf"));

        let pods = &hooks[1];
        assert_eq!(pods.client_config.service.as_ref().unwrap().path.as_deref(), Some("/mutate-pods"));
        assert_eq!(pods.rules.as_ref().unwrap()[0].operations.as_ref().unwrap(), &["CREATE"]);
    }
}
