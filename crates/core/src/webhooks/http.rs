use std::collections::BTreeMap;

use serde_json::Value;

use super::template::{camel_case, render, render_url, render_value};
use super::{WebhookDispatcher, WebhookEvent, WebhookExecutionConfiguration, WebhookTarget};

/// Posts rendered JSON bodies to the configured targets.
///
/// ureq is synchronous, so each request runs on the blocking pool of the
/// current tokio runtime. Outside a runtime the event is dropped with a
/// warning.
#[derive(Debug, Clone)]
pub struct HttpWebhookDispatcher {
    targets: Vec<WebhookTarget>,
}

/// A fully rendered outbound request.
#[derive(Debug, Clone, PartialEq)]
struct Request {
    url: String,
    headers: BTreeMap<String, String>,
    body: Value,
}

impl HttpWebhookDispatcher {
    pub fn new(targets: Vec<WebhookTarget>) -> Self {
        Self { targets }
    }

    fn requests(
        &self,
        event: &WebhookEvent,
        configuration: &WebhookExecutionConfiguration,
    ) -> Vec<Request> {
        let vars = template_vars(event, configuration);
        self.targets
            .iter()
            .filter(|t| t.accepts(event.kind))
            .map(|target| Request {
                url: render_url(&target.url, &vars),
                headers: target
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), render(v, &vars)))
                    .collect(),
                body: match &target.body {
                    Some(body) => render_value(body, &vars),
                    None => serde_json::json!({
                        "event": event.kind,
                        "context": vars,
                    }),
                },
            })
            .collect()
    }
}

/// Template variables: the webhook context with camelCased keys, overlaid
/// by the event context and then `baseUrl`. Request metadata never replaces
/// a value the broker supplies.
fn template_vars(
    event: &WebhookEvent,
    configuration: &WebhookExecutionConfiguration,
) -> BTreeMap<String, String> {
    let mut vars: BTreeMap<String, String> = configuration
        .webhook_context
        .iter()
        .map(|(key, value)| (camel_case(key), value.clone()))
        .collect();
    vars.extend(event.context.clone());
    if let Some(base_url) = &configuration.base_url {
        vars.insert("baseUrl".to_string(), base_url.clone());
    }
    vars
}

impl WebhookDispatcher for HttpWebhookDispatcher {
    fn dispatch(&self, event: WebhookEvent, configuration: &WebhookExecutionConfiguration) {
        let requests = self.requests(&event, configuration);
        if requests.is_empty() {
            return;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(event = %event.kind, "no async runtime; webhook not sent");
                return;
            }
        };
        for request in requests {
            let kind = event.kind;
            let show_response = configuration.show_response;
            handle.spawn_blocking(move || execute(kind, request, show_response));
        }
    }
}

fn execute(kind: super::WebhookKind, request: Request, show_response: bool) {
    let agent = ureq::Agent::new_with_defaults();
    let mut builder = agent
        .post(request.url.as_str())
        .header("content-type", "application/json");
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    match builder.send_json(&request.body) {
        Ok(response) => {
            let status = response.status().as_u16();
            if show_response {
                let body = response
                    .into_body()
                    .read_to_string()
                    .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
                tracing::info!(
                    event = %kind,
                    url = %request.url,
                    status,
                    body = %body,
                    "webhook sent"
                );
            } else {
                tracing::info!(event = %kind, url = %request.url, status, "webhook sent");
            }
        }
        Err(e) => {
            tracing::warn!(event = %kind, url = %request.url, error = %e, "webhook failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PactMetadata;
    use crate::webhooks::WebhookKind;
    use serde_json::json;

    fn target(events: Vec<WebhookKind>, body: Option<Value>) -> WebhookTarget {
        WebhookTarget {
            url: "http://ci.example.org/build/${pactbroker.providerName}".to_string(),
            events,
            body,
            headers: BTreeMap::from([(
                "x-consumer".to_string(),
                "${pactbroker.consumerName}".to_string(),
            )]),
        }
    }

    fn event() -> WebhookEvent {
        WebhookEvent::new(WebhookKind::ProviderVerificationPublished)
            .with("consumerName", "Foo")
            .with("providerName", "Bar")
    }

    #[test]
    fn renders_matching_targets_only() {
        let dispatcher = HttpWebhookDispatcher::new(vec![
            target(vec![WebhookKind::ProviderVerificationPublished], None),
            target(vec![WebhookKind::DeploymentRecorded], None),
        ]);
        let requests = dispatcher.requests(&event(), &WebhookExecutionConfiguration::default());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "http://ci.example.org/build/Bar");
        assert_eq!(requests[0].headers["x-consumer"], "Foo");
        assert_eq!(requests[0].body["event"], "provider_verification_published");
        assert_eq!(requests[0].body["context"]["consumerName"], "Foo");
    }

    #[test]
    fn webhook_context_feeds_templates() {
        let body = json!({
            "version": "${pactbroker.consumerVersionNumber}",
            "base": "${pactbroker.baseUrl}"
        });
        let dispatcher = HttpWebhookDispatcher::new(vec![target(Vec::new(), Some(body))]);
        let mut metadata = PactMetadata::new();
        metadata.insert("consumer_version_number", "2");
        let configuration = WebhookExecutionConfiguration {
            base_url: Some("http://broker".to_string()),
            ..Default::default()
        }
        .with_webhook_context(&metadata);

        let requests = dispatcher.requests(&event(), &configuration);
        assert_eq!(requests[0].body, json!({ "version": "2", "base": "http://broker" }));
    }

    #[test]
    fn metadata_cannot_replace_broker_values() {
        let body = json!({ "base": "${pactbroker.baseUrl}", "extra": "${pactbroker.branch}" });
        let dispatcher = HttpWebhookDispatcher::new(vec![target(Vec::new(), Some(body))]);
        let mut metadata = PactMetadata::new();
        metadata.insert("provider_name", "evil/../../x");
        metadata.insert("base_url", "http://attacker");
        metadata.insert("branch", "main");
        let configuration = WebhookExecutionConfiguration {
            base_url: Some("http://broker".to_string()),
            ..Default::default()
        }
        .with_webhook_context(&metadata);

        let requests = dispatcher.requests(&event(), &configuration);
        assert_eq!(requests[0].url, "http://ci.example.org/build/Bar");
        assert_eq!(requests[0].body, json!({ "base": "http://broker", "extra": "main" }));
    }

    #[test]
    fn substituted_names_are_encoded_in_the_url() {
        let dispatcher = HttpWebhookDispatcher::new(vec![target(Vec::new(), None)]);
        let event = WebhookEvent::new(WebhookKind::ContractPublished)
            .with("consumerName", "Foo")
            .with("providerName", "Bar Service/v2");
        let requests = dispatcher.requests(&event, &WebhookExecutionConfiguration::default());
        assert_eq!(requests[0].url, "http://ci.example.org/build/Bar%20Service%2Fv2");
    }

    #[test]
    fn dispatch_outside_runtime_is_dropped() {
        let dispatcher = HttpWebhookDispatcher::new(vec![target(Vec::new(), None)]);
        dispatcher.dispatch(event(), &WebhookExecutionConfiguration::default());
    }
}
