//! WhatsApp coupon delivery through the AiSensy template API.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};
use winback_core::channels::{CouponMessage, DispatchResult};
use winback_core::config::MessagingConfig;
use winback_core::error::{WinbackError, WinbackResult};

/// Longest response body kept as diagnostic detail.
const MAX_DETAIL_CHARS: usize = 512;

/// Response fields that may carry the provider's message id.
const MESSAGE_ID_FIELDS: [&str; 3] = ["submitted_message_id", "message_id", "id"];

/// Request body of a template send.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TemplatePayload {
    pub to: String,
    pub template: String,
    pub data: TemplateData,
}

/// Template variables of the coupon offer template.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TemplateData {
    pub name: String,
    pub discount: String,
    pub coupon_code: String,
    pub valid_till: String,
}

pub struct WhatsAppProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    template_name: String,
}

impl WhatsAppProvider {
    pub fn new(config: &MessagingConfig) -> WinbackResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WinbackError::Config(format!("failed to build messaging client: {e}")))?;

        info!(
            api_url = %config.api_url,
            template = %config.template_name,
            timeout_secs = config.timeout_secs,
            "WhatsApp provider initialized"
        );

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            template_name: config.template_name.clone(),
        })
    }

    pub fn build_payload(&self, message: &CouponMessage) -> TemplatePayload {
        TemplatePayload {
            to: message.recipient.clone(),
            template: self.template_name.clone(),
            data: TemplateData {
                name: message.name.clone(),
                discount: message.discount_label(),
                coupon_code: message.coupon_code.clone(),
                valid_till: message.valid_till_label(),
            },
        }
    }

    /// Send one coupon template message. Exactly one attempt; any 2xx counts
    /// as success, everything else is reported in the result.
    pub async fn send_coupon(&self, message: &CouponMessage) -> DispatchResult {
        let start = Instant::now();
        let payload = self.build_payload(message);

        debug!(
            to = %payload.to,
            template = %payload.template,
            coupon = %payload.data.coupon_code,
            "Sending WhatsApp coupon template"
        );

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                warn!(to = %payload.to, error = %e, "WhatsApp request failed");
                metrics::counter!("whatsapp.transport_errors").increment(1);
                return DispatchResult::transport_failure(e.to_string(), latency_ms);
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let latency_ms = start.elapsed().as_millis() as u64;

        metrics::counter!(
            "whatsapp.responses",
            "status" => status.as_u16().to_string()
        )
        .increment(1);

        DispatchResult {
            status: Some(status.as_u16()),
            success: status.is_success(),
            provider_message_id: extract_message_id(&body),
            detail: truncate_detail(&body),
            latency_ms,
        }
    }
}

fn extract_message_id(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    MESSAGE_ID_FIELDS
        .iter()
        .find_map(|field| value.get(field).and_then(|v| v.as_str()).map(String::from))
}

fn truncate_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_DETAIL_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_DETAIL_CHARS).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn spawn_provider(status: StatusCode, body: &'static str) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let sink = captured.clone();
        let app = Router::new().route(
            "/sendMessage",
            post(move |headers: HeaderMap, Json(payload): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from);
                    sink.lock().unwrap().push((auth, payload));
                    (status, body)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/sendMessage"), captured)
    }

    fn test_config(api_url: String) -> MessagingConfig {
        MessagingConfig {
            api_url,
            api_key: "sensy-test-key".to_string(),
            template_name: "user_coupon_offer".to_string(),
            timeout_secs: 5,
        }
    }

    fn test_message() -> CouponMessage {
        CouponMessage {
            recipient: "919800000001".to_string(),
            name: "Alok".to_string(),
            percent: 10,
            coupon_code: "SAVE-XA1234".to_string(),
            valid_till: NaiveDate::from_ymd_opt(2026, 10, 21).unwrap(),
        }
    }

    #[test]
    fn test_build_payload_shape() {
        let provider = WhatsAppProvider::new(&test_config("http://localhost/send".to_string())).unwrap();
        let payload = provider.build_payload(&test_message());
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "to": "919800000001",
                "template": "user_coupon_offer",
                "data": {
                    "name": "Alok",
                    "discount": "10%",
                    "coupon_code": "SAVE-XA1234",
                    "valid_till": "21 Oct 2026"
                }
            })
        );
    }

    #[tokio::test]
    async fn test_send_success_uses_bearer_token() {
        let (url, captured) =
            spawn_provider(StatusCode::OK, r#"{"submitted_message_id":"wamid.123"}"#).await;
        let provider = WhatsAppProvider::new(&test_config(url)).unwrap();

        let result = provider.send_coupon(&test_message()).await;
        assert!(result.success);
        assert_eq!(result.status, Some(200));
        assert_eq!(result.provider_message_id.as_deref(), Some("wamid.123"));

        let calls = captured.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.as_deref(), Some("Bearer sensy-test-key"));
        assert_eq!(calls[0].1["data"]["coupon_code"], "SAVE-XA1234");
    }

    #[tokio::test]
    async fn test_send_non_success_status_is_failure() {
        let (url, captured) =
            spawn_provider(StatusCode::BAD_REQUEST, r#"{"error":"template not approved"}"#).await;
        let provider = WhatsAppProvider::new(&test_config(url)).unwrap();

        let result = provider.send_coupon(&test_message()).await;
        assert!(!result.success);
        assert_eq!(result.status, Some(400));
        assert!(result.detail.contains("template not approved"));
        // One attempt only.
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_transport_failure() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider =
            WhatsAppProvider::new(&test_config(format!("http://{addr}/sendMessage"))).unwrap();
        let result = provider.send_coupon(&test_message()).await;
        assert!(!result.success);
        assert!(result.status.is_none());
        assert!(!result.detail.is_empty());
    }

    #[test]
    fn test_truncate_detail() {
        let long = "x".repeat(MAX_DETAIL_CHARS + 10);
        let out = truncate_detail(&long);
        assert_eq!(out.chars().count(), MAX_DETAIL_CHARS + 1);
        assert_eq!(truncate_detail("  ok  "), "ok");
    }

    #[test]
    fn test_extract_message_id() {
        assert_eq!(extract_message_id(r#"{"id":"m-1"}"#).as_deref(), Some("m-1"));
        assert_eq!(extract_message_id("not json"), None);
        assert_eq!(extract_message_id(r#"{"id":7}"#), None);
    }
}
