//! HTTP client for the external slip-verification service.

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde_json::{Value, json},
    tracing::debug,
};

use crate::{
    Result,
    error::Error,
    verdict::{Verdict, extract_verdict},
};

/// What we hand the verifier: a fetchable URL or the raw image bytes.
#[derive(Debug, Clone)]
pub enum SlipPayload {
    Url(String),
    Bytes { data: Vec<u8>, filename: String },
}

/// Verification seam. Tests substitute a scripted verifier.
#[async_trait]
pub trait SlipVerifier: Send + Sync {
    /// Verify a slip. `expected_amount` is forwarded so the service can
    /// match the transfer; pass `None` to re-check without an amount claim.
    async fn verify(&self, payload: SlipPayload, expected_amount: Option<f64>) -> Result<Verdict>;
}

/// Real verifier backed by the service's HTTP API.
pub struct HttpSlipVerifier {
    client: reqwest::Client,
    endpoint: String,
    token: Secret<String>,
}

impl HttpSlipVerifier {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, token: Secret<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token,
        }
    }

    async fn send(&self, payload: SlipPayload, expected_amount: Option<f64>) -> Result<Verdict> {
        let request = self
            .client
            .post(&self.endpoint)
            .header("x-authorization", self.token.expose_secret());

        let request = match payload {
            SlipPayload::Url(url) => {
                let mut body = json!({ "url": url });
                if let Some(amount) = expected_amount {
                    body["amount"] = json!(amount);
                }
                request.json(&body)
            },
            SlipPayload::Bytes { data, filename } => {
                let mut form = reqwest::multipart::Form::new().part(
                    "files",
                    reqwest::multipart::Part::bytes(data).file_name(filename),
                );
                if let Some(amount) = expected_amount {
                    form = form.text("amount", amount.to_string());
                }
                request.multipart(form)
            },
        };

        let response = request
            .send()
            .await
            .map_err(|e| Error::message(format!("verifier unreachable: {e}")))?;
        let http_ok = response.status().is_success();
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::message(format!("verifier response unreadable: {e}")))?;
        // Tolerate empty and non-JSON bodies.
        let body: Value = serde_json::from_str(&text).unwrap_or_else(|_| json!({}));

        let verdict = extract_verdict(http_ok, &body);
        debug!(
            status = %status,
            ok = verdict.ok,
            duplicate = verdict.duplicate,
            amount = ?verdict.amount,
            "slip verified"
        );
        Ok(verdict)
    }
}

#[async_trait]
impl SlipVerifier for HttpSlipVerifier {
    async fn verify(&self, payload: SlipPayload, expected_amount: Option<f64>) -> Result<Verdict> {
        self.send(payload, expected_amount).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn verifier(server: &mockito::ServerGuard) -> HttpSlipVerifier {
        HttpSlipVerifier::new(
            format!("{}/verify", server.url()),
            Secret::new("test-token".to_string()),
        )
    }

    #[tokio::test]
    async fn url_payload_sends_json_and_parses_verdict() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/verify")
            .match_header("x-authorization", "test-token")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "url": "https://dorm.example/media/slip.jpg",
                "amount": 4500.0,
            })))
            .with_status(200)
            .with_body(
                r#"{"message":"Verification success","data":{"amount":"4500.00","transRef":"TR9"}}"#,
            )
            .create_async()
            .await;

        let verdict = verifier(&server)
            .verify(
                SlipPayload::Url("https://dorm.example/media/slip.jpg".into()),
                Some(4500.0),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(verdict.ok);
        assert_eq!(verdict.amount, Some(4500.0));
        assert_eq!(verdict.trans_ref.as_deref(), Some("TR9"));
    }

    #[tokio::test]
    async fn duplicate_code_maps_to_duplicate_verdict() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/verify")
            .with_status(400)
            .with_body(r#"{"code":1012,"message":"duplicate slip"}"#)
            .create_async()
            .await;

        let verdict = verifier(&server)
            .verify(SlipPayload::Url("https://x/slip.jpg".into()), None)
            .await
            .unwrap();
        assert!(verdict.duplicate);
        assert!(!verdict.ok);
        assert_eq!(verdict.message.as_deref(), Some("duplicate slip"));
    }

    #[tokio::test]
    async fn non_json_error_body_degrades_to_failed_verdict() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/verify")
            .with_status(502)
            .with_body("Bad Gateway")
            .create_async()
            .await;

        let verdict = verifier(&server)
            .verify(SlipPayload::Url("https://x/slip.jpg".into()), Some(100.0))
            .await
            .unwrap();
        assert!(!verdict.ok);
        assert!(!verdict.duplicate);
    }

    #[tokio::test]
    async fn bytes_payload_posts_multipart() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/verify")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("multipart/form-data.*".to_string()),
            )
            .with_status(200)
            .with_body(r#"{"message":"Verification success"}"#)
            .create_async()
            .await;

        let verdict = verifier(&server)
            .verify(
                SlipPayload::Bytes {
                    data: vec![1, 2, 3],
                    filename: "slip.jpg".into(),
                },
                None,
            )
            .await
            .unwrap();
        mock.assert_async().await;
        assert!(verdict.ok);
    }
}
