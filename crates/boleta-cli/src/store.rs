//! Registration store backed by the platform's HTTP API.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use boleta_core::approval::ApprovalRejection;
use boleta_core::error::StoreError;
use boleta_core::models::candidate::Candidate;
use boleta_core::models::config::StoreConfig;
use boleta_core::reconcile::{ExpectedAmountSource, RegistrationStore};

#[derive(Serialize)]
struct ApproveRequest<'a> {
    receipt_code: &'a str,
}

#[derive(Deserialize)]
struct OrderSummary {
    #[serde(default)]
    expected_amount: Option<Decimal>,
}

/// HTTP client for the registration API.
#[derive(Clone, Debug)]
pub struct HttpRegistrationStore {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRegistrationStore {
    pub fn new(config: &StoreConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("boleta/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        })
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        self.apply_auth(request)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

/// Map a refused approval response to a rejection reason.
fn rejection_for_status(status: StatusCode, body: String) -> ApprovalRejection {
    match status {
        StatusCode::NOT_FOUND => ApprovalRejection::NotFound,
        StatusCode::CONFLICT => ApprovalRejection::AlreadyApproved,
        StatusCode::UNPROCESSABLE_ENTITY => ApprovalRejection::CodeMismatch,
        _ => ApprovalRejection::store(format!("status {}: {}", status.as_u16(), body)),
    }
}

#[async_trait]
impl RegistrationStore for HttpRegistrationStore {
    async fn find_by_code(&self, code: &str) -> Result<Vec<Candidate>, StoreError> {
        let request = self
            .client
            .get(self.build_url("/registrations"))
            .query(&[("receipt_code", code)]);

        let candidates: Vec<Candidate> = Self::decode(self.send(request).await?).await?;
        debug!("Store returned {} registrations for {}", candidates.len(), code);
        Ok(candidates)
    }

    async fn approve(&self, code: &str, candidate_id: &str) -> Result<(), ApprovalRejection> {
        let request = self
            .client
            .post(self.build_url(&format!("/registrations/{}/approve", candidate_id)))
            .json(&ApproveRequest { receipt_code: code });

        let response = self
            .send(request)
            .await
            .map_err(|e| ApprovalRejection::store(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(rejection_for_status(status, body))
    }
}

#[async_trait]
impl ExpectedAmountSource for HttpRegistrationStore {
    async fn expected_amount(&self, code: &str) -> Result<Option<Decimal>, StoreError> {
        let request = self.client.get(self.build_url(&format!("/orders/{}", code)));
        let response = self.send(request).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let order: OrderSummary = Self::decode(response).await?;
        Ok(order.expected_amount)
    }
}
