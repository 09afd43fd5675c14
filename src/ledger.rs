//! Payment ledger collaborator.
//!
//! The ledger reports the current balance and the per-day cost of keeping
//! published content alive, and accepts deposits. The wire format of a real
//! payment network is out of scope; [`HttpLedgerClient`] speaks a minimal JSON
//! shape against a gateway:
//!
//! * `GET {endpoint}/status` -> `{"balance": "1.5", "runway_rate": "0.01"}`
//! * `POST {endpoint}/deposit` with `{"amount": "0.3"}`

use crate::error::LedgerError;
use crate::types::TokenAmount;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Ledger state as reported by the collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatus {
    pub balance: TokenAmount,
    /// Cost per day of runway
    pub runway_rate: TokenAmount,
}

/// Payment ledger operations used by the upload phase
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    async fn current_status(&self) -> Result<LedgerStatus, LedgerError>;

    async fn deposit(&self, amount: TokenAmount) -> Result<(), LedgerError>;

    /// Release any held session. Best effort; never fails.
    async fn release(&self);
}

const LEDGER_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const LEDGER_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn build_http_client() -> Result<Client, String> {
    Client::builder()
        .connect_timeout(LEDGER_HTTP_CONNECT_TIMEOUT)
        .timeout(LEDGER_HTTP_REQUEST_TIMEOUT)
        .build()
        .map_err(|e| format!("Failed to create HTTP client: {}", e))
}

fn map_http_error(error: reqwest::Error) -> LedgerError {
    if error.is_timeout() {
        LedgerError::Request(format!("Request timeout: {}", error))
    } else if error.is_connect() {
        LedgerError::Request(format!("Connection error: {}", error))
    } else {
        LedgerError::Request(format!("HTTP error: {}", error))
    }
}

#[derive(Serialize)]
struct DepositRequest {
    amount: TokenAmount,
}

/// Ledger gateway reached over HTTP
pub struct HttpLedgerClient {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpLedgerClient {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Result<Self, LedgerError> {
        let client = build_http_client().map_err(LedgerError::Request)?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }
}

#[async_trait]
impl PaymentLedger for HttpLedgerClient {
    async fn current_status(&self) -> Result<LedgerStatus, LedgerError> {
        let url = format!("{}/status", self.endpoint);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LedgerError::Request(format!(
                "Status request failed: {} - {}",
                status, error_text
            )));
        }

        let status: LedgerStatus = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("Failed to parse status: {}", e)))?;
        debug!(balance = %status.balance, rate = %status.runway_rate, "Ledger status");
        Ok(status)
    }

    async fn deposit(&self, amount: TokenAmount) -> Result<(), LedgerError> {
        let url = format!("{}/deposit", self.endpoint);
        let response = self
            .authorize(self.client.post(&url))
            .json(&DepositRequest { amount })
            .send()
            .await
            .map_err(map_http_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LedgerError::Request(format!(
                "Deposit of {} failed: {} - {}",
                amount, status, error_text
            )));
        }

        info!(amount = %amount, "Deposit accepted");
        Ok(())
    }

    async fn release(&self) {
        debug!(endpoint = %self.endpoint, "Ledger session released");
    }
}
