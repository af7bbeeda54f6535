//! Midtrans Snap gateway.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GatewayError, PaymentGateway, PaymentIntent, PaymentIntentRequest};

const SANDBOX_URL: &str = "https://app.sandbox.midtrans.com/snap/v1/transactions";
const PRODUCTION_URL: &str = "https://app.midtrans.com/snap/v1/transactions";

/// Snap rejects item names longer than this.
const MAX_ITEM_NAME_CHARS: usize = 50;

/// Opens Snap payment pages over HTTPS.
///
/// Authenticates with the merchant server key as the basic-auth user name and
/// an empty password.
#[derive(Clone)]
pub struct SnapGateway {
    server_key: String,
    endpoint: String,
    http_client: Client,
}

impl SnapGateway {
    /// Creates a gateway for the sandbox or production environment.
    pub fn new(server_key: impl Into<String>, production: bool) -> Self {
        let endpoint = if production {
            PRODUCTION_URL
        } else {
            SANDBOX_URL
        };
        Self::with_endpoint(server_key, endpoint)
    }

    /// Creates a gateway posting to a custom endpoint.
    pub fn with_endpoint(server_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            server_key: server_key.into(),
            endpoint: endpoint.into(),
            http_client: Client::new(),
        }
    }

    /// Returns the URL transactions are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for SnapGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapGateway")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct SnapRequest<'a> {
    transaction_details: TransactionDetails<'a>,
    item_details: Vec<SnapItem<'a>>,
    customer_details: SnapCustomer<'a>,
}

#[derive(Debug, Serialize)]
struct TransactionDetails<'a> {
    order_id: &'a str,
    gross_amount: i64,
}

#[derive(Debug, Serialize)]
struct SnapItem<'a> {
    id: &'a str,
    name: String,
    price: i64,
    quantity: u32,
}

#[derive(Debug, Serialize)]
struct SnapCustomer<'a> {
    first_name: &'a str,
    email: &'a str,
    phone: &'a str,
}

#[derive(Debug, Deserialize)]
struct SnapResponse {
    token: String,
    redirect_url: String,
}

impl<'a> From<&'a PaymentIntentRequest> for SnapRequest<'a> {
    fn from(request: &'a PaymentIntentRequest) -> Self {
        Self {
            transaction_details: TransactionDetails {
                order_id: &request.order_ref,
                gross_amount: request.gross_amount.amount(),
            },
            item_details: request
                .items
                .iter()
                .map(|item| SnapItem {
                    id: &item.id,
                    name: item.name.chars().take(MAX_ITEM_NAME_CHARS).collect(),
                    price: item.price,
                    quantity: item.quantity,
                })
                .collect(),
            customer_details: SnapCustomer {
                first_name: &request.customer.name,
                email: &request.customer.email,
                phone: &request.customer.phone,
            },
        }
    }
}

#[async_trait]
impl PaymentGateway for SnapGateway {
    #[tracing::instrument(skip(self, request), fields(order_ref = %request.order_ref))]
    async fn create_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .basic_auth(&self.server_key, None::<&str>)
            .json(&SnapRequest::from(request))
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), %body, "snap transaction request failed");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let snap: SnapResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(PaymentIntent {
            token: snap.token,
            redirect_url: snap.redirect_url,
        })
    }
}
