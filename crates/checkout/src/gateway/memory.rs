//! In-memory payment gateway.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{GatewayError, PaymentGateway, PaymentIntent, PaymentIntentRequest};

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    intents: usize,
    last_request: Option<PaymentIntentRequest>,
    fail_on_create: bool,
}

/// In-memory gateway for tests and local runs without gateway credentials.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail every create call.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Returns the number of intents created.
    pub fn intent_count(&self) -> usize {
        self.state.read().unwrap().intents
    }

    /// Returns the most recent request received.
    pub fn last_request(&self) -> Option<PaymentIntentRequest> {
        self.state.read().unwrap().last_request.clone()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<PaymentIntent, GatewayError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(GatewayError::Transport("gateway offline".to_string()));
        }

        state.intents += 1;
        state.last_request = Some(request.clone());
        let token = format!("TOKEN-{:04}", state.intents);
        Ok(PaymentIntent {
            redirect_url: format!("https://pay.invalid/{token}"),
            token,
        })
    }
}
