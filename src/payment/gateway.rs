//! External payment collaborators
//!
//! Both are black boxes to the ledger. The gateway's wire protocol lives in
//! the adapter; the core only sees `GatewayRequest` going out and
//! `GatewayCallback` coming back.

use async_trait::async_trait;
use dashmap::DashMap;

use super::types::{GatewayPayload, GatewayRequest};
use crate::core_types::UserId;

/// Starts a third-party checkout
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Gateway name for logging
    fn name(&self) -> &'static str;

    /// Register the checkout and return what the buyer is shown.
    /// Calling again with the same `payment_no` must not charge twice.
    async fn create_checkout(&self, request: &GatewayRequest) -> Result<GatewayPayload, String>;
}

/// `(user_id, pin) -> bool`
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, user_id: UserId, pin: &str) -> bool;
}

/// Pins held in memory, for local runs and tests
#[derive(Default)]
pub struct StaticPinVerifier {
    pins: DashMap<UserId, String>,
}

impl StaticPinVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pin(self, user_id: UserId, pin: impl Into<String>) -> Self {
        self.pins.insert(user_id, pin.into());
        self
    }

    pub fn set_pin(&self, user_id: UserId, pin: impl Into<String>) {
        self.pins.insert(user_id, pin.into());
    }
}

#[async_trait]
impl CredentialVerifier for StaticPinVerifier {
    async fn verify(&self, user_id: UserId, pin: &str) -> bool {
        self.pins.get(&user_id).is_some_and(|p| p.as_str() == pin)
    }
}

/// Gateway that only records checkouts and hands back a redirect URL.
/// The payment itself is settled later by feeding a callback to the
/// orchestrator.
pub struct RecordingGateway {
    base_url: String,
    checkouts: DashMap<String, GatewayRequest>,
}

impl RecordingGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            checkouts: DashMap::new(),
        }
    }

    pub fn checkout(&self, payment_no: &str) -> Option<GatewayRequest> {
        self.checkouts.get(payment_no).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.checkouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkouts.is_empty()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn create_checkout(&self, request: &GatewayRequest) -> Result<GatewayPayload, String> {
        self.checkouts
            .entry(request.payment_no.clone())
            .or_insert_with(|| request.clone());
        Ok(GatewayPayload {
            redirect_url: Some(format!(
                "{}/checkout/{}",
                self.base_url.trim_end_matches('/'),
                request.payment_no
            )),
            qr_code: None,
        })
    }
}
