//! Payments
//!
//! Wallet payments are synchronous and compensated on failure; third-party
//! payments are recorded as attempts and finished by an idempotent gateway
//! callback.

pub mod error;
pub mod gateway;
pub mod memory;
pub mod orchestrator;
pub mod postgres;
pub mod store;
pub mod types;

pub use error::PaymentError;
pub use gateway::{CredentialVerifier, PaymentGateway, RecordingGateway, StaticPinVerifier};
pub use memory::InMemoryAttemptStore;
pub use orchestrator::PaymentOrchestrator;
pub use postgres::PgAttemptStore;
pub use store::PaymentAttemptStore;
pub use types::{
    AttemptStatus, CallbackAck, CallbackOutcome, GatewayCallback, GatewayCheckout, GatewayPayload,
    GatewayRequest, PaymentAttempt, PaymentReceipt,
};
