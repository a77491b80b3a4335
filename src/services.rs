//! Service wiring
//!
//! Builds the four components over one set of stores so they share the
//! same wallet ledger and order lifecycle.

use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::db::Database;
use crate::order::{InMemoryOrderStore, OrderLifecycle, OrderStore, PgOrderStore};
use crate::payment::{
    CredentialVerifier, InMemoryAttemptStore, PaymentAttemptStore, PaymentGateway,
    PaymentOrchestrator, PgAttemptStore,
};
use crate::refund::RefundCoordinator;
use crate::wallet::{InMemoryWalletStore, PgWalletStore, WalletLedger, WalletStore};

#[derive(Clone)]
pub struct LedgerServices {
    pub wallets: Arc<WalletLedger>,
    pub orders: Arc<OrderLifecycle>,
    pub payments: Arc<PaymentOrchestrator>,
    pub refunds: Arc<RefundCoordinator>,
}

impl LedgerServices {
    pub fn from_stores(
        config: &AppConfig,
        wallet_store: Arc<dyn WalletStore>,
        order_store: Arc<dyn OrderStore>,
        attempt_store: Arc<dyn PaymentAttemptStore>,
        gateway: Arc<dyn PaymentGateway>,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> Self {
        let wallets = Arc::new(WalletLedger::new(wallet_store, &config.ledger));
        let orders = Arc::new(OrderLifecycle::new(
            order_store,
            wallets.clone(),
            &config.ledger,
            &config.orders,
        ));
        let payments = Arc::new(PaymentOrchestrator::new(
            orders.clone(),
            attempt_store,
            gateway,
            credentials,
            config.payments.clone(),
        ));
        let refunds = Arc::new(RefundCoordinator::new(orders.clone()));

        Self {
            wallets,
            orders,
            payments,
            refunds,
        }
    }

    /// Everything in process memory
    pub fn in_memory(
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self::from_stores(
            config,
            Arc::new(InMemoryWalletStore::new()),
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(InMemoryAttemptStore::new()),
            gateway,
            credentials,
        )
    }

    pub fn postgres(
        pool: PgPool,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self::from_stores(
            config,
            Arc::new(PgWalletStore::new(pool.clone())),
            Arc::new(PgOrderStore::new(pool.clone())),
            Arc::new(PgAttemptStore::new(pool)),
            gateway,
            credentials,
        )
    }

    /// PostgreSQL when `postgres_url` is configured, in-memory otherwise
    pub async fn connect(
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> anyhow::Result<Self> {
        let Some(url) = config.postgres_url.as_deref() else {
            info!("No postgres_url configured, using in-memory stores");
            return Ok(Self::in_memory(config, gateway, credentials));
        };

        let db = Database::connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        db.init_schema()
            .await
            .context("Failed to initialize ledger schema")?;
        Ok(Self::postgres(db.pool().clone(), config, gateway, credentials))
    }
}
