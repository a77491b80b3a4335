use sqlx::PgPool;

use super::StoreError;

/// Create ledger tables (idempotent)
pub async fn init_schema(pool: &PgPool) -> Result<(), StoreError> {
    tracing::info!("Initializing ledger schema...");

    for (name, ddl) in [
        ("wallets", CREATE_WALLETS_TABLE),
        ("wallet_entries", CREATE_WALLET_ENTRIES_TABLE),
        ("wallet_entries index", CREATE_WALLET_ENTRIES_INDEX),
        ("service_orders", CREATE_SERVICE_ORDERS_TABLE),
        ("payment_attempts", CREATE_PAYMENT_ATTEMPTS_TABLE),
    ] {
        sqlx::query(ddl).execute(pool).await.map_err(|e| {
            tracing::error!(table = name, error = %e, "Failed to create table");
            StoreError::from(e)
        })?;
    }

    tracing::info!("✅ Ledger schema ready");
    Ok(())
}

pub const CREATE_WALLETS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS wallets (
    user_id       BIGINT PRIMARY KEY,
    balance       BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0),
    frozen        BIGINT NOT NULL DEFAULT 0 CHECK (frozen >= 0),
    coin_balance  BIGINT NOT NULL DEFAULT 0 CHECK (coin_balance >= 0),
    total_income  BIGINT NOT NULL DEFAULT 0,
    total_expense BIGINT NOT NULL DEFAULT 0,
    version       BIGINT NOT NULL DEFAULT 0,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_WALLET_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS wallet_entries (
    id                 BIGSERIAL PRIMARY KEY,
    user_id            BIGINT NOT NULL,
    kind               SMALLINT NOT NULL,
    amount             BIGINT NOT NULL,
    balance_after      BIGINT NOT NULL,
    frozen_after       BIGINT NOT NULL,
    coin_balance_after BIGINT NOT NULL,
    ref_type           SMALLINT NOT NULL,
    ref_id             VARCHAR(64) NOT NULL,
    description        TEXT NOT NULL,
    version            BIGINT NOT NULL,
    created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (user_id, version)
)
"#;

pub const CREATE_WALLET_ENTRIES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_wallet_entries_ref ON wallet_entries (ref_type, ref_id)
"#;

pub const CREATE_SERVICE_ORDERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS service_orders (
    id                BIGSERIAL PRIMARY KEY,
    order_no          VARCHAR(40) NOT NULL UNIQUE,
    buyer_id          BIGINT NOT NULL,
    seller_id         BIGINT NOT NULL,
    content_id        BIGINT NOT NULL,
    base_fee          BIGINT NOT NULL,
    person_fee        BIGINT NOT NULL,
    platform_fee      BIGINT NOT NULL,
    discount_amount   BIGINT NOT NULL,
    actual_amount     BIGINT NOT NULL CHECK (actual_amount >= 0),
    status            SMALLINT NOT NULL,
    payment_method    SMALLINT,
    payment_time      TIMESTAMPTZ,
    completed_at      TIMESTAMPTZ,
    cancel_reason     TEXT,
    cancel_time       TIMESTAMPTZ,
    refund_amount     BIGINT,
    settlement_claimed_at TIMESTAMPTZ,
    seller_settled_at TIMESTAMPTZ,
    extras            TEXT NOT NULL DEFAULT '{}',
    version           BIGINT NOT NULL DEFAULT 0,
    created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_PAYMENT_ATTEMPTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS payment_attempts (
    payment_no     VARCHAR(40) PRIMARY KEY,
    order_id       BIGINT NOT NULL,
    buyer_id       BIGINT NOT NULL,
    method         SMALLINT NOT NULL,
    amount         BIGINT NOT NULL,
    status         SMALLINT NOT NULL,
    third_party_no VARCHAR(128),
    created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    finished_at    TIMESTAMPTZ
)
"#;
