//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

/// User ID - globally unique, immutable after assignment.
///
/// Arrives already authenticated from the request layer; the core never
/// resolves identity on its own.
pub type UserId = u64;

/// Order ID - surrogate key assigned by the order store
pub type OrderId = u64;

/// Money in minor units (e.g. cents). Never negative.
pub type MinorUnits = u64;

/// Virtual currency, whole units
pub type Coins = u64;

/// Monotonic optimistic-lock counter carried by every mutable row
pub type Version = u64;

/// Basis points (1/100 of a percent)
pub type Bps = u32;

pub const BPS_DENOMINATOR: u64 = 10_000;
