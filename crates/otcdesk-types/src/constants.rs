//! System-wide constants and defaults.

/// Basis-point denominator (100% = 10 000 bps).
pub const BPS_DENOMINATOR: u16 = 10_000;

/// Seconds in one day. Lockups are expressed in whole days on consignments.
pub const SECONDS_PER_DAY: i64 = 86_400;

// ---------------------------------------------------------------------------
// Commission
// ---------------------------------------------------------------------------

/// Lower bound of the agent commission on negotiated offers.
pub const MIN_NEGOTIATED_COMMISSION_BPS: u16 = 25;

/// Upper bound of the agent commission on negotiated offers.
pub const MAX_NEGOTIATED_COMMISSION_BPS: u16 = 150;

// ---------------------------------------------------------------------------
// Bounded sets
// ---------------------------------------------------------------------------

/// Maximum number of explicit approvers per desk.
pub const MAX_APPROVERS: usize = 32;

/// Maximum number of identities on a private consignment's allow-list.
pub const MAX_ALLOWLIST: usize = 16;

// ---------------------------------------------------------------------------
// Desk limits
// ---------------------------------------------------------------------------

/// Shortest permitted quote expiry.
pub const MIN_QUOTE_EXPIRY_SECS: i64 = 60;

/// Default quote expiry (30 minutes).
pub const DEFAULT_QUOTE_EXPIRY_SECS: i64 = 30 * 60;

/// Default maximum age of a feed price before it is considered stale.
pub const DEFAULT_MAX_PRICE_AGE_SECS: i64 = 3_600;

/// Default maximum lockup for direct desk offers (one year).
pub const DEFAULT_MAX_LOCKUP_SECS: i64 = 365 * SECONDS_PER_DAY;

/// Default maximum token amount per direct order (raw units).
pub const DEFAULT_MAX_TOKEN_PER_ORDER: u64 = u64::MAX;

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Fixed-point decimals used for USD prices.
pub const PRICE_DECIMALS: u32 = 8;

/// Largest manual token price accepted, 8 decimals ($10 000).
pub const MAX_TOKEN_PRICE_8D: u64 = 1_000_000_000_000;

/// Smallest manual native price accepted, 8 decimals ($0.01).
pub const MIN_NATIVE_PRICE_8D: u64 = 1_000_000;

/// Largest manual native price accepted, 8 decimals ($100 000).
pub const MAX_NATIVE_PRICE_8D: u64 = 10_000_000_000_000;

/// Largest token decimals supported by the fixed-point math.
pub const MAX_TOKEN_DECIMALS: u8 = 18;

/// Default decimals of the stable payment unit.
pub const DEFAULT_STABLE_DECIMALS: u8 = 6;

/// Decimals of the native payment unit.
pub const NATIVE_DECIMALS: u8 = 9;

// ---------------------------------------------------------------------------
// Emergency controls
// ---------------------------------------------------------------------------

/// Default window after offer creation before an emergency refund opens.
pub const DEFAULT_EMERGENCY_REFUND_DEADLINE_SECS: i64 = 30 * SECONDS_PER_DAY;

/// Grace period after unlock after which an emergency refund always opens.
pub const EMERGENCY_REFUND_UNLOCK_GRACE_SECS: i64 = 30 * SECONDS_PER_DAY;

/// Inactivity required before the owner may force an unclaimed delivery.
pub const ADMIN_EMERGENCY_DELAY_SECS: i64 = 180 * SECONDS_PER_DAY;

// ---------------------------------------------------------------------------
// Versioning
// ---------------------------------------------------------------------------

/// Engine name used in journal hashing and logs.
pub const ENGINE_NAME: &str = "otcdesk";

/// Engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
