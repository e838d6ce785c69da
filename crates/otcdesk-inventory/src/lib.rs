//! # otcdesk-inventory
//!
//! **Inventory plane**: what a desk trades, what it is worth, and where the
//! tokens sit.
//!
//! ## Architecture
//!
//! 1. **TokenRegistry**: per-desk assets, their decimals and price source
//! 2. **PricingOracle**: resolves USD prices through the [`PriceFeed`] port,
//!    enforcing staleness, round monotonicity and positivity
//! 3. **ConsignmentLedger**: validates listings, admits buyers, closes listings
//! 4. **EscrowAccounting**: moves the per-(desk, asset) deposited / consigned /
//!    reserved counters and enforces `reserved + consigned <= deposited`
//!
//! Everything here is pure: records go in, updated records or errors come
//! out. Clocks, persistence and transfers belong to the settlement crate.

pub mod consignment_ledger;
pub mod escrow;
pub mod math;
pub mod oracle;
pub mod registry;

pub use consignment_ledger::ConsignmentLedger;
pub use escrow::EscrowAccounting;
pub use oracle::{FeedReading, PriceFeed, PricingOracle, ResolvedPrice, StaticPriceFeed};
pub use registry::TokenRegistry;
