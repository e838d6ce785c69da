//! # otcdesk-types
//!
//! Shared records, errors, and configuration for the **OTC desk** engine.
//!
//! This crate is the leaf dependency of the workspace: every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`DeskId`], [`Identity`], [`AssetId`], [`FeedId`], [`ConsignmentId`], [`OfferId`]
//! - **Desk model**: [`Desk`], [`DeskLimits`], [`DeskPricing`], [`EmergencySettings`]
//! - **Inventory model**: [`TokenRegistryEntry`], [`Consignment`], [`ConsignmentTerms`], [`EscrowPosition`]
//! - **Offer model**: [`Offer`], [`OfferState`], [`OfferOrigin`], [`Currency`]
//! - **Bounded sets**: [`IdentitySet`], [`ApproverSet`], [`AllowList`]
//! - **Events**: [`DeskEvent`], [`EventEnvelope`]
//! - **Configuration**: [`DeskConfig`]
//! - **Errors**: [`OtcError`] with `OTC_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults

pub mod bounded;
pub mod config;
pub mod consignment;
pub mod constants;
pub mod desk;
pub mod error;
pub mod escrow;
pub mod event;
pub mod ids;
pub mod offer;
pub mod registry;

// Re-export all primary types at crate root for ergonomic imports:
//   use otcdesk_types::{Desk, Offer, Consignment, OtcError, ...};

pub use bounded::*;
pub use config::*;
pub use consignment::*;
pub use desk::*;
pub use error::*;
pub use escrow::*;
pub use event::*;
pub use ids::*;
pub use offer::*;
pub use registry::*;

// Constants are accessed via `otcdesk_types::constants::FOO`
// (not re-exported to avoid name collisions).
