//! # otcdesk-offers
//!
//! **Offer plane**: everything between a buyer's request and a settled trade,
//! minus the side effects.
//!
//! - [`OfferEngine`]: term validation against the listing or desk limits,
//!   inventory reservation, and the fulfill / claim / cancel gates
//! - [`ApprovalQuorum`]: distinct-approver counting up to `required_approvals`
//! - [`payment`]: discounted USD value, currency conversion and the agent's
//!   commission split
//!
//! Like the inventory plane this crate is pure. Prices come in already
//! resolved and `now` is a parameter.

pub mod engine;
pub mod payment;
pub mod quorum;

pub use engine::{CreationPrices, OfferEngine, OfferRequest};
pub use payment::{PaymentQuote, discounted_usd, quote};
pub use quorum::{ApprovalOutcome, ApprovalQuorum};
