//! # otcdesk-settlement
//!
//! **Finality plane**: where validated decisions become committed state.
//!
//! ## Architecture
//!
//! The [`LifecycleController`] is the single entry point. For every
//! operation it:
//! 1. Reads committed records through the [`LedgerView`] port
//! 2. Resolves prices through the [`PriceFeed`](otcdesk_inventory::PriceFeed) port
//! 3. Runs the pure inventory and offer planes
//! 4. Commits one [`Changeset`] (records, transfers, events) atomically
//!
//! [`InMemoryLedger`] is the reference adapter: hash-maps for records,
//! balance accounts for transfers, and an [`EventJournal`] an indexer can
//! drain. [`EscrowAudit`] cross-checks escrow counters against offers,
//! listings and treasury balances. [`SharedDesk`] serializes concurrent
//! callers onto one controller.

pub mod controller;
pub mod emergency;
pub mod escrow_audit;
pub mod inventory_ops;
pub mod journal;
pub mod ledger;
pub mod memory;
pub mod offer_ops;
pub mod service;

pub use controller::LifecycleController;
pub use escrow_audit::EscrowAudit;
pub use journal::{EventJournal, JournalEntry};
pub use ledger::{Account, Changeset, Ledger, LedgerAsset, LedgerView, Transfer};
pub use memory::{InMemoryLedger, LedgerConfig, StorageRent};
pub use service::SharedDesk;
