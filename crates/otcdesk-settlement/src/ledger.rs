//! The `Ledger` port.
//!
//! The controller reads committed records through [`LedgerView`] and writes
//! each operation's full effect as one [`Changeset`] through
//! [`Ledger::commit`]. An adapter must apply a changeset entirely or not at
//! all; that is the only atomicity the engine relies on.

use otcdesk_types::{
    AssetId, Consignment, ConsignmentId, Desk, DeskEvent, DeskId, EscrowPosition, Identity, Offer, OfferId,
    Result, TokenRegistryEntry,
};
use serde::{Deserialize, Serialize};

/// A balance holder on the host ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Account {
    /// A participant's own wallet.
    Holder(Identity),
    /// The desk-controlled account that holds escrowed tokens and payments.
    Treasury(DeskId),
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Holder(id) => write!(f, "{id}"),
            Self::Treasury(desk) => write!(f, "treasury:{desk}"),
        }
    }
}

/// Anything the host ledger can move.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerAsset {
    Token(AssetId),
    /// The USD stable payment unit.
    Stable,
    /// The ledger's native asset.
    Native,
}

impl std::fmt::Display for LedgerAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(asset) => write!(f, "{asset}"),
            Self::Stable => write!(f, "STABLE"),
            Self::Native => write!(f, "NATIVE"),
        }
    }
}

/// One balance movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub asset: LedgerAsset,
    pub from: Account,
    pub to: Account,
    pub amount: u64,
}

/// Everything one operation writes.
///
/// Records replace their stored versions. Transfers apply in order, so a
/// later transfer may spend what an earlier one credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    pub desk_id: DeskId,
    pub desk: Option<Desk>,
    pub registry: Vec<TokenRegistryEntry>,
    pub consignments: Vec<Consignment>,
    pub offers: Vec<Offer>,
    pub escrow: Vec<EscrowPosition>,
    pub transfers: Vec<Transfer>,
    pub events: Vec<DeskEvent>,
}

impl Changeset {
    #[must_use]
    pub fn new(desk_id: DeskId) -> Self {
        Self {
            desk_id,
            desk: None,
            registry: Vec::new(),
            consignments: Vec::new(),
            offers: Vec::new(),
            escrow: Vec::new(),
            transfers: Vec::new(),
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_desk(mut self, desk: Desk) -> Self {
        self.desk = Some(desk);
        self
    }

    #[must_use]
    pub fn with_registry(mut self, entry: TokenRegistryEntry) -> Self {
        self.registry.push(entry);
        self
    }

    #[must_use]
    pub fn with_consignment(mut self, consignment: Consignment) -> Self {
        self.consignments.push(consignment);
        self
    }

    #[must_use]
    pub fn with_offer(mut self, offer: Offer) -> Self {
        self.offers.push(offer);
        self
    }

    #[must_use]
    pub fn with_escrow(mut self, position: EscrowPosition) -> Self {
        self.escrow.push(position);
        self
    }

    /// Queue a transfer. Zero amounts are dropped.
    #[must_use]
    pub fn with_transfer(mut self, asset: LedgerAsset, from: Account, to: Account, amount: u64) -> Self {
        if amount > 0 {
            self.transfers.push(Transfer { asset, from, to, amount });
        }
        self
    }

    #[must_use]
    pub fn with_event(mut self, event: DeskEvent) -> Self {
        self.events.push(event);
        self
    }
}

/// Read access to committed state.
pub trait LedgerView {
    /// Current ledger time, unix seconds.
    fn now(&self) -> i64;

    fn desk(&self, id: DeskId) -> Option<Desk>;

    fn registry_entry(&self, desk: DeskId, asset: &AssetId) -> Option<TokenRegistryEntry>;

    fn consignment(&self, desk: DeskId, id: ConsignmentId) -> Option<Consignment>;

    fn offer(&self, desk: DeskId, id: OfferId) -> Option<Offer>;

    /// All consignments of `desk`, ordered by id.
    fn consignments(&self, desk: DeskId) -> Vec<Consignment>;

    /// All offers of `desk`, ordered by id.
    fn offers(&self, desk: DeskId) -> Vec<Offer>;

    /// Escrow counters for (desk, asset); empty if never touched.
    fn escrow_position(&self, desk: DeskId, asset: &AssetId) -> EscrowPosition;

    /// Every escrow position `desk` has touched.
    fn escrow_positions(&self, desk: DeskId) -> Vec<EscrowPosition>;

    fn balance(&self, account: &Account, asset: &LedgerAsset) -> u64;

    /// Native balance the desk treasury must keep to pay for its stored records.
    fn storage_reserve(&self, desk: DeskId) -> u64;
}

/// Write access: one atomic commit per operation.
pub trait Ledger: LedgerView {
    /// Apply `changes` entirely, or return an error and apply nothing.
    ///
    /// # Errors
    /// [`otcdesk_types::OtcError::InsufficientBalance`] if a transfer would
    /// overdraw an account, [`otcdesk_types::OtcError::EscrowInvariant`] for
    /// an inconsistent escrow position, or an adapter-specific
    /// [`otcdesk_types::OtcError::Ledger`] failure.
    fn commit(&mut self, changes: Changeset) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_transfers_are_dropped() {
        let desk = DeskId::new();
        let cs = Changeset::new(desk)
            .with_transfer(LedgerAsset::Stable, Account::Treasury(desk), Account::Holder(Identity::ZERO), 0)
            .with_transfer(LedgerAsset::Stable, Account::Treasury(desk), Account::Holder(Identity::ZERO), 5);
        assert_eq!(cs.transfers.len(), 1);
        assert_eq!(cs.transfers[0].amount, 5);
    }

    #[test]
    fn account_display() {
        let desk = DeskId::new();
        assert!(Account::Treasury(desk).to_string().starts_with("treasury:"));
        assert_eq!(LedgerAsset::Token(AssetId::new("ELIZA")).to_string(), "ELIZA");
    }
}
