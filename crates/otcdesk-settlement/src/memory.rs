//! In-memory [`Ledger`] adapter.
//!
//! Holds every record in hash maps, applies changesets atomically, and
//! journals committed events. The clock follows the wall clock until a test
//! pins it with [`InMemoryLedger::set_time`].

use std::collections::HashMap;

use chrono::Utc;
use otcdesk_types::{
    AssetId, Consignment, ConsignmentId, Desk, DeskId, EscrowPosition, EventEnvelope, OfferId, Offer, OtcError,
    Result, TokenRegistryEntry,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::journal::{EventJournal, JournalEntry};
use crate::ledger::{Account, Changeset, Ledger, LedgerAsset, LedgerView};

/// Native units held back per stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageRent {
    /// Flat amount for the desk record itself.
    pub base: u64,
    /// Added per registry entry, consignment and offer.
    pub per_record: u64,
}

impl Default for StorageRent {
    fn default() -> Self {
        Self {
            base: 2_000_000,
            per_record: 1_500_000,
        }
    }
}

/// Adapter settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub storage_rent: StorageRent,
}

impl LedgerConfig {
    /// # Errors
    /// [`OtcError::Serialization`] on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A complete ledger in process memory.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    config: LedgerConfig,
    pinned_time: Option<i64>,
    desks: HashMap<DeskId, Desk>,
    registry: HashMap<(DeskId, AssetId), TokenRegistryEntry>,
    consignments: HashMap<(DeskId, ConsignmentId), Consignment>,
    offers: HashMap<(DeskId, OfferId), Offer>,
    escrow: HashMap<(DeskId, AssetId), EscrowPosition>,
    balances: HashMap<(Account, LedgerAsset), u64>,
    journal: EventJournal,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Pin the clock.
    pub fn set_time(&mut self, now: i64) {
        self.pinned_time = Some(now);
    }

    /// Move the clock forward, pinning it first if it follows the wall clock.
    pub fn advance(&mut self, secs: i64) {
        let now = self.now();
        self.pinned_time = Some(now.saturating_add(secs));
    }

    /// Credit `amount` out of thin air. Host-side funding for wallets.
    pub fn mint(&mut self, account: Account, asset: LedgerAsset, amount: u64) {
        let balance = self.balances.entry((account, asset.clone())).or_insert(0);
        *balance = balance.saturating_add(amount);
        debug!(%account, %asset, amount, "Minted");
    }

    #[must_use]
    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    /// Hand journaled events to an indexer.
    pub fn drain_events(&mut self) -> Vec<JournalEntry> {
        self.journal.drain()
    }

    fn record_count(&self, desk: DeskId) -> u64 {
        let registry = self.registry.keys().filter(|(d, _)| *d == desk).count();
        let consignments = self.consignments.keys().filter(|(d, _)| *d == desk).count();
        let offers = self.offers.keys().filter(|(d, _)| *d == desk).count();
        u64::try_from(registry + consignments + offers).unwrap_or(u64::MAX)
    }

    /// Apply the transfers of `changes` to a staged copy of the touched
    /// balances.
    fn stage_transfers(&self, changes: &Changeset) -> Result<HashMap<(Account, LedgerAsset), u64>> {
        let mut staged: HashMap<(Account, LedgerAsset), u64> = HashMap::new();
        for t in &changes.transfers {
            let from_key = (t.from, t.asset.clone());
            let available = staged
                .get(&from_key)
                .copied()
                .unwrap_or_else(|| self.balances.get(&from_key).copied().unwrap_or(0));
            if available < t.amount {
                return Err(OtcError::InsufficientBalance {
                    needed: t.amount,
                    available,
                });
            }
            staged.insert(from_key, available - t.amount);

            let to_key = (t.to, t.asset.clone());
            let current = staged
                .get(&to_key)
                .copied()
                .unwrap_or_else(|| self.balances.get(&to_key).copied().unwrap_or(0));
            staged.insert(to_key, current.checked_add(t.amount).ok_or(OtcError::Overflow)?);
        }
        Ok(staged)
    }
}

impl LedgerView for InMemoryLedger {
    fn now(&self) -> i64 {
        self.pinned_time.unwrap_or_else(|| Utc::now().timestamp())
    }

    fn desk(&self, id: DeskId) -> Option<Desk> {
        self.desks.get(&id).cloned()
    }

    fn registry_entry(&self, desk: DeskId, asset: &AssetId) -> Option<TokenRegistryEntry> {
        self.registry.get(&(desk, asset.clone())).cloned()
    }

    fn consignment(&self, desk: DeskId, id: ConsignmentId) -> Option<Consignment> {
        self.consignments.get(&(desk, id)).cloned()
    }

    fn offer(&self, desk: DeskId, id: OfferId) -> Option<Offer> {
        self.offers.get(&(desk, id)).cloned()
    }

    fn consignments(&self, desk: DeskId) -> Vec<Consignment> {
        let mut out: Vec<Consignment> = self
            .consignments
            .iter()
            .filter(|((d, _), _)| *d == desk)
            .map(|(_, c)| c.clone())
            .collect();
        out.sort_by_key(|c| c.id);
        out
    }

    fn offers(&self, desk: DeskId) -> Vec<Offer> {
        let mut out: Vec<Offer> = self
            .offers
            .iter()
            .filter(|((d, _), _)| *d == desk)
            .map(|(_, o)| o.clone())
            .collect();
        out.sort_by_key(|o| o.id);
        out
    }

    fn escrow_position(&self, desk: DeskId, asset: &AssetId) -> EscrowPosition {
        self.escrow
            .get(&(desk, asset.clone()))
            .cloned()
            .unwrap_or_else(|| EscrowPosition::empty(desk, asset.clone()))
    }

    fn escrow_positions(&self, desk: DeskId) -> Vec<EscrowPosition> {
        let mut out: Vec<EscrowPosition> = self
            .escrow
            .iter()
            .filter(|((d, _), _)| *d == desk)
            .map(|(_, p)| p.clone())
            .collect();
        out.sort_by(|a, b| a.asset.cmp(&b.asset));
        out
    }

    fn balance(&self, account: &Account, asset: &LedgerAsset) -> u64 {
        self.balances.get(&(*account, asset.clone())).copied().unwrap_or(0)
    }

    fn storage_reserve(&self, desk: DeskId) -> u64 {
        if !self.desks.contains_key(&desk) {
            return 0;
        }
        let rent = self.config.storage_rent;
        rent.base
            .saturating_add(rent.per_record.saturating_mul(self.record_count(desk)))
    }
}

impl Ledger for InMemoryLedger {
    fn commit(&mut self, changes: Changeset) -> Result<()> {
        // Validate everything before the first write.
        if let Some(desk) = &changes.desk {
            if desk.id != changes.desk_id {
                return Err(OtcError::Ledger(format!(
                    "changeset for {} carries desk {}",
                    changes.desk_id, desk.id
                )));
            }
        } else if !self.desks.contains_key(&changes.desk_id) {
            return Err(OtcError::DeskNotFound(changes.desk_id));
        }
        for position in &changes.escrow {
            position.check()?;
        }
        let staged = self.stage_transfers(&changes)?;

        let now = self.now();
        let desk_id = changes.desk_id;
        let envelopes = changes
            .events
            .into_iter()
            .map(|event| EventEnvelope {
                desk: desk_id,
                at: now,
                event,
            })
            .collect();
        let sealed = self.journal.seal(envelopes)?;

        if let Some(desk) = changes.desk {
            self.desks.insert(desk.id, desk);
        }
        for entry in changes.registry {
            self.registry.insert((entry.desk, entry.asset.clone()), entry);
        }
        for consignment in changes.consignments {
            self.consignments.insert((consignment.desk, consignment.id), consignment);
        }
        for offer in changes.offers {
            self.offers.insert((offer.desk, offer.id), offer);
        }
        for position in changes.escrow {
            self.escrow.insert((position.desk, position.asset.clone()), position);
        }
        let transfers = changes.transfers.len();
        self.balances.extend(staged);

        self.journal.extend(sealed);

        info!(desk = %desk_id, transfers, journal = self.journal.len(), "Changeset committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otcdesk_types::{DeskEvent, Identity};

    fn ledger_with_desk() -> (InMemoryLedger, DeskId) {
        let mut ledger = InMemoryLedger::new(LedgerConfig::default());
        ledger.set_time(1_000);
        let desk = Desk::dummy(Identity([1; 32]), Identity([2; 32]));
        let id = desk.id;
        ledger
            .commit(Changeset::new(id).with_desk(desk).with_event(DeskEvent::PauseUpdated { paused: false }))
            .unwrap();
        (ledger, id)
    }

    #[test]
    fn failed_transfer_leaves_nothing_behind() {
        let (mut ledger, desk) = ledger_with_desk();
        let alice = Account::Holder(Identity([7; 32]));
        ledger.mint(alice, LedgerAsset::Stable, 100);
        let journal_len = ledger.journal().len();

        let mut offer = Offer::dummy(Identity([7; 32]), 10);
        offer.desk = desk;
        let cs = Changeset::new(desk)
            .with_offer(offer.clone())
            .with_transfer(LedgerAsset::Stable, alice, Account::Treasury(desk), 60)
            .with_transfer(LedgerAsset::Stable, alice, Account::Treasury(desk), 60)
            .with_event(DeskEvent::PauseUpdated { paused: true });

        let err = ledger.commit(cs).unwrap_err();
        assert_eq!(err, OtcError::InsufficientBalance { needed: 60, available: 40 });
        assert_eq!(ledger.balance(&alice, &LedgerAsset::Stable), 100);
        assert_eq!(ledger.balance(&Account::Treasury(desk), &LedgerAsset::Stable), 0);
        assert!(ledger.offer(desk, offer.id).is_none());
        assert_eq!(ledger.journal().len(), journal_len);
    }

    #[test]
    fn events_of_one_commit_chain_onto_the_head() {
        let (mut ledger, desk) = ledger_with_desk();
        let head = ledger.journal().head();
        ledger
            .commit(
                Changeset::new(desk)
                    .with_event(DeskEvent::PauseUpdated { paused: true })
                    .with_event(DeskEvent::PauseUpdated { paused: false }),
            )
            .unwrap();

        let entries = ledger.journal().entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].prev_hash, head);
        assert_eq!(entries[2].prev_hash, entries[1].hash);
        assert!(ledger.journal().verify().is_ok());
    }

    #[test]
    fn chained_transfers_can_spend_credited_funds() {
        let (mut ledger, desk) = ledger_with_desk();
        let alice = Account::Holder(Identity([7; 32]));
        let agent = Account::Holder(Identity([2; 32]));
        ledger.mint(alice, LedgerAsset::Stable, 100);

        let cs = Changeset::new(desk)
            .with_transfer(LedgerAsset::Stable, alice, Account::Treasury(desk), 100)
            .with_transfer(LedgerAsset::Stable, Account::Treasury(desk), agent, 5);
        ledger.commit(cs).unwrap();

        assert_eq!(ledger.balance(&alice, &LedgerAsset::Stable), 0);
        assert_eq!(ledger.balance(&Account::Treasury(desk), &LedgerAsset::Stable), 95);
        assert_eq!(ledger.balance(&agent, &LedgerAsset::Stable), 5);
    }

    #[test]
    fn broken_escrow_position_is_rejected() {
        let (mut ledger, desk) = ledger_with_desk();
        let asset = AssetId::new("T");
        let mut position = EscrowPosition::empty(desk, asset.clone());
        position.reserved = 1;
        let err = ledger.commit(Changeset::new(desk).with_escrow(position)).unwrap_err();
        assert!(matches!(err, OtcError::EscrowInvariant { .. }));
        assert_eq!(ledger.escrow_position(desk, &asset).reserved, 0);
    }

    #[test]
    fn unknown_desk_is_rejected() {
        let mut ledger = InMemoryLedger::default();
        let stranger = DeskId::new();
        assert_eq!(
            ledger.commit(Changeset::new(stranger)),
            Err(OtcError::DeskNotFound(stranger))
        );
    }

    #[test]
    fn storage_reserve_grows_with_records() {
        let (mut ledger, desk) = ledger_with_desk();
        let rent = StorageRent::default();
        assert_eq!(ledger.storage_reserve(desk), rent.base);

        let mut offer = Offer::dummy(Identity([7; 32]), 10);
        offer.desk = desk;
        ledger.commit(Changeset::new(desk).with_offer(offer)).unwrap();
        assert_eq!(ledger.storage_reserve(desk), rent.base + rent.per_record);
        assert_eq!(ledger.storage_reserve(DeskId::new()), 0);
    }

    #[test]
    fn clock_is_pinnable() {
        let mut ledger = InMemoryLedger::default();
        ledger.set_time(50);
        ledger.advance(25);
        assert_eq!(ledger.now(), 75);
    }

    #[test]
    fn events_are_journaled_with_commit_time() {
        let (mut ledger, desk) = ledger_with_desk();
        ledger.set_time(2_000);
        ledger
            .commit(Changeset::new(desk).with_event(DeskEvent::PauseUpdated { paused: true }))
            .unwrap();
        let drained = ledger.drain_events();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[1].envelope.at, 2_000);
        assert_eq!(drained[1].envelope.desk, desk);
        assert!(ledger.journal().is_empty());
    }

    #[test]
    fn config_from_json() {
        let cfg = LedgerConfig::from_json(r#"{"storage_rent":{"base":10}}"#).unwrap();
        assert_eq!(cfg.storage_rent.base, 10);
        assert_eq!(cfg.storage_rent.per_record, StorageRent::default().per_record);
    }
}
