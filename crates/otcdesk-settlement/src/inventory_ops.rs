//! Inventory operations: listings, desk deposits and treasury withdrawals.

use otcdesk_inventory::{ConsignmentLedger, EscrowAccounting, PriceFeed};
use otcdesk_types::{AssetId, ConsignmentId, ConsignmentTerms, DeskEvent, DeskId, Identity, OtcError, Result};
use tracing::info;

use crate::controller::LifecycleController;
use crate::ledger::{Account, Changeset, Ledger, LedgerAsset, LedgerView};

impl<L: Ledger, F: PriceFeed> LifecycleController<L, F> {
    /// List `terms.amount` of `asset` from the caller's wallet.
    ///
    /// # Errors
    /// - [`OtcError::Paused`]
    /// - [`OtcError::TokenNotRegistered`]
    /// - term errors from [`ConsignmentLedger::create`]
    /// - [`OtcError::InsufficientBalance`] if the consigner cannot fund it
    pub fn create_consignment(
        &mut self,
        desk_id: DeskId,
        consigner: Identity,
        asset: &AssetId,
        terms: &ConsignmentTerms,
    ) -> Result<ConsignmentId> {
        self.run("create_consignment", desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            desk.require_active()?;
            this.load_entry(desk_id, asset)?;
            let now = this.ledger.now();

            let id = desk.allocate_consignment_id()?;
            let consignment = ConsignmentLedger::new(&desk).create(id, consigner, asset.clone(), terms, now)?;

            let mut position = this.ledger.escrow_position(desk_id, asset);
            EscrowAccounting::new(&mut position).consign(terms.amount)?;
            desk.touch(now);

            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_desk(desk)
                    .with_consignment(consignment)
                    .with_escrow(position)
                    .with_transfer(
                        LedgerAsset::Token(asset.clone()),
                        Account::Holder(consigner),
                        Account::Treasury(desk_id),
                        terms.amount,
                    )
                    .with_event(DeskEvent::ConsignmentCreated {
                        consignment: id,
                        consigner,
                        asset: asset.clone(),
                        amount: terms.amount,
                    }),
            )?;
            info!(
                desk = %desk_id,
                consignment = %id,
                %consigner,
                %asset,
                amount = terms.amount,
                negotiable = terms.is_negotiable,
                "Consignment created"
            );
            Ok(id)
        })
    }

    /// Close a listing and return its unreserved residual to the consigner.
    /// Permitted while paused.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`] unless the caller is the consigner,
    /// [`OtcError::BadState`] if already withdrawn.
    pub fn withdraw_consignment(&mut self, desk_id: DeskId, caller: Identity, id: ConsignmentId) -> Result<u64> {
        self.run("withdraw_consignment", desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            let mut consignment = this.load_consignment(desk_id, id)?;
            let residual = ConsignmentLedger::new(&desk).withdraw(&mut consignment, &caller)?;

            let mut position = this.ledger.escrow_position(desk_id, &consignment.asset);
            EscrowAccounting::new(&mut position).return_consigned(residual)?;
            desk.touch(this.ledger.now());

            let asset = consignment.asset.clone();
            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_desk(desk)
                    .with_consignment(consignment)
                    .with_escrow(position)
                    .with_transfer(
                        LedgerAsset::Token(asset),
                        Account::Treasury(desk_id),
                        Account::Holder(caller),
                        residual,
                    )
                    .with_event(DeskEvent::ConsignmentWithdrawn {
                        consignment: id,
                        returned: residual,
                    }),
            )?;
            info!(desk = %desk_id, consignment = %id, residual, "Consignment withdrawn");
            Ok(residual)
        })
    }

    /// Move owner tokens into free desk inventory.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`], [`OtcError::Paused`],
    /// [`OtcError::TokenNotRegistered`], [`OtcError::AmountRange`] for zero,
    /// [`OtcError::InsufficientBalance`].
    pub fn deposit_tokens(&mut self, desk_id: DeskId, caller: Identity, asset: &AssetId, amount: u64) -> Result<()> {
        self.run("deposit_tokens", desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            desk.require_owner(&caller)?;
            desk.require_active()?;
            this.load_entry(desk_id, asset)?;
            if amount == 0 {
                return Err(OtcError::amount_range("deposit amount is zero"));
            }

            let mut position = this.ledger.escrow_position(desk_id, asset);
            EscrowAccounting::new(&mut position).deposit_free(amount)?;
            desk.touch(this.ledger.now());

            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_desk(desk)
                    .with_escrow(position)
                    .with_transfer(
                        LedgerAsset::Token(asset.clone()),
                        Account::Holder(caller),
                        Account::Treasury(desk_id),
                        amount,
                    )
                    .with_event(DeskEvent::TokensDeposited {
                        asset: asset.clone(),
                        amount,
                    }),
            )?;
            info!(desk = %desk_id, %asset, amount, "Tokens deposited");
            Ok(())
        })
    }

    /// Take free desk inventory back to the owner.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`], [`OtcError::AmountRange`] for zero,
    /// [`OtcError::BadState`] beyond free inventory.
    pub fn withdraw_tokens(&mut self, desk_id: DeskId, caller: Identity, asset: &AssetId, amount: u64) -> Result<()> {
        self.run("withdraw_tokens", desk_id, |this| {
            let mut desk = this.load_desk(desk_id)?;
            desk.require_owner(&caller)?;
            if amount == 0 {
                return Err(OtcError::amount_range("withdrawal amount is zero"));
            }

            let mut position = this.ledger.escrow_position(desk_id, asset);
            EscrowAccounting::new(&mut position).withdraw_free(amount)?;
            desk.touch(this.ledger.now());

            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_desk(desk)
                    .with_escrow(position)
                    .with_transfer(
                        LedgerAsset::Token(asset.clone()),
                        Account::Treasury(desk_id),
                        Account::Holder(caller),
                        amount,
                    )
                    .with_event(DeskEvent::TokensWithdrawn {
                        asset: asset.clone(),
                        amount,
                        to: caller,
                    }),
            )?;
            info!(desk = %desk_id, %asset, amount, "Tokens withdrawn");
            Ok(())
        })
    }

    /// Send stable proceeds from the treasury to `to`.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`], [`OtcError::InsufficientBalance`].
    pub fn withdraw_stable(&mut self, desk_id: DeskId, caller: Identity, amount: u64, to: Identity) -> Result<()> {
        self.run("withdraw_stable", desk_id, |this| {
            let desk = this.load_desk(desk_id)?;
            desk.require_owner(&caller)?;
            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_transfer(LedgerAsset::Stable, Account::Treasury(desk_id), Account::Holder(to), amount)
                    .with_event(DeskEvent::StableWithdrawn { amount, to }),
            )?;
            info!(desk = %desk_id, amount, %to, "Stable withdrawn");
            Ok(())
        })
    }

    /// Send native proceeds from the treasury to `to`, keeping the storage
    /// reserve in place.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`]; [`OtcError::BadState`] if the remaining
    /// balance would drop below [`LedgerView::storage_reserve`].
    pub fn withdraw_native(&mut self, desk_id: DeskId, caller: Identity, amount: u64, to: Identity) -> Result<()> {
        self.run("withdraw_native", desk_id, |this| {
            let desk = this.load_desk(desk_id)?;
            desk.require_owner(&caller)?;
            let balance = this.ledger.balance(&Account::Treasury(desk_id), &LedgerAsset::Native);
            let reserve = this.ledger.storage_reserve(desk_id);
            let remaining = balance.checked_sub(amount).ok_or(OtcError::InsufficientBalance {
                needed: amount,
                available: balance,
            })?;
            if remaining < reserve {
                return Err(OtcError::bad_state(format!(
                    "withdrawal leaves {remaining}, below storage reserve {reserve}"
                )));
            }
            this.ledger.commit(
                Changeset::new(desk_id)
                    .with_transfer(LedgerAsset::Native, Account::Treasury(desk_id), Account::Holder(to), amount)
                    .with_event(DeskEvent::NativeWithdrawn { amount, to }),
            )?;
            info!(desk = %desk_id, amount, %to, remaining, reserve, "Native withdrawn");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryLedger;
    use otcdesk_inventory::StaticPriceFeed;
    use otcdesk_types::DeskConfig;

    const OWNER: Identity = Identity([1; 32]);
    const AGENT: Identity = Identity([2; 32]);
    const CONSIGNER: Identity = Identity([4; 32]);

    type Controller = LifecycleController<InMemoryLedger, StaticPriceFeed>;

    fn setup() -> (Controller, DeskId, AssetId) {
        let mut ledger = InMemoryLedger::default();
        ledger.set_time(1_000);
        let mut c = LifecycleController::new(ledger, StaticPriceFeed::new());
        let desk = c.create_desk(OWNER, AGENT, &DeskConfig::default()).unwrap();
        let asset = AssetId::new("ELIZA");
        c.register_token(desk, OWNER, asset.clone(), None, 0).unwrap();
        let token = LedgerAsset::Token(asset.clone());
        c.ledger_mut().mint(Account::Holder(CONSIGNER), token.clone(), 1_000);
        c.ledger_mut().mint(Account::Holder(OWNER), token, 500);
        (c, desk, asset)
    }

    fn token_balance(c: &Controller, account: Account, asset: &AssetId) -> u64 {
        c.ledger().balance(&account, &LedgerAsset::Token(asset.clone()))
    }

    #[test]
    fn consignment_moves_tokens_into_escrow() {
        let (mut c, desk, asset) = setup();
        let id = c
            .create_consignment(desk, CONSIGNER, &asset, &ConsignmentTerms::negotiable(600))
            .unwrap();
        assert_eq!(id, ConsignmentId(1));
        assert_eq!(token_balance(&c, Account::Holder(CONSIGNER), &asset), 400);
        assert_eq!(token_balance(&c, Account::Treasury(desk), &asset), 600);

        let pos = c.ledger().escrow_position(desk, &asset);
        assert_eq!((pos.deposited, pos.consigned, pos.reserved), (600, 600, 0));
    }

    #[test]
    fn underfunded_consignment_changes_nothing() {
        let (mut c, desk, asset) = setup();
        let err = c
            .create_consignment(desk, CONSIGNER, &asset, &ConsignmentTerms::negotiable(5_000))
            .unwrap_err();
        assert_eq!(err, OtcError::InsufficientBalance { needed: 5_000, available: 1_000 });
        assert!(c.ledger().consignment(desk, ConsignmentId(1)).is_none());
        assert_eq!(c.ledger().desk(desk).unwrap().next_consignment_id, 1);
        assert_eq!(c.ledger().escrow_position(desk, &asset).deposited, 0);
    }

    #[test]
    fn unregistered_asset_is_rejected() {
        let (mut c, desk, _) = setup();
        let other = AssetId::new("OTHER");
        assert_eq!(
            c.create_consignment(desk, CONSIGNER, &other, &ConsignmentTerms::negotiable(1)),
            Err(OtcError::TokenNotRegistered(other))
        );
    }

    #[test]
    fn withdraw_consignment_once() {
        let (mut c, desk, asset) = setup();
        let id = c
            .create_consignment(desk, CONSIGNER, &asset, &ConsignmentTerms::negotiable(600))
            .unwrap();
        assert_eq!(c.withdraw_consignment(desk, OWNER, id), Err(OtcError::NotOwner));
        assert_eq!(c.withdraw_consignment(desk, CONSIGNER, id), Ok(600));
        assert!(matches!(
            c.withdraw_consignment(desk, CONSIGNER, id),
            Err(OtcError::BadState { .. })
        ));
        assert_eq!(token_balance(&c, Account::Holder(CONSIGNER), &asset), 1_000);
        let stored = c.ledger().consignment(desk, id).unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.remaining_amount, 0);
    }

    #[test]
    fn free_inventory_deposit_and_withdrawal() {
        let (mut c, desk, asset) = setup();
        assert_eq!(c.deposit_tokens(desk, CONSIGNER, &asset, 10), Err(OtcError::NotOwner));
        c.deposit_tokens(desk, OWNER, &asset, 300).unwrap();
        c.create_consignment(desk, CONSIGNER, &asset, &ConsignmentTerms::negotiable(100))
            .unwrap();

        // Consigned tokens are not the owner's to take.
        assert!(matches!(
            c.withdraw_tokens(desk, OWNER, &asset, 301),
            Err(OtcError::BadState { .. })
        ));
        c.withdraw_tokens(desk, OWNER, &asset, 300).unwrap();
        assert_eq!(token_balance(&c, Account::Holder(OWNER), &asset), 500);
        assert_eq!(c.ledger().escrow_position(desk, &asset).free(), 0);
    }

    #[test]
    fn native_withdrawal_respects_storage_reserve() {
        let (mut c, desk, _) = setup();
        let reserve = c.ledger().storage_reserve(desk);
        c.ledger_mut()
            .mint(Account::Treasury(desk), LedgerAsset::Native, reserve + 1_000);

        assert!(matches!(
            c.withdraw_native(desk, OWNER, 1_001, OWNER),
            Err(OtcError::BadState { .. })
        ));
        c.withdraw_native(desk, OWNER, 1_000, OWNER).unwrap();
        assert_eq!(
            c.ledger().balance(&Account::Treasury(desk), &LedgerAsset::Native),
            reserve
        );
        assert_eq!(c.withdraw_native(desk, AGENT, 1, AGENT), Err(OtcError::NotOwner));
    }

    #[test]
    fn stable_withdrawal_is_owner_only() {
        let (mut c, desk, _) = setup();
        c.ledger_mut().mint(Account::Treasury(desk), LedgerAsset::Stable, 50);
        assert_eq!(c.withdraw_stable(desk, AGENT, 50, AGENT), Err(OtcError::NotOwner));
        c.withdraw_stable(desk, OWNER, 50, CONSIGNER).unwrap();
        assert_eq!(c.ledger().balance(&Account::Holder(CONSIGNER), &LedgerAsset::Stable), 50);
    }
}
