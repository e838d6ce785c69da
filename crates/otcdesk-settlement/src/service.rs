//! Shared async handle over one controller.
//!
//! Operations on a desk must be serialized: two payments racing for the
//! same offer must see each other's commit. [`SharedDesk`] puts the
//! controller behind a `tokio` mutex so any number of tasks can submit
//! operations, and each one runs read-validate-commit under the lock.
//!
//! ```rust,ignore
//! let desk = SharedDesk::new(controller);
//! let quote = desk.fulfill_offer(desk_id, payer, offer, Currency::Stable).await?;
//! desk.run(|c| c.claim(desk_id, payer, offer)).await?;
//! ```

use std::sync::Arc;

use otcdesk_inventory::PriceFeed;
use otcdesk_offers::PaymentQuote;
use otcdesk_types::{Currency, DeskId, Identity, OfferId, Result};
use tokio::sync::Mutex;
use tracing::debug;

use crate::controller::LifecycleController;
use crate::escrow_audit::EscrowAudit;
use crate::ledger::Ledger;

/// Cloneable handle; every clone drives the same controller.
pub struct SharedDesk<L, F> {
    inner: Arc<Mutex<LifecycleController<L, F>>>,
}

impl<L, F> Clone for SharedDesk<L, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: Ledger, F: PriceFeed> SharedDesk<L, F> {
    #[must_use]
    pub fn new(controller: LifecycleController<L, F>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(controller)),
        }
    }

    /// Run `op` with exclusive access to the controller.
    ///
    /// # Errors
    /// Whatever `op` returns.
    pub async fn run<T>(&self, op: impl FnOnce(&mut LifecycleController<L, F>) -> Result<T>) -> Result<T> {
        let mut controller = self.inner.lock().await;
        op(&mut *controller)
    }

    /// # Errors
    /// As [`LifecycleController::fulfill_offer`].
    pub async fn fulfill_offer(
        &self,
        desk: DeskId,
        payer: Identity,
        offer: OfferId,
        currency: Currency,
    ) -> Result<PaymentQuote> {
        debug!(%desk, %offer, %payer, "Queued payment");
        self.run(|c| c.fulfill_offer(desk, payer, offer, currency)).await
    }

    /// # Errors
    /// As [`LifecycleController::claim`].
    pub async fn claim(&self, desk: DeskId, caller: Identity, offer: OfferId) -> Result<()> {
        self.run(|c| c.claim(desk, caller, offer)).await
    }

    /// # Errors
    /// As [`EscrowAudit::verify_desk`].
    pub async fn verify_escrow(&self, desk: DeskId) -> Result<()> {
        let controller = self.inner.lock().await;
        EscrowAudit::new(controller.ledger()).verify_desk(desk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Account, LedgerAsset, LedgerView};
    use crate::memory::InMemoryLedger;
    use otcdesk_inventory::StaticPriceFeed;
    use otcdesk_offers::OfferRequest;
    use otcdesk_types::{AssetId, ConsignmentTerms, DeskConfig, OtcError};

    const OWNER: Identity = Identity([1; 32]);
    const AGENT: Identity = Identity([2; 32]);
    const CONSIGNER: Identity = Identity([4; 32]);

    #[tokio::test]
    async fn concurrent_payments_settle_once() {
        let mut ledger = InMemoryLedger::default();
        ledger.set_time(1_000);
        let mut c = LifecycleController::new(ledger, StaticPriceFeed::new());
        let config = DeskConfig {
            use_manual_prices: true,
            ..DeskConfig::default()
        };
        let desk = c.create_desk(OWNER, AGENT, &config).unwrap();
        let asset = AssetId::new("ELIZA");
        c.register_token(desk, OWNER, asset.clone(), None, 0).unwrap();
        c.set_prices(desk, OWNER, &asset, 100_000_000, 15_000_000_000, 3_600).unwrap();
        c.ledger_mut()
            .mint(Account::Holder(CONSIGNER), LedgerAsset::Token(asset.clone()), 1_000);
        let cid = c
            .create_consignment(desk, CONSIGNER, &asset, &ConsignmentTerms::negotiable(1_000))
            .unwrap();
        let req = OfferRequest {
            token_amount: 100,
            discount_bps: 0,
            currency: Currency::Stable,
            lockup_secs: 0,
            agent_commission_bps: 25,
        };
        let beneficiary = Identity([9; 32]);
        let offer = c.create_offer_from_consignment(desk, beneficiary, cid, &req).unwrap();
        c.approve_offer(desk, AGENT, offer).unwrap();

        let payers: Vec<Identity> = (20..28).map(|b| Identity([b; 32])).collect();
        for payer in &payers {
            c.ledger_mut().mint(Account::Holder(*payer), LedgerAsset::Stable, 1_000_000_000);
        }

        let shared = SharedDesk::new(c);
        let mut handles = Vec::new();
        for payer in payers {
            let handle = shared.clone();
            handles.push(tokio::spawn(async move {
                handle.fulfill_offer(desk, payer, offer, Currency::Stable).await
            }));
        }

        let mut paid = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(quote) => {
                    assert_eq!(quote.amount, 100_000_000);
                    paid += 1;
                }
                Err(err) => assert!(matches!(err, OtcError::BadState { .. })),
            }
        }
        assert_eq!(paid, 1);

        shared.claim(desk, beneficiary, offer).await.unwrap();
        shared.verify_escrow(desk).await.unwrap();
        let delivered = shared
            .run(|c| Ok(c.ledger().balance(&Account::Holder(beneficiary), &LedgerAsset::Token(asset.clone()))))
            .await
            .unwrap();
        assert_eq!(delivered, 100);
    }
}
