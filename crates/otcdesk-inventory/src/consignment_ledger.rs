//! Consignment ledger: listing creation, buyer admission and withdrawal.
//!
//! Escrow counters for the listed inventory are moved separately by
//! [`crate::EscrowAccounting`]; this module owns the listing record itself.

use otcdesk_types::{
    AllowList, AssetId, Consignment, ConsignmentId, ConsignmentTerms, Desk, Identity, OtcError, Result,
    constants,
};
use tracing::debug;

/// Consignment operations for one desk.
pub struct ConsignmentLedger<'a> {
    desk: &'a Desk,
}

impl<'a> ConsignmentLedger<'a> {
    #[must_use]
    pub fn new(desk: &'a Desk) -> Self {
        Self { desk }
    }

    /// Validate `terms` and build a new active listing.
    ///
    /// # Errors
    /// - [`OtcError::Paused`] while the desk is paused
    /// - [`OtcError::AmountRange`] for a zero amount, inverted deal bounds, a
    ///   non-fractionalized listing whose max deal is not the whole amount, a
    ///   negative execution window or an oversized allow-list
    /// - [`OtcError::Discount`] for any bps field above 100% or inverted
    ///   discount bounds
    /// - [`OtcError::LockupRange`] for inverted lockup bounds
    pub fn create(
        &self,
        id: ConsignmentId,
        consigner: Identity,
        asset: AssetId,
        terms: &ConsignmentTerms,
        now: i64,
    ) -> Result<Consignment> {
        self.desk.require_active()?;
        validate_terms(terms)?;

        let allow_list = AllowList::from_slice(&terms.allow_list).map_err(|full| {
            OtcError::amount_range(format!("allow-list exceeds {} entries", full.capacity))
        })?;

        debug!(
            desk = %self.desk.id,
            consignment = %id,
            consigner = %consigner,
            amount = terms.amount,
            negotiable = terms.is_negotiable,
            "Consignment terms accepted"
        );

        Ok(Consignment {
            id,
            desk: self.desk.id,
            consigner,
            asset,
            total_amount: terms.amount,
            remaining_amount: terms.amount,
            is_negotiable: terms.is_negotiable,
            fixed_discount_bps: terms.fixed_discount_bps,
            fixed_lockup_days: terms.fixed_lockup_days,
            min_discount_bps: terms.min_discount_bps,
            max_discount_bps: terms.max_discount_bps,
            min_lockup_days: terms.min_lockup_days,
            max_lockup_days: terms.max_lockup_days,
            min_deal_amount: terms.min_deal_amount,
            max_deal_amount: terms.max_deal_amount,
            is_fractionalized: terms.is_fractionalized,
            is_private: terms.is_private,
            allow_list,
            max_price_volatility_bps: terms.max_price_volatility_bps,
            max_time_to_execute_secs: terms.max_time_to_execute_secs,
            is_active: true,
            created_at: now,
        })
    }

    /// May `who` open an offer against `consignment`?
    #[must_use]
    pub fn admits(&self, consignment: &Consignment, who: &Identity) -> bool {
        !consignment.is_private
            || consignment.consigner == *who
            || self.desk.is_approver(who)
            || consignment.allow_list.contains(who)
    }

    /// Close the listing and return the residual amount owed to the consigner.
    ///
    /// # Errors
    /// [`OtcError::NotOwner`] unless `caller` is the consigner,
    /// [`OtcError::BadState`] if already withdrawn.
    pub fn withdraw(&self, consignment: &mut Consignment, caller: &Identity) -> Result<u64> {
        if consignment.consigner != *caller {
            return Err(OtcError::NotOwner);
        }
        consignment.close()
    }
}

fn validate_terms(terms: &ConsignmentTerms) -> Result<()> {
    if terms.amount == 0 {
        return Err(OtcError::amount_range("consignment amount is zero"));
    }
    if terms.min_deal_amount > terms.max_deal_amount {
        return Err(OtcError::amount_range(format!(
            "min deal {} > max deal {}",
            terms.min_deal_amount, terms.max_deal_amount
        )));
    }
    if !terms.is_fractionalized && terms.max_deal_amount != terms.amount {
        return Err(OtcError::amount_range(
            "non-fractionalized listing must sell its whole amount",
        ));
    }
    if terms.max_time_to_execute_secs < 0 {
        return Err(OtcError::amount_range("negative execution window"));
    }

    let bps_fields = [
        ("fixed discount", terms.fixed_discount_bps),
        ("min discount", terms.min_discount_bps),
        ("max discount", terms.max_discount_bps),
        ("price volatility", terms.max_price_volatility_bps),
    ];
    for (name, bps) in bps_fields {
        if bps > constants::BPS_DENOMINATOR {
            return Err(OtcError::Discount {
                reason: format!("{name} {bps} bps exceeds 100%"),
            });
        }
    }
    if terms.min_discount_bps > terms.max_discount_bps {
        return Err(OtcError::Discount {
            reason: format!(
                "min discount {} > max discount {}",
                terms.min_discount_bps, terms.max_discount_bps
            ),
        });
    }
    if terms.min_lockup_days > terms.max_lockup_days {
        return Err(OtcError::LockupRange {
            reason: format!(
                "min lockup {}d > max lockup {}d",
                terms.min_lockup_days, terms.max_lockup_days
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consigner() -> Identity {
        Identity([4; 32])
    }

    fn desk() -> Desk {
        Desk::dummy(Identity([1; 32]), Identity([2; 32]))
    }

    fn create(d: &Desk, terms: &ConsignmentTerms) -> Result<Consignment> {
        ConsignmentLedger::new(d).create(ConsignmentId(1), consigner(), AssetId::new("T"), terms, 10)
    }

    #[test]
    fn creates_active_listing() {
        let d = desk();
        let c = create(&d, &ConsignmentTerms::negotiable(100_000)).unwrap();
        assert!(c.is_active);
        assert_eq!(c.remaining_amount, 100_000);
        assert_eq!(c.total_amount, 100_000);
        assert_eq!(c.created_at, 10);
    }

    #[test]
    fn zero_amount_rejected() {
        let d = desk();
        let err = create(&d, &ConsignmentTerms::negotiable(0)).unwrap_err();
        assert!(matches!(err, OtcError::AmountRange { .. }));
    }

    #[test]
    fn inverted_deal_bounds_rejected() {
        let d = desk();
        let mut t = ConsignmentTerms::negotiable(100);
        t.min_deal_amount = 60;
        t.max_deal_amount = 50;
        assert!(matches!(create(&d, &t), Err(OtcError::AmountRange { .. })));
    }

    #[test]
    fn non_fractionalized_must_sell_everything() {
        let d = desk();
        let mut t = ConsignmentTerms::negotiable(100);
        t.is_fractionalized = false;
        t.max_deal_amount = 99;
        assert!(matches!(create(&d, &t), Err(OtcError::AmountRange { .. })));
        t.max_deal_amount = 100;
        assert!(create(&d, &t).is_ok());
    }

    #[test]
    fn discount_fields_bounded() {
        let d = desk();
        let mut t = ConsignmentTerms::negotiable(100);
        t.max_discount_bps = 10_001;
        assert!(matches!(create(&d, &t), Err(OtcError::Discount { .. })));

        let mut t = ConsignmentTerms::negotiable(100);
        t.fixed_discount_bps = 20_000;
        assert!(matches!(create(&d, &t), Err(OtcError::Discount { .. })));

        let mut t = ConsignmentTerms::negotiable(100);
        t.min_discount_bps = 500;
        t.max_discount_bps = 100;
        assert!(matches!(create(&d, &t), Err(OtcError::Discount { .. })));
    }

    #[test]
    fn inverted_lockup_rejected() {
        let d = desk();
        let mut t = ConsignmentTerms::negotiable(100);
        t.min_lockup_days = 30;
        t.max_lockup_days = 7;
        assert!(matches!(create(&d, &t), Err(OtcError::LockupRange { .. })));
    }

    #[test]
    fn paused_desk_rejects() {
        let mut d = desk();
        d.paused = true;
        assert_eq!(
            create(&d, &ConsignmentTerms::negotiable(100)),
            Err(OtcError::Paused)
        );
    }

    #[test]
    fn oversized_allow_list_rejected() {
        let d = desk();
        let mut t = ConsignmentTerms::negotiable(100);
        t.is_private = true;
        t.allow_list = (0..=constants::MAX_ALLOWLIST)
            .map(|i| Identity([u8::try_from(i + 10).unwrap(); 32]))
            .collect();
        assert!(matches!(create(&d, &t), Err(OtcError::AmountRange { .. })));
    }

    #[test]
    fn private_listing_admission() {
        let d = desk();
        let buyer = Identity([9; 32]);
        let mut t = ConsignmentTerms::negotiable(100);
        t.is_private = true;
        t.allow_list = vec![buyer];
        let c = create(&d, &t).unwrap();
        let ledger = ConsignmentLedger::new(&d);

        assert!(ledger.admits(&c, &buyer));
        assert!(ledger.admits(&c, &consigner()));
        assert!(ledger.admits(&c, &d.agent));
        assert!(!ledger.admits(&c, &Identity([8; 32])));

        let public = create(&d, &ConsignmentTerms::negotiable(100)).unwrap();
        assert!(ledger.admits(&public, &Identity([8; 32])));
    }

    #[test]
    fn withdraw_is_consigner_only_and_once() {
        let d = desk();
        let ledger = ConsignmentLedger::new(&d);
        let mut c = create(&d, &ConsignmentTerms::negotiable(100)).unwrap();
        c.reserve(25).unwrap();

        assert_eq!(ledger.withdraw(&mut c, &d.owner), Err(OtcError::NotOwner));
        assert_eq!(ledger.withdraw(&mut c, &consigner()), Ok(75));
        assert!(!c.is_active);
        assert!(matches!(
            ledger.withdraw(&mut c, &consigner()),
            Err(OtcError::BadState { .. })
        ));
    }
}
