//! Approval quorum.
//!
//! An offer becomes payable once `required_approvals` distinct approvers have
//! signed off. Owner and agent count as approvers without being listed.
//! Fixed-price offers skip the quorum entirely.

use otcdesk_types::{Desk, Identity, Offer, OtcError, Result, constants};
use tracing::debug;

/// Outcome of one approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalOutcome {
    /// Distinct approvals collected so far.
    pub approvals: usize,
    /// Whether this approval completed the quorum.
    pub approved: bool,
}

/// Approval logic for one desk.
pub struct ApprovalQuorum<'a> {
    desk: &'a Desk,
}

impl<'a> ApprovalQuorum<'a> {
    #[must_use]
    pub fn new(desk: &'a Desk) -> Self {
        Self { desk }
    }

    /// Record `approver`'s approval on `offer`.
    ///
    /// # Errors
    /// - [`OtcError::Paused`] while the desk is paused
    /// - [`OtcError::NotApprover`] if `approver` may not approve
    /// - [`OtcError::BadState`] on a cancelled, paid or refunded offer
    /// - [`OtcError::AlreadyApproved`] if the offer is already approved or
    ///   this approver already signed
    pub fn approve(&self, offer: &mut Offer, approver: Identity) -> Result<ApprovalOutcome> {
        self.desk.require_active()?;
        if !self.desk.is_approver(&approver) {
            return Err(OtcError::NotApprover);
        }
        if offer.cancelled || offer.paid || offer.refunded {
            return Err(OtcError::bad_state(format!(
                "{} is {} and cannot be approved",
                offer.id,
                offer.state()
            )));
        }
        if offer.approved || offer.approvals.contains(&approver) {
            return Err(OtcError::AlreadyApproved);
        }

        offer
            .approvals
            .insert(approver)
            .map_err(|_| OtcError::TooManyApprovers {
                max: constants::MAX_APPROVERS,
            })?;

        let approvals = offer.approvals.len();
        let approved = approvals >= usize::from(self.desk.required_approvals.max(1));
        if approved {
            offer.mark_approved()?;
        }

        debug!(
            desk = %self.desk.id,
            offer = %offer.id,
            approver = %approver,
            approvals,
            required = self.desk.required_approvals,
            "Approval recorded"
        );

        Ok(ApprovalOutcome { approvals, approved })
    }
}
