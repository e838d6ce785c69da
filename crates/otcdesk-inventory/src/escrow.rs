//! Escrow accounting: the only code that moves [`EscrowPosition`] counters.
//!
//! Every mutation is staged on a copy, checked against
//! `reserved + consigned <= deposited`, and only then written back, so a
//! failed call leaves the position untouched.
//!
//! ```text
//!   consign ──────────────▶ consigned ── reserve_from_consignment ──▶ reserved
//!                              ▲  │                                      │ │
//!                              │  └── return_consigned ──▶ (out)          │ │
//!                              └──── release_to_consignment ◀────────────┘ │
//!   deposit_free ─────────▶ free ──── reserve_free ─────────▶ reserved      │
//!                            │  ◀──── release_free ────────────┘            │
//!                            └── withdraw_free ──▶ (out)     deliver ──▶ (out)
//! ```

use otcdesk_types::{EscrowPosition, OtcError, Result};

/// Counter moves on one (desk, asset) position.
pub struct EscrowAccounting<'a> {
    position: &'a mut EscrowPosition,
}

impl<'a> EscrowAccounting<'a> {
    #[must_use]
    pub fn new(position: &'a mut EscrowPosition) -> Self {
        Self { position }
    }

    /// Consigner tokens entered escrow for a new listing.
    ///
    /// # Errors
    /// [`OtcError::EscrowInvariant`] on overflow.
    pub fn consign(&mut self, amount: u64) -> Result<()> {
        self.apply("consign", |p| {
            p.deposited = p.deposited.checked_add(amount)?;
            p.consigned = p.consigned.checked_add(amount)?;
            Some(())
        })
    }

    /// Owner tokens entered escrow as free desk inventory.
    ///
    /// # Errors
    /// [`OtcError::EscrowInvariant`] on overflow.
    pub fn deposit_free(&mut self, amount: u64) -> Result<()> {
        self.apply("deposit_free", |p| {
            p.deposited = p.deposited.checked_add(amount)?;
            Some(())
        })
    }

    /// An offer reserved `qty` out of a listing.
    ///
    /// # Errors
    /// [`OtcError::EscrowInvariant`] if less than `qty` is consigned.
    pub fn reserve_from_consignment(&mut self, qty: u64) -> Result<()> {
        self.apply("reserve_from_consignment", |p| {
            p.consigned = p.consigned.checked_sub(qty)?;
            p.reserved = p.reserved.checked_add(qty)?;
            Some(())
        })
    }

    /// A cancelled or refunded offer handed `qty` back to its listing.
    ///
    /// # Errors
    /// [`OtcError::EscrowInvariant`] if less than `qty` is reserved.
    pub fn release_to_consignment(&mut self, qty: u64) -> Result<()> {
        self.apply("release_to_consignment", |p| {
            p.reserved = p.reserved.checked_sub(qty)?;
            p.consigned = p.consigned.checked_add(qty)?;
            Some(())
        })
    }

    /// A direct offer reserved `qty` of free inventory.
    ///
    /// # Errors
    /// [`OtcError::InsufficientInventory`] if less than `qty` is free.
    pub fn reserve_free(&mut self, qty: u64) -> Result<()> {
        let available = self.position.free();
        if qty > available {
            return Err(OtcError::InsufficientInventory {
                needed: qty,
                available,
            });
        }
        self.apply("reserve_free", |p| {
            p.reserved = p.reserved.checked_add(qty)?;
            Some(())
        })
    }

    /// A cancelled or refunded direct offer returned `qty` to free inventory.
    ///
    /// # Errors
    /// [`OtcError::EscrowInvariant`] if less than `qty` is reserved.
    pub fn release_free(&mut self, qty: u64) -> Result<()> {
        self.apply("release_free", |p| {
            p.reserved = p.reserved.checked_sub(qty)?;
            Some(())
        })
    }

    /// Reserved tokens left escrow (claim, or return to a withdrawn listing's
    /// consigner).
    ///
    /// # Errors
    /// [`OtcError::EscrowInvariant`] if less than `qty` is reserved.
    pub fn deliver(&mut self, qty: u64) -> Result<()> {
        self.apply("deliver", |p| {
            p.reserved = p.reserved.checked_sub(qty)?;
            p.deposited = p.deposited.checked_sub(qty)?;
            Some(())
        })
    }

    /// A withdrawn listing's residual left escrow.
    ///
    /// # Errors
    /// [`OtcError::EscrowInvariant`] if less than `qty` is consigned.
    pub fn return_consigned(&mut self, qty: u64) -> Result<()> {
        self.apply("return_consigned", |p| {
            p.consigned = p.consigned.checked_sub(qty)?;
            p.deposited = p.deposited.checked_sub(qty)?;
            Some(())
        })
    }

    /// The owner took `qty` of free inventory out of escrow.
    ///
    /// # Errors
    /// [`OtcError::BadState`] if less than `qty` is free.
    pub fn withdraw_free(&mut self, qty: u64) -> Result<()> {
        let available = self.position.free();
        if qty > available {
            return Err(OtcError::bad_state(format!(
                "withdrawal of {qty} exceeds free inventory {available}"
            )));
        }
        self.apply("withdraw_free", |p| {
            p.deposited = p.deposited.checked_sub(qty)?;
            Some(())
        })
    }

    fn apply(&mut self, op: &str, f: impl FnOnce(&mut EscrowPosition) -> Option<()>) -> Result<()> {
        let mut staged = self.position.clone();
        if f(&mut staged).is_none() {
            return Err(OtcError::EscrowInvariant {
                reason: format!(
                    "{op} would underflow or overflow {}/{}",
                    self.position.desk, self.position.asset
                ),
            });
        }
        staged.check()?;
        *self.position = staged;
        Ok(())
    }
}
