//! The bank's custodied token holdings.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::address::Address;
use crate::error::BankError;
use crate::ledger::Amount;
use crate::token::{FungibleToken, TokenError};

/// Cached mirror of the token balance held at the bank's address.
///
/// The mirror is only moved by successful withdrawals, deposits and direct
/// token transfers reported by the host. It must always equal what the token
/// itself reports; [`PooledAssetAccount::verify`] checks that.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PooledAssetAccount {
    current_balance: Amount,
}

impl PooledAssetAccount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_balance(&self) -> Amount {
        self.current_balance
    }

    /// Re-derive the mirror from the token, used when the bank token changes.
    pub fn resync<T: FungibleToken + ?Sized>(&mut self, token: &T, this: &Address) {
        self.current_balance = token.balance_of(this);
    }

    /// Tokens arrived by a direct transfer to the bank.
    pub fn record_inflow(&mut self, value: Amount) -> Result<(), BankError> {
        self.current_balance = self
            .current_balance
            .checked_add(value)
            .ok_or(BankError::Overflow)?;
        Ok(())
    }

    pub fn withdraw<T: FungibleToken + ?Sized>(
        &mut self,
        token: &mut T,
        this: Address,
        to: Address,
        value: Amount,
    ) -> Result<(), BankError> {
        if self.current_balance < value {
            return Err(BankError::InsufficientPoolBalance {
                available: self.current_balance,
                requested: value,
            });
        }
        token.transfer(this, to, value).map_err(|err| {
            warn!(%err, cached = self.current_balance, "token rejected a covered withdrawal");
            match err {
                TokenError::InsufficientBalance { balance, .. } => BankError::PoolOutOfSync {
                    cached: self.current_balance,
                    actual: balance,
                },
                other => BankError::Token(other),
            }
        })?;
        self.current_balance -= value;
        Ok(())
    }

    pub fn deposit_from<T: FungibleToken + ?Sized>(
        &mut self,
        token: &mut T,
        this: Address,
        from: Address,
        value: Amount,
    ) -> Result<(), BankError> {
        let held = token.balance_of(&from);
        if held < value {
            return Err(BankError::InsufficientPoolBalance {
                available: held,
                requested: value,
            });
        }
        let next = self
            .current_balance
            .checked_add(value)
            .ok_or(BankError::Overflow)?;
        token
            .transfer_from(this, from, this, value)
            .map_err(|err| match err {
                TokenError::InsufficientAllowance { allowance, requested, .. } => {
                    BankError::InsufficientAllowance {
                        allowance,
                        requested,
                    }
                }
                other => BankError::Token(other),
            })?;
        self.current_balance = next;
        Ok(())
    }

    pub fn verify<T: FungibleToken + ?Sized>(&self, token: &T, this: &Address) -> Result<(), BankError> {
        let actual = token.balance_of(this);
        if actual != self.current_balance {
            return Err(BankError::PoolOutOfSync {
                cached: self.current_balance,
                actual,
            });
        }
        Ok(())
    }
}
