use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::BankError;
use crate::ledger::Amount;

/// Native-currency balances held by the host.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeLedger {
    balances: BTreeMap<Address, Amount>,
}

impl NativeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Mint at genesis.
    pub fn credit(&mut self, account: Address, value: Amount) -> Result<(), BankError> {
        let balance = self.balance_of(&account);
        let next = balance.checked_add(value).ok_or(BankError::Overflow)?;
        self.balances.insert(account, next);
        Ok(())
    }

    pub fn transfer(&mut self, from: Address, to: Address, value: Amount) -> Result<(), BankError> {
        let available = self.balance_of(&from);
        if available < value {
            return Err(BankError::InsufficientNativeBalance {
                available,
                requested: value,
            });
        }
        if from == to {
            return Ok(());
        }
        let receiving = self.balance_of(&to);
        let next = receiving.checked_add(value).ok_or(BankError::Overflow)?;
        self.balances.insert(from, available - value);
        self.balances.insert(to, next);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_checks_available_balance() {
        let a = Address::from_bytes([1; 20]);
        let b = Address::from_bytes([2; 20]);
        let mut native = NativeLedger::new();
        native.credit(a, 10).unwrap();
        assert_eq!(
            native.transfer(a, b, 11),
            Err(BankError::InsufficientNativeBalance {
                available: 10,
                requested: 11
            })
        );
        native.transfer(a, b, 10).unwrap();
        assert_eq!(native.balance_of(&a), 0);
        assert_eq!(native.balance_of(&b), 10);
    }
}
