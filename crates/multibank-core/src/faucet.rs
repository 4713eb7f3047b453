use serde::{Deserialize, Serialize};
use tracing::info;

use crate::access::AccessRegistry;
use crate::address::Address;
use crate::error::BankError;
use crate::ledger::Amount;

/// Who may trigger the faucet and how much each disbursement pays.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaucetController {
    address: Address,
    amount: Amount,
}

impl FaucetController {
    /// The owner operates the faucet until told otherwise; the amount starts
    /// at zero.
    pub fn new(owner: Address) -> Self {
        Self {
            address: owner,
            amount: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn set_address(
        &mut self,
        access: &AccessRegistry,
        caller: &Address,
        address: Address,
    ) -> Result<(), BankError> {
        access.ensure_owner(caller)?;
        info!(%address, "faucet address set");
        self.address = address;
        Ok(())
    }

    pub fn set_amount(
        &mut self,
        access: &AccessRegistry,
        caller: &Address,
        amount: Amount,
    ) -> Result<(), BankError> {
        access.ensure_owner(caller)?;
        info!(amount, "faucet amount set");
        self.amount = amount;
        Ok(())
    }

    /// Check a disbursement request against the caller, the target and the
    /// native `reserve`. Returns the amount to pay out.
    pub fn authorize(
        &self,
        access: &AccessRegistry,
        caller: &Address,
        target: &Address,
        reserve: Amount,
    ) -> Result<Amount, BankError> {
        if *caller != self.address {
            return Err(BankError::WrongFaucetCaller { caller: *caller });
        }
        if !access.is_authorized(target) {
            return Err(BankError::TargetNotAuthorized { target: *target });
        }
        if reserve < self.amount {
            return Err(BankError::InsufficientNativeBalance {
                available: reserve,
                requested: self.amount,
            });
        }
        Ok(self.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(tag: u8) -> Address {
        Address::from_bytes([tag; 20])
    }

    fn setup() -> (AccessRegistry, FaucetController) {
        let mut access = AccessRegistry::new(addr(1));
        access.add_authorized(&addr(1), addr(2)).unwrap();
        (access, FaucetController::new(addr(1)))
    }

    #[test]
    fn defaults_to_owner_and_zero() {
        let (_, faucet) = setup();
        assert_eq!(faucet.address(), addr(1));
        assert_eq!(faucet.amount(), 0);
    }

    #[test]
    fn checks_run_in_order() {
        let (access, mut faucet) = setup();
        faucet.set_amount(&access, &addr(1), 10).unwrap();
        assert_eq!(
            faucet.authorize(&access, &addr(2), &addr(3), 100),
            Err(BankError::WrongFaucetCaller { caller: addr(2) })
        );
        assert_eq!(
            faucet.authorize(&access, &addr(1), &addr(3), 100),
            Err(BankError::TargetNotAuthorized { target: addr(3) })
        );
        assert_eq!(
            faucet.authorize(&access, &addr(1), &addr(2), 9),
            Err(BankError::InsufficientNativeBalance {
                available: 9,
                requested: 10
            })
        );
        assert_eq!(faucet.authorize(&access, &addr(1), &addr(2), 10), Ok(10));
    }

    #[test]
    fn setters_are_owner_only() {
        let (access, mut faucet) = setup();
        assert!(faucet.set_address(&access, &addr(2), addr(2)).is_err());
        assert!(faucet.set_amount(&access, &addr(2), 5).is_err());
        faucet.set_address(&access, &addr(1), addr(3)).unwrap();
        assert_eq!(faucet.address(), addr(3));
    }
}
