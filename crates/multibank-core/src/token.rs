//! Fungible token collaborator.
//!
//! The bank only relies on the [`FungibleToken`] surface: balances, owner-set
//! allowances, `transfer` and allowance-gated `transfer_from`. [`TokenLedger`]
//! is the in-process implementation the host runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::ledger::Amount;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("transfer amount exceeds balance of {account}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        account: Address,
        balance: Amount,
        requested: Amount,
    },
    #[error("insufficient allowance for {spender} on {owner}: allowed {allowance}, requested {requested}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowance: Amount,
        requested: Amount,
    },
    #[error("token balance overflow")]
    Overflow,
}

pub trait FungibleToken {
    fn balance_of(&self, account: &Address) -> Amount;

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount;

    /// Move `value` from `from` (the caller) to `to`.
    fn transfer(&mut self, from: Address, to: Address, value: Amount) -> Result<(), TokenError>;

    /// Let `spender` pull up to `value` from `owner` (the caller). Replaces any
    /// previous allowance.
    fn approve(&mut self, owner: Address, spender: Address, value: Amount) -> Result<(), TokenError>;

    /// `spender` (the caller) moves `value` from `from` to `to`, consuming
    /// allowance.
    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        value: Amount,
    ) -> Result<(), TokenError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLedger {
    pub name: String,
    pub symbol: String,
    total_supply: Amount,
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<Address, BTreeMap<Address, Amount>>,
}

impl TokenLedger {
    /// New token with its whole supply minted to `holder`.
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        holder: Address,
        supply: Amount,
    ) -> Self {
        let mut balances = BTreeMap::new();
        if supply > 0 {
            balances.insert(holder, supply);
        }
        Self {
            name: name.into(),
            symbol: symbol.into(),
            total_supply: supply,
            balances,
            allowances: BTreeMap::new(),
        }
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn holders(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter()
    }

    /// `(owner, spender, allowance)` for every recorded approval.
    pub fn allowances(&self) -> impl Iterator<Item = (&Address, &Address, Amount)> + '_ {
        self.allowances.iter().flat_map(|(owner, spenders)| {
            spenders
                .iter()
                .map(move |(spender, allowance)| (owner, spender, *allowance))
        })
    }

    fn debit(&mut self, account: Address, value: Amount) -> Result<(), TokenError> {
        let balance = self.balance_of(&account);
        if balance < value {
            return Err(TokenError::InsufficientBalance {
                account,
                balance,
                requested: value,
            });
        }
        self.balances.insert(account, balance - value);
        Ok(())
    }

    fn credit(&mut self, account: Address, value: Amount) -> Result<(), TokenError> {
        let balance = self.balance_of(&account);
        let next = balance.checked_add(value).ok_or(TokenError::Overflow)?;
        self.balances.insert(account, next);
        Ok(())
    }
}

impl FungibleToken for TokenLedger {
    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(owner)
            .and_then(|spenders| spenders.get(spender))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(&mut self, from: Address, to: Address, value: Amount) -> Result<(), TokenError> {
        if from == to {
            // self-transfer still has to be covered by the balance
            let balance = self.balance_of(&from);
            if balance < value {
                return Err(TokenError::InsufficientBalance {
                    account: from,
                    balance,
                    requested: value,
                });
            }
            return Ok(());
        }
        let receiving = self.balance_of(&to);
        if receiving.checked_add(value).is_none() {
            return Err(TokenError::Overflow);
        }
        self.debit(from, value)?;
        self.credit(to, value)
    }

    fn approve(&mut self, owner: Address, spender: Address, value: Amount) -> Result<(), TokenError> {
        self.allowances
            .entry(owner)
            .or_default()
            .insert(spender, value);
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        value: Amount,
    ) -> Result<(), TokenError> {
        let allowance = self.allowance(&from, &spender);
        if allowance < value {
            return Err(TokenError::InsufficientAllowance {
                owner: from,
                spender,
                allowance,
                requested: value,
            });
        }
        self.transfer(from, to, value)?;
        self.approve(from, spender, allowance - value)
    }
}

/// Tokens deployed on the host, keyed by contract address.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRegistry {
    tokens: BTreeMap<Address, TokenLedger>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deploy(&mut self, address: Address, token: TokenLedger) {
        self.tokens.insert(address, token);
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.tokens.contains_key(address)
    }

    pub fn get(&self, address: &Address) -> Option<&TokenLedger> {
        self.tokens.get(address)
    }

    pub fn get_mut(&mut self, address: &Address) -> Option<&mut TokenLedger> {
        self.tokens.get_mut(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &TokenLedger)> {
        self.tokens.iter()
    }
}
