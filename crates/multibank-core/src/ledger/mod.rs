//! Dual-counter netting ledger.
//!
//! Each account's net claim/deposit imbalance is a [`NetPosition`]: a
//! magnitude plus a sign. The sign-split view exposes it as two non-negative
//! counters, `debet` (deposits exceed claims) and `credit` (claims exceed
//! deposits). Since only one magnitude exists, at most one of the two counters
//! can ever be non-zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::Address;

pub type Amount = u64;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger counter overflow")]
    Overflow,
    #[error("unknown counter id {0}")]
    UnknownCounter(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sign {
    /// Deposits exceed claims; the magnitude is the `debet` counter.
    Positive,
    /// Claims exceed deposits; the magnitude is the `credit` counter.
    Negative,
}

/// Which half of the sign-split pair to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CounterId {
    Debet = 0,
    Credit = 1,
}

impl TryFrom<u8> for CounterId {
    type Error = LedgerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CounterId::Debet),
            1 => Ok(CounterId::Credit),
            other => Err(LedgerError::UnknownCounter(other)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetPosition {
    magnitude: Amount,
    sign: Sign,
}

impl Default for NetPosition {
    fn default() -> Self {
        Self::FLAT
    }
}

impl NetPosition {
    pub const FLAT: NetPosition = NetPosition {
        magnitude: 0,
        sign: Sign::Positive,
    };

    /// Zero is always stored with a positive sign so that equal positions
    /// compare equal.
    pub fn new(magnitude: Amount, sign: Sign) -> Self {
        if magnitude == 0 {
            Self::FLAT
        } else {
            Self { magnitude, sign }
        }
    }

    pub fn debet(magnitude: Amount) -> Self {
        Self::new(magnitude, Sign::Positive)
    }

    pub fn credit(magnitude: Amount) -> Self {
        Self::new(magnitude, Sign::Negative)
    }

    /// Rebuild a position from its counters. `None` if both are non-zero.
    pub fn from_counters(debet: Amount, credit: Amount) -> Option<Self> {
        match (debet, credit) {
            (d, 0) => Some(Self::debet(d)),
            (0, c) => Some(Self::credit(c)),
            _ => None,
        }
    }

    pub fn magnitude(&self) -> Amount {
        self.magnitude
    }

    pub fn sign(&self) -> Sign {
        self.sign
    }

    pub fn is_flat(&self) -> bool {
        self.magnitude == 0
    }

    pub fn counter(&self, id: CounterId) -> Amount {
        match (id, self.sign) {
            (CounterId::Debet, Sign::Positive) | (CounterId::Credit, Sign::Negative) => {
                self.magnitude
            }
            _ => 0,
        }
    }

    pub fn debet_counter(&self) -> Amount {
        self.counter(CounterId::Debet)
    }

    pub fn credit_counter(&self) -> Amount {
        self.counter(CounterId::Credit)
    }
}

/// Settle a claim of `value`: consume `debet` first, then grow `credit`.
pub fn apply_claim(pos: NetPosition, value: Amount) -> Result<NetPosition, LedgerError> {
    offset(pos, value, Sign::Negative)
}

/// Settle a deposit of `value`: consume `credit` first, then grow `debet`.
pub fn apply_deposit(pos: NetPosition, value: Amount) -> Result<NetPosition, LedgerError> {
    offset(pos, value, Sign::Positive)
}

fn offset(pos: NetPosition, value: Amount, towards: Sign) -> Result<NetPosition, LedgerError> {
    if pos.sign == towards || pos.is_flat() {
        let magnitude = pos
            .magnitude
            .checked_add(value)
            .ok_or(LedgerError::Overflow)?;
        return Ok(NetPosition::new(magnitude, towards));
    }
    if pos.magnitude >= value {
        Ok(NetPosition::new(pos.magnitude - value, pos.sign))
    } else {
        Ok(NetPosition::new(value - pos.magnitude, towards))
    }
}

/// Per-account positions. Entries appear on first settlement and are never
/// removed, only driven back to flat.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NettingLedger {
    positions: BTreeMap<Address, NetPosition>,
}

impl NettingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, account: &Address) -> NetPosition {
        self.positions.get(account).copied().unwrap_or_default()
    }

    pub fn balance_of(&self, account: &Address, counter: CounterId) -> Amount {
        self.position(account).counter(counter)
    }

    pub fn preview_claim(&self, account: &Address, value: Amount) -> Result<NetPosition, LedgerError> {
        apply_claim(self.position(account), value)
    }

    pub fn preview_deposit(
        &self,
        account: &Address,
        value: Amount,
    ) -> Result<NetPosition, LedgerError> {
        apply_deposit(self.position(account), value)
    }

    pub fn settle_claim(&mut self, account: Address, value: Amount) -> Result<NetPosition, LedgerError> {
        let next = self.preview_claim(&account, value)?;
        self.commit(account, next);
        Ok(next)
    }

    pub fn settle_deposit(
        &mut self,
        account: Address,
        value: Amount,
    ) -> Result<NetPosition, LedgerError> {
        let next = self.preview_deposit(&account, value)?;
        self.commit(account, next);
        Ok(next)
    }

    /// Store a position computed by one of the `preview_*` calls.
    pub fn commit(&mut self, account: Address, next: NetPosition) {
        debug!(
            %account,
            debet = next.debet_counter(),
            credit = next.credit_counter(),
            "ledger settled"
        );
        self.positions.insert(account, next);
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Address, &NetPosition)> {
        self.positions.iter()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
