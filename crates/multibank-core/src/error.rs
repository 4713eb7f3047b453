use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::Address;
use crate::ledger::{Amount, LedgerError};
use crate::token::TokenError;

/// Capability a caller was missing when a call was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Authorized,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => f.write_str("the owner"),
            Role::Authorized => f.write_str("authorized"),
        }
    }
}

/// Canonical error type of the bank operations.
///
/// Every variant is raised before any state is touched, so a failed call
/// leaves no trace behind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BankError {
    /// Administrative call by a non-owner, or claim/deposit by an account
    /// outside the authorized set.
    #[error("caller {caller} is not {required}")]
    Unauthorized { caller: Address, required: Role },

    #[error("wrong faucet caller {caller}")]
    WrongFaucetCaller { caller: Address },

    #[error("faucet target {target} is not authorized")]
    TargetNotAuthorized { target: Address },

    /// Claim beyond the pooled balance, or deposit beyond the caller's token
    /// balance.
    #[error("balance is low: available {available}, requested {requested}")]
    InsufficientPoolBalance { available: Amount, requested: Amount },

    #[error("insufficient allowance: allowed {allowance}, requested {requested}")]
    InsufficientAllowance { allowance: Amount, requested: Amount },

    #[error("not enough native balance: available {available}, requested {requested}")]
    InsufficientNativeBalance { available: Amount, requested: Amount },

    #[error("bank token is not configured")]
    TokenNotConfigured,

    #[error("unknown token {token}")]
    UnknownToken { token: Address },

    #[error("new owner is the zero address")]
    ZeroAddress,

    /// The cached pool balance disagrees with the token's own accounting.
    #[error("pool out of sync: cached {cached}, token reports {actual}")]
    PoolOutOfSync { cached: Amount, actual: Amount },

    #[error("arithmetic overflow")]
    Overflow,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("token failure: {0}")]
    Token(#[from] TokenError),
}

impl BankError {
    /// Stable, machine-checkable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            BankError::Unauthorized { .. } => "unauthorized",
            BankError::WrongFaucetCaller { .. } => "wrong_faucet_caller",
            BankError::TargetNotAuthorized { .. } => "target_not_authorized",
            BankError::InsufficientPoolBalance { .. } => "insufficient_pool_balance",
            BankError::InsufficientAllowance { .. } => "insufficient_allowance",
            BankError::InsufficientNativeBalance { .. } => "insufficient_native_balance",
            BankError::TokenNotConfigured => "token_not_configured",
            BankError::UnknownToken { .. } => "unknown_token",
            BankError::ZeroAddress => "zero_address",
            BankError::PoolOutOfSync { .. } => "pool_out_of_sync",
            BankError::Overflow => "overflow",
            BankError::Ledger(LedgerError::Overflow) => "overflow",
            BankError::Ledger(LedgerError::UnknownCounter(_)) => "unknown_counter",
            BankError::Token(_) => "token_failure",
        }
    }
}
