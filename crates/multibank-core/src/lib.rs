//! Core of the MultiBank custodial ledger.
//!
//! A fixed set of authorized accounts claim (withdraw) and deposit a fungible
//! token against a pooled balance held by the bank, while the bank tracks each
//! account's net claim/deposit imbalance as a sign-split pair of counters. A
//! separate, owner-configured faucet disburses native currency.
//!
//! The crate is layered leaves first:
//!
//! * [`access`] : owner identity and the ordered set of authorized accounts.
//! * [`pool`] : the bank's cached mirror of its token holdings.
//! * [`ledger`] : the `debet`/`credit` netting ledger and its settlement rules.
//! * [`faucet`] : native-currency disbursement configuration and checks.
//! * [`bank`] : the public operation surface composing the above.
//! * [`chain`] : a host runtime that gives every call all-or-nothing
//!   semantics, verifies signed transactions and keeps hash-chained receipts.
//!
//! The fungible token ([`token`]) and native balances ([`native`]) are the
//! external collaborators the bank talks to.

pub mod access;
pub mod address;
pub mod bank;
pub mod chain;
pub mod config;
pub mod faucet;
pub mod identity;
pub mod ledger;
pub mod native;
pub mod pool;
pub mod token;

mod error;

pub use address::Address;
pub use bank::{BankCall, CallOutput, MultiBank};
pub use chain::{Call, Chain, ChainError, Receipt, SignedTransaction, Transaction};
pub use error::{BankError, Role};
pub use ledger::{Amount, CounterId, NetPosition};
