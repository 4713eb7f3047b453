//! MultiBank: the public operation surface.
//!
//! Claims and deposits move the full requested value through the pool and
//! settle the same value on the caller's ledger entry. Every precondition is
//! checked, and the next ledger position computed, before anything moves.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::access::AccessRegistry;
use crate::address::Address;
use crate::error::BankError;
use crate::faucet::FaucetController;
use crate::ledger::{Amount, CounterId, NetPosition, NettingLedger};
use crate::native::NativeLedger;
use crate::pool::PooledAssetAccount;
use crate::token::{TokenLedger, TokenRegistry};

/// What a bank call can see of the host: its own address, the caller and the
/// balances it may move.
pub struct Env<'a> {
    pub this: Address,
    pub caller: Address,
    pub tokens: &'a mut TokenRegistry,
    pub native: &'a mut NativeLedger,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BankCall {
    AddAuthorized { account: Address },
    RemoveAuthorized { account: Address },
    TransferOwnership { new_owner: Address },
    SetBankToken { token: Address },
    SetFaucetAddress { account: Address },
    SetFaucetAmount { amount: Amount },
    Faucet { target: Address },
    Claim { value: Amount },
    Deposit { value: Amount },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallOutput {
    Done,
    Membership { account: Address, changed: bool },
    Settled { debet: Amount, credit: Amount },
    Disbursed { target: Address, amount: Amount },
    Received { value: Amount },
    Deployed { address: Address },
}

impl CallOutput {
    fn settled(position: NetPosition) -> Self {
        CallOutput::Settled {
            debet: position.debet_counter(),
            credit: position.credit_counter(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiBank {
    access: AccessRegistry,
    bank_token: Option<Address>,
    pool: PooledAssetAccount,
    ledger: NettingLedger,
    faucet: FaucetController,
}

impl MultiBank {
    pub fn new(owner: Address) -> Self {
        Self {
            access: AccessRegistry::new(owner),
            bank_token: None,
            pool: PooledAssetAccount::new(),
            ledger: NettingLedger::new(),
            faucet: FaucetController::new(owner),
        }
    }

    // ---- reads ----

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    pub fn is_authorized(&self, account: &Address) -> bool {
        self.access.is_authorized(account)
    }

    pub fn authorized_accounts(&self) -> &[Address] {
        self.access.list_authorized()
    }

    pub fn access(&self) -> &AccessRegistry {
        &self.access
    }

    pub fn bank_token(&self) -> Option<Address> {
        self.bank_token
    }

    pub fn faucet_address(&self) -> Address {
        self.faucet.address()
    }

    pub fn faucet_amount(&self) -> Amount {
        self.faucet.amount()
    }

    pub fn current_balance(&self) -> Amount {
        self.pool.current_balance()
    }

    pub fn ledger(&self) -> &NettingLedger {
        &self.ledger
    }

    pub fn position(&self, account: &Address) -> NetPosition {
        self.ledger.position(account)
    }

    /// Counter read by wire id: `0` is `debet`, `1` is `credit`.
    pub fn balance_of(&self, account: &Address, counter_id: u8) -> Result<Amount, BankError> {
        let counter = CounterId::try_from(counter_id)?;
        Ok(self.ledger.balance_of(account, counter))
    }

    // ---- administration ----

    pub fn add_authorized(&mut self, caller: &Address, account: Address) -> Result<bool, BankError> {
        self.access.add_authorized(caller, account)
    }

    pub fn remove_authorized(&mut self, caller: &Address, account: &Address) -> Result<bool, BankError> {
        self.access.remove_authorized(caller, account)
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<(), BankError> {
        self.access.transfer_ownership(caller, new_owner)
    }

    pub fn set_bank_token(&mut self, env: &mut Env<'_>, token: Address) -> Result<(), BankError> {
        self.access.ensure_owner(&env.caller)?;
        let ledger = env
            .tokens
            .get(&token)
            .ok_or(BankError::UnknownToken { token })?;
        self.pool.resync(ledger, &env.this);
        self.bank_token = Some(token);
        info!(%token, pool = self.pool.current_balance(), "bank token set");
        Ok(())
    }

    pub fn set_faucet_address(&mut self, caller: &Address, account: Address) -> Result<(), BankError> {
        self.faucet.set_address(&self.access, caller, account)
    }

    pub fn set_faucet_amount(&mut self, caller: &Address, amount: Amount) -> Result<(), BankError> {
        self.faucet.set_amount(&self.access, caller, amount)
    }

    // ---- value movement ----

    pub fn claim(&mut self, env: &mut Env<'_>, value: Amount) -> Result<NetPosition, BankError> {
        let caller = env.caller;
        self.access.ensure_authorized(&caller)?;
        let next = self.ledger.preview_claim(&caller, value)?;
        let token = Self::token_mut(self.bank_token, env.tokens)?;
        self.pool.withdraw(token, env.this, caller, value)?;
        self.ledger.commit(caller, next);
        info!(%caller, value, pool = self.pool.current_balance(), "claim settled");
        Ok(next)
    }

    pub fn deposit(&mut self, env: &mut Env<'_>, value: Amount) -> Result<NetPosition, BankError> {
        let caller = env.caller;
        self.access.ensure_authorized(&caller)?;
        let next = self.ledger.preview_deposit(&caller, value)?;
        let token = Self::token_mut(self.bank_token, env.tokens)?;
        self.pool.deposit_from(token, env.this, caller, value)?;
        self.ledger.commit(caller, next);
        info!(%caller, value, pool = self.pool.current_balance(), "deposit settled");
        Ok(next)
    }

    pub fn faucet(&mut self, env: &mut Env<'_>, target: Address) -> Result<Amount, BankError> {
        let reserve = env.native.balance_of(&env.this);
        let amount = self
            .faucet
            .authorize(&self.access, &env.caller, &target, reserve)?;
        env.native.transfer(env.this, target, amount)?;
        info!(%target, amount, "faucet disbursed");
        Ok(amount)
    }

    /// Bare native transfer into the bank. Accepted from anyone.
    pub fn receive(&mut self, env: &mut Env<'_>, value: Amount) -> Result<(), BankError> {
        env.native.transfer(env.caller, env.this, value)?;
        info!(from = %env.caller, value, "native currency received");
        Ok(())
    }

    /// The host reports a direct token transfer into the bank's address.
    pub fn on_token_received(&mut self, token: &Address, value: Amount) -> Result<(), BankError> {
        if self.bank_token == Some(*token) {
            self.pool.record_inflow(value)?;
        }
        Ok(())
    }

    /// Compare the pool mirror with the token's view of the bank's balance.
    pub fn verify_pool(&self, tokens: &TokenRegistry, this: &Address) -> Result<(), BankError> {
        match self.bank_token {
            Some(token) => {
                let ledger = tokens.get(&token).ok_or(BankError::UnknownToken { token })?;
                self.pool.verify(ledger, this)
            }
            None => Ok(()),
        }
    }

    pub fn dispatch(&mut self, env: &mut Env<'_>, call: &BankCall) -> Result<CallOutput, BankError> {
        let caller = env.caller;
        match call {
            BankCall::AddAuthorized { account } => {
                let changed = self.add_authorized(&caller, *account)?;
                Ok(CallOutput::Membership {
                    account: *account,
                    changed,
                })
            }
            BankCall::RemoveAuthorized { account } => {
                let changed = self.remove_authorized(&caller, account)?;
                Ok(CallOutput::Membership {
                    account: *account,
                    changed,
                })
            }
            BankCall::TransferOwnership { new_owner } => {
                self.transfer_ownership(&caller, *new_owner)?;
                Ok(CallOutput::Done)
            }
            BankCall::SetBankToken { token } => {
                self.set_bank_token(env, *token)?;
                Ok(CallOutput::Done)
            }
            BankCall::SetFaucetAddress { account } => {
                self.set_faucet_address(&caller, *account)?;
                Ok(CallOutput::Done)
            }
            BankCall::SetFaucetAmount { amount } => {
                self.set_faucet_amount(&caller, *amount)?;
                Ok(CallOutput::Done)
            }
            BankCall::Faucet { target } => {
                let amount = self.faucet(env, *target)?;
                Ok(CallOutput::Disbursed {
                    target: *target,
                    amount,
                })
            }
            BankCall::Claim { value } => self.claim(env, *value).map(CallOutput::settled),
            BankCall::Deposit { value } => self.deposit(env, *value).map(CallOutput::settled),
        }
    }

    fn token_mut(
        bank_token: Option<Address>,
        tokens: &mut TokenRegistry,
    ) -> Result<&mut TokenLedger, BankError> {
        let token = bank_token.ok_or(BankError::TokenNotConfigured)?;
        tokens
            .get_mut(&token)
            .ok_or(BankError::UnknownToken { token })
    }
}
