//! Host runtime for the bank.
//!
//! Every call runs against a checkpoint of the whole world and is rolled back
//! if any step fails, so callers only ever observe complete calls. Signed
//! transactions carry a per-sender nonce and leave a hash-chained receipt
//! whether they apply or revert.

use std::collections::BTreeMap;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::address::Address;
use crate::bank::{BankCall, CallOutput, Env, MultiBank};
use crate::config::GenesisConfig;
use crate::error::BankError;
use crate::identity::Identity;
use crate::ledger::{Amount, CounterId};
use crate::native::NativeLedger;
use crate::token::{FungibleToken, TokenLedger, TokenRegistry};

pub const GENESIS_DIGEST: [u8; 32] = [0u8; 32];

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("malformed public key")]
    InvalidPublicKey,
    #[error("invalid transaction signature")]
    InvalidSignature,
    #[error("nonce mismatch for {sender}: expected {expected}, got {got}")]
    NonceMismatch {
        sender: Address,
        expected: u64,
        got: u64,
    },
    #[error("encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("genesis step failed: {0}")]
    Genesis(#[from] BankError),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error(transparent)]
    Pool(BankError),
    #[error("both ledger counters are non-zero for {0}")]
    SplitCounters(Address),
    #[error("authorized set index disagrees with its sequence")]
    AuthorizedSet,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Call {
    Bank(BankCall),
    /// Bare native transfer. Sent to the bank it is the bank's receive.
    SendNative { to: Address, value: Amount },
    DeployToken {
        name: String,
        symbol: String,
        supply: Amount,
    },
    TokenTransfer {
        token: Address,
        to: Address,
        value: Amount,
    },
    TokenApprove {
        token: Address,
        spender: Address,
        value: Amount,
    },
}

impl From<BankCall> for Call {
    fn from(call: BankCall) -> Self {
        Call::Bank(call)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: u64,
    pub call: Call,
}

impl Transaction {
    pub fn digest(&self) -> Result<[u8; 32], ChainError> {
        let mut hasher = Sha256::new();
        hasher.update(b"multibank-tx");
        hasher.update(serde_json::to_vec(self)?);
        Ok(hasher.finalize().into())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedTransaction {
    #[serde(with = "crate::chain::serde_hex")]
    pub public_key: [u8; 32],
    #[serde(with = "crate::chain::serde_hex")]
    pub signature: Vec<u8>,
    pub tx: Transaction,
}

impl SignedTransaction {
    pub fn sign(tx: Transaction, key: &SigningKey) -> Result<Self, ChainError> {
        let digest = tx.digest()?;
        let signature = key.sign(&digest);
        Ok(Self {
            public_key: key.verifying_key().to_bytes(),
            signature: signature.to_bytes().to_vec(),
            tx,
        })
    }

    /// Verify the signature and return the sender's address.
    pub fn sender(&self) -> Result<Address, ChainError> {
        let key =
            VerifyingKey::from_bytes(&self.public_key).map_err(|_| ChainError::InvalidPublicKey)?;
        let signature =
            Signature::from_slice(&self.signature).map_err(|_| ChainError::InvalidSignature)?;
        key.verify_strict(&self.tx.digest()?, &signature)
            .map_err(|_| ChainError::InvalidSignature)?;
        Ok(Address::from_verifying_key(&key))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Applied { output: CallOutput },
    Reverted { code: String, reason: String },
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receipt {
    pub height: u64,
    pub sender: Address,
    pub nonce: u64,
    pub call: Call,
    pub outcome: Outcome,
    #[serde(with = "crate::chain::serde_hex")]
    pub previous: [u8; 32],
    #[serde(with = "crate::chain::serde_hex")]
    pub digest: [u8; 32],
}

impl Receipt {
    fn seal(
        height: u64,
        sender: Address,
        nonce: u64,
        call: Call,
        outcome: Outcome,
        previous: [u8; 32],
    ) -> Result<Self, ChainError> {
        let mut hasher = Sha256::new();
        hasher.update(b"receipt");
        hasher.update(height.to_le_bytes());
        hasher.update(sender.as_bytes());
        hasher.update(nonce.to_le_bytes());
        hasher.update(previous);
        hasher.update(serde_json::to_vec(&call)?);
        hasher.update(serde_json::to_vec(&outcome)?);
        Ok(Self {
            height,
            sender,
            nonce,
            call,
            outcome,
            previous,
            digest: hasher.finalize().into(),
        })
    }
}

/// Everything a call can change. Checkpointed as a whole.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldState {
    pub bank_address: Address,
    pub bank: MultiBank,
    pub tokens: TokenRegistry,
    pub native: NativeLedger,
    deployments: BTreeMap<Address, u64>,
}

impl WorldState {
    fn apply(&mut self, sender: Address, call: &Call) -> Result<CallOutput, BankError> {
        let output = match call {
            Call::Bank(call) => {
                let mut env = Env {
                    this: self.bank_address,
                    caller: sender,
                    tokens: &mut self.tokens,
                    native: &mut self.native,
                };
                self.bank.dispatch(&mut env, call)?
            }
            Call::SendNative { to, value } if *to == self.bank_address => {
                let mut env = Env {
                    this: self.bank_address,
                    caller: sender,
                    tokens: &mut self.tokens,
                    native: &mut self.native,
                };
                self.bank.receive(&mut env, *value)?;
                CallOutput::Received { value: *value }
            }
            Call::SendNative { to, value } => {
                self.native.transfer(sender, *to, *value)?;
                CallOutput::Done
            }
            Call::DeployToken {
                name,
                symbol,
                supply,
            } => {
                let address = self.next_contract_address(sender);
                self.tokens
                    .deploy(address, TokenLedger::new(name, symbol, sender, *supply));
                info!(%address, %symbol, supply, "token deployed");
                CallOutput::Deployed { address }
            }
            Call::TokenTransfer { token, to, value } => {
                let ledger = self
                    .tokens
                    .get_mut(token)
                    .ok_or(BankError::UnknownToken { token: *token })?;
                ledger.transfer(sender, *to, *value)?;
                if *to == self.bank_address && sender != self.bank_address {
                    self.bank.on_token_received(token, *value)?;
                }
                CallOutput::Done
            }
            Call::TokenApprove {
                token,
                spender,
                value,
            } => {
                let ledger = self
                    .tokens
                    .get_mut(token)
                    .ok_or(BankError::UnknownToken { token: *token })?;
                ledger.approve(sender, *spender, *value)?;
                CallOutput::Done
            }
        };
        self.bank.verify_pool(&self.tokens, &self.bank_address)?;
        Ok(output)
    }

    /// Address the next contract deployed by `deployer` will get.
    pub fn peek_contract_address(&self, deployer: &Address) -> Address {
        let nonce = self.deployments.get(deployer).copied().unwrap_or(0);
        Address::derive_contract(deployer, nonce)
    }

    fn next_contract_address(&mut self, deployer: Address) -> Address {
        let nonce = self.deployments.entry(deployer).or_insert(0);
        let address = Address::derive_contract(&deployer, *nonce);
        *nonce += 1;
        address
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub height: u64,
    #[serde(with = "crate::chain::serde_hex")]
    pub head: [u8; 32],
    #[serde(with = "crate::chain::serde_hex")]
    pub state_root: [u8; 32],
    pub state: WorldState,
}

pub struct Chain {
    state: WorldState,
    nonces: BTreeMap<Address, u64>,
    receipts: Vec<Receipt>,
    head: [u8; 32],
}

impl Chain {
    /// Empty host with the bank deployed by `owner`.
    pub fn new(owner: Address) -> Self {
        let mut deployments = BTreeMap::new();
        let bank_address = Address::derive_contract(&owner, 0);
        deployments.insert(owner, 1);
        info!(%bank_address, %owner, "bank deployed");
        Self {
            state: WorldState {
                bank_address,
                bank: MultiBank::new(owner),
                tokens: TokenRegistry::new(),
                native: NativeLedger::new(),
                deployments,
            },
            nonces: BTreeMap::new(),
            receipts: Vec::new(),
            head: GENESIS_DIGEST,
        }
    }

    /// Build the initial world described by `config`. Each step runs through
    /// [`Chain::execute`] so genesis obeys the same rules as later calls.
    pub fn genesis(config: &GenesisConfig) -> Result<Self, ChainError> {
        let owner = Identity::dev(&config.owner).address();
        let mut chain = Self::new(owner);
        let bank = chain.bank_address();

        for (name, value) in &config.native {
            chain.mint_native(Identity::dev(name).address(), *value)?;
        }
        chain.mint_native(bank, config.bank_reserve)?;

        if let Some(token) = &config.token {
            let address = chain.state.peek_contract_address(&owner);
            chain.execute(
                owner,
                &Call::DeployToken {
                    name: token.name.clone(),
                    symbol: token.symbol.clone(),
                    supply: token.supply,
                },
            )?;
            chain.execute(owner, &BankCall::SetBankToken { token: address }.into())?;
            if token.pool_funding > 0 {
                chain.execute(
                    owner,
                    &Call::TokenTransfer {
                        token: address,
                        to: bank,
                        value: token.pool_funding,
                    },
                )?;
            }
            for (name, value) in &token.allocations {
                chain.execute(
                    owner,
                    &Call::TokenTransfer {
                        token: address,
                        to: Identity::dev(name).address(),
                        value: *value,
                    },
                )?;
            }
        }

        for name in &config.authorized {
            let account = Identity::dev(name).address();
            chain.execute(owner, &BankCall::AddAuthorized { account }.into())?;
        }
        chain.execute(
            owner,
            &BankCall::SetFaucetAmount {
                amount: config.faucet_amount,
            }
            .into(),
        )?;
        if let Some(operator) = &config.faucet_operator {
            let account = Identity::dev(operator).address();
            chain.execute(owner, &BankCall::SetFaucetAddress { account }.into())?;
        }
        Ok(chain)
    }

    pub fn bank_address(&self) -> Address {
        self.state.bank_address
    }

    pub fn bank(&self) -> &MultiBank {
        &self.state.bank
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn token(&self, address: &Address) -> Option<&TokenLedger> {
        self.state.tokens.get(address)
    }

    /// Balance of `account` in the configured bank token, zero if none is set.
    pub fn bank_token_balance(&self, account: &Address) -> Amount {
        self.bank()
            .bank_token()
            .and_then(|token| self.token(&token))
            .map(|token| token.balance_of(account))
            .unwrap_or(0)
    }

    pub fn native_balance(&self, account: &Address) -> Amount {
        self.state.native.balance_of(account)
    }

    pub fn nonce_of(&self, account: &Address) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    pub fn receipts(&self) -> &[Receipt] {
        &self.receipts
    }

    pub fn height(&self) -> u64 {
        self.receipts.len() as u64
    }

    pub fn head(&self) -> [u8; 32] {
        self.head
    }

    /// Credit native currency out of thin air. Genesis and test setup only.
    pub fn mint_native(&mut self, account: Address, value: Amount) -> Result<(), BankError> {
        self.state.native.credit(account, value)
    }

    /// Run `call` as `sender` with all-or-nothing semantics.
    pub fn execute(&mut self, sender: Address, call: &Call) -> Result<CallOutput, BankError> {
        let checkpoint = self.state.clone();
        match self.state.apply(sender, call) {
            Ok(output) => Ok(output),
            Err(err) => {
                warn!(%sender, code = err.code(), %err, "call reverted");
                self.state = checkpoint;
                Err(err)
            }
        }
    }

    /// Verify, execute and record a signed transaction. The nonce is consumed
    /// even when the call reverts.
    pub fn submit(&mut self, signed: &SignedTransaction) -> Result<Receipt, ChainError> {
        let sender = signed.sender()?;
        let expected = self.nonce_of(&sender);
        if signed.tx.nonce != expected {
            return Err(ChainError::NonceMismatch {
                sender,
                expected,
                got: signed.tx.nonce,
            });
        }
        self.nonces.insert(sender, expected + 1);
        let outcome = match self.execute(sender, &signed.tx.call) {
            Ok(output) => Outcome::Applied { output },
            Err(err) => Outcome::Reverted {
                code: err.code().to_string(),
                reason: err.to_string(),
            },
        };
        let receipt = Receipt::seal(
            self.height() + 1,
            sender,
            signed.tx.nonce,
            signed.tx.call.clone(),
            outcome,
            self.head,
        )?;
        self.head = receipt.digest;
        self.receipts.push(receipt.clone());
        Ok(receipt)
    }

    /// Sign `call` with `identity` at its next nonce and submit it.
    pub fn submit_call(&mut self, identity: &Identity, call: Call) -> Result<Receipt, ChainError> {
        let tx = Transaction {
            nonce: self.nonce_of(&identity.address()),
            call,
        };
        let signed = SignedTransaction::sign(tx, identity.signing_key())?;
        self.submit(&signed)
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            height: self.height(),
            head: self.head,
            state_root: compute_state_root(&self.state),
            state: self.state.clone(),
        }
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let state = &self.state;
        state
            .bank
            .verify_pool(&state.tokens, &state.bank_address)
            .map_err(InvariantViolation::Pool)?;
        for (account, position) in state.bank.ledger().entries() {
            let debet = position.counter(CounterId::Debet);
            let credit = position.counter(CounterId::Credit);
            if debet.min(credit) != 0 {
                return Err(InvariantViolation::SplitCounters(*account));
            }
        }
        if !state.bank.access().authorized_set().is_consistent() {
            return Err(InvariantViolation::AuthorizedSet);
        }
        Ok(())
    }
}

fn compute_state_root(state: &WorldState) -> [u8; 32] {
    let mut leaves: Vec<[u8; 32]> = Vec::new();
    for (account, balance) in state.native.iter() {
        let mut hasher = Sha256::new();
        hasher.update(b"native");
        hasher.update(account.as_bytes());
        hasher.update(balance.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (token, ledger) in state.tokens.iter() {
        for (holder, balance) in ledger.holders() {
            let mut hasher = Sha256::new();
            hasher.update(b"token");
            hasher.update(token.as_bytes());
            hasher.update(holder.as_bytes());
            hasher.update(balance.to_le_bytes());
            leaves.push(hasher.finalize().into());
        }
        for (owner, spender, allowance) in ledger.allowances() {
            let mut hasher = Sha256::new();
            hasher.update(b"allowance");
            hasher.update(token.as_bytes());
            hasher.update(owner.as_bytes());
            hasher.update(spender.as_bytes());
            hasher.update(allowance.to_le_bytes());
            leaves.push(hasher.finalize().into());
        }
    }
    for (deployer, nonce) in &state.deployments {
        let mut hasher = Sha256::new();
        hasher.update(b"deployments");
        hasher.update(deployer.as_bytes());
        hasher.update(nonce.to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    for (account, position) in state.bank.ledger().entries() {
        let mut hasher = Sha256::new();
        hasher.update(b"position");
        hasher.update(account.as_bytes());
        hasher.update(position.debet_counter().to_le_bytes());
        hasher.update(position.credit_counter().to_le_bytes());
        leaves.push(hasher.finalize().into());
    }
    let mut hasher = Sha256::new();
    hasher.update(b"bank");
    hasher.update(state.bank.owner().as_bytes());
    hasher.update(state.bank.current_balance().to_le_bytes());
    hasher.update(state.bank.faucet_address().as_bytes());
    hasher.update(state.bank.faucet_amount().to_le_bytes());
    match state.bank.bank_token() {
        Some(token) => {
            hasher.update([1u8]);
            hasher.update(token.as_bytes());
        }
        None => hasher.update([0u8]),
    }
    for account in state.bank.authorized_accounts() {
        hasher.update(account.as_bytes());
    }
    leaves.push(hasher.finalize().into());
    build_merkle(leaves)
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return Sha256::digest(b"multibank-empty").into();
    }
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}

pub(crate) mod serde_hex {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<Vec<u8>>,
    {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        T::try_from(bytes).map_err(|_| D::Error::custom("unexpected byte length"))
    }
}
