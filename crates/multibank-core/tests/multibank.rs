//! End-to-end behaviour of the bank running on the host simulator.

use multibank_core::chain::Outcome;
use multibank_core::identity::Identity;
use multibank_core::{Address, Amount, BankCall, Call, CallOutput, Chain, CounterId, Receipt};

const DEBET: u8 = 0;
const CREDIT: u8 = 1;

struct Fixture {
    chain: Chain,
    token: Address,
    owner: Identity,
    authorized: Identity,
    guest: Identity,
}

impl Fixture {
    /// Bank and token deployed by the owner, token configured, nobody
    /// authorized yet.
    fn new() -> Self {
        let owner = Identity::dev("owner");
        let mut chain = Chain::new(owner.address());
        let token = chain.state().peek_contract_address(&owner.address());
        let mut fixture = Self {
            chain,
            token,
            owner,
            authorized: Identity::dev("authorized"),
            guest: Identity::dev("guest"),
        };
        fixture.applied(
            &fixture.owner.clone(),
            Call::DeployToken {
                name: "Bank Token".into(),
                symbol: "BNK".into(),
                supply: 1_000_000,
            },
        );
        fixture.applied(
            &fixture.owner.clone(),
            BankCall::SetBankToken { token }.into(),
        );
        fixture
    }

    fn bank(&self) -> Address {
        self.chain.bank_address()
    }

    fn send(&mut self, who: &Identity, call: Call) -> Receipt {
        let receipt = self.chain.submit_call(who, call).unwrap();
        self.chain.check_invariants().unwrap();
        receipt
    }

    fn applied(&mut self, who: &Identity, call: Call) -> CallOutput {
        match self.send(who, call).outcome {
            Outcome::Applied { output } => output,
            Outcome::Reverted { reason, .. } => panic!("unexpected revert: {reason}"),
        }
    }

    fn reverted(&mut self, who: &Identity, call: Call) -> String {
        match self.send(who, call).outcome {
            Outcome::Reverted { code, .. } => code,
            Outcome::Applied { output } => panic!("expected a revert, got {output:?}"),
        }
    }

    fn authorize(&mut self, account: Address) {
        self.applied(&self.owner.clone(), BankCall::AddAuthorized { account }.into());
    }

    fn fund_pool(&mut self, value: Amount) {
        let call = Call::TokenTransfer {
            token: self.token,
            to: self.bank(),
            value,
        };
        self.applied(&self.owner.clone(), call);
    }

    fn fund_account(&mut self, account: Address, value: Amount) {
        let call = Call::TokenTransfer {
            token: self.token,
            to: account,
            value,
        };
        self.applied(&self.owner.clone(), call);
    }

    fn approve(&mut self, who: &Identity, value: Amount) {
        let call = Call::TokenApprove {
            token: self.token,
            spender: self.bank(),
            value,
        };
        self.applied(who, call);
    }

    fn claim(&mut self, who: &Identity, value: Amount) {
        self.applied(who, BankCall::Claim { value }.into());
    }

    fn approve_and_deposit(&mut self, who: &Identity, value: Amount) {
        self.approve(who, value);
        self.applied(who, BankCall::Deposit { value }.into());
    }

    fn counters(&self, account: &Address) -> (Amount, Amount) {
        let bank = self.chain.bank();
        (
            bank.balance_of(account, DEBET).unwrap(),
            bank.balance_of(account, CREDIT).unwrap(),
        )
    }

    fn token_balance(&self, account: &Address) -> Amount {
        self.chain.bank_token_balance(account)
    }

    /// Pool of 3000, authorized account holding 1000 with a generous approval.
    fn netting() -> Self {
        let mut fixture = Self::new();
        let account = fixture.authorized.address();
        fixture.fund_pool(3_000);
        fixture.fund_account(account, 1_000);
        fixture.authorize(account);
        let who = fixture.authorized.clone();
        fixture.approve(&who, 4_000);
        fixture
    }
}

// ---- authorization ----

#[test]
fn guest_and_authorized_cannot_administer() {
    let mut f = Fixture::new();
    f.authorize(f.authorized.address());
    let guest = f.guest.clone();
    let authorized = f.authorized.clone();
    let admin_calls = |target: Address, token: Address| -> Vec<Call> {
        vec![
            BankCall::AddAuthorized { account: target }.into(),
            BankCall::RemoveAuthorized { account: target }.into(),
            BankCall::SetBankToken { token }.into(),
            BankCall::SetFaucetAddress { account: target }.into(),
            BankCall::SetFaucetAmount { amount: 10 }.into(),
            BankCall::TransferOwnership { new_owner: target }.into(),
        ]
    };
    let before = f.chain.snapshot().state;
    for who in [&guest, &authorized] {
        for call in admin_calls(guest.address(), f.token) {
            assert_eq!(f.reverted(who, call), "unauthorized");
        }
    }
    assert_eq!(f.chain.snapshot().state, before);
}

#[test]
fn owner_authorizes_and_lists() {
    let mut f = Fixture::new();
    let account = f.authorized.address();
    f.authorize(account);
    f.authorize(account);
    assert!(f.chain.bank().is_authorized(&account));
    assert_eq!(f.chain.bank().authorized_accounts(), &[account]);
}

#[test]
fn owner_revokes_authorization() {
    let mut f = Fixture::new();
    let account = f.authorized.address();
    f.authorize(account);
    f.applied(
        &f.owner.clone(),
        BankCall::RemoveAuthorized { account }.into(),
    );
    assert!(!f.chain.bank().is_authorized(&account));
    assert!(f.chain.bank().authorized_accounts().is_empty());
}

#[test]
fn revoking_a_never_authorized_account_changes_nothing() {
    let mut f = Fixture::new();
    f.authorize(f.authorized.address());
    let out = f.applied(
        &f.owner.clone(),
        BankCall::RemoveAuthorized {
            account: f.guest.address(),
        }
        .into(),
    );
    assert_eq!(
        out,
        CallOutput::Membership {
            account: f.guest.address(),
            changed: false
        }
    );
    assert_eq!(f.chain.bank().authorized_accounts(), &[f.authorized.address()]);
}

#[test]
fn owner_replaces_bank_token() {
    let mut f = Fixture::new();
    let owner = f.owner.clone();
    let replacement = f.chain.state().peek_contract_address(&owner.address());
    f.applied(
        &owner,
        Call::DeployToken {
            name: "Second".into(),
            symbol: "SND".into(),
            supply: 50,
        },
    );
    f.applied(&owner, BankCall::SetBankToken { token: replacement }.into());
    assert_eq!(f.chain.bank().bank_token(), Some(replacement));
    assert_eq!(f.chain.bank().current_balance(), 0);
}

#[test]
fn ownership_transfer_hands_over_admin_rights() {
    let mut f = Fixture::new();
    let owner = f.owner.clone();
    let guest = f.guest.clone();
    f.applied(
        &owner,
        BankCall::TransferOwnership {
            new_owner: guest.address(),
        }
        .into(),
    );
    assert_eq!(f.chain.bank().owner(), guest.address());
    let call: Call = BankCall::AddAuthorized {
        account: owner.address(),
    }
    .into();
    assert_eq!(f.reverted(&owner, call.clone()), "unauthorized");
    f.applied(&guest, call);
}

// ---- claim ----

#[test]
fn claim_beyond_pool_is_rejected() {
    let mut f = Fixture::new();
    f.fund_pool(3_000);
    f.authorize(f.authorized.address());
    let who = f.authorized.clone();
    let code = f.reverted(&who, BankCall::Claim { value: 3_100 }.into());
    assert_eq!(code, "insufficient_pool_balance");
    assert_eq!(f.chain.bank().current_balance(), 3_000);
}

#[test]
fn claim_by_guest_is_rejected() {
    let mut f = Fixture::new();
    f.fund_pool(3_000);
    let guest = f.guest.clone();
    assert_eq!(f.reverted(&guest, BankCall::Claim { value: 10 }.into()), "unauthorized");
}

#[test]
fn first_claim_pays_out_and_records_credit() {
    let mut f = Fixture::new();
    f.fund_pool(3_000);
    let account = f.authorized.address();
    f.authorize(account);
    let before = f.token_balance(&account);
    let who = f.authorized.clone();
    f.claim(&who, 400);
    assert_eq!(f.chain.bank().current_balance(), 2_600);
    assert_eq!(f.token_balance(&account), before + 400);
    assert_eq!(f.token_balance(&f.bank()), 2_600);
    assert_eq!(f.counters(&account), (0, 400));
}

#[test]
fn claim_without_configured_token_is_rejected() {
    let owner = Identity::dev("owner");
    let alice = Identity::dev("alice");
    let mut chain = Chain::new(owner.address());
    chain
        .submit_call(&owner, BankCall::AddAuthorized { account: alice.address() }.into())
        .unwrap();
    let receipt = chain
        .submit_call(&alice, BankCall::Claim { value: 1 }.into())
        .unwrap();
    match receipt.outcome {
        Outcome::Reverted { code, .. } => assert_eq!(code, "token_not_configured"),
        other => panic!("expected revert, got {other:?}"),
    }
}

// ---- deposit ----

fn deposit_fixture() -> Fixture {
    let mut f = Fixture::new();
    let account = f.authorized.address();
    f.fund_pool(3_000);
    f.fund_account(account, 500);
    f.authorize(account);
    let who = f.authorized.clone();
    f.approve(&who, 200);
    f
}

#[test]
fn deposit_beyond_allowance_is_rejected() {
    let mut f = deposit_fixture();
    let who = f.authorized.clone();
    let code = f.reverted(&who, BankCall::Deposit { value: 300 }.into());
    assert_eq!(code, "insufficient_allowance");
    assert_eq!(f.token_balance(&who.address()), 500);
}

#[test]
fn deposit_beyond_balance_is_rejected() {
    let mut f = deposit_fixture();
    let who = f.authorized.clone();
    f.approve(&who, 1_000);
    let code = f.reverted(&who, BankCall::Deposit { value: 1_000 }.into());
    assert_eq!(code, "insufficient_pool_balance");
}

#[test]
fn first_deposit_pulls_tokens_and_records_debet() {
    let mut f = deposit_fixture();
    let who = f.authorized.clone();
    let pool_before = f.chain.bank().current_balance();
    f.approve_and_deposit(&who, 200);
    assert_eq!(f.chain.bank().current_balance(), pool_before + 200);
    assert_eq!(f.token_balance(&who.address()), 300);
    assert_eq!(f.counters(&who.address()), (200, 0));
}

// ---- netting ----

#[test]
fn equal_claim_and_deposit_net_to_zero() {
    let mut f = Fixture::netting();
    let who = f.authorized.clone();
    f.claim(&who, 400);
    f.approve_and_deposit(&who, 400);
    assert_eq!(f.counters(&who.address()), (0, 0));
}

#[test]
fn smaller_deposit_leaves_credit() {
    let mut f = Fixture::netting();
    let who = f.authorized.clone();
    f.claim(&who, 400);
    f.approve_and_deposit(&who, 200);
    assert_eq!(f.counters(&who.address()), (0, 200));
}

#[test]
fn larger_deposit_flips_to_debet() {
    let mut f = Fixture::netting();
    let who = f.authorized.clone();
    f.claim(&who, 200);
    f.approve_and_deposit(&who, 400);
    assert_eq!(f.counters(&who.address()), (200, 0));
}

#[test]
fn equal_deposit_then_claim_net_to_zero() {
    let mut f = Fixture::netting();
    let who = f.authorized.clone();
    f.approve_and_deposit(&who, 400);
    f.claim(&who, 400);
    assert_eq!(f.counters(&who.address()), (0, 0));
}

#[test]
fn smaller_claim_after_deposit_leaves_debet() {
    let mut f = Fixture::netting();
    let who = f.authorized.clone();
    f.approve_and_deposit(&who, 400);
    f.claim(&who, 200);
    assert_eq!(f.counters(&who.address()), (200, 0));
}

#[test]
fn larger_claim_after_deposit_flips_to_credit() {
    let mut f = Fixture::netting();
    let who = f.authorized.clone();
    f.approve_and_deposit(&who, 200);
    f.claim(&who, 400);
    assert_eq!(f.counters(&who.address()), (0, 200));
    let position = f.chain.bank().position(&who.address());
    assert_eq!(position.counter(CounterId::Credit), 200);
}

#[test]
fn pool_mirror_follows_every_movement() {
    let mut f = Fixture::netting();
    let who = f.authorized.clone();
    for (claim, deposit) in [(100, 50), (700, 900), (10, 0), (0, 250)] {
        f.claim(&who, claim);
        f.approve_and_deposit(&who, deposit);
        assert_eq!(f.chain.bank().current_balance(), f.token_balance(&f.bank()));
    }
    assert_eq!(f.counters(&who.address()), (390, 0));
}

// ---- faucet ----

fn faucet_fixture() -> Fixture {
    let mut f = Fixture::new();
    f.authorize(f.authorized.address());
    f
}

#[test]
fn faucet_rejects_other_callers() {
    let mut f = faucet_fixture();
    let target = f.guest.address();
    for who in [f.guest.clone(), f.authorized.clone()] {
        assert_eq!(
            f.reverted(&who, BankCall::Faucet { target }.into()),
            "wrong_faucet_caller"
        );
    }
}

#[test]
fn faucet_rejects_unauthorized_target() {
    let mut f = faucet_fixture();
    let owner = f.owner.clone();
    let target = f.guest.address();
    assert_eq!(
        f.reverted(&owner, BankCall::Faucet { target }.into()),
        "target_not_authorized"
    );
}

#[test]
fn faucet_defaults_and_setters() {
    let mut f = faucet_fixture();
    let owner = f.owner.clone();
    assert_eq!(f.chain.bank().faucet_address(), owner.address());
    f.applied(&owner, BankCall::SetFaucetAmount { amount: 10 }.into());
    f.applied(
        &owner,
        BankCall::SetFaucetAddress {
            account: f.guest.address(),
        }
        .into(),
    );
    assert_eq!(f.chain.bank().faucet_amount(), 10);
    assert_eq!(f.chain.bank().faucet_address(), f.guest.address());
}

#[test]
fn faucet_needs_reserve_then_pays_exact_amount() {
    let mut f = faucet_fixture();
    let owner = f.owner.clone();
    let guest = f.guest.clone();
    let target = f.authorized.address();
    f.applied(&owner, BankCall::SetFaucetAmount { amount: 10 }.into());
    assert_eq!(
        f.reverted(&owner, BankCall::Faucet { target }.into()),
        "insufficient_native_balance"
    );

    f.chain.mint_native(guest.address(), 1_000).unwrap();
    let bank = f.bank();
    let out = f.applied(&guest, Call::SendNative { to: bank, value: 100 });
    assert_eq!(out, CallOutput::Received { value: 100 });

    let before = f.chain.native_balance(&target);
    f.applied(&owner, BankCall::Faucet { target }.into());
    assert_eq!(f.chain.native_balance(&target), before + 10);
    assert_eq!(f.chain.native_balance(&bank), 90);
    assert_eq!(f.counters(&target), (0, 0));
}

#[test]
fn anyone_can_send_native_to_the_bank() {
    let mut f = Fixture::new();
    let guest = f.guest.clone();
    f.chain.mint_native(guest.address(), 5).unwrap();
    let bank = f.bank();
    f.applied(&guest, Call::SendNative { to: bank, value: 5 });
    assert_eq!(f.chain.native_balance(&bank), 5);
}

// ---- host ----

#[test]
fn genesis_builds_a_ready_bank() {
    let config = multibank_core::config::SimulatorConfig::from_toml(
        r#"
        [genesis]
        owner = "owner"
        authorized = ["alice"]
        faucet_amount = 10
        bank_reserve = 100

        [genesis.token]
        name = "Bank Token"
        symbol = "BNK"
        supply = 100000
        pool_funding = 3000

        [genesis.token.allocations]
        alice = 1000
        "#,
    )
    .unwrap();
    let chain = Chain::genesis(&config.genesis).unwrap();
    let alice = Identity::dev("alice").address();
    assert!(chain.bank().is_authorized(&alice));
    assert_eq!(chain.bank().current_balance(), 3_000);
    assert_eq!(chain.bank_token_balance(&alice), 1_000);
    assert_eq!(chain.native_balance(&chain.bank_address()), 100);
    assert_eq!(chain.bank().faucet_amount(), 10);
    chain.check_invariants().unwrap();
}
