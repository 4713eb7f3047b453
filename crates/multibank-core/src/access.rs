//! Owner identity and the authorized account set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::address::Address;
use crate::error::{BankError, Role};

/// Insertion-ordered set with O(log n) membership and swap-remove.
///
/// Removing a member moves the last member into its slot, so enumeration order
/// is not stable across removals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Address>", into = "Vec<Address>")]
pub struct AuthorizedSet {
    members: Vec<Address>,
    index: BTreeMap<Address, usize>,
}

impl AuthorizedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `account` was already a member.
    pub fn insert(&mut self, account: Address) -> bool {
        if self.index.contains_key(&account) {
            return false;
        }
        self.index.insert(account, self.members.len());
        self.members.push(account);
        true
    }

    /// Returns `false` if `account` was not a member.
    pub fn remove(&mut self, account: &Address) -> bool {
        let Some(slot) = self.index.remove(account) else {
            return false;
        };
        self.members.swap_remove(slot);
        if let Some(moved) = self.members.get(slot) {
            self.index.insert(*moved, slot);
        }
        true
    }

    pub fn contains(&self, account: &Address) -> bool {
        self.index.contains_key(account)
    }

    pub fn as_slice(&self) -> &[Address] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Membership index and sequence agree, with no duplicates.
    pub fn is_consistent(&self) -> bool {
        self.index.len() == self.members.len()
            && self
                .members
                .iter()
                .enumerate()
                .all(|(slot, account)| self.index.get(account) == Some(&slot))
    }
}

impl From<Vec<Address>> for AuthorizedSet {
    fn from(accounts: Vec<Address>) -> Self {
        let mut set = Self::new();
        for account in accounts {
            set.insert(account);
        }
        set
    }
}

impl From<AuthorizedSet> for Vec<Address> {
    fn from(set: AuthorizedSet) -> Self {
        set.members
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRegistry {
    owner: Address,
    authorized: AuthorizedSet,
}

impl AccessRegistry {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            authorized: AuthorizedSet::new(),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn ensure_owner(&self, caller: &Address) -> Result<(), BankError> {
        if *caller != self.owner {
            return Err(BankError::Unauthorized {
                caller: *caller,
                required: Role::Owner,
            });
        }
        Ok(())
    }

    pub fn ensure_authorized(&self, caller: &Address) -> Result<(), BankError> {
        if !self.is_authorized(caller) {
            return Err(BankError::Unauthorized {
                caller: *caller,
                required: Role::Authorized,
            });
        }
        Ok(())
    }

    pub fn is_authorized(&self, account: &Address) -> bool {
        self.authorized.contains(account)
    }

    pub fn list_authorized(&self) -> &[Address] {
        self.authorized.as_slice()
    }

    pub fn authorized_set(&self) -> &AuthorizedSet {
        &self.authorized
    }

    /// Idempotent: adding a member twice leaves one entry.
    pub fn add_authorized(&mut self, caller: &Address, account: Address) -> Result<bool, BankError> {
        self.ensure_owner(caller)?;
        let added = self.authorized.insert(account);
        if added {
            info!(%account, "account authorized");
        } else {
            debug!(%account, "account already authorized");
        }
        Ok(added)
    }

    /// Removing a non-member is a silent no-op.
    pub fn remove_authorized(
        &mut self,
        caller: &Address,
        account: &Address,
    ) -> Result<bool, BankError> {
        self.ensure_owner(caller)?;
        let removed = self.authorized.remove(account);
        if removed {
            info!(%account, "authorization revoked");
        } else {
            debug!(%account, "revoke ignored, account was not authorized");
        }
        Ok(removed)
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> Result<(), BankError> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(BankError::ZeroAddress);
        }
        info!(previous = %self.owner, %new_owner, "ownership transferred");
        self.owner = new_owner;
        Ok(())
    }
}
