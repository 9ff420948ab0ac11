//! # Lucky Number Token
//!
//! The fungible token the shop trades. It is a plain balance ledger with an
//! operator model: accounts registered as *default operators* at deployment
//! may mint, burn and move tokens on behalf of any holder without a per-call
//! allowance.
//!
//! ## Security Model
//!
//! - **Operator capability**: the privileged primitives take an
//!   [`OperatorGrant`]. The only way to obtain one is from
//!   [`LuckyToken::deploy`], which hands it to the deploying contract once.
//!   Holding the grant *is* the authorization; the ledger only checks that
//!   the grant belongs to this token.
//! - **Holder transfers**: [`TokenLedger::transfer`] moves the caller's own
//!   tokens. Authenticating the caller is the runtime's job.
//! - **Supply tracking**: total supply and balances are validated before
//!   either is written. Overflow is checked on every operation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use lucky_protocol::config::{TOKEN_DECIMALS, TOKEN_NAME, TOKEN_SYMBOL};
use lucky_protocol::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during token ledger operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// The account holds fewer tokens than the operation needs.
    #[error("insufficient token balance: {account} has {balance}, needs {amount}")]
    InsufficientBalance {
        account: Address,
        balance: u64,
        amount: u64,
    },

    /// Minting would push the total supply past `u64::MAX`.
    #[error("supply overflow: minting {amount} would exceed u64::MAX")]
    SupplyOverflow { amount: u64 },

    /// Crediting would push an account balance past `u64::MAX`.
    #[error("balance overflow: {account} cannot receive {amount}")]
    BalanceOverflow { account: Address, amount: u64 },

    /// The grant was issued by a different token deployment.
    #[error("operator grant for {grant_token} presented to token {token}")]
    ForeignGrant { token: Address, grant_token: Address },
}

// ---------------------------------------------------------------------------
// Operator capability
// ---------------------------------------------------------------------------

/// Proof that its holder was registered as a default operator when the
/// token was deployed.
///
/// There is no public constructor. Deserialization exists only so that a
/// contract holding a grant can be restored from its own snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorGrant {
    token: Address,
    operator: Address,
}

impl OperatorGrant {
    /// The token this grant is valid for.
    pub fn token(&self) -> Address {
        self.token
    }

    /// The operator the grant was issued to.
    pub fn operator(&self) -> Address {
        self.operator
    }
}

// ---------------------------------------------------------------------------
// Ledger interface
// ---------------------------------------------------------------------------

/// The narrow token interface the shop consumes.
///
/// Implementations must make every mutating call all-or-nothing: on `Err`
/// no balance and no supply has changed.
pub trait TokenLedger {
    fn address(&self) -> Address;
    fn name(&self) -> &str;
    fn symbol(&self) -> &str;
    fn decimals(&self) -> u8;
    fn total_supply(&self) -> u64;
    fn balance_of(&self, account: &Address) -> u64;
    fn default_operators(&self) -> &[Address];

    /// Holder-initiated transfer of `from`'s own tokens.
    fn transfer(&mut self, from: Address, to: Address, amount: u64) -> Result<(), TokenError>;

    /// Validates a move without performing it. `transfer` and
    /// `operator_transfer` fail exactly when this fails.
    fn check_transfer(&self, from: &Address, to: &Address, amount: u64) -> Result<(), TokenError>;

    /// Creates `amount` new tokens for `to`.
    fn mint(&mut self, grant: &OperatorGrant, to: Address, amount: u64) -> Result<(), TokenError>;

    /// Destroys `amount` of `from`'s tokens.
    fn burn(&mut self, grant: &OperatorGrant, from: Address, amount: u64) -> Result<(), TokenError>;

    /// Moves tokens between any two accounts on the operator's authority.
    fn operator_transfer(
        &mut self,
        grant: &OperatorGrant,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<(), TokenError>;
}

// ---------------------------------------------------------------------------
// LuckyToken
// ---------------------------------------------------------------------------

/// The Lucky Number Token ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LuckyToken {
    address: Address,
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: u64,
    balances: BTreeMap<Address, u64>,
    default_operators: Vec<Address>,
}

impl LuckyToken {
    /// Deploys the token at `address`, registers `operator` as its only
    /// default operator and mints `initial_supply` to `operator`.
    ///
    /// Returns the ledger together with the operator's grant.
    pub fn deploy(address: Address, operator: Address, initial_supply: u64) -> (Self, OperatorGrant) {
        let mut balances = BTreeMap::new();
        if initial_supply > 0 {
            balances.insert(operator, initial_supply);
        }
        let token = Self {
            address,
            name: TOKEN_NAME.to_string(),
            symbol: TOKEN_SYMBOL.to_string(),
            decimals: TOKEN_DECIMALS,
            total_supply: initial_supply,
            balances,
            default_operators: vec![operator],
        };
        let grant = OperatorGrant {
            token: address,
            operator,
        };
        tracing::debug!(token = %address, %operator, initial_supply, "token deployed");
        (token, grant)
    }

    /// Number of accounts holding a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    fn check_grant(&self, grant: &OperatorGrant) -> Result<(), TokenError> {
        if grant.token != self.address {
            return Err(TokenError::ForeignGrant {
                token: self.address,
                grant_token: grant.token,
            });
        }
        Ok(())
    }

    fn set_balance(&mut self, account: Address, amount: u64) {
        if amount == 0 {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, amount);
        }
    }

    fn move_tokens(&mut self, from: Address, to: Address, amount: u64) -> Result<(), TokenError> {
        self.check_transfer(&from, &to, amount)?;
        if from == to {
            return Ok(());
        }
        let from_balance = self.balance_of(&from);
        let to_balance = self.balance_of(&to);
        self.set_balance(from, from_balance - amount);
        self.set_balance(to, to_balance + amount);
        Ok(())
    }
}

impl TokenLedger for LuckyToken {
    fn address(&self) -> Address {
        self.address
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn total_supply(&self) -> u64 {
        self.total_supply
    }

    fn balance_of(&self, account: &Address) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn default_operators(&self) -> &[Address] {
        &self.default_operators
    }

    fn transfer(&mut self, from: Address, to: Address, amount: u64) -> Result<(), TokenError> {
        self.move_tokens(from, to, amount)
    }

    fn check_transfer(&self, from: &Address, to: &Address, amount: u64) -> Result<(), TokenError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                account: *from,
                balance,
                amount,
            });
        }
        if from != to && self.balance_of(to).checked_add(amount).is_none() {
            return Err(TokenError::BalanceOverflow {
                account: *to,
                amount,
            });
        }
        Ok(())
    }

    fn mint(&mut self, grant: &OperatorGrant, to: Address, amount: u64) -> Result<(), TokenError> {
        self.check_grant(grant)?;
        let new_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TokenError::SupplyOverflow { amount })?;
        // Every balance is bounded by the supply, so this cannot overflow
        // once the supply check passed.
        let new_balance = self.balance_of(&to) + amount;
        self.total_supply = new_supply;
        self.set_balance(to, new_balance);
        Ok(())
    }

    fn burn(&mut self, grant: &OperatorGrant, from: Address, amount: u64) -> Result<(), TokenError> {
        self.check_grant(grant)?;
        let balance = self.balance_of(&from);
        if balance < amount {
            return Err(TokenError::InsufficientBalance {
                account: from,
                balance,
                amount,
            });
        }
        self.set_balance(from, balance - amount);
        self.total_supply -= amount;
        Ok(())
    }

    fn operator_transfer(
        &mut self,
        grant: &OperatorGrant,
        from: Address,
        to: Address,
        amount: u64,
    ) -> Result<(), TokenError> {
        self.check_grant(grant)?;
        self.move_tokens(from, to, amount)
    }
}
