//! # Lucky Shop Exchange
//!
//! A custodial two-sided market between the native currency and the Lucky
//! Number Token. The shop sells tokens out of its own inventory at
//! `price_for_buy` and buys them back at `price_for_sell`. Its administrator
//! can reprice, mint or burn inventory and sweep the accumulated currency.
//!
//! ## Execution Model
//!
//! Every operation takes a [`CallContext`] (authenticated caller plus the
//! commit timestamp of the enclosing block) and returns an [`Outcome`]: the
//! operation's result together with the events it emitted. Nothing is
//! written until every check has passed, so an `Err` means no balance, no
//! price and no supply changed.
//!
//! ## Rounding
//!
//! Buying uses floor division. A buyer attaching `value` receives
//! `value / price_for_buy` tokens and is charged exactly that many times the
//! price; the remainder never leaves their account.
//!
//! ## Access Control
//!
//! Repricing, minting, burning and withdrawing are gated by a single guard
//! comparing the caller to the administrator fixed at deployment.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lucky_protocol::config::{DEFAULT_PRICE_FOR_BUY, DEFAULT_PRICE_FOR_SELL};
use lucky_protocol::{Address, Bank, BankError};

use crate::token::{LuckyToken, OperatorGrant, TokenError, TokenLedger};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during shop operations.
///
/// Every variant aborts the operation with no side effects.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShopError {
    /// The caller is not the shop administrator.
    #[error("unauthorized: {caller} is not the shop administrator")]
    Unauthorized { caller: Address },

    /// Prices must be strictly positive.
    #[error("invalid price: prices must be greater than zero")]
    InvalidPrice,

    /// Token amounts must be strictly positive.
    #[error("invalid amount: amount must be greater than zero")]
    InvalidAmount,

    /// The attached value does not cover a single token.
    #[error("insufficient payment: sent {value}, one token costs {price}")]
    InsufficientPayment { value: u64, price: u64 },

    /// The shop holds fewer tokens than requested.
    #[error("insufficient inventory: requested {requested}, shop holds {available}")]
    InsufficientInventory { requested: u64, available: u64 },

    /// The caller holds fewer tokens than they tried to sell or send.
    #[error("insufficient token balance: requested {requested}, account holds {available}")]
    InsufficientTokenBalance { requested: u64, available: u64 },

    /// The shop cannot cover a sell payout.
    #[error("insufficient shop funds: payout {required}, shop holds {available}")]
    InsufficientShopFunds { required: u64, available: u64 },

    /// A price or payout computation overflowed `u64`.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// The native currency ledger refused a movement, e.g. the caller cannot
    /// fund the value attached to a purchase.
    #[error("currency: {0}")]
    Currency(#[from] BankError),

    /// The token ledger refused an operation the shop had already validated.
    #[error("token ledger: {0}")]
    Token(#[from] TokenError),
}

impl ShopError {
    /// Stable machine-readable code, suitable for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            ShopError::Unauthorized { .. } => "UNAUTHORIZED",
            ShopError::InvalidPrice => "INVALID_PRICE",
            ShopError::InvalidAmount => "INVALID_AMOUNT",
            ShopError::InsufficientPayment { .. } => "INSUFFICIENT_PAYMENT",
            ShopError::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
            ShopError::InsufficientTokenBalance { .. } => "INSUFFICIENT_TOKEN_BALANCE",
            ShopError::InsufficientShopFunds { .. } => "INSUFFICIENT_SHOP_FUNDS",
            ShopError::ArithmeticOverflow => "ARITHMETIC_OVERFLOW",
            ShopError::Currency(BankError::InsufficientFunds { .. }) => "INSUFFICIENT_FUNDS",
            ShopError::Currency(BankError::Overflow { .. }) => "ARITHMETIC_OVERFLOW",
            ShopError::Token(_) => "TOKEN_LEDGER",
        }
    }
}

pub type ShopResult<T> = Result<T, ShopError>;

// ---------------------------------------------------------------------------
// Call context, events and outcomes
// ---------------------------------------------------------------------------

/// Who is calling and when the enclosing block commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    /// Unix seconds shared by every operation in the same block.
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(caller: Address, timestamp: u64) -> Self {
        Self { caller, timestamp }
    }
}

/// Audit events emitted by the shop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopEvent {
    Deployed {
        shop: Address,
        token: Address,
        administrator: Address,
        initial_supply: u64,
        timestamp: u64,
    },
    SellPriceChange {
        old_price: u64,
        new_price: u64,
        timestamp: u64,
    },
    BuyPriceChange {
        old_price: u64,
        new_price: u64,
        timestamp: u64,
    },
    Buy {
        buyer: Address,
        amount: u64,
        price: u64,
        timestamp: u64,
    },
    Sell {
        seller: Address,
        amount: u64,
        price: u64,
        timestamp: u64,
    },
    Mint {
        amount: u64,
        timestamp: u64,
    },
    Burn {
        amount: u64,
        timestamp: u64,
    },
    Withdraw {
        to: Address,
        amount: u64,
        timestamp: u64,
    },
    Transfer {
        from: Address,
        to: Address,
        amount: u64,
        timestamp: u64,
    },
}

impl ShopEvent {
    /// Short event name, used for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ShopEvent::Deployed { .. } => "deployed",
            ShopEvent::SellPriceChange { .. } => "sell_price_change",
            ShopEvent::BuyPriceChange { .. } => "buy_price_change",
            ShopEvent::Buy { .. } => "buy",
            ShopEvent::Sell { .. } => "sell",
            ShopEvent::Mint { .. } => "mint",
            ShopEvent::Burn { .. } => "burn",
            ShopEvent::Withdraw { .. } => "withdraw",
            ShopEvent::Transfer { .. } => "transfer",
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            ShopEvent::Deployed { timestamp, .. }
            | ShopEvent::SellPriceChange { timestamp, .. }
            | ShopEvent::BuyPriceChange { timestamp, .. }
            | ShopEvent::Buy { timestamp, .. }
            | ShopEvent::Sell { timestamp, .. }
            | ShopEvent::Mint { timestamp, .. }
            | ShopEvent::Burn { timestamp, .. }
            | ShopEvent::Withdraw { timestamp, .. }
            | ShopEvent::Transfer { timestamp, .. } => *timestamp,
        }
    }
}

/// The result of a shop operation and the events it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome<T> {
    pub value: T,
    pub events: Vec<ShopEvent>,
}

impl<T> Outcome<T> {
    fn new(value: T, event: ShopEvent) -> Self {
        Self {
            value,
            events: vec![event],
        }
    }
}

/// What a purchase settled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyReceipt {
    /// Tokens delivered to the buyer.
    pub amount: u64,
    /// Currency retained by the shop.
    pub charge: u64,
    /// Part of the attached value returned to the buyer.
    pub refund: u64,
}

/// What a sale settled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellReceipt {
    /// Tokens taken from the seller.
    pub amount: u64,
    /// Currency paid to the seller.
    pub payout: u64,
}

// ---------------------------------------------------------------------------
// Shop
// ---------------------------------------------------------------------------

/// The exchange contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop<L: TokenLedger = LuckyToken> {
    address: Address,
    administrator: Address,
    price_for_sell: u64,
    price_for_buy: u64,
    token: L,
    grant: OperatorGrant,
}

impl Shop<LuckyToken> {
    /// Deploys a shop for `ctx.caller`, who becomes its administrator.
    ///
    /// The shop's address is derived from the deployer and their deployment
    /// nonce; the token is deployed by the shop with `initial_supply`
    /// credited to the shop and the shop as its default operator.
    pub fn deploy(ctx: &CallContext, deploy_nonce: u64, initial_supply: u64) -> Outcome<Self> {
        let address = Address::contract(&ctx.caller, deploy_nonce);
        let (token, grant) = LuckyToken::deploy(Address::contract(&address, 0), address, initial_supply);
        let event = ShopEvent::Deployed {
            shop: address,
            token: token.address(),
            administrator: ctx.caller,
            initial_supply,
            timestamp: ctx.timestamp,
        };
        tracing::info!(shop = %address, token = %token.address(), administrator = %ctx.caller, initial_supply, "shop deployed");
        Outcome::new(
            Self {
                address,
                administrator: ctx.caller,
                price_for_sell: DEFAULT_PRICE_FOR_SELL,
                price_for_buy: DEFAULT_PRICE_FOR_BUY,
                token,
                grant,
            },
            event,
        )
    }
}

impl<L: TokenLedger> Shop<L> {
    /// Assembles a freshly deployed shop around an already deployed ledger,
    /// for hosting the shop on a [`TokenLedger`] other than [`LuckyToken`].
    ///
    /// Prices start at the defaults (90 sell, 100 buy); nothing is carried
    /// over from any earlier shop. `grant` must have been issued by `token`
    /// to `address`.
    pub fn from_parts(
        address: Address,
        administrator: Address,
        token: L,
        grant: OperatorGrant,
    ) -> ShopResult<Self> {
        if grant.token() != token.address() {
            return Err(TokenError::ForeignGrant {
                token: token.address(),
                grant_token: grant.token(),
            }
            .into());
        }
        if grant.operator() != address {
            return Err(ShopError::Unauthorized {
                caller: grant.operator(),
            });
        }
        Ok(Self {
            address,
            administrator,
            price_for_sell: DEFAULT_PRICE_FOR_SELL,
            price_for_buy: DEFAULT_PRICE_FOR_BUY,
            token,
            grant,
        })
    }

    // -- Reads ---------------------------------------------------------------

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn administrator(&self) -> Address {
        self.administrator
    }

    /// Currency the shop pays per token when buying back.
    pub fn price_for_sell(&self) -> u64 {
        self.price_for_sell
    }

    /// Currency a buyer pays per token.
    pub fn price_for_buy(&self) -> u64 {
        self.price_for_buy
    }

    /// The shop's native currency balance.
    pub fn shop_balance(&self, bank: &Bank) -> u64 {
        bank.balance_of(&self.address)
    }

    /// Tokens the shop currently holds for sale.
    pub fn inventory(&self) -> u64 {
        self.token.balance_of(&self.address)
    }

    pub fn token(&self) -> &L {
        &self.token
    }

    // -- Pricing -------------------------------------------------------------

    pub fn set_price_for_sell(&mut self, ctx: &CallContext, new_price: u64) -> ShopResult<Outcome<()>> {
        self.ensure_administrator(ctx)?;
        if new_price == 0 {
            return Err(ShopError::InvalidPrice);
        }
        let old_price = std::mem::replace(&mut self.price_for_sell, new_price);
        tracing::debug!(old_price, new_price, "sell price changed");
        Ok(Outcome::new(
            (),
            ShopEvent::SellPriceChange {
                old_price,
                new_price,
                timestamp: ctx.timestamp,
            },
        ))
    }

    pub fn set_price_for_buy(&mut self, ctx: &CallContext, new_price: u64) -> ShopResult<Outcome<()>> {
        self.ensure_administrator(ctx)?;
        if new_price == 0 {
            return Err(ShopError::InvalidPrice);
        }
        let old_price = std::mem::replace(&mut self.price_for_buy, new_price);
        tracing::debug!(old_price, new_price, "buy price changed");
        Ok(Outcome::new(
            (),
            ShopEvent::BuyPriceChange {
                old_price,
                new_price,
                timestamp: ctx.timestamp,
            },
        ))
    }

    // -- Trading -------------------------------------------------------------

    /// Buys as many whole tokens as `value` covers at the current buy price.
    ///
    /// The caller must hold `value`. Only the charge moves to the shop; the
    /// remainder is reported as refunded.
    pub fn buy(&mut self, ctx: &CallContext, bank: &mut Bank, value: u64) -> ShopResult<Outcome<BuyReceipt>> {
        bank.ensure_funds(&ctx.caller, value)?;

        let price = self.price_for_buy;
        if value < price {
            return Err(ShopError::InsufficientPayment { value, price });
        }
        let amount = value / price;
        // amount * price <= value, so this cannot overflow.
        let charge = amount * price;
        let refund = value - charge;

        let available = self.inventory();
        if available < amount {
            return Err(ShopError::InsufficientInventory {
                requested: amount,
                available,
            });
        }

        bank.check_transfer(&ctx.caller, &self.address, charge)?;
        self.token.check_transfer(&self.address, &ctx.caller, amount)?;

        bank.transfer(ctx.caller, self.address, charge)?;
        self.token
            .operator_transfer(&self.grant, self.address, ctx.caller, amount)?;

        tracing::debug!(buyer = %ctx.caller, amount, charge, refund, "tokens bought");
        Ok(Outcome::new(
            BuyReceipt {
                amount,
                charge,
                refund,
            },
            ShopEvent::Buy {
                buyer: ctx.caller,
                amount,
                price,
                timestamp: ctx.timestamp,
            },
        ))
    }

    /// Sells `amount` of the caller's tokens back to the shop at the current
    /// sell price.
    pub fn sell(&mut self, ctx: &CallContext, bank: &mut Bank, amount: u64) -> ShopResult<Outcome<SellReceipt>> {
        if amount == 0 {
            return Err(ShopError::InvalidAmount);
        }
        let held = self.token.balance_of(&ctx.caller);
        if held < amount {
            return Err(ShopError::InsufficientTokenBalance {
                requested: amount,
                available: held,
            });
        }

        let price = self.price_for_sell;
        let payout = amount
            .checked_mul(price)
            .ok_or(ShopError::ArithmeticOverflow)?;
        let funds = self.shop_balance(bank);
        if funds < payout {
            return Err(ShopError::InsufficientShopFunds {
                required: payout,
                available: funds,
            });
        }

        self.token.check_transfer(&ctx.caller, &self.address, amount)?;
        bank.check_transfer(&self.address, &ctx.caller, payout)?;

        self.token
            .operator_transfer(&self.grant, ctx.caller, self.address, amount)?;
        bank.transfer(self.address, ctx.caller, payout)?;

        tracing::debug!(seller = %ctx.caller, amount, payout, "tokens sold");
        Ok(Outcome::new(
            SellReceipt { amount, payout },
            ShopEvent::Sell {
                seller: ctx.caller,
                amount,
                price,
                timestamp: ctx.timestamp,
            },
        ))
    }

    /// Holder-initiated token transfer from the caller to `to`.
    pub fn transfer_tokens(&mut self, ctx: &CallContext, to: Address, amount: u64) -> ShopResult<Outcome<()>> {
        if amount == 0 {
            return Err(ShopError::InvalidAmount);
        }
        let held = self.token.balance_of(&ctx.caller);
        if held < amount {
            return Err(ShopError::InsufficientTokenBalance {
                requested: amount,
                available: held,
            });
        }
        self.token.transfer(ctx.caller, to, amount)?;
        Ok(Outcome::new(
            (),
            ShopEvent::Transfer {
                from: ctx.caller,
                to,
                amount,
                timestamp: ctx.timestamp,
            },
        ))
    }

    // -- Inventory -----------------------------------------------------------

    pub fn mint_to_shop(&mut self, ctx: &CallContext, amount: u64) -> ShopResult<Outcome<()>> {
        self.ensure_administrator(ctx)?;
        if amount == 0 {
            return Err(ShopError::InvalidAmount);
        }
        self.token.mint(&self.grant, self.address, amount)?;
        tracing::debug!(amount, supply = self.token.total_supply(), "inventory minted");
        Ok(Outcome::new(
            (),
            ShopEvent::Mint {
                amount,
                timestamp: ctx.timestamp,
            },
        ))
    }

    pub fn burn_from_shop(&mut self, ctx: &CallContext, amount: u64) -> ShopResult<Outcome<()>> {
        self.ensure_administrator(ctx)?;
        if amount == 0 {
            return Err(ShopError::InvalidAmount);
        }
        let available = self.inventory();
        if available < amount {
            return Err(ShopError::InsufficientInventory {
                requested: amount,
                available,
            });
        }
        self.token.burn(&self.grant, self.address, amount)?;
        tracing::debug!(amount, supply = self.token.total_supply(), "inventory burned");
        Ok(Outcome::new(
            (),
            ShopEvent::Burn {
                amount,
                timestamp: ctx.timestamp,
            },
        ))
    }

    // -- Treasury ------------------------------------------------------------

    /// Sweeps the shop's whole currency balance to the administrator and
    /// returns the amount moved. An empty treasury moves zero.
    pub fn withdraw_all(&mut self, ctx: &CallContext, bank: &mut Bank) -> ShopResult<Outcome<u64>> {
        self.ensure_administrator(ctx)?;
        let amount = self.shop_balance(bank);
        bank.transfer(self.address, self.administrator, amount)?;
        tracing::debug!(to = %self.administrator, amount, "treasury withdrawn");
        Ok(Outcome::new(
            amount,
            ShopEvent::Withdraw {
                to: self.administrator,
                amount,
                timestamp: ctx.timestamp,
            },
        ))
    }

    fn ensure_administrator(&self, ctx: &CallContext) -> ShopResult<()> {
        if ctx.caller != self.administrator {
            return Err(ShopError::Unauthorized { caller: ctx.caller });
        }
        Ok(())
    }
}
