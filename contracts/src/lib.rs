//! # Lucky Shop Contracts
//!
//! Contract logic for the Lucky Shop exchange:
//!
//! - **Token**: The Lucky Number Token ledger and the narrow
//!   [`TokenLedger`](token::TokenLedger) interface the shop consumes,
//!   including the operator capability that gates mint, burn and
//!   operator transfers.
//! - **Shop**: The custodial exchange: buys and sells tokens against the
//!   native currency, with administrator-only repricing, inventory control
//!   and treasury withdrawal.
//! - **Runtime**: Signed transactions, nonces and blocks. Hosts the shop
//!   and guarantees that each transaction is atomic and that every event in
//!   a block carries the block's commit timestamp.
//!
//! ## Design Principles
//!
//! 1. All monetary operations use checked arithmetic.
//! 2. Validate everything, then write. A failed call changes nothing.
//! 3. Every operation returns the events it emitted; persisting and
//!    forwarding them is the host's job.
//! 4. Every public record type is serializable (serde) for the wire and
//!    for storage.

pub mod runtime;
pub mod shop;
pub mod token;

pub use runtime::{Block, Chain, ChainError, ShopCall, SignedTransaction, Transaction, TxReceipt, TxStatus};
pub use shop::{CallContext, Outcome, Shop, ShopError, ShopEvent};
pub use token::{LuckyToken, OperatorGrant, TokenError, TokenLedger};
