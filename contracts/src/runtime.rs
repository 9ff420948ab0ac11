//! # Execution Runtime
//!
//! Hosts a single [`Shop`] on a minimal account-based chain. The [`Chain`]
//! owns the native currency [`Bank`], the shop (and through it the token
//! ledger), per-account nonces, the block height and the last commit
//! timestamp.
//!
//! ## Blocks
//!
//! Work is committed in blocks. Every transaction in a block sees the same
//! commit timestamp, which never moves backwards. A block is either
//! rejected as a whole (bad signature, bad nonce, empty, oversized) with no
//! effect at all, or included. Inside an included block each transaction is
//! atomic on its own: a failing shop call is rolled back, recorded in its
//! receipt and still consumes its nonce.
//!
//! ## Signing
//!
//! A transaction is signed over [`Transaction::signable_bytes`]: the
//! protocol's domain tag followed by a fixed big-endian encoding of the
//! sender, nonce and call. The sender address must be the one derived from
//! the signing key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use lucky_protocol::config::{MAX_BATCH_SIZE, TX_SIGNING_DOMAIN};
use lucky_protocol::crypto::{blake3_hex, ShopKeypair, ShopPublicKey, ShopSignature};
use lucky_protocol::{Address, Bank, BankError};

use crate::shop::{BuyReceipt, CallContext, Outcome, SellReceipt, Shop, ShopEvent, ShopResult};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a block is refused before anything executes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    /// The signature does not verify over the transaction.
    #[error("invalid signature on transaction from {sender}")]
    InvalidSignature { sender: Address },

    /// The signing key does not belong to the declared sender.
    #[error("public key does not match sender {sender}")]
    SenderMismatch { sender: Address },

    /// The nonce is not the sender's next one.
    #[error("bad nonce for {sender}: expected {expected}, got {got}")]
    BadNonce {
        sender: Address,
        expected: u64,
        got: u64,
    },

    #[error("block contains no transactions")]
    EmptyBlock,

    #[error("block of {size} transactions exceeds the limit of {max}")]
    BlockTooLarge { size: usize, max: usize },

    /// The shop's treasury only moves through trades and withdrawals.
    #[error("cannot fund the shop treasury at {shop}")]
    FundingToShop { shop: Address },

    /// Devnet funding could not be credited.
    #[error("funding failed: {0}")]
    Funding(#[from] BankError),
}

impl ChainError {
    pub fn code(&self) -> &'static str {
        match self {
            ChainError::InvalidSignature { .. } => "INVALID_SIGNATURE",
            ChainError::SenderMismatch { .. } => "SENDER_MISMATCH",
            ChainError::BadNonce { .. } => "BAD_NONCE",
            ChainError::EmptyBlock => "EMPTY_BLOCK",
            ChainError::BlockTooLarge { .. } => "BLOCK_TOO_LARGE",
            ChainError::FundingToShop { .. } => "FUNDING_TO_SHOP",
            ChainError::Funding(_) => "FUNDING_FAILED",
        }
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// A call into the shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShopCall {
    Buy { value: u64 },
    Sell { amount: u64 },
    SetPriceForSell { price: u64 },
    SetPriceForBuy { price: u64 },
    MintToShop { amount: u64 },
    BurnFromShop { amount: u64 },
    WithdrawAll,
    TransferTokens { to: Address, amount: u64 },
}

impl ShopCall {
    pub fn name(&self) -> &'static str {
        match self {
            ShopCall::Buy { .. } => "buy",
            ShopCall::Sell { .. } => "sell",
            ShopCall::SetPriceForSell { .. } => "set_price_for_sell",
            ShopCall::SetPriceForBuy { .. } => "set_price_for_buy",
            ShopCall::MintToShop { .. } => "mint_to_shop",
            ShopCall::BurnFromShop { .. } => "burn_from_shop",
            ShopCall::WithdrawAll => "withdraw_all",
            ShopCall::TransferTokens { .. } => "transfer_tokens",
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            ShopCall::Buy { value } => {
                buf.push(0x01);
                buf.extend_from_slice(&value.to_be_bytes());
            }
            ShopCall::Sell { amount } => {
                buf.push(0x02);
                buf.extend_from_slice(&amount.to_be_bytes());
            }
            ShopCall::SetPriceForSell { price } => {
                buf.push(0x03);
                buf.extend_from_slice(&price.to_be_bytes());
            }
            ShopCall::SetPriceForBuy { price } => {
                buf.push(0x04);
                buf.extend_from_slice(&price.to_be_bytes());
            }
            ShopCall::MintToShop { amount } => {
                buf.push(0x05);
                buf.extend_from_slice(&amount.to_be_bytes());
            }
            ShopCall::BurnFromShop { amount } => {
                buf.push(0x06);
                buf.extend_from_slice(&amount.to_be_bytes());
            }
            ShopCall::WithdrawAll => buf.push(0x07),
            ShopCall::TransferTokens { to, amount } => {
                buf.push(0x08);
                buf.extend_from_slice(to.as_bytes());
                buf.extend_from_slice(&amount.to_be_bytes());
            }
        }
    }
}

/// An unsigned transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub nonce: u64,
    pub call: ShopCall,
}

impl Transaction {
    pub fn new(sender: Address, nonce: u64, call: ShopCall) -> Self {
        Self { sender, nonce, call }
    }

    /// Canonical bytes covered by the signature.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(TX_SIGNING_DOMAIN.len() + 64);
        buf.extend_from_slice(TX_SIGNING_DOMAIN);
        buf.extend_from_slice(self.sender.as_bytes());
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        self.call.encode_into(&mut buf);
        buf
    }

    /// Transaction hash: `hex(blake3(signable_bytes))`.
    pub fn hash(&self) -> String {
        blake3_hex(&self.signable_bytes())
    }

    pub fn sign(self, keypair: &ShopKeypair) -> SignedTransaction {
        let signature = keypair.sign(&self.signable_bytes());
        SignedTransaction {
            transaction: self,
            public_key: keypair.public_key(),
            signature,
        }
    }
}

/// A transaction with the sender's key and signature attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub public_key: ShopPublicKey,
    pub signature: ShopSignature,
}

impl SignedTransaction {
    /// Checks that the key belongs to the sender and the signature covers
    /// the transaction. Does not look at nonces.
    pub fn verify(&self) -> Result<(), ChainError> {
        let sender = self.transaction.sender;
        if Address::from_public_key(&self.public_key) != sender {
            return Err(ChainError::SenderMismatch { sender });
        }
        if !self
            .public_key
            .verify(&self.transaction.signable_bytes(), &self.signature)
        {
            return Err(ChainError::InvalidSignature { sender });
        }
        Ok(())
    }

    pub fn hash(&self) -> String {
        self.transaction.hash()
    }
}

// ---------------------------------------------------------------------------
// Receipts and blocks
// ---------------------------------------------------------------------------

/// The value a successful call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutput {
    Unit,
    Bought(BuyReceipt),
    Sold(SellReceipt),
    Withdrawn { amount: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Success {
        output: CallOutput,
        events: Vec<ShopEvent>,
    },
    Failed {
        code: String,
        reason: String,
    },
}

/// Record of one included transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: String,
    pub sender: Address,
    pub nonce: u64,
    pub call: ShopCall,
    pub status: TxStatus,
    pub height: u64,
    pub timestamp: u64,
}

impl TxReceipt {
    pub fn is_success(&self) -> bool {
        matches!(self.status, TxStatus::Success { .. })
    }

    pub fn events(&self) -> &[ShopEvent] {
        match &self.status {
            TxStatus::Success { events, .. } => events,
            TxStatus::Failed { .. } => &[],
        }
    }
}

/// Native currency credited outside any transaction (devnet faucet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funding {
    pub to: Address,
    pub amount: u64,
}

/// A committed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub timestamp: u64,
    /// Events not tied to a transaction, such as the genesis deployment.
    pub system_events: Vec<ShopEvent>,
    pub funding: Vec<Funding>,
    pub receipts: Vec<TxReceipt>,
}

impl Block {
    /// Every event the block emitted, in commit order.
    pub fn events(&self) -> Vec<ShopEvent> {
        self.system_events
            .iter()
            .chain(self.receipts.iter().flat_map(|r| r.events()))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// The whole replicated state. Serializing a `Chain` yields the snapshot the
/// node persists after every block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    bank: Bank,
    shop: Shop,
    nonces: BTreeMap<Address, u64>,
    height: u64,
    last_timestamp: u64,
}

impl Chain {
    /// Deploys the shop for `administrator` at height 0.
    ///
    /// Deployment consumes the administrator's nonce 0, so their first
    /// transaction carries nonce 1.
    pub fn genesis(administrator: Address, initial_supply: u64, timestamp: u64) -> (Self, Block) {
        let ctx = CallContext::new(administrator, timestamp);
        let deployed = Shop::deploy(&ctx, 0, initial_supply);
        let mut nonces = BTreeMap::new();
        nonces.insert(administrator, 1);
        let chain = Self {
            bank: Bank::new(),
            shop: deployed.value,
            nonces,
            height: 0,
            last_timestamp: timestamp,
        };
        let block = Block {
            height: 0,
            timestamp,
            system_events: deployed.events,
            funding: Vec::new(),
            receipts: Vec::new(),
        };
        (chain, block)
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    pub fn shop(&self) -> &Shop {
        &self.shop
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    /// The nonce the account's next transaction must carry.
    pub fn next_nonce(&self, account: &Address) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }

    /// Credits devnet currency in a block of its own. The shop itself
    /// cannot be funded.
    pub fn fund(&mut self, timestamp: u64, to: Address, amount: u64) -> Result<Block, ChainError> {
        if to == self.shop.address() {
            return Err(ChainError::FundingToShop { shop: to });
        }
        self.bank.credit(to, amount)?;
        let timestamp = self.advance(timestamp);
        tracing::info!(%to, amount, height = self.height, "account funded");
        Ok(Block {
            height: self.height,
            timestamp,
            system_events: Vec::new(),
            funding: vec![Funding { to, amount }],
            receipts: Vec::new(),
        })
    }

    /// Validates and commits a block of signed transactions.
    ///
    /// The block timestamp is `max(timestamp, last commit timestamp)`.
    pub fn execute_block(&mut self, timestamp: u64, txs: Vec<SignedTransaction>) -> Result<Block, ChainError> {
        if txs.is_empty() {
            return Err(ChainError::EmptyBlock);
        }
        if txs.len() > MAX_BATCH_SIZE {
            return Err(ChainError::BlockTooLarge {
                size: txs.len(),
                max: MAX_BATCH_SIZE,
            });
        }

        let mut expected: BTreeMap<Address, u64> = BTreeMap::new();
        for tx in &txs {
            tx.verify()?;
            let sender = tx.transaction.sender;
            let next = expected
                .get(&sender)
                .copied()
                .unwrap_or_else(|| self.next_nonce(&sender));
            let got = tx.transaction.nonce;
            if got != next {
                tracing::debug!(%sender, expected = next, got, "block rejected: bad nonce");
                return Err(ChainError::BadNonce {
                    sender,
                    expected: next,
                    got,
                });
            }
            let following = next.checked_add(1).ok_or(ChainError::BadNonce {
                sender,
                expected: next,
                got,
            })?;
            expected.insert(sender, following);
        }

        let timestamp = self.advance(timestamp);
        let height = self.height;
        let receipts: Vec<TxReceipt> = txs
            .into_iter()
            .map(|tx| self.apply(tx.transaction, height, timestamp))
            .collect();

        tracing::info!(
            height,
            timestamp,
            txs = receipts.len(),
            failed = receipts.iter().filter(|r| !r.is_success()).count(),
            "block committed"
        );
        Ok(Block {
            height,
            timestamp,
            system_events: Vec::new(),
            funding: Vec::new(),
            receipts,
        })
    }

    fn advance(&mut self, timestamp: u64) -> u64 {
        self.height += 1;
        self.last_timestamp = self.last_timestamp.max(timestamp);
        self.last_timestamp
    }

    fn apply(&mut self, tx: Transaction, height: u64, timestamp: u64) -> TxReceipt {
        let ctx = CallContext::new(tx.sender, timestamp);
        *self.nonces.entry(tx.sender).or_insert(0) += 1;

        let checkpoint = (self.bank.clone(), self.shop.clone());
        let status = match self.dispatch(&ctx, tx.call) {
            Ok((output, events)) => TxStatus::Success { output, events },
            Err(err) => {
                (self.bank, self.shop) = checkpoint;
                tracing::warn!(
                    sender = %tx.sender,
                    call = tx.call.name(),
                    code = err.code(),
                    error = %err,
                    "transaction failed"
                );
                TxStatus::Failed {
                    code: err.code().to_string(),
                    reason: err.to_string(),
                }
            }
        };

        TxReceipt {
            hash: tx.hash(),
            sender: tx.sender,
            nonce: tx.nonce,
            call: tx.call,
            status,
            height,
            timestamp,
        }
    }

    fn dispatch(&mut self, ctx: &CallContext, call: ShopCall) -> ShopResult<(CallOutput, Vec<ShopEvent>)> {
        let bank = &mut self.bank;
        let shop = &mut self.shop;
        let unit = |outcome: Outcome<()>| (CallOutput::Unit, outcome.events);
        Ok(match call {
            ShopCall::Buy { value } => {
                let o = shop.buy(ctx, bank, value)?;
                (CallOutput::Bought(o.value), o.events)
            }
            ShopCall::Sell { amount } => {
                let o = shop.sell(ctx, bank, amount)?;
                (CallOutput::Sold(o.value), o.events)
            }
            ShopCall::SetPriceForSell { price } => unit(shop.set_price_for_sell(ctx, price)?),
            ShopCall::SetPriceForBuy { price } => unit(shop.set_price_for_buy(ctx, price)?),
            ShopCall::MintToShop { amount } => unit(shop.mint_to_shop(ctx, amount)?),
            ShopCall::BurnFromShop { amount } => unit(shop.burn_from_shop(ctx, amount)?),
            ShopCall::WithdrawAll => {
                let o = shop.withdraw_all(ctx, bank)?;
                (CallOutput::Withdrawn { amount: o.value }, o.events)
            }
            ShopCall::TransferTokens { to, amount } => unit(shop.transfer_tokens(ctx, to, amount)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenLedger;

    const T0: u64 = 10_000_000_000;

    fn setup() -> (Chain, ShopKeypair, ShopKeypair) {
        let admin = ShopKeypair::from_seed(&[1u8; 32]);
        let user = ShopKeypair::from_seed(&[2u8; 32]);
        let (chain, _) = Chain::genesis(Address::from_public_key(&admin.public_key()), 1_000, T0);
        (chain, admin, user)
    }

    fn addr(kp: &ShopKeypair) -> Address {
        Address::from_public_key(&kp.public_key())
    }

    fn signed(kp: &ShopKeypair, nonce: u64, call: ShopCall) -> SignedTransaction {
        Transaction::new(addr(kp), nonce, call).sign(kp)
    }

    #[test]
    fn genesis_consumes_admin_nonce_zero() {
        let (chain, admin, user) = setup();
        assert_eq!(chain.height(), 0);
        assert_eq!(chain.next_nonce(&addr(&admin)), 1);
        assert_eq!(chain.next_nonce(&addr(&user)), 0);
        assert_eq!(chain.shop().administrator(), addr(&admin));
    }

    #[test]
    fn signature_roundtrip_verifies() {
        let (_, _, user) = setup();
        let tx = signed(&user, 0, ShopCall::Buy { value: 100 });
        assert!(tx.verify().is_ok());
    }

    #[test]
    fn tampered_call_fails_verification() {
        let (_, _, user) = setup();
        let mut tx = signed(&user, 0, ShopCall::Buy { value: 100 });
        tx.transaction.call = ShopCall::Buy { value: 1_000 };
        assert_eq!(
            tx.verify().unwrap_err(),
            ChainError::InvalidSignature { sender: addr(&user) }
        );
    }

    #[test]
    fn foreign_key_is_sender_mismatch() {
        let (_, admin, user) = setup();
        let tx = Transaction::new(addr(&admin), 1, ShopCall::WithdrawAll).sign(&user);
        assert!(matches!(tx.verify(), Err(ChainError::SenderMismatch { .. })));
    }

    #[test]
    fn hash_covers_nonce() {
        let a = Transaction::new(Address::ZERO, 0, ShopCall::WithdrawAll);
        let b = Transaction::new(Address::ZERO, 1, ShopCall::WithdrawAll);
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn bad_nonce_rejects_whole_block() {
        let (mut chain, _, user) = setup();
        chain.fund(T0, addr(&user), 1_000).unwrap();
        let before = chain.clone();
        let txs = vec![
            signed(&user, 0, ShopCall::Buy { value: 100 }),
            signed(&user, 2, ShopCall::Buy { value: 100 }),
        ];
        assert_eq!(
            chain.execute_block(T0, txs).unwrap_err(),
            ChainError::BadNonce {
                sender: addr(&user),
                expected: 1,
                got: 2
            }
        );
        assert_eq!(chain, before);
    }

    #[test]
    fn empty_block_rejected() {
        let (mut chain, _, _) = setup();
        assert_eq!(chain.execute_block(T0, vec![]).unwrap_err(), ChainError::EmptyBlock);
    }

    #[test]
    fn failed_call_rolls_back_and_consumes_nonce() {
        let (mut chain, _, user) = setup();
        chain.fund(T0, addr(&user), 50).unwrap();
        let block = chain
            .execute_block(T0 + 1, vec![signed(&user, 0, ShopCall::Buy { value: 50 })])
            .unwrap();
        let receipt = &block.receipts[0];
        assert!(matches!(
            &receipt.status,
            TxStatus::Failed { code, .. } if code == "INSUFFICIENT_PAYMENT"
        ));
        assert_eq!(chain.next_nonce(&addr(&user)), 1);
        assert_eq!(chain.bank().balance_of(&addr(&user)), 50);
        assert!(block.events().is_empty());
    }

    #[test]
    fn block_shares_timestamp_and_never_goes_back() {
        let (mut chain, admin, _) = setup();
        let block = chain
            .execute_block(
                T0 - 5,
                vec![
                    signed(&admin, 1, ShopCall::SetPriceForSell { price: 80 }),
                    signed(&admin, 2, ShopCall::SetPriceForBuy { price: 120 }),
                ],
            )
            .unwrap();
        assert_eq!(block.timestamp, T0);
        let stamps: Vec<u64> = block.events().iter().map(ShopEvent::timestamp).collect();
        assert_eq!(stamps, vec![T0, T0]);
        assert_eq!(chain.shop().price_for_sell(), 80);
        assert_eq!(chain.shop().price_for_buy(), 120);
    }

    #[test]
    fn buy_then_sell_through_blocks() {
        let (mut chain, _, user) = setup();
        chain.fund(T0, addr(&user), 220).unwrap();
        let block = chain
            .execute_block(T0 + 10, vec![signed(&user, 0, ShopCall::Buy { value: 220 })])
            .unwrap();
        assert!(matches!(
            block.receipts[0].status,
            TxStatus::Success {
                output: CallOutput::Bought(BuyReceipt {
                    amount: 2,
                    charge: 200,
                    refund: 20
                }),
                ..
            }
        ));
        chain
            .execute_block(T0 + 20, vec![signed(&user, 1, ShopCall::Sell { amount: 2 })])
            .unwrap();
        assert_eq!(chain.bank().balance_of(&addr(&user)), 20 + 180);
        assert_eq!(chain.shop().shop_balance(chain.bank()), 20);
        assert_eq!(chain.shop().token().balance_of(&addr(&user)), 0);
        assert_eq!(chain.height(), 3);
    }

    #[test]
    fn snapshot_roundtrips_through_bincode() {
        let (mut chain, _, user) = setup();
        chain.fund(T0, addr(&user), 300).unwrap();
        chain
            .execute_block(T0, vec![signed(&user, 0, ShopCall::Buy { value: 300 })])
            .unwrap();
        let bytes = bincode::serialize(&chain).unwrap();
        let restored: Chain = bincode::deserialize(&bytes).unwrap();
        assert_eq!(restored, chain);
    }

    #[test]
    fn shop_treasury_cannot_be_funded() {
        let (mut chain, _, _) = setup();
        let shop = chain.shop().address();
        let before = chain.clone();
        assert_eq!(
            chain.fund(T0, shop, 1_000).unwrap_err(),
            ChainError::FundingToShop { shop }
        );
        assert_eq!(chain, before);
        assert_eq!(chain.shop().shop_balance(chain.bank()), 0);
    }
}
