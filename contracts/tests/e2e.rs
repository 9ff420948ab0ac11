//! End-to-end tests for the shop runtime.
//!
//! These drive the full lifecycle: keypairs, signed transactions, block
//! execution, receipts and persistence of blocks, events and snapshots in
//! the chain store. Each test owns a temporary store.

use lucky_contracts::runtime::{Block, CallOutput, ShopCall, SignedTransaction, Transaction, TxStatus};
use lucky_contracts::shop::{BuyReceipt, SellReceipt};
use lucky_contracts::{Chain, ChainError, ShopEvent, TokenLedger};
use lucky_protocol::crypto::ShopKeypair;
use lucky_protocol::storage::ChainStore;
use lucky_protocol::Address;

const T0: u64 = 10_000_000_000;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Actors {
    admin: ShopKeypair,
    buyer: ShopKeypair,
    seller: ShopKeypair,
}

fn actors() -> Actors {
    Actors {
        admin: ShopKeypair::from_seed(&[1u8; 32]),
        buyer: ShopKeypair::from_seed(&[2u8; 32]),
        seller: ShopKeypair::from_seed(&[3u8; 32]),
    }
}

fn addr(kp: &ShopKeypair) -> Address {
    Address::from_public_key(&kp.public_key())
}

fn tx(kp: &ShopKeypair, nonce: u64, call: ShopCall) -> SignedTransaction {
    Transaction::new(addr(kp), nonce, call).sign(kp)
}

/// Persists `block` and the resulting state the way the node does.
fn persist(store: &ChainStore, chain: &Chain, block: &Block) {
    store
        .put_block(block.height, block, &block.events(), chain)
        .expect("persist block");
}

fn failure_code(block: &Block, index: usize) -> &str {
    match &block.receipts[index].status {
        TxStatus::Failed { code, .. } => code,
        TxStatus::Success { .. } => panic!("receipt {} succeeded", index),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn full_trade_lifecycle() {
    let a = actors();
    let store = ChainStore::open_temporary().expect("temp store");

    let (mut chain, genesis) = Chain::genesis(addr(&a.admin), 100, T0);
    persist(&store, &chain, &genesis);

    for who in [&a.buyer, &a.seller] {
        let block = chain.fund(T0, addr(who), 1_000).unwrap();
        persist(&store, &chain, &block);
    }

    // Buyer pays 250 at price 100: two tokens, 50 back.
    let block = chain
        .execute_block(T0 + 10, vec![tx(&a.buyer, 0, ShopCall::Buy { value: 250 })])
        .unwrap();
    persist(&store, &chain, &block);
    match &block.receipts[0].status {
        TxStatus::Success { output, events } => {
            assert_eq!(
                output,
                &CallOutput::Bought(BuyReceipt {
                    amount: 2,
                    charge: 200,
                    refund: 50
                })
            );
            assert!(matches!(
                events[0],
                ShopEvent::Buy {
                    amount: 2,
                    timestamp,
                    ..
                } if timestamp == T0 + 10
            ));
        }
        other => panic!("buy failed: {:?}", other),
    }

    // Buyer hands one token to the seller, who sells it back at 90.
    let block = chain
        .execute_block(
            T0 + 20,
            vec![
                tx(&a.buyer, 1, ShopCall::TransferTokens { to: addr(&a.seller), amount: 1 }),
                tx(&a.seller, 0, ShopCall::Sell { amount: 1 }),
            ],
        )
        .unwrap();
    persist(&store, &chain, &block);
    assert!(block.receipts.iter().all(|r| r.is_success()));
    assert_eq!(
        block.receipts[1].status,
        TxStatus::Success {
            output: CallOutput::Sold(SellReceipt { amount: 1, payout: 90 }),
            events: block.receipts[1].events().to_vec(),
        }
    );

    let block = chain
        .execute_block(T0 + 30, vec![tx(&a.admin, 1, ShopCall::WithdrawAll)])
        .unwrap();
    persist(&store, &chain, &block);
    assert!(matches!(
        block.receipts[0].status,
        TxStatus::Success {
            output: CallOutput::Withdrawn { amount: 110 },
            ..
        }
    ));

    assert_eq!(chain.bank().balance_of(&addr(&a.admin)), 110);
    assert_eq!(chain.bank().balance_of(&addr(&a.buyer)), 800);
    assert_eq!(chain.bank().balance_of(&addr(&a.seller)), 1_090);
    assert_eq!(chain.shop().inventory(), 99);
    assert_eq!(chain.shop().shop_balance(chain.bank()), 0);

    // The store holds every block, every event and the latest state.
    assert_eq!(store.latest_height().unwrap(), Some(chain.height()));
    let restored: Chain = store.load_snapshot().unwrap().expect("snapshot");
    assert_eq!(restored, chain);
    let events: Vec<(u64, ShopEvent)> = store.events(0, 100).unwrap();
    let kinds: Vec<&str> = events.iter().map(|(_, e)| e.kind()).collect();
    assert_eq!(kinds, ["deployed", "buy", "transfer", "sell", "withdraw"]);
}

#[test]
fn failed_call_consumes_nonce_and_rolls_back() {
    let a = actors();
    let (mut chain, _) = Chain::genesis(addr(&a.admin), 100, T0);
    chain.fund(T0, addr(&a.buyer), 150).unwrap();

    let block = chain
        .execute_block(
            T0,
            vec![
                tx(&a.buyer, 0, ShopCall::Buy { value: 99 }),
                tx(&a.buyer, 1, ShopCall::Buy { value: 150 }),
            ],
        )
        .unwrap();

    assert_eq!(failure_code(&block, 0), "INSUFFICIENT_PAYMENT");
    assert!(block.receipts[1].is_success());
    assert_eq!(chain.next_nonce(&addr(&a.buyer)), 2);
    assert_eq!(chain.bank().balance_of(&addr(&a.buyer)), 50);
    assert_eq!(chain.shop().token().balance_of(&addr(&a.buyer)), 1);
}

#[test]
fn admin_guard_applies_to_every_privileged_call() {
    let a = actors();
    let (mut chain, _) = Chain::genesis(addr(&a.admin), 100, T0);
    let calls = [
        ShopCall::SetPriceForSell { price: 1 },
        ShopCall::SetPriceForBuy { price: 1 },
        ShopCall::MintToShop { amount: 1 },
        ShopCall::BurnFromShop { amount: 1 },
        ShopCall::WithdrawAll,
    ];
    let txs = calls
        .iter()
        .enumerate()
        .map(|(i, call)| tx(&a.buyer, i as u64, *call))
        .collect();
    let block = chain.execute_block(T0, txs).unwrap();
    for i in 0..calls.len() {
        assert_eq!(failure_code(&block, i), "UNAUTHORIZED");
    }
    assert_eq!(chain.shop().price_for_sell(), 90);
    assert_eq!(chain.shop().price_for_buy(), 100);
    assert_eq!(chain.shop().inventory(), 100);
}

#[test]
fn replay_and_forgery_reject_the_whole_block() {
    let a = actors();
    let (mut chain, _) = Chain::genesis(addr(&a.admin), 100, T0);
    let mint = tx(&a.admin, 1, ShopCall::MintToShop { amount: 5 });
    chain.execute_block(T0, vec![mint.clone()]).unwrap();

    let before = chain.clone();
    let fresh = tx(&a.admin, 2, ShopCall::MintToShop { amount: 5 });
    assert!(matches!(
        chain.execute_block(T0, vec![fresh.clone(), mint]),
        Err(ChainError::BadNonce { expected: 3, got: 1, .. })
    ));

    let mut forged = fresh;
    forged.transaction.call = ShopCall::MintToShop { amount: 5_000 };
    assert!(matches!(
        chain.execute_block(T0, vec![forged]),
        Err(ChainError::InvalidSignature { .. })
    ));
    assert_eq!(chain, before);
}

#[test]
fn commit_time_never_goes_backwards() {
    let a = actors();
    let (mut chain, _) = Chain::genesis(addr(&a.admin), 100, T0);
    let block = chain
        .execute_block(T0 - 500, vec![tx(&a.admin, 1, ShopCall::SetPriceForBuy { price: 120 })])
        .unwrap();
    assert_eq!(block.timestamp, T0);
    assert!(matches!(
        block.receipts[0].events()[0],
        ShopEvent::BuyPriceChange {
            new_price: 120,
            timestamp: T0,
            ..
        }
    ));
}
