//! # Protocol Configuration & Constants
//!
//! Every magic number in the shop lives here. If you're hardcoding a price
//! or a port somewhere else, move it here first.
//!
//! The price defaults and the token metadata are part of the deployed
//! contract's observable behavior. Clients and tests key off them, so treat
//! a change here as a breaking change.

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Domain separation tag prepended to every signed transaction payload.
/// A signature produced for some other protocol can never be replayed here
/// because the signed bytes would not start with this tag.
pub const TX_SIGNING_DOMAIN: &[u8] = b"LUCKY-SHOP/tx/v1";

// ---------------------------------------------------------------------------
// Shop Defaults
// ---------------------------------------------------------------------------

/// Currency units the shop pays per token when a user sells tokens back.
pub const DEFAULT_PRICE_FOR_SELL: u64 = 90;

/// Currency units a user pays per token when buying from the shop.
pub const DEFAULT_PRICE_FOR_BUY: u64 = 100;

/// Initial token supply minted to the shop by the production deployment.
pub const DEFAULT_INITIAL_SUPPLY: u64 = 1_000_000;

// ---------------------------------------------------------------------------
// Token Metadata
// ---------------------------------------------------------------------------

/// Human-readable token name.
pub const TOKEN_NAME: &str = "Lucky Number Token";

/// Ticker symbol.
pub const TOKEN_SYMBOL: &str = "LNT";

/// Operator-style fungible tokens always report 18 decimals.
pub const TOKEN_DECIMALS: u8 = 18;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Account addresses are the first 20 bytes of a BLAKE3 digest.
pub const ADDRESS_LENGTH: usize = 20;

/// Ed25519 public key length in bytes.
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Ed25519 signature length. Always 64 bytes.
pub const SIGNATURE_LENGTH: usize = 64;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

/// Upper bound on a single devnet faucet request. Keeps a misbehaving
/// script from minting absurd amounts of native currency.
pub const DEFAULT_FAUCET_LIMIT: u64 = 1_000_000;

/// Maximum number of transactions accepted in one submitted batch.
pub const MAX_BATCH_SIZE: usize = 256;

/// Default page size for event log queries.
pub const DEFAULT_EVENT_PAGE_SIZE: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prices_are_positive() {
        assert!(DEFAULT_PRICE_FOR_SELL > 0);
        assert!(DEFAULT_PRICE_FOR_BUY > 0);
    }

    #[test]
    fn test_shop_buys_back_cheaper_than_it_sells() {
        // Otherwise a user could cycle buy/sell and drain the treasury.
        assert!(DEFAULT_PRICE_FOR_SELL < DEFAULT_PRICE_FOR_BUY);
    }

    #[test]
    fn test_token_metadata() {
        assert_eq!(TOKEN_NAME, "Lucky Number Token");
        assert_eq!(TOKEN_SYMBOL, "LNT");
        assert_eq!(TOKEN_DECIMALS, 18);
    }

    #[test]
    fn test_ports_are_distinct() {
        assert_ne!(DEFAULT_RPC_PORT, DEFAULT_METRICS_PORT);
    }

    #[test]
    fn test_signing_domain_is_ascii() {
        assert!(TX_SIGNING_DOMAIN.iter().all(|b| b.is_ascii_graphic()));
    }
}
