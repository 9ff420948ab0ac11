//! # REST + WebSocket API
//!
//! Builds the axum router that exposes the shop over HTTP. All endpoints
//! share application state through axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                  | Description                                  |
//! |--------|-----------------------|----------------------------------------------|
//! | GET    | `/health`             | Liveness probe                               |
//! | GET    | `/status`             | Node status summary                          |
//! | GET    | `/shop`               | Prices, treasury, inventory, token metadata  |
//! | GET    | `/accounts/:address`  | Currency, token balance and next nonce       |
//! | POST   | `/transactions`       | Submit one signed transaction as a block     |
//! | POST   | `/transactions/batch` | Submit several signed transactions as a block|
//! | GET    | `/blocks/:height`     | Committed block with receipts                |
//! | GET    | `/events`             | Audit log page (`?from=&limit=`)             |
//! | POST   | `/faucet`             | Devnet currency funding                      |
//! | GET    | `/ws`                 | WebSocket for live block and shop events     |
//!
//! ## Errors
//!
//! Failures return `{ "code": ..., "error": ... }`. A shop call that fails
//! inside a single-transaction block answers `422` with the shop's error
//! code; the transaction is still included and consumes its nonce.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use lucky_contracts::runtime::{Block, ChainError, SignedTransaction, TxReceipt, TxStatus};
use lucky_contracts::{ShopEvent, TokenLedger};
use lucky_protocol::config::{DEFAULT_EVENT_PAGE_SIZE, MAX_BATCH_SIZE};
use lucky_protocol::Address;

use crate::service::{ServiceError, ShopService};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state available to all request handlers.
///
/// Cheap to clone; everything behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The node's reported version string.
    pub version: String,
    /// Network identifier (e.g., "devnet", "testnet", "mainnet").
    pub network: String,
    pub service: Arc<ShopService>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/shop", get(shop_handler))
        .route("/accounts/:address", get(account_handler))
        .route("/transactions", post(submit_handler))
        .route("/transactions/batch", post(submit_batch_handler))
        .route("/blocks/:height", get(block_by_height_handler))
        .route("/events", get(events_handler))
        .route("/faucet", post(faucet_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub block_height: u64,
    /// Commit timestamp of the latest block (Unix seconds).
    pub last_block_timestamp: u64,
    pub shop: Address,
    pub administrator: Address,
    pub faucet_enabled: bool,
    /// ISO-8601 timestamp of the response.
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: u64,
    pub default_operators: Vec<Address>,
}

/// Response payload for `GET /shop`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ShopResponse {
    pub address: Address,
    pub administrator: Address,
    pub price_for_sell: u64,
    pub price_for_buy: u64,
    /// Native currency held by the shop.
    pub balance: u64,
    /// Tokens held by the shop.
    pub inventory: u64,
    pub token: TokenInfo,
}

/// Response payload for `GET /accounts/:address`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub address: Address,
    pub balance: u64,
    pub token_balance: u64,
    pub next_nonce: u64,
}

/// Response payload for transaction submission.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub height: u64,
    pub timestamp: u64,
    pub receipts: Vec<TxReceipt>,
}

impl From<Block> for SubmitResponse {
    fn from(block: Block) -> Self {
        Self {
            height: block.height,
            timestamp: block.timestamp,
            receipts: block.receipts,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub from: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventEntry {
    pub sequence: u64,
    pub event: ShopEvent,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<EventEntry>,
    /// Sequence to pass as `from` for the next page.
    pub next: u64,
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetRequest {
    pub address: Address,
    pub amount: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaucetResponse {
    pub address: Address,
    pub amount: u64,
    pub balance: u64,
    pub height: u64,
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
}

/// Upper bound on `limit` for `/events`.
const MAX_EVENT_PAGE_SIZE: usize = DEFAULT_EVENT_PAGE_SIZE * 10;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: String,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::Rejected(ChainError::BadNonce { .. }) => StatusCode::CONFLICT,
            ServiceError::Rejected(ChainError::Funding(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Rejected(_) => StatusCode::BAD_REQUEST,
            ServiceError::FaucetDisabled => StatusCode::FORBIDDEN,
            ServiceError::FaucetLimit { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Store(_) | ServiceError::MissingSnapshot { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let code = match &err {
            ServiceError::Rejected(e) => e.code(),
            ServiceError::FaucetDisabled => "FAUCET_DISABLED",
            ServiceError::FaucetLimit { .. } => "FAUCET_LIMIT",
            ServiceError::Store(_) | ServiceError::MissingSnapshot { .. } => "STORAGE",
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }
        Self::new(status, code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                code: self.code,
                error: self.message,
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`: node status summary.
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let (block_height, last_block_timestamp, shop, administrator) = state.service.read(|chain| {
        (
            chain.height(),
            chain.last_timestamp(),
            chain.shop().address(),
            chain.shop().administrator(),
        )
    });
    Json(StatusResponse {
        version: state.version.clone(),
        network: state.network.clone(),
        block_height,
        last_block_timestamp,
        shop,
        administrator,
        faucet_enabled: state.service.faucet_limit().is_some(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /shop`: the exchange's public state.
async fn shop_handler(State(state): State<AppState>) -> Json<ShopResponse> {
    Json(state.service.read(|chain| {
        let shop = chain.shop();
        let token = shop.token();
        ShopResponse {
            address: shop.address(),
            administrator: shop.administrator(),
            price_for_sell: shop.price_for_sell(),
            price_for_buy: shop.price_for_buy(),
            balance: shop.shop_balance(chain.bank()),
            inventory: shop.inventory(),
            token: TokenInfo {
                address: token.address(),
                name: token.name().to_string(),
                symbol: token.symbol().to_string(),
                decimals: token.decimals(),
                total_supply: token.total_supply(),
                default_operators: token.default_operators().to_vec(),
            },
        }
    }))
}

/// `GET /accounts/:address`: balances and next nonce. Unknown accounts
/// report zeros.
async fn account_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Json<AccountResponse>> {
    let address: Address = address
        .parse()
        .map_err(|e| ApiError::bad_request(format!("invalid address: {}", e)))?;
    Ok(Json(state.service.read(|chain| AccountResponse {
        address,
        balance: chain.bank().balance_of(&address),
        token_balance: chain.shop().token().balance_of(&address),
        next_nonce: chain.next_nonce(&address),
    })))
}

/// `POST /transactions`: commits one signed transaction as its own block.
///
/// Answers `422` with the shop's error code when the call itself failed.
async fn submit_handler(
    State(state): State<AppState>,
    Json(tx): Json<SignedTransaction>,
) -> Response {
    let block = match state.service.submit(vec![tx]) {
        Ok(block) => block,
        Err(e) => return ApiError::from(e).into_response(),
    };
    if let Some(TxStatus::Failed { code, reason }) = block.receipts.first().map(|r| &r.status) {
        let body = serde_json::json!({
            "code": code,
            "error": reason,
            "height": block.height,
            "receipt": block.receipts.first(),
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response();
    }
    (StatusCode::OK, Json(SubmitResponse::from(block))).into_response()
}

/// `POST /transactions/batch`: commits several signed transactions as one
/// block. Individual shop failures are reported per receipt.
async fn submit_batch_handler(
    State(state): State<AppState>,
    Json(txs): Json<Vec<SignedTransaction>>,
) -> ApiResult<Json<SubmitResponse>> {
    if txs.len() > MAX_BATCH_SIZE {
        return Err(ApiError::bad_request(format!(
            "batch of {} exceeds the limit of {}",
            txs.len(),
            MAX_BATCH_SIZE
        )));
    }
    let block = state.service.submit(txs)?;
    Ok(Json(block.into()))
}

/// `GET /blocks/:height`: a committed block with its receipts.
async fn block_by_height_handler(
    Path(height): Path<u64>,
    State(state): State<AppState>,
) -> ApiResult<Json<Block>> {
    state
        .service
        .block(height)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("block not found at height {}", height)))
}

/// `GET /events?from=&limit=`: a page of the audit log.
async fn events_handler(
    Query(query): Query<EventsQuery>,
    State(state): State<AppState>,
) -> ApiResult<Json<EventsResponse>> {
    let from = query.from.unwrap_or(0);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_PAGE_SIZE)
        .clamp(1, MAX_EVENT_PAGE_SIZE);
    let page = state.service.events(from, limit)?;
    let next = page.last().map(|(seq, _)| seq + 1).unwrap_or(from);
    Ok(Json(EventsResponse {
        events: page
            .into_iter()
            .map(|(sequence, event)| EventEntry { sequence, event })
            .collect(),
        next,
        total: state.service.event_count()?,
    }))
}

/// `POST /faucet`: credits devnet currency.
async fn faucet_handler(
    State(state): State<AppState>,
    Json(req): Json<FaucetRequest>,
) -> ApiResult<Json<FaucetResponse>> {
    let block = state.service.fund(req.address, req.amount)?;
    let balance = state.service.read(|chain| chain.bank().balance_of(&req.address));
    Ok(Json(FaucetResponse {
        address: req.address,
        amount: req.amount,
        balance,
        height: block.height,
    }))
}

/// `GET /ws`: upgrades to a WebSocket that streams [`crate::service::NodeEvent`]s.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.service.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(ev) => {
                        let payload = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                tracing::warn!("failed to serialize ws event: {}", e);
                                continue;
                            }
                        };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("ws subscriber lagged by {} events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    // Push-only channel; client messages are ignored.
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ShopMetrics;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use lucky_contracts::runtime::{ShopCall, Transaction};
    use lucky_protocol::crypto::ShopKeypair;
    use lucky_protocol::storage::ChainStore;
    use lucky_protocol::ManualClock;
    use tower::ServiceExt;

    const T0: u64 = 10_000_000_000;

    struct TestNode {
        router: Router,
        admin: ShopKeypair,
        user: ShopKeypair,
        clock: ManualClock,
    }

    fn address(kp: &ShopKeypair) -> Address {
        Address::from_public_key(&kp.public_key())
    }

    fn test_node(faucet_limit: Option<u64>) -> TestNode {
        let admin = ShopKeypair::from_seed(&[1u8; 32]);
        let user = ShopKeypair::from_seed(&[2u8; 32]);
        let clock = ManualClock::new(T0);
        let service = ShopService::open(
            ChainStore::open_temporary().expect("temp store"),
            Arc::new(clock.clone()),
            address(&admin),
            100,
            Arc::new(ShopMetrics::new().unwrap()),
            faucet_limit,
        )
        .unwrap();
        let router = create_router(AppState {
            version: "0.1.0-test".into(),
            network: "devnet".into(),
            service: Arc::new(service),
        });
        TestNode {
            router,
            admin,
            user,
            clock,
        }
    }

    /// Sends a GET request and returns the (status, body_bytes).
    async fn get(router: &Router, path: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(path).body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    /// Sends a POST request with JSON body and returns (status, body).
    async fn post_json<T: Serialize>(router: &Router, path: &str, body: &T) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    fn signed(kp: &ShopKeypair, nonce: u64, call: ShopCall) -> SignedTransaction {
        Transaction::new(address(kp), nonce, call).sign(kp)
    }

    async fn fund(node: &TestNode, who: Address, amount: u64) {
        let (status, _) = post_json(&node.router, "/faucet", &FaucetRequest { address: who, amount }).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let node = test_node(None);
        let (status, body) = get(&node.router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn status_reports_genesis() {
        let node = test_node(None);
        let (status, body) = get(&node.router, "/status").await;
        assert_eq!(status, StatusCode::OK);
        let resp: StatusResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.block_height, 0);
        assert_eq!(resp.last_block_timestamp, T0);
        assert_eq!(resp.administrator, address(&node.admin));
        assert!(!resp.faucet_enabled);
    }

    #[tokio::test]
    async fn shop_reports_defaults() {
        let node = test_node(None);
        let (status, body) = get(&node.router, "/shop").await;
        assert_eq!(status, StatusCode::OK);
        let resp: ShopResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.price_for_sell, 90);
        assert_eq!(resp.price_for_buy, 100);
        assert_eq!(resp.balance, 0);
        assert_eq!(resp.inventory, 100);
        assert_eq!(resp.token.symbol, "LNT");
        assert_eq!(resp.token.default_operators, vec![resp.address]);
    }

    #[tokio::test]
    async fn unknown_account_is_zeroed() {
        let node = test_node(None);
        let path = format!("/accounts/{}", Address::from_label("nobody"));
        let (status, body) = get(&node.router, &path).await;
        assert_eq!(status, StatusCode::OK);
        let resp: AccountResponse = serde_json::from_value(body).unwrap();
        assert_eq!((resp.balance, resp.token_balance, resp.next_nonce), (0, 0, 0));
    }

    #[tokio::test]
    async fn malformed_address_is_bad_request() {
        let node = test_node(None);
        let (status, body) = get(&node.router, "/accounts/0xnothex").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn buy_through_api() {
        let node = test_node(Some(10_000));
        fund(&node, address(&node.user), 220).await;
        node.clock.set(T0 + 60);

        let tx = signed(&node.user, 0, ShopCall::Buy { value: 220 });
        let (status, body) = post_json(&node.router, "/transactions", &tx).await;
        assert_eq!(status, StatusCode::OK);
        let resp: SubmitResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.height, 2);
        assert_eq!(resp.timestamp, T0 + 60);
        assert!(resp.receipts[0].is_success());

        let path = format!("/accounts/{}", address(&node.user));
        let (_, body) = get(&node.router, &path).await;
        let account: AccountResponse = serde_json::from_value(body).unwrap();
        assert_eq!(account.balance, 20);
        assert_eq!(account.token_balance, 2);
        assert_eq!(account.next_nonce, 1);
    }

    #[tokio::test]
    async fn failed_shop_call_is_unprocessable() {
        let node = test_node(Some(10_000));
        fund(&node, address(&node.user), 99).await;
        let tx = signed(&node.user, 0, ShopCall::Buy { value: 99 });
        let (status, body) = post_json(&node.router, "/transactions", &tx).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "INSUFFICIENT_PAYMENT");
    }

    #[tokio::test]
    async fn non_admin_price_change_is_unauthorized() {
        let node = test_node(None);
        let tx = signed(&node.user, 0, ShopCall::SetPriceForBuy { price: 1 });
        let (status, body) = post_json(&node.router, "/transactions", &tx).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn tampered_signature_is_bad_request() {
        let node = test_node(None);
        let mut tx = signed(&node.admin, 1, ShopCall::SetPriceForBuy { price: 120 });
        tx.transaction.call = ShopCall::SetPriceForBuy { price: 1 };
        let (status, body) = post_json(&node.router, "/transactions", &tx).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_SIGNATURE");
    }

    #[tokio::test]
    async fn replayed_nonce_is_conflict() {
        let node = test_node(None);
        let tx = signed(&node.admin, 1, ShopCall::MintToShop { amount: 5 });
        let (status, _) = post_json(&node.router, "/transactions", &tx).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = post_json(&node.router, "/transactions", &tx).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "BAD_NONCE");
    }

    #[tokio::test]
    async fn batch_shares_one_timestamp() {
        let node = test_node(None);
        let txs = vec![
            signed(&node.admin, 1, ShopCall::SetPriceForSell { price: 80 }),
            signed(&node.admin, 2, ShopCall::SetPriceForBuy { price: 0 }),
            signed(&node.admin, 3, ShopCall::SetPriceForBuy { price: 110 }),
        ];
        let (status, body) = post_json(&node.router, "/transactions/batch", &txs).await;
        assert_eq!(status, StatusCode::OK);
        let resp: SubmitResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.receipts.len(), 3);
        assert!(resp.receipts[0].is_success());
        assert!(!resp.receipts[1].is_success());
        assert!(resp.receipts[2].is_success());
        assert!(resp.receipts.iter().all(|r| r.timestamp == resp.timestamp));

        let (_, body) = get(&node.router, "/shop").await;
        assert_eq!(body["price_for_sell"], 80);
        assert_eq!(body["price_for_buy"], 110);
    }

    #[tokio::test]
    async fn genesis_block_is_served() {
        let node = test_node(None);
        let (status, body) = get(&node.router, "/blocks/0").await;
        assert_eq!(status, StatusCode::OK);
        let block: Block = serde_json::from_value(body).unwrap();
        assert_eq!(block.height, 0);
        assert_eq!(block.system_events.len(), 1);

        let (status, _) = get(&node.router, "/blocks/9").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn events_are_paged() {
        let node = test_node(None);
        for nonce in 1..=3 {
            let tx = signed(&node.admin, nonce, ShopCall::MintToShop { amount: nonce });
            post_json(&node.router, "/transactions", &tx).await;
        }
        let (status, body) = get(&node.router, "/events?from=1&limit=2").await;
        assert_eq!(status, StatusCode::OK);
        let page: EventsResponse = serde_json::from_value(body).unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.next, 3);
        assert_eq!(page.events.len(), 2);
        assert_eq!(page.events[0].sequence, 1);
        assert!(matches!(page.events[1].event, ShopEvent::Mint { amount: 2, .. }));
    }

    #[tokio::test]
    async fn faucet_disabled_is_forbidden() {
        let node = test_node(None);
        let req = FaucetRequest {
            address: address(&node.user),
            amount: 1,
        };
        let (status, body) = post_json(&node.router, "/faucet", &req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "FAUCET_DISABLED");
    }

    #[tokio::test]
    async fn faucet_over_limit_is_bad_request() {
        let node = test_node(Some(10));
        let req = FaucetRequest {
            address: address(&node.user),
            amount: 11,
        };
        let (status, body) = post_json(&node.router, "/faucet", &req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "FAUCET_LIMIT");
    }

    #[tokio::test]
    async fn faucet_to_shop_is_bad_request() {
        let node = test_node(Some(10_000));
        let (_, shop) = get(&node.router, "/shop").await;
        let req = FaucetRequest {
            address: shop["address"].as_str().unwrap().parse().unwrap(),
            amount: 1_000,
        };
        let (status, body) = post_json(&node.router, "/faucet", &req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "FUNDING_TO_SHOP");

        let (_, shop) = get(&node.router, "/shop").await;
        assert_eq!(shop["balance"], 0);
    }
}
