use rand::Rng;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use std::time::{Duration, Instant};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        FromRequest, Query, Request, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::{
    orders::{OrderType, Side},
    state::AppState,
    store::BookStore,
    symbol::Symbol,
    trade::Trade,
};

type ApiErr = (StatusCode, Json<serde_json::Value>);

fn err(status: StatusCode, msg: &str) -> ApiErr {
    (status, Json(json!({ "status": "error", "message": msg })))
}

/// Wildcard CORS exactly as the legacy gateway served it: a bare `OPTIONS`
/// anywhere is answered 204, and every response carries the allow headers.
async fn cors(req: Request, next: Next) -> Response {
    let mut res = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };
    let headers = res.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
    res
}

/// JSON body extractor that enforces `application/json` and logs rejects
/// with a capped body preview.
pub struct LoggedJson<T>(pub T);

impl<S, T> FromRequest<S> for LoggedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiErr;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !content_type.contains("application/json") {
            return Err(err(
                StatusCode::BAD_REQUEST,
                "Content-Type must be application/json",
            ));
        }
        let method = req.method().clone();
        let uri = req.uri().clone();
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| err(StatusCode::BAD_REQUEST, &e.to_string()))?;

        match serde_json::from_slice::<T>(&bytes) {
            Ok(val) => Ok(LoggedJson(val)),
            Err(e) => {
                // cap the preview to keep logs sane
                let preview = String::from_utf8_lossy(&bytes);
                let preview = &preview[..preview.len().min(4096)];
                warn!(
                    error = %e,
                    %method,
                    uri = %uri,
                    body_preview = %preview,
                    "request body rejected"
                );
                Err(err(StatusCode::BAD_REQUEST, &e.to_string()))
            }
        }
    }
}

/// Request payload for `POST /add_order`.
///
/// `order_type` is the legacy numeric code: 0 = limit (default), 1 = market.
#[derive(Deserialize)]
pub struct AddOrderReq {
    pub symbol: Symbol,
    pub id: u64,
    pub price: f64,
    pub quantity: u32,
    pub side: Side,
    #[serde(default)]
    pub order_type: OrderType,
}

#[derive(Deserialize)]
pub struct CancelOrderReq {
    pub symbol: Symbol,
    pub id: u64,
}

#[derive(Deserialize)]
pub struct ModifyOrderReq {
    pub symbol: Symbol,
    pub id: u64,
    pub new_price: f64,
    pub new_quantity: u32,
}

#[derive(Deserialize)]
pub struct SymbolQuery {
    symbol: Option<String>,
}

impl SymbolQuery {
    fn parse(&self) -> Result<Symbol, ApiErr> {
        let raw = self
            .symbol
            .as_deref()
            .ok_or_else(|| err(StatusCode::BAD_REQUEST, "Missing symbol param"))?;
        Symbol::new(raw).map_err(|e| err(StatusCode::BAD_REQUEST, &e.to_string()))
    }
}

/// The tape row shape the wire promises: aggressor side, maker price.
#[derive(Serialize)]
struct TradeRow {
    trade_id: u64,
    price: f64,
    quantity: u32,
    side: Side,
}

impl From<&Trade> for TradeRow {
    fn from(t: &Trade) -> Self {
        TradeRow {
            trade_id: t.trade_id,
            price: t.price,
            quantity: t.quantity,
            side: t.side,
        }
    }
}

/// `POST /add_order`
///
/// *Success:* 200, `{"status":"success","order_id":<id>}`
/// *Rejected:* 400, `{"status":"error","message":<reason>}`
pub async fn add_order(
    State(state): State<AppState>,
    LoggedJson(req): LoggedJson<AddOrderReq>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    match state
        .books
        .add(&req.symbol, req.id, req.price, req.quantity, req.side, req.order_type)
    {
        Ok(fills) => {
            if !fills.is_empty() {
                info!(
                    symbol = %req.symbol,
                    order_id = req.id,
                    fills = fills.len(),
                    "order crossed"
                );
            }
            Ok(Json(json!({ "status": "success", "order_id": req.id })))
        }
        Err(e) => {
            warn!(symbol = %req.symbol, order_id = req.id, reason = %e, "order rejected");
            Err(err(StatusCode::BAD_REQUEST, &e.to_string()))
        }
    }
}

/// `POST /cancel_order` — `{"status":"success"}` or `{"status":"not_found"}`.
pub async fn cancel_order(
    State(state): State<AppState>,
    LoggedJson(req): LoggedJson<CancelOrderReq>,
) -> Json<serde_json::Value> {
    if state.books.cancel(&req.symbol, req.id) {
        info!(symbol = %req.symbol, order_id = req.id, "order cancelled");
        Json(json!({ "status": "success" }))
    } else {
        Json(json!({ "status": "not_found" }))
    }
}

/// `POST /modify_order` — `{"status":"success"}` or `{"status":"not_found"}`;
/// invalid replacement values are rejected with 400.
pub async fn modify_order(
    State(state): State<AppState>,
    LoggedJson(req): LoggedJson<ModifyOrderReq>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    match state
        .books
        .modify(&req.symbol, req.id, req.new_price, req.new_quantity)
    {
        Ok(true) => Ok(Json(json!({ "status": "success" }))),
        Ok(false) => Ok(Json(json!({ "status": "not_found" }))),
        Err(e) => {
            warn!(symbol = %req.symbol, order_id = req.id, reason = %e, "modify rejected");
            Err(err(StatusCode::BAD_REQUEST, &e.to_string()))
        }
    }
}

/// `GET /order_count?symbol=S` → `{"order_count": N}`
pub async fn order_count(
    State(state): State<AppState>,
    Query(q): Query<SymbolQuery>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let symbol = q.parse()?;
    Ok(Json(json!({ "order_count": state.books.order_count(&symbol) })))
}

/// `GET /order_book?symbol=S`
///
/// Bids first (highest price down), then asks (lowest up), FIFO within each
/// level, truncated to the snapshot cap.
pub async fn order_book(
    State(state): State<AppState>,
    Query(q): Query<SymbolQuery>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let symbol = q.parse()?;
    Ok(Json(json!({ "orders": state.books.snapshot(&symbol) })))
}

/// `GET /trades?symbol=S` — tail of the tape, oldest first.
pub async fn trade_tape(
    State(state): State<AppState>,
    Query(q): Query<SymbolQuery>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let symbol = q.parse()?;
    let rows: Vec<TradeRow> = state.books.trades(&symbol).iter().map(TradeRow::from).collect();
    Ok(Json(json!({ "trades": rows })))
}

/// `GET /risk_metrics?symbol=S` → `{"total_quantity": N}`
pub async fn risk_metrics(
    State(state): State<AppState>,
    Query(q): Query<SymbolQuery>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let symbol = q.parse()?;
    Ok(Json(
        json!({ "total_quantity": state.books.total_resting_quantity(&symbol) }),
    ))
}

#[derive(Deserialize)]
pub struct BenchmarkQuery {
    n: Option<i64>,
    c: Option<i64>,
    symbol: Option<String>,
}

/// Feeds `n` randomized orders straight into the command surface. Random ids
/// collide now and then; those rejects are part of the drill and ignored.
fn place_random_orders(books: &BookStore, n: u32, symbol: &Symbol) {
    let mut rng = rand::rng();
    for _ in 0..n {
        let id = rng.random_range(30_000..130_000);
        let price = 100.0 + f64::from(rng.random_range(0..50));
        let quantity = rng.random_range(1..=10);
        let side = if rng.random_bool(0.5) { Side::Buy } else { Side::Sell };
        let order_type = if rng.random_bool(0.5) {
            OrderType::Limit
        } else {
            OrderType::Market
        };
        let _ = books.add(symbol, id, price, quantity, side, order_type);
    }
}

fn benchmark_params(q: &BenchmarkQuery) -> Result<(u32, u32, Symbol), ApiErr> {
    let n = q.n.filter(|&n| n > 0).unwrap_or(100) as u32;
    let c = q.c.filter(|&c| c > 0).unwrap_or(1) as u32;
    let raw = q.symbol.clone().unwrap_or_else(|| "AAPL".to_string());
    let symbol = Symbol::new(&raw).map_err(|e| err(StatusCode::BAD_REQUEST, &e.to_string()))?;
    Ok((n, c, symbol))
}

/// `GET /benchmark?n=100&symbol=AAPL` — single caller, `n` random orders.
pub async fn benchmark(
    State(state): State<AppState>,
    Query(q): Query<BenchmarkQuery>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let (n, _, symbol) = benchmark_params(&q)?;
    let books = state.books.clone();
    let sym = symbol.clone();
    let elapsed_ms = tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        place_random_orders(&books, n, &sym);
        start.elapsed().as_millis() as u64
    })
    .await
    .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    Ok(Json(json!({
        "symbol": symbol,
        "orders_placed": n,
        "time_ms": elapsed_ms,
    })))
}

/// `GET /benchmark_advanced?n=1000&c=4&symbol=MSFT` — `c` native threads
/// hammering one book with `n` random orders each.
pub async fn benchmark_advanced(
    State(state): State<AppState>,
    Query(q): Query<BenchmarkQuery>,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let (n, c, symbol) = benchmark_params(&q)?;
    let books = state.books.clone();
    let sym = symbol.clone();
    let elapsed_ms = tokio::task::spawn_blocking(move || {
        let start = Instant::now();
        std::thread::scope(|scope| {
            for _ in 0..c {
                scope.spawn(|| place_random_orders(&books, n, &sym));
            }
        });
        start.elapsed().as_millis() as u64
    })
    .await
    .map_err(|e| err(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()))?;

    let total_orders = u64::from(n) * u64::from(c);
    let elapsed_sec = elapsed_ms as f64 / 1000.0;
    let orders_per_sec = if elapsed_sec > 0.0 {
        total_orders as f64 / elapsed_sec
    } else {
        0.0
    };

    Ok(Json(json!({
        "symbol": symbol,
        "threads": c,
        "orders_per_thread": n,
        "total_orders": total_orders,
        "time_ms": elapsed_ms,
        "orders_per_sec": orders_per_sec,
        "avg_time_per_order_ms": elapsed_ms as f64 / total_orders as f64,
    })))
}

/// `GET /ws`
/// Upgrades the connection, greets, and then streams the live order count of
/// whichever symbol the client last sent.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

const WS_GREETING: &str = "Connected to WebSocket. Please send a symbol.";

pub async fn handle_socket(mut socket: WebSocket, state: AppState) {
    if socket
        .send(Message::Text(WS_GREETING.into()))
        .await
        .is_err()
    {
        return;
    }

    let mut symbol: Option<Symbol> = None;
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match Symbol::new(&text) {
                        Ok(s) => symbol = Some(s),
                        Err(e) => {
                            if socket.send(Message::Text(e.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("websocket receive failed: {e:?}");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                if let Some(sym) = &symbol {
                    let count = state.books.order_count(sym);
                    let line = format!("Live {} Order Count: {}", sym, count);
                    if socket.send(Message::Text(line.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Constructs the application's `Router` with all routes and shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/add_order", post(add_order))
        .route("/cancel_order", post(cancel_order))
        .route("/modify_order", post(modify_order))
        .route("/order_count", get(order_count))
        .route("/order_book", get(order_book))
        .route("/trades", get(trade_tape))
        .route("/risk_metrics", get(risk_metrics))
        .route("/benchmark", get(benchmark))
        .route("/benchmark_advanced", get(benchmark_advanced))
        .route("/ws", get(ws_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .include_headers(false)
                        .level(tracing::Level::TRACE),
                )
                .on_response(DefaultOnResponse::new().level(tracing::Level::TRACE)),
        )
        .layer(middleware::from_fn(cors))
        .with_state(state)
}
