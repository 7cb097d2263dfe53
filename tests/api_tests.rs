use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;

use matchbook::{api::router, state::AppState};
use serde_json::{Value, json};
use tower::ServiceExt;

fn test_app() -> Router {
    router(AppState::new())
}

async fn body_json(res: axum::response::Response) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn add(app: &Router, body: Value) {
    let res = app.clone().oneshot(post("/add_order", body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn options_preflight_returns_204_with_cors_headers() {
    let app = test_app();
    let res = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/add_order")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let headers = res.headers();
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
    assert_eq!(
        headers.get("access-control-allow-methods").unwrap(),
        "GET, POST, OPTIONS"
    );
    assert_eq!(headers.get("access-control-allow-headers").unwrap(), "*");
}

#[tokio::test]
async fn cors_headers_ride_along_on_normal_responses() {
    let app = test_app();
    let res = app.oneshot(get("/order_count?symbol=AAPL")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("access-control-allow-origin").unwrap(),
        "*"
    );
}

#[tokio::test]
async fn add_order_requires_json_content_type() {
    let app = test_app();
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/add_order")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert_eq!(v["status"], "error");
    assert_eq!(v["message"], "Content-Type must be application/json");
}

#[tokio::test]
async fn add_order_rejects_malformed_json() {
    let app = test_app();
    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/add_order")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(res).await["status"], "error");
}

#[tokio::test]
async fn add_order_rejects_zero_quantity() {
    let app = test_app();
    let res = app
        .oneshot(post(
            "/add_order",
            json!({"symbol": "AAPL", "id": 1, "price": 50.0, "quantity": 0, "side": "B"}),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert_eq!(v["status"], "error");
    assert_eq!(v["message"], "quantity must be > 0");
}

#[tokio::test]
async fn add_order_rejects_unknown_side() {
    let app = test_app();
    let res = app
        .oneshot(post(
            "/add_order",
            json!({"symbol": "AAPL", "id": 1, "price": 50.0, "quantity": 5, "side": "X"}),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert!(v["message"].as_str().unwrap().contains("side"));
}

#[tokio::test]
async fn add_order_rejects_nonpositive_price() {
    let app = test_app();
    let res = app
        .oneshot(post(
            "/add_order",
            json!({"symbol": "AAPL", "id": 1, "price": -1.0, "quantity": 5, "side": "B"}),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert_eq!(v["message"], "price must be a positive finite number");
}

#[tokio::test]
async fn add_order_rejects_duplicate_resting_id() {
    let app = test_app();
    let order = json!({"symbol": "AAPL", "id": 42, "price": 50.0, "quantity": 5, "side": "B"});
    add(&app, order.clone()).await;

    let res = app.clone().oneshot(post("/add_order", order)).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let v = body_json(res).await;
    assert!(v["message"].as_str().unwrap().contains("already rests"));

    // the book is unchanged
    let res = app.oneshot(get("/order_count?symbol=AAPL")).await.unwrap();
    assert_eq!(body_json(res).await["order_count"], 1);
}

#[tokio::test]
async fn simple_cross_end_to_end() {
    let app = test_app();
    add(
        &app,
        json!({"symbol": "AAPL", "id": 1, "price": 100.0, "quantity": 10, "side": "S"}),
    )
    .await;
    add(
        &app,
        json!({"symbol": "AAPL", "id": 2, "price": 101.0, "quantity": 4, "side": "B"}),
    )
    .await;

    let res = app.clone().oneshot(get("/trades?symbol=AAPL")).await.unwrap();
    let v = body_json(res).await;
    let trades = v["trades"].as_array().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0]["price"], 100.0);
    assert_eq!(trades[0]["quantity"], 4);
    assert_eq!(trades[0]["side"], "B");

    let res = app.clone().oneshot(get("/order_count?symbol=AAPL")).await.unwrap();
    assert_eq!(body_json(res).await["order_count"], 1);

    let res = app.clone().oneshot(get("/order_book?symbol=AAPL")).await.unwrap();
    let v = body_json(res).await;
    let orders = v["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["price"], 100.0);
    assert_eq!(orders[0]["quantity"], 6);
    assert_eq!(orders[0]["side"], "S");

    let res = app.oneshot(get("/risk_metrics?symbol=AAPL")).await.unwrap();
    assert_eq!(body_json(res).await["total_quantity"], 6);
}

#[tokio::test]
async fn market_order_sweeps_the_ask_ladder() {
    let app = test_app();
    for (id, price) in [(1, 100.0), (2, 101.0), (3, 102.0)] {
        add(
            &app,
            json!({"symbol": "AAPL", "id": id, "price": price, "quantity": 5, "side": "S"}),
        )
        .await;
    }
    add(
        &app,
        json!({"symbol": "AAPL", "id": 4, "price": 1.0, "quantity": 12, "side": "B", "order_type": 1}),
    )
    .await;

    let res = app.clone().oneshot(get("/trades?symbol=AAPL")).await.unwrap();
    let v = body_json(res).await;
    let fills: Vec<(f64, u64)> = v["trades"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| (t["price"].as_f64().unwrap(), t["quantity"].as_u64().unwrap()))
        .collect();
    assert_eq!(fills, vec![(100.0, 5), (101.0, 5), (102.0, 2)]);

    // no rested buy, one partially consumed ask
    let res = app.clone().oneshot(get("/order_book?symbol=AAPL")).await.unwrap();
    let v = body_json(res).await;
    let orders = v["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["side"], "S");
    assert_eq!(orders[0]["price"], 102.0);
    assert_eq!(orders[0]["quantity"], 3);
}

#[tokio::test]
async fn cancel_succeeds_once_then_reports_not_found() {
    let app = test_app();
    add(
        &app,
        json!({"symbol": "AAPL", "id": 50, "price": 99.0, "quantity": 10, "side": "B"}),
    )
    .await;

    let res = app
        .clone()
        .oneshot(post("/cancel_order", json!({"symbol": "AAPL", "id": 50})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "success");

    let res = app
        .clone()
        .oneshot(post("/cancel_order", json!({"symbol": "AAPL", "id": 50})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "not_found");

    let res = app.oneshot(get("/order_count?symbol=AAPL")).await.unwrap();
    assert_eq!(body_json(res).await["order_count"], 0);
}

#[tokio::test]
async fn modify_reprices_or_reports_not_found() {
    let app = test_app();
    add(
        &app,
        json!({"symbol": "AAPL", "id": 1, "price": 99.0, "quantity": 10, "side": "B"}),
    )
    .await;

    let res = app
        .clone()
        .oneshot(post(
            "/modify_order",
            json!({"symbol": "AAPL", "id": 1, "new_price": 98.0, "new_quantity": 10}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["status"], "success");

    let res = app.clone().oneshot(get("/order_book?symbol=AAPL")).await.unwrap();
    let v = body_json(res).await;
    assert_eq!(v["orders"][0]["price"], 98.0);

    let res = app
        .clone()
        .oneshot(post(
            "/modify_order",
            json!({"symbol": "AAPL", "id": 999, "new_price": 98.0, "new_quantity": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(res).await["status"], "not_found");

    let res = app
        .oneshot(post(
            "/modify_order",
            json!({"symbol": "AAPL", "id": 1, "new_price": 98.0, "new_quantity": 0}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn books_are_isolated_per_symbol() {
    let app = test_app();
    add(
        &app,
        json!({"symbol": "AAPL", "id": 1, "price": 100.0, "quantity": 10, "side": "S"}),
    )
    .await;
    add(
        &app,
        json!({"symbol": "MSFT", "id": 2, "price": 101.0, "quantity": 4, "side": "B"}),
    )
    .await;

    // the MSFT buy must not cross the AAPL ask
    let res = app.clone().oneshot(get("/trades?symbol=MSFT")).await.unwrap();
    assert!(body_json(res).await["trades"].as_array().unwrap().is_empty());

    let res = app.clone().oneshot(get("/order_count?symbol=AAPL")).await.unwrap();
    assert_eq!(body_json(res).await["order_count"], 1);
    let res = app.oneshot(get("/order_count?symbol=MSFT")).await.unwrap();
    assert_eq!(body_json(res).await["order_count"], 1);
}

#[tokio::test]
async fn symbol_queries_require_the_param() {
    let app = test_app();
    for uri in ["/order_count", "/order_book", "/trades", "/risk_metrics"] {
        let res = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{uri}");
        let v = body_json(res).await;
        assert_eq!(v["message"], "Missing symbol param");
    }
}

#[tokio::test]
async fn padded_symbol_reaches_the_same_book() {
    let app = test_app();
    add(
        &app,
        json!({"symbol": "IBM     ", "id": 1, "price": 100.0, "quantity": 5, "side": "B"}),
    )
    .await;
    let res = app.oneshot(get("/order_count?symbol=IBM")).await.unwrap();
    assert_eq!(body_json(res).await["order_count"], 1);
}

#[tokio::test]
async fn benchmark_reports_placement_time() {
    let app = test_app();
    let res = app
        .clone()
        .oneshot(get("/benchmark?n=50&symbol=BENCH"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["symbol"], "BENCH");
    assert_eq!(v["orders_placed"], 50);
    assert!(v["time_ms"].is_u64());

    // the drill ran against a real book; count and tape are consistent
    let res = app.clone().oneshot(get("/order_count?symbol=BENCH")).await.unwrap();
    let count = body_json(res).await["order_count"].as_u64().unwrap();
    let res = app.oneshot(get("/order_book?symbol=BENCH")).await.unwrap();
    let rows = body_json(res).await["orders"].as_array().unwrap().len() as u64;
    assert_eq!(count.min(200), rows);
}

#[tokio::test]
async fn benchmark_advanced_reports_throughput() {
    let app = test_app();
    let res = app
        .oneshot(get("/benchmark_advanced?n=20&c=2&symbol=BENCH"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let v = body_json(res).await;
    assert_eq!(v["threads"], 2);
    assert_eq!(v["orders_per_thread"], 20);
    assert_eq!(v["total_orders"], 40);
    assert!(v["orders_per_sec"].is_number());
    assert!(v["avg_time_per_order_ms"].is_number());
}

#[tokio::test]
async fn benchmark_coerces_nonpositive_n_to_default() {
    let app = test_app();
    let res = app.oneshot(get("/benchmark?n=-5&symbol=BENCH")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["orders_placed"], 100);
}
