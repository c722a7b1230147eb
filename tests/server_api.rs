//! Router-level tests for the HTTP surface, driven with `tower::ServiceExt`.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storefront_locale::clock::SystemClock;
use storefront_locale::currency::{RateChain, StaticRateProvider};
use storefront_locale::location::{
    LocationResolver, LocationSession, LocationStore, MemoryKeyValueStore, DEFAULT_LOCATION_ERROR,
};
use storefront_locale::server::upstream::{IpApiClient, NominatimClient};
use storefront_locale::server::{build_router, AppState};

/// A router whose session has no detection tiers and whose rate chain is
/// the static table only. Upstream geo clients point at `upstream`.
fn test_app(upstream: &str) -> Router {
    let clock = Arc::new(SystemClock);
    let session = LocationSession::new(
        LocationResolver::new(Vec::new()),
        LocationStore::new(
            Box::new(MemoryKeyValueStore::new()),
            clock.clone(),
            chrono::Duration::hours(24),
        ),
    );
    let rates = RateChain::new(
        vec![Box::new(StaticRateProvider)],
        chrono::Duration::hours(1),
        clock,
    );
    let timeout = Duration::from_secs(5);
    let state = AppState::new(
        session,
        rates,
        IpApiClient::new(upstream, timeout),
        NominatimClient::new(upstream, timeout),
    );
    build_router(Arc::new(state))
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(req).await.expect("response");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    let json = serde_json::from_slice(&body).expect("json parse");
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn shipping_context_defaults_when_detection_misses() {
    let app = test_app("http://127.0.0.1:9");
    let (status, json) = send(app, get("/api/shipping-context")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["countryCode"], "US");
    assert_eq!(json["currency"], "USD");
    assert_eq!(json["shipToText"], "Ship to: United States");
    assert_eq!(json["error"], DEFAULT_LOCATION_ERROR);
    assert_eq!(json["isManualOverride"], false);
}

#[tokio::test]
async fn manual_location_is_reflected_in_context() {
    let app = test_app("http://127.0.0.1:9");

    let (status, json) = send(
        app.clone(),
        post_json("/api/location", json!({"country": "Egypt", "countryCode": "eg"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["countryCode"], "EG");
    assert_eq!(json["shipToText"], "Ship to: Egypt | EGP");
    assert_eq!(json["detectionMethod"], "manual");

    let (_, json) = send(app, get("/api/shipping-context")).await;
    assert_eq!(json["currency"], "EGP");
    assert_eq!(json["isManualOverride"], true);
}

#[tokio::test]
async fn invalid_manual_location_is_rejected() {
    let app = test_app("http://127.0.0.1:9");
    let (status, json) = send(
        app,
        post_json("/api/location", json!({"country": "Nowhere", "countryCode": "N1"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["code"], 422);
}

#[tokio::test]
async fn refresh_clears_manual_override() {
    let app = test_app("http://127.0.0.1:9");
    send(
        app.clone(),
        post_json("/api/location", json!({"country": "Sweden", "countryCode": "SE"})),
    )
    .await;

    let (status, json) = send(app, post_json("/api/location/refresh", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["isManualOverride"], false);
    assert_eq!(json["countryCode"], "US");
}

#[tokio::test]
async fn convert_uses_rate_chain() {
    let app = test_app("http://127.0.0.1:9");
    let (status, json) = send(app, get("/api/convert?amount=10&from=usd&to=EGP")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["response"], 485.0);
    assert_eq!(json["meta"]["source"], "fallback-rates");
    assert!(json["meta"]["warning"].is_string());
    assert_eq!(json["request"]["from"], "USD");
}

#[tokio::test]
async fn convert_validates_parameters() {
    let app = test_app("http://127.0.0.1:9");

    let (status, _) = send(app.clone(), get("/api/convert?amount=10&from=USD")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app.clone(), get("/api/convert?amount=10&from=DOLLAR&to=EUR")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, json) = send(app, get("/api/convert?amount=10&from=USD&to=XAU")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], 502);
}

#[tokio::test]
async fn currencies_lists_fallback_set() {
    let app = test_app("http://127.0.0.1:9");
    let (status, json) = send(app, get("/api/currencies")).await;

    assert_eq!(status, StatusCode::OK);
    let map = json.as_object().expect("object");
    assert_eq!(map.len(), 11);
    assert_eq!(map["EGP"], "Egyptian Pound");
}

#[tokio::test]
async fn geo_reverse_rejects_out_of_range_coordinates() {
    let app = test_app("http://127.0.0.1:9");
    let (status, _) = send(app.clone(), get("/api/geo/reverse?lat=95&lng=10")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(app, get("/api/geo/reverse?lat=10")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn geo_ip_forwards_client_address_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/41.33.0.1/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ip": "41.33.0.1",
            "country_name": "Egypt",
            "country_code": "EG",
            "currency": "EGP",
            "timezone": "Africa/Cairo"
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = test_app(&upstream.uri());
    let req = Request::builder()
        .uri("/api/geo/ip")
        .header("x-forwarded-for", "41.33.0.1, 10.0.0.2")
        .body(Body::empty())
        .expect("request");
    let (status, json) = send(app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["countryCode"], "EG");
    assert_eq!(json["currency"], "EGP");
}

#[tokio::test]
async fn geo_ip_upstream_error_is_bad_gateway() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": true, "reason": "RateLimited"})),
        )
        .mount(&upstream)
        .await;

    let app = test_app(&upstream.uri());
    let (status, json) = send(app, get("/api/geo/ip")).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["error"].as_str().unwrap_or("").contains("RateLimited"));
}
