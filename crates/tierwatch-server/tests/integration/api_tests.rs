use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use tierwatch_core::config::BatchConfig;
use tierwatch_core::BatchScorer;

use crate::integration::common::setup_test_app;

async fn get(router: &axum::Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, serde_json::Value) {
    let response = router
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, headers, json)
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let (status, _, json) = get(&app.router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn servers_lists_the_directory() {
    let app = setup_test_app().await;

    let (status, _, json) = get(&app.router, "/v1/servers").await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<_> = json["servers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap().to_string())
        .collect();
    assert!(names.contains(&"Siel".to_string()));
    let siel = json["servers"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == "Siel")
        .unwrap();
    assert_eq!(siel["upstream_id"], "30");
    assert_eq!(siel["local_label"], "시엘");
}

#[tokio::test]
async fn first_lookup_is_live_then_stored() {
    let app = setup_test_app().await;

    let (status, _, first) = get(&app.router, "/v1/characters/Siel/Aria").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["origin"], "live");
    assert_eq!(first["is_synthetic"], true);
    assert!(first["score"]["power_index"].as_i64().unwrap() > 0);
    assert!(first["score"]["tier_rank"].is_string());

    let (status, _, second) = get(&app.router, "/v1/characters/Siel/Aria").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["origin"], "stored");
    assert_eq!(second["power"], first["power"]);
    assert!(second["advisory"].as_str().unwrap().contains("minutes ago"));
}

#[tokio::test]
async fn repeated_refresh_is_rate_limited() {
    let app = setup_test_app().await;

    let (status, _, _) = get(&app.router, "/v1/characters/Siel/Aria?refresh=true").await;
    assert_eq!(status, StatusCode::OK);

    let (status, headers, json) = get(&app.router, "/v1/characters/Siel/Aria?refresh=true").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"], "rate_limited");
    let retry_after: u64 = headers[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after));

    // Another identity has its own window.
    let (status, _, _) = get(&app.router, "/v1/characters/Siel/Bran?refresh=true").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn history_grows_with_each_fetch() {
    let app = setup_test_app().await;

    let (_, _, empty) = get(&app.router, "/v1/characters/Siel/Aria/history").await;
    assert_eq!(empty["total"], 0);

    get(&app.router, "/v1/characters/Siel/Aria").await;

    let (status, _, json) = get(&app.router, "/v1/characters/Siel/Aria/history?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 1);
    assert!(json["snapshots"][0]["stats"]["attack"].is_number());
}

#[tokio::test]
async fn ranking_is_404_until_a_batch_runs() {
    let app = setup_test_app().await;

    let (status, _, json) = get(&app.router, "/v1/rankings/all").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");

    for name in ["Aria", "Bran", "Cato"] {
        get(&app.router, &format!("/v1/characters/Siel/{name}")).await;
    }
    BatchScorer::new(app.db.character_repo(), BatchConfig::default())
        .run()
        .await
        .unwrap();

    let (status, _, json) = get(&app.router, "/v1/rankings/all?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["scope"], "all");
    assert_eq!(json["total"], 3);
    let entries = json["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["rank"], 1);
    assert!(entries[0]["power_index"].as_i64() >= entries[1]["power_index"].as_i64());

    let (status, _, json) = get(&app.router, "/v1/rankings/Siel").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["entries"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = setup_test_app().await;

    let (status, _, json) = get(&app.router, "/api-docs/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/v1/characters/{server}/{name}"].is_object());
    assert!(json["paths"]["/v1/rankings/{scope}"].is_object());
}
