use axum::body::Body;
use axum::Router;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use sager_server::{
    routes::build_router, AppState, SagerServerBuilder, ServerConfig, TelemetryConfig,
};
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

/// Populate a tempdir with one geometry tile, a legacy nested feature
/// document, and a small prediction results file. Returns the data and
/// results roots.
fn write_fixtures(tmp: &TempDir) -> (PathBuf, PathBuf) {
    let data_dir = tmp.path().join("data");
    let results_dir = tmp.path().join("results");

    let source_a = data_dir.join("RawCitiesData/The Hague/Source A");
    std::fs::create_dir_all(&source_a).unwrap();
    std::fs::write(
        source_a.join("tile1.json"),
        json!({
            "type": "CityJSON",
            "version": "1.1",
            "CityObjects": {
                "bag_0518100000271783": {
                    "type": "Building",
                    "geometry": [{
                        "type": "Solid",
                        "lod": "2.2",
                        "boundaries": [[[[1, 3, 5]], [[5, 3, 7]]]]
                    }]
                }
            },
            "vertices": [
                [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0],
                [3.0, 0.0, 0.0], [4.0, 0.0, 0.0], [5.0, 0.0, 0.0],
                [6.0, 0.0, 0.0], [7.0, 0.0, 0.0]
            ]
        })
        .to_string(),
    )
    .unwrap();

    let dicts = data_dir.join("property_dicts");
    std::fs::create_dir_all(&dicts).unwrap();
    std::fs::write(
        dicts.join("features_legacy.json"),
        json!({
            "area": { "cands": { "bag_0518100000271783": 42.5 } },
            "roof_type": { "cands": { "bag_0518100000271783": "gabled" } }
        })
        .to_string(),
    )
    .unwrap();

    let inference = results_dir.join("demo_inference");
    std::fs::create_dir_all(&inference).unwrap();
    std::fs::write(
        inference.join("demo_detailed_results.json"),
        json!({
            "tile1.json": {
                "123": {
                    "possible_matches": [
                        { "index_id": "999", "confidence": 0.9, "true_label": 1 },
                        { "index_id": "998", "confidence": 0.1, "true_label": 0 }
                    ]
                }
            }
        })
        .to_string(),
    )
    .unwrap();

    (data_dir, results_dir)
}

fn test_state() -> (TempDir, Arc<AppState>) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (data_dir, results_dir) = write_fixtures(&tmp);
    let cfg = ServerConfig {
        data_dir,
        results_dir,
        cors_enabled: false,
        ..Default::default()
    };
    let telemetry = TelemetryConfig::with_server_config(&cfg);
    let state = Arc::new(AppState::new(cfg, telemetry).expect("AppState::new"));
    (tmp, state)
}

/// Router over the same fixtures but with a distributed cache tier
/// configured. The tier points at an unreachable address; cache traffic
/// degrades silently while the configured-tier code paths (background job
/// dispatch) stay active.
fn test_router_with_remote_tier() -> (TempDir, Router) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (data_dir, results_dir) = write_fixtures(&tmp);
    let server = SagerServerBuilder::new()
        .data_dir(data_dir)
        .results_dir(results_dir)
        .redis_url("redis://127.0.0.1:1")
        .cache_ttl_seconds(60)
        .cors_enabled(false)
        .build()
        .expect("build server");
    let router = server.router();
    (tmp, router)
}

/// Poll a job over HTTP until it reaches a terminal state
async fn poll_job(app: &Router, job_id: &str) -> JsonValue {
    for _ in 0..200 {
        let resp = app
            .clone()
            .oneshot(get(&format!("/api/jobs/{job_id}")))
            .await
            .unwrap();
        let (status, json) = json_body(resp).await;
        assert_eq!(status, StatusCode::OK);
        match json["status"].as_str() {
            Some("success") | Some("failure") => return json,
            _ => tokio::time::sleep(Duration::from_millis(10)).await,
        }
    }
    panic!("job {job_id} did not reach a terminal state");
}

async fn json_body(resp: http::Response<Body>) -> (StatusCode, JsonValue) {
    let status = resp.status();
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    let json: JsonValue = serde_json::from_slice(&bytes).expect("valid JSON response");
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: JsonValue) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_check_ok() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app.oneshot(get("/health")).await.unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn stats_reports_local_only_cache() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app.oneshot(get("/api/stats")).await.unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json.get("cache_mode").and_then(|v| v.as_str()),
        Some("local-only")
    );
    assert!(json.get("uptime_secs").and_then(|v| v.as_u64()).is_some());
    assert_eq!(json.get("jobs_total").and_then(|v| v.as_u64()), Some(0));
}

#[tokio::test]
async fn files_listing_finds_source_a() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app.oneshot(get("/api/data/files")).await.unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);

    let source_a = json.get("source_a").and_then(|v| v.as_array()).unwrap();
    assert_eq!(source_a.len(), 1);
    assert_eq!(
        source_a[0].get("filename").and_then(|v| v.as_str()),
        Some("tile1.json")
    );
    assert!(source_a[0].get("size").and_then(|v| v.as_u64()).unwrap() > 0);

    // Source B directory does not exist; empty list, not an error
    let source_b = json.get("source_b").and_then(|v| v.as_array()).unwrap();
    assert!(source_b.is_empty());
}

#[tokio::test]
async fn whole_geometry_file_fetch() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    // Bare file name; the nested Source A layout is probed automatically
    let resp = app.oneshot(get("/api/data/file/tile1.json")).await.unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.get("type").and_then(|v| v.as_str()), Some("CityJSON"));
    assert_eq!(json["vertices"].as_array().unwrap().len(), 8);
    assert!(json["CityObjects"]
        .as_object()
        .unwrap()
        .contains_key("bag_0518100000271783"));
}

#[tokio::test]
async fn missing_geometry_file_is_404() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app.oneshot(get("/api/data/file/nope.json")).await.unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json.get("error").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn building_extraction_renumbers_vertices() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app
        .oneshot(get(
            "/api/data/file/tile1.json?building=bag_0518100000271783",
        ))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);

    // Solid references vertices 1,3,5,7 -> renumbered 0..4
    assert_eq!(json["vertices"].as_array().unwrap().len(), 4);
    let objects = json["CityObjects"].as_object().unwrap();
    assert_eq!(objects.len(), 1);
    let boundaries = &objects["bag_0518100000271783"]["geometry"][0]["boundaries"];
    assert_eq!(*boundaries, json!([[[[0, 1, 2]], [[2, 1, 3]]]]));
}

#[tokio::test]
async fn unknown_building_extraction_is_empty_404() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app
        .oneshot(get(
            "/api/data/file/tile1.json?building=bag_9999999999999999",
        ))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    // Empty-collection-shaped body so viewers render "nothing to draw"
    assert!(json["CityObjects"].as_object().unwrap().is_empty());
    assert!(json["vertices"].as_array().unwrap().is_empty());
    assert!(json.get("error").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn feature_compute_runs_synchronously_without_redis() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app
        .oneshot(post_json(
            "/api/features/compute",
            json!({ "file_path": "tile1.json" }),
        ))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json.get("cache_key").and_then(|v| v.as_str()),
        Some("features:tile1.json")
    );
    assert_eq!(json.get("building_count").and_then(|v| v.as_u64()), Some(1));
}

#[tokio::test]
async fn feature_compute_requires_file_path() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app
        .oneshot(post_json("/api/features/compute", json!({})))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("file_path"));
}

#[tokio::test]
async fn building_features_resolve_prefixed_id() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    // Feature keys are normalized at load; the prefixed request form still
    // resolves through the cascade
    let resp = app
        .oneshot(get("/api/building/features/bag_0518100000271783"))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);

    let features = json["features"].as_object().unwrap();
    assert_eq!(features["area"], json!(42.5));
    assert_eq!(features["roof_type"], json!("gabled"));
    assert_eq!(
        json.get("matched_key").and_then(|v| v.as_str()),
        Some("0518100000271783")
    );
}

#[tokio::test]
async fn unknown_building_features_is_empty_404() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app
        .oneshot(get("/api/building/features/bag_1111111111111111"))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["features"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn prediction_load_runs_synchronously_without_redis() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/predictions/load")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json.get("cache_key_flat").and_then(|v| v.as_str()),
        Some("predictions:flat")
    );
    assert_eq!(json.get("total_pairs").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        json.get("unique_candidates").and_then(|v| v.as_u64()),
        Some(1)
    );
}

#[tokio::test]
async fn building_matches_expose_effective_labels() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app
        .oneshot(get("/api/building/matches/123"))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);

    let matches = json["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0]["building_id"], json!("999"));
    assert_eq!(matches[0]["confidence"], json!(0.9));
    // No explicit predicted label; derived from the confidence threshold
    assert_eq!(matches[0]["predicted_label"], json!(1));
    assert_eq!(matches[0]["true_label"], json!(1));
    assert_eq!(matches[1]["predicted_label"], json!(0));
}

#[tokio::test]
async fn unknown_building_matches_is_empty_404() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app
        .oneshot(get("/api/building/matches/bag_5555555555555555"))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["matches"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn buildings_status_spans_both_artifacts() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app.oneshot(get("/api/buildings/status")).await.unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);

    let buildings = json["buildings"].as_object().unwrap();
    // Union of the feature keyspace and the prediction keyspace
    assert_eq!(buildings.len(), 2);

    let featured = &buildings["0518100000271783"];
    assert_eq!(featured["has_features"], json!(true));
    assert_eq!(featured["has_pairs"], json!(false));
    assert_eq!(featured["match_status"], json!("none"));

    let predicted = &buildings["123"];
    assert_eq!(predicted["has_features"], json!(false));
    assert_eq!(predicted["has_pairs"], json!(true));
    assert_eq!(predicted["match_status"], json!("true_match"));

    let counts = &json["counts"];
    assert_eq!(counts["total"], json!(2));
    assert_eq!(counts["with_features"], json!(1));
    assert_eq!(counts["with_pairs"], json!(1));
    assert_eq!(counts["true_match"], json!(1));
}

#[tokio::test]
async fn classifier_metrics_per_file() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app
        .oneshot(get("/api/classifier/metrics/tile1.json"))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["file_name"], json!("tile1.json"));

    let metrics = &json["metrics"];
    assert_eq!(metrics["true_positives"], json!(1));
    assert_eq!(metrics["true_negatives"], json!(1));
    assert_eq!(metrics["false_positives"], json!(0));
    assert_eq!(metrics["false_negatives"], json!(0));
    assert_eq!(metrics["labeled_pairs"], json!(2));
    assert_eq!(metrics["precision"], json!(1.0));
    assert_eq!(metrics["recall"], json!(1.0));
}

#[tokio::test]
async fn classifier_metrics_unknown_file_is_404() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app
        .oneshot(get("/api/classifier/metrics/other.json"))
        .await
        .unwrap();
    let (status, _json) = json_body(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn feature_compute_dispatches_job_with_remote_tier() {
    let (_tmp, app) = test_router_with_remote_tier();

    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/features/compute",
            json!({ "file_path": "tile1.json" }),
        ))
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], json!("queued"));
    let job_id = json["job_id"].as_str().expect("job id").to_string();

    // The unreachable tier never fails the build; the job completes with
    // the summary the synchronous branch would have returned inline
    let report = poll_job(&app, &job_id).await;
    assert_eq!(report["status"], json!("success"));
    assert_eq!(report["name"], json!("calculate_features"));
    assert_eq!(report["result"]["building_count"], json!(1));
    assert_eq!(report["result"]["cache_key"], json!("features:tile1.json"));
    assert!(report.get("error").is_none());
}

#[tokio::test]
async fn prediction_load_dispatches_job_with_remote_tier() {
    let (_tmp, app) = test_router_with_remote_tier();

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/predictions/load")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = json["job_id"].as_str().expect("job id").to_string();

    let report = poll_job(&app, &job_id).await;
    assert_eq!(report["status"], json!("success"));
    assert_eq!(report["name"], json!("load_bkafi_results"));
    assert_eq!(report["result"]["total_pairs"], json!(2));
    assert_eq!(report["result"]["unique_candidates"], json!(1));
}

#[tokio::test]
async fn builder_wires_a_runnable_server() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let (data_dir, results_dir) = write_fixtures(&tmp);
    let server = SagerServerBuilder::new()
        .listen_addr(([127, 0, 0, 1], 0))
        .data_dir(data_dir)
        .results_dir(results_dir)
        .cors_enabled(false)
        .build()
        .expect("build server");

    assert!(!server.state().cache.has_remote());
    assert_eq!(server.state().config.cache_mode_str(), "local-only");

    let resp = server.router().oneshot(get("/health")).await.unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], json!("ok"));
}

#[tokio::test]
async fn job_poll_rejects_malformed_id() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app.oneshot(get("/api/jobs/not-a-uuid")).await.unwrap();
    let (status, json) = json_body(resp).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("invalid job id"));
}

#[tokio::test]
async fn job_poll_unknown_id_is_404() {
    let (_tmp, state) = test_state();
    let app = build_router(state);

    let resp = app
        .oneshot(get(&format!("/api/jobs/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    let (status, _json) = json_body(resp).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
