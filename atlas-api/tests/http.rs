//! Router-level tests against the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use atlas_api::{create_router, AppState};
use atlas_core::{
    AtlasResult, Entity, EntityUpdate, LearningEvent, LearningEventType, MemoryRecord,
    Relationship, StorageError, TaskQueueItem,
};
use atlas_llm::ProviderRegistry;
use atlas_storage::{EntityQuery, EvolutionStore, MemoryQuery};
use atlas_test_utils::fixtures::{fast_config, population, store_with};
use atlas_test_utils::InMemoryStore;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

fn app(store: &InMemoryStore) -> Router {
    let state = AppState::new(Arc::new(store.clone()), ProviderRegistry::new(), fast_config())
        .unwrap();
    create_router(state)
}

fn run_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/evolution/run")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_run_returns_summary() {
    let store = store_with(population(6));
    let response = app(&store)
        .oneshot(run_request(
            r#"{"mode":"collective_intelligence","evolutionCycles":1,"batchSize":50}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["mode"], "collective_intelligence");
    assert_eq!(body["totalAgentsEvolved"], 6);
    assert_eq!(body["cyclesRun"], 1);
    assert!(body["requestId"].as_str().is_some_and(|id| !id.is_empty()));
    assert!(body["topResults"].as_array().unwrap().len() <= 10);

    let events = store.learning_events().unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == LearningEventType::EvolutionSummary));
}

#[tokio::test]
async fn test_empty_body_runs_with_defaults() {
    let store = store_with(population(4));
    let response = app(&store).oneshot(run_request("")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["mode"], "full_acceleration");
    assert_eq!(body["cyclesRequested"], 5);
    assert_eq!(body["intensity"], 3.0);
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let store = store_with(population(2));
    let response = app(&store)
        .oneshot(run_request("{\"mode\": "))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_INPUT");
    assert!(body["requestId"].is_string());
    assert!(store.entity_fetches().unwrap().is_empty());
}

#[tokio::test]
async fn test_fatal_store_error_yields_error_payload() {
    let store = store_with(population(3));
    store
        .fail_fetches(
            StorageError::Query {
                message: "relation \"agents\" does not exist".to_string(),
            },
            1,
        )
        .unwrap();

    let response = app(&store)
        .oneshot(run_request(r#"{"evolutionCycles":1}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "DATABASE_ERROR");
    assert!(body["error"].as_str().unwrap().contains("does not exist"));
    assert!(body["requestId"].is_string());
    assert!(body.get("totalAgentsEvolved").is_none());
}

#[tokio::test]
async fn test_health_reports_store_status() {
    let store = store_with(Vec::new());
    let response = app(&store)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["status"], "healthy");
}

#[tokio::test]
async fn test_ping() {
    let store = InMemoryStore::new();
    let response = app(&store)
        .oneshot(Request::builder().uri("/health/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Store whose every call fails as if the database were down.
struct DownStore;

fn down<T>() -> AtlasResult<T> {
    Err(StorageError::Connection {
        reason: "connection refused".to_string(),
    }
    .into())
}

#[async_trait]
impl EvolutionStore for DownStore {
    async fn fetch_entities(&self, _query: &EntityQuery) -> AtlasResult<Vec<Entity>> {
        down()
    }

    async fn fetch_memories(&self, _query: &MemoryQuery) -> AtlasResult<Vec<MemoryRecord>> {
        down()
    }

    async fn insert_memories(&self, _records: &[MemoryRecord]) -> AtlasResult<usize> {
        down()
    }

    async fn insert_learning_events(&self, _events: &[LearningEvent]) -> AtlasResult<usize> {
        down()
    }

    async fn insert_tasks(&self, _tasks: &[TaskQueueItem]) -> AtlasResult<usize> {
        down()
    }

    async fn update_entity(&self, _update: &EntityUpdate) -> AtlasResult<()> {
        down()
    }

    async fn upsert_relationship(&self, _relationship: &Relationship) -> AtlasResult<()> {
        down()
    }

    async fn ping(&self) -> AtlasResult<()> {
        down()
    }
}

#[tokio::test]
async fn test_unreachable_store() {
    let state = AppState::new(Arc::new(DownStore), ProviderRegistry::new(), fast_config()).unwrap();
    let router = create_router(state);

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["store"]["status"], "unhealthy");

    let response = router
        .oneshot(run_request(r#"{"evolutionCycles":1}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = json_body(response).await;
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
}
