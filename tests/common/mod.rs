#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use people_db::{
    engine::{Engine, EngineOptions},
    person::PersonStore,
    query::QueryEngine,
    seed::load_fixtures,
    server::{router, AppState},
};
use serde_json::Value;
use std::{path::Path, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;

pub struct TestApp {
    dir: TempDir,
    pub store: Arc<PersonStore>,
    pub router: Router,
}

impl TestApp {
    /// A fresh store holding only the three reference records.
    pub async fn with_fixtures() -> Self {
        let app = Self::empty().await;
        load_fixtures(&app.store).await.unwrap();
        app
    }

    pub async fn empty() -> Self {
        let dir = TempDir::new().unwrap();
        let options = EngineOptions {
            buffer_pages: 16,
            sync_wal: false,
        };
        let engine = Arc::new(Engine::open(dir.path(), options).await.unwrap());
        let store = Arc::new(PersonStore::open(engine).await.unwrap());
        let queries = Arc::new(QueryEngine::new(store.clone()));
        Self {
            dir,
            store,
            router: router(AppState::new(queries)),
        }
    }

    /// The engine's data directory.
    pub fn data_dir(&self) -> &Path {
        self.dir.path()
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }
}

/// Datatable URI with `search[value]` percent-encoded.
pub fn datatable_uri(draw: i64, start: i64, length: i64, search: Option<&str>) -> String {
    let mut uri = format!("/person/datatable?draw={draw}&start={start}&length={length}");
    if let Some(search) = search {
        uri.push_str("&search%5Bvalue%5D=");
        uri.push_str(search);
    }
    uri
}

pub fn names(people: &Value) -> Vec<String> {
    people
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap().to_string())
        .collect()
}
