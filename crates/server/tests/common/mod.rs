//! Common test utilities for the HTTP surface.
//!
//! The fixture builds the real router around an in-process converter, so
//! requests go through extraction, conversion and error mapping without a
//! listening socket.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use transmute_core::{
    adapter::{CompressAdapter, DocumentAdapter, ImageAdapter},
    config::Config,
    conversion::wire::CALLER_HEADER,
    create_event_system, default_enrichers, Converter, EventFilter, EventStore, Orchestrator, SqliteEventStore,
    UnlimitedGate, UsageGate,
};
use transmute_server::api::create_router;
use transmute_server::state::AppState;

/// Re-export fixtures for test convenience
pub use transmute_core::testing::fixtures;

const BOUNDARY: &str = "transmute-test-boundary";

/// Test fixture wrapping an in-process router.
pub struct TestFixture {
    pub router: Router,
    pub event_store: Arc<dyn EventStore>,
    /// Holds the scratch root and the event database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Vec<u8>,
    /// Parsed JSON body, or `Null` when the body is not JSON
    pub body: Value,
}

impl TestFixture {
    /// Local pipeline with the adapters that need no external binaries.
    pub async fn new() -> Self {
        Self::with_gate(Arc::new(UnlimitedGate::new())).await
    }

    pub async fn with_gate(gate: Arc<dyn UsageGate>) -> Self {
        Self::build(move |config, events| {
            let orchestrator = Orchestrator::new(config.conversion.clone(), gate)
                .with_adapter(Arc::new(ImageAdapter::default()))
                .with_adapter(Arc::new(DocumentAdapter::new()))
                .with_adapter(Arc::new(CompressAdapter::new()))
                .with_enrichers(default_enrichers(config))
                .with_events(events);
            Arc::new(orchestrator)
        })
        .await
    }

    /// Serve an arbitrary converter, e.g. a scripted mock.
    pub async fn with_converter(converter: Arc<dyn Converter>) -> Self {
        Self::build(move |_, _| converter).await
    }

    async fn build<F>(make_converter: F) -> Self
    where
        F: FnOnce(&Config, transmute_core::EventHandle) -> Arc<dyn Converter>,
    {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.conversion = config
            .conversion
            .with_scratch_dir(temp_dir.path().join("scratch"));
        config.events.database_path = temp_dir.path().join("events.db");
        config.server.max_upload_bytes = 4 * 1024 * 1024;

        let event_store: Arc<dyn EventStore> = Arc::new(
            SqliteEventStore::new(&config.events.database_path)
                .expect("Failed to create event store"),
        );
        let (events, writer) = create_event_system(Arc::clone(&event_store), 100);
        tokio::spawn(writer.run());

        let converter = make_converter(&config, events);
        let state = Arc::new(AppState::new(
            config,
            converter,
            Some(Arc::clone(&event_store)),
        ));

        Self {
            router: create_router(state),
            event_store,
            temp_dir,
        }
    }

    /// Number of entries left under the scratch root.
    pub fn scratch_entries(&self) -> usize {
        match std::fs::read_dir(self.temp_dir.path().join("scratch")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    /// Wait until the background writer has persisted `count` events.
    pub async fn wait_for_events(&self, filter: &EventFilter, count: i64) -> bool {
        for _ in 0..100 {
            if self.event_store.count(filter).unwrap_or(0) >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// POST a multipart form as `caller`.
    pub async fn post_form(&self, path: &str, caller: Option<&str>, form: Form) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            );
        if let Some(caller) = caller {
            builder = builder.header(CALLER_HEADER, caller);
        }
        let request = builder.body(Body::from(form.finish())).unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes()
            .to_vec();

        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            bytes,
            body,
        }
    }
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Minimal multipart/form-data body builder.
#[derive(Default)]
pub struct Form {
    body: Vec<u8>,
}

impl Form {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, filename: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, filename
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    fn finish(mut self) -> Vec<u8> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.body
    }
}
