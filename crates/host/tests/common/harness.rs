use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use fsgate_host::api::{self, AppState};
use fsgate_host::auth::AuthGate;
use fsgate_vfs::LocalFs;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const PASSWD: &str = "integration_test_secret";

/// In-process server over a temporary workspace
pub struct TestHarness {
    pub tmp_dir: TempDir,
    pub app: Router,
}

impl TestHarness {
    pub fn new() -> Result<Self> {
        let tmp_dir = TempDir::new().context("Failed to create temp directory")?;
        let store = LocalFs::new(tmp_dir.path())?;
        let state = AppState::new(Arc::new(store), Arc::new(AuthGate::new(PASSWD)));
        Ok(Self {
            tmp_dir,
            app: api::app(state),
        })
    }

    /// Get absolute path for file in temp directory
    pub fn path(&self, rel_path: &str) -> PathBuf {
        self.tmp_dir.path().join(rel_path)
    }

    /// Write a file to the temp directory
    pub fn write_file(&self, rel_path: &str, content: &str) -> Result<()> {
        let path = self.path(rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write file: {}", path.display()))
    }

    /// Read a file from the temp directory
    pub fn read_file(&self, rel_path: &str) -> Result<String> {
        let path = self.path(rel_path);
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read file: {}", path.display()))
    }

    /// Send a request, returning status and decoded JSON body (Null if empty)
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&json)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, value))
    }

    pub async fn get(&self, uri: &str) -> Result<(StatusCode, Value)> {
        self.send(Method::GET, uri, None).await
    }
}

/// Append the test password to a route's query string
pub fn authed(uri: &str) -> String {
    let sep = if uri.contains('?') { '&' } else { '?' };
    format!("{uri}{sep}passwd={PASSWD}")
}
