//! # contract: collaborator seams of the pack pipeline
//!
//! The orchestrator and the sync queue never talk to the network, the PDF library or the
//! business database directly. They go through the traits below:
//!
//! - [`PdfConverter`]: spreadsheet bytes to PDF bytes (Graph drive conversion in production).
//! - [`ArtifactUploader`]: stores a PDF at a path on the remote drive.
//! - [`PdfMerger`]: concatenates PDFs page by page.
//! - [`PayloadProvider`]: shipment and carton records consumed by the engine.
//! - [`HttpTransport`]: the wire under the Graph client, one request in, one reply out.
//!
//! ## Mocking & Testing
//! Every trait is annotated for `mockall`; the mocks are exported under the
//! `test-export-mocks` feature so the integration suites (and dependents) can use them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{ConversionError, GraphError, SyncError};
use crate::payload::Value;
use crate::pdf::PdfError;

/// Converts one filled spreadsheet to PDF.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PdfConverter: Send + Sync {
    /// `filename` names the temporary remote file; `timeout` bounds each request.
    async fn convert_to_pdf(
        &self,
        xlsx: &[u8],
        filename: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, ConversionError>;
}

/// Delivers an artifact PDF to the remote drive.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    /// Overwrites whatever already lives at `remote_path`.
    async fn upload(
        &self,
        remote_path: &str,
        pdf: &[u8],
        timeout: Duration,
    ) -> Result<(), SyncError>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait PdfMerger: Send + Sync {
    /// All pages of all inputs, in input order.
    fn merge(&self, pdfs: &[Vec<u8>]) -> Result<Vec<u8>, PdfError>;
}

/// Read side of the business database.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait PayloadProvider: Send + Sync {
    fn shipment(&self, reference: &str) -> Option<Value>;

    fn carton(&self, code: &str) -> Option<Value>;

    /// Carton codes of a shipment, in label order.
    fn shipment_carton_codes(&self, reference: &str) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// One Graph or token endpoint call. A non-empty `form` is sent url-encoded and wins
/// over `body`.
#[derive(Clone)]
pub struct HttpRequest {
    /// Pipeline stage the call belongs to (`token`, `upload`, `export`, `delete`).
    pub stage: &'static str,
    pub method: HttpMethod,
    pub url: Url,
    pub bearer: Option<String>,
    pub content_type: Option<String>,
    pub form: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn new(stage: &'static str, method: HttpMethod, url: Url, timeout: Duration) -> Self {
        Self {
            stage,
            method,
            url,
            bearer: None,
            content_type: None,
            form: Vec::new(),
            body: Vec::new(),
            timeout,
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    pub fn body(mut self, content_type: &str, body: &[u8]) -> Self {
        self.content_type = Some(content_type.to_string());
        self.body = body.to_vec();
        self
    }

    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.form = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let form_keys: Vec<&str> = self.form.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("HttpRequest")
            .field("stage", &self.stage)
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("content_type", &self.content_type)
            .field("form_keys", &form_keys)
            .field("body_len", &self.body.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends one request and returns the status and body, whatever the status.
///
/// Only connection-level failures are errors here; status handling belongs to the caller.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, GraphError>;
}
