//! Microsoft Graph drive client: spreadsheet-to-PDF conversion and artifact upload.
//!
//! Conversion goes through a temporary drive item: the spreadsheet is uploaded under
//! `temp_dir`, exported with `?format=pdf`, and the temporary item is deleted again
//! whatever the outcome. Uploads overwrite the path-addressed item.
//!
//! All endpoints must be `https`; every request carries the caller's timeout. Requests go
//! out through an [`HttpTransport`], [`ReqwestTransport`] unless one is injected with
//! [`GraphClient::with_transport`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::GraphConfig;
use crate::contract::{
    ArtifactUploader, HttpMethod, HttpReply, HttpRequest, HttpTransport, PdfConverter,
};
use crate::error::{ConversionError, GraphError, SyncError};
use crate::pdf::is_pdf;
use crate::workbook::xlsx::XLSX_CONTENT_TYPE;

const PDF_CONTENT_TYPE: &str = "application/pdf";
/// Cached tokens are dropped this long before their advertised expiry.
const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DriveItem {
    id: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// [`HttpTransport`] over a shared `reqwest` client.
#[derive(Debug, Default, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, GraphError> {
        let stage = request.stage;
        let builder = match request.method {
            HttpMethod::Get => self.http.get(request.url),
            HttpMethod::Post => self.http.post(request.url),
            HttpMethod::Put => self.http.put(request.url),
            HttpMethod::Delete => self.http.delete(request.url),
        };
        let mut builder = builder.timeout(request.timeout);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        } else if let Some(content_type) = &request.content_type {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, content_type)
                .body(request.body);
        }
        let response = builder
            .send()
            .await
            .map_err(|source| GraphError::Transport { stage, source })?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|source| GraphError::Transport { stage, source })?;
        Ok(HttpReply::new(status, body.to_vec()))
    }
}

pub struct GraphClient {
    config: GraphConfig,
    transport: Box<dyn HttpTransport>,
    token: Mutex<Option<CachedToken>>,
}

impl GraphClient {
    pub fn new(config: GraphConfig) -> Self {
        Self::with_transport(config, Box::new(ReqwestTransport::default()))
    }

    pub fn with_transport(config: GraphConfig, transport: Box<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            token: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    fn preflight(&self) -> Result<(), GraphError> {
        self.config.validate()?;
        ensure_https(&parse_url(&self.config.authority_url)?)?;
        ensure_https(&parse_url(&self.config.graph_url)?)?;
        Ok(())
    }

    /// Refuses non-https URLs before anything leaves the process.
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, GraphError> {
        ensure_https(&request.url)?;
        debug!(stage = request.stage, method = ?request.method, url = %request.url, "[GRAPH] request");
        self.transport.send(request).await
    }

    fn token_url(&self) -> Result<Url, GraphError> {
        let tenant = self.config.tenant_id.trim();
        join_segments(
            &self.config.authority_url,
            &[tenant, "oauth2", "v2.0", "token"],
        )
    }

    fn drive_url(&self, segments: &[&str]) -> Result<Url, GraphError> {
        let mut all = vec!["drives", self.config.drive_id.trim()];
        all.extend_from_slice(segments);
        join_segments(&self.config.graph_url, &all)
    }

    /// `drives/{drive}/root:/{path}:/content`
    pub fn path_content_url(&self, remote_path: &str) -> Result<Url, GraphError> {
        let parts: Vec<&str> = remote_path
            .split('/')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let Some((last, folders)) = parts.split_last() else {
            return Err(GraphError::InvalidUrl {
                url: remote_path.to_string(),
                reason: "empty remote path".to_string(),
            });
        };
        let last = format!("{last}:");
        let mut segments = vec!["root:"];
        segments.extend_from_slice(folders);
        segments.push(last.as_str());
        segments.push("content");
        self.drive_url(&segments)
    }

    async fn access_token(&self, timeout: Duration) -> Result<String, GraphError> {
        if self.config.cache_token {
            let cached = self.token.lock().await;
            if let Some(token) = cached.as_ref() {
                if Instant::now() + TOKEN_EXPIRY_SKEW < token.expires_at {
                    debug!("[GRAPH][TOKEN] reusing cached token");
                    return Ok(token.value.clone());
                }
            }
        }

        let request = HttpRequest::new("token", HttpMethod::Post, self.token_url()?, timeout).form(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", self.config.scope.as_str()),
            ("grant_type", "client_credentials"),
        ]);
        let reply = check_status("token", self.send(request).await?)?;
        let body: TokenResponse = parse_json("token", &reply)?;
        let value = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(GraphError::InvalidResponse {
                stage: "token",
                reason: "missing access_token".to_string(),
            })?;

        if self.config.cache_token {
            let lifetime = Duration::from_secs(body.expires_in.unwrap_or(0));
            *self.token.lock().await = Some(CachedToken {
                value: value.clone(),
                expires_at: Instant::now() + lifetime,
            });
        }
        debug!(cached = self.config.cache_token, "[GRAPH][TOKEN] token acquired");
        Ok(value)
    }

    async fn put_content(
        &self,
        token: &str,
        remote_path: &str,
        bytes: &[u8],
        content_type: &str,
        timeout: Duration,
    ) -> Result<HttpReply, GraphError> {
        let url = self.path_content_url(remote_path)?;
        let request = HttpRequest::new("upload", HttpMethod::Put, url, timeout)
            .bearer(token)
            .body(content_type, bytes);
        self.send(request).await
    }

    async fn export_pdf(
        &self,
        token: &str,
        item_id: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, GraphError> {
        let mut url = self.drive_url(&["items", item_id, "content"])?;
        url.query_pairs_mut().append_pair("format", "pdf");
        let request = HttpRequest::new("export", HttpMethod::Get, url, timeout).bearer(token);
        let reply = check_status("export", self.send(request).await?)?;
        Ok(reply.body)
    }

    /// Deletes a drive item, logging instead of failing.
    pub async fn delete_item_best_effort(&self, token: &str, item_id: &str, timeout: Duration) {
        let url = match self.drive_url(&["items", item_id]) {
            Ok(url) => url,
            Err(err) => {
                warn!(item_id, error = %err, "[GRAPH][CLEANUP] cannot build delete URL");
                return;
            }
        };
        let request = HttpRequest::new("delete", HttpMethod::Delete, url, timeout).bearer(token);
        match self.send(request).await {
            Ok(reply) if reply.is_success() => {
                debug!(item_id, "[GRAPH][CLEANUP] temporary item deleted");
            }
            Ok(reply) => {
                warn!(item_id, status = reply.status, "[GRAPH][CLEANUP] delete failed");
            }
            Err(err) => {
                warn!(item_id, error = %err, "[GRAPH][CLEANUP] delete failed");
            }
        }
    }
}

#[async_trait]
impl PdfConverter for GraphClient {
    async fn convert_to_pdf(
        &self,
        xlsx: &[u8],
        filename: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, ConversionError> {
        if xlsx.is_empty() {
            return Err(ConversionError::EmptyPayload);
        }
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(ConversionError::MissingFilename);
        }
        self.preflight()?;
        let token = self.access_token(timeout).await?;

        let remote_path = format!(
            "{}/{}-{}",
            self.config.temp_dir.trim_matches('/'),
            Uuid::new_v4().simple(),
            filename
        );
        info!(remote_path = %remote_path, bytes = xlsx.len(), "[GRAPH][CONVERT] uploading spreadsheet");
        let reply = self
            .put_content(&token, &remote_path, xlsx, XLSX_CONTENT_TYPE, timeout)
            .await?;
        let reply = check_status("upload", reply)?;
        let item: DriveItem = parse_json("upload", &reply)?;
        let item_id = item
            .id
            .filter(|id| !id.is_empty())
            .ok_or(GraphError::InvalidResponse {
                stage: "upload",
                reason: "missing item id".to_string(),
            })?;

        let exported = self.export_pdf(&token, &item_id, timeout).await;
        self.delete_item_best_effort(&token, &item_id, timeout).await;
        let pdf = exported?;
        if !is_pdf(&pdf) {
            return Err(ConversionError::NotPdf);
        }
        info!(filename, bytes = pdf.len(), "[GRAPH][CONVERT] converted");
        Ok(pdf)
    }
}

#[async_trait]
impl ArtifactUploader for GraphClient {
    async fn upload(
        &self,
        remote_path: &str,
        pdf: &[u8],
        timeout: Duration,
    ) -> Result<(), SyncError> {
        self.preflight()?;
        let token = self.access_token(timeout).await?;
        let reply = self
            .put_content(&token, remote_path, pdf, PDF_CONTENT_TYPE, timeout)
            .await?;
        match reply.status {
            200 | 201 => {
                info!(remote_path, status = reply.status, "[GRAPH][UPLOAD] stored");
                Ok(())
            }
            status if reply.is_success() => Err(SyncError::UnexpectedStatus(status)),
            status => {
                check_status("upload", reply)?;
                Err(SyncError::UnexpectedStatus(status))
            }
        }
    }
}

fn parse_url(raw: &str) -> Result<Url, GraphError> {
    Url::parse(raw.trim()).map_err(|e| GraphError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

fn join_segments(base: &str, segments: &[&str]) -> Result<Url, GraphError> {
    let mut url = parse_url(base)?;
    url.path_segments_mut()
        .map_err(|_| GraphError::InvalidUrl {
            url: base.to_string(),
            reason: "URL cannot be a base".to_string(),
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub fn ensure_https(url: &Url) -> Result<(), GraphError> {
    if url.scheme() != "https" {
        return Err(GraphError::InsecureEndpoint(url.to_string()));
    }
    Ok(())
}

fn check_status(stage: &'static str, reply: HttpReply) -> Result<HttpReply, GraphError> {
    if reply.is_success() {
        return Ok(reply);
    }
    Err(GraphError::Http {
        stage,
        status: reply.status,
        body: reply.text(),
    })
}

fn parse_json<T: DeserializeOwned>(stage: &'static str, reply: &HttpReply) -> Result<T, GraphError> {
    serde_json::from_slice(&reply.body).map_err(|e| GraphError::InvalidResponse {
        stage,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigurationError;

    fn configured() -> GraphConfig {
        GraphConfig {
            tenant_id: "tenant".into(),
            client_id: "client".into(),
            client_secret: "secret".into(),
            drive_id: "drive-1".into(),
            ..Default::default()
        }
    }

    #[test]
    fn path_addressed_content_url() {
        let client = GraphClient::new(configured());
        let url = client
            .path_content_url("/print_pack_sync/shipments/SHP 1/pack.pdf")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://graph.microsoft.com/v1.0/drives/drive-1/root:/print_pack_sync/shipments/SHP%201/pack.pdf:/content"
        );
        assert!(client.path_content_url("//").is_err());
    }

    #[test]
    fn token_url_uses_tenant() {
        let client = GraphClient::new(configured());
        assert_eq!(
            client.token_url().unwrap().as_str(),
            "https://login.microsoftonline.com/tenant/oauth2/v2.0/token"
        );
    }

    #[test]
    fn plain_http_is_rejected() {
        let url = Url::parse("http://graph.local/v1.0").unwrap();
        assert!(matches!(
            ensure_https(&url),
            Err(GraphError::InsecureEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn conversion_validates_input_before_network() {
        let client = GraphClient::new(configured());
        let timeout = Duration::from_secs(1);
        assert!(matches!(
            client.convert_to_pdf(b"", "a.xlsx", timeout).await,
            Err(ConversionError::EmptyPayload)
        ));
        assert!(matches!(
            client.convert_to_pdf(b"x", "  ", timeout).await,
            Err(ConversionError::MissingFilename)
        ));
    }

    #[tokio::test]
    async fn conversion_requires_credentials() {
        let client = GraphClient::new(GraphConfig::default());
        let err = client
            .convert_to_pdf(b"x", "a.xlsx", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConversionError::Graph(GraphError::Configuration(
                ConfigurationError::MissingCredentials(_)
            ))
        ));
    }

    #[tokio::test]
    async fn upload_refuses_insecure_graph_endpoint() {
        let client = GraphClient::new(GraphConfig {
            graph_url: "http://graph.local/v1.0".into(),
            ..configured()
        });
        let err = client
            .upload("a/b.pdf", b"%PDF", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Graph(GraphError::InsecureEndpoint(_))
        ));
    }

    /// Needs live Graph credentials in the environment.
    #[tokio::test]
    #[ignore]
    async fn live_conversion_roundtrip() {
        let config = GraphConfig {
            tenant_id: std::env::var("GRAPH_TENANT_ID").unwrap_or_default(),
            client_id: std::env::var("GRAPH_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("GRAPH_CLIENT_SECRET").unwrap_or_default(),
            drive_id: std::env::var("GRAPH_DRIVE_ID").unwrap_or_default(),
            ..Default::default()
        };
        let mut book = umya_spreadsheet::new_file();
        if let Some(sheet) = book.get_sheet_by_name_mut("Sheet1") {
            sheet.get_cell_mut("A1").set_value_string("live test");
        }
        let mut xlsx = std::io::Cursor::new(Vec::new());
        umya_spreadsheet::writer::xlsx::write_writer(&book, &mut xlsx).unwrap();
        let client = GraphClient::new(config);
        let pdf = client
            .convert_to_pdf(&xlsx.into_inner(), "live.xlsx", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(is_pdf(&pdf));
    }
}
