//! Artifact sync queue: delivers pending pack PDFs to the remote drive with bounded retry.
//!
//! One run selects `sync_pending` artifacts (plus `sync_failed` ones when asked) oldest
//! first, uploads each through an [`ArtifactUploader`] and records the outcome:
//!   - success: `synced`, attempt counted, remote path stored, error cleared;
//!   - failure: attempt counted, error stored, `sync_failed` once the attempt budget is
//!     used up, otherwise back to `sync_pending` for the next run.
//!
//! Upload failures never stop the batch. Store failures do. There is no backoff and no
//! lease: runs are expected to be serialized by whatever schedules them.

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::contract::ArtifactUploader;
use crate::error::SyncError;
use crate::models::{ArtifactStatus, GeneratedArtifact};
use crate::store::{queries, Store, StoreError};

pub const DEFAULT_LIMIT: usize = 20;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    pub limit: Option<usize>,
    pub include_failed: bool,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
    /// Drive folder under which artifacts are filed. May be empty.
    pub work_dir: String,
}

/// [`QueueOptions`] with defaults applied and lower bounds enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub limit: usize,
    pub include_failed: bool,
    pub max_attempts: u32,
    pub timeout: Duration,
    pub work_dir: String,
}

impl QueueOptions {
    pub fn resolve(&self) -> ResolvedOptions {
        ResolvedOptions {
            limit: self.limit.map(|l| l.max(1)).unwrap_or(DEFAULT_LIMIT),
            include_failed: self.include_failed,
            max_attempts: self
                .max_attempts
                .map(|m| m.max(1))
                .unwrap_or(DEFAULT_MAX_ATTEMPTS),
            timeout: self
                .timeout
                .map(|t| t.max(Duration::from_secs(1)))
                .unwrap_or(DEFAULT_TIMEOUT),
            work_dir: self.work_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueReport {
    pub selected: usize,
    pub processed: usize,
    pub failed: usize,
    pub retried: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    Failed,
    Retried,
}

/// The stored PDF filename (basename, `.pdf` enforced) or `print-pack-{code}-{id}.pdf`.
pub fn artifact_filename(artifact: &GeneratedArtifact) -> String {
    let stored = artifact
        .pdf_filename
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    let basename = stored.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let filename = if basename.is_empty() {
        format!("print-pack-{}-{}.pdf", artifact.pack_code, artifact.id)
    } else {
        basename.to_string()
    };
    if filename.to_ascii_lowercase().ends_with(".pdf") {
        filename
    } else {
        format!("{filename}.pdf")
    }
}

/// `{work_dir}/shipments/{ref}/…`, `{work_dir}/cartons/{code}/…` or `{work_dir}/packs/{code}/…`.
pub fn remote_path(artifact: &GeneratedArtifact, work_dir: &str) -> String {
    let mut parts: Vec<String> = Vec::new();
    let base = work_dir.trim().trim_matches('/');
    if !base.is_empty() {
        parts.push(base.to_string());
    }
    let shipment = artifact.shipment_reference.as_deref().map(str::trim);
    let carton = artifact.carton_code.as_deref().map(str::trim);
    match (shipment, carton) {
        (Some(reference), _) if !reference.is_empty() => {
            parts.extend(["shipments".to_string(), reference.to_string()]);
        }
        (_, Some(code)) if !code.is_empty() => {
            parts.extend(["cartons".to_string(), code.to_string()]);
        }
        _ => {
            let code = artifact.pack_code.trim();
            let code = if code.is_empty() { "unknown" } else { code };
            parts.extend(["packs".to_string(), code.to_string()]);
        }
    }
    parts.push(artifact_filename(artifact));
    parts.join("/")
}

/// Applies one attempt's result to the artifact record.
pub fn apply_outcome(
    artifact: &mut GeneratedArtifact,
    result: Result<String, &SyncError>,
    max_attempts: u32,
) -> Outcome {
    artifact.sync_attempts += 1;
    match result {
        Ok(path) => {
            artifact.status = ArtifactStatus::Synced;
            artifact.remote_path = path;
            artifact.last_error.clear();
            Outcome::Processed
        }
        Err(err) => {
            artifact.last_error = err.to_string();
            if artifact.sync_attempts >= max_attempts {
                artifact.status = ArtifactStatus::SyncFailed;
                Outcome::Failed
            } else {
                artifact.status = ArtifactStatus::SyncPending;
                Outcome::Retried
            }
        }
    }
}

async fn sync_artifact<U>(
    uploader: &U,
    artifact: &GeneratedArtifact,
    options: &ResolvedOptions,
) -> Result<String, SyncError>
where
    U: ArtifactUploader + ?Sized,
{
    let pdf = artifact.pdf.as_deref().ok_or(SyncError::MissingPdf)?;
    if pdf.is_empty() {
        return Err(SyncError::EmptyPdf);
    }
    let path = remote_path(artifact, &options.work_dir);
    uploader.upload(&path, pdf, options.timeout).await?;
    Ok(path)
}

pub async fn process_queue<U>(
    store: &Store,
    uploader: &U,
    options: &QueueOptions,
) -> Result<QueueReport, StoreError>
where
    U: ArtifactUploader + ?Sized,
{
    let options = options.resolve();
    let mut statuses = vec![ArtifactStatus::SyncPending];
    if options.include_failed {
        statuses.push(ArtifactStatus::SyncFailed);
    }
    let artifacts = store
        .with_conn(|conn| queries::select_artifacts_by_status(conn, &statuses, options.limit))?;
    info!(selected = artifacts.len(), limit = options.limit, include_failed = options.include_failed, "[QUEUE] batch selected");

    let mut report = QueueReport::default();
    for mut artifact in artifacts {
        report.selected += 1;
        let result = sync_artifact(uploader, &artifact, &options).await;
        if let Err(err) = &result {
            warn!(artifact_id = artifact.id, attempts = artifact.sync_attempts + 1, error = %err, "[QUEUE][UPLOAD] sync attempt failed");
        }
        let outcome = apply_outcome(&mut artifact, result.as_ref().cloned(), options.max_attempts);
        if let Err(err) = store.with_conn(|conn| queries::record_sync_outcome(conn, &artifact)) {
            error!(artifact_id = artifact.id, error = %err, "[QUEUE][ERROR] failed to record sync outcome");
            return Err(err);
        }
        match outcome {
            Outcome::Processed => {
                info!(artifact_id = artifact.id, remote_path = %artifact.remote_path, "[QUEUE][UPLOAD] synced");
                report.processed += 1;
            }
            Outcome::Failed => report.failed += 1,
            Outcome::Retried => report.retried += 1,
        }
    }

    info!(
        selected = report.selected,
        processed = report.processed,
        failed = report.failed,
        retried = report.retried,
        "[QUEUE] batch done"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn artifact() -> GeneratedArtifact {
        GeneratedArtifact {
            id: 7,
            pack_code: "B".into(),
            shipment_reference: None,
            carton_code: None,
            status: ArtifactStatus::SyncPending,
            pdf_filename: None,
            pdf: Some(b"%PDF-1.4".to_vec()),
            checksum: String::new(),
            created_by: None,
            created_at: Utc::now(),
            remote_path: String::new(),
            sync_attempts: 0,
            last_error: String::new(),
        }
    }

    #[test]
    fn options_are_clamped() {
        let resolved = QueueOptions {
            limit: Some(0),
            max_attempts: Some(0),
            timeout: Some(Duration::ZERO),
            ..Default::default()
        }
        .resolve();
        assert_eq!(resolved.limit, 1);
        assert_eq!(resolved.max_attempts, 1);
        assert_eq!(resolved.timeout, Duration::from_secs(1));

        let defaults = QueueOptions::default().resolve();
        assert_eq!(defaults.limit, 20);
        assert_eq!(defaults.max_attempts, 5);
        assert_eq!(defaults.timeout, Duration::from_secs(30));
    }

    #[test]
    fn remote_path_prefers_shipment_then_carton() {
        let mut a = artifact();
        a.pdf_filename = Some("artifacts/print-pack-B-20260301101500.pdf".into());
        assert_eq!(
            remote_path(&a, "/print_pack_sync/"),
            "print_pack_sync/packs/B/print-pack-B-20260301101500.pdf"
        );
        a.carton_code = Some("C-1".into());
        assert_eq!(remote_path(&a, ""), "cartons/C-1/print-pack-B-20260301101500.pdf");
        a.shipment_reference = Some("SHP-9".into());
        assert_eq!(remote_path(&a, "w"), "w/shipments/SHP-9/print-pack-B-20260301101500.pdf");
    }

    #[test]
    fn filename_falls_back_and_forces_pdf_suffix() {
        let mut a = artifact();
        assert_eq!(artifact_filename(&a), "print-pack-B-7.pdf");
        a.pdf_filename = Some("report".into());
        assert_eq!(artifact_filename(&a), "report.pdf");
        a.pack_code = "  ".into();
        a.pdf_filename = None;
        assert_eq!(remote_path(&a, ""), "packs/unknown/print-pack-  -7.pdf");
    }

    #[test]
    fn failures_retry_until_budget_is_spent() {
        let mut a = artifact();
        let err = SyncError::UnexpectedStatus(202);
        assert_eq!(apply_outcome(&mut a, Err(&err), 2), Outcome::Retried);
        assert_eq!(a.status, ArtifactStatus::SyncPending);
        assert_eq!(apply_outcome(&mut a, Err(&err), 2), Outcome::Failed);
        assert_eq!(a.status, ArtifactStatus::SyncFailed);
        assert_eq!(a.sync_attempts, 2);
        assert!(a.last_error.contains("202"));

        assert_eq!(apply_outcome(&mut a, Ok("x/y.pdf".into()), 2), Outcome::Processed);
        assert_eq!(a.status, ArtifactStatus::Synced);
        assert_eq!(a.sync_attempts, 3);
        assert!(a.last_error.is_empty());
    }
}
