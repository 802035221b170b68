//! Error taxonomy of the pack pipeline.
//!
//! Generation errors ([`PackEngineError`] and what it wraps) surface at the call site.
//! [`SyncError`] is caught per artifact by the sync queue and recorded on the artifact.

use thiserror::Error;

use crate::pdf::PdfError;
use crate::store::StoreError;
use crate::workbook::WorkbookError;

/// Missing or unusable credentials / drive settings.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing Microsoft Graph credentials ({0})")]
    MissingCredentials(String),
    #[error("missing Graph drive id")]
    MissingDriveId,
    #[error("invalid configuration value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Transport-level failures talking to the Graph APIs, shared by conversion and sync.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Graph endpoint must use HTTPS: {0}")]
    InsecureEndpoint(String),
    #[error("invalid Graph URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{stage} request failed: {source}")]
    Transport {
        stage: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{stage} failed with HTTP {status}: {body}")]
    Http {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[error("invalid {stage} response payload: {reason}")]
    InvalidResponse { stage: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("excel payload is empty")]
    EmptyPayload,
    #[error("filename is required for conversion")]
    MissingFilename,
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("conversion did not return a valid PDF payload")]
    NotPdf,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("artifact has no PDF file to upload")]
    MissingPdf,
    #[error("artifact PDF payload is empty")]
    EmptyPdf,
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("upload failed with unexpected status code {0}")]
    UnexpectedStatus(u16),
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("unknown worksheet: {worksheet}")]
    UnknownWorksheet { worksheet: String },
    #[error("invalid cell reference {worksheet}!{cell}")]
    InvalidCell { worksheet: String, cell: String },
    #[error("missing required mapping value for {worksheet}!{cell} ({source_key})")]
    MissingRequired {
        worksheet: String,
        cell: String,
        source_key: String,
    },
    #[error("value for {worksheet}!{cell} ({source_key}) is not a scalar")]
    NonScalar {
        worksheet: String,
        cell: String,
        source_key: String,
    },
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
}

#[derive(Debug, Error)]
pub enum PackEngineError {
    #[error("unknown active pack: {0}")]
    UnknownPack(String),
    #[error("no enabled documents configured for pack {0}")]
    NoDocuments(String),
    #[error("missing xlsx template file for doc_type={doc_type}. Searched: {searched}")]
    MissingTemplate { doc_type: String, searched: String },
    #[error("unknown shipment: {0}")]
    UnknownShipment(String),
    #[error("unknown carton: {0}")]
    UnknownCarton(String),
    #[error("no generated documents for pack {0}")]
    NothingRendered(String),
    #[error("failed to read template {path}: {source}")]
    TemplateIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Pdf(#[from] PdfError),
    #[error(transparent)]
    Workbook(#[from] WorkbookError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to bundle spreadsheets: {0}")]
    Bundle(#[from] zip::result::ZipError),
}
