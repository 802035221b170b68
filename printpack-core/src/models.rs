//! Persistent records of the pack pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type DbId = i64;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageFormat {
    #[default]
    A4,
    A5,
}

impl PageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageFormat::A4 => "A4",
            PageFormat::A5 => "A5",
        }
    }
}

impl FromStr for PageFormat {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A4" => Ok(PageFormat::A4),
            "A5" => Ok(PageFormat::A5),
            _ => Err(UnknownVariant {
                kind: "page format",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackDefinition {
    pub id: DbId,
    pub code: String,
    pub name: String,
    pub active: bool,
    pub default_page_format: PageFormat,
    pub fallback_page_format: Option<PageFormat>,
}

/// A template file as stored on a document or a version.
#[derive(Clone, PartialEq, Eq)]
pub struct TemplateFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for TemplateFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDefinition {
    pub id: DbId,
    pub pack_id: DbId,
    pub pack_code: String,
    pub doc_type: String,
    pub variant: String,
    pub sequence: u32,
    pub enabled: bool,
    pub template: Option<TemplateFile>,
}

/// One binding from a payload source key to a worksheet cell (or a column of cells).
///
/// This is also the plain record form stored in version snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    pub worksheet_name: String,
    pub cell_ref: String,
    pub source_key: String,
    #[serde(default)]
    pub transform: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sequence: u32,
}

impl MappingRule {
    pub fn new(worksheet_name: &str, cell_ref: &str, source_key: &str) -> Self {
        Self {
            worksheet_name: worksheet_name.to_string(),
            cell_ref: cell_ref.to_string(),
            source_key: source_key.to_string(),
            transform: String::new(),
            required: false,
            sequence: 0,
        }
    }

    pub fn transform(mut self, transform: &str) -> Self {
        self.transform = transform.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }
}

/// A live mapping row of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellMapping {
    pub id: DbId,
    pub document_id: DbId,
    pub rule: MappingRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Generated,
    SyncPending,
    Synced,
    SyncFailed,
    /// Rendering stopped partway; items created so far are kept for diagnostics.
    GenerationFailed,
}

impl ArtifactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStatus::Generated => "generated",
            ArtifactStatus::SyncPending => "sync_pending",
            ArtifactStatus::Synced => "synced",
            ArtifactStatus::SyncFailed => "sync_failed",
            ArtifactStatus::GenerationFailed => "generation_failed",
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generated" => Ok(ArtifactStatus::Generated),
            "sync_pending" => Ok(ArtifactStatus::SyncPending),
            "synced" => Ok(ArtifactStatus::Synced),
            "sync_failed" => Ok(ArtifactStatus::SyncFailed),
            "generation_failed" => Ok(ArtifactStatus::GenerationFailed),
            _ => Err(UnknownVariant {
                kind: "artifact status",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedArtifact {
    pub id: DbId,
    pub pack_code: String,
    pub shipment_reference: Option<String>,
    pub carton_code: Option<String>,
    pub status: ArtifactStatus,
    pub pdf_filename: Option<String>,
    #[serde(skip)]
    pub pdf: Option<Vec<u8>>,
    pub checksum: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub remote_path: String,
    pub sync_attempts: u32,
    pub last_error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedArtifactItem {
    pub id: DbId,
    pub artifact_id: DbId,
    pub doc_type: String,
    pub variant: String,
    pub sequence: u32,
    pub xlsx_filename: String,
    #[serde(skip)]
    pub xlsx: Vec<u8>,
    pub pdf_filename: String,
    #[serde(skip)]
    pub pdf: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Save,
    Restore,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Save => "save",
            ChangeType::Restore => "restore",
        }
    }
}

impl FromStr for ChangeType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "save" => Ok(ChangeType::Save),
            "restore" => Ok(ChangeType::Restore),
            _ => Err(UnknownVariant {
                kind: "change type",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentVersion {
    pub id: DbId,
    pub document_id: DbId,
    pub version: u32,
    pub template: Option<TemplateFile>,
    pub mappings: Vec<MappingRule>,
    pub change_type: ChangeType,
    pub change_note: String,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}
