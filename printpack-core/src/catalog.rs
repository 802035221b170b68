//! Pack catalog: YAML description of packs, their documents and cell mappings.
//!
//! Importing a catalog upserts packs by code and documents by `(pack, doc_type, variant)`,
//! then records each document's template and mapping set as a versioned edit. A document
//! whose template and mappings already match the catalog keeps its history untouched.
//! Documents of an imported pack that the catalog no longer lists are disabled.
//!
//! ```yaml
//! packs:
//!   - code: B
//!     name: Shipment pack
//!     documents:
//!       - doc_type: packing_list_shipment
//!         variant: shipment
//!         sequence: 1
//!         template: templates/B__packing_list_shipment__shipment.xlsx
//!         mappings:
//!           - { worksheet_name: Sheet1, cell_ref: B2, source_key: shipment.reference, required: true }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{DbId, DocumentDefinition, MappingRule, PageFormat, TemplateFile};
use crate::store::queries::{self, NewDocument, NewPack};
use crate::store::{Store, StoreError};
use crate::versions::{self, DocumentEdit, VersionError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("pack code must not be empty")]
    EmptyPackCode,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Version(#[from] VersionError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackCatalog {
    #[serde(default)]
    pub packs: Vec<CatalogPack>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogPack {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub default_page_format: PageFormat,
    #[serde(default)]
    pub fallback_page_format: Option<PageFormat>,
    #[serde(default)]
    pub documents: Vec<CatalogDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub doc_type: String,
    #[serde(default)]
    pub variant: String,
    #[serde(default = "default_sequence")]
    pub sequence: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Relative to the catalog's directory.
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub mappings: Vec<MappingRule>,
}

fn default_true() -> bool {
    true
}

fn default_sequence() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub packs: usize,
    pub documents: usize,
    pub versions: usize,
    /// Documents already matching the catalog, left without a new version.
    pub unchanged: usize,
    /// Documents no longer listed in their pack, now disabled.
    pub disabled: usize,
}

impl PackCatalog {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }
}

fn read_template(base_dir: &Path, relative: &Path) -> Result<TemplateFile, CatalogError> {
    let path = base_dir.join(relative);
    let bytes = std::fs::read(&path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "template.xlsx".to_string());
    Ok(TemplateFile { name, bytes })
}

/// Whether applying the catalog entry would change the live document.
fn differs_from_live(
    store: &Store,
    live: &DocumentDefinition,
    template: Option<&TemplateFile>,
    mappings: &[MappingRule],
) -> Result<bool, CatalogError> {
    if template.is_some_and(|t| live.template.as_ref() != Some(t)) {
        return Ok(true);
    }
    let mut wanted = versions::normalize_rules(mappings);
    wanted.sort_by_key(|rule| rule.sequence);
    let (current, next_version) = store.with_conn(|conn| {
        let current: Vec<MappingRule> = queries::list_mappings(conn, live.id)?
            .into_iter()
            .map(|m| m.rule)
            .collect();
        Ok::<_, StoreError>((current, queries::next_version_number(conn, live.id)?))
    })?;
    // A document without history always gets its first version.
    Ok(next_version == 1 || current != wanted)
}

pub fn import_catalog(
    store: &Store,
    catalog: &PackCatalog,
    base_dir: &Path,
    user: Option<&str>,
) -> Result<ImportReport, CatalogError> {
    let mut report = ImportReport::default();
    for pack in &catalog.packs {
        let code = pack.code.trim();
        if code.is_empty() {
            return Err(CatalogError::EmptyPackCode);
        }
        let name = if pack.name.trim().is_empty() {
            code
        } else {
            pack.name.trim()
        };
        let stored_pack = store.with_conn(|conn| {
            queries::upsert_pack(
                conn,
                &NewPack {
                    code,
                    name,
                    active: pack.active,
                    default_page_format: pack.default_page_format,
                    fallback_page_format: pack.fallback_page_format,
                },
            )
        })?;
        report.packs += 1;
        info!(pack_code = %stored_pack.code, documents = pack.documents.len(), "[CATALOG] pack imported");

        let mut listed: Vec<DbId> = Vec::with_capacity(pack.documents.len());
        for document in &pack.documents {
            let template = document
                .template
                .as_deref()
                .map(|relative| read_template(base_dir, relative))
                .transpose()?;
            let stored_doc = store.with_conn(|conn| {
                queries::upsert_document(
                    conn,
                    &NewDocument {
                        pack_id: stored_pack.id,
                        doc_type: document.doc_type.trim(),
                        variant: document.variant.trim(),
                        sequence: document.sequence,
                        enabled: document.enabled,
                    },
                )
            })?;
            report.documents += 1;
            listed.push(stored_doc.id);

            if !differs_from_live(store, &stored_doc, template.as_ref(), &document.mappings)? {
                report.unchanged += 1;
                debug!(document_id = stored_doc.id, "[CATALOG] document unchanged");
                continue;
            }
            let edit = DocumentEdit {
                template: template.map(Some),
                mappings: Some(document.mappings.clone()),
            };
            let version = versions::save_document_edit(
                store,
                stored_doc.id,
                &edit,
                user,
                "catalog import",
            )?;
            report.versions += 1;
            debug!(document_id = stored_doc.id, version = version.version, "[CATALOG] document versioned");
        }

        let dropped = store.with_conn(|conn| {
            let mut dropped = Vec::new();
            for existing in queries::list_pack_documents(conn, stored_pack.id)? {
                if existing.enabled && !listed.contains(&existing.id) {
                    queries::set_document_enabled(conn, existing.id, false)?;
                    dropped.push(existing);
                }
            }
            Ok::<_, StoreError>(dropped)
        })?;
        for existing in &dropped {
            warn!(pack_code = %stored_pack.code, document_id = existing.id, doc_type = %existing.doc_type, variant = %existing.variant, "[CATALOG] document no longer listed, disabled");
        }
        report.disabled += dropped.len();
    }
    Ok(report)
}
