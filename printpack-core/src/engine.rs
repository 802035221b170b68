//! Pack orchestrator: pack definition → filled spreadsheets → PDFs → one merged artifact.
//!
//! [`PackEngine::generate_pack`] runs the whole pipeline for one request:
//!   - resolves the active pack and its enabled documents (optionally one variant);
//!   - looks up the shipment / carton payloads before anything is persisted;
//!   - creates the artifact (`generated`), then renders, converts and records every
//!     document in `(sequence, id)` order;
//!   - merges the PDFs (only when there is more than one) and stores the final PDF with
//!     its SHA-256 checksum, moving the artifact to `sync_pending`.
//!
//! Generation is not atomic. When a step fails after the artifact exists, the artifact
//! and the items created so far are kept, the artifact is marked `generation_failed`
//! with the error text, and the error is returned to the caller.
//!
//! [`PackEngine::render_pack_xlsx`] renders the same documents without conversion or
//! persistence. [`PackEngine::generate_pack_or_xlsx`] falls back to those spreadsheets
//! when conversion fails and `xlsx_fallback` is on: one document is served as is,
//! several are bundled into a zip.

use std::io::{Cursor, Write};
use std::path::PathBuf;

use chrono::{Local, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::EngineConfig;
use crate::contract::{PayloadProvider, PdfConverter, PdfMerger};
use crate::error::PackEngineError;
use crate::mapping;
use crate::models::{DocumentDefinition, GeneratedArtifact, GeneratedArtifactItem, PackDefinition};
use crate::payload::Value;
use crate::store::queries::{self, NewArtifact};
use crate::store::Store;
use crate::workbook::xlsx::XLSX_CONTENT_TYPE;
use crate::workbook::WorkbookFormat;

/// Documents of this type with the `all_labels` variant render once per shipment carton.
pub const DESTINATION_LABEL: &str = "destination_label";
pub const ALL_LABELS_VARIANT: &str = "all_labels";

#[derive(Debug, Clone, Default)]
pub struct PackRequest {
    pub pack_code: String,
    pub shipment: Option<String>,
    pub carton: Option<String>,
    pub variant: Option<String>,
    pub user: Option<String>,
}

impl PackRequest {
    pub fn new(pack_code: &str) -> Self {
        Self {
            pack_code: pack_code.to_string(),
            ..Default::default()
        }
    }

    pub fn shipment(mut self, reference: &str) -> Self {
        self.shipment = Some(reference.to_string());
        self
    }

    pub fn carton(mut self, code: &str) -> Self {
        self.carton = Some(code.to_string());
        self
    }

    pub fn variant(mut self, variant: &str) -> Self {
        self.variant = Some(variant.to_string());
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }
}

/// A rendered spreadsheet, not converted.
#[derive(Debug, Clone, PartialEq)]
pub struct XlsxDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub const ZIP_CONTENT_TYPE: &str = "application/zip";

/// Spreadsheets served instead of a PDF: the single xlsx, or a zip of several.
#[derive(Debug, Clone, PartialEq)]
pub struct XlsxBundle {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub enum PackOutput {
    Pdf(GeneratedArtifact),
    Xlsx(XlsxBundle),
}

/// One document passes through; several become `print-pack-{code}-{stamp}.zip`.
pub fn bundle_xlsx(
    pack_code: &str,
    mut documents: Vec<XlsxDocument>,
) -> Result<XlsxBundle, PackEngineError> {
    match documents.len() {
        0 => Err(PackEngineError::NothingRendered(pack_code.to_string())),
        1 => {
            let document = documents.remove(0);
            Ok(XlsxBundle {
                filename: document.filename,
                content_type: XLSX_CONTENT_TYPE,
                bytes: document.bytes,
            })
        }
        _ => {
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
            for document in &documents {
                writer.start_file(document.filename.as_str(), options)?;
                writer
                    .write_all(&document.bytes)
                    .map_err(zip::result::ZipError::from)?;
            }
            let bytes = writer.finish()?.into_inner();
            debug!(pack_code, files = documents.len(), bytes = bytes.len(), "[PACK][FALLBACK] spreadsheets zipped");
            Ok(XlsxBundle {
                filename: format!(
                    "print-pack-{}-{}.zip",
                    pack_code,
                    Utc::now().format("%Y%m%d%H%M%S")
                ),
                content_type: ZIP_CONTENT_TYPE,
                bytes,
            })
        }
    }
}

/// One render of one document.
struct RenderJob<'d> {
    document: &'d DocumentDefinition,
    carton: Option<Value>,
    /// `-n` when the document renders more than once, else empty.
    suffix: String,
}

impl RenderJob<'_> {
    fn stem(&self) -> String {
        format!(
            "{}-{}-{}{}",
            self.document.pack_code, self.document.doc_type, self.document.id, self.suffix
        )
    }
}

struct Plan {
    pack: PackDefinition,
    documents: Vec<DocumentDefinition>,
    shipment: Option<Value>,
    carton: Option<Value>,
}

pub struct PackEngine<'a> {
    pub store: &'a Store,
    pub format: &'a dyn WorkbookFormat,
    pub converter: &'a dyn PdfConverter,
    pub merger: &'a dyn PdfMerger,
    pub payloads: &'a dyn PayloadProvider,
    pub config: &'a EngineConfig,
}

impl<'a> PackEngine<'a> {
    pub async fn generate_pack(
        &self,
        request: &PackRequest,
    ) -> Result<GeneratedArtifact, PackEngineError> {
        info!(pack_code = %request.pack_code, shipment = ?request.shipment, carton = ?request.carton, "[PACK] generate_pack start");
        let plan = self.plan(request)?;
        let jobs = self.render_jobs(&plan, request)?;

        let artifact = self.store.with_conn(|conn| {
            queries::insert_artifact(
                conn,
                &NewArtifact {
                    pack_code: &plan.pack.code,
                    shipment_reference: request.shipment.as_deref(),
                    carton_code: request.carton.as_deref(),
                    created_by: request.user.as_deref(),
                    created_at: Utc::now(),
                },
            )
        })?;
        info!(artifact_id = artifact.id, jobs = jobs.len(), "[PACK] artifact created");

        match self.render_artifact(&artifact, &plan, &jobs).await {
            Ok(done) => {
                info!(artifact_id = done.id, checksum = %done.checksum, "[PACK] artifact ready for sync");
                Ok(done)
            }
            Err(err) => {
                error!(artifact_id = artifact.id, error = %err, "[PACK][ERROR] generation failed");
                let message = err.to_string();
                if let Err(mark_err) = self
                    .store
                    .with_conn(|conn| queries::mark_generation_failed(conn, artifact.id, &message))
                {
                    warn!(artifact_id = artifact.id, error = %mark_err, "[PACK] could not mark artifact as failed");
                }
                Err(err)
            }
        }
    }

    /// [`Self::generate_pack`], or the filled spreadsheets when conversion fails and the
    /// fallback is enabled. Any other failure is returned as is.
    pub async fn generate_pack_or_xlsx(
        &self,
        request: &PackRequest,
    ) -> Result<PackOutput, PackEngineError> {
        match self.generate_pack(request).await {
            Ok(artifact) => Ok(PackOutput::Pdf(artifact)),
            Err(PackEngineError::Conversion(err)) if self.config.xlsx_fallback => {
                warn!(pack_code = %request.pack_code, error = %err, "[PACK][FALLBACK] conversion failed, serving spreadsheets");
                let documents = self.render_pack_xlsx(request)?;
                Ok(PackOutput::Xlsx(bundle_xlsx(request.pack_code.trim(), documents)?))
            }
            Err(err) => Err(err),
        }
    }

    /// Renders every document of the pack to spreadsheet bytes.
    pub fn render_pack_xlsx(
        &self,
        request: &PackRequest,
    ) -> Result<Vec<XlsxDocument>, PackEngineError> {
        let plan = self.plan(request)?;
        let jobs = self.render_jobs(&plan, request)?;
        jobs.iter()
            .map(|job| {
                let bytes = self.render_document(job, &plan)?;
                Ok(XlsxDocument {
                    filename: format!("{}.xlsx", job.stem()),
                    bytes,
                })
            })
            .collect()
    }

    fn plan(&self, request: &PackRequest) -> Result<Plan, PackEngineError> {
        let variant = request
            .variant
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let (pack, documents) = self.store.with_conn(|conn| {
            let Some(pack) = queries::find_active_pack(conn, &request.pack_code)? else {
                return Err(PackEngineError::UnknownPack(request.pack_code.clone()));
            };
            let documents = queries::list_enabled_documents(conn, pack.id, variant)?;
            Ok((pack, documents))
        })?;
        if documents.is_empty() {
            return Err(PackEngineError::NoDocuments(pack.code));
        }

        let shipment = match request.shipment.as_deref() {
            Some(reference) => Some(
                self.payloads
                    .shipment(reference)
                    .ok_or_else(|| PackEngineError::UnknownShipment(reference.to_string()))?,
            ),
            None => None,
        };
        let carton = match request.carton.as_deref() {
            Some(code) => Some(
                self.payloads
                    .carton(code)
                    .ok_or_else(|| PackEngineError::UnknownCarton(code.to_string()))?,
            ),
            None => None,
        };
        debug!(pack_code = %pack.code, documents = documents.len(), "[PACK] plan resolved");
        Ok(Plan {
            pack,
            documents,
            shipment,
            carton,
        })
    }

    fn render_jobs<'p>(
        &self,
        plan: &'p Plan,
        request: &PackRequest,
    ) -> Result<Vec<RenderJob<'p>>, PackEngineError> {
        let mut jobs = Vec::new();
        for document in &plan.documents {
            let cartons = self.carton_targets(document, request)?;
            match cartons {
                Some(cartons) => {
                    let repeated = cartons.len() > 1;
                    for (index, carton) in cartons.into_iter().enumerate() {
                        jobs.push(RenderJob {
                            document,
                            carton: Some(carton),
                            suffix: if repeated {
                                format!("-{}", index + 1)
                            } else {
                                String::new()
                            },
                        });
                    }
                }
                None => jobs.push(RenderJob {
                    document,
                    carton: plan.carton.clone(),
                    suffix: String::new(),
                }),
            }
        }
        Ok(jobs)
    }

    /// Per-carton targets of an `all_labels` destination label; `None` for a single render.
    fn carton_targets(
        &self,
        document: &DocumentDefinition,
        request: &PackRequest,
    ) -> Result<Option<Vec<Value>>, PackEngineError> {
        if document.doc_type != DESTINATION_LABEL || document.variant != ALL_LABELS_VARIANT {
            return Ok(None);
        }
        let Some(reference) = request.shipment.as_deref() else {
            return Ok(None);
        };
        let codes = self.payloads.shipment_carton_codes(reference);
        if codes.is_empty() {
            return Ok(None);
        }
        codes
            .iter()
            .map(|code| self.carton_payload(code))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    fn carton_payload(&self, code: &str) -> Result<Value, PackEngineError> {
        self.payloads
            .carton(code)
            .ok_or_else(|| PackEngineError::UnknownCarton(code.to_string()))
    }

    async fn render_artifact(
        &self,
        artifact: &GeneratedArtifact,
        plan: &Plan,
        jobs: &[RenderJob<'_>],
    ) -> Result<GeneratedArtifact, PackEngineError> {
        let timeout = self.config.conversion_timeout();
        let mut pdfs = Vec::with_capacity(jobs.len());

        for job in jobs {
            let stem = job.stem();
            let xlsx_filename = format!("{stem}.xlsx");
            let pdf_filename = format!("{stem}.pdf");
            let xlsx = self.render_document(job, plan)?;
            info!(document_id = job.document.id, doc_type = %job.document.doc_type, file = %xlsx_filename, "[PACK][CONVERT] converting document");
            let pdf = self
                .converter
                .convert_to_pdf(&xlsx, &xlsx_filename, timeout)
                .await?;

            let item = GeneratedArtifactItem {
                id: 0,
                artifact_id: artifact.id,
                doc_type: job.document.doc_type.clone(),
                variant: job.document.variant.clone(),
                sequence: job.document.sequence,
                xlsx_filename,
                xlsx,
                pdf_filename,
                pdf,
            };
            self.store
                .with_conn(|conn| queries::insert_artifact_item(conn, &item))?;
            pdfs.push(item.pdf);
        }

        let merged = match pdfs.as_slice() {
            [] => return Err(PackEngineError::NothingRendered(plan.pack.code.clone())),
            [single] => single.clone(),
            many => self.merger.merge(many)?,
        };

        let filename = format!(
            "print-pack-{}-{}.pdf",
            plan.pack.code,
            Utc::now().format("%Y%m%d%H%M%S")
        );
        let checksum = format!("{:x}", Sha256::digest(&merged));
        let finished = self.store.with_conn(|conn| {
            queries::finalize_artifact(conn, artifact.id, &filename, &merged, &checksum)
        })?;
        Ok(finished)
    }

    fn render_document(&self, job: &RenderJob<'_>, plan: &Plan) -> Result<Vec<u8>, PackEngineError> {
        let document = job.document;
        let template = self.load_template(document)?;
        let rules: Vec<_> = self
            .store
            .with_conn(|conn| queries::list_mappings(conn, document.id))?
            .into_iter()
            .map(|mapping| mapping.rule)
            .collect();
        let payload = build_payload(plan.shipment.as_ref(), job.carton.as_ref(), document);

        let mut workbook = self.format.open(&template)?;
        mapping::fill(workbook.as_mut(), &rules, &payload)?;
        debug!(document_id = document.id, rules = rules.len(), "[PACK] document filled");
        Ok(workbook.to_bytes()?)
    }

    /// Stored template bytes, else `{pack}__{doc_type}__{variant}.xlsx` from the search dirs.
    fn load_template(&self, document: &DocumentDefinition) -> Result<Vec<u8>, PackEngineError> {
        if let Some(template) = &document.template {
            return Ok(template.bytes.clone());
        }

        let mut searched: Vec<PathBuf> = Vec::new();
        if let Some(name) = template_filename(document) {
            for dir in &self.config.template_dirs {
                let candidate = dir.join(&name);
                searched.push(candidate.clone());
                if candidate.is_file() {
                    return std::fs::read(&candidate).map_err(|source| PackEngineError::TemplateIo {
                        path: candidate.display().to_string(),
                        source,
                    });
                }
            }
        }
        let searched = if searched.is_empty() {
            "none".to_string()
        } else {
            searched
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        Err(PackEngineError::MissingTemplate {
            doc_type: document.doc_type.clone(),
            searched,
        })
    }
}

/// `{pack}__{doc_type}__{variant}.xlsx`, or `None` when any part is blank.
pub fn template_filename(document: &DocumentDefinition) -> Option<String> {
    let pack = document.pack_code.trim();
    let doc_type = document.doc_type.trim();
    let variant = document.variant.trim();
    if pack.is_empty() || doc_type.is_empty() || variant.is_empty() {
        return None;
    }
    Some(format!("{pack}__{doc_type}__{variant}.xlsx"))
}

/// `{shipment, carton, document: {doc_type, variant, generated_on}}`.
pub fn build_payload(
    shipment: Option<&Value>,
    carton: Option<&Value>,
    document: &DocumentDefinition,
) -> Value {
    Value::record([
        (
            "shipment",
            shipment.cloned().unwrap_or_else(Value::empty_record),
        ),
        ("carton", carton.cloned().unwrap_or_else(Value::empty_record)),
        (
            "document",
            Value::record([
                ("doc_type", Value::from(document.doc_type.as_str())),
                ("variant", Value::from(document.variant.as_str())),
                ("generated_on", Value::from(Local::now().date_naive())),
            ]),
        ),
    ])
}
