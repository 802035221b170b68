/// # printpack CLI
///
/// Command parsing and wiring for the `printpack` binary. Every command loads the YAML
/// config, opens the SQLite store and hands over to `printpack-core`; no business logic
/// lives here.
///
/// - [`Cli`] / [`Commands`] define the user-facing surface.
/// - [`run`] is the async entrypoint shared by `main` and the integration tests.
///
/// Command results are printed to stdout as JSON, logs go through `tracing`.
use crate::load_config::{load_config, CliConfig};
use crate::payload_file::JsonPayloadProvider;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use printpack_core::catalog::{import_catalog, PackCatalog};
use printpack_core::engine::{bundle_xlsx, PackEngine, PackOutput, PackRequest};
use printpack_core::graph::GraphClient;
use printpack_core::models::ChangeType;
use printpack_core::pdf::LopdfMerger;
use printpack_core::routing::resolve_pack_request;
use printpack_core::store::Store;
use printpack_core::sync_queue::{process_queue, QueueOptions};
use printpack_core::versions;
use printpack_core::workbook::xlsx::XlsxFormat;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Generate print packs from spreadsheet templates and sync them to the remote drive.
#[derive(Parser)]
#[clap(name = "printpack", version, about = "Generate document packs and sync them to the drive")]
pub struct Cli {
    /// Path to the YAML config file
    #[clap(long, global = true, default_value = "printpack.yaml")]
    pub config: PathBuf,
    #[clap(subcommand)]
    pub command: Commands,
}

/// What to render: a pack by code, or the pack routed from a business document type.
#[derive(clap::Args, Debug, Clone)]
pub struct PackArgs {
    /// Pack code (A, B, C, D, ...)
    #[clap(long, required_unless_present = "doc_type")]
    pub pack: Option<String>,
    /// Business document type, resolved to its pack and variant
    #[clap(long, conflicts_with = "pack")]
    pub doc_type: Option<String>,
    #[clap(long)]
    pub variant: Option<String>,
    #[clap(long)]
    pub shipment: Option<String>,
    #[clap(long)]
    pub carton: Option<String>,
    /// JSON file with shipment and carton payloads
    #[clap(long)]
    pub payloads: PathBuf,
    #[clap(long)]
    pub user: Option<String>,
}

impl PackArgs {
    fn request(&self) -> Result<PackRequest> {
        let mut request = match (&self.pack, &self.doc_type) {
            (Some(code), _) => PackRequest::new(code.trim()),
            (None, Some(doc_type)) => match resolve_pack_request(doc_type) {
                Some(route) => route.request(),
                None => bail!("no pack prints document type {doc_type:?}"),
            },
            (None, None) => bail!("either --pack or --doc-type is required"),
        };
        if let Some(variant) = &self.variant {
            request = request.variant(variant);
        }
        if let Some(reference) = &self.shipment {
            request = request.shipment(reference);
        }
        if let Some(code) = &self.carton {
            request = request.carton(code);
        }
        if let Some(user) = &self.user {
            request = request.user(user);
        }
        Ok(request)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import packs, documents, templates and mappings from a YAML catalog
    ImportCatalog {
        #[clap(long)]
        catalog: PathBuf,
        #[clap(long)]
        user: Option<String>,
    },
    /// Generate one pack artifact and queue it for sync
    Generate {
        #[clap(flatten)]
        pack: PackArgs,
        /// Where the spreadsheet fallback is written when conversion fails
        #[clap(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Render the filled spreadsheets of a pack into a directory, without conversion
    RenderXlsx {
        #[clap(flatten)]
        pack: PackArgs,
        #[clap(long)]
        out_dir: PathBuf,
        /// Write one file: the single spreadsheet, or a zip of all of them
        #[clap(long)]
        bundle: bool,
    },
    /// Upload pending artifacts to the drive
    ProcessQueue {
        #[clap(long)]
        limit: Option<usize>,
        #[clap(long)]
        include_failed: bool,
        #[clap(long)]
        max_attempts: Option<u32>,
        #[clap(long)]
        timeout_secs: Option<u64>,
    },
    /// Snapshot a document's current template and mappings
    Snapshot {
        #[clap(long)]
        document: i64,
        #[clap(long, default_value = "")]
        note: String,
        #[clap(long)]
        user: Option<String>,
    },
    /// Restore a document version as a new version
    Restore {
        #[clap(long)]
        version: i64,
        #[clap(long, default_value = "")]
        note: String,
        #[clap(long)]
        user: Option<String>,
    },
    /// List the versions of a document, newest first
    Versions {
        #[clap(long)]
        document: i64,
    },
}

fn open_store(config: &CliConfig) -> Result<Store> {
    Store::open_path(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))
}

fn write_file(out_dir: &Path, filename: &str, bytes: &[u8]) -> Result<String> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("Failed to create {out_dir:?}"))?;
    let path = out_dir.join(filename);
    std::fs::write(&path, bytes).with_context(|| format!("Failed to write {path:?}"))?;
    Ok(path.display().to_string())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    let config = load_config(&cli.config)?;
    let store = open_store(&config)?;

    match cli.command {
        Commands::ImportCatalog { catalog, user } => {
            tracing::info!(command = "import-catalog", catalog = ?catalog, "Importing catalog");
            let parsed = PackCatalog::from_path(&catalog)?;
            let base_dir = catalog.parent().unwrap_or_else(|| Path::new("."));
            let report = import_catalog(&store, &parsed, base_dir, user.as_deref())?;
            print_json(&report)
        }
        Commands::Generate { pack, out_dir } => {
            let request = pack.request()?;
            tracing::info!(command = "generate", pack_code = %request.pack_code, "Generating pack");
            let payloads = JsonPayloadProvider::from_path(&pack.payloads)?;
            let graph = GraphClient::new(config.graph.clone());
            let engine = PackEngine {
                store: &store,
                format: &XlsxFormat,
                converter: &graph,
                merger: &LopdfMerger,
                payloads: &payloads,
                config: &config.engine,
            };
            match engine.generate_pack_or_xlsx(&request).await {
                Ok(PackOutput::Pdf(artifact)) => {
                    tracing::info!(command = "generate", artifact_id = artifact.id, "Pack generated");
                    print_json(&artifact)
                }
                Ok(PackOutput::Xlsx(bundle)) => {
                    let path = write_file(&out_dir, &bundle.filename, &bundle.bytes)?;
                    tracing::warn!(command = "generate", file = %path, "Conversion failed, spreadsheets written instead");
                    print_json(&json!({
                        "fallback": "xlsx",
                        "file": path,
                        "content_type": bundle.content_type,
                    }))
                }
                Err(e) => {
                    tracing::error!(command = "generate", error = %e, "Pack generation failed");
                    Err(e.into())
                }
            }
        }
        Commands::RenderXlsx {
            pack,
            out_dir,
            bundle,
        } => {
            let request = pack.request()?;
            tracing::info!(command = "render-xlsx", pack_code = %request.pack_code, out_dir = ?out_dir, "Rendering spreadsheets");
            let payloads = JsonPayloadProvider::from_path(&pack.payloads)?;
            let graph = GraphClient::new(config.graph.clone());
            let engine = PackEngine {
                store: &store,
                format: &XlsxFormat,
                converter: &graph,
                merger: &LopdfMerger,
                payloads: &payloads,
                config: &config.engine,
            };
            let documents = engine.render_pack_xlsx(&request)?;
            let written = if bundle {
                let bundled = bundle_xlsx(request.pack_code.trim(), documents)?;
                vec![write_file(&out_dir, &bundled.filename, &bundled.bytes)?]
            } else {
                documents
                    .iter()
                    .map(|document| write_file(&out_dir, &document.filename, &document.bytes))
                    .collect::<Result<Vec<_>>>()?
            };
            print_json(&json!({ "files": written }))
        }
        Commands::ProcessQueue {
            limit,
            include_failed,
            max_attempts,
            timeout_secs,
        } => {
            let options = QueueOptions {
                limit: Some(limit.unwrap_or(config.sync.limit)),
                include_failed,
                max_attempts: Some(max_attempts.unwrap_or(config.sync.max_attempts)),
                timeout: Some(Duration::from_secs(
                    timeout_secs.unwrap_or(config.sync.timeout_secs),
                )),
                work_dir: config.sync.work_dir.clone(),
            };
            tracing::info!(command = "process-queue", ?options, "Processing sync queue");
            let graph = GraphClient::new(config.graph.clone());
            let report = process_queue(&store, &graph, &options).await?;
            tracing::info!(command = "process-queue", ?report, "Sync queue processed");
            print_json(&report)
        }
        Commands::Snapshot {
            document,
            note,
            user,
        } => {
            let version =
                versions::save_snapshot(&store, document, user.as_deref(), ChangeType::Save, &note)?;
            print_json(&json!({ "id": version.id, "version": version.version }))
        }
        Commands::Restore {
            version,
            note,
            user,
        } => {
            let restored = versions::restore_version(&store, version, user.as_deref(), &note)?;
            print_json(&json!({
                "id": restored.id,
                "version": restored.version,
                "change_type": restored.change_type,
            }))
        }
        Commands::Versions { document } => {
            let list: Vec<_> = versions::list_versions(&store, document)?
                .into_iter()
                .map(|v| {
                    json!({
                        "id": v.id,
                        "version": v.version,
                        "change_type": v.change_type,
                        "change_note": v.change_note,
                        "created_by": v.created_by,
                        "created_at": v.created_at,
                        "template": v.template.map(|t| t.name),
                        "mappings": v.mappings.len(),
                    })
                })
                .collect();
            print_json(&list)
        }
    }
}
