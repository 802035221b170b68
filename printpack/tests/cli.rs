use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{layer::Context, Layer, Registry};

/// Custom Layer to collect emitted event messages.
struct EventCollector {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.events.lock().unwrap().push(format!("{event:?}"));
    }
}

fn write_template(path: &Path) {
    let mut book = umya_spreadsheet::new_file();
    book.get_sheet_by_name_mut("Sheet1")
        .unwrap()
        .get_cell_mut("A1")
        .set_value_string("Packing list");
    umya_spreadsheet::writer::xlsx::write(&book, path).unwrap();
}

/// A workspace with a config, a one-pack catalog and a payload file.
fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("templates")).unwrap();
    write_template(&dir.path().join("templates/packing.xlsx"));
    write(
        dir.path().join("printpack.yaml"),
        format!(
            "database_path: {}\n",
            dir.path().join("packs.sqlite3").display()
        ),
    )
    .unwrap();
    write(
        dir.path().join("catalog.yaml"),
        r#"
packs:
  - code: B
    name: Shipment pack
    documents:
      - doc_type: packing_list_shipment
        variant: shipment
        template: templates/packing.xlsx
        mappings:
          - { worksheet_name: Sheet1, cell_ref: B2, source_key: shipment.reference, required: true }
          - { worksheet_name: Sheet1, cell_ref: A10, source_key: "shipment.items[].product_name" }
"#,
    )
    .unwrap();
    write(
        dir.path().join("payloads.json"),
        r#"{ "shipments": { "SHP-1": { "reference": "SHP-1", "items": [ { "product_name": "Gloves" }, { "product_name": "Masks" } ] } } }"#,
    )
    .unwrap();
    dir
}

fn printpack(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("printpack").expect("Binary exists");
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(dir.path().join("printpack.yaml"));
    cmd
}

#[test]
fn help_lists_the_commands() {
    Command::cargo_bin("printpack")
        .expect("Binary exists")
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("import-catalog")
                .and(predicate::str::contains("generate"))
                .and(predicate::str::contains("process-queue"))
                .and(predicate::str::contains("restore")),
        );
}

#[test]
fn catalog_import_and_version_history() {
    let dir = workspace();
    printpack(&dir)
        .arg("import-catalog")
        .arg("--catalog")
        .arg(dir.path().join("catalog.yaml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"versions\": 1"));

    printpack(&dir)
        .args(["snapshot", "--document", "1", "--note", "manual"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\": 2"));

    printpack(&dir)
        .args(["restore", "--version", "1", "--user", "ops"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\": 3").and(predicate::str::contains("restore")));

    printpack(&dir)
        .args(["versions", "--document", "1"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("catalog import")
                .and(predicate::str::contains("manual"))
                .and(predicate::str::contains("B__packing_list_shipment__shipment__v3.xlsx")),
        );

    printpack(&dir)
        .args(["snapshot", "--document", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown document"));
}

#[test]
fn render_xlsx_routes_document_type_and_fills_cells() {
    let dir = workspace();
    printpack(&dir)
        .arg("import-catalog")
        .arg("--catalog")
        .arg(dir.path().join("catalog.yaml"))
        .assert()
        .success();

    let out_dir = dir.path().join("out");
    printpack(&dir)
        .args(["render-xlsx", "--doc-type", "packing_list_shipment", "--shipment", "SHP-1"])
        .arg("--payloads")
        .arg(dir.path().join("payloads.json"))
        .arg("--out-dir")
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("B-packing_list_shipment-1.xlsx"));

    let book =
        umya_spreadsheet::reader::xlsx::read(out_dir.join("B-packing_list_shipment-1.xlsx")).unwrap();
    let sheet = book.get_sheet_by_name("Sheet1").unwrap();
    assert_eq!(sheet.get_value("B2"), "SHP-1");
    assert_eq!(sheet.get_value("A11"), "Masks");
    assert_eq!(sheet.get_value("A1"), "Packing list");
}

#[test]
fn generate_rejects_unknown_document_type() {
    let dir = workspace();
    printpack(&dir)
        .args(["generate", "--doc-type", "invoice"])
        .arg("--payloads")
        .arg(dir.path().join("payloads.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no pack prints document type"));
}

#[test]
fn process_queue_with_empty_queue_needs_no_drive() {
    let dir = workspace();
    printpack(&dir)
        .arg("process-queue")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"selected\": 0"));
}

#[tokio::test]
async fn emits_trace_initialised_event() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    use printpack::cli::{run, Cli, Commands};

    let cli = Cli {
        config: std::path::PathBuf::from("dummy.yaml"),
        command: Commands::Versions { document: 1 },
    };

    let _ = run(cli).await;

    let event_msgs = events.lock().unwrap();
    assert!(
        event_msgs.iter().any(|msg| msg.contains("trace_initialised")),
        "Expected a 'trace_initialised' trace event, got: {:?}",
        event_msgs
    );
}

const GRAPH_ENV: [&str; 4] = [
    "GRAPH_TENANT_ID",
    "GRAPH_CLIENT_ID",
    "GRAPH_CLIENT_SECRET",
    "GRAPH_DRIVE_ID",
];

/// The shipment pack with a second document, imported.
fn two_document_workspace(xlsx_fallback: bool) -> TempDir {
    let dir = workspace();
    write(
        dir.path().join("printpack.yaml"),
        format!(
            "database_path: {}\nengine:\n  xlsx_fallback: {xlsx_fallback}\n",
            dir.path().join("packs.sqlite3").display()
        ),
    )
    .unwrap();
    write(
        dir.path().join("catalog.yaml"),
        r#"
packs:
  - code: B
    name: Shipment pack
    documents:
      - doc_type: packing_list_shipment
        variant: shipment
        sequence: 1
        template: templates/packing.xlsx
        mappings:
          - { worksheet_name: Sheet1, cell_ref: B2, source_key: shipment.reference }
      - doc_type: donation_certificate
        variant: shipment
        sequence: 2
        template: templates/packing.xlsx
        mappings:
          - { worksheet_name: Sheet1, cell_ref: C3, source_key: shipment.reference }
"#,
    )
    .unwrap();
    printpack(&dir)
        .arg("import-catalog")
        .arg("--catalog")
        .arg(dir.path().join("catalog.yaml"))
        .assert()
        .success();
    dir
}

fn zip_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

fn single_file(dir: &Path) -> std::path::PathBuf {
    let entries: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1, "expected one file in {dir:?}, got {entries:?}");
    entries.into_iter().next().unwrap()
}

#[test]
fn render_xlsx_bundle_zips_every_document() {
    let dir = two_document_workspace(false);
    let out_dir = dir.path().join("bundle");
    printpack(&dir)
        .args(["render-xlsx", "--pack", "B", "--shipment", "SHP-1", "--bundle"])
        .arg("--payloads")
        .arg(dir.path().join("payloads.json"))
        .arg("--out-dir")
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("print-pack-B-").and(predicate::str::contains(".zip")));

    let zip = single_file(&out_dir);
    assert_eq!(
        zip_entries(&zip),
        vec![
            "B-donation_certificate-2.xlsx".to_string(),
            "B-packing_list_shipment-1.xlsx".to_string(),
        ]
    );
}

#[test]
fn generate_falls_back_to_spreadsheets_when_conversion_fails() {
    let dir = two_document_workspace(true);
    let out_dir = dir.path().join("fallback");
    let mut cmd = printpack(&dir);
    for key in GRAPH_ENV {
        cmd.env_remove(key);
    }
    cmd.args(["generate", "--pack", "B", "--shipment", "SHP-1"])
        .arg("--payloads")
        .arg(dir.path().join("payloads.json"))
        .arg("--out-dir")
        .arg(&out_dir)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"fallback\": \"xlsx\"")
                .and(predicate::str::contains("application/zip")),
        );

    let zip = single_file(&out_dir);
    assert_eq!(zip_entries(&zip).len(), 2);
}

#[test]
fn generate_without_fallback_reports_the_conversion_error() {
    let dir = two_document_workspace(false);
    let mut cmd = printpack(&dir);
    for key in GRAPH_ENV {
        cmd.env_remove(key);
    }
    cmd.args(["generate", "--pack", "B", "--shipment", "SHP-1"])
        .arg("--payloads")
        .arg(dir.path().join("payloads.json"))
        .arg("--out-dir")
        .arg(dir.path().join("unused"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing Microsoft Graph credentials"));
    assert!(!dir.path().join("unused").exists());
}
