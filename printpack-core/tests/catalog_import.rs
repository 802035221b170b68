mod common;

use printpack_core::catalog::{import_catalog, CatalogError, ImportReport, PackCatalog};
use printpack_core::models::PageFormat;
use printpack_core::store::queries;
use printpack_core::versions::list_versions;

use common::{store, template};

const CATALOG: &str = r#"
packs:
  - code: B
    name: Shipment pack
    default_page_format: A5
    documents:
      - doc_type: packing_list_shipment
        variant: shipment
        sequence: 1
        template: templates/packing.xlsx
        mappings:
          - { worksheet_name: Sheet1, cell_ref: B2, source_key: shipment.reference, required: true }
          - { worksheet_name: Sheet1, cell_ref: A10, source_key: "shipment.items[].product_name" }
      - doc_type: donation_certificate
        variant: shipment
        sequence: 2
  - code: D
    active: false
"#;

fn write_catalog(dir: &std::path::Path) {
    std::fs::create_dir_all(dir.join("templates")).unwrap();
    std::fs::write(dir.join("templates/packing.xlsx"), template(&["Sheet1"])).unwrap();
    std::fs::write(dir.join("catalog.yaml"), CATALOG).unwrap();
}

#[test]
fn import_creates_packs_documents_and_versions() {
    let dir = tempfile::tempdir().unwrap();
    write_catalog(dir.path());
    let store = store();
    let catalog = PackCatalog::from_path(&dir.path().join("catalog.yaml")).unwrap();

    let report = import_catalog(&store, &catalog, dir.path(), Some("ops")).unwrap();
    assert_eq!(
        report,
        ImportReport {
            packs: 2,
            documents: 2,
            versions: 2,
            unchanged: 0,
            disabled: 0,
        }
    );

    let (pack, inactive) = store
        .with_conn(|conn| Ok::<_, printpack_core::store::StoreError>((
            queries::get_pack_by_code(conn, "B")?.unwrap(),
            queries::get_pack_by_code(conn, "D")?.unwrap(),
        )))
        .unwrap();
    assert_eq!(pack.name, "Shipment pack");
    assert_eq!(pack.default_page_format, PageFormat::A5);
    assert_eq!(inactive.name, "D");
    assert!(!inactive.active);

    let documents = store
        .with_conn(|conn| queries::list_enabled_documents(conn, pack.id, None))
        .unwrap();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].doc_type, "packing_list_shipment");
    assert_eq!(
        documents[0].template.as_ref().map(|t| t.name.as_str()),
        Some("packing.xlsx")
    );
    assert!(documents[1].template.is_none());

    let mappings = store
        .with_conn(|conn| queries::list_mappings(conn, documents[0].id))
        .unwrap();
    assert_eq!(mappings.len(), 2);
    assert!(mappings[0].rule.required);
    assert_eq!(mappings[1].rule.sequence, 2);

    let versions = list_versions(&store, documents[0].id).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].change_note, "catalog import");
    assert_eq!(versions[0].created_by.as_deref(), Some("ops"));
}

fn documents_of(store: &printpack_core::store::Store, code: &str) -> Vec<printpack_core::models::DocumentDefinition> {
    store
        .with_conn(|conn| {
            let pack = queries::get_pack_by_code(conn, code)?.unwrap();
            queries::list_pack_documents(conn, pack.id)
        })
        .unwrap()
}

#[test]
fn unchanged_reimport_adds_no_version() {
    let dir = tempfile::tempdir().unwrap();
    write_catalog(dir.path());
    let store = store();
    let catalog = PackCatalog::from_path(&dir.path().join("catalog.yaml")).unwrap();
    import_catalog(&store, &catalog, dir.path(), None).unwrap();
    let report = import_catalog(&store, &catalog, dir.path(), None).unwrap();
    assert_eq!(
        report,
        ImportReport {
            packs: 2,
            documents: 2,
            versions: 0,
            unchanged: 2,
            disabled: 0,
        }
    );

    let documents = documents_of(&store, "B");
    assert_eq!(documents.len(), 2);
    for document in &documents {
        let versions = list_versions(&store, document.id).unwrap();
        assert_eq!(versions.iter().map(|v| v.version).collect::<Vec<_>>(), vec![1]);
    }
    let mappings = store
        .with_conn(|conn| queries::list_mappings(conn, documents[0].id))
        .unwrap();
    assert_eq!(mappings.len(), 2);
}

#[test]
fn changed_mappings_or_template_add_a_version() {
    let dir = tempfile::tempdir().unwrap();
    write_catalog(dir.path());
    let store = store();
    let catalog = PackCatalog::from_path(&dir.path().join("catalog.yaml")).unwrap();
    import_catalog(&store, &catalog, dir.path(), None).unwrap();

    let edited = CATALOG.replace("cell_ref: B2", "cell_ref: C2");
    let catalog = PackCatalog::from_yaml_str(&edited).unwrap();
    let report = import_catalog(&store, &catalog, dir.path(), Some("ops")).unwrap();
    assert_eq!((report.versions, report.unchanged), (1, 1));

    let packing_list = documents_of(&store, "B")[0].clone();
    let versions = list_versions(&store, packing_list.id).unwrap();
    assert_eq!(versions.iter().map(|v| v.version).collect::<Vec<_>>(), vec![2, 1]);
    assert_eq!(versions[0].mappings[0].cell_ref, "C2");

    std::fs::write(dir.path().join("templates/packing.xlsx"), template(&["Sheet1", "Notes"])).unwrap();
    let report = import_catalog(&store, &catalog, dir.path(), None).unwrap();
    assert_eq!((report.versions, report.unchanged), (1, 1));
    assert_eq!(list_versions(&store, packing_list.id).unwrap().len(), 3);
}

#[test]
fn documents_dropped_from_the_catalog_are_disabled() {
    let dir = tempfile::tempdir().unwrap();
    write_catalog(dir.path());
    let store = store();
    let catalog = PackCatalog::from_path(&dir.path().join("catalog.yaml")).unwrap();
    import_catalog(&store, &catalog, dir.path(), None).unwrap();

    let trimmed = PackCatalog::from_yaml_str(
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
          - { worksheet_name: Sheet1, cell_ref: B2, source_key: shipment.reference, required: true }
          - { worksheet_name: Sheet1, cell_ref: A10, source_key: "shipment.items[].product_name" }
"#,
    )
    .unwrap();
    let report = import_catalog(&store, &trimmed, dir.path(), None).unwrap();
    assert_eq!(report.disabled, 1);
    assert_eq!(report.unchanged, 1);

    let documents = documents_of(&store, "B");
    assert_eq!(documents.len(), 2);
    let certificate = documents
        .iter()
        .find(|d| d.doc_type == "donation_certificate")
        .unwrap();
    assert!(!certificate.enabled);
    assert_eq!(list_versions(&store, certificate.id).unwrap().len(), 1);

    let pack = store
        .with_conn(|conn| queries::get_pack_by_code(conn, "B"))
        .unwrap()
        .unwrap();
    let enabled = store
        .with_conn(|conn| queries::list_enabled_documents(conn, pack.id, None))
        .unwrap();
    assert_eq!(enabled.len(), 1);

    // Listing it again brings it back.
    let report = import_catalog(&store, &catalog, dir.path(), None).unwrap();
    assert_eq!(report.disabled, 0);
    assert!(documents_of(&store, "B").iter().all(|d| d.enabled));
}

#[test]
fn missing_template_file_and_empty_code_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = store();
    let catalog = PackCatalog::from_yaml_str(
        "packs:\n  - code: A\n    documents:\n      - doc_type: picking_list\n        template: nope.xlsx\n",
    )
    .unwrap();
    match import_catalog(&store, &catalog, dir.path(), None) {
        Err(CatalogError::Io { path, .. }) => assert!(path.ends_with("nope.xlsx")),
        other => panic!("unexpected {other:?}"),
    }

    let catalog = PackCatalog::from_yaml_str("packs:\n  - code: '  '\n").unwrap();
    assert!(matches!(
        import_catalog(&store, &catalog, dir.path(), None),
        Err(CatalogError::EmptyPackCode)
    ));
    assert!(PackCatalog::from_yaml_str("packs: [").is_err());
}
