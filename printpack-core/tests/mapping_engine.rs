use printpack_core::error::MappingError;
use printpack_core::mapping::fill;
use printpack_core::models::MappingRule;
use printpack_core::payload::Value;
use printpack_core::workbook::memory::MemoryWorkbook;
use printpack_core::workbook::CellValue;

fn payload() -> Value {
    Value::from_json(serde_json::json!({
        "shipment": {
            "reference": "SHP-001",
            "recipient": { "city": "lyon" },
            "requested_delivery_date": "2026-03-01",
            "total_weight_g": 12500,
            "notes": "   ",
            "items": [
                { "product_name": "Gloves", "quantity": 4 },
                { "product_name": "Masks", "quantity": 10 },
                { "quantity": 1 }
            ],
            "empty_items": []
        }
    }))
}

fn book() -> MemoryWorkbook {
    MemoryWorkbook::new()
        .with_sheet("Sheet1")
        .with_merged("Sheet1", "B2:D2")
}

#[test]
fn scalar_rules_write_resolved_values() {
    let mut wb = book();
    let rules = vec![
        MappingRule::new("Sheet1", "A1", "shipment.reference"),
        MappingRule::new("Sheet1", "A3", "shipment.total_weight_g"),
        MappingRule::new("Sheet1", "A4", "shipment.unknown.path"),
    ];
    fill(&mut wb, &rules, &payload()).unwrap();

    assert_eq!(wb.value("Sheet1", "A1"), Some(&CellValue::text("SHP-001")));
    assert_eq!(wb.value("Sheet1", "A3"), Some(&CellValue::Number(12500.0)));
    assert_eq!(wb.value("Sheet1", "A4"), Some(&CellValue::text("")));
}

#[test]
fn transforms_apply_to_present_values() {
    let mut wb = book();
    let rules = vec![
        MappingRule::new("Sheet1", "A1", "shipment.recipient.city").transform("upper"),
        MappingRule::new("Sheet1", "A2", "shipment.requested_delivery_date").transform(" DATE_FR "),
        MappingRule::new("Sheet1", "A3", "shipment.reference").transform("nope"),
        MappingRule::new("Sheet1", "A4", "shipment.missing").transform("upper"),
    ];
    fill(&mut wb, &rules, &payload()).unwrap();

    assert_eq!(wb.value("Sheet1", "A1"), Some(&CellValue::text("LYON")));
    assert_eq!(wb.value("Sheet1", "A2"), Some(&CellValue::text("01/03/2026")));
    assert_eq!(wb.value("Sheet1", "A3"), Some(&CellValue::text("SHP-001")));
    assert_eq!(wb.value("Sheet1", "A4"), Some(&CellValue::text("")));
}

#[test]
fn merged_targets_are_redirected_to_anchor() {
    let mut wb = book();
    let rules = vec![MappingRule::new("Sheet1", "C2", "shipment.reference")];
    fill(&mut wb, &rules, &payload()).unwrap();

    assert_eq!(wb.value("Sheet1", "B2"), Some(&CellValue::text("SHP-001")));
    assert_eq!(wb.value("Sheet1", "C2"), None);
}

#[test]
fn repeating_rules_fill_one_row_per_item() {
    let mut wb = book();
    let rules = vec![
        MappingRule::new("Sheet1", "A10", "shipment.items[].product_name"),
        MappingRule::new("Sheet1", "B10", "shipment.items[].quantity"),
    ];
    fill(&mut wb, &rules, &payload()).unwrap();

    assert_eq!(wb.value("Sheet1", "A10"), Some(&CellValue::text("Gloves")));
    assert_eq!(wb.value("Sheet1", "A11"), Some(&CellValue::text("Masks")));
    assert_eq!(wb.value("Sheet1", "A12"), Some(&CellValue::text("")));
    assert_eq!(wb.value("Sheet1", "B11"), Some(&CellValue::Number(10.0)));
    assert_eq!(wb.value("Sheet1", "A13"), None);
}

#[test]
fn empty_repeating_list_writes_nothing() {
    let mut wb = book();
    let rules = vec![MappingRule::new("Sheet1", "A10", "shipment.empty_items[].product_name")];
    fill(&mut wb, &rules, &payload()).unwrap();
    assert_eq!(wb.value("Sheet1", "A10"), None);
}

#[test]
fn required_scalar_missing_names_the_cell() {
    let mut wb = book();
    let rules = vec![MappingRule::new("Sheet1", "A5", "shipment.notes").required()];
    match fill(&mut wb, &rules, &payload()) {
        Err(MappingError::MissingRequired {
            worksheet,
            cell,
            source_key,
        }) => {
            assert_eq!(worksheet, "Sheet1");
            assert_eq!(cell, "A5");
            assert_eq!(source_key, "shipment.notes");
        }
        other => panic!("expected MissingRequired, got {other:?}"),
    }
    assert_eq!(wb.value("Sheet1", "A5"), None);
}

#[test]
fn required_repeating_row_failure_names_the_computed_cell() {
    let mut wb = book();
    let rules = vec![MappingRule::new("Sheet1", "C20", "shipment.items[].product_name").required()];
    let err = fill(&mut wb, &rules, &payload()).unwrap_err();
    assert!(err.to_string().contains("Sheet1!C22"));
    match err {
        MappingError::MissingRequired { cell, .. } => assert_eq!(cell, "C22"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(wb.value("Sheet1", "C20"), Some(&CellValue::text("Gloves")));
}

#[test]
fn required_repeating_with_no_rows_fails_at_anchor() {
    let mut wb = book();
    let rules = vec![MappingRule::new("Sheet1", "D4", "shipment.empty_items[].x").required()];
    match fill(&mut wb, &rules, &payload()) {
        Err(MappingError::MissingRequired { cell, .. }) => assert_eq!(cell, "D4"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_worksheet_and_bad_cells_are_reported() {
    let mut wb = book();
    let rules = vec![MappingRule::new("Nope", "A1", "shipment.reference")];
    assert!(matches!(
        fill(&mut wb, &rules, &payload()),
        Err(MappingError::UnknownWorksheet { worksheet }) if worksheet == "Nope"
    ));

    let rules = vec![MappingRule::new("Sheet1", "1A", "shipment.reference")];
    assert!(matches!(
        fill(&mut wb, &rules, &payload()),
        Err(MappingError::InvalidCell { .. })
    ));
}

#[test]
fn record_values_are_not_written() {
    let mut wb = book();
    let rules = vec![MappingRule::new("Sheet1", "A1", "shipment.recipient")];
    assert!(matches!(
        fill(&mut wb, &rules, &payload()),
        Err(MappingError::NonScalar { .. })
    ));
}

#[test]
fn first_violation_stops_the_fill() {
    let mut wb = book();
    let rules = vec![
        MappingRule::new("Sheet1", "A1", "shipment.reference"),
        MappingRule::new("Sheet1", "A2", "shipment.missing").required(),
        MappingRule::new("Sheet1", "A3", "shipment.reference"),
    ];
    assert!(fill(&mut wb, &rules, &payload()).is_err());
    assert_eq!(wb.value("Sheet1", "A1"), Some(&CellValue::text("SHP-001")));
    assert_eq!(wb.value("Sheet1", "A3"), None);
}

#[test]
fn cells_outside_the_sheet_grid_are_invalid() {
    let mut wb = book();
    let rules = vec![MappingRule::new("Sheet1", "XFE1", "shipment.reference")];
    assert!(matches!(
        fill(&mut wb, &rules, &payload()),
        Err(MappingError::InvalidCell { cell, .. }) if cell == "XFE1"
    ));
}

#[test]
fn repeating_rows_past_the_last_sheet_row_fail() {
    let mut wb = book();
    let rules = vec![MappingRule::new("Sheet1", "A1048576", "shipment.items[].quantity")];
    match fill(&mut wb, &rules, &payload()) {
        Err(MappingError::InvalidCell { worksheet, cell }) => {
            assert_eq!(worksheet, "Sheet1");
            assert_eq!(cell, "A1048576+1");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(wb.value("Sheet1", "A1048576"), Some(&CellValue::Number(4.0)));
}
