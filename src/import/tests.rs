use std::sync::Arc;

use proptest::prelude::*;

use chrono::{TimeZone, Utc};

use super::cache::{ObservationKey, ReferenceCaches, ResolutionCache};
use super::*;
use crate::model::{DataValue, NamedResource};
use crate::store::{MemoryStore, Resolution};

const TEMP: &str = "http://example.org/var/temp";
const COUNT: &str = "http://example.org/var/count";
const NOTE: &str = "http://example.org/var/note";

const REFERENCES: &str = r#"{
    "experiments": [
        {"uri": "http://example.org/xp/1", "name": "XP1"},
        {"uri": "http://example.org/xp/private", "name": "Private", "members": ["http://example.org/user/alice"]},
        {"uri": "http://example.org/xp/twin-a", "name": "Twin"},
        {"uri": "http://example.org/xp/twin-b", "name": "Twin"}
    ],
    "scientific_objects": [
        {"uri": "http://example.org/os/1", "name": "plant1", "experiments": ["http://example.org/xp/1"]},
        {"uri": "http://example.org/os/2", "name": "plant2", "experiments": ["http://example.org/xp/1"]},
        {"uri": "http://example.org/os/bench", "name": "bench", "experiments": ["http://example.org/xp/1"]}
    ],
    "facilities": [
        {"uri": "http://example.org/facility/greenhouse", "name": "greenhouse"},
        {"uri": "http://example.org/facility/bench", "name": "bench"}
    ],
    "devices": [
        {"uri": "http://example.org/device/s1", "name": "sensor1", "rdf_type": "http://example.org/vocab#Thermometer",
         "variables": ["http://example.org/var/temp"]},
        {"uri": "http://example.org/device/s2", "name": "sensor2", "rdf_type": "http://example.org/vocab#Thermometer",
         "variables": ["http://example.org/var/temp"]},
        {"uri": "http://example.org/device/s3", "name": "station", "rdf_type": "http://example.org/vocab#Thermometer"},
        {"uri": "http://example.org/device/l1", "name": "logger", "rdf_type": "http://example.org/vocab#Thermometer"},
        {"uri": "http://example.org/device/l2", "name": "logger", "rdf_type": "http://example.org/vocab#Thermometer"}
    ],
    "device_types": [{"uri": "http://example.org/vocab#Thermometer", "root": "http://example.org/vocab#SensingDevice"}],
    "variables": [
        {"uri": "http://example.org/var/temp", "name": "temp", "datatype": "xsd:decimal"},
        {"uri": "http://example.org/var/count", "name": "count", "datatype": "http://www.w3.org/2001/XMLSchema#integer"},
        {"uri": "http://example.org/var/note", "name": "note"}
    ],
    "provenances": [
        {"uri": "http://example.org/prov/manual", "name": "manual"},
        {"uri": "http://example.org/prov/station", "name": "station",
         "agents": [{"uri": "http://example.org/device/s3", "rdf_type": "http://example.org/vocab#Thermometer"}]},
        {"uri": "http://example.org/prov/pair", "name": "pair",
         "agents": [
            {"uri": "http://example.org/device/s1", "rdf_type": "http://example.org/vocab#Thermometer"},
            {"uri": "http://example.org/device/s2", "rdf_type": "http://example.org/vocab#Thermometer"}
         ]},
        {"uri": "http://example.org/prov/mixed", "name": "mixed",
         "agents": [
            {"uri": "http://example.org/device/s1", "rdf_type": "http://example.org/vocab#Thermometer"},
            {"uri": "http://example.org/device/s3", "rdf_type": "http://example.org/vocab#Thermometer"}
         ]},
        {"uri": "http://example.org/prov/ghost", "name": "ghost",
         "agents": [{"uri": "http://example.org/device/unknown", "rdf_type": "http://example.org/vocab#Thermometer"}]}
    ]
}"#;

const MANUAL: &str = "http://example.org/prov/manual";

fn setup(config: ImportConfig) -> (Arc<MemoryStore>, DataImporter) {
    let store = Arc::new(MemoryStore::from_json(REFERENCES).unwrap());
    let importer = DataImporter::new(store.clone(), store.clone(), config);
    (store, importer)
}

fn importer() -> (Arc<MemoryStore>, DataImporter) {
    setup(ImportConfig::default())
}

/// Header, labels, reserved line, then data rows
fn csv(header: &str, labels: &str, rows: &[&str]) -> Vec<u8> {
    let mut lines = vec![header, labels, "reserved"];
    lines.extend_from_slice(rows);
    lines.join("\n").into_bytes()
}

fn temp_csv(rows: &[&str]) -> Vec<u8> {
    csv(
        &format!("target,date,{}", TEMP),
        "Target,Date,Temperature",
        rows,
    )
}

#[test]
fn test_valid_file_imports() {
    let (store, importer) = importer();
    let content = temp_csv(&["plant1,2024-01-01,12.5", "plant2,2024-01-01T10:00:00+01:00,13"]);

    let validation = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert!(validation.valid, "{}", validation);
    assert!(validation.validation_step);
    assert_eq!(validation.lines_to_import, 2);
    assert_eq!(validation.rows_checked, 2);
    assert_eq!(validation.header_labels[2], "Temperature");
    let key = validation.validation_key.clone().unwrap();

    let result = importer.import_csv(MANUAL, None, &content, Some(&key)).unwrap();
    assert!(result.valid);
    assert!(result.insertion_step);
    assert_eq!(result.lines_imported, 2);
    assert!(result.document_uri.is_some());

    let records = store.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].target.as_deref(), Some("http://example.org/os/1"));
    assert_eq!(records[0].value, DataValue::Decimal(12.5));
    assert!(!records[0].is_datetime);
    assert_eq!(records[1].offset, "+01:00");
    assert!(records
        .iter()
        .all(|r| r.batch_uri == result.batch_uri && r.publication_date.is_some()));

    let histories = store.batch_histories();
    assert_eq!(histories.len(), 1);
    assert_eq!(histories[0].document_uri, result.document_uri);

    // the key is consumed by the insertion
    let source = ValidatedSource {
        provenance: MANUAL,
        experiment: None,
        content: &content,
    };
    assert!(importer.validations.get(&key, &source).is_none());
}

#[test]
fn test_duplicate_rows_flagged() {
    let (_, importer) = importer();
    let content = temp_csv(&["plant1,2024-01-01,12.5", "plant1,2024-01-01,12.5"]);

    let result = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert!(!result.valid);
    assert!(result.validation_key.is_none());

    let duplicates = result.errors_of(CellErrorKind::DuplicatedData);
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates[0].row, Some(1));
    assert_eq!(duplicates[0].line(), Some(5));
    assert_eq!(duplicates[0].header, format!("Temperature({})", TEMP));
    assert_eq!(result.record_count(), 2);
}

#[test]
fn test_missing_target_header_without_provenance_device() {
    let (_, importer) = importer();
    let content = csv(&format!("date,{}", TEMP), "Date,Temperature", &["2024-01-01,1"]);

    let result = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert!(!result.valid);
    assert!(!result.validation_step);
    assert_eq!(result.missing_headers, vec!["device or target or scientific_object".to_string()]);
    assert_eq!(result.rows_checked, 0);
}

#[test]
fn test_annotation_requires_target_header() {
    let (_, importer) = importer();
    let content = csv(
        &format!("device,date,object_annotation,{}", TEMP),
        "Device,Date,Note,Temperature",
        &["sensor1,2024-01-01,hello,1"],
    );

    let result = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert!(!result.valid);
    assert_eq!(result.missing_headers, vec!["target or scientific_object".to_string()]);
}

#[test]
fn test_header_errors() {
    let (_, importer) = importer();
    let content = csv(
        "target,,http://example.org/var/unknown,not a uri",
        "Target,,Unknown,Text",
        &["plant1,,1,2"],
    );

    let result = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert!(!result.valid);
    assert_eq!(result.missing_headers, vec!["date".to_string()]);
    assert_eq!(result.empty_headers, vec![2]);
    assert_eq!(result.invalid_header_uris.len(), 2);
    assert_eq!(result.invalid_header_uris[0].column, Some(2));
}

#[test]
fn test_variable_without_datatype_is_fatal() {
    let (_, importer) = importer();
    let content = csv(&format!("target,date,{}", NOTE), "Target,Date,Note", &["plant1,2024-01-01,x"]);

    let err = importer.validate_csv(MANUAL, None, &content).unwrap_err();
    assert!(matches!(err, ImportError::MissingDatatype { variable } if variable == NOTE));
}

#[test]
fn test_empty_file() {
    let (_, importer) = importer();
    let result = importer.validate_csv(MANUAL, None, &temp_csv(&[])).unwrap();

    assert!(!result.valid);
    assert_eq!(result.error_message.as_deref(), Some(EMPTY_FILE_MESSAGE));
    assert_eq!(result.lines_to_import, 0);
}

#[test]
fn test_too_large_dataset() {
    let (_, importer) = setup(ImportConfig::default().with_max_rows(2));
    let content = temp_csv(&["plant1,2024-01-01,1", "plant1,2024-01-02,2", "plant1,2024-01-03,3"]);

    let result = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert!(!result.valid);
    assert!(result.too_large_dataset);
    assert_eq!(result.lines_to_import, 3);
    assert_eq!(result.record_count(), 0);
    assert!(!result.validation_step);
}

#[test]
fn test_unknown_provenance_and_denied_experiment() {
    let (_, importer) = importer();
    let content = temp_csv(&["plant1,2024-01-01,1"]);

    let err = importer
        .validate_csv("http://example.org/prov/none", None, &content)
        .unwrap_err();
    assert!(matches!(err, ImportError::ProvenanceNotFound(_)));

    let err = importer
        .validate_csv(MANUAL, Some("http://example.org/xp/private"), &content)
        .unwrap_err();
    assert!(matches!(err, ImportError::ExperimentAccessDenied(_)));

    let (_, alice) = importer_for_alice();
    assert!(alice
        .validate_csv(MANUAL, Some("http://example.org/xp/private"), &content)
        .is_ok());
}

fn importer_for_alice() -> (Arc<MemoryStore>, DataImporter) {
    let (store, importer) = importer();
    (store, importer.with_user("http://example.org/user/alice"))
}

#[test]
fn test_invalid_cells() {
    let (_, importer) = importer();
    let content = temp_csv(&["nowhere,2024-01-01,1", "plant1,01/02/2024,1", "plant2,2024-01-01,abc"]);

    let result = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert!(!result.valid);

    let targets = result.errors_of(CellErrorKind::InvalidTarget);
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].value.as_deref(), Some("nowhere"));
    assert_eq!(targets[0].line(), Some(4));

    let dates = result.errors_of(CellErrorKind::InvalidDate);
    assert_eq!(dates.len(), 1);
    assert_eq!(dates[0].column, Some(1));

    let datatypes = result.errors_of(CellErrorKind::InvalidDatatype);
    assert_eq!(datatypes.len(), 1);
    assert_eq!(datatypes[0].value.as_deref(), Some("abc"));
    assert_eq!(result.record_count(), 0);
}

#[test]
fn test_error_budget_stops_validation() {
    let (_, importer) = setup(
        ImportConfig::default()
            .with_worker_count(1)
            .with_max_errors(1),
    );
    let content = temp_csv(&[
        "nowhere,2024-01-01,1",
        "nowhere,2024-01-02,1",
        "nowhere,2024-01-03,1",
    ]);

    let result = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert!(!result.valid);
    assert_eq!(result.rows_checked, 1);
    assert_eq!(result.errors_of(CellErrorKind::InvalidTarget).len(), 1);
}

#[test]
fn test_scientific_object_needs_experiment_for_names() {
    let (_, importer) = importer();
    let content = csv(
        &format!("scientific_object,date,{}", TEMP),
        "Object,Date,Temperature",
        &["plant1,2024-01-01,1", "http://example.org/os/2,2024-01-01,2"],
    );

    let result = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert_eq!(result.errors_of(CellErrorKind::ObjectNameAmbiguity).len(), 1);
    assert_eq!(result.record_count(), 1);

    let result = importer
        .validate_csv(MANUAL, Some("http://example.org/xp/1"), &content)
        .unwrap();
    assert!(result.valid, "{}", result);
    let (_, first) = result.observations().next().unwrap();
    assert_eq!(first.record.target.as_deref(), Some("http://example.org/os/1"));
    assert_eq!(first.record.provenance.experiments, vec!["http://example.org/xp/1".to_string()]);
}

#[test]
fn test_scientific_object_wins_over_target() {
    let (_, importer) = importer();
    let content = csv(
        &format!("target,scientific_object,date,{}", TEMP),
        "Target,Object,Date,Temperature",
        &["greenhouse,http://example.org/os/1,2024-01-01,1"],
    );

    let result = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert!(result.valid, "{}", result);
    let (_, cell) = result.observations().next().unwrap();
    assert_eq!(cell.record.target.as_deref(), Some("http://example.org/os/1"));
}

#[test]
fn test_single_provenance_device_is_linked() {
    let (_, importer) = importer();
    let content = csv(&format!("date,{}", TEMP), "Date,Temperature", &["2024-01-01,3", "2024-01-02,4"]);

    let result = importer
        .validate_csv("http://example.org/prov/station", None, &content)
        .unwrap();
    assert!(result.valid, "{}", result);
    assert_eq!(result.associations.len(), 1);
    let link = result.associations.iter().next().unwrap();
    assert_eq!(link.device, "http://example.org/device/s3");
    assert_eq!(link.variable, TEMP);

    let (_, cell) = result.observations().next().unwrap();
    assert!(cell.record.target.is_none());
    let agent = &cell.record.provenance.was_associated_with[0];
    assert_eq!(agent.uri, "http://example.org/device/s3");
    assert_eq!(agent.rdf_type.as_deref(), Some("http://example.org/vocab#SensingDevice"));
}

#[test]
fn test_linked_provenance_device_is_chosen() {
    let (_, importer) = importer();
    let content = csv(&format!("date,{}", TEMP), "Date,Temperature", &["2024-01-01,3"]);

    let result = importer
        .validate_csv("http://example.org/prov/mixed", None, &content)
        .unwrap();
    assert!(result.valid, "{}", result);
    assert!(result.associations.is_empty());
    let (_, cell) = result.observations().next().unwrap();
    assert_eq!(cell.record.device(), Some("http://example.org/device/s1"));
}

#[test]
fn test_several_linked_provenance_devices_are_ambiguous() {
    let (_, importer) = importer();
    let content = csv(&format!("date,{}", TEMP), "Date,Temperature", &["2024-01-01,3", "2024-01-02,4"]);

    let result = importer
        .validate_csv("http://example.org/prov/pair", None, &content)
        .unwrap();
    assert!(!result.valid);
    let ambiguities = result.errors_of(CellErrorKind::DeviceChoiceAmbiguity);
    assert_eq!(ambiguities.len(), 2);
    assert_eq!(ambiguities[0].value.as_deref(), Some("http://example.org/prov/pair"));
    assert_eq!(result.record_count(), 0);
}

#[test]
fn test_missing_target_and_device_values() {
    let (_, importer) = importer();
    let content = csv(&format!("date,{}", TEMP), "Date,Temperature", &["2024-01-01,3"]);

    let result = importer
        .validate_csv("http://example.org/prov/ghost", None, &content)
        .unwrap();
    assert!(!result.valid);
    let missing = result.errors_of(CellErrorKind::MissingRequiredValue);
    assert_eq!(missing.len(), 2);
    assert!(missing.iter().all(|cell| cell.row == Some(0) && cell.value.is_none()));
    assert_eq!(missing[0].header, DEVICE_HEADER);
    assert_eq!(missing[1].header, TARGET_HEADER);
}

#[test]
fn test_device_column_creates_link() {
    let (_, importer) = importer();
    let content = csv(
        &format!("device,date,{},{}", TEMP, COUNT),
        "Device,Date,Temperature,Count",
        &["sensor1,2024-01-01,3,7"],
    );

    let result = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert!(result.valid, "{}", result);
    assert_eq!(result.record_count(), 2);
    // temp is already linked to sensor1, count is not
    assert_eq!(result.associations.len(), 1);
    assert_eq!(result.associations.iter().next().unwrap().variable, COUNT);
}

#[test]
fn test_annotation_and_raw_data() {
    let (store, importer) = importer_for_alice();
    let content = csv(
        &format!("target,date,object_annotation,{},raw_data", TEMP),
        "Target,Date,Note,Temperature,Raw",
        &[r#"plant1,2024-01-01,leaf damage,1.5,"1.0, 2.0""#],
    );

    let result = importer.import_csv(MANUAL, None, &content, None).unwrap();
    assert!(result.valid, "{}", result);

    let annotations = store.annotations();
    assert_eq!(annotations.len(), 1);
    assert_eq!(annotations[0].description, "leaf damage");
    assert_eq!(annotations[0].targets, vec!["http://example.org/os/1".to_string()]);
    assert_eq!(annotations[0].publisher.as_deref(), Some("http://example.org/user/alice"));

    let records = store.records();
    assert_eq!(
        records[0].raw_data,
        Some(vec![DataValue::Decimal(1.0), DataValue::Decimal(2.0)])
    );
}

#[test]
fn test_storage_duplicates_are_reported() {
    let (store, importer) = importer();
    let content = temp_csv(&["plant1,2024-01-01,1", "plant2,2024-01-01,2"]);

    let first = importer.import_csv(MANUAL, None, &content, None).unwrap();
    assert!(first.insertion_step);

    let second = importer.import_csv(MANUAL, None, &content, None).unwrap();
    assert!(!second.valid);
    assert!(!second.insertion_step);
    assert_eq!(second.lines_imported, 0);
    let duplicates = second.errors_of(CellErrorKind::DuplicatedData);
    assert_eq!(duplicates.len(), 2);
    assert_eq!(duplicates[1].row, Some(1));
    assert_eq!(duplicates[1].value.as_deref(), Some("2"));
    assert_eq!(store.records().len(), 2);
}

#[test]
fn test_storage_size_limit() {
    let mut data: crate::store::ReferenceData = serde_json::from_str(REFERENCES).unwrap();
    data.max_batch_records = Some(1);
    let store = Arc::new(MemoryStore::new(data));
    let importer = DataImporter::new(store.clone(), store.clone(), ImportConfig::default());

    let content = temp_csv(&["plant1,2024-01-01,1", "plant2,2024-01-01,2"]);
    let result = importer.import_csv(MANUAL, None, &content, None).unwrap();
    assert!(!result.valid);
    assert!(result.too_large_dataset);
    assert!(store.records().is_empty());
}

#[test]
fn test_ragged_rows() {
    let (_, importer) = importer();
    let content = temp_csv(&["plant1,2024-01-01", "plant2,2024-01-01,2,surplus"]);

    let result = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert!(result.valid, "{}", result);
    assert_eq!(result.record_count(), 1);
}

#[test]
fn test_report_rendering() {
    let (_, importer) = importer();
    let content = temp_csv(&["nowhere,2024-01-01,1"]);
    let result = importer.validate_csv(MANUAL, None, &content).unwrap();

    let report = ImportReport::from_result("data.csv", &result);
    assert!(report.has_failures());
    let text = report.to_string();
    assert!(text.contains("File: data.csv"));
    assert!(text.contains("line 4, column 1 [target]: 'nowhere'"));
    assert!(text.contains("Import data INVALID"));

    let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
    assert_eq!(json["valid"], false);
    assert_eq!(json["errors"]["invalid_target"][0]["value"], "nowhere");
}

#[test]
fn test_ambiguous_names_are_reported() {
    let (_, importer) = importer();
    let content = csv(
        &format!("experiment,target,date,device,{}", TEMP),
        "Experiment,Target,Date,Device,Temperature",
        &["Twin,bench,2024-01-01,logger,1", "Twin,bench,2024-01-02,logger,2"],
    );

    let result = importer.validate_csv(MANUAL, None, &content).unwrap();
    assert!(!result.valid);
    for (kind, column, value) in [
        (CellErrorKind::DuplicateExperiment, 0, "Twin"),
        (CellErrorKind::DuplicateTarget, 1, "bench"),
        (CellErrorKind::DuplicateDevice, 3, "logger"),
    ] {
        let cells = result.errors_of(kind);
        assert_eq!(cells.len(), 2, "{:?}", kind);
        assert_eq!(cells[0].row, Some(0));
        assert_eq!(cells[1].row, Some(1));
        assert!(cells
            .iter()
            .all(|c| c.column == Some(column) && c.value.as_deref() == Some(value)));
    }
    assert_eq!(result.record_count(), 0);
}

#[test]
fn test_semicolon_and_tab_files() {
    let (_, importer) = importer();
    for delimiter in [";", "\t", "|"] {
        let header = ["target", "date", TEMP].join(delimiter);
        let labels = ["Target", "Date", "Temperature"].join(delimiter);
        let row = ["plant1", "2024-01-01", "12.5"].join(delimiter);
        let content = csv(&header, &labels, &[row.as_str()]);

        let result = importer.validate_csv(MANUAL, None, &content).unwrap();
        assert!(result.valid, "delimiter {:?}: {}", delimiter, result);
        assert_eq!(result.lines_to_import, 1);
        assert_eq!(result.header_labels[2], "Temperature");
    }
}

#[test]
fn test_detect_delimiter() {
    assert_eq!(detect_delimiter(b"target,date,x\n1;2;3;4;5"), b',');
    assert_eq!(detect_delimiter(b"\n  \ntarget;date;x"), b';');
    assert_eq!(detect_delimiter(b"\"a,b,c\";date;x"), b';');
    assert_eq!(detect_delimiter(b"target\tdate"), b'\t');
    assert_eq!(detect_delimiter(b"target"), b',');
    assert_eq!(detect_delimiter(b""), b',');
}

#[test]
fn test_cached_validation_is_bound_to_its_file() {
    let (store, importer) = importer();
    let validated = temp_csv(&["plant1,2024-01-01,12.5"]);
    let other = temp_csv(&["plant2,2024-01-01,1", "plant2,2024-01-02,2"]);

    let key = importer
        .validate_csv(MANUAL, None, &validated)
        .unwrap()
        .validation_key
        .unwrap();

    // another file presented with the key is validated on its own
    let result = importer.import_csv(MANUAL, None, &other, Some(&key)).unwrap();
    assert!(result.valid);
    assert_eq!(result.lines_imported, 2);
    let records = store.records();
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .all(|r| r.target.as_deref() == Some("http://example.org/os/2")));

    // the key still answers the file it was computed for
    let result = importer.import_csv(MANUAL, None, &validated, Some(&key)).unwrap();
    assert!(result.valid);
    assert_eq!(store.records().len(), 3);
}

#[test]
fn test_observation_key_keeps_lowest_row() {
    let caches = ReferenceCaches::new();
    let key = ObservationKey {
        instant: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        variable: TEMP.to_string(),
        provenance: MANUAL.to_string(),
        target: Some("http://example.org/os/1".to_string()),
        device: None,
    };

    assert!(!caches.held_by_earlier_row(key.clone(), 7));
    assert!(caches.held_by_earlier_row(key.clone(), 9));
    // a lower row arriving late takes the key over
    assert!(!caches.held_by_earlier_row(key.clone(), 3));
    assert!(caches.held_by_earlier_row(key.clone(), 7));
    assert!(!caches.held_by_earlier_row(key, 3));
}

#[test]
fn test_resolution_cache_marks_conflicts() {
    let cache: ResolutionCache<NamedResource> = ResolutionCache::default();
    let first = NamedResource::new("http://example.org/a", "a");
    let other = NamedResource::new("http://example.org/b", "a");

    let found = cache
        .resolve_with("a", || Ok(Resolution::Found(first.clone())))
        .unwrap();
    assert_eq!(found, Resolution::Found(first.clone()));

    // cached: the lookup is not called again
    let cached = cache
        .resolve_with("a", || panic!("lookup must not run"))
        .unwrap();
    assert_eq!(cached, Resolution::Found(first));

    let missing = cache.resolve_with("b", || Ok(Resolution::NotFound)).unwrap();
    assert_eq!(missing, Resolution::NotFound);
    assert!(!cache.is_duplicated("b"));

    // another worker caches a different entity while this lookup runs
    let raced = cache
        .resolve_with("x", || {
            cache.resolve_with("x", || Ok(Resolution::Found(other.clone())))?;
            Ok(Resolution::Found(NamedResource::new("http://example.org/c", "x")))
        })
        .unwrap();
    assert_eq!(raced, Resolution::Ambiguous);
    assert!(cache.is_duplicated("x"));
    assert_eq!(
        cache.resolve_with("x", || panic!("lookup must not run")).unwrap(),
        Resolution::Ambiguous
    );
}

proptest! {
    #[test]
    fn prop_merge_keeps_everything(rows in proptest::collection::vec((0usize..4, 0usize..8), 0..40), split in 0usize..40) {
        let kinds = [
            CellErrorKind::InvalidTarget,
            CellErrorKind::InvalidDate,
            CellErrorKind::InvalidDatatype,
            CellErrorKind::DuplicatedData,
        ];
        let split = split.min(rows.len());
        let mut partials = vec![ValidationResult::new(), ValidationResult::new()];
        for (index, (kind, column)) in rows.iter().enumerate() {
            let partial = &mut partials[usize::from(index >= split)];
            partial.add_error(kinds[*kind], CsvCell::new(index, *column, "v", "h"));
            partial.rows_checked += 1;
        }

        let mut merged = ValidationResult::new();
        for partial in partials {
            merged.merge(partial);
        }
        prop_assert_eq!(merged.cell_error_count(), rows.len());
        prop_assert_eq!(merged.rows_checked, rows.len());
        for kind in kinds {
            let rows_of_kind: Vec<_> = merged.errors_of(kind).iter().map(|c| c.row).collect();
            let mut sorted = rows_of_kind.clone();
            sorted.sort();
            prop_assert_eq!(rows_of_kind, sorted);
        }
    }

    #[test]
    fn prop_merge_is_associative(
        rows in proptest::collection::vec((0usize..3, 0usize..6, any::<bool>()), 0..30),
        first in 0usize..30,
        second in 0usize..30,
    ) {
        let kinds = [
            CellErrorKind::InvalidTarget,
            CellErrorKind::InvalidDate,
            CellErrorKind::DuplicatedData,
        ];
        let first = first.min(rows.len());
        let second = second.min(rows.len()).max(first);
        let mut partials = vec![ValidationResult::new(), ValidationResult::new(), ValidationResult::new()];
        for (index, (kind, column, interrupted)) in rows.iter().enumerate() {
            let partial = &mut partials[usize::from(index >= first) + usize::from(index >= second)];
            partial.add_error(kinds[*kind], CsvCell::new(index, *column, "v", "h"));
            partial.rows_checked += 1;
            partial.interrupted |= *interrupted;
            if *column == 0 && partial.error_message.is_none() {
                partial.error_message = Some(format!("row {}", index));
            }
        }
        let [a, b, c]: [ValidationResult; 3] = partials.try_into().unwrap();

        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());

        let mut right_tail = b;
        right_tail.merge(c);
        let mut right = a;
        right.merge(right_tail);

        prop_assert_eq!(left, right);
    }
}
