#![no_main]

use std::sync::{Arc, OnceLock};

use libfuzzer_sys::fuzz_target;
use silex_import::import::{DataImporter, ImportConfig};
use silex_import::store::MemoryStore;

const REFERENCES: &str = r#"{
    "experiments": [{"uri": "http://example.org/xp/1", "name": "XP1"}],
    "scientific_objects": [{"uri": "http://example.org/os/1", "name": "plant1", "experiments": ["http://example.org/xp/1"]}],
    "devices": [{"uri": "http://example.org/device/s1", "name": "sensor1", "rdf_type": "http://example.org/vocab#Thermometer"}],
    "device_types": [{"uri": "http://example.org/vocab#Thermometer", "root": "http://example.org/vocab#SensingDevice"}],
    "variables": [
        {"uri": "http://example.org/var/temp", "name": "temp", "datatype": "xsd:decimal"},
        {"uri": "http://example.org/var/day", "name": "day", "datatype": "xsd:date"}
    ],
    "provenances": [{"uri": "http://example.org/prov/1", "name": "fuzz",
        "agents": [{"uri": "http://example.org/device/s1", "rdf_type": "http://example.org/vocab#Thermometer"}]}]
}"#;

fn importer() -> &'static DataImporter {
    static IMPORTER: OnceLock<DataImporter> = OnceLock::new();
    IMPORTER.get_or_init(|| {
        let store = Arc::new(MemoryStore::from_json(REFERENCES).expect("fuzz references"));
        DataImporter::new(store.clone(), store, ImportConfig::default().with_worker_count(2))
    })
}

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must give a report or an error, never a panic
    let _ = importer().validate_csv("http://example.org/prov/1", None, data);
});
