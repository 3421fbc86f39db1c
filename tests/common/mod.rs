//! Reference data and CSV builders shared by the integration tests

#![allow(dead_code)]

pub const PROVENANCE: &str = "http://example.org/prov/manual";
pub const TEMP: &str = "http://example.org/var/temp";

pub const REFERENCES: &str = r#"{
    "experiments": [{"uri": "http://example.org/xp/1", "name": "XP1"}],
    "scientific_objects": [
        {"uri": "http://example.org/os/1", "name": "plant1", "experiments": ["http://example.org/xp/1"]},
        {"uri": "http://example.org/os/2", "name": "plant2", "experiments": ["http://example.org/xp/1"]},
        {"uri": "http://example.org/os/3", "name": "plant3", "experiments": ["http://example.org/xp/1"]}
    ],
    "devices": [
        {"uri": "http://example.org/device/s1", "name": "sensor1", "rdf_type": "http://example.org/vocab#Thermometer",
         "variables": ["http://example.org/var/temp"]}
    ],
    "device_types": [{"uri": "http://example.org/vocab#Thermometer", "root": "http://example.org/vocab#SensingDevice"}],
    "variables": [{"uri": "http://example.org/var/temp", "name": "temp", "datatype": "xsd:decimal"}],
    "provenances": [{"uri": "http://example.org/prov/manual", "name": "manual"}]
}"#;

/// A `target,date,temp` file with the given data rows
pub fn temp_csv<S: AsRef<str>>(rows: &[S]) -> Vec<u8> {
    let mut content = format!("target,date,{}\nTarget,Date,Temperature\nreserved\n", TEMP);
    for row in rows {
        content.push_str(row.as_ref());
        content.push('\n');
    }
    content.into_bytes()
}

/// `count` distinct valid rows cycling over the known plants
pub fn valid_rows(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            format!(
                "plant{},2024-01-01T{:02}:{:02}:{:02}Z,{}.5",
                i % 3 + 1,
                (i / 3600) % 24,
                (i / 60) % 60,
                i % 60,
                i
            )
        })
        .collect()
}
