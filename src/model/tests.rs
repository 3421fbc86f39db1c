use super::*;
use chrono::{FixedOffset, TimeZone, Utc};
use proptest::prelude::*;

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

#[test]
fn test_parse_calendar_date_uses_default_offset() {
    let paris = FixedOffset::east_opt(3600).unwrap();
    let parsed = parse_date("2024-01-01", paris).unwrap();

    assert!(!parsed.is_datetime);
    assert_eq!(parsed.offset_string(), "+01:00");
    assert_eq!(parsed.instant, Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap());
}

#[test]
fn test_parse_offset_datetimes() {
    let with_millis = parse_date("2020-11-21T11:12:00.123+01:00", utc()).unwrap();
    assert!(with_millis.is_datetime);
    assert_eq!(with_millis.offset_string(), "+01:00");
    assert_eq!(with_millis.instant.timestamp_millis() % 1000, 123);

    let compact = parse_date("2020-11-21T11:12:00+0100", utc()).unwrap();
    assert_eq!(compact.instant, Utc.with_ymd_and_hms(2020, 11, 21, 10, 12, 0).unwrap());

    let zulu = parse_date("2020-11-21T11:12:00Z", utc()).unwrap();
    assert_eq!(zulu.offset_string(), "Z");
}

#[test]
fn test_parse_local_datetime() {
    let parsed = parse_date("2020-11-21T11:12:00", utc()).unwrap();
    assert!(parsed.is_datetime);
    assert_eq!(parsed.instant, Utc.with_ymd_and_hms(2020, 11, 21, 11, 12, 0).unwrap());
}

#[test]
fn test_parse_date_rejects_garbage() {
    assert!(parse_date("", utc()).is_none());
    assert!(parse_date("21/11/2020", utc()).is_none());
    assert!(parse_date("2020-13-01", utc()).is_none());
    assert!(parse_date("yesterday", utc()).is_none());
}

#[test]
fn test_parse_offset() {
    assert_eq!(parse_offset("Z"), FixedOffset::east_opt(0));
    assert_eq!(parse_offset("+01:00"), FixedOffset::east_opt(3600));
    assert_eq!(parse_offset("-0530"), FixedOffset::east_opt(-(5 * 3600 + 30 * 60)));
    assert_eq!(parse_offset("+02"), FixedOffset::east_opt(7200));
    assert_eq!(parse_offset("Europe/Paris"), None);
    assert_eq!(parse_offset("+25:00"), None);
}

#[test]
fn test_datatype_from_uri() {
    assert_eq!(XsdDatatype::from_uri("xsd:integer"), XsdDatatype::Integer);
    assert_eq!(
        XsdDatatype::from_uri("http://www.w3.org/2001/XMLSchema#decimal"),
        XsdDatatype::Decimal
    );
    assert_eq!(XsdDatatype::from_uri("xsd:dateTime"), XsdDatatype::DateTime);
    assert_eq!(XsdDatatype::from_uri("http://example.org/custom"), XsdDatatype::String);
}

#[test]
fn test_datatype_coercion() {
    assert_eq!(XsdDatatype::Integer.coerce("42", utc()), Ok(DataValue::Integer(42)));
    assert!(XsdDatatype::Integer.coerce("4.2", utc()).is_err());
    assert_eq!(XsdDatatype::Decimal.coerce("12.5", utc()), Ok(DataValue::Decimal(12.5)));
    assert_eq!(XsdDatatype::Decimal.coerce("7", utc()), Ok(DataValue::Decimal(7.0)));
    assert!(XsdDatatype::Decimal.coerce("NaN", utc()).is_err());
    assert_eq!(XsdDatatype::Boolean.coerce("TRUE", utc()), Ok(DataValue::Boolean(true)));
    assert!(XsdDatatype::Boolean.coerce("yes", utc()).is_err());
    assert!(XsdDatatype::Date.coerce("2020-02-30", utc()).is_err());
    assert!(XsdDatatype::DateTime.coerce("2020-02-03", utc()).is_err());
    assert_eq!(
        XsdDatatype::DateTime.coerce("2020-02-03T10:00:00Z", utc()),
        Ok(DataValue::DateTime("2020-02-03T10:00:00Z".to_string()))
    );
    assert_eq!(
        XsdDatatype::String.coerce(" leaf ", utc()),
        Ok(DataValue::Text("leaf".to_string()))
    );
}

#[test]
fn test_is_valid_uri() {
    assert!(is_valid_uri("http://example.org/os/1"));
    assert!(is_valid_uri("urn:uuid:1234"));
    assert!(!is_valid_uri("os1"));
    assert!(!is_valid_uri("plot 12:a"));
    assert!(!is_valid_uri("1http://x"));
    assert!(!is_valid_uri("http:"));
}

#[test]
fn test_annotation_comment() {
    let annotation = Annotation::comment("leaf damage", Some("http://example.org/user/1"));
    assert_eq!(annotation.motivation, OA_COMMENTING);
    assert!(annotation.targets.is_empty());
}

proptest! {
    #[test]
    fn prop_parse_date_never_panics(s in "\\PC*") {
        let _ = parse_date(&s, utc());
    }

    #[test]
    fn prop_integer_coercion_matches_display(n in any::<i64>()) {
        prop_assert_eq!(XsdDatatype::Integer.coerce(&n.to_string(), utc()), Ok(DataValue::Integer(n)));
    }
}
