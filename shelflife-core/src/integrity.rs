//! Integrity validation for product datasets.
//!
//! Two concerns live here: a checksum that detects corrupted cache entries
//! (not tampering), and schema validation that turns an untrusted JSON
//! payload into [`ProductRecord`]s, dropping bad elements one by one.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::SchemaError;
use crate::ProductRecord;

const FIELD_CODE: &str = "Код продукции";
const FIELD_NAME: &str = "Полное наименование (русское)";
const FIELD_SHELF_LIFE: &str = "Срок годности";
const FIELD_UNITS: &str = "Штук в упаковке";
const FIELD_BARCODE: &str = "Штрихкод упаковки";
const FIELD_MANUFACTURER: &str = "Производитель";
const FIELD_STANDARD: &str = "Название стандарта";

const FIELD_SEPARATOR: u8 = 0x1f;
const RECORD_SEPARATOR: u8 = 0x1e;

/// Compute the integrity checksum of a dataset.
///
/// Deterministic and order-sensitive: the same records in the same order
/// always give the same token, and any field change gives a different one.
/// Returned as lowercase hex.
pub fn checksum(dataset: &[ProductRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in dataset {
        hash_str(&mut hasher, &record.code);
        hash_str(&mut hasher, &record.name);
        hasher.update(record.shelf_life_days.to_le_bytes());
        hasher.update([FIELD_SEPARATOR]);
        hash_opt_u32(&mut hasher, record.units_per_pack);
        hash_opt_str(&mut hasher, record.pack_barcode.as_deref());
        hash_opt_str(&mut hasher, record.manufacturer.as_deref());
        hash_opt_str(&mut hasher, record.standard.as_deref());
        hasher.update([RECORD_SEPARATOR]);
    }
    hex::encode(hasher.finalize())
}

fn hash_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
}

fn hash_opt_str(hasher: &mut Sha256, value: Option<&str>) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            hash_str(hasher, v);
        }
        None => hasher.update([0u8, FIELD_SEPARATOR]),
    }
}

fn hash_opt_u32(hasher: &mut Sha256, value: Option<u32>) {
    match value {
        Some(v) => {
            hasher.update([1u8]);
            hasher.update(v.to_le_bytes());
            hasher.update([FIELD_SEPARATOR]);
        }
        None => hasher.update([0u8, FIELD_SEPARATOR]),
    }
}

/// Records that survived validation, with the count of dropped elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDataset {
    pub records: Vec<ProductRecord>,
    pub dropped: usize,
}

impl ValidatedDataset {
    pub fn into_records(self) -> Vec<ProductRecord> {
        self.records
    }
}

/// Validate a raw payload into product records.
///
/// Fails when the payload is not an array, is empty, or has no element that
/// passes the per-record checks. Individual bad elements are dropped.
pub fn validate_schema(raw: &Value) -> Result<ValidatedDataset, SchemaError> {
    let elements = match raw {
        Value::Array(elements) => elements,
        other => {
            return Err(SchemaError::NotASequence {
                found: json_type_name(other),
            })
        }
    };
    if elements.is_empty() {
        return Err(SchemaError::Empty);
    }

    let mut records = Vec::with_capacity(elements.len());
    let mut dropped = 0usize;
    for (position, element) in elements.iter().enumerate() {
        match parse_record(element) {
            Some(record) => records.push(record),
            None => {
                debug!(position, "dropping invalid product record");
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        warn!(dropped, kept = records.len(), "dropped invalid product records");
    }
    if records.is_empty() {
        return Err(SchemaError::NoValidRecords { dropped });
    }
    Ok(ValidatedDataset { records, dropped })
}

fn parse_record(element: &Value) -> Option<ProductRecord> {
    let object = element.as_object()?;

    let code = object.get(FIELD_CODE)?.as_str()?.trim();
    if code.is_empty() {
        return None;
    }
    let name = object.get(FIELD_NAME)?.as_str()?.trim();
    let shelf_life_days = positive_integer(object.get(FIELD_SHELF_LIFE)?)?;

    Some(ProductRecord {
        code: code.to_string(),
        name: name.to_string(),
        shelf_life_days,
        units_per_pack: object.get(FIELD_UNITS).and_then(positive_integer),
        pack_barcode: optional_text(object, FIELD_BARCODE),
        manufacturer: optional_text(object, FIELD_MANUFACTURER),
        standard: optional_text(object, FIELD_STANDARD),
    })
}

/// Accept a JSON number or numeric string holding a positive integer.
fn positive_integer(value: &Value) -> Option<u32> {
    let parsed = match value {
        Value::Number(n) => match n.as_u64() {
            Some(v) => v,
            None => {
                let f = n.as_f64()?;
                if f.fract() != 0.0 || f < 1.0 || f > f64::from(u32::MAX) {
                    return None;
                }
                f as u64
            }
        },
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    if parsed == 0 {
        return None;
    }
    u32::try_from(parsed).ok()
}

/// Optional text field; numbers are rendered (barcodes often arrive as numbers).
fn optional_text(object: &Map<String, Value>, field: &str) -> Option<String> {
    let text = match object.get(field)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn raw_record(code: Value, name: Value, shelf_life: Value) -> Value {
        json!({
            "Код продукции": code,
            "Полное наименование (русское)": name,
            "Срок годности": shelf_life,
        })
    }

    #[test]
    fn test_validate_rejects_non_sequence() {
        let err = validate_schema(&json!({"a": 1})).expect_err("object must be rejected");
        assert_eq!(err, SchemaError::NotASequence { found: "object" });
    }

    #[test]
    fn test_validate_rejects_empty() {
        let err = validate_schema(&json!([])).expect_err("empty must be rejected");
        assert_eq!(err, SchemaError::Empty);
    }

    #[test]
    fn test_validate_drops_bad_records_individually() {
        let raw = json!([
            raw_record(json!("000001"), json!("Good"), json!(365)),
            raw_record(json!(""), json!("Empty code"), json!(10)),
            raw_record(json!(42), json!("Numeric code"), json!(10)),
            raw_record(json!("000004"), json!("Zero life"), json!(0)),
            raw_record(json!("000005"), json!("Text life"), json!("30")),
            {"Код продукции": "000006", "Срок годности": 5},
            "not an object",
        ]);
        let validated = validate_schema(&raw).expect("some records survive");
        let codes: Vec<&str> = validated.records.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["000001", "000005"]);
        assert_eq!(validated.dropped, 5);
        assert_eq!(validated.records[1].shelf_life_days, 30);
    }

    #[test]
    fn test_validate_all_invalid_fails() {
        let raw = json!([raw_record(json!(""), json!("x"), json!(1))]);
        let err = validate_schema(&raw).expect_err("no survivors");
        assert_eq!(err, SchemaError::NoValidRecords { dropped: 1 });
    }

    #[test]
    fn test_validate_optional_fields() {
        let raw = json!([{
            "Код продукции": "000001",
            "Полное наименование (русское)": "Sample",
            "Срок годности": 365.0,
            "Штук в упаковке": "abc",
            "Штрихкод упаковки": 4_600_000_000_017u64,
            "Производитель": "  ",
            "Название стандарта": "GOST 12345-2020",
        }]);
        let record = validate_schema(&raw)
            .expect("record is valid")
            .into_records()
            .remove(0);
        assert_eq!(record.shelf_life_days, 365);
        assert_eq!(record.units_per_pack, None);
        assert_eq!(record.pack_barcode.as_deref(), Some("4600000000017"));
        assert_eq!(record.manufacturer, None);
        assert_eq!(record.standard.as_deref(), Some("GOST 12345-2020"));
    }

    #[test]
    fn test_fractional_shelf_life_rejected() {
        let raw = json!([raw_record(json!("1"), json!("x"), json!(1.5))]);
        assert!(validate_schema(&raw).is_err());
    }

    #[test]
    fn test_checksum_is_order_sensitive() {
        let a = ProductRecord::new("1", "A", 1);
        let b = ProductRecord::new("2", "B", 2);
        assert_ne!(
            checksum(&[a.clone(), b.clone()]),
            checksum(&[b, a])
        );
    }

    #[test]
    fn test_checksum_distinguishes_absent_from_empty() {
        let absent = ProductRecord::new("1", "A", 1);
        let empty = ProductRecord::new("1", "A", 1).with_manufacturer("");
        assert_ne!(checksum(&[absent]), checksum(&[empty]));
    }

    fn arb_record() -> impl Strategy<Value = ProductRecord> {
        (
            "[0-9]{1,8}",
            "[A-Za-z ]{0,16}",
            1u32..=3650,
            proptest::option::of(1u32..=100),
            proptest::option::of("[0-9]{13}"),
        )
            .prop_map(|(code, name, days, units, barcode)| ProductRecord {
                code,
                name,
                shelf_life_days: days,
                units_per_pack: units,
                pack_barcode: barcode,
                manufacturer: None,
                standard: None,
            })
    }

    proptest! {
        /// Property: repeated calls give the same token.
        #[test]
        fn prop_checksum_deterministic(dataset in proptest::collection::vec(arb_record(), 0..20)) {
            prop_assert_eq!(checksum(&dataset), checksum(&dataset));
        }

        /// Property: mutating one shelf-life changes the token.
        #[test]
        fn prop_checksum_detects_mutation(
            dataset in proptest::collection::vec(arb_record(), 1..20),
            pick in any::<prop::sample::Index>(),
        ) {
            let mut mutated = dataset.clone();
            let i = pick.index(mutated.len());
            mutated[i].shelf_life_days = mutated[i].shelf_life_days.wrapping_add(1).max(1);
            prop_assume!(mutated[i] != dataset[i]);
            prop_assert_ne!(checksum(&dataset), checksum(&mutated));
        }

        /// Property: every survivor has a non-empty code and positive shelf life.
        #[test]
        fn prop_survivors_are_well_formed(
            codes in proptest::collection::vec("[ 0-9]{0,6}", 1..20),
            lives in proptest::collection::vec(-5i64..400, 1..20),
        ) {
            let raw = Value::Array(
                codes
                    .iter()
                    .zip(lives.iter())
                    .map(|(code, life)| raw_record(json!(code), json!("n"), json!(life)))
                    .collect(),
            );
            if let Ok(validated) = validate_schema(&raw) {
                for record in &validated.records {
                    prop_assert!(!record.code.is_empty());
                    prop_assert!(record.shelf_life_days > 0);
                }
            }
        }
    }
}
