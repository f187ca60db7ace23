//! Normalization of sanctions hits.
//!
//! The backend has returned matches as flat records, with a nested
//! `properties` object, and with `details.properties`. Each output field is
//! described by an ordered list of dotted paths; the first path that yields a
//! non-empty value wins. Supporting a new payload shape means adding a path to
//! the tables below.

use serde_json::Value;

use crate::models::MatchRecord;

const NAME: &[&str] = &[
    "name",
    "firstName",
    "properties.firstName",
    "details.properties.firstName",
    "details.firstName",
];
const SURNAME: &[&str] = &[
    "surname",
    "lastName",
    "properties.lastName",
    "details.properties.lastName",
    "details.lastName",
];
const COUNTRY: &[&str] = &[
    "country",
    "properties.country",
    "details.properties.country",
    "details.country",
];
const SCORE: &[&str] = &["score", "matchScore"];
const BIRTH_DATE: &[&str] = &["birth_date", "birthDate"];
const BIRTH_PLACE: &[&str] = &["birthPlace"];
const NATIONALITY: &[&str] = &["nationality"];
const SANCTION_TYPE: &[&str] = &["sanctionType", "details.sanctionType"];
const SANCTION_LIST: &[&str] = &["sanctionList", "details.sanctionList"];
const SANCTION_DATE: &[&str] = &["sanctionDate", "details.sanctionDate"];
const DOCUMENT_TYPE: &[&str] = &["documentType"];
const DOCUMENT_NUMBER: &[&str] = &["documentNumber"];
const ADDITIONAL_INFO: &[&str] = &["additionalInfo", "info"];

/// Where a list-valued field may come from.
enum ListSource {
    /// An array of values.
    Array(&'static str),
    /// A single value wrapped into a one-element list.
    Single(&'static str),
}

const ADDRESSES: &[ListSource] = &[
    ListSource::Array("addresses"),
    ListSource::Array("properties.address"),
    ListSource::Array("details.properties.address"),
    ListSource::Single("address"),
];
const ALIASES: &[ListSource] = &[
    ListSource::Array("aliases"),
    ListSource::Array("properties.alias"),
    ListSource::Array("details.properties.alias"),
    ListSource::Single("alias"),
];

fn lookup<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(raw, |current, key| current.get(key))
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) if !map.is_empty() => Some(value.to_string()),
        _ => None,
    }
}

fn first_text(raw: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| lookup(raw, path).and_then(as_text))
}

fn first_number(raw: &Value, paths: &[&str]) -> Option<f64> {
    paths
        .iter()
        .find_map(|path| lookup(raw, path).and_then(Value::as_f64))
}

fn first_list(raw: &Value, sources: &[ListSource]) -> Vec<String> {
    for source in sources {
        match source {
            ListSource::Array(path) => {
                if let Some(Value::Array(items)) = lookup(raw, path) {
                    return items.iter().filter_map(as_text).collect();
                }
            }
            ListSource::Single(path) => {
                if let Some(text) = lookup(raw, path).and_then(as_text) {
                    return vec![text];
                }
            }
        }
    }
    Vec::new()
}

/// Flattens whatever the backend sent as `matches` into a list of raw records.
///
/// Accepts an array, a single object, or a JSON string holding either.
pub fn normalize_input(matches: &Value) -> Vec<Value> {
    match matches {
        Value::Array(items) => items.clone(),
        Value::Object(_) => vec![matches.clone()],
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            Ok(parsed @ Value::Object(_)) => vec![parsed],
            Ok(_) => Vec::new(),
            Err(e) => {
                tracing::warn!("Discarding unparseable matches string: {}", e);
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

/// Maps one raw hit onto a `MatchRecord`. Non-objects yield `None`.
pub fn map_to_standard(raw: &Value) -> Option<MatchRecord> {
    if !raw.is_object() {
        return None;
    }

    Some(MatchRecord {
        name: first_text(raw, NAME),
        surname: first_text(raw, SURNAME),
        country: first_text(raw, COUNTRY),
        score: first_number(raw, SCORE),
        birth_date: first_text(raw, BIRTH_DATE),
        birth_place: first_text(raw, BIRTH_PLACE),
        nationality: first_text(raw, NATIONALITY),
        sanction_type: first_text(raw, SANCTION_TYPE),
        sanction_list: first_text(raw, SANCTION_LIST),
        sanction_date: first_text(raw, SANCTION_DATE),
        document_type: first_text(raw, DOCUMENT_TYPE),
        document_number: first_text(raw, DOCUMENT_NUMBER),
        addresses: first_list(raw, ADDRESSES),
        aliases: first_list(raw, ALIASES),
        additional_info: first_text(raw, ADDITIONAL_INFO),
        original: raw.clone(),
    })
}

/// Normalizes a raw `matches` payload into records, dropping unusable entries.
pub fn format_matches(matches: &Value) -> Vec<MatchRecord> {
    let raw = normalize_input(matches);
    let total = raw.len();
    let formatted: Vec<MatchRecord> = raw.iter().filter_map(map_to_standard).collect();

    if formatted.len() != total {
        tracing::debug!(
            "Dropped {} of {} raw matches that were not objects",
            total - formatted.len(),
            total
        );
    }

    formatted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use serde_json::json;

    #[test]
    fn flat_record_maps_directly() {
        let raw = json!({
            "name": "Ivan",
            "surname": "Petrov",
            "country": "RU",
            "score": 91.5,
            "birth_date": "1970-01-01",
            "sanctionList": "EU",
            "aliases": ["I. Petrov", "Vanya"],
            "address": "Moscow"
        });

        let record = map_to_standard(&raw).unwrap();
        assert_eq!(record.name.as_deref(), Some("Ivan"));
        assert_eq!(record.surname.as_deref(), Some("Petrov"));
        assert_eq!(record.score, Some(91.5));
        assert_eq!(record.birth_date.as_deref(), Some("1970-01-01"));
        assert_eq!(record.sanction_list.as_deref(), Some("EU"));
        assert_eq!(record.aliases, vec!["I. Petrov", "Vanya"]);
        assert_eq!(record.addresses, vec!["Moscow"]);
        assert_eq!(record.risk(), RiskLevel::High);
        assert_eq!(record.original, raw);
    }

    #[test]
    fn nested_properties_are_searched_in_order() {
        let raw = json!({
            "matchScore": 64,
            "properties": {
                "firstName": "Anna",
                "lastName": "Kowalska",
                "address": ["Warsaw", "Krakow"]
            },
            "details": {
                "sanctionType": "asset freeze",
                "properties": { "country": "PL" }
            }
        });

        let record = map_to_standard(&raw).unwrap();
        assert_eq!(record.name.as_deref(), Some("Anna"));
        assert_eq!(record.surname.as_deref(), Some("Kowalska"));
        assert_eq!(record.country.as_deref(), Some("PL"));
        assert_eq!(record.score, Some(64.0));
        assert_eq!(record.sanction_type.as_deref(), Some("asset freeze"));
        assert_eq!(record.addresses, vec!["Warsaw", "Krakow"]);
    }

    #[test]
    fn empty_strings_fall_through_to_later_paths() {
        let raw = json!({ "name": "", "firstName": "Mehmet" });
        let record = map_to_standard(&raw).unwrap();
        assert_eq!(record.name.as_deref(), Some("Mehmet"));
    }

    #[test]
    fn missing_fields_stay_absent_until_display() {
        let record = map_to_standard(&json!({})).unwrap();
        assert_eq!(record.name, None);
        assert_eq!(record.country, None);
        assert_eq!(record.score, None);
        assert_eq!(record.display_name(), "Unknown");
        assert_eq!(record.display_country(), "N/A");
        assert_eq!(MatchRecord::display_or_na(&record.nationality), "N/A");
        assert_eq!(record.risk(), RiskLevel::Unknown);
    }

    #[test]
    fn input_shapes_are_flattened() {
        assert!(format_matches(&Value::Null).is_empty());
        assert_eq!(format_matches(&json!({"name": "A"})).len(), 1);
        assert_eq!(
            format_matches(&json!(r#"[{"name":"A"},{"name":"B"}]"#)).len(),
            2
        );
        assert!(format_matches(&json!("not json")).is_empty());
        assert_eq!(format_matches(&json!([{"name": "A"}, 7, null])).len(), 1);
    }
}
