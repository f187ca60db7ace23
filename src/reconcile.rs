//! Carrying OCR extraction results into the registration form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::errors::AppError;
use crate::models::{FormField, RegistrationForm, StatusLine};

/// Extraction key → form field.
pub const OCR_FIELD_MAP: &[(&str, FormField)] = &[
    ("first_name", FormField::Name),
    ("last_name", FormField::Surname),
    ("document_number", FormField::DocumentNumber),
    ("birth_date", FormField::BirthDate),
    ("birth_place", FormField::BirthPlace),
    ("document_issue_place", FormField::DocumentIssuePlace),
    ("document_issue_date", FormField::DocumentIssueDate),
    ("expiry_date", FormField::ExpiryDate),
    ("address", FormField::Address),
    ("nationality", FormField::Nationality),
    ("sex", FormField::Sex),
];

fn form_field_for(key: &str) -> Option<FormField> {
    OCR_FIELD_MAP
        .iter()
        .find(|(ocr_key, _)| *ocr_key == key)
        .map(|(_, field)| *field)
}

/// Text of an extracted value, or `None` for the "no value" markers.
fn extracted_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() || s == "null" => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Translates extraction keys into form fields, dropping empty values and
/// keys the form has no place for.
pub fn map_fields(extracted: &Map<String, Value>) -> BTreeMap<FormField, String> {
    let mut mapped = BTreeMap::new();
    for (key, value) in extracted {
        let Some(text) = extracted_text(value) else {
            continue;
        };
        match form_field_for(key) {
            Some(field) => {
                tracing::debug!("Mapped: {} -> {} = \"{}\"", key, field, text);
                mapped.insert(field, text);
            }
            None => tracing::trace!("No form field for extracted key {}", key),
        }
    }
    mapped
}

/// Receives fields written by the OCR path.
pub trait FieldUpdater {
    fn update_field(&mut self, field: FormField, value: &str) -> Result<(), AppError>;
}

/// Outcome of a partially or fully successful application.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: Vec<FormField>,
    pub failed: Vec<(FormField, AppError)>,
}

impl ApplyReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// Why nothing was written to the form.
#[derive(Debug)]
pub enum ApplyFailure {
    NoExtractionData,
    NoUpdater,
    NoMappableFields,
    /// Every field was rejected by the updater.
    NothingApplied(Vec<(FormField, AppError)>),
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyFailure::NoExtractionData => {
                write!(f, "No extracted data available to apply to form.")
            }
            ApplyFailure::NoUpdater => write!(f, "Form update function not available."),
            ApplyFailure::NoMappableFields => {
                write!(f, "No mappable fields found in extracted data.")
            }
            ApplyFailure::NothingApplied(_) => write!(f, "No fields could be applied to the form."),
        }
    }
}

impl ApplyFailure {
    pub fn status(&self) -> StatusLine {
        match self {
            ApplyFailure::NoExtractionData => StatusLine::error(self.to_string()),
            _ => StatusLine::warning(self.to_string()),
        }
    }
}

/// Writes mapped extraction results through `updater`.
///
/// Succeeds when at least one field was applied.
pub fn apply_to_form(
    extracted: Option<&Map<String, Value>>,
    updater: Option<&mut dyn FieldUpdater>,
) -> Result<ApplyReport, ApplyFailure> {
    let extracted = extracted.ok_or(ApplyFailure::NoExtractionData)?;
    let updater = updater.ok_or(ApplyFailure::NoUpdater)?;

    let mapped = map_fields(extracted);
    if mapped.is_empty() {
        return Err(ApplyFailure::NoMappableFields);
    }

    let mut report = ApplyReport::default();
    for (field, value) in mapped {
        match updater.update_field(field, &value) {
            Ok(()) => {
                tracing::debug!("✓ Applied to form: {} = \"{}\"", field, value);
                report.applied.push(field);
            }
            Err(e) => {
                tracing::warn!("✗ Failed to apply field {}: {}", field, e);
                report.failed.push((field, e));
            }
        }
    }

    if report.applied.is_empty() {
        return Err(ApplyFailure::NothingApplied(report.failed));
    }

    tracing::info!("Applied {} OCR fields to form", report.applied_count());
    Ok(report)
}

/// Fields populated by OCR, in first-populated order, without duplicates.
///
/// User edits never remove a field from the set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<FormField>", into = "Vec<FormField>")]
pub struct OcrFieldSet {
    fields: Vec<FormField>,
}

impl From<Vec<FormField>> for OcrFieldSet {
    fn from(fields: Vec<FormField>) -> Self {
        let mut set = Self::default();
        for field in fields {
            set.insert(field);
        }
        set
    }
}

impl From<OcrFieldSet> for Vec<FormField> {
    fn from(set: OcrFieldSet) -> Self {
        set.fields
    }
}

impl OcrFieldSet {
    /// Returns `false` when the field was already present.
    pub fn insert(&mut self, field: FormField) -> bool {
        if self.fields.contains(&field) {
            return false;
        }
        self.fields.push(field);
        true
    }

    pub fn contains(&self, field: FormField) -> bool {
        self.fields.contains(&field)
    }

    pub fn as_slice(&self) -> &[FormField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether the field should be shown as auto-filled right now.
    pub fn is_auto_filled(&self, field: FormField, form: &RegistrationForm) -> bool {
        self.contains(field) && !form.get(field).is_empty()
    }

    /// Wire form: a JSON array of field names.
    pub fn to_json(&self) -> String {
        let names: Vec<&str> = self.fields.iter().map(FormField::as_str).collect();
        serde_json::Value::from(names).to_string()
    }
}

fn title_case(key: &str) -> String {
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `"Title Case Key: value"` lines for every non-empty extracted value.
pub fn format_extracted_fields(extracted: &Map<String, Value>) -> Vec<String> {
    extracted
        .iter()
        .filter_map(|(key, value)| {
            extracted_text(value).map(|text| format!("{}: {}", title_case(key), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[derive(Default)]
    struct Recorder {
        form: RegistrationForm,
        reject: Vec<FormField>,
    }

    impl FieldUpdater for Recorder {
        fn update_field(&mut self, field: FormField, value: &str) -> Result<(), AppError> {
            if self.reject.contains(&field) {
                return Err(AppError::InvalidInput(format!("{} is read-only", field)));
            }
            self.form.set(field, value);
            Ok(())
        }
    }

    #[test]
    fn maps_known_keys_and_drops_nulls() {
        let extracted = object(json!({
            "first_name": "Jane",
            "last_name": "Doe",
            "document_number": null
        }));

        let mapped = map_fields(&extracted);
        let expected: BTreeMap<FormField, String> = [
            (FormField::Name, "Jane".to_string()),
            (FormField::Surname, "Doe".to_string()),
        ]
        .into_iter()
        .collect();
        assert_eq!(mapped, expected);
    }

    #[test]
    fn null_string_and_unknown_keys_are_dropped() {
        let extracted = object(json!({
            "sex": "null",
            "birth_place": "",
            "mrz_line": "P<BELDOE<<JANE",
            "nationality": "BEL"
        }));

        let mapped = map_fields(&extracted);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped.get(&FormField::Nationality).map(String::as_str), Some("BEL"));
    }

    #[test]
    fn scalars_are_rendered_as_text() {
        let mapped = map_fields(&object(json!({ "document_number": 123456, "sex": true })));
        assert_eq!(mapped.get(&FormField::DocumentNumber).map(String::as_str), Some("123456"));
        assert_eq!(mapped.get(&FormField::Sex).map(String::as_str), Some("true"));
    }

    #[test]
    fn mapping_is_idempotent() {
        let extracted = object(json!({ "first_name": "Jane", "address": "Rue Haute 1" }));
        assert_eq!(map_fields(&extracted), map_fields(&extracted));
    }

    #[test]
    fn failures_are_distinguishable() {
        let mut recorder = Recorder::default();
        let empty = Map::new();

        assert!(matches!(
            apply_to_form(None, Some(&mut recorder)),
            Err(ApplyFailure::NoExtractionData)
        ));
        assert!(matches!(apply_to_form(Some(&empty), None), Err(ApplyFailure::NoUpdater)));
        assert!(matches!(
            apply_to_form(Some(&empty), Some(&mut recorder)),
            Err(ApplyFailure::NoMappableFields)
        ));

        let mut stubborn = Recorder {
            reject: vec![FormField::Name],
            ..Recorder::default()
        };
        let only_name = object(json!({ "first_name": "Jane" }));
        match apply_to_form(Some(&only_name), Some(&mut stubborn)) {
            Err(ApplyFailure::NothingApplied(failed)) => assert_eq!(failed.len(), 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn partial_application_reports_counts() {
        let mut recorder = Recorder {
            reject: vec![FormField::Surname],
            ..Recorder::default()
        };
        let extracted = object(json!({ "first_name": "Jane", "last_name": "Doe" }));

        let report = apply_to_form(Some(&extracted), Some(&mut recorder)).unwrap();
        assert_eq!(report.applied, vec![FormField::Name]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(recorder.form.name, "Jane");
        assert_eq!(recorder.form.surname, "");
    }

    #[test]
    fn field_set_is_ordered_and_unique() {
        let mut set = OcrFieldSet::default();
        assert!(set.insert(FormField::Surname));
        assert!(set.insert(FormField::Name));
        assert!(!set.insert(FormField::Surname));

        assert_eq!(set.as_slice(), &[FormField::Surname, FormField::Name]);
        assert_eq!(set.to_json(), r#"["surname","name"]"#);

        let restored: OcrFieldSet =
            serde_json::from_str(r#"["name","name","sex"]"#).unwrap();
        assert_eq!(restored.as_slice(), &[FormField::Name, FormField::Sex]);
    }

    #[test]
    fn auto_filled_needs_membership_and_a_value() {
        let mut set = OcrFieldSet::default();
        set.insert(FormField::Name);
        let mut form = RegistrationForm::for_customer("Jane", "Doe");

        assert!(set.is_auto_filled(FormField::Name, &form));
        assert!(!set.is_auto_filled(FormField::Surname, &form));

        form.set(FormField::Name, "");
        assert!(!set.is_auto_filled(FormField::Name, &form));
    }

    #[test]
    fn extracted_fields_are_title_cased() {
        let extracted = object(json!({
            "document_issue_place": "Brussels, Belgium",
            "expiry_date": null
        }));
        assert_eq!(
            format_extracted_fields(&extracted),
            vec!["Document Issue Place: Brussels, Belgium".to_string()]
        );
    }
}
