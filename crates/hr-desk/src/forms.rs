//! Typed extraction of user input with all field errors collected at once.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[serde(alias = "number")]
    Int,
    Date,
    #[serde(alias = "str")]
    Text,
}

/// Declares one input field of a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

fn default_kind() -> FieldKind {
    FieldKind::Text
}

impl FieldSpec {
    pub fn new(name: &str, label: &str, kind: FieldKind, required: bool) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            required,
        }
    }
}

/// Raw submitted values, exactly as the caller sent them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawForm(pub BTreeMap<String, Value>);

impl RawForm {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        )
    }

    /// Query-string input, where every value arrives as text.
    pub fn from_query(query: BTreeMap<String, String>) -> Self {
        Self(
            query
                .into_iter()
                .map(|(name, value)| (name, Value::String(value)))
                .collect(),
        )
    }

    /// Trimmed textual form of a field; blanks and nulls are absent.
    pub fn text(&self, name: &str) -> Option<String> {
        let raw = match self.0.get(name)? {
            Value::Null => return None,
            Value::String(text) => text.trim().to_string(),
            other => other.to_string(),
        };
        (!raw.is_empty()).then_some(raw)
    }

    /// Textual form of a field exactly as submitted. Whitespace-only values
    /// are still absent, but present ones are not trimmed.
    pub fn raw_text(&self, name: &str) -> Option<String> {
        let raw = match self.0.get(name)? {
            Value::Null => return None,
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        (!raw.trim().is_empty()).then_some(raw)
    }

    /// Everything submitted, rendered as strings so a form can be re-shown.
    pub fn preserved(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(name, value)| {
                let text = match value {
                    Value::Null => String::new(),
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (name.clone(), text)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Missing or malformed input. Carries the submitted values back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub errors: Vec<FieldError>,
    pub values: BTreeMap<String, String>,
}

impl ValidationFailure {
    pub fn single(field: &str, message: impl Into<String>, form: &RawForm) -> Self {
        Self {
            errors: vec![FieldError {
                field: field.to_string(),
                message: message.into(),
            }],
            values: form.preserved(),
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self
            .errors
            .iter()
            .map(|error| error.message.as_str())
            .collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationFailure {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Date(NaiveDate),
    Text(String),
    Null,
}

impl FieldValue {
    pub fn to_sql(&self) -> SqlValue {
        match self {
            Self::Int(value) => SqlValue::Integer(*value),
            Self::Date(date) => SqlValue::Text(date.format("%Y-%m-%d").to_string()),
            Self::Text(text) => SqlValue::Text(text.clone()),
            Self::Null => SqlValue::Null,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Self::Int(value) => value.to_string(),
            Self::Date(date) => date.format("%Y-%m-%d").to_string(),
            Self::Text(text) => text.clone(),
            Self::Null => String::new(),
        }
    }
}

/// Validated, typed values in field declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormValues {
    values: Vec<(String, FieldValue)>,
    #[serde(skip)]
    preserved: BTreeMap<String, String>,
}

impl FormValues {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(FieldValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(FieldValue::Text(text)) => Some(text.as_str()),
            _ => None,
        }
    }

    /// Accessor for a field declared `required`; a miss means the field list and
    /// the caller disagree, reported as a validation failure on that field.
    pub fn required_int(&self, name: &str) -> Result<i64, ValidationFailure> {
        self.int(name).ok_or_else(|| self.missing(name))
    }

    pub fn required_text(&self, name: &str) -> Result<String, ValidationFailure> {
        self.text(name)
            .map(str::to_string)
            .ok_or_else(|| self.missing(name))
    }

    fn missing(&self, name: &str) -> ValidationFailure {
        ValidationFailure {
            errors: vec![FieldError {
                field: name.to_string(),
                message: format!("Field '{name}' is required"),
            }],
            values: self.preserved.clone(),
        }
    }

    /// `(":name", value)` pairs for named-parameter scripts.
    pub fn named_params(&self) -> Vec<(String, SqlValue)> {
        self.values
            .iter()
            .map(|(name, value)| (format!(":{name}"), value.to_sql()))
            .collect()
    }

    /// Values in the given order; unknown names bind NULL.
    pub fn ordered(&self, names: &[String]) -> Vec<SqlValue> {
        names
            .iter()
            .map(|name| self.get(name).map_or(SqlValue::Null, FieldValue::to_sql))
            .collect()
    }

    pub fn as_json(&self) -> serde_json::Map<String, Value> {
        self.values
            .iter()
            .map(|(name, value)| {
                let json = serde_json::to_value(value).unwrap_or(Value::Null);
                (name.clone(), json)
            })
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Validate `form` against `fields`, reporting every problem at once.
pub fn collect(form: &RawForm, fields: &[FieldSpec]) -> Result<FormValues, ValidationFailure> {
    let mut values = Vec::with_capacity(fields.len());
    let mut errors = Vec::new();

    for field in fields {
        let Some(raw) = form.text(&field.name) else {
            if field.required {
                errors.push(FieldError {
                    field: field.name.clone(),
                    message: format!("Field '{}' is required", field.label),
                });
            }
            values.push((field.name.clone(), FieldValue::Null));
            continue;
        };

        let parsed = match field.kind {
            FieldKind::Int => raw
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|_| format!("Field '{}' must be a whole number", field.label)),
            FieldKind::Date => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .map(FieldValue::Date)
                .map_err(|_| format!("Field '{}' must be a date (YYYY-MM-DD)", field.label)),
            FieldKind::Text => Ok(FieldValue::Text(raw)),
        };

        match parsed {
            Ok(value) => values.push((field.name.clone(), value)),
            Err(message) => {
                errors.push(FieldError {
                    field: field.name.clone(),
                    message,
                });
                values.push((field.name.clone(), FieldValue::Null));
            }
        }
    }

    if errors.is_empty() {
        Ok(FormValues {
            values,
            preserved: form.preserved(),
        })
    } else {
        Err(ValidationFailure {
            errors,
            values: form.preserved(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn monthly_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("p_month", "Month (1-12)", FieldKind::Int, true),
            FieldSpec::new("p_year", "Year", FieldKind::Int, true),
            FieldSpec::new("p_office_id", "Office", FieldKind::Int, false),
        ]
    }

    #[test]
    fn collects_typed_values() {
        let form = RawForm::from_pairs([
            ("p_month", json!("5")),
            ("p_year", json!(2024)),
            ("p_office_id", json!("")),
        ]);
        let values = collect(&form, &monthly_fields()).expect("valid form");

        assert_eq!(values.int("p_month"), Some(5));
        assert_eq!(values.int("p_year"), Some(2024));
        assert_eq!(values.get("p_office_id"), Some(&FieldValue::Null));
        assert_eq!(
            values.ordered(&["p_year".to_string(), "p_month".to_string()]),
            vec![SqlValue::Integer(2024), SqlValue::Integer(5)]
        );
    }

    #[test]
    fn reports_every_error_and_preserves_input() {
        let form = RawForm::from_pairs([("p_month", json!("may")), ("p_office_id", json!("x1"))]);
        let failure = collect(&form, &monthly_fields()).expect_err("invalid form");

        let fields: Vec<&str> = failure
            .errors
            .iter()
            .map(|error| error.field.as_str())
            .collect();
        assert_eq!(fields, vec!["p_month", "p_year", "p_office_id"]);
        assert_eq!(failure.values.get("p_month").map(String::as_str), Some("may"));
        assert!(failure.to_string().contains("whole number"));
    }

    #[test]
    fn dates_must_be_iso_formatted() {
        let fields = vec![FieldSpec::new("start_date", "Start", FieldKind::Date, true)];
        let bad = RawForm::from_pairs([("start_date", json!("01.05.2024"))]);
        assert!(collect(&bad, &fields).is_err());

        let good = RawForm::from_pairs([("start_date", json!("2024-05-01"))]);
        let values = collect(&good, &fields).expect("valid date");
        assert_eq!(
            values.named_params(),
            vec![(
                ":start_date".to_string(),
                SqlValue::Text("2024-05-01".to_string())
            )]
        );
    }

    #[test]
    fn field_specs_deserialize_from_catalog_json() {
        let field: FieldSpec =
            serde_json::from_value(json!({"name": "year", "label": "Year", "type": "number"}))
                .expect("field parses");
        assert_eq!(field.kind, FieldKind::Int);
        assert!(!field.required);
    }
}
