//! Row Validator: per-column type-specific validation.
//!
//! Relational lookups (farmer fair ids, connected trace ids) are
//! preloaded into a [`ValidationContext`] before the pass starts, so the
//! validator itself is a pure, order-preserving function of the row. All
//! state is per-instance.

use crate::dtos::{FieldResult, RowResult};
use crate::sheet::PREVIEW_DATE_FORMAT;
use crate::template::{ColumnBinding, FieldType, TemplateBindings};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use uuid::Uuid;
use validator::ValidateEmail;

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 ()\-]{5,18}[0-9]$").expect("phone regex"));
static COUNTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z .'\-]*$").expect("country regex"));

/// Date formats accepted in uploaded cells, tried in order. Values are
/// normalized to [`PREVIEW_DATE_FORMAT`] in the frozen row data.
const ACCEPTED_DATE_FORMATS: [&str; 3] = ["%d-%m-%Y", "%d/%m/%Y", "%Y-%m-%d"];

/// Farmer metadata resolved for a valid fair id.
#[derive(Debug, Clone)]
pub struct FarmerRef {
    pub farmer_id: Uuid,
    pub name: String,
}

/// Relational lookups for one node/supply-chain, loaded once per upload.
#[derive(Debug, Default)]
pub struct ValidationContext {
    pub farmers_by_fair_id: HashMap<String, FarmerRef>,
    pub connected_trace_ids: HashSet<String>,
}

pub struct RowValidator<'a> {
    bindings: &'a TemplateBindings,
    ctx: &'a ValidationContext,
}

impl<'a> RowValidator<'a> {
    pub fn new(bindings: &'a TemplateBindings, ctx: &'a ValidationContext) -> Self {
        Self { bindings, ctx }
    }

    /// True when every bound cell of the row is blank; such rows are
    /// skipped entirely rather than failing required-field checks.
    pub fn is_blank_row(&self, row: &[String]) -> bool {
        self.bindings.iter().all(|b| b.value_in(row).is_empty())
    }

    /// Validate one data row. Duplicate flags start cleared; the
    /// detector fills them in afterwards without re-validating.
    pub fn validate_row(&self, index: usize, row: &[String]) -> RowResult {
        let fields: Vec<FieldResult> = self
            .bindings
            .iter()
            .map(|binding| self.validate_field(binding, row))
            .collect();

        let issue_count = fields.iter().filter(|f| !f.valid).count() as u32;
        let valid = issue_count == 0;

        RowResult {
            index,
            is_select: valid,
            is_removed: false,
            is_keep: false,
            is_duplicate: false,
            duplicate: None,
            double_entry: None,
            issue_count,
            valid,
            fields,
        }
    }

    fn validate_field(&self, binding: &ColumnBinding, row: &[String]) -> FieldResult {
        let raw = binding.value_in(row);

        let mut result = FieldResult {
            field: binding.field.key().to_string(),
            field_type: binding.field_type.as_str().to_string(),
            value: raw.to_string(),
            valid: true,
            message: None,
            meta: None,
        };

        if raw.is_empty() {
            if binding.required {
                result.valid = false;
                result.message = Some("This field is required".to_string());
            }
            return result;
        }

        match binding.field_type {
            FieldType::Text => {}
            FieldType::Number => match parse_number(raw) {
                Some(n) => result.value = n.to_string(),
                None => {
                    result.valid = false;
                    result.message = Some("Invalid number".to_string());
                }
            },
            FieldType::Phone => {
                if !PHONE_RE.is_match(raw) {
                    result.valid = false;
                    result.message = Some("Invalid phone number".to_string());
                }
            }
            FieldType::Email => {
                if !raw.validate_email() {
                    result.valid = false;
                    result.message = Some("Invalid email address".to_string());
                }
            }
            FieldType::Date => match parse_date(raw) {
                Some(date) => result.value = date.format(PREVIEW_DATE_FORMAT).to_string(),
                None => {
                    result.valid = false;
                    result.message = Some("Invalid date".to_string());
                }
            },
            FieldType::Country => {
                if !COUNTRY_RE.is_match(raw) {
                    result.valid = false;
                    result.message = Some("Invalid country".to_string());
                }
            }
            FieldType::List => {
                if parse_list(raw).is_none() {
                    result.valid = false;
                    result.message = Some("Invalid list value".to_string());
                }
            }
            FieldType::FarmerId => match self.ctx.farmers_by_fair_id.get(raw) {
                Some(farmer) => {
                    result.meta = Some(json!({
                        "farmer_id": farmer.farmer_id,
                        "name": farmer.name,
                    }));
                }
                None => {
                    result.valid = false;
                    result.message = Some("Invalid fair id".to_string());
                }
            },
            FieldType::TraceId => {
                // Format alone does not score this field: the identifier
                // must already be connected to the node/supply-chain.
                if !self.ctx.connected_trace_ids.contains(raw) {
                    result.valid = false;
                    result.message =
                        Some("Trace ID is not connected to this supply chain".to_string());
                }
            }
        }

        result
    }
}

pub fn parse_number(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw.trim()).ok().map(|d| d.normalize())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    ACCEPTED_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw.trim(), fmt).ok())
}

/// Parse a list-typed cell value. Only a strict JSON array of scalars is
/// accepted; anything else is rejected rather than evaluated.
pub fn parse_list(raw: &str) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    let items = value.as_array()?;
    items
        .iter()
        .map(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TemplateField;
    use crate::template::TemplateBindings;

    fn bindings(defs: &[(i32, &str, &str, bool)]) -> TemplateBindings {
        let fields: Vec<TemplateField> = defs
            .iter()
            .map(|(column, key, field_type, required)| TemplateField {
                field_id: Uuid::new_v4(),
                template_id: Uuid::new_v4(),
                column_index: *column,
                field_key: key.to_string(),
                field_type: field_type.to_string(),
                required: *required,
            })
            .collect();
        TemplateBindings::from_fields(&fields).unwrap()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn dates_normalize_to_preview_format() {
        assert_eq!(
            parse_date("2022-01-03").unwrap().format("%d-%m-%Y").to_string(),
            "03-01-2022"
        );
        assert_eq!(
            parse_date("03/01/2022").unwrap(),
            parse_date("03-01-2022").unwrap()
        );
        assert!(parse_date("13-13-2022").is_none());
    }

    #[test]
    fn numbers_normalize_trailing_zeros() {
        assert_eq!(parse_number("100.00").unwrap().to_string(), "100");
        assert_eq!(parse_number("12.50").unwrap().to_string(), "12.5");
        assert!(parse_number("12,5").is_none());
    }

    #[test]
    fn list_cells_only_accept_json_arrays() {
        assert_eq!(
            parse_list(r#"["a", "b"]"#).unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(parse_list("[1, 2]").unwrap(), vec!["1", "2"]);
        assert!(parse_list("__import__('os')").is_none());
        assert!(parse_list("{\"a\": 1}").is_none());
    }

    #[test]
    fn required_blank_cell_fails_optional_blank_passes() {
        let b = bindings(&[(0, "first_name", "text", true), (1, "city", "text", false)]);
        let ctx = ValidationContext::default();
        let validator = RowValidator::new(&b, &ctx);

        let result = validator.validate_row(0, &row(&["", ""]));
        assert!(!result.valid);
        assert_eq!(result.issue_count, 1);
        assert!(!result.field("first_name").unwrap().valid);
        assert!(result.field("city").unwrap().valid);
    }

    #[test]
    fn unknown_fair_id_marks_field_invalid() {
        let b = bindings(&[(0, "fair_id", "farmer_id", false)]);
        let ctx = ValidationContext::default();
        let validator = RowValidator::new(&b, &ctx);

        let result = validator.validate_row(0, &row(&["FF-123"]));
        assert!(!result.valid);
        assert!(result.issue_count >= 1);
        assert_eq!(
            result.field("fair_id").unwrap().message.as_deref(),
            Some("Invalid fair id")
        );
    }

    #[test]
    fn known_fair_id_resolves_farmer_metadata() {
        let b = bindings(&[(0, "fair_id", "farmer_id", false)]);
        let farmer_id = Uuid::new_v4();
        let mut ctx = ValidationContext::default();
        ctx.farmers_by_fair_id.insert(
            "FF-123".to_string(),
            FarmerRef {
                farmer_id,
                name: "Anjuna X".to_string(),
            },
        );
        let validator = RowValidator::new(&b, &ctx);

        let result = validator.validate_row(0, &row(&["FF-123"]));
        assert!(result.valid);
        let meta = result.field("fair_id").unwrap().meta.clone().unwrap();
        assert_eq!(meta["name"], "Anjuna X");
        assert_eq!(meta["farmer_id"], serde_json::json!(farmer_id));
    }

    #[test]
    fn unconnected_trace_id_scores_one_issue() {
        let b = bindings(&[(0, "trace_id", "trace_id", false)]);
        let mut ctx = ValidationContext::default();
        ctx.connected_trace_ids.insert("TR-1".to_string());
        let validator = RowValidator::new(&b, &ctx);

        assert!(validator.validate_row(0, &row(&["TR-1"])).valid);

        let result = validator.validate_row(1, &row(&["TR-2"]));
        assert!(!result.valid);
        assert_eq!(result.issue_count, 1);
    }

    #[test]
    fn list_cells_must_be_json_arrays() {
        let b = bindings(&[(0, "plot_name", "list", false)]);
        let ctx = ValidationContext::default();
        let validator = RowValidator::new(&b, &ctx);

        assert!(validator.validate_row(0, &row(&[r#"["North", "South"]"#])).valid);

        let bad = validator.validate_row(1, &row(&["North, South"]));
        assert!(!bad.valid);
        assert_eq!(
            bad.field("plot_name").unwrap().message.as_deref(),
            Some("Invalid list value")
        );
    }

    #[test]
    fn phone_and_email_formats() {
        let b = bindings(&[(0, "phone", "phone", false), (1, "email", "email", false)]);
        let ctx = ValidationContext::default();
        let validator = RowValidator::new(&b, &ctx);

        let ok = validator.validate_row(0, &row(&["+31 6 1234 5678", "anjuna@example.com"]));
        assert!(ok.valid);

        let bad = validator.validate_row(1, &row(&["phone-me", "not-an-email"]));
        assert_eq!(bad.issue_count, 2);
    }

    #[test]
    fn blank_row_detection_uses_bound_columns_only() {
        let b = bindings(&[(1, "first_name", "text", true)]);
        let ctx = ValidationContext::default();
        let validator = RowValidator::new(&b, &ctx);

        // Column 0 is not bound; noise there does not make the row count.
        assert!(validator.is_blank_row(&row(&["noise", ""])));
        assert!(!validator.is_blank_row(&row(&["", "Anjuna"])));
    }
}
