//! Typed column bindings for upload templates.
//!
//! Template rows store a `field_key` string per column. Keys are parsed
//! into the closed [`RowField`] enum up front; anything unknown is a fatal
//! configuration error for the whole upload, never a per-row failure.

use crate::models::TemplateField;
use platform_core::error::AppError;

/// User-facing message for any template/column misconfiguration.
pub const INCORRECT_LINKING: &str = "Incorrect linking of template fields";

/// Every field a template column can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowField {
    FirstName,
    LastName,
    Phone,
    Email,
    Street,
    City,
    Province,
    Country,
    IdentificationNo,
    FairId,
    TraceId,
    Quantity,
    Price,
    TransactionDate,
    PlotName,
    PlotArea,
}

impl RowField {
    pub fn key(&self) -> &'static str {
        match self {
            Self::FirstName => "first_name",
            Self::LastName => "last_name",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Street => "street",
            Self::City => "city",
            Self::Province => "province",
            Self::Country => "country",
            Self::IdentificationNo => "identification_no",
            Self::FairId => "fair_id",
            Self::TraceId => "trace_id",
            Self::Quantity => "quantity",
            Self::Price => "price",
            Self::TransactionDate => "transaction_date",
            Self::PlotName => "plot_name",
            Self::PlotArea => "plot_area",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "first_name" => Some(Self::FirstName),
            "last_name" => Some(Self::LastName),
            "phone" => Some(Self::Phone),
            "email" => Some(Self::Email),
            "street" => Some(Self::Street),
            "city" => Some(Self::City),
            "province" => Some(Self::Province),
            "country" => Some(Self::Country),
            "identification_no" => Some(Self::IdentificationNo),
            "fair_id" => Some(Self::FairId),
            "trace_id" => Some(Self::TraceId),
            "quantity" => Some(Self::Quantity),
            "price" => Some(Self::Price),
            "transaction_date" => Some(Self::TransactionDate),
            "plot_name" => Some(Self::PlotName),
            "plot_area" => Some(Self::PlotArea),
            _ => None,
        }
    }
}

/// Validator selector for a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Phone,
    Email,
    Date,
    Country,
    List,
    FarmerId,
    TraceId,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Number => "number",
            Self::Phone => "phone",
            Self::Email => "email",
            Self::Date => "date",
            Self::Country => "country",
            Self::List => "list",
            Self::FarmerId => "farmer_id",
            Self::TraceId => "trace_id",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "number" => Some(Self::Number),
            "phone" => Some(Self::Phone),
            "email" => Some(Self::Email),
            "date" => Some(Self::Date),
            "country" => Some(Self::Country),
            "list" => Some(Self::List),
            "farmer_id" => Some(Self::FarmerId),
            "trace_id" => Some(Self::TraceId),
            _ => None,
        }
    }
}

/// One column position resolved to a typed field.
#[derive(Debug, Clone, Copy)]
pub struct ColumnBinding {
    pub column: usize,
    pub field: RowField,
    pub field_type: FieldType,
    pub required: bool,
}

impl ColumnBinding {
    /// Raw trimmed cell for this binding, or empty when the row is short.
    pub fn value_in<'a>(&self, row: &'a [String]) -> &'a str {
        row.get(self.column).map(|s| s.trim()).unwrap_or("")
    }
}

/// All bindings of one template, ordered by column position.
#[derive(Debug, Clone)]
pub struct TemplateBindings {
    bindings: Vec<ColumnBinding>,
}

impl TemplateBindings {
    pub fn from_fields(fields: &[TemplateField]) -> Result<Self, AppError> {
        let mut bindings = Vec::with_capacity(fields.len());
        for f in fields {
            let field = RowField::parse(&f.field_key)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!(INCORRECT_LINKING)))?;
            let field_type = FieldType::parse(&f.field_type)
                .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!(INCORRECT_LINKING)))?;
            if f.column_index < 0 {
                return Err(AppError::BadRequest(anyhow::anyhow!(INCORRECT_LINKING)));
            }
            bindings.push(ColumnBinding {
                column: f.column_index as usize,
                field,
                field_type,
                required: f.required,
            });
        }
        bindings.sort_by_key(|b| b.column);
        Ok(Self { bindings })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnBinding> {
        self.bindings.iter()
    }

    pub fn get(&self, field: RowField) -> Option<&ColumnBinding> {
        self.bindings.iter().find(|b| b.field == field)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Every binding must fall inside the sheet's column range, otherwise
    /// the template does not match the uploaded file.
    pub fn check_width(&self, column_count: usize) -> Result<(), AppError> {
        match self.bindings.iter().map(|b| b.column).max() {
            Some(max) if max >= column_count => {
                Err(AppError::BadRequest(anyhow::anyhow!(INCORRECT_LINKING)))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn field(column: i32, key: &str, field_type: &str) -> TemplateField {
        TemplateField {
            field_id: Uuid::new_v4(),
            template_id: Uuid::new_v4(),
            column_index: column,
            field_key: key.to_string(),
            field_type: field_type.to_string(),
            required: false,
        }
    }

    #[test]
    fn bindings_sorted_by_column() {
        let bindings = TemplateBindings::from_fields(&[
            field(2, "quantity", "number"),
            field(0, "first_name", "text"),
            field(1, "last_name", "text"),
        ])
        .unwrap();

        let columns: Vec<usize> = bindings.iter().map(|b| b.column).collect();
        assert_eq!(columns, vec![0, 1, 2]);
    }

    #[test]
    fn unknown_field_key_is_a_linking_error() {
        let err = TemplateBindings::from_fields(&[field(0, "middle_name", "text")]).unwrap_err();
        assert!(err.to_string().contains(INCORRECT_LINKING));
    }

    #[test]
    fn unknown_field_type_is_a_linking_error() {
        let err = TemplateBindings::from_fields(&[field(0, "first_name", "uuid")]).unwrap_err();
        assert!(err.to_string().contains(INCORRECT_LINKING));
    }

    #[test]
    fn binding_past_sheet_width_is_rejected() {
        let bindings = TemplateBindings::from_fields(&[field(5, "quantity", "number")]).unwrap();
        assert!(bindings.check_width(4).is_err());
        assert!(bindings.check_width(6).is_ok());
    }

    #[test]
    fn short_rows_read_as_blank() {
        let bindings = TemplateBindings::from_fields(&[field(3, "city", "text")]).unwrap();
        let row = vec!["a".to_string(), "b".to_string()];
        assert_eq!(bindings.get(RowField::City).unwrap().value_in(&row), "");
    }
}
