//! Fixed column layout of every catalog table.
use crate::bitable::{FieldProperty, FieldSpec, SelectOption, TableSpec};
use crate::record::{FilterStatus, ImageCategory, LabelingStatus};

pub mod columns {
    pub const TASK_ID: &str = "Task ID";
    pub const IMAGE_CATEGORY: &str = "Image Category";
    pub const FILTER_STATUS: &str = "Filter Status";
    pub const LABELING_STATUS: &str = "Labeling Status";
    pub const INPUT_JSON: &str = "Input JSON";
    pub const OUTPUT_JSON: &str = "Output JSON";
    pub const MODIFIER: &str = "Modifier";
    pub const UPDATED_AT: &str = "Updated At";
}

/// Bitable field type codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Text,
    SingleSelect,
    ModifiedTime,
    ModifiedUser,
}

impl FieldType {
    pub fn code(self) -> u16 {
        match self {
            FieldType::Text => 1,
            FieldType::SingleSelect => 3,
            FieldType::ModifiedTime => 1002,
            FieldType::ModifiedUser => 1004,
        }
    }
}

fn field(name: &str, field_type: FieldType) -> FieldSpec {
    FieldSpec {
        field_name: name.to_string(),
        field_type: field_type.code(),
        ui_type: None,
        property: None,
    }
}

fn single_select<'a, I: IntoIterator<Item = &'a str>>(name: &str, options: I) -> FieldSpec {
    FieldSpec {
        ui_type: Some("SingleSelect".to_string()),
        property: Some(FieldProperty {
            options: options
                .into_iter()
                .enumerate()
                .map(|(color, name)| SelectOption {
                    name: name.to_string(),
                    color: color as u32,
                })
                .collect(),
        }),
        ..field(name, FieldType::SingleSelect)
    }
}

/// Table named `name` with the eight catalog columns.
pub fn catalog_table(name: &str, default_view_name: &str) -> TableSpec {
    TableSpec {
        name: name.to_string(),
        default_view_name: default_view_name.to_string(),
        fields: vec![
            field(columns::TASK_ID, FieldType::Text),
            single_select(
                columns::IMAGE_CATEGORY,
                ImageCategory::ALL.iter().map(|c| c.label()),
            ),
            single_select(
                columns::FILTER_STATUS,
                FilterStatus::ALL.iter().map(|s| s.label()),
            ),
            single_select(
                columns::LABELING_STATUS,
                LabelingStatus::ALL.iter().map(|s| s.label()),
            ),
            field(columns::INPUT_JSON, FieldType::Text),
            field(columns::OUTPUT_JSON, FieldType::Text),
            field(columns::MODIFIER, FieldType::ModifiedUser),
            field(columns::UPDATED_AT, FieldType::ModifiedTime),
        ],
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn eight_columns() {
        let table = catalog_table("v1-labeling-table-001", "data");
        assert_eq!(table.fields.len(), 8);
        let types: Vec<u16> = table.fields.iter().map(|f| f.field_type).collect();
        assert_eq!(types, vec![1, 3, 3, 3, 1, 1, 1004, 1002]);
    }

    #[test]
    fn request_body_shape() {
        let table = catalog_table("t", "data");
        let body = serde_json::to_value(&table).unwrap();
        assert_eq!(body["name"], "t");
        assert_eq!(body["default_view_name"], "data");
        assert_eq!(
            body["fields"][3],
            json!({
                "field_name": "Labeling Status",
                "type": 3,
                "ui_type": "SingleSelect",
                "property": {
                    "options": [
                        {"name": "in-progress", "color": 0},
                        {"name": "done", "color": 1},
                        {"name": "not-started", "color": 2},
                    ]
                }
            })
        );
        assert_eq!(body["fields"][0], json!({"field_name": "Task ID", "type": 1}));
    }
}
