use arrow::datatypes::{DataType, Field, Schema};
use etl::models::KNOWN_FIELDS;
use lazy_static::lazy_static;
use std::fmt;

pub const DATE_REQUEST: &str = "date_request";
pub const COUNT: &str = "count";
pub const GROUP_COLUMNS: [&str; 3] = ["brewery_type", "country", "state"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Bronze,
    Silver,
    Gold,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn typed_field(name: &str) -> Field {
    match name {
        "longitude" | "latitude" => Field::new(name, DataType::Float64, true),
        _ => Field::new(name, DataType::Utf8, true),
    }
}

// Bronze: every typed field as the API delivered it, then passthrough columns.
pub fn bronze_schema(extra_columns: &[String]) -> Schema {
    let mut fields: Vec<Field> = KNOWN_FIELDS
        .iter()
        .map(|name| match *name {
            "id" => Field::new("id", DataType::Utf8, false),
            other => typed_field(other),
        })
        .collect();
    fields.extend(
        extra_columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true)),
    );
    fields.push(Field::new(DATE_REQUEST, DataType::Utf8, false));
    Schema::new(fields)
}

// Silver: the fixed curated projection. Partition-significant fields are never null.
pub fn silver_schema() -> Schema {
    let mut fields: Vec<Field> = KNOWN_FIELDS
        .iter()
        .map(|name| match *name {
            "id" | "country" | "state" => Field::new(*name, DataType::Utf8, false),
            other => typed_field(other),
        })
        .collect();
    fields.push(Field::new(DATE_REQUEST, DataType::Utf8, false));
    Schema::new(fields)
}

pub fn gold_schema() -> Schema {
    Schema::new(vec![
        Field::new(DATE_REQUEST, DataType::Utf8, false),
        Field::new("brewery_type", DataType::Utf8, true),
        Field::new("country", DataType::Utf8, false),
        Field::new("state", DataType::Utf8, false),
        Field::new(COUNT, DataType::Int64, false),
    ])
}

/// The grouping keys of the silver layer, used as gold's input table.
pub fn aggregation_input_schema() -> Schema {
    Schema::new(vec![
        Field::new("brewery_type", DataType::Utf8, true),
        Field::new("country", DataType::Utf8, false),
        Field::new("state", DataType::Utf8, false),
    ])
}

pub enum SchemaVersion {
    Silver,
    Gold,
    AggregationInput,
}

pub fn get_schema(version: SchemaVersion) -> &'static Schema {
    match version {
        SchemaVersion::Silver => &SILVER_SCHEMA,
        SchemaVersion::Gold => &GOLD_SCHEMA,
        SchemaVersion::AggregationInput => &AGGREGATION_INPUT_SCHEMA,
    }
}

lazy_static! {
    static ref SILVER_SCHEMA: Schema = silver_schema();
    static ref GOLD_SCHEMA: Schema = gold_schema();
    static ref AGGREGATION_INPUT_SCHEMA: Schema = aggregation_input_schema();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bronze_keeps_passthrough_columns_before_date() {
        let schema = bronze_schema(&["opening_hours".to_string(), "tags".to_string()]);
        let names: Vec<&str> = schema.fields().iter().map(|f| f.name().as_str()).collect();

        assert_eq!(names.len(), KNOWN_FIELDS.len() + 3);
        assert_eq!(names[KNOWN_FIELDS.len()], "opening_hours");
        assert_eq!(names.last(), Some(&DATE_REQUEST));
        assert!(!schema.field_with_name("id").unwrap().is_nullable());
    }

    #[test]
    fn test_silver_partition_fields_are_required() {
        let schema = get_schema(SchemaVersion::Silver);
        for name in ["id", "country", "state", DATE_REQUEST] {
            assert!(!schema.field_with_name(name).unwrap().is_nullable(), "{}", name);
        }
        assert!(schema.field_with_name("brewery_type").unwrap().is_nullable());
        assert_eq!(
            schema.field_with_name("latitude").unwrap().data_type(),
            &DataType::Float64
        );
    }

    #[test]
    fn test_gold_columns() {
        let names: Vec<String> = get_schema(SchemaVersion::Gold)
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec![DATE_REQUEST, "brewery_type", "country", "state", COUNT]);
    }
}
