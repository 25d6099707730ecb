//! Physical table definitions derived from a model and its properties.

use serde::{Deserialize, Deserializer, Serialize};

use crate::entity::{data_model, property};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
}

/// Deserializes from either the native shape (`nullable`, `primaryKey`) or the
/// property-style shape (`required`, `isPrimaryKey`, `constraints: ["NOT NULL"]`).
/// Property types such as `int` or `datetime` are normalised to warehouse types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "ColumnWire")]
pub struct ColumnDefinition {
    pub name: String,
    /// Warehouse SQL type (BIGINT, INTEGER, DOUBLE, BOOLEAN, DATE, TIMESTAMP, VARCHAR)
    #[serde(rename = "type")]
    pub sql_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColumnWire {
    name: String,
    #[serde(rename = "type")]
    sql_type: String,
    nullable: Option<bool>,
    #[serde(default, deserialize_with = "flag")]
    required: bool,
    #[serde(default, alias = "isPrimaryKey", deserialize_with = "flag")]
    primary_key: bool,
    #[serde(default)]
    constraints: Option<Vec<String>>,
    property_id: Option<i32>,
    comment: Option<String>,
}

impl From<ColumnWire> for ColumnDefinition {
    fn from(w: ColumnWire) -> Self {
        let not_null = w
            .constraints
            .unwrap_or_default()
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case("NOT NULL"));
        Self {
            sql_type: warehouse_type(&w.sql_type).to_string(),
            nullable: w.nullable.unwrap_or(true) && !w.required && !not_null,
            primary_key: w.primary_key,
            name: w.name,
            property_id: w.property_id,
            comment: w.comment,
        }
    }
}

/// `true`/`false` or `1`/`0`.
fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flag::deserialize(d)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(|c| c.primary_key)
    }
}

/// Lowercase snake_case: `StationName` / `station name` / `station-name`
/// all become `station_name`.
pub fn snake_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 4);
    let mut prev: Option<char> = None;
    for c in input.trim().chars() {
        if c.is_uppercase() {
            if matches!(prev, Some(p) if p.is_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c.is_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
        prev = Some(c);
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "col".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Warehouse SQL type for a property type.
pub fn sql_type_for(prop_type: &str) -> &'static str {
    match prop_type.trim().to_ascii_lowercase().as_str() {
        "int" | "integer" | "bigint" | "long" => "BIGINT",
        "float" | "double" | "decimal" => "DOUBLE",
        "boolean" | "bool" => "BOOLEAN",
        "date" => "DATE",
        "datetime" | "timestamp" => "TIMESTAMP",
        _ => "VARCHAR",
    }
}

/// Normalise a declared column type (SQL or property style) to a warehouse type.
pub fn warehouse_type(declared: &str) -> &'static str {
    match declared.trim().to_ascii_uppercase().as_str() {
        "INTEGER" | "INT4" => "INTEGER",
        "REAL" | "FLOAT" | "FLOAT8" => "DOUBLE",
        _ => sql_type_for(declared),
    }
}

/// Table name for a model: its code, or its snake-cased name when the code is blank.
pub fn table_name_for(model: &data_model::Model) -> String {
    if model.code.trim().is_empty() {
        snake_case(&model.name)
    } else {
        model.code.trim().to_string()
    }
}

pub fn generate_table_definition(
    model: &data_model::Model,
    properties: &[property::Model],
) -> TableDefinition {
    let mut props: Vec<&property::Model> = properties.iter().collect();
    props.sort_by_key(|p| p.id);

    TableDefinition {
        table_name: table_name_for(model),
        columns: props
            .into_iter()
            .map(|p| ColumnDefinition {
                name: p.column_name(),
                sql_type: sql_type_for(&p.prop_type).to_string(),
                nullable: !p.required,
                primary_key: p.is_primary_key,
                property_id: Some(p.id),
                comment: Some(p.name.clone()),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn model(code: &str, name: &str) -> data_model::Model {
        let now = Utc::now().naive_utc();
        data_model::Model {
            id: 1,
            name: name.to_string(),
            code: code.to_string(),
            description: None,
            creator: None,
            domain_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn prop(id: i32, name: &str, prop_type: &str, required: bool, pk: bool) -> property::Model {
        property::Model {
            id,
            model_id: 1,
            name: name.to_string(),
            code: snake_case(name),
            prop_type: prop_type.to_string(),
            required,
            description: None,
            is_primary_key: pk,
            is_foreign_key: false,
            default_value: None,
            constraints: "[]".to_string(),
            sensitivity_level: None,
            mask_rule: None,
            physical_column: None,
            foreign_key_table: None,
            foreign_key_column: None,
        }
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("StationName"), "station_name");
        assert_eq!(snake_case("Station ID"), "station_id");
        assert_eq!(snake_case("toll-road  code"), "toll_road_code");
        assert_eq!(snake_case("already_snake"), "already_snake");
        assert_eq!(snake_case("lane2Count"), "lane2_count");
        assert_eq!(snake_case("  "), "col");
    }

    #[test]
    fn test_sql_type_mapping() {
        assert_eq!(sql_type_for("int"), "BIGINT");
        assert_eq!(sql_type_for("Integer"), "BIGINT");
        assert_eq!(sql_type_for("decimal"), "DOUBLE");
        assert_eq!(sql_type_for("boolean"), "BOOLEAN");
        assert_eq!(sql_type_for("date"), "DATE");
        assert_eq!(sql_type_for("datetime"), "TIMESTAMP");
        assert_eq!(sql_type_for("string"), "VARCHAR");
        assert_eq!(sql_type_for("whatever"), "VARCHAR");
    }

    #[test]
    fn test_generate_uses_code_and_physical_columns() {
        let mut station_id = prop(2, "Station ID", "int", true, true);
        station_id.physical_column = Some("sid".to_string());
        let props = vec![prop(3, "Opened At", "datetime", false, false), station_id];

        let def = generate_table_definition(&model("toll_station", "Toll Station"), &props);
        assert_eq!(def.table_name, "toll_station");
        assert_eq!(def.columns.len(), 2);

        // ordered by property id
        assert_eq!(def.columns[0].name, "sid");
        assert_eq!(def.columns[0].sql_type, "BIGINT");
        assert!(!def.columns[0].nullable);
        assert!(def.columns[0].primary_key);
        assert_eq!(def.columns[0].property_id, Some(2));

        assert_eq!(def.columns[1].name, "opened_at");
        assert_eq!(def.columns[1].sql_type, "TIMESTAMP");
        assert!(def.columns[1].nullable);
        assert!(def.has_primary_key());
    }

    #[test]
    fn test_blank_code_falls_back_to_name() {
        let def = generate_table_definition(&model("  ", "Toll Station"), &[]);
        assert_eq!(def.table_name, "toll_station");
        assert!(def.columns.is_empty());
    }

    #[test]
    fn test_definition_json_shape() {
        let json = serde_json::json!({
            "tableName": "station",
            "columns": [{"name": "id", "type": "BIGINT", "primaryKey": true}]
        });
        let def: TableDefinition = serde_json::from_value(json).unwrap();
        assert!(def.columns[0].nullable);
        assert!(def.columns[0].primary_key);
        assert_eq!(def.column("id").map(|c| c.sql_type.as_str()), Some("BIGINT"));
    }

    #[test]
    fn test_property_style_definition() {
        // property-style columns carry required flags and constraint lists
        let json = serde_json::json!({
            "tableName": "toll_station",
            "columns": [
                {"name": "station_id", "type": "int", "required": true,
                 "constraints": ["NOT NULL"], "isPrimaryKey": true, "isForeignKey": false},
                {"name": "score", "type": "float", "required": false, "constraints": []},
                {"name": "opened", "type": "datetime", "required": 0},
                {"name": "region", "type": "string", "required": 1},
                {"name": "code", "type": "varchar", "constraints": ["not null"]},
                {"name": "lanes", "type": "INTEGER", "nullable": false}
            ]
        });
        let def: TableDefinition = serde_json::from_value(json).unwrap();
        let c = |name: &str| def.column(name).unwrap();

        assert_eq!(c("station_id").sql_type, "BIGINT");
        assert!(c("station_id").primary_key);
        assert!(!c("station_id").nullable);
        assert_eq!(c("score").sql_type, "DOUBLE");
        assert!(c("score").nullable);
        assert_eq!(c("opened").sql_type, "TIMESTAMP");
        assert!(c("opened").nullable);
        assert_eq!(c("region").sql_type, "VARCHAR");
        assert!(!c("region").nullable);
        assert!(!c("code").nullable);
        assert_eq!(c("lanes").sql_type, "INTEGER");
        assert!(!c("lanes").nullable);
    }

    #[test]
    fn test_warehouse_type() {
        assert_eq!(warehouse_type("BIGINT"), "BIGINT");
        assert_eq!(warehouse_type("integer"), "INTEGER");
        assert_eq!(warehouse_type("float"), "DOUBLE");
        assert_eq!(warehouse_type("decimal"), "DOUBLE");
        assert_eq!(warehouse_type("Timestamp"), "TIMESTAMP");
        assert_eq!(warehouse_type("VARCHAR(64)"), "VARCHAR");
    }
}
