//! DuckDB file that ETL runs load into.

use duckdb::{Connection, params_from_iter, types::Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::connector::{ConnectorError, quote_identifier, split_table_name};
use crate::etl::definition::{ColumnDefinition, TableDefinition, warehouse_type};
use crate::etl::transform::CellValue;

#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("failed to open warehouse {path}: {source}")]
    Open {
        path: String,
        source: duckdb::Error,
    },
    #[error("warehouse SQL error: {0}")]
    Sql(#[from] duckdb::Error),
    #[error(transparent)]
    Identifier(#[from] ConnectorError),
    #[error("table definition has no columns: {0}")]
    EmptyDefinition(String),
    #[error("row has {got} values, expected {expected}")]
    RowWidth { expected: usize, got: usize },
    #[error("warehouse connection poisoned")]
    Poisoned,
    #[error("blocking task failed: {0}")]
    Join(String),
}

/// One connection per warehouse file, shared and serialized behind a mutex.
#[derive(Clone)]
pub struct Warehouse {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warehouse").field("path", &self.path).finish()
    }
}

impl Warehouse {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WarehouseError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| WarehouseError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, WarehouseError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, WarehouseError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| WarehouseError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| WarehouseError::Join(e.to_string()))?
    }

    /// `CREATE TABLE IF NOT EXISTS` from a definition. An existing table is left untouched.
    pub async fn ensure_table(&self, def: &TableDefinition) -> Result<(), WarehouseError> {
        let ddl = create_table_sql(def)?;
        self.with_conn(move |conn| {
            conn.execute_batch(&ddl)?;
            Ok(())
        })
        .await
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool, WarehouseError> {
        quote_identifier(table, '"')?;
        let (schema, name) = split_table_name(table, "main");
        let (schema, name) = (schema.to_string(), name.to_string());
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = ? AND table_name = ?",
                [&schema, &name],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
        .await
    }

    /// Insert all rows in a single transaction; nothing is written if any row fails.
    /// With a primary key in the definition, rows with an existing key replace it.
    pub async fn append_rows(
        &self,
        def: &TableDefinition,
        rows: Vec<Vec<CellValue>>,
    ) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let sql = insert_sql(def)?;
        let width = def.columns.len();

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&sql)?;
                for row in &rows {
                    if row.len() != width {
                        return Err(WarehouseError::RowWidth {
                            expected: width,
                            got: row.len(),
                        });
                    }
                    let values: Vec<Value> = row.iter().map(to_duck_value).collect();
                    stmt.execute(params_from_iter(values))?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })
        .await
    }

    /// First `limit` rows as JSON objects keyed by column name.
    pub async fn preview(&self, table: &str, limit: usize) -> Result<Vec<JsonRow>, WarehouseError> {
        let quoted = quote_identifier(table, '"')?;
        let (schema, name) = split_table_name(table, "main");
        let (schema, name) = (schema.to_string(), name.to_string());

        self.with_conn(move |conn| {
            let columns = table_columns(conn, &schema, &name)?;
            if columns.is_empty() {
                return Ok(Vec::new());
            }
            select_rows(conn, &quoted, &columns, "", Vec::new(), limit)
        })
        .await
    }

    /// The row whose `key_column` equals `key`. `None` when the row or the
    /// table does not exist.
    pub async fn get_row(
        &self,
        table: &str,
        key_column: &str,
        key: CellValue,
    ) -> Result<Option<JsonRow>, WarehouseError> {
        let quoted = quote_identifier(table, '"')?;
        let filter = format!("WHERE {} = ?", quote_identifier(key_column, '"')?);
        let (schema, name) = split_table_name(table, "main");
        let (schema, name) = (schema.to_string(), name.to_string());

        self.with_conn(move |conn| {
            let columns = table_columns(conn, &schema, &name)?;
            if columns.is_empty() {
                return Ok(None);
            }
            let mut rows = select_rows(conn, &quoted, &columns, &filter, vec![to_duck_value(&key)], 1)?;
            Ok(rows.pop())
        })
        .await
    }

    /// Delete rows whose `key_column` equals `key`; returns how many went.
    pub async fn delete_row(
        &self,
        table: &str,
        key_column: &str,
        key: CellValue,
    ) -> Result<usize, WarehouseError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_identifier(table, '"')?,
            quote_identifier(key_column, '"')?
        );
        self.with_conn(move |conn| Ok(conn.execute(&sql, params_from_iter([to_duck_value(&key)]))?))
            .await
    }
}

/// A warehouse row keyed by column name.
pub type JsonRow = serde_json::Map<String, serde_json::Value>;

/// (column, DuckDB type) in table order; empty when the table is missing.
fn table_columns(
    conn: &Connection,
    schema: &str,
    name: &str,
) -> Result<Vec<(String, String)>, WarehouseError> {
    let mut stmt = conn.prepare(
        "SELECT column_name, data_type FROM information_schema.columns \
         WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
    )?;
    let columns = stmt
        .query_map([schema, name], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn select_rows(
    conn: &Connection,
    quoted_table: &str,
    columns: &[(String, String)],
    filter: &str,
    params: Vec<Value>,
    limit: usize,
) -> Result<Vec<JsonRow>, WarehouseError> {
    let select_list = columns
        .iter()
        .map(|(c, _)| format!("CAST(\"{}\" AS VARCHAR)", c.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT {select_list} FROM {quoted_table} {filter} LIMIT {limit}");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut obj = serde_json::Map::new();
        for (i, (col, data_type)) in columns.iter().enumerate() {
            let raw: Option<String> = row.get(i)?;
            obj.insert(col.clone(), json_value(raw, data_type));
        }
        out.push(obj);
    }
    Ok(out)
}

fn to_duck_value(cell: &CellValue) -> Value {
    match cell {
        CellValue::Null => Value::Null,
        CellValue::Int(i) => Value::BigInt(*i),
        CellValue::Float(f) => Value::Double(*f),
        CellValue::Bool(b) => Value::Boolean(*b),
        CellValue::Text(s) => Value::Text(s.clone()),
    }
}

/// Re-type a text cell for JSON output based on the column's DuckDB type.
fn json_value(raw: Option<String>, data_type: &str) -> serde_json::Value {
    let Some(raw) = raw else {
        return serde_json::Value::Null;
    };
    let upper = data_type.to_ascii_uppercase();
    if matches!(
        upper.as_str(),
        "BIGINT" | "INTEGER" | "SMALLINT" | "TINYINT" | "HUGEINT"
    ) {
        if let Ok(i) = raw.parse::<i64>() {
            return serde_json::Value::from(i);
        }
    } else if upper == "DOUBLE" || upper == "FLOAT" || upper == "REAL" || upper.starts_with("DECIMAL")
    {
        if let Some(n) = raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
            return serde_json::Value::Number(n);
        }
    } else if upper == "BOOLEAN" {
        return serde_json::Value::Bool(raw == "true");
    }
    serde_json::Value::String(raw)
}

fn column_sql(col: &ColumnDefinition) -> Result<String, WarehouseError> {
    let name = quote_identifier(&col.name, '"')?;
    let sql_type = warehouse_type(&col.sql_type);
    let not_null = if col.nullable && !col.primary_key {
        ""
    } else {
        " NOT NULL"
    };
    Ok(format!("{name} {sql_type}{not_null}"))
}

pub fn create_table_sql(def: &TableDefinition) -> Result<String, WarehouseError> {
    if def.columns.is_empty() {
        return Err(WarehouseError::EmptyDefinition(def.table_name.clone()));
    }
    let table = quote_identifier(&def.table_name, '"')?;
    let mut parts = def
        .columns
        .iter()
        .map(column_sql)
        .collect::<Result<Vec<_>, _>>()?;

    let pk = def
        .columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| quote_identifier(&c.name, '"'))
        .collect::<Result<Vec<_>, _>>()?;
    if !pk.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }

    let mut ddl = String::new();
    if let Some((schema, _)) = def.table_name.split_once('.') {
        ddl.push_str(&format!(
            "CREATE SCHEMA IF NOT EXISTS {};\n",
            quote_identifier(schema, '"')?
        ));
    }
    ddl.push_str(&format!(
        "CREATE TABLE IF NOT EXISTS {table} ({})",
        parts.join(", ")
    ));
    Ok(ddl)
}

fn insert_sql(def: &TableDefinition) -> Result<String, WarehouseError> {
    if def.columns.is_empty() {
        return Err(WarehouseError::EmptyDefinition(def.table_name.clone()));
    }
    let table = quote_identifier(&def.table_name, '"')?;
    let names = def
        .columns
        .iter()
        .map(|c| quote_identifier(&c.name, '"'))
        .collect::<Result<Vec<_>, _>>()?;
    // explicit casts let DATE/TIMESTAMP columns take normalised text
    let placeholders = def
        .columns
        .iter()
        .map(|c| {
            match warehouse_type(&c.sql_type) {
                t @ ("DATE" | "TIMESTAMP") => format!("CAST(? AS {t})"),
                _ => "?".to_string(),
            }
        })
        .collect::<Vec<_>>();
    let verb = if def.has_primary_key() {
        "INSERT OR REPLACE INTO"
    } else {
        "INSERT INTO"
    };
    Ok(format!(
        "{verb} {table} ({}) VALUES ({})",
        names.join(", "),
        placeholders.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, sql_type: &str, nullable: bool, pk: bool) -> ColumnDefinition {
        ColumnDefinition {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable,
            primary_key: pk,
            property_id: None,
            comment: None,
        }
    }

    fn station_def() -> TableDefinition {
        TableDefinition {
            table_name: "station".to_string(),
            columns: vec![
                col("id", "BIGINT", false, true),
                col("name", "VARCHAR", true, false),
                col("opened", "DATE", true, false),
                col("score", "DOUBLE", true, false),
            ],
        }
    }

    #[test]
    fn test_create_table_sql() {
        let ddl = create_table_sql(&station_def()).unwrap();
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"station\" (\"id\" BIGINT NOT NULL, \"name\" VARCHAR, \
             \"opened\" DATE, \"score\" DOUBLE, PRIMARY KEY (\"id\"))"
        );
    }

    #[test]
    fn test_create_table_sql_maps_property_types() {
        let def: TableDefinition = serde_json::from_value(serde_json::json!({
            "tableName": "toll_station",
            "columns": [
                {"name": "station_id", "type": "int", "required": true, "isPrimaryKey": true},
                {"name": "score", "type": "float"},
                {"name": "opened", "type": "datetime"},
                {"name": "open_day", "type": "date", "constraints": ["NOT NULL"]}
            ]
        }))
        .unwrap();
        assert_eq!(
            create_table_sql(&def).unwrap(),
            "CREATE TABLE IF NOT EXISTS \"toll_station\" (\"station_id\" BIGINT NOT NULL, \
             \"score\" DOUBLE, \"opened\" TIMESTAMP, \"open_day\" DATE NOT NULL, \
             PRIMARY KEY (\"station_id\"))"
        );
        assert_eq!(
            insert_sql(&def).unwrap(),
            "INSERT OR REPLACE INTO \"toll_station\" (\"station_id\", \"score\", \"opened\", \
             \"open_day\") VALUES (?, ?, CAST(? AS TIMESTAMP), CAST(? AS DATE))"
        );

        // columns built in code with a property type are mapped too
        let mut raw = col("lanes", "int", true, false);
        raw.sql_type = "long".to_string();
        assert_eq!(column_sql(&raw).unwrap(), "\"lanes\" BIGINT");
    }

    #[test]
    fn test_create_table_sql_rejects_bad_names() {
        let mut def = station_def();
        def.table_name = "station; DROP TABLE x".to_string();
        assert!(matches!(
            create_table_sql(&def),
            Err(WarehouseError::Identifier(_))
        ));

        let empty = TableDefinition {
            table_name: "t".to_string(),
            columns: vec![],
        };
        assert!(matches!(
            create_table_sql(&empty),
            Err(WarehouseError::EmptyDefinition(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_append_preview() {
        let dir = tempfile::tempdir().unwrap();
        let wh = Warehouse::open(dir.path().join("wh.duckdb")).unwrap();
        let def = station_def();

        assert!(!wh.table_exists("station").await.unwrap());
        wh.ensure_table(&def).await.unwrap();
        wh.ensure_table(&def).await.unwrap();
        assert!(wh.table_exists("station").await.unwrap());

        let written = wh
            .append_rows(
                &def,
                vec![
                    vec![
                        CellValue::Int(1),
                        CellValue::Text("North".to_string()),
                        CellValue::Text("2025-12-22".to_string()),
                        CellValue::Float(1.5),
                    ],
                    vec![
                        CellValue::Int(2),
                        CellValue::Null,
                        CellValue::Null,
                        CellValue::Null,
                    ],
                ],
            )
            .await
            .unwrap();
        assert_eq!(written, 2);

        let rows = wh.preview("station", 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        let first = rows.iter().find(|r| r["id"] == 1).unwrap();
        assert_eq!(first["name"], "North");
        assert_eq!(first["opened"], "2025-12-22");
        assert_eq!(first["score"], 1.5);
        let second = rows.iter().find(|r| r["id"] == 2).unwrap();
        assert!(second["name"].is_null());

        assert_eq!(wh.preview("station", 1).await.unwrap().len(), 1);
        assert!(wh.preview("missing", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_and_delete_row_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let wh = Warehouse::open(dir.path().join("wh.duckdb")).unwrap();
        let def = station_def();

        // missing table reads as no row
        assert!(wh.get_row("station", "id", CellValue::Int(1)).await.unwrap().is_none());

        wh.ensure_table(&def).await.unwrap();
        wh.append_rows(
            &def,
            vec![
                vec![
                    CellValue::Int(1),
                    CellValue::Text("North".to_string()),
                    CellValue::Text("2025-12-22".to_string()),
                    CellValue::Null,
                ],
                vec![
                    CellValue::Int(2),
                    CellValue::Text("South".to_string()),
                    CellValue::Null,
                    CellValue::Null,
                ],
            ],
        )
        .await
        .unwrap();

        let row = wh.get_row("station", "id", CellValue::Int(1)).await.unwrap().unwrap();
        assert_eq!(row["name"], "North");
        assert_eq!(row["opened"], "2025-12-22");
        assert!(wh.get_row("station", "id", CellValue::Int(9)).await.unwrap().is_none());

        assert_eq!(wh.delete_row("station", "id", CellValue::Int(1)).await.unwrap(), 1);
        assert_eq!(wh.delete_row("station", "id", CellValue::Int(1)).await.unwrap(), 0);
        assert!(wh.get_row("station", "id", CellValue::Int(1)).await.unwrap().is_none());
        assert_eq!(wh.preview("station", 10).await.unwrap().len(), 1);

        assert!(matches!(
            wh.get_row("station", "id; --", CellValue::Int(1)).await,
            Err(WarehouseError::Identifier(_))
        ));
    }

    #[tokio::test]
    async fn test_rerun_with_primary_key_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let wh = Warehouse::open(dir.path().join("wh.duckdb")).unwrap();
        let def = station_def();
        wh.ensure_table(&def).await.unwrap();

        let row = |name: &str| {
            vec![
                CellValue::Int(1),
                CellValue::Text(name.to_string()),
                CellValue::Null,
                CellValue::Null,
            ]
        };
        wh.append_rows(&def, vec![row("old")]).await.unwrap();
        wh.append_rows(&def, vec![row("new")]).await.unwrap();

        let rows = wh.preview("station", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "new");
    }

    #[tokio::test]
    async fn test_append_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let wh = Warehouse::open(dir.path().join("wh.duckdb")).unwrap();
        let def = station_def();
        wh.ensure_table(&def).await.unwrap();

        // second row violates NOT NULL on the key column
        let result = wh
            .append_rows(
                &def,
                vec![
                    vec![
                        CellValue::Int(1),
                        CellValue::Null,
                        CellValue::Null,
                        CellValue::Null,
                    ],
                    vec![
                        CellValue::Null,
                        CellValue::Null,
                        CellValue::Null,
                        CellValue::Null,
                    ],
                ],
            )
            .await;
        assert!(result.is_err());
        assert!(wh.preview("station", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_rejects_wrong_width() {
        let dir = tempfile::tempdir().unwrap();
        let wh = Warehouse::open(dir.path().join("wh.duckdb")).unwrap();
        let def = station_def();
        wh.ensure_table(&def).await.unwrap();

        let err = wh
            .append_rows(&def, vec![vec![CellValue::Int(1)]])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WarehouseError::RowWidth {
                expected: 4,
                got: 1
            }
        ));
    }
}
