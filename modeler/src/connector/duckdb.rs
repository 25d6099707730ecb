use duckdb::{AccessMode, Config, Connection};
use tokio_util::sync::CancellationToken;

use super::{
    ColumnInfo, ConnectorError, SourceConfig, SourceConnector, SourceRow, quote_identifier,
    split_table_name,
};

/// Rows between cancellation checks while reading.
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Reads a DuckDB file. The file is opened read-only per call so the
/// connector never holds a lock between operations.
pub struct DuckDbConnector {
    cfg: SourceConfig,
}

impl DuckDbConnector {
    pub fn new(cfg: SourceConfig) -> Self {
        Self { cfg }
    }

    fn open(path: &str) -> Result<Connection, ConnectorError> {
        let config = Config::default()
            .access_mode(AccessMode::ReadOnly)
            .map_err(|e| ConnectorError::Connect(e.to_string()))?;
        Connection::open_with_flags(path, config)
            .map_err(|e| ConnectorError::Connect(format!("{path}: {e}")))
    }

    /// Run `f` against a fresh read-only connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, ConnectorError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, ConnectorError> + Send + 'static,
    {
        let path = self.cfg.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Self::open(&path)?;
            f(&conn)
        })
        .await
        .map_err(|e| ConnectorError::Query(format!("blocking task failed: {e}")))?
    }
}

#[async_trait::async_trait]
impl SourceConnector for DuckDbConnector {
    async fn test_connection(&self) -> Result<(), ConnectorError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
                .map(|_| ())
                .map_err(|e| ConnectorError::Query(e.to_string()))
        })
        .await
    }

    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT table_schema, table_name FROM information_schema.tables \
                     WHERE table_schema NOT IN ('information_schema', 'pg_catalog') \
                     ORDER BY table_schema, table_name",
                )
                .map_err(|e| ConnectorError::Query(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| ConnectorError::Query(e.to_string()))?;

            let mut tables = Vec::new();
            for row in rows {
                let (schema, table) = row.map_err(|e| ConnectorError::Query(e.to_string()))?;
                if schema == "main" {
                    tables.push(table);
                } else {
                    tables.push(format!("{schema}.{table}"));
                }
            }
            Ok(tables)
        })
        .await
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError> {
        quote_identifier(table, '"')?;
        let (schema, name) = split_table_name(table, "main");
        let (schema, name) = (schema.to_string(), name.to_string());
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
                     WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
                )
                .map_err(|e| ConnectorError::Query(e.to_string()))?;
            let rows = stmt
                .query_map([&schema, &name], |row| {
                    Ok(ColumnInfo {
                        name: row.get(0)?,
                        data_type: row.get(1)?,
                        nullable: row.get::<_, String>(2)? == "YES",
                    })
                })
                .map_err(|e| ConnectorError::Query(e.to_string()))?;

            let columns = rows
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| ConnectorError::Query(e.to_string()))?;
            if columns.is_empty() {
                return Err(ConnectorError::Query(format!("table not found: {schema}.{name}")));
            }
            Ok(columns)
        })
        .await
    }

    async fn fetch(
        &self,
        table: &str,
        columns: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceRow>, ConnectorError> {
        let select_list = columns
            .iter()
            .map(|c| quote_identifier(c, '"').map(|q| format!("CAST({q} AS VARCHAR)")))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        let sql = format!("SELECT {select_list} FROM {}", quote_identifier(table, '"')?);
        let width = columns.len();
        let cancel = cancel.clone();

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| ConnectorError::Query(e.to_string()))?;
            let mut rows = stmt
                .query([])
                .map_err(|e| ConnectorError::Query(e.to_string()))?;

            let mut out: Vec<SourceRow> = Vec::new();
            while let Some(row) = rows.next().map_err(|e| ConnectorError::Query(e.to_string()))? {
                if out.len() % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                    return Err(ConnectorError::Cancelled);
                }
                let mut cells = Vec::with_capacity(width);
                for i in 0..width {
                    cells.push(
                        row.get::<_, Option<String>>(i)
                            .map_err(|e| ConnectorError::Query(e.to_string()))?,
                    );
                }
                out.push(cells);
            }
            Ok(out)
        })
        .await
    }
}
