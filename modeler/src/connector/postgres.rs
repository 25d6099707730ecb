use tokio_postgres::NoTls;
use tokio_util::sync::CancellationToken;

use super::{
    ColumnInfo, ConnectorError, SourceConfig, SourceConnector, SourceRow, quote_identifier,
    split_table_name,
};

pub struct PostgresConnector {
    cfg: SourceConfig,
}

impl PostgresConnector {
    pub fn new(cfg: SourceConfig) -> Self {
        Self { cfg }
    }

    fn conn_str(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={} sslmode=prefer connect_timeout=30",
            self.cfg.host, self.cfg.port, self.cfg.database, self.cfg.username, self.cfg.password,
        )
    }

    async fn connect(&self) -> Result<tokio_postgres::Client, ConnectorError> {
        let (client, connection) = tokio_postgres::connect(&self.conn_str(), NoTls)
            .await
            .map_err(|e| ConnectorError::Connect(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("Source connection error: {e}");
            }
        });

        client
            .execute("SET statement_timeout = '300s'", &[])
            .await
            .map_err(|e| ConnectorError::Query(e.to_string()))?;

        Ok(client)
    }

    async fn connect_with_cancel(
        &self,
        cancel: &CancellationToken,
    ) -> Result<tokio_postgres::Client, ConnectorError> {
        tokio::select! {
            res = self.connect() => res,
            _ = cancel.cancelled() => Err(ConnectorError::Cancelled),
        }
    }
}

#[async_trait::async_trait]
impl SourceConnector for PostgresConnector {
    async fn test_connection(&self) -> Result<(), ConnectorError> {
        let client = self.connect().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| ConnectorError::Query(e.to_string()))?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, ConnectorError> {
        let client = self.connect().await?;
        let rows = client
            .query(
                "SELECT table_schema, table_name FROM information_schema.tables \
                 WHERE table_schema NOT IN ('pg_catalog', 'information_schema') \
                 AND table_schema !~ '^pg_toast' \
                 ORDER BY table_schema, table_name",
                &[],
            )
            .await
            .map_err(|e| ConnectorError::Query(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let schema: String = row.get(0);
                let table: String = row.get(1);
                if schema == "public" {
                    table
                } else {
                    format!("{schema}.{table}")
                }
            })
            .collect())
    }

    async fn describe_table(&self, table: &str) -> Result<Vec<ColumnInfo>, ConnectorError> {
        quote_identifier(table, '"')?;
        let (schema, name) = split_table_name(table, "public");
        let client = self.connect().await?;
        let rows = client
            .query(
                "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
                &[&schema, &name],
            )
            .await
            .map_err(|e| ConnectorError::Query(e.to_string()))?;

        if rows.is_empty() {
            return Err(ConnectorError::Query(format!("table not found: {schema}.{name}")));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let nullable: String = row.get(2);
                ColumnInfo {
                    name: row.get(0),
                    data_type: row.get(1),
                    nullable: nullable == "YES",
                }
            })
            .collect())
    }

    async fn fetch(
        &self,
        table: &str,
        columns: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceRow>, ConnectorError> {
        let select_list = columns
            .iter()
            .map(|c| quote_identifier(c, '"').map(|q| format!("{q}::text")))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        let sql = format!("SELECT {select_list} FROM {}", quote_identifier(table, '"')?);

        let client = self.connect_with_cancel(cancel).await?;
        let rows = tokio::select! {
            res = client.query(sql.as_str(), &[]) => {
                res.map_err(|e| ConnectorError::Query(e.to_string()))?
            }
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
        };

        Ok(rows
            .into_iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| row.get::<_, Option<String>>(i))
                    .collect::<SourceRow>()
            })
            .collect())
    }
}
