//! PostgreSQL-backed store.
//!
//! One connection per meter, opened lazily on the first flush and reopened
//! after the server drops it. Each flush runs in a single server-side
//! transaction with multi-row `INSERT` statements.

use postgres::types::ToSql;
use postgres::{Client, NoTls};
use postgres_native_tls::MakeTlsConnector;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::storage::{Connector, RecordSet, Store, StoreError, Transaction, Value};

/// Upper bound on bind parameters in one statement (protocol limit).
const MAX_PARAMS: usize = 65535;

/// TLS mode derived from `sslmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TlsMode {
    Disable,
    Require,
}

fn tls_mode(sslmode: &str) -> TlsMode {
    match sslmode {
        "require" | "verify-ca" | "verify-full" => TlsMode::Require,
        _ => TlsMode::Disable,
    }
}

/// Opens [`PgStore`]s from the `[database]` configuration section.
#[derive(Debug, Clone)]
pub struct PgConnector {
    config: DatabaseConfig,
}

impl PgConnector {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }

    fn connection_string(&self) -> String {
        let c = &self.config;
        let mut s = format!(
            "host={} port={} user={} dbname={} connect_timeout={}",
            conn_value(&c.host),
            c.port,
            conn_value(&c.user),
            conn_value(&c.database),
            c.connect_timeout_secs
        );
        if !c.password.is_empty() {
            s.push_str(&format!(" password={}", conn_value(&c.password)));
        }
        if tls_mode(&c.sslmode) == TlsMode::Require {
            s.push_str(" sslmode=require");
        }
        s
    }
}

/// Quotes a key/value connection parameter when it holds spaces, quotes or
/// backslashes.
fn conn_value(value: &str) -> String {
    let plain = !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\');
    if plain {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

impl Connector for PgConnector {
    fn connect(&self) -> Result<Box<dyn Store>, StoreError> {
        Ok(Box::new(PgStore {
            connection_string: self.connection_string(),
            tls: tls_mode(&self.config.sslmode),
            client: None,
        }))
    }

    fn describe(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}",
            self.config.user, self.config.host, self.config.port, self.config.database
        )
    }
}

/// A lazily connected PostgreSQL store.
pub struct PgStore {
    connection_string: String,
    tls: TlsMode,
    client: Option<Client>,
}

impl PgStore {
    /// Ensures a live connection, reconnecting if the previous one was closed.
    fn ensure_connected(&mut self) -> Result<(), StoreError> {
        if let Some(client) = &self.client {
            if !client.is_closed() {
                return Ok(());
            }
            debug!("postgres connection closed, reconnecting");
        }
        self.client = None;

        let client = match self.tls {
            TlsMode::Disable => Client::connect(&self.connection_string, NoTls),
            TlsMode::Require => {
                let connector = native_tls::TlsConnector::builder()
                    .build()
                    .map_err(|e| StoreError::Connect(e.to_string()))?;
                Client::connect(&self.connection_string, MakeTlsConnector::new(connector))
            }
        }
        .map_err(|e| StoreError::Connect(format_postgres_error(&e)))?;

        info!("connected to postgres");
        self.client = Some(client);
        Ok(())
    }
}

impl Store for PgStore {
    fn begin(&mut self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        self.ensure_connected()?;
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| StoreError::Connect("not connected".to_string()))?;
        let tx = client
            .transaction()
            .map_err(|e| StoreError::Begin(format_postgres_error(&e)))?;
        Ok(Box::new(PgTransaction { tx }))
    }
}

struct PgTransaction<'a> {
    tx: postgres::Transaction<'a>,
}

impl Transaction for PgTransaction<'_> {
    fn insert(&mut self, records: &RecordSet) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let ncols = records.columns().len();
        let rows_per_stmt = (MAX_PARAMS / ncols.max(1)).max(1);

        let mut written = 0;
        for chunk in records.rows().chunks(rows_per_stmt) {
            let sql = insert_sql(records.table(), records.columns(), chunk.len());
            let params: Vec<&(dyn ToSql + Sync)> =
                chunk.iter().flatten().map(sql_param).collect();
            written += self
                .tx
                .execute(sql.as_str(), &params)
                .map_err(|e| StoreError::Insert {
                    table: records.table().to_string(),
                    message: format_postgres_error(&e),
                })?;
        }
        Ok(written)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .map_err(|e| StoreError::Commit(format_postgres_error(&e)))
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .map_err(|e| StoreError::Rollback(format_postgres_error(&e)))
    }
}

fn sql_param(value: &Value) -> &(dyn ToSql + Sync) {
    match value {
        Value::Int(v) => v,
        Value::Float(v) => v,
        Value::Text(v) => v,
        Value::Timestamp(v) => v,
        Value::Bool(v) => v,
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Builds `INSERT INTO "t" ("a","b") VALUES ($1,$2),($3,$4)` for `rows` rows.
fn insert_sql(table: &str, columns: &[String], rows: usize) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_ident(table),
        cols.join(",")
    );
    let mut n = 1;
    for r in 0..rows {
        if r > 0 {
            sql.push(',');
        }
        sql.push('(');
        for c in 0..columns.len() {
            if c > 0 {
                sql.push(',');
            }
            sql.push_str(&format!("${}", n));
            n += 1;
        }
        sql.push(')');
    }
    sql
}

/// Formats PostgreSQL error message for logs.
fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else {
            msg
        }
    }
}
