use std::future::Future;
use std::time::Duration;

use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, Json, JsonValue, Uuid};
use sqlx::{Connection as _, Postgres, Row as _, Sqlite, TypeInfo, ValueRef};

use crate::app::error::{CatalogError, Result};
use crate::app::inspector::{PostgresInspector, SqliteInspector};
use crate::app::models::{Row, Schema, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Placeholder for the `index`-th (1-based) bound parameter.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${}", index),
        }
    }
}

/// Double-quotes an identifier, doubling any embedded quote.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[derive(Debug)]
enum Backend {
    Sqlite(SqliteConnection),
    Postgres(PgConnection),
}

#[derive(Debug)]
pub struct Connection {
    backend: Backend,
    statement_timeout: Option<Duration>,
}

impl From<SqliteConnection> for Connection {
    fn from(conn: SqliteConnection) -> Self {
        Self {
            backend: Backend::Sqlite(conn),
            statement_timeout: None,
        }
    }
}

impl From<PgConnection> for Connection {
    fn from(conn: PgConnection) -> Self {
        Self {
            backend: Backend::Postgres(conn),
            statement_timeout: None,
        }
    }
}

impl Connection {
    pub fn dialect(&self) -> Dialect {
        match self.backend {
            Backend::Sqlite(_) => Dialect::Sqlite,
            Backend::Postgres(_) => Dialect::Postgres,
        }
    }

    pub fn set_statement_timeout(&mut self, limit: Option<Duration>) {
        self.statement_timeout = limit;
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout
    }

    /// Extracts the schema with the inspector matching the backend. The
    /// statement timeout bounds the extraction as a whole.
    pub(crate) async fn inspect(&mut self, pg_schema: &str) -> Result<Schema> {
        let limit = self.statement_timeout;
        let fut = async {
            let scanned = match &mut self.backend {
                Backend::Sqlite(conn) => SqliteInspector::new(conn).scan().await,
                Backend::Postgres(conn) => PostgresInspector::new(conn, pg_schema).scan().await,
            };
            scanned.map_err(CatalogError::from)
        };
        with_deadline(limit, "schema extraction", fut).await
    }

    pub async fn fetch_all(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Row>> {
        let limit = self.statement_timeout;
        with_deadline(limit, statement, self.run(statement, params)).await
    }

    async fn run(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Row>> {
        match &mut self.backend {
            Backend::Sqlite(conn) => {
                let mut query = sqlx::query(statement);
                for value in params {
                    query = bind_sqlite(query, value)?;
                }
                let rows = query
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|source| statement_error(statement, source))?;
                Ok(rows.iter().map(decode_sqlite_row).collect())
            }
            Backend::Postgres(conn) => {
                let mut query = sqlx::query(statement);
                for value in params {
                    query = bind_postgres(query, value)?;
                }
                let rows = query
                    .fetch_all(&mut *conn)
                    .await
                    .map_err(|source| statement_error(statement, source))?;
                Ok(rows.iter().map(decode_pg_row).collect())
            }
        }
    }

    pub async fn close(self) -> std::result::Result<(), sqlx::Error> {
        match self.backend {
            Backend::Sqlite(conn) => conn.close().await,
            Backend::Postgres(conn) => conn.close().await,
        }
    }
}

fn statement_error(statement: &str, source: sqlx::Error) -> CatalogError {
    CatalogError::Statement {
        statement: statement.to_string(),
        source,
    }
}

pub(crate) async fn with_deadline<T, F>(limit: Option<Duration>, statement: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| CatalogError::Timeout {
                statement: statement.to_string(),
                limit,
            })?,
        None => fut.await,
    }
}

fn bind_sqlite<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Result<Query<'q, Sqlite, SqliteArguments<'q>>> {
    Ok(match value {
        Value::Null => query.bind(None::<i64>),
        Value::Integer(v) => query.bind(*v),
        Value::Real(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.clone()),
        Value::Blob(v) => query.bind(v.clone()),
        Value::Bool(v) => query.bind(*v),
        // No native decimal, uuid or json storage: these travel as text.
        Value::Numeric(v) => query.bind(v.to_string()),
        Value::Uuid(v) => query.bind(v.to_string()),
        Value::Json(v) => query.bind(v.to_string()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
        Value::TimestampTz(v) => query.bind(*v),
        Value::Unsupported(ty) => return Err(CatalogError::Unbindable(ty.clone())),
    })
}

fn bind_postgres<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Result<Query<'q, Postgres, PgArguments>> {
    Ok(match value {
        Value::Null => query.bind(None::<i64>),
        Value::Integer(v) => query.bind(*v),
        Value::Real(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.clone()),
        Value::Blob(v) => query.bind(v.clone()),
        Value::Bool(v) => query.bind(*v),
        Value::Numeric(v) => query.bind(*v),
        Value::Uuid(v) => query.bind(*v),
        Value::Json(v) => query.bind(Json(v.clone())),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
        Value::TimestampTz(v) => query.bind(*v),
        Value::Unsupported(ty) => return Err(CatalogError::Unbindable(ty.clone())),
    })
}

fn decode_sqlite_row(row: &SqliteRow) -> Row {
    (0..row.columns().len())
        .map(|i| {
            let raw = match row.try_get_raw(i) {
                Ok(raw) => raw,
                Err(_) => return Value::Null,
            };
            if raw.is_null() {
                return Value::Null;
            }
            // Storage class of the value itself, not the declared column type.
            let ty = raw.type_info().name().to_string();
            let decoded = match ty.as_str() {
                "INTEGER" | "BOOLEAN" => row.try_get_unchecked::<i64, _>(i).ok().map(Value::Integer),
                "REAL" => row.try_get_unchecked::<f64, _>(i).ok().map(Value::Real),
                "TEXT" => row.try_get_unchecked::<String, _>(i).ok().map(Value::Text),
                "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(i).ok().map(Value::Blob),
                _ => None,
            };
            decoded.unwrap_or(Value::Unsupported(ty))
        })
        .collect()
}

fn decode_pg_row(row: &PgRow) -> Row {
    (0..row.columns().len())
        .map(|i| {
            let raw = match row.try_get_raw(i) {
                Ok(raw) => raw,
                Err(_) => return Value::Null,
            };
            if raw.is_null() {
                return Value::Null;
            }
            let ty = raw.type_info().name().to_string();
            let decoded = match ty.as_str() {
                "BOOL" => row.try_get::<bool, _>(i).ok().map(Value::Bool),
                "INT2" => row.try_get::<i16, _>(i).ok().map(|v| Value::Integer(v.into())),
                "INT4" => row.try_get::<i32, _>(i).ok().map(|v| Value::Integer(v.into())),
                "INT8" => row.try_get::<i64, _>(i).ok().map(Value::Integer),
                "FLOAT4" => row.try_get::<f32, _>(i).ok().map(|v| Value::Real(v.into())),
                "FLOAT8" => row.try_get::<f64, _>(i).ok().map(Value::Real),
                // sqlx reports a blank-padded char(n) as CHAR.
                "TEXT" | "VARCHAR" | "CHAR" | "NAME" => {
                    row.try_get::<String, _>(i).ok().map(Value::Text)
                }
                "BYTEA" => row.try_get::<Vec<u8>, _>(i).ok().map(Value::Blob),
                "NUMERIC" => row.try_get::<Decimal, _>(i).ok().map(Value::Numeric),
                "DATE" => row.try_get::<NaiveDate, _>(i).ok().map(Value::Date),
                "TIME" => row.try_get::<NaiveTime, _>(i).ok().map(Value::Time),
                "TIMESTAMP" => row.try_get::<NaiveDateTime, _>(i).ok().map(Value::Timestamp),
                "TIMESTAMPTZ" => row.try_get::<DateTime<Utc>, _>(i).ok().map(Value::TimestampTz),
                "UUID" => row.try_get::<Uuid, _>(i).ok().map(Value::Uuid),
                "JSON" | "JSONB" => row
                    .try_get::<Json<JsonValue>, _>(i)
                    .ok()
                    .map(|Json(v)| Value::Json(v)),
                _ => None,
            };
            decoded.unwrap_or(Value::Unsupported(ty))
        })
        .collect()
}
