use sqlx::postgres::PgConnection;
use sqlx::FromRow;
use tracing::debug;

use crate::app::error::ExtractError;
use crate::app::inspector::check_references;
use crate::app::models::{Column, Schema, Table};

#[derive(FromRow, Debug, Clone)]
pub struct ColumnInfo {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub column_default: Option<String>,
}

#[derive(FromRow, Debug, Clone)]
pub struct PrimaryKeyInfo {
    pub table_name: String,
    pub column_name: String,
}

#[derive(FromRow, Debug, Clone)]
pub struct ForeignKeyInfo {
    pub table_name: String,
    pub column_name: String,
    pub foreign_table_name: String,
    pub foreign_column_name: String,
}

/// Raw `information_schema` rows, one bulk query per kind.
#[derive(Debug, Clone, Default)]
pub struct CatalogRows {
    pub tables: Vec<String>,
    pub columns: Vec<ColumnInfo>,
    pub primary_keys: Vec<PrimaryKeyInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

// Bulk reader for a client/server database. Every kind of metadata is fetched
// in one round trip and linked in memory afterwards.
pub struct PostgresInspector<'a> {
    conn: &'a mut PgConnection,
    schema: String,
}

impl<'a> PostgresInspector<'a> {
    pub fn new(conn: &'a mut PgConnection, schema: impl Into<String>) -> Self {
        Self {
            conn,
            schema: schema.into(),
        }
    }

    pub async fn scan(mut self) -> Result<Schema, ExtractError> {
        let rows = self.fetch().await?;
        debug!(
            schema = %self.schema,
            tables = rows.tables.len(),
            columns = rows.columns.len(),
            "fetched catalog rows"
        );
        assemble(rows)
    }

    async fn fetch(&mut self) -> Result<CatalogRows, ExtractError> {
        let tables: Vec<(String,)> = sqlx::query_as(LIST_TABLES)
            .bind(&self.schema)
            .fetch_all(&mut *self.conn)
            .await
            .map_err(|source| ExtractError::Query {
                step: "list tables",
                source,
            })?;

        let columns = sqlx::query_as::<_, ColumnInfo>(
            r#"
            SELECT table_name::text, column_name::text, data_type::text, column_default::text
            FROM information_schema.columns
            WHERE table_schema = $1
            ORDER BY table_name, ordinal_position
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|source| ExtractError::Query {
            step: "list columns",
            source,
        })?;

        let primary_keys = sqlx::query_as::<_, PrimaryKeyInfo>(
            r#"
            SELECT kcu.table_name::text, kcu.column_name::text
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
              AND tc.table_schema = kcu.table_schema
            WHERE tc.constraint_type = 'PRIMARY KEY'
              AND tc.table_schema = $1
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|source| ExtractError::Query {
            step: "list primary keys",
            source,
        })?;

        // Pairs referencing and referenced columns by position so composite keys
        // do not cross-multiply.
        let foreign_keys = sqlx::query_as::<_, ForeignKeyInfo>(
            r#"
            SELECT
                kcu.table_name::text,
                kcu.column_name::text,
                ref.table_name::text AS foreign_table_name,
                ref.column_name::text AS foreign_column_name
            FROM information_schema.referential_constraints AS rc
            JOIN information_schema.key_column_usage AS kcu
                ON kcu.constraint_name = rc.constraint_name
                AND kcu.constraint_schema = rc.constraint_schema
            JOIN information_schema.key_column_usage AS ref
                ON ref.constraint_name = rc.unique_constraint_name
                AND ref.constraint_schema = rc.unique_constraint_schema
                AND ref.ordinal_position = kcu.position_in_unique_constraint
            WHERE kcu.table_schema = $1
            ORDER BY kcu.table_name, kcu.ordinal_position
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|source| ExtractError::Query {
            step: "list foreign keys",
            source,
        })?;

        Ok(CatalogRows {
            tables: tables.into_iter().map(|(name,)| name).collect(),
            columns,
            primary_keys,
            foreign_keys,
        })
    }
}

// Views are left out, matching what the embedded backend lists.
const LIST_TABLES: &str = r#"
    SELECT table_name::text
    FROM information_schema.tables
    WHERE table_schema = $1 AND table_type = 'BASE TABLE'
    ORDER BY table_name
"#;

/// Links bulk catalog rows into a schema: tables first, then primary keys, then
/// foreign keys. Any row naming a table or column not built in the first pass
/// aborts the whole extraction.
pub fn assemble(rows: CatalogRows) -> Result<Schema, ExtractError> {
    let mut schema = Schema::default();

    for table_name in rows.tables {
        let mut table = Table::new(&table_name);
        for col in rows.columns.iter().filter(|c| c.table_name == table_name) {
            table.add_column(
                Column::new(&col.column_name, &col.data_type).with_default(col.column_default.clone()),
            );
        }
        schema.tables.insert(table_name, table);
    }

    for pk in rows.primary_keys {
        column_mut(&mut schema, &pk.table_name, &pk.column_name)?.set_primary();
    }

    for fk in rows.foreign_keys {
        column_mut(&mut schema, &fk.table_name, &fk.column_name)?
            .add_foreign_key(fk.foreign_table_name, fk.foreign_column_name);
    }

    check_references(&schema)?;
    Ok(schema)
}

fn column_mut<'s>(schema: &'s mut Schema, table: &str, column: &str) -> Result<&'s mut Column, ExtractError> {
    schema
        .tables
        .get_mut(table)
        .ok_or_else(|| ExtractError::UnknownTable {
            table: table.to_string(),
        })?
        .column_mut(column)
        .ok_or_else(|| ExtractError::UnknownColumn {
            table: table.to_string(),
            column: column.to_string(),
        })
}
