use sqlx::sqlite::SqliteConnection;
use sqlx::FromRow;
use tracing::debug;

use crate::app::error::ExtractError;
use crate::app::inspector::check_references;
use crate::app::models::{Column, Schema, Table};

#[derive(FromRow, Debug, Clone)]
struct ColumnRow {
    name: String,
    #[sqlx(rename = "type")]
    datatype: String,
    dflt_value: Option<String>,
    pk: i64,
}

#[derive(FromRow, Debug, Clone)]
struct ForeignKeyRow {
    #[sqlx(rename = "table")]
    target_table: String,
    #[sqlx(rename = "from")]
    column_name: String,
    #[sqlx(rename = "to")]
    target_column: Option<String>,
}

// Reads the schema of an embedded database through its table-valued pragmas,
// one table at a time.
pub struct SqliteInspector<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> SqliteInspector<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn scan(mut self) -> Result<Schema, ExtractError> {
        let names: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|source| ExtractError::Query {
            step: "list tables",
            source,
        })?;

        let mut schema = Schema::default();
        // Targets are linked once every table is known.
        let mut references = Vec::new();

        for (table_name,) in names {
            let columns = self.get_columns(&table_name).await?;
            let foreign_keys = self.get_foreign_keys(&table_name).await?;

            let mut table = Table::new(&table_name);
            for col in columns {
                let mut column = Column::new(col.name, col.datatype).with_default(col.dflt_value);
                // Composite keys number their members 1, 2, ...
                if col.pk != 0 {
                    column.set_primary();
                }
                table.add_column(column);
            }

            for fk in foreign_keys {
                let column = find_ignore_case(table.columns.keys(), &fk.column_name).ok_or_else(|| {
                    ExtractError::UnknownColumn {
                        table: table_name.clone(),
                        column: fk.column_name.clone(),
                    }
                })?;
                references.push((table_name.clone(), column, fk));
            }

            debug!(table = %table_name, columns = table.columns.len(), "extracted table");
            schema.tables.insert(table_name, table);
        }

        for (table_name, column_name, fk) in references {
            // The pragma reports the target as spelled in the DDL.
            let target_table =
                find_ignore_case(schema.tables.keys(), &fk.target_table).unwrap_or(fk.target_table);
            let target_column = match fk.target_column {
                Some(target_column) => schema
                    .table(&target_table)
                    .and_then(|t| find_ignore_case(t.columns.keys(), &target_column))
                    .unwrap_or(target_column),
                None => single_primary_key(&schema, &target_table).ok_or_else(|| {
                    ExtractError::ImplicitTargetUnresolved {
                        table: table_name.clone(),
                        column: column_name.clone(),
                        target_table: target_table.clone(),
                    }
                })?,
            };
            if let Some(column) = schema
                .tables
                .get_mut(&table_name)
                .and_then(|t| t.column_mut(&column_name))
            {
                column.add_foreign_key(target_table, target_column);
            }
        }

        check_references(&schema)?;
        Ok(schema)
    }

    async fn get_columns(&mut self, table_name: &str) -> Result<Vec<ColumnRow>, ExtractError> {
        sqlx::query_as::<_, ColumnRow>(
            r#"SELECT name, type, dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#,
        )
        .bind(table_name)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|source| ExtractError::Query {
            step: "table info",
            source,
        })
    }

    async fn get_foreign_keys(&mut self, table_name: &str) -> Result<Vec<ForeignKeyRow>, ExtractError> {
        sqlx::query_as::<_, ForeignKeyRow>(
            r#"SELECT "table", "from", "to" FROM pragma_foreign_key_list(?1) ORDER BY id, seq"#,
        )
        .bind(table_name)
        .fetch_all(&mut *self.conn)
        .await
        .map_err(|source| ExtractError::Query {
            step: "foreign key list",
            source,
        })
    }
}

// SQLite identifiers compare case-insensitively; returns the declared spelling.
fn find_ignore_case<'n>(mut names: impl Iterator<Item = &'n String>, wanted: &str) -> Option<String> {
    names.find(|name| name.eq_ignore_ascii_case(wanted)).cloned()
}

fn single_primary_key(schema: &Schema, table: &str) -> Option<String> {
    let mut keys = schema.table(table)?.primary_keys();
    match (keys.next(), keys.next()) {
        (Some(key), None) => Some(key.name.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::{Connection, Executor};

    async fn scan(ddl: &str) -> Result<Schema, ExtractError> {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        conn.execute(ddl).await.unwrap();
        SqliteInspector::new(&mut conn).scan().await
    }

    #[tokio::test]
    async fn composite_primary_keys_are_all_marked() {
        let schema = scan(
            "CREATE TABLE membership (group_id INTEGER, user_id INTEGER, note TEXT DEFAULT 'none',
             PRIMARY KEY (group_id, user_id));",
        )
        .await
        .unwrap();

        let table = schema.table("membership").unwrap();
        let keys: Vec<_> = table.primary_keys().map(|c| c.name.as_str()).collect();
        assert_eq!(keys, ["group_id", "user_id"]);
        assert_eq!(table.column("note").unwrap().default.as_deref(), Some("'none'"));
    }

    #[tokio::test]
    async fn implicit_reference_resolves_to_primary_key() {
        let schema = scan(
            "CREATE TABLE city (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE district (id INTEGER PRIMARY KEY, city_id INTEGER REFERENCES city);",
        )
        .await
        .unwrap();

        let fk = schema.tables["district"].columns["city_id"].foreign_key.clone().unwrap();
        assert_eq!(fk.target_table, "city");
        assert_eq!(fk.target_column, "id");
    }

    #[tokio::test]
    async fn mixed_case_reference_links_declared_names() {
        let schema = scan(
            "CREATE TABLE city (id INTEGER PRIMARY KEY, name TEXT);
             CREATE TABLE district (id INTEGER PRIMARY KEY, city_id INTEGER REFERENCES City(ID));
             CREATE TABLE street (id INTEGER PRIMARY KEY, district_id INTEGER REFERENCES DISTRICT);",
        )
        .await
        .unwrap();

        let fk = schema.tables["district"].columns["city_id"].foreign_key.clone().unwrap();
        assert_eq!(fk.target_table, "city");
        assert_eq!(fk.target_column, "id");

        let fk = schema.tables["street"].columns["district_id"].foreign_key.clone().unwrap();
        assert_eq!(fk.target_table, "district");
        assert_eq!(fk.target_column, "id");

        let binding = crate::app::resolver::MasterDetail::bind(
            &schema.tables["district"],
            "city_id",
            &schema.tables["city"],
        )
        .unwrap();
        assert_eq!(binding.master_column, "id");
    }

    #[tokio::test]
    async fn reference_to_missing_table_is_fatal() {
        let err = scan("CREATE TABLE district (id INTEGER PRIMARY KEY, region_id INTEGER REFERENCES region(id));")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::DanglingReference { ref target_table, .. } if target_table == "region"));
    }

    #[tokio::test]
    async fn views_are_not_listed() {
        let schema = scan(
            "CREATE TABLE city (id INTEGER PRIMARY KEY, name TEXT);
             CREATE VIEW city_names AS SELECT name FROM city;",
        )
        .await
        .unwrap();
        let names: Vec<_> = schema.tables.keys().map(String::as_str).collect();
        assert_eq!(names, ["city"]);
    }

    #[tokio::test]
    async fn internal_tables_are_skipped() {
        let schema = scan("CREATE TABLE seq (id INTEGER PRIMARY KEY AUTOINCREMENT);")
            .await
            .unwrap();
        let names: Vec<_> = schema.tables.keys().map(String::as_str).collect();
        assert_eq!(names, ["seq"]);
    }
}
