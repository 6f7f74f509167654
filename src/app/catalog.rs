use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection as _};
use tracing::{debug, info, warn};

use crate::app::connection::{quote_ident, Connection};
use crate::app::error::{CatalogError, Result};
use crate::app::formatter;
use crate::app::models::{Row, Schema, Table, Value};
use crate::app::resolver::{Filter, MasterDetail};

pub const DEFAULT_PG_PORT: u16 = 5432;
pub const DEFAULT_PG_SCHEMA: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
    pub dbname: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    File(PathBuf),
    Server(ServerAddress),
}

impl Target {
    pub fn name(&self) -> String {
        match self {
            Target::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Target::Server(addr) => addr.dbname.clone(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::File(path) => write!(f, "{}", path.display()),
            Target::Server(addr) => write!(f, "{}:{}/{}", addr.host, addr.port, addr.dbname),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Schema read on a server database. Ignored for embedded files.
    pub schema: String,
    pub statement_timeout: Option<Duration>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            schema: DEFAULT_PG_SCHEMA.to_string(),
            statement_timeout: None,
        }
    }
}

impl Table {
    pub async fn query(&self, conn: &mut Connection, filter: Option<&Filter>) -> Result<Vec<Row>> {
        let mut statement = format!("SELECT * FROM {}", quote_ident(&self.name));
        let mut params = Vec::new();
        if let Some(filter) = filter {
            statement.push_str(" WHERE ");
            statement.push_str(&filter.clause(conn.dialect(), 1));
            params.push(filter.value.clone());
        }
        conn.fetch_all(&statement, &params).await
    }

    /// `SELECT * FROM <table> <condition>` with `condition` pasted verbatim.
    ///
    /// Nothing in `condition` is escaped or bound: only pass text the caller wrote
    /// itself, never values that came from users or from the database. Prefer
    /// [`Table::query`] with a [`Filter`].
    pub async fn query_unchecked(&self, conn: &mut Connection, condition: &str) -> Result<Vec<Row>> {
        let statement = format!("SELECT * FROM {} {}", quote_ident(&self.name), condition);
        conn.fetch_all(&statement, &[]).await
    }

    pub async fn freeform_query(&self, conn: &mut Connection, statement: &str) -> Result<Vec<Row>> {
        conn.fetch_all(statement, &[]).await
    }

    pub fn select_with_joins(&self) -> String {
        let base = quote_ident(&self.name);
        let mut fields = vec![format!("{}.*", base)];
        let mut joins = String::new();

        for (i, (column, fk)) in self.foreign_keys().enumerate() {
            let Some(join) = &fk.join else { continue };
            let alias = quote_ident(&format!("j{}", i));
            fields.push(format!(
                "{}.{} AS {}",
                alias,
                quote_ident(&join.column),
                quote_ident(&format!("{}_{}", column.name, join.column))
            ));
            joins.push_str(&format!(
                " {} {} AS {} ON {}.{} = {}.{}",
                join.kind.keyword(),
                quote_ident(&fk.target_table),
                alias,
                base,
                quote_ident(&column.name),
                alias,
                quote_ident(&fk.target_column)
            ));
        }

        format!("SELECT {} FROM {}{}", fields.join(", "), base, joins)
    }

    pub async fn query_joined(&self, conn: &mut Connection, filter: Option<&Filter>) -> Result<Vec<Row>> {
        let mut statement = self.select_with_joins();
        let mut params = Vec::new();
        if let Some(filter) = filter {
            statement.push_str(&format!(
                " WHERE {}.{}",
                quote_ident(&self.name),
                filter.clause(conn.dialect(), 1)
            ));
            params.push(filter.value.clone());
        }
        conn.fetch_all(&statement, &params).await
    }

    pub fn describe(&self) -> String {
        formatter::describe_table(self)
    }
}

#[derive(Debug)]
pub struct SchemaCatalog {
    target: Target,
    connection: Option<Connection>,
    schema: Schema,
    options: ExtractOptions,
}

impl SchemaCatalog {
    pub async fn open_sqlite(path: impl AsRef<Path>, options: ExtractOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = SqliteConnectOptions::new()
            .filename(&path)
            .connect()
            .await
            .map_err(|source| CatalogError::Connect {
                target: path.display().to_string(),
                source,
            })?;
        Ok(Self::with_connection(Target::File(path), conn.into(), options))
    }

    /// Creates a server catalog. With credentials it authenticates and, once
    /// connected, extracts. A failed login leaves the catalog unconnected and
    /// empty rather than returning an error; check [`SchemaCatalog::connected`].
    pub async fn postgres(
        address: ServerAddress,
        credentials: Option<Credentials>,
        options: ExtractOptions,
    ) -> Result<Self> {
        let mut catalog = Self {
            target: Target::Server(address),
            connection: None,
            schema: Schema::default(),
            options,
        };
        if let Some(credentials) = credentials {
            if catalog.authenticate(&credentials).await {
                catalog.extract().await?;
            }
        }
        Ok(catalog)
    }

    pub fn with_connection(target: Target, mut connection: Connection, options: ExtractOptions) -> Self {
        connection.set_statement_timeout(options.statement_timeout);
        Self {
            target,
            connection: Some(connection),
            schema: Schema::default(),
            options,
        }
    }

    pub async fn authenticate(&mut self, credentials: &Credentials) -> bool {
        let Target::Server(addr) = &self.target else {
            return self.connected();
        };

        let mut opts = PgConnectOptions::new()
            .host(&addr.host)
            .port(addr.port)
            .database(&addr.dbname)
            .username(&credentials.user);
        if let Some(password) = &credentials.password {
            opts = opts.password(password);
        }

        match PgConnection::connect_with(&opts).await {
            Ok(conn) => {
                info!(db = %self.target, user = %credentials.user, "connected");
                let mut conn = Connection::from(conn);
                conn.set_statement_timeout(self.options.statement_timeout);
                self.connection = Some(conn);
            }
            Err(err) => {
                warn!(db = %self.target, user = %credentials.user, error = %err, "authentication failed");
                self.connection = None;
            }
        }
        self.connected()
    }

    pub fn connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn name(&self) -> String {
        self.target.name()
    }

    pub fn tables(&self) -> &IndexMap<String, Table> {
        &self.schema.tables
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.schema.table(name)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn connection_mut(&mut self) -> Result<&mut Connection> {
        self.connection.as_mut().ok_or(CatalogError::NotConnected)
    }

    /// Reads the schema from the backend and replaces the current snapshot.
    /// On failure the catalog is left with no tables.
    pub async fn extract(&mut self) -> Result<()> {
        self.schema = Schema::default();
        let pg_schema = self.options.schema.clone();
        let schema = self.connection_mut()?.inspect(&pg_schema).await?;

        info!(db = %self.target, tables = schema.tables.len(), "schema extracted");
        self.schema = schema;
        Ok(())
    }

    pub async fn execute(&mut self, statement: &str) -> Result<Vec<Row>> {
        self.execute_with(statement, &[]).await
    }

    pub async fn execute_with(&mut self, statement: &str, params: &[Value]) -> Result<Vec<Row>> {
        let result = match self.connection_mut() {
            Ok(conn) => conn.fetch_all(statement, params).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            warn!(statement, error = %err, "cannot execute statement");
        }
        result
    }

    /// First row of `table` whose `key_column` equals `key_value`, or `None`
    /// when the table is unknown or nothing matches.
    pub async fn record_by_key(
        &mut self,
        table: &str,
        key_column: &str,
        key_value: impl Into<Value>,
    ) -> Result<Option<Row>> {
        if self.schema.table(table).is_none() {
            debug!(table, "record lookup on unknown table");
            return Ok(None);
        }
        let conn = self.connection_mut()?;
        let statement = format!(
            "SELECT * FROM {} WHERE {} = {} LIMIT 1",
            quote_ident(table),
            quote_ident(key_column),
            conn.dialect().placeholder(1)
        );
        let rows = self.execute_with(&statement, &[key_value.into()]).await?;
        Ok(rows.into_iter().next())
    }

    pub async fn query(&mut self, table: &str, filter: Option<&Filter>) -> Result<Vec<Row>> {
        let table = self
            .schema
            .tables
            .get(table)
            .ok_or_else(|| CatalogError::UnknownTable(table.to_string()))?;
        let conn = self.connection.as_mut().ok_or(CatalogError::NotConnected)?;
        table.query(conn, filter).await
    }

    pub async fn query_joined(&mut self, table: &str, filter: Option<&Filter>) -> Result<Vec<Row>> {
        let table = self
            .schema
            .tables
            .get(table)
            .ok_or_else(|| CatalogError::UnknownTable(table.to_string()))?;
        let conn = self.connection.as_mut().ok_or(CatalogError::NotConnected)?;
        table.query_joined(conn, filter).await
    }

    pub fn bind_master_detail(&self, detail: &str, column: &str, master: &str) -> Result<MasterDetail> {
        let detail = self
            .table(detail)
            .ok_or_else(|| CatalogError::UnknownTable(detail.to_string()))?;
        let master = self
            .table(master)
            .ok_or_else(|| CatalogError::UnknownTable(master.to_string()))?;
        Ok(MasterDetail::bind(detail, column, master)?)
    }

    pub async fn detail_rows(&mut self, binding: &MasterDetail, master_key: impl Into<Value>) -> Result<Vec<Row>> {
        let filter = binding.filter(master_key);
        self.query(&binding.detail, Some(&filter)).await
    }

    pub fn describe(&self) -> String {
        formatter::describe_catalog(&self.name(), &self.schema)
    }

    pub async fn close(mut self) -> Result<()> {
        if let Some(conn) = self.connection.take() {
            conn.close().await.map_err(|source| CatalogError::Connect {
                target: self.target.to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{Column, JoinKind};
    use pretty_assertions::assert_eq;

    fn address() -> ServerAddress {
        ServerAddress {
            host: "db.internal".into(),
            port: DEFAULT_PG_PORT,
            dbname: "geo".into(),
        }
    }

    #[test]
    fn target_names() {
        assert_eq!(Target::File(PathBuf::from("/data/test.db")).name(), "test");
        assert_eq!(Target::Server(address()).name(), "geo");
        assert_eq!(Target::Server(address()).to_string(), "db.internal:5432/geo");
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials {
            user: "app".into(),
            password: Some("hunter2".into()),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
    }

    #[tokio::test]
    async fn server_catalog_without_credentials_stays_unconnected() {
        let mut catalog = SchemaCatalog::postgres(address(), None, ExtractOptions::default())
            .await
            .unwrap();
        assert!(!catalog.connected());
        assert!(catalog.tables().is_empty());
        assert!(matches!(catalog.extract().await, Err(CatalogError::NotConnected)));
        assert!(matches!(catalog.execute("SELECT 1").await, Err(CatalogError::NotConnected)));
    }

    #[tokio::test]
    async fn refused_login_leaves_catalog_unconnected() {
        let address = ServerAddress {
            host: "127.0.0.1".into(),
            port: 1,
            dbname: "geo".into(),
        };
        let credentials = Credentials {
            user: "app".into(),
            password: Some("hunter2".into()),
        };
        let mut catalog = SchemaCatalog::postgres(address, Some(credentials.clone()), ExtractOptions::default())
            .await
            .unwrap();
        assert!(!catalog.connected());
        assert!(catalog.tables().is_empty());

        // A retry fails the same way and still does not extract.
        assert!(!catalog.authenticate(&credentials).await);
        assert!(catalog.tables().is_empty());
        assert!(matches!(catalog.record_by_key("city", "id", 1).await, Ok(None)));
    }

    #[test]
    fn joins_follow_join_kind() {
        let mut district = Table::new("district");
        district.add_column(Column::new("id", "INTEGER"));
        let mut city_id = Column::new("city_id", "INTEGER");
        city_id.add_foreign_key_with_join("city", "id", "name", JoinKind::Outer);
        district.add_column(city_id);

        assert_eq!(
            district.select_with_joins(),
            "SELECT \"district\".*, \"j0\".\"name\" AS \"city_id_name\" FROM \"district\" \
             LEFT OUTER JOIN \"city\" AS \"j0\" ON \"district\".\"city_id\" = \"j0\".\"id\""
        );
    }

    #[test]
    fn foreign_keys_without_join_are_not_joined() {
        let mut district = Table::new("district");
        let mut city_id = Column::new("city_id", "INTEGER");
        city_id.add_foreign_key("city", "id");
        district.add_column(city_id);
        assert_eq!(district.select_with_joins(), "SELECT \"district\".* FROM \"district\"");
    }
}
