pub mod app;

// Re-export useful types for library users
pub use app::catalog::{Credentials, ExtractOptions, SchemaCatalog, ServerAddress, Target};
pub use app::config::AppConfig;
pub use app::connection::{Connection, Dialect};
pub use app::error::{CatalogError, ExtractError, RelationshipError};
pub use app::formatter::OutputGenerator;
pub use app::generate_report;
pub use app::inspector::{PostgresInspector, SqliteInspector};
pub use app::models::{Column, ForeignKey, Join, JoinKind, Row, Schema, Table, Value};
pub use app::resolver::{compose_filter, validate, Filter, MasterDetail};
