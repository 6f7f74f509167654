use std::time::Duration;

/// Errors surfaced by catalog, table and connection operations.
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("no foreign key defined for column `{column}`, can't set join column")]
    UndeclaredRelationship { column: String },

    #[error("failed to connect to {target}")]
    Connect {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    /// The catalog has no live connection (e.g. authentication failed or never ran).
    #[error("catalog is not connected")]
    NotConnected,

    #[error("cannot execute `{statement}`")]
    Statement {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("statement `{statement}` did not finish within {limit:?}")]
    Timeout { statement: String, limit: Duration },

    /// A value the driver handed back undecoded cannot be sent as a parameter.
    #[error("value of type {0} cannot be bound as a statement parameter")]
    Unbindable(String),

    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Relationship(#[from] RelationshipError),
}

/// Inconsistencies found while building a schema snapshot. Always fatal.
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("extraction step `{step}` failed")]
    Query {
        step: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("catalog metadata names unknown table `{table}`")]
    UnknownTable { table: String },

    #[error("catalog metadata names unknown column `{table}.{column}`")]
    UnknownColumn { table: String, column: String },

    #[error(
        "foreign key `{table}.{column}` references `{target_table}.{target_column}`, which is not in the catalog"
    )]
    DanglingReference {
        table: String,
        column: String,
        target_table: String,
        target_column: String,
    },

    /// `REFERENCES t` without a column, where `t` has no single-column primary key.
    #[error("foreign key `{table}.{column}` references `{target_table}` without a column and it has no single primary key")]
    ImplicitTargetUnresolved {
        table: String,
        column: String,
        target_table: String,
    },
}

/// Reasons a master/detail binding is rejected, in the order they are checked.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RelationshipError {
    #[error("cannot bind `{column}` to `{master}`: no relationship defined for `{column}`")]
    NoRelationship { column: String, master: String },

    #[error("cannot bind `{column}` to `{master}`: relationship targets a different table `{target}`")]
    WrongTable {
        column: String,
        master: String,
        target: String,
    },

    #[error("cannot bind `{column}` to `{master}`: target column `{target_column}` missing")]
    MissingTargetColumn {
        column: String,
        master: String,
        target_column: String,
    },

    #[error("table `{table}` has no column `{column}`")]
    UnknownColumn { table: String, column: String },
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;
