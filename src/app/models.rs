use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, JsonValue, Uuid};

use crate::app::error::{CatalogError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
    Numeric(Decimal),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
    Uuid(Uuid),
    Json(JsonValue),
    /// A value whose driver type this layer does not decode; holds the type name.
    Unsupported(String),
}

pub type Row = Vec<Value>;

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Value::Blob(v) => write!(f, "<{} bytes>", v.len()),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Numeric(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "'{}'", v),
            Value::Time(v) => write!(f, "'{}'", v),
            Value::Timestamp(v) => write!(f, "'{}'", v),
            Value::TimestampTz(v) => write!(f, "'{}'", v.to_rfc3339()),
            Value::Uuid(v) => write!(f, "'{}'", v),
            Value::Json(v) => write!(f, "'{}'", v.to_string().replace('\'', "''")),
            Value::Unsupported(ty) => write!(f, "<{}>", ty),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Numeric(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::TimestampTz(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Outer,
}

impl JoinKind {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Outer => "LEFT OUTER JOIN",
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER"),
            JoinKind::Outer => write!(f, "OUTER"),
        }
    }
}

impl FromStr for JoinKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INNER" => Ok(JoinKind::Inner),
            "OUTER" => Ok(JoinKind::Outer),
            other => Err(format!("unknown join kind `{}`, expected INNER or OUTER", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub column: String,
    pub kind: JoinKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub target_table: String,
    pub target_column: String,
    pub join: Option<Join>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub datatype: String,
    pub default: Option<String>,
    pub primary_key: bool,
    pub foreign_key: Option<ForeignKey>,
}

impl Column {
    pub fn new(name: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datatype: datatype.into(),
            default: None,
            primary_key: false,
            foreign_key: None,
        }
    }

    pub fn with_default(mut self, default: Option<String>) -> Self {
        self.default = default;
        self
    }

    pub fn set_primary(&mut self) {
        self.primary_key = true;
    }

    /// Declares a foreign key, replacing any previous one. Join metadata is left unset.
    pub fn add_foreign_key(&mut self, table: impl Into<String>, column: impl Into<String>) {
        self.foreign_key = Some(ForeignKey {
            target_table: table.into(),
            target_column: column.into(),
            join: None,
        });
    }

    pub fn add_foreign_key_with_join(
        &mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        join_column: impl Into<String>,
        kind: JoinKind,
    ) {
        self.foreign_key = Some(ForeignKey {
            target_table: table.into(),
            target_column: column.into(),
            join: Some(Join {
                column: join_column.into(),
                kind,
            }),
        });
    }

    /// Sets the join column of an already declared foreign key.
    pub fn set_join_column(&mut self, join_column: impl Into<String>, kind: JoinKind) -> Result<()> {
        match self.foreign_key.as_mut() {
            Some(fk) => {
                fk.join = Some(Join {
                    column: join_column.into(),
                    kind,
                });
                Ok(())
            }
            None => Err(CatalogError::UndeclaredRelationship {
                column: self.name.clone(),
            }),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}  {}", self.name, self.datatype)?;
        if self.primary_key {
            write!(f, " primary key")?;
        }
        if let Some(fk) = &self.foreign_key {
            write!(f, " fkey: {}/{}", fk.target_table, fk.target_column)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: IndexMap<String, Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: IndexMap::new(),
        }
    }

    pub fn add_column(&mut self, column: Column) {
        self.columns.insert(column.name.clone(), column);
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.get_mut(name)
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &Column> {
        self.columns.values().filter(|c| c.primary_key)
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = (&Column, &ForeignKey)> {
        self.columns
            .values()
            .filter_map(|c| c.foreign_key.as_ref().map(|fk| (c, fk)))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub tables: IndexMap<String, Table>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
