use std::fmt;

use crate::app::connection::{quote_ident, Dialect};
use crate::app::error::RelationshipError;
use crate::app::models::{Column, ForeignKey, Table, Value};

// Checks run in a fixed order: no foreign key is reported before a mismatched master.
pub fn validate<'c>(column: &'c Column, master: &Table) -> Result<&'c ForeignKey, RelationshipError> {
    let fk = column
        .foreign_key
        .as_ref()
        .ok_or_else(|| RelationshipError::NoRelationship {
            column: column.name.clone(),
            master: master.name.clone(),
        })?;

    if fk.target_table != master.name {
        return Err(RelationshipError::WrongTable {
            column: column.name.clone(),
            master: master.name.clone(),
            target: fk.target_table.clone(),
        });
    }

    if master.column(&fk.target_column).is_none() {
        return Err(RelationshipError::MissingTargetColumn {
            column: column.name.clone(),
            master: master.name.clone(),
            target_column: fk.target_column.clone(),
        });
    }

    Ok(fk)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn clause(&self, dialect: Dialect, index: usize) -> String {
        format!("{} = {}", quote_ident(&self.column), dialect.placeholder(index))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.column, self.value)
    }
}

pub fn compose_filter(local_column: &str, master_key: impl Into<Value>) -> Filter {
    Filter {
        column: local_column.to_string(),
        value: master_key.into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterDetail {
    pub master: String,
    pub master_column: String,
    pub detail: String,
    pub detail_column: String,
}

impl MasterDetail {
    pub fn bind(detail: &Table, column: &str, master: &Table) -> Result<Self, RelationshipError> {
        let col = detail
            .column(column)
            .ok_or_else(|| RelationshipError::UnknownColumn {
                table: detail.name.clone(),
                column: column.to_string(),
            })?;
        let fk = validate(col, master)?;
        Ok(Self {
            master: master.name.clone(),
            master_column: fk.target_column.clone(),
            detail: detail.name.clone(),
            detail_column: col.name.clone(),
        })
    }

    pub fn filter(&self, master_key: impl Into<Value>) -> Filter {
        compose_filter(&self.detail_column, master_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn city() -> Table {
        let mut t = Table::new("city");
        t.add_column(Column::new("id", "INTEGER"));
        t.add_column(Column::new("name", "TEXT"));
        t
    }

    fn district() -> Table {
        let mut t = Table::new("district");
        t.add_column(Column::new("id", "INTEGER"));
        let mut city_id = Column::new("city_id", "INTEGER");
        city_id.add_foreign_key("city", "id");
        t.add_column(city_id);
        t
    }

    #[test]
    fn accepts_matching_master() {
        let district = district();
        let fk = validate(&district.columns["city_id"], &city()).unwrap();
        assert_eq!(fk.target_column, "id");
    }

    #[test]
    fn missing_foreign_key_is_reported_first() {
        let district = district();
        let region = Table::new("region");
        for master in [city(), region] {
            let err = validate(&district.columns["id"], &master).unwrap_err();
            assert!(matches!(err, RelationshipError::NoRelationship { .. }));
        }
    }

    #[test]
    fn different_table_is_rejected() {
        let district = district();
        let err = validate(&district.columns["city_id"], &Table::new("region")).unwrap_err();
        assert_eq!(
            err,
            RelationshipError::WrongTable {
                column: "city_id".into(),
                master: "region".into(),
                target: "city".into(),
            }
        );
    }

    #[test]
    fn missing_target_column_is_rejected() {
        let district = district();
        let mut bare_city = Table::new("city");
        bare_city.add_column(Column::new("name", "TEXT"));
        let err = validate(&district.columns["city_id"], &bare_city).unwrap_err();
        assert!(matches!(err, RelationshipError::MissingTargetColumn { target_column, .. } if target_column == "id"));
    }

    #[test]
    fn filter_is_deterministic_and_parameterized() {
        let a = compose_filter("city_id", 34);
        let b = compose_filter("city_id", 34);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "city_id = 34");
        assert_eq!(a.clause(Dialect::Sqlite, 1), "\"city_id\" = ?");
        assert_eq!(a.clause(Dialect::Postgres, 1), "\"city_id\" = $1");
    }

    #[test]
    fn hostile_values_stay_out_of_sql() {
        let filter = compose_filter("name", "x'; DROP TABLE city; --");
        assert!(!filter.clause(Dialect::Sqlite, 1).contains("DROP"));
    }

    #[test]
    fn binding_records_both_sides() {
        let binding = MasterDetail::bind(&district(), "city_id", &city()).unwrap();
        assert_eq!(binding.master_column, "id");
        assert_eq!(binding.filter(7), compose_filter("city_id", 7));

        let err = MasterDetail::bind(&district(), "town_id", &city()).unwrap_err();
        assert!(matches!(err, RelationshipError::UnknownColumn { .. }));
    }
}
