pub mod postgres;
pub mod sqlite;

pub use postgres::PostgresInspector;
pub use sqlite::SqliteInspector;

use crate::app::error::ExtractError;
use crate::app::models::Schema;

// Shared by both backends: a snapshot is only published once every foreign key
// lands on a table and column that exist in it.
pub(crate) fn check_references(schema: &Schema) -> Result<(), ExtractError> {
    for table in schema.tables.values() {
        for (column, fk) in table.foreign_keys() {
            let found = schema
                .table(&fk.target_table)
                .is_some_and(|target| target.column(&fk.target_column).is_some());
            if !found {
                return Err(ExtractError::DanglingReference {
                    table: table.name.clone(),
                    column: column.name.clone(),
                    target_table: fk.target_table.clone(),
                    target_column: fk.target_column.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::{Column, Table};

    fn schema_with_reference(target_table: &str, target_column: &str) -> Schema {
        let mut city = Table::new("city");
        city.add_column(Column::new("id", "INTEGER"));

        let mut district = Table::new("district");
        let mut city_id = Column::new("city_id", "INTEGER");
        city_id.add_foreign_key(target_table, target_column);
        district.add_column(city_id);

        let mut schema = Schema::default();
        schema.tables.insert("city".into(), city);
        schema.tables.insert("district".into(), district);
        schema
    }

    #[test]
    fn resolved_references_pass() {
        assert!(check_references(&schema_with_reference("city", "id")).is_ok());
    }

    #[test]
    fn missing_table_is_dangling() {
        let err = check_references(&schema_with_reference("region", "id")).unwrap_err();
        assert!(matches!(err, ExtractError::DanglingReference { target_table, .. } if target_table == "region"));
    }

    #[test]
    fn missing_column_is_dangling() {
        let err = check_references(&schema_with_reference("city", "code")).unwrap_err();
        assert!(matches!(err, ExtractError::DanglingReference { target_column, .. } if target_column == "code"));
    }
}
