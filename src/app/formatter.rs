use crate::app::models::{Schema, Table};
use std::fmt::Write;

/// Plain diagnostic dump of one table: its name, then one line per column.
pub fn describe_table(table: &Table) -> String {
    let mut output = format!("<{}>\n", table.name);
    for col in table.columns.values() {
        output.push_str(&format!("    {}\n", col));
    }
    output.push_str(&"-".repeat(30));
    output.push('\n');
    output
}

pub fn describe_catalog(db_name: &str, schema: &Schema) -> String {
    let mut output = format!("DATABASE {}\n", db_name);
    for table in schema.tables.values() {
        output.push_str(&describe_table(table));
    }
    output
}

pub struct OutputGenerator;

impl OutputGenerator {
    pub fn generate_markdown(db_name: &str, schema: &Schema) -> Result<String, std::fmt::Error> {
        let mut output = String::new();

        writeln!(output, "Database Schema for: {}\n", db_name)?;

        for table in schema.tables.values() {
            writeln!(output, "## Table: {}", table.name)?;

            writeln!(output, "| Column | Type | Default |")?;
            writeln!(output, "|---|---|---|")?;
            for col in table.columns.values() {
                writeln!(
                    output,
                    "| {} | {} | {} |",
                    col.name,
                    col.datatype,
                    col.default.as_deref().unwrap_or("")
                )?;
            }

            let primary_keys: Vec<&str> = table.primary_keys().map(|c| c.name.as_str()).collect();
            if !primary_keys.is_empty() {
                writeln!(output, "\n**Primary Key:** {}", primary_keys.join(", "))?;
            }

            let mut foreign_keys = table.foreign_keys().peekable();
            if foreign_keys.peek().is_some() {
                writeln!(output, "\n**Foreign Keys:**")?;
                for (col, fk) in foreign_keys {
                    write!(
                        output,
                        "- `{}.{}` -> `{}.{}`",
                        table.name, col.name, fk.target_table, fk.target_column
                    )?;
                    if let Some(join) = &fk.join {
                        write!(output, " ({} join on `{}`)", join.kind, join.column)?;
                    }
                    writeln!(output)?;
                }
            }

            writeln!(output, "\n---\n")?;
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::models::Column;
    use pretty_assertions::assert_eq;

    fn schema() -> Schema {
        let mut city = Table::new("city");
        let mut id = Column::new("id", "INTEGER");
        id.set_primary();
        city.add_column(id);
        city.add_column(Column::new("name", "TEXT").with_default(Some("'?'".into())));

        let mut district = Table::new("district");
        let mut city_id = Column::new("city_id", "INTEGER");
        city_id.add_foreign_key("city", "id");
        district.add_column(city_id);

        let mut schema = Schema::default();
        schema.tables.insert("city".into(), city);
        schema.tables.insert("district".into(), district);
        schema
    }

    #[test]
    fn describes_catalog() {
        let expected = "DATABASE test\n\
                        <city>\n    id  INTEGER primary key\n    name  TEXT\n------------------------------\n\
                        <district>\n    city_id  INTEGER fkey: city/id\n------------------------------\n";
        assert_eq!(describe_catalog("test", &schema()), expected);
    }

    #[test]
    fn markdown_lists_keys() {
        let out = OutputGenerator::generate_markdown("test", &schema()).unwrap();
        assert!(out.starts_with("Database Schema for: test\n"));
        assert!(out.contains("## Table: district"));
        assert!(out.contains("- `district.city_id` -> `city.id`"));
        assert!(out.contains("**Primary Key:** id"));
        assert!(out.contains("| name | TEXT | '?' |"));
    }
}
