use crate::config::DatabaseSettings;
use crate::queries::Row;
use std::collections::HashMap;

/// Case-insensitive map from a database name to the name it is reported as.
#[derive(Debug, Clone, Default)]
pub struct DatabaseDisplayMap {
    names: HashMap<String, String>,
}

impl DatabaseDisplayMap {
    pub fn new(databases: &[DatabaseSettings]) -> Self {
        let names = databases
            .iter()
            .filter_map(|db| {
                db.display_name
                    .as_ref()
                    .map(|display| (db.name.to_lowercase(), display.clone()))
            })
            .collect();

        Self { names }
    }

    pub fn display_name<'a>(&'a self, database: &'a str) -> &'a str {
        self.names
            .get(&database.to_lowercase())
            .map_or(database, String::as_str)
    }

    /// Rename every row that carries a database name. Unmapped names stay.
    pub fn apply(&self, rows: &mut [Row]) {
        if self.names.is_empty() {
            return;
        }

        for row in rows {
            if let Some(name) = row.database_name_mut()
                && let Some(display) = self.names.get(&name.to_lowercase())
            {
                name.clone_from(display);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::Sample;

    fn db(name: &str, display_name: Option<&str>) -> DatabaseSettings {
        DatabaseSettings {
            name: name.to_string(),
            display_name: display_name.map(str::to_string),
        }
    }

    fn sample(database: &str) -> Row {
        Row::Sample(Sample::for_database("Database", database).with("Size/Data", "megabytes", 1.0))
    }

    fn names(rows: &[Row]) -> Vec<&str> {
        rows.iter().filter_map(Row::database_name).collect()
    }

    #[test]
    fn test_display_names_are_case_insensitive() {
        let map = DatabaseDisplayMap::new(&[
            db("Foo", Some("Fantastic")),
            db("Baz", Some("Assassins")),
            db("Bar", Some("Baracuda")),
            db("Quux", None),
        ]);

        let mut rows = vec![sample("Foo"), sample("BAZ"), sample("bar"), sample("Quux"), sample("Other")];
        map.apply(&mut rows);

        assert_eq!(
            names(&rows),
            vec!["Fantastic", "Assassins", "Baracuda", "Quux", "Other"]
        );
        assert_eq!(map.display_name("FOO"), "Fantastic");
        assert_eq!(map.display_name("none"), "none");
    }

    #[test]
    fn test_display_map_ignores_rows_without_database() {
        let map = DatabaseDisplayMap::new(&[db("Foo", Some("Fantastic"))]);
        let mut rows = vec![Row::Sample(Sample::new("Connections").with("Count", "connections", 2.0))];
        map.apply(&mut rows);

        assert_eq!(rows[0].database_name(), None);
    }
}
