use crate::config::DatabaseSettings;

pub const SYSTEM_DATABASES: [&str; 4] = ["master", "model", "msdb", "tempdb"];

/// Databases a per-database query reports on.
///
/// The scope is turned into a `WHERE` clause with bound parameters, so the
/// server never returns rows for databases that are not wanted. Names are
/// compared lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseScope {
    included: Vec<String>,
    excluded: Vec<String>,
    include_system: bool,
}

impl DatabaseScope {
    pub fn new(included: &[DatabaseSettings], excluded: &[String], include_system: bool) -> Self {
        Self {
            included: included.iter().map(|db| db.name.to_lowercase()).collect(),
            excluded: excluded.iter().map(|name| name.to_lowercase()).collect(),
            include_system,
        }
    }

    pub fn included(&self) -> &[String] {
        &self.included
    }

    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    pub const fn include_system(&self) -> bool {
        self.include_system
    }

    /// Condition restricting `column` (an expression yielding the database
    /// name) to this scope, plus the values to bind as `@P1..@Pn`.
    pub fn where_clause(&self, column: &str) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if !self.include_system {
            let system = SYSTEM_DATABASES
                .iter()
                .map(|db| format!("'{db}'"))
                .collect::<Vec<_>>()
                .join(", ");
            conditions.push(format!("LOWER({column}) NOT IN ({system})"));
        }

        if !self.excluded.is_empty() {
            let placeholders = bind_all(&self.excluded, &mut params);
            conditions.push(format!("LOWER({column}) NOT IN ({placeholders})"));
        }

        if !self.included.is_empty() {
            let placeholders = bind_all(&self.included, &mut params);
            conditions.push(format!("LOWER({column}) IN ({placeholders})"));
        }

        if conditions.is_empty() {
            return ("1 = 1".to_string(), params);
        }

        (conditions.join(" AND "), params)
    }
}

fn bind_all(names: &[String], params: &mut Vec<String>) -> String {
    names
        .iter()
        .map(|name| {
            params.push(name.clone());
            format!("@P{}", params.len())
        })
        .collect::<Vec<_>>()
        .join(", ")
}
