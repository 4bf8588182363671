use anyhow::{Result, anyhow};
use chrono::NaiveDateTime;
use std::str::FromStr;

/// A single row produced by a diagnostic query, after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// Point-in-time values, optionally scoped to one database.
    Sample(Sample),
    /// Cumulative plan-cache execution counter for one plan instance.
    DmlActivity(DmlActivity),
    /// Per-interval increase computed from `DmlActivity` rows.
    DmlIncrease(DmlIncrease),
}

impl Row {
    /// Database name carried by the row, if it exposes one.
    pub fn database_name(&self) -> Option<&str> {
        match self {
            Self::Sample(sample) => sample.database.as_deref(),
            Self::DmlActivity(_) | Self::DmlIncrease(_) => None,
        }
    }

    pub fn database_name_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::Sample(sample) => sample.database.as_mut(),
            Self::DmlActivity(_) | Self::DmlIncrease(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub name: &'static str,
    pub unit: &'static str,
    pub value: f64,
}

/// A set of gauge values sharing a metric family (e.g. `Connections`).
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub family: &'static str,
    pub database: Option<String>,
    pub values: Vec<Value>,
}

impl Sample {
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            database: None,
            values: Vec::new(),
        }
    }

    pub fn for_database(family: &'static str, database: impl Into<String>) -> Self {
        Self {
            family,
            database: Some(database.into()),
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, name: &'static str, unit: &'static str, value: f64) -> Self {
        self.values.push(Value { name, unit, value });
        self
    }

    /// Metric path without the component prefix, e.g. `Database/Foo/Size/Data`.
    pub fn path(&self, value: &Value) -> String {
        match &self.database {
            Some(db) => format!("{}/{}/{}", self.family, db, value.name),
            None => format!("{}/{}", self.family, value.name),
        }
    }
}

/// Counter class a plan-cache row is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterClass {
    Reads,
    Writes,
}

impl FromStr for CounterClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reads" => Ok(Self::Reads),
            "writes" => Ok(Self::Writes),
            other => Err(anyhow!("unknown counter class '{other}'")),
        }
    }
}

/// One row of `sys.dm_exec_query_stats`, classified as a read or a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmlActivity {
    pub plan_handle: Vec<u8>,
    pub sql_statement_hash: Vec<u8>,
    pub creation_time: Option<NaiveDateTime>,
    pub execution_count: i64,
    pub query_type: CounterClass,
}

/// Aggregated read/write executions for one poll of one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DmlIncrease {
    pub reads: i64,
    pub writes: i64,
}
