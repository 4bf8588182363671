use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use sysinfo::System;

/// Identifies the reporting agent process.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AgentData {
    pub host: String,
    pub pid: u32,
    pub version: String,
}

impl AgentData {
    pub fn current() -> Self {
        Self {
            host: System::host_name().unwrap_or_else(|| "localhost".to_string()),
            pid: std::process::id(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Metrics of one monitored component for one poll.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComponentData {
    pub name: String,
    pub guid: String,
    /// Seconds covered by the metrics.
    pub duration: u64,
    pub metrics: BTreeMap<String, f64>,
}

impl ComponentData {
    pub fn new(name: impl Into<String>, guid: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            guid: guid.into(),
            duration: duration.as_secs().max(1),
            metrics: BTreeMap::new(),
        }
    }

    /// Record `Component/<path>[<unit>]`. Returns true only when a new key
    /// was added: values that cannot be encoded (NaN, infinity) are skipped
    /// and a repeated key overwrites the earlier value.
    pub fn add_metric(&mut self, path: &str, unit: &str, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        self.metrics
            .insert(format!("Component/{path}[{unit}]"), value)
            .is_none()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    fn same_component(&self, other: &Self) -> bool {
        self.name == other.name && self.guid == other.guid
    }
}

/// Request body for the platform collector.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlatformData {
    pub agent: AgentData,
    pub components: Vec<ComponentData>,
}

impl PlatformData {
    pub fn new(agent: AgentData) -> Self {
        Self {
            agent,
            components: Vec::new(),
        }
    }

    /// Add a component, merging metrics into an existing component with the
    /// same name and guid.
    pub fn add_component(&mut self, component: &ComponentData) {
        match self
            .components
            .iter_mut()
            .find(|existing| existing.same_component(component))
        {
            Some(existing) => existing
                .metrics
                .extend(component.metrics.iter().map(|(k, v)| (k.clone(), *v))),
            None => self.components.push(component.clone()),
        }
    }

    pub fn metric_count(&self) -> usize {
        self.components.iter().map(ComponentData::len).sum()
    }
}
