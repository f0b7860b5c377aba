//! Pull-based exposure of runtime metrics.
//!
//! A [`Registry`] maps names to [`Var`]s rendered as JSON on demand. The
//! runtime metrics variable takes a fresh snapshot on every read.
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::collector::Collector;
use crate::error::{Result, StatsError};
use crate::stats::Fields;

/// Measurement name carried by pulled points
pub const PULL_MEASUREMENT: &str = "go_runtime_metrics";

/// One pulled snapshot: name, tags and the counter values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullPoint {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub values: Fields,
}

/// A value that can be published under a name
pub trait Var: Send + Sync + 'static {
    fn value(&self) -> Result<serde_json::Value>;
}

/// Publish the result of a closure
pub struct Func<F>(pub F);

impl<F> Var for Func<F>
where
    F: Fn() -> serde_json::Value + Send + Sync + 'static,
{
    fn value(&self) -> Result<serde_json::Value> {
        Ok((self.0)())
    }
}

/// Runtime metrics rendered on every read
pub struct Metrics {
    measurement: String,
    collector: Collector,
}

impl Metrics {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            collector: Collector::new(None),
        }
    }

    /// Snapshot now
    pub fn render(&self) -> PullPoint {
        let values = self.collector.collect_stats();
        PullPoint {
            name: self.measurement.clone(),
            tags: values.tags(),
            values,
        }
    }

    pub fn render_json(&self) -> Result<String> {
        serde_json::to_string(&self.render())
            .map_err(|e| StatsError::Publish(format!("Failed to encode metrics: {}", e)).into())
    }
}

impl Var for Metrics {
    fn value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self.render())
            .map_err(|e| StatsError::Publish(format!("Failed to encode metrics: {}", e)).into())
    }
}

/// Named variables, published once each
#[derive(Default)]
pub struct Registry {
    vars: RwLock<HashMap<String, Arc<dyn Var>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `var` under `name`. A name can only be published once.
    pub fn publish(&self, name: impl Into<String>, var: impl Var) -> Result<()> {
        let name = name.into();
        let mut vars = self
            .vars
            .write()
            .map_err(|_| StatsError::Publish("Lock poisoned".to_string()))?;

        if vars.contains_key(&name) {
            return Err(StatsError::Publish(format!("Reuse of published name {}", name)).into());
        }

        debug!("Published {}", name);
        vars.insert(name, Arc::new(var));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Var>> {
        self.vars.read().ok()?.get(name).cloned()
    }

    /// Published names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .vars
            .read()
            .map(|vars| vars.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Every variable as one JSON object
    pub fn render_json(&self) -> Result<String> {
        let vars: Vec<(String, Arc<dyn Var>)> = {
            let vars = self
                .vars
                .read()
                .map_err(|_| StatsError::Publish("Lock poisoned".to_string()))?;
            vars.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };

        let mut object = serde_json::Map::new();
        for (name, var) in vars {
            object.insert(name, var.value()?);
        }
        Ok(serde_json::Value::Object(object).to_string())
    }
}

/// Publish the runtime metrics under `name`, or under the program name
/// when `name` is `None`.
pub fn publish_runtime_metrics(registry: &Registry, name: Option<&str>) -> Result<()> {
    let name = match name {
        Some(name) => name.to_string(),
        None => program_name(),
    };
    registry.publish(name, Metrics::new(PULL_MEASUREMENT))
}

fn program_name() -> String {
    std::env::args()
        .next()
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}
