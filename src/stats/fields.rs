use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::point::FieldValue;

/// Tag keys attached to every point
pub const TAG_KEYS: [&str; 3] = ["go.os", "go.arch", "go.version"];

/// Every value key a snapshot reports, in declaration order
pub const VALUE_KEYS: [&str; 29] = [
    "cpu.count",
    "cpu.goroutines",
    "cpu.cgo_calls",
    "mem.alloc",
    "mem.total",
    "mem.sys",
    "mem.lookups",
    "mem.malloc",
    "mem.frees",
    "mem.heap.alloc",
    "mem.heap.sys",
    "mem.heap.idle",
    "mem.heap.inuse",
    "mem.heap.released",
    "mem.heap.objects",
    "mem.stack.inuse",
    "mem.stack.sys",
    "mem.stack.mspan_inuse",
    "mem.stack.mspan_sys",
    "mem.stack.mcache_inuse",
    "mem.stack.mcache_sys",
    "mem.othersys",
    "mem.gc.sys",
    "mem.gc.next",
    "mem.gc.last",
    "mem.gc.pause_total",
    "mem.gc.pause",
    "mem.gc.count",
    "mem.gc.cpu_fraction",
];

/// One immutable snapshot of runtime counters.
///
/// The key set mirrors the Telegraf InfluxDB input format so existing
/// dashboards keep working. Counters with no counterpart in this runtime
/// (lookups, span/cache sizes, collector cycles) stay at zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fields {
    // CPU
    #[serde(rename = "cpu.count")]
    pub num_cpu: u64,
    /// Alive tasks on the current tokio runtime
    #[serde(rename = "cpu.goroutines")]
    pub num_tasks: u64,
    /// Foreign calls recorded through [`super::record_foreign_call`]
    #[serde(rename = "cpu.cgo_calls")]
    pub num_foreign_calls: u64,

    // General
    #[serde(rename = "mem.alloc")]
    pub alloc: u64,
    #[serde(rename = "mem.total")]
    pub total_alloc: u64,
    #[serde(rename = "mem.sys")]
    pub sys: u64,
    #[serde(rename = "mem.lookups")]
    pub lookups: u64,
    #[serde(rename = "mem.malloc")]
    pub mallocs: u64,
    #[serde(rename = "mem.frees")]
    pub frees: u64,

    // Heap
    #[serde(rename = "mem.heap.alloc")]
    pub heap_alloc: u64,
    #[serde(rename = "mem.heap.sys")]
    pub heap_sys: u64,
    #[serde(rename = "mem.heap.idle")]
    pub heap_idle: u64,
    #[serde(rename = "mem.heap.inuse")]
    pub heap_inuse: u64,
    #[serde(rename = "mem.heap.released")]
    pub heap_released: u64,
    #[serde(rename = "mem.heap.objects")]
    pub heap_objects: u64,

    // Stack
    #[serde(rename = "mem.stack.inuse")]
    pub stack_inuse: u64,
    #[serde(rename = "mem.stack.sys")]
    pub stack_sys: u64,
    #[serde(rename = "mem.stack.mspan_inuse")]
    pub mspan_inuse: u64,
    #[serde(rename = "mem.stack.mspan_sys")]
    pub mspan_sys: u64,
    #[serde(rename = "mem.stack.mcache_inuse")]
    pub mcache_inuse: u64,
    #[serde(rename = "mem.stack.mcache_sys")]
    pub mcache_sys: u64,
    #[serde(rename = "mem.othersys")]
    pub other_sys: u64,

    // GC
    #[serde(rename = "mem.gc.sys")]
    pub gc_sys: u64,
    #[serde(rename = "mem.gc.next")]
    pub next_gc: u64,
    #[serde(rename = "mem.gc.last")]
    pub last_gc: u64,
    #[serde(rename = "mem.gc.pause_total")]
    pub pause_total_ns: u64,
    #[serde(rename = "mem.gc.pause")]
    pub pause_ns: u64,
    #[serde(rename = "mem.gc.count")]
    pub num_gc: u32,
    #[serde(rename = "mem.gc.cpu_fraction")]
    pub gc_cpu_fraction: f64,

    #[serde(skip)]
    pub arch: String,
    #[serde(skip)]
    pub os: String,
    #[serde(skip)]
    pub version: String,
}

impl Fields {
    /// Environment tags
    pub fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("go.os".to_string(), self.os.clone()),
            ("go.arch".to_string(), self.arch.clone()),
            ("go.version".to_string(), self.version.clone()),
        ])
    }

    /// Counter values keyed by dotted name. Counters wrap into `i64`.
    pub fn values(&self) -> BTreeMap<String, FieldValue> {
        let ints: [(&str, u64); 28] = [
            ("cpu.count", self.num_cpu),
            ("cpu.goroutines", self.num_tasks),
            ("cpu.cgo_calls", self.num_foreign_calls),
            ("mem.alloc", self.alloc),
            ("mem.total", self.total_alloc),
            ("mem.sys", self.sys),
            ("mem.lookups", self.lookups),
            ("mem.malloc", self.mallocs),
            ("mem.frees", self.frees),
            ("mem.heap.alloc", self.heap_alloc),
            ("mem.heap.sys", self.heap_sys),
            ("mem.heap.idle", self.heap_idle),
            ("mem.heap.inuse", self.heap_inuse),
            ("mem.heap.released", self.heap_released),
            ("mem.heap.objects", self.heap_objects),
            ("mem.stack.inuse", self.stack_inuse),
            ("mem.stack.sys", self.stack_sys),
            ("mem.stack.mspan_inuse", self.mspan_inuse),
            ("mem.stack.mspan_sys", self.mspan_sys),
            ("mem.stack.mcache_inuse", self.mcache_inuse),
            ("mem.stack.mcache_sys", self.mcache_sys),
            ("mem.othersys", self.other_sys),
            ("mem.gc.sys", self.gc_sys),
            ("mem.gc.next", self.next_gc),
            ("mem.gc.last", self.last_gc),
            ("mem.gc.pause_total", self.pause_total_ns),
            ("mem.gc.pause", self.pause_ns),
            ("mem.gc.count", u64::from(self.num_gc)),
        ];

        let mut values: BTreeMap<String, FieldValue> = ints
            .iter()
            .map(|(key, value)| (key.to_string(), FieldValue::Integer(*value as i64)))
            .collect();
        values.insert(
            "mem.gc.cpu_fraction".to_string(),
            FieldValue::Float(self.gc_cpu_fraction),
        );
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_cover_every_documented_key() {
        let values = Fields::default().values();
        assert_eq!(values.len(), VALUE_KEYS.len());
        for key in VALUE_KEYS {
            assert!(values.contains_key(key), "missing {}", key);
        }
    }

    #[test]
    fn serialized_keys_match_values() {
        let json = serde_json::to_value(Fields::default()).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), VALUE_KEYS.len());
        for key in VALUE_KEYS {
            assert!(object.contains_key(key), "missing {}", key);
        }
    }

    #[test]
    fn counters_wrap_into_signed_values() {
        let fields = Fields {
            total_alloc: u64::MAX,
            ..Default::default()
        };
        assert_eq!(fields.values()["mem.total"], FieldValue::Integer(-1));
    }

    #[test]
    fn tags_have_exactly_three_keys() {
        let fields = Fields {
            os: "linux".into(),
            arch: "x86_64".into(),
            version: "rustc 1.85.0".into(),
            ..Default::default()
        };
        let tags = fields.tags();
        assert_eq!(tags.len(), 3);
        for key in TAG_KEYS {
            assert!(tags.contains_key(key));
        }
        assert_eq!(tags["go.os"], "linux");
    }
}
