//! Runtime statistics snapshot
mod alloc;
mod fields;
pub mod procfs;

pub use alloc::{allocator_stats, AllocatorStats, TrackingAllocator};
pub use fields::{Fields, TAG_KEYS, VALUE_KEYS};

use log::trace;
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::System;

/// Toolchain version reported in the `go.version` tag
pub const RUNTIME_VERSION: &str = env!("RUNSTATS_RUSTC_VERSION");

static FOREIGN_CALLS: AtomicU64 = AtomicU64::new(0);

/// Count one call across an FFI boundary, reported as `cpu.cgo_calls`
pub fn record_foreign_call() {
    FOREIGN_CALLS.fetch_add(1, Ordering::Relaxed);
}

/// Take a snapshot of the process counters.
///
/// Disabled groups stay at zero. The environment strings are always filled.
pub fn capture(enable_cpu: bool, enable_mem: bool) -> Fields {
    let mut fields = Fields::default();

    if enable_mem {
        collect_mem_stats(&mut fields);
    }

    if enable_cpu {
        collect_cpu_stats(&mut fields);
    }

    fields.os = std::env::consts::OS.to_string();
    fields.arch = std::env::consts::ARCH.to_string();
    fields.version = RUNTIME_VERSION.to_string();

    fields
}

fn collect_cpu_stats(f: &mut Fields) {
    f.num_cpu = std::thread::available_parallelism()
        .map(|n| n.get() as u64)
        .unwrap_or(1);
    f.num_tasks = tokio::runtime::Handle::try_current()
        .map(|handle| handle.metrics().num_alive_tasks() as u64)
        .unwrap_or(0);
    f.num_foreign_calls = FOREIGN_CALLS.load(Ordering::Relaxed);
}

fn collect_mem_stats(f: &mut Fields) {
    let allocs = allocator_stats();
    f.alloc = allocs.live_bytes();
    f.total_alloc = allocs.allocated_bytes;
    f.mallocs = allocs.allocations;
    f.frees = allocs.deallocations;
    f.heap_alloc = f.alloc;
    f.heap_inuse = f.alloc;
    f.heap_objects = allocs.live_objects();

    let status = procfs::read_self_status();
    f.sys = resident_set_size()
        .or_else(|| status.map(|s| s.vm_rss))
        .unwrap_or(0);
    f.heap_sys = status.map(|s| s.vm_data).unwrap_or(f.sys);
    f.heap_idle = f.heap_sys.saturating_sub(f.heap_inuse);
    f.stack_sys = status.map(|s| s.vm_stk).unwrap_or(0);
    f.stack_inuse = f.stack_sys;
    f.other_sys = f
        .sys
        .saturating_sub(f.heap_sys.saturating_add(f.stack_sys));
}

fn resident_set_size() -> Option<u64> {
    let pid = match sysinfo::get_current_pid() {
        Ok(pid) => pid,
        Err(e) => {
            trace!("Current pid unavailable: {}", e);
            return None;
        }
    };

    let mut system = System::new();
    if !system.refresh_process(pid) {
        trace!("Failed to refresh process {}", pid);
        return None;
    }
    system.process(pid).map(|process| process.memory())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_disabled_leaves_cpu_fields_zero() {
        let fields = capture(false, true);
        assert_eq!(fields.num_cpu, 0);
        assert_eq!(fields.num_tasks, 0);
        assert_eq!(fields.num_foreign_calls, 0);
        assert!(fields.sys > 0);
        assert!(!fields.os.is_empty());
    }

    #[test]
    fn mem_disabled_leaves_mem_fields_zero() {
        let fields = capture(true, false);
        assert!(fields.num_cpu >= 1);

        let mem_only = Fields {
            num_cpu: 0,
            num_tasks: 0,
            num_foreign_calls: 0,
            arch: String::new(),
            os: String::new(),
            version: String::new(),
            ..fields.clone()
        };
        assert_eq!(mem_only, Fields::default());
        assert_eq!(fields.arch, std::env::consts::ARCH);
    }

    #[test]
    fn environment_is_always_populated() {
        let fields = capture(false, false);
        assert_eq!(fields.os, std::env::consts::OS);
        assert_eq!(fields.arch, std::env::consts::ARCH);
        assert!(fields.version.starts_with("rustc"));
    }

    #[tokio::test]
    async fn tasks_are_counted_inside_a_runtime() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        let fields = capture(true, false);
        assert!(fields.num_tasks >= 1);
        handle.abort();
    }

    #[test]
    fn foreign_calls_accumulate() {
        record_foreign_call();
        record_foreign_call();
        assert!(capture(true, false).num_foreign_calls >= 2);
    }
}
