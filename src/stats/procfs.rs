//! `/proc/self/status` reader for segment sizes

/// Fields of interest from `/proc/<pid>/status`, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcStatus {
    pub vm_rss: u64,
    pub vm_data: u64,
    pub vm_stk: u64,
    pub threads: u64,
}

/// Parse the `Key:   value kB` layout of a status file
pub fn parse_status(content: &str) -> ProcStatus {
    let mut status = ProcStatus::default();

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };

        let mut parts = rest.split_whitespace();
        let Some(value) = parts.next().and_then(|v| v.parse::<u64>().ok()) else {
            continue;
        };
        let value = match parts.next() {
            Some("kB") => value.saturating_mul(1024),
            _ => value,
        };

        match key.trim() {
            "VmRSS" => status.vm_rss = value,
            "VmData" => status.vm_data = value,
            "VmStk" => status.vm_stk = value,
            "Threads" => status.threads = value,
            _ => {}
        }
    }

    status
}

/// Read the status of the current process. `None` off Linux.
pub fn read_self_status() -> Option<ProcStatus> {
    #[cfg(target_os = "linux")]
    {
        match std::fs::read_to_string("/proc/self/status") {
            Ok(content) => Some(parse_status(&content)),
            Err(e) => {
                log::debug!("Failed to read /proc/self/status: {}", e);
                None
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes_in_bytes() {
        let content = "Name:\tstats\nVmPeak:\t  20000 kB\nVmRSS:\t    4096 kB\nVmData:\t   2048 kB\nVmStk:\t    132 kB\nThreads:\t7\nSigQ:\t0/63\n";
        let status = parse_status(content);
        assert_eq!(status.vm_rss, 4096 * 1024);
        assert_eq!(status.vm_data, 2048 * 1024);
        assert_eq!(status.vm_stk, 132 * 1024);
        assert_eq!(status.threads, 7);
    }

    #[test]
    fn garbage_lines_are_ignored() {
        let status = parse_status("no colon here\nVmData: lots kB\n\n");
        assert_eq!(status, ProcStatus::default());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reads_own_status() {
        let status = read_self_status().unwrap();
        assert!(status.vm_rss > 0);
        assert!(status.threads >= 1);
    }
}
