//! Process resident-set sampling.
//!
//! The size-bounded purge and the `bytes` stat both need the process's
//! current resident memory. On Linux the second field of `/proc/self/statm`
//! is the live RSS in pages; elsewhere we fall back to `getrusage`, whose
//! `ru_maxrss` is a high-water mark rather than a live reading, which is the
//! best a portable call offers.

/// Current resident set size in bytes.
pub fn resident_set_bytes() -> u64 {
    statm_resident_bytes().unwrap_or_else(rusage_max_rss_bytes)
}

/// Current resident set size in whole megabytes.
pub fn resident_set_mb() -> u64 {
    resident_set_bytes() / (1024 * 1024)
}

#[cfg(target_os = "linux")]
fn statm_resident_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if page_size <= 0 {
        return None;
    }
    Some(resident_pages * page_size as u64)
}

#[cfg(not(target_os = "linux"))]
fn statm_resident_bytes() -> Option<u64> {
    None
}

fn rusage_max_rss_bytes() -> u64 {
    let mut rusage: libc::rusage = unsafe { std::mem::zeroed() };
    if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut rusage) } != 0 {
        return 0;
    }
    // ru_maxrss is kilobytes on Linux, bytes on macOS.
    if cfg!(target_os = "macos") {
        rusage.ru_maxrss as u64
    } else {
        rusage.ru_maxrss as u64 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resident_set_is_nonzero() {
        assert!(resident_set_bytes() > 0);
    }

    #[test]
    fn megabytes_round_down_from_bytes() {
        assert_eq!(resident_set_mb(), resident_set_bytes() / (1024 * 1024));
    }
}
