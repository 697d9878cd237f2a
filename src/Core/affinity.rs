// Thread-to-core pinning for the worker pool

use std::io;

/// Cores this process may run on, in ascending order.
#[cfg(target_os = "linux")]
pub fn allowed_cores() -> Vec<usize> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut set) != 0 {
            return fallback_cores();
        }
        let cores: Vec<usize> = (0..libc::CPU_SETSIZE as usize)
            .filter(|&cpu| libc::CPU_ISSET(cpu, &set))
            .collect();
        if cores.is_empty() {
            fallback_cores()
        } else {
            cores
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub fn allowed_cores() -> Vec<usize> {
    fallback_cores()
}

fn fallback_cores() -> Vec<usize> {
    let n = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (0..n).collect()
}

/// Number of cores workers can be pinned to.
pub fn available_cores() -> usize {
    allowed_cores().len()
}

/// Pin the calling thread to `core`.
#[cfg(target_os = "linux")]
pub fn pin_current_thread(core: usize) -> io::Result<()> {
    if core >= libc::CPU_SETSIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("core {core} exceeds CPU_SETSIZE"),
        ));
    }
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn pin_current_thread(_core: usize) -> io::Result<()> {
    // No portable hard-affinity API; workers run unpinned
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "thread pinning only supported on Linux",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_least_one_core_is_available() {
        let cores = allowed_cores();
        assert!(!cores.is_empty());
        assert_eq!(available_cores(), cores.len());
        assert!(cores.windows(2).all(|w| w[0] < w[1]));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn pinning_to_an_allowed_core_succeeds() {
        let core = allowed_cores()[0];
        std::thread::spawn(move || pin_current_thread(core))
            .join()
            .unwrap()
            .unwrap();
    }
}
