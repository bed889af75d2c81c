use crate::constants::ENV_LOCAL_THREADS;
use std::time::{SystemTime, UNIX_EPOCH};

/// Job ids look like `local<pid><secs>`; unique enough for one machine.
pub fn local_job_id() -> String {
    let pid = std::process::id();
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("local{}{}", pid, ts)
}

pub fn local_threads() -> usize {
    env_usize(ENV_LOCAL_THREADS).unwrap_or_else(num_cpus::get).max(1)
}

pub fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<usize>().ok())
}

pub fn env_var_truthy(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.to_ascii_lowercase();
            v == "1" || v == "true" || v == "yes" || v == "on"
        }
        Err(_) => false,
    }
}
