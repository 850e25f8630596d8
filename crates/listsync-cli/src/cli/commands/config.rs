//! `listsync config` – show config path and effective settings.

use anyhow::Result;
use listsync_core::config::{self, ListsyncConfig};

pub fn run_config(cfg: &ListsyncConfig) -> Result<()> {
    let policy = cfg.retry_policy()?;
    println!("config:   {}", config::config_path()?.display());
    println!("endpoint: {}", cfg.endpoint);
    println!("list:     {}", cfg.list);
    println!(
        "timeouts: connect {}s, request {}s",
        cfg.connect_timeout_secs, cfg.request_timeout_secs
    );
    println!(
        "retry:    {} attempts, base delay {} ms",
        policy.max_attempts(),
        policy.base_delay().as_millis()
    );
    Ok(())
}
