//! `listsync add --field Title=... [--attach FILE]...` – create one item.

use anyhow::{Context, Result};
use listsync_core::attachments::FsContentSource;
use listsync_core::config::ListsyncConfig;
use listsync_core::control::CancelToken;
use listsync_core::retry::RetryingExecutor;
use listsync_core::transport::{Fields, HttpTransport};
use listsync_core::writer::CompoundItemWriter;
use std::path::PathBuf;
use std::sync::Arc;

pub async fn run_add(
    cfg: &ListsyncConfig,
    fields: Vec<(String, String)>,
    folder: Option<&str>,
    attachments: &[PathBuf],
    list: Option<&str>,
) -> Result<()> {
    let policy = cfg.retry_policy().context("invalid [retry] settings")?;
    let transport = HttpTransport::new(&cfg.endpoint, cfg.connect_timeout(), cfg.request_timeout())?;

    let cancel = CancelToken::new();
    tokio::spawn(watch_interrupts(cancel.clone()));

    let executor = RetryingExecutor::new(transport, policy).with_cancel(cancel);
    let writer = CompoundItemWriter::new(
        executor,
        Arc::new(FsContentSource),
        list.unwrap_or(&cfg.list),
    );

    let fields: Fields = fields
        .into_iter()
        .map(|(name, value)| (name, serde_json::Value::String(value)))
        .collect();
    let handle = writer.create(folder, &fields, attachments).await?;

    match handle.id {
        Some(id) => println!("Created item {id} in {}", handle.list),
        None => println!("Created item {} in {}", handle.key, handle.list),
    }
    for name in &handle.attachments {
        println!("  attached {name}");
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InterruptAction {
    Cancel,
    Exit,
}

/// First interrupt cancels the write so the rollback can run; another one
/// while that is in progress exits.
pub(crate) fn on_interrupt(cancel: &CancelToken) -> InterruptAction {
    if cancel.is_cancelled() {
        return InterruptAction::Exit;
    }
    cancel.cancel();
    InterruptAction::Cancel
}

async fn watch_interrupts(cancel: CancelToken) {
    while tokio::signal::ctrl_c().await.is_ok() {
        match on_interrupt(&cancel) {
            InterruptAction::Cancel => tracing::warn!(
                "interrupt received; cancelling write (press Ctrl-C again to exit now)"
            ),
            InterruptAction::Exit => {
                tracing::warn!("second interrupt; exiting without waiting for rollback");
                eprintln!("Interrupted again; the staged item may need manual cleanup.");
                std::process::exit(130);
            }
        }
    }
}
