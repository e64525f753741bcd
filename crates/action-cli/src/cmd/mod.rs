pub mod config;
pub mod payload;
pub mod replay;
pub mod send;

use action_core::{
    ActionOptions, ActionReceipt, ActionRecord, Dispatcher, DispatcherConfig, DispatcherStats,
    ReceiptStatus,
};
use anyhow::Context;
use serde::Serialize;
use std::path::Path;

use crate::output::{print_json, print_table};

/// Optional context shared by `send` and `payload`.
#[derive(clap::Args, Debug, Default)]
pub struct ContextArgs {
    /// Screen the action happened on (sent truncated to 63 chars)
    #[arg(long)]
    pub screen: Option<String>,

    /// Free-text detail (sent truncated to 127 chars)
    #[arg(long)]
    pub extra: Option<String>,

    /// Question/section the action belongs to
    #[arg(long)]
    pub section_uid: Option<String>,
}

impl From<ContextArgs> for ActionOptions {
    fn from(args: ContextArgs) -> Self {
        ActionOptions {
            screen: args.screen,
            extra: args.extra,
            section_uid: args.section_uid,
        }
    }
}

/// Config file plus `JAH_*` environment overrides.
pub fn load_config(path: &Path) -> anyhow::Result<DispatcherConfig> {
    let mut config = DispatcherConfig::load(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    config.apply_env().context("invalid environment override")?;
    Ok(config)
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")
}

#[derive(Serialize)]
struct DeliveryReport {
    results: Vec<DeliveryResult>,
    stats: DispatcherStats,
}

#[derive(Serialize)]
struct DeliveryResult {
    action: String,
    client_timestamp: String,
    status: ReceiptStatus,
}

/// Enqueue `records` in order on one dispatcher, drain it, and print what
/// happened. Fails only when every relay failed.
pub fn dispatch_all(
    config: &DispatcherConfig,
    records: Vec<ActionRecord>,
    json: bool,
) -> anyhow::Result<()> {
    let rt = runtime()?;
    let report = rt.block_on(async {
        let dispatcher = Dispatcher::from_config(config).context("failed to build dispatcher")?;

        let pending: Vec<(String, String, ActionReceipt)> = records
            .into_iter()
            .map(|record| {
                let payload = record.payload();
                let receipt = dispatcher.enqueue(record);
                (payload.action, payload.client_timestamp, receipt)
            })
            .collect();
        tracing::info!(count = pending.len(), api_root = %config.api_root, "actions queued");

        let mut results = Vec::with_capacity(pending.len());
        for (action, client_timestamp, receipt) in pending {
            results.push(DeliveryResult {
                action,
                client_timestamp,
                status: receipt.await,
            });
        }
        let stats = dispatcher.shutdown().await;
        anyhow::Ok(DeliveryReport { results, stats })
    })?;

    if json {
        print_json(&report)?;
    } else {
        let rows: Vec<Vec<String>> = report
            .results
            .iter()
            .map(|r| {
                vec![
                    r.action.clone(),
                    r.client_timestamp.clone(),
                    status_label(r.status).to_string(),
                ]
            })
            .collect();
        print_table(&["ACTION", "CLIENT TIMESTAMP", "STATUS"], &rows);
        println!(
            "\nPosted: {}  Failed: {}",
            report.stats.posted, report.stats.failed
        );
    }

    if report.stats.enqueued > 0 && report.stats.posted == 0 {
        anyhow::bail!("no actions were recorded ({} failed)", report.stats.failed);
    }
    Ok(())
}

fn status_label(status: ReceiptStatus) -> &'static str {
    match status {
        ReceiptStatus::Posted => "posted",
        ReceiptStatus::Failed => "failed",
        ReceiptStatus::Dropped => "dropped",
    }
}
