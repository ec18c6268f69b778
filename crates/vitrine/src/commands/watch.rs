//! `vitrine watch`: live view of one collection.

use chrono::Local;
use tracing::info;

use vitrine_core::{CacheEntry, FetchStatus, SyncClient};

use crate::cli::{GlobalOpts, WatchArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(client: &SyncClient, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    client.connect().await?;
    let color = output::should_color(global.color);
    let mut stream = client.observe(&args.resource);
    info!(key = %args.resource, "watching");

    let mut last_version = None;
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            changed = stream.changed() => {
                let Some(entry) = changed else {
                    break Ok(());
                };
                // Loading transitions carry no new data.
                if entry.status == FetchStatus::Loading {
                    continue;
                }
                if let Some(err) = entry.error.clone().filter(|_| entry.status == FetchStatus::Error) {
                    if err.is_auth_expired() {
                        break Err(CliError::from_core(
                            err,
                            global.profile.as_deref().unwrap_or("default"),
                            &args.resource.to_string(),
                        ));
                    }
                    output::status(&format!("refresh failed: {err}"), color, global.quiet);
                    continue;
                }
                let fingerprint = Some((entry.fetched_at, entry.data.clone()));
                if fingerprint == last_version {
                    continue;
                }
                last_version = fingerprint;
                render(&entry, &args, global, color);
            }
        }
    };

    client.disconnect().await;
    result
}

fn render(entry: &CacheEntry, args: &WatchArgs, global: &GlobalOpts, color: bool) {
    output::status(
        &format!(
            "{} {} ({} items)",
            Local::now().format("%H:%M:%S"),
            entry.key,
            entry.data.len()
        ),
        color,
        global.quiet,
    );
    let out = output::render_list(global.output, entry.data.items(), &args.columns);
    output::print_output(&out, global.quiet);
}
