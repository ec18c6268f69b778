//! One-shot resource commands: list, create, update, delete, action.

use serde_json::Value;
use vitrine_core::{CoreError, ResourceKey, SyncClient};

use crate::cli::{ActionArgs, CreateArgs, DeleteArgs, GlobalOpts, ListArgs, UpdateArgs};
use crate::error::CliError;
use crate::output;

use super::util;

fn core_err(global: &GlobalOpts, key: &ResourceKey) -> impl Fn(CoreError) -> CliError {
    let profile = global.profile.clone().unwrap_or_else(|| "default".into());
    let resource = key.to_string();
    move |e| CliError::from_core(e, &profile, &resource)
}

/// Print the server's copy of a written document. Writes the server only
/// acknowledged get a status line instead.
fn print_written(doc: Option<&Value>, acknowledged: &str, global: &GlobalOpts) {
    match doc {
        Some(doc) => output::print_output(&output::render_single(global.output, doc), global.quiet),
        None => output::status(acknowledged, output::should_color(global.color), global.quiet),
    }
}

pub async fn list(client: &SyncClient, args: ListArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let entry = client
        .fetch(&args.resource)
        .await
        .map_err(core_err(global, &args.resource))?;
    let out = output::render_list(global.output, entry.data.items(), &args.columns);
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn create(client: &SyncClient, args: CreateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let payload = util::read_body(&args.body)?;
    let created = client
        .create(&args.resource, payload)
        .await
        .map_err(core_err(global, &args.resource))?;
    print_written(created.as_ref(), &format!("Created in {}", args.resource), global);
    Ok(())
}

pub async fn update(client: &SyncClient, args: UpdateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let fields = util::read_object(&args.body)?;
    let updated = client
        .update(&args.resource, &args.id, fields)
        .await
        .map_err(core_err(global, &args.resource))?;
    print_written(
        updated.as_ref(),
        &format!("Updated {} in {}", args.id, args.resource),
        global,
    );
    Ok(())
}

pub async fn delete(client: &SyncClient, args: DeleteArgs, global: &GlobalOpts) -> Result<(), CliError> {
    client
        .remove(&args.resource, &args.id)
        .await
        .map_err(core_err(global, &args.resource))?;
    output::status(
        &format!("Deleted {} from {}", args.id, args.resource),
        output::should_color(global.color),
        global.quiet,
    );
    Ok(())
}

pub async fn action(client: &SyncClient, args: ActionArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let body = args
        .data
        .as_deref()
        .map(|raw| util::parse_json("data", raw))
        .transpose()?;
    let done = format!("Applied {} to {} in {}", args.action.segment(), args.id, args.resource);
    let updated = client
        .patch_action(&args.resource, &args.id, args.action, body)
        .await
        .map_err(core_err(global, &args.resource))?;
    print_written(updated.as_ref(), &done, global);
    Ok(())
}
