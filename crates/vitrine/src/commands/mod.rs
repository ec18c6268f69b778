//! Command dispatch: bridges CLI args -> `SyncClient` calls -> output formatting.

pub mod config_cmd;
pub mod resources;
pub mod util;
pub mod watch;

use vitrine_core::SyncClient;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch an API-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, client: &SyncClient, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::List(args) => resources::list(client, args, global).await,
        Command::Create(args) => resources::create(client, args, global).await,
        Command::Update(args) => resources::update(client, args, global).await,
        Command::Delete(args) => resources::delete(client, args, global).await,
        Command::Action(args) => resources::action(client, args, global).await,
        Command::Watch(args) => watch::handle(client, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
