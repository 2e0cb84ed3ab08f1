//! Command handlers, one module per subcommand group.

mod agents;
mod connect;
mod demo;
mod request;
mod settings;
mod watch;

use std::sync::Arc;

use clap::CommandFactory;
use clap_complete::Shell;

use scadalink_core::{Supervisor, WsConnector};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

/// Wire the connection layer over the on-disk state and `config.toml`.
pub fn build_supervisor() -> Result<Supervisor, CliError> {
    let config = scadalink_config::load_config()?;
    let store = scadalink_config::open_state_store()?;
    tracing::debug!(state = %store.path().display(), "state store");
    Ok(Supervisor::new(
        Arc::new(store),
        Arc::new(WsConnector),
        config.to_client_config(),
    ))
}

pub async fn dispatch(
    cmd: Command,
    supervisor: &Supervisor,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Settings(args) => settings::handle(supervisor, args, global).await,
        Command::Connect(args) => connect::handle(supervisor, &args, global).await,
        Command::Get { path } => request::get(supervisor, &path, global).await,
        Command::Post { path, body } => request::post(supervisor, &path, &body, global).await,
        Command::Agents(args) => agents::handle(supervisor, args, global).await,
        Command::Watch(args) => watch::handle(supervisor, args, global).await,
        Command::Demo { state } => demo::handle(supervisor, state, global),
        Command::Completions { shell } => completions(shell),
    }
}

/// Write a completion script for `shell` to stdout. Needs no server state.
pub fn completions(shell: Shell) -> Result<(), CliError> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "scadalink", &mut std::io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use scadalink_core::{ClientConfig, MemoryStore};

    use super::*;
    use crate::cli::{ColorMode, OutputFormat};

    #[tokio::test]
    async fn completions_dispatch_without_a_server() {
        let supervisor = Supervisor::new(
            Arc::new(MemoryStore::new()),
            Arc::new(WsConnector),
            ClientConfig::default(),
        );
        let global = GlobalOpts {
            output: OutputFormat::Plain,
            color: ColorMode::Never,
            verbose: 0,
            quiet: true,
        };

        dispatch(Command::Completions { shell: Shell::Bash }, &supervisor, &global)
            .await
            .unwrap();
    }
}
