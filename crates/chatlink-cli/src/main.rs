mod bootstrap_helpers;
mod chat_command;
mod cli_args;
mod terminal_renderer;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::chat_command::run_chat_command;
use crate::cli_args::{Cli, CliCommand};

async fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        CliCommand::Serve(args) => {
            let config = args.to_gateway_config()?;
            chatlink_gateway::run_gateway_server(config).await
        }
        CliCommand::Chat(args) => run_chat_command(&args).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    run_cli(Cli::parse()).await
}
