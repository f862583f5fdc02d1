use clap::Parser;
use miette::{IntoDiagnostic, Result};
use serde_json::json;
use std::fs::File;
use std::io::{self, BufReader, Write};
use wallet_ledger::application::engine::LedgerEngine;
use wallet_ledger::bootstrap::open_store;
use wallet_ledger::config::{Cli, Command};
use wallet_ledger::domain::mutation::BalanceQuery;
use wallet_ledger::interfaces::dispatch::{Dispatcher, money_json};
use wallet_ledger::interfaces::http;
use wallet_ledger::interfaces::jsonl::RequestReader;
use wallet_ledger::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.logging);

    let provider = open_store(&cli.store).await?;
    let engine = LedgerEngine::new(provider).with_store_timeout(cli.store.store_timeout());

    match cli.command {
        Command::Serve { listen } => {
            http::serve(listen, Dispatcher::new(engine))
                .await
                .into_diagnostic()?;
        }
        Command::Replay { input } => {
            let dispatcher = Dispatcher::new(engine);
            let file = File::open(input).into_diagnostic()?;
            let reader = RequestReader::new(BufReader::new(file));

            let stdout = io::stdout();
            let mut out = stdout.lock();
            for request in reader.requests() {
                match request {
                    Ok(envelope) => {
                        let reply = dispatcher
                            .dispatch(envelope.operation, envelope.payload)
                            .await;
                        let line = serde_json::to_string(&reply).into_diagnostic()?;
                        writeln!(out, "{}", line).into_diagnostic()?;
                    }
                    Err(e) => {
                        eprintln!("Error reading request: {}", e);
                    }
                }
            }
        }
        Command::Balance { user_id } => {
            let balance = engine
                .get_balance(BalanceQuery {
                    user_id: Some(user_id.into()),
                })
                .await?;
            println!("{}", json!({ "balance": money_json(balance) }));
        }
    }

    Ok(())
}
