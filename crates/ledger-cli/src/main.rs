use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the escrow ledger node")]
struct Cli {
    /// Node API base URL (e.g. http://127.0.0.1:8080)
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    node: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction
    Submit {
        /// Sender
        #[arg(long)]
        from: String,
        /// Recipient
        #[arg(long)]
        to: String,
        /// Amount
        #[arg(long)]
        amount: u64,
        /// Forward to the node's peers instead of buffering on the node
        #[arg(long)]
        gossip: bool,
    },
    /// Mine the pending transactions now
    Mine,
    /// Print the chain snapshot
    Chain,
    /// List pending transactions
    Pending,
    /// Open an escrow contract
    Open {
        #[arg(long)]
        buyer: String,
        #[arg(long)]
        seller: String,
        #[arg(long)]
        amount: u64,
    },
    /// Apply confirm, dispute or refund to a contract
    Act {
        /// Contract id
        id: String,
        /// confirm | dispute | refund
        action: String,
    },
    /// List contracts known to the node
    Contracts,
}

#[derive(Serialize)]
struct Tx {
    from: String,
    to: String,
    amount: u64,
    gossip: bool,
}

#[derive(Serialize)]
struct Contract {
    buyer: String,
    seller: String,
    amount: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let node = cli.node.trim_end_matches('/');
    let client = reqwest::Client::new();

    let request = match cli.cmd {
        Command::Submit {
            from,
            to,
            amount,
            gossip,
        } => client.post(format!("{node}/tx")).json(&Tx {
            from,
            to,
            amount,
            gossip,
        }),
        Command::Mine => client.post(format!("{node}/mine")),
        Command::Chain => client.get(format!("{node}/chain")),
        Command::Pending => client.get(format!("{node}/pending")),
        Command::Open {
            buyer,
            seller,
            amount,
        } => {
            if amount == 0 {
                bail!("amount must be positive");
            }
            client.post(format!("{node}/contracts")).json(&Contract {
                buyer,
                seller,
                amount,
            })
        }
        Command::Act { id, action } => {
            if !matches!(action.as_str(), "confirm" | "dispute" | "refund") {
                bail!("action must be confirm, dispute or refund");
            }
            client.post(format!("{node}/contracts/{id}/{action}"))
        }
        Command::Contracts => client.get(format!("{node}/contracts")),
    };

    let res = request.send().await?;
    let status = res.status();
    let body = res.text().await?;
    debug!(%status, "response received");
    println!("status: {}", status);
    match serde_json::from_str::<Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}
