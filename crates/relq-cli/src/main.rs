//! relq CLI: push, pop and consume queues, and recover items left in backup lists.
//!
//! The store is configured through the environment (RELQ_STORE_BACKEND, REDIS_URL, ...).

use anyhow::Context;
use clap::{Parser, Subcommand};
use relq_cli::{init_tracing, print_backup_table, BackupListing, OutputFormat};
use relq_core::QueueConfig;
use relq_worker::{InstanceIdentity, ReliableQueue};

#[derive(Parser, Debug)]
#[command(name = "relq", about = "Reliable Redis work queue tool")]
struct Cli {
    /// Database index (defaults to RELQ_DEFAULT_DB)
    #[arg(long, global = true)]
    db: Option<i64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Push a value onto the head of a queue
    Push {
        queue: String,
        value: String,
    },
    /// Pop one value from the tail of a queue
    Pop {
        queue: String,
        /// Seconds to wait for a value (defaults to RELQ_POLL_TIMEOUT_SECS, 0 waits forever)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Show the items held in a backup list
    Backups {
        queue: String,
        /// Host part of the backup list name (defaults to this instance)
        #[arg(long)]
        host: Option<String>,
        /// Process part of the backup list name (defaults to this instance)
        #[arg(long)]
        process: Option<String>,
        #[arg(long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
    /// Move the items of a dead instance's backup list back onto the queue
    Restore {
        queue: String,
        #[arg(long)]
        host: String,
        #[arg(long)]
        process: String,
    },
    /// Consume a queue, printing each item, until Ctrl-C
    Consume {
        queue: String,
        /// Poll timeout in seconds, at least 1 so Ctrl-C is noticed (defaults to RELQ_POLL_TIMEOUT_SECS)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = QueueConfig::from_env().context("Failed to load relq configuration")?;
    init_tracing(config.is_production());

    let db = cli.db.unwrap_or(config.default_db);
    anyhow::ensure!(db >= 0, "--db must not be negative");

    let queue = ReliableQueue::from_config(&config)
        .await
        .context("Failed to connect to the queue store")?;

    match cli.command {
        Commands::Push { queue: name, value } => {
            queue.push_text(db, &name, &value).await?;
            println!("Pushed 1 item to {}", name);
        }
        Commands::Pop {
            queue: name,
            timeout,
        } => {
            let timeout = timeout.unwrap_or(config.poll_timeout_secs);
            match queue.pop(db, &name, timeout).await? {
                Some(raw) => println!("{}", String::from_utf8_lossy(&raw)),
                None => eprintln!("No item available on {} after {}s", name, timeout),
            }
        }
        Commands::Backups {
            queue: name,
            host,
            process,
            format,
        } => {
            let identity = identity_or_current(queue.identity(), host, process);
            let items = queue.inspect_backup(db, &name, &identity).await?;
            let listing = BackupListing::new(db, identity.backup_list_name(&name), items);

            match format {
                OutputFormat::Json => {
                    let out = serde_json::to_string_pretty(&listing)
                        .context("Serialize backup listing")?;
                    println!("{}", out);
                }
                OutputFormat::Table => print_backup_table(&listing),
            }
        }
        Commands::Restore {
            queue: name,
            host,
            process,
        } => {
            let identity = InstanceIdentity::new(host, process);
            let restored = queue.restore_backup(db, &name, &identity).await?;
            println!(
                "Restored {} item(s) from {} to {}",
                restored,
                identity.backup_list_name(&name),
                name
            );
        }
        Commands::Consume {
            queue: name,
            timeout,
        } => {
            let timeout = timeout.unwrap_or(config.poll_timeout_secs);
            consume(&queue, db, &name, timeout).await?;
        }
    }

    Ok(())
}

fn identity_or_current(
    current: &InstanceIdentity,
    host: Option<String>,
    process: Option<String>,
) -> InstanceIdentity {
    InstanceIdentity::new(
        host.unwrap_or_else(|| current.host().to_string()),
        process.unwrap_or_else(|| current.process().to_string()),
    )
}

async fn consume(queue: &ReliableQueue, db: i64, name: &str, timeout: u64) -> anyhow::Result<()> {
    let completion = queue.start_text(db, name, timeout, |item| {
        println!("{}", item);
        Ok(())
    })?;

    tokio::select! {
        _ = completion.clone() => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!(queue = %name, "Interrupt received, stopping consumer");
            queue.stop(db, name)?;
        }
    }

    match completion.await.into_result() {
        Ok(true) => {
            eprintln!("Consumer on {} stopped", name);
            Ok(())
        }
        Ok(false) => anyhow::bail!("Consumer on {} was cancelled by the store", name),
        Err(err) => Err(anyhow::Error::new(err).context(format!(
            "Consumer on {} failed; the failing item is kept in {}",
            name,
            queue.identity().backup_list_name(name)
        ))),
    }
}
