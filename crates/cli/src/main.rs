use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use linkgate_net::Config as NetConfig;
use linkgate_sdk::licenses::{BindRequest, VerifyRequest};
use linkgate_sdk::links::CreateLinkRequest;
use linkgate_sdk::{GatewayClient, Locator};

#[derive(Parser, Debug)]
#[command(name = "linkgate")]
#[command(about = "Issue and inspect delivery links, manage license bindings")]
struct Cli {
    /// Gateway base URL
    #[arg(
        short,
        long,
        env = "LINKGATE_SERVER",
        default_value = "http://127.0.0.1:8080",
        global = true
    )]
    server: String,

    /// Request timeout in seconds
    #[arg(long, default_value = "30", global = true)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue a delivery link for TARGET
    Create {
        #[arg(value_name = "TARGET")]
        target: String,
        #[arg(short, long)]
        program: String,
        #[arg(short, long)]
        account: String,
        /// Lifetime in minutes (fractions allowed)
        #[arg(short, long, default_value = "60")]
        minutes: f64,
        #[arg(short = 'u', long, default_value = "1")]
        max_uses: i64,
    },
    /// Bind (or rebind) a license for a program/account pair
    Bind {
        #[arg(short, long)]
        program: String,
        #[arg(short, long)]
        account: String,
        #[arg(short, long)]
        days: f64,
        #[arg(long)]
        demo: bool,
    },
    /// Check a license binding
    Verify {
        #[arg(short, long)]
        program: String,
        #[arg(short, long)]
        account: String,
    },
    /// Revoke a delivery link
    Revoke {
        #[arg(value_name = "SECURE_LINK")]
        link: String,
    },
    /// List who redeemed a delivery link
    Logs {
        #[arg(value_name = "SECURE_LINK")]
        link: String,
    },
    /// Redeem one use of a delivery link and save the file
    Download {
        #[arg(value_name = "SECURE_LINK")]
        link: String,
        #[arg(short, long, default_value = "download")]
        output: PathBuf,
    },
}

fn locator(link: &str) -> Result<Locator> {
    Locator::parse(link).map_err(|e| anyhow!("{}", e))
}

fn format_time(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S %Z")
        .to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = GatewayClient::new(&cli.server, NetConfig::default().with_timeout(cli.timeout))
        .context("Failed to set up gateway client")?;

    match cli.command {
        Command::Create {
            target,
            program,
            account,
            minutes,
            max_uses,
        } => {
            let locator = client
                .create_link(&CreateLinkRequest {
                    target,
                    program_id: program,
                    expiry_time_in_mins: minutes,
                    max_link_use: max_uses,
                    account_login: account,
                })
                .await?;
            println!("{}", locator.to_url(client.base_url()).green());
            println!(
                "  valid for {} minute(s), {} use(s)",
                minutes, max_uses
            );
        }
        Command::Bind {
            program,
            account,
            days,
            demo,
        } => {
            client
                .bind(&BindRequest {
                    program_id: program.clone(),
                    account_login: account.clone(),
                    days,
                    is_demo: demo,
                })
                .await?;
            let kind = if demo { "demo" } else { "full" };
            println!(
                "{} {}/{} bound for {} day(s) ({})",
                "✓".green(),
                program,
                account,
                days,
                kind
            );
        }
        Command::Verify { program, account } => {
            let verdict = client
                .verify(&VerifyRequest {
                    program_id: program.clone(),
                    account_login: account.clone(),
                })
                .await?;

            match verdict.expiry_date {
                None => println!("{} {}/{} is not bound", "✗".red(), program, account),
                Some(expiry) if verdict.valid => println!(
                    "{} {}/{} valid until {}{}",
                    "✓".green(),
                    program,
                    account,
                    format_time(expiry),
                    if verdict.is_demo { " (demo)" } else { "" }
                ),
                Some(expiry) => println!(
                    "{} {}/{} expired at {}",
                    "✗".red(),
                    program,
                    account,
                    format_time(expiry)
                ),
            }
        }
        Command::Revoke { link } => {
            let locator = locator(&link)?;
            client.revoke(&locator).await?;
            println!("{} revoked {}", "✓".green(), locator);
        }
        Command::Logs { link } => {
            let locator = locator(&link)?;
            let logs = client.logs(&locator).await?;
            if logs.is_empty() {
                println!("No redemptions recorded for {}", locator);
            }
            for entry in &logs {
                println!(
                    "{}  {:<15}  {}",
                    format_time(entry.timestamp).dimmed(),
                    entry.field("ip").unwrap_or("-"),
                    entry.field("userAgent").unwrap_or("-")
                );
            }
        }
        Command::Download { link, output } => {
            let locator = locator(&link)?;
            let upstream = client.download(&locator).await?;
            let content_type = upstream
                .content_type
                .clone()
                .unwrap_or_else(|| "unknown type".to_string());
            let written = upstream
                .save_to(&output)
                .await
                .with_context(|| format!("Failed to save {}", output.display()))?;
            println!(
                "{} saved {} bytes ({}) to {}",
                "✓".green(),
                written,
                content_type,
                output.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_create_arguments() {
        let cli = Cli::try_parse_from([
            "linkgate",
            "create",
            "https://cdn.example.com/ea.ex5",
            "-p",
            "ea-1",
            "-a",
            "12345",
            "-m",
            "0.5",
            "-u",
            "3",
        ])
        .unwrap();
        match cli.command {
            Command::Create {
                minutes, max_uses, ..
            } => {
                assert_eq!(minutes, 0.5);
                assert_eq!(max_uses, 3);
            }
            other => panic!("parsed as {:?}", other),
        }
    }

    #[test]
    fn test_locator_from_link() {
        let locator = locator("http://127.0.0.1:8080/ea-1/12345/abcdef").unwrap();
        assert_eq!(locator.token_id, "abcdef");
        assert!(super::locator("http://127.0.0.1:8080/only/two").is_err());
    }
}
