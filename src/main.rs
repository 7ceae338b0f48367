use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use fedwallet_core::{MembershipSession, TransferEligibility, WalletConfig, WarningKind};
use fedwallet_invite::InviteCode;
use fedwallet_types::{FederationId, FederationIdentity};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "fedwallet.toml")]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a federation, trying each invite code in order
    Join {
        /// Invite codes, most preferred first
        #[arg(required = true)]
        codes: Vec<String>,
    },

    /// List joined federations
    List,

    /// Leave a federation
    Remove {
        /// Federation ID
        id: String,
    },

    /// Show balances per federation
    Balances,

    /// Recommend a federation to your contacts
    Recommend {
        /// Federation ID
        id: String,
    },

    /// Withdraw a recommendation
    Unrecommend {
        /// Federation ID
        id: String,
    },

    /// Check whether funds can be moved out of a federation
    TransferCheck {
        /// Federation ID
        id: String,
    },

    /// List federations recommended by your contacts
    Discover,

    /// Join a federation found with `discover`
    JoinDiscovered {
        /// Federation ID
        id: String,
    },

    /// Print the invite code of a joined federation
    Invite {
        /// Federation ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = WalletConfig::load_or_create(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let backend = config
        .backend
        .build_http_backend()
        .context("Invalid wallet backend configuration")?;
    debug!("Using wallet backend at {}", backend.base_url());

    let session = MembershipSession::new(Arc::new(backend), config.membership.clone()).await;
    session.refresh().await.context("Failed to load federation memberships")?;

    match &cli.command {
        Commands::Join { codes } => {
            let joined = session.enroll(codes.as_slice()).await?;
            println!("Joined federation {} ({})", joined.name, joined.id);
            if let Some(message) = &joined.welcome_message {
                println!("{}", message);
            }
        }

        Commands::List => {
            let federations = session.list_membership().await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&federations)?);
            } else if federations.is_empty() {
                println!("Not a member of any federation");
            } else {
                for federation in &federations {
                    println!("{}  {}", federation.id, federation.name);
                }
            }

            if let Some(warning) = session.expiration_warning(Utc::now()).await {
                match warning.kind {
                    WarningKind::Popup { message, .. } => {
                        eprintln!("{}: {}", warning.federation_name, message);
                    }
                    WarningKind::Expiring { expires_at } => {
                        eprintln!(
                            "Federation {} shuts down on {}, move your funds",
                            warning.federation_name,
                            expires_at.format("%Y-%m-%d")
                        );
                    }
                }
            }
        }

        Commands::Remove { id } => {
            let removed = session.remove_membership(&FederationId::from(id.as_str())).await?;
            println!("Left federation {} ({})", removed.name, removed.id);
        }

        Commands::Balances => {
            let balances = session.aggregated_balances().await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&balances)?);
            } else {
                for federation in session.list_membership().await {
                    match balances.get(&federation.id) {
                        Some(amount) => println!("{}  {}", federation.name, amount),
                        None => println!("{}  unknown", federation.name),
                    }
                }
                if let Some(total) = balances.total() {
                    println!("Total  {}", total);
                }
            }
        }

        Commands::Recommend { id } => {
            let federation = member(&session, id).await?;
            session
                .set_recommendation(&federation.id, &federation.invite_code, true)
                .await?;
            println!("Recommended {}", federation.name);
        }

        Commands::Unrecommend { id } => {
            let federation = member(&session, id).await?;
            session.refresh_recommendations().await;
            session
                .set_recommendation(&federation.id, &federation.invite_code, false)
                .await?;
            println!("Withdrew recommendation for {}", federation.name);
        }

        Commands::TransferCheck { id } => match session.transfer_check(&FederationId::from(id.as_str())).await {
            TransferEligibility::Eligible { destinations } => {
                println!("Funds can be moved to:");
                for destination in destinations {
                    println!("  {}  {}", destination.id, destination.name);
                }
            }
            TransferEligibility::NeedsAnotherFederation => {
                println!("Join another federation before transferring funds out of this one");
            }
            TransferEligibility::UnknownFederation => {
                return Err(anyhow!("Not a member of federation {}", id));
            }
        },

        Commands::Discover => {
            let entries = session.discover_federations().await;
            if entries.is_empty() {
                println!("No federations found");
            }
            for entry in entries {
                let marker = if entry.already_member { "*" } else { " " };
                println!(
                    "{} {}  {}  ({} recommendations)",
                    marker,
                    entry.federation.id,
                    entry.federation.display_name(),
                    entry.federation.recommendations.len()
                );
            }
        }

        Commands::JoinDiscovered { id } => {
            let target = FederationId::from(id.as_str());
            let entry = session
                .discover_federations()
                .await
                .into_iter()
                .find(|entry| entry.federation.id == target)
                .ok_or_else(|| anyhow!("Federation {} was not found through discovery", id))?;

            let joined = session.enroll_discovered(&entry.federation).await?;
            println!("Joined federation {} ({})", joined.name, joined.id);
        }

        Commands::Invite { id } => {
            let federation = member(&session, id).await?;
            println!("{}", federation.invite_code);

            if let Ok(descriptor) = InviteCode::parse(&federation.invite_code) {
                for guardian in &descriptor.guardians {
                    debug!("Guardian endpoint: {}", guardian);
                }
            }
        }
    }

    Ok(())
}

async fn member(session: &MembershipSession, id: &str) -> Result<FederationIdentity> {
    session
        .federation(&FederationId::from(id))
        .await
        .ok_or_else(|| anyhow!("Not a member of federation {}", id))
}
