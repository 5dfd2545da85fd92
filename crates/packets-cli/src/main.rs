//! Packets CLI
//!
//! Thin wrapper around packets-core for command-line usage. Each invocation
//! joins an in-process session as one participant, works against the data
//! directory, and waits for background writes before exiting.
//!
//! ## Usage
//!
//! ```bash
//! # Show session information
//! packets info
//!
//! # Register a module
//! packets module register oif
//!
//! # Create a packet (or re-open it when it exists)
//! packets create --module oif --id sheet1 --data '{"value": 42}'
//!
//! # Replace an existing packet's data
//! packets create --module oif --id sheet1 --data '{"value": 99}' --override
//!
//! # Show a packet
//! packets show sheet1
//!
//! # Edit a packet as a player, with a game master online to save it
//! packets --role player --with-gm set sheet1 --data '{"value": 7}'
//!
//! # Inspect the shared mirror
//! packets mirror show
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use packets_core::{
    CapabilitySet, FsStorage, LogNotifier, MirrorSnapshot, MirrorStore, Notifier, PacketDraft,
    PacketStore, Payload, SessionHub, SettingsMirror, SettingsStore, StorageService, StoreConfig,
};
use serde_json::Value;
use tracing::{debug, info};

/// Name of the capable participant started by `--with-gm`
const HOST_PARTICIPANT: &str = "gm";

/// Packets - shared module data with capability delegation
#[derive(Parser)]
#[command(name = "packets")]
#[command(version = "0.1.0")]
#[command(about = "Packets - shared module data with capability delegation")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.packets/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Participant name
    #[arg(short, long, global = true, default_value = "local")]
    participant: String,

    /// Capabilities of the participant
    #[arg(short, long, global = true, value_enum, default_value = "gm")]
    role: Role,

    /// Active module (repeatable, default: every module is active)
    #[arg(short, long, global = true)]
    active: Vec<String>,

    /// Also run a capable participant that saves on a player's behalf
    #[arg(long, global = true)]
    with_gm: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    /// May read and write the packet store and the mirror
    Gm,
    /// May do neither, and delegates to a game master
    Player,
}

impl Role {
    fn grants(self) -> CapabilitySet {
        match self {
            Role::Gm => CapabilitySet::ALL,
            Role::Player => CapabilitySet::NONE,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Role::Gm => "gm",
            Role::Player => "player",
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show session information
    Info,

    /// Module management
    Module {
        #[command(subcommand)]
        action: ModuleAction,
    },

    /// Create a packet, or re-open it when it already exists
    Create {
        /// Owning module
        #[arg(short, long)]
        module: String,
        /// Packet id
        #[arg(short, long)]
        id: String,
        /// Packet data as JSON
        #[arg(long)]
        data: String,
        /// Replace the data of an existing packet
        #[arg(long = "override")]
        override_existing: bool,
    },

    /// Show one packet
    Show {
        /// Packet id
        id: String,
    },

    /// List every packet
    List,

    /// Replace a packet's data and save it
    Set {
        /// Packet id
        id: String,
        /// New packet data as JSON
        #[arg(long)]
        data: String,
    },

    /// Reload every packet from the packet store
    Refresh,

    /// Mirror inspection
    Mirror {
        #[command(subcommand)]
        action: MirrorAction,
    },
}

#[derive(Subcommand)]
enum ModuleAction {
    /// Register a module so it may own packets
    Register {
        /// Module name
        name: String,
    },
    /// List registered modules
    List,
}

#[derive(Subcommand)]
enum MirrorAction {
    /// Print the mirror snapshot
    Show,
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();
}

/// Get the default data directory (~/.packets/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".packets")
        .join("data")
}

/// Parse packet data from a JSON string
fn parse_data(s: &str) -> Result<Value> {
    serde_json::from_str(s).map_err(|e| anyhow::anyhow!("Invalid JSON data: {}", e))
}

/// The local participant's store plus whatever else the session runs
struct Session {
    hub: Arc<SessionHub>,
    store: PacketStore,
    host: Option<PacketStore>,
    mirror: Arc<dyn MirrorStore>,
}

impl Session {
    fn open(data_dir: &Path, cli: &Cli) -> Result<Self> {
        if cli.with_gm && cli.participant == HOST_PARTICIPANT {
            anyhow::bail!(
                "Participant name '{}' is taken by --with-gm",
                HOST_PARTICIPANT
            );
        }

        let config = StoreConfig::default();
        let storage: Arc<dyn StorageService> = Arc::new(FsStorage::new(data_dir.join("server"))?);
        let settings = SettingsStore::new(data_dir.join("settings.redb"))?;
        let mirror: Arc<dyn MirrorStore> =
            Arc::new(SettingsMirror::new(settings, config.mirror_key.clone()));
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

        let hub = SessionHub::new();
        if cli.active.is_empty() {
            hub.activate_all_modules();
        } else {
            for module in &cli.active {
                hub.activate_module(module.as_str());
            }
        }

        let host = if cli.with_gm {
            let link = hub.join(HOST_PARTICIPANT, CapabilitySet::ALL);
            let services = link.services(storage.clone(), mirror.clone(), notifier.clone());
            let host = PacketStore::new(HOST_PARTICIPANT, services, config.clone());
            hub.attach(host.participant(), &host);
            Some(host)
        } else {
            None
        };

        let link = hub.join(cli.participant.as_str(), cli.role.grants());
        let services = link.services(storage, mirror.clone(), notifier);
        let store = PacketStore::new(cli.participant.as_str(), services, config);
        hub.attach(store.participant(), &store);

        Ok(Self {
            hub,
            store,
            host,
            mirror,
        })
    }

    async fn initialize(&self) {
        if let Some(host) = &self.host {
            host.initialize().await;
        }
        self.store.initialize().await;
    }

    /// Wait for background registry writes and broadcasts
    async fn close(&self) {
        self.store.flush().await;
        if let Some(host) = &self.host {
            host.flush().await;
        }
        self.hub.settle().await;
        debug!("Session closed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    info!(data_dir = %data_dir.display(), participant = %cli.participant, "Opening session");

    let session = Session::open(&data_dir, &cli)?;
    session.initialize().await;
    let store = &session.store;

    let outcome = run(&cli, &session, &data_dir).await;
    session.close().await;
    outcome?;

    debug!(packets = store.records().len(), "Done");
    Ok(())
}

async fn run(cli: &Cli, session: &Session, data_dir: &Path) -> Result<()> {
    let store = &session.store;

    match &cli.command {
        Commands::Info => {
            let registry = store.registry();

            println!("Packets v0.1.0");
            println!();
            println!("Participant: {}", store.participant());
            println!("  Role: {}", cli.role.label());
            println!(
                "  Capable participant online: {}",
                if cli.role == Role::Gm || session.host.is_some() {
                    "Yes"
                } else {
                    "No"
                }
            );
            println!();
            println!("Data directory: {}", data_dir.display());
            println!("Modules: {}", registry.modules.len());
            println!("Packets: {}", store.records().len());
        }

        Commands::Module { action } => match action {
            ModuleAction::Register { name } => {
                store.register_module(name.as_str()).await?;
                println!("Registered module: {}", name);
            }

            ModuleAction::List => {
                let modules = store.registry().modules;
                if modules.is_empty() {
                    println!("No modules registered.");
                } else {
                    println!("Modules ({}):", modules.len());
                    for module in modules {
                        println!("  {}", module);
                    }
                }
            }
        },

        Commands::Create {
            module,
            id,
            data,
            override_existing,
        } => {
            let payload = Payload::new(parse_data(data)?);
            let draft = PacketDraft::new(id.as_str(), module.as_str(), payload);
            let packet = store.create(draft, *override_existing).await?;

            println!("Packet: {}", packet.id());
            println!("  Module: {}", packet.module());
            println!(
                "  Data: {}",
                serde_json::to_string(packet.data().as_value())?
            );
        }

        Commands::Show { id } => {
            let Some(packet) = store.get(&id.as_str().into()) else {
                anyhow::bail!("Packet not found: {}", id);
            };
            println!("{}", serde_json::to_string_pretty(packet.record())?);
        }

        Commands::List => {
            let records = store.records();
            if records.is_empty() {
                println!("No packets found.");
            } else {
                println!("Packets ({}):", records.len());
                println!();
                for record in records {
                    println!("  {} {}", record.id, record.path());
                }
            }
        }

        Commands::Set { id, data } => {
            let Some(mut packet) = store.get(&id.as_str().into()) else {
                anyhow::bail!("Packet not found: {}", id);
            };
            packet.set_data(Payload::new(parse_data(data)?));
            packet.save().await?;
            println!("Saved packet: {}", id);
        }

        Commands::Refresh => {
            store.refresh().await?;
            println!("Refreshed {} packets", store.records().len());
        }

        Commands::Mirror { action } => match action {
            MirrorAction::Show => match session.mirror.read().await? {
                Some(blob) => {
                    let snapshot = MirrorSnapshot::decode(&blob)?;
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                }
                None => println!("Mirror is empty."),
            },
        },
    }

    Ok(())
}
