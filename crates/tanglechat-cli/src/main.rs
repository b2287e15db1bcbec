//! Tanglechat CLI
//!
//! Thin wrapper around tanglechat-core use cases for command-line usage.
//! Every profile keeps its identity and contacts in its own data directory;
//! profiles talk to each other through a shared ledger file.
//!
//! ## Usage
//!
//! ```bash
//! # Create an identity and publish it
//! tanglechat identity init --name Alice
//! tanglechat contact publish
//!
//! # Show your addresses (share the public key and contact addresses)
//! tanglechat identity show
//!
//! # Request a contact
//! tanglechat contact add <request-address> <contact-address>
//!
//! # Counterpart: read the inbox and accept
//! tanglechat contact inbox
//! tanglechat contact accept <public-key-address>
//! tanglechat contact decline <public-key-address>
//!
//! # Initiator: pick up the acceptance
//! tanglechat contact confirm
//!
//! # Chat
//! tanglechat chat send <public-key-address> "Hello!"
//! tanglechat chat read <public-key-address>
//! tanglechat chat watch <public-key-address> --seconds 60
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tanglechat_core::{
    AcceptContact, AddContact, AddContactRequest, Address, ChatConfig, ChatMessage, ChatSession,
    ConfirmContacts, Contact, ContactRepository, DeclineContact, GetContacts, GetContactsCode,
    Identity, LedgerContactInformationRepository, LedgerStore, LocalProfile,
    PublishContactInformation, ReceiveContactRequests, ResponseCode, SealedBoxCipher, Storage,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Tanglechat - private chat over a public ledger
#[derive(Parser)]
#[command(name = "tanglechat")]
#[command(version)]
#[command(about = "Tanglechat - private chat over a public ledger")]
#[command(
    long_about = "Contact handshake and end-to-end encrypted chat on rotating addresses of an append-only ledger."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Data directory (default: ~/.tanglechat/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Ledger file shared between profiles (default: <data-dir>/ledger.redb)
    #[arg(short, long, global = true)]
    ledger: Option<PathBuf>,

    /// Protocol configuration file (default: <data-dir>/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identity management
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    /// Contact handshake and listing
    Contact {
        #[command(subcommand)]
        action: ContactAction,
    },

    /// Chat with an accepted contact
    Chat {
        #[command(subcommand)]
        action: ChatAction,
    },
}

#[derive(Subcommand)]
enum IdentityAction {
    /// Create the local identity
    Init {
        /// Display name published with the identity
        #[arg(short, long, default_value = "")]
        name: String,
        /// Avatar reference published with the identity
        #[arg(long)]
        image_hash: Option<String>,
        /// Replace an existing identity
        #[arg(long)]
        force: bool,
    },
    /// Show addresses and public key
    Show,
}

#[derive(Subcommand)]
enum ContactAction {
    /// Publish contact information at your public key address
    Publish,
    /// Send a contact request
    Add {
        /// Counterpart's public key address
        request_address: String,
        /// Counterpart's contact (inbox) address
        contact_address: String,
    },
    /// List approved contacts and pending requests
    List,
    /// Read incoming contact requests
    Inbox,
    /// Accept a received contact request
    Accept {
        /// Requester's public key address
        address: String,
    },
    /// Decline a received contact request
    Decline {
        /// Requester's public key address
        address: String,
    },
    /// Pick up acceptances of requests you sent
    Confirm,
}

#[derive(Subcommand)]
enum ChatAction {
    /// Send a message
    Send {
        /// Contact's public key address
        address: String,
        /// Message text
        text: String,
    },
    /// Fetch and print the conversation at the current chat address
    Read {
        /// Contact's public key address
        address: String,
    },
    /// Keep polling and print messages as they arrive
    Watch {
        /// Contact's public key address
        address: String,
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(short, long)]
        seconds: Option<u64>,
    },
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

/// Get the default data directory (~/.tanglechat/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tanglechat")
        .join("data")
}

/// Parse a ledger address argument
fn parse_address(s: &str) -> Result<Address> {
    Address::parse(s.trim()).map_err(|e| anyhow::anyhow!("Invalid address '{}': {}", s, e))
}

/// Print the prompt for a use-case outcome and fail on anything but success
fn report(code: ResponseCode) -> Result<()> {
    println!("{}", code.prompt());
    if code.is_success() {
        Ok(())
    } else {
        anyhow::bail!("{}", code)
    }
}

/// Everything a command needs, opened once per invocation
struct App {
    storage: Arc<Storage>,
    ledger_path: PathBuf,
    config: ChatConfig,
}

impl App {
    fn open(data_dir: &Path, ledger: Option<PathBuf>, config: Option<PathBuf>) -> Result<Self> {
        debug!(data_dir = %data_dir.display(), "Opening profile");
        let storage = Storage::new(data_dir.join("tanglechat.redb"))
            .with_context(|| format!("Failed to open storage in {}", data_dir.display()))?;
        let config_path = config.unwrap_or_else(|| data_dir.join("config.json"));
        let config = ChatConfig::load(&config_path)
            .with_context(|| format!("Failed to load config {}", config_path.display()))?;

        Ok(Self {
            storage: Arc::new(storage),
            ledger_path: ledger.unwrap_or_else(|| data_dir.join("ledger.redb")),
            config,
        })
    }

    fn ledger(&self) -> Result<Arc<LedgerStore>> {
        let ledger = LedgerStore::new(&self.ledger_path)
            .with_context(|| format!("Failed to open ledger {}", self.ledger_path.display()))?;
        Ok(Arc::new(ledger))
    }

    fn identity(&self) -> Result<Arc<Identity>> {
        match self.storage.load_identity()? {
            Some(identity) => Ok(Arc::new(identity)),
            None => anyhow::bail!("No identity yet. Run `tanglechat identity init` first."),
        }
    }

    fn contact(&self, identity: &Identity, address: &Address) -> Result<Contact> {
        self.storage
            .load_by_owner(&identity.public_key_address())?
            .into_iter()
            .find(|c| &c.public_key_address == address)
            .ok_or_else(|| anyhow::anyhow!("No contact with address {}", address))
    }

    fn session(&self, address: &str) -> Result<Arc<ChatSession>> {
        let identity = self.identity()?;
        let contact = self.contact(&identity, &parse_address(address)?)?;
        let session = ChatSession::new(
            identity,
            contact,
            self.ledger()?,
            self.storage.clone(),
            Arc::new(SealedBoxCipher),
            self.config.clone(),
        )?;
        Ok(Arc::new(session))
    }
}

fn print_contact(contact: &Contact) {
    println!("  {} ({})", contact.display_name(), contact.state());
    println!("    Address: {}", contact.public_key_address);
    println!("    Chat: {}", contact.chat_address().short());
    if let Some(since) = chrono::DateTime::from_timestamp(contact.state().since(), 0) {
        println!("    Since: {}", since.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

fn print_message(message: &ChatMessage) {
    let when = message
        .sent_at()
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| message.timestamp.clone());
    println!("[{}] {}: {}", when, message.display_sender(), message.text);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let app = App::open(&data_dir, cli.ledger, cli.config)?;

    match cli.command {
        Commands::Identity { action } => match action {
            IdentityAction::Init {
                name,
                image_hash,
                force,
            } => {
                if app.storage.has_identity()? && !force {
                    anyhow::bail!("An identity already exists. Use --force to replace it.");
                }
                let identity = Identity::generate()?;
                app.storage
                    .save_identity(&identity, &LocalProfile { name, image_hash })?;

                println!("Identity created:");
                println!("  Address: {}", identity.public_key_address());
                println!("  Contact address: {}", identity.contact_address());
                println!();
                println!("Run `tanglechat contact publish` so others can find you.");
            }

            IdentityAction::Show => {
                let identity = app.identity()?;
                let profile = app.storage.load_profile()?;

                println!("Identity:");
                if !profile.name.is_empty() {
                    println!("  Name: {}", profile.name);
                }
                println!("  Address: {}", identity.public_key_address());
                println!("  Contact address: {}", identity.contact_address());
                println!("  Public key: {}", identity.public_key().to_hex());
                println!();
                println!("Data directory: {}", data_dir.display());
            }
        },

        Commands::Contact { action } => match action {
            ContactAction::Publish => {
                let identity = app.identity()?;
                let profile = app.storage.load_profile()?;
                let response = PublishContactInformation::new(identity.clone(), app.ledger()?)
                    .execute(&profile.name, profile.image_hash)
                    .await;
                report(response.code)?;
                println!("  Address: {}", identity.public_key_address());
            }

            ContactAction::Add {
                request_address,
                contact_address,
            } => {
                let identity = app.identity()?;
                let profile = app.storage.load_profile()?;
                let ledger = app.ledger()?;

                let use_case = AddContact::new(
                    identity.clone(),
                    app.storage.clone(),
                    Arc::new(LedgerContactInformationRepository::new(ledger.clone())),
                    ledger,
                    Arc::new(SealedBoxCipher),
                    app.config.clone(),
                );
                let response = use_case
                    .execute(AddContactRequest {
                        contact_address: parse_address(&contact_address)?,
                        request_address: parse_address(&request_address)?,
                        public_key_address: identity.public_key_address(),
                        name: profile.name,
                        image_hash: profile.image_hash,
                    })
                    .await;
                report(response.code)?;
                println!("Contact request sent. Run `tanglechat contact confirm` later.");
            }

            ContactAction::List => {
                let identity = app.identity()?;
                let response =
                    GetContacts::new(app.storage.clone()).execute(&identity.public_key_address());
                if response.code != GetContactsCode::Success {
                    println!("Contacts are unavailable right now.");
                    anyhow::bail!("{:?}", response.code);
                }

                if response.approved_contacts.is_empty()
                    && response.pending_contact_requests.is_empty()
                {
                    println!("No contacts in your list.");
                }
                if !response.approved_contacts.is_empty() {
                    println!("Contacts ({}):", response.approved_contacts.len());
                    for contact in &response.approved_contacts {
                        print_contact(contact);
                    }
                }
                if !response.pending_contact_requests.is_empty() {
                    println!("Pending ({}):", response.pending_contact_requests.len());
                    for contact in &response.pending_contact_requests {
                        print_contact(contact);
                    }
                }
            }

            ContactAction::Inbox => {
                let response = ReceiveContactRequests::new(
                    app.identity()?,
                    app.storage.clone(),
                    app.ledger()?,
                    Arc::new(SealedBoxCipher),
                    app.config.clone(),
                )
                .execute()
                .await;
                report(response.code)?;

                if response.received.is_empty() {
                    println!("No new contact requests.");
                } else {
                    println!("New contact requests ({}):", response.received.len());
                    for contact in &response.received {
                        print_contact(contact);
                    }
                    println!();
                    println!("Accept with `tanglechat contact accept <address>`,");
                    println!("or decline with `tanglechat contact decline <address>`.");
                }
            }

            ContactAction::Accept { address } => {
                let response = AcceptContact::new(
                    app.identity()?,
                    app.storage.clone(),
                    app.ledger()?,
                    Arc::new(SealedBoxCipher),
                    app.config.clone(),
                )
                .execute(&parse_address(&address)?)
                .await;
                report(response.code)?;
            }

            ContactAction::Decline { address } => {
                let response = DeclineContact::new(app.identity()?, app.storage.clone())
                    .execute(&parse_address(&address)?);
                report(response.code)?;
            }

            ContactAction::Confirm => {
                let response = ConfirmContacts::new(
                    app.identity()?,
                    app.storage.clone(),
                    app.ledger()?,
                    Arc::new(SealedBoxCipher),
                    app.config.clone(),
                )
                .execute()
                .await;
                report(response.code)?;

                for contact in &response.accepted {
                    println!("Accepted: {}", contact.display_name());
                }
                for contact in &response.rejected {
                    println!("Rejected: {}", contact.display_name());
                }
                if response.accepted.is_empty() && response.rejected.is_empty() {
                    println!("No answers yet.");
                }
            }
        },

        Commands::Chat { action } => match action {
            ChatAction::Send { address, text } => {
                let session = app.session(&address)?;
                session.send_message(&text).await?;
                println!("Sent.");
            }

            ChatAction::Read { address } => {
                let session = app.session(&address)?;
                session.poll_once().await?;

                let conversation = session.conversation().await;
                if conversation.is_empty() {
                    println!("No messages.");
                }
                for message in conversation.messages() {
                    print_message(message);
                }
            }

            ChatAction::Watch { address, seconds } => {
                let session = app.session(&address)?;
                let token = CancellationToken::new();
                let poller = tokio::spawn(session.clone().run(token.clone()));

                let deadline = async {
                    match seconds {
                        Some(s) => tokio::time::sleep(Duration::from_secs(s)).await,
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::pin!(deadline);

                let mut printed = 0;
                let mut ticker = tokio::time::interval(app.config.poll_interval());
                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        _ = tokio::signal::ctrl_c() => break,
                        _ = ticker.tick() => {
                            let conversation = session.conversation().await;
                            for message in &conversation.messages()[printed..] {
                                print_message(message);
                            }
                            printed = conversation.len();
                        }
                    }
                }

                token.cancel();
                poller.await?;
            }
        },
    }

    Ok(())
}
