//! chain-did CLI: the `cdid` command.
//!
//! Creates primitive DIDs, edits and deactivates them, and declares,
//! resolves and revokes credentials against a file-backed simulated ledger.

mod store;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use chain_did::backend::DocumentStatus;
use chain_did::time;
use chain_did::{
    Backend, Did, DidUrl, Document, DocumentBuilder, Ed25519KeyPair, InMemoryLedger, Issuer,
    KeyRing,
};

use store::{Identity, Store};

// ── Directory helpers ─────────────────────────────────────────────────────────

fn default_home() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os("CDID_HOME") {
        return Ok(PathBuf::from(home));
    }
    let home = std::env::var_os("HOME").ok_or_else(|| anyhow!("HOME not set, use --home"))?;
    Ok(PathBuf::from(home).join(".chain-did"))
}

// ── Parsing helpers ───────────────────────────────────────────────────────────

/// Accept `name` or `#name` for entries of the caller's own document.
fn fragment(id: &str) -> String {
    if id.starts_with('#') || id.starts_with("did:") {
        id.to_string()
    } else {
        format!("#{id}")
    }
}

/// Parse `key=value`; values that are valid JSON keep their JSON type.
fn parse_property(pair: &str) -> Result<(String, Value)> {
    let (name, raw) = pair
        .split_once('=')
        .ok_or_else(|| anyhow!("property '{pair}' must look like name=value"))?;
    if name.is_empty() {
        return Err(anyhow!("property '{pair}' has an empty name"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

// ── CLI structure ─────────────────────────────────────────────────────────────

/// chain-did CLI: manage decentralized identifiers and credentials.
#[derive(Parser, Debug)]
#[command(
    name = "cdid",
    about = "chain-did CLI",
    version,
    long_about = "cdid: chain-did CLI\n\nCreate and publish DID documents, manage services,\nand declare or revoke verifiable credentials on a local ledger."
)]
struct Cli {
    /// State directory (default: $CDID_HOME, then ~/.chain-did)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a key and publish a new primitive DID
    Init {
        /// Local name for the identity
        #[arg(long)]
        name: String,
    },

    /// Display a local identity and its published document
    Show {
        /// Identity name
        name: String,
    },

    /// List local identities
    List,

    /// Resolve any DID from the ledger
    Resolve {
        /// The DID to resolve
        did: String,

        /// Bypass the resolve cache
        #[arg(long)]
        force: bool,

        /// Print every transaction instead of the document
        #[arg(long)]
        history: bool,
    },

    /// Manage service endpoints
    Service {
        #[command(subcommand)]
        subcommand: ServiceCommands,
    },

    /// Deactivate a DID permanently
    Deactivate {
        /// Identity name
        #[arg(long)]
        name: String,
    },

    /// Declare, resolve and revoke credentials
    Credential {
        #[command(subcommand)]
        subcommand: CredentialCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ServiceCommands {
    /// Add a service and publish the update
    Add {
        #[arg(long)]
        name: String,

        /// Service id, e.g. `vault` or `#vault`
        #[arg(long)]
        id: String,

        #[arg(long = "type")]
        service_type: String,

        #[arg(long)]
        endpoint: String,
    },

    /// Remove a service and publish the update
    Remove {
        #[arg(long)]
        name: String,

        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum CredentialCommands {
    /// Issue a self-proclaimed credential and declare it
    Declare {
        #[arg(long)]
        name: String,

        /// Credential id fragment
        #[arg(long)]
        id: String,

        /// Additional credential types
        #[arg(long = "type")]
        types: Vec<String>,

        /// Subject properties as name=value (repeatable)
        #[arg(long = "property")]
        properties: Vec<String>,
    },

    /// Resolve a declared credential
    Resolve {
        /// Fully qualified credential id
        id: String,

        /// Also honour revocations by this issuer
        #[arg(long)]
        issuer: Option<String>,

        #[arg(long)]
        force: bool,
    },

    /// Revoke a credential as its owner or issuer
    Revoke {
        #[arg(long)]
        name: String,

        #[arg(long)]
        id: String,
    },

    /// List credentials declared by a DID
    List {
        did: String,

        #[arg(long)]
        skip: Option<usize>,

        #[arg(long)]
        limit: Option<usize>,
    },
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Store, ledger and backend for a single command.
struct Session {
    store: Store,
    ledger: Arc<InMemoryLedger>,
    backend: Backend,
}

impl Session {
    fn open(home: PathBuf) -> Result<Self> {
        let store = Store::open(home)?;
        let ledger = Arc::new(store.load_ledger()?);
        let backend = Backend::new(ledger.clone());
        Ok(Self {
            store,
            ledger,
            backend,
        })
    }

    /// Persist the ledger after a successful publish.
    fn commit(&self) -> Result<()> {
        self.store.save_ledger(&self.ledger)
    }

    /// The latest published document of `identity`.
    fn current(&self, identity: &Identity) -> Result<Document> {
        let document = self
            .backend
            .resolve_did(&identity.did, true)
            .with_context(|| format!("failed to resolve {}", identity.did))?
            .ok_or_else(|| anyhow!("{} is not published", identity.did))?;
        if document.is_deactivated() {
            return Err(anyhow!("{} is deactivated", identity.did));
        }
        Ok(document)
    }

    fn publish(&self, document: &Document, keys: &KeyRing) -> Result<()> {
        self.backend
            .publish_document(document, None, keys)
            .with_context(|| format!("failed to publish {}", document.subject()))?;
        self.commit()
    }
}

// ── Main entry point ──────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let verbose = cli.verbose;
    let home = match cli.home {
        Some(home) => home,
        None => default_home()?,
    };
    log::debug!("state directory {}", home.display());
    let session = Session::open(home)?;

    match cli.command {
        Commands::Init { name } => cmd_init(&session, &name, verbose),
        Commands::Show { name } => cmd_show(&session, &name, verbose),
        Commands::List => cmd_list(&session),
        Commands::Resolve {
            did,
            force,
            history,
        } => cmd_resolve(&session, &did, force, history),
        Commands::Service { subcommand } => match subcommand {
            ServiceCommands::Add {
                name,
                id,
                service_type,
                endpoint,
            } => cmd_service_add(&session, &name, &id, &service_type, &endpoint),
            ServiceCommands::Remove { name, id } => cmd_service_remove(&session, &name, &id),
        },
        Commands::Deactivate { name } => cmd_deactivate(&session, &name),
        Commands::Credential { subcommand } => match subcommand {
            CredentialCommands::Declare {
                name,
                id,
                types,
                properties,
            } => cmd_credential_declare(&session, &name, &id, &types, &properties, verbose),
            CredentialCommands::Resolve { id, issuer, force } => {
                cmd_credential_resolve(&session, &id, issuer.as_deref(), force)
            }
            CredentialCommands::Revoke { name, id } => cmd_credential_revoke(&session, &name, &id),
            CredentialCommands::List { did, skip, limit } => {
                cmd_credential_list(&session, &did, skip, limit)
            }
        },
    }
}

// ── Command implementations ───────────────────────────────────────────────────

/// `cdid init --name NAME`
fn cmd_init(session: &Session, name: &str, verbose: bool) -> Result<()> {
    if session.store.has_identity(name)? {
        return Err(anyhow!("identity '{name}' already exists"));
    }

    let key = Ed25519KeyPair::generate();
    let builder = DocumentBuilder::primitive(&key.public_key_base58())?;
    let key_id = builder
        .default_key_id()
        .ok_or_else(|| anyhow!("primitive document without a default key"))?;
    let mut keys = KeyRing::new();
    keys.insert(key_id.clone(), key.clone());
    let document = builder.seal(&keys).context("failed to seal document")?;

    session.publish(&document, &keys)?;
    session
        .store
        .save_identity(name, document.subject(), &key_id, &key)
        .context("failed to save identity")?;

    println!("Created identity '{name}'");
    println!("  DID:     {}", document.subject());
    println!("  Key:     {key_id}");
    println!("  Expires: {}", time::format(&document.expires()));
    if verbose {
        println!("{}", document.to_json(false)?);
    }
    Ok(())
}

/// `cdid show NAME`
fn cmd_show(session: &Session, name: &str, verbose: bool) -> Result<()> {
    let identity = session.store.load_identity(name)?;
    println!("Identity: {}", identity.name);
    println!("  DID:  {}", identity.did);
    println!("  Key:  {}", identity.key_id);

    let Some(document) = session.backend.resolve_did(&identity.did, true)? else {
        println!("  Status: not published");
        return Ok(());
    };
    let status = if document.is_deactivated() {
        "deactivated"
    } else if document.is_expired() {
        "expired"
    } else {
        "valid"
    };
    println!("  Status:  {status}");
    println!("  Expires: {}", time::format(&document.expires()));
    if let Some(txid) = document.metadata().transaction_id() {
        println!("  Txid:    {txid}");
    }
    if let Some(published) = document.metadata().published() {
        println!("  Published: {}", time::format(&published));
    }
    if !document.services().is_empty() {
        println!("  Services:");
        for service in document.services() {
            println!(
                "    {} ({}) -> {}",
                service.id(),
                service.service_type(),
                service.endpoint()
            );
        }
    }
    if verbose {
        println!("{}", document.to_json(false)?);
    }
    Ok(())
}

/// `cdid list`
fn cmd_list(session: &Session) -> Result<()> {
    let names = session.store.list_identities()?;
    if names.is_empty() {
        println!("No identities in {}", session.store.home().display());
        return Ok(());
    }
    for name in names {
        let identity = session.store.load_identity(&name)?;
        println!("{name}  {}", identity.did);
    }
    Ok(())
}

/// `cdid resolve DID [--force] [--history]`
fn cmd_resolve(session: &Session, did: &str, force: bool, history: bool) -> Result<()> {
    let did: Did = did.parse()?;
    if history {
        let bio = session.backend.resolve_did_biography(&did, true, force)?;
        let status = match bio.status() {
            DocumentStatus::Valid => "valid",
            DocumentStatus::Deactivated => "deactivated",
            DocumentStatus::NotFound => "not found",
        };
        println!("{did}: {status}");
        for tx in bio.transactions() {
            println!(
                "  {}  {:<10}  {}",
                time::format(&tx.timestamp),
                tx.request.operation(),
                tx.txid
            );
        }
        return Ok(());
    }

    match session.backend.resolve_did(&did, force)? {
        Some(document) => {
            println!("{}", document.to_json(false)?);
            if document.is_deactivated() {
                eprintln!("note: {did} is deactivated");
            }
        }
        None => println!("{did}: not found"),
    }
    Ok(())
}

/// `cdid service add --name NAME --id ID --type TYPE --endpoint URL`
fn cmd_service_add(
    session: &Session,
    name: &str,
    id: &str,
    service_type: &str,
    endpoint: &str,
) -> Result<()> {
    let identity = session.store.load_identity(name)?;
    let keys = identity.keys();
    let current = session.current(&identity)?;

    let mut builder = DocumentBuilder::edit(&current);
    builder.add_service(&fragment(id), service_type, endpoint, None)?;
    let document = builder.seal(&keys)?;
    session.publish(&document, &keys)?;

    println!("Added service {} to {}", fragment(id), identity.did);
    Ok(())
}

/// `cdid service remove --name NAME --id ID`
fn cmd_service_remove(session: &Session, name: &str, id: &str) -> Result<()> {
    let identity = session.store.load_identity(name)?;
    let keys = identity.keys();
    let current = session.current(&identity)?;

    let mut builder = DocumentBuilder::edit(&current);
    builder.remove_service(&fragment(id))?;
    let document = builder.seal(&keys)?;
    session.publish(&document, &keys)?;

    println!("Removed service {} from {}", fragment(id), identity.did);
    Ok(())
}

/// `cdid deactivate --name NAME`
fn cmd_deactivate(session: &Session, name: &str) -> Result<()> {
    let identity = session.store.load_identity(name)?;
    let keys = identity.keys();
    let current = session.current(&identity)?;

    session
        .backend
        .deactivate_did(&current, &identity.key_id, &keys)
        .with_context(|| format!("failed to deactivate {}", identity.did))?;
    session.commit()?;

    println!("Deactivated {}", identity.did);
    Ok(())
}

/// `cdid credential declare --name NAME --id ID [--type T]... [--property K=V]...`
fn cmd_credential_declare(
    session: &Session,
    name: &str,
    id: &str,
    types: &[String],
    properties: &[String],
    verbose: bool,
) -> Result<()> {
    let identity = session.store.load_identity(name)?;
    let keys = identity.keys();
    let current = session.current(&identity)?;

    let properties = properties
        .iter()
        .map(|pair| parse_property(pair))
        .collect::<Result<BTreeMap<_, _>>>()?;
    let issuer = Issuer::new(current.clone(), Some(identity.key_id.clone()))?;
    let mut builder = issuer
        .issue_for(&identity.did)
        .id(&fragment(id))
        .properties(properties);
    for credential_type in types {
        builder = builder.credential_type(credential_type);
    }
    let credential = builder.seal(&keys).context("failed to issue credential")?;

    session
        .backend
        .declare_credential(&credential, &current, &identity.key_id, &keys)
        .with_context(|| format!("failed to declare {}", credential.id()))?;
    session.commit()?;

    println!("Declared {}", credential.id());
    if verbose {
        println!("{}", credential.to_json(false)?);
    }
    Ok(())
}

/// `cdid credential resolve ID [--issuer DID] [--force]`
fn cmd_credential_resolve(
    session: &Session,
    id: &str,
    issuer: Option<&str>,
    force: bool,
) -> Result<()> {
    let id: DidUrl = id.parse()?;
    if !id.is_qualified() {
        return Err(anyhow!("credential id {id} must include its DID"));
    }
    let issuer = issuer.map(str::parse::<Did>).transpose()?;

    match session.backend.resolve_credential(&id, issuer.as_ref(), force)? {
        Some(credential) => {
            println!("{}", credential.to_json(false)?);
            if credential.is_revoked() {
                eprintln!("note: {id} is revoked");
            }
        }
        None => println!("{id}: not found"),
    }
    Ok(())
}

/// `cdid credential revoke --name NAME --id ID`
fn cmd_credential_revoke(session: &Session, name: &str, id: &str) -> Result<()> {
    let identity = session.store.load_identity(name)?;
    let keys = identity.keys();
    let current = session.current(&identity)?;
    let id = DidUrl::parse_with_base(&identity.did, &fragment(id))?;

    session
        .backend
        .revoke_credential(&id, &current, &identity.key_id, &keys)
        .with_context(|| format!("failed to revoke {id}"))?;
    session.commit()?;

    println!("Revoked {id}");
    Ok(())
}

/// `cdid credential list DID [--skip N] [--limit N]`
fn cmd_credential_list(
    session: &Session,
    did: &str,
    skip: Option<usize>,
    limit: Option<usize>,
) -> Result<()> {
    let did: Did = did.parse()?;
    let ids = session.backend.list_credentials(&did, skip, limit)?;
    if ids.is_empty() {
        println!("{did} has no declared credentials");
    }
    for id in ids {
        println!("{id}");
    }
    Ok(())
}
