use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memoize::api;
use memoize::client::ApiClient;
use memoize::config::{get_config_path, Config};
use memoize::connectivity::{self, Connectivity};
use memoize::db::Database;
use memoize::editor::{EditOutcome, EditTarget};
use memoize::models::{Note, NoteDraft, DEFAULT_COLOR};
use memoize::session::Session;
use memoize::store::LocalStore;

#[derive(Parser)]
#[command(name = "memoize")]
#[command(about = "Offline-first notes with cloud sync")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the reference notes API
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "17010")]
        port: u16,
    },
    /// Show or change the client configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    #[command(flatten)]
    Client(ClientCommands),
}

/// Commands that run against the local session.
#[derive(Debug, Subcommand)]
enum ClientCommands {
    /// Sign in with a username or email
    Login {
        identifier: String,
        #[arg(short, long)]
        password: String,
    },
    /// Create an account and sign in
    Register {
        username: String,
        email: String,
        #[arg(short, long)]
        password: String,
    },
    /// Forget the stored user and token
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Work with notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },
    /// Push the note collection and take the server's copy
    Sync,
    /// Push the whole user document and take the server's copy
    Push,
    /// Set the avatar image URL
    Avatar { url: String },
    /// Ask whether a username is free
    CheckUsername { username: String },
    /// Ask whether an email is free
    CheckEmail { email: String },
    /// Request a password reset email
    ResetPassword { email: String },
    /// Change account details
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Probe the API and push the user document on every reconnect
    Watch,
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration and where it is read from
    Show,
    /// Write one setting to the config file
    Set { key: String, value: String },
}

#[derive(Debug, Subcommand)]
enum NoteCommands {
    /// List live notes, pinned first
    List {
        /// Include soft-deleted notes
        #[arg(long)]
        all: bool,
    },
    /// Create a note
    New {
        #[arg(short, long, default_value = "")]
        title: String,
        #[arg(short, long, default_value = "")]
        content: String,
        #[arg(long, default_value = DEFAULT_COLOR)]
        color: String,
        #[arg(long)]
        pinned: bool,
    },
    /// Edit a note; omitted fields keep their current value
    Edit {
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long)]
        content: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        pinned: Option<bool>,
    },
    /// Soft-delete a note
    Rm { id: String },
}

#[derive(Debug, Subcommand)]
enum AccountCommands {
    Username { username: String },
    Email { email: String },
    Password {
        #[arg(long)]
        current: String,
        #[arg(long)]
        new: String,
    },
    /// Delete the account on the server and sign out
    Delete,
}

/// Logs go to stderr so command output on stdout stays clean.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "memoize=info,tower_http=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = Config::load();

    match cli.command {
        Commands::Serve { port } => serve(port).await,
        Commands::Config { command } => run_config(&config, command),
        Commands::Client(command) => {
            let session = open_session(&config).await?;
            run_client(&session, &config, command).await
        }
    }
}

async fn run_client(
    session: &Session,
    config: &Config,
    command: ClientCommands,
) -> anyhow::Result<()> {
    match command {
        ClientCommands::Login {
            identifier,
            password,
        } => {
            let user = session.login(&identifier, &password).await?;
            println!("Signed in as {} <{}>", user.username, user.email);
        }
        ClientCommands::Register {
            username,
            email,
            password,
        } => {
            let user = session.register(&username, &email, &password).await?;
            println!("Registered {} <{}>", user.username, user.email);
        }
        ClientCommands::Logout => {
            session.logout().await?;
            println!("Signed out");
        }
        ClientCommands::Whoami => match session.user().await {
            Some(user) => {
                println!("{} <{}>", user.username, user.email);
                if let Some(avatar) = user.avatar {
                    println!("avatar: {}", avatar.url);
                }
                println!("{} notes stored locally", user.notes.len());
            }
            None => println!("Not signed in"),
        },
        ClientCommands::Note { command } => run_note(session, command).await?,
        ClientCommands::Sync => println!("Sync {}", session.sync_notes().await),
        ClientCommands::Push => println!("Push {}", session.push_user().await),
        ClientCommands::Avatar { url } => {
            let avatar = session.change_avatar(&url).await?;
            println!("Avatar set to {}", avatar.url);
        }
        ClientCommands::CheckUsername { username } => {
            let answer = session.check_username(&username).await?;
            println!("{}", answer.message);
        }
        ClientCommands::CheckEmail { email } => {
            let answer = session.check_email(&email).await?;
            println!("{}", answer.message);
        }
        ClientCommands::ResetPassword { email } => {
            println!("{}", session.send_reset_password(&email).await?);
        }
        ClientCommands::Account { command } => run_account(session, command).await?,
        ClientCommands::Watch => watch(session, config).await?,
    }

    Ok(())
}

async fn serve(port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting memoize API on port {}", port);

    let app = api::create_router(api::Backend::new());
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("memoize API listening on http://127.0.0.1:{}/api", port);

    axum::serve(listener, app).await?;
    Ok(())
}

fn run_config(config: &Config, command: ConfigCommands) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Show => {
            println!("# {}", get_config_path()?.display());
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigCommands::Set { key, value } => {
            // Start from the file so environment overrides are not persisted.
            let mut stored = Config::try_load()?;
            stored.set(&key, &value)?;
            stored.save()?;
            println!("Set {} = {}", key, value);
        }
    }
    Ok(())
}

async fn open_session(config: &Config) -> anyhow::Result<Session> {
    let db = Database::open(config.database_path()?)?;
    db.migrate()?;

    let client = ApiClient::from_config(config)?;
    let connectivity = Connectivity::new(client.probe().await);
    Ok(Session::restore(LocalStore::new(db), client, connectivity))
}

async fn run_note(session: &Session, command: NoteCommands) -> anyhow::Result<()> {
    match command {
        NoteCommands::List { all } => {
            if all {
                for note in session.notes().await {
                    print_note(&note);
                }
            } else {
                let listing = session.listing().await;
                if listing.is_empty() {
                    println!("No notes");
                }
                for note in listing.pinned.iter().chain(listing.others.iter()) {
                    print_note(note);
                }
            }
        }
        NoteCommands::New {
            title,
            content,
            color,
            pinned,
        } => {
            let draft = NoteDraft::new(title, content)
                .with_color(color)
                .pinned(pinned);
            let outcome = session.save_note(&EditTarget::New, &draft).await?;
            report(&outcome);
        }
        NoteCommands::Edit {
            id,
            title,
            content,
            color,
            pinned,
        } => {
            let Some(current) = session.note(&id).await else {
                anyhow::bail!("No note with id {}", id);
            };
            let mut draft = NoteDraft::from_note(&current);
            if let Some(title) = title {
                draft.title = title;
            }
            if let Some(content) = content {
                draft.content = content;
            }
            if let Some(color) = color {
                draft.color = color;
            }
            if let Some(pinned) = pinned {
                draft.pinned = pinned;
            }
            let outcome = session.save_note(&EditTarget::parse(&id), &draft).await?;
            report(&outcome);
        }
        NoteCommands::Rm { id } => {
            let outcome = session.delete_note(&id).await?;
            report(&outcome);
        }
    }
    Ok(())
}

async fn run_account(session: &Session, command: AccountCommands) -> anyhow::Result<()> {
    match command {
        AccountCommands::Username { username } => {
            let user = session.update_username(&username).await?;
            println!("Username is now {}", user.username);
        }
        AccountCommands::Email { email } => {
            let user = session.update_email(&email).await?;
            println!("Email is now {}", user.email);
        }
        AccountCommands::Password { current, new } => {
            println!("{}", session.update_password(&current, &new).await?);
        }
        AccountCommands::Delete => {
            println!("{}", session.delete_account().await?);
        }
    }
    Ok(())
}

async fn watch(session: &Session, config: &Config) -> anyhow::Result<()> {
    let probe = connectivity::spawn_probe(
        session.connectivity().clone(),
        session.client().clone(),
        config.probe_interval(),
    );
    let reconnect = connectivity::spawn_reconnect_sync(session.clone());
    tracing::info!(
        "Watching {} every {:?}",
        session.client().base_url(),
        config.probe_interval()
    );

    tokio::signal::ctrl_c().await?;
    probe.abort();
    reconnect.abort();
    Ok(())
}

fn print_note(note: &Note) {
    let mut flags = String::new();
    if note.pinned() {
        flags.push('*');
    }
    if note.is_deleted() {
        flags.push_str(" (deleted)");
    }
    println!("{} {}{}", note.id(), note.title(), flags);
    if !note.content().is_empty() {
        println!("    {}", note.content().replace('\n', "\n    "));
    }
}

fn report(outcome: &EditOutcome) {
    match outcome {
        EditOutcome::Created(note) => println!("Created {}", note.id()),
        EditOutcome::Updated(note) => println!("Updated {}", note.id()),
        EditOutcome::SoftDeleted(note) => println!("Deleted {}", note.id()),
        EditOutcome::Discarded => println!("Empty note discarded"),
        EditOutcome::Unchanged => println!("No changes"),
        EditOutcome::Missing => println!("Note not found"),
    }
}
