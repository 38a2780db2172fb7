use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

mod display;
mod saved_login;
mod utils;

use gigconnect::config::{self, Config};
use gigconnect::messaging::{Backend, MessagingClient, MockBackend, Session, SessionUpdate};
use gigconnect::models::{ConversationId, Role, UserContext, UserId};

/// Command line arguments for GigConnect messaging
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "GigConnect: chat with freelancers and clients from the terminal."
)]
struct Args {
    /// Directory holding config.json, the saved login and (by default) the log file
    #[arg(long, value_name = "PATH")]
    config_dir: Option<PathBuf>,

    /// Log file path (default: gigconnect.log)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct BackendArgs {
    /// Talk to the configured API and socket server
    #[arg(long, conflicts_with = "mock")]
    live: bool,

    /// Use the built-in offline backend
    #[arg(long)]
    mock: bool,
}

impl BackendArgs {
    fn use_mock(&self, config: &Config) -> bool {
        if self.live {
            false
        } else if self.mock {
            true
        } else {
            config.use_mock()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open the interactive chat
    Chat(BackendArgs),
    /// Remember the signed-in user
    Login {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "client")]
        role: Role,
        #[arg(long)]
        token: String,
    },
    /// Forget the saved login
    Logout,
    /// Print the conversation list and exit
    Conversations(BackendArgs),
}

enum LineAction {
    Continue,
    Quit,
}

const HELP: &str = "Commands: /list, /open <n|id>, /refresh, /quit. Anything else is sent to the open conversation.";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_file_path = match (&args.log_file, &args.config_dir) {
        (Some(path), _) => path.clone(),
        (None, Some(dir)) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("Warning: Failed to create {}: {}", dir.display(), e);
            }
            dir.join("gigconnect.log")
        }
        (None, None) => PathBuf::from("gigconnect.log"),
    };
    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    utils::setup_logging(log_file_path.to_str(), level)?;
    info!("Logging to file: {}", log_file_path.display());

    if let Some(dir) = &args.config_dir {
        config::set_config_dir_override(dir.clone())?;
        info!("Config directory overridden to: {}", dir.display());
    }

    let config = Config::load()?;

    match args.command {
        Command::Login { id, name, role, token } => {
            let user = UserContext {
                id: UserId::from(id),
                name,
                role,
                token,
            };
            saved_login::save_login(&user)?;
            println!("Signed in as {} ({}).", user.name, user.role);
        }
        Command::Logout => {
            if saved_login::remove_login()? {
                println!("Signed out.");
            } else {
                println!("Not signed in.");
            }
        }
        Command::Conversations(backend) => {
            let user = require_user()?;
            let mut client = start_client(&config, backend.use_mock(&config), user).await?;
            if let Some(session) = client.session() {
                print_lines(display::conversation_list(session, Utc::now()));
                print_notifications_of(session);
            }
            client.shutdown().await;
        }
        Command::Chat(backend) => {
            let user = require_user()?;
            let mut client = start_client(&config, backend.use_mock(&config), user).await?;
            let result = run_chat(&mut client).await;
            client.shutdown().await;
            if let Err(e) = &result {
                error!("Chat ended with error: {}", e);
            }
            result?;
            println!("Chat session ended.");
        }
    }
    Ok(())
}

fn require_user() -> Result<UserContext> {
    saved_login::current_user()?.ok_or_else(|| {
        anyhow!("Please login to access messages: gigconnect login --id <ID> --name <NAME> --token <TOKEN>")
    })
}

async fn start_client(config: &Config, use_mock: bool, user: UserContext) -> Result<MessagingClient> {
    let backend: Box<dyn Backend> = if use_mock {
        info!("Using offline backend");
        println!("Offline mode: using built-in demo data.");
        Box::new(MockBackend::new(config.mock_delay()))
    } else {
        println!("Connecting to {} ... please wait", config.socket_url);
        Box::new(config.live_backend())
    };

    let mut client = MessagingClient::new(backend, config.session_config());
    client.set_user(Some(user)).await?;
    Ok(client)
}

async fn run_chat(client: &mut MessagingClient) -> Result<()> {
    let session = client
        .session_mut()
        .ok_or_else(|| anyhow!("Messaging session did not start"))?;

    print_lines(display::conversation_list(session, Utc::now()));
    print_notifications(session);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if let LineAction::Quit = handle_line(session, line.trim()) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            update = session.next_update() => {
                match update {
                    Some(update) => render_update(session, &update),
                    None => break,
                }
            }
        }
    }
    Ok(())
}

fn handle_line(session: &mut Session, line: &str) -> LineAction {
    if line.is_empty() {
        return LineAction::Continue;
    }

    let (command, argument) = match line.split_once(char::is_whitespace) {
        Some((command, argument)) => (command, argument.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" | "/exit" => return LineAction::Quit,
        "/list" => print_lines(display::conversation_list(session, Utc::now())),
        "/refresh" => {
            session.refresh_conversations();
            session.reload_history();
            println!("Refreshing...");
        }
        "/open" => match resolve_conversation(session, argument) {
            Some(conversation_id) => {
                session.select(&conversation_id);
                print_lines(display::history_view(session, Utc::now()));
            }
            None => println!("No such conversation: '{}'", argument),
        },
        "/help" => println!("{}", HELP),
        other if other.starts_with('/') => println!("Unknown command {}. {}", other, HELP),
        _ => {
            if session.active_conversation().is_none() {
                println!("Select a conversation first (/open <n>)");
                return LineAction::Continue;
            }
            session.set_input(line);
            session.keystroke();
            if session.send().is_some() {
                print_lines(display::history_view(session, Utc::now()));
            }
        }
    }
    LineAction::Continue
}

/// `/open` accepts the 1-based list position or a conversation id.
fn resolve_conversation(session: &Session, argument: &str) -> Option<ConversationId> {
    let conversations = session.conversations();
    if let Ok(position) = argument.parse::<usize>() {
        if position >= 1 && position <= conversations.len() {
            return Some(conversations[position - 1].id.clone());
        }
    }
    conversations
        .iter()
        .find(|c| c.id.as_str() == argument)
        .map(|c| c.id.clone())
}

fn render_update(session: &mut Session, update: &SessionUpdate) {
    let now = Utc::now();
    match update {
        SessionUpdate::Unchanged => {}
        SessionUpdate::ConversationsChanged => print_lines(display::conversation_list(session, now)),
        SessionUpdate::HistoryLoaded(_) | SessionUpdate::MessageConfirmed { .. } => {
            print_lines(display::history_view(session, now))
        }
        SessionUpdate::MessageReceived { in_history: true, .. } => print_lines(display::history_view(session, now)),
        SessionUpdate::MessageReceived { conversation_id, .. } => {
            if let Some(conversation) = session.conversations().iter().find(|c| &c.id == conversation_id) {
                println!("* New message from {}", conversation.other_user.name);
            }
        }
        SessionUpdate::SendFailed { .. } => {
            print_lines(display::history_view(session, now));
            if !session.input().is_empty() {
                println!("Message not sent. Your text: {}", session.input());
            }
        }
        SessionUpdate::TypingChanged(true) => {
            if let Some(conversation) = session.active_conversation() {
                println!("{} is typing...", conversation.other_user.name);
            }
        }
        SessionUpdate::TypingChanged(false) => {}
        SessionUpdate::PresenceChanged(user_id) => {
            if let Some(conversation) = session.conversations().iter().find(|c| &c.other_user.id == user_id) {
                let status = if session.is_online(user_id) { "online" } else { "offline" };
                println!("* {} is {}", conversation.other_user.name, status);
            }
        }
        SessionUpdate::ConnectionChanged(true) => println!("* Connected"),
        SessionUpdate::ConnectionChanged(false) => println!("* Disconnected, live updates paused"),
    }
    print_notifications(session);
}

fn print_notifications(session: &mut Session) {
    for notification in session.notifications_mut().drain() {
        println!("! {}", notification.message);
    }
}

fn print_notifications_of(session: &Session) {
    if let Some(notification) = session.notifications().current(tokio::time::Instant::now()) {
        println!("! {}", notification.message);
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}
