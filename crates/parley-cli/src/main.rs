//! Parley CLI - Command line interface for the Parley server.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use parley_client::{
    ChatVisibility, DataStream, HttpClient, Identity, PartStream, ResumeCoordinator,
    UpdatePhase,
};
use parley_core::{
    ArtifactKind, Chat, ChatId, DocumentId, Message, MessageId, PostRequestBody, RawMessage,
    StreamPart, UserId, UserType, Visibility,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Parley CLI - chats, documents and history
#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "CLI for the Parley server", long_about = None)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "http://[::1]:3000")]
    addr: String,

    /// Act as this user id
    #[arg(long)]
    user: Option<UserId>,

    /// User type sent with --user
    #[arg(long, default_value = "regular")]
    user_type: UserType,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health
    Health,

    /// Create a guest identity and print it
    Guest,

    /// List chats, most recent first
    History {
        #[arg(short, long)]
        limit: Option<usize>,

        /// Page after this chat id
        #[arg(long, conflicts_with = "before")]
        after: Option<ChatId>,

        /// Page before this chat id
        #[arg(long)]
        before: Option<ChatId>,
    },

    /// Delete every chat of the current user
    #[command(name = "clear-history")]
    ClearHistory,

    /// Work with versioned documents
    #[command(subcommand)]
    Document(DocumentCommand),

    /// Send a message and stream the reply
    Chat {
        message: String,

        /// Continue an existing chat
        #[arg(long)]
        chat: Option<ChatId>,

        #[arg(long, default_value = "chat-model")]
        model: String,

        #[arg(long, value_enum, default_value = "private")]
        visibility: VisibilityArg,
    },

    /// Re-attach to a chat whose last message is from the user
    Resume { chat: ChatId },

    /// Print the messages of a chat
    Messages { chat: ChatId },

    /// Change who can read a chat
    Visibility {
        chat: ChatId,

        #[arg(value_enum)]
        visibility: VisibilityArg,
    },

    /// Delete a chat
    #[command(name = "delete-chat")]
    DeleteChat { chat: ChatId },

    /// Delete a message and everything after it
    #[command(name = "delete-trailing")]
    DeleteTrailing { message: MessageId },
}

#[derive(Subcommand)]
enum DocumentCommand {
    /// Print every version of a document
    Get { id: String },

    /// Save a new version
    Save {
        id: String,

        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        content: String,

        #[arg(short, long, default_value = "text")]
        kind: ArtifactKind,
    },

    /// Delete versions created after a timestamp (RFC 3339)
    Undo { id: String, after: DateTime<Utc> },
}

#[derive(Clone, Copy, ValueEnum)]
enum VisibilityArg {
    Public,
    Private,
}

impl From<VisibilityArg> for Visibility {
    fn from(arg: VisibilityArg) -> Self {
        match arg {
            VisibilityArg::Public => Visibility::Public,
            VisibilityArg::Private => Visibility::Private,
        }
    }
}

#[tokio::main]
async fn main() -> CliResult {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut client = HttpClient::new(&cli.addr);
    if let Some(user_id) = cli.user {
        client = client.with_identity(Identity {
            user_id,
            user_type: cli.user_type,
        });
    }

    match cli.command {
        Commands::Health => health(&client).await?,
        Commands::Guest => guest(&client).await?,
        Commands::History {
            limit,
            after,
            before,
        } => history(&client, limit, after, before).await?,
        Commands::ClearHistory => {
            let deleted = client.delete_history().await?;
            println!("Deleted {} chats", deleted);
        }
        Commands::Document(command) => document(&client, command).await?,
        Commands::Chat {
            message,
            chat,
            model,
            visibility,
        } => send_chat(&client, message, chat, model, visibility.into()).await?,
        Commands::Resume { chat } => resume(&client, chat).await?,
        Commands::Messages { chat } => {
            for message in client.messages(&chat).await? {
                print_message(&message);
            }
        }
        Commands::Visibility { chat, visibility } => {
            set_visibility(&client, chat, visibility.into()).await?
        }
        Commands::DeleteChat { chat } => {
            let chat = client.delete_chat(&chat).await?;
            println!("Chat deleted:");
            print_chat(&chat);
        }
        Commands::DeleteTrailing { message } => {
            let deleted = client.delete_trailing_messages(&message).await?;
            println!("Deleted {} messages", deleted);
        }
    }

    Ok(())
}

async fn health(client: &HttpClient) -> CliResult {
    if client.health().await? {
        println!("ok");
        Ok(())
    } else {
        Err("server is unhealthy".into())
    }
}

async fn guest(client: &HttpClient) -> CliResult {
    let (_, identity) = client.sign_in_guest().await?;
    println!("Guest created:");
    println!("  User:  {}", identity.user_id);
    println!("  Type:  {}", identity.user_type);
    println!();
    println!("Use it with: --user {} --user-type guest", identity.user_id);
    Ok(())
}

async fn history(
    client: &HttpClient,
    limit: Option<usize>,
    after: Option<ChatId>,
    before: Option<ChatId>,
) -> CliResult {
    let page = client.history(limit, after, before).await?;

    println!("Chats ({}):", page.chats.len());
    println!("{:<36}  {:<8}  {:<19}  {}", "ID", "VISIBLE", "UPDATED", "TITLE");
    println!("{}", "-".repeat(80));

    for chat in &page.chats {
        println!(
            "{:<36}  {:<8}  {:<19}  {}",
            chat.id.to_string(),
            visibility_name(chat.visibility),
            format_timestamp(chat.updated_at),
            chat.title
        );
    }

    if page.has_more {
        if let Some(last) = page.chats.last() {
            println!();
            println!("More available: --after {}", last.id);
        }
    }

    Ok(())
}

async fn document(client: &HttpClient, command: DocumentCommand) -> CliResult {
    match command {
        DocumentCommand::Get { id } => {
            let versions = client.document_versions(&DocumentId::new(id)).await?;
            println!("Versions ({}):", versions.len());
            println!("{:<3}  {:<30}  {:<6}  {}", "#", "CREATED", "KIND", "TITLE");
            println!("{}", "-".repeat(80));
            for (i, version) in versions.iter().enumerate() {
                println!(
                    "{:<3}  {:<30}  {:<6}  {}",
                    i + 1,
                    version.created_at.to_rfc3339(),
                    version.kind.as_str(),
                    version.title
                );
            }
        }
        DocumentCommand::Save {
            id,
            title,
            content,
            kind,
        } => {
            let document = client
                .save_document(&DocumentId::new(id), &title, &content, kind)
                .await?;
            let current = document.current();
            println!("Saved version {} of {}", document.versions.len(), document.id);
            println!("  Created:    {}", current.created_at.to_rfc3339());
        }
        DocumentCommand::Undo { id, after } => {
            let deleted = client.rollback_document(&DocumentId::new(id), after).await?;
            println!("Deleted {} versions", deleted);
        }
    }
    Ok(())
}

async fn send_chat(
    client: &HttpClient,
    text: String,
    chat: Option<ChatId>,
    model: String,
    visibility: Visibility,
) -> CliResult {
    let chat_id = chat.unwrap_or_else(ChatId::generate);
    let body = PostRequestBody {
        id: chat_id.to_string(),
        message: Some(RawMessage {
            id: MessageId::generate().to_string(),
            role: "user".to_string(),
            parts: vec![json!({ "type": "text", "text": text })],
        }),
        messages: None,
        selected_chat_model: model,
        selected_visibility_type: visibility,
    };

    eprintln!("chat {}", chat_id);
    let parts = client.send_chat(&body).await?;
    print_parts(parts).await
}

async fn resume(client: &HttpClient, chat_id: ChatId) -> CliResult {
    let initial = client.messages(&chat_id).await?;
    let data = Arc::new(DataStream::new());
    let coordinator = ResumeCoordinator::new(
        chat_id,
        initial.clone(),
        true,
        Arc::new(client.clone()),
        data.clone(),
    );

    if !coordinator.should_resume() {
        println!("Nothing to resume: the last message is not from the user");
        return Ok(());
    }

    coordinator.mount();
    tokio::select! {
        _ = coordinator.finished() => {}
        _ = tokio::signal::ctrl_c() => coordinator.unmount(),
    }

    let messages = coordinator.messages();
    if messages.len() > initial.len() {
        for message in &messages[initial.len()..] {
            print_message(message);
        }
    } else {
        println!("Received {} parts, no complete message", data.len());
    }
    Ok(())
}

async fn set_visibility(client: &HttpClient, chat_id: ChatId, requested: Visibility) -> CliResult {
    let current = client.chat(&chat_id).await?.visibility;
    let state = ChatVisibility::new(chat_id, current);
    let update = state.update(client, requested).await;
    match update.phase {
        UpdatePhase::Reverted { reason } => {
            let previous = visibility_name(update.previous);
            Err(format!("visibility reverted to {}: {}", previous, reason).into())
        }
        _ => {
            println!("Chat {} is now {}", chat_id, visibility_name(state.current()));
            Ok(())
        }
    }
}

async fn print_parts(mut parts: PartStream) -> CliResult {
    while let Some(part) = parts.next().await {
        match part? {
            StreamPart::TextDelta { delta, .. } => {
                print!("{}", delta);
                std::io::stdout().flush().ok();
            }
            StreamPart::TextEnd { .. } => println!(),
            StreamPart::Error { error_text } => return Err(error_text.into()),
            _ => {}
        }
    }
    Ok(())
}

fn print_chat(chat: &Chat) {
    println!("  ID:         {}", chat.id);
    println!("  Title:      {}", chat.title);
    println!("  Visibility: {}", visibility_name(chat.visibility));
    println!("  Created:    {}", format_timestamp(chat.created_at));
    println!("  Updated:    {}", format_timestamp(chat.updated_at));
}

fn print_message(message: &Message) {
    println!(
        "[{}] {:<9} {}",
        format_timestamp(message.created_at),
        message.role.as_str(),
        message.text()
    );
}

fn visibility_name(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "public",
        Visibility::Private => "private",
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
