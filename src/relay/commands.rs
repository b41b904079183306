// Command handlers for the message relay CLI

use crate::relay::*;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

/// Execute a relay command
pub async fn execute_command(cli: MsgRelayCli) -> Result<()> {
    let config = RelayConfig::from_cli(&cli);
    tracing::debug!("Using data file {:?}", config.data_file);

    let store = Arc::new(MessageStore::open(&config.data_file));

    match cli.command {
        MsgRelayCommand::Serve { bind } => handle_serve(store, bind).await,
        MsgRelayCommand::Send {
            sender,
            recipient,
            message,
        } => handle_send(&store, &recipient, &sender, &message),
        MsgRelayCommand::List { recipient, since } => {
            handle_list(&store, &recipient, since.as_deref())
        }
        MsgRelayCommand::Range {
            recipient,
            start,
            stop,
        } => handle_range(&store, &recipient, start, stop),
        MsgRelayCommand::Delete { recipient, ids } => handle_delete(&store, &recipient, ids),
    }
}

async fn handle_serve(store: Arc<MessageStore>, bind: SocketAddr) -> Result<()> {
    let listener =
        TcpListener::bind(bind).with_context(|| format!("Failed to bind {}", bind))?;

    println!("Press Ctrl+C to stop the relay");

    http::serve(listener, store, async {
        let _ = tokio::signal::ctrl_c().await;
        println!("\nStopping relay...");
    })
    .await
}

fn handle_send(store: &MessageStore, recipient: &str, sender: &str, message: &str) -> Result<()> {
    let id = store
        .append(recipient, sender, message)
        .context("Failed to send message")?;

    println!("✓ Message sent to {}", recipient);
    println!("  ID: {}", id);
    Ok(())
}

fn handle_list(store: &MessageStore, recipient: &str, since: Option<&str>) -> Result<()> {
    let messages = store
        .list_since(recipient, since)
        .context("Failed to list messages")?;

    print_messages(recipient, &messages);
    Ok(())
}

fn handle_range(store: &MessageStore, recipient: &str, start: usize, stop: usize) -> Result<()> {
    let messages = store
        .list_range(recipient, start, stop)
        .context("Failed to list messages")?;

    if messages.is_empty() {
        println!("No messages in range [{}, {}) for {}", start, stop, recipient);
        return Ok(());
    }

    print_messages(recipient, &messages);
    Ok(())
}

fn handle_delete(store: &MessageStore, recipient: &str, ids: Vec<String>) -> Result<()> {
    let ids: HashSet<String> = ids.into_iter().collect();
    let removed = store
        .delete(recipient, Some(&ids))
        .context("Failed to delete messages")?;

    println!("✓ Deleted {} messages", removed);
    Ok(())
}

fn print_messages(recipient: &str, messages: &[Message]) {
    println!("Messages for {} ({}):", recipient, messages.len());
    for msg in messages {
        println!(
            "\n  [{}] {}",
            message::timestamp::format(&msg.created_at),
            msg.sender
        );
        println!("    ID: {}", msg.id);
        println!("    {}", msg.body);
    }
}
