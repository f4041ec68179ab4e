// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Agent messaging commands
//!
//! Commands: send, broadcast, inbox, history

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use xmrt_core::domain::message::{AgentMessage, MessagePriority, MessageType};

use super::{connect, parse_message_type};
use crate::daemon::client::OutgoingMessage;

#[derive(Subcommand)]
pub enum MessageCommand {
    /// Send a message to one agent
    Send {
        /// Sending agent id
        #[arg(short, long)]
        from: String,

        /// Receiving agent id
        #[arg(short, long)]
        to: String,

        #[arg(value_name = "CONTENT")]
        content: String,

        #[arg(long = "type", default_value = "query", value_parser = parse_message_type)]
        message_type: MessageType,

        /// 1 (low) to 3 (high)
        #[arg(short, long, default_value = "2", value_parser = clap::value_parser!(u8).range(1..=3))]
        priority: u8,

        #[arg(long)]
        requires_response: bool,
    },

    /// Send a message to every active agent except the sender
    Broadcast {
        #[arg(short, long)]
        from: String,

        #[arg(value_name = "CONTENT")]
        content: String,

        #[arg(long = "type", default_value = "broadcast", value_parser = parse_message_type)]
        message_type: MessageType,
    },

    /// Read an agent's inbox (drains it unless --wait is given)
    Inbox {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        /// Wait up to this many milliseconds for a single message
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Recently sent messages, oldest first
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

pub async fn handle_command(command: MessageCommand, host: &str, port: u16) -> Result<()> {
    let Some(client) = connect(host, port).await? else {
        return Ok(());
    };

    match command {
        MessageCommand::Send {
            from,
            to,
            content,
            message_type,
            priority,
            requires_response,
        } => {
            let priority = MessagePriority::try_from(priority).map_err(anyhow::Error::msg)?;
            let id = client
                .send_message(&OutgoingMessage {
                    sender: from,
                    receiver: to.clone(),
                    content,
                    message_type,
                    priority,
                    requires_response,
                })
                .await?;
            println!("{}", format!("✓ Message {} queued for {}", id, to).green());
        }
        MessageCommand::Broadcast {
            from,
            content,
            message_type,
        } => {
            let recipients = client.broadcast(&from, &content, message_type).await?;
            println!(
                "{}",
                format!("✓ Broadcast delivered to {} agent(s)", recipients).green()
            );
        }
        MessageCommand::Inbox { agent_id, wait } => {
            let messages = client.inbox(&agent_id, wait).await?;
            if messages.is_empty() {
                println!("{}", "Inbox empty".dimmed());
            }
            for message in &messages {
                print_message(message);
            }
        }
        MessageCommand::History { limit } => {
            for message in &client.history(limit).await? {
                print_message(message);
            }
        }
    }

    Ok(())
}

fn print_message(message: &AgentMessage) {
    let marker = match message.priority {
        MessagePriority::High => "!".red(),
        MessagePriority::Normal => " ".normal(),
        MessagePriority::Low => ".".dimmed(),
    };
    println!(
        "{} {} {} → {} [{:?}] {}",
        marker,
        message.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        message.sender,
        message.receiver,
        message.message_type,
        message.content
    );
    if message.requires_response {
        println!("    {}", "response requested".yellow());
    }
}
