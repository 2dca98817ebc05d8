#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::doc_markdown,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unused_async
)]

use clap::Subcommand;
use serde::{Deserialize, Serialize};

pub mod auth;
pub mod config;
pub mod gateway;
pub mod providers;
pub mod retrieval;
pub mod sessions;

pub use config::Config;

/// Session management subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionCommands {
    /// List chat sessions for a user
    List {
        /// User the sessions belong to
        #[arg(long)]
        user: String,
        /// Maximum number of sessions to display
        #[arg(long, default_value = "50")]
        limit: usize,
    },
    /// Delete a chat session and its stored turns
    Delete {
        /// Session ID to delete
        session_id: String,
        /// User the session belongs to
        #[arg(long)]
        user: String,
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Knowledge-base management subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum KnowledgeBaseCommands {
    /// Show knowledge-base status (chunk and document counts)
    Status,
    /// Ingest a text file into the knowledge base
    Ingest {
        /// Path to a UTF-8 text file
        path: String,
        /// Document name to file the chunks under (defaults to the file name)
        #[arg(long)]
        document: Option<String>,
    },
    /// Remove all chunks belonging to a document
    Remove {
        /// Document name
        document: String,
    },
}
