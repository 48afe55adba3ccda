//! CLI module - Command-line interface for Incidentry
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

/// Incidentry - incident tracking service
#[derive(Parser)]
#[command(name = "incidentry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server until Ctrl+C (default)
    #[command(alias = "web")]
    Serve,

    /// Create default config file
    #[command(alias = "--init")]
    Init,

    /// Create an account without going through registration
    CreateUser {
        username: String,
        email: String,
        /// Initial password
        #[arg(long)]
        password: String,
        /// Grant the admin role
        #[arg(long)]
        admin: bool,
    },

    /// Change the role of an existing account
    SetRole {
        username: String,
        /// regular or admin
        role: String,
    },

    /// Print recent audit entries
    Audit {
        /// Number of entries to show
        #[arg(long, default_value = "20")]
        limit: u64,
    },
}

pub use commands::*;
