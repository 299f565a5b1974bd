mod commands;
mod interactive;
pub mod render;

use crate::domain::error::Result;
use crate::domain::llm_config::LLMProvider;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "text2sql")]
#[command(version, about = "Ask questions about your data in plain language", long_about = None)]
pub struct Cli {
    /// Configuration file (default: ./text2sql.toml when present)
    #[arg(long, global = true, env = "TEXT2SQL_CONFIG")]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a CSV or Excel file into a new queryable data source
    Import {
        /// CSV, TSV or Excel file
        file: PathBuf,

        /// Source name (default: cleaned file name)
        #[arg(long)]
        name: Option<String>,

        /// Import only this worksheet
        #[arg(long)]
        sheet: Option<String>,

        #[arg(long, default_value = "")]
        description: String,

        /// Overwrite an existing source with the same name
        #[arg(long)]
        replace: bool,
    },

    /// Register an existing SQLite database
    AddDb {
        name: String,

        /// Path to the SQLite file
        path: PathBuf,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        replace: bool,
    },

    /// Register a PostgreSQL database (queried read-only)
    AddPostgres {
        name: String,

        /// postgres://user@host:5432/database
        url: String,

        /// Password source: env:VAR, keychain:NAME or plain:SECRET
        #[arg(long)]
        password_ref: Option<String>,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        replace: bool,
    },

    /// List data sources (* marks the active one)
    List,

    /// Make a data source the default for queries
    SetActive { name: String },

    /// Unregister a data source
    Remove {
        name: String,

        /// Keep the imported database file on disk
        #[arg(long)]
        keep_file: bool,
    },

    /// Show tables and columns of a data source
    Schema {
        #[arg(long)]
        source: Option<String>,
    },

    /// Answer one question
    Query {
        question: String,

        #[arg(long)]
        source: Option<String>,

        /// Repair attempts after the first query (overrides max_debug_attempts)
        #[arg(long)]
        max_retries: Option<u32>,

        /// Fail on the first rejected or failing query
        #[arg(long, conflicts_with = "max_retries")]
        no_debug: bool,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask questions in a loop
    Interactive {
        #[arg(long)]
        source: Option<String>,

        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// List models offered by the configured provider
    Models,

    /// Check the API key and model with a minimal request
    Ping,

    /// Manage API keys stored in the system keychain
    Key {
        #[command(subcommand)]
        action: KeyCommands,
    },
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Store a key (read from stdin when omitted)
    Set {
        key: Option<String>,

        /// google, openai, openrouter or local (default: configured provider)
        #[arg(long, value_parser = parse_provider)]
        provider: Option<LLMProvider>,
    },
    /// Delete a stored key
    Delete {
        #[arg(long, value_parser = parse_provider)]
        provider: Option<LLMProvider>,
    },
    /// Store a database password, referenced as keychain:NAME
    SetPassword {
        name: String,

        /// Read from stdin when omitted
        password: Option<String>,
    },
}

fn parse_provider(raw: &str) -> std::result::Result<LLMProvider, String> {
    match raw.trim().to_lowercase().as_str() {
        "google" | "gemini" => Ok(LLMProvider::Google),
        "openai" => Ok(LLMProvider::OpenAI),
        "openrouter" => Ok(LLMProvider::OpenRouter),
        "local" => Ok(LLMProvider::Local),
        other => Err(format!(
            "unknown provider '{}' (expected google, openai, openrouter or local)",
            other
        )),
    }
}

impl Cli {
    pub async fn execute(self) -> Result<ExitCode> {
        let session = commands::Session::load(self.config.as_deref())?;

        match self.command {
            Commands::Import {
                file,
                name,
                sheet,
                description,
                replace,
            } => {
                commands::import(&session, &file, name, sheet.as_deref(), description, replace)
                    .await
            }
            Commands::AddDb {
                name,
                path,
                description,
                replace,
            } => commands::add_db(&session, name, &path, description, replace).await,
            Commands::AddPostgres {
                name,
                url,
                password_ref,
                description,
                replace,
            } => {
                commands::add_postgres(&session, name, url, password_ref, description, replace)
                    .await
            }
            Commands::List => commands::list(&session),
            Commands::SetActive { name } => commands::set_active(&session, &name),
            Commands::Remove { name, keep_file } => commands::remove(&session, &name, keep_file),
            Commands::Schema { source } => commands::schema(&session, source.as_deref()).await,
            Commands::Query {
                question,
                source,
                max_retries,
                no_debug,
                json,
            } => {
                let max_attempts = if no_debug { Some(0) } else { max_retries };
                commands::query(&session, &question, source.as_deref(), max_attempts, json).await
            }
            Commands::Interactive {
                source,
                max_retries,
            } => interactive::run(&session, source.as_deref(), max_retries).await,
            Commands::Models => commands::models(&session).await,
            Commands::Ping => commands::ping(&session).await,
            Commands::Key { action } => match action {
                KeyCommands::Set { key, provider } => commands::key_set(&session, key, provider),
                KeyCommands::Delete { provider } => commands::key_delete(&session, provider),
                KeyCommands::SetPassword { name, password } => {
                    commands::key_set_password(&session, &name, password)
                }
            },
        }
    }
}
