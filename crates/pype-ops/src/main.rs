//! pype-ops CLI - project lifecycle and batched entity operations.
//!
//! # Usage
//!
//! ```bash
//! # Create a project from the primary anatomy preset
//! pype-ops project create my_project mp
//!
//! # Delete a project
//! pype-ops project delete my_project
//!
//! # Send create/update/delete intents from a file in one commit
//! pype-ops apply changes.json
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pype_ops::{
    ClientConfig, Connection, Document, EntityKind, HttpConnection, OperationsSession, diff,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "pype-ops")]
#[command(about = "Operations client for production asset management servers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Project management
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Apply a JSON list of entity intents in a single commit
    Apply {
        /// File with a JSON array of intents
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// Create a new project
    Create {
        name: String,
        code: String,

        /// Mark the project as a library project
        #[arg(long)]
        library: bool,

        /// Anatomy preset, the primary preset if omitted
        #[arg(long)]
        preset: Option<String>,
    },

    /// Delete a project
    Delete { name: String },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Create,
    Update,
    Delete,
}

/// One line of an `apply` file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Intent {
    action: Action,
    project: String,
    entity_type: EntityKind,
    entity_id: Option<String>,
    data: Option<Document>,
    old: Option<Document>,
    new: Option<Document>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::load_from_path(path).await?,
        None => ClientConfig::load().await?,
    };
    let level = if cli.verbose {
        "debug"
    } else {
        config.general.log_level.as_str()
    };
    pype_ops::logging::init_logging(level);

    let con: Arc<dyn Connection> = Arc::new(HttpConnection::new(&config)?);

    match cli.command {
        Commands::Project(ProjectCommands::Create {
            name,
            code,
            library,
            preset,
        }) => {
            let project =
                pype_ops::create_project(con.as_ref(), &name, &code, library, preset.as_deref())
                    .await?;
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        Commands::Project(ProjectCommands::Delete { name }) => {
            pype_ops::delete_project(con.as_ref(), &name).await?;
            println!("Deleted project {}", name);
        }
        Commands::Apply { file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let intents: Vec<Intent> = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", file.display()))?;
            apply(con, intents).await?;
        }
    }

    Ok(())
}

async fn apply(con: Arc<dyn Connection>, intents: Vec<Intent>) -> Result<()> {
    let session = OperationsSession::new(con);
    for (index, intent) in intents.into_iter().enumerate() {
        let project = intent.project.as_str();
        let kind = intent.entity_type;
        match intent.action {
            Action::Create => {
                let mut data = intent.data.unwrap_or_default();
                if let Some(id) = intent.entity_id {
                    data.insert("_id".to_string(), id.into());
                }
                session.create_entity(project, kind, data, None).await?;
            }
            Action::Update => {
                let Some(entity_id) = intent.entity_id.as_deref() else {
                    bail!("Intent {} updates without entityId", index);
                };
                let changes = match (intent.data, intent.old, intent.new) {
                    (Some(data), _, _) => pype_ops::diff::from_wire_map(data),
                    (None, Some(old), Some(new)) => diff(&old, &new, true),
                    _ => bail!("Intent {} needs either data or old and new", index),
                };
                session
                    .update_entity(project, kind, entity_id, changes, None)
                    .await?;
            }
            Action::Delete => {
                let Some(entity_id) = intent.entity_id.as_deref() else {
                    bail!("Intent {} deletes without entityId", index);
                };
                session.delete_entity(project, kind, entity_id, None)?;
            }
        }
    }

    let count = session.pending_len();
    session.commit().await?;
    info!(operations = count, "Applied intents");
    println!("Committed {} operations", count);
    Ok(())
}
