//! CLI command execution.
//!
//! Draft commands are a thin client: edits go through a [`DraftEditor`]
//! backed by the HTTP gateway, so they follow the same debounce and save
//! rules as any other editor.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tracing::debug;

use crate::autosave::{DraftEditor, SaveReport, SaveStatus};
use crate::client::HttpGateway;
use crate::config::{local_url, EditorConfig, ServerConfig, DEFAULT_PORT};
use crate::db::Gateway;
use crate::models::{Draft, DraftEdit, OwnerId, SessionMedia};
use crate::server;

use super::args::{Cli, Commands, DraftAction, RemoteArgs};

/// Execute the parsed CLI command.
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve { port, db } => {
            let config = ServerConfig::new(port, db)?;
            println!("Stillwater server on http://{}", config.addr);
            println!("Database: {}", config.db_path.display());
            server::start_server(&config).await
        }
        Commands::Draft { remote, action } => {
            let ctx = Remote::from(&remote);
            match action {
                DraftAction::New { set } => {
                    let editor = DraftEditor::new(ctx.gateway(), ctx.owner.clone(), &ctx.config);
                    edit_and_save(&editor, &set).await
                }
                DraftAction::Edit { id, set } => {
                    let editor = ctx.open(&id).await?;
                    edit_and_save(&editor, &set).await
                }
                DraftAction::Show { id } => {
                    let draft = ctx
                        .gateway
                        .get_draft(&id, &ctx.owner)
                        .await
                        .with_context(|| format!("Failed to load draft {id}"))?;
                    print_draft(&draft);
                    Ok(())
                }
                DraftAction::Publish {
                    id,
                    video_url,
                    thumbnail_url,
                } => {
                    let media = SessionMedia {
                        video_url,
                        thumbnail_url,
                    };
                    publish(&ctx.open(&id).await?, media).await
                }
            }
        }
    }
}

/// Connection details shared by the draft commands.
struct Remote {
    gateway: Arc<HttpGateway>,
    owner: OwnerId,
    config: EditorConfig,
}

impl From<&RemoteArgs> for Remote {
    fn from(args: &RemoteArgs) -> Self {
        let url = args
            .url
            .clone()
            .unwrap_or_else(|| local_url(DEFAULT_PORT));
        Self {
            gateway: Arc::new(HttpGateway::new(url)),
            owner: OwnerId::new(args.owner.as_str()),
            config: EditorConfig::with_quiet_period(Duration::from_millis(args.quiet_ms)),
        }
    }
}

impl Remote {
    fn gateway(&self) -> Arc<HttpGateway> {
        Arc::clone(&self.gateway)
    }

    async fn open(&self, id: &str) -> Result<DraftEditor<HttpGateway>> {
        DraftEditor::open(self.gateway(), self.owner.clone(), id, &self.config)
            .await
            .with_context(|| format!("Failed to open draft {id}"))
    }
}

async fn edit_and_save(editor: &DraftEditor<HttpGateway>, set: &[(String, String)]) -> Result<()> {
    if set.is_empty() {
        bail!("Nothing to change: pass at least one --set FIELD=VALUE");
    }
    let before = editor.status().last_saved_at;
    for (field, value) in set {
        let edit = DraftEdit::parse(field, value)?;
        editor.edit(edit)?;
    }

    match summarize(wait_for_save(editor).await?, before) {
        SaveSummary::Written { id, at } => {
            println!("Saved draft {id} at {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        SaveSummary::Unchanged { id } => println!("No changes to save for draft {id}"),
        SaveSummary::Blank => {
            println!("Nothing saved: title, description and content are all empty");
        }
        SaveSummary::Failed(message) => bail!("Save failed: {message}"),
    }
    Ok(())
}

/// What a settled save did, relative to the save time seen before editing.
#[derive(Debug, PartialEq, Eq)]
enum SaveSummary {
    Written { id: String, at: DateTime<Utc> },
    Unchanged { id: String },
    Blank,
    Failed(String),
}

fn summarize(report: SaveReport, before: Option<DateTime<Utc>>) -> SaveSummary {
    match (report.status, report.draft_id, report.last_saved_at) {
        (SaveStatus::Error, ..) => {
            SaveSummary::Failed(report.error.unwrap_or_else(|| "unknown error".to_string()))
        }
        (SaveStatus::Saved, Some(id), Some(at)) if before != Some(at) => {
            SaveSummary::Written { id, at }
        }
        (SaveStatus::Saved, Some(id), _) => SaveSummary::Unchanged { id },
        _ => SaveSummary::Blank,
    }
}

/// Follow the status signal until the scheduled save settles.
async fn wait_for_save(editor: &DraftEditor<HttpGateway>) -> Result<SaveReport> {
    let mut updates = WatchStream::new(editor.subscribe());
    while let Some(report) = updates.next().await {
        debug!(status = %report.status, "save status");
        if !matches!(report.status, SaveStatus::Pending | SaveStatus::Saving) {
            return Ok(report);
        }
    }
    bail!("Editor closed before the save completed")
}

async fn publish(editor: &DraftEditor<HttpGateway>, media: SessionMedia) -> Result<()> {
    let outcome = editor.publish(media).await.context("Publish failed")?;
    println!("Published session {}", outcome.session_id);
    if let Some(draft_id) = &outcome.retired_draft {
        println!("Deleted draft {draft_id}");
    }
    if let Some(warning) = &outcome.warning {
        eprintln!("Warning: the session is live but the draft was not deleted: {warning}");
    }
    Ok(())
}

fn print_draft(draft: &Draft) {
    let fields = &draft.fields;
    println!("Draft {}", draft.id.as_deref().unwrap_or("(unsaved)"));
    println!("  Title:       {}", fields.title);
    println!("  Type:        {}", fields.kind);
    println!("  Duration:    {} min", fields.duration);
    println!("  Description: {}", fields.description);
    if let Some(at) = draft.last_saved_at {
        println!("  Last saved:  {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();
    println!("{}", fields.content);
}
