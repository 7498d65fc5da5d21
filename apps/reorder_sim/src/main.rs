use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reorder_core::{
    load_settings, spawn_engine, DisplayState, EngineHandle, EngineSettings, MemoryItemStore,
    ReorderingModeContext,
};
use serde::{Deserialize, Serialize};
use shared::domain::{CollectionContext, CollectionId, GiftKind, ItemId, Point, Rect, Vector};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CELL: f64 = 100.0;

#[derive(Parser, Debug)]
#[command(about = "Replays pointer and store scripts against the gift reorder engine")]
struct Cli {
    /// TOML file with engine settings; `APP__*` variables override it.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a JSON script and print the display order after every step.
    Replay {
        script: PathBuf,
        /// Print one JSON object per step instead of text.
        #[arg(long)]
        json: bool,
        /// Items per row when laying the list out.
        #[arg(long, default_value_t = 3)]
        columns: usize,
    },
    /// Print the effective engine settings as TOML.
    PrintConfig,
}

#[derive(Debug, Deserialize)]
struct Script {
    items: Vec<ScriptItem>,
    #[serde(default)]
    pinned: Vec<ItemId>,
    #[serde(default)]
    collections: BTreeMap<i64, Vec<ItemId>>,
    #[serde(default)]
    context: CollectionContext,
    #[serde(default = "default_reordering")]
    reordering: bool,
    /// Remote app configuration, e.g. `{"stargifts_pinned_to_top_limit": 4}`.
    #[serde(default)]
    app_config: Option<serde_json::Value>,
    steps: Vec<Step>,
}

fn default_reordering() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ScriptItem {
    id: ItemId,
    #[serde(default)]
    kind: Option<GiftKind>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum Step {
    PointerDown { index: usize },
    SecondTouch,
    Move { dx: f64, dy: f64 },
    Up,
    Cancel,
    Wait { ms: u64 },
    Pin { id: ItemId },
    Unpin { id: ItemId },
    ReplacePin { evict: ItemId, id: ItemId },
    Promote { id: ItemId },
    SetContext { context: CollectionContext },
    SetReordering { on: bool },
    ServerInsert { id: ItemId },
    ServerRemove { id: ItemId },
    ServerCollection { collection_id: i64, members: Vec<ItemId> },
}

#[derive(Debug, Serialize)]
struct StepReport<'a> {
    step: usize,
    action: &'a Step,
    outcome: Option<String>,
    generation: u64,
    order: Vec<String>,
    pinned: Vec<String>,
    dragging: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Command::PrintConfig => {
            print!("{}", toml::to_string_pretty(&settings)?);
        }
        Command::Replay {
            script,
            json,
            columns,
        } => {
            let raw = std::fs::read_to_string(&script)
                .with_context(|| format!("failed to read script '{}'", script.display()))?;
            let script: Script = serde_json::from_str(&raw)
                .with_context(|| format!("invalid script '{}'", script.display()))?;
            replay(script, settings, json, columns.max(1)).await?;
        }
    }

    Ok(())
}

async fn replay(script: Script, mut settings: EngineSettings, json: bool, columns: usize) -> Result<()> {
    if let Some(app_config) = &script.app_config {
        settings.apply_app_config(app_config);
        settings.validate()?;
    }

    let order = script.items.iter().map(|item| item.id.clone()).collect();
    let store = Arc::new(MemoryItemStore::new(order, script.pinned.clone()));
    for item in &script.items {
        if let Some(kind) = &item.kind {
            store.set_kind(item.id.clone(), kind.clone()).await;
        }
    }
    for (collection_id, members) in &script.collections {
        store
            .set_collection(CollectionId(*collection_id), members.clone())
            .await;
    }

    let mode = ReorderingModeContext::new(script.reordering);
    let (handle, task) = spawn_engine(store.clone(), settings, script.context, mode.clone());
    info!(steps = script.steps.len(), "sim: replay started");

    let mut state = relayout(&handle, columns).await?;
    report(0, None, None, &state, json)?;

    for (index, step) in script.steps.iter().enumerate() {
        let outcome = match step {
            Step::PointerDown { index } => {
                let candidate = handle
                    .begin_possible_drag(cell_center(*index, columns))
                    .await?;
                Some(format!(
                    "eligible={} candidate={}",
                    candidate.eligible,
                    candidate
                        .candidate
                        .map_or_else(|| "-".to_string(), |id| id.to_string())
                ))
            }
            Step::SecondTouch => {
                handle.additional_touch().await?;
                None
            }
            Step::Move { dx, dy } => {
                handle.drag_moved(Vector::new(*dx, *dy)).await?;
                None
            }
            Step::Up => {
                handle.drag_ended().await?;
                None
            }
            Step::Cancel => {
                handle.drag_cancelled().await?;
                None
            }
            Step::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                None
            }
            Step::Pin { id } => Some(describe(handle.request_pin(id.clone()).await)),
            Step::Unpin { id } => Some(describe(handle.request_unpin(id.clone()).await)),
            Step::ReplacePin { evict, id } => Some(describe(
                handle.replace_pin(evict.clone(), id.clone()).await,
            )),
            Step::Promote { id } => Some(match handle.promote_to_pinned(id.clone()).await {
                Ok(outcome) => format!("{outcome:?}"),
                Err(error) => format!("error: {error}"),
            }),
            Step::SetContext { context } => {
                handle.set_context(*context).await?;
                None
            }
            Step::SetReordering { on } => {
                mode.set(*on);
                None
            }
            Step::ServerInsert { id } => {
                store.insert_item(id.clone()).await;
                None
            }
            Step::ServerRemove { id } => {
                store.remove_item(id).await;
                None
            }
            Step::ServerCollection {
                collection_id,
                members,
            } => {
                store
                    .set_collection(CollectionId(*collection_id), members.clone())
                    .await;
                None
            }
        };

        // Let store echoes and mode changes reach the engine before sampling.
        tokio::task::yield_now().await;
        state = relayout(&handle, columns).await?;
        report(index + 1, Some(step), outcome, &state, json)?;
    }

    handle.shutdown().await?;
    if let Err(error) = task.await {
        warn!(%error, "sim: engine task ended abnormally");
    }
    info!(generation = state.generation, "sim: replay finished");
    Ok(())
}

/// Reports a `columns`-wide grid of frames for the current display order,
/// playing the rendering surface's part.
async fn relayout(handle: &EngineHandle, columns: usize) -> Result<DisplayState> {
    let state = handle.display_state().await?;
    let dragging = state.dragging.clone();
    let frames = state
        .order
        .iter()
        .enumerate()
        .filter(|(_, id)| Some(*id) != dragging.as_ref())
        .map(|(index, id)| {
            let center = cell_center(index, columns);
            (
                id.clone(),
                Rect::new(center.x - CELL / 2.0, center.y - CELL / 2.0, CELL, CELL),
            )
        })
        .collect();
    handle.update_layout(frames).await?;
    Ok(state)
}

fn cell_center(index: usize, columns: usize) -> Point {
    let column = (index % columns) as f64;
    let row = (index / columns) as f64;
    Point::new(column * CELL + CELL / 2.0, row * CELL + CELL / 2.0)
}

fn describe(result: Result<(), reorder_core::EngineError>) -> String {
    match result {
        Ok(()) => "ok".to_string(),
        Err(error) => format!("error: {error}"),
    }
}

fn report(
    step: usize,
    action: Option<&Step>,
    outcome: Option<String>,
    state: &DisplayState,
    json: bool,
) -> Result<()> {
    let order: Vec<String> = state.order.iter().map(ToString::to_string).collect();
    let pinned: Vec<String> = state.pinned.iter().map(ToString::to_string).collect();
    let dragging = state.dragging.as_ref().map(ToString::to_string);

    match action {
        Some(action) if json => {
            let line = StepReport {
                step,
                action,
                outcome,
                generation: state.generation,
                order,
                pinned,
                dragging,
            };
            println!("{}", serde_json::to_string(&line)?);
        }
        None if json => {}
        _ => {
            let label = action.map_or_else(|| "initial".to_string(), |action| format!("{action:?}"));
            let decorated: Vec<String> = state
                .items
                .iter()
                .map(|item| match item.kind.as_ref().and_then(GiftKind::label) {
                    Some(ribbon) => format!("{} \"{ribbon}\"", item.id),
                    None => item.id.to_string(),
                })
                .collect();
            println!(
                "{step:>3} {label:<40} gen={} order=[{}] pinned=[{}]{}{}",
                state.generation,
                decorated.join(", "),
                pinned.join(", "),
                dragging.map(|id| format!(" dragging={id}")).unwrap_or_default(),
                outcome.map(|outcome| format!(" ({outcome})")).unwrap_or_default(),
            );
        }
    }
    Ok(())
}
