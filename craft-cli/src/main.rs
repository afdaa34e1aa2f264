use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use craft_core::{CraftConfig, PipelineOrchestrator, ReadinessGate};
use craft_manual::{ManualAssembler, ManualInputs};
use craft_mesh::{export_wireframe, render_preview, PreviewOptions};
use craft_store::{FsBlobStore, InMemoryBlobStore};
use craft_types::{JoinPolicy, PartIndex, PlacedPart};
use serde::de::DeserializeOwned;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "plancraft")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a parts3d file as a wireframe model.
    Export {
        parts3d: PathBuf,
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// Render a preview PNG of a parts3d file.
    Render {
        parts3d: PathBuf,
        #[arg(long, short)]
        out: PathBuf,
        /// Only draw these parts.
        #[arg(long = "part")]
        parts: Vec<String>,
        #[arg(long, default_value_t = 700)]
        size: u32,
    },
    /// Build a design document from local artifacts.
    Manual {
        #[arg(long)]
        parts3d: PathBuf,
        #[arg(long)]
        fabrication: PathBuf,
        #[arg(long)]
        assembly: PathBuf,
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Print how far a plan has come in a filesystem store.
    State {
        plan_id: String,
        #[arg(long, default_value = "./data")]
        store: PathBuf,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Export { parts3d, out } => {
            let placed: Vec<PlacedPart> = read_json(&parts3d)?;
            let text = export_wireframe(&placed);
            match out {
                Some(path) => std::fs::write(&path, text)?,
                None => print!("{text}"),
            }
        }
        Command::Render {
            parts3d,
            out,
            parts,
            size,
        } => {
            let placed: Vec<PlacedPart> = read_json(&parts3d)?;
            let opts = PreviewOptions {
                size,
                ..PreviewOptions::default()
            };
            let png = if parts.is_empty() {
                render_preview(&placed, &opts)?
            } else {
                let index = PartIndex::new(&placed)?;
                let chosen = index.select(parts.iter().map(String::as_str), JoinPolicy::Strict)?;
                render_preview(chosen, &opts)?
            };
            std::fs::write(&out, &png)?;
            println!("wrote {} ({} bytes)", out.display(), png.len());
        }
        Command::Manual {
            parts3d,
            fabrication,
            assembly,
            out,
        } => {
            let cfg = CraftConfig::from_env()?;
            let inputs = ManualInputs {
                parts3d: read_json(&parts3d)?,
                fabrication: read_json(&fabrication)?,
                assembly: read_json(&assembly)?,
            };
            let assembler = ManualAssembler::new(
                Arc::new(InMemoryBlobStore::new()),
                Arc::new(cfg.renderer()),
                cfg.scratch_root.clone(),
            )
            .with_preview(cfg.preview())
            .with_labels(cfg.labels()?)
            .with_join_policy(cfg.join_policy);
            let bytes = assembler.build("local", &inputs).await?;
            std::fs::write(&out, &bytes)?;
            info!(out = %out.display(), bytes = bytes.len(), "design document written");
            println!("wrote {} ({} bytes)", out.display(), bytes.len());
        }
        Command::State { plan_id, store } => {
            let plan = PipelineOrchestrator::parse_plan(&plan_id)?;
            let gate = ReadinessGate::new(Arc::new(FsBlobStore::new(store)));
            let present = gate.present(plan).await?;
            let state = serde_json::to_value(gate.state(plan).await?)?;
            println!("{plan}: {}", state.as_str().unwrap_or_default());
            for kind in present {
                println!("  {}", kind.file_name());
            }
        }
    }

    Ok(())
}
