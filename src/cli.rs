use crate::config::load_config;
use crate::dump::{EngineDump, write_engine_dump};
use crate::host::InMemoryHost;
use crate::model::FlowDocument;
use crate::sync::GraphStateSync;
use anyhow::Result;
use clap::Parser;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "flowgrid",
    version,
    about = "Auto-layout and state-sync engine for flow diagrams"
)]
pub struct Args {
    /// Flow document (json/json5) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Engine config overrides (json5)
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Run a full breadth-first relayout after loading
    #[arg(long = "relayout")]
    pub relayout: bool,

    /// Write the engine dump to this path instead of stdout
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Suppress the load and relayout summaries on stderr
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let document = read_document(args.input.as_deref())?;

    let host = InMemoryHost::new(config.canvas.min_size.width, config.canvas.min_size.height);
    let mut sync = GraphStateSync::new(host, config);

    let summary = sync.load_flow(&document);
    if !args.quiet {
        eprintln!(
            "loaded {} nodes, {} edges ({} skipped)",
            summary.nodes, summary.edges, summary.skipped
        );
    }

    if args.relayout {
        let layout = sync.relayout()?;
        if !args.quiet {
            eprintln!(
                "relayout placed {} nodes across {} levels, {} unplaced",
                layout.placed,
                layout.levels,
                layout.unplaced.len()
            );
        }
    }

    match args.output.as_deref() {
        Some(path) => write_engine_dump(path, &sync)?,
        None => {
            let dump = EngineDump::from_sync(&sync);
            serde_json::to_writer_pretty(io::stdout().lock(), &dump)?;
            println!();
        }
    }
    Ok(())
}

fn read_document(path: Option<&Path>) -> Result<FlowDocument> {
    let content = match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)?,
        _ => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let document: FlowDocument = json5::from_str(&content)?;
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_accept_json5_syntax() {
        let document: FlowDocument = json5::from_str(
            r#"{
                // palette tokens, trailing commas allowed
                nodes: [{ id: 'start', kind: 'start' }],
                edges: [],
            }"#,
        )
        .unwrap();
        assert_eq!(document.nodes.len(), 1);
        assert_eq!(document.nodes[0].kind.as_deref(), Some("start"));
    }
}
