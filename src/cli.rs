use crate::config::load_config;
use crate::layout::{
    RecordingObserver, TracingObserver, assign_generations_with, compute_layout_with,
    constraint_violations,
};
use crate::layout_dump::{LayoutDump, write_layout_dump};
use crate::model::FamilyGraph;
use crate::parser::{load_family, parse_document, parse_family};
use crate::relationship::{path, relationship_report};
use crate::settings::{change_impact, check_graph, load_settings, validate_settings_change};
use anyhow::{Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "phylo", version, about = "Family tree generations, relationships and layout")]
pub struct Args {
    /// Family file (.json document or text notation), '-' for stdin
    #[arg(short = 'i', long = "input", global = true)]
    pub input: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute card positions and write them as JSON
    Layout {
        /// Layout config (JSON5, camelCase keys)
        #[arg(short = 'c', long = "configFile")]
        config: Option<PathBuf>,
        /// Output file; stdout when omitted
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        /// Print every layout pass event to stderr
        #[arg(long)]
        trace: bool,
    },
    /// Print each member's generation
    Generations {
        /// Fail when a layering constraint is broken
        #[arg(long)]
        check: bool,
    },
    /// Name the relationship between two members
    Relate { from: String, to: String },
    /// Print the shortest connecting path between two members
    Path { from: String, to: String },
    /// Check the tree against settings, or preview a settings change
    Check {
        #[arg(short = 's', long = "settings")]
        settings: Option<PathBuf>,
        /// Proposed settings to validate against the current ones
        #[arg(short = 'p', long = "proposed")]
        proposed: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let graph = read_family(args.input.as_deref())?;
    tracing::debug!(members = graph.len(), edges = graph.edge_count(), "family loaded");

    match args.command {
        Command::Layout {
            config,
            output,
            trace,
        } => {
            let config = load_config(config.as_deref())?;
            let layout = if trace {
                let mut observer = RecordingObserver::default();
                let layout = compute_layout_with(&graph, &config, &mut observer);
                eprintln!("{}", serde_json::to_string_pretty(&observer.events)?);
                layout
            } else {
                compute_layout_with(&graph, &config, &mut TracingObserver)
            };
            match output {
                Some(path) => write_layout_dump(&path, &layout, &graph)?,
                None => {
                    let dump = LayoutDump::from_layout(&layout, &graph);
                    println!("{}", serde_json::to_string_pretty(&dump)?);
                }
            }
        }
        Command::Generations { check } => {
            let config = crate::config::GenerationConfig::default();
            let assignment = assign_generations_with(&graph, &config, &mut TracingObserver);
            print!("{}", format_generations(&graph, &assignment.generations));
            if check {
                let violations = constraint_violations(&graph, &assignment.generations);
                if !violations.is_empty() {
                    for violation in &violations {
                        eprintln!("{}", serde_json::to_string(violation)?);
                    }
                    bail!("{} layering constraint(s) broken", violations.len());
                }
            }
        }
        Command::Relate { from, to } => {
            ensure_members(&graph, &[from.as_str(), to.as_str()])?;
            let report = relationship_report(&graph, &from, &to);
            println!("{}", report.label);
            if !report.path.is_empty() {
                println!("{}", format_path(&graph, &report.path));
            }
        }
        Command::Path { from, to } => {
            ensure_members(&graph, &[from.as_str(), to.as_str()])?;
            let route = path(&graph, &from, &to);
            if route.is_empty() {
                bail!("no connection between `{from}` and `{to}`");
            }
            println!("{}", format_path(&graph, &route));
        }
        Command::Check { settings, proposed } => {
            let current = load_settings(settings.as_deref())?;
            if let Some(proposed) = proposed {
                let proposed = load_settings(Some(&proposed))?;
                let impact = change_impact(&graph, &current, &proposed);
                println!("{}", serde_json::to_string_pretty(&impact)?);
                validate_settings_change(&graph, &current, &proposed)?;
            } else {
                let violations = check_graph(&graph, &current);
                for violation in &violations {
                    println!("{}", serde_json::to_string(violation)?);
                }
                if !violations.is_empty() {
                    bail!("{} settings violation(s)", violations.len());
                }
            }
        }
    }
    Ok(())
}

fn read_family(path: Option<&Path>) -> Result<FamilyGraph> {
    if let Some(path) = path {
        if path != Path::new("-") {
            return load_family(path);
        }
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    if buf.trim_start().starts_with('{') {
        parse_document(&buf)
    } else {
        parse_family(&buf)
    }
}

fn ensure_members(graph: &FamilyGraph, ids: &[&str]) -> Result<()> {
    for id in ids {
        if !graph.contains(id) {
            bail!("unknown member `{id}`");
        }
    }
    Ok(())
}

fn format_generations(graph: &FamilyGraph, generations: &crate::layout::GenerationMap) -> String {
    let mut rows: Vec<(i32, &str)> = generations
        .iter()
        .map(|(id, generation)| (*generation, id.as_str()))
        .collect();
    rows.sort();
    let mut out = String::new();
    for (generation, id) in rows {
        out.push_str(&format!("{generation}\t{id}\t{}\n", graph.name_of(id)));
    }
    out
}

fn format_path(graph: &FamilyGraph, route: &[String]) -> String {
    route
        .iter()
        .map(|id| graph.name_of(id))
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::assign_generations;

    #[test]
    fn parses_subcommands() {
        let args = Args::try_parse_from(["phylo", "-i", "tree.family", "relate", "a", "b"]).unwrap();
        assert_eq!(args.input, Some(PathBuf::from("tree.family")));
        assert!(matches!(args.command, Command::Relate { ref from, .. } if from == "a"));

        let args = Args::try_parse_from(["phylo", "layout", "-vv", "--trace"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(matches!(args.command, Command::Layout { trace: true, .. }));
    }

    #[test]
    fn generations_print_by_row() {
        let graph = parse_family("person a \"Ann\"\na -> b").unwrap();
        let text = format_generations(&graph, &assign_generations(&graph));
        assert_eq!(text, "0\ta\tAnn\n1\tb\tb\n");
    }

    #[test]
    fn paths_use_names() {
        let graph = parse_family("person a \"Ann\"\nperson b \"Bo\"\na + b").unwrap();
        let route = vec!["a".to_string(), "b".to_string()];
        assert_eq!(format_path(&graph, &route), "Ann -> Bo");
    }

    #[test]
    fn unknown_members_are_rejected() {
        let graph = parse_family("a + b").unwrap();
        assert!(ensure_members(&graph, &["a", "zed"]).is_err());
        assert!(ensure_members(&graph, &["a", "b"]).is_ok());
    }
}
