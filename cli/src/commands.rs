//! CLI command definitions

use clap::{Args, Parser, Subcommand};
use forge_domain::{AgentKind, EnhancementKind, TriageKind};
use std::path::PathBuf;

/// CLI arguments for agent-forge
#[derive(Parser, Debug)]
#[command(name = "agent-forge")]
#[command(author, version, about = "Service-agent orchestration core")]
#[command(long_about = r#"
agent-forge keeps a registry of service agents, routes messages between
them, triages failures through three escalating handler tiers and applies
automatic enhancements behind safety and duplication gates.

Configuration files are loaded from (in priority order):
1. FORGE_* environment variables  (FORGE_TRIAGE__BACKOFF_SECS=1)
2. --config <path>                Explicit config file
3. ./forge.toml                   Project-level config
4. ~/.config/agent-forge/config.toml   Global config

Example:
  agent-forge run --agent ctl:autonomous --agent arch:architect
  agent-forge triage scraper --error "selector not found" --component parser
  agent-forge enhance optimization agent-7 cache-layer
"#)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long, global = true)]
    pub no_config: bool,

    /// Keep audit records in memory instead of the JSONL store
    #[arg(long, global = true)]
    pub no_store: bool,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR", global = true)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the background cycles until interrupted
    Run(AgentArgs),

    /// Route one failure through the triage tiers
    Triage(TriageArgs),

    /// Queue and apply one enhancement
    Enhance(EnhanceArgs),

    /// Summarize the audit store
    Status {
        /// Number of recent triage outcomes to show
        #[arg(long, default_value_t = 5)]
        recent: usize,
    },

    /// Show effective configuration
    Config {
        /// Only list configuration file locations
        #[arg(long)]
        sources: bool,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AgentArgs {
    /// Local agents as `id:kind` (can be specified multiple times)
    #[arg(
        long = "agent",
        value_name = "ID:KIND",
        value_parser = parse_agent,
        default_values = ["controller:autonomous", "architect:architect"]
    )]
    pub agents: Vec<(String, AgentKind)>,
}

#[derive(Args, Debug)]
pub struct TriageArgs {
    /// Component or agent that reported the failure
    pub source: String,

    /// Error message
    #[arg(short, long)]
    pub error: String,

    #[arg(long)]
    pub component: Option<String>,

    #[arg(long)]
    pub stack_trace: Option<String>,

    #[arg(long, default_value = "failure")]
    pub kind: TriageKind,

    #[arg(long, default_value_t = 1)]
    pub priority: u8,

    #[command(flatten)]
    pub agents: AgentArgs,
}

#[derive(Args, Debug)]
pub struct EnhanceArgs {
    /// component, model, file, dependency or optimization
    pub kind: EnhancementKind,

    /// Origin of the change
    pub source: String,

    /// What the change applies to
    pub target: String,

    #[arg(long, default_value_t = 1)]
    pub priority: u8,

    /// Only queue; leave processing to the next cycle
    #[arg(long)]
    pub queue_only: bool,
}

fn parse_agent(value: &str) -> Result<(String, AgentKind), String> {
    let (id, kind) = value
        .split_once(':')
        .ok_or_else(|| format!("expected ID:KIND, got '{}'", value))?;
    if id.trim().is_empty() {
        return Err("agent id cannot be empty".to_string());
    }
    Ok((id.trim().to_string(), kind.trim().parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agent() {
        assert_eq!(
            parse_agent("ctl:autonomous").unwrap(),
            ("ctl".to_string(), AgentKind::Autonomous)
        );
        assert!(parse_agent("ctl").is_err());
        assert!(parse_agent(":autonomous").is_err());
        assert!(parse_agent("ctl:wizard").is_err());
    }

    #[test]
    fn test_default_agents() {
        let cli = Cli::parse_from(["agent-forge", "triage", "scraper", "-e", "boom"]);
        let Command::Triage(args) = cli.command else {
            panic!("expected triage");
        };
        assert_eq!(args.agents.agents.len(), 2);
        assert_eq!(args.kind, TriageKind::Failure);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["agent-forge", "status", "-vv", "--no-store"]);
        assert_eq!(cli.verbose, 2);
        assert!(cli.no_store);
    }
}
