//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};
use tiermem_sdk::MemoryTier;

/// Tiered memory store CLI
///
/// Short-term, working and long-term memory on the local filesystem.
#[derive(Parser, Debug)]
#[command(name = "tiermem")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a JSON payload under a key
    Store {
        /// Tier (short, working, long)
        #[arg(value_parser = parse_tier)]
        tier: MemoryTier,
        /// Item key
        key: String,
        /// Payload as JSON; bare words are stored as strings
        payload: String,
        /// Session id (required for working memory)
        #[arg(short, long)]
        session: Option<String>,
        /// Long-term item type
        #[arg(short = 't', long = "type")]
        item_type: Option<String>,
        /// Wrap the payload in a compression envelope
        #[arg(short, long)]
        compress: bool,
    },

    /// Print the payload stored under a key
    Get {
        /// Tier (short, working, long)
        #[arg(value_parser = parse_tier)]
        tier: MemoryTier,
        /// Item key
        key: String,
        /// Unwrap a compression envelope
        #[arg(short, long)]
        compressed: bool,
    },

    /// Search across tiers
    Search {
        /// Text to match (a regex with --pattern)
        text: Option<String>,
        /// Treat TEXT as a regular expression
        #[arg(short, long)]
        pattern: bool,
        /// Structured criterion (repeatable); overrides TEXT
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        /// Restrict to these tiers (repeatable, default all)
        #[arg(long = "tier", value_parser = parse_tier)]
        tiers: Vec<MemoryTier>,
        /// Maximum results
        #[arg(short, long)]
        limit: Option<usize>,
        /// Minimum score (parallel and stream modes)
        #[arg(short, long)]
        min_score: Option<f64>,
        /// Scan tiers concurrently
        #[arg(long, conflicts_with = "stream")]
        parallel: bool,
        /// Print results as each tier produces them
        #[arg(long)]
        stream: bool,
    },

    /// Delete an item
    Remove {
        /// Tier (short, working, long)
        #[arg(value_parser = parse_tier)]
        tier: MemoryTier,
        /// Item key
        key: String,
    },

    /// Deduplicate short-term, merge working sessions, rebuild the index
    Optimize,

    /// Evict expired short-term and working items
    Sweep,

    /// Rebuild the long-term index
    Reindex,

    /// Show item counts per tier
    Stats {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Run the maintenance loop until Ctrl-C
    Daemon,

    /// Show version
    Version,
}

/// Parse tier string to its tier
pub fn parse_tier(tier: &str) -> Result<MemoryTier, String> {
    match tier {
        "short" | "short_term" | "s" => Ok(MemoryTier::ShortTerm),
        "working" | "work" | "w" => Ok(MemoryTier::Working),
        "long" | "long_term" | "l" => Ok(MemoryTier::LongTerm),
        other => Err(format!("invalid tier: {}. Use: short, working, or long", other)),
    }
}

fn parse_field(field: &str) -> Result<(String, String), String> {
    match field.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {}", field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tier_aliases() {
        assert_eq!(parse_tier("s"), Ok(MemoryTier::ShortTerm));
        assert_eq!(parse_tier("working"), Ok(MemoryTier::Working));
        assert_eq!(parse_tier("long_term"), Ok(MemoryTier::LongTerm));
        assert!(parse_tier("medium").is_err());
    }

    #[test]
    fn test_search_args() {
        let cli = Cli::try_parse_from([
            "tiermem", "search", "--field", "status=open", "--field", "priority=2", "--tier", "long",
            "--parallel",
        ])
        .unwrap();

        match cli.command {
            Commands::Search {
                text,
                fields,
                tiers,
                parallel,
                stream,
                ..
            } => {
                assert_eq!(text, None);
                assert_eq!(
                    fields,
                    vec![
                        ("status".to_string(), "open".to_string()),
                        ("priority".to_string(), "2".to_string())
                    ]
                );
                assert_eq!(tiers, vec![MemoryTier::LongTerm]);
                assert!(parallel);
                assert!(!stream);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parallel_conflicts_with_stream() {
        assert!(Cli::try_parse_from(["tiermem", "search", "x", "--parallel", "--stream"]).is_err());
        assert!(Cli::try_parse_from(["tiermem", "search", "--field", "novalue"]).is_err());
    }
}
