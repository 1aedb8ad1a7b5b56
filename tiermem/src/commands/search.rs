//! Search command.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use tiermem_sdk::utils::format_datetime;
use tiermem_sdk::{Criterion, MemorySystem, MemoryTier, Query, SearchResult, TierSelection};

use super::{parse_payload, render, truncate};

/// How the tiers are scanned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Sequential,
    Parallel,
    Stream,
}

/// Search parameters collected from the command line
#[derive(Debug)]
pub struct SearchArgs {
    pub text: Option<String>,
    pub pattern: bool,
    pub fields: Vec<(String, String)>,
    pub tiers: Vec<MemoryTier>,
    pub limit: Option<usize>,
    pub min_score: Option<f64>,
    pub mode: SearchMode,
}

/// Run a search and print the hits.
pub async fn execute(memory: &MemorySystem, args: SearchArgs) -> Result<()> {
    let query = build_query(&args)?;
    let tiers = TierSelection::from(args.tiers);

    match args.mode {
        SearchMode::Sequential => {
            let results = memory
                .search(&query, tiers, args.limit)
                .await
                .context("Search failed")?;
            print_results(&results);
        }
        SearchMode::Parallel => {
            let results = memory
                .parallel_search(&query, tiers, args.limit, args.min_score)
                .await
                .context("Parallel search failed")?;
            print_results(&results);
        }
        SearchMode::Stream => {
            let limit = args.limit.unwrap_or(memory.config().search.default_limit);
            let mut shown = 0usize;
            let delivered = memory
                .search_with_callback(
                    &query,
                    |result: SearchResult| -> anyhow::Result<()> {
                        if shown < limit {
                            print_result(&result);
                            shown += 1;
                        }
                        Ok(())
                    },
                    tiers,
                    args.min_score,
                )
                .await
                .context("Streaming search failed")?;
            println!();
            println!("{} {} matches streamed", "→".cyan(), delivered);
        }
    }

    Ok(())
}

/// Structured criteria win over text; text is a regex with `--pattern`.
fn build_query(args: &SearchArgs) -> Result<Query> {
    if !args.fields.is_empty() {
        let criteria = args
            .fields
            .iter()
            .map(|(field, raw)| Ok((field.clone(), Criterion::Equals(parse_payload(raw)?))))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Query::structured(criteria));
    }

    let Some(text) = args.text.as_deref() else {
        bail!("Provide search text or at least one --field KEY=VALUE");
    };
    if args.pattern {
        Query::pattern(text).with_context(|| format!("Invalid pattern: {}", text))
    } else {
        Ok(Query::text(text))
    }
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("{}", "No matches".yellow());
        return;
    }

    println!("{}", format!("{} matches", results.len()).bold());
    println!();
    for result in results {
        print_result(result);
    }
}

fn print_result(result: &SearchResult) {
    println!(
        "  {} {} {}",
        format!("{:.2}", result.score).green(),
        format!("[{}]", result.tier).cyan(),
        result.key.bold()
    );
    println!("     {}", format_datetime(&result.timestamp).dimmed());
    println!("     {}", truncate(&render(&result.payload), 120));
}
