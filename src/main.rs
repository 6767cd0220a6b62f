//! Command-line entry point.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use gitscout::config::{KeywordTiers, SearchConfig};
use gitscout::github::{GitHubClient, SearchTransport};
use gitscout::observability::{init_logging, Verbosity};
use gitscout::pipeline::{self, CommentsMode, RunOptions};
use gitscout::report::{format_full_json, format_full_report, ReportOptions};
use gitscout::search::{normalize_query, IssueCollector};
use gitscout::Result;

#[derive(Parser, Debug)]
#[command(
    name = "gitscout",
    version,
    about = "Search a GitHub repository for issues, PRs, code, commits, and discussions related to a topic"
)]
struct Cli {
    /// JSON config file; CLI flags override its filters
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Repository in owner/name form
    #[arg(long)]
    repo: Option<String>,

    /// Component or subsystem name scoping the queries
    #[arg(long)]
    component: Option<String>,

    /// Topic being investigated
    #[arg(long)]
    topic: Option<String>,

    /// Content types to search: issues prs code commits discussions
    #[arg(long = "search-types", num_args = 1.., value_name = "TYPE")]
    search_types: Vec<String>,

    /// Filter issues and PRs by state
    #[arg(long, value_parser = ["open", "closed"])]
    state: Option<String>,

    /// Only results created on or after this date (YYYY-MM-DD)
    #[arg(long = "date-from", value_name = "DATE")]
    date_from: Option<String>,

    /// Only results created on or before this date (YYYY-MM-DD)
    #[arg(long = "date-to", value_name = "DATE")]
    date_to: Option<String>,

    /// High-tier keywords (ignored when --config is given)
    #[arg(long, num_args = 1..)]
    keywords: Vec<String>,

    /// Explicit query templates (skips auto-building)
    #[arg(long, num_args = 1..)]
    queries: Vec<String>,

    /// Force comment search on (default: auto when a token is present)
    #[arg(long = "search-comments")]
    search_comments: bool,

    /// Disable comment search even with a token
    #[arg(long = "no-comments", conflicts_with = "search_comments")]
    no_comments: bool,

    /// Lower score bound for borderline comment fetching
    #[arg(long = "comments-low", default_value_t = 3.0)]
    comments_low: f64,

    /// Upper score bound for borderline comment fetching
    #[arg(long = "comments-high", default_value_t = 8.0)]
    comments_high: f64,

    /// Detail-fetch worker count (0 = auto)
    #[arg(long, default_value_t = 0)]
    concurrency: usize,

    /// Cache file for incremental searches
    #[arg(long = "cache-file")]
    cache_file: Option<PathBuf>,

    /// Restore previous results from the cache before searching
    #[arg(long)]
    resume: bool,

    /// Minimum relevance score for report inclusion
    #[arg(long = "min-score", default_value_t = 3.0)]
    min_score: f64,

    /// Max component-only rows shown per section
    #[arg(long = "max-component", default_value_t = 10)]
    max_component: usize,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Export scored results as JSON for external review
    #[arg(long = "intermediate-json", value_name = "FILE")]
    intermediate_json: Option<PathBuf>,

    /// Apply reviewed score overrides from this JSON file
    #[arg(long = "score-overrides", value_name = "FILE")]
    score_overrides: Option<PathBuf>,

    /// Extra query templates appended to the config's list
    #[arg(long = "append-queries", num_args = 1..)]
    append_queries: Vec<String>,

    /// Emit the report as JSON instead of Markdown
    #[arg(long)]
    json: bool,

    /// Preview the queries without searching
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Run search types sequentially
    #[arg(long = "no-parallel")]
    no_parallel: bool,

    /// Max result pages per query
    #[arg(long = "max-pages", default_value_t = 3)]
    max_pages: u32,

    /// Debug-level output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Warnings and errors only
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn verbosity(&self) -> Verbosity {
        if self.verbose {
            Verbosity::Verbose
        } else if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }

    fn comments_mode(&self) -> CommentsMode {
        if self.no_comments {
            CommentsMode::Disabled
        } else if self.search_comments {
            CommentsMode::Forced
        } else {
            CommentsMode::Auto
        }
    }
}

fn build_config(cli: &Cli) -> Result<SearchConfig> {
    let mut config = match &cli.config {
        Some(path) => SearchConfig::load(path)?,
        None => {
            let mut config = SearchConfig::default();
            if !cli.keywords.is_empty() {
                config.keywords = KeywordTiers::new(cli.keywords.clone(), vec![], vec![]);
            }
            if !cli.queries.is_empty() {
                config.queries = cli.queries.clone();
            }
            config
        }
    };

    if let Some(repo) = &cli.repo {
        config.repo = repo.clone();
    }
    if let Some(component) = &cli.component {
        config.component = component.clone();
    }
    if let Some(topic) = &cli.topic {
        config.topic = topic.clone();
    }
    if let Some(state) = &cli.state {
        config.filters.state = state.clone();
    }
    if let Some(date) = &cli.date_from {
        config.filters.date_from = date.clone();
    }
    if let Some(date) = &cli.date_to {
        config.filters.date_to = date.clone();
    }
    if !cli.search_types.is_empty() {
        config.search_types = cli.search_types.clone();
    }
    config.max_pages = cli.max_pages;

    if !cli.append_queries.is_empty() {
        config.queries.extend(cli.append_queries.iter().cloned());
        println!(
            "appended {} queries ({} total)",
            cli.append_queries.len(),
            config.queries.len()
        );
    }
    Ok(config)
}

fn print_dry_run(config: &SearchConfig) {
    let rule = "=".repeat(60);
    println!("\n{rule}");
    println!(" DRY-RUN preview (no searches executed)");
    println!("{rule}");
    println!(" repo:      {}", config.repo);
    println!(
        " component: {}",
        if config.has_component() { &config.component } else { "(any)" }
    );
    println!(" topic:     {}", config.topic);
    println!(
        " state:     {}",
        if config.filters.state.is_empty() { "all" } else { &config.filters.state }
    );
    if !config.filters.date_from.is_empty() || !config.filters.date_to.is_empty() {
        let from = if config.filters.date_from.is_empty() { "..." } else { &config.filters.date_from };
        let to = if config.filters.date_to.is_empty() { "..." } else { &config.filters.date_to };
        println!(" dates:     {from} ~ {to}");
    }
    if !config.exclude_issues.is_empty() {
        println!(" exclude:   {:?}", config.exclude_issues);
    }

    println!(
        "\n keywords ({}H + {}M + {}L):",
        config.keywords.high().len(),
        config.keywords.medium().len(),
        config.keywords.low().len()
    );
    if !config.keywords.high().is_empty() {
        println!("   high:   {}", config.keywords.high().join(", "));
    }
    if !config.keywords.medium().is_empty() {
        println!("   medium: {}", config.keywords.medium().join(", "));
    }
    if !config.keywords.low().is_empty() {
        println!("   low:    {}", config.keywords.low().join(", "));
    }

    println!("\n queries to send ({}):", config.queries.len());
    let mut seen = HashSet::new();
    for (i, template) in config.queries.iter().enumerate() {
        let query = IssueCollector::build_query(template, config);
        let full = format!("repo:{} is:issue {query}", config.repo);
        let dup = if seen.insert(normalize_query(&full)) {
            ""
        } else {
            " (duplicate)"
        };
        println!("   [{}] {full}{dup}", i + 1);
    }
    println!("\n{rule}");
    println!(" Re-run without --dry-run to execute the search");
    println!("{rule}");
}

fn print_token_hint() {
    eprintln!("{}", style("note: GITHUB_TOKEN is not set").yellow());
    eprintln!("  unauthenticated limits: 10 searches/min, 60 REST calls/hour");
    eprintln!("  with a token:           30 searches/min, 5000 REST calls/hour");
    eprintln!("  generate one (no scopes needed): https://github.com/settings/tokens");
    eprintln!();
}

/// Default cache location when `--resume` is given without `--cache-file`.
fn resolve_cache_file(cli: &Cli) -> Option<PathBuf> {
    if let Some(path) = &cli.cache_file {
        return Some(path.clone());
    }
    if !cli.resume {
        return None;
    }
    let dirs = directories::ProjectDirs::from("", "", "gitscout")?;
    std::fs::create_dir_all(dirs.cache_dir()).ok()?;
    Some(dirs.cache_dir().join("results.json"))
}

async fn run_cli(cli: Cli) -> Result<()> {
    let mut config = build_config(&cli)?;
    let prep = pipeline::prepare(&mut config)?;
    if prep.seed_added > 0 {
        println!(
            "seed synonyms contributed {} keywords (H={}, M={}, L={})",
            prep.seed_added,
            config.keywords.high().len(),
            config.keywords.medium().len(),
            config.keywords.low().len()
        );
    }
    if prep.queries_built > 0 {
        println!(
            "auto-built {} queries from {} keywords",
            prep.queries_built,
            config.keywords.total()
        );
    }

    if cli.dry_run {
        print_dry_run(&config);
        return Ok(());
    }

    let api: Arc<dyn SearchTransport> = Arc::new(GitHubClient::new(None));
    if !api.has_token() {
        print_token_hint();
    }

    let cache_file = resolve_cache_file(&cli);
    let opts = RunOptions {
        comments: cli.comments_mode(),
        comments_low: cli.comments_low,
        comments_high: cli.comments_high,
        concurrency: cli.concurrency,
        cache_file: cache_file.clone(),
        resume: cli.resume,
        no_parallel: cli.no_parallel,
        ..Default::default()
    };

    let spinner = if cli.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner().with_style(ProgressStyle::default_spinner());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    };
    spinner.set_message(format!("searching {}", config.repo));

    let mut outcome = pipeline::run(api, config.clone(), opts).await?;
    spinner.finish_and_clear();

    if let Some(path) = &cli.intermediate_json {
        pipeline::write_intermediate_json(&outcome.results, &config, cli.min_score, path)?;
    }
    if let Some(path) = &cli.score_overrides {
        pipeline::apply_score_overrides(&mut outcome.results, path)?;
    }

    let report_opts = ReportOptions::new(cli.min_score, outcome.searched_comments, cli.max_component);
    let report = if cli.json {
        format_full_json(&config, &outcome.results, &report_opts)
    } else {
        format_full_report(&config, &outcome.results, outcome.xref.as_ref(), &report_opts)
    };

    match &cli.output {
        Some(path) => {
            std::fs::write(path, &report)?;
            println!("\nreport written to {}", path.display());
        }
        None => println!("\n{report}"),
    }

    let rule = "=".repeat(60);
    println!("\n{rule}");
    println!(" {}", style("Search complete").green().bold());
    if outcome.resumed {
        println!("   mode: incremental (resumed from cache)");
    }
    for summary in pipeline::summarize(&outcome.results, &config, cli.min_score) {
        if summary.is_code {
            println!(
                "   {}: searched {} files, relevant {}",
                summary.label, summary.total, summary.relevant
            );
        } else {
            println!(
                "   {}: searched {}, relevant {}, highly relevant {}",
                summary.label, summary.total, summary.relevant, summary.highly_relevant
            );
        }
    }
    if outcome.searched_comments && outcome.results.issues.is_some() {
        println!(
            "   discovered via comments: {}",
            pipeline::comments_discovered(&outcome.results, &config, cli.min_score)
        );
    }
    if let Some(path) = &cache_file {
        println!("   cache saved: {}", path.display());
    }
    println!("{rule}");
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity());
    if let Err(err) = run_cli(cli).await {
        eprintln!("{} {err}", style("error:").red().bold());
        std::process::exit(1);
    }
}
