//! Backtest CI Results Commenter CLI
//!
//! Aggregates the per-exchange backtest result files a CI run extracted under
//! PATH and posts one Markdown comment per exchange/timerange on the commit
//! named by `GITHUB_SHA`, then deletes stale bot comments from earlier runs.
//!
//! # Usage
//!
//! ```bash
//! GITHUB_TOKEN=... GITHUB_SHA=... comment-ci-results --repo owner/repo ./artifacts
//! ```
//!
//! Exits 0 on success, 1 on any validation failure or API error.

use anyhow::{bail, Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::collections::{BTreeSet, HashSet};
use std::env;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backtest_ci_comments::github::{delete_previous_comments, GithubClient};
use backtest_ci_comments::manifest::load_manifest;
use backtest_ci_comments::render::render_section;
use backtest_ci_comments::results::merge_reports;

#[derive(Parser, Debug)]
#[command(name = "comment-ci-results")]
#[command(about = "Post aggregated backtest CI results as commit comments")]
struct Cli {
    /// The Organization Repository (OWNER/REPO)
    #[arg(long)]
    repo: String,

    /// Path where artifacts are extracted
    #[arg(value_name = "PATH")]
    path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let token = match env::var("GITHUB_TOKEN") {
        Ok(token) if !token.is_empty() => token,
        _ => bail!("GITHUB_TOKEN environment variable not set"),
    };

    if !cli.path.is_dir() {
        bail!(
            "The directory where artifacts should have been extracted, {}, does not exist",
            cli.path.display()
        );
    }

    let manifest_path = cli.path.join("reports-info.json");
    if !manifest_path.exists() {
        bail!("The {} file does not exist", manifest_path.display());
    }

    let manifest = load_manifest(&manifest_path)?;
    let merged = merge_reports(&manifest, &cli.path)?;
    debug!("Merged results: {:#?}", merged);

    let sha = env::var("GITHUB_SHA").context("GITHUB_SHA environment variable not set")?;

    let client = GithubClient::new(&cli.repo, &token)?;
    let repo = client.get_repo().await?;
    info!("Loaded repository: {}", repo.full_name);
    let commit = client.get_commit(&sha).await?;
    info!("Loaded commit: {}", commit.sha);

    let mut exchanges: BTreeSet<String> = BTreeSet::new();
    let mut created_ids: HashSet<u64> = HashSet::new();

    for (exchange, results) in &merged {
        exchanges.insert(exchange.clone());
        for timerange in results.timeranges.keys() {
            let body = render_section(&cli.repo, &cli.path, exchange, results, timerange);
            let comment = client.create_commit_comment(&commit.sha, &body).await?;
            info!(
                comment_id = comment.id,
                exchange = exchange.as_str(),
                timerange = timerange.as_str(),
                "Created comment"
            );
            created_ids.insert(comment.id);
        }
    }

    delete_previous_comments(&client, &commit.sha, &created_ids, &exchanges).await?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backtest_ci_comments=info,comment_ci_results=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
