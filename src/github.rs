//! GitHub commit comment client.
//!
//! Minimal REST surface for the comment lifecycle: list, create, delete.
//! Any non-success status propagates as an error; there is no retry.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;
use tracing::info;

use crate::render::comment_header_prefix;

const GITHUB_API_BASE: &str = "https://api.github.com";
const PAGE_SIZE: usize = 100;

/// Login the CI workflow posts comments under.
pub const BOT_LOGIN: &str = "github-actions[bot]";

#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    base_url: String,
    repo: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitComment {
    pub id: u64,
    pub body: String,
    pub user: CommentAuthor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentAuthor {
    pub login: String,
}

#[derive(Serialize)]
struct NewComment<'a> {
    body: &'a str,
}

impl GithubClient {
    pub fn new(repo: &str, token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("backtest-ci-comments/", env!("CARGO_PKG_VERSION")))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    format!("Bearer {}", token)
                        .parse()
                        .context("Invalid GITHUB_TOKEN")?,
                );
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
                );
                headers.insert(
                    "X-GitHub-Api-Version",
                    reqwest::header::HeaderValue::from_static("2022-11-28"),
                );
                headers
            })
            .build()
            .context("Failed to build GithubClient")?;

        Ok(Self {
            client,
            base_url: GITHUB_API_BASE.to_string(),
            repo: repo.to_string(),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get_repo(&self) -> Result<Repository> {
        let url = self.url(&format!("/repos/{}", self.repo));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET /repos/{} failed", self.repo))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("GET /repos/{} {}: {}", self.repo, status, text));
        }

        resp.json::<Repository>()
            .await
            .context("Failed to parse repository response")
    }

    pub async fn get_commit(&self, sha: &str) -> Result<CommitInfo> {
        let url = self.url(&format!("/repos/{}/commits/{}", self.repo, sha));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET commit {} failed", sha))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("GET commit {} {}: {}", sha, status, text));
        }

        resp.json::<CommitInfo>()
            .await
            .context("Failed to parse commit response")
    }

    pub async fn list_commit_comments(&self, sha: &str) -> Result<Vec<CommitComment>> {
        let url = self.url(&format!("/repos/{}/commits/{}/comments", self.repo, sha));
        let mut comments = Vec::new();
        let mut page = 1u32;

        loop {
            let page_param = page.to_string();
            let per_page_param = PAGE_SIZE.to_string();
            let resp = self
                .client
                .get(&url)
                .query(&[("per_page", per_page_param.as_str()), ("page", page_param.as_str())])
                .send()
                .await
                .with_context(|| format!("GET comments for commit {} failed", sha))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                return Err(anyhow::anyhow!(
                    "GET comments for commit {} {}: {}",
                    sha,
                    status,
                    text
                ));
            }

            let batch: Vec<CommitComment> = resp
                .json()
                .await
                .context("Failed to parse comment list response")?;
            let last_page = batch.len() < PAGE_SIZE;
            comments.extend(batch);
            if last_page {
                break;
            }
            page += 1;
        }

        Ok(comments)
    }

    pub async fn create_commit_comment(&self, sha: &str, body: &str) -> Result<CommitComment> {
        let url = self.url(&format!("/repos/{}/commits/{}/comments", self.repo, sha));
        let resp = self
            .client
            .post(&url)
            .json(&NewComment { body })
            .send()
            .await
            .with_context(|| format!("POST comment on commit {} failed", sha))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "POST comment on commit {} {}: {}",
                sha,
                status,
                text
            ));
        }

        resp.json::<CommitComment>()
            .await
            .context("Failed to parse created comment response")
    }

    pub async fn delete_comment(&self, id: u64) -> Result<()> {
        let url = self.url(&format!("/repos/{}/comments/{}", self.repo, id));
        let resp = self
            .client
            .delete(&url)
            .send()
            .await
            .with_context(|| format!("DELETE comment {} failed", id))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("DELETE comment {} {}: {}", id, status, text));
        }

        Ok(())
    }
}

/// A comment qualifies for deletion when the bot wrote it, this run did not
/// just create it, and it starts with one of the known exchange headers.
pub fn is_stale_bot_comment(
    comment: &CommitComment,
    created_ids: &HashSet<u64>,
    header_prefixes: &[String],
) -> bool {
    comment.user.login == BOT_LOGIN
        && !created_ids.contains(&comment.id)
        && header_prefixes
            .iter()
            .any(|prefix| comment.body.starts_with(prefix.as_str()))
}

/// Delete bot comments from previous runs for the given exchanges, keeping
/// the comments created by this run and anything not written by the bot.
pub async fn delete_previous_comments(
    client: &GithubClient,
    sha: &str,
    created_ids: &HashSet<u64>,
    exchanges: &BTreeSet<String>,
) -> Result<()> {
    let header_prefixes: Vec<String> = exchanges
        .iter()
        .map(|exchange| comment_header_prefix(exchange))
        .collect();

    for comment in client.list_commit_comments(sha).await? {
        if is_stale_bot_comment(&comment, created_ids, &header_prefixes) {
            info!(comment_id = comment.id, "Deleting previous comment");
            client.delete_comment(comment.id).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: u64, login: &str, body: &str) -> CommitComment {
        CommitComment {
            id,
            body: body.to_string(),
            user: CommentAuthor {
                login: login.to_string(),
            },
        }
    }

    #[test]
    fn stale_bot_comment_matches_known_header() {
        let prefixes = vec!["## Binance".to_string()];
        let created: HashSet<u64> = [7].into_iter().collect();

        let stale = comment(3, BOT_LOGIN, "## Binance (spot) - 20240101-20240201");
        assert!(is_stale_bot_comment(&stale, &created, &prefixes));
    }

    #[test]
    fn freshly_created_comments_survive() {
        let prefixes = vec!["## Binance".to_string()];
        let created: HashSet<u64> = [7].into_iter().collect();

        let fresh = comment(7, BOT_LOGIN, "## Binance (spot) - 20240101-20240201");
        assert!(!is_stale_bot_comment(&fresh, &created, &prefixes));
    }

    #[test]
    fn non_bot_and_unrelated_comments_survive() {
        let prefixes = vec!["## Binance".to_string()];
        let created = HashSet::new();

        let human = comment(1, "some-user", "## Binance (spot) - 20240101-20240201");
        assert!(!is_stale_bot_comment(&human, &created, &prefixes));

        let unrelated = comment(2, BOT_LOGIN, "## Kraken (spot) - 20240101-20240201");
        assert!(!is_stale_bot_comment(&unrelated, &created, &prefixes));

        let prose = comment(3, BOT_LOGIN, "A status update, not a results table");
        assert!(!is_stale_bot_comment(&prose, &created, &prefixes));
    }
}
