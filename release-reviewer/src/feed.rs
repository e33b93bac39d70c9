//! Release feed reader: fetches and parses a repository's public Atom
//! release feed into ordered entries (newest first).

use roxmltree::Document;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::FeedError;

const FEED_USER_AGENT: &str = "relpulse-release-review/1.0";

/// Parsed `owner/repo` reference supplied by the catalog collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    /// Accepts `owner/repo` or a full `https://github.com/owner/repo` URL.
    pub fn parse(value: &str) -> Option<Self> {
        let text = value.trim();
        let text = text
            .strip_prefix("https://github.com/")
            .or_else(|| text.strip_prefix("http://github.com/"))
            .unwrap_or(text)
            .trim_end_matches('/');

        let (owner, repo) = text.split_once('/')?;
        if owner.is_empty()
            || repo.is_empty()
            || repo.contains('/')
            || repo.contains(|c: char| c.is_whitespace() || c == '?' || c == '#')
        {
            return None;
        }
        Some(RepoRef {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    pub fn remote_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.repo)
    }

    pub fn feed_url(&self) -> String {
        format!("https://github.com/{}/{}/releases.atom", self.owner, self.repo)
    }

    /// Filesystem-safe clone directory name.
    pub fn folder_name(&self) -> String {
        format!("{}__{}", self.owner, self.repo)
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

/// One item from the repository's release feed. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseEntry {
    pub id: String,
    pub title: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: Option<String>,
    pub link: Option<String>,
}

impl ReleaseEntry {
    /// Release identity: id, falling back to title when id is absent.
    pub fn identity(&self) -> &str {
        if self.id.is_empty() { &self.title } else { &self.id }
    }
}

/// Fetches up to `limit` entries from the repository's releases feed.
///
/// Feed order is preserved (newest first). Any HTTP, network, or XML
/// failure maps to [`FeedError`]; callers treat this as a hard stop.
pub async fn fetch_release_entries(
    http: &reqwest::Client,
    repo: &RepoRef,
    limit: usize,
) -> Result<Vec<ReleaseEntry>, FeedError> {
    let url = repo.feed_url();
    debug!(%url, limit, "fetching release feed");

    let resp = http
        .get(&url)
        .header(reqwest::header::USER_AGENT, FEED_USER_AGENT)
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(FeedError::HttpStatus(resp.status().as_u16()));
    }
    let xml = resp.text().await?;

    let mut entries = parse_feed(&xml)?;
    entries.truncate(limit);
    Ok(entries)
}

/// The newest entry, or `None` when the feed is empty.
pub async fn fetch_latest_entry(
    http: &reqwest::Client,
    repo: &RepoRef,
) -> Result<Option<ReleaseEntry>, FeedError> {
    Ok(fetch_release_entries(http, repo, 1).await?.into_iter().next())
}

/// Parses an Atom document into release entries.
pub fn parse_feed(xml: &str) -> Result<Vec<ReleaseEntry>, FeedError> {
    let doc = Document::parse(xml).map_err(|e| FeedError::Parse(e.to_string()))?;

    let mut out = Vec::new();
    for entry in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "entry")
    {
        let mut id = String::new();
        let mut title = String::new();
        let mut updated = String::new();
        let mut link = String::new();

        for child in entry.children().filter(|n| n.is_element()) {
            match child.tag_name().name() {
                "id" => id = collect_text(&child),
                "title" => title = collect_text(&child),
                "updated" => updated = collect_text(&child),
                "link" => {
                    if link.is_empty() {
                        link = child.attribute("href").unwrap_or("").trim().to_string();
                    }
                }
                _ => {}
            }
        }

        let id = first_non_empty(&[&id, &title, &updated]).unwrap_or("unknown");
        let title = if title.is_empty() { "Untitled" } else { &title };
        out.push(ReleaseEntry {
            id: id.to_string(),
            title: title.to_string(),
            updated_at: (!updated.is_empty()).then(|| updated.clone()),
            link: (!link.is_empty()).then(|| link.clone()),
        });
    }
    Ok(out)
}

/// Text content of an element with nested markup flattened. Only text
/// nodes are read; element nodes also expose their first text child via
/// `text()`, which would duplicate every value.
fn collect_text(node: &roxmltree::Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn first_non_empty<'a>(candidates: &[&'a str]) -> Option<&'a str> {
    candidates.iter().copied().find(|s| !s.is_empty())
}
