//! Protocol catalog shim.
//!
//! The catalog is a markdown file carrying one fenced ```csv block whose
//! first column is the protocol name and third column its GitHub
//! repository. Everything outside the block is ignored.

use std::path::Path;

use release_reviewer::feed::RepoRef;

/// One catalog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub protocol: String,
    pub github_repo: String,
}

impl CatalogEntry {
    pub fn repo_ref(&self) -> Option<RepoRef> {
        RepoRef::parse(&self.github_repo)
    }
}

/// Loads all catalog rows; a missing csv block yields an empty list.
pub fn load_catalog(path: &Path) -> std::io::Result<Vec<CatalogEntry>> {
    let markdown = std::fs::read_to_string(path)?;
    Ok(parse_catalog(&markdown))
}

/// Finds one protocol by exact name.
pub fn find_protocol(path: &Path, protocol: &str) -> std::io::Result<Option<CatalogEntry>> {
    Ok(load_catalog(path)?
        .into_iter()
        .find(|entry| entry.protocol == protocol))
}

pub fn parse_catalog(markdown: &str) -> Vec<CatalogEntry> {
    let Some(block) = csv_block(markdown) else {
        return Vec::new();
    };

    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .skip(1) // header row
        .filter_map(|line| {
            let row = parse_csv_line(line);
            let protocol = row.first().cloned().unwrap_or_default();
            let github_repo = row.get(2).cloned().unwrap_or_default();
            (!protocol.is_empty()).then_some(CatalogEntry {
                protocol,
                github_repo,
            })
        })
        .collect()
}

fn csv_block(markdown: &str) -> Option<&str> {
    let start = markdown.find("```csv")? + "```csv".len();
    let rest = &markdown[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}

/// Minimal csv split with double-quote awareness; quotes delimit fields
/// and are not part of the value.
fn parse_csv_line(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    for ch in line.chars() {
        match ch {
            '"' => in_quote = !in_quote,
            ',' if !in_quote => {
                out.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    out.push(current.trim().to_string());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = "# Tracked protocols\n\n\
```csv\n\
protocol,network,github\n\
ethereum,mainnet,https://github.com/ethereum/go-ethereum\n\
\"op, mainnet\",mainnet,ethereum-optimism/optimism\n\
,mainnet,skipped/row\n\
```\n";

    #[test]
    fn parses_rows_after_the_header() {
        let entries = parse_catalog(LIST);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].protocol, "ethereum");
        assert_eq!(
            entries[0].github_repo,
            "https://github.com/ethereum/go-ethereum"
        );
        assert_eq!(entries[1].protocol, "op, mainnet");
        assert_eq!(entries[1].github_repo, "ethereum-optimism/optimism");
    }

    #[test]
    fn rows_resolve_to_repo_refs() {
        let entries = parse_catalog(LIST);
        let r = entries[0].repo_ref().unwrap();
        assert_eq!(r.owner, "ethereum");
        assert_eq!(r.repo, "go-ethereum");
    }

    #[test]
    fn missing_csv_block_yields_empty_catalog() {
        assert!(parse_catalog("# nothing fenced here").is_empty());
        assert!(parse_catalog("```csv\nheader\n").is_empty());
    }

    #[test]
    fn find_protocol_matches_exact_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.md");
        std::fs::write(&path, LIST).unwrap();

        let found = find_protocol(&path, "ethereum").unwrap().unwrap();
        assert_eq!(found.protocol, "ethereum");
        assert!(find_protocol(&path, "unknown").unwrap().is_none());
    }
}
