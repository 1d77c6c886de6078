//! Name to URL link file and fuzzy name search, the usual source of URLs fed to the lookup

use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Load a JSON object of `name -> url`
///
/// A missing or unreadable file is reported once and yields no links; it
/// never stops the caller.
pub fn load_links(path: &Path) -> BTreeMap<String, String> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            warn!("Links file {} could not be read: {}", path.display(), e);
            return BTreeMap::new();
        }
    };

    match serde_json::from_str::<BTreeMap<String, String>>(&contents) {
        Ok(links) => links,
        Err(e) => {
            warn!("Links file {} is not valid JSON: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}

/// Case-insensitive subsequence match: every character of `search` appears in
/// `name` in order, not necessarily adjacent
pub fn fuzz_match(search: &str, name: &str) -> bool {
    let name = name.to_lowercase();
    let mut remaining = name.chars();
    search
        .to_lowercase()
        .chars()
        .all(|wanted| remaining.any(|c| c == wanted))
}

/// Links whose name fuzzy-matches `query`, in name order
pub fn matching_links<'a>(
    links: &'a BTreeMap<String, String>,
    query: &'a str,
) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
    links
        .iter()
        .filter(move |(name, _)| fuzz_match(query, name))
        .map(|(name, url)| (name.as_str(), url.as_str()))
}
