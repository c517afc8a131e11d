/// Static reference data: the TLD list and the internal-page alias table
use crate::domain::normalize_domain;
use serde::Deserialize;
use std::collections::HashSet;

const BUILTIN_TLDS: &str = include_str!("../assets/data/domain.txt");
const BUILTIN_ALIASES: &str = include_str!("../assets/data/aliases.json");

/// Known top-level domains, stored lowercase
#[derive(Debug, Clone, Default)]
pub struct TldList {
    entries: HashSet<String>,
}

impl TldList {
    /// Parse one TLD per line; blank lines and `//` comments are skipped
    pub fn parse(text: &str) -> TldList {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("//"))
            .map(|line| line.trim_start_matches('.').to_lowercase())
            .collect();

        TldList { entries }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains(&label.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Alias {
    pub domain: String,
    pub name: String,
}

/// Human labels for internal browser pages, matched by longest prefix
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    // Longest prefix first
    entries: Vec<Alias>,
}

impl AliasTable {
    pub fn new(aliases: Vec<Alias>) -> AliasTable {
        let mut entries: Vec<Alias> = aliases
            .into_iter()
            .map(|alias| Alias {
                domain: normalize_domain(&alias.domain),
                name: alias.name,
            })
            .filter(|alias| !alias.domain.is_empty())
            .collect();
        entries.sort_by(|a, b| b.domain.len().cmp(&a.domain.len()));

        AliasTable { entries }
    }

    pub fn from_json(json: &str) -> Result<AliasTable, serde_json::Error> {
        let aliases: Vec<Alias> = serde_json::from_str(json)?;
        Ok(AliasTable::new(aliases))
    }

    /// Find the label for `target` (`scheme://host[/path]`).
    ///
    /// An entry matches when it equals the target or is a prefix of it that
    /// ends on a path boundary, so `chrome://settings` matches
    /// `chrome://settings/privacy` but not `chrome://settingsfoo`.
    pub fn lookup(&self, target: &str) -> Option<&str> {
        let target = target.trim_end_matches('/');
        self.entries
            .iter()
            .find(|alias| match target.strip_prefix(alias.domain.as_str()) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            })
            .map(|alias| alias.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reference data the classifier reads alongside the configuration snapshot
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub tlds: TldList,
    pub aliases: AliasTable,
}

impl ReferenceData {
    /// Parse fetched copies of the TLD list and alias table
    pub fn from_sources(tld_text: &str, aliases_json: &str) -> Result<ReferenceData, serde_json::Error> {
        Ok(ReferenceData {
            tlds: TldList::parse(tld_text),
            aliases: AliasTable::from_json(aliases_json)?,
        })
    }

    /// The lists bundled with the crate
    pub fn builtin() -> ReferenceData {
        let aliases = AliasTable::from_json(BUILTIN_ALIASES).unwrap_or_else(|e| {
            log::error!("Bundled alias table is invalid: {}", e);
            AliasTable::default()
        });

        ReferenceData {
            tlds: TldList::parse(BUILTIN_TLDS),
            aliases,
        }
    }
}
