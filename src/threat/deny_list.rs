use async_trait::async_trait;
use std::collections::HashMap;

use crate::config::ThreatIntelConfig;
use crate::wallet::types::normalize_address;

use super::ThreatIntel;

/// One deny-listed address.
#[derive(Debug, Clone, PartialEq)]
pub struct DenyListEntry {
    pub address: String,
    pub label: String,
    pub source: String,
}

/// In-memory deny-list keyed by lower-case address.
#[derive(Debug, Default)]
pub struct DenyList {
    by_address: HashMap<String, DenyListEntry>,
}

impl DenyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the configured CSV file and inline addresses.
    pub fn load(config: &ThreatIntelConfig) -> eyre::Result<Self> {
        let mut list = Self::new();

        if let Some(path) = &config.deny_list_path {
            for entry in parse_deny_list_csv(path)? {
                list.by_address.insert(entry.address.clone(), entry);
            }
        }

        for raw in &config.addresses {
            match normalize_address(raw) {
                Ok(address) => list.insert(&address, "configured", "config"),
                Err(e) => {
                    tracing::warn!(address = %raw, error = %e, "Invalid deny-list address in config, skipping");
                }
            }
        }

        tracing::info!(addresses = list.len(), "Loaded threat deny-list");
        Ok(list)
    }

    pub fn insert(&mut self, address: &str, label: &str, source: &str) {
        let address = address.to_ascii_lowercase();
        self.by_address.insert(
            address.clone(),
            DenyListEntry {
                address,
                label: label.to_string(),
                source: source.to_string(),
            },
        );
    }

    pub fn lookup(&self, address: &str) -> Option<&DenyListEntry> {
        self.by_address.get(&address.to_ascii_lowercase())
    }

    pub fn contains(&self, address: &str) -> bool {
        self.lookup(address).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

#[async_trait]
impl ThreatIntel for DenyList {
    async fn is_known_malicious(&self, address: &str) -> eyre::Result<bool> {
        Ok(self.contains(address))
    }
}

/// Parse a deny-list CSV. Expected columns: address, label, source (the last two optional).
/// Rows with invalid addresses are skipped.
pub fn parse_deny_list_csv(path: &str) -> eyre::Result<Vec<DenyListEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| eyre::eyre!("Failed to open deny-list CSV '{}': {}", path, e))?;

    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for result in reader.records() {
        let record = result?;
        let raw_address = record.get(0).unwrap_or("").trim();

        let address = match normalize_address(raw_address) {
            Ok(a) => a,
            Err(_) => {
                skipped += 1;
                continue;
            }
        };

        let label = record.get(1).map(str::trim).filter(|s| !s.is_empty()).unwrap_or("malicious");
        let source = record.get(2).map(str::trim).filter(|s| !s.is_empty()).unwrap_or("deny_list");

        entries.push(DenyListEntry {
            address,
            label: label.to_string(),
            source: source.to_string(),
        });
    }

    if skipped > 0 {
        tracing::warn!(path, skipped, "Skipped deny-list rows with invalid addresses");
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_csv_normalizes_and_skips_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "address,label,source").unwrap();
        writeln!(file, "0x722122dF12D4e14e13Ac3b6895a86e84145b6967,Tornado Router,ofac").unwrap();
        writeln!(file, "not-an-address,junk,x").unwrap();
        writeln!(file, "0x00000000000000000000000000000000000000AB").unwrap();

        let entries = parse_deny_list_csv(file.path().to_str().unwrap()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].address, "0x722122df12d4e14e13ac3b6895a86e84145b6967");
        assert_eq!(entries[0].label, "Tornado Router");
        assert_eq!(entries[1].label, "malicious");
        assert_eq!(entries[1].source, "deny_list");
    }

    #[test]
    fn test_load_merges_inline_addresses() {
        let config = ThreatIntelConfig {
            deny_list_path: None,
            addresses: vec![
                "0x00000000000000000000000000000000000000Cd".to_string(),
                "bogus".to_string(),
            ],
        };
        let list = DenyList::load(&config).unwrap();
        assert_eq!(list.len(), 1);
        assert!(list.contains("0x00000000000000000000000000000000000000cd"));
        assert!(list.contains("0x00000000000000000000000000000000000000CD"));
    }

    #[tokio::test]
    async fn test_is_known_malicious() {
        let mut list = DenyList::new();
        list.insert("0x00000000000000000000000000000000000000ee", "drainer", "test");
        assert!(list.is_known_malicious("0x00000000000000000000000000000000000000ee").await.unwrap());
        assert!(!list.is_known_malicious("0x00000000000000000000000000000000000000ef").await.unwrap());
    }
}
