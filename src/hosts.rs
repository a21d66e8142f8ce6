//! The hostfile: saved connection targets, one INI section per name with
//! `sHost`, `sPort`, and `sPass` keys.

use std::collections::BTreeMap;
use std::path::Path;

use ini::Ini;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub host: String,
    pub port: String,
    pub pass: String,
}

/// What happened when a target was saved under a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Added,
    Updated,
    /// The name already maps to exactly this target.
    Unchanged,
}

#[derive(Debug, Default)]
pub struct HostList {
    entries: BTreeMap<String, HostEntry>,
}

impl HostList {
    pub fn load(path: &Path) -> Result<HostList> {
        let ini = Ini::load_from_file(path)
            .map_err(|e| Error::ConfigError(format!("failed to read {}: {e}", path.display())))?;
        Ok(HostList::from_ini(&ini))
    }

    pub fn from_ini(ini: &Ini) -> HostList {
        let mut entries = BTreeMap::new();
        for (section, props) in ini.iter() {
            if let Some(name) = section {
                entries.insert(
                    name.to_string(),
                    HostEntry {
                        host: props.get("sHost").unwrap_or_default().to_string(),
                        port: props.get("sPort").unwrap_or("27015").to_string(),
                        pass: props.get("sPass").unwrap_or_default().to_string(),
                    },
                );
            }
        }
        HostList { entries }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut ini = Ini::new();
        for (name, entry) in &self.entries {
            ini.with_section(Some(name.as_str()))
                .set("sHost", entry.host.as_str())
                .set("sPort", entry.port.as_str())
                .set("sPass", entry.pass.as_str());
        }
        ini.write_to_file(path)
            .map_err(|e| Error::ConfigError(format!("failed to write {}: {e}", path.display())))
    }

    pub fn get(&self, name: &str) -> Option<&HostEntry> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: String, entry: HostEntry) -> SaveOutcome {
        match self.entries.get(&name) {
            Some(existing) if *existing == entry => SaveOutcome::Unchanged,
            Some(_) => {
                self.entries.insert(name, entry);
                SaveOutcome::Updated
            }
            None => {
                self.entries.insert(name, entry);
                SaveOutcome::Added
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HostEntry)> {
        self.entries.iter()
    }
}
