// Assembler symbol listing (`Label = $XXXX` per line, `;` comments).

use std::collections::HashMap;
use std::path::Path;

use crate::error::CodecError;

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    labels: HashMap<String, u16>,
}

impl SymbolTable {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to open symbol listing {}: {e}", path.display()))?;
        let table = Self::parse(&text);
        if table.is_empty() {
            return Err(format!("No symbols found in {}", path.display()));
        }
        log::info!("Symbols: {} labels from {}", table.len(), path.display());
        Ok(table)
    }

    /// Lines that do not look like an assignment are skipped.  If a label
    /// is defined twice the first definition wins.
    pub fn parse(text: &str) -> Self {
        let mut labels = HashMap::new();
        for line in text.lines() {
            let line = match line.find(';') {
                Some(i) => &line[..i],
                None => line,
            };
            if let Some((name, addr)) = parse_line(line) {
                labels.entry(name.to_string()).or_insert(addr);
            }
        }
        Self { labels }
    }

    #[cfg(test)]
    pub(crate) fn insert(&mut self, name: &str, addr: u16) {
        self.labels.insert(name.to_string(), addr);
    }

    #[cfg(test)]
    pub(crate) fn remove(&mut self, name: &str) -> Option<u16> {
        self.labels.remove(name)
    }

    pub fn resolve(&self, name: &str) -> Option<u16> {
        self.labels.get(name).copied()
    }

    /// Like `resolve`, but a missing label is an initialisation error.
    pub fn require(&self, name: &str) -> Result<u16, CodecError> {
        self.resolve(name).ok_or_else(|| {
            log::error!("Failed to find label {name} in symbol listing");
            CodecError::init(format!("Failed to find label {name} in symbol listing"))
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn parse_line(line: &str) -> Option<(&str, u16)> {
    let (name, value) = line.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    let hex = value.trim().strip_prefix('$')?;
    let addr = u16::from_str_radix(hex, 16).ok()?;
    Some((name, addr))
}
