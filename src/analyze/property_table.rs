//! Access to an MSI package's `Property` table.
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Read-only view of the (name, value) pairs an installer package declares.
pub trait PropertyTable {
    fn read_properties(&self, path: &Path) -> Result<BTreeMap<String, String>>;
}

/// Reads the compound-file MSI database directly; works on any host OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsiDatabase;

impl PropertyTable for MsiDatabase {
    fn read_properties(&self, path: &Path) -> Result<BTreeMap<String, String>> {
        let mut package =
            msi::open(path).with_context(|| format!("open MSI database {}", path.display()))?;
        // Naming the columns makes a table without them an error rather than
        // a missing-column panic when rows are indexed below.
        let query = msi::Select::table("Property").columns(&["Property", "Value"]);
        let rows = package
            .select_rows(query)
            .context("select Property table")?;
        let mut properties = BTreeMap::new();
        for row in rows {
            let name = row["Property"].as_str().unwrap_or_default().to_string();
            if name.is_empty() {
                continue;
            }
            let value = row["Value"].as_str().unwrap_or_default().to_string();
            properties.insert(name, value);
        }
        Ok(properties)
    }
}
