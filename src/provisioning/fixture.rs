//! Schema fixtures and statement batches.

use std::path::Path;

use super::ProvisionError;

/// A disposable database: its name and the script that creates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFixture {
    pub name: String,
    pub create_script: String,
}

impl SchemaFixture {
    pub fn new(name: impl Into<String>, create_script: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create_script: create_script.into(),
        }
    }

    /// Read the creation script from a `.sql` file.
    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self, ProvisionError> {
        let create_script = std::fs::read_to_string(path).map_err(|source| ProvisionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(name, create_script))
    }

    /// Reject names that are not plain identifiers (ASCII letters, digits,
    /// `_` and `$`), since they end up in generated SQL.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let valid = !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
        if valid {
            Ok(())
        } else {
            Err(ProvisionError::InvalidName(self.name.clone()))
        }
    }

    /// `DROP DATABASE` for this fixture, with the name quoted as an identifier.
    pub fn drop_script(&self) -> String {
        format!("DROP DATABASE `{}`;\n", self.name.replace('`', "``"))
    }
}

/// Split a batch on `;`, dropping blank segments (including the one after a
/// trailing `;`). Semicolons inside string literals are not special-cased.
pub fn split_statements(batch: &str) -> Vec<&str> {
    batch
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .collect()
}
