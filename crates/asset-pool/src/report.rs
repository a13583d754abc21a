//! Text reports over a registry snapshot.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One entry as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntryInfo {
    /// The entry's key.
    pub key: String,
    /// Strong references to the resource, the registry's own included.
    pub references: usize,
}

impl EntryInfo {
    /// References held outside the registry.
    #[must_use]
    pub fn external_holders(&self) -> usize {
        self.references.saturating_sub(1)
    }

    /// Whether the next `garbage_collect` would remove this entry.
    #[must_use]
    pub fn is_collectable(&self) -> bool {
        self.references == 1
    }
}

pub(crate) fn list_contents(
    name: &str,
    entries: &[EntryInfo],
    out: &mut impl fmt::Write,
) -> fmt::Result {
    writeln!(out, "{name} contents:")?;
    for entry in entries {
        writeln!(out, "  {}", entry.key)?;
    }
    writeln!(out, "total entries: {}", entries.len())
}

pub(crate) fn write(name: &str, entries: &[EntryInfo], out: &mut impl fmt::Write) -> fmt::Result {
    writeln!(out, "{name}: {} entries", entries.len())?;
    for entry in entries {
        writeln!(
            out,
            "  {} (refs={}, external={})",
            entry.key,
            entry.references,
            entry.external_holders()
        )?;
    }
    Ok(())
}
