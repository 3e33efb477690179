//! Macro scope carried through recursive template flattening.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use smol_str::SmolStr;

use super::MacroTable;

/// Stack of (macro table, originating file) levels.
///
/// Scopes are values: descending produces a new scope and never changes the
/// one it came from, so a child always sees the table as it was at the
/// moment of descent.
#[derive(Debug, Clone)]
pub struct TemplateScope {
    head: ScopeLevel,
    parents: Vec<ScopeLevel>,
}

#[derive(Debug, Clone)]
struct ScopeLevel {
    macros: Arc<MacroTable>,
    file: SmolStr,
    path: Option<PathBuf>,
    include: bool,
}

impl TemplateScope {
    /// Scope for a top-level document.
    #[must_use]
    pub fn root(path: &Path, macros: MacroTable) -> Self {
        Self {
            head: ScopeLevel {
                macros: Arc::new(macros),
                file: file_identity(path),
                path: Some(path.to_path_buf()),
                include: true,
            },
            parents: Vec::new(),
        }
    }

    /// Scope for a document not backed by a file.
    #[must_use]
    pub fn detached(file: &str, macros: MacroTable) -> Self {
        Self {
            head: ScopeLevel {
                macros: Arc::new(macros),
                file: SmolStr::new(file),
                path: None,
                include: true,
            },
            parents: Vec::new(),
        }
    }

    /// Active macro table.
    #[must_use]
    pub fn macros(&self) -> &MacroTable {
        &self.head.macros
    }

    /// Identity of the file the current level was declared in.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.head.file
    }

    /// Number of include levels below the root document.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels()
            .filter(|level| level.include)
            .count()
            .saturating_sub(1)
    }

    /// Directory of the nearest file-backed level.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        std::iter::once(&self.head)
            .chain(self.parents.iter().rev())
            .find_map(|level| level.path.as_deref())
            .and_then(Path::parent)
    }

    /// True when `path` is already being flattened further up this scope.
    #[must_use]
    pub fn contains_path(&self, path: &Path) -> bool {
        self.levels()
            .filter_map(|level| level.path.as_deref())
            .any(|ancestor| ancestor == path)
    }

    /// Descends into an included document. Without a macro table of its own
    /// the child inherits the active one.
    #[must_use]
    pub fn include(&self, path: &Path, macros: Option<MacroTable>) -> Self {
        self.push(ScopeLevel {
            macros: self.inherit(macros),
            file: file_identity(path),
            path: Some(path.to_path_buf()),
            include: true,
        })
    }

    /// Descends into a container of the same document.
    #[must_use]
    pub fn nest(&self, macros: Option<MacroTable>) -> Self {
        self.push(ScopeLevel {
            macros: self.inherit(macros),
            file: SmolStr::new(self.file()),
            path: None,
            include: false,
        })
    }

    /// Files from the root document down to the current level.
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.levels()
            .filter(|level| level.include)
            .map(|level| level.file.as_str())
    }

    fn inherit(&self, macros: Option<MacroTable>) -> Arc<MacroTable> {
        match macros.filter(|table| !table.is_empty()) {
            Some(table) => Arc::new(table),
            None => std::iter::once(&self.head)
                .chain(self.parents.iter().rev())
                .map(|level| &level.macros)
                .find(|table| !table.is_empty())
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn levels(&self) -> impl Iterator<Item = &ScopeLevel> {
        self.parents.iter().chain(std::iter::once(&self.head))
    }

    fn push(&self, level: ScopeLevel) -> Self {
        let mut parents = self.parents.clone();
        parents.push(self.head.clone());
        Self {
            head: level,
            parents,
        }
    }
}

fn file_identity(path: &Path) -> SmolStr {
    path.file_stem()
        .map_or_else(SmolStr::default, |stem| SmolStr::new(stem.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_without_macros_inherits_parent_table() {
        let root = TemplateScope::root(Path::new("/d/main.ui"), MacroTable::parse("P=SR1"));
        let child = root.include(Path::new("/d/panel.ui"), None);
        assert_eq!(child.macros().get("P"), Some("SR1"));
        assert_eq!(child.file(), "panel");
        assert_eq!(child.depth(), 1);
    }

    #[test]
    fn own_macros_shadow_and_do_not_leak_upward() {
        let root = TemplateScope::root(Path::new("/d/main.ui"), MacroTable::parse("P=SR1"));
        let child = root.include(Path::new("/d/panel.ui"), Some(MacroTable::parse("P=SR2")));
        assert_eq!(child.macros().get("P"), Some("SR2"));
        assert_eq!(root.macros().get("P"), Some("SR1"));
    }

    #[test]
    fn empty_level_inherits_nearest_non_empty_table() {
        let root = TemplateScope::root(Path::new("/d/main.ui"), MacroTable::parse("P=SR1"));
        let frame = root.nest(Some(MacroTable::new()));
        let child = frame.include(Path::new("/d/panel.ui"), None);
        assert_eq!(child.macros().get("P"), Some("SR1"));
        assert_eq!(frame.depth(), 0);
        assert_eq!(frame.file(), "main");
        assert_eq!(frame.directory(), Some(Path::new("/d")));
    }

    #[test]
    fn cycle_check_sees_ancestors() {
        let root = TemplateScope::root(Path::new("/d/main.ui"), MacroTable::new());
        let child = root.include(Path::new("/d/panel.ui"), None);
        assert!(child.contains_path(Path::new("/d/main.ui")));
        assert!(!child.contains_path(Path::new("/d/other.ui")));
        assert_eq!(child.files().collect::<Vec<_>>(), vec!["main", "panel"]);
    }
}
