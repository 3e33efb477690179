//! Recursive template flattening.
//!
//! A document is visited in two passes. The first pass visits calc widgets
//! only, so that every soft channel a document declares exists before any
//! other widget of that document references it. The second pass visits the
//! remaining widgets and expands includes in place; each included document
//! is flattened with the same two-pass rule under its own scope.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use smol_str::SmolStr;
use tracing::{debug, warn};

use super::{parse_document, MacroTable, TemplateScope, WidgetNode};
use crate::error::DisplayError;

const CALC_CLASS: &str = "caCalc";
const INCLUDE_CLASS: &str = "caInclude";
const FRAME_CLASS: &str = "caFrame";

/// Finds and reads display documents.
pub trait FileLocator {
    /// Resolves `name` relative to `parent` (the including document's
    /// directory) and the configured search path.
    fn locate(&self, name: &str, parent: Option<&Path>) -> Option<PathBuf>;

    fn read(&self, path: &Path) -> std::io::Result<String>;
}

/// Filesystem locator: the including directory, then the working directory,
/// then each search directory in order.
#[derive(Debug, Clone, Default)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

impl SearchPath {
    #[must_use]
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    #[must_use]
    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

impl FileLocator for SearchPath {
    fn locate(&self, name: &str, parent: Option<&Path>) -> Option<PathBuf> {
        let name = with_extension(name);
        let candidate = Path::new(name.as_ref());
        if candidate.is_absolute() {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        parent
            .map(|dir| dir.join(candidate))
            .into_iter()
            .chain(std::iter::once(candidate.to_path_buf()))
            .chain(self.dirs.iter().map(|dir| dir.join(candidate)))
            .find(|path| path.is_file())
    }

    fn read(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Document names without an extension get `.ui`.
#[must_use]
pub fn with_extension(name: &str) -> Cow<'_, str> {
    if Path::new(name).extension().is_some() {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.ui"))
    }
}

/// What one flattening run touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Documents flattened, root first.
    pub documents: Vec<PathBuf>,
    /// Includes that could not be found or parsed.
    pub missing: Vec<SmolStr>,
    /// Includes skipped because they include themselves.
    pub cycles: Vec<PathBuf>,
    /// Includes skipped at the depth bound.
    pub truncated: Vec<SmolStr>,
}

/// Flattens a document and its includes, handing every widget to a visitor
/// together with the scope it was declared under.
pub struct TemplateResolver<'a> {
    locator: &'a dyn FileLocator,
    max_depth: usize,
}

impl<'a> TemplateResolver<'a> {
    #[must_use]
    pub fn new(locator: &'a dyn FileLocator, max_depth: usize) -> Self {
        Self { locator, max_depth }
    }

    /// Loads and flattens `file`. Only a missing or malformed root document
    /// is an error; failures below the root are logged and skipped.
    pub fn resolve(
        &self,
        file: &str,
        macros: MacroTable,
        visit: &mut dyn FnMut(&WidgetNode, &TemplateScope),
    ) -> Result<ResolveReport, DisplayError> {
        let path = self
            .locator
            .locate(file, None)
            .ok_or_else(|| DisplayError::LoadFailure(SmolStr::new(file)))?;
        let text = self.locator.read(&path).map_err(|err| {
            DisplayError::LoadFailure(format!("{}: {err}", path.display()).into())
        })?;
        let root = parse_document(&text)?;
        let scope = TemplateScope::root(&path, macros);
        let mut report = ResolveReport {
            documents: vec![path],
            ..ResolveReport::default()
        };
        self.flatten(&root, &scope, visit, &mut report);
        Ok(report)
    }

    fn flatten(
        &self,
        root: &WidgetNode,
        scope: &TemplateScope,
        visit: &mut dyn FnMut(&WidgetNode, &TemplateScope),
        report: &mut ResolveReport,
    ) {
        visit_calcs(root, scope, visit);
        self.visit_rest(root, scope, visit, report);
    }

    fn visit_rest(
        &self,
        node: &WidgetNode,
        scope: &TemplateScope,
        visit: &mut dyn FnMut(&WidgetNode, &TemplateScope),
        report: &mut ResolveReport,
    ) {
        if node.class == CALC_CLASS {
            return;
        }
        visit(node, scope);
        if node.class == INCLUDE_CLASS {
            self.expand_include(node, scope, visit, report);
        }
        let scope = container_scope(node, scope);
        for child in &node.children {
            self.visit_rest(child, &scope, visit, report);
        }
    }

    fn expand_include(
        &self,
        node: &WidgetNode,
        scope: &TemplateScope,
        visit: &mut dyn FnMut(&WidgetNode, &TemplateScope),
        report: &mut ResolveReport,
    ) {
        let Some(file) = node.text("filename") else {
            return;
        };
        let file = scope.macros().expand(file);
        if scope.depth() >= self.max_depth {
            warn!(
                "include '{file}' in '{}' exceeds depth {}, not expanded",
                scope.file(),
                self.max_depth
            );
            report.truncated.push(SmolStr::new(file.as_ref()));
            return;
        }
        let Some(path) = self.locator.locate(&file, scope.directory()) else {
            warn!("include '{file}' in '{}' not found", scope.file());
            report.missing.push(SmolStr::new(file.as_ref()));
            return;
        };
        if scope.contains_path(&path) {
            warn!(
                "include cycle: '{}' already open in {:?}",
                path.display(),
                scope.files().collect::<Vec<_>>()
            );
            report.cycles.push(path);
            return;
        }
        let document = match self
            .locator
            .read(&path)
            .map_err(|err| DisplayError::LoadFailure(err.to_string().into()))
            .and_then(|text| parse_document(&text))
        {
            Ok(document) => document,
            Err(err) => {
                warn!("include '{}' skipped: {err}", path.display());
                report.missing.push(SmolStr::new(file.as_ref()));
                return;
            }
        };
        let macros = node
            .text("macro")
            .map(|text| MacroTable::parse(&scope.macros().expand(text)));
        let child = scope.include(&path, macros);
        debug!(
            "including '{}' at depth {} with macros '{}'",
            path.display(),
            child.depth(),
            child.macros()
        );
        report.documents.push(path);
        self.flatten(&document, &child, visit, report);
    }
}

fn visit_calcs(
    node: &WidgetNode,
    scope: &TemplateScope,
    visit: &mut dyn FnMut(&WidgetNode, &TemplateScope),
) {
    if node.class == CALC_CLASS {
        visit(node, scope);
    }
    let scope = container_scope(node, scope);
    for child in &node.children {
        visit_calcs(child, &scope, visit);
    }
}

/// Frames may carry a macro string that applies to their children.
fn container_scope<'s>(node: &WidgetNode, scope: &'s TemplateScope) -> Cow<'s, TemplateScope> {
    if node.class != FRAME_CLASS {
        return Cow::Borrowed(scope);
    }
    match node.text("macro") {
        Some(text) => Cow::Owned(scope.nest(Some(MacroTable::parse(&scope.macros().expand(text))))),
        None => Cow::Borrowed(scope),
    }
}
