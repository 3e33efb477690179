//! Display templates: document parsing, macro tables and flattening.

mod document;
mod macros;
mod resolver;
mod scope;

pub use document::{parse_document, WidgetNode};
pub use macros::{MacroTable, Substituted};
pub use resolver::{with_extension, FileLocator, ResolveReport, SearchPath, TemplateResolver};
pub use scope::TemplateScope;
