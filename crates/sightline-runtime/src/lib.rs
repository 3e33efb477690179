//! Live-value binding and dispatch engine for control-room displays.
//!
//! A display is a tree of widgets loaded from `.ui` documents. Opening one
//! flattens its includes under per-include macro tables, binds every
//! channel reference to a deduplicated registry slot and from then on routes
//! each channel update, in arrival order, to the elements that reference
//! it.
//!
//! ```no_run
//! use sightline_runtime::{Engine, ViewerConfig};
//!
//! # fn main() -> Result<(), sightline_runtime::DisplayError> {
//! let config = ViewerConfig::load("viewer.toml")?;
//! let mut engine = Engine::from_config(&config)?;
//! let window = engine.open("beamline.ui", "SECTOR=04")?;
//! engine.pump();
//! for element in engine.window(window).map(|w| w.elements()).unwrap_or_default() {
//!     println!("{} visible={}", element.name, element.view.visible);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod describe;
pub mod element;
pub mod engine;
pub mod error;
pub mod registry;
pub mod router;
pub mod source;
pub mod template;
pub mod value;
pub mod write;

pub use config::ViewerConfig;
pub use describe::ChannelDescription;
pub use element::{Element, ElementClass, ElementView, Interaction, Palette};
pub use engine::{Engine, RelatedTarget, Window};
pub use error::DisplayError;
pub use registry::{MonitorRegistry, SlotId, WindowId};
pub use router::DispatchRouter;
pub use source::{LoopbackSource, SimulatedSource, ValueSource};
pub use template::MacroTable;
pub use value::{ChannelState, Severity};
