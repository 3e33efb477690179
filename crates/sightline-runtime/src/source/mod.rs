//! Value source layer.
//!
//! A value source owns the real connections to external channels. The
//! registry asks it to connect once per distinct channel name and hands it a
//! [`ChannelLink`]; the source publishes every connect, update and
//! disconnect through that link, from whatever thread it likes.

use smol_str::SmolStr;

use crate::error::DisplayError;

mod loopback;
mod registry;
mod simulated;

pub use crate::registry::ChannelLink;
pub use loopback::LoopbackSource;
pub use registry::{SourceDriverRegistry, SourceSpec};
pub use simulated::SimulatedSource;

/// Opaque handle to one source-side connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHandle(pub u64);

/// An outbound write, forwarded as-is to the value source.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub name: SmolStr,
    pub numeric: f64,
    pub integer: i64,
    pub text: SmolStr,
    /// Label of the element or user that issued the write.
    pub actor: SmolStr,
}

impl WriteRequest {
    #[must_use]
    pub fn numeric(name: &str, value: f64, actor: &str) -> Self {
        Self {
            name: SmolStr::new(name),
            numeric: value,
            integer: crate::value::float_to_int(value),
            text: SmolStr::default(),
            actor: SmolStr::new(actor),
        }
    }

    /// A write carrying text, with the numeric view set to `index`.
    #[must_use]
    pub fn text(name: &str, text: &str, index: i64, actor: &str) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let numeric = index as f64;
        Self {
            name: SmolStr::new(name),
            numeric,
            integer: index,
            text: SmolStr::new(text),
            actor: SmolStr::new(actor),
        }
    }
}

/// Contract consumed by the registry.
pub trait ValueSource: Send + Sync {
    /// Opens a connection for `name`. State changes are published on `link`.
    fn connect(&self, name: &str, link: ChannelLink) -> Result<SourceHandle, DisplayError>;

    /// Closes a connection. The link handed to `connect` must not be used
    /// afterwards; publishing through it is dropped by the registry anyway.
    fn disconnect(&self, handle: SourceHandle);

    /// Writes a value. Failures surface later as state updates.
    fn write(&self, request: &WriteRequest) -> Result<(), DisplayError>;
}

/// Source used when no driver is configured: channels never connect and
/// writes are discarded.
#[derive(Debug, Default)]
pub struct NullSource {
    next: std::sync::atomic::AtomicU64,
}

impl ValueSource for NullSource {
    fn connect(&self, name: &str, _link: ChannelLink) -> Result<SourceHandle, DisplayError> {
        tracing::debug!("no value source for '{name}'");
        let id = self
            .next
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(SourceHandle(id))
    }

    fn disconnect(&self, _handle: SourceHandle) {}

    fn write(&self, request: &WriteRequest) -> Result<(), DisplayError> {
        tracing::debug!("discarding write to '{}'", request.name);
        Ok(())
    }
}
