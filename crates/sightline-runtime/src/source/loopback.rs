//! Loopback value source for development.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::error::DisplayError;
use crate::source::{ChannelLink, SourceHandle, ValueSource, WriteRequest};
use crate::value::{ChannelState, FieldType};

/// Every channel connects immediately at zero; writes are echoed back to all
/// connections of the written name.
#[derive(Debug, Default)]
pub struct LoopbackSource {
    inner: Mutex<LoopbackInner>,
}

#[derive(Debug, Default)]
struct LoopbackInner {
    next_handle: u64,
    links: FxHashMap<u64, (SmolStr, ChannelLink)>,
    values: FxHashMap<SmolStr, ChannelState>,
}

impl LoopbackSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value written to (or published for) `name`.
    pub fn value(&self, name: &str) -> Option<ChannelState> {
        self.inner.lock().values.get(name).cloned()
    }
}

pub(super) fn initial_state(fec: &str) -> ChannelState {
    ChannelState {
        fec: SmolStr::new(fec),
        ..ChannelState::connected(0.0)
    }
}

pub(super) fn apply_write(state: &mut ChannelState, request: &WriteRequest) {
    match state.field_type {
        FieldType::String => state.text = request.text.clone(),
        FieldType::Enum => {
            #[allow(clippy::cast_precision_loss)]
            let value = request.integer as f64;
            state.value = value;
            state.ivalue = request.integer;
        }
        _ => state.set_value(request.numeric),
    }
}

impl ValueSource for LoopbackSource {
    fn connect(&self, name: &str, link: ChannelLink) -> Result<SourceHandle, DisplayError> {
        let (handle, state) = {
            let mut inner = self.inner.lock();
            let handle = inner.next_handle;
            inner.next_handle += 1;
            let state = inner
                .values
                .entry(SmolStr::new(name))
                .or_insert_with(|| initial_state("loopback"))
                .clone();
            inner
                .links
                .insert(handle, (SmolStr::new(name), link.clone()));
            (handle, state)
        };
        link.publish(state);
        Ok(SourceHandle(handle))
    }

    fn disconnect(&self, handle: SourceHandle) {
        self.inner.lock().links.remove(&handle.0);
    }

    fn write(&self, request: &WriteRequest) -> Result<(), DisplayError> {
        let (state, links) = {
            let mut inner = self.inner.lock();
            let state = inner
                .values
                .entry(request.name.clone())
                .or_insert_with(|| initial_state("loopback"));
            apply_write(state, request);
            let state = state.clone();
            let links: Vec<ChannelLink> = inner
                .links
                .values()
                .filter(|(name, _)| *name == request.name)
                .map(|(_, link)| link.clone())
                .collect();
            (state, links)
        };
        for link in links {
            link.publish(state.clone());
        }
        Ok(())
    }
}
