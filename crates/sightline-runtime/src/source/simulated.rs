//! Simulated value source seeded from configuration.
//!
//! ```toml
//! [source]
//! driver = "simulated"
//!
//! [source.params]
//! disconnected = ["VAC:GAUGE3"]
//!
//! [source.params.values]
//! "BEAM:CURRENT" = 12.5
//! "BEAM:MODE" = 1
//! "BEAM:NAME" = "proton"
//!
//! [source.params.enums]
//! "BEAM:MODE" = ["Off", "Standby", "On"]
//!
//! [source.params.limits]
//! "BEAM:CURRENT" = [0.0, 50.0]
//!
//! [source.params.units]
//! "BEAM:CURRENT" = "mA"
//!
//! [source.params.precision]
//! "BEAM:CURRENT" = 2
//! ```

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

use crate::error::DisplayError;
use crate::source::loopback::{apply_write, initial_state};
use crate::source::{ChannelLink, SourceHandle, ValueSource, WriteRequest};
use crate::value::{ChannelState, FieldType, Limits};

/// Connects configured channels with their seeded state; unknown channels
/// connect at zero. Names listed under `disconnected` never connect.
#[derive(Debug, Default)]
pub struct SimulatedSource {
    seeds: FxHashMap<SmolStr, ChannelState>,
    offline: FxHashSet<SmolStr>,
    inner: Mutex<SimulatedInner>,
}

#[derive(Debug, Default)]
struct SimulatedInner {
    next_handle: u64,
    links: FxHashMap<u64, (SmolStr, ChannelLink)>,
    values: FxHashMap<SmolStr, ChannelState>,
}

impl SimulatedSource {
    pub fn from_params(params: &toml::Value) -> Result<Self, DisplayError> {
        let mut seeds: FxHashMap<SmolStr, ChannelState> = FxHashMap::default();
        for (name, value) in table(params, "values")? {
            let state = seed(&mut seeds, name);
            match value {
                toml::Value::Float(number) => state.set_value(*number),
                #[allow(clippy::cast_precision_loss)]
                toml::Value::Integer(number) => state.set_value(*number as f64),
                toml::Value::Boolean(flag) => state.set_value(if *flag { 1.0 } else { 0.0 }),
                toml::Value::String(text) => {
                    state.field_type = FieldType::String;
                    state.text = SmolStr::new(text);
                }
                other => {
                    return Err(invalid(format!(
                        "source.params.values.{name}: unsupported value {other}"
                    )))
                }
            }
        }
        for (name, value) in table(params, "enums")? {
            let states = value
                .as_array()
                .ok_or_else(|| invalid(format!("source.params.enums.{name} must be an array")))?
                .iter()
                .map(|item| {
                    item.as_str().map(SmolStr::new).ok_or_else(|| {
                        invalid(format!("source.params.enums.{name} must hold strings"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let state = seed(&mut seeds, name);
            state.field_type = FieldType::Enum;
            state.enum_states = states;
        }
        for (name, value) in table(params, "limits")? {
            let pair = value
                .as_array()
                .filter(|pair| pair.len() == 2)
                .and_then(|pair| Some(Limits::new(number(&pair[0])?, number(&pair[1])?)))
                .ok_or_else(|| {
                    invalid(format!("source.params.limits.{name} must be [low, high]"))
                })?;
            let state = seed(&mut seeds, name);
            state.display = pair;
            state.control = pair;
        }
        for (name, value) in table(params, "units")? {
            let units = value
                .as_str()
                .ok_or_else(|| invalid(format!("source.params.units.{name} must be a string")))?;
            seed(&mut seeds, name).units = SmolStr::new(units);
        }
        for (name, value) in table(params, "precision")? {
            let precision = value
                .as_integer()
                .and_then(|precision| i16::try_from(precision).ok())
                .ok_or_else(|| {
                    invalid(format!("source.params.precision.{name} must be an integer"))
                })?;
            seed(&mut seeds, name).precision = precision;
        }
        let offline = match params.get("disconnected") {
            None => FxHashSet::default(),
            Some(value) => value
                .as_array()
                .ok_or_else(|| invalid("source.params.disconnected must be an array".into()))?
                .iter()
                .filter_map(|item| item.as_str().map(SmolStr::new))
                .collect(),
        };
        Ok(Self {
            seeds,
            offline,
            inner: Mutex::new(SimulatedInner::default()),
        })
    }

    pub fn validate_params(params: &toml::Value) -> Result<(), DisplayError> {
        Self::from_params(params).map(|_| ())
    }

    /// Publishes `state` to every connection of `name`.
    pub fn set(&self, name: &str, state: ChannelState) {
        let links = {
            let mut inner = self.inner.lock();
            inner.values.insert(SmolStr::new(name), state.clone());
            links_for(&inner.links, name)
        };
        for link in links {
            link.publish(state.clone());
        }
    }

    /// Publishes a disconnect for every connection of `name`.
    pub fn drop_connection(&self, name: &str) {
        let (state, links) = {
            let inner = self.inner.lock();
            let state = inner
                .values
                .get(name)
                .map_or_else(ChannelState::default, ChannelState::disconnected);
            (state, links_for(&inner.links, name))
        };
        for link in links {
            link.publish(state.clone());
        }
    }
}

fn seed<'a>(seeds: &'a mut FxHashMap<SmolStr, ChannelState>, name: &str) -> &'a mut ChannelState {
    seeds
        .entry(SmolStr::new(name))
        .or_insert_with(|| initial_state("simulated"))
}

fn links_for(links: &FxHashMap<u64, (SmolStr, ChannelLink)>, name: &str) -> Vec<ChannelLink> {
    links
        .values()
        .filter(|(linked, _)| linked == name)
        .map(|(_, link)| link.clone())
        .collect()
}

fn table<'a>(
    params: &'a toml::Value,
    key: &str,
) -> Result<Box<dyn Iterator<Item = (&'a String, &'a toml::Value)> + 'a>, DisplayError> {
    match params.get(key) {
        None => Ok(Box::new(std::iter::empty())),
        Some(toml::Value::Table(table)) => Ok(Box::new(table.iter())),
        Some(_) => Err(invalid(format!("source.params.{key} must be a table"))),
    }
}

#[allow(clippy::cast_precision_loss)]
fn number(value: &toml::Value) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|number| number as f64))
}

fn invalid(message: String) -> DisplayError {
    DisplayError::InvalidConfig(message.into())
}

impl ValueSource for SimulatedSource {
    fn connect(&self, name: &str, link: ChannelLink) -> Result<SourceHandle, DisplayError> {
        let (handle, state) = {
            let mut inner = self.inner.lock();
            let handle = inner.next_handle;
            inner.next_handle += 1;
            inner
                .links
                .insert(handle, (SmolStr::new(name), link.clone()));
            let state = if self.offline.contains(name) {
                None
            } else {
                let seeded = self
                    .seeds
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| initial_state("simulated"));
                Some(
                    inner
                        .values
                        .entry(SmolStr::new(name))
                        .or_insert(seeded)
                        .clone(),
                )
            };
            (handle, state)
        };
        if let Some(state) = state {
            link.publish(state);
        }
        Ok(SourceHandle(handle))
    }

    fn disconnect(&self, handle: SourceHandle) {
        self.inner.lock().links.remove(&handle.0);
    }

    fn write(&self, request: &WriteRequest) -> Result<(), DisplayError> {
        if self.offline.contains(request.name.as_str()) {
            return Err(DisplayError::Source(
                format!("'{}' is not connected", request.name).into(),
            ));
        }
        let (state, links) = {
            let mut inner = self.inner.lock();
            let seeded = self
                .seeds
                .get(&request.name)
                .cloned()
                .unwrap_or_else(|| initial_state("simulated"));
            let state = inner.values.entry(request.name.clone()).or_insert(seeded);
            apply_write(state, request);
            let state = state.clone();
            (state, links_for(&inner.links, &request.name))
        };
        for link in links {
            link.publish(state.clone());
        }
        Ok(())
    }
}
