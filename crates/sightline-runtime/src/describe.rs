//! Read-only channel description for info panels.

use std::fmt::Write as _;

use serde::Serialize;
use smol_str::{format_smolstr, SmolStr};

use crate::element::{format_value, InputFormat};
use crate::registry::{ChannelKind, ChannelSnapshot};
use crate::value::Limits;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelDescription {
    pub name: SmolStr,
    pub connection: &'static str,
    pub field_type: &'static str,
    pub count: u32,
    pub value: SmolStr,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_states: Vec<SmolStr>,
    pub severity: &'static str,
    pub host: SmolStr,
    pub precision: i16,
    pub display: Limits,
    pub alarm: Limits,
    pub warning: Limits,
    pub control: Limits,
    pub access: &'static str,
    /// File that first declared the channel.
    pub origin: SmolStr,
    pub subscribers: usize,
}

impl ChannelDescription {
    #[must_use]
    pub fn from_snapshot(snapshot: &ChannelSnapshot) -> Self {
        let state = &snapshot.state;
        let connection = match (snapshot.kind, state.is_connected()) {
            (ChannelKind::Soft, _) => "soft channel",
            (ChannelKind::External, true) => "connected",
            (ChannelKind::External, false) => "not connected",
        };
        let precision = usize::try_from(state.precision.clamp(0, 17)).unwrap_or(0);
        let mut value = format_value(state, InputFormat::Decimal, precision);
        if !state.units.is_empty() {
            value = format_smolstr!("{value} {}", state.units);
        }
        Self {
            name: snapshot.name.clone(),
            connection,
            field_type: state.field_type.dbf_name(),
            count: state.count,
            value,
            enum_states: state.enum_states.clone(),
            severity: state.severity.name(),
            host: state.fec.clone(),
            precision: state.precision,
            display: state.display,
            alarm: state.alarm,
            warning: state.warning,
            control: state.control,
            access: state.access.label(),
            origin: snapshot.origin.clone(),
            subscribers: snapshot.subscribers,
        }
    }

    /// Plain-text info panel body.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.name);
        let _ = writeln!(out, "  connection: {}", self.connection);
        let _ = writeln!(out, "  type: {}  count: {}", self.field_type, self.count);
        let _ = writeln!(out, "  value: {}", self.value);
        for (index, state) in self.enum_states.iter().enumerate() {
            let _ = writeln!(out, "  state {index}: {state}");
        }
        let _ = writeln!(out, "  severity: {}", self.severity);
        if !self.host.is_empty() {
            let _ = writeln!(out, "  host: {}", self.host);
        }
        let _ = writeln!(out, "  precision: {}", self.precision);
        let pairs = [
            ("LOPR", "HOPR", self.display),
            ("LOLO", "HIHI", self.alarm),
            ("LOW", "HIGH", self.warning),
            ("DRVL", "DRVH", self.control),
        ];
        for (low, high, limits) in pairs {
            let _ = writeln!(out, "  {low}: {}  {high}: {}", limits.low, limits.high);
        }
        let _ = writeln!(out, "  access: {}", self.access);
        let _ = write!(out, "  declared in: {}", self.origin);
        out
    }
}
