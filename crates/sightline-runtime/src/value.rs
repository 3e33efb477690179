//! Channel values and metadata as delivered by a value source.

#![allow(missing_docs)]

use serde::Serialize;
use smol_str::SmolStr;

/// Native field type of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Enum,
    Char,
    Int,
    Long,
    Float,
    #[default]
    Double,
}

impl FieldType {
    #[must_use]
    pub fn dbf_name(self) -> &'static str {
        match self {
            Self::String => "DBF_STRING",
            Self::Enum => "DBF_ENUM",
            Self::Char => "DBF_CHAR",
            Self::Int => "DBF_INT",
            Self::Long => "DBF_LONG",
            Self::Float => "DBF_FLOAT",
            Self::Double => "DBF_DOUBLE",
        }
    }

    /// True for field types whose value is an integer on the wire.
    #[must_use]
    pub fn is_integral(self) -> bool {
        matches!(self, Self::Enum | Self::Char | Self::Int | Self::Long)
    }
}

/// Alarm severity. `NotConnected` is the distinguished state shown for
/// channels that are not (or no longer) connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    NoAlarm,
    Minor,
    Major,
    Invalid,
    NotConnected,
}

impl Severity {
    #[must_use]
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => Self::NoAlarm,
            1 => Self::Minor,
            2 => Self::Major,
            3 => Self::Invalid,
            _ => Self::NotConnected,
        }
    }

    #[must_use]
    pub fn code(self) -> u16 {
        match self {
            Self::NoAlarm => 0,
            Self::Minor => 1,
            Self::Major => 2,
            Self::Invalid => 3,
            Self::NotConnected => 4,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::NoAlarm => "NO_ALARM",
            Self::Minor => "MINOR",
            Self::Major => "MAJOR",
            Self::Invalid => "INVALID",
            Self::NotConnected => "NOT_CONNECTED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// A low/high limit pair.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Limits {
    pub low: f64,
    pub high: f64,
}

impl Limits {
    #[must_use]
    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Limits that carry no usable range.
    #[must_use]
    pub fn is_degenerate(self) -> bool {
        (self.high - self.low).abs() <= 0.001
    }

    #[must_use]
    pub fn inverted(self) -> Self {
        Self {
            low: self.high,
            high: self.low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Access {
    pub read: bool,
    pub write: bool,
}

impl Access {
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
    };
    pub const READ_ONLY: Self = Self {
        read: true,
        write: false,
    };

    #[must_use]
    pub fn label(self) -> &'static str {
        match (self.read, self.write) {
            (true, true) => "ReadWrite",
            (true, false) => "ReadOnly",
            (false, true) => "WriteOnly",
            (false, false) => "NoAccess",
        }
    }
}

/// Complete cached state of one channel.
///
/// The registry stores this behind an `Arc` and replaces it whole on every
/// update; readers never observe a partially written state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelState {
    pub connection: ConnectionState,
    pub field_type: FieldType,
    /// Numeric value (`rvalue`).
    pub value: f64,
    /// Integer value (`ivalue`), also the enum index.
    pub ivalue: i64,
    /// String payload for string channels.
    pub text: SmolStr,
    /// Waveform payload.
    pub vector: Vec<f64>,
    /// Element count of the channel.
    pub count: u32,
    pub enum_states: Vec<SmolStr>,
    pub units: SmolStr,
    pub precision: i16,
    pub severity: Severity,
    pub status: u16,
    pub display: Limits,
    pub alarm: Limits,
    pub warning: Limits,
    pub control: Limits,
    pub access: Access,
    /// Host serving the channel.
    pub fec: SmolStr,
}

impl ChannelState {
    /// A connected double channel holding `value`.
    #[must_use]
    pub fn connected(value: f64) -> Self {
        Self {
            connection: ConnectionState::Connected,
            field_type: FieldType::Double,
            value,
            ivalue: float_to_int(value),
            count: 1,
            access: Access::READ_WRITE,
            ..Self::default()
        }
    }

    /// A connected enum channel at index `index` with the given states.
    #[must_use]
    pub fn connected_enum(index: i64, states: &[&str]) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let value = index as f64;
        Self {
            field_type: FieldType::Enum,
            ivalue: index,
            value,
            enum_states: states.iter().map(|state| SmolStr::new(state)).collect(),
            ..Self::connected(0.0)
        }
    }

    /// A connected string channel.
    #[must_use]
    pub fn connected_text(text: &str) -> Self {
        Self {
            field_type: FieldType::String,
            text: SmolStr::new(text),
            ..Self::connected(0.0)
        }
    }

    #[must_use]
    pub fn with_display_limits(mut self, low: f64, high: f64) -> Self {
        self.display = Limits::new(low, high);
        self
    }

    #[must_use]
    pub fn with_precision(mut self, precision: i16) -> Self {
        self.precision = precision;
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn with_units(mut self, units: &str) -> Self {
        self.units = SmolStr::new(units);
        self
    }

    /// The same channel after losing its connection. Cached metadata is kept.
    #[must_use]
    pub fn disconnected(&self) -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            severity: Severity::NotConnected,
            access: Access::default(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Sets the numeric value, keeping the integer view consistent.
    pub fn set_value(&mut self, value: f64) {
        self.value = value;
        self.ivalue = float_to_int(value);
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn float_to_int(value: f64) -> i64 {
    value as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_limits_detected() {
        assert!(Limits::new(0.0, 0.0).is_degenerate());
        assert!(Limits::new(1.0, 1.0005).is_degenerate());
        assert!(!Limits::new(0.0, 10.0).is_degenerate());
    }

    #[test]
    fn disconnect_keeps_metadata_and_drops_access() {
        let state = ChannelState::connected(4.0)
            .with_units("mm")
            .with_display_limits(0.0, 10.0);
        let lost = state.disconnected();
        assert_eq!(lost.severity, Severity::NotConnected);
        assert_eq!(lost.units, "mm");
        assert_eq!(lost.display, Limits::new(0.0, 10.0));
        assert!(!lost.access.write);
    }

    #[test]
    fn access_labels() {
        assert_eq!(Access::READ_WRITE.label(), "ReadWrite");
        assert_eq!(Access::READ_ONLY.label(), "ReadOnly");
        assert_eq!(Access::default().label(), "NoAccess");
    }
}
