//! Value text formatting.

use smol_str::{format_smolstr, SmolStr};

use super::InputFormat;
use crate::value::{float_to_int, ChannelState, FieldType};

/// Shown for enum indices outside the channel's state table.
pub const UNKNOWN_STATE: &str = "???";

/// State text of an enum channel. Channels without a state table show the
/// raw index.
#[must_use]
pub fn enum_text(state: &ChannelState) -> SmolStr {
    if state.enum_states.is_empty() {
        return format_smolstr!("{}", state.ivalue);
    }
    usize::try_from(state.ivalue)
        .ok()
        .and_then(|index| state.enum_states.get(index))
        .cloned()
        .unwrap_or_else(|| SmolStr::new(UNKNOWN_STATE))
}

/// Text of a channel value in `format` with `precision` decimals.
#[must_use]
pub fn format_value(state: &ChannelState, format: InputFormat, precision: usize) -> SmolStr {
    match state.field_type {
        FieldType::String => state.text.clone(),
        FieldType::Enum => enum_text(state),
        FieldType::Char if format == InputFormat::String => state.text.clone(),
        kind if kind.is_integral() => format_integer(state.ivalue, format),
        _ => match format {
            InputFormat::Hexadecimal | InputFormat::Octal => {
                format_integer(float_to_int(state.value), format)
            }
            InputFormat::Exponential => format_smolstr!("{:.*e}", precision, state.value),
            InputFormat::Compact => {
                let magnitude = state.value.abs();
                if magnitude == 0.0 || (1e-4..1e5).contains(&magnitude) {
                    format_smolstr!("{:.*}", precision, state.value)
                } else {
                    format_smolstr!("{:.*e}", precision, state.value)
                }
            }
            InputFormat::Decimal | InputFormat::String => {
                format_smolstr!("{:.*}", precision, state.value)
            }
        },
    }
}

fn format_integer(value: i64, format: InputFormat) -> SmolStr {
    match format {
        InputFormat::Hexadecimal => format_smolstr!("0x{value:X}"),
        InputFormat::Octal => format_smolstr!("0{value:o}"),
        _ => format_smolstr!("{value}"),
    }
}

/// Channel precision clamped into a usable decimal count.
pub(crate) fn channel_precision(state: &ChannelState, max: u8) -> u8 {
    u8::try_from(state.precision.clamp(0, i16::from(max))).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_out_of_range_shows_placeholder() {
        let state = ChannelState::connected_enum(5, &["OFF", "ON"]);
        assert_eq!(enum_text(&state), UNKNOWN_STATE);
        let state = ChannelState::connected_enum(1, &["OFF", "ON"]);
        assert_eq!(enum_text(&state), "ON");
    }

    #[test]
    fn doubles_follow_format_and_precision() {
        let state = ChannelState::connected(254.5);
        assert_eq!(format_value(&state, InputFormat::Decimal, 2), "254.50");
        assert_eq!(format_value(&state, InputFormat::Hexadecimal, 2), "0xFE");
        assert_eq!(format_value(&state, InputFormat::Octal, 2), "0376");
        assert_eq!(format_value(&state, InputFormat::Exponential, 1), "2.5e2");
    }

    #[test]
    fn char_arrays_print_as_text_only_in_string_format() {
        let mut state = ChannelState::connected_text("hello");
        state.field_type = FieldType::Char;
        state.ivalue = 104;
        assert_eq!(format_value(&state, InputFormat::String, 0), "hello");
        assert_eq!(format_value(&state, InputFormat::Decimal, 0), "104");
    }
}
