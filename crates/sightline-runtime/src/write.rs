//! Outbound value parsing.
//!
//! Text committed by a user is interpreted against the target channel's
//! field type before anything reaches the value source. A value that does
//! not parse is rejected locally.

use smol_str::SmolStr;

use crate::element::InputFormat;
use crate::error::DisplayError;
use crate::source::WriteRequest;
use crate::value::{ChannelState, FieldType};

/// Builds the write for `text` committed to channel `name`.
///
/// Returns `Ok(None)` when the field type accepts no write in this format.
pub fn request_value(
    name: &str,
    state: &ChannelState,
    text: &str,
    format: InputFormat,
    actor: &str,
) -> Result<Option<WriteRequest>, DisplayError> {
    let invalid = || DisplayError::InvalidValue(SmolStr::new(text));
    match state.field_type {
        FieldType::String => Ok(Some(WriteRequest::text(name, text, 0, actor))),
        FieldType::Char => Ok((format == InputFormat::String)
            .then(|| WriteRequest::text(name, text, 0, actor))),
        FieldType::Enum | FieldType::Int | FieldType::Long => {
            let wanted = text.trim();
            if let Some(index) = state
                .enum_states
                .iter()
                .position(|state| state.trim() == wanted)
            {
                let index = i64::try_from(index).map_err(|_| invalid())?;
                return Ok(Some(WriteRequest::text(name, wanted, index, actor)));
            }
            let value = parse_integer(wanted, format).ok_or_else(invalid)?;
            if state.field_type == FieldType::Enum && !state.enum_states.is_empty() {
                let count = i64::try_from(state.enum_states.len()).map_err(|_| invalid())?;
                if !(0..count).contains(&value) {
                    return Err(invalid());
                }
            }
            Ok(Some(WriteRequest::text(name, wanted, value, actor)))
        }
        FieldType::Float | FieldType::Double => {
            let value = parse_double(text.trim(), format).ok_or_else(invalid)?;
            Ok(Some(WriteRequest::numeric(name, value, actor)))
        }
    }
}

fn parse_integer(text: &str, format: InputFormat) -> Option<i64> {
    match format {
        InputFormat::Octal => i64::from_str_radix(text, 8).ok(),
        InputFormat::Hexadecimal => i64::from_str_radix(strip_hex(text).unwrap_or(text), 16).ok(),
        _ => match strip_hex(text) {
            Some(digits) => i64::from_str_radix(digits, 16).ok(),
            None => text.parse().ok(),
        },
    }
}

fn parse_double(text: &str, format: InputFormat) -> Option<f64> {
    #[allow(clippy::cast_precision_loss)]
    let integer = |value: i64| value as f64;
    match format {
        InputFormat::Octal | InputFormat::Hexadecimal => parse_integer(text, format).map(integer),
        _ if strip_hex(text).is_some() => parse_integer(text, format).map(integer),
        _ => text.parse::<f64>().ok().filter(|value| !value.is_nan()),
    }
}

fn strip_hex(text: &str) -> Option<&str> {
    text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(state: &ChannelState, text: &str, format: InputFormat) -> Result<Option<WriteRequest>, DisplayError> {
        request_value("PV", state, text, format, "test")
    }

    #[test]
    fn enum_text_matches_states_before_parsing() {
        let state = ChannelState::connected_enum(0, &["Closed ", "Open"]);
        let request = commit(&state, "Closed", InputFormat::Decimal)
            .expect("commit")
            .expect("request");
        assert_eq!(request.integer, 0);
        let request = commit(&state, "1", InputFormat::Decimal)
            .expect("commit")
            .expect("request");
        assert_eq!(request.integer, 1);
        assert!(commit(&state, "open", InputFormat::Decimal).is_err());
        assert!(commit(&state, "2", InputFormat::Decimal).is_err());
    }

    #[test]
    fn integers_honour_format_and_hex_prefix() {
        let mut state = ChannelState::connected(0.0);
        state.field_type = FieldType::Long;
        let parse = |text, format| {
            commit(&state, text, format)
                .expect("commit")
                .expect("request")
                .integer
        };
        assert_eq!(parse("17", InputFormat::Octal), 15);
        assert_eq!(parse("ff", InputFormat::Hexadecimal), 255);
        assert_eq!(parse("0x10", InputFormat::Decimal), 16);
        assert_eq!(parse("-42", InputFormat::Decimal), -42);
    }

    #[test]
    fn doubles_reject_garbage() {
        let state = ChannelState::connected(0.0);
        let request = commit(&state, " 2.5e1 ", InputFormat::Decimal)
            .expect("commit")
            .expect("request");
        assert!((request.numeric - 25.0).abs() < f64::EPSILON);
        assert_eq!(
            commit(&state, "abc", InputFormat::Decimal),
            Err(DisplayError::InvalidValue("abc".into()))
        );
    }

    #[test]
    fn char_arrays_accept_text_only_in_string_format() {
        let mut state = ChannelState::connected_text("");
        state.field_type = FieldType::Char;
        assert!(commit(&state, "hello", InputFormat::Decimal)
            .expect("commit")
            .is_none());
        let request = commit(&state, "hello", InputFormat::String)
            .expect("commit")
            .expect("request");
        assert_eq!(request.text, "hello");
    }
}
