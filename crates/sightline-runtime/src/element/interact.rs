//! User interactions and the outbound values they produce.

use smol_str::{format_smolstr, SmolStr};

use super::{ElementClass, ElementKind, ElementView, InputFormat};
use crate::error::DisplayError;

/// A user action on an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    /// Text typed into an entry field.
    Text(SmolStr),
    /// Value set on a slider or numeric control.
    Number(f64),
    /// Menu or choice entry picked by position.
    Select(usize),
    Press,
    Release,
}

/// Value to commit to the element's channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Parsed against the channel's field type before it is written.
    Text(SmolStr),
    Number(f64),
}

impl ElementKind {
    /// Outbound value for `interaction`, or `None` when the interaction
    /// writes nothing.
    pub fn on_write(
        &self,
        class: ElementClass,
        view: &ElementView,
        interaction: &Interaction,
    ) -> Result<Option<Outbound>, DisplayError> {
        match (self, interaction) {
            (Self::Text(_), Interaction::Text(text)) if class == ElementClass::TextEntry => {
                Ok(Some(Outbound::Text(text.clone())))
            }
            (Self::Choice(_), Interaction::Select(index)) => {
                if view.states.is_empty() {
                    #[allow(clippy::cast_precision_loss)]
                    let value = *index as f64;
                    return Ok(Some(Outbound::Number(value)));
                }
                view.states
                    .get(*index)
                    .map(|state| Some(Outbound::Text(state.clone())))
                    .ok_or_else(|| DisplayError::InvalidValue(format_smolstr!("{index}")))
            }
            (Self::Analog(_), Interaction::Number(value)) if class.accepts_input() => {
                Ok(Some(Outbound::Number(clamp_to(view, *value))))
            }
            (Self::Analog(_), Interaction::Text(text)) if class.accepts_input() => {
                Ok(Some(Outbound::Text(text.clone())))
            }
            (Self::MessageButton(spec), Interaction::Press) => Ok(message(&spec.press)),
            (Self::MessageButton(spec), Interaction::Release) => Ok(message(&spec.release)),
            _ => Err(DisplayError::InvalidValue(format_smolstr!(
                "{class:?} does not accept {interaction:?}"
            ))),
        }
    }

    /// Format used to parse committed text.
    #[must_use]
    pub fn input_format(&self) -> InputFormat {
        match self {
            Self::Text(spec) => spec.format,
            _ => InputFormat::Decimal,
        }
    }
}

fn message(text: &SmolStr) -> Option<Outbound> {
    (!text.trim().is_empty()).then(|| Outbound::Text(text.clone()))
}

fn clamp_to(view: &ElementView, value: f64) -> f64 {
    match view.limits {
        Some(limits) if !limits.is_degenerate() => {
            value.clamp(limits.low.min(limits.high), limits.low.max(limits.high))
        }
        _ => value,
    }
}
