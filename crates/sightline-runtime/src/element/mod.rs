//! Bound display elements.
//!
//! An element is one widget of a flattened display that references
//! channels. Its [`ElementKind`] decides which channels it declares, how an
//! update changes its observable [`ElementView`], and what a user
//! interaction writes back.

#![allow(missing_docs)]

mod format;
mod interact;
mod kind;
mod update;

use serde::Serialize;
use sightline_calc::{CalcError, Program};
use smol_str::SmolStr;

use crate::error::DisplayError;
use crate::registry::{ElementId, SlotId};
use crate::value::{Limits, Severity};

pub use format::{enum_text, format_value};
pub use interact::{Interaction, Outbound};
pub use kind::{
    AnalogSpec, CalcSpec, CartesianSpec, ColorMode, DecorationSpec, Direction, ElementClass,
    ElementKind, EraseMode, ImageSpec, InputFormat, MessageSpec, RelatedSpec, TextSpec,
    VisibilityMode, MAX_CARTESIAN_CURVES, MAX_STRIP_CURVES,
};
pub(crate) use update::UpdateContext;
pub use update::STRIP_HISTORY;

/// What a declared channel means to the element that declares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    /// The primary monitored value.
    Value,
    /// Expression input `A`..`D`.
    Input(u8),
    /// Soft channel a calc element writes its result to.
    SoftOutput,
    /// Channel supplying enum state names.
    EnumSource,
    Row(u16),
    CurveX(u8),
    CurveY(u8),
    Trigger,
    Count,
    Erase,
}

/// A channel reference as written in the document, before substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDecl {
    pub name: SmolStr,
    pub role: Role,
}

/// A compiled expression. Compile errors are kept and reported on every
/// evaluation, so a broken expression behaves like one that fails to run.
#[derive(Debug, Clone)]
pub struct Expression {
    text: SmolStr,
    program: Result<Program, CalcError>,
}

impl Expression {
    #[must_use]
    pub fn compile(text: &str) -> Self {
        Self {
            text: SmolStr::new(text.trim()),
            program: sightline_calc::compile(text),
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.program.is_ok()
    }

    pub fn evaluate(&self, inputs: &[f64]) -> Result<f64, DisplayError> {
        match &self.program {
            Ok(program) => Ok(program.evaluate(inputs)?),
            Err(err) => Err(err.clone().into()),
        }
    }
}

/// Colour policy currently shown by an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Palette {
    #[default]
    Default,
    Static,
    Alarm,
    NotConnected,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TableRow {
    pub name: SmolStr,
    pub text: SmolStr,
    #[serde(skip_serializing_if = "SmolStr::is_empty")]
    pub units: SmolStr,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Curve {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Observable state of an element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementView {
    pub connected: bool,
    pub visible: bool,
    pub severity: Severity,
    pub palette: Palette,
    pub writable: bool,
    /// False after the element's expression failed to evaluate.
    pub calc_valid: bool,
    #[serde(skip_serializing_if = "SmolStr::is_empty")]
    pub text: SmolStr,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<SmolStr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    /// Image frame selected by the image expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bit: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limits: Option<Limits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub int_digits: Option<u8>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<TableRow>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<Vec<f64>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub curves: Vec<Curve>,
}

impl Default for ElementView {
    fn default() -> Self {
        Self {
            connected: false,
            visible: true,
            severity: Severity::NotConnected,
            palette: Palette::NotConnected,
            writable: false,
            calc_valid: true,
            text: SmolStr::default(),
            value: None,
            states: Vec::new(),
            index: None,
            frame: None,
            bit: None,
            limits: None,
            precision: None,
            int_digits: None,
            rows: Vec::new(),
            series: Vec::new(),
            curves: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundInput {
    /// Channel name after macro substitution, or the raw text when
    /// substitution could not proceed.
    pub name: SmolStr,
    pub role: Role,
    /// `None` when registration was skipped or failed.
    pub slot: Option<SlotId>,
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingState {
    /// No channel could be bound.
    #[default]
    Unbound,
    Disconnected,
    Connected,
    /// Owning window closed; updates are ignored.
    Released,
}

#[derive(Debug, Clone, Default)]
pub struct ElementBinding {
    pub inputs: Vec<BoundInput>,
    pub state: BindingState,
    /// Static/default colours were applied since the last connect.
    pub static_applied: bool,
    pub(crate) failure_logged: bool,
}

impl ElementBinding {
    #[must_use]
    pub fn input(&self, role: Role) -> Option<&BoundInput> {
        self.inputs.iter().find(|input| input.role == role)
    }

    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.input(role).is_some()
    }

    /// Every bound input is connected.
    #[must_use]
    pub fn all_connected(&self) -> bool {
        self.inputs
            .iter()
            .filter(|input| input.slot.is_some())
            .all(|input| input.connected)
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub id: ElementId,
    pub name: SmolStr,
    pub class: ElementClass,
    pub kind: ElementKind,
    /// File the element was declared in.
    pub origin: SmolStr,
    pub binding: ElementBinding,
    pub view: ElementView,
}

impl Element {
    #[must_use]
    pub fn new(id: ElementId, name: &str, class: ElementClass, kind: ElementKind, origin: &str) -> Self {
        Self {
            id,
            name: SmolStr::new(name),
            class,
            kind,
            origin: SmolStr::new(origin),
            binding: ElementBinding::default(),
            view: ElementView::default(),
        }
    }

    /// Settles the initial state once every declared channel was registered.
    pub fn finish_binding(&mut self) {
        if let ElementKind::Analog(spec) = &self.kind {
            self.view.limits = spec
                .user_limits
                .map(|limits| if spec.direction.inverts() { limits.inverted() } else { limits });
        }
        if self.binding.inputs.iter().any(|input| input.slot.is_some()) {
            self.binding.state = BindingState::Disconnected;
            return;
        }
        self.binding.state = BindingState::Unbound;
        if self.binding.inputs.is_empty() {
            self.view.connected = true;
            self.view.severity = Severity::NoAlarm;
            self.view.palette = Palette::Default;
        }
    }

    /// Channel written by user interactions.
    #[must_use]
    pub fn value_channel(&self) -> Option<&BoundInput> {
        self.binding.input(Role::Value)
    }
}
