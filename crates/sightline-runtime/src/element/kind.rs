//! Element kinds and the channels each kind declares.

use serde::Serialize;
use smol_str::SmolStr;

use crate::template::{MacroTable, WidgetNode};
use crate::value::Limits;

use super::{ChannelDecl, Expression, Role};

/// Widget classes the engine binds. Anything else is a passive container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ElementClass {
    Calc,
    Label,
    Frame,
    Include,
    Graphics,
    PolyLine,
    Image,
    LineEdit,
    TextEntry,
    Menu,
    Choice,
    Led,
    Byte,
    Bitnames,
    Slider,
    Thermo,
    Gauge,
    Numeric,
    Table,
    StripPlot,
    CartesianPlot,
    MessageButton,
    RelatedDisplay,
}

impl ElementClass {
    #[must_use]
    pub fn from_class(class: &str) -> Option<Self> {
        let class = match class.trim() {
            "caCalc" => Self::Calc,
            "caLabel" => Self::Label,
            "caFrame" => Self::Frame,
            "caInclude" => Self::Include,
            "caGraphics" => Self::Graphics,
            "caPolyLine" => Self::PolyLine,
            "caImage" => Self::Image,
            "caLineEdit" => Self::LineEdit,
            "caTextEntry" => Self::TextEntry,
            "caMenu" => Self::Menu,
            "caChoice" => Self::Choice,
            "caLed" => Self::Led,
            "caByte" => Self::Byte,
            "caBitnames" => Self::Bitnames,
            "caSlider" => Self::Slider,
            "caThermo" => Self::Thermo,
            "caLinearGauge" | "caCircularGauge" | "caMeter" => Self::Gauge,
            "caNumeric" | "caApplyNumeric" | "caSpinbox" => Self::Numeric,
            "caTable" => Self::Table,
            "caStripPlot" => Self::StripPlot,
            "caCartesianPlot" => Self::CartesianPlot,
            "caMessageButton" => Self::MessageButton,
            "caRelatedDisplay" => Self::RelatedDisplay,
            _ => return None,
        };
        Some(class)
    }

    /// Classes whose user interactions are written back.
    #[must_use]
    pub fn accepts_input(self) -> bool {
        matches!(
            self,
            Self::TextEntry
                | Self::Menu
                | Self::Choice
                | Self::Slider
                | Self::Numeric
                | Self::MessageButton
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum VisibilityMode {
    #[default]
    Static,
    IfNotZero,
    IfZero,
    Calc,
}

impl VisibilityMode {
    fn parse(text: Option<&str>) -> Self {
        match text.map(|text| text.trim().to_ascii_lowercase()).as_deref() {
            Some("ifnotzero") => Self::IfNotZero,
            Some("ifzero") => Self::IfZero,
            Some("calc") => Self::Calc,
            _ => Self::Static,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ColorMode {
    #[default]
    Default,
    Static,
    Alarm,
}

impl ColorMode {
    fn parse(text: Option<&str>, fallback: Self) -> Self {
        match text.map(|text| text.trim().to_ascii_lowercase()).as_deref() {
            Some("default") => Self::Default,
            Some("static") => Self::Static,
            Some("alarm" | "alarm_default" | "alarm_static") => Self::Alarm,
            _ => fallback,
        }
    }
}

/// Text format of monitor and entry fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum InputFormat {
    #[default]
    Decimal,
    Exponential,
    Compact,
    Hexadecimal,
    Octal,
    String,
}

impl InputFormat {
    #[must_use]
    pub fn parse(text: Option<&str>) -> Self {
        match text.map(|text| text.trim().to_ascii_lowercase()).as_deref() {
            Some("exponential" | "engr_notation") => Self::Exponential,
            Some("compact") => Self::Compact,
            Some("hexadecimal") => Self::Hexadecimal,
            Some("octal") => Self::Octal,
            Some("string") => Self::String,
            _ => Self::Decimal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Direction {
    #[default]
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    fn parse(text: Option<&str>) -> Self {
        match text.map(|text| text.trim().to_ascii_lowercase()).as_deref() {
            Some("down") => Self::Down,
            Some("left") => Self::Left,
            Some("right") => Self::Right,
            _ => Self::Up,
        }
    }

    #[must_use]
    pub fn inverts(self) -> bool {
        matches!(self, Self::Down | Self::Left)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum EraseMode {
    #[default]
    IfNotZero,
    IfZero,
}

#[derive(Debug, Clone)]
pub struct CalcSpec {
    pub calc: Expression,
}

#[derive(Debug, Clone)]
pub struct DecorationSpec {
    pub visibility: VisibilityMode,
    pub visibility_calc: Option<Expression>,
    pub colors: ColorMode,
}

#[derive(Debug, Clone)]
pub struct ImageSpec {
    pub decoration: DecorationSpec,
    pub image_calc: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct TextSpec {
    pub colors: ColorMode,
    pub format: InputFormat,
    /// Precision fixed by the display; otherwise taken from the channel.
    pub user_precision: Option<u8>,
    pub show_units: bool,
}

#[derive(Debug, Clone)]
pub struct AnalogSpec {
    pub user_limits: Option<Limits>,
    pub direction: Direction,
    pub user_precision: Option<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct CartesianSpec {
    pub erase_mode: EraseMode,
    /// Points kept per curve; fixed in the display or set by a count channel.
    pub count: Option<usize>,
    /// Points collected since the last trigger.
    pub pending: Vec<super::Curve>,
}

#[derive(Debug, Clone)]
pub struct MessageSpec {
    pub press: SmolStr,
    pub release: SmolStr,
}

#[derive(Debug, Clone)]
pub struct RelatedSpec {
    pub labels: Vec<SmolStr>,
    pub files: Vec<SmolStr>,
    pub args: Vec<SmolStr>,
}

/// Per-kind configuration and runtime state.
#[derive(Debug, Clone)]
pub enum ElementKind {
    Calc(CalcSpec),
    Decoration(DecorationSpec),
    Image(ImageSpec),
    Text(TextSpec),
    Choice(ColorMode),
    Led { bit: u8 },
    Byte(ColorMode),
    Bitnames,
    Analog(AnalogSpec),
    Table,
    StripPlot,
    CartesianPlot(CartesianSpec),
    MessageButton(MessageSpec),
    RelatedDisplay(RelatedSpec),
}

/// Most curves a strip plot draws.
pub const MAX_STRIP_CURVES: usize = 5;
/// Most curves a cartesian plot draws.
pub const MAX_CARTESIAN_CURVES: usize = 6;

const VISIBILITY_CHANNELS: [&str; 4] = ["channel", "channelB", "channelC", "channelD"];

impl ElementKind {
    /// Builds the kind for `class`, expanding macros in its text properties.
    /// Channel properties stay raw; they are substituted at registration.
    #[must_use]
    pub fn from_widget(class: ElementClass, widget: &WidgetNode, macros: &MacroTable) -> Self {
        let text = |name: &str| widget.text(name).map(|value| macros.expand(value).into_owned());
        match class {
            ElementClass::Calc => Self::Calc(CalcSpec {
                calc: Expression::compile(&text("calc").unwrap_or_default()),
            }),
            ElementClass::Label
            | ElementClass::Frame
            | ElementClass::Include
            | ElementClass::Graphics
            | ElementClass::PolyLine => Self::Decoration(decoration(widget, macros)),
            ElementClass::Image => Self::Image(ImageSpec {
                decoration: decoration(widget, macros),
                image_calc: text("imageCalc").map(|calc| Expression::compile(&calc)),
            }),
            ElementClass::LineEdit | ElementClass::TextEntry => Self::Text(TextSpec {
                colors: ColorMode::parse(widget.text("colorMode"), ColorMode::Default),
                format: InputFormat::parse(widget.text("formatType")),
                user_precision: user_precision(widget),
                show_units: widget
                    .text("unitsEnabled")
                    .is_some_and(|flag| flag.eq_ignore_ascii_case("true")),
            }),
            ElementClass::Menu | ElementClass::Choice => Self::Choice(ColorMode::parse(
                widget.text("colorMode"),
                ColorMode::Default,
            )),
            ElementClass::Led => Self::Led {
                bit: widget
                    .text("bitNr")
                    .and_then(|bit| bit.parse::<u8>().ok())
                    .filter(|bit| *bit < 64)
                    .unwrap_or(0),
            },
            ElementClass::Byte => Self::Byte(ColorMode::parse(
                widget.text("colorMode"),
                ColorMode::Alarm,
            )),
            ElementClass::Bitnames => Self::Bitnames,
            ElementClass::Slider
            | ElementClass::Thermo
            | ElementClass::Gauge
            | ElementClass::Numeric => Self::Analog(AnalogSpec {
                user_limits: user_limits(widget),
                direction: Direction::parse(widget.text("direction")),
                user_precision: user_precision(widget),
            }),
            ElementClass::Table => Self::Table,
            ElementClass::StripPlot => Self::StripPlot,
            ElementClass::CartesianPlot => Self::CartesianPlot(CartesianSpec {
                erase_mode: match widget.text("eraseMode").map(str::to_ascii_lowercase).as_deref()
                {
                    Some("ifzero") => EraseMode::IfZero,
                    _ => EraseMode::IfNotZero,
                },
                count: fixed_count(widget),
                ..CartesianSpec::default()
            }),
            ElementClass::MessageButton => Self::MessageButton(MessageSpec {
                press: SmolStr::new(text("pressMessage").unwrap_or_default()),
                release: SmolStr::new(text("releaseMessage").unwrap_or_default()),
            }),
            ElementClass::RelatedDisplay => Self::RelatedDisplay(RelatedSpec {
                labels: split_list(text("labels")),
                files: split_list(text("files")),
                args: split_list(text("args")),
            }),
        }
    }

    /// Channels this kind monitors, in role order. Positions in the returned
    /// list become subscriber positions.
    #[must_use]
    pub fn on_register(&self, widget: &WidgetNode) -> Vec<ChannelDecl> {
        let mut decls = Vec::new();
        let mut push = |name: Option<&str>, role: Role| {
            if let Some(name) = name {
                decls.push(ChannelDecl {
                    name: SmolStr::new(name),
                    role,
                });
            }
        };
        match self {
            Self::Calc(_) => {
                push(widget.text("variable"), Role::SoftOutput);
                for (idx, property) in VISIBILITY_CHANNELS.iter().enumerate() {
                    push(widget.text(property), Role::Input(input_index(idx)));
                }
            }
            Self::Decoration(_) | Self::Image(_) => {
                for (idx, property) in VISIBILITY_CHANNELS.iter().enumerate() {
                    push(widget.text(property), Role::Input(input_index(idx)));
                }
            }
            Self::Text(_)
            | Self::Choice(_)
            | Self::Led { .. }
            | Self::Byte(_)
            | Self::Analog(_)
            | Self::MessageButton(_) => push(widget.text("channel"), Role::Value),
            Self::Bitnames => {
                push(widget.text("enumChannel"), Role::EnumSource);
                push(widget.text("valueChannel"), Role::Value);
            }
            Self::Table | Self::StripPlot => {
                let limit = if matches!(self, Self::StripPlot) {
                    MAX_STRIP_CURVES
                } else {
                    usize::from(u16::MAX)
                };
                let names = widget.property("channels").unwrap_or_default();
                for (row, name) in names
                    .split(';')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .take(limit)
                    .enumerate()
                {
                    push(Some(name), Role::Row(u16::try_from(row).unwrap_or(u16::MAX)));
                }
            }
            Self::CartesianPlot(_) => {
                for curve in 0..MAX_CARTESIAN_CURVES {
                    let Some(pair) = widget.text(&format!("channels_{}", curve + 1)) else {
                        continue;
                    };
                    let (x, y) = pair.split_once(';').unwrap_or((pair, ""));
                    let curve = input_index(curve);
                    push(Some(x.trim()).filter(|x| !x.is_empty()), Role::CurveX(curve));
                    push(Some(y.trim()).filter(|y| !y.is_empty()), Role::CurveY(curve));
                }
                push(widget.text("triggerChannel"), Role::Trigger);
                push(
                    widget
                        .text("countNumOrChannel")
                        .filter(|count| count.parse::<usize>().is_err()),
                    Role::Count,
                );
                push(widget.text("eraseChannel"), Role::Erase);
            }
            Self::RelatedDisplay(_) => {}
        }
        decls
    }
}

fn fixed_count(widget: &WidgetNode) -> Option<usize> {
    widget
        .text("countNumOrChannel")
        .and_then(|count| count.parse::<usize>().ok())
}

fn decoration(widget: &WidgetNode, macros: &MacroTable) -> DecorationSpec {
    let visibility = VisibilityMode::parse(widget.text("visibility"));
    let visibility_calc = if visibility == VisibilityMode::Calc {
        Some(Expression::compile(&macros.expand(
            widget.text("visibilityCalc").unwrap_or_default(),
        )))
    } else {
        None
    };
    DecorationSpec {
        visibility,
        visibility_calc,
        colors: ColorMode::parse(widget.text("colorMode"), ColorMode::Static),
    }
}

fn user_precision(widget: &WidgetNode) -> Option<u8> {
    let user = widget
        .text("precisionMode")
        .is_some_and(|mode| mode.eq_ignore_ascii_case("user"));
    if !user {
        return None;
    }
    widget
        .text("precision")
        .and_then(|precision| precision.parse::<u8>().ok())
}

fn user_limits(widget: &WidgetNode) -> Option<Limits> {
    let user = widget
        .text("limitsMode")
        .is_some_and(|mode| mode.eq_ignore_ascii_case("user"));
    if !user {
        return None;
    }
    let low = widget.text("minValue")?.parse::<f64>().ok()?;
    let high = widget.text("maxValue")?.parse::<f64>().ok()?;
    Some(Limits::new(low, high))
}

fn split_list(text: Option<String>) -> Vec<SmolStr> {
    text.map(|text| {
        text.split(';')
            .map(|item| SmolStr::new(item.trim()))
            .collect()
    })
    .unwrap_or_default()
}

fn input_index(idx: usize) -> u8 {
    u8::try_from(idx).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn widget(class: &str, properties: &[(&str, &str)]) -> WidgetNode {
        WidgetNode {
            class: SmolStr::new(class),
            name: SmolStr::new("w"),
            properties: properties
                .iter()
                .map(|(key, value)| (SmolStr::new(key), SmolStr::new(value)))
                .collect::<IndexMap<_, _>>(),
            children: Vec::new(),
        }
    }

    fn roles(class: &str, properties: &[(&str, &str)]) -> Vec<Role> {
        let node = widget(class, properties);
        let class = ElementClass::from_class(class).expect("known class");
        ElementKind::from_widget(class, &node, &MacroTable::new())
            .on_register(&node)
            .into_iter()
            .map(|decl| decl.role)
            .collect()
    }

    #[test]
    fn calc_declares_output_before_inputs() {
        assert_eq!(
            roles(
                "caCalc",
                &[("variable", "CALC1"), ("channel", "A"), ("channelC", "C")]
            ),
            vec![Role::SoftOutput, Role::Input(0), Role::Input(2)]
        );
    }

    #[test]
    fn strip_plot_is_capped_at_five_curves() {
        assert_eq!(
            roles("caStripPlot", &[("channels", "a;b;;c;d;e;f;g")]).len(),
            MAX_STRIP_CURVES
        );
    }

    #[test]
    fn cartesian_numeric_count_is_not_a_channel() {
        let found = roles(
            "caCartesianPlot",
            &[("channels_1", "X1;Y1"), ("countNumOrChannel", "100")],
        );
        assert_eq!(found, vec![Role::CurveX(0), Role::CurveY(0)]);
    }

    #[test]
    fn unknown_classes_are_passive() {
        assert!(ElementClass::from_class("QWidget").is_none());
        assert_eq!(
            ElementClass::from_class("caCircularGauge"),
            Some(ElementClass::Gauge)
        );
    }

    #[test]
    fn text_properties_are_macro_expanded() {
        let node = widget(
            "caRelatedDisplay",
            &[("files", "$(SEC)_detail.ui;summary"), ("args", "P=$(SEC)")],
        );
        let kind = ElementKind::from_widget(
            ElementClass::RelatedDisplay,
            &node,
            &MacroTable::parse("SEC=S04"),
        );
        let ElementKind::RelatedDisplay(spec) = kind else {
            panic!("expected related display");
        };
        assert_eq!(spec.files, vec!["S04_detail.ui", "summary"]);
        assert_eq!(spec.args, vec!["P=S04"]);
    }
}
