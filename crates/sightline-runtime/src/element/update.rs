//! Per-kind update handling.

use sightline_calc::MIN_INPUTS;
use smol_str::{format_smolstr, SmolStr};
use tracing::warn;

use super::format::{channel_precision, enum_text, format_value};
use super::kind::{
    AnalogSpec, CalcSpec, CartesianSpec, ColorMode, DecorationSpec, EraseMode, ImageSpec,
    InputFormat, TextSpec, VisibilityMode,
};
use super::{Curve, ElementBinding, ElementClass, ElementKind, ElementView, Palette, Role, TableRow};
use crate::error::DisplayError;
use crate::registry::{MonitorRegistry, Subscriber};
use crate::router::Effect;
use crate::value::{ChannelState, FieldType, Limits};

/// Samples kept per strip plot curve.
pub const STRIP_HISTORY: usize = 1024;

const GAUGE_DEFAULT_LIMITS: Limits = Limits {
    low: 0.0,
    high: 1000.0,
};
const NUMERIC_MAX_PRECISION: u8 = 4;
const TEXT_MAX_PRECISION: u8 = 17;

/// Everything a kind needs to apply one connected update.
pub(crate) struct UpdateContext<'a> {
    pub registry: &'a MonitorRegistry,
    pub subscriber: Subscriber,
    pub class: ElementClass,
    pub element: &'a str,
    pub channel: &'a str,
    pub role: Role,
    pub state: &'a ChannelState,
    pub initialize: bool,
    pub effects: &'a mut Vec<Effect>,
}

impl ElementKind {
    pub(crate) fn on_update(
        &mut self,
        binding: &mut ElementBinding,
        view: &mut ElementView,
        ctx: &mut UpdateContext<'_>,
    ) {
        match self {
            Self::Calc(spec) => update_calc(spec, binding, view, ctx),
            Self::Decoration(spec) => {
                first_input_colors(spec.colors, binding, view, ctx);
                update_visibility(spec, binding, view, ctx);
            }
            Self::Image(spec) => update_image(spec, binding, view, ctx),
            Self::Text(spec) => update_text(spec, binding, view, ctx),
            Self::Choice(colors) => {
                apply_colors(*colors, binding, view, ctx.state);
                view.states.clone_from(&ctx.state.enum_states);
                view.index = Some(ctx.state.ivalue);
                view.text = enum_text(ctx.state);
            }
            Self::Led { bit } => {
                apply_colors(ColorMode::Default, binding, view, ctx.state);
                view.value = Some(ctx.state.value);
                view.bit = Some((ctx.state.ivalue >> *bit) & 1 == 1);
            }
            Self::Byte(colors) => {
                apply_colors(*colors, binding, view, ctx.state);
                view.value = Some(ctx.state.value);
                view.index = Some(ctx.state.ivalue);
            }
            Self::Bitnames => match ctx.role {
                Role::EnumSource => view.states.clone_from(&ctx.state.enum_states),
                _ => {
                    apply_colors(ColorMode::Default, binding, view, ctx.state);
                    view.value = Some(ctx.state.value);
                    view.index = Some(ctx.state.ivalue);
                }
            },
            Self::Analog(spec) => update_analog(spec, binding, view, ctx),
            Self::Table => update_table(view, ctx),
            Self::StripPlot => update_strip(binding, view, ctx),
            Self::CartesianPlot(spec) => update_cartesian(spec, binding, view, ctx),
            Self::MessageButton(_) => apply_colors(ColorMode::Default, binding, view, ctx.state),
            Self::RelatedDisplay(_) => {}
        }
    }
}

/// Static and default colours are applied once per connect; alarm colours
/// follow every update.
fn apply_colors(
    mode: ColorMode,
    binding: &mut ElementBinding,
    view: &mut ElementView,
    state: &ChannelState,
) {
    view.severity = state.severity;
    match mode {
        ColorMode::Alarm => view.palette = Palette::Alarm,
        ColorMode::Static | ColorMode::Default => {
            if !binding.static_applied {
                view.palette = if mode == ColorMode::Static {
                    Palette::Static
                } else {
                    Palette::Default
                };
                binding.static_applied = true;
            }
        }
    }
}

/// Colours of decorations follow the first input, whichever input updated.
fn first_input_colors(
    mode: ColorMode,
    binding: &mut ElementBinding,
    view: &mut ElementView,
    ctx: &UpdateContext<'_>,
) {
    if ctx.role == Role::Input(0) {
        apply_colors(mode, binding, view, ctx.state);
        return;
    }
    let first = binding
        .input(Role::Input(0))
        .and_then(|input| input.slot)
        .and_then(|slot| ctx.registry.state(slot))
        .filter(|state| state.is_connected());
    if let Some(state) = first {
        apply_colors(mode, binding, view, &state);
    }
}

/// Expression inputs: `A`..`D` from the input channels, 0.0 while an input
/// is down, then count, HOPR, status, severity, precision and LOPR of the
/// first input in `G`..`L` once it is connected.
fn gather_inputs(binding: &ElementBinding, registry: &MonitorRegistry) -> [f64; MIN_INPUTS] {
    let mut values = [0.0; MIN_INPUTS];
    let mut first = None;
    for input in &binding.inputs {
        let Role::Input(index) = input.role else {
            continue;
        };
        let Some(state) = input.slot.and_then(|slot| registry.state(slot)) else {
            continue;
        };
        if state.is_connected() {
            if let Some(value) = values.get_mut(usize::from(index)) {
                *value = state.value;
            }
        }
        if first.is_none() {
            first = Some(state);
        }
    }
    if let Some(state) = first.filter(|state| state.is_connected()) {
        values[6] = f64::from(state.count);
        values[7] = state.display.high;
        values[8] = f64::from(state.status);
        values[9] = f64::from(state.severity.code());
        values[10] = f64::from(state.precision);
        values[11] = state.display.low;
    }
    values
}

fn log_failure(binding: &mut ElementBinding, element: &str, text: &str, err: &DisplayError) {
    if !binding.failure_logged {
        warn!("expression '{text}' of '{element}' failed: {err}");
        binding.failure_logged = true;
    }
}

fn update_visibility(
    spec: &DecorationSpec,
    binding: &mut ElementBinding,
    view: &mut ElementView,
    ctx: &UpdateContext<'_>,
) {
    let has_inputs = binding
        .inputs
        .iter()
        .any(|input| matches!(input.role, Role::Input(_)) && input.slot.is_some());
    if !has_inputs {
        view.visible = true;
        return;
    }
    match spec.visibility {
        VisibilityMode::Static => view.visible = true,
        VisibilityMode::IfNotZero => {
            view.visible = gather_inputs(binding, ctx.registry)[0] != 0.0;
        }
        VisibilityMode::IfZero => {
            view.visible = gather_inputs(binding, ctx.registry)[0] == 0.0;
        }
        VisibilityMode::Calc => {
            let Some(expression) = &spec.visibility_calc else {
                view.visible = true;
                return;
            };
            match expression.evaluate(&gather_inputs(binding, ctx.registry)) {
                Ok(result) => {
                    view.visible = result != 0.0;
                    view.calc_valid = true;
                    binding.failure_logged = false;
                }
                Err(err) => {
                    log_failure(binding, ctx.element, expression.text(), &err);
                    view.visible = true;
                    view.calc_valid = false;
                }
            }
        }
    }
}

fn update_image(
    spec: &ImageSpec,
    binding: &mut ElementBinding,
    view: &mut ElementView,
    ctx: &UpdateContext<'_>,
) {
    first_input_colors(spec.decoration.colors, binding, view, ctx);
    update_visibility(&spec.decoration, binding, view, ctx);
    let Some(expression) = &spec.image_calc else {
        return;
    };
    match expression.evaluate(&gather_inputs(binding, ctx.registry)) {
        Ok(result) => {
            #[allow(clippy::cast_possible_truncation)]
            let frame = (result + 0.5) as i64;
            view.frame = (result >= 0.0).then_some(frame);
        }
        Err(err) => {
            log_failure(binding, ctx.element, expression.text(), &err);
            view.calc_valid = false;
        }
    }
}

fn update_calc(
    spec: &CalcSpec,
    binding: &mut ElementBinding,
    view: &mut ElementView,
    ctx: &mut UpdateContext<'_>,
) {
    let has_inputs = binding
        .inputs
        .iter()
        .any(|input| matches!(input.role, Role::Input(_)));
    match ctx.role {
        Role::SoftOutput => {
            view.severity = ctx.state.severity;
            view.palette = Palette::Default;
            view.value = Some(ctx.state.value);
            view.text = format_smolstr!("{}", ctx.state.value);
            if has_inputs || !ctx.initialize {
                return;
            }
        }
        Role::Input(_) => {}
        _ => return,
    }
    let Some(output) = binding.input(Role::SoftOutput).and_then(|input| input.slot) else {
        return;
    };
    match spec.calc.evaluate(&gather_inputs(binding, ctx.registry)) {
        Ok(result) => {
            view.calc_valid = true;
            binding.failure_logged = false;
            if ctx.registry.owns_soft(output, ctx.subscriber) {
                ctx.effects.push(Effect::PublishSoft {
                    slot: output,
                    value: result,
                });
            }
        }
        Err(err) => {
            log_failure(binding, ctx.element, spec.calc.text(), &err);
            view.calc_valid = false;
        }
    }
}

fn update_text(
    spec: &TextSpec,
    binding: &mut ElementBinding,
    view: &mut ElementView,
    ctx: &UpdateContext<'_>,
) {
    apply_colors(spec.colors, binding, view, ctx.state);
    if ctx.initialize || view.precision.is_none() {
        view.precision = Some(
            spec.user_precision
                .unwrap_or_else(|| channel_precision(ctx.state, TEXT_MAX_PRECISION)),
        );
    }
    let precision = usize::from(view.precision.unwrap_or(0));
    let text = format_value(ctx.state, spec.format, precision);
    view.text = if spec.show_units && !ctx.state.units.is_empty() {
        format_smolstr!("{text} {}", ctx.state.units)
    } else {
        text
    };
    view.value = Some(ctx.state.value);
    if ctx.state.field_type == FieldType::Enum {
        view.states.clone_from(&ctx.state.enum_states);
    }
}

fn update_analog(
    spec: &AnalogSpec,
    binding: &mut ElementBinding,
    view: &mut ElementView,
    ctx: &UpdateContext<'_>,
) {
    apply_colors(ColorMode::Default, binding, view, ctx.state);
    if ctx.initialize && spec.user_limits.is_none() {
        let channel = if ctx.class == ElementClass::Slider && !ctx.state.control.is_degenerate() {
            ctx.state.control
        } else {
            ctx.state.display
        };
        let limits = if !channel.is_degenerate() {
            Some(channel)
        } else if ctx.class == ElementClass::Gauge {
            Some(GAUGE_DEFAULT_LIMITS)
        } else {
            None
        };
        if let Some(limits) = limits {
            view.limits = Some(if spec.direction.inverts() {
                limits.inverted()
            } else {
                limits
            });
        }
    }
    if ctx.class == ElementClass::Numeric {
        if ctx.initialize || view.precision.is_none() {
            view.precision = Some(
                spec.user_precision
                    .unwrap_or_else(|| channel_precision(ctx.state, NUMERIC_MAX_PRECISION)),
            );
        }
        view.int_digits = Some(integer_digits(view.limits));
        let precision = usize::from(view.precision.unwrap_or(0));
        view.text = format_value(ctx.state, InputFormat::Decimal, precision);
    }
    view.value = Some(ctx.state.value);
}

/// Digits left of the decimal point needed for the larger limit.
fn integer_digits(limits: Option<Limits>) -> u8 {
    let largest = limits.map_or(0.0, |limits| limits.low.abs().max(limits.high.abs()));
    if largest < 1.0 {
        return 1;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let digits = largest.log10().floor() as u8;
    digits.saturating_add(1).min(15)
}

fn update_table(view: &mut ElementView, ctx: &UpdateContext<'_>) {
    let Role::Row(row) = ctx.role else {
        return;
    };
    let row = usize::from(row);
    if view.rows.len() <= row {
        view.rows.resize_with(row + 1, TableRow::default);
    }
    view.palette = Palette::Alarm;
    let precision = usize::from(channel_precision(ctx.state, TEXT_MAX_PRECISION));
    view.rows[row] = TableRow {
        name: SmolStr::new(ctx.channel),
        text: format_value(ctx.state, InputFormat::Decimal, precision),
        units: ctx.state.units.clone(),
        severity: ctx.state.severity,
    };
    view.severity = view
        .rows
        .iter()
        .map(|row| row.severity)
        .max()
        .unwrap_or_default();
}

fn update_strip(binding: &ElementBinding, view: &mut ElementView, ctx: &UpdateContext<'_>) {
    let Role::Row(curve) = ctx.role else {
        return;
    };
    let curve = usize::from(curve);
    if view.series.len() <= curve {
        view.series.resize_with(curve + 1, Vec::new);
    }
    view.severity = ctx.state.severity;
    view.palette = Palette::Default;
    let mut value = ctx.state.value;
    if curve == 0 {
        if (ctx.initialize || view.limits.is_none()) && !ctx.state.display.is_degenerate() {
            view.limits = Some(ctx.state.display);
        }
    } else if let Some(axis) = binding
        .input(Role::Row(0))
        .and_then(|input| input.slot)
        .and_then(|slot| ctx.registry.state(slot))
        .map(|first| first.display)
    {
        let own = ctx.state.display;
        if !own.is_degenerate() && !axis.is_degenerate() {
            value = axis.low + (value - own.low) * (axis.high - axis.low) / (own.high - own.low);
        }
    }
    let samples = &mut view.series[curve];
    samples.push(value);
    if samples.len() > STRIP_HISTORY {
        let excess = samples.len() - STRIP_HISTORY;
        samples.drain(..excess);
    }
}

fn update_cartesian(
    spec: &mut CartesianSpec,
    binding: &ElementBinding,
    view: &mut ElementView,
    ctx: &UpdateContext<'_>,
) {
    view.severity = ctx.state.severity;
    view.palette = Palette::Default;
    let triggered = binding.has_role(Role::Trigger);
    match ctx.role {
        Role::CurveX(curve) | Role::CurveY(curve) => {
            let curves = if triggered {
                &mut spec.pending
            } else {
                &mut view.curves
            };
            let curve_index = usize::from(curve);
            if curves.len() <= curve_index {
                curves.resize_with(curve_index + 1, Curve::default);
            }
            let target = &mut curves[curve_index];
            let axis = if matches!(ctx.role, Role::CurveX(_)) {
                &mut target.x
            } else {
                &mut target.y
            };
            if ctx.state.vector.is_empty() {
                axis.push(ctx.state.value);
                if let Some(count) = spec.count {
                    if axis.len() > count {
                        let excess = axis.len() - count;
                        axis.drain(..excess);
                    }
                }
            } else {
                axis.clone_from(&ctx.state.vector);
                if let Some(count) = spec.count {
                    axis.truncate(count);
                }
            }
        }
        Role::Trigger => view.curves.clone_from(&spec.pending),
        Role::Count => spec.count = usize::try_from(ctx.state.ivalue).ok(),
        Role::Erase => {
            let erase = match spec.erase_mode {
                EraseMode::IfNotZero => ctx.state.value != 0.0,
                EraseMode::IfZero => ctx.state.value == 0.0,
            };
            if erase {
                view.curves.clear();
                spec.pending.clear();
            }
        }
        _ => {}
    }
}
