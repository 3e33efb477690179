//! Display engine: windows, binding and the delivery loop.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use smol_str::SmolStr;
use tracing::{debug, info, warn};

use crate::config::ViewerConfig;
use crate::describe::ChannelDescription;
use crate::element::{
    BindingState, BoundInput, Element, ElementClass, ElementKind, InputFormat, Interaction,
    Outbound, Role,
};
use crate::error::DisplayError;
use crate::registry::{
    ChannelKind, ElementId, MonitorRegistry, RegisterOutcome, Registration, Subscriber, Update,
    WindowId,
};
use crate::router::{DispatchRouter, Effect};
use crate::source::{NullSource, SourceDriverRegistry, ValueSource, WriteRequest};
use crate::template::{
    FileLocator, MacroTable, ResolveReport, SearchPath, TemplateResolver, TemplateScope,
    WidgetNode,
};
use crate::write::request_value;

/// Most updates handled by one [`Engine::pump`] call. Bounds feedback loops
/// between calc elements whose results keep changing.
pub const MAX_PUMP: usize = 1 << 16;

/// One open display.
#[derive(Debug)]
pub struct Window {
    pub id: WindowId,
    pub file: SmolStr,
    pub macros: MacroTable,
    pub report: ResolveReport,
    elements: Vec<Element>,
}

impl Window {
    #[must_use]
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// First element with widget name `name`.
    #[must_use]
    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|element| element.name == name)
    }

    fn element_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements.iter_mut().find(|element| element.name == name)
    }
}

/// Display and macros a related-display entry points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedTarget {
    pub file: SmolStr,
    pub macros: MacroTable,
}

pub struct Engine {
    registry: MonitorRegistry,
    router: DispatchRouter,
    locator: Box<dyn FileLocator + Send>,
    max_depth: usize,
    windows: IndexMap<WindowId, Window>,
    next_window: u32,
}

impl Engine {
    #[must_use]
    pub fn new(
        registry: MonitorRegistry,
        locator: Box<dyn FileLocator + Send>,
        max_depth: usize,
    ) -> Self {
        Self {
            registry,
            router: DispatchRouter::new(),
            locator,
            max_depth,
            windows: IndexMap::new(),
            next_window: 0,
        }
    }

    /// Builds the engine with the configured source driver and search path.
    pub fn from_config(config: &ViewerConfig) -> Result<Self, DisplayError> {
        let drivers = SourceDriverRegistry::default_registry();
        let source: Arc<dyn ValueSource> =
            match drivers.build(&config.source.driver, &config.source.params)? {
                Some(spec) => {
                    info!("value source driver '{}'", spec.name);
                    spec.source
                }
                None => {
                    info!("no value source configured");
                    Arc::new(NullSource::default())
                }
            };
        let registry = MonitorRegistry::new(
            source,
            config.registry.capacity,
            config.registry.teardown_drain,
        );
        let locator = SearchPath::new(config.display.search_path.clone());
        Ok(Self::new(registry, Box::new(locator), config.display.max_depth))
    }

    #[must_use]
    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    #[must_use]
    pub fn router(&self) -> &DispatchRouter {
        &self.router
    }

    /// Opens `file` with a `K=V,..` macro string.
    pub fn open(&mut self, file: &str, macros: &str) -> Result<WindowId, DisplayError> {
        self.open_with(file, MacroTable::parse(macros))
    }

    /// Flattens `file` and binds every element it contains. Updates for the
    /// new window are only delivered by later [`pump`](Self::pump) calls.
    pub fn open_with(&mut self, file: &str, macros: MacroTable) -> Result<WindowId, DisplayError> {
        let id = WindowId(self.next_window);
        let registry = &self.registry;
        let mut elements = Vec::new();
        let resolver = TemplateResolver::new(self.locator.as_ref(), self.max_depth);
        let report = resolver.resolve(file, macros.clone(), &mut |widget, scope| {
            bind(registry, id, &mut elements, widget, scope);
        })?;
        self.next_window = self.next_window.wrapping_add(1);
        info!(
            "opened '{file}' as window {} ({} elements, {} documents)",
            id.0,
            elements.len(),
            report.documents.len()
        );
        self.windows.insert(
            id,
            Window {
                id,
                file: SmolStr::new(file),
                macros,
                report,
                elements,
            },
        );
        Ok(id)
    }

    /// Closes a window and releases every channel only it referenced.
    /// Returns the number of freed slots.
    pub fn close(&mut self, window: WindowId) -> Result<usize, DisplayError> {
        let mut closed = self
            .windows
            .shift_remove(&window)
            .ok_or_else(|| DisplayError::NotFound(smol_str::format_smolstr!("window {}", window.0)))?;
        for element in &mut closed.elements {
            element.binding.state = BindingState::Released;
        }
        Ok(self.registry.release(window))
    }

    #[must_use]
    pub fn window(&self, window: WindowId) -> Option<&Window> {
        self.windows.get(&window)
    }

    pub fn windows(&self) -> impl Iterator<Item = &Window> {
        self.windows.values()
    }

    #[must_use]
    pub fn element(&self, window: WindowId, name: &str) -> Option<&Element> {
        self.window(window)?.element(name)
    }

    /// Delivers queued updates until the queue is empty. Returns the number
    /// of updates handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while handled < MAX_PUMP {
            let Some(update) = self.registry.try_next() else {
                break;
            };
            self.deliver(&update);
            handled += 1;
        }
        if handled == MAX_PUMP {
            warn!("update queue still busy after {MAX_PUMP} deliveries");
        }
        handled
    }

    /// Waits up to `timeout` for a first update, then drains the queue.
    pub fn pump_for(&mut self, timeout: Duration) -> usize {
        match self.registry.next_timeout(timeout) {
            Some(update) => {
                self.deliver(&update);
                1 + self.pump()
            }
            None => 0,
        }
    }

    fn deliver(&mut self, update: &Update) {
        for target in &update.targets {
            let subscriber = target.subscriber;
            let Some(element) = self
                .windows
                .get_mut(&subscriber.window)
                .and_then(|window| window.elements.get_mut(subscriber.element.0 as usize))
            else {
                continue;
            };
            for effect in self.router.dispatch(&self.registry, element, update, *target) {
                match effect {
                    Effect::PublishSoft { slot, value } => {
                        self.registry.publish_soft(slot, value);
                    }
                }
            }
        }
    }

    /// Commits a user interaction on element `name` of `window`.
    ///
    /// Text that does not parse for the channel's field type is rejected
    /// and, for text entries, the typed text is cleared.
    pub fn commit(
        &mut self,
        window: WindowId,
        name: &str,
        interaction: &Interaction,
    ) -> Result<(), DisplayError> {
        let element = self
            .windows
            .get_mut(&window)
            .and_then(|window| window.element_mut(name))
            .ok_or_else(|| DisplayError::NotFound(SmolStr::new(name)))?;
        let Some(outbound) = element
            .kind
            .on_write(element.class, &element.view, interaction)?
        else {
            return Ok(());
        };
        let (channel, slot) = element
            .value_channel()
            .and_then(|input| Some((input.name.clone(), input.slot?)))
            .ok_or_else(|| DisplayError::NotFound(element.name.clone()))?;
        let request = match outbound {
            Outbound::Number(value) => Some(WriteRequest::numeric(&channel, value, &element.name)),
            Outbound::Text(text) => {
                let state = self
                    .registry
                    .state(slot)
                    .ok_or_else(|| DisplayError::NotFound(channel.clone()))?;
                match request_value(
                    &channel,
                    &state,
                    &text,
                    element.kind.input_format(),
                    &element.name,
                ) {
                    Ok(request) => request,
                    Err(err) => {
                        warn!("'{}' rejected input for '{channel}': {err}", element.name);
                        if element.class == ElementClass::TextEntry {
                            element.view.text = SmolStr::default();
                        }
                        return Err(err);
                    }
                }
            }
        };
        match request {
            Some(request) => self.registry.write(&request),
            None => Ok(()),
        }
    }

    /// Writes `text` to a registered channel as if typed into a decimal
    /// entry field.
    pub fn write_channel(&self, name: &str, text: &str, actor: &str) -> Result<(), DisplayError> {
        let snapshot = self.registry.lookup(name)?;
        match request_value(
            &snapshot.name,
            &snapshot.state,
            text,
            InputFormat::Decimal,
            actor,
        )? {
            Some(request) => self.registry.write(&request),
            None => Ok(()),
        }
    }

    pub fn describe(&self, name: &str) -> Result<ChannelDescription, DisplayError> {
        let snapshot = self.registry.lookup(name)?;
        Ok(ChannelDescription::from_snapshot(&snapshot))
    }

    /// Target of entry `index` of a related-display element.
    pub fn related_target(
        &self,
        window: WindowId,
        name: &str,
        index: usize,
    ) -> Result<RelatedTarget, DisplayError> {
        let element = self
            .element(window, name)
            .ok_or_else(|| DisplayError::NotFound(SmolStr::new(name)))?;
        let ElementKind::RelatedDisplay(spec) = &element.kind else {
            return Err(DisplayError::NotFound(SmolStr::new(name)));
        };
        let file = spec
            .files
            .get(index)
            .filter(|file| !file.is_empty())
            .ok_or_else(|| DisplayError::NotFound(smol_str::format_smolstr!("{name}[{index}]")))?;
        let macros = spec
            .args
            .get(index)
            .map(|args| MacroTable::parse(args))
            .unwrap_or_default();
        Ok(RelatedTarget {
            file: file.clone(),
            macros,
        })
    }

    /// Opens entry `index` of a related-display element as a new window.
    pub fn open_related(
        &mut self,
        window: WindowId,
        name: &str,
        index: usize,
    ) -> Result<WindowId, DisplayError> {
        let target = self.related_target(window, name, index)?;
        self.open_with(&target.file, target.macros)
    }
}

fn bind(
    registry: &MonitorRegistry,
    window: WindowId,
    elements: &mut Vec<Element>,
    widget: &WidgetNode,
    scope: &TemplateScope,
) {
    let Some(class) = ElementClass::from_class(&widget.class) else {
        return;
    };
    let Ok(index) = u32::try_from(elements.len()) else {
        return;
    };
    let id = ElementId(index);
    let kind = ElementKind::from_widget(class, widget, scope.macros());
    let decls = kind.on_register(widget);
    let mut element = Element::new(id, &widget.name, class, kind, scope.file());
    for (position, decl) in decls.into_iter().enumerate() {
        let Ok(position) = u16::try_from(position) else {
            break;
        };
        let registration = Registration {
            name: &decl.name,
            macros: scope.macros(),
            subscriber: Subscriber {
                window,
                element: id,
                position,
            },
            kind: if decl.role == Role::SoftOutput {
                ChannelKind::Soft
            } else {
                ChannelKind::External
            },
            origin: scope.file(),
        };
        let (name, slot) = match registry.register(registration) {
            Ok(RegisterOutcome::Registered(slot)) => {
                (SmolStr::new(scope.macros().expand(decl.name.trim())), Some(slot))
            }
            Ok(RegisterOutcome::Skipped) => {
                debug!(
                    "'{}' in '{}': '{}' has unresolved macros",
                    widget.name,
                    scope.file(),
                    decl.name
                );
                (decl.name, None)
            }
            Err(err) => {
                warn!("'{}' in '{}': {err}", widget.name, scope.file());
                (decl.name, None)
            }
        };
        element.binding.inputs.push(BoundInput {
            name,
            role: decl.role,
            slot,
            connected: false,
        });
    }
    element.finish_binding();
    elements.push(element);
}
