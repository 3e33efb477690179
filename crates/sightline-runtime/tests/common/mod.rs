#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use sightline_runtime::registry::MonitorRegistry;
use sightline_runtime::source::{ChannelLink, SourceHandle, ValueSource, WriteRequest};
use sightline_runtime::template::SearchPath;
use sightline_runtime::{ChannelState, DisplayError, Engine};
use smol_str::SmolStr;

/// Source driven by the test: connections stay silent until published.
#[derive(Default)]
pub struct ManualSource {
    inner: Mutex<ManualInner>,
}

#[derive(Default)]
struct ManualInner {
    next: u64,
    links: Vec<(u64, SmolStr, ChannelLink)>,
    connects: Vec<SmolStr>,
    writes: Vec<WriteRequest>,
}

impl ManualSource {
    /// Publishes `state` on every open connection of `name`.
    pub fn publish(&self, name: &str, state: ChannelState) -> usize {
        let links: Vec<ChannelLink> = self
            .inner
            .lock()
            .links
            .iter()
            .filter(|(_, link_name, _)| link_name == name)
            .map(|(_, _, link)| link.clone())
            .collect();
        links
            .iter()
            .filter(|link| link.publish(state.clone()))
            .count()
    }

    /// Links handed out for `name`, including closed ones.
    pub fn stale_links(&self) -> Vec<ChannelLink> {
        self.inner
            .lock()
            .links
            .iter()
            .map(|(_, _, link)| link.clone())
            .collect()
    }

    pub fn connects(&self) -> Vec<SmolStr> {
        self.inner.lock().connects.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.inner.lock().links.len()
    }

    pub fn writes(&self) -> Vec<WriteRequest> {
        self.inner.lock().writes.clone()
    }
}

impl ValueSource for ManualSource {
    fn connect(&self, name: &str, link: ChannelLink) -> Result<SourceHandle, DisplayError> {
        let mut inner = self.inner.lock();
        let handle = inner.next;
        inner.next += 1;
        inner.connects.push(SmolStr::new(name));
        inner.links.push((handle, SmolStr::new(name), link));
        Ok(SourceHandle(handle))
    }

    fn disconnect(&self, handle: SourceHandle) {
        self.inner.lock().links.retain(|(id, _, _)| *id != handle.0);
    }

    fn write(&self, request: &WriteRequest) -> Result<(), DisplayError> {
        self.inner.lock().writes.push(request.clone());
        Ok(())
    }
}

pub fn temp_dir(name: &str) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("sightline-{name}-{stamp}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// A display directory, a manual source and an engine searching that
/// directory.
pub struct Fixture {
    pub dir: PathBuf,
    pub source: Arc<ManualSource>,
    pub engine: Engine,
}

impl Fixture {
    pub fn new(name: &str) -> Self {
        Self::with_depth(name, 8)
    }

    pub fn with_depth(name: &str, max_depth: usize) -> Self {
        let dir = temp_dir(name);
        let source = Arc::new(ManualSource::default());
        let registry = MonitorRegistry::new(source.clone(), 256, Duration::from_millis(5));
        let engine = Engine::new(
            registry,
            Box::new(SearchPath::new(vec![dir.clone()])),
            max_depth,
        );
        Self {
            dir,
            source,
            engine,
        }
    }

    /// Writes `<name>.ui` holding `body` under a top-level form widget.
    pub fn display(&self, name: &str, body: &str) {
        std::fs::write(self.dir.join(format!("{name}.ui")), document(name, body))
            .expect("write display");
    }
}

pub fn document(name: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ui version="4.0">
 <class>{name}</class>
 <widget class="QWidget" name="{name}">
{body}
 </widget>
</ui>
"#
    )
}

/// A widget with string properties. Values starting with `enum:` are
/// written as enum properties.
pub fn widget(class: &str, name: &str, properties: &[(&str, &str)]) -> String {
    let mut out = format!(r#"  <widget class="{class}" name="{name}">"#);
    for (key, value) in properties {
        let value = match value.strip_prefix("enum:") {
            Some(value) => format!("<enum>{class}::{value}</enum>"),
            None => format!("<string>{}</string>", escape(value)),
        };
        out.push_str(&format!(r#"<property name="{key}">{value}</property>"#));
    }
    out.push_str("</widget>\n");
    out
}

/// Escapes text for use inside XML element content or attributes.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A widget containing other widgets.
pub fn container(class: &str, name: &str, properties: &[(&str, &str)], children: &str) -> String {
    let open = widget(class, name, properties);
    let open = open.trim_end().trim_end_matches("</widget>");
    format!("{open}\n{children}  </widget>\n")
}
