//! Display document parsing (`.ui` XML).

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::DisplayError;

/// One `<widget>` of a display document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetNode {
    pub class: SmolStr,
    pub name: SmolStr,
    pub properties: IndexMap<SmolStr, SmolStr>,
    pub children: Vec<WidgetNode>,
}

impl WidgetNode {
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(SmolStr::as_str)
    }

    /// Property value with surrounding whitespace removed; empty values are
    /// treated as absent.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.property(name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// Visits this widget and its descendants depth-first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a WidgetNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// Parses a document and returns its top-level widget.
pub fn parse_document(text: &str) -> Result<WidgetNode, DisplayError> {
    let document = roxmltree::Document::parse(text)
        .map_err(|err| DisplayError::LoadFailure(format!("invalid display XML: {err}").into()))?;
    let root = document
        .root_element()
        .descendants()
        .find(|node| is_element_named(*node, "widget"))
        .ok_or_else(|| DisplayError::LoadFailure("display has no widget".into()))?;
    Ok(build_widget(root))
}

fn build_widget(node: roxmltree::Node<'_, '_>) -> WidgetNode {
    let mut widget = WidgetNode {
        class: SmolStr::new(node.attribute("class").unwrap_or_default()),
        name: SmolStr::new(node.attribute("name").unwrap_or_default()),
        ..WidgetNode::default()
    };
    for child in node.children().filter(roxmltree::Node::is_element) {
        if is_element_named(child, "property") {
            if let (Some(name), Some(value)) = (child.attribute("name"), property_value(child)) {
                widget.properties.insert(SmolStr::new(name), value);
            }
        } else {
            collect_widgets(child, &mut widget.children);
        }
    }
    widget
}

/// Widgets may sit directly under a widget or inside layout/item wrappers.
fn collect_widgets(node: roxmltree::Node<'_, '_>, out: &mut Vec<WidgetNode>) {
    if is_element_named(node, "widget") {
        out.push(build_widget(node));
        return;
    }
    if is_element_named(node, "property") || is_element_named(node, "attribute") {
        return;
    }
    for child in node.children().filter(roxmltree::Node::is_element) {
        collect_widgets(child, out);
    }
}

fn property_value(node: roxmltree::Node<'_, '_>) -> Option<SmolStr> {
    let value = node.children().find(roxmltree::Node::is_element)?;
    let text = value.text().unwrap_or_default();
    match value.tag_name().name() {
        "enum" | "set" => Some(SmolStr::new(
            text.rsplit_once("::").map_or(text, |(_, tail)| tail),
        )),
        "string" | "cstring" | "number" | "double" | "bool" | "float" => Some(SmolStr::new(text)),
        _ => None,
    }
}

fn is_element_named(node: roxmltree::Node<'_, '_>, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name
}

#[cfg(test)]
mod tests {
    use super::*;

    const PANEL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ui version="4.0">
 <class>Form</class>
 <widget class="QWidget" name="Form">
  <property name="geometry"><rect><x>0</x><y>0</y><width>10</width><height>10</height></rect></property>
  <layout class="QGridLayout" name="grid">
   <item row="0" column="0">
    <widget class="caLabel" name="title">
     <property name="text"><string>Beam $(SECTOR)</string></property>
     <property name="visibility"><enum>caLabel::Calc</enum></property>
     <property name="channel"><string>$(P):STAT</string></property>
    </widget>
   </item>
  </layout>
  <widget class="caFrame" name="box">
   <widget class="caLineEdit" name="current">
    <property name="channel"><string>BEAM:CURRENT</string></property>
    <property name="precision"><number>3</number></property>
   </widget>
  </widget>
 </widget>
</ui>
"#;

    #[test]
    fn widgets_are_found_through_layouts() {
        let root = parse_document(PANEL).expect("parse");
        assert_eq!(root.class, "QWidget");
        let names: Vec<&str> = {
            let mut names = Vec::new();
            root.walk(&mut |widget| names.push(widget.name.as_str()));
            names
        };
        assert_eq!(names, vec!["Form", "title", "box", "current"]);
    }

    #[test]
    fn property_values_are_typed_text() {
        let root = parse_document(PANEL).expect("parse");
        let title = &root.children[0];
        assert_eq!(title.property("visibility"), Some("Calc"));
        assert_eq!(title.property("text"), Some("Beam $(SECTOR)"));
        assert_eq!(title.property("geometry"), None);
        assert_eq!(root.children[1].children[0].text("precision"), Some("3"));
    }

    #[test]
    fn malformed_xml_is_a_load_failure() {
        assert!(matches!(
            parse_document("<ui><widget"),
            Err(DisplayError::LoadFailure(_))
        ));
    }
}
