mod common;

use common::{widget, Fixture};
use sightline_runtime::{ChannelState, DisplayError, Interaction};

const MODES: &[&str] = &["Off", "Standby", "On"];

#[test]
fn text_entry_commits_enum_by_state_or_index() {
    let mut fixture = Fixture::new("commit-enum");
    fixture.display("main", &widget("caTextEntry", "mode", &[("channel", "MODE")]));
    let window = fixture.engine.open("main", "").expect("open");
    fixture
        .source
        .publish("MODE", ChannelState::connected_enum(0, MODES));
    fixture.engine.pump();

    fixture
        .engine
        .commit(window, "mode", &Interaction::Text("On".into()))
        .expect("by state");
    fixture
        .engine
        .commit(window, "mode", &Interaction::Text(" 1 ".into()))
        .expect("by index");
    let writes = fixture.source.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!((writes[0].name.as_str(), writes[0].integer), ("MODE", 2));
    assert_eq!(writes[0].text, "On");
    assert_eq!(writes[1].integer, 1);
    assert_eq!(writes[1].actor, "mode");
}

#[test]
fn rejected_text_clears_the_entry_and_writes_nothing() {
    let mut fixture = Fixture::new("commit-reject");
    fixture.display("main", &widget("caTextEntry", "mode", &[("channel", "MODE")]));
    let window = fixture.engine.open("main", "").expect("open");
    fixture
        .source
        .publish("MODE", ChannelState::connected_enum(0, MODES));
    fixture.engine.pump();
    assert_eq!(fixture.engine.element(window, "mode").expect("mode").view.text, "Off");

    let result = fixture
        .engine
        .commit(window, "mode", &Interaction::Text("3".into()));
    assert_eq!(result, Err(DisplayError::InvalidValue("3".into())));
    assert_eq!(fixture.engine.element(window, "mode").expect("mode").view.text, "");
    assert!(fixture.source.writes().is_empty());
}

#[test]
fn menu_selection_writes_the_state_text() {
    let mut fixture = Fixture::new("commit-menu");
    fixture.display("main", &widget("caMenu", "menu", &[("channel", "MODE")]));
    let window = fixture.engine.open("main", "").expect("open");
    fixture
        .source
        .publish("MODE", ChannelState::connected_enum(0, MODES));
    fixture.engine.pump();
    fixture
        .engine
        .commit(window, "menu", &Interaction::Select(1))
        .expect("select");
    let writes = fixture.source.writes();
    assert_eq!(writes[0].text, "Standby");
    assert_eq!(writes[0].integer, 1);
    assert!(fixture
        .engine
        .commit(window, "menu", &Interaction::Select(3))
        .is_err());
}

#[test]
fn slider_writes_are_clamped_to_its_limits() {
    let mut fixture = Fixture::new("commit-slider");
    fixture.display("main", &widget("caSlider", "knob", &[("channel", "SP")]));
    let window = fixture.engine.open("main", "").expect("open");
    fixture
        .source
        .publish("SP", ChannelState::connected(5.0).with_display_limits(0.0, 10.0));
    fixture.engine.pump();
    fixture
        .engine
        .commit(window, "knob", &Interaction::Number(12.0))
        .expect("number");
    fixture
        .engine
        .commit(window, "knob", &Interaction::Number(-1.0))
        .expect("number");
    let values: Vec<f64> = fixture
        .source
        .writes()
        .iter()
        .map(|write| write.numeric)
        .collect();
    assert_eq!(values, vec![10.0, 0.0]);
}

#[test]
fn message_button_sends_press_and_skips_empty_release() {
    let mut fixture = Fixture::new("commit-message");
    fixture.display(
        "main",
        &widget(
            "caMessageButton",
            "reset",
            &[("channel", "CMD"), ("pressMessage", "1"), ("releaseMessage", "")],
        ),
    );
    let window = fixture.engine.open("main", "").expect("open");
    fixture.source.publish("CMD", ChannelState::connected(0.0));
    fixture.engine.pump();
    fixture
        .engine
        .commit(window, "reset", &Interaction::Press)
        .expect("press");
    fixture
        .engine
        .commit(window, "reset", &Interaction::Release)
        .expect("release");
    let writes = fixture.source.writes();
    assert_eq!(writes.len(), 1);
    assert!((writes[0].numeric - 1.0).abs() < f64::EPSILON);
}

#[test]
fn monitors_do_not_accept_input() {
    let mut fixture = Fixture::new("commit-monitor");
    fixture.display("main", &widget("caLineEdit", "readback", &[("channel", "PV")]));
    let window = fixture.engine.open("main", "").expect("open");
    fixture.source.publish("PV", ChannelState::connected(1.0));
    fixture.engine.pump();
    assert!(matches!(
        fixture
            .engine
            .commit(window, "readback", &Interaction::Text("2".into())),
        Err(DisplayError::InvalidValue(_))
    ));
    assert!(matches!(
        fixture
            .engine
            .commit(window, "missing", &Interaction::Text("2".into())),
        Err(DisplayError::NotFound(_))
    ));
}

#[test]
fn writes_to_soft_channels_stay_local_and_redispatch() {
    let mut fixture = Fixture::new("commit-soft");
    fixture.display(
        "main",
        &[
            widget("caTextEntry", "entry", &[("channel", "LOCAL")]),
            widget("caCalc", "holder", &[("variable", "LOCAL"), ("calc", "0")]),
        ]
        .concat(),
    );
    let window = fixture.engine.open("main", "").expect("open");
    fixture.engine.pump();
    fixture
        .engine
        .commit(window, "entry", &Interaction::Text("12.5".into()))
        .expect("commit");
    assert!(fixture.engine.pump() > 0);
    assert!(fixture.source.writes().is_empty());
    for name in ["entry", "holder"] {
        let element = fixture.engine.element(window, name).expect(name);
        assert_eq!(element.view.value, Some(12.5), "{name}");
    }
}

#[test]
fn write_channel_parses_against_the_cached_type() {
    let mut fixture = Fixture::new("write-channel");
    fixture.display("main", &widget("caLineEdit", "readback", &[("channel", "PV")]));
    fixture.engine.open("main", "").expect("open");
    fixture.source.publish("PV", ChannelState::connected(0.0));
    fixture.engine.pump();

    fixture.engine.write_channel("PV", "3.5", "cli").expect("write");
    let writes = fixture.source.writes();
    assert_eq!(writes[0].actor, "cli");
    assert!((writes[0].numeric - 3.5).abs() < f64::EPSILON);
    assert!(matches!(
        fixture.engine.write_channel("PV", "fast", "cli"),
        Err(DisplayError::InvalidValue(_))
    ));
    assert!(matches!(
        fixture.engine.write_channel("NOPE", "1", "cli"),
        Err(DisplayError::NotFound(_))
    ));
}

#[test]
fn related_display_opens_with_its_own_macros() {
    let mut fixture = Fixture::new("related");
    fixture.display(
        "main",
        &[
            widget(
                "caRelatedDisplay",
                "more",
                &[
                    ("labels", "Detail;Summary"),
                    ("files", "$(SEC)_detail;summary"),
                    ("args", "P=$(SEC)"),
                ],
            ),
            widget("caLineEdit", "readback", &[("channel", "PV")]),
        ]
        .concat(),
    );
    fixture.display(
        "S04_detail",
        &widget("caLineEdit", "status", &[("channel", "$(P):STATUS")]),
    );
    let window = fixture.engine.open("main", "SEC=S04").expect("open");

    let detail = fixture
        .engine
        .related_target(window, "more", 0)
        .expect("detail");
    assert_eq!(detail.file, "S04_detail");
    assert_eq!(detail.macros.get("P"), Some("S04"));
    let summary = fixture
        .engine
        .related_target(window, "more", 1)
        .expect("summary");
    assert_eq!(summary.file, "summary");
    assert!(summary.macros.is_empty());
    assert!(fixture.engine.related_target(window, "more", 2).is_err());
    assert!(fixture.engine.related_target(window, "readback", 0).is_err());

    let opened = fixture
        .engine
        .open_related(window, "more", 0)
        .expect("open related");
    assert_ne!(opened, window);
    assert!(fixture
        .source
        .connects()
        .iter()
        .any(|name| name == "S04:STATUS"));
}
