mod common;

use std::sync::Arc;
use std::time::Duration;

use common::ManualSource;
use sightline_runtime::registry::{
    ChannelKind, ElementId, MonitorRegistry, RegisterOutcome, Registration, Subscriber, WindowId,
};
use sightline_runtime::{ChannelState, DisplayError, MacroTable};

fn subscriber(window: u32, element: u32) -> Subscriber {
    Subscriber {
        window: WindowId(window),
        element: ElementId(element),
        position: 0,
    }
}

fn register(
    registry: &MonitorRegistry,
    name: &str,
    macros: &MacroTable,
    subscriber: Subscriber,
    kind: ChannelKind,
) -> Result<RegisterOutcome, DisplayError> {
    registry.register(Registration {
        name,
        macros,
        subscriber,
        kind,
        origin: "test",
    })
}

fn slot(outcome: Result<RegisterOutcome, DisplayError>) -> sightline_runtime::SlotId {
    match outcome.expect("register") {
        RegisterOutcome::Registered(slot) => slot,
        RegisterOutcome::Skipped => panic!("registration skipped"),
    }
}

#[test]
fn names_equal_after_substitution_share_one_slot() {
    let source = Arc::new(ManualSource::default());
    let registry = MonitorRegistry::new(source.clone(), 16, Duration::ZERO);
    let first = slot(register(
        &registry,
        "$(P):CURRENT",
        &MacroTable::parse("P=BEAM"),
        subscriber(0, 0),
        ChannelKind::External,
    ));
    let second = slot(register(
        &registry,
        " BEAM:CURRENT ",
        &MacroTable::new(),
        subscriber(0, 1),
        ChannelKind::External,
    ));
    let third = slot(register(
        &registry,
        "$(SYS):$(SIG)",
        &MacroTable::parse("SYS=BEAM,SIG=CURRENT"),
        subscriber(1, 0),
        ChannelKind::External,
    ));
    assert_eq!(first, second);
    assert_eq!(first, third);
    assert_eq!(registry.len(), 1);
    assert_eq!(source.connects(), vec!["BEAM:CURRENT"]);
    assert_eq!(registry.lookup("BEAM:CURRENT").expect("lookup").subscribers, 3);
}

#[test]
fn update_reaches_every_subscriber_in_order() {
    let source = Arc::new(ManualSource::default());
    let registry = MonitorRegistry::new(source.clone(), 16, Duration::ZERO);
    let macros = MacroTable::new();
    slot(register(&registry, "PV", &macros, subscriber(0, 0), ChannelKind::External));
    slot(register(&registry, "PV", &macros, subscriber(0, 3), ChannelKind::External));

    assert_eq!(source.publish("PV", ChannelState::connected(1.0)), 1);
    assert_eq!(source.publish("PV", ChannelState::connected(2.0)), 1);

    let first = registry.try_next().expect("first update");
    assert_eq!(first.targets.len(), 2);
    assert!(first.targets.iter().all(|target| target.initialize));
    let second = registry.try_next().expect("second update");
    assert!(second.targets.iter().all(|target| !target.initialize));
    assert!((second.state.value - 2.0).abs() < f64::EPSILON);
    assert!(registry.try_next().is_none());
}

#[test]
fn empty_and_unresolvable_names_are_not_registered() {
    let source = Arc::new(ManualSource::default());
    let registry = MonitorRegistry::new(source.clone(), 16, Duration::ZERO);
    assert_eq!(
        register(&registry, "   ", &MacroTable::new(), subscriber(0, 0), ChannelKind::External),
        Err(DisplayError::EmptyName)
    );
    assert_eq!(
        register(&registry, "$(P):X", &MacroTable::new(), subscriber(0, 0), ChannelKind::External),
        Ok(RegisterOutcome::Skipped)
    );
    assert!(registry.is_empty());
    assert!(source.connects().is_empty());
}

#[test]
fn soft_channels_alias_without_connecting() {
    let source = Arc::new(ManualSource::default());
    let registry = MonitorRegistry::new(source.clone(), 16, Duration::ZERO);
    let macros = MacroTable::new();
    let owner = subscriber(0, 0);
    let alias = subscriber(0, 1);
    let first = slot(register(&registry, "CALC1", &macros, owner, ChannelKind::Soft));
    let second = slot(register(&registry, "CALC1", &macros, alias, ChannelKind::Soft));
    assert_eq!(first, second);
    assert!(source.connects().is_empty());
    assert!(registry.owns_soft(first, owner));
    assert!(!registry.owns_soft(first, alias));

    let snapshot = registry.lookup("CALC1").expect("lookup");
    assert_eq!(snapshot.kind, ChannelKind::Soft);
    assert!(snapshot.state.is_connected());
}

#[test]
fn full_table_reports_exhaustion() {
    let source = Arc::new(ManualSource::default());
    let registry = MonitorRegistry::new(source, 1, Duration::ZERO);
    let macros = MacroTable::new();
    slot(register(&registry, "A", &macros, subscriber(0, 0), ChannelKind::External));
    assert!(matches!(
        register(&registry, "B", &macros, subscriber(0, 1), ChannelKind::External),
        Err(DisplayError::SlotExhausted(name)) if name == "B"
    ));
    // Existing names still dedup on a full table.
    slot(register(&registry, "A", &macros, subscriber(0, 2), ChannelKind::External));
}

#[test]
fn concurrent_producers_never_tear_reads() {
    let source = Arc::new(ManualSource::default());
    let registry = MonitorRegistry::new(source.clone(), 16, Duration::ZERO);
    let slot = slot(register(
        &registry,
        "FAST",
        &MacroTable::new(),
        subscriber(0, 0),
        ChannelKind::External,
    ));
    let producers: Vec<_> = (0..4)
        .map(|worker| {
            let source = Arc::clone(&source);
            std::thread::spawn(move || {
                for step in 0..200 {
                    let value = f64::from(worker * 1000 + step);
                    let state = ChannelState::connected(value).with_display_limits(value, value);
                    source.publish("FAST", state);
                }
            })
        })
        .collect();
    for _ in 0..200 {
        if let Some(state) = registry.state(slot) {
            // Value and limits come from the same publish.
            assert!((state.display.low - state.value).abs() < f64::EPSILON || !state.is_connected());
        }
    }
    for producer in producers {
        producer.join().expect("producer");
    }
    let mut delivered = 0;
    while registry.try_next().is_some() {
        delivered += 1;
    }
    assert_eq!(delivered, 800);
}

#[test]
fn late_registration_catches_up_only_the_new_subscriber() {
    let source = Arc::new(ManualSource::default());
    let registry = MonitorRegistry::new(source.clone(), 16, Duration::ZERO);
    let macros = MacroTable::new();
    let early = subscriber(0, 0);
    let late = subscriber(1, 0);
    slot(register(&registry, "PV", &macros, early, ChannelKind::External));
    source.publish("PV", ChannelState::connected(1.0));
    assert!(registry.try_next().is_some());

    slot(register(&registry, "PV", &macros, late, ChannelKind::External));
    let catch_up = registry.try_next().expect("catch-up");
    assert_eq!(catch_up.targets.len(), 1);
    assert_eq!(catch_up.targets[0].subscriber, late);
    assert!(catch_up.targets[0].initialize);
    assert!(registry.try_next().is_none());

    source.publish("PV", ChannelState::connected(2.0));
    let next = registry.try_next().expect("update");
    assert_eq!(next.targets.len(), 2);
    assert!(next.targets.iter().all(|target| !target.initialize));
}
