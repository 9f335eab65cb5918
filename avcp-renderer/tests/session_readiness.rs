//! The readiness barrier fires exactly once, after every initial request,
//! whatever order the device answers in.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use avcp_renderer::{
    ApiError, DeviceCapabilities, RendererEvent, Service, SessionEvent, DEFAULT_CONNECTION_ID,
};
use rstest::rstest;
use support::{last_change, reply_connection_info, Scenario, MP3};

#[derive(Debug, Clone, Copy)]
enum Step {
    AvTransport,
    RenderingControl,
    ConnectionInfo,
}

use Step::*;

fn complete(scenario: &Scenario, step: Step, succeed: bool) {
    let transport = &scenario.transport;
    match (step, succeed) {
        (AvTransport, true) => {
            transport
                .expect_subscription(Service::AVTransport)
                .accept(transport, &last_change("AVT", 0, r#"<TransportState val="STOPPED"/>"#));
        }
        (RenderingControl, true) => {
            transport
                .expect_subscription(Service::RenderingControl)
                .accept(transport, &last_change("RCS", 0, r#"<Mute channel="Master" val="0"/>"#));
        }
        (ConnectionInfo, true) => {
            reply_connection_info(transport.expect("GetCurrentConnectionInfo"), "0", "0", MP3);
        }
        (AvTransport, false) => transport.expect_subscription(Service::AVTransport).refuse(),
        (RenderingControl, false) => transport.expect_subscription(Service::RenderingControl).refuse(),
        (ConnectionInfo, false) => transport
            .expect("GetCurrentConnectionInfo")
            .fail(ApiError::NetworkError("timed out".to_string())),
    }
}

fn created_count(scenario: &Scenario) -> usize {
    scenario
        .events
        .lock()
        .iter()
        .filter(|event| matches!(event, RendererEvent::ConnectionCreated { .. }))
        .count()
}

fn run_barrier(order: [Step; 3], outcomes: [bool; 3]) {
    // A non-negotiating device starts session 0 during construction
    let scenario = Scenario::with_capabilities(DeviceCapabilities::standard());
    let session = scenario.renderer.session(DEFAULT_CONNECTION_ID).unwrap();

    let ready = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ready);
    session.subscribe(move |event| {
        if matches!(event, SessionEvent::Ready { .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    for (index, (step, succeed)) in order.into_iter().zip(outcomes).enumerate() {
        assert!(!session.is_ready(), "ready before {step:?}");
        assert_eq!(created_count(&scenario), 0);

        complete(&scenario, step, succeed);

        let expected = usize::from(index == 2);
        assert_eq!(ready.load(Ordering::SeqCst), expected, "after {step:?}");
        assert_eq!(created_count(&scenario), expected);
    }

    assert!(session.is_ready());
    assert!(scenario.transport.pending_actions().is_empty());
    assert_eq!(scenario.transport.pending_subscriptions(), 0);
}

#[rstest]
#[case([AvTransport, RenderingControl, ConnectionInfo])]
#[case([AvTransport, ConnectionInfo, RenderingControl])]
#[case([RenderingControl, AvTransport, ConnectionInfo])]
#[case([RenderingControl, ConnectionInfo, AvTransport])]
#[case([ConnectionInfo, AvTransport, RenderingControl])]
#[case([ConnectionInfo, RenderingControl, AvTransport])]
fn test_ready_fires_once_in_any_order(#[case] order: [Step; 3]) {
    run_barrier(order, [true, true, true]);
}

#[rstest]
#[case([false, true, true])]
#[case([true, false, true])]
#[case([true, true, false])]
#[case([false, false, false])]
fn test_failures_still_release_the_barrier(#[case] outcomes: [bool; 3]) {
    run_barrier([ConnectionInfo, AvTransport, RenderingControl], outcomes);
}

#[test]
fn test_device_without_eventing_waits_for_connection_info_only() {
    let capabilities = DeviceCapabilities {
        av_transport_events: false,
        rendering_control_events: false,
        ..DeviceCapabilities::standard()
    };
    let scenario = Scenario::with_capabilities(capabilities);
    let session = scenario.renderer.session(DEFAULT_CONNECTION_ID).unwrap();

    assert_eq!(scenario.transport.pending_subscriptions(), 0);
    assert!(!session.is_ready());

    complete(&scenario, ConnectionInfo, true);
    assert!(session.is_ready());
    assert_eq!(created_count(&scenario), 1);
}

#[test]
fn test_ready_carries_no_tag_for_the_fixed_connection() {
    let scenario = Scenario::with_capabilities(DeviceCapabilities::standard());
    for step in [AvTransport, RenderingControl, ConnectionInfo] {
        complete(&scenario, step, true);
    }

    let events = scenario.take_events();
    let created: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            RendererEvent::ConnectionCreated {
                connection_id, tag, ..
            } => Some((*connection_id, tag.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(created, vec![(DEFAULT_CONNECTION_ID, None)]);
}

#[test]
fn test_initial_events_populate_state_before_ready() {
    let scenario = Scenario::with_capabilities(DeviceCapabilities::standard());
    let session = scenario.renderer.session(DEFAULT_CONNECTION_ID).unwrap();

    complete(&scenario, AvTransport, true);
    complete(&scenario, RenderingControl, true);
    complete(&scenario, ConnectionInfo, true);

    assert_eq!(session.play_state(), Some(avcp_renderer::PlayState::Stopped));
    assert_eq!(session.is_muted(None), Some(false));
    assert_eq!(session.protocol_info().map(|p| p.to_string()), Some(MP3.to_string()));
}
