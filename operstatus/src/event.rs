// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Status notifications and their effect on counters.

use model::{AggregateStatus, OperStatus};
#[allow(unused)]
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(test, derive(bolero::TypeGenerator))]
pub enum StatusEvent {
    PortUp,
    PortFault,
    PortUnknown,
    PortFaultFromUnknown,
    PortUnknownFromDown,
    PortFaultReset,
    PortFaultResetFromUnknown,
    /// Recompute the status from the counters.
    Commit,
    /// Recheck after a controller came back online.
    ReConnect,
}

impl StatusEvent {
    /// Counter deltas `(down, unknown)` carried by the event.
    #[must_use]
    pub fn deltas(self) -> (i8, i8) {
        match self {
            StatusEvent::PortUp => (0, -1),
            StatusEvent::PortFault => (1, 0),
            StatusEvent::PortUnknown => (0, 1),
            StatusEvent::PortFaultFromUnknown => (1, -1),
            StatusEvent::PortUnknownFromDown => (-1, 1),
            StatusEvent::PortFaultReset => (-1, 0),
            StatusEvent::PortFaultResetFromUnknown => (-1, -1),
            StatusEvent::Commit | StatusEvent::ReConnect => (0, 0),
        }
    }

    #[must_use]
    pub fn is_port_event(self) -> bool {
        !matches!(self, StatusEvent::Commit | StatusEvent::ReConnect)
    }

    /// The event a parent receives when the status of one of its children goes from `from`
    /// to `to`.
    #[must_use]
    pub fn for_edge(from: OperStatus, to: OperStatus) -> Option<StatusEvent> {
        use OperStatus::{Down, Uninit, Unknown, Up};
        match (from, to) {
            (Up | Uninit, Down) => Some(StatusEvent::PortFault),
            (Down, Up | Uninit) => Some(StatusEvent::PortFaultReset),
            (Up | Uninit, Unknown) => Some(StatusEvent::PortUnknown),
            (Unknown, Up | Uninit) => Some(StatusEvent::PortUp),
            (Down, Unknown) => Some(StatusEvent::PortUnknownFromDown),
            (Unknown, Down) => Some(StatusEvent::PortFaultFromUnknown),
            _ => None,
        }
    }

    /// Counters `(down, unknown)` an object in status `status` contributes to its parent when
    /// its changes travel as edge events.
    #[must_use]
    pub fn edge_contribution(status: OperStatus) -> (u32, u32) {
        match status {
            OperStatus::Down => (1, 0),
            OperStatus::Unknown => (0, 1),
            OperStatus::Up | OperStatus::Uninit => (0, 0),
        }
    }
}

fn shift(counter: &mut u32, delta: i8, what: &str) {
    let magnitude = u32::from(delta.unsigned_abs());
    if delta >= 0 {
        *counter = counter.saturating_add(magnitude);
    } else if *counter < magnitude {
        warn!("{what} would go negative, clamping at 0");
        *counter = 0;
    } else {
        *counter -= magnitude;
    }
}

/// Remove a contribution from the counters, clamping at zero.
pub(crate) fn subtract(status: &mut AggregateStatus, down: u32, unknown: u32) {
    if status.is_stand_alone() {
        return;
    }
    if status.down_count < down || status.unknown_count < unknown {
        warn!(
            "Removing ({down}, {unknown}) from ({}, {}), clamping at 0",
            status.down_count, status.unknown_count
        );
    }
    status.down_count = status.down_count.saturating_sub(down);
    status.unknown_count = status.unknown_count.saturating_sub(unknown);
}

/// Apply an event to an aggregate status and return the new derived status.
///
/// A port event on a stand-alone object first turns it into a regular one.
pub(crate) fn apply(status: &mut AggregateStatus, event: StatusEvent) -> OperStatus {
    if event.is_port_event() {
        if status.is_stand_alone() {
            debug!("Clearing stand-alone marker before {event}");
            status.down_count = 0;
        }
        let (down, unknown) = event.deltas();
        shift(&mut status.down_count, down, "down_count");
        shift(&mut status.unknown_count, unknown, "unknown_count");
    }
    status.rederive()
}

#[cfg(test)]
mod test {
    use super::*;
    use model::STAND_ALONE_SENTINEL;

    #[test]
    fn compound_events() {
        let mut st = AggregateStatus::uninit();
        assert_eq!(apply(&mut st, StatusEvent::PortFault), OperStatus::Down);
        assert_eq!(
            apply(&mut st, StatusEvent::PortUnknownFromDown),
            OperStatus::Unknown
        );
        assert_eq!((st.down_count, st.unknown_count), (0, 1));
        assert_eq!(
            apply(&mut st, StatusEvent::PortFaultFromUnknown),
            OperStatus::Down
        );
        assert_eq!(apply(&mut st, StatusEvent::PortUnknown), OperStatus::Unknown);
        assert_eq!(
            apply(&mut st, StatusEvent::PortFaultResetFromUnknown),
            OperStatus::Up
        );
        assert_eq!((st.down_count, st.unknown_count), (0, 0));
    }

    #[test]
    fn clamps_at_zero() {
        let mut st = AggregateStatus::uninit();
        assert_eq!(apply(&mut st, StatusEvent::PortFaultReset), OperStatus::Up);
        assert_eq!(st.down_count, 0);
    }

    #[test]
    fn stand_alone_cleared_by_port_event() {
        let mut st = AggregateStatus::stand_alone(OperStatus::Down);
        assert_eq!(apply(&mut st, StatusEvent::Commit), OperStatus::Down);
        assert_eq!(st.down_count, STAND_ALONE_SENTINEL);
        assert_eq!(apply(&mut st, StatusEvent::PortFault), OperStatus::Down);
        assert_eq!(st.down_count, 1);
    }

    #[test]
    fn edges() {
        use OperStatus::{Down, Uninit, Unknown, Up};
        assert_eq!(StatusEvent::for_edge(Uninit, Up), None);
        assert_eq!(StatusEvent::for_edge(Up, Up), None);
        assert_eq!(StatusEvent::for_edge(Up, Down), Some(StatusEvent::PortFault));
        assert_eq!(
            StatusEvent::for_edge(Unknown, Down),
            Some(StatusEvent::PortFaultFromUnknown)
        );
        // an edge event applied to a fresh parent reproduces the child's contribution
        for (from, to) in [(Up, Down), (Down, Unknown), (Unknown, Up), (Uninit, Unknown)] {
            let mut parent = AggregateStatus::uninit();
            let (d, u) = StatusEvent::edge_contribution(from);
            parent.down_count = d;
            parent.unknown_count = u;
            if let Some(ev) = StatusEvent::for_edge(from, to) {
                apply(&mut parent, ev);
            }
            assert_eq!(
                (parent.down_count, parent.unknown_count),
                StatusEvent::edge_contribution(to)
            );
        }
    }

    #[test]
    fn counters_and_derivation() {
        bolero::check!()
            .with_type()
            .for_each(|events: &Vec<StatusEvent>| {
                let mut st = AggregateStatus::uninit();
                for ev in events {
                    let status = apply(&mut st, *ev);
                    let expected = AggregateStatus::derive(st.down_count, st.unknown_count);
                    assert_eq!(status, expected);
                    assert!(st.down_count <= u32::try_from(events.len()).unwrap());
                    assert!(st.unknown_count <= u32::try_from(events.len()).unwrap());
                }
            });
    }
}
