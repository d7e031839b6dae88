//! Phase transition computation.
//!
//! The whole chain is rebuilt from the ledger on every pass, so arrival order
//! and duplicates do not matter; only the part of the chain beyond the phase a
//! request already reached is applied.

use keyverify_core::{EventType, Phase};

use crate::channel::ChannelKind;
use crate::events::{EventLedger, RecordedEvent, Side};

/// One step of the phase chain and the message that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub phase: Phase,
    pub event: Option<RecordedEvent>,
}

impl Transition {
    fn new(phase: Phase, event: Option<&RecordedEvent>) -> Self {
        Self {
            phase,
            event: event.cloned(),
        }
    }
}

/// Compute every transition reachable from the recorded messages.
pub fn compute_transitions(ledger: &EventLedger, kind: ChannelKind) -> Vec<Transition> {
    let mut transitions = vec![Transition::new(Phase::Unsent, None)];

    if let Some(cancel) = ledger.by_either(&EventType::Cancel) {
        transitions.push(Transition::new(Phase::Cancelled, Some(cancel)));
        return transitions;
    }

    let request = ledger.by_either(&EventType::Request);
    if let Some(request) = request {
        transitions.push(Transition::new(Phase::Requested, Some(request)));

        // only the party that did not send the request can make it ready
        if let Some(ready) = ledger.by_other(&EventType::Ready, request.side()) {
            transitions.push(Transition::new(Phase::Ready, Some(ready)));
        }
    }

    if let Some(start) = ledger.by_either(&EventType::Start) {
        let eligible = match top(&transitions) {
            Phase::Requested => request.is_some_and(|r| r.side() != start.side()),
            Phase::Ready => true,
            Phase::Unsent => kind.can_create_request(&EventType::Start),
            _ => false,
        };
        if eligible {
            transitions.push(Transition::new(Phase::Started, Some(start)));
        }
    }

    let ours = ledger.by_side(Side::Us).get(&EventType::Done);
    let theirs = ledger.by_side(Side::Them).get(&EventType::Done);
    if ours.is_some() && theirs.is_some() && top(&transitions) == Phase::Started {
        transitions.push(Transition::new(Phase::Done, None));
    }

    transitions
}

/// Select the transitions not yet applied by a request currently in `current`.
///
/// Only steps forming a valid forward chain from `current` are kept, so the
/// phase never moves backwards and terminal phases never change.
pub fn pending_transitions(current: Phase, mut all: Vec<Transition>) -> Vec<Transition> {
    let tail = match all.iter().position(|t| t.phase == current) {
        Some(index) => all.split_off(index + 1),
        None => all,
    };

    let mut phase = current;
    tail.into_iter()
        .filter(|t| {
            let valid = phase.can_transition_to(t.phase);
            if valid {
                phase = t.phase;
            }
            valid
        })
        .collect()
}

fn top(transitions: &[Transition]) -> Phase {
    transitions.last().map_or(Phase::Unsent, |t| t.phase)
}
