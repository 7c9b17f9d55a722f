//! Per-pair handshake state machine.
//!
//! `proposed` is the only live state. Exactly one of `accepted_both`,
//! `declined` or `timed_out` is ever entered, and every event that arrives
//! afterwards is [`Transition::Ignored`]. Duplicate accepts are ignored too,
//! so retransmitted events can never trigger a second game.

use dareduel_types::{SessionId, Timestamp, UserId};

use crate::QueueEntry;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Proposed,
    AcceptedBoth,
    Declined,
    TimedOut,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Proposed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn other(&self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// What an event did to the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Stale or duplicate event; nothing changed.
    Ignored,
    /// First acceptance recorded.
    Accepted { by: Side },
    /// Second acceptance recorded; the session succeeded.
    BothAccepted,
    /// `by` declined; the other side goes back into the queue.
    Declined { by: Side, requeue: Side },
    /// The deadline passed. Sides that never accepted go back into the
    /// queue; sides that had accepted are only told.
    TimedOut {
        requeue: Vec<Side>,
        accepted: Vec<Side>,
    },
}

#[derive(Clone, Debug)]
pub struct MatchSession {
    id: SessionId,
    a: QueueEntry,
    b: QueueEntry,
    state: SessionState,
    accepted_a: bool,
    accepted_b: bool,
    deadline: Timestamp,
}

impl MatchSession {
    /// `a` is the earlier of the two paired entries.
    pub fn new(id: SessionId, a: QueueEntry, b: QueueEntry, deadline: Timestamp) -> Self {
        Self {
            id,
            a,
            b,
            state: SessionState::Proposed,
            accepted_a: false,
            accepted_b: false,
            deadline,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn deadline(&self) -> Timestamp {
        self.deadline
    }

    pub fn entry(&self, side: Side) -> &QueueEntry {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    pub fn side_of(&self, user: &UserId) -> Option<Side> {
        if &self.a.requester == user {
            Some(Side::A)
        } else if &self.b.requester == user {
            Some(Side::B)
        } else {
            None
        }
    }

    pub fn has_accepted(&self, side: Side) -> bool {
        match side {
            Side::A => self.accepted_a,
            Side::B => self.accepted_b,
        }
    }

    pub fn accept(&mut self, side: Side) -> Transition {
        if self.state.is_terminal() || self.has_accepted(side) {
            return Transition::Ignored;
        }
        match side {
            Side::A => self.accepted_a = true,
            Side::B => self.accepted_b = true,
        }
        if self.accepted_a && self.accepted_b {
            self.state = SessionState::AcceptedBoth;
            Transition::BothAccepted
        } else {
            Transition::Accepted { by: side }
        }
    }

    pub fn decline(&mut self, side: Side) -> Transition {
        if self.state.is_terminal() {
            return Transition::Ignored;
        }
        self.state = SessionState::Declined;
        Transition::Declined {
            by: side,
            requeue: side.other(),
        }
    }

    pub fn expire(&mut self) -> Transition {
        if self.state.is_terminal() {
            return Transition::Ignored;
        }
        self.state = SessionState::TimedOut;
        let (accepted, requeue): (Vec<Side>, Vec<Side>) = [Side::A, Side::B]
            .into_iter()
            .partition(|side| self.has_accepted(*side));
        Transition::TimedOut { requeue, accepted }
    }
}
