//! Contact events and terminal outcomes

use crate::body::{BodyRef, Role};
use crate::manifold::{CollisionManifold, PairKind};
use kinetix_math::Vec2;

/// Episode outcome after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Terminal {
    #[default]
    Ongoing,
    /// A ball touched a goal
    Success,
    /// A ball touched a hazard
    Failure,
}

impl Terminal {
    /// `0`, `1` or `-1`
    pub fn value(self) -> i8 {
        match self {
            Self::Ongoing => 0,
            Self::Success => 1,
            Self::Failure => -1,
        }
    }

    pub fn from_value(value: i8) -> Option<Self> {
        match value {
            0 => Some(Self::Ongoing),
            1 => Some(Self::Success),
            -1 => Some(Self::Failure),
            _ => None,
        }
    }

    pub fn is_done(self) -> bool {
        self != Self::Ongoing
    }

    /// Outcome signalled by one touching pair
    ///
    /// Role values multiply: ball (1) × goal (2) is success, ball (1) ×
    /// hazard (3) is failure.
    pub fn from_roles(a: Role, b: Role) -> Self {
        match a.value() * b.value() {
            2 => Self::Success,
            3 => Self::Failure,
            _ => Self::Ongoing,
        }
    }

    /// Combine the outcomes of every contact in a step; failure wins
    pub fn combine(outcomes: impl IntoIterator<Item = Terminal>) -> Self {
        outcomes.into_iter().fold(Self::Ongoing, |acc, t| match (acc, t) {
            (Self::Failure, _) | (_, Self::Failure) => Self::Failure,
            (Self::Success, _) | (_, Self::Success) => Self::Success,
            _ => Self::Ongoing,
        })
    }
}

/// One contact point of a touching pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactData {
    pub point: Vec2,
    /// From body1 to body2
    pub normal: Vec2,
    pub penetration: f32,
    /// Accumulated normal impulse after the solve
    pub impulse: f32,
}

impl From<&CollisionManifold> for ContactData {
    fn from(manifold: &CollisionManifold) -> Self {
        Self {
            point: manifold.collision_point,
            normal: manifold.normal,
            penetration: manifold.penetration,
            impulse: manifold.acc_impulse_normal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactEventType {
    /// The pair started touching this step
    Started,
    /// The pair was already touching last step
    Persisted,
    /// The pair stopped touching this step
    Stopped,
}

/// Contact state change of a body pair
#[derive(Debug, Clone, PartialEq)]
pub struct ContactEvent {
    pub body1: BodyRef,
    pub body2: BodyRef,
    pub kind: PairKind,
    pub event_type: ContactEventType,
    /// Active contact points; empty for stopped events
    pub contacts: Vec<ContactData>,
}

impl ContactEvent {
    pub fn is_started(&self) -> bool {
        self.event_type == ContactEventType::Started
    }

    pub fn is_stopped(&self) -> bool {
        self.event_type == ContactEventType::Stopped
    }

    /// Whether `body` is one side of the pair
    pub fn involves(&self, body: BodyRef) -> bool {
        self.body1 == body || self.body2 == body
    }

    /// Mean of the contact points
    pub fn average_contact_point(&self) -> Option<Vec2> {
        if self.contacts.is_empty() {
            return None;
        }
        let sum = self.contacts.iter().fold(Vec2::ZERO, |acc, c| acc + c.point);
        Some(sum / self.contacts.len() as f32)
    }

    pub fn total_impulse(&self) -> f32 {
        self.contacts.iter().map(|c| c.impulse).sum()
    }
}

/// Receiver for the events of a step
pub trait PhysicsEventHandler {
    fn on_contact(&mut self, event: &ContactEvent);

    /// Called once at the end of every step
    fn on_terminal(&mut self, _terminal: Terminal) {}
}

/// Handler that buffers every event
#[derive(Debug, Default)]
pub struct EventCollector {
    pub contact_events: Vec<ContactEvent>,
    pub terminal: Terminal,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.contact_events.clear();
        self.terminal = Terminal::Ongoing;
    }

    pub fn started(&self) -> impl Iterator<Item = &ContactEvent> {
        self.contact_events.iter().filter(|e| e.is_started())
    }

    pub fn stopped(&self) -> impl Iterator<Item = &ContactEvent> {
        self.contact_events.iter().filter(|e| e.is_stopped())
    }

    /// Pairs touching after the step
    pub fn touching(&self) -> impl Iterator<Item = &ContactEvent> {
        self.contact_events.iter().filter(|e| !e.is_stopped())
    }
}

impl PhysicsEventHandler for EventCollector {
    fn on_contact(&mut self, event: &ContactEvent) {
        self.contact_events.push(event.clone());
    }

    fn on_terminal(&mut self, terminal: Terminal) {
        self.terminal = terminal;
    }
}

/// Handler that drops everything
pub(crate) struct Discard;

impl PhysicsEventHandler for Discard {
    fn on_contact(&mut self, _event: &ContactEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_products() {
        assert_eq!(Terminal::from_roles(Role::Ball, Role::Goal), Terminal::Success);
        assert_eq!(Terminal::from_roles(Role::Hazard, Role::Ball), Terminal::Failure);
        assert_eq!(Terminal::from_roles(Role::Goal, Role::Goal), Terminal::Ongoing);
        assert_eq!(Terminal::from_roles(Role::None, Role::Hazard), Terminal::Ongoing);
    }

    #[test]
    fn test_failure_takes_precedence() {
        use Terminal::*;
        assert_eq!(Terminal::combine([Success, Failure, Success]), Failure);
        assert_eq!(Terminal::combine([Ongoing, Success]), Success);
        assert_eq!(Terminal::combine([]), Ongoing);
        assert_eq!(Failure.value(), -1);
        assert_eq!(Terminal::from_value(1), Some(Success));
    }

    #[test]
    fn test_collector_filters() {
        let mut collector = EventCollector::new();
        let event = ContactEvent {
            body1: BodyRef::Polygon(0),
            body2: BodyRef::Circle(1),
            kind: PairKind::CirclePolygon,
            event_type: ContactEventType::Started,
            contacts: vec![ContactData {
                point: Vec2::new(1.0, 2.0),
                normal: Vec2::Y,
                penetration: 0.1,
                impulse: 0.5,
            }],
        };
        collector.on_contact(&event);
        collector.on_contact(&ContactEvent {
            event_type: ContactEventType::Stopped,
            contacts: Vec::new(),
            ..event.clone()
        });
        collector.on_terminal(Terminal::Success);

        assert_eq!(collector.started().count(), 1);
        assert_eq!(collector.stopped().count(), 1);
        assert_eq!(collector.touching().count(), 1);
        assert!(event.involves(BodyRef::Circle(1)));
        assert_eq!(event.average_contact_point(), Some(Vec2::new(1.0, 2.0)));
        collector.clear();
        assert!(collector.contact_events.is_empty());
        assert_eq!(collector.terminal, Terminal::Ongoing);
    }
}
