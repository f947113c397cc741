use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, used for every timestamp.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Highest number of spans covering any single instant.
///
/// Ends sort before starts at the same instant, so back-to-back spans never
/// count as concurrent.
pub fn peak_occupancy(spans: &[Span]) -> u32 {
    let mut events: Vec<(Ms, i32)> = Vec::with_capacity(spans.len() * 2);
    for s in spans {
        events.push((s.start, 1));
        events.push((s.end, -1));
    }
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut count: i32 = 0;
    let mut peak: i32 = 0;
    for (_, delta) in &events {
        count += delta;
        peak = peak.max(count);
    }
    peak as u32
}

// ── Resources ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Room,
    Equipment,
}

/// Catalog entry. The engine only reads `capacity` and `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub id: Ulid,
    pub name: String,
    pub kind: ResourceKind,
    pub category: String,
    /// Max concurrent non-rejected reservations.
    pub capacity: u32,
    pub created_at: Ms,
}

/// Directory entry for a requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: Ulid,
    pub display_name: String,
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReservationStatus::Approved | ReservationStatus::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Approved => "approved",
            ReservationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub requester_id: Ulid,
    pub span: Span,
    pub status: ReservationStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
}

/// Optional narrowing for reservation listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReservationFilter {
    pub resource_id: Option<Ulid>,
    pub requester_id: Option<Ulid>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.resource_id.is_none_or(|id| id == r.resource_id)
            && self.requester_id.is_none_or(|id| id == r.requester_id)
    }
}

// ── Notifications ────────────────────────────────────────────────

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    /// Every administrative viewer.
    Broadcast,
    User(Ulid),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Reservation,
    Resource,
}

impl NotificationCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationCategory::Reservation => "reservation",
            NotificationCategory::Resource => "resource",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Ulid,
    pub target: Target,
    pub category: NotificationCategory,
    pub message: String,
    pub read: bool,
    pub created_at: Ms,
}

/// WAL record format. Reservation and notification records carry the full
/// row so replay never has to merge partial updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ResourceRegistered { resource: ResourceInfo },
    ResourceUpdated { resource: ResourceInfo },
    ResourceRemoved { id: Ulid },
    UserRegistered { id: Ulid, display_name: String },
    UserRemoved { id: Ulid },
    ReservationAdmitted { reservation: Reservation },
    ReservationUpdated { reservation: Reservation },
    NotificationEmitted { notification: Notification },
    NotificationRead { id: Ulid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.overlaps(&Span::new(199, 300)));
        assert!(!s.overlaps(&Span::new(200, 300))); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_single_ms_overlap() {
        let a = Span::new(100, 201);
        let b = Span::new(200, 300);
        assert!(a.overlaps(&b));
    }

    #[test]
    fn peak_occupancy_counts_stacked_spans() {
        let spans = [Span::new(0, 100), Span::new(50, 150), Span::new(60, 70)];
        assert_eq!(peak_occupancy(&spans), 3);
    }

    #[test]
    fn peak_occupancy_back_to_back_is_one() {
        let spans = [Span::new(0, 100), Span::new(100, 200), Span::new(200, 300)];
        assert_eq!(peak_occupancy(&spans), 1);
    }

    #[test]
    fn peak_occupancy_empty() {
        assert_eq!(peak_occupancy(&[]), 0);
    }

    #[test]
    fn status_terminal() {
        assert!(!ReservationStatus::Pending.is_terminal());
        assert!(ReservationStatus::Approved.is_terminal());
        assert!(ReservationStatus::Rejected.is_terminal());
        assert_eq!(ReservationStatus::Rejected.to_string(), "rejected");
    }

    #[test]
    fn filter_matches() {
        let rid = Ulid::new();
        let uid = Ulid::new();
        let r = Reservation {
            id: Ulid::new(),
            resource_id: rid,
            requester_id: uid,
            span: Span::new(0, 10),
            status: ReservationStatus::Pending,
            created_at: 0,
            updated_at: 0,
        };
        assert!(ReservationFilter::default().matches(&r));
        assert!(ReservationFilter { resource_id: Some(rid), requester_id: None }.matches(&r));
        assert!(!ReservationFilter { resource_id: None, requester_id: Some(Ulid::new()) }.matches(&r));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::NotificationEmitted {
            notification: Notification {
                id: Ulid::new(),
                target: Target::User(Ulid::new()),
                category: NotificationCategory::Reservation,
                message: "Your reservation has been approved".into(),
                read: false,
                created_at: 42,
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn category_serializes_lowercase() {
        let json = serde_json::to_string(&NotificationCategory::Reservation).unwrap();
        assert_eq!(json, "\"reservation\"");
    }
}
