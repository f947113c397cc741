//! Reservation admission for shared resources: capacity-bounded, overlap-aware
//! booking with a pending → approved/rejected lifecycle and notification fan-out.

pub mod clock;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
pub mod wal;

pub use engine::{Collaborators, Engine, EngineError, TransitionPolicy};
