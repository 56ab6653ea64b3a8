//! Live event feed for the orchestrator: broker, event model and the
//! Server-Sent Events dashboard.

pub mod broker;
pub mod event;
pub mod routes;
pub mod server;
pub mod sse;
pub mod state;

pub use broker::{EventBroker, Subscription, emit};
pub use event::{EventKind, IterationEvent, TokenCounts};
pub use server::{Dashboard, DashboardOptions};
