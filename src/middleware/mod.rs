//! Middleware and extractors for the loan API

mod actor;
mod tracing;

pub use actor::{ActorId, ACTOR_ID_HEADER};
pub use tracing::{request_tracing, IDEMPOTENCY_KEY_HEADER};
