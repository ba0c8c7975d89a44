//! Request handlers for the two-factor API.

pub mod devices;
pub mod twofactor;

use uuid::Uuid;

/// Authenticated user context. The host service resolves its own session
/// mechanism into this and injects it as a request extension before the
/// router runs.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
}
