//! Request ids and task-local propagation.
//!
//! Every request gets a `gw-<uuid-v4>` id when it enters the dispatcher.
//! The id is stored on the [`RequestContext`], written into audit events,
//! and installed in [`REQUEST_ID`] for the lifetime of the request task so
//! tool handlers can read it with [`current`] without it being threaded
//! through their signatures.
//!
//! [`RequestContext`]: crate::middleware::RequestContext

use uuid::Uuid;

tokio::task_local! {
    /// Request id of the task currently running a request
    pub static REQUEST_ID: String;
}

/// Generate a new gateway request id: `"gw-<uuid-v4>"`
#[must_use]
pub fn generate() -> String {
    format!("gw-{}", Uuid::new_v4())
}

/// Request id of the current task, if it runs inside [`with_request_id`]
#[must_use]
pub fn current() -> Option<String> {
    REQUEST_ID.try_with(Clone::clone).ok()
}

/// Run `future` with `request_id` installed as the task-local id
pub async fn with_request_id<F, T>(request_id: String, future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    REQUEST_ID.scope(request_id, future).await
}
