// Request hooks installed by the daemon

use http::header::HeaderName;
use switchboard_api_rpc::{HookContext, RequestHook};
use tracing::debug;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Copies the caller's `x-request-id` onto the reply
pub struct RequestIdHook;

impl RequestHook for RequestIdHook {
    fn run(&self, ctx: &mut HookContext<'_>) {
        let Some(id) = ctx.request().headers().get(REQUEST_ID_HEADER).cloned() else {
            return;
        };
        debug!(request_id = ?id, "Echoing request id");
        ctx.response_headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), id);
    }
}
