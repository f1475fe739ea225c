//! Request handlers.

use axum::extract::{Request, State};
use opentelemetry::logs::Severity;
use opentelemetry::Context;

use crate::http::middleware::RequestContext;
use crate::server::AppState;

pub const HELLO_BODY: &str = "Hello, World!!!";
pub const HELLO_SPAN_NAME: &str = "hello-world-span";
pub const HELLO_LOG_MESSAGE: &str = "hello world handler in action";

/// Parent for handler spans: the middleware's server span if present,
/// otherwise whatever the caller propagated in the headers.
pub fn parent_context(state: &AppState, request: &Request) -> Context {
    match request.extensions().get::<RequestContext>() {
        Some(RequestContext(cx)) => cx.clone(),
        None => state.handles.propagator().extract(request.headers()),
    }
}

/// `GET /`
pub async fn hello_world(State(state): State<AppState>, request: Request) -> &'static str {
    let parent = parent_context(&state, &request);
    let scope = state.handles.start_span(HELLO_SPAN_NAME, &parent, Vec::new());
    state
        .handles
        .emit_log(scope.context(), Severity::Debug, HELLO_LOG_MESSAGE);
    HELLO_BODY
}
