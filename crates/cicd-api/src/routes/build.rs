//! Build endpoint.
//!
//! Any request below the mount point triggers a build. The path segment after
//! the mount point, if any, is the commit to build.

use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use cicd_core::{BuildId, BuildOutcome, BuildRequest, OutputSink};
use futures::StreamExt;
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, error, info, info_span};

use crate::AppState;
use crate::error::ApiError;

/// Chunks buffered between the build and a slow client.
const OUTPUT_BUFFER: usize = 64;

pub fn router(mount: &str) -> Router<AppState> {
    let base = mount.trim_end_matches('/');
    info!(endpoint = %mount, "Registering build handler");

    let mut router = Router::new()
        .route(&format!("{}/", base), any(build_default))
        .route(&format!("{}/{{*revision}}", base), any(build_revision));
    if !base.is_empty() {
        router = router.route(base, any(build_default));
    }
    router
}

async fn build_default(State(state): State<AppState>) -> Response {
    trigger_build(state, BuildRequest::default_branch()).await
}

async fn build_revision(State(state): State<AppState>, Path(revision): Path<String>) -> Response {
    trigger_build(state, BuildRequest::new(revision)).await
}

/// Run the build pipeline and stream its transcript as the response body.
///
/// The status is committed once the build script writes its first byte;
/// clone progress is held back until then. A build that fails earlier
/// answers 424 with the held transcript and the cause, one that fails later
/// has the cause appended to the already streaming body.
pub async fn trigger_build(state: AppState, request: BuildRequest) -> Response {
    let build_id = BuildId::new();
    let span = info_span!("build", build_id = %build_id, revision = %request.revision());
    info!(
        parent: &span,
        default_branch = request.wants_default_branch(),
        "Got request to build"
    );

    let (mut sink, mut rx) = OutputSink::channel(OUTPUT_BUFFER);

    // The pipeline runs detached so a client disconnect never interrupts a
    // clone or build halfway.
    let task = tokio::spawn(
        async move {
            let result = state.pipeline.execute(&request, &mut sink).await;
            let outcome = BuildOutcome::from(&result);
            let held = sink.take_held();
            let code = match held {
                Some(_) => outcome.status_code(),
                None => StatusCode::OK.as_u16(),
            };
            state.metrics.record(code, outcome);

            match &result {
                Ok(()) => info!(outcome = %outcome, bytes = sink.bytes_written(), "Build finished"),
                Err(e) => {
                    error!(outcome = %outcome, error = %e, "Build failed");
                    if held.is_none() {
                        sink.write(format!("{}\n", e)).await;
                    }
                }
            }
            (result, held)
        }
        .instrument(span),
    );

    match rx.recv().await {
        Some(first) => {
            let body = futures::stream::iter([first])
                .chain(ReceiverStream::new(rx))
                .map(Ok::<_, Infallible>);
            (
                StatusCode::OK,
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                Body::from_stream(body),
            )
                .into_response()
        }
        None => match task.await {
            Ok((Ok(()), held)) => (
                StatusCode::OK,
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                Body::from(held.unwrap_or_default()),
            )
                .into_response(),
            Ok((Err(e), held)) => {
                let transcript = held.unwrap_or_default();
                ApiError::FailedDependency(format!("{}{}", String::from_utf8_lossy(&transcript), e))
                    .into_response()
            }
            Err(e) => ApiError::Internal(format!("build task failed: {}", e)).into_response(),
        },
    }
}
