use crate::stream::EventFrame;
use axum::body::Body;
use axum::http::{HeaderValue, Response, StatusCode, header};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Wrap a session's frame channel in a `text/event-stream` response.
///
/// The drop guard lives inside the body stream, so hyper dropping the body
/// (client went away) cancels the session even if the stream was never
/// polled.
pub(super) fn build_sse_response(
    mut frames: mpsc::Receiver<EventFrame>,
    cancel: CancellationToken,
) -> Response<Body> {
    let guard = cancel.drop_guard();
    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(frame) = frames.recv().await {
            yield Ok::<_, Infallible>(frame.to_sse());
        }
    };

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
