use std::{convert::Infallible, sync::Arc};

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{
        header::{CACHE_CONTROL, CONTENT_TYPE, RETRY_AFTER},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, time::sleep};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::consumers::multipart;

use super::{error::AppError, state::AppState};

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

/// Body of `GET /`.
#[derive(Serialize)]
pub struct StatusResponse {
    app: &'static str,
    version: &'static str,
    started_at: DateTime<Utc>,
    uptime_secs: i64,
    video_initialized: bool,
    load_error: Option<String>,
    frame_count: Option<usize>,
    archive_bytes: Option<usize>,
    frame_duration_ms: Option<u64>,
    fps: Option<f32>,
    stream_clients: usize,
    broadcast_sessions: usize,
    broadcast_port: Option<u16>,
}

/// Body of `POST /config`; `frame_duration_ms` wins if both are set.
#[derive(Debug, Deserialize)]
pub struct PlaybackUpdate {
    frame_duration_ms: Option<u64>,
    fps: Option<f32>,
}

/// Playback timing after an update.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PlaybackSettings {
    /// Minimum milliseconds between frames.
    pub frame_duration_ms: u64,
    /// Equivalent frames per second.
    pub fps: f32,
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let store = state.store().ok();
    Json(StatusResponse {
        app: "video-loop",
        version: crate::VERSION,
        started_at: state.started_at(),
        uptime_secs: (Utc::now() - state.started_at()).num_seconds(),
        video_initialized: state.playback_available(),
        load_error: state.load_error().map(str::to_string),
        frame_count: store.map(|s| s.frame_count()),
        archive_bytes: store.map(|s| s.archive().buffer_len()),
        frame_duration_ms: store.map(|s| s.current_interval().as_millis() as u64),
        fps: store.map(|s| s.current_rate()),
        stream_clients: state.stream_clients(),
        broadcast_sessions: state.broadcast_sessions(),
        broadcast_port: state.broadcast_port(),
    })
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub async fn update_playback(
    State(state): State<Arc<AppState>>,
    Json(update): Json<PlaybackUpdate>,
) -> Result<Json<PlaybackSettings>, AppError> {
    let store = state.store()?;
    match update {
        PlaybackUpdate {
            frame_duration_ms: Some(ms),
            ..
        } => store.set_frame_duration(ms),
        PlaybackUpdate { fps: Some(fps), .. } => store.set_rate(fps),
        _ => {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "expected frame_duration_ms or fps",
            ))
        }
    }

    Ok(Json(PlaybackSettings {
        frame_duration_ms: store.current_interval().as_millis() as u64,
        fps: store.current_rate(),
    }))
}

pub async fn snapshot(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let store = state.store()?;

    let Some(frame) = store.poll(state.clock.now_ms()) else {
        let retry_secs = store.current_interval().as_secs_f32().ceil().max(1.0) as u64;
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from(retry_secs));
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            headers,
            "Unable to obtain frame from the video provider",
        )
            .into_response());
    };

    let mime = frame.format().mime();
    let body = frame.share();
    debug!(ordinal = frame.ordinal(), len = frame.len(), "snapshot served");
    store.release(frame);

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(mime));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));

    Ok((StatusCode::OK, headers, body).into_response())
}

pub async fn stream(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let store = Arc::clone(state.store()?);
    let permit = state
        .stream_limit
        .clone()
        .try_acquire_owned()
        .map_err(|_| AppError::new(StatusCode::SERVICE_UNAVAILABLE, "stream limit reached"))?;

    let clock = Arc::clone(&state.clock);
    let poll_every = state.stream_poll;
    let mut shutdown = state.shutdown_signal();

    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(8);
    tokio::spawn(async move {
        info!("starting streaming");
        'stream: loop {
            if tx.is_closed() || *shutdown.borrow() {
                break;
            }

            if let Some(frame) = store.poll(clock.now_ms()) {
                let parts = multipart::encode_part(&frame);
                store.release(frame);
                for part in parts {
                    if tx.send(Ok(part)).await.is_err() {
                        break 'stream;
                    }
                }
            }

            tokio::select! {
                _ = sleep(poll_every) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break 'stream;
                    }
                }
            }
        }

        drop(permit);
        info!("stopped streaming");
    });

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(multipart::CONTENT_TYPE));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));

    Ok((
        StatusCode::OK,
        headers,
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response())
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    state.metrics.update(&state.metrics_snapshot());
    let output = state.metrics.encode()?;
    Ok((
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::to_bytes,
        extract::State,
        http::{header::CONTENT_TYPE, StatusCode},
        response::IntoResponse,
        Json,
    };
    use tokio::sync::watch;
    use tokio_stream::StreamExt;

    use crate::{
        archive::{ArchivePaths, ArchiveWriter, LoadError, LoadLimits},
        config::HttpConfig,
        playback::{FrameStore, ManualClock},
    };

    use super::*;

    fn test_state(clock: Arc<ManualClock>) -> (Arc<AppState>, watch::Sender<bool>) {
        let mut writer = ArchiveWriter::new();
        writer.push(&[0xFF, 0xD8, 0x01, 0xFF, 0xD9]).unwrap();
        writer.push(&[0xFF, 0xD8, 0x02, 0x02, 0xFF, 0xD9]).unwrap();
        let storage = writer.into_storage().unwrap();
        let store =
            FrameStore::open(&storage, &ArchivePaths::default(), LoadLimits::default()).map(Arc::new);

        let (tx, rx) = watch::channel(false);
        let state = AppState::new(store, clock, &HttpConfig::default(), rx).unwrap();
        (Arc::new(state), tx)
    }

    fn disabled_state() -> Arc<AppState> {
        let (_tx, rx) = watch::channel(false);
        Arc::new(
            AppState::new(
                Err(LoadError::EmptyArchive),
                Arc::new(ManualClock::new(0)),
                &HttpConfig::default(),
                rx,
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn snapshot_returns_current_frame() {
        let clock = Arc::new(ManualClock::new(0));
        let (state, _tx) = test_state(clock.clone());

        let response = snapshot(State(state.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "image/jpeg");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &[0xFF, 0xD8, 0x01, 0xFF, 0xD9]);

        let response = snapshot(State(state.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(RETRY_AFTER));

        clock.advance(100);
        let response = snapshot(State(state)).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), 6);
    }

    #[tokio::test]
    async fn playback_routes_disabled_without_archive() {
        let state = disabled_state();

        let err = snapshot(State(state.clone())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
        let err = stream(State(state.clone())).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);

        let Json(status) = status(State(state.clone())).await;
        assert!(!status.video_initialized);
        assert_eq!(status.load_error.as_deref(), Some("archive contains no frames"));

        let response = metrics(State(state)).await.unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("video_loop_playback_available 0"));
    }

    #[tokio::test]
    async fn stream_emits_multipart_parts() {
        let clock = Arc::new(ManualClock::new(0));
        let (state, _tx) = test_state(clock);

        let response = stream(State(state.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], multipart::CONTENT_TYPE);
        assert!(!response
            .headers()
            .contains_key(axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN));
        assert_eq!(state.stream_clients(), 1);

        let mut body = response.into_body().into_data_stream();
        let header = body.next().await.unwrap().unwrap();
        let frame = body.next().await.unwrap().unwrap();
        assert_eq!(
            &header[..],
            multipart::part_header("image/jpeg", 5).as_bytes()
        );
        assert_eq!(&frame[..], &[0xFF, 0xD8, 0x01, 0xFF, 0xD9]);
    }

    #[tokio::test]
    async fn stream_limit_enforced() {
        let clock = Arc::new(ManualClock::new(0));
        let (state, _tx) = test_state(clock);

        let mut open = Vec::new();
        for _ in 0..HttpConfig::default().max_stream_clients {
            open.push(stream(State(state.clone())).await.unwrap());
        }
        let err = stream(State(state)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn playback_update_applies_rate() {
        let clock = Arc::new(ManualClock::new(0));
        let (state, _tx) = test_state(clock);

        let Json(settings) = update_playback(
            State(state.clone()),
            Json(PlaybackUpdate {
                frame_duration_ms: Some(50),
                fps: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(
            settings,
            PlaybackSettings {
                frame_duration_ms: 50,
                fps: 20.0
            }
        );

        let Json(settings) = update_playback(
            State(state.clone()),
            Json(PlaybackUpdate {
                frame_duration_ms: None,
                fps: Some(0.0),
            }),
        )
        .await
        .unwrap();
        assert_eq!(settings.frame_duration_ms, 100);

        let err = update_playback(
            State(state),
            Json(PlaybackUpdate {
                frame_duration_ms: None,
                fps: None,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
