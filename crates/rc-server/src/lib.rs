//! rc-server: the HTTP streaming surface the receiver fetches from.
//!
//! Serves, for the items in the queue controller's window only:
//!
//! - `GET /media/{item_id}` -- range-capable media bytes, including the
//!   output of a transcode that is still running
//! - `GET /subtitle/{item_id}.vtt` and `GET /thumbnail/{item_id}.jpg`
//! - `GET /metadata/{item_id}` -- title and artwork for the now-playing view

pub mod context;
pub mod error;
pub mod progressive;
pub mod range;
pub mod router;
pub mod routes;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use context::ServerContext;
pub use error::ServerError;
pub use router::build_router;

/// Bind the listening socket. Port 0 picks a free port.
pub async fn bind(host: &str, port: u16) -> rc_core::Result<TcpListener> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| rc_core::Error::Validation(format!("invalid server address {host}:{port}: {e}")))?;
    TcpListener::bind(addr)
        .await
        .map_err(|e| rc_core::Error::Internal(format!("failed to bind to {addr}: {e}")))
}

/// Serve requests on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    ctx: ServerContext,
    shutdown: CancellationToken,
) -> rc_core::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!("streaming server listening on {addr}");

    let app = build_router(ctx);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("streaming server stopped");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use rc_core::config::{StreamingConfig, TranscodeConfig};
    use rc_core::{ItemId, StreamKind};
    use rc_parser::ParsedTitle;
    use rc_pipeline::{
        DeviceProfile, JobHandle, JobRequest, MediaMetadata, MediaSource, ServeEntry, ServeTable,
        SubtitleSelection, TranscodeManager,
    };
    use rc_probe::{MediaInfo, StreamIndex, StreamInfo};
    use tower::ServiceExt;

    /// Writes 1,000,000 bytes, reports progress, then waits for a `finish`
    /// file (append 600,000 bytes and succeed) or a `fail` file.
    const FAKE_FFMPEG: &str = r#"#!/bin/sh
dir=$(dirname "$0")
for a in "$@"; do last="$a"; done
head -c 1000000 /dev/zero > "$last"
echo "out_time_us=1000000" >&2
echo "progress=continue" >&2
while [ ! -f "$dir/finish" ] && [ ! -f "$dir/fail" ]; do sleep 0.05; done
if [ -f "$dir/fail" ]; then
  echo "Conversion failed!" >&2
  exit 1
fi
head -c 600000 /dev/zero >> "$last"
echo "progress=end" >&2
exit 0
"#;

    struct Fixture {
        dir: tempfile::TempDir,
        manager: TranscodeManager,
        serve: ServeTable,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = dir.path().join("ffmpeg");
        std::fs::write(&ffmpeg, FAKE_FFMPEG).unwrap();
        std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();
        let config = TranscodeConfig {
            output_dir: Some(dir.path().join("out")),
            kill_grace_secs: 1,
            ..TranscodeConfig::default()
        };
        Fixture {
            manager: TranscodeManager::new(ffmpeg, config),
            serve: ServeTable::new(),
            dir,
        }
    }

    fn metadata() -> MediaMetadata {
        MediaMetadata {
            title: "Movie".into(),
            parsed: ParsedTitle::Unrecognized,
            content_type: "video/mp4".into(),
            duration_secs: Some(60.0),
            thumbnail_url: None,
            subtitle_url: None,
        }
    }

    fn publish(serve: &ServeTable, item_id: ItemId, media: MediaSource) {
        serve.publish([ServeEntry {
            item_id,
            media,
            thumbnail: None,
            subtitle: None,
            metadata: metadata(),
            is_current: true,
        }]);
    }

    impl Fixture {
        /// Start a job and wait until its first million bytes are written.
        async fn running_job(&self) -> JobHandle {
            let source = self.dir.path().join("movie.mkv");
            let info = MediaInfo {
                file_path: source.clone(),
                file_size: 1000,
                container: "mkv".into(),
                duration: Some(Duration::from_secs(60)),
                streams: vec![
                    StreamInfo::new(StreamIndex::new(0), StreamKind::Video, "hevc"),
                    StreamInfo::new(StreamIndex::new(1), StreamKind::Audio, "aac"),
                ],
            };
            let plan = rc_pipeline::plan(
                &info,
                None,
                &SubtitleSelection::None,
                &DeviceProfile::baseline(),
            )
            .unwrap();
            let item_id = ItemId::new();
            let job = self.manager.start_job(JobRequest {
                item_id,
                source,
                plan,
                duration: info.duration,
            });
            let mut status = job.subscribe();
            status
                .wait_for(|s| s.out_time > Duration::ZERO)
                .await
                .unwrap();
            publish(&self.serve, item_id, MediaSource::Job(job.clone()));
            job
        }

        fn touch(&self, name: &str) {
            std::fs::write(self.dir.path().join(name), "").unwrap();
        }

        fn context(&self, streaming: StreamingConfig) -> ServerContext {
            ServerContext::new(self.serve.clone(), streaming)
        }
    }

    fn streaming() -> StreamingConfig {
        StreamingConfig {
            range_wait_timeout_secs: 10,
            chunk_size: 4096,
            poll_interval_ms: 20,
        }
    }

    async fn get(ctx: ServerContext, uri: String, range: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(range) = range {
            request = request.header(header::RANGE, range);
        }
        build_router(ctx)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_len(response: Response) -> usize {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn written_range_is_served_immediately() {
        let f = fixture();
        let job = f.running_job().await;

        let response = get(
            f.context(streaming()),
            format!("/media/{}", job.item_id()),
            Some("bytes=0-99"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-99/*");
        assert_eq!(body_len(response).await, 100);
        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn open_range_on_running_job_is_bounded() {
        let f = fixture();
        let job = f.running_job().await;

        let response = get(
            f.context(streaming()),
            format!("/media/{}", job.item_id()),
            Some("bytes=1000-"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 1000-5095/*");
        assert_eq!(body_len(response).await, 4096);
        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn range_past_written_length_waits_for_more_bytes() {
        let f = fixture();
        let job = f.running_job().await;
        let ctx = f.context(streaming());
        let uri = format!("/media/{}", job.item_id());

        let request = tokio::spawn(async move { get(ctx, uri, Some("bytes=999000-1500000")).await });
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!request.is_finished());

        f.touch("finish");
        let response = request.await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response.headers()[header::CONTENT_RANGE],
            "bytes 999000-1500000/1600000"
        );
        assert_eq!(body_len(response).await, 501_001);
    }

    #[tokio::test]
    async fn range_ending_at_u64_max_waits_for_final_length() {
        let f = fixture();
        let job = f.running_job().await;
        let ctx = f.context(streaming());
        let uri = format!("/media/{}", job.item_id());

        let (wait_ctx, wait_uri) = (ctx.clone(), uri.clone());
        let request = tokio::spawn(async move {
            get(wait_ctx, wait_uri, Some("bytes=0-18446744073709551615")).await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!request.is_finished());

        f.touch("finish");
        let response = request.await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-1599999/1600000");

        let response = get(ctx, uri, Some("bytes=18446744073709551615-")).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[tokio::test]
    async fn failure_during_wait_is_range_unavailable() {
        let f = fixture();
        let job = f.running_job().await;
        let ctx = f.context(streaming());
        let uri = format!("/media/{}", job.item_id());

        let request = tokio::spawn(async move { get(ctx, uri, Some("bytes=999000-1500000")).await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        f.touch("fail");

        let response = request.await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key(header::RETRY_AFTER));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "range_unavailable");
        assert_eq!(json["retryable"], true);
    }

    #[tokio::test]
    async fn stalled_job_times_out() {
        let f = fixture();
        let job = f.running_job().await;
        let config = StreamingConfig {
            range_wait_timeout_secs: 1,
            ..streaming()
        };

        let response = get(
            f.context(config),
            format!("/media/{}", job.item_id()),
            Some("bytes=1200000-1300000"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        f.manager.shutdown().await;
    }

    #[tokio::test]
    async fn unranged_request_follows_growing_output() {
        let f = fixture();
        let job = f.running_job().await;
        let ctx = f.context(streaming());
        let uri = format!("/media/{}", job.item_id());

        let request = tokio::spawn(async move {
            let response = get(ctx, uri, None).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
            body_len(response).await
        });
        tokio::time::sleep(Duration::from_millis(200)).await;
        f.touch("finish");
        assert_eq!(request.await.unwrap(), 1_600_000);
    }

    #[tokio::test]
    async fn items_outside_the_window_are_not_served() {
        let f = fixture();
        let ctx = f.context(streaming());

        let response = get(ctx.clone(), format!("/media/{}", ItemId::new()), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = get(ctx.clone(), "/media/../etc/passwd".into(), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = get(ctx, format!("/subtitle/{}.vtt", ItemId::new()), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn pending_item_asks_for_retry() {
        let f = fixture();
        let item_id = ItemId::new();
        publish(&f.serve, item_id, MediaSource::Pending);

        let response = get(f.context(streaming()), format!("/media/{item_id}"), None).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn direct_play_serves_source_and_metadata() {
        let f = fixture();
        let source: PathBuf = f.dir.path().join("movie.mp4");
        std::fs::write(&source, vec![7u8; 2048]).unwrap();
        let item_id = ItemId::new();
        publish(&f.serve, item_id, MediaSource::Direct(source));
        let ctx = f.context(streaming());

        let response = get(ctx.clone(), format!("/media/{item_id}"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "2048");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");

        let response = get(ctx.clone(), format!("/media/{item_id}"), Some("bytes=4096-")).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);

        let response = get(ctx, format!("/metadata/{item_id}"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["title"], "Movie");
        assert_eq!(json["duration_secs"], 60.0);
    }
}
