//! Shared test harness for integration tests.
//!
//! [`TestHarness`] starts a full [`App`] on 127.0.0.1 with a scripted ffmpeg
//! and a prober that decides codecs from the file name, so the whole
//! queue-to-HTTP path runs without real media tools.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rc_core::config::Config;
use rc_core::{ItemId, ProbeError, StreamKind};
use rc_pipeline::{QueueSnapshot, RecordingReceiver};
use rc_probe::{MediaInfo, Prober, StreamIndex, StreamInfo};
use reelcast::App;
use tempfile::TempDir;

/// `*.mp4` is H.264/AAC in MP4, which the baseline device plays directly.
/// Anything else is HEVC/AAC in Matroska and needs a job.
pub struct NameProber;

#[async_trait]
impl Prober for NameProber {
    fn name(&self) -> &'static str {
        "name"
    }

    fn supports(&self, _path: &Path) -> bool {
        true
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        let size = std::fs::metadata(path)
            .map_err(|e| ProbeError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .len();
        let name = path.to_string_lossy();
        let (container, video) = if name.ends_with(".mp4") {
            ("mp4", "h264")
        } else {
            ("mkv", "hevc")
        };
        Ok(MediaInfo {
            file_path: path.to_path_buf(),
            file_size: size,
            container: container.into(),
            duration: Some(Duration::from_secs(90)),
            streams: vec![
                StreamInfo::new(StreamIndex::new(0), StreamKind::Video, video),
                StreamInfo::new(StreamIndex::new(1), StreamKind::Audio, "aac"),
            ],
        })
    }
}

/// Artifact runs write a stub and exit. Transcode runs write
/// `transcoded:<input name>`, report progress and wait for `go_<input name>`.
const FAKE_FFMPEG: &str = r#"#!/bin/sh
dir=$(dirname "$0")
prev=""
input=""
last=""
for a in "$@"; do
  if [ "$prev" = "-i" ]; then input="$a"; fi
  prev="$a"
  last="$a"
done
case "$*" in
  *-progress*) ;;
  *) printf 'artifact' > "$last"; exit 0 ;;
esac
name=$(basename "$input")
printf 'transcoded:%s' "$name" > "$last"
echo "out_time_us=1000000" >&2
echo "progress=continue" >&2
while [ ! -f "$dir/go_$name" ]; do sleep 0.05; done
echo "progress=end" >&2
exit 0
"#;

pub struct TestHarness {
    pub dir: TempDir,
    pub app: App,
    pub receiver: RecordingReceiver,
    pub client: reqwest::Client,
}

impl TestHarness {
    pub async fn start() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let ffmpeg = dir.path().join("ffmpeg");
        std::fs::write(&ffmpeg, FAKE_FFMPEG).unwrap();
        std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = Config::default();
        config.server.host = "127.0.0.1".into();
        config.server.port = 0;
        config.queue.start_lead_secs = 0;
        config.transcode.output_dir = Some(dir.path().join("out"));
        config.transcode.kill_grace_secs = 1;
        config.streaming.range_wait_timeout_secs = 2;
        config.streaming.poll_interval_ms = 20;
        configure(&mut config);

        let app = App::start_with(&config, Arc::new(NameProber), ffmpeg)
            .await
            .expect("failed to start app");
        let receiver = RecordingReceiver::new();
        app.queue
            .attach_receiver(Arc::new(receiver.clone()))
            .await
            .unwrap();

        Self {
            dir,
            app,
            receiver,
            client: reqwest::Client::new(),
        }
    }

    /// Write a media file into the temp dir and return its path.
    pub fn media(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Let the transcode of `name` finish.
    pub fn go(&self, name: &str) {
        std::fs::write(self.dir.path().join(format!("go_{name}")), "").unwrap();
    }

    pub fn url(&self, route: &str, id: ItemId) -> String {
        format!("{}/{route}/{id}", self.app.base_url)
    }

    pub async fn get(&self, url: &str) -> reqwest::Response {
        self.client.get(url).send().await.unwrap()
    }

    pub async fn get_range(&self, url: &str, range: &str) -> reqwest::Response {
        self.client
            .get(url)
            .header("Range", range)
            .send()
            .await
            .unwrap()
    }

    pub async fn wait_for(
        &self,
        what: &str,
        mut check: impl FnMut(&QueueSnapshot) -> bool,
    ) -> QueueSnapshot {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            let snapshot = self.app.queue.snapshot().await.unwrap();
            if check(&snapshot) {
                return snapshot;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {what}: {snapshot:#?}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
