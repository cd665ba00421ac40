//! End-to-end tests: queue items through the app and fetch them over HTTP.

#![cfg(unix)]

mod common;

use common::TestHarness;
use rc_core::ItemState;
use rc_pipeline::ReceiverCall;

#[tokio::test]
async fn direct_play_serves_ranges_from_source() {
    let h = TestHarness::start().await;
    let source: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let path = h.media("Movie Name (2024).mp4", &source);

    let ids = h.app.queue.add_files(vec![path]).await.unwrap();
    h.app.queue.set_current(0).await.unwrap();
    h.wait_for("playing", |s| s.items[0].state == ItemState::Playing)
        .await;

    let url = h.url("media", ids[0]);
    assert_eq!(h.receiver.loaded_urls(), vec![url.clone()]);

    let resp = h.get_range(&url, "bytes=100-199").await;
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.headers()["content-range"], "bytes 100-199/10000");
    assert_eq!(resp.headers()["content-type"], "video/mp4");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), &source[100..200]);

    let resp = h.get(&url).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["accept-ranges"], "bytes");
    assert_eq!(resp.bytes().await.unwrap().len(), 10_000);

    let resp = h.get_range(&url, "bytes=20000-").await;
    assert_eq!(resp.status(), 416);
}

#[tokio::test]
async fn metadata_describes_the_item() {
    let h = TestHarness::start().await;
    let path = h.media("Movie Name (2024).mp4", b"payload");

    let ids = h.app.queue.add_files(vec![path]).await.unwrap();
    h.app.queue.set_current(0).await.unwrap();
    h.wait_for("playing", |s| s.items[0].state == ItemState::Playing)
        .await;

    let resp = h.get(&h.url("metadata", ids[0])).await;
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["title"], "Movie Name");
    assert_eq!(json["content_type"], "video/mp4");
    assert_eq!(json["duration_secs"], 90.0);

    let loaded = h.receiver.calls();
    let metadata_url = h.url("metadata", ids[0]);
    assert!(loaded.iter().any(|call| matches!(
        call,
        ReceiverCall::Load { metadata_url: m, .. } if *m == metadata_url
    )));
}

#[tokio::test]
async fn advancing_retires_the_previous_url() {
    let h = TestHarness::start().await;
    let a = h.media("a.mp4", b"first");
    let b = h.media("b.mp4", b"second");

    let ids = h.app.queue.add_files(vec![a, b]).await.unwrap();
    h.app.queue.set_current(0).await.unwrap();
    h.wait_for("a playing", |s| s.items[0].state == ItemState::Playing)
        .await;
    assert_eq!(h.get(&h.url("media", ids[1])).await.status(), 200);

    h.app.queue.playback_sink().playback_complete(ids[0]);
    h.wait_for("b playing", |s| s.items[1].state == ItemState::Playing)
        .await;

    assert_eq!(h.get(&h.url("media", ids[0])).await.status(), 404);
    let resp = h.get(&h.url("media", ids[1])).await;
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"second");
}

#[tokio::test]
async fn transcoded_item_streams_while_running() {
    let h = TestHarness::with_config(|c| c.queue.start_lead_secs = 1).await;
    let path = h.media("show.mkv", b"matroska bytes");

    let ids = h.app.queue.add_files(vec![path]).await.unwrap();
    h.app.queue.set_current(0).await.unwrap();

    // The job reports one second of output, which meets the lead.
    let snap = h
        .wait_for("playing", |s| s.items[0].state == ItemState::Playing)
        .await;
    assert!(snap.items[0].plan.as_ref().unwrap().requires_job());

    let url = h.url("media", ids[0]);
    let resp = h.get_range(&url, "bytes=0-3").await;
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.headers()["content-range"], "bytes 0-3/*");
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"tran");

    h.go("show.mkv");
    let resp = h.get(&url).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"transcoded:show.mkv");

    let resp = h.get_range(&url, "bytes=11-").await;
    assert_eq!(resp.status(), 206);
    assert_eq!(resp.headers()["content-range"], "bytes 11-18/19");
}

#[tokio::test]
async fn unknown_item_is_not_found() {
    let h = TestHarness::start().await;
    let resp = h.get(&format!("{}/media/not-an-id", h.app.base_url)).await;
    assert_eq!(resp.status(), 404);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["retryable"], false);
}

#[tokio::test]
async fn shutdown_removes_transcoded_output() {
    let h = TestHarness::start().await;
    let path = h.media("show.mkv", b"matroska bytes");
    let ids = h.app.queue.add_files(vec![path]).await.unwrap();
    h.app.queue.set_current(0).await.unwrap();
    h.wait_for("transcoding", |s| s.items[0].state == ItemState::Transcoding)
        .await;

    // Wait for the thumbnail so no artifact is written after teardown.
    let metadata_url = h.url("metadata", ids[0]);
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);
    loop {
        let json: serde_json::Value = h.get(&metadata_url).await.json().await.unwrap();
        if json["thumbnail_url"].is_string() {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "no thumbnail: {json}");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(
        h.get(&format!("{}/thumbnail/{}.jpg", h.app.base_url, ids[0]))
            .await
            .status(),
        200
    );

    let out_dir = h.dir.path().join("out");
    let TestHarness { dir, app, .. } = h;
    app.shutdown().await.unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(&out_dir)
        .map(|entries| entries.flatten().map(|e| e.path()).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
    drop(dir);
}
