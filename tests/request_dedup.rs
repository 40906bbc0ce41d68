mod common;

use common::{Behavior, Harness, HarnessOptions, VIDEO_URL};
use futures::future::join_all;
use std::time::Duration;
use youtube_download_service::artifacts::{AbandonPolicy, ArtifactState};
use youtube_download_service::downloader::{DownloadError, QualitySelector};
use youtube_download_service::ServiceError;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_downloads_share_one_extraction() {
    let h = Harness::new();

    // Different spellings of the same video
    let urls = [
        VIDEO_URL,
        "https://youtu.be/dQw4w9WgXcQ",
        "https://m.youtube.com/watch?v=dQw4w9WgXcQ&feature=share",
        "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
    ];
    let results = join_all(urls.iter().map(|url| {
        let service = h.service.clone();
        let url = url.to_string();
        tokio::spawn(async move { service.request_download(&url, QualitySelector::Best).await })
    }))
    .await;

    let refs: Vec<_> = results.into_iter().map(|r| r.unwrap().unwrap()).collect();
    assert_eq!(h.client.media_calls(), 1);
    assert!(refs.iter().all(|r| r == &refs[0]));
    assert_eq!(refs[0].title, "Never Gonna Give You Up");
    assert_eq!(refs[0].file_name, "Never Gonna Give You Up.mp4");

    let record = h.store.get(&refs[0].id).unwrap();
    assert_eq!(record.state, ArtifactState::Ready);
    assert_eq!(h.store.stats().file_count, 1);
    assert_eq!(h.staging_entries(), 0);
}

#[tokio::test]
async fn concurrent_info_requests_share_one_lookup() {
    let h = Harness::new();
    let results = join_all((0..5).map(|_| h.service.request_info(VIDEO_URL))).await;

    assert_eq!(h.client.metadata_calls(), 1);
    for result in results {
        let meta = result.unwrap();
        assert_eq!(meta.uploader, "Rick Astley");
        assert_eq!(meta.duration_seconds, 213);
    }
}

#[tokio::test]
async fn info_and_download_do_not_share_work() {
    let h = Harness::new();
    let (info, download) = tokio::join!(
        h.service.request_info(VIDEO_URL),
        h.service.request_download(VIDEO_URL, QualitySelector::Best),
    );
    assert!(info.is_ok());
    assert!(download.is_ok());
    assert_eq!(h.client.metadata_calls(), 1);
    assert_eq!(h.client.media_calls(), 1);
}

#[tokio::test]
async fn different_qualities_are_separate_downloads() {
    let h = Harness::new();
    let (best, audio) = tokio::join!(
        h.service.request_download(VIDEO_URL, QualitySelector::Best),
        h.service.request_download(VIDEO_URL, QualitySelector::AudioOnly),
    );
    assert_ne!(best.unwrap().id, audio.unwrap().id);
    assert_eq!(h.client.media_calls(), 2);
}

#[tokio::test]
async fn sequential_requests_start_fresh() {
    let h = Harness::new();
    let first = h.service.request_download(VIDEO_URL, QualitySelector::Best).await.unwrap();
    let second = h.service.request_download(VIDEO_URL, QualitySelector::Best).await.unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(h.client.media_calls(), 2);
}

#[tokio::test]
async fn failure_is_shared_and_leaves_nothing_behind() {
    let h = Harness::new();
    h.client.set_behavior(Behavior::Fail(DownloadError::ToolFailure(
        "ERROR: [youtube] dQw4w9WgXcQ: Private video. Sign in if you've been granted access".to_string(),
    )));

    let results = join_all((0..3).map(|_| h.service.request_download(VIDEO_URL, QualitySelector::Best))).await;
    assert_eq!(h.client.media_calls(), 1);

    let first = results[0].clone().unwrap_err();
    assert!(matches!(first, ServiceError::ExtractionFailure(_)));
    assert!(!first.to_string().contains("ERROR: [youtube]"));
    assert!(results.iter().all(|r| r.as_ref().unwrap_err() == &first));

    assert_eq!(h.store.stats(), Default::default());
    assert_eq!(h.staging_entries(), 0);
}

#[tokio::test]
async fn timeout_reaches_every_caller_and_cleans_staging() {
    let h = Harness::with(HarnessOptions {
        timeout: Duration::from_millis(200),
        ..HarnessOptions::default()
    });
    h.client.set_behavior(Behavior::Hang);

    let (a, b) = tokio::join!(
        h.service.request_download(VIDEO_URL, QualitySelector::Best),
        h.service.request_download("https://youtu.be/dQw4w9WgXcQ", QualitySelector::Best),
    );
    let err = a.unwrap_err();
    assert!(matches!(err, ServiceError::ExtractionFailure(ref m) if m.contains("timed out")));
    assert_eq!(b.unwrap_err(), err);
    assert_eq!(h.client.media_calls(), 1);

    // The aborted task drops its reservation
    for _ in 0..50 {
        if h.staging_entries() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.staging_entries(), 0);
    assert_eq!(h.store.stats().pending, 0);
}

#[tokio::test]
async fn slow_extraction_times_out_without_registering() {
    // The client would finish and write its file after the limit
    let h = Harness::with(HarnessOptions {
        delay: Duration::from_millis(400),
        timeout: Duration::from_millis(150),
        ..HarnessOptions::default()
    });

    let err = h
        .service
        .request_download(VIDEO_URL, QualitySelector::Best)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ExtractionFailure(ref m) if m.contains("timed out")));

    tokio::time::sleep(Duration::from_millis(500)).await;
    let stats = h.store.stats();
    assert_eq!(stats.ready, 0);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.file_count, 0);
    assert_eq!(h.staging_entries(), 0);
}

#[tokio::test]
async fn info_requests_use_the_metadata_timeout() {
    let h = Harness::with(HarnessOptions {
        timeout: Duration::from_secs(30),
        metadata_timeout: Duration::from_millis(100),
        ..HarnessOptions::default()
    });
    h.client.set_behavior(Behavior::Hang);

    let started = std::time::Instant::now();
    let err = h.service.request_info(VIDEO_URL).await.unwrap_err();
    assert!(matches!(err, ServiceError::ExtractionFailure(ref m) if m.contains("timed out")));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(h.service.in_flight(), (0, 0));
}

#[tokio::test]
async fn invalid_urls_never_reach_the_client() {
    let h = Harness::new();
    for url in ["", "not a url", "ftp://example.com/a.mp4", "https://www.youtube.com/feed/trending"] {
        let err = h.service.request_download(url, QualitySelector::Best).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)), "{url}");
        let err = h.service.request_info(url).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)), "{url}");
    }
    assert_eq!(h.client.media_calls(), 0);
    assert_eq!(h.client.metadata_calls(), 0);
}

#[tokio::test]
async fn abandoned_download_is_aborted_when_configured() {
    let h = Harness::with(HarnessOptions {
        delay: Duration::from_millis(300),
        policy: AbandonPolicy::AbortWhenUnobserved,
        ..HarnessOptions::default()
    });

    let service = h.service.clone();
    let caller = tokio::spawn(async move {
        service.request_download(VIDEO_URL, QualitySelector::Best).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    caller.abort();
    let _ = caller.await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.client.media_calls(), 1);
    assert_eq!(h.store.stats().ready, 0);
    assert_eq!(h.staging_entries(), 0);
}

#[tokio::test]
async fn abandoned_download_completes_by_default() {
    let h = Harness::new();

    let service = h.service.clone();
    let caller = tokio::spawn(async move {
        service.request_download(VIDEO_URL, QualitySelector::Best).await
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    caller.abort();
    let _ = caller.await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.store.stats().ready, 1);
}
