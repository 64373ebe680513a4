//! Pipeline-level behavior: submitting descriptors against live slots with
//! deterministic fetchers, covering supersession ordering, synchronous fast
//! paths, failure publication and temp-file ownership.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, RgbaImage};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tokio::sync::Notify;
use url::Url;

use preview_pipeline::{
    ExtensionDecoder, Fetcher, PlaceholderDecoder, ResolveError, ResourceDescriptor, Slot,
    SlotEvent, SlotStatus, SniffDecoder, Submission,
};

fn png_bytes(w: u32, h: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::new(w, h));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

fn fixture_file(suffix: &str, bytes: &[u8]) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("fixture file");
    file.write_all(bytes).expect("write fixture");
    file.flush().expect("flush fixture");
    file
}

fn descriptor_for(file: &NamedTempFile) -> ResourceDescriptor {
    ResourceDescriptor::parse(file.path().to_str().expect("utf-8 path")).expect("parse")
}

enum FakeResponse {
    Bytes(Vec<u8>),
    Gated(Arc<Notify>, Vec<u8>),
}

/// Deterministic fetcher: answers from a fixed table, optionally holding a
/// response back until the test releases its gate. Unknown URIs fail.
#[derive(Default)]
struct FakeFetcher {
    responses: Mutex<HashMap<String, FakeResponse>>,
}

impl FakeFetcher {
    fn insert_bytes(&self, uri: &str, bytes: Vec<u8>) {
        self.responses
            .lock()
            .expect("lock")
            .insert(uri.to_string(), FakeResponse::Bytes(bytes));
    }

    fn insert_gated(&self, uri: &str, gate: Arc<Notify>, bytes: Vec<u8>) {
        self.responses
            .lock()
            .expect("lock")
            .insert(uri.to_string(), FakeResponse::Gated(gate, bytes));
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, uri: &Url) -> Result<Vec<u8>, ResolveError> {
        let response = self.responses.lock().expect("lock").remove(uri.as_str());
        match response {
            Some(FakeResponse::Bytes(bytes)) => Ok(bytes),
            Some(FakeResponse::Gated(gate, bytes)) => {
                gate.notified().await;
                Ok(bytes)
            }
            None => Err(ResolveError::Io(std::io::Error::other(format!(
                "no response configured for {uri}"
            )))),
        }
    }
}

async fn run(submission: Submission) {
    match submission {
        Submission::Scheduled(handle) => handle.await.expect("resolution unit"),
        Submission::Applied(_) => {}
    }
}

fn drain(events: &mut broadcast::Receiver<SlotEvent>) -> Vec<SlotEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn value_changes(events: &[SlotEvent]) -> Vec<&SlotEvent> {
    events
        .iter()
        .filter(|e| matches!(e, SlotEvent::ValueChanged { .. }))
        .collect()
}

#[tokio::test]
async fn resolves_a_local_image_file() {
    let file = fixture_file(".png", &png_bytes(200, 100));
    let slot = Slot::for_images();
    slot.set_icon_bounds(50, 50);
    let mut events = slot.subscribe();

    run(slot.submit(Some(descriptor_for(&file)))).await;

    let value = slot.value().expect("resolved value");
    assert!(!value.is_missing());

    let image = value.image().expect("decoded image");
    assert_eq!((image.width(), image.height()), (200, 100));

    let icon = value.icon().expect("icon");
    assert_eq!((icon.width(), icon.height()), (50, 25));

    let local = value.local_file().expect("local file");
    assert!(!local.is_temporary());
    assert_eq!(local.path(), file.path());

    let expected_name = file
        .path()
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string);
    assert_eq!(value.name().map(str::to_string), expected_name);
    assert!(value
        .description()
        .expect("description")
        .starts_with("200x100px"));

    let events = drain(&mut events);
    assert!(matches!(events[0], SlotEvent::Loading { .. }));
    assert_eq!(value_changes(&events).len(), 1);
    assert_eq!(slot.status(), SlotStatus::Idle);
}

#[tokio::test]
async fn latest_submission_wins_regardless_of_completion_order() {
    let gate = Arc::new(Notify::new());
    let fetcher = FakeFetcher::default();
    fetcher.insert_gated("test://host/slow.png", gate.clone(), png_bytes(8, 8));
    fetcher.insert_bytes("test://host/fast.png", png_bytes(4, 4));

    let slot = Slot::builder()
        .with_decoder(ExtensionDecoder::default())
        .with_fetcher(Arc::new(fetcher))
        .build();
    let mut events = slot.subscribe();

    let first = slot.submit(Some(
        ResourceDescriptor::parse("test://host/slow.png").expect("parse"),
    ));
    assert_eq!(slot.status(), SlotStatus::Resolving);
    let second = slot.submit(Some(
        ResourceDescriptor::parse("test://host/fast.png").expect("parse"),
    ));

    // The newer unit finishes first; only then is the old one released.
    run(second).await;
    gate.notify_one();
    run(first).await;

    let value = slot.value().expect("value");
    assert_eq!(value.uri().map(Url::as_str), Some("test://host/fast.png"));
    assert_eq!(slot.status(), SlotStatus::Idle);

    let events = drain(&mut events);
    let changes = value_changes(&events);
    assert_eq!(changes.len(), 1, "superseded unit must stay silent");
    if let SlotEvent::ValueChanged { old, new } = changes[0] {
        assert!(old.is_none());
        assert_eq!(
            new.as_ref().and_then(|v| v.uri()).map(Url::as_str),
            Some("test://host/fast.png")
        );
    }
}

#[tokio::test]
async fn resubmitting_the_current_uri_is_synchronous_and_silent() {
    let file = fixture_file(".png", &png_bytes(10, 10));
    let slot = Slot::for_images();
    run(slot.submit(Some(descriptor_for(&file)))).await;
    let resolved = slot.value().expect("value");

    let mut events = slot.subscribe();
    let submission = slot.submit(Some(descriptor_for(&file)));

    let Submission::Applied(Some(value)) = submission else {
        panic!("same-URI submit must apply synchronously");
    };
    // The loaded artifacts and the chain-derived name survive the no-op.
    assert_eq!(value.name(), resolved.name());
    assert!(value.image().is_some());
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn name_only_submission_merges_into_the_current_value() {
    let file = fixture_file(".png", &png_bytes(10, 10));
    let slot = Slot::for_images();
    run(slot.submit(Some(descriptor_for(&file)))).await;

    let mut events = slot.subscribe();
    let submission = slot.submit(Some(ResourceDescriptor::named_only("Holiday")));

    let Submission::Applied(Some(value)) = submission else {
        panic!("name-only submit must apply synchronously");
    };
    assert_eq!(value.name(), Some("Holiday"));
    assert!(value.uri().is_some(), "the resolved URI is kept");
    assert!(value.image().is_some(), "artifacts are kept");

    let events = drain(&mut events);
    assert_eq!(value_changes(&events).len(), 1);
}

#[tokio::test]
async fn clearing_publishes_exactly_once() {
    let file = fixture_file(".png", &png_bytes(10, 10));
    let slot = Slot::for_images();
    run(slot.submit(Some(descriptor_for(&file)))).await;

    let mut events = slot.subscribe();
    let Submission::Applied(None) = slot.clear() else {
        panic!("clear must apply synchronously");
    };
    let events_after_clear = drain(&mut events);
    assert_eq!(value_changes(&events_after_clear).len(), 1);
    if let SlotEvent::ValueChanged { new, .. } = &events_after_clear[0] {
        assert!(new.is_none());
    }

    // Clearing an already empty slot stays silent.
    let Submission::Applied(None) = slot.clear() else {
        panic!("clear must apply synchronously");
    };
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn fetch_failure_publishes_a_missing_value_and_an_error() {
    let slot = Slot::builder()
        .with_decoder(ExtensionDecoder::default())
        .with_fallback(PlaceholderDecoder::default())
        .with_fetcher(Arc::new(FakeFetcher::default()))
        .build();
    let mut events = slot.subscribe();

    run(slot.submit(Some(
        ResourceDescriptor::parse("test://host/gone.png").expect("parse"),
    )))
    .await;

    let value = slot.value().expect("a value is still published");
    assert!(value.is_missing());
    assert!(value.local_file().is_none(), "no copy when the fetch failed");
    assert!(value.icon().is_some(), "placeholder icon is substituted");

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        SlotEvent::Error { message } if message.contains("unable to load preview")
    )));
    assert_eq!(value_changes(&events).len(), 1);
}

#[tokio::test]
async fn unrecognized_content_falls_through_to_the_fallback() {
    let file = fixture_file(".bin", b"definitely not an image");
    let slot = Slot::builder()
        .with_decoder(ExtensionDecoder::default())
        .with_decoder(SniffDecoder)
        .with_fallback(PlaceholderDecoder::default())
        .build();

    run(slot.submit(Some(descriptor_for(&file)))).await;

    let value = slot.value().expect("value");
    assert!(!value.is_missing(), "the fallback supplied a preview");
    assert!(value.image().is_some());
    assert!(value
        .description()
        .expect("description")
        .ends_with("Kb"));
}

#[tokio::test]
async fn undecodable_image_without_fallback_is_missing() {
    let file = fixture_file(".png", b"corrupt png bytes");
    let slot = Slot::for_images();
    let mut events = slot.subscribe();

    run(slot.submit(Some(descriptor_for(&file)))).await;

    let value = slot.value().expect("value");
    assert!(value.is_missing());
    assert!(value.image().is_none());
    assert!(value.icon().is_some(), "broken-image placeholder icon");
    assert!(value.local_file().is_some(), "the copy itself succeeded");

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        SlotEvent::Error { message } if message.contains("no decoder recognized")
    )));
}

#[tokio::test]
async fn temporary_copy_is_removed_when_the_value_is_dropped() {
    let fetcher = FakeFetcher::default();
    fetcher.insert_bytes("test://host/remote.png", png_bytes(6, 6));
    let slot = Slot::builder()
        .with_decoder(ExtensionDecoder::default())
        .with_fetcher(Arc::new(fetcher))
        .build();

    run(slot.submit(Some(
        ResourceDescriptor::parse("test://host/remote.png").expect("parse"),
    )))
    .await;

    let value = slot.value().expect("value");
    let local = value.local_file().expect("temp copy");
    assert!(local.is_temporary());
    let path = local.path().to_path_buf();
    assert!(path.exists());

    drop(value);
    slot.clear();
    assert!(!path.exists(), "superseded temp copy must be deleted");
}

#[tokio::test]
async fn icon_bounds_apply_to_subsequent_submissions() {
    let file = fixture_file(".png", &png_bytes(300, 300));
    let slot = Slot::for_images();
    slot.set_icon_bounds(24, 24);

    run(slot.submit(Some(descriptor_for(&file)))).await;

    let icon = slot.value().and_then(|v| v.icon().cloned()).expect("icon");
    assert_eq!((icon.width(), icon.height()), (24, 24));
}
