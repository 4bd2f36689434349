//! Session lifecycle against a scripted source and upload target.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;

use geotrack_core::{
    IngestionExit, IngestionState, MockPositionSource, SharedStore, SourceOptions, SubmitOutcome,
    UploadTarget, shared,
};
use geotrack_service::{Session, SessionSettings};
use geotrack_store::{NewSample, Store};
use geotrack_types::{DeviceId, RawFix, UploadRecord, now_millis};

const UPLOAD_EVERY: Duration = Duration::from_secs(50);

#[derive(Default)]
struct Recorder {
    submitted: StdMutex<Vec<i64>>,
}

impl Recorder {
    fn count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl UploadTarget for Recorder {
    async fn submit(&self, record: &UploadRecord) -> SubmitOutcome {
        self.submitted
            .lock()
            .unwrap()
            .push(record.location_timestamp);
        SubmitOutcome::Success
    }
}

fn settings() -> SessionSettings {
    SessionSettings {
        source: SourceOptions::default(),
        upload_interval: UPLOAD_EVERY,
        ..Default::default()
    }
}

fn fix(n: i64) -> RawFix {
    RawFix::builder(45.0 + n as f64 * 0.001, 7.0)
        .provider("gps")
        .timestamp_ms(1_754_800_000_000 + n)
        .build()
}

fn setup(source: Arc<MockPositionSource>) -> (Session, SharedStore, Arc<Recorder>) {
    let store = shared(Store::open_in_memory().unwrap());
    let target = Arc::new(Recorder::default());
    let session = Session::new(
        Arc::clone(&store),
        DeviceId::new("device_session1").unwrap(),
        source,
        target.clone(),
        settings(),
    );
    (session, store, target)
}

#[tokio::test(start_paused = true)]
async fn first_upload_waits_one_full_interval() {
    let source = Arc::new(MockPositionSource::new().hold_open());
    let (session, store, target) = setup(source.clone());

    session.start().await.unwrap();
    assert!(session.is_running());
    assert_eq!(session.ingestion_state(), IngestionState::Running);

    for n in 0..3 {
        assert!(source.push(fix(n)));
    }
    tokio::time::sleep(UPLOAD_EVERY - Duration::from_secs(1)).await;
    assert_eq!(target.count(), 0);
    assert_eq!(store.lock().await.count_unuploaded().unwrap(), 3);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(target.count(), 3);
    assert_eq!(store.lock().await.count_unuploaded().unwrap(), 0);

    let status = session.status().await;
    assert_eq!(status.cycles, 1);
    assert_eq!(status.uploaded_total, 3);
    assert_eq!(status.last_upload.as_deref(), Some("uploaded 3 sample(s)"));

    session.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_releases_source_and_keeps_store() {
    let source = Arc::new(MockPositionSource::new().hold_open());
    let (session, store, target) = setup(source.clone());

    session.start().await.unwrap();
    source.push(fix(1));
    source.push(fix(2));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let report = session.stop().await.unwrap();
    assert_eq!(report.stored, 2);
    assert_eq!(report.exit, IngestionExit::Cancelled);
    assert_eq!(source.close_count(), 1);
    assert!(!session.is_running());
    assert_eq!(session.ingestion_state(), IngestionState::Idle);

    // No more cycles after stop.
    tokio::time::sleep(UPLOAD_EVERY * 3).await;
    assert_eq!(target.count(), 0);
    assert_eq!(store.lock().await.count_unuploaded().unwrap(), 2);

    // A fresh start over the same store resumes the queue.
    session.start().await.unwrap();
    tokio::time::sleep(UPLOAD_EVERY + Duration::from_secs(1)).await;
    assert_eq!(target.count(), 2);
    session.stop().await.unwrap();
    assert_eq!(source.open_count(), 2);
    assert_eq!(source.close_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn source_loss_idles_ingestion_but_keeps_uploading() {
    let source = Arc::new(MockPositionSource::new().hold_open());
    let (session, store, target) = setup(source.clone());

    session.start().await.unwrap();
    source.push(fix(1));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(source.fail("gps switched off"));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(session.ingestion_state(), IngestionState::Idle);
    assert!(session.is_running());
    assert_eq!(source.close_count(), 1);

    let status = session.status().await;
    assert!(status.last_error.unwrap().contains("gps switched off"));
    assert_eq!(
        status.last_ingestion.unwrap().exit,
        IngestionExit::SourceUnavailable("gps switched off".to_string())
    );

    tokio::time::sleep(UPLOAD_EVERY + Duration::from_secs(1)).await;
    assert_eq!(target.count(), 1);
    assert_eq!(store.lock().await.count_unuploaded().unwrap(), 0);

    let report = session.stop().await.unwrap();
    assert_eq!(report.stored, 1);
    assert_eq!(source.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn first_tick_sweeps_old_uploaded_samples() {
    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    let source = Arc::new(MockPositionSource::new().hold_open());
    let (session, store, _target) = setup(source);

    {
        let s = store.lock().await;
        let sample = NewSample::from_fix(&DeviceId::new("device_session1").unwrap(), &fix(0));
        let old = s.append_at(&sample, now_millis() - 10 * DAY_MS).unwrap();
        s.append_at(&sample, now_millis() - DAY_MS).unwrap();
        s.mark_uploaded(&[old]).unwrap();
    }

    session.start().await.unwrap();
    tokio::time::sleep(UPLOAD_EVERY + Duration::from_secs(1)).await;

    // The recent pending row is uploaded and survives the sweep.
    let status = session.status().await;
    assert_eq!(status.swept_total, 1);
    assert_eq!(status.uploaded_total, 1);
    assert_eq!(store.lock().await.count().unwrap(), 1);

    // The gate holds the next sweep back for a day.
    tokio::time::sleep(UPLOAD_EVERY).await;
    assert_eq!(session.status().await.swept_total, 1);
    assert_eq!(store.lock().await.count().unwrap(), 1);

    session.stop().await.unwrap();
}

#[tokio::test]
async fn upload_now_reports_count() {
    let source = Arc::new(MockPositionSource::new());
    let (session, store, target) = setup(source);

    {
        let s = store.lock().await;
        for n in 0..2 {
            s.append(&NewSample::from_fix(
                &DeviceId::new("device_session1").unwrap(),
                &fix(n),
            ))
            .unwrap();
        }
    }

    assert_eq!(session.upload_now().await, "uploaded 2 sample(s)");
    assert_eq!(session.upload_now().await, "uploaded 0 sample(s)");
    assert_eq!(target.count(), 2);

    let stats = session.cache_stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.uploaded(), 2);
}
