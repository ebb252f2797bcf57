//! End-to-end scenarios seeding the suite (spec §8): each test wires C1
//! (blob), C2 (task store), C3 (bus), C5 (admission), C6 (aggregator), C7
//! (notifier), and C8 (retention) together exactly as `transcode-cli`'s
//! `Engine` does, then drives a submission through to a terminal state and
//! asserts the invariants of §3 hold.

use std::sync::Arc;

use transcode_core::profile::{FaceDetectionConfig, ImageConfig, ProfileBuilder, VideoConfig};
use transcode_core::{
    AdmissionController, BlobStore, InMemoryBlobStore, InMemoryTaskStore, InProcessBus, MediaClassifier,
    MessageBus, Notifier, ResultAggregator, RetentionManager, SourceInput, SubmitRequest, TaskStatus,
    TaskStore,
};
use transcode_wire::{CallbackClient, CallbackConfig, FaceResult, ProfileResult};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    blob_store: Arc<InMemoryBlobStore>,
    task_store: Arc<InMemoryTaskStore>,
    bus: Arc<InProcessBus>,
    admission: AdmissionController<InProcessBus>,
    aggregator: ResultAggregator<InProcessBus>,
    retention: RetentionManager<InProcessBus>,
}

fn harness() -> Harness {
    let blob_store = InMemoryBlobStore::shared("blob://bucket");
    let task_store = InMemoryTaskStore::shared();
    let bus = InProcessBus::shared(8);
    let admission = AdmissionController::new(
        blob_store.clone(),
        task_store.clone() as Arc<dyn transcode_core::TaskStore>,
        bus.clone(),
        MediaClassifier::default(),
    );
    let callback_client = Arc::new(CallbackClient::with_policy(3, std::time::Duration::from_millis(1)));
    let notifier = Arc::new(Notifier::new(bus.clone(), callback_client.clone()));
    let aggregator = ResultAggregator::new(
        task_store.clone() as Arc<dyn transcode_core::TaskStore>,
        bus.clone(),
        notifier.clone(),
        3,
    );
    let retention = RetentionManager::new(
        task_store.clone() as Arc<dyn transcode_core::TaskStore>,
        blob_store.clone() as Arc<dyn transcode_core::BlobStore>,
        bus.clone(),
        notifier,
        callback_client,
    );
    Harness { blob_store, task_store, bus, admission, aggregator, retention }
}

fn layout() -> transcode_core::S3Layout {
    transcode_core::S3Layout { base_path: "s3://bucket".into(), folder_structure: "{task_id}/{profile_id}".into() }
}

fn artifact(note: &str) -> transcode_wire::ArtifactPayload {
    transcode_wire::ArtifactPayload {
        url: format!("blob://bucket/{note}"),
        size_bytes: 42,
        metadata: serde_json::json!({"note": note}),
    }
}

#[tokio::test]
async fn scenario_1_image_input_drops_video_profiles_and_completes() {
    let h = harness();
    let profiles = vec![
        ProfileBuilder::new("I1")
            .input_type(transcode_core::MediaType::Image)
            .image(ImageConfig { width: 800, height: 600, format: "jpeg".into(), quality: 85 })
            .build()
            .unwrap(),
        ProfileBuilder::new("V1")
            .input_type(transcode_core::MediaType::Video)
            .video(VideoConfig { width: 1280, height: 720, codec: "h264".into(), bitrate_kbps: None, preserve_audio: true })
            .build()
            .unwrap(),
        ProfileBuilder::new("V2")
            .input_type(transcode_core::MediaType::Video)
            .video(VideoConfig { width: 640, height: 360, codec: "h264".into(), bitrate_kbps: None, preserve_audio: true })
            .build()
            .unwrap(),
    ];

    let outcome = h
        .admission
        .submit(SubmitRequest {
            source: SourceInput::Upload { filename: "photo.jpg".into(), content_type: "image/jpeg".into(), bytes: vec![1, 2, 3] },
            profiles,
            s3_layout: layout(),
            face_config: None,
            callback: None,
            notify_topic: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.effective_profiles, vec!["I1".to_string()]);
    assert_eq!(outcome.dropped_profiles, vec!["V1".to_string(), "V2".to_string()]);

    // §8 round-trip property: submitted_profiles reflects the full request,
    // not just the subset that survived media-type filtering.
    let admitted = h.task_store.get(&outcome.task_id).await.unwrap();
    assert_eq!(
        admitted.submitted_profiles.iter().map(|p| p.id_profile.clone()).collect::<Vec<_>>(),
        vec!["I1".to_string(), "V1".to_string(), "V2".to_string()]
    );

    h.aggregator
        .handle_profile_result(ProfileResult::Success {
            task_id: outcome.task_id.clone(),
            profile_id: "I1".into(),
            artifact: artifact("i1-out"),
        })
        .await
        .unwrap();

    let task = h.task_store.get(&outcome.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.outputs.get("I1").unwrap().len(), 1);
    assert!(task.failed_profiles.is_empty());
    task.check_invariants().unwrap();
}

#[tokio::test]
async fn scenario_2_video_input_one_profile_exhausts_retries_to_partial() {
    let h = harness();
    let profiles = vec![
        ProfileBuilder::new("P1")
            .video(VideoConfig { width: 1920, height: 1080, codec: "h264".into(), bitrate_kbps: None, preserve_audio: true })
            .build()
            .unwrap(),
        ProfileBuilder::new("P2")
            .video(VideoConfig { width: 1280, height: 720, codec: "h264".into(), bitrate_kbps: None, preserve_audio: true })
            .build()
            .unwrap(),
    ];

    let outcome = h
        .admission
        .submit(SubmitRequest {
            source: SourceInput::Url("https://example.com/clip.mp4".into()),
            profiles,
            s3_layout: layout(),
            face_config: None,
            callback: None,
            notify_topic: None,
        })
        .await
        .unwrap();

    h.aggregator
        .handle_profile_result(ProfileResult::Success {
            task_id: outcome.task_id.clone(),
            profile_id: "P1".into(),
            artifact: artifact("p1-out"),
        })
        .await
        .unwrap();

    for _ in 0..3 {
        h.aggregator
            .handle_profile_result(ProfileResult::Failure {
                task_id: outcome.task_id.clone(),
                profile_id: "P2".into(),
                reason: "decode timeout".into(),
                retryable: true,
            })
            .await
            .unwrap();
    }

    let task = h.task_store.get(&outcome.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Partial);
    assert_eq!(task.outputs.keys().collect::<Vec<_>>(), vec!["P1"]);
    assert!(task.failed_profiles.contains("P2"));
    task.check_invariants().unwrap();
}

#[tokio::test]
async fn scenario_3_duplicate_success_delivery_does_not_duplicate_artifacts() {
    let h = harness();
    let profiles = vec![ProfileBuilder::new("P1")
        .video(VideoConfig { width: 1920, height: 1080, codec: "h264".into(), bitrate_kbps: None, preserve_audio: true })
        .build()
        .unwrap()];

    let outcome = h
        .admission
        .submit(SubmitRequest {
            source: SourceInput::Url("https://example.com/clip.mp4".into()),
            profiles,
            s3_layout: layout(),
            face_config: None,
            callback: None,
            notify_topic: None,
        })
        .await
        .unwrap();

    for _ in 0..2 {
        h.aggregator
            .handle_profile_result(ProfileResult::Success {
                task_id: outcome.task_id.clone(),
                profile_id: "P1".into(),
                artifact: artifact("p1-out"),
            })
            .await
            .unwrap();
    }

    let task = h.task_store.get(&outcome.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.outputs.get("P1").unwrap().len(), 1);
}

#[tokio::test]
async fn scenario_4_face_detection_failure_with_all_transcodes_ok_is_partial() {
    let h = harness();
    let profiles = vec![
        ProfileBuilder::new("P1")
            .video(VideoConfig { width: 1920, height: 1080, codec: "h264".into(), bitrate_kbps: None, preserve_audio: true })
            .build()
            .unwrap(),
        ProfileBuilder::new("P2")
            .video(VideoConfig { width: 1280, height: 720, codec: "h264".into(), bitrate_kbps: None, preserve_audio: true })
            .build()
            .unwrap(),
    ];
    let face_config = FaceDetectionConfig {
        enabled: true,
        similarity_threshold: 0.6,
        min_faces_in_group: 1,
        sample_interval: 1.0,
        detector_score_threshold: 0.5,
        avatar_size: 256,
        avatar_quality: 85,
    };

    let outcome = h
        .admission
        .submit(SubmitRequest {
            source: SourceInput::Url("https://example.com/clip.mp4".into()),
            profiles,
            s3_layout: layout(),
            face_config: Some(face_config),
            callback: None,
            notify_topic: None,
        })
        .await
        .unwrap();
    assert!(outcome.face_enabled);

    h.aggregator
        .handle_profile_result(ProfileResult::Success {
            task_id: outcome.task_id.clone(),
            profile_id: "P1".into(),
            artifact: artifact("p1-out"),
        })
        .await
        .unwrap();
    h.aggregator
        .handle_profile_result(ProfileResult::Success {
            task_id: outcome.task_id.clone(),
            profile_id: "P2".into(),
            artifact: artifact("p2-out"),
        })
        .await
        .unwrap();
    h.aggregator
        .handle_face_result(FaceResult::Failure {
            task_id: outcome.task_id.clone(),
            reason: "no faces detected".into(),
            retryable: false,
        })
        .await
        .unwrap();

    let task = h.task_store.get(&outcome.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Partial);
    assert!(task.outputs.contains_key("P1") && task.outputs.contains_key("P2"));
    assert!(matches!(task.face_detection, transcode_core::FaceStage::Failed { .. }));
    task.check_invariants().unwrap();
}

#[tokio::test]
async fn scenario_5_retry_with_wipe_clears_artifacts_then_repopulates() {
    let h = harness();
    let profiles = vec![ProfileBuilder::new("P1")
        .image(ImageConfig { width: 800, height: 600, format: "jpeg".into(), quality: 85 })
        .build()
        .unwrap()];

    let outcome = h
        .admission
        .submit(SubmitRequest {
            source: SourceInput::Upload { filename: "photo.jpg".into(), content_type: "image/jpeg".into(), bytes: vec![1, 2, 3] },
            profiles,
            s3_layout: layout(),
            face_config: None,
            callback: None,
            notify_topic: None,
        })
        .await
        .unwrap();

    h.aggregator
        .handle_profile_result(ProfileResult::Success {
            task_id: outcome.task_id.clone(),
            profile_id: "P1".into(),
            artifact: artifact("p1-out"),
        })
        .await
        .unwrap();
    assert_eq!(h.task_store.get(&outcome.task_id).await.unwrap().status, TaskStatus::Completed);

    h.retention.retry(&outcome.task_id, true).await.unwrap();

    let reset = h.task_store.get(&outcome.task_id).await.unwrap();
    assert_eq!(reset.status, TaskStatus::Processing);
    assert!(reset.outputs.is_empty());
    assert!(!h.blob_store.exists(&format!("{}/source/photo.jpg", outcome.task_id)).await.unwrap());

    h.aggregator
        .handle_profile_result(ProfileResult::Success {
            task_id: outcome.task_id.clone(),
            profile_id: "P1".into(),
            artifact: artifact("p1-out-2"),
        })
        .await
        .unwrap();

    let task = h.task_store.get(&outcome.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.outputs.get("P1").unwrap().len(), 1);
}

#[tokio::test]
async fn scenario_6_callback_retries_through_503_then_succeeds_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness();
    let profiles = vec![ProfileBuilder::new("P1")
        .image(ImageConfig { width: 800, height: 600, format: "jpeg".into(), quality: 85 })
        .build()
        .unwrap()];

    let outcome = h
        .admission
        .submit(SubmitRequest {
            source: SourceInput::Upload { filename: "photo.jpg".into(), content_type: "image/jpeg".into(), bytes: vec![1, 2, 3] },
            profiles,
            s3_layout: layout(),
            face_config: None,
            callback: Some(CallbackConfig { url: format!("{}/hook", server.uri()).parse().unwrap(), auth: None }),
            notify_topic: None,
        })
        .await
        .unwrap();

    h.aggregator
        .handle_profile_result(ProfileResult::Success {
            task_id: outcome.task_id.clone(),
            profile_id: "P1".into(),
            artifact: artifact("p1-out"),
        })
        .await
        .unwrap();

    let task = h.task_store.get(&outcome.task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn zero_effective_profiles_is_rejected_before_any_task_row_exists() {
    let h = harness();
    let profiles = vec![ProfileBuilder::new("V1")
        .input_type(transcode_core::MediaType::Video)
        .video(VideoConfig { width: 640, height: 480, codec: "h264".into(), bitrate_kbps: None, preserve_audio: true })
        .build()
        .unwrap()];

    let err = h
        .admission
        .submit(SubmitRequest {
            source: SourceInput::Upload { filename: "photo.jpg".into(), content_type: "image/jpeg".into(), bytes: vec![1] },
            profiles,
            s3_layout: layout(),
            face_config: None,
            callback: None,
            notify_topic: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, transcode_core::OrchestratorError::NoApplicableProfiles { .. }));
    assert_eq!(h.task_store.summary().await.unwrap().values().sum::<usize>(), 0);
    // `bus` stays quiet since nothing was ever fanned out for a rejected submission.
    assert!(h.bus.dead_letters("transcode.tasks").await.is_empty());
}
