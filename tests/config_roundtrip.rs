use signsense::config::SignsenseConfig;
use tempfile::tempdir;

#[tokio::test]
async fn missing_file_creates_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let config = SignsenseConfig::load(&path).await.unwrap();

    assert!(path.exists(), "default config file should be written");
    assert_eq!(config.camera.device_index, 0);
    assert_eq!(config.camera.width, 640);
    assert_eq!(config.camera.height, 480);
    assert_eq!(config.detection.throttle_ms, 200);
    assert!((config.detection.acceptance_threshold - 0.60).abs() < f32::EPSILON);
    assert!(config.speech.enabled);
    assert_eq!(config.classifier.model_file, "gesture_classifier.onnx");
    assert!(config.classifier.local_dir.is_none());
}

#[tokio::test]
async fn saved_config_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = SignsenseConfig::default();
    config.camera.device_index = 2;
    config.camera.prefer_front = false;
    config.detection.acceptance_threshold = 0.85;
    config.speech.enabled = false;
    config.classifier.local_dir = Some("models".to_string());
    config.save(&path).await.unwrap();

    let loaded = SignsenseConfig::load(&path).await.unwrap();
    assert_eq!(loaded.camera.device_index, 2);
    assert!(!loaded.camera.prefer_front);
    assert!((loaded.detection.acceptance_threshold - 0.85).abs() < 1e-6);
    assert!(!loaded.speech.enabled);
    assert_eq!(loaded.classifier.local_dir.as_deref(), Some("models"));
}

#[tokio::test]
async fn existing_file_is_not_overwritten() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = SignsenseConfig::default();
    config.detection.throttle_ms = 500;
    config.save(&path).await.unwrap();

    let loaded = SignsenseConfig::load(&path).await.unwrap();
    assert_eq!(loaded.detection.throttle_ms, 500);
}
