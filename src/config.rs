use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignsenseConfig {
    pub camera: CameraSection,
    pub classifier: ClassifierSection,
    pub detection: DetectionSection,
    pub speech: SpeechSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSection {
    /// Camera device index
    pub device_index: u32,
    /// Requested capture width
    pub width: u32,
    /// Requested capture height
    pub height: u32,
    /// Requested frames per second
    pub fps: u32,
    /// Prefer the integrated (user-facing) camera when falling back
    pub prefer_front: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSection {
    /// Model repository holding the gesture model assets
    pub model_repo: String,
    /// Model definition file within the repository
    pub model_file: String,
    /// Label metadata file within the repository
    pub metadata_file: String,
    /// Load the asset pair from a local directory instead of the hub
    pub local_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSection {
    /// Minimum interval between classifier submissions in milliseconds
    pub throttle_ms: u64,
    /// Polling tick interval in milliseconds
    pub tick_ms: u64,
    /// Minimum confidence required to publish a detection
    pub acceptance_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSection {
    /// Enable text-to-speech output
    pub enabled: bool,
    /// Speech volume, 0.0 to 1.0
    pub volume: f32,
    /// Speech rate multiplier around the engine's normal rate
    pub rate: f32,
}

impl Default for SignsenseConfig {
    fn default() -> Self {
        Self {
            camera: CameraSection {
                device_index: 0,
                width: 640,
                height: 480,
                fps: 30,
                prefer_front: true,
            },
            classifier: ClassifierSection {
                model_repo: "signsense/gesture-classifier".to_string(),
                model_file: "gesture_classifier.onnx".to_string(),
                metadata_file: "gesture_labels.json".to_string(),
                local_dir: None,
            },
            detection: DetectionSection {
                throttle_ms: 200,
                tick_ms: 33,
                acceptance_threshold: 0.60,
            },
            speech: SpeechSection {
                enabled: true,
                volume: 0.75,
                rate: 1.0,
            },
        }
    }
}

impl SignsenseConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            // Create default config file
            let default_config = Self::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            fs::write(path, toml_content).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }
}
