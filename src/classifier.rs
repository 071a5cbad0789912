use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use serde::Deserialize;
use tract_onnx::prelude::*;
use tracing::{debug, info};

use crate::camera::VideoFrame;
use crate::config::ClassifierSection;
use crate::error::InterpreterError;

/// One ranked guess from the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub label: String,
    pub confidence: f32,
}

/// Opaque gesture classifier: a frame in, ranked (label, confidence) pairs
/// out, best first. Loaded once at startup and shared read-only as
/// `Arc<dyn GestureClassifier>` for the lifetime of the process.
#[async_trait]
pub trait GestureClassifier: Send + Sync {
    fn is_ready(&self) -> bool;

    fn labels(&self) -> &[String];

    async fn classify(
        &self,
        frame: &VideoFrame,
    ) -> Result<Vec<DetectionResult>, InterpreterError>;
}

/// Label metadata shipped next to the model file.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierMetadata {
    pub name: String,
    #[serde(default)]
    pub version: String,
    /// Square model input edge in pixels
    pub input_size: u32,
    pub labels: Vec<String>,
}

type OnnxPlan = TypedSimplePlan<TypedModel>;

/// ONNX-backed gesture classifier. The model definition and its label
/// metadata form a fixed asset pair fetched from the configured repository
/// (cached locally) or read from a local directory.
pub struct OnnxGestureClassifier {
    plan: OnnxPlan,
    metadata: ClassifierMetadata,
}

impl OnnxGestureClassifier {
    pub async fn load(config: &ClassifierSection) -> Result<Self> {
        let (model_path, metadata_path) = fetch_model_assets(config).await?;

        let metadata_text = tokio::fs::read_to_string(&metadata_path)
            .await
            .with_context(|| format!("reading {}", metadata_path.display()))?;
        let metadata: ClassifierMetadata =
            serde_json::from_str(&metadata_text).context("parsing label metadata")?;
        if metadata.labels.is_empty() {
            return Err(anyhow!("label metadata lists no labels"));
        }
        if metadata.input_size == 0 {
            return Err(anyhow!("label metadata declares a zero input size"));
        }

        let size = metadata.input_size as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(&model_path)
            .with_context(|| format!("loading ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("setting model input fact")?
            .into_optimized()
            .context("optimizing ONNX model")?
            .into_runnable()
            .context("building runnable ONNX model")?;

        info!(
            model = %metadata.name,
            version = %metadata.version,
            labels = metadata.labels.len(),
            input = metadata.input_size,
            "gesture model loaded"
        );

        Ok(Self { plan, metadata })
    }

    pub fn metadata(&self) -> &ClassifierMetadata {
        &self.metadata
    }
}

#[async_trait]
impl GestureClassifier for OnnxGestureClassifier {
    fn is_ready(&self) -> bool {
        // A constructed classifier is a loaded classifier; there is no
        // partially ready state to poll for.
        true
    }

    fn labels(&self) -> &[String] {
        &self.metadata.labels
    }

    async fn classify(
        &self,
        frame: &VideoFrame,
    ) -> Result<Vec<DetectionResult>, InterpreterError> {
        if !frame.is_decodable() {
            return Err(InterpreterError::ClassificationError(format!(
                "degenerate frame {}x{}",
                frame.width, frame.height
            )));
        }

        let image = frame
            .to_image()
            .map_err(|e| InterpreterError::ClassificationError(e.to_string()))?;
        let size = self.metadata.input_size;
        let resized = image
            .resize_exact(size, size, FilterType::Triangle)
            .to_rgb8();

        let size = size as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size, size),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        )
        .into_tensor();

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| InterpreterError::ClassificationError(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| {
                InterpreterError::ClassificationError("model produced no outputs".to_string())
            })?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| InterpreterError::ClassificationError(e.to_string()))?;
        let scores: Vec<f32> = view.iter().copied().collect();

        if scores.len() != self.metadata.labels.len() {
            return Err(InterpreterError::ClassificationError(format!(
                "model produced {} scores for {} labels",
                scores.len(),
                self.metadata.labels.len()
            )));
        }

        let confidences = normalize_scores(scores);
        let mut ranked: Vec<DetectionResult> = self
            .metadata
            .labels
            .iter()
            .zip(confidences)
            .map(|(label, confidence)| DetectionResult {
                label: label.clone(),
                confidence,
            })
            .collect();
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        debug!(
            best = %ranked[0].label,
            confidence = ranked[0].confidence,
            "classified frame"
        );
        Ok(ranked)
    }
}

/// Bring raw model outputs into [0, 1]. Outputs that already look like a
/// probability distribution pass through; anything else is treated as
/// logits and run through a softmax.
fn normalize_scores(scores: Vec<f32>) -> Vec<f32> {
    let sum: f32 = scores.iter().sum();
    let within_unit = scores.iter().all(|s| (0.0..=1.0).contains(s));
    if within_unit && (sum - 1.0).abs() < 0.05 {
        return scores;
    }

    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exponents: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exponents.iter().sum();
    if total <= f32::EPSILON {
        return vec![0.0; scores.len()];
    }
    exponents.into_iter().map(|e| e / total).collect()
}

async fn fetch_model_assets(config: &ClassifierSection) -> Result<(PathBuf, PathBuf)> {
    if let Some(local_dir) = &config.local_dir {
        let dir = PathBuf::from(local_dir);
        let model = dir.join(&config.model_file);
        let metadata = dir.join(&config.metadata_file);
        if !model.exists() {
            return Err(anyhow!("local model file not found: {}", model.display()));
        }
        if !metadata.exists() {
            return Err(anyhow!(
                "local metadata file not found: {}",
                metadata.display()
            ));
        }
        info!(dir = %dir.display(), "using local model assets");
        return Ok((model, metadata));
    }

    info!(
        repo = %config.model_repo,
        "fetching model assets (cached after first download)"
    );
    let repo_id = config.model_repo.clone();
    let model_file = config.model_file.clone();
    let metadata_file = config.metadata_file.clone();

    tokio::task::spawn_blocking(move || -> Result<(PathBuf, PathBuf)> {
        let api = hf_hub::api::sync::Api::new().context("creating hub client")?;
        let repo = api.model(repo_id.clone());
        let model = repo
            .get(&model_file)
            .with_context(|| format!("downloading {model_file} from {repo_id}"))?;
        let metadata = repo
            .get(&metadata_file)
            .with_context(|| format!("downloading {metadata_file} from {repo_id}"))?;
        Ok((model, metadata))
    })
    .await
    .context("model download task failed")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_outputs_pass_through() {
        let scores = normalize_scores(vec![0.7, 0.2, 0.1]);
        assert!((scores[0] - 0.7).abs() < 1e-6);
        assert!((scores.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn logit_outputs_are_softmaxed() {
        let scores = normalize_scores(vec![4.0, 1.0, -2.0]);
        assert!((scores.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(scores[0] > scores[1] && scores[1] > scores[2]);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn metadata_parses_with_optional_version() {
        let metadata: ClassifierMetadata = serde_json::from_str(
            r#"{
                "name": "gesture-classifier",
                "input_size": 224,
                "labels": ["Open_Palm", "Closed_Fist"]
            }"#,
        )
        .unwrap();
        assert_eq!(metadata.name, "gesture-classifier");
        assert_eq!(metadata.version, "");
        assert_eq!(metadata.input_size, 224);
        assert_eq!(metadata.labels.len(), 2);
    }
}
