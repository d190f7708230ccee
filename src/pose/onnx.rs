use anyhow::{ensure, Context, Result};
use futures::future::{BoxFuture, FutureExt};
use image::DynamicImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use super::detector::{ModelLoader, PoseCandidate, PoseModel};
use super::landmark::{Landmark, LandmarkIndex};
use super::preprocess::preprocess_letterbox;
use crate::config::DetectorConfig;

/// ランドマーク1点あたりの値 (x, y, z, visibility, presence)
const VALUES_PER_LANDMARK: usize = 5;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// BlazePose 形式の ONNX モデル
///
/// 入力: [1, size, size, 3] の f32 テンソル (0.0-1.0)
/// 出力: ランドマーク [1, N*5] (入力ピクセル座標, visibility はロジット) と人物スコア [1, 1]
pub struct OnnxPoseModel {
    session: Session,
    config: DetectorConfig,
}

impl OnnxPoseModel {
    /// ONNXモデルを読み込んで初期化
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        ensure!(config.input_size > 0, "detector input_size must be positive");
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.model_path)
            .with_context(|| format!("Failed to load ONNX model from {}", config.model_path))?;

        Ok(Self {
            session,
            config: config.clone(),
        })
    }
}

impl PoseModel for OnnxPoseModel {
    fn estimate(&mut self, image: &DynamicImage) -> Result<Vec<PoseCandidate>> {
        let (input, letterbox) = preprocess_letterbox(image, self.config.input_size)?;
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.config.input_name.as_str() => input_tensor])
            .context("Inference failed")?;

        let score: ndarray::ArrayViewD<f32> = outputs[self.config.score_output.as_str()]
            .try_extract_array()
            .context("Failed to extract pose score tensor")?;
        let score = score
            .iter()
            .next()
            .copied()
            .map(sigmoid)
            .context("Pose score tensor is empty")?;
        if score < self.config.min_pose_score {
            return Ok(Vec::new());
        }

        let raw: ndarray::ArrayViewD<f32> = outputs[self.config.landmark_output.as_str()]
            .try_extract_array()
            .context("Failed to extract landmark tensor")?;
        let values: Vec<f32> = raw.iter().copied().collect();
        ensure!(
            values.len() >= LandmarkIndex::COUNT * VALUES_PER_LANDMARK,
            "landmark tensor too small: {} values",
            values.len()
        );

        // 補助点（39点出力の末尾6点）は使わない
        let size = self.config.input_size as f32;
        let landmarks = values
            .chunks_exact(VALUES_PER_LANDMARK)
            .take(LandmarkIndex::COUNT)
            .map(|v| {
                let lm = Landmark::new(v[0] / size, v[1] / size, v[2] / size, sigmoid(v[3]));
                letterbox.unletterbox(&lm)
            })
            .collect();

        Ok(vec![PoseCandidate { landmarks, score }])
    }
}

/// 設定のモデルパスから `OnnxPoseModel` を読み込むローダー
pub struct OnnxPoseLoader {
    config: DetectorConfig,
}

impl OnnxPoseLoader {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }
}

impl ModelLoader for OnnxPoseLoader {
    type Model = OnnxPoseModel;

    fn load(&self) -> BoxFuture<'static, Result<OnnxPoseModel>> {
        let config = self.config.clone();
        async move {
            tokio::task::spawn_blocking(move || OnnxPoseModel::new(&config))
                .await
                .context("Model loading task was cancelled")?
        }
        .boxed()
    }
}
