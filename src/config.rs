use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::align::anchor::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::pose::preprocess::DEFAULT_INPUT_SIZE;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub keyboard: KeyboardConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct DetectorConfig {
    /// ONNXモデルのパス
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// モデル入力サイズ（正方形）
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    /// これ未満の人物スコアは「人物なし」扱い
    #[serde(default = "default_min_pose_score")]
    pub min_pose_score: f32,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    #[serde(default = "default_landmark_output")]
    pub landmark_output: String,
    #[serde(default = "default_score_output")]
    pub score_output: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct AlignmentConfig {
    /// アンカー判定の可視性閾値
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// 自動位置合わせのデバウンス時間（ミリ秒）
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct KeyboardConfig {
    /// 矢印キー1回の移動量（ピクセル）
    #[serde(default = "default_offset_step")]
    pub offset_step: f32,
    /// 修飾キー併用時の移動量
    #[serde(default = "default_offset_step_coarse")]
    pub offset_step_coarse: f32,
    #[serde(default = "default_scale_step")]
    pub scale_step: f32,
    #[serde(default = "default_scale_step_coarse")]
    pub scale_step_coarse: f32,
}

fn default_model_path() -> String { "models/pose_landmark_full.onnx".to_string() }
fn default_input_size() -> u32 { DEFAULT_INPUT_SIZE }
fn default_min_pose_score() -> f32 { 0.5 }
fn default_input_name() -> String { "input_1".to_string() }
fn default_landmark_output() -> String { "Identity".to_string() }
fn default_score_output() -> String { "Identity_1".to_string() }
fn default_confidence_threshold() -> f32 { DEFAULT_CONFIDENCE_THRESHOLD }
fn default_debounce_ms() -> u64 { 100 }
fn default_offset_step() -> f32 { 1.0 }
fn default_offset_step_coarse() -> f32 { 10.0 }
fn default_scale_step() -> f32 { 0.01 }
fn default_scale_step_coarse() -> f32 { 0.1 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            input_size: default_input_size(),
            min_pose_score: default_min_pose_score(),
            input_name: default_input_name(),
            landmark_output: default_landmark_output(),
            score_output: default_score_output(),
        }
    }
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            offset_step: default_offset_step(),
            offset_step_coarse: default_offset_step_coarse(),
            scale_step: default_scale_step(),
            scale_step_coarse: default_scale_step_coarse(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Invalid config")?;
        ensure!(config.detector.input_size > 0, "[detector] input_size must be positive");
        Ok(config)
    }

    /// 読めなければデフォルト値
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                tracing::info!("Using default config ({:#})", e);
                Self::default()
            }
        }
    }
}
