use serde::{Deserialize, Serialize};

use crate::pose::{LandmarkIndex, LandmarkSet};

/// アンカー判定のデフォルト可視性閾値
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

const SHOULDERS: [LandmarkIndex; 2] = [LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder];
const HIPS: [LandmarkIndex; 2] = [LandmarkIndex::LeftHip, LandmarkIndex::RightHip];
const FULL: [LandmarkIndex; 4] = [
    LandmarkIndex::LeftShoulder,
    LandmarkIndex::RightShoulder,
    LandmarkIndex::LeftHip,
    LandmarkIndex::RightHip,
];
const EYES: [LandmarkIndex; 2] = [LandmarkIndex::LeftEye, LandmarkIndex::RightEye];
const NOSE: [LandmarkIndex; 1] = [LandmarkIndex::Nose];

/// 位置合わせの基準にするランドマーク群
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Head,
    Shoulders,
    Hips,
    #[default]
    Full,
}

impl Anchor {
    pub const ALL: [Anchor; 4] = [Anchor::Head, Anchor::Shoulders, Anchor::Hips, Anchor::Full];

    pub fn as_str(&self) -> &'static str {
        match self {
            Anchor::Head => "head",
            Anchor::Shoulders => "shoulders",
            Anchor::Hips => "hips",
            Anchor::Full => "full",
        }
    }
}

impl std::fmt::Display for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Anchor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "head" => Ok(Anchor::Head),
            "shoulders" => Ok(Anchor::Shoulders),
            "hips" => Ok(Anchor::Hips),
            "full" => Ok(Anchor::Full),
            other => Err(format!("unknown anchor: {other}")),
        }
    }
}

/// アンカーごとのランドマーク選択と可視性チェック
///
/// アンカー同士は独立で、`hips` は `full` の判定結果を流用せず自分の
/// インデックスだけを検査する。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorPolicy {
    threshold: f32,
}

impl AnchorPolicy {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// アンカーを構成するインデックス。`head` は鼻を優先、目はその代替。
    pub fn required_indices(anchor: Anchor) -> &'static [LandmarkIndex] {
        match anchor {
            Anchor::Head => &NOSE,
            Anchor::Shoulders => &SHOULDERS,
            Anchor::Hips => &HIPS,
            Anchor::Full => &FULL,
        }
    }

    pub fn all_visible(&self, landmarks: &LandmarkSet, indices: &[LandmarkIndex]) -> bool {
        indices
            .iter()
            .all(|&idx| landmarks.get(idx).is_visible(self.threshold))
    }

    pub fn nose_visible(&self, landmarks: &LandmarkSet) -> bool {
        self.all_visible(landmarks, &NOSE)
    }

    pub fn eyes_visible(&self, landmarks: &LandmarkSet) -> bool {
        self.all_visible(landmarks, &EYES)
    }

    /// このランドマークセットでアンカーが使えるか
    pub fn can_calculate(&self, landmarks: &LandmarkSet, anchor: Anchor) -> bool {
        match anchor {
            Anchor::Head => self.nose_visible(landmarks) || self.eyes_visible(landmarks),
            _ => self.all_visible(landmarks, Self::required_indices(anchor)),
        }
    }
}

impl Default for AnchorPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

/// デフォルト閾値 (0.5) でアンカーが使えるか判定
pub fn can_calculate_alignment(landmarks: &LandmarkSet, anchor: Anchor) -> bool {
    AnchorPolicy::default().can_calculate(landmarks, anchor)
}
