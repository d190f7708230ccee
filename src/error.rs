use thiserror::Error;

use crate::align::Anchor;

/// 姿勢検出まわりのエラー
///
/// 初期化の結果は待機中の全呼び出し元で共有されるため `Clone` にしている。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectionError {
    /// モデルの読み込みに失敗（再試行可）
    #[error("pose model initialization failed: {0}")]
    InitializationFailed(String),

    /// 画像をデコードできない（別の画像が必要）
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// 人物が写っていない
    #[error("no person visible in the image")]
    NoPoseDetected,

    /// その他の検出器エラー（再試行可）
    #[error("pose detection failed: {0}")]
    DetectionFailed(String),
}

/// アライメントが計算できない理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// アンカーに必要なランドマークの可視性が閾値未満
    AnchorNotVisible,
    /// 基準距離がほぼ0（肩が同一点に重なっている等）
    DegenerateGeometry,
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AnchorNotVisible => write!(f, "anchor landmarks are not visible enough"),
            Self::DegenerateGeometry => write!(f, "anchor landmarks are degenerate"),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot align with the {anchor} anchor: {reason}; try another anchor")]
pub struct AlignmentUnavailable {
    pub anchor: Anchor,
    pub reason: UnavailableReason,
}

impl AlignmentUnavailable {
    pub fn new(anchor: Anchor, reason: UnavailableReason) -> Self {
        Self { anchor, reason }
    }
}

/// コーディネータがユーザーに返すエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlignmentError {
    /// 写真かランドマークが揃っていない、またはアンカーが無効
    #[error("both photos need detected landmarks with a visible {0} anchor")]
    NotReady(Anchor),

    #[error(transparent)]
    Unavailable(#[from] AlignmentUnavailable),
}
