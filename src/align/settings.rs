use serde::Serialize;

use super::anchor::Anchor;

pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 2.0;

/// スケールを許容範囲 [0.5, 2.0] に収める。NaN は等倍に戻す。
pub fn clamp_scale(scale: f32) -> f32 {
    if scale.is_nan() {
        1.0
    } else {
        scale.clamp(MIN_SCALE, MAX_SCALE)
    }
}

/// 計算結果（after写真に適用する変換）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlignmentResult {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// セッション中に共有される位置合わせ状態
///
/// 書き込みはすべてこのメソッド経由で行い、スケールのクランプを共通化する。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlignmentSettings {
    anchor: Anchor,
    scale: f32,
    offset_x: f32,
    offset_y: f32,
}

impl AlignmentSettings {
    /// anchor=full, scale=1, offset=0
    pub fn neutral() -> Self {
        Self {
            anchor: Anchor::Full,
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    pub fn anchor(&self) -> Anchor {
        self.anchor
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn offset_x(&self) -> f32 {
        self.offset_x
    }

    pub fn offset_y(&self) -> f32 {
        self.offset_y
    }

    /// 等倍・オフセット0 と異なるか（アンカーは問わない）
    pub fn is_aligned(&self) -> bool {
        self.scale != 1.0 || self.offset_x != 0.0 || self.offset_y != 0.0
    }

    pub fn set_anchor(&mut self, anchor: Anchor) {
        self.anchor = anchor;
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = clamp_scale(scale);
    }

    pub fn adjust_scale(&mut self, delta: f32) {
        self.set_scale(self.scale + delta);
    }

    pub fn adjust_offset(&mut self, dx: f32, dy: f32) {
        self.offset_x += dx;
        self.offset_y += dy;
    }

    /// 計算結果を反映。アンカーはそのまま。
    pub fn apply(&mut self, result: &AlignmentResult) {
        self.set_scale(result.scale);
        self.offset_x = result.offset_x;
        self.offset_y = result.offset_y;
    }

    pub fn reset(&mut self) {
        *self = Self::neutral();
    }
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self::neutral()
    }
}
