use nalgebra::Vector2;

use super::anchor::{Anchor, AnchorPolicy};
use super::settings::{clamp_scale, AlignmentResult};
use crate::error::{AlignmentUnavailable, UnavailableReason};
use crate::pose::{LandmarkIndex, LandmarkSet, PosedImage};

/// これ未満の基準距離は退化とみなす（正規化座標）
pub const DEGENERATE_EPSILON: f32 = 1e-6;

/// 鼻しか使えないときの head アンカー基準距離。両写真で同じ値を使うので倍率は1になる。
pub const HEAD_REFERENCE_SPAN: f32 = 0.05;

/// アンカーの基準点と基準距離（正規化座標）
#[derive(Debug, Clone, Copy, PartialEq)]
struct AnchorGeometry {
    center: Vector2<f32>,
    span: f32,
}

impl AnchorGeometry {
    /// 基準点が有限で、基準距離が有限かつ閾値以上
    fn is_usable(&self) -> bool {
        self.center.iter().all(|v| v.is_finite())
            && self.span.is_finite()
            && self.span >= DEGENERATE_EPSILON
    }
}

/// head アンカーで両写真に共通して使う特徴
#[derive(Debug, Clone, Copy)]
struct HeadFeatures {
    use_nose: bool,
    use_eye_span: bool,
}

fn shoulder_mid(set: &LandmarkSet) -> Vector2<f32> {
    set.midpoint(LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder)
}

fn hip_mid(set: &LandmarkSet) -> Vector2<f32> {
    set.midpoint(LandmarkIndex::LeftHip, LandmarkIndex::RightHip)
}

fn head_geometry(set: &LandmarkSet, features: HeadFeatures) -> AnchorGeometry {
    let center = if features.use_nose {
        set.get(LandmarkIndex::Nose).point()
    } else {
        set.midpoint(LandmarkIndex::LeftEye, LandmarkIndex::RightEye)
    };
    let span = if features.use_eye_span {
        set.distance(LandmarkIndex::LeftEye, LandmarkIndex::RightEye)
    } else {
        HEAD_REFERENCE_SPAN
    };
    AnchorGeometry { center, span }
}

fn anchor_geometry(set: &LandmarkSet, anchor: Anchor, head: HeadFeatures) -> AnchorGeometry {
    match anchor {
        Anchor::Head => head_geometry(set, head),
        Anchor::Shoulders => AnchorGeometry {
            center: shoulder_mid(set),
            span: set.distance(LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder),
        },
        Anchor::Hips => AnchorGeometry {
            center: hip_mid(set),
            span: set.distance(LandmarkIndex::LeftHip, LandmarkIndex::RightHip),
        },
        Anchor::Full => {
            let shoulders = shoulder_mid(set);
            let hips = hip_mid(set);
            AnchorGeometry {
                center: (shoulders + hips) * 0.5,
                span: (shoulders - hips).norm(),
            }
        }
    }
}

/// after写真を before写真に重ねるための倍率とオフセットを計算する
///
/// after写真は左上を原点に `scale` 倍して `(offset_x, offset_y)` に置く前提。
/// 入力は変更せず、同じ入力には常に同じ結果を返す。
pub fn calculate_alignment_with(
    policy: &AnchorPolicy,
    before: PosedImage<'_>,
    after: PosedImage<'_>,
    anchor: Anchor,
) -> Result<AlignmentResult, AlignmentUnavailable> {
    let unavailable = |reason| AlignmentUnavailable::new(anchor, reason);

    if !policy.can_calculate(before.landmarks, anchor) || !policy.can_calculate(after.landmarks, anchor) {
        return Err(unavailable(UnavailableReason::AnchorNotVisible));
    }

    // head は両写真で同じ特徴を使わないと比が意味を持たない
    let head = HeadFeatures {
        use_nose: policy.nose_visible(before.landmarks) && policy.nose_visible(after.landmarks),
        use_eye_span: policy.eyes_visible(before.landmarks) && policy.eyes_visible(after.landmarks),
    };
    if anchor == Anchor::Head && !head.use_nose && !head.use_eye_span {
        return Err(unavailable(UnavailableReason::AnchorNotVisible));
    }

    let b = anchor_geometry(before.landmarks, anchor, head);
    let a = anchor_geometry(after.landmarks, anchor, head);

    if !b.is_usable() || !a.is_usable() {
        return Err(unavailable(UnavailableReason::DegenerateGeometry));
    }

    let scale = clamp_scale(b.span / a.span);

    let before_px = Vector2::new(
        b.center.x * before.size.width as f32,
        b.center.y * before.size.height as f32,
    );
    let after_px = Vector2::new(
        a.center.x * after.size.width as f32,
        a.center.y * after.size.height as f32,
    );
    let offset = before_px - after_px * scale;
    if !offset.iter().all(|v| v.is_finite()) {
        return Err(unavailable(UnavailableReason::DegenerateGeometry));
    }

    Ok(AlignmentResult {
        scale,
        offset_x: offset.x,
        offset_y: offset.y,
    })
}

/// デフォルト閾値で [`calculate_alignment_with`] を呼ぶ
pub fn calculate_alignment(
    before: PosedImage<'_>,
    after: PosedImage<'_>,
    anchor: Anchor,
) -> Result<AlignmentResult, AlignmentUnavailable> {
    calculate_alignment_with(&AnchorPolicy::default(), before, after, anchor)
}
