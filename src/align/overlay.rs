use nalgebra::Vector2;

use super::settings::AlignmentSettings;
use crate::pose::{LandmarkIndex, PosedImage};

/// 骨格の接続定義 (開始ランドマーク, 終了ランドマーク)
pub const POSE_CONNECTIONS: [(LandmarkIndex, LandmarkIndex); 35] = [
    // 顔
    (LandmarkIndex::Nose, LandmarkIndex::LeftEyeInner),
    (LandmarkIndex::LeftEyeInner, LandmarkIndex::LeftEye),
    (LandmarkIndex::LeftEye, LandmarkIndex::LeftEyeOuter),
    (LandmarkIndex::LeftEyeOuter, LandmarkIndex::LeftEar),
    (LandmarkIndex::Nose, LandmarkIndex::RightEyeInner),
    (LandmarkIndex::RightEyeInner, LandmarkIndex::RightEye),
    (LandmarkIndex::RightEye, LandmarkIndex::RightEyeOuter),
    (LandmarkIndex::RightEyeOuter, LandmarkIndex::RightEar),
    (LandmarkIndex::MouthLeft, LandmarkIndex::MouthRight),
    // 上半身
    (LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder),
    (LandmarkIndex::LeftShoulder, LandmarkIndex::LeftElbow),
    (LandmarkIndex::LeftElbow, LandmarkIndex::LeftWrist),
    (LandmarkIndex::LeftWrist, LandmarkIndex::LeftPinky),
    (LandmarkIndex::LeftWrist, LandmarkIndex::LeftIndex),
    (LandmarkIndex::LeftWrist, LandmarkIndex::LeftThumb),
    (LandmarkIndex::LeftPinky, LandmarkIndex::LeftIndex),
    (LandmarkIndex::RightShoulder, LandmarkIndex::RightElbow),
    (LandmarkIndex::RightElbow, LandmarkIndex::RightWrist),
    (LandmarkIndex::RightWrist, LandmarkIndex::RightPinky),
    (LandmarkIndex::RightWrist, LandmarkIndex::RightIndex),
    (LandmarkIndex::RightWrist, LandmarkIndex::RightThumb),
    (LandmarkIndex::RightPinky, LandmarkIndex::RightIndex),
    // 胴体
    (LandmarkIndex::LeftShoulder, LandmarkIndex::LeftHip),
    (LandmarkIndex::RightShoulder, LandmarkIndex::RightHip),
    (LandmarkIndex::LeftHip, LandmarkIndex::RightHip),
    // 下半身
    (LandmarkIndex::LeftHip, LandmarkIndex::LeftKnee),
    (LandmarkIndex::RightHip, LandmarkIndex::RightKnee),
    (LandmarkIndex::LeftKnee, LandmarkIndex::LeftAnkle),
    (LandmarkIndex::RightKnee, LandmarkIndex::RightAnkle),
    (LandmarkIndex::LeftAnkle, LandmarkIndex::LeftHeel),
    (LandmarkIndex::RightAnkle, LandmarkIndex::RightHeel),
    (LandmarkIndex::LeftHeel, LandmarkIndex::LeftFootIndex),
    (LandmarkIndex::RightHeel, LandmarkIndex::RightFootIndex),
    (LandmarkIndex::LeftAnkle, LandmarkIndex::LeftFootIndex),
    (LandmarkIndex::RightAnkle, LandmarkIndex::RightFootIndex),
];

/// キャンバス座標（ピクセル）の線分
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: Vector2<f32>,
    pub to: Vector2<f32>,
}

/// ランドマーク表示用の線分。両写真ともキャンバス座標に揃えてある。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkOverlay {
    pub before: Vec<Segment>,
    pub after: Vec<Segment>,
}

/// 可視性が閾値以上の接続だけを、scale 倍して offset だけずらした座標で返す
pub fn skeleton_segments(
    image: PosedImage<'_>,
    scale: f32,
    offset: Vector2<f32>,
    threshold: f32,
) -> Vec<Segment> {
    let to_canvas = |idx: LandmarkIndex| {
        image.landmarks.get(idx).to_pixel(image.size.width, image.size.height) * scale + offset
    };
    POSE_CONNECTIONS
        .iter()
        .filter(|(a, b)| {
            image.landmarks.get(*a).is_visible(threshold) && image.landmarks.get(*b).is_visible(threshold)
        })
        .map(|&(a, b)| Segment {
            from: to_canvas(a),
            to: to_canvas(b),
        })
        .collect()
}

/// before はそのまま、after は現在の変換を適用した骨格
pub fn landmark_overlay(
    before: Option<PosedImage<'_>>,
    after: Option<PosedImage<'_>>,
    settings: &AlignmentSettings,
    threshold: f32,
) -> LandmarkOverlay {
    let offset = Vector2::new(settings.offset_x(), settings.offset_y());
    LandmarkOverlay {
        before: before
            .map(|img| skeleton_segments(img, 1.0, Vector2::zeros(), threshold))
            .unwrap_or_default(),
        after: after
            .map(|img| skeleton_segments(img, settings.scale(), offset, threshold))
            .unwrap_or_default(),
    }
}
