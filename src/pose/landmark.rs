use nalgebra::Vector2;
use serde::Serialize;

/// BlazePose の 33 ランドマークインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(usize)]
pub enum LandmarkIndex {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl LandmarkIndex {
    pub const COUNT: usize = 33;

    const ALL: [LandmarkIndex; Self::COUNT] = [
        Self::Nose,
        Self::LeftEyeInner,
        Self::LeftEye,
        Self::LeftEyeOuter,
        Self::RightEyeInner,
        Self::RightEye,
        Self::RightEyeOuter,
        Self::LeftEar,
        Self::RightEar,
        Self::MouthLeft,
        Self::MouthRight,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftPinky,
        Self::RightPinky,
        Self::LeftIndex,
        Self::RightIndex,
        Self::LeftThumb,
        Self::RightThumb,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
        Self::LeftHeel,
        Self::RightHeel,
        Self::LeftFootIndex,
        Self::RightFootIndex,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 相対的な奥行き（単位なし）
    pub z: f32,
    /// 可視性スコア (0.0〜1.0)
    pub visibility: f32,
}

impl Landmark {
    /// visibility は [0, 1] にクランプされる（NaN は 0 扱い）
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        let visibility = if visibility.is_nan() {
            0.0
        } else {
            visibility.clamp(0.0, 1.0)
        };
        Self { x, y, z, visibility }
    }

    /// 可視性が閾値以上か
    pub fn is_visible(&self, threshold: f32) -> bool {
        self.visibility >= threshold
    }

    /// 正規化座標を2Dベクトルとして取得
    pub fn point(&self) -> Vector2<f32> {
        Vector2::new(self.x, self.y)
    }

    /// ピクセル座標に変換
    pub fn to_pixel(&self, width: u32, height: u32) -> Vector2<f32> {
        Vector2::new(self.x * width as f32, self.y * height as f32)
    }
}

/// 33ランドマークからなる姿勢。インデックスが部位を表すので並べ替えない。
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    landmarks: [Landmark; LandmarkIndex::COUNT],
}

impl LandmarkSet {
    pub fn new(landmarks: [Landmark; LandmarkIndex::COUNT]) -> Self {
        Self { landmarks }
    }

    /// 長さがちょうど33でなければ None（＝ランドマークなし扱い）
    pub fn from_slice(landmarks: &[Landmark]) -> Option<Self> {
        let landmarks: [Landmark; LandmarkIndex::COUNT] = landmarks.try_into().ok()?;
        Some(Self { landmarks })
    }

    pub fn get(&self, index: LandmarkIndex) -> &Landmark {
        &self.landmarks[index as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.iter()
    }

    pub fn as_slice(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// 2点の中点（正規化座標）
    pub fn midpoint(&self, a: LandmarkIndex, b: LandmarkIndex) -> Vector2<f32> {
        (self.get(a).point() + self.get(b).point()) * 0.5
    }

    /// 2点間のユークリッド距離（正規化座標）
    pub fn distance(&self, a: LandmarkIndex, b: LandmarkIndex) -> f32 {
        (self.get(a).point() - self.get(b).point()).norm()
    }

    /// 全ランドマークの平均可視性
    pub fn average_visibility(&self) -> f32 {
        let sum: f32 = self.landmarks.iter().map(|l| l.visibility).sum();
        sum / LandmarkIndex::COUNT as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_index_count() {
        assert_eq!(LandmarkIndex::COUNT, 33);
        assert_eq!(LandmarkIndex::LeftShoulder as usize, 11);
        assert_eq!(LandmarkIndex::RightHip as usize, 24);
    }

    #[test]
    fn test_landmark_index_from_index() {
        assert_eq!(LandmarkIndex::from_index(0), Some(LandmarkIndex::Nose));
        assert_eq!(LandmarkIndex::from_index(12), Some(LandmarkIndex::RightShoulder));
        assert_eq!(LandmarkIndex::from_index(32), Some(LandmarkIndex::RightFootIndex));
        assert_eq!(LandmarkIndex::from_index(33), None);
    }

    #[test]
    fn test_landmark_index_table_matches_discriminants() {
        for (i, idx) in LandmarkIndex::ALL.iter().enumerate() {
            assert_eq!(*idx as usize, i);
        }
    }

    #[test]
    fn test_visibility_never_negative() {
        assert_eq!(Landmark::new(0.5, 0.5, 0.0, -0.3).visibility, 0.0);
        assert_eq!(Landmark::new(0.5, 0.5, 0.0, 1.7).visibility, 1.0);
        assert_eq!(Landmark::new(0.5, 0.5, 0.0, f32::NAN).visibility, 0.0);
    }

    #[test]
    fn test_landmark_is_visible() {
        let lm = Landmark::new(0.5, 0.5, 0.0, 0.5);
        assert!(lm.is_visible(0.5));
        assert!(!lm.is_visible(0.51));
    }

    #[test]
    fn test_landmark_to_pixel() {
        let lm = Landmark::new(0.5, 0.25, 0.0, 1.0);
        let p = lm.to_pixel(640, 480);
        assert_eq!(p.x, 320.0);
        assert_eq!(p.y, 120.0);
    }

    #[test]
    fn test_from_slice_requires_33() {
        let short = vec![Landmark::default(); 17];
        assert!(LandmarkSet::from_slice(&short).is_none());
        let long = vec![Landmark::default(); 34];
        assert!(LandmarkSet::from_slice(&long).is_none());
        let exact = vec![Landmark::default(); 33];
        assert!(LandmarkSet::from_slice(&exact).is_some());
    }

    #[test]
    fn test_midpoint_and_distance() {
        let mut landmarks = [Landmark::default(); LandmarkIndex::COUNT];
        landmarks[LandmarkIndex::LeftShoulder as usize] = Landmark::new(0.3, 0.4, 0.0, 0.9);
        landmarks[LandmarkIndex::RightShoulder as usize] = Landmark::new(0.7, 0.4, 0.0, 0.9);
        let set = LandmarkSet::new(landmarks);

        let mid = set.midpoint(LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder);
        assert!((mid.x - 0.5).abs() < 1e-6);
        assert!((mid.y - 0.4).abs() < 1e-6);
        let d = set.distance(LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder);
        assert!((d - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_average_visibility() {
        let set = LandmarkSet::new([Landmark::new(0.0, 0.0, 0.0, 0.5); LandmarkIndex::COUNT]);
        assert!((set.average_visibility() - 0.5).abs() < 0.001);
    }
}
