use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};

use pose_align::align::{AlignmentCoordinator, Anchor, Key, KeyEvent};
use pose_align::pose::{Landmark, LandmarkIndex, ModelLoader, Photo, PoseCandidate, PoseDetector, PoseModel};
use pose_align::{AlignmentError, DetectionError};

/// 左上ピクセルの赤成分から肩幅を決める偽モデル。赤が0なら人物なし。
struct SpanModel;

impl PoseModel for SpanModel {
    fn estimate(&mut self, image: &DynamicImage) -> anyhow::Result<Vec<PoseCandidate>> {
        let red = image.get_pixel(0, 0)[0];
        if red == 0 {
            return Ok(Vec::new());
        }
        let half = red as f32 / 250.0 / 2.0;
        let mut landmarks = vec![Landmark::new(0.5, 0.5, 0.0, 0.2); LandmarkIndex::COUNT];
        landmarks[LandmarkIndex::LeftShoulder as usize] = Landmark::new(0.5 - half, 0.4, 0.0, 0.95);
        landmarks[LandmarkIndex::RightShoulder as usize] = Landmark::new(0.5 + half, 0.4, 0.0, 0.95);
        landmarks[LandmarkIndex::LeftHip as usize] = Landmark::new(0.4, 0.8, 0.0, 0.95);
        landmarks[LandmarkIndex::RightHip as usize] = Landmark::new(0.6, 0.8, 0.0, 0.95);
        Ok(vec![PoseCandidate { landmarks, score: 0.9 }])
    }
}

struct SpanLoader;

impl ModelLoader for SpanLoader {
    type Model = SpanModel;

    fn load(&self) -> BoxFuture<'static, anyhow::Result<SpanModel>> {
        async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(SpanModel)
        }
        .boxed()
    }
}

fn png(red: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(64, 64, Rgb([red, 10, 10]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

async fn detect_photo(detector: &PoseDetector<SpanLoader>, id: &str, red: u8) -> (Photo, Result<(), DetectionError>) {
    let (photo, image) = Photo::decode(id, png(red)).unwrap();
    match detector.detect(&image).await {
        Ok(landmarks) => (photo.with_landmarks(landmarks), Ok(())),
        Err(e) => (photo, Err(e)),
    }
}

#[tokio::test(start_paused = true)]
async fn test_detect_then_auto_align() {
    let detector = Arc::new(PoseDetector::new(SpanLoader));
    let (before, after) = tokio::join!(
        detect_photo(&detector, "before", 100),
        detect_photo(&detector, "after", 75)
    );
    assert!(before.1.is_ok());
    assert!(after.1.is_ok());
    assert_eq!(detector.load_count(), 1);

    let mut coordinator = AlignmentCoordinator::new();
    coordinator.set_before(before.0);
    coordinator.set_after(after.0);
    coordinator.set_anchor(Anchor::Shoulders);
    assert!(coordinator.can_align());

    let mut updates = coordinator.subscribe();
    updates.borrow_and_update();
    coordinator.handle_key(&KeyEvent::new(Key::Char('a')));
    updates.changed().await.unwrap();

    let settings = coordinator.settings();
    assert!((settings.scale() - 0.4 / 0.3).abs() < 1e-3);
    assert_eq!(settings.anchor(), Anchor::Shoulders);
    // 両写真とも肩中点は (32, 25.6) px
    assert!((settings.offset_x() - (32.0 - settings.scale() * 32.0)).abs() < 1e-3);
    assert!((settings.offset_y() - (25.6 - settings.scale() * 25.6)).abs() < 1e-3);
    assert_eq!(coordinator.computation_count(), 1);

    coordinator.handle_key(&KeyEvent::new(Key::Char('r')));
    assert!(!coordinator.is_aligned());
    assert_eq!(coordinator.settings().anchor(), Anchor::Full);
}

#[tokio::test(start_paused = true)]
async fn test_photo_without_pose_cannot_align() {
    let detector = PoseDetector::new(SpanLoader);
    let (before, _) = detect_photo(&detector, "before", 100).await;
    let (after, outcome) = detect_photo(&detector, "after", 0).await;
    assert_eq!(outcome, Err(DetectionError::NoPoseDetected));
    assert!(after.landmarks().is_none());

    let mut coordinator = AlignmentCoordinator::new();
    coordinator.set_before(before);
    coordinator.set_after(after);
    assert!(!coordinator.can_align());
    assert_eq!(coordinator.align_now(), Err(AlignmentError::NotReady(Anchor::Full)));
}

#[tokio::test(start_paused = true)]
async fn test_close_then_detect_reloads() {
    let detector = PoseDetector::new(SpanLoader);
    detect_photo(&detector, "a", 100).await.1.unwrap();
    detector.close();
    assert!(!detector.is_ready());
    detect_photo(&detector, "b", 100).await.1.unwrap();
    assert_eq!(detector.load_count(), 2);
}

#[tokio::test]
async fn test_undecodable_bytes() {
    let detector = PoseDetector::new(SpanLoader);
    let result = detector.detect_bytes(b"not an image").await;
    assert!(matches!(result, Err(DetectionError::InvalidImage(_))));
}
