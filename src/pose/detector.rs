use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use image::DynamicImage;

use super::landmark::{Landmark, LandmarkSet};
use super::photo::{decode_image, ImageSize};
use crate::error::DetectionError;

/// モデルが返す1人分の検出候補
#[derive(Debug, Clone, PartialEq)]
pub struct PoseCandidate {
    /// 正規化座標のランドマーク（33点であること）
    pub landmarks: Vec<Landmark>,
    /// 人物らしさのスコア
    pub score: f32,
}

/// 読み込み済みの姿勢推定モデル
pub trait PoseModel: Send + 'static {
    /// 画像から人物候補を推定する。人物がいなければ空。
    fn estimate(&mut self, image: &DynamicImage) -> anyhow::Result<Vec<PoseCandidate>>;
}

/// モデルの読み込み手段（リモート資産の取得などで時間がかかる）
pub trait ModelLoader: Send + Sync + 'static {
    type Model: PoseModel;

    fn load(&self) -> BoxFuture<'static, anyhow::Result<Self::Model>>;
}

/// 読み込み済みモデルへの共有ハンドル
///
/// 同じインスタンスへの検出呼び出しは内部のロックで直列化される。
pub struct DetectorHandle<M> {
    model: Arc<tokio::sync::Mutex<M>>,
}

impl<M> Clone for DetectorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            model: Arc::clone(&self.model),
        }
    }
}

impl<M> PartialEq for DetectorHandle<M> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.model, &other.model)
    }
}

impl<M> std::fmt::Debug for DetectorHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorHandle")
            .field("instance", &Arc::as_ptr(&self.model))
            .finish()
    }
}

impl<M: PoseModel> DetectorHandle<M> {
    fn new(model: M) -> Self {
        Self {
            model: Arc::new(tokio::sync::Mutex::new(model)),
        }
    }

    /// 最もスコアの高い1人分のランドマークを返す
    pub async fn detect(&self, image: &DynamicImage) -> Result<LandmarkSet, DetectionError> {
        if ImageSize::of(image).is_none() {
            return Err(DetectionError::InvalidImage("image has zero size".to_string()));
        }

        let candidates = {
            let mut model = self.model.lock().await;
            let start = Instant::now();
            let candidates = model
                .estimate(image)
                .map_err(|e| DetectionError::DetectionFailed(format!("{e:#}")))?;
            tracing::debug!(
                candidates = candidates.len(),
                elapsed_ms = start.elapsed().as_secs_f32() * 1000.0,
                "pose estimation finished"
            );
            candidates
        };

        select_best(candidates)
    }
}

fn select_best(candidates: Vec<PoseCandidate>) -> Result<LandmarkSet, DetectionError> {
    let best = candidates
        .into_iter()
        .filter(|c| !c.score.is_nan())
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .ok_or(DetectionError::NoPoseDetected)?;

    LandmarkSet::from_slice(&best.landmarks).ok_or_else(|| {
        DetectionError::DetectionFailed(format!(
            "expected 33 landmarks, model returned {}",
            best.landmarks.len()
        ))
    })
}

type InitOutcome<M> = Result<DetectorHandle<M>, DetectionError>;
type PendingInit<M> = Shared<BoxFuture<'static, InitOutcome<M>>>;

enum State<M> {
    Uninitialized,
    /// 読み込み中。後から来た呼び出しは同じ future を待つ。
    Initializing(PendingInit<M>),
    Ready(DetectorHandle<M>),
}

struct Inner<M> {
    state: State<M>,
    /// 読み込み開始・close のたびに進める。古い読み込み結果の反映を防ぐ。
    generation: u64,
}

/// 姿勢検出器のライフサイクル管理
///
/// モデルのインスタンスは常に高々1つ。`initialize` は冪等で、同時に呼ばれても
/// 読み込みは1回しか走らない。失敗したら未初期化に戻り再試行できる。
pub struct PoseDetector<L: ModelLoader> {
    loader: Arc<L>,
    inner: Mutex<Inner<L::Model>>,
    loads: AtomicUsize,
}

impl<L: ModelLoader> PoseDetector<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader: Arc::new(loader),
            inner: Mutex::new(Inner {
                state: State::Uninitialized,
                generation: 0,
            }),
            loads: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<L::Model>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_load(&self) -> PendingInit<L::Model> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let load = self.loader.load();
        async move {
            let start = Instant::now();
            match load.await {
                Ok(model) => {
                    tracing::info!(
                        elapsed_ms = start.elapsed().as_secs_f32() * 1000.0,
                        "pose model loaded"
                    );
                    Ok(DetectorHandle::new(model))
                }
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "pose model load failed");
                    Err(DetectionError::InitializationFailed(format!("{e:#}")))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// 検出器を初期化してハンドルを返す
    pub async fn initialize(&self) -> Result<DetectorHandle<L::Model>, DetectionError> {
        let (generation, pending) = {
            let mut inner = self.lock();
            match &inner.state {
                State::Ready(handle) => return Ok(handle.clone()),
                State::Initializing(pending) => (inner.generation, pending.clone()),
                State::Uninitialized => {
                    inner.generation += 1;
                    let pending = self.start_load();
                    inner.state = State::Initializing(pending.clone());
                    (inner.generation, pending)
                }
            }
        };

        let outcome = pending.await;

        let mut inner = self.lock();
        if inner.generation == generation && matches!(inner.state, State::Initializing(_)) {
            inner.state = match &outcome {
                Ok(handle) => State::Ready(handle.clone()),
                Err(_) => State::Uninitialized,
            };
        }
        outcome
    }

    /// 未初期化なら初期化してから検出する
    pub async fn detect(&self, image: &DynamicImage) -> Result<LandmarkSet, DetectionError> {
        let handle = self.initialize().await?;
        handle.detect(image).await
    }

    /// バイト列をデコードして検出する
    pub async fn detect_bytes(&self, bytes: &[u8]) -> Result<LandmarkSet, DetectionError> {
        let image = decode_image(bytes)?;
        self.detect(&image).await
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.lock().state, State::Ready(_))
    }

    /// モデルを解放して未初期化に戻す。次の `initialize` で再読み込みする。
    pub fn close(&self) {
        let previous = {
            let mut inner = self.lock();
            inner.generation += 1;
            std::mem::replace(&mut inner.state, State::Uninitialized)
        };
        if matches!(previous, State::Ready(_)) {
            tracing::info!("pose model released");
        }
    }

    /// これまでに開始した読み込み回数
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::LandmarkIndex;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    #[derive(Clone)]
    struct FakeModel {
        candidates: Vec<PoseCandidate>,
        fail: bool,
    }

    impl PoseModel for FakeModel {
        fn estimate(&mut self, _image: &DynamicImage) -> anyhow::Result<Vec<PoseCandidate>> {
            if self.fail {
                anyhow::bail!("backend exploded");
            }
            Ok(self.candidates.clone())
        }
    }

    struct FakeLoader {
        model: FakeModel,
        fail_next: Arc<AtomicBool>,
    }

    impl FakeLoader {
        fn with_candidates(candidates: Vec<PoseCandidate>) -> Self {
            Self {
                model: FakeModel { candidates, fail: false },
                fail_next: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl ModelLoader for FakeLoader {
        type Model = FakeModel;

        fn load(&self) -> BoxFuture<'static, anyhow::Result<FakeModel>> {
            let model = self.model.clone();
            let fail = self.fail_next.swap(false, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if fail {
                    anyhow::bail!("model asset unreachable");
                }
                Ok(model)
            }
            .boxed()
        }
    }

    fn candidate(score: f32, x: f32) -> PoseCandidate {
        PoseCandidate {
            landmarks: vec![Landmark::new(x, 0.5, 0.0, 0.9); LandmarkIndex::COUNT],
            score,
        }
    }

    fn image() -> DynamicImage {
        DynamicImage::new_rgb8(32, 32)
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_initialize_loads_once() {
        let detector = PoseDetector::new(FakeLoader::with_candidates(vec![]));
        let (a, b) = tokio::join!(detector.initialize(), detector.initialize());
        assert_eq!(detector.load_count(), 1);
        assert_eq!(a.unwrap(), b.unwrap());
        assert!(detector.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_is_idempotent() {
        let detector = PoseDetector::new(FakeLoader::with_candidates(vec![]));
        let first = detector.initialize().await.unwrap();
        let second = detector.initialize().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(detector.load_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_initialize_resets_and_retries() {
        let loader = FakeLoader::with_candidates(vec![]);
        loader.fail_next.store(true, Ordering::SeqCst);
        let detector = PoseDetector::new(loader);

        let (a, b) = tokio::join!(detector.initialize(), detector.initialize());
        assert!(matches!(a, Err(DetectionError::InitializationFailed(_))));
        assert_eq!(a, b);
        assert_eq!(detector.load_count(), 1);
        assert!(!detector.is_ready());

        detector.initialize().await.unwrap();
        assert_eq!(detector.load_count(), 2);
        assert!(detector.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_forces_reload() {
        let detector = PoseDetector::new(FakeLoader::with_candidates(vec![]));
        let first = detector.initialize().await.unwrap();
        detector.close();
        assert!(!detector.is_ready());

        let second = detector.initialize().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(detector.load_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_load_discards_result() {
        let detector = PoseDetector::new(FakeLoader::with_candidates(vec![]));
        let (outcome, _) = tokio::join!(detector.initialize(), async {
            tokio::task::yield_now().await;
            detector.close();
        });
        assert!(outcome.is_ok());
        assert!(!detector.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_auto_initializes_and_picks_best() {
        let detector = PoseDetector::new(FakeLoader::with_candidates(vec![
            candidate(0.4, 0.1),
            candidate(0.95, 0.7),
            candidate(0.6, 0.3),
        ]));
        assert!(!detector.is_ready());

        let set = detector.detect(&image()).await.unwrap();
        assert!(detector.is_ready());
        assert!((set.get(LandmarkIndex::Nose).x - 0.7).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_no_pose() {
        let detector = PoseDetector::new(FakeLoader::with_candidates(vec![]));
        let err = detector.detect(&image()).await.unwrap_err();
        assert_eq!(err, DetectionError::NoPoseDetected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_wrong_landmark_count() {
        let mut short = candidate(0.9, 0.5);
        short.landmarks.truncate(17);
        let detector = PoseDetector::new(FakeLoader::with_candidates(vec![short]));
        let err = detector.detect(&image()).await.unwrap_err();
        assert!(matches!(err, DetectionError::DetectionFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_backend_error() {
        let mut loader = FakeLoader::with_candidates(vec![]);
        loader.model.fail = true;
        let detector = PoseDetector::new(loader);
        let err = detector.detect(&image()).await.unwrap_err();
        assert!(matches!(err, DetectionError::DetectionFailed(msg) if msg.contains("exploded")));
    }

    /// 同時に estimate に入っている数を記録するモデル
    struct CountingModel {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl PoseModel for CountingModel {
        fn estimate(&mut self, _image: &DynamicImage) -> anyhow::Result<Vec<PoseCandidate>> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![candidate(0.9, 0.5)])
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_detects_are_serialized() {
        let peak = Arc::new(AtomicUsize::new(0));
        let handle = DetectorHandle::new(CountingModel {
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::clone(&peak),
        });

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.detect(&image()).await })
            })
            .collect();
        let (img_a, img_b) = (image(), image());
        let (a, b) = tokio::join!(handle.detect(&img_a), handle.detect(&img_b));
        a.unwrap();
        b.unwrap();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_invalid_image() {
        let detector = PoseDetector::new(FakeLoader::with_candidates(vec![candidate(0.9, 0.5)]));
        let err = detector.detect(&DynamicImage::new_rgb8(0, 0)).await.unwrap_err();
        assert!(matches!(err, DetectionError::InvalidImage(_)));

        let err = detector.detect_bytes(b"garbage").await.unwrap_err();
        assert!(matches!(err, DetectionError::InvalidImage(_)));
    }
}
