use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::anchor::{Anchor, AnchorPolicy};
use super::calculator::calculate_alignment_with;
use super::debug::{self, DebugSink, DebugSnapshot};
use super::keyboard::{KeyAction, KeyBindings, KeyEvent};
use super::overlay::{landmark_overlay, LandmarkOverlay};
use super::settings::{AlignmentResult, AlignmentSettings};
use crate::config::Config;
use crate::error::AlignmentError;
use crate::pose::{Photo, PosedImage};

/// 変換とは無関係な表示フラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayFlags {
    pub show_landmarks: bool,
    pub show_grid: bool,
}

/// 自動位置合わせ1回分の入力（トリガー時点のスナップショット）
#[derive(Clone)]
struct AlignInputs {
    before: Option<Arc<Photo>>,
    after: Option<Arc<Photo>>,
    anchor: Anchor,
    policy: AnchorPolicy,
}

impl AlignInputs {
    fn posed(&self) -> Option<(PosedImage<'_>, PosedImage<'_>)> {
        Some((self.before.as_deref()?.posed()?, self.after.as_deref()?.posed()?))
    }

    fn is_ready(&self) -> bool {
        self.posed().is_some_and(|(before, after)| {
            self.policy.can_calculate(before.landmarks, self.anchor)
                && self.policy.can_calculate(after.landmarks, self.anchor)
        })
    }

    fn compute(&self) -> Result<AlignmentResult, AlignmentError> {
        if !self.is_ready() {
            return Err(AlignmentError::NotReady(self.anchor));
        }
        let (before, after) = self.posed().ok_or(AlignmentError::NotReady(self.anchor))?;
        Ok(calculate_alignment_with(&self.policy, before, after, self.anchor)?)
    }
}

/// コーディネータと遅延タスクが共有する状態
struct Shared {
    settings: watch::Sender<AlignmentSettings>,
    last_error: Mutex<Option<AlignmentError>>,
    computations: AtomicUsize,
    debug_sink: Mutex<Option<Arc<dyn DebugSink>>>,
}

impl Shared {
    fn set_error(&self, error: Option<AlignmentError>) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = error;
    }

    fn debug_sink(&self) -> Option<Arc<dyn DebugSink>> {
        self.debug_sink.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 計算して設定に反映する。失敗時は設定を変えない。
    ///
    /// `cancel` がキャンセル済みなら書き込まない（reset との競合対策）。
    fn run(
        &self,
        inputs: &AlignInputs,
        source: &'static str,
        cancel: Option<&CancellationToken>,
    ) -> Result<AlignmentResult, AlignmentError> {
        self.computations.fetch_add(1, Ordering::SeqCst);

        let result = match inputs.compute() {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(anchor = %inputs.anchor, "alignment unavailable: {}", e);
                if !cancel.is_some_and(CancellationToken::is_cancelled) {
                    self.set_error(Some(e.clone()));
                }
                return Err(e);
            }
        };

        let applied = self.settings.send_if_modified(|settings| {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return false;
            }
            settings.apply(&result);
            true
        });
        if !applied {
            return Ok(result);
        }

        tracing::debug!(
            anchor = %inputs.anchor,
            scale = result.scale,
            offset_x = result.offset_x,
            offset_y = result.offset_y,
            "alignment applied"
        );
        self.set_error(None);

        if let (Some(sink), Some((before, after))) = (self.debug_sink(), inputs.posed()) {
            let snapshot = DebugSnapshot::new(source, before, after, *self.settings.borrow());
            debug::emit(sink.as_ref(), &snapshot);
        }
        Ok(result)
    }
}

struct PendingAlign {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// 写真・アンカーの状態から位置合わせを再計算し、キー操作を設定に反映する
///
/// 自動位置合わせはデバウンスされ、連続したリクエストのうち最後の1回だけが
/// 計算される。破棄時には未実行のタスクをキャンセルする。
/// 遅延タスクは生成時に取得した tokio ランタイムで動かす。ランタイムが
/// どこにもなければデバウンスせずその場で計算する。
pub struct AlignmentCoordinator {
    policy: AnchorPolicy,
    debounce: Duration,
    bindings: KeyBindings,
    before: Option<Arc<Photo>>,
    after: Option<Arc<Photo>>,
    display: DisplayFlags,
    shared: Arc<Shared>,
    session: CancellationToken,
    pending: Option<PendingAlign>,
    runtime: Option<Handle>,
}

impl AlignmentCoordinator {
    pub fn new() -> Self {
        Self::from_config(&Config::default())
    }

    pub fn from_config(config: &Config) -> Self {
        let (settings, _) = watch::channel(AlignmentSettings::neutral());
        Self {
            policy: AnchorPolicy::new(config.alignment.confidence_threshold),
            debounce: Duration::from_millis(config.alignment.debounce_ms),
            bindings: KeyBindings::new(config.keyboard),
            before: None,
            after: None,
            display: DisplayFlags::default(),
            shared: Arc::new(Shared {
                settings,
                last_error: Mutex::new(None),
                computations: AtomicUsize::new(0),
                debug_sink: Mutex::new(None),
            }),
            session: CancellationToken::new(),
            pending: None,
            runtime: Handle::try_current().ok(),
        }
    }

    /// デバッグスナップショットの送り先を設定
    pub fn with_debug_sink(self, sink: Arc<dyn DebugSink>) -> Self {
        self.set_debug_sink(Some(sink));
        self
    }

    /// 予約済みのタスクにも反映される
    pub fn set_debug_sink(&self, sink: Option<Arc<dyn DebugSink>>) {
        *self.shared.debug_sink.lock().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    pub fn settings(&self) -> AlignmentSettings {
        *self.shared.settings.borrow()
    }

    /// 設定の変更を購読する（レンダラ向け）
    pub fn subscribe(&self) -> watch::Receiver<AlignmentSettings> {
        self.shared.settings.subscribe()
    }

    pub fn display(&self) -> DisplayFlags {
        self.display
    }

    pub fn last_error(&self) -> Option<AlignmentError> {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// これまでに実行した計算の回数
    pub fn computation_count(&self) -> usize {
        self.shared.computations.load(Ordering::SeqCst)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| !p.task.is_finished())
    }

    pub fn before(&self) -> Option<&Photo> {
        self.before.as_deref()
    }

    pub fn after(&self) -> Option<&Photo> {
        self.after.as_deref()
    }

    pub fn set_before(&mut self, photo: Photo) {
        self.before = Some(Arc::new(photo));
    }

    pub fn set_after(&mut self, photo: Photo) {
        self.after = Some(Arc::new(photo));
    }

    pub fn clear_before(&mut self) {
        self.before = None;
    }

    pub fn clear_after(&mut self) {
        self.after = None;
    }

    pub fn set_anchor(&mut self, anchor: Anchor) {
        self.shared.settings.send_modify(|s| s.set_anchor(anchor));
    }

    fn inputs(&self) -> AlignInputs {
        AlignInputs {
            before: self.before.clone(),
            after: self.after.clone(),
            anchor: self.settings().anchor(),
            policy: self.policy,
        }
    }

    /// 両写真にランドマークがあり、現在のアンカーが両方で使えるか
    pub fn can_align(&self) -> bool {
        self.inputs().is_ready()
    }

    /// 現在の設定が等倍・オフセット0 から変わっているか
    pub fn is_aligned(&self) -> bool {
        self.settings().is_aligned()
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel.cancel();
            pending.task.abort();
        }
    }

    /// デバウンス付きで自動位置合わせを予約する
    ///
    /// 待機中の予約があれば取り消して、今の入力で予約し直す。
    pub fn request_auto_align(&mut self) {
        self.cancel_pending();
        if self.session.is_cancelled() {
            return;
        }

        let inputs = self.inputs();
        let Some(runtime) = Handle::try_current().ok().or_else(|| self.runtime.clone()) else {
            tracing::debug!("no tokio runtime, aligning without debounce");
            let _ = self.shared.run(&inputs, "auto-align", None);
            return;
        };
        let cancel = self.session.child_token();
        let token = cancel.clone();
        let shared = Arc::clone(&self.shared);
        let delay = self.debounce;

        let task = runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = shared.run(&inputs, "auto-align", Some(&token));
                }
            }
        });
        self.pending = Some(PendingAlign { cancel, task });
    }

    /// デバウンスせずにすぐ計算する
    pub fn align_now(&mut self) -> Result<AlignmentResult, AlignmentError> {
        self.cancel_pending();
        let inputs = self.inputs();
        self.shared.run(&inputs, "align-now", None)
    }

    /// 予約を取り消し、等倍・オフセット0・アンカー full に戻す
    pub fn reset(&mut self) {
        self.cancel_pending();
        self.shared.settings.send_modify(AlignmentSettings::reset);
        self.shared.set_error(None);
    }

    pub fn nudge(&mut self, dx: f32, dy: f32) {
        self.shared.settings.send_modify(|s| s.adjust_offset(dx, dy));
    }

    pub fn adjust_scale(&mut self, delta: f32) {
        self.shared.settings.send_modify(|s| s.adjust_scale(delta));
    }

    /// キー入力を処理して、実行したアクションを返す
    pub fn handle_key(&mut self, event: &KeyEvent) -> Option<KeyAction> {
        let action = self.bindings.resolve(event)?;
        match action {
            KeyAction::MoveOffset { dx, dy } => self.nudge(dx, dy),
            KeyAction::AdjustScale(delta) => self.adjust_scale(delta),
            KeyAction::Reset => self.reset(),
            KeyAction::AutoAlign => self.request_auto_align(),
            KeyAction::ToggleLandmarks => self.display.show_landmarks = !self.display.show_landmarks,
            KeyAction::ToggleGrid => self.display.show_grid = !self.display.show_grid,
        }
        Some(action)
    }

    /// ランドマーク表示がオンのときだけ骨格線を返す
    pub fn landmark_overlay(&self) -> Option<LandmarkOverlay> {
        if !self.display.show_landmarks {
            return None;
        }
        let before = self.before.as_deref().and_then(Photo::posed);
        let after = self.after.as_deref().and_then(Photo::posed);
        Some(landmark_overlay(before, after, &self.settings(), self.policy.threshold()))
    }

    /// 未実行のタスクを止める。以後の予約も実行されない。
    pub fn shutdown(&mut self) {
        self.session.cancel();
        self.cancel_pending();
    }
}

impl Default for AlignmentCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AlignmentCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
