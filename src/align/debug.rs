//! Debug snapshots of alignment runs.
//!
//! Sinks are fire-and-forget: a failing sink is logged and otherwise ignored.

use serde::Serialize;

use super::settings::AlignmentSettings;
use crate::pose::{ImageSize, Landmark, LandmarkIndex, LandmarkSet, PosedImage};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyLandmarkSummary {
    pub nose: Landmark,
    pub left_shoulder: Landmark,
    pub right_shoulder: Landmark,
    pub left_hip: Landmark,
    pub right_hip: Landmark,
}

impl KeyLandmarkSummary {
    pub fn of(set: &LandmarkSet) -> Self {
        Self {
            nose: *set.get(LandmarkIndex::Nose),
            left_shoulder: *set.get(LandmarkIndex::LeftShoulder),
            right_shoulder: *set.get(LandmarkIndex::RightShoulder),
            left_hip: *set.get(LandmarkIndex::LeftHip),
            right_hip: *set.get(LandmarkIndex::RightHip),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugSnapshot {
    pub source: &'static str,
    pub before_size: ImageSize,
    pub after_size: ImageSize,
    pub before_landmarks: KeyLandmarkSummary,
    pub after_landmarks: KeyLandmarkSummary,
    pub settings: AlignmentSettings,
}

impl DebugSnapshot {
    pub fn new(
        source: &'static str,
        before: PosedImage<'_>,
        after: PosedImage<'_>,
        settings: AlignmentSettings,
    ) -> Self {
        Self {
            source,
            before_size: before.size,
            after_size: after.size,
            before_landmarks: KeyLandmarkSummary::of(before.landmarks),
            after_landmarks: KeyLandmarkSummary::of(after.landmarks),
            settings,
        }
    }
}

pub trait DebugSink: Send + Sync {
    fn record(&self, snapshot: &DebugSnapshot) -> anyhow::Result<()>;
}

/// Writes snapshots as JSON on the `pose_align::debug` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDebugSink;

impl DebugSink for TracingDebugSink {
    fn record(&self, snapshot: &DebugSnapshot) -> anyhow::Result<()> {
        let json = serde_json::to_string(snapshot)?;
        tracing::debug!(target: "pose_align::debug", snapshot = %json, "alignment snapshot");
        Ok(())
    }
}

pub(crate) fn emit(sink: &dyn DebugSink, snapshot: &DebugSnapshot) {
    if let Err(e) = sink.record(snapshot) {
        tracing::warn!("debug snapshot dropped: {:#}", e);
    }
}
