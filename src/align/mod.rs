pub mod anchor;
pub mod calculator;
pub mod coordinator;
pub mod debug;
pub mod keyboard;
pub mod overlay;
pub mod settings;

pub use anchor::{can_calculate_alignment, Anchor, AnchorPolicy};
pub use calculator::{calculate_alignment, calculate_alignment_with};
pub use coordinator::{AlignmentCoordinator, DisplayFlags};
pub use debug::{DebugSink, DebugSnapshot, KeyLandmarkSummary, TracingDebugSink};
pub use keyboard::{Key, KeyAction, KeyBindings, KeyEvent};
pub use overlay::{landmark_overlay, skeleton_segments, LandmarkOverlay, Segment};
pub use settings::{AlignmentResult, AlignmentSettings};
