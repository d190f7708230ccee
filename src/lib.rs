pub mod align;
pub mod config;
pub mod error;
pub mod pose;

pub use error::{AlignmentError, AlignmentUnavailable, DetectionError, UnavailableReason};
