//! Detector/tracker seam.
//!
//! The core never runs inference. It consumes [`Detection`] values from
//! whatever implements [`Tracker`] and only cares about three things: where
//! the box is, what the detector thinks it is, and whether the tracker has
//! assigned a persistent identity yet. [`StubTracker`] is the deterministic
//! implementation used by the daemon's out-of-the-box mode, the demo, and
//! tests.

use std::collections::VecDeque;

use anyhow::Result;

use crate::frame::Frame;

/// Axis-aligned detection box in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// One detector/tracker output for one frame.
///
/// `track_id` is the persistent identity the tracker assigned, if any.
/// Trackers typically need a few frames before identities stabilize, so the
/// field is optional; resolution refuses to bind a region to an identity-less
/// detection.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: Option<String>,
    pub confidence: f32,
    pub track_id: Option<i64>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            bbox,
            label: None,
            confidence,
            track_id: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn with_track_id(mut self, track_id: i64) -> Self {
        self.track_id = Some(track_id);
        self
    }
}

/// External detector/tracker boundary.
///
/// Implementations are expected to keep their own tracking state between
/// calls; the core calls `track` exactly once per frame in tick order.
pub trait Tracker: Send {
    /// Short implementation name for logs.
    fn name(&self) -> &'static str;

    /// Runs detection + tracking on one frame.
    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

enum StubMode {
    /// Replay a fixed script, then report nothing.
    Scripted(VecDeque<Vec<Detection>>),
    /// Emit the template for `present_frames` frames, nothing for
    /// `absent_frames`, repeating forever.
    Cycling {
        template: Vec<Detection>,
        present_frames: u64,
        absent_frames: u64,
    },
}

/// Deterministic tracker for demos and tests. Ignores pixel content.
pub struct StubTracker {
    mode: StubMode,
    frames_served: u64,
}

impl StubTracker {
    /// Replays `script` one entry per call; after exhaustion every frame is
    /// empty.
    pub fn scripted(script: Vec<Vec<Detection>>) -> Self {
        Self {
            mode: StubMode::Scripted(script.into()),
            frames_served: 0,
        }
    }

    /// Simulates an object that periodically goes missing: `template` is
    /// reported for `present_frames` consecutive frames, then nothing for
    /// `absent_frames`, forever. Starts in the present phase so resolution
    /// on the first frame succeeds.
    pub fn cycling(template: Vec<Detection>, present_frames: u64, absent_frames: u64) -> Self {
        Self {
            mode: StubMode::Cycling {
                template,
                present_frames: present_frames.max(1),
                absent_frames,
            },
            frames_served: 0,
        }
    }

    pub fn frames_served(&self) -> u64 {
        self.frames_served
    }
}

impl Tracker for StubTracker {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn track(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let detections = match &mut self.mode {
            StubMode::Scripted(script) => script.pop_front().unwrap_or_default(),
            StubMode::Cycling {
                template,
                present_frames,
                absent_frames,
            } => {
                let period = *present_frames + *absent_frames;
                let phase = if period == 0 {
                    0
                } else {
                    self.frames_served % period
                };
                if phase < *present_frames {
                    template.clone()
                } else {
                    Vec::new()
                }
            }
        };
        self.frames_served += 1;
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(id: i64) -> Detection {
        Detection::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0), 0.9)
            .with_label("package")
            .with_track_id(id)
    }

    #[test]
    fn bounding_box_area() {
        assert_eq!(BoundingBox::new(10.0, 10.0, 50.0, 50.0).area(), 1600.0);
        // Degenerate boxes clamp to zero instead of going negative.
        assert_eq!(BoundingBox::new(50.0, 50.0, 10.0, 10.0).area(), 0.0);
    }

    #[test]
    fn scripted_replays_then_goes_quiet() {
        let frame = Frame::synthetic(16, 16, 0);
        let mut tracker = StubTracker::scripted(vec![vec![det(1)], vec![]]);

        assert_eq!(tracker.track(&frame).unwrap(), vec![det(1)]);
        assert!(tracker.track(&frame).unwrap().is_empty());
        assert!(tracker.track(&frame).unwrap().is_empty());
        assert_eq!(tracker.frames_served(), 3);
    }

    #[test]
    fn cycling_alternates_phases() {
        let frame = Frame::synthetic(16, 16, 0);
        let mut tracker = StubTracker::cycling(vec![det(7)], 2, 3);

        let mut seen = Vec::new();
        for _ in 0..10 {
            seen.push(!tracker.track(&frame).unwrap().is_empty());
        }
        assert_eq!(
            seen,
            vec![true, true, false, false, false, true, true, false, false, false]
        );
    }

    #[test]
    fn cycling_with_zero_absence_is_always_present() {
        let frame = Frame::synthetic(16, 16, 0);
        let mut tracker = StubTracker::cycling(vec![det(7)], 5, 0);
        for _ in 0..20 {
            assert!(!tracker.track(&frame).unwrap().is_empty());
        }
    }
}
