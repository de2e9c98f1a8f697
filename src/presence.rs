//! Debounced per-target presence state machine.
//!
//! Each monitored target owns one [`PresenceTracker`]. The tracker sees a
//! boolean presence verdict per frame and debounces it: an object must be
//! missing for strictly more than `alert_threshold` consecutive frames
//! before the state flips to [`PresenceState::Alert`]. A single sighting
//! resets the count and the state, so detector flicker never alerts.

use std::fmt;

/// Presence verdict for one target.
///
/// `Initializing` means the target has not yet been confirmed present since
/// the tracker was created (or since monitoring resumed); absence while
/// initializing is not evidence of anything and is ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceState {
    Initializing,
    Secured,
    Alert,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PresenceState::Initializing => "INITIALIZING",
            PresenceState::Secured => "SECURED",
            PresenceState::Alert => "ALERT",
        };
        f.write_str(name)
    }
}

/// Missing-frame debounce for one target.
///
/// The comparison is strictly greater-than: with a threshold of N, the
/// N-th consecutive miss still reads SECURED and the (N+1)-th flips to
/// ALERT. While in ALERT the counter stops advancing; only a sighting
/// leaves the state.
#[derive(Clone, Debug, PartialEq)]
pub struct PresenceTracker {
    state: PresenceState,
    missing_frames: u32,
    alert_threshold: u32,
}

impl PresenceTracker {
    pub fn new(alert_threshold: u32) -> Self {
        Self {
            state: PresenceState::Initializing,
            missing_frames: 0,
            alert_threshold,
        }
    }

    /// Feeds one frame's presence verdict and returns the resulting state.
    pub fn update(&mut self, present: bool) -> PresenceState {
        match self.state {
            PresenceState::Initializing => {
                if present {
                    self.state = PresenceState::Secured;
                    self.missing_frames = 0;
                }
            }
            PresenceState::Secured => {
                if present {
                    self.missing_frames = 0;
                } else {
                    self.missing_frames += 1;
                    if self.missing_frames > self.alert_threshold {
                        self.state = PresenceState::Alert;
                    }
                }
            }
            PresenceState::Alert => {
                if present {
                    self.state = PresenceState::Secured;
                    self.missing_frames = 0;
                }
            }
        }
        self.state
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    pub fn missing_frames(&self) -> u32 {
        self.missing_frames
    }

    pub fn alert_threshold(&self) -> u32 {
        self.alert_threshold
    }
}
