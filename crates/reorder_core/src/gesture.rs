//! Long-press reorder gesture.
//!
//! `Idle -> Armed -> Dragging -> Idle`, with the committing and cancelled
//! outcomes reported as signals rather than stored states. Timers are kept
//! as deadlines; the owner sleeps until `next_deadline` and calls
//! `fire_timers`.

use std::time::Duration;

use shared::domain::{ItemId, Point, Vector};
use tokio::time::Instant;
use tracing::debug;

use crate::config::EngineSettings;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureTimings {
    pub long_tap: Duration,
    pub long_press: Duration,
    pub jitter_threshold: f64,
    pub require_long_press: bool,
}

impl From<&EngineSettings> for GestureTimings {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            long_tap: settings.long_tap_delay(),
            long_press: settings.long_press_delay(),
            jitter_threshold: settings.jitter_threshold_px,
            require_long_press: settings.require_long_press,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub dragged_id: ItemId,
    pub origin_position: Point,
    pub current_target: Point,
}

#[derive(Debug, Clone, PartialEq)]
struct ArmedGesture {
    candidate: ItemId,
    item_center: Point,
    begin_intent_at: Option<Instant>,
    begin_drag_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Default)]
enum GesturePhase {
    #[default]
    Idle,
    Armed(ArmedGesture),
    Dragging(DragSession),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    LiftedEarly,
    MovedPastJitter,
    MultiTouch,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GestureSignal {
    Armed { candidate: ItemId },
    BeginIntent { candidate: ItemId },
    DragBegan(DragSession),
    DragMoved { target: Point },
    Committing { dragged_id: ItemId },
    Cancelled { reason: CancelReason, was_dragging: bool },
}

#[derive(Debug, Clone)]
pub struct DragGesture {
    timings: GestureTimings,
    phase: GesturePhase,
}

impl DragGesture {
    pub fn new(timings: GestureTimings) -> Self {
        Self {
            timings,
            phase: GesturePhase::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, GesturePhase::Idle)
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, GesturePhase::Dragging(_))
    }

    pub fn session(&self) -> Option<&DragSession> {
        match &self.phase {
            GesturePhase::Dragging(session) => Some(session),
            _ => None,
        }
    }

    /// Pointer went down on `candidate` (already checked for eligibility),
    /// whose hit-box is centred at `item_center`. A pointer-down while a
    /// gesture is live is a second touch and fails it.
    pub fn pointer_down(
        &mut self,
        candidate: ItemId,
        item_center: Point,
        now: Instant,
    ) -> Option<GestureSignal> {
        if !self.is_idle() {
            return self.additional_touch();
        }

        if !self.timings.require_long_press {
            let session = DragSession {
                dragged_id: candidate,
                origin_position: item_center,
                current_target: item_center,
            };
            debug!(item = %session.dragged_id, "gesture: drag began without long press");
            self.phase = GesturePhase::Dragging(session.clone());
            return Some(GestureSignal::DragBegan(session));
        }

        debug!(item = %candidate, "gesture: armed");
        self.phase = GesturePhase::Armed(ArmedGesture {
            candidate: candidate.clone(),
            item_center,
            begin_intent_at: Some(now + self.timings.long_tap),
            begin_drag_at: now + self.timings.long_press,
        });
        Some(GestureSignal::Armed { candidate })
    }

    pub fn additional_touch(&mut self) -> Option<GestureSignal> {
        self.cancel(CancelReason::MultiTouch)
    }

    /// `offset` is measured from where the pointer went down.
    pub fn pointer_moved(&mut self, offset: Vector) -> Option<GestureSignal> {
        let jitter = self.timings.jitter_threshold;
        if let GesturePhase::Dragging(session) = &mut self.phase {
            session.current_target = session.origin_position.offset_by(offset);
            return Some(GestureSignal::DragMoved {
                target: session.current_target,
            });
        }
        if matches!(self.phase, GesturePhase::Armed(_))
            && offset.length_squared() > jitter * jitter
        {
            return self.cancel(CancelReason::MovedPastJitter);
        }
        None
    }

    pub fn pointer_up(&mut self) -> Option<GestureSignal> {
        match std::mem::take(&mut self.phase) {
            GesturePhase::Idle => None,
            GesturePhase::Armed(armed) => {
                debug!(item = %armed.candidate, "gesture: lifted before long press");
                Some(GestureSignal::Cancelled {
                    reason: CancelReason::LiftedEarly,
                    was_dragging: false,
                })
            }
            GesturePhase::Dragging(session) => {
                debug!(item = %session.dragged_id, "gesture: drag ended");
                Some(GestureSignal::Committing {
                    dragged_id: session.dragged_id,
                })
            }
        }
    }

    pub fn pointer_cancelled(&mut self) -> Option<GestureSignal> {
        self.cancel(CancelReason::Interrupted)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match &self.phase {
            GesturePhase::Armed(armed) => Some(
                armed
                    .begin_intent_at
                    .map_or(armed.begin_drag_at, |at| at.min(armed.begin_drag_at)),
            ),
            _ => None,
        }
    }

    pub fn fire_timers(&mut self, now: Instant) -> Vec<GestureSignal> {
        let mut signals = Vec::new();
        let GesturePhase::Armed(armed) = &mut self.phase else {
            return signals;
        };

        if armed.begin_intent_at.is_some_and(|at| at <= now) {
            armed.begin_intent_at = None;
            signals.push(GestureSignal::BeginIntent {
                candidate: armed.candidate.clone(),
            });
        }

        if armed.begin_drag_at <= now {
            let session = DragSession {
                dragged_id: armed.candidate.clone(),
                origin_position: armed.item_center,
                current_target: armed.item_center,
            };
            debug!(item = %session.dragged_id, "gesture: long press began drag");
            self.phase = GesturePhase::Dragging(session.clone());
            signals.push(GestureSignal::DragBegan(session));
        }

        signals
    }

    /// Drops any live gesture, reporting it as cancelled.
    pub fn cancel(&mut self, reason: CancelReason) -> Option<GestureSignal> {
        let was_dragging = match std::mem::take(&mut self.phase) {
            GesturePhase::Idle => return None,
            GesturePhase::Armed(_) => false,
            GesturePhase::Dragging(_) => true,
        };
        debug!(?reason, was_dragging, "gesture: cancelled");
        Some(GestureSignal::Cancelled {
            reason,
            was_dragging,
        })
    }
}

#[cfg(test)]
#[path = "tests/gesture_tests.rs"]
mod tests;
