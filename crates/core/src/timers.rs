//! Deadline bookkeeping for the surface's delayed work.
//!
//! The core never sleeps. It records when each task is due; the host arms a
//! single real timer for [`TimerQueue::next_deadline`] and calls back into
//! the surface when it fires.

use std::cell::Cell;
use std::rc::Rc;

use crate::feature::FeatureId;

/// Monotonic milliseconds.
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Hand-driven clock for tests and headless hosts. Clones share the same
/// time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<f64>>);

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self(Rc::new(Cell::new(start_ms)))
    }

    pub fn advance(&self, ms: f64) {
        self.0.set(self.0.get() + ms);
    }

    pub fn set(&self, ms: f64) {
        self.0.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTask {
    /// Debounced area republish after a geometry edit.
    AreaRecalculation(FeatureId),
    /// Removal of a rejected drawing once the draw gesture has unwound.
    DeferredRemoval(FeatureId),
    /// End of a focus highlight.
    HighlightExpiry(FeatureId),
}

impl TimerTask {
    pub fn feature(&self) -> FeatureId {
        match *self {
            TimerTask::AreaRecalculation(id)
            | TimerTask::DeferredRemoval(id)
            | TimerTask::HighlightExpiry(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Deadline {
    due_ms: f64,
    seq: u64,
    task: TimerTask,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    deadlines: Vec<Deadline>,
    seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `task` at `due_ms`. An identical pending task is cleared first,
    /// so repeated calls debounce.
    pub fn schedule(&mut self, task: TimerTask, due_ms: f64) {
        self.cancel(task);
        self.seq += 1;
        self.deadlines.push(Deadline {
            due_ms,
            seq: self.seq,
            task,
        });
    }

    /// Returns whether the task was pending.
    pub fn cancel(&mut self, task: TimerTask) -> bool {
        let before = self.deadlines.len();
        self.deadlines.retain(|d| d.task != task);
        self.deadlines.len() != before
    }

    /// Drop every pending task for a feature.
    pub fn cancel_for(&mut self, feature: FeatureId) {
        self.deadlines.retain(|d| d.task.feature() != feature);
    }

    pub fn is_scheduled(&self, task: TimerTask) -> bool {
        self.deadlines.iter().any(|d| d.task == task)
    }

    /// Remove and return every task due at `now_ms`, earliest first. Ties
    /// keep scheduling order.
    pub fn take_due(&mut self, now_ms: f64) -> Vec<TimerTask> {
        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.deadlines.drain(..).partition(|d| d.due_ms <= now_ms);
        self.deadlines = pending;
        due.sort_by(|a, b| a.due_ms.total_cmp(&b.due_ms).then(a.seq.cmp(&b.seq)));
        due.into_iter().map(|d| d.task).collect()
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.deadlines
            .iter()
            .map(|d| d.due_ms)
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
