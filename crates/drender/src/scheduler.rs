//! Virtual clock
//!
//! Timers fire in due order, ties broken by scheduling order. Animation
//! frames are a separate queue drained as a whole by the runtime. Time only
//! moves when the runtime advances it.

use crate::Result;
use std::collections::{BTreeMap, HashMap};

/// Handle of a scheduled timer or frame callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

pub type Task = Box<dyn FnOnce() -> Result<()>>;

/// Timer and frame queues
#[derive(Default)]
pub struct Scheduler {
    now: u64,
    next_id: u64,
    timers: BTreeMap<(u64, TimerId), Task>,
    due: HashMap<TimerId, u64>,
    frames: Vec<(TimerId, Task)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> TimerId {
        self.next_id += 1;
        TimerId(self.next_id)
    }

    /// Run `task` once `delay_ms` have elapsed
    pub fn set_timeout(&mut self, delay_ms: u64, task: impl FnOnce() -> Result<()> + 'static) -> TimerId {
        let id = self.allocate();
        let at = self.now + delay_ms;
        self.timers.insert((at, id), Box::new(task));
        self.due.insert(id, at);
        id
    }

    /// Run `task` with the next animation frame
    pub fn request_frame(&mut self, task: impl FnOnce() -> Result<()> + 'static) -> TimerId {
        let id = self.allocate();
        self.frames.push((id, Box::new(task)));
        id
    }

    /// Cancel a timer or frame callback. Returns whether it was pending.
    pub fn clear_timeout(&mut self, id: TimerId) -> bool {
        if let Some(at) = self.due.remove(&id) {
            return self.timers.remove(&(at, id)).is_some();
        }
        let before = self.frames.len();
        self.frames.retain(|(frame, _)| *frame != id);
        self.frames.len() != before
    }

    /// Remove the earliest timer due at or before `until`, moving the clock
    /// to its due time
    pub fn pop_due(&mut self, until: u64) -> Option<Task> {
        let (&(at, id), _) = self.timers.iter().next()?;
        if at > until {
            return None;
        }
        self.due.remove(&id);
        self.now = self.now.max(at);
        self.timers.remove(&(at, id))
    }

    /// Drain the frame queue. Callbacks requested while these run wait for
    /// the following frame.
    pub fn take_frame_tasks(&mut self) -> Vec<Task> {
        std::mem::take(&mut self.frames).into_iter().map(|(_, task)| task).collect()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub(crate) fn set_now(&mut self, now: u64) {
        self.now = self.now.max(now);
    }

    pub fn has_pending(&self) -> bool {
        !self.timers.is_empty() || !self.frames.is_empty()
    }

    pub fn has_frames(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Due time of the earliest timer
    pub fn next_due(&self) -> Option<u64> {
        self.timers.keys().next().map(|(at, _)| *at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Task) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let make = move |name: &'static str| -> Task {
            let sink = Rc::clone(&sink);
            Box::new(move || {
                sink.borrow_mut().push(name);
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn test_timers_fire_in_due_order() {
        let (log, task) = recorder();
        let mut scheduler = Scheduler::new();
        scheduler.set_timeout(20, task("late"));
        scheduler.set_timeout(5, task("early"));
        scheduler.set_timeout(5, task("early-second"));

        while let Some(t) = scheduler.pop_due(100) {
            t().unwrap();
        }
        assert_eq!(*log.borrow(), vec!["early", "early-second", "late"]);
        assert_eq!(scheduler.now(), 20);
    }

    #[test]
    fn test_pop_due_respects_deadline() {
        let (_, task) = recorder();
        let mut scheduler = Scheduler::new();
        scheduler.set_timeout(10, task("a"));
        assert!(scheduler.pop_due(9).is_none());
        assert_eq!(scheduler.next_due(), Some(10));
        assert!(scheduler.pop_due(10).is_some());
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn test_clear_timer_and_frame() {
        let (_, task) = recorder();
        let mut scheduler = Scheduler::new();
        let timer = scheduler.set_timeout(10, task("timer"));
        let frame = scheduler.request_frame(task("frame"));
        assert!(scheduler.clear_timeout(timer));
        assert!(scheduler.clear_timeout(frame));
        assert!(!scheduler.clear_timeout(timer));
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn test_frames_drain_together() {
        let (log, task) = recorder();
        let mut scheduler = Scheduler::new();
        scheduler.request_frame(task("one"));
        scheduler.request_frame(task("two"));
        for t in scheduler.take_frame_tasks() {
            t().unwrap();
        }
        assert_eq!(*log.borrow(), vec!["one", "two"]);
        assert!(!scheduler.has_frames());
    }
}
