//! One-shot timers driven by an explicit clock tick.
//!
//! A [`TimerManager`] keeps every scheduled [`Timer`] in a set ordered by `(deadline, sequence)`
//! and fires the ones due on [`TimerManager::run`]. Callbacks receive the host (`&mut H`) so they
//! can reach whatever state owns the manager; the manager itself never holds a borrow of its
//! schedule while a callback runs, so callbacks may schedule, cancel or drop any timer.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

type TimerCallback<H> = Rc<RefCell<dyn FnMut(&mut H) -> Result<()>>>;

struct Entry<H> {
    callback: TimerCallback<H>,
    /// Key into `Schedule::active` while scheduled.
    key: Option<(Instant, u64)>,
}

struct Schedule<H> {
    now: Instant,
    next_id: u64,
    next_seq: u64,
    active: BTreeMap<(Instant, u64), u64>,
    entries: HashMap<u64, Entry<H>>,
    running: bool,
}

impl<H> Schedule<H> {
    fn unschedule(&mut self, id: u64) {
        if let Some(key) = self.entries.get_mut(&id).and_then(|e| e.key.take()) {
            self.active.remove(&key);
        }
    }
}

/// Shared handle to a timer schedule. Clones refer to the same schedule.
pub struct TimerManager<H> {
    schedule: Rc<RefCell<Schedule<H>>>,
}

impl<H> Clone for TimerManager<H> {
    fn clone(&self) -> Self {
        Self {
            schedule: Rc::clone(&self.schedule),
        }
    }
}

impl<H> fmt::Debug for TimerManager<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let schedule = self.schedule.borrow();
        f.debug_struct("TimerManager")
            .field("now", &schedule.now)
            .field("scheduled", &schedule.active.len())
            .field("timers", &schedule.entries.len())
            .finish()
    }
}

impl<H: 'static> TimerManager<H> {
    pub fn new(now: Instant) -> Self {
        Self {
            schedule: Rc::new(RefCell::new(Schedule {
                now,
                next_id: 0,
                next_seq: 0,
                active: BTreeMap::new(),
                entries: HashMap::new(),
                running: false,
            })),
        }
    }

    /// Time of the last tick (or construction).
    pub fn now(&self) -> Instant {
        self.schedule.borrow().now
    }

    /// Number of timers waiting for a deadline.
    pub fn scheduled(&self) -> usize {
        self.schedule.borrow().active.len()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.schedule.borrow().active.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Create an unscheduled timer running `callback` when it fires.
    pub fn timer(&self, callback: impl FnMut(&mut H) -> Result<()> + 'static) -> Timer<H> {
        let mut schedule = self.schedule.borrow_mut();
        let id = schedule.next_id;
        schedule.next_id += 1;
        schedule.entries.insert(
            id,
            Entry {
                callback: Rc::new(RefCell::new(callback)),
                key: None,
            },
        );
        Timer {
            id,
            schedule: Rc::downgrade(&self.schedule),
        }
    }

    /// Advance the clock to `now` and fire, in deadline order, every timer whose deadline is
    /// strictly before `now`.
    ///
    /// Timers (re)scheduled by a callback during this call are left for the next tick even if
    /// their deadline has already passed. The first callback error stops the tick and is returned;
    /// timers that did not get to run stay scheduled.
    pub fn run(&self, host: &mut H, now: Instant) -> Result<()> {
        let horizon = {
            let mut schedule = self.schedule.borrow_mut();
            if schedule.running {
                return Err(Error::Reentrant("TimerManager::run"));
            }
            if now < schedule.now {
                return Err(Error::ClockWentBackwards);
            }
            schedule.now = now;
            schedule.running = true;
            schedule.next_seq
        };

        let result = self.fire_due(host, now, horizon);
        self.schedule.borrow_mut().running = false;
        result
    }

    fn fire_due(&self, host: &mut H, now: Instant, horizon: u64) -> Result<()> {
        loop {
            let callback = {
                let mut schedule = self.schedule.borrow_mut();
                let Some((key, id)) = schedule
                    .active
                    .range(..(now, 0))
                    .find(|((_, seq), _)| *seq < horizon)
                    .map(|(key, id)| (*key, *id))
                else {
                    return Ok(());
                };
                schedule.active.remove(&key);
                match schedule.entries.get_mut(&id) {
                    Some(entry) => {
                        entry.key = None;
                        Rc::clone(&entry.callback)
                    }
                    None => continue,
                }
            };

            let mut callback = callback
                .try_borrow_mut()
                .map_err(|_| Error::Reentrant("timer callback"))?;
            (*callback)(host)?;
        }
    }
}

/// A one-shot timer registered with a [`TimerManager`]. Dropping it cancels it.
pub struct Timer<H> {
    id: u64,
    schedule: Weak<RefCell<Schedule<H>>>,
}

impl<H> fmt::Debug for Timer<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.id)
            .field("deadline", &self.deadline())
            .finish()
    }
}

impl<H> Timer<H> {
    /// Schedule (or reschedule) the timer for `deadline`.
    pub fn run_at(&self, deadline: Instant) {
        let Some(schedule) = self.schedule.upgrade() else {
            return;
        };
        let mut schedule = schedule.borrow_mut();
        schedule.unschedule(self.id);
        let seq = schedule.next_seq;
        schedule.next_seq += 1;
        let key = (deadline, seq);
        if let Some(entry) = schedule.entries.get_mut(&self.id) {
            entry.key = Some(key);
            schedule.active.insert(key, self.id);
        }
    }

    /// Schedule the timer `delay` after the manager's current time.
    pub fn run_after(&self, delay: Duration) {
        if let Some(now) = self.now() {
            self.run_at(now + delay);
        }
    }

    pub fn cancel(&self) {
        if let Some(schedule) = self.schedule.upgrade() {
            schedule.borrow_mut().unschedule(self.id);
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.deadline().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        let schedule = self.schedule.upgrade()?;
        let schedule = schedule.borrow();
        schedule.entries.get(&self.id)?.key.map(|(deadline, _)| deadline)
    }

    /// The manager's current time, or `None` once the manager is gone.
    pub fn now(&self) -> Option<Instant> {
        Some(self.schedule.upgrade()?.borrow().now)
    }
}

impl<H> Drop for Timer<H> {
    fn drop(&mut self) {
        let Some(schedule) = self.schedule.upgrade() else {
            return;
        };
        let entry = {
            let mut schedule = schedule.borrow_mut();
            schedule.unschedule(self.id);
            schedule.entries.remove(&self.id)
        };
        // Outside the borrow: the callback may own timers that unregister as they drop. A running
        // callback keeps its own `Rc` until it returns.
        drop(entry);
    }
}
