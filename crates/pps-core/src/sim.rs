//! Simulated clock, output, and timer sharing one virtual timeline.
//!
//! The engine's seams (clock, output, timer, isolation) exist so the whole
//! edge-placement algorithm can run against virtual time with exactly
//! reproducible costs: every clock read, output write, and timer wake
//! advances the shared timeline by a configured amount. Tests assert on
//! nanosecond-exact edge positions without any wall-clock dependence.
//!
//! Handles are `Rc`-backed and single-threaded, matching the engine's
//! single logical thread of execution.

use crate::clock::WallClock;
use crate::output::PulseOutput;
use crate::timer::WakeupTimer;
use pps_common::time::Timestamp;
use std::cell::RefCell;
use std::rc::Rc;

/// One recorded output transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// Level the line was driven to.
    pub level: bool,
    /// Virtual instant at which the write took effect.
    pub at: Timestamp,
}

#[derive(Debug)]
struct Inner {
    now_ns: i64,
    clock_read_cost_ns: i64,
    write_cost_ns: i64,
    wake_latency_ns: i64,
    edges: Vec<Edge>,
}

/// Shared virtual timeline; clone handles out of it for the engine seams.
#[derive(Debug, Clone)]
pub struct SimTimeline {
    inner: Rc<RefCell<Inner>>,
}

impl SimTimeline {
    /// Create a timeline starting at `start` with zero costs everywhere.
    ///
    /// A clock read cost of zero means time stands still under polling;
    /// set a non-zero cost (see [`clock_read_cost`](Self::clock_read_cost))
    /// before driving any busy-wait loop or the loop will never terminate.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                now_ns: start.as_ns(),
                clock_read_cost_ns: 0,
                write_cost_ns: 0,
                wake_latency_ns: 0,
                edges: Vec::new(),
            })),
        }
    }

    /// Set the virtual cost of one clock read (builder style).
    #[must_use]
    pub fn clock_read_cost(self, ns: i64) -> Self {
        self.inner.borrow_mut().clock_read_cost_ns = ns;
        self
    }

    /// Set the virtual cost of one output write (builder style).
    #[must_use]
    pub fn write_cost(self, ns: i64) -> Self {
        self.inner.borrow_mut().write_cost_ns = ns;
        self
    }

    /// Set the extra latency added to every timer wake-up.
    ///
    /// Unlike the builder setters this can be changed mid-run, to inject a
    /// jitter spike into a single cycle.
    pub fn set_wake_latency(&self, ns: i64) {
        self.inner.borrow_mut().wake_latency_ns = ns;
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        Timestamp::from_ns(self.inner.borrow().now_ns)
    }

    /// Advance virtual time by `ns` without touching any seam.
    pub fn advance(&self, ns: i64) {
        self.inner.borrow_mut().now_ns += ns;
    }

    /// All output transitions recorded so far.
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        self.inner.borrow().edges.clone()
    }

    /// Clock handle onto this timeline.
    #[must_use]
    pub fn clock(&self) -> SimClock {
        SimClock {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Output handle onto this timeline.
    #[must_use]
    pub fn output(&self) -> SimOutput {
        SimOutput {
            inner: Rc::clone(&self.inner),
        }
    }

    /// Timer handle onto this timeline.
    #[must_use]
    pub fn timer(&self) -> SimTimer {
        SimTimer {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Clock reading virtual time; each read advances it by the read cost.
#[derive(Debug, Clone)]
pub struct SimClock {
    inner: Rc<RefCell<Inner>>,
}

impl WallClock for SimClock {
    fn now(&self) -> Timestamp {
        let mut inner = self.inner.borrow_mut();
        inner.now_ns += inner.clock_read_cost_ns;
        Timestamp::from_ns(inner.now_ns)
    }
}

/// Output whose writes take effect after the configured write cost.
#[derive(Debug, Clone)]
pub struct SimOutput {
    inner: Rc<RefCell<Inner>>,
}

impl PulseOutput for SimOutput {
    fn set_level(&mut self, level: bool) {
        let mut inner = self.inner.borrow_mut();
        inner.now_ns += inner.write_cost_ns;
        let at = Timestamp::from_ns(inner.now_ns);
        inner.edges.push(Edge { level, at });
    }
}

/// Timer that jumps virtual time to the deadline (plus wake latency).
#[derive(Debug, Clone)]
pub struct SimTimer {
    inner: Rc<RefCell<Inner>>,
}

impl WakeupTimer for SimTimer {
    fn wait_until(&self, deadline: Timestamp) {
        let mut inner = self.inner.borrow_mut();
        // at-or-after: never move time backwards
        inner.now_ns = inner.now_ns.max(deadline.as_ns()) + inner.wake_latency_ns;
    }
}
