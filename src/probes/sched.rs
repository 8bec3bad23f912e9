use crate::bucket::{bucket_index, Histogram};
use crate::correlate::OpenTable;
use crate::session::{Collect, SessionSnapshot};

/// Scheduler event.
#[derive(Debug, Clone, Copy)]
pub enum SchedEvent {
    /// Task became runnable (new task or wakeup).
    Wakeup { tid: u32, now_ns: u64 },
    /// Context switch. `prev_runnable` is true when the previous task was
    /// preempted while still runnable and goes straight back on the queue.
    Switch {
        prev_tid: u32,
        prev_runnable: bool,
        next_tid: u32,
        now_ns: u64,
    },
    /// A cgroup's CFS runqueue was throttled.
    Throttle { cgroup: u64, now_ns: u64 },
    /// The cgroup's runqueue was unthrottled.
    Unthrottle { cgroup: u64, now_ns: u64 },
}

/// Scheduler probe family: runqueue wait latency per task and CFS
/// throttle duration per cgroup, both in microseconds.
pub struct SchedProbe {
    runqueue: OpenTable<u32, u64>,
    throttle: OpenTable<u64, u64>,
    runqueue_latency: Histogram,
    cfs_throttle: Histogram,
}

impl SchedProbe {
    pub fn new(task_capacity: usize, cgroup_capacity: usize) -> Self {
        Self {
            runqueue: OpenTable::with_capacity(task_capacity),
            throttle: OpenTable::with_capacity(cgroup_capacity),
            runqueue_latency: Histogram::new(),
            cfs_throttle: Histogram::new(),
        }
    }

    pub fn handle(&self, event: SchedEvent) {
        match event {
            SchedEvent::Wakeup { tid, now_ns } => {
                self.runqueue.insert(tid, now_ns);
            }
            SchedEvent::Switch {
                prev_tid,
                prev_runnable,
                next_tid,
                now_ns,
            } => {
                // An involuntary switch puts prev straight back on the queue.
                if prev_runnable {
                    self.runqueue.insert(prev_tid, now_ns);
                }

                let Some(enqueued) = self.runqueue.take(&next_tid) else {
                    return; // missed wakeup
                };
                let delta_us = now_ns.saturating_sub(enqueued) / 1_000;
                self.runqueue_latency.record_index(bucket_index(delta_us));
            }
            SchedEvent::Throttle { cgroup, now_ns } => {
                self.throttle.insert(cgroup, now_ns);
            }
            SchedEvent::Unthrottle { cgroup, now_ns } => {
                let Some(throttled) = self.throttle.take(&cgroup) else {
                    return; // missed throttle
                };
                let delta_us = now_ns.saturating_sub(throttled) / 1_000;
                self.cfs_throttle.record_index(bucket_index(delta_us));
            }
        }
    }
}

impl Collect for SchedProbe {
    fn collect(&self, snap: &mut SessionSnapshot) {
        snap.push_histogram("sched/runqueue_latency", &self.runqueue_latency);
        snap.push_histogram("sched/cfs_throttle", &self.cfs_throttle);
        snap.push_table("sched/runqueue", &self.runqueue);
        snap.push_table("sched/throttle", &self.throttle);
    }
}
