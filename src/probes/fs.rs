use crate::bucket::{bucket_index, Histogram};
use crate::correlate::OpenTable;
use crate::session::{Collect, SessionSnapshot};

/// Filesystem operation kind.
///
/// Known at entry time and carried in the open record, because the
/// completion probe fires on a shared return path that cannot tell the
/// operations apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    Read,
    Write,
    Open,
    Fsync,
}

impl FsOp {
    /// Canonical metric label name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Open => "open",
            Self::Fsync => "fsync",
        }
    }

    /// All instrumented operations.
    pub fn all() -> &'static [Self] {
        &[Self::Read, Self::Write, Self::Open, Self::Fsync]
    }
}

/// Open record for an in-flight filesystem call.
#[derive(Debug, Clone, Copy)]
pub struct FsStart {
    pub ts_ns: u64,
    pub op: FsOp,
}

/// Filesystem call event, keyed by thread id.
#[derive(Debug, Clone, Copy)]
pub enum FsEvent {
    Entry { tid: u32, op: FsOp, now_ns: u64 },
    Return { tid: u32, now_ns: u64 },
}

/// Filesystem call latency probe family.
pub struct FsProbe {
    open: OpenTable<u32, FsStart>,
    read: Histogram,
    write: Histogram,
    open_op: Histogram,
    fsync: Histogram,
}

impl FsProbe {
    pub fn new(capacity: usize) -> Self {
        Self {
            open: OpenTable::with_capacity(capacity),
            read: Histogram::new(),
            write: Histogram::new(),
            open_op: Histogram::new(),
            fsync: Histogram::new(),
        }
    }

    pub fn handle(&self, event: FsEvent) {
        match event {
            FsEvent::Entry { tid, op, now_ns } => {
                self.open.insert(tid, FsStart { ts_ns: now_ns, op });
            }
            FsEvent::Return { tid, now_ns } => {
                let Some(start) = self.open.take(&tid) else {
                    return;
                };
                let delta_us = now_ns.saturating_sub(start.ts_ns) / 1_000;
                self.histogram(start.op).record_index(bucket_index(delta_us));
            }
        }
    }

    fn histogram(&self, op: FsOp) -> &Histogram {
        match op {
            FsOp::Read => &self.read,
            FsOp::Write => &self.write,
            FsOp::Open => &self.open_op,
            FsOp::Fsync => &self.fsync,
        }
    }
}

impl Collect for FsProbe {
    fn collect(&self, snap: &mut SessionSnapshot) {
        for op in FsOp::all() {
            snap.push_histogram(format!("fs/{}", op.as_str()), self.histogram(*op));
        }
        snap.push_table("fs/open_calls", &self.open);
    }
}
