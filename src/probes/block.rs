use serde::Deserialize;

use crate::bucket::{bucket_index, Histogram};
use crate::correlate::OpenTable;
use crate::session::{Collect, SessionSnapshot};

/// I/O direction derived from request flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Decodes the read/write direction from a request's `cmd_flags` word.
///
/// The bit position of the write indicator moved across kernel versions;
/// this is the single place that knows about it, so handler logic stays
/// layout-agnostic. Alternate layouts can be selected in the session
/// config without touching any call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum ReqFlagsLayout {
    /// Op code in the low bits of cmd_flags: `(flags & mask) == write_op`.
    OpMask { mask: u64, write_op: u64 },
    /// Op code above a shift: `(flags >> shift) == write_op`.
    OpShift { shift: u32, write_op: u64 },
    /// Dedicated write bit: `flags & bit != 0`.
    WriteBit { bit: u64 },
}

impl ReqFlagsLayout {
    /// Layout for kernels with REQ_OP_MASK / REQ_OP_WRITE.
    pub const MODERN: Self = Self::OpMask {
        mask: 0xff,
        write_op: 1,
    };

    /// Direction of the request the flags describe.
    pub fn direction(&self, flags: u64) -> Direction {
        let write = match *self {
            Self::OpMask { mask, write_op } => flags & mask == write_op,
            Self::OpShift { shift, write_op } => flags >> shift == write_op,
            Self::WriteBit { bit } => flags & bit != 0,
        };
        if write {
            Direction::Write
        } else {
            Direction::Read
        }
    }
}

impl Default for ReqFlagsLayout {
    fn default() -> Self {
        Self::MODERN
    }
}

/// Block I/O request lifecycle event.
///
/// `request` is the kernel request identity; timestamps come from the
/// environment's monotonic clock.
#[derive(Debug, Clone, Copy)]
pub enum BlockEvent {
    /// Request entered the block layer queue.
    Enqueue { request: u64, now_ns: u64 },
    /// Request was issued to the device.
    Dispatch {
        request: u64,
        now_ns: u64,
        flags: u64,
    },
    /// Request completed.
    Complete {
        request: u64,
        now_ns: u64,
        flags: u64,
        bytes: u64,
    },
}

/// Block I/O probe family.
///
/// Two timestamp tables under the same request key produce three latency
/// views as independent deltas: queue latency (enqueue to dispatch),
/// device latency (dispatch to complete), and total latency (enqueue to
/// complete). Sizes are recorded in KiB, latencies in microseconds, each
/// split by direction.
pub struct BlockProbe {
    layout: ReqFlagsLayout,
    queue: OpenTable<u64, u64>,
    dispatch: OpenTable<u64, u64>,
    size_read: Histogram,
    size_write: Histogram,
    latency_read: Histogram,
    latency_write: Histogram,
    device_latency_read: Histogram,
    device_latency_write: Histogram,
    queue_latency_read: Histogram,
    queue_latency_write: Histogram,
}

impl BlockProbe {
    pub fn new(capacity: usize, layout: ReqFlagsLayout) -> Self {
        Self {
            layout,
            queue: OpenTable::with_capacity(capacity),
            dispatch: OpenTable::with_capacity(capacity),
            size_read: Histogram::new(),
            size_write: Histogram::new(),
            latency_read: Histogram::new(),
            latency_write: Histogram::new(),
            device_latency_read: Histogram::new(),
            device_latency_write: Histogram::new(),
            queue_latency_read: Histogram::new(),
            queue_latency_write: Histogram::new(),
        }
    }

    pub fn handle(&self, event: BlockEvent) {
        match event {
            BlockEvent::Enqueue { request, now_ns } => {
                self.queue.insert(request, now_ns);
            }
            BlockEvent::Dispatch {
                request,
                now_ns,
                flags,
            } => {
                let direction = self.layout.direction(flags);
                // The queue entry is read, not consumed: total latency
                // still needs it at completion.
                if let Some(enqueued) = self.queue.get(&request) {
                    let delta_us = now_ns.saturating_sub(enqueued) / 1_000;
                    self.queue_latency(direction)
                        .record_index(bucket_index(delta_us));
                }
                self.dispatch.insert(request, now_ns);
            }
            BlockEvent::Complete {
                request,
                now_ns,
                flags,
                bytes,
            } => {
                let direction = self.layout.direction(flags);
                let dispatched = self.dispatch.take(&request);

                // Missed enqueue: drop the whole event.
                let Some(enqueued) = self.queue.take(&request) else {
                    return;
                };

                if bytes > 0 {
                    self.size(direction).record_index(bucket_index(bytes / 1_024));
                }

                let total_us = now_ns.saturating_sub(enqueued) / 1_000;
                self.latency(direction).record_index(bucket_index(total_us));

                if let Some(dispatched) = dispatched {
                    let device_us = now_ns.saturating_sub(dispatched) / 1_000;
                    self.device_latency(direction)
                        .record_index(bucket_index(device_us));
                }
            }
        }
    }

    fn size(&self, direction: Direction) -> &Histogram {
        match direction {
            Direction::Read => &self.size_read,
            Direction::Write => &self.size_write,
        }
    }

    fn latency(&self, direction: Direction) -> &Histogram {
        match direction {
            Direction::Read => &self.latency_read,
            Direction::Write => &self.latency_write,
        }
    }

    fn device_latency(&self, direction: Direction) -> &Histogram {
        match direction {
            Direction::Read => &self.device_latency_read,
            Direction::Write => &self.device_latency_write,
        }
    }

    fn queue_latency(&self, direction: Direction) -> &Histogram {
        match direction {
            Direction::Read => &self.queue_latency_read,
            Direction::Write => &self.queue_latency_write,
        }
    }
}

impl Collect for BlockProbe {
    fn collect(&self, snap: &mut SessionSnapshot) {
        snap.push_histogram("block/size_read", &self.size_read);
        snap.push_histogram("block/size_write", &self.size_write);
        snap.push_histogram("block/latency_read", &self.latency_read);
        snap.push_histogram("block/latency_write", &self.latency_write);
        snap.push_histogram("block/device_latency_read", &self.device_latency_read);
        snap.push_histogram("block/device_latency_write", &self.device_latency_write);
        snap.push_histogram("block/queue_latency_read", &self.queue_latency_read);
        snap.push_histogram("block/queue_latency_write", &self.queue_latency_write);
        snap.push_table("block/queue", &self.queue);
        snap.push_table("block/dispatch", &self.dispatch);
    }
}
