use crate::bucket::{bucket_index, Histogram};
use crate::correlate::OpenTable;
use crate::session::{Collect, SessionSnapshot};

/// Soft IRQ vector, numbered as the kernel's softirq enum.
///
/// Anything past RCU routes to Unknown; new vectors added to the kernel
/// land there until this table learns them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SoftIrqVec {
    Hi = 0,
    Timer = 1,
    NetTx = 2,
    NetRx = 3,
    Block = 4,
    IrqPoll = 5,
    Tasklet = 6,
    Sched = 7,
    HrTimer = 8,
    Rcu = 9,
    Unknown = 10,
}

/// Number of SoftIrqVec variants including Unknown.
pub const SOFTIRQ_VEC_COUNT: usize = 11;

impl SoftIrqVec {
    /// Classifies a raw vector number.
    pub fn from_vec(vec: u32) -> Self {
        match vec {
            0 => Self::Hi,
            1 => Self::Timer,
            2 => Self::NetTx,
            3 => Self::NetRx,
            4 => Self::Block,
            5 => Self::IrqPoll,
            6 => Self::Tasklet,
            7 => Self::Sched,
            8 => Self::HrTimer,
            9 => Self::Rcu,
            _ => Self::Unknown,
        }
    }

    /// Canonical metric label name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hi => "hi",
            Self::Timer => "timer",
            Self::NetTx => "net_tx",
            Self::NetRx => "net_rx",
            Self::Block => "block",
            Self::IrqPoll => "irq_poll",
            Self::Tasklet => "tasklet",
            Self::Sched => "sched",
            Self::HrTimer => "hr_timer",
            Self::Rcu => "rcu",
            Self::Unknown => "unknown",
        }
    }

    /// All vectors in numeric order.
    pub fn all() -> &'static [Self] {
        &[
            Self::Hi,
            Self::Timer,
            Self::NetTx,
            Self::NetRx,
            Self::Block,
            Self::IrqPoll,
            Self::Tasklet,
            Self::Sched,
            Self::HrTimer,
            Self::Rcu,
            Self::Unknown,
        ]
    }
}

/// Open record for an in-flight soft IRQ; the vector is only visible at
/// entry, so it rides in the record.
#[derive(Debug, Clone, Copy)]
pub struct SoftIrqStart {
    pub ts_ns: u64,
    pub vec: SoftIrqVec,
}

/// Interrupt event, keyed by the interrupted task's tid.
#[derive(Debug, Clone, Copy)]
pub enum IrqEvent {
    SoftEntry { tid: u32, vec: u32, now_ns: u64 },
    SoftExit { tid: u32, now_ns: u64 },
    HardEntry { tid: u32, now_ns: u64 },
    HardExit { tid: u32, now_ns: u64 },
}

/// Interrupt probe family: per-vector soft IRQ latency and total hard
/// IRQ latency, in microseconds.
pub struct IrqProbe {
    soft: OpenTable<u32, SoftIrqStart>,
    hard: OpenTable<u32, u64>,
    soft_latency: [Histogram; SOFTIRQ_VEC_COUNT],
    hardirq_total: Histogram,
}

impl IrqProbe {
    pub fn new(capacity: usize) -> Self {
        Self {
            soft: OpenTable::with_capacity(capacity),
            hard: OpenTable::with_capacity(capacity),
            soft_latency: std::array::from_fn(|_| Histogram::new()),
            hardirq_total: Histogram::new(),
        }
    }

    pub fn handle(&self, event: IrqEvent) {
        match event {
            IrqEvent::SoftEntry { tid, vec, now_ns } => {
                self.soft.insert(
                    tid,
                    SoftIrqStart {
                        ts_ns: now_ns,
                        vec: SoftIrqVec::from_vec(vec),
                    },
                );
            }
            IrqEvent::SoftExit { tid, now_ns } => {
                let Some(start) = self.soft.take(&tid) else {
                    return; // missed start
                };
                let delta_us = now_ns.saturating_sub(start.ts_ns) / 1_000;
                self.soft_latency[start.vec as usize].record_index(bucket_index(delta_us));
            }
            IrqEvent::HardEntry { tid, now_ns } => {
                self.hard.insert(tid, now_ns);
            }
            IrqEvent::HardExit { tid, now_ns } => {
                let Some(entered) = self.hard.take(&tid) else {
                    return; // missed start
                };
                let delta_us = now_ns.saturating_sub(entered) / 1_000;
                self.hardirq_total.record_index(bucket_index(delta_us));
            }
        }
    }

    #[cfg(test)]
    fn soft_histogram(&self, vec: SoftIrqVec) -> &Histogram {
        &self.soft_latency[vec as usize]
    }
}

impl Collect for IrqProbe {
    fn collect(&self, snap: &mut SessionSnapshot) {
        for vec in SoftIrqVec::all() {
            snap.push_histogram(
                format!("irq/{}", vec.as_str()),
                &self.soft_latency[*vec as usize],
            );
        }
        snap.push_histogram("irq/hardirq_total", &self.hardirq_total);
        snap.push_table("irq/soft", &self.soft);
        snap.push_table("irq/hard", &self.hard);
    }
}
