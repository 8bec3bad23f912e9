//! Session aggregate: owns one instance of each enabled probe family,
//! routes decoded events to them, and materializes point-in-time
//! snapshots of everything they have accumulated.

use tracing::{debug, info};

use crate::bucket::{Histogram, NUM_BUCKETS};
use crate::config::Config;
use crate::correlate::OpenTable;
use crate::counter::Counter;
use crate::probes::block::BlockProbe;
use crate::probes::fs::FsProbe;
use crate::probes::irq::IrqProbe;
use crate::probes::krb5kdc::KdcProbe;
use crate::probes::sched::SchedProbe;
use crate::probes::tcp::TcpProbe;
use crate::probes::ProbeEvent;

/// Point-in-time copy of one distribution.
#[derive(Debug, Clone)]
pub struct HistogramSnapshot {
    pub name: String,
    pub buckets: [u64; NUM_BUCKETS],
}

impl HistogramSnapshot {
    /// Total number of recorded samples.
    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }
}

/// Point-in-time copy of one scalar counter.
#[derive(Debug, Clone)]
pub struct CounterSnapshot {
    pub name: String,
    pub value: u64,
}

/// Occupancy of one correlation table at snapshot time.
#[derive(Debug, Clone)]
pub struct TableStats {
    pub name: String,
    pub len: usize,
    pub capacity: usize,
}

/// Everything a session has accumulated, copied out at one point in time.
///
/// Each distribution and counter is copied atomically on its own, so
/// every value is monotone across successive snapshots even while events
/// keep arriving; cross-metric consistency is not promised.
#[derive(Debug, Default)]
pub struct SessionSnapshot {
    pub histograms: Vec<HistogramSnapshot>,
    pub counters: Vec<CounterSnapshot>,
    pub tables: Vec<TableStats>,
}

impl SessionSnapshot {
    pub fn push_histogram(&mut self, name: impl Into<String>, histogram: &Histogram) {
        self.histograms.push(HistogramSnapshot {
            name: name.into(),
            buckets: histogram.snapshot(),
        });
    }

    pub fn push_counter(&mut self, name: impl Into<String>, counter: &Counter) {
        self.counters.push(CounterSnapshot {
            name: name.into(),
            value: counter.value(),
        });
    }

    pub fn push_table<K, V>(&mut self, name: impl Into<String>, table: &OpenTable<K, V>)
    where
        K: Eq + std::hash::Hash,
    {
        self.tables.push(TableStats {
            name: name.into(),
            len: table.len(),
            capacity: table.capacity(),
        });
    }

    /// Looks up a distribution by name.
    pub fn histogram(&self, name: &str) -> Option<&HistogramSnapshot> {
        self.histograms.iter().find(|h| h.name == name)
    }

    /// Looks up a counter value by name.
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.iter().find(|c| c.name == name).map(|c| c.value)
    }

    /// Looks up table occupancy by name.
    pub fn table(&self, name: &str) -> Option<&TableStats> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Reports a probe's accumulated state into a snapshot.
pub(crate) trait Collect {
    fn collect(&self, snap: &mut SessionSnapshot);
}

/// One aggregation session over a stream of decoded probe events.
///
/// Shared-reference API throughout: `handle` and `snapshot` both take
/// `&self`, so a session can sit behind an `Arc` with producers on any
/// number of threads.
pub struct Session {
    block: Option<BlockProbe>,
    fs: Option<FsProbe>,
    tcp: Option<TcpProbe>,
    sched: Option<SchedProbe>,
    irq: Option<IrqProbe>,
    krb5kdc: Option<KdcProbe>,
}

impl Session {
    pub fn new(cfg: &Config) -> Self {
        let session = Self {
            block: cfg
                .probes
                .block
                .then(|| BlockProbe::new(cfg.tables.block_requests, cfg.block.req_flags)),
            fs: cfg.probes.fs.then(|| FsProbe::new(cfg.tables.fs_tasks)),
            tcp: cfg
                .probes
                .tcp
                .then(|| TcpProbe::new(cfg.tables.tcp_sockets, cfg.tables.tcp_connect_args)),
            sched: cfg
                .probes
                .sched
                .then(|| SchedProbe::new(cfg.tables.sched_tasks, cfg.tables.sched_cgroups)),
            irq: cfg.probes.irq.then(|| IrqProbe::new(cfg.tables.irq_tasks)),
            krb5kdc: cfg.probes.krb5kdc.then(KdcProbe::new),
        };

        info!(
            block = session.block.is_some(),
            fs = session.fs.is_some(),
            tcp = session.tcp.is_some(),
            sched = session.sched.is_some(),
            irq = session.irq.is_some(),
            krb5kdc = session.krb5kdc.is_some(),
            "session created",
        );

        session
    }

    /// Routes one event to its family. Events for disabled families are
    /// dropped without effect.
    pub fn handle(&self, event: ProbeEvent) {
        match event {
            ProbeEvent::Block(e) => {
                if let Some(probe) = &self.block {
                    probe.handle(e);
                }
            }
            ProbeEvent::Fs(e) => {
                if let Some(probe) = &self.fs {
                    probe.handle(e);
                }
            }
            ProbeEvent::Tcp(e) => {
                if let Some(probe) = &self.tcp {
                    probe.handle(e);
                }
            }
            ProbeEvent::Sched(e) => {
                if let Some(probe) = &self.sched {
                    probe.handle(e);
                }
            }
            ProbeEvent::Irq(e) => {
                if let Some(probe) = &self.irq {
                    probe.handle(e);
                }
            }
            ProbeEvent::Krb5kdc(e) => {
                if let Some(probe) = &self.krb5kdc {
                    probe.handle(e);
                }
            }
        }
    }

    /// Copies out everything the enabled families have accumulated.
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snap = SessionSnapshot::default();

        if let Some(probe) = &self.block {
            probe.collect(&mut snap);
        }
        if let Some(probe) = &self.fs {
            probe.collect(&mut snap);
        }
        if let Some(probe) = &self.tcp {
            probe.collect(&mut snap);
        }
        if let Some(probe) = &self.sched {
            probe.collect(&mut snap);
        }
        if let Some(probe) = &self.irq {
            probe.collect(&mut snap);
        }
        if let Some(probe) = &self.krb5kdc {
            probe.collect(&mut snap);
        }

        debug!(
            histograms = snap.histograms.len(),
            counters = snap.counters.len(),
            tables = snap.tables.len(),
            "session snapshot",
        );

        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::block::BlockEvent;
    use crate::probes::fs::{FsEvent, FsOp};
    use crate::probes::irq::IrqEvent;
    use crate::probes::krb5kdc::{KdcEvent, KdcFunction};
    use crate::probes::sched::SchedEvent;
    use crate::probes::tcp::{TaskComm, TcpEvent};

    fn full_session() -> Session {
        Session::new(&Config::default())
    }

    #[test]
    fn test_snapshot_covers_all_families_when_enabled() {
        let session = full_session();
        let snap = session.snapshot();

        for name in [
            "block/latency_read",
            "fs/fsync",
            "tcp/srtt",
            "sched/runqueue_latency",
            "irq/hardirq_total",
        ] {
            assert!(snap.histogram(name).is_some(), "missing histogram {name}");
        }
        assert!(snap.counter("tcp/drop").is_some());
        assert!(snap.counter("krb5kdc/process_tgs_req/NONE").is_some());
        assert!(snap.table("block/queue").is_some());
        assert!(snap.table("sched/runqueue").is_some());
    }

    #[test]
    fn test_events_route_to_their_family() {
        let session = full_session();
        session.handle(ProbeEvent::Fs(FsEvent::Entry {
            tid: 1,
            op: FsOp::Read,
            now_ns: 0,
        }));
        session.handle(ProbeEvent::Fs(FsEvent::Return {
            tid: 1,
            now_ns: 12_000,
        }));
        session.handle(ProbeEvent::Sched(SchedEvent::Wakeup { tid: 2, now_ns: 0 }));
        session.handle(ProbeEvent::Krb5kdc(KdcEvent {
            function: KdcFunction::ProcessTgsReq,
            code: 0,
        }));

        let snap = session.snapshot();
        assert_eq!(snap.histogram("fs/read").map(|h| h.total()), Some(1));
        assert_eq!(snap.table("sched/runqueue").map(|t| t.len), Some(1));
        assert_eq!(snap.counter("krb5kdc/process_tgs_req/NONE"), Some(1));
    }

    #[test]
    fn test_disabled_family_drops_events_and_reports_nothing() {
        let cfg = Config::from_yaml(
            r"
            probes:
              tcp: false
            ",
        )
        .expect("config should parse");
        let session = Session::new(&cfg);

        session.handle(ProbeEvent::Tcp(TcpEvent::Drop));
        session.handle(ProbeEvent::Tcp(TcpEvent::Connect {
            sock: 1,
            pid: 1,
            comm: TaskComm::from_str("curl"),
            now_ns: 0,
        }));

        let snap = session.snapshot();
        assert!(snap.counter("tcp/drop").is_none());
        assert!(snap.histogram("tcp/connlat").is_none());
        // Other families are unaffected.
        assert!(snap.histogram("fs/read").is_some());
    }

    #[test]
    fn test_snapshots_are_monotone() {
        let session = full_session();
        let enqueue = |now_ns| {
            session.handle(ProbeEvent::Block(BlockEvent::Enqueue {
                request: 0xabc,
                now_ns,
            }));
            session.handle(ProbeEvent::Block(BlockEvent::Complete {
                request: 0xabc,
                now_ns: now_ns + 5_000,
                flags: 0,
                bytes: 4096,
            }));
        };

        enqueue(0);
        let first = session.snapshot();
        enqueue(1_000_000);
        let second = session.snapshot();

        let name = "block/latency_read";
        let a = first.histogram(name).expect("snapshot should exist");
        let b = second.histogram(name).expect("snapshot should exist");
        assert_eq!(a.total(), 1);
        assert_eq!(b.total(), 2);
        for i in 0..NUM_BUCKETS {
            assert!(b.buckets[i] >= a.buckets[i]);
        }
    }

    #[test]
    fn test_concurrent_producers_single_session() {
        use std::sync::Arc;
        use std::thread;

        let session = Arc::new(full_session());
        let mut handles = Vec::new();

        for t in 0..4u32 {
            let session = Arc::clone(&session);
            handles.push(thread::spawn(move || {
                for i in 0..1_000u32 {
                    let tid = t * 10_000 + i;
                    session.handle(ProbeEvent::Irq(IrqEvent::HardEntry {
                        tid,
                        now_ns: 0,
                    }));
                    session.handle(ProbeEvent::Irq(IrqEvent::HardExit {
                        tid,
                        now_ns: 3_000,
                    }));
                }
            }));
        }

        for handle in handles {
            handle.join().expect("thread panicked");
        }

        let snap = session.snapshot();
        let hard = snap
            .histogram("irq/hardirq_total")
            .expect("snapshot should exist");
        assert_eq!(hard.total(), 4_000);
        assert_eq!(snap.table("irq/hard").map(|t| t.len), Some(0));
    }
}
