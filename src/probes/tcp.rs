use crate::bucket::{bucket_index, Histogram};
use crate::correlate::OpenTable;
use crate::counter::Counter;
use crate::session::{Collect, SessionSnapshot};

/// Fixed task-comm length, matching the kernel's TASK_COMM_LEN.
pub const TASK_COMM_LEN: usize = 16;

/// IPPROTO_TCP, the only protocol the accept path keeps.
pub const IPPROTO_TCP: u8 = 6;

/// Fixed-size task name. No heap allocation on the handler path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskComm([u8; TASK_COMM_LEN]);

impl TaskComm {
    /// Builds a comm from a string, truncating to TASK_COMM_LEN - 1 bytes.
    pub fn from_str(name: &str) -> Self {
        let mut buf = [0u8; TASK_COMM_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(TASK_COMM_LEN - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self(buf)
    }

    /// The name up to the first NUL.
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(TASK_COMM_LEN);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

impl std::fmt::Display for TaskComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TCP socket state, numbered as the kernel numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SockState {
    Established = 1,
    SynSent = 2,
    SynRecv = 3,
    FinWait1 = 4,
    FinWait2 = 5,
    TimeWait = 6,
    Close = 7,
    CloseWait = 8,
    LastAck = 9,
    Listen = 10,
    Closing = 11,
}

impl SockState {
    /// Convert from the raw kernel state value.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Established),
            2 => Some(Self::SynSent),
            3 => Some(Self::SynRecv),
            4 => Some(Self::FinWait1),
            5 => Some(Self::FinWait2),
            6 => Some(Self::TimeWait),
            7 => Some(Self::Close),
            8 => Some(Self::CloseWait),
            9 => Some(Self::LastAck),
            10 => Some(Self::Listen),
            11 => Some(Self::Closing),
            _ => None,
        }
    }
}

/// Open record for a connection being established.
#[derive(Debug, Clone, Copy)]
pub struct SockRecord {
    pub start_ns: u64,
    pub pid: u64,
    pub comm: TaskComm,
}

/// TCP lifecycle event, keyed by socket identity.
#[derive(Debug, Clone, Copy)]
pub enum TcpEvent {
    /// Outbound connect entered (kprobe side of the entry/return pair).
    Connect {
        sock: u64,
        pid: u64,
        comm: TaskComm,
        now_ns: u64,
    },
    /// Outbound connect returned; non-zero `ret` means immediate failure.
    ConnectReturn { pid: u64, ret: i64 },
    /// Outbound connection finished establishing.
    ConnectEstablished { sock: u64 },
    /// Inbound connection accepted.
    Accept {
        sock: u64,
        pid: u64,
        comm: TaskComm,
        srtt_us: u32,
        now_ns: u64,
        protocol: u8,
    },
    /// Handshake left the syn-sent path; the connect latency sample point.
    HandshakeComplete {
        sock: u64,
        state: SockState,
        now_ns: u64,
    },
    /// Socket changed state; close tears the open record down.
    StateChange { sock: u64, state: SockState },
    /// Segment received on an established socket, with smoothed RTT and
    /// RTT deviation read from the socket at that moment.
    Rcv { srtt_us: u32, jitter_us: u32 },
    /// Segment dropped.
    Drop,
    /// Tail loss probe fired.
    TailLossProbe,
    /// Retransmission timeout fired.
    RetransmitTimeout,
    /// Incoming segment sequence check against the expected sequence.
    SegmentCheck { seq: u32, rcv_nxt: u32 },
}

/// TCP connection lifecycle probe family.
pub struct TcpProbe {
    sockets: OpenTable<u64, SockRecord>,
    // Pairs the connect entry with its return on the same task.
    connect_args: OpenTable<u64, u64>,
    connlat: Histogram,
    srtt: Histogram,
    jitter: Histogram,
    conn_accepted: Counter,
    conn_initiated: Counter,
    drop: Counter,
    tlp: Counter,
    rto: Counter,
    duplicate: Counter,
    ooo: Counter,
}

impl TcpProbe {
    pub fn new(socket_capacity: usize, args_capacity: usize) -> Self {
        Self {
            sockets: OpenTable::with_capacity(socket_capacity),
            connect_args: OpenTable::with_capacity(args_capacity),
            connlat: Histogram::new(),
            srtt: Histogram::new(),
            jitter: Histogram::new(),
            conn_accepted: Counter::new(),
            conn_initiated: Counter::new(),
            drop: Counter::new(),
            tlp: Counter::new(),
            rto: Counter::new(),
            duplicate: Counter::new(),
            ooo: Counter::new(),
        }
    }

    pub fn handle(&self, event: TcpEvent) {
        match event {
            TcpEvent::Connect {
                sock,
                pid,
                comm,
                now_ns,
            } => {
                self.sockets.insert(
                    sock,
                    SockRecord {
                        start_ns: now_ns,
                        pid,
                        comm,
                    },
                );
                self.connect_args.insert(pid, sock);
            }
            TcpEvent::ConnectReturn { pid, ret } => {
                let Some(sock) = self.connect_args.take(&pid) else {
                    return;
                };
                // Non-zero retcode means the connection failed right away.
                if ret != 0 {
                    self.sockets.remove(&sock);
                }
            }
            TcpEvent::ConnectEstablished { sock: _ } => {
                self.conn_initiated.increment();
            }
            TcpEvent::Accept {
                sock,
                pid,
                comm,
                srtt_us,
                now_ns,
                protocol,
            } => {
                if protocol != IPPROTO_TCP {
                    return;
                }
                // The handshake started before accept returned; approximate
                // the start as now minus the smoothed RTT.
                let start_ns = now_ns.saturating_sub(u64::from(srtt_us) * 1_000);
                self.sockets.insert(
                    sock,
                    SockRecord {
                        start_ns,
                        pid,
                        comm,
                    },
                );
                self.conn_accepted.increment();
            }
            TcpEvent::HandshakeComplete {
                sock,
                state,
                now_ns,
            } => {
                // Only the syn-sent path carries handshake completion.
                if state != SockState::SynSent {
                    return;
                }
                let Some(record) = self.sockets.take(&sock) else {
                    return; // missed entry or filtered
                };
                let delta_us = now_ns.saturating_sub(record.start_ns) / 1_000;
                self.connlat.record_index(bucket_index(delta_us));
            }
            TcpEvent::StateChange { sock, state } => {
                if state == SockState::Close {
                    self.sockets.remove(&sock);
                }
            }
            TcpEvent::Rcv { srtt_us, jitter_us } => {
                self.srtt.record_index(bucket_index(u64::from(srtt_us)));
                self.jitter.record_index(bucket_index(u64::from(jitter_us)));
            }
            TcpEvent::Drop => self.drop.increment(),
            TcpEvent::TailLossProbe => self.tlp.increment(),
            TcpEvent::RetransmitTimeout => self.rto.increment(),
            TcpEvent::SegmentCheck { seq, rcv_nxt } => {
                let distance = i64::from(seq) - i64::from(rcv_nxt);
                if distance < 0 {
                    // Sequence before the expected one: duplicated segment.
                    self.duplicate.increment();
                } else if distance > 0 {
                    // Sequence after the expected one: out of order.
                    self.ooo.increment();
                }
            }
        }
    }
}

impl Collect for TcpProbe {
    fn collect(&self, snap: &mut SessionSnapshot) {
        snap.push_histogram("tcp/connlat", &self.connlat);
        snap.push_histogram("tcp/srtt", &self.srtt);
        snap.push_histogram("tcp/jitter", &self.jitter);
        snap.push_counter("tcp/conn_accepted", &self.conn_accepted);
        snap.push_counter("tcp/conn_initiated", &self.conn_initiated);
        snap.push_counter("tcp/drop", &self.drop);
        snap.push_counter("tcp/tlp", &self.tlp);
        snap.push_counter("tcp/rto", &self.rto);
        snap.push_counter("tcp/duplicate", &self.duplicate);
        snap.push_counter("tcp/ooo", &self.ooo);
        snap.push_table("tcp/sockets", &self.sockets);
        snap.push_table("tcp/connect_args", &self.connect_args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> TcpProbe {
        TcpProbe::new(64, 64)
    }

    fn connect(p: &TcpProbe, sock: u64, pid: u64, now_ns: u64) {
        p.handle(TcpEvent::Connect {
            sock,
            pid,
            comm: TaskComm::from_str("client"),
            now_ns,
        });
    }

    #[test]
    fn test_task_comm_roundtrip_and_truncation() {
        assert_eq!(TaskComm::from_str("kworker/0:1").as_str(), "kworker/0:1");
        let long = TaskComm::from_str("a-very-long-process-name");
        assert_eq!(long.as_str().len(), TASK_COMM_LEN - 1);
        assert_eq!(TaskComm::default().as_str(), "");
    }

    #[test]
    fn test_connect_then_handshake_records_connlat() {
        let p = probe();
        connect(&p, 0xaa, 100, 1_000_000);
        p.handle(TcpEvent::ConnectReturn { pid: 100, ret: 0 });
        p.handle(TcpEvent::HandshakeComplete {
            sock: 0xaa,
            state: SockState::SynSent,
            now_ns: 1_000_000 + 340_000, // 340us
        });

        assert_eq!(p.connlat.snapshot()[bucket_index(340) as usize], 1);
        assert!(p.sockets.is_empty());
        assert!(p.connect_args.is_empty());

        // The record was consumed; a duplicate completion is a no-op.
        p.handle(TcpEvent::HandshakeComplete {
            sock: 0xaa,
            state: SockState::SynSent,
            now_ns: 2_000_000,
        });
        assert_eq!(p.connlat.total(), 1);
    }

    #[test]
    fn test_failed_connect_cleans_up_without_sample() {
        let p = probe();
        connect(&p, 0xbb, 200, 0);
        p.handle(TcpEvent::ConnectReturn { pid: 200, ret: -111 });

        assert!(p.sockets.is_empty());
        assert!(p.connect_args.is_empty());
        assert_eq!(p.connlat.total(), 0);
    }

    #[test]
    fn test_handshake_outside_syn_sent_ignored() {
        let p = probe();
        connect(&p, 0xcc, 300, 0);
        p.handle(TcpEvent::HandshakeComplete {
            sock: 0xcc,
            state: SockState::Established,
            now_ns: 50_000,
        });

        assert_eq!(p.connlat.total(), 0);
        assert_eq!(p.sockets.len(), 1); // record still open
    }

    #[test]
    fn test_close_removes_open_record() {
        let p = probe();
        connect(&p, 0xdd, 400, 0);
        p.handle(TcpEvent::StateChange {
            sock: 0xdd,
            state: SockState::Close,
        });

        assert!(p.sockets.is_empty());
        // Completion after close is dropped silently.
        p.handle(TcpEvent::HandshakeComplete {
            sock: 0xdd,
            state: SockState::SynSent,
            now_ns: 1_000,
        });
        assert_eq!(p.connlat.total(), 0);
    }

    #[test]
    fn test_non_close_state_change_keeps_record() {
        let p = probe();
        connect(&p, 0xde, 450, 0);
        p.handle(TcpEvent::StateChange {
            sock: 0xde,
            state: SockState::FinWait1,
        });
        assert_eq!(p.sockets.len(), 1);
    }

    #[test]
    fn test_accept_backdates_start_by_srtt() {
        let p = probe();
        p.handle(TcpEvent::Accept {
            sock: 0xee,
            pid: 500,
            comm: TaskComm::from_str("server"),
            srtt_us: 250,
            now_ns: 10_000_000,
            protocol: IPPROTO_TCP,
        });
        assert_eq!(p.conn_accepted.value(), 1);

        let record = p.sockets.get(&0xee).expect("record inserted");
        assert_eq!(record.start_ns, 10_000_000 - 250_000);

        p.handle(TcpEvent::HandshakeComplete {
            sock: 0xee,
            state: SockState::SynSent,
            now_ns: 10_000_000,
        });
        assert_eq!(p.connlat.snapshot()[bucket_index(250) as usize], 1);
    }

    #[test]
    fn test_accept_ignores_non_tcp() {
        let p = probe();
        p.handle(TcpEvent::Accept {
            sock: 0xff,
            pid: 600,
            comm: TaskComm::default(),
            srtt_us: 0,
            now_ns: 0,
            protocol: 17, // UDP
        });

        assert_eq!(p.conn_accepted.value(), 0);
        assert!(p.sockets.is_empty());
    }

    #[test]
    fn test_established_increments_initiated() {
        let p = probe();
        p.handle(TcpEvent::ConnectEstablished { sock: 1 });
        p.handle(TcpEvent::ConnectEstablished { sock: 2 });
        assert_eq!(p.conn_initiated.value(), 2);
    }

    #[test]
    fn test_rcv_feeds_srtt_and_jitter() {
        let p = probe();
        p.handle(TcpEvent::Rcv {
            srtt_us: 1_500,
            jitter_us: 80,
        });

        assert_eq!(p.srtt.snapshot()[bucket_index(1_500) as usize], 1);
        assert_eq!(p.jitter.snapshot()[80], 1);
    }

    #[test]
    fn test_loss_counters() {
        let p = probe();
        p.handle(TcpEvent::Drop);
        p.handle(TcpEvent::TailLossProbe);
        p.handle(TcpEvent::RetransmitTimeout);
        p.handle(TcpEvent::RetransmitTimeout);

        assert_eq!(p.drop.value(), 1);
        assert_eq!(p.tlp.value(), 1);
        assert_eq!(p.rto.value(), 2);
    }

    #[test]
    fn test_segment_distance_classification() {
        let p = probe();
        // Before expected: duplicate.
        p.handle(TcpEvent::SegmentCheck {
            seq: 100,
            rcv_nxt: 200,
        });
        // After expected: out of order.
        p.handle(TcpEvent::SegmentCheck {
            seq: 300,
            rcv_nxt: 200,
        });
        // Exactly expected: neither.
        p.handle(TcpEvent::SegmentCheck {
            seq: 200,
            rcv_nxt: 200,
        });

        assert_eq!(p.duplicate.value(), 1);
        assert_eq!(p.ooo.value(), 1);
    }

    #[test]
    fn test_interleaved_connections() {
        let p = probe();
        connect(&p, 1, 10, 0);
        connect(&p, 2, 20, 0);
        p.handle(TcpEvent::HandshakeComplete {
            sock: 1,
            state: SockState::SynSent,
            now_ns: 5_000,
        });
        p.handle(TcpEvent::HandshakeComplete {
            sock: 2,
            state: SockState::SynSent,
            now_ns: 90_000,
        });

        assert_eq!(p.connlat.snapshot()[5], 1);
        assert_eq!(p.connlat.snapshot()[90], 1);
        assert_eq!(p.connlat.total(), 2);
    }

    #[test]
    fn test_sock_state_from_u8() {
        assert_eq!(SockState::from_u8(2), Some(SockState::SynSent));
        assert_eq!(SockState::from_u8(7), Some(SockState::Close));
        assert_eq!(SockState::from_u8(0), None);
        assert_eq!(SockState::from_u8(12), None);
    }
}
