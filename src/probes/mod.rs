//! Probe families: one module per kernel subsystem.
//!
//! Each family owns its correlation tables and distributions, consumes a
//! family-specific event enum, and reports into a session snapshot.
//! Handlers take `&self`, never block beyond the table shard they touch,
//! and are safe to call from any thread.

pub mod block;
pub mod fs;
pub mod irq;
pub mod krb5kdc;
pub mod sched;
pub mod tcp;

/// A decoded probe event, tagged by family.
#[derive(Debug, Clone, Copy)]
pub enum ProbeEvent {
    Block(block::BlockEvent),
    Fs(fs::FsEvent),
    Tcp(tcp::TcpEvent),
    Sched(sched::SchedEvent),
    Irq(irq::IrqEvent),
    Krb5kdc(krb5kdc::KdcEvent),
}
