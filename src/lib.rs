//! Kernel-probe aggregation core.
//!
//! Events decoded from kernel probes arrive as typed [`probes::ProbeEvent`]
//! values and flow through a [`session::Session`], which correlates start
//! and completion events in bounded tables and accumulates latency and size
//! distributions in fixed log-linear bucket histograms. An external
//! collector drains cumulative state through [`session::Session::snapshot`].
//!
//! The event stream is lossy by nature: probes miss starts, duplicate
//! completions, and reorder events. Every handler absorbs those cases by
//! dropping the affected sample silently; nothing on the hot path errors,
//! blocks, allocates, or logs.

pub mod bucket;
pub mod config;
pub mod correlate;
pub mod counter;
pub mod probes;
pub mod session;
