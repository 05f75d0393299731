//! # Example: Ticker
//!
//! Drives a registry once per second, like a status bar refreshing its
//! panels:
//! - two panels ask for the same interface counters; they share one poller;
//! - uptime is read on the shared pool every other tick;
//! - a clock runs as an event loop on its signaling channel.
//!
//! Run with `RUST_LOG=debug cargo run --example ticker` to see the runtime events.

use std::os::fd::AsFd;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tickvisor::{
    Config, Keyed, KeyedWork, Latest, LogWriter, Registry, Signal, Subscribe, ThreadSpec, Work,
    WorkContext,
};

/// Received/transmitted bytes of one interface, from `/proc/net/dev`.
#[derive(Default)]
struct NetCounters(Latest<Option<(u64, u64)>>);

impl KeyedWork<(String,)> for NetCounters {
    fn run(&self, (iface,): &(String,), _ctx: &WorkContext<'_>) {
        let counters = std::fs::read_to_string("/proc/net/dev")
            .ok()
            .and_then(|text| parse_net_dev(&text, iface));
        self.0.set(counters);
    }
}

fn parse_net_dev(text: &str, iface: &str) -> Option<(u64, u64)> {
    let line = text
        .lines()
        .find(|l| l.trim_start().starts_with(&format!("{iface}:")))?;
    let fields: Vec<u64> = line
        .split_once(':')?
        .1
        .split_whitespace()
        .filter_map(|f| f.parse().ok())
        .collect();
    Some((*fields.first()?, *fields.get(8)?))
}

/// Seconds since boot.
#[derive(Default)]
struct Uptime(Latest<f64>);

impl Work for Uptime {
    fn run(&self, _ctx: &WorkContext<'_>) {
        let secs = std::fs::read_to_string("/proc/uptime")
            .ok()
            .and_then(|s| s.split_whitespace().next()?.parse().ok())
            .unwrap_or_default();
        self.0.set(secs);
    }
}

/// Event loop woken by the scheduler's signaling channel.
#[derive(Default)]
struct Clock(Latest<u64>);

impl Work for Clock {
    fn run(&self, ctx: &WorkContext<'_>) {
        let Some(rx) = ctx.signal() else { return };
        loop {
            let mut fds = [PollFd::new(rx.as_fd(), PollFlags::POLLIN)];
            if poll(&mut fds, PollTimeout::NONE).is_err() {
                return;
            }
            match rx.recv() {
                Ok(Signal::Next) => {
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or_default();
                    self.0.set(now);
                }
                Ok(Signal::Done) | Err(_) => return,
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::default())];
    let registry = Registry::builder(Config::default())
        .with_subscribers(subs)
        .build()?;

    let iface = std::env::args().nth(1).unwrap_or_else(|| "lo".to_string());
    let rx_panel = registry.register_threaded(
        ThreadSpec::new(1).with_wait(true),
        Keyed::new((iface.clone(),), NetCounters::default()),
    )?;
    let tx_panel = registry.register_threaded(
        ThreadSpec::new(1),
        Keyed::new((iface.clone(),), NetCounters::default()),
    )?;
    let uptime = registry.register_pooled(2, Uptime::default())?;
    let clock = registry.register_threaded(ThreadSpec::new(1).with_signal(true), Clock::default())?;

    for _ in 0..5 {
        let report = registry.run_all_tasks()?;
        let (rx, _) = rx_panel.0.get().unwrap_or_default();
        let (_, tx) = tx_panel.0.get().unwrap_or_default();
        println!(
            "tick {:>2} | {iface} rx={rx} tx={tx} | uptime={:.0}s | clock={} | triggered={}",
            report.tick,
            uptime.0.get(),
            clock.0.get(),
            report.triggered,
        );
        std::thread::sleep(Duration::from_secs(1));
    }

    for entry in registry.snapshot() {
        println!("{:<40} {:?} period={} wait={}", entry.name, entry.kind, entry.period, entry.wait);
    }
    registry.shutdown();
    Ok(())
}
