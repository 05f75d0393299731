use std::os::fd::AsFd;
use std::sync::{Arc, mpsc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tickvisor::{
    Config, Event, EventKind, Handle, Keyed, KeyedWork, Latest, Registry, SchedulerError, Signal,
    ThreadSpec, Work, WorkContext, WorkKind,
};
use tokio::sync::broadcast;

#[derive(Default)]
struct NetCounter {
    runs: AtomicUsize,
    last_tick: Latest<u64>,
}

impl KeyedWork<(String,)> for NetCounter {
    fn run(&self, _keys: &(String,), ctx: &WorkContext<'_>) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.last_tick.set(ctx.tick());
    }
}

type NetItem = Keyed<(String,), NetCounter>;

fn net(iface: &str) -> NetItem {
    Keyed::new((iface.to_string(),), NetCounter::default())
}

/// Unkeyed item that records when it is dropped.
struct Tracked {
    runs: AtomicUsize,
    dropped: Arc<AtomicBool>,
}

impl Tracked {
    fn new(dropped: &Arc<AtomicBool>) -> Self {
        Self {
            runs: AtomicUsize::new(0),
            dropped: Arc::clone(dropped),
        }
    }
}

impl Work for Tracked {
    fn run(&self, _ctx: &WorkContext<'_>) {
        self.runs.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

fn registry() -> Registry {
    Registry::new(Config::default()).expect("registry")
}

fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<EventKind> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev.kind);
    }
    out
}

fn count(kinds: &[EventKind], kind: EventKind) -> usize {
    kinds.iter().filter(|k| **k == kind).count()
}

#[test]
fn test_equal_keys_share_one_threaded_worker() {
    let reg = registry();
    let a = reg
        .register_threaded(ThreadSpec::new(1).with_wait(true), net("eth0"))
        .unwrap();
    let b = reg.register_threaded(ThreadSpec::new(1), net("eth0")).unwrap();

    assert!(Handle::ptr_eq(&a, &b));
    assert_eq!(reg.len(), 1);

    let report = reg.run_all_tasks().unwrap();
    assert_eq!(report.triggered, 1);
    assert_eq!(report.awaited, 1);
    assert_eq!(a.runs.load(Ordering::SeqCst), 1);
    assert_eq!(a.last_tick.get(), 1);

    let snap = reg.snapshot();
    assert_eq!(snap.len(), 1);
    assert!(snap[0].spawned);
    assert!(snap[0].wait);
}

#[test]
fn test_merge_keeps_minimum_period() {
    let reg = registry();
    for (i, (p1, p2)) in [(1, 1), (3, 7), (7, 3), (2, 5), (9, 1)].into_iter().enumerate() {
        let key = format!("if{i}");
        let a = reg.register_pooled(p1, net(&key)).unwrap();
        let b = reg.register_pooled(p2, net(&key)).unwrap();
        assert!(Handle::ptr_eq(&a, &b));
    }

    let periods: Vec<u32> = reg.snapshot().iter().map(|e| e.period).collect();
    assert_eq!(periods.len(), 5);
    let mut expected = vec![1, 3, 3, 2, 1];
    let mut got = periods.clone();
    expected.sort_unstable();
    got.sort_unstable();
    assert_eq!(got, expected);
}

#[test]
fn test_lower_period_merge_runs_on_next_tick() {
    let reg = registry();
    let a = reg.register_pooled(10, net("wlan0")).unwrap();
    reg.run_all_tasks().unwrap();
    reg.run_all_tasks().unwrap();
    assert_eq!(a.runs.load(Ordering::SeqCst), 1);

    let _b = reg.register_pooled(2, net("wlan0")).unwrap();
    reg.run_all_tasks().unwrap();
    assert_eq!(a.runs.load(Ordering::SeqCst), 2);
    assert_eq!(a.last_tick.get(), 3);
}

#[test]
fn test_kind_is_part_of_identity() {
    let reg = registry();
    let pooled = reg.register_pooled(1, net("eth1")).unwrap();
    let threaded = reg.register_threaded(ThreadSpec::new(1), net("eth1")).unwrap();

    assert!(!Handle::ptr_eq(&pooled, &threaded));
    assert_eq!(reg.len(), 2);
    let kinds: Vec<WorkKind> = reg.snapshot().iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&WorkKind::Pooled));
    assert!(kinds.contains(&WorkKind::Threaded));
}

#[test]
fn test_unkeyed_items_never_merge() {
    let reg = registry();
    let flag = Arc::new(AtomicBool::new(false));
    let a = reg.register_pooled(1, Tracked::new(&flag)).unwrap();
    let b = reg.register_pooled(1, Tracked::new(&flag)).unwrap();
    assert!(!Handle::ptr_eq(&a, &b));
    assert_eq!(reg.len(), 2);
}

#[test]
fn test_period_three_runs_on_ticks_1_4_7() {
    let reg = registry();
    let c = reg.register_pooled(3, net("eth2")).unwrap();

    let mut ran_on = Vec::new();
    for _ in 0..9 {
        let before = c.runs.load(Ordering::SeqCst);
        let report = reg.run_all_tasks().unwrap();
        if c.runs.load(Ordering::SeqCst) > before {
            ran_on.push(report.tick);
        }
    }
    assert_eq!(ran_on, vec![1, 4, 7]);
}

#[test]
fn test_unheld_item_evicted_after_unused_max_ticks() {
    let reg = registry();
    let mut rx = reg.subscribe();
    let dropped = Arc::new(AtomicBool::new(false));
    let d = reg
        .register_threaded(ThreadSpec::new(1).with_wait(true), Tracked::new(&dropped))
        .unwrap();
    reg.run_all_tasks().unwrap();
    drop(d);

    for _ in 0..4 {
        let report = reg.run_all_tasks().unwrap();
        assert_eq!(report.evicted, 0);
        assert_eq!(reg.len(), 1);
        assert!(!dropped.load(Ordering::SeqCst));
    }

    let report = reg.run_all_tasks().unwrap();
    assert_eq!(report.evicted, 1);
    assert!(reg.is_empty());
    assert!(dropped.load(Ordering::SeqCst));

    let kinds = drain(&mut rx);
    assert_eq!(count(&kinds, EventKind::WorkerStarted), 1);
    assert_eq!(count(&kinds, EventKind::WorkerStopped), 1);
    assert_eq!(count(&kinds, EventKind::ItemEvicted), 1);
}

#[test]
fn test_long_period_does_not_delay_eviction() {
    let reg = registry();
    let h = reg.register_pooled(100, net("slow")).unwrap();
    drop(h);
    for _ in 0..4 {
        reg.run_all_tasks().unwrap();
    }
    assert_eq!(reg.len(), 1);
    reg.run_all_tasks().unwrap();
    assert!(reg.is_empty());
}

#[test]
fn test_reregistration_resurrects_same_item() {
    let reg = registry();
    let first = reg.register_pooled(1, net("eth3")).unwrap();
    reg.run_all_tasks().unwrap();
    drop(first);

    for _ in 0..3 {
        reg.run_all_tasks().unwrap();
    }
    assert_eq!(reg.snapshot()[0].unused, 3);

    let again = reg.register_pooled(1, net("eth3")).unwrap();
    assert_eq!(reg.snapshot()[0].unused, 0);
    assert_eq!(again.runs.load(Ordering::SeqCst), 4);

    for _ in 0..10 {
        reg.run_all_tasks().unwrap();
    }
    assert_eq!(reg.len(), 1);
    assert_eq!(again.runs.load(Ordering::SeqCst), 14);
}

struct Sleeper(Duration);

impl Work for Sleeper {
    fn run(&self, _ctx: &WorkContext<'_>) {
        thread::sleep(self.0);
    }
}

#[test]
fn test_awaited_item_blocks_tick() {
    let reg = registry();
    let _e = reg
        .register_threaded(
            ThreadSpec::new(1).with_wait(true),
            Sleeper(Duration::from_millis(50)),
        )
        .unwrap();

    let started = Instant::now();
    reg.run_all_tasks().unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[test]
fn test_detached_item_does_not_block_tick() {
    let reg = registry();
    let _e = reg
        .register_threaded(ThreadSpec::new(1), Sleeper(Duration::from_millis(500)))
        .unwrap();

    let started = Instant::now();
    let report = reg.run_all_tasks().unwrap();
    assert_eq!(report.awaited, 0);
    assert!(started.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_pool_awaits_all_items_regardless_of_pool_size() {
    let reg = Registry::new(Config {
        pool_size: 2,
        ..Config::default()
    })
    .unwrap();
    let dropped = Arc::new(AtomicBool::new(false));
    let items: Vec<Handle<Tracked>> = (0..20)
        .map(|_| reg.register_pooled(1, Tracked::new(&dropped)).unwrap())
        .collect();

    let report = reg.run_all_tasks().unwrap();
    assert_eq!(report.triggered, 20);
    assert_eq!(report.awaited, 20);
    assert!(items.iter().all(|h| h.runs.load(Ordering::SeqCst) == 1));
}

struct Overlap {
    in_flight: AtomicUsize,
    overlapped: AtomicBool,
    runs: AtomicUsize,
}

impl Work for Overlap {
    fn run(&self, _ctx: &WorkContext<'_>) {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        self.runs.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(2));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[test]
fn test_at_most_one_unit_in_flight() {
    let reg = registry();
    let item = reg
        .register_threaded(
            ThreadSpec::new(1),
            Overlap {
                in_flight: AtomicUsize::new(0),
                overlapped: AtomicBool::new(false),
                runs: AtomicUsize::new(0),
            },
        )
        .unwrap();

    for _ in 0..100 {
        reg.run_all_tasks().unwrap();
    }
    drop(reg);

    assert!(!item.overlapped.load(Ordering::SeqCst));
    let runs = item.runs.load(Ordering::SeqCst);
    assert!(runs <= 100);
}

struct Boom;

impl Work for Boom {
    fn run(&self, _ctx: &WorkContext<'_>) {
        panic!("unit failed");
    }
}

#[test]
fn test_panicking_unit_is_not_retried() {
    let reg = registry();
    let mut rx = reg.subscribe();
    let pooled = reg.register_pooled(1, Boom).unwrap();
    let threaded = reg
        .register_threaded(ThreadSpec::new(1).with_wait(true), Boom)
        .unwrap();

    let first = reg.run_all_tasks().unwrap();
    assert_eq!(first.triggered, 2);
    assert!(pooled.is_faulted());
    assert!(threaded.is_faulted());

    let second = reg.run_all_tasks().unwrap();
    assert_eq!(second.triggered, 0);
    assert!(reg.snapshot().iter().all(|e| e.faulted));

    let kinds = drain(&mut rx);
    assert_eq!(count(&kinds, EventKind::WorkFaulted), 2);
}

#[test]
fn test_zero_period_rejected() {
    let reg = registry();
    let err = reg.register_pooled(0, net("eth4")).unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidPeriod { period: 0 }));
    let err = reg
        .register_threaded(ThreadSpec::new(0), net("eth4"))
        .unwrap_err();
    assert_eq!(err.as_label(), "invalid_period");
    assert!(reg.is_empty());
}

#[test]
fn test_concurrent_registration_converges() {
    let reg = registry();
    let handles: Vec<Handle<NetItem>> = thread::scope(|s| {
        let joins: Vec<_> = (0..8)
            .map(|_| s.spawn(|| reg.register_pooled(1, net("shared")).unwrap()))
            .collect();
        joins.into_iter().map(|j| j.join().unwrap()).collect()
    });

    assert_eq!(reg.len(), 1);
    assert!(handles.windows(2).all(|w| Handle::ptr_eq(&w[0], &w[1])));
}

/// Event loop over the signaling channel, as a display or socket backend would run.
#[derive(Default)]
struct SignalLoop {
    ticks: Arc<AtomicUsize>,
    done: Arc<AtomicBool>,
}

impl Work for SignalLoop {
    fn run(&self, ctx: &WorkContext<'_>) {
        let Some(rx) = ctx.signal() else {
            return;
        };
        loop {
            let mut fds = [PollFd::new(rx.as_fd(), PollFlags::POLLIN)];
            if poll(&mut fds, PollTimeout::NONE).is_err() {
                return;
            }
            match rx.recv() {
                Ok(Signal::Next) => {
                    self.ticks.fetch_add(1, Ordering::SeqCst);
                }
                Ok(Signal::Done) => {
                    self.done.store(true, Ordering::SeqCst);
                    return;
                }
                Err(_) => return,
            }
        }
    }
}

#[test]
fn test_signal_channel_drives_event_loop() {
    let reg = registry();
    let item = reg
        .register_threaded(
            ThreadSpec::new(1).with_signal(true),
            SignalLoop::default(),
        )
        .unwrap();

    for _ in 0..3 {
        reg.run_all_tasks().unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while item.ticks.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(item.ticks.load(Ordering::SeqCst), 3);

    reg.shutdown();
    assert!(item.done.load(Ordering::SeqCst));
}

#[test]
fn test_shutdown_joins_every_worker() {
    let reg = registry();
    let mut rx = reg.subscribe();
    let dropped: Vec<Arc<AtomicBool>> = (0..3).map(|_| Arc::new(AtomicBool::new(false))).collect();
    let handles: Vec<Handle<Tracked>> = dropped
        .iter()
        .map(|flag| {
            reg.register_threaded(ThreadSpec::new(1).with_wait(true), Tracked::new(flag))
                .unwrap()
        })
        .collect();
    let _signal = reg
        .register_threaded(ThreadSpec::new(1).with_signal(true), SignalLoop::default())
        .unwrap();

    reg.run_all_tasks().unwrap();
    reg.run_all_tasks().unwrap();
    drop(handles);
    drop(reg);

    let kinds = drain(&mut rx);
    assert_eq!(count(&kinds, EventKind::WorkerStarted), 4);
    assert_eq!(count(&kinds, EventKind::WorkerStopped), 4);
    assert_eq!(kinds.last(), Some(&EventKind::ShutdownCompleted));
    assert!(dropped.iter().all(|d| d.load(Ordering::SeqCst)));
}

fn wait_until(deadline: Duration, cond: impl Fn() -> bool) -> bool {
    let until = Instant::now() + deadline;
    while !cond() {
        if Instant::now() >= until {
            return false;
        }
        thread::sleep(Duration::from_millis(1));
    }
    true
}

#[test]
fn test_unheld_event_loop_item_is_evicted() {
    let reg = registry();
    let mut rx = reg.subscribe();
    let item = reg
        .register_threaded(ThreadSpec::new(1).with_signal(true), SignalLoop::default())
        .unwrap();
    let ticks = Arc::clone(&item.ticks);
    let done = Arc::clone(&item.done);

    reg.run_all_tasks().unwrap();
    assert!(wait_until(Duration::from_secs(5), || ticks.load(Ordering::SeqCst) >= 1));
    drop(item);

    // the loop never returns, yet its running unit is not a holder
    for _ in 0..4 {
        let report = reg.run_all_tasks().unwrap();
        assert_eq!(report.evicted, 0);
    }
    let report = reg.run_all_tasks().unwrap();
    assert_eq!(report.evicted, 1);
    assert!(reg.is_empty());
    assert!(done.load(Ordering::SeqCst));

    let kinds = drain(&mut rx);
    assert_eq!(count(&kinds, EventKind::ItemEvicted), 1);
    assert_eq!(count(&kinds, EventKind::WorkerStopped), 1);
}

/// Blocks until cancelled without touching its signaling channel.
#[derive(Default)]
struct Parked {
    started: Arc<AtomicBool>,
}

impl Work for Parked {
    fn run(&self, ctx: &WorkContext<'_>) {
        self.started.store(true, Ordering::SeqCst);
        while !ctx.is_cancelled() {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

#[test]
fn test_unheld_detached_item_evicted_while_running() {
    let reg = registry();
    let dropped = Arc::new(AtomicBool::new(false));
    let tracked = reg
        .register_threaded(ThreadSpec::new(1), Tracked::new(&dropped))
        .unwrap();
    let parked = reg.register_threaded(ThreadSpec::new(1), Parked::default()).unwrap();
    let started = Arc::clone(&parked.started);

    reg.run_all_tasks().unwrap();
    assert!(wait_until(Duration::from_secs(5), || started.load(Ordering::SeqCst)));
    drop(parked);

    for _ in 0..4 {
        reg.run_all_tasks().unwrap();
    }
    assert_eq!(reg.len(), 2);
    let report = reg.run_all_tasks().unwrap();
    assert_eq!(report.evicted, 1);
    assert_eq!(reg.len(), 1);
    assert!(!dropped.load(Ordering::SeqCst));
    assert!(tracked.runs.load(Ordering::SeqCst) >= 1);
}

#[test]
fn test_shutdown_completes_with_full_unread_channel() {
    let reg = registry();
    let parked = reg
        .register_threaded(ThreadSpec::new(1).with_signal(true), Parked::default())
        .unwrap();

    // more ticks than a pipe buffer holds; the unit never reads
    for _ in 0..70_000 {
        reg.run_all_tasks().unwrap();
    }
    let mut rx = reg.subscribe();
    reg.run_all_tasks().unwrap();
    assert_eq!(reg.tick_count(), 70_001);
    assert!(parked.started.load(Ordering::SeqCst));
    assert!(drain(&mut rx).contains(&EventKind::TickSkipped));

    let (tx, done) = mpsc::channel();
    thread::spawn(move || {
        drop(reg);
        let _ = tx.send(());
    });
    assert!(done.recv_timeout(Duration::from_secs(10)).is_ok());
    assert_eq!(parked.holders(), 0);
}
