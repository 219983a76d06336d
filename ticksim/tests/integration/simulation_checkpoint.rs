//! Draining, checkpoint encoding and restoration.

use ticksim::component::{Component, Context, Slot};
use ticksim::simulation::{
    Checkpoint, CheckpointError, EventId, ExecutionError, LifecycleError, Phase, Priority,
    RestoreError, SimInit, Simulation,
};
use ticksim::time::{Delay, Tick};
use ticksim::trace::TraceBuffer;

const FLAG: &str = "Counter";

/// A component counting up at a fixed period.
struct Counter {
    period: Delay,
    started_fresh: bool,
    event: Option<EventId>,
}

impl Counter {
    fn new(period: u64) -> Self {
        Self {
            period: Delay(period),
            started_fresh: false,
            event: None,
        }
    }

    fn count(&mut self, cx: &Context<Self>) {
        cx.trace(FLAG, format_args!("count"));
        cx.scheduler()
            .schedule_with_priority(self.event.unwrap(), self.period, Priority::CPU_TICK)
            .unwrap();
    }
}

impl Component for Counter {
    fn init(&mut self, cx: &Context<Self>) {
        self.event = Some(cx.create_event("count", Self::count).unwrap());
    }

    fn startup(&mut self, cx: &Context<Self>) {
        if cx.is_restored() {
            return;
        }
        self.started_fresh = true;
        cx.scheduler()
            .schedule_with_priority(self.event.unwrap(), self.period, Priority::CPU_TICK)
            .unwrap();
    }
}

fn counter_simulation(trace: &TraceBuffer) -> Simulation {
    SimInit::new()
        .add_component(Counter::new(10), Slot::new(), "fast")
        .add_component(Counter::new(25), Slot::new(), "slow")
        .enable_trace_flag(FLAG)
        .set_trace_buffer(trace.clone())
        .init()
        .unwrap()
}

#[test]
fn simulation_checkpoint_resume() {
    // Uninterrupted reference run.
    let reference = TraceBuffer::new();
    let mut simu = counter_simulation(&reference);
    simu.run_until(Tick::new(100)).unwrap();

    // Interrupted run.
    let trace = TraceBuffer::new();
    let mut simu = counter_simulation(&trace);
    simu.run_until(Tick::new(45)).unwrap();
    let checkpoint = simu.drain().unwrap();

    assert_eq!(simu.phase(), Phase::Stopped);
    assert_eq!(checkpoint.tick(), Tick::new(45));
    let pending: Vec<_> = checkpoint
        .events()
        .iter()
        .map(|e| (e.qualified_name(), e.tick.as_u64()))
        .collect();
    assert_eq!(
        pending,
        vec![("slow.count".to_string(), 50), ("fast.count".to_string(), 50)]
    );

    let bytes = checkpoint.to_cbor().unwrap();
    let decoded = Checkpoint::from_cbor(&bytes).unwrap();
    assert_eq!(decoded, checkpoint);

    // Resumed run, with the same trace sink.
    let slot = Slot::new();
    let addr = slot.address();
    let mut simu = SimInit::new()
        .add_component(Counter::new(10), slot, "fast")
        .add_component(Counter::new(25), Slot::new(), "slow")
        .enable_trace_flag(FLAG)
        .set_trace_buffer(trace.clone())
        .init()
        .unwrap();
    simu.restore(&decoded).unwrap();
    assert_eq!(simu.cur_tick(), Tick::new(45));
    simu.run_until(Tick::new(100)).unwrap();

    assert_eq!(addr.with(|c| c.started_fresh), Some(false));
    assert_eq!(trace.lines(), reference.lines());
    assert_eq!(simu.cur_tick(), Tick::new(100));
}

#[test]
fn simulation_checkpoint_before_run() {
    let trace = TraceBuffer::new();
    let mut simu = counter_simulation(&trace);

    // Nothing was started so nothing is pending.
    let checkpoint = simu.drain().unwrap();

    assert_eq!(checkpoint.tick(), Tick::ZERO);
    assert!(checkpoint.events().is_empty());
}

/// Counts its `startup()` and `drain()` calls.
#[derive(Default)]
struct HookCounter {
    startups: usize,
    drains: usize,
}

impl Component for HookCounter {
    fn startup(&mut self, _: &Context<Self>) {
        self.startups += 1;
    }

    fn drain(&mut self, _: &Context<Self>) {
        self.drains += 1;
    }
}

#[test]
fn simulation_checkpoint_duplicate_events() {
    let slot = Slot::new();
    let addr = slot.address();
    let mut simu = SimInit::new()
        .add_component(HookCounter::default(), slot, "hooks")
        .init()
        .unwrap();
    let scheduler = simu.scheduler();
    scheduler.schedule_once(Tick::new(5), "twin", |_| {}).unwrap();
    scheduler.schedule_once(Tick::new(6), "twin", |_| {}).unwrap();

    assert!(matches!(
        simu.drain(),
        Err(ExecutionError::Checkpoint(CheckpointError::DuplicateEvent(name))) if name == "twin"
    ));
    // The simulation is back where it was and can still be run.
    assert_eq!(simu.phase(), Phase::Ready);
    simu.run().unwrap();
    assert_eq!(simu.cur_tick(), Tick::new(6));
    assert_eq!(addr.with(|p| (p.startups, p.drains)), Some((1, 1)));
}

#[test]
fn simulation_checkpoint_duplicate_events_while_draining() {
    let slot = Slot::new();
    let addr = slot.address();
    let mut simu = SimInit::new()
        .add_component(HookCounter::default(), slot, "hooks")
        .init()
        .unwrap();
    let scheduler = simu.scheduler();
    scheduler.schedule_once(Tick::new(5), "first", |_| {}).unwrap();
    scheduler.schedule_once(Tick::new(8), "twin", |_| {}).unwrap();
    scheduler.schedule_once(Tick::new(9), "twin", |_| {}).unwrap();

    simu.run_until(Tick::new(6)).unwrap();
    assert!(simu.drain().is_err());
    assert_eq!(simu.phase(), Phase::Draining);

    let outcome = simu.run().unwrap();
    assert_eq!(outcome.events_processed, 2);
    assert_eq!(addr.with(|p| p.startups), Some(1));

    // Once the twins have fired the checkpoint can be taken.
    let checkpoint = simu.drain().unwrap();
    assert!(checkpoint.events().is_empty());
    assert_eq!(simu.phase(), Phase::Stopped);
}

#[test]
fn simulation_checkpoint_restore_errors() {
    let trace = TraceBuffer::new();
    let mut simu = counter_simulation(&trace);
    simu.run_until(Tick::new(15)).unwrap();
    let checkpoint = simu.drain().unwrap();

    // Unknown events.
    let mut empty = SimInit::new().init().unwrap();
    assert_eq!(
        empty.restore(&checkpoint),
        Err(RestoreError::UnknownEvent("fast.count".to_string()))
    );
    assert_eq!(empty.cur_tick(), Tick::ZERO);

    // Restoring after startup.
    let mut started = counter_simulation(&trace);
    started.startup().unwrap();
    assert_eq!(
        started.restore(&checkpoint),
        Err(RestoreError::Lifecycle(LifecycleError::AlreadyStarted))
    );

    // Restoring over scheduled events.
    let mut busy = counter_simulation(&trace);
    busy.scheduler()
        .schedule_once(Tick::new(3), "extra", |_| {})
        .unwrap();
    assert_eq!(busy.restore(&checkpoint), Err(RestoreError::QueueNotEmpty));

    // Restoring into a stopped simulation.
    assert_eq!(
        simu.restore(&checkpoint),
        Err(RestoreError::Lifecycle(LifecycleError::InvalidPhase {
            operation: "restore",
            phase: Phase::Stopped,
        }))
    );
}

#[test]
fn simulation_checkpoint_ambiguous_event() {
    let trace = TraceBuffer::new();
    let mut simu = counter_simulation(&trace);
    simu.run_until(Tick::new(5)).unwrap();
    let checkpoint = simu.drain().unwrap();

    let mut twins = SimInit::new()
        .add_component(Counter::new(10), Slot::new(), "fast")
        .add_component(Counter::new(10), Slot::new(), "fast")
        .add_component(Counter::new(25), Slot::new(), "slow")
        .init()
        .unwrap();

    assert_eq!(
        twins.restore(&checkpoint),
        Err(RestoreError::AmbiguousEvent("fast.count".to_string()))
    );
    // Nothing was restored.
    assert_eq!(twins.pending_count(), 0);
    assert_eq!(twins.cur_tick(), Tick::ZERO);
}

#[test]
fn simulation_checkpoint_corrupted() {
    assert!(matches!(
        Checkpoint::from_cbor(&[0xff, 0x00, 0x13]),
        Err(CheckpointError::Decode(_))
    ));
}
