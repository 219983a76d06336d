//! Panic reporting.

use ticksim::component::{Address, Component, Context, Slot};
use ticksim::simulation::{EventId, ExecutionError, LifecycleError, Phase, SimInit};
use ticksim::time::{Delay, Tick};

#[derive(Default)]
struct Relay {
    count: usize,
    next: Option<Address<Relay>>,
    event: Option<EventId>,
    seed: bool,
}

impl Relay {
    fn countdown(&mut self, cx: &Context<Self>) {
        if self.count == 0 {
            panic!("test message");
        }
        let count = self.count - 1;
        let next_event = self.next.as_ref().and_then(|next| {
            next.with(|relay| {
                relay.count = count;
                relay.event
            })
        });
        if let Some(Some(event)) = next_event {
            cx.scheduler().schedule(event, Delay(1)).unwrap();
        }
    }
}

impl Component for Relay {
    fn init(&mut self, cx: &Context<Self>) {
        self.event = Some(cx.create_event("countdown", Self::countdown).unwrap());
    }

    fn startup(&mut self, cx: &Context<Self>) {
        if self.seed {
            cx.scheduler().schedule(self.event.unwrap(), Delay(1)).unwrap();
        }
    }
}

/// Passes a counter around a ring of components, decrementing it each time
/// and panicking when it reaches zero.
#[test]
fn simulation_panic_in_event() {
    const RELAY_COUNT: usize = 5;
    const INIT_COUNTDOWN: usize = 9;

    let slots: Vec<Slot<Relay>> = (0..RELAY_COUNT).map(|_| Slot::new()).collect();
    let addresses: Vec<_> = slots.iter().map(Slot::address).collect();

    let mut siminit = SimInit::new();
    for (id, slot) in slots.into_iter().enumerate() {
        let relay = Relay {
            count: if id == 0 { INIT_COUNTDOWN } else { 0 },
            next: Some(addresses[(id + 1) % RELAY_COUNT].clone()),
            seed: id == 0,
            ..Relay::default()
        };
        siminit = siminit.add_component(relay, slot, id.to_string());
    }
    let mut simu = siminit.init().unwrap();

    match simu.run() {
        Err(ExecutionError::Panic { origin, payload }) => {
            let msg = payload.downcast_ref::<&str>().unwrap();
            let panicking_id = INIT_COUNTDOWN % RELAY_COUNT;

            assert_eq!(origin, format!("{}.countdown", panicking_id));
            assert_eq!(*msg, "test message");
        }
        _ => panic!("panic not detected"),
    }

    assert_eq!(simu.cur_tick(), Tick::new(INIT_COUNTDOWN as u64 + 1));
    assert_eq!(simu.phase(), Phase::Stopped);
    assert!(matches!(
        simu.run(),
        Err(ExecutionError::Lifecycle(LifecycleError::InvalidPhase {
            phase: Phase::Stopped,
            ..
        }))
    ));
}

#[test]
fn simulation_panic_in_global_event() {
    let mut simu = SimInit::new().init().unwrap();
    let scheduler = simu.scheduler();
    scheduler
        .schedule_once(Tick::new(3), "boom", |_| panic!("{} went wrong", "something"))
        .unwrap();

    let err = simu.run().unwrap_err();

    assert!(matches!(&err, ExecutionError::Panic { origin, .. } if origin == "global.boom"));
    assert_eq!(err.panic_message(), Some("something went wrong"));
    assert_eq!(err.to_string(), "'global.boom' panicked: something went wrong");
}

struct FragileStartup;

impl Component for FragileStartup {
    fn startup(&mut self, _: &Context<Self>) {
        panic!("no startup");
    }
}

#[test]
fn simulation_panic_in_startup() {
    let mut simu = SimInit::new()
        .add_component(FragileStartup, Slot::new(), "fragile")
        .init()
        .unwrap();

    match simu.step() {
        Err(ExecutionError::Panic { origin, payload }) => {
            assert_eq!(origin, "fragile.startup");
            assert_eq!(payload.downcast_ref::<&str>(), Some(&"no startup"));
        }
        _ => panic!("panic not detected"),
    }
    assert_eq!(simu.phase(), Phase::Stopped);
}

struct FragileInit;

impl Component for FragileInit {
    fn init(&mut self, _: &Context<Self>) {
        panic!("no init");
    }
}

#[test]
fn simulation_panic_in_init() {
    let result = SimInit::new()
        .add_component(FragileInit, Slot::new(), "fragile")
        .init();

    match result {
        Err(err @ ExecutionError::Panic { .. }) => {
            assert_eq!(err.panic_message(), Some("no init"));
            assert!(err.to_string().starts_with("'fragile.init' panicked"));
        }
        _ => panic!("panic not detected"),
    }
}
