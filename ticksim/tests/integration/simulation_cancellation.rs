//! Cancellation, rescheduling and event release.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ticksim::simulation::{EventId, Priority, SchedulingError, SimInit};
use ticksim::time::{Delay, Tick};

#[test]
fn simulation_cancellation_before_firing() {
    let mut simu = SimInit::new().init().unwrap();
    let scheduler = simu.scheduler();

    let fired = Rc::new(Cell::new(0));
    let fired_in = fired.clone();
    let event = scheduler
        .create_event("cancelled", move |_| fired_in.set(fired_in.get() + 1))
        .unwrap();

    scheduler.schedule(event, Tick::new(10)).unwrap();
    assert_eq!(scheduler.deschedule(event), Ok(true));

    // Cancelling a non-pending event is a no-op.
    assert_eq!(scheduler.deschedule(event), Ok(false));
    assert!(scheduler.event_info(event).unwrap().flags.is_squashed());

    let outcome = simu.run().unwrap();

    assert_eq!(fired.get(), 0);
    assert_eq!(outcome.events_processed, 0);
    assert_eq!(simu.events_squashed(), 1);
    // The clock never moved since no live event was found.
    assert_eq!(simu.cur_tick(), Tick::ZERO);
}

#[test]
fn simulation_cancellation_from_callback() {
    let mut simu = SimInit::new().init().unwrap();
    let scheduler = simu.scheduler();

    let fired = Rc::new(Cell::new(false));
    let fired_in = fired.clone();
    let victim = scheduler
        .create_event("victim", move |_| fired_in.set(true))
        .unwrap();
    scheduler.schedule(victim, Tick::new(20)).unwrap();

    scheduler
        .schedule_once(Tick::new(10), "killer", move |s| {
            assert_eq!(s.deschedule(victim), Ok(true));
        })
        .unwrap();

    simu.run().unwrap();

    assert!(!fired.get());
    assert_eq!(simu.cur_tick(), Tick::new(10));
}

#[test]
fn simulation_cancellation_batch_is_committed() {
    let mut simu = SimInit::new().init().unwrap();
    let scheduler = simu.scheduler();

    let fired = Rc::new(Cell::new(false));
    let fired_in = fired.clone();
    let second = scheduler
        .create_event("second", move |_| fired_in.set(true))
        .unwrap();
    scheduler.schedule(second, Tick::new(5)).unwrap();

    let cancelled = Rc::new(Cell::new(None));
    let cancelled_in = cancelled.clone();
    let first = scheduler
        .create_event("first", move |s| {
            cancelled_in.set(Some(s.deschedule(second)));
        })
        .unwrap();
    scheduler
        .schedule_with_priority(first, Tick::new(5), Priority::MINIMUM)
        .unwrap();

    simu.run().unwrap();

    // The second event was already extracted with the first one, so it was no
    // longer pending when the first one tried to cancel it.
    assert_eq!(cancelled.get(), Some(Ok(false)));
    assert!(fired.get());
}

#[test]
fn simulation_cancellation_reschedule_fires_once() {
    let mut simu = SimInit::new().init().unwrap();
    let scheduler = simu.scheduler();

    let ticks = Rc::new(RefCell::new(Vec::new()));
    let ticks_in = ticks.clone();
    let event = scheduler
        .create_event("moved", move |s| ticks_in.borrow_mut().push(s.cur_tick()))
        .unwrap();

    scheduler.schedule(event, Tick::new(10)).unwrap();
    scheduler.reschedule(event, Tick::new(30)).unwrap();
    scheduler
        .reschedule_with_priority(event, Tick::new(20), Priority::STATS)
        .unwrap();

    // A failed reschedule leaves the previous occurrence untouched.
    assert!(scheduler.reschedule(event, Tick::ZERO).is_err());
    assert_eq!(scheduler.pending_count(), 1);

    let info = scheduler.event_info(event).unwrap();
    assert_eq!(info.tick, Tick::new(20));
    assert_eq!(info.priority, Priority::STATS);

    // Rescheduling a non-pending event simply schedules it.
    let other = scheduler.create_event("other", |_| {}).unwrap();
    scheduler.reschedule(other, Delay(40)).unwrap();

    let outcome = simu.run().unwrap();

    assert_eq!(*ticks.borrow(), vec![Tick::new(20)]);
    assert_eq!(outcome.events_processed, 2);
    assert_eq!(scheduler.event_info(event).unwrap().fire_count, 1);
}

#[test]
fn simulation_cancellation_double_schedule() {
    let simu = SimInit::new().init().unwrap();
    let scheduler = simu.scheduler();
    let event = scheduler.create_event("twice", |_| {}).unwrap();

    scheduler.schedule(event, Tick::new(3)).unwrap();
    assert_eq!(
        scheduler.schedule(event, Tick::new(4)),
        Err(SchedulingError::AlreadyPending)
    );

    // Descheduling first makes it legal again.
    scheduler.deschedule(event).unwrap();
    scheduler.schedule(event, Tick::new(4)).unwrap();
    assert_eq!(scheduler.event_info(event).unwrap().tick, Tick::new(4));
}

#[test]
fn simulation_cancellation_auto_release() {
    let mut simu = SimInit::new().init().unwrap();
    let scheduler = simu.scheduler();

    let once = scheduler
        .schedule_once(Tick::new(1), "once", |_| {})
        .unwrap();

    // An auto-release event re-scheduled by its own action stays registered.
    let remaining = Rc::new(Cell::new(3));
    let remaining_in = remaining.clone();
    let repeated = scheduler
        .create_auto_event("repeated", move |s| {
            remaining_in.set(remaining_in.get() - 1);
            if remaining_in.get() > 0 {
                s.schedule(s.current_event().unwrap(), Delay(1)).unwrap();
            }
        })
        .unwrap();
    scheduler.schedule(repeated, Tick::new(1)).unwrap();

    simu.run().unwrap();

    assert_eq!(remaining.get(), 0);
    assert_eq!(simu.cur_tick(), Tick::new(3));
    assert_eq!(scheduler.is_pending(once), Err(SchedulingError::UnknownEvent));
    assert_eq!(
        scheduler.is_pending(repeated),
        Err(SchedulingError::UnknownEvent)
    );
}

#[test]
fn simulation_cancellation_release() {
    let mut simu = SimInit::new().init().unwrap();
    let scheduler = simu.scheduler();
    let event = scheduler.create_event("persistent", |_| {}).unwrap();

    scheduler.schedule(event, Tick::new(2)).unwrap();
    assert_eq!(scheduler.release(event), Err(SchedulingError::AlreadyPending));

    simu.run().unwrap();

    // Persistent events survive firing until released.
    assert_eq!(scheduler.is_pending(event), Ok(false));
    scheduler.release(event).unwrap();
    assert_eq!(
        scheduler.event_info(event).map(|info| info.fire_count),
        Err(SchedulingError::UnknownEvent)
    );
}

#[test]
fn simulation_cancellation_release_while_firing() {
    let mut simu = SimInit::new().init().unwrap();
    let scheduler = simu.scheduler();

    let handle: Rc<Cell<Option<EventId>>> = Rc::new(Cell::new(None));
    let handle_in = handle.clone();
    let event = scheduler
        .create_event("self_release", move |s| {
            let me = handle_in.get().unwrap();
            s.release(me).unwrap();
        })
        .unwrap();
    handle.set(Some(event));
    scheduler.schedule(event, Tick::new(1)).unwrap();

    let outcome = simu.run().unwrap();

    assert_eq!(outcome.events_processed, 1);
    assert_eq!(scheduler.is_pending(event), Err(SchedulingError::UnknownEvent));
}
