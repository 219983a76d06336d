//! Example: a periodic greeter and a rate-limited goodbye writer.
//!
//! This example demonstrates in particular:
//!
//! * persistent, self-rescheduling component events,
//! * component wiring with slots and addresses,
//! * named-flag trace output,
//! * exit requests.
//!
//! ```text
//!                ┌────────────┐               ┌────────────┐
//!                │            │  say_goodbye  │            │
//!   startup ────►│   Hello    ├──────────────►│  Goodbye   ├───► exit
//!                │            │               │            │
//!                └────────────┘               └────────────┘
//! ```
//!
//! The trace flags can be overridden with the `TICKSIM_TRACE` environment
//! variable, e.g. `TICKSIM_TRACE=Event,HelloExample`.

use ticksim::component::{Address, Component, Context, Slot};
use ticksim::simulation::{EventId, ExitReason, SimInit};
use ticksim::time::{Delay, Tick};
use ticksim::trace::{TraceBuffer, TraceFlags};

/// Trace flag of this example.
const FLAG: &str = "HelloExample";

/// A component greeting the world a fixed number of times.
pub struct Hello {
    latency: Delay,
    times_left: u32,
    goodbye: Option<Address<Goodbye>>,
    event: Option<EventId>,
}

impl Hello {
    pub fn new(latency: Delay, times: u32, goodbye: Option<Address<Goodbye>>) -> Self {
        Self {
            latency,
            times_left: times,
            goodbye,
            event: None,
        }
    }

    fn process_event(&mut self, cx: &Context<Self>) {
        self.times_left -= 1;
        cx.trace(
            FLAG,
            format_args!("Hello world! Processing the event! {} left", self.times_left),
        );

        if self.times_left > 0 {
            if let Some(event) = self.event {
                cx.scheduler()
                    .schedule(event, self.latency)
                    .expect("the latency should be non-zero");
            }
            return;
        }

        cx.trace(FLAG, format_args!("Done firing!"));
        if let Some(goodbye) = &self.goodbye {
            let name = cx.name().to_string();
            goodbye.with(|g| g.say_goodbye(&name, cx));
        }
    }
}

impl Component for Hello {
    fn init(&mut self, cx: &Context<Self>) {
        self.event = Some(
            cx.create_event("hello", Self::process_event)
                .expect("events can be created during init"),
        );
    }

    fn startup(&mut self, cx: &Context<Self>) {
        if cx.is_restored() || self.times_left == 0 {
            return;
        }
        if let Some(event) = self.event {
            cx.scheduler()
                .schedule(event, self.latency)
                .expect("the latency should be non-zero");
        }
    }
}

/// A component writing a goodbye message into a buffer at a limited rate.
pub struct Goodbye {
    buffer: Vec<u8>,
    buffer_size: usize,
    bytes_per_tick: usize,
    message: String,
    event: Option<EventId>,
}

impl Goodbye {
    pub fn new(buffer_size: usize, bytes_per_tick: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(buffer_size),
            buffer_size,
            bytes_per_tick,
            message: String::new(),
            event: None,
        }
    }

    /// Starts filling the buffer with a goodbye message for `other`.
    fn say_goodbye<C: Component>(&mut self, other: &str, cx: &Context<C>) {
        cx.scheduler().trace(
            FLAG,
            "goodbye",
            format_args!("Saying goodbye to {}", other),
        );
        self.message = format!("Goodbye {}!! ", other);
        self.buffer.clear();
        if let Some(event) = self.event {
            cx.scheduler()
                .schedule(event, Delay(1))
                .expect("the goodbye event should not be pending");
        }
    }

    fn fill_buffer(&mut self, cx: &Context<Self>) {
        let message = self.message.as_bytes();
        let room = self.buffer_size - self.buffer.len();
        let chunk = self.bytes_per_tick.min(room);
        self.buffer
            .extend(message.iter().cycle().skip(self.buffer.len()).take(chunk));

        if self.buffer.len() < self.buffer_size {
            cx.trace(
                FLAG,
                format_args!("Filling the buffer... {} bytes", self.buffer.len()),
            );
            if let Some(event) = self.event {
                cx.scheduler()
                    .schedule(event, Delay(1))
                    .expect("the fill event is not pending while it fires");
            }
        } else {
            cx.trace(FLAG, format_args!("Goodbye done copying!"));
            cx.scheduler().request_exit(String::from_utf8_lossy(message));
        }
    }
}

impl Component for Goodbye {
    fn init(&mut self, cx: &Context<Self>) {
        self.event = Some(
            cx.create_event("fill", Self::fill_buffer)
                .expect("events can be created during init"),
        );
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let goodbye_slot = Slot::new();
    let goodbye_addr = goodbye_slot.address();
    let hello = Hello::new(Delay(100), 10, Some(goodbye_addr));
    let goodbye = Goodbye::new(64, 16);

    let mut flags = TraceFlags::from_env();
    if flags.is_empty() {
        flags.enable(FLAG);
    }
    let trace = TraceBuffer::new();

    let mut simu = SimInit::new()
        .add_component(hello, Slot::new(), "hello")
        .add_component(goodbye, goodbye_slot, "goodbye")
        .set_trace_flags(flags)
        .set_trace_buffer(trace.clone())
        .init()
        .expect("the simulation should initialize");

    let outcome = simu.run().expect("the simulation should not fail");

    for line in trace.lines() {
        println!("{}", line);
    }
    match outcome.reason {
        ExitReason::ExitRequested(reason) => println!(
            "Exiting @ tick {} because {}",
            outcome.tick.as_u64(),
            reason.trim_end()
        ),
        reason => println!("Exiting @ tick {} because {}", outcome.tick, reason),
    }

    // Hello fires at 100..=1000, then four 16-byte chunks fill the buffer.
    assert_eq!(outcome.tick, Tick::new(1004));
}
