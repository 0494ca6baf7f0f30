//! Built-in machine programs used by the binaries and the test suite.

use crate::harness::{Event, MachineDef, Program};

/// Two machines exchanging one ping and one pong, then halting.
///
/// A sends `Ping` to B and blocks on `Pong`; B answers and halts. The
/// program is bug-free under every interleaving.
#[must_use]
pub fn ping_pong() -> Program {
    Program::new()
        .machine(MachineDef::new("A").on_start(|ctx| {
            ctx.send("B", Event::named("Ping"));
            if ctx.receive("Pong").is_some() {
                ctx.halt();
            }
        }))
        .machine(MachineDef::new("B").on("Init", "Ping", |ctx, _event| {
            ctx.send("A", Event::named("Pong"));
            ctx.halt();
        }))
}

/// Three machines that all wait for mail that never comes: the
/// degenerate livelock, detectable in one iteration by any strategy.
#[must_use]
pub fn blocked_trio() -> Program {
    let waiter = |name: &str| {
        MachineDef::new(name).on("Init", "Never", |ctx, _event| {
            ctx.halt();
        })
    };
    Program::new()
        .machine(waiter("First"))
        .machine(waiter("Second"))
        .machine(waiter("Third"))
}

/// One machine forever mailing itself while a monitor stays hot: a
/// lasso livelock, found by fingerprint recurrence when state caching
/// is enabled.
#[must_use]
pub fn hot_loop() -> Program {
    Program::new()
        .monitor("progress", "Waiting", true)
        .machine(
            MachineDef::new("Spinner")
                .on_start(|ctx| {
                    ctx.send("Spinner", Event::named("Tick"));
                })
                .on("Init", "Tick", |ctx, _event| {
                    ctx.send("Spinner", Event::named("Tick"));
                }),
        )
}

/// Two producers race one message each to a judge that asserts the
/// arrival order. Some interleavings deliver `Two` first: a safety bug
/// an exploration strategy has to find.
#[must_use]
pub fn racy_flag() -> Program {
    Program::new()
        .machine(MachineDef::new("P1").on_start(|ctx| {
            ctx.send("Judge", Event::named("One"));
            ctx.halt();
        }))
        .machine(MachineDef::new("P2").on_start(|ctx| {
            ctx.send("Judge", Event::named("Two"));
            ctx.halt();
        }))
        .machine(
            MachineDef::new("Judge")
                .initial_state("Empty")
                .on("Empty", "One", |ctx, _event| {
                    ctx.goto_state("GotOne");
                })
                .on("Empty", "Two", |ctx, _event| {
                    ctx.assert_that(false, "event 'Two' arrived before 'One'");
                })
                .on("GotOne", "Two", |ctx, _event| {
                    ctx.halt();
                }),
        )
}

/// Look up a built-in program by name, for the binaries.
#[must_use]
pub fn by_name(name: &str) -> Option<Program> {
    match name {
        "ping-pong" => Some(ping_pong()),
        "blocked-trio" => Some(blocked_trio()),
        "hot-loop" => Some(hot_loop()),
        "racy-flag" => Some(racy_flag()),
        _ => None,
    }
}

/// Names of every built-in program.
#[must_use]
pub fn names() -> &'static [&'static str] {
    &["ping-pong", "blocked-trio", "hot-loop", "racy-flag"]
}
