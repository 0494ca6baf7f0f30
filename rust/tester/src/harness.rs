//! Minimal machine harness: the runtime side of the engine boundary.
//!
//! A program is a set of event-driven machines. Each machine runs on
//! its own OS thread, parked on its operation's signal, and talks to
//! the controller at every decision point: sends, receives,
//! nondeterministic choices, and halts all hand the turn back. This is
//! deliberately the smallest runtime that exercises every engine hook;
//! the production actor model lives outside this repository.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tangle_engine::controller::Controller;
use tangle_engine::liveness::MonitorId;
use tangle_engine::operation::{OperationId, OperationStatus, StateSource};
use tangle_engine::trace::TraceStepKind;
use tangle_engine::EngineError;

/// An event exchanged between machines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name; handler dispatch keys on it.
    pub name: String,
    /// Optional payload.
    pub payload: Value,
}

impl Event {
    /// An event with no payload.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Value::Null,
        }
    }

    /// An event carrying a payload.
    #[must_use]
    pub fn with_payload(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Start action of a machine.
pub type StartAction = Arc<dyn Fn(&mut MachineCtx) + Send + Sync>;
/// Handler for one (state, event) pair.
pub type EventHandler = Arc<dyn Fn(&mut MachineCtx, &Event) + Send + Sync>;

/// Definition of one machine: a name, an initial state, an optional
/// start action, and per-(state, event) handlers.
#[derive(Clone)]
pub struct MachineDef {
    name: String,
    initial_state: String,
    start: Option<StartAction>,
    handlers: HashMap<(String, String), EventHandler>,
}

impl MachineDef {
    /// Start defining a machine. The initial state defaults to `Init`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial_state: "Init".to_string(),
            start: None,
            handlers: HashMap::new(),
        }
    }

    /// Override the initial state name.
    #[must_use]
    pub fn initial_state(mut self, state: impl Into<String>) -> Self {
        self.initial_state = state.into();
        self
    }

    /// Run an action when the machine first gets the turn. Machines
    /// without a start action begin blocked, waiting for mail.
    #[must_use]
    pub fn on_start(
        mut self,
        action: impl Fn(&mut MachineCtx) + Send + Sync + 'static,
    ) -> Self {
        self.start = Some(Arc::new(action));
        self
    }

    /// Handle `event` while in `state`.
    #[must_use]
    pub fn on(
        mut self,
        state: impl Into<String>,
        event: impl Into<String>,
        handler: impl Fn(&mut MachineCtx, &Event) + Send + Sync + 'static,
    ) -> Self {
        self.handlers
            .insert((state.into(), event.into()), Arc::new(handler));
        self
    }

    fn handler_for(&self, state: &str, event: &str) -> Option<EventHandler> {
        self.handlers
            .get(&(state.to_string(), event.to_string()))
            .cloned()
    }
}

/// Definition of one liveness monitor.
#[derive(Debug, Clone)]
pub struct MonitorDef {
    /// Monitor name.
    pub name: String,
    /// Initial state name.
    pub initial_state: String,
    /// Whether the initial state is hot.
    pub hot: bool,
}

/// A machine program: the unit a driver explores.
#[derive(Clone, Default)]
pub struct Program {
    machines: Vec<MachineDef>,
    monitors: Vec<MonitorDef>,
}

impl Program {
    /// An empty program.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a machine.
    #[must_use]
    pub fn machine(mut self, def: MachineDef) -> Self {
        self.machines.push(def);
        self
    }

    /// Add a liveness monitor in its initial state.
    #[must_use]
    pub fn monitor(
        mut self,
        name: impl Into<String>,
        initial_state: impl Into<String>,
        hot: bool,
    ) -> Self {
        self.monitors.push(MonitorDef {
            name: name.into(),
            initial_state: initial_state.into(),
            hot,
        });
        self
    }
}

struct MachineState {
    current_state: String,
    inbox: VecDeque<Event>,
    halted: bool,
}

/// Shared mutable state of one machine; also its fingerprint source.
struct MachineShared {
    name: String,
    state: Mutex<MachineState>,
}

impl MachineShared {
    fn new(name: String, initial_state: String) -> Self {
        Self {
            name,
            state: Mutex::new(MachineState {
                current_state: initial_state,
                inbox: VecDeque::new(),
                halted: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MachineState> {
        self.state.lock().expect("machine state lock poisoned")
    }

    fn pop_event(&self) -> Option<Event> {
        self.lock().inbox.pop_front()
    }

    fn take_event_named(&self, name: &str) -> Option<Event> {
        let mut state = self.lock();
        let pos = state.inbox.iter().position(|ev| ev.name == name)?;
        state.inbox.remove(pos)
    }

    fn push_event(&self, event: Event) {
        self.lock().inbox.push_back(event);
    }

    fn push_front_event(&self, event: Event) {
        self.lock().inbox.push_front(event);
    }

    fn inbox_is_empty(&self) -> bool {
        self.lock().inbox.is_empty()
    }

    fn is_halted(&self) -> bool {
        self.lock().halted
    }

    fn set_halted(&self) {
        self.lock().halted = true;
    }

    fn current_state(&self) -> String {
        self.lock().current_state.clone()
    }

    fn set_state(&self, state: String) {
        self.lock().current_state = state;
    }
}

impl StateSource for MachineShared {
    fn state_name(&self) -> String {
        self.current_state()
    }

    fn state_hash(&self) -> u64 {
        let state = self.lock();
        let mut hasher = DefaultHasher::new();
        state.current_state.hash(&mut hasher);
        state.halted.hash(&mut hasher);
        for event in &state.inbox {
            event.name.hash(&mut hasher);
        }
        hasher.finish()
    }
}

#[derive(Clone)]
struct MachineLink {
    op: OperationId,
    shared: Arc<MachineShared>,
}

/// Shared harness context: controller, routing tables, thread handles.
struct HarnessShared {
    controller: Arc<Controller>,
    machines: Mutex<HashMap<String, MachineLink>>,
    monitors: Mutex<HashMap<String, MonitorId>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl HarnessShared {
    fn lookup(&self, name: &str) -> Option<MachineLink> {
        self.machines
            .lock()
            .expect("router lock poisoned")
            .get(name)
            .cloned()
    }

    fn monitor_id(&self, name: &str) -> Option<MonitorId> {
        self.monitors
            .lock()
            .expect("router lock poisoned")
            .get(name)
            .copied()
    }
}

/// Executes one program under one controller: spawns machine threads,
/// grants the first turn, and waits for the iteration to finish.
pub struct MachineHarness {
    shared: Arc<HarnessShared>,
}

impl MachineHarness {
    /// Run `program` to completion under `controller`.
    ///
    /// Returns once the iteration finished and every machine thread
    /// has been joined; the outcome is read from the controller.
    ///
    /// # Errors
    ///
    /// Returns an engine error if operation registration fails.
    pub fn execute(controller: Arc<Controller>, program: &Program) -> Result<(), EngineError> {
        let harness = Self {
            shared: Arc::new(HarnessShared {
                controller: Arc::clone(&controller),
                machines: Mutex::new(HashMap::new()),
                monitors: Mutex::new(HashMap::new()),
                threads: Mutex::new(Vec::new()),
            }),
        };

        for monitor in &program.monitors {
            let id =
                controller.register_monitor(&monitor.name, &monitor.initial_state, monitor.hot);
            harness
                .shared
                .monitors
                .lock()
                .expect("router lock poisoned")
                .insert(monitor.name.clone(), id);
        }

        // Setup-time machines are not recorded in the trace; machines
        // created mid-run are (see MachineCtx::create_machine).
        for def in &program.machines {
            if let Err(err) = spawn_machine(&harness.shared, def.clone()) {
                // Release any already-parked machine threads before
                // surfacing the registration failure.
                controller.stop();
                harness.join_all();
                return Err(err);
            }
        }

        controller.start();
        let _ = controller.wait_for_completion();
        harness.join_all();
        Ok(())
    }

    fn join_all(&self) {
        loop {
            let handle = {
                let mut threads = self
                    .shared
                    .threads
                    .lock()
                    .expect("thread table lock poisoned");
                threads.pop()
            };
            match handle {
                Some(handle) => {
                    let _ = handle.join();
                }
                None => break,
            }
        }
    }
}

fn spawn_machine(shared: &Arc<HarnessShared>, def: MachineDef) -> Result<OperationId, EngineError> {
    let machine = Arc::new(MachineShared::new(
        def.name.clone(),
        def.initial_state.clone(),
    ));
    let status = if def.start.is_some() {
        OperationStatus::Enabled
    } else {
        OperationStatus::BlockedOnReceive
    };
    let op = shared.controller.create_operation(
        &def.name,
        status,
        Some(Arc::clone(&machine) as Arc<dyn StateSource>),
    )?;

    shared
        .machines
        .lock()
        .expect("router lock poisoned")
        .insert(def.name.clone(), MachineLink {
            op,
            shared: Arc::clone(&machine),
        });

    let thread_shared = Arc::clone(shared);
    let handle = std::thread::Builder::new()
        .name(format!("machine-{}", def.name))
        .spawn(move || machine_main(&thread_shared, &def, &machine, op))
        .expect("machine thread spawn failed");
    shared
        .threads
        .lock()
        .expect("thread table lock poisoned")
        .push(handle);
    Ok(op)
}

fn machine_main(
    shared: &Arc<HarnessShared>,
    def: &MachineDef,
    machine: &Arc<MachineShared>,
    op: OperationId,
) {
    if shared.controller.wait_for_turn(op).is_err() {
        return;
    }

    let mut ctx = MachineCtx {
        shared: Arc::clone(shared),
        machine: Arc::clone(machine),
        op,
        canceled: false,
    };

    if let Some(start) = def.start.clone() {
        if !run_protected(shared, &def.name, || start(&mut ctx)) {
            return;
        }
        if ctx.canceled {
            return;
        }
    }

    loop {
        if let Some(event) = machine.pop_event() {
            if shared
                .controller
                .notify_trace_event(
                    op,
                    TraceStepKind::DequeueEvent {
                        event: event.name.clone(),
                    },
                )
                .is_err()
            {
                return;
            }
            let state = machine.current_state();
            match def.handler_for(&state, &event.name) {
                Some(handler) => {
                    if !run_protected(shared, &def.name, || handler(&mut ctx, &event)) {
                        return;
                    }
                    if ctx.canceled {
                        return;
                    }
                }
                None => {
                    shared.controller.notify_assertion_failure(format!(
                        "machine '{}' in state '{}' received unhandled event '{}'",
                        def.name, state, event.name
                    ));
                    return;
                }
            }
        }

        if machine.is_halted() {
            let _ = shared.controller.notify_trace_event(op, TraceStepKind::Halt);
            shared.controller.operation_completed(op);
            return;
        }

        // Nothing left to do until mail arrives. No sender can race
        // this check: only the turn holder runs.
        if machine.inbox_is_empty()
            && shared
                .controller
                .set_operation_status(op, OperationStatus::BlockedOnReceive)
                .is_err()
        {
            return;
        }

        if shared.controller.schedule(op).is_err() {
            return;
        }
    }
}

/// Run actor code, converting a panic into a reported safety bug.
fn run_protected(shared: &Arc<HarnessShared>, name: &str, body: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(()) => true,
        Err(payload) => {
            let message = payload
                .downcast_ref::<String>()
                .cloned()
                .or_else(|| payload.downcast_ref::<&str>().map(|s| (*s).to_string()))
                .unwrap_or_else(|| "unknown panic".to_string());
            shared
                .controller
                .notify_assertion_failure(format!("machine '{name}' panicked: {message}"));
            false
        }
    }
}

/// Handler-facing API of a machine: everything an actor can do during
/// its turn.
pub struct MachineCtx {
    shared: Arc<HarnessShared>,
    machine: Arc<MachineShared>,
    op: OperationId,
    canceled: bool,
}

impl MachineCtx {
    /// The machine's current state name.
    #[must_use]
    pub fn state(&self) -> String {
        self.machine.current_state()
    }

    /// This machine's operation id.
    #[must_use]
    pub fn operation(&self) -> OperationId {
        self.op
    }

    /// Send an event to another machine and hand the turn back.
    ///
    /// Events sent to halted machines are dropped.
    pub fn send(&mut self, target: &str, event: Event) {
        if self.canceled {
            return;
        }
        let Some(link) = self.shared.lookup(target) else {
            self.shared.controller.notify_assertion_failure(format!(
                "machine '{}' sent '{}' to unknown machine '{target}'",
                self.machine.name, event.name
            ));
            self.canceled = true;
            return;
        };

        if link.shared.is_halted() {
            tracing::debug!(machine = target, event = %event.name, "dropping send to halted machine");
        } else {
            link.shared.push_event(event.clone());
            if self
                .shared
                .controller
                .set_operation_status(link.op, OperationStatus::Enabled)
                .is_err()
            {
                self.canceled = true;
                return;
            }
        }

        if self
            .shared
            .controller
            .notify_trace_event(
                self.op,
                TraceStepKind::SendEvent {
                    target: link.op,
                    target_name: target.to_string(),
                    event: event.name,
                },
            )
            .is_err()
        {
            self.canceled = true;
            return;
        }

        // A send is a mandatory hand-back.
        if self.shared.controller.schedule(self.op).is_err() {
            self.canceled = true;
        }
    }

    /// Raise an event to this machine itself; it is handled before any
    /// queued mail, without a hand-back.
    pub fn raise(&mut self, event: Event) {
        if self.canceled {
            return;
        }
        self.machine.push_front_event(event.clone());
        if self
            .shared
            .controller
            .notify_trace_event(self.op, TraceStepKind::RaiseEvent { event: event.name })
            .is_err()
        {
            self.canceled = true;
        }
    }

    /// Transition to a new state.
    pub fn goto_state(&mut self, state: impl Into<String>) {
        if self.canceled {
            return;
        }
        let state = state.into();
        self.machine.set_state(state.clone());
        if self
            .shared
            .controller
            .notify_trace_event(self.op, TraceStepKind::GotoState { state })
            .is_err()
        {
            self.canceled = true;
        }
    }

    /// Record the invocation of a named user action.
    pub fn invoke(&mut self, action: impl Into<String>) {
        if self.canceled {
            return;
        }
        if self
            .shared
            .controller
            .notify_trace_event(
                self.op,
                TraceStepKind::InvokeAction {
                    action: action.into(),
                },
            )
            .is_err()
        {
            self.canceled = true;
        }
    }

    /// Resolve a nondeterministic boolean (fair coin).
    pub fn random_bool(&mut self) -> bool {
        if self.canceled {
            return false;
        }
        match self.shared.controller.next_boolean(self.op, 2) {
            Ok(value) => value,
            Err(_) => {
                self.canceled = true;
                false
            }
        }
    }

    /// Resolve a nondeterministic integer in `[0, max_value)`.
    pub fn random_int(&mut self, max_value: u64) -> u64 {
        if self.canceled {
            return 0;
        }
        match self.shared.controller.next_integer(self.op, max_value) {
            Ok(value) => value,
            Err(_) => {
                self.canceled = true;
                0
            }
        }
    }

    /// Block until an event with the given name arrives, consuming it.
    ///
    /// Returns `None` when the iteration ended while waiting.
    pub fn receive(&mut self, event_name: &str) -> Option<Event> {
        if self.canceled {
            return None;
        }
        let mut waited = false;
        loop {
            if let Some(event) = self.machine.take_event_named(event_name) {
                if self
                    .shared
                    .controller
                    .notify_trace_event(
                        self.op,
                        TraceStepKind::ReceiveEvent {
                            event: event.name.clone(),
                        },
                    )
                    .is_err()
                {
                    self.canceled = true;
                    return None;
                }
                return Some(event);
            }

            if !waited {
                waited = true;
                if self
                    .shared
                    .controller
                    .notify_trace_event(
                        self.op,
                        TraceStepKind::WaitToReceive {
                            event: event_name.to_string(),
                        },
                    )
                    .is_err()
                {
                    self.canceled = true;
                    return None;
                }
            }

            if self
                .shared
                .controller
                .set_operation_status(self.op, OperationStatus::BlockedOnReceive)
                .is_err()
            {
                self.canceled = true;
                return None;
            }
            if self.shared.controller.schedule(self.op).is_err() {
                self.canceled = true;
                return None;
            }
        }
    }

    /// Fail the iteration if the condition does not hold.
    pub fn assert_that(&mut self, condition: bool, message: impl Into<String>) {
        if self.canceled || condition {
            return;
        }
        self.shared.controller.notify_assertion_failure(message);
        self.canceled = true;
    }

    /// Halt this machine; it completes after the current handler
    /// returns.
    pub fn halt(&mut self) {
        self.machine.set_halted();
    }

    /// Create a new machine mid-run; recorded as a CreateMachine step.
    pub fn create_machine(&mut self, def: MachineDef) {
        if self.canceled {
            return;
        }
        let child_name = def.name.clone();
        match spawn_machine(&self.shared, def) {
            Ok(child) => {
                if self
                    .shared
                    .controller
                    .notify_trace_event(
                        self.op,
                        TraceStepKind::CreateMachine {
                            child,
                            child_name,
                        },
                    )
                    .is_err()
                {
                    self.canceled = true;
                }
            }
            Err(err) => {
                self.shared
                    .controller
                    .notify_assertion_failure(format!("machine creation failed: {err}"));
                self.canceled = true;
            }
        }
    }

    /// Transition a monitor's state.
    pub fn monitor_state(&mut self, monitor: &str, state: impl Into<String>, hot: bool) {
        if self.canceled {
            return;
        }
        let Some(id) = self.shared.monitor_id(monitor) else {
            self.shared.controller.notify_assertion_failure(format!(
                "machine '{}' referenced unknown monitor '{monitor}'",
                self.machine.name
            ));
            self.canceled = true;
            return;
        };
        if self
            .shared
            .controller
            .notify_monitor_state(id, state, hot)
            .is_err()
        {
            self.canceled = true;
        }
    }
}
