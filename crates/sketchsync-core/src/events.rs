//! Named-event dispatcher.
//!
//! Every stateful object that needs to decouple producers from consumers owns
//! an [`EventDispatcher`]. Events are identified by name; handlers run
//! synchronously, in registration order, each isolated from the failures of
//! its siblings.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

/// Synchronous event handler. Receives the emitted arguments by reference.
pub type Handler<A> = Arc<dyn Fn(&A) -> anyhow::Result<()> + Send + Sync>;

/// Identity of a single registration, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Registration<A> {
    id: HandlerId,
    debug_id: Option<String>,
    once: bool,
    handler: Handler<A>,
}

impl<A> Clone for Registration<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            debug_id: self.debug_id.clone(),
            once: self.once,
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<A> Registration<A> {
    fn label(&self) -> String {
        self.debug_id
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// A handler that failed during an emission.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub handler: HandlerId,
    pub debug_id: Option<String>,
    pub message: String,
}

/// Outcome of a single [`EventDispatcher::emit`] call.
#[derive(Debug, Default)]
pub struct EmitReport {
    /// Number of handlers that were invoked (successfully or not).
    pub invoked: usize,
    pub failures: Vec<HandlerFailure>,
}

impl EmitReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// In-process registry of named events.
///
/// Subscribing to or emitting an event that was never declared is tolerated:
/// the name is declared on the fly and a warning is logged.
pub struct EventDispatcher<A> {
    registry: Mutex<HashMap<String, Vec<Registration<A>>>>,
    next_id: AtomicU64,
}

impl<A> Default for EventDispatcher<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for EventDispatcher<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry();
        let mut map = f.debug_map();
        for (name, regs) in registry.iter() {
            map.entry(name, &regs.len());
        }
        map.finish()
    }
}

impl<A> EventDispatcher<A> {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a dispatcher with the given events already declared.
    pub fn with_events(names: &[&str]) -> Self {
        let dispatcher = Self::new();
        for name in names {
            dispatcher.declare(name);
        }
        dispatcher
    }

    // Handlers never run while the lock is held, so a poisoned lock still
    // guards a consistent map.
    fn registry(&self) -> MutexGuard<'_, HashMap<String, Vec<Registration<A>>>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ensure `name` exists. Idempotent.
    pub fn declare(&self, name: &str) {
        self.registry().entry(name.to_string()).or_default();
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.registry().contains_key(name)
    }

    pub fn handler_count(&self, name: &str) -> usize {
        self.registry().get(name).map_or(0, Vec::len)
    }

    /// Register `handler` for `name`.
    pub fn subscribe<F>(&self, name: &str, debug_id: Option<&str>, handler: F) -> HandlerId
    where
        F: Fn(&A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(name, debug_id, false, Arc::new(handler))
    }

    /// Register a handler that removes itself the first time it fires.
    pub fn subscribe_once<F>(&self, name: &str, debug_id: Option<&str>, handler: F) -> HandlerId
    where
        F: Fn(&A) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(name, debug_id, true, Arc::new(handler))
    }

    fn register(
        &self,
        name: &str,
        debug_id: Option<&str>,
        once: bool,
        handler: Handler<A>,
    ) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registry = self.registry();
        if !registry.contains_key(name) {
            warn!(event = name, "Subscribing to undeclared event; declaring it");
        }
        registry.entry(name.to_string()).or_default().push(Registration {
            id,
            debug_id: debug_id.map(str::to_string),
            once,
            handler,
        });
        id
    }

    /// Remove a registration by identity. Returns `false` if it was not found.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut registry = self.registry();
        for regs in registry.values_mut() {
            if let Some(pos) = regs.iter().position(|r| r.id == id) {
                regs.remove(pos);
                return true;
            }
        }
        false
    }

    // Removes a one-shot registration. Only the caller that actually removed
    // it may invoke the handler.
    fn claim_once(&self, name: &str, id: HandlerId) -> bool {
        let mut registry = self.registry();
        let Some(regs) = registry.get_mut(name) else {
            return false;
        };
        match regs.iter().position(|r| r.id == id) {
            Some(pos) => {
                regs.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Invoke every handler registered for `name`, in registration order.
    ///
    /// The handler list is captured before the first invocation, so handlers
    /// may subscribe or unsubscribe while the emission is running. A handler
    /// that returns an error or panics is logged and recorded in the report;
    /// the remaining handlers still run.
    pub fn emit(&self, name: &str, args: &A) -> EmitReport {
        let snapshot: Vec<Registration<A>> = {
            let mut registry = self.registry();
            match registry.get(name) {
                Some(regs) => regs.clone(),
                None => {
                    warn!(event = name, "Emitting undeclared event; declaring it");
                    registry.insert(name.to_string(), Vec::new());
                    return EmitReport::default();
                }
            }
        };

        let mut report = EmitReport::default();
        for reg in snapshot {
            if reg.once && !self.claim_once(name, reg.id) {
                continue;
            }
            report.invoked += 1;

            let message = match panic::catch_unwind(AssertUnwindSafe(|| (reg.handler)(args))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{e:#}"),
                Err(payload) => panic_message(payload.as_ref()),
            };
            warn!(event = name, handler = %reg.label(), error = %message, "Event handler failed, continuing");
            report.failures.push(HandlerFailure {
                handler: reg.id,
                debug_id: reg.debug_id.clone(),
                message,
            });
        }

        debug!(event = name, invoked = report.invoked, "Emitted event");
        report
    }

    /// Debug ids of the handlers registered for `name`, in invocation order.
    /// Handlers registered without one are listed by their [`HandlerId`].
    pub fn list_debug_ids(&self, name: &str) -> Vec<String> {
        self.registry()
            .get(name)
            .map(|regs| regs.iter().map(Registration::label).collect())
            .unwrap_or_default()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn recorder() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn test_declare_is_idempotent() {
        let events: EventDispatcher<()> = EventDispatcher::new();
        assert!(!events.is_declared("data"));
        events.declare("data");
        events.subscribe("data", None, |_| Ok(()));
        events.declare("data");
        assert!(events.is_declared("data"));
        assert_eq!(events.handler_count("data"), 1);
    }

    #[test]
    fn test_emit_in_registration_order_with_args() {
        let events: EventDispatcher<(String, u32)> = EventDispatcher::with_events(&["data"]);
        let seen = recorder();

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            events.subscribe("data", Some(tag), move |(cmd, n)| {
                seen.lock().unwrap().push(format!("{tag}:{cmd}:{n}"));
                Ok(())
            });
        }

        let report = events.emit("data", &("line".to_string(), 7));
        assert_eq!(report.invoked, 3);
        assert!(report.is_ok());
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first:line:7", "second:line:7", "third:line:7"]
        );
    }

    #[test]
    fn test_subscribe_once_fires_exactly_once() {
        let events: EventDispatcher<u32> = EventDispatcher::with_events(&["close"]);
        let count = Arc::new(AtomicU64::new(0));

        let c = count.clone();
        events.subscribe_once("close", Some("once"), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        events.subscribe("close", Some("always"), |_| Ok(()));

        let first = events.emit("close", &1);
        assert_eq!(first.invoked, 2);
        assert_eq!(events.list_debug_ids("close"), vec!["always"]);

        let second = events.emit("close", &2);
        assert_eq!(second.invoked, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_undeclared_event_declares_it() {
        let events: EventDispatcher<()> = EventDispatcher::new();
        let report = events.emit("mystery", &());
        assert_eq!(report.invoked, 0);
        assert!(report.is_ok());
        assert!(events.is_declared("mystery"));

        // Subsequent emits are plain no-ops.
        let again = events.emit("mystery", &());
        assert_eq!(again.invoked, 0);
        assert_eq!(events.handler_count("mystery"), 0);
    }

    #[test]
    fn test_subscribe_undeclared_event_declares_it() {
        let events: EventDispatcher<()> = EventDispatcher::new();
        events.subscribe("late", Some("h"), |_| Ok(()));
        assert!(events.is_declared("late"));
        assert_eq!(events.emit("late", &()).invoked, 1);
    }

    #[test]
    fn test_failing_handler_does_not_stop_siblings() {
        let events: EventDispatcher<()> = EventDispatcher::with_events(&["data"]);
        let seen = recorder();

        events.subscribe("data", Some("errs"), |_| anyhow::bail!("boom"));
        events.subscribe("data", Some("panics"), |_| panic!("kaboom"));
        let s = seen.clone();
        events.subscribe("data", Some("ok"), move |_| {
            s.lock().unwrap().push("ok".into());
            Ok(())
        });

        let report = events.emit("data", &());
        assert_eq!(report.invoked, 3);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].debug_id.as_deref(), Some("errs"));
        assert!(report.failures[0].message.contains("boom"));
        assert!(report.failures[1].message.contains("kaboom"));
        assert_eq!(*seen.lock().unwrap(), vec!["ok"]);
    }

    #[test]
    fn test_unsubscribe_by_identity() {
        let events: EventDispatcher<()> = EventDispatcher::with_events(&["data"]);
        let a = events.subscribe("data", Some("a"), |_| Ok(()));
        let _b = events.subscribe("data", None, |_| Ok(()));

        assert!(events.unsubscribe(a));
        assert!(!events.unsubscribe(a));
        let ids = events.list_debug_ids("data");
        assert_eq!(ids.len(), 1);
        assert!(ids[0].starts_with('#'));
    }

    #[test]
    fn test_handler_may_subscribe_during_emit() {
        let events: Arc<EventDispatcher<()>> = Arc::new(EventDispatcher::with_events(&["data"]));
        let inner = events.clone();
        events.subscribe("data", Some("outer"), move |_| {
            inner.subscribe("data", Some("added"), |_| Ok(()));
            Ok(())
        });

        // The handler added mid-emission only runs on the next emit.
        assert_eq!(events.emit("data", &()).invoked, 1);
        assert_eq!(events.emit("data", &()).invoked, 2);
    }

    #[test]
    fn test_list_debug_ids_unknown_event_has_no_side_effects() {
        let events: EventDispatcher<()> = EventDispatcher::new();
        assert!(events.list_debug_ids("nope").is_empty());
        assert!(!events.is_declared("nope"));
    }
}
