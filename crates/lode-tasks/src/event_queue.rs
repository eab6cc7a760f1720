use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

type BoxedEvent = Box<dyn Any + Send>;
type Callback = Box<dyn Fn(&(dyn Any + Send)) + Send + Sync>;

/// Typed event queue.
///
/// Callbacks are registered during single-threaded initialization; after
/// init the registry is read-only and events may be enqueued from any
/// thread. Dispatch swaps the pending buffer out under the lock and runs the
/// callbacks unlocked, so enqueueing from inside a callback is fine.
#[derive(Default)]
pub struct EventQueue {
    callbacks: RwLock<HashMap<TypeId, Vec<Callback>>>,
    events: Mutex<Vec<BoxedEvent>>,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for one event type.
    ///
    /// Must only be called during initialization, before other threads start
    /// producing or dispatching events.
    pub fn register_callback<E, F>(&self, callback: F)
    where
        E: Any + Send,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Box::new(move |event| match event.downcast_ref::<E>() {
            Some(event) => callback(event),
            None => tracing::error!("mismatched event type in dispatch"),
        });
        self.callbacks
            .write()
            .unwrap()
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Enqueues an event (thread-safe).
    pub fn enqueue_event<E: Any + Send>(&self, event: E) {
        self.events.lock().unwrap().push(Box::new(event));
    }

    /// Dispatches a single event immediately, bypassing the queue.
    pub fn dispatch_now<E: Any + Send>(&self, event: &E) {
        let callbacks = self.callbacks.read().unwrap();
        if let Some(list) = callbacks.get(&TypeId::of::<E>()) {
            for callback in list {
                callback(event);
            }
        }
    }

    fn dispatch_boxed(&self, event: &BoxedEvent) {
        let callbacks = self.callbacks.read().unwrap();
        if let Some(list) = callbacks.get(&(**event).type_id()) {
            for callback in list {
                callback(event.as_ref());
            }
        }
    }

    /// Dispatches (and removes) only events of type `E`, preserving the
    /// relative order of everything else.
    pub fn dispatch_event_type<E: Any + Send>(&self) {
        let work: Vec<BoxedEvent> = {
            let mut events = self.events.lock().unwrap();
            let mut keep = Vec::with_capacity(events.len());
            let mut matching = Vec::new();
            for event in events.drain(..) {
                if (*event).type_id() == TypeId::of::<E>() {
                    matching.push(event);
                } else {
                    keep.push(event);
                }
            }
            *events = keep;
            matching
        };
        for event in &work {
            self.dispatch_boxed(event);
        }
    }

    /// Dispatches and removes all pending events in enqueue order.
    pub fn dispatch_all_events(&self) {
        let work: Vec<BoxedEvent> = {
            let mut events = self.events.lock().unwrap();
            std::mem::take(&mut *events)
        };
        for event in &work {
            self.dispatch_boxed(event);
        }
    }

    /// Returns `true` if any event is pending.
    pub fn has_pending_events(&self) -> bool {
        !self.events.lock().unwrap().is_empty()
    }

    /// Drops all pending events.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug)]
    struct Ping(u32);
    #[derive(Debug)]
    struct Pong(u32);

    fn recording_queue() -> (Arc<EventQueue>, Arc<Mutex<Vec<String>>>) {
        let queue = Arc::new(EventQueue::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let log = log.clone();
            queue.register_callback(move |event: &Ping| {
                log.lock().unwrap().push(format!("ping {}", event.0));
            });
        }
        {
            let log = log.clone();
            queue.register_callback(move |event: &Pong| {
                log.lock().unwrap().push(format!("pong {}", event.0));
            });
        }
        (queue, log)
    }

    #[test]
    fn dispatch_all_preserves_enqueue_order() {
        let (queue, log) = recording_queue();
        queue.enqueue_event(Ping(1));
        queue.enqueue_event(Pong(2));
        queue.enqueue_event(Ping(3));
        queue.dispatch_all_events();
        assert_eq!(*log.lock().unwrap(), ["ping 1", "pong 2", "ping 3"]);
        assert!(!queue.has_pending_events());
    }

    #[test]
    fn typed_dispatch_keeps_the_rest_in_order() {
        let (queue, log) = recording_queue();
        queue.enqueue_event(Ping(1));
        queue.enqueue_event(Pong(2));
        queue.enqueue_event(Ping(3));
        queue.enqueue_event(Pong(4));

        queue.dispatch_event_type::<Pong>();
        assert_eq!(*log.lock().unwrap(), ["pong 2", "pong 4"]);

        queue.dispatch_all_events();
        assert_eq!(
            *log.lock().unwrap(),
            ["pong 2", "pong 4", "ping 1", "ping 3"]
        );
    }

    #[test]
    fn enqueue_is_thread_safe() {
        let (queue, log) = recording_queue();
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    for index in 0..100 {
                        queue.enqueue_event(Ping(index));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        queue.dispatch_all_events();
        assert_eq!(log.lock().unwrap().len(), 400);
    }
}
