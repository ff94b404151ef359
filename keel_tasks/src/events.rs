//! Typed event channel with deferred delivery.
//!
//! Publishers may live on any thread; events queue in a channel and are
//! delivered to subscribers, in publish order, when the owner pumps the
//! channel from the engine thread. This is the bus collaborator subsystems
//! (input translation, windowing) post through.

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::trace;

type Listener<E> = Box<dyn FnMut(&E) + Send>;

/// A single-type event queue plus its subscriber list.
pub struct EventChannel<E> {
    sender: Sender<E>,
    receiver: Receiver<E>,
    listeners: Vec<Listener<E>>,
}

/// A clonable publishing end, detached from the channel's lifetime
/// management.
pub struct EventSender<E>(Sender<E>);

impl<E> Clone for EventSender<E> {
    fn clone(&self) -> Self {
        EventSender(self.0.clone())
    }
}

impl<E> EventSender<E> {
    pub fn publish(&self, event: E) {
        // delivery is best-effort; a dropped channel swallows the event
        let _ = self.0.send(event);
    }
}

impl<E: Send + 'static> EventChannel<E> {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        EventChannel {
            sender,
            receiver,
            listeners: Vec::new(),
        }
    }

    pub fn publisher(&self) -> EventSender<E> {
        EventSender(self.sender.clone())
    }

    pub fn publish(&self, event: E) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&E) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Delivers every queued event to every subscriber, in publish order.
    /// Returns how many events were delivered.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.receiver.try_recv() {
            for listener in self.listeners.iter_mut() {
                listener(&event);
            }
            delivered += 1;
        }
        if delivered > 0 {
            trace!(delivered, "pumped event channel");
        }
        delivered
    }
}

impl<E: Send + 'static> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn events_deliver_in_publish_order() {
        let mut channel = EventChannel::new();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        channel.subscribe(move |event: &i32| sink.lock().push(*event));

        channel.publish(1);
        channel.publish(2);
        channel.publish(3);
        assert!(seen.lock().is_empty()); // nothing before the pump

        assert_eq!(3, channel.pump());
        assert_eq!(vec![1, 2, 3], *seen.lock());
        assert_eq!(0, channel.pump());
    }

    #[test]
    fn every_subscriber_sees_every_event() {
        let mut channel = EventChannel::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let c = Arc::clone(&count);
            channel.subscribe(move |_: &()| {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        channel.publish(());
        channel.publish(());
        channel.pump();
        assert_eq!(6, count.load(Ordering::SeqCst));
    }

    #[test]
    fn publishers_work_across_threads() {
        let mut channel = EventChannel::new();
        let publisher = channel.publisher();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        channel.subscribe(move |_: &u32| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let publisher = publisher.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        publisher.publish(i);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(100, channel.pump());
        assert_eq!(100, count.load(Ordering::SeqCst));
    }
}
