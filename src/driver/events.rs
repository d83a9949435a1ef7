//! Server event subscriptions.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::wrappers::ReceiverStream;

use crate::protocol::Event;

/// Events buffered per subscriber before new ones are dropped.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Stream of server-pushed events.
///
/// Ends when the connection (or pool) that produced it is dropped.
#[derive(Debug)]
pub struct EventStream {
    inner: ReceiverStream<Event>,
}

impl Stream for EventStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Fan-out of events to every live [`EventStream`].
#[derive(Debug, Default)]
pub(crate) struct EventHub {
    subscribers: Mutex<Vec<mpsc::Sender<Event>>>,
}

impl EventHub {
    pub(crate) fn subscribe(&self, buffer: usize) -> EventStream {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        self.subscribers.lock().push(tx);
        EventStream {
            inner: ReceiverStream::new(rx),
        }
    }

    /// Deliver `event` to every subscriber without waiting.
    ///
    /// Returns how many subscribers were full and missed it. Closed
    /// subscribers are forgotten.
    pub(crate) fn publish(&self, event: &Event) -> usize {
        let mut missed = 0;
        self.subscribers.lock().retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                missed += 1;
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        missed
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
