use ganesha_llm::{StreamEvent, StreamEventSink};
use tokio::sync::mpsc;

/// Single-consumer queue from background tasks into the presentation loop.
///
/// Events come out in the order they were posted. Only the owner of the bridge can receive,
/// and receiving takes `&mut self`, so one event is handled at a time.
pub struct EventBridge<E> {
    sender: mpsc::UnboundedSender<E>,
    receiver: mpsc::UnboundedReceiver<E>,
}

/// Cloneable posting end handed to background tasks.
pub struct EventPoster<E> {
    sender: mpsc::UnboundedSender<E>,
}

impl<E> Clone for EventPoster<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<E> EventPoster<E> {
    /// Queues an event. After the bridge is closed or dropped this is a no-op returning false.
    pub fn post(&self, event: impl Into<E>) -> bool {
        self.sender.send(event.into()).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<E> Default for EventBridge<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventBridge<E> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self { sender, receiver }
    }

    pub fn poster(&self) -> EventPoster<E> {
        EventPoster {
            sender: self.sender.clone(),
        }
    }

    /// Runs `handler` on the oldest queued event, if any. Never blocks.
    pub fn drain<F>(&mut self, handler: F) -> bool
    where
        F: FnOnce(E),
    {
        match self.try_next() {
            Some(event) => {
                handler(event);
                true
            }
            None => false,
        }
    }

    pub fn try_next(&mut self) -> Option<E> {
        self.receiver.try_recv().ok()
    }

    /// Waits for the next event. Returns `None` only after [`close`](Self::close) once the
    /// queue is empty.
    pub async fn next(&mut self) -> Option<E> {
        self.receiver.recv().await
    }

    /// Stops accepting events; already queued ones can still be received.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl<E> StreamEventSink for EventPoster<E>
where
    E: From<StreamEvent> + Send + 'static,
{
    fn post(&self, event: StreamEvent) -> bool {
        EventPoster::post(self, event)
    }

    fn is_closed(&self) -> bool {
        EventPoster::is_closed(self)
    }
}
