//! Turn event decoding and the consumer-facing message stream.

pub mod decoder;
pub mod wire;

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

pub use decoder::MessageDecoder;

use crate::types::{Message, ResultMessage};

/// Notified as the consumer of a [`MessageStream`] makes progress.
pub trait StreamObserver: Send + Sync {
    /// The consumer received the turn's terminal result.
    fn result_observed(&self);
    /// The consumer dropped the stream before the terminal result.
    fn detached(&self);
}

/// Lazy, finite sequence of messages for one turn, ending with a result.
pub struct MessageStream {
    rx: mpsc::UnboundedReceiver<Message>,
    observer: Option<Arc<dyn StreamObserver>>,
    finished: bool,
}

impl MessageStream {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Message>,
        observer: Option<Arc<dyn StreamObserver>>,
    ) -> Self {
        Self {
            rx,
            observer,
            finished: false,
        }
    }

    /// Consume the stream, returning every message in order.
    pub async fn collect_all(mut self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(message) = self.recv().await {
            messages.push(message);
        }
        messages
    }

    /// Consume the stream, returning only the terminal result.
    pub async fn result(self) -> Option<ResultMessage> {
        self.collect_all()
            .await
            .into_iter()
            .rev()
            .find_map(|message| match message {
                Message::Result(result) => Some(result),
                _ => None,
            })
    }

    pub async fn recv(&mut self) -> Option<Message> {
        futures::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }

    fn finish(&mut self, observed_result: bool) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(observer) = &self.observer {
            if observed_result {
                observer.result_observed();
            } else {
                observer.detached();
            }
        }
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(message)) => {
                if matches!(message, Message::Result(_)) {
                    this.finish(true);
                }
                Poll::Ready(Some(message))
            }
            Poll::Ready(None) => {
                this.finish(false);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        self.finish(false);
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResultStats;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counts {
        results: AtomicUsize,
        detaches: AtomicUsize,
    }

    impl StreamObserver for Counts {
        fn result_observed(&self) {
            self.results.fetch_add(1, Ordering::SeqCst);
        }

        fn detached(&self) {
            self.detaches.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn ends_after_result_and_notifies_once() {
        let (tx, rx) = mpsc::unbounded_channel();
        let counts = Arc::new(Counts::default());
        let mut stream = MessageStream::new(rx, Some(counts.clone()));
        tx.send(Message::user_text("hi")).expect("send");
        tx.send(Message::Result(ResultMessage::success(ResultStats::default())))
            .expect("send");
        tx.send(Message::user_text("after")).expect("send");

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
        drop(stream);

        assert_eq!(counts.results.load(Ordering::SeqCst), 1);
        assert_eq!(counts.detaches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn early_drop_reports_detach() {
        let (tx, rx) = mpsc::unbounded_channel();
        let counts = Arc::new(Counts::default());
        let mut stream = MessageStream::new(rx, Some(counts.clone()));
        tx.send(Message::user_text("hi")).expect("send");

        assert!(stream.next().await.is_some());
        drop(stream);

        assert_eq!(counts.results.load(Ordering::SeqCst), 0);
        assert_eq!(counts.detaches.load(Ordering::SeqCst), 1);
    }
}
