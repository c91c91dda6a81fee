//! Delivery endpoints for streamed fragments.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// The consumer behind a sink has gone away.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("fragment sink closed")]
pub struct SinkClosed;

/// Receives the fragments of one turn, in backend order, then a close signal.
#[async_trait]
pub trait FragmentSink: Send {
    async fn send_fragment(&mut self, fragment: &str) -> Result<(), SinkClosed>;

    async fn close(&mut self) {}
}

/// Close every sink, ignoring the ones whose consumer is gone.
pub async fn close_sinks(sinks: Vec<Box<dyn FragmentSink>>) {
    for mut sink in sinks {
        sink.close().await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkMessage {
    Fragment(String),
    Closed,
}

/// Forwards fragments into an mpsc channel.
pub struct ChannelSink {
    tx: mpsc::Sender<SinkMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<SinkMessage>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SinkMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl FragmentSink for ChannelSink {
    async fn send_fragment(&mut self, fragment: &str) -> Result<(), SinkClosed> {
        self.tx
            .send(SinkMessage::Fragment(fragment.to_string()))
            .await
            .map_err(|_| SinkClosed)
    }

    async fn close(&mut self) {
        let _ = self.tx.send(SinkMessage::Closed).await;
    }
}

/// Records fragments in memory; clones share the same buffer.
#[derive(Clone, Default)]
pub struct BufferSink {
    fragments: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fragments(&self) -> Vec<String> {
        self.fragments
            .lock()
            .map(|fragments| fragments.clone())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.lock().map(|closed| *closed).unwrap_or(false)
    }
}

#[async_trait]
impl FragmentSink for BufferSink {
    async fn send_fragment(&mut self, fragment: &str) -> Result<(), SinkClosed> {
        let mut fragments = self.fragments.lock().map_err(|_| SinkClosed)?;
        fragments.push(fragment.to_string());
        Ok(())
    }

    async fn close(&mut self) {
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_reports_dropped_receiver() {
        let (mut sink, rx) = ChannelSink::channel(4);
        drop(rx);

        assert_eq!(sink.send_fragment("x").await, Err(SinkClosed));
    }

    #[tokio::test]
    async fn channel_sink_forwards_then_closes() {
        let (mut sink, mut rx) = ChannelSink::channel(4);

        sink.send_fragment("a").await.unwrap();
        sink.close().await;

        assert_eq!(rx.recv().await, Some(SinkMessage::Fragment("a".to_string())));
        assert_eq!(rx.recv().await, Some(SinkMessage::Closed));
    }

    #[tokio::test]
    async fn buffer_sink_clones_share_state() {
        let observer = BufferSink::new();
        let mut sink: Box<dyn FragmentSink> = Box::new(observer.clone());

        sink.send_fragment("one").await.unwrap();
        close_sinks(vec![sink]).await;

        assert_eq!(observer.fragments(), vec!["one".to_string()]);
        assert!(observer.is_closed());
    }
}
