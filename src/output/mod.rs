// Output boundary: one-way notifications from the engine to whatever
// presentation layer is attached

use crate::models::{Candle, Signal};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Notification pushed by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Human-readable status line (loading, polling cadence, warm-up progress)
    Status(String),
    /// Latest live price, indicator value, and derived signal
    Result {
        price: f64,
        indicator: f64,
        signal: Signal,
    },
    /// Most recent fully-closed candles, oldest-first, for display
    Candles(Vec<Candle>),
    /// Fatal engine error; the engine has stopped itself
    Error(String),
}

/// Receiver side of the engine's notification stream
pub type EventReceiver = mpsc::UnboundedReceiver<EngineEvent>;
pub type EventSender = mpsc::UnboundedSender<EngineEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Callbacks a presentation layer implements
///
/// The engine never calls these directly; events are queued on a channel
/// and delivered by a forwarder task, so the sink decides which execution
/// context it runs on.
pub trait OutputSink: Send + Sync + 'static {
    fn on_status(&self, text: &str);
    fn on_result(&self, price: f64, indicator: f64, signal: Signal);
    fn on_candles(&self, candles: &[Candle]);
    fn on_error(&self, message: &str);
}

/// Drain engine events into a sink until the engine drops its sender
pub fn spawn_sink_forwarder<S: OutputSink>(mut rx: EventReceiver, sink: S) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                EngineEvent::Status(text) => sink.on_status(&text),
                EngineEvent::Result {
                    price,
                    indicator,
                    signal,
                } => sink.on_result(price, indicator, signal),
                EngineEvent::Candles(candles) => sink.on_candles(&candles),
                EngineEvent::Error(message) => sink.on_error(&message),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingSink {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl OutputSink for RecordingSink {
        fn on_status(&self, text: &str) {
            self.lines.lock().unwrap().push(format!("status:{}", text));
        }
        fn on_result(&self, price: f64, indicator: f64, signal: Signal) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("result:{}:{}:{}", price, indicator, signal));
        }
        fn on_candles(&self, candles: &[Candle]) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("candles:{}", candles.len()));
        }
        fn on_error(&self, message: &str) {
            self.lines.lock().unwrap().push(format!("error:{}", message));
        }
    }

    #[tokio::test]
    async fn test_forwarder_delivers_in_order() {
        let (tx, rx) = event_channel();
        let sink = RecordingSink::default();
        let lines = sink.lines.clone();
        let handle = spawn_sink_forwarder(rx, sink);

        tx.send(EngineEvent::Status("loading".into())).unwrap();
        tx.send(EngineEvent::Result {
            price: 105.0,
            indicator: 100.0,
            signal: Signal::Long,
        })
        .unwrap();
        tx.send(EngineEvent::Error("boom".into())).unwrap();
        drop(tx);

        handle.await.unwrap();

        let lines = lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![
                "status:loading".to_string(),
                "result:105:100:LONG".to_string(),
                "error:boom".to_string(),
            ]
        );
    }
}
