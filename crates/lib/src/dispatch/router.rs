//! Inbound router: one worker per conversation so a chat's messages are handled in arrival order
//! while different chats are handled concurrently.

use crate::channels::InboundMessage;
use crate::dispatch::Dispatcher;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DEFAULT_WORKER_IDLE: Duration = Duration::from_secs(300);
const PRUNE_THRESHOLD: usize = 1024;
/// Messages buffered per chat; a full queue makes the router wait, which backs up the inbound channel.
const CHAT_QUEUE: usize = 16;

struct ChatWorker {
    tx: mpsc::Sender<InboundMessage>,
    handle: JoinHandle<()>,
}

/// Fans inbound messages out to per-conversation workers.
pub struct InboundRouter {
    dispatcher: Arc<Dispatcher>,
    idle_timeout: Duration,
}

impl InboundRouter {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            idle_timeout: DEFAULT_WORKER_IDLE,
        }
    }

    /// How long a chat worker waits for its next message before exiting.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Receive until `inbound_rx` closes, then wait for every worker to drain its queue.
    pub async fn run(self, mut inbound_rx: mpsc::Receiver<InboundMessage>) {
        let mut workers: HashMap<(String, String), ChatWorker> = HashMap::new();
        while let Some(msg) = inbound_rx.recv().await {
            let key = (msg.channel_id.clone(), msg.conversation_id.clone());
            let msg = match workers.get(&key) {
                Some(w) => match w.tx.send(msg).await {
                    Ok(()) => continue,
                    // Worker went idle and closed its queue; hand over to a successor.
                    Err(mpsc::error::SendError(msg)) => msg,
                },
                None => msg,
            };
            if workers.len() >= PRUNE_THRESHOLD {
                workers.retain(|_, w| !w.handle.is_finished());
            }
            let previous = workers.remove(&key).map(|w| w.handle);
            let (tx, rx) = mpsc::channel(CHAT_QUEUE);
            if tx.try_send(msg).is_err() {
                continue;
            }
            let handle = tokio::spawn(run_chat_worker(
                self.dispatcher.clone(),
                rx,
                previous,
                self.idle_timeout,
            ));
            workers.insert(key, ChatWorker { tx, handle });
        }
        log::debug!("inbound router: input closed, draining {} worker(s)", workers.len());
        for (_, w) in workers {
            drop(w.tx);
            let _ = w.handle.await;
        }
    }
}

async fn run_chat_worker(
    dispatcher: Arc<Dispatcher>,
    mut rx: mpsc::Receiver<InboundMessage>,
    previous: Option<JoinHandle<()>>,
    idle_timeout: Duration,
) {
    // Predecessor may still be draining messages that arrived before ours.
    if let Some(prev) = previous {
        let _ = prev.await;
    }
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(msg)) => dispatcher.handle(msg).await,
            Ok(None) => break,
            Err(_) => {
                rx.close();
                while let Ok(msg) = rx.try_recv() {
                    dispatcher.handle(msg).await;
                }
                break;
            }
        }
    }
}
