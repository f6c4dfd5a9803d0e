use std::sync::Arc;

use hashbrown::HashSet;
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::Repaint;
use crate::{ImageProvider, Size, Thumbnail};

type Loaded = (u64, String, Option<Thumbnail>);

pub struct Loader {
    generation: u64,
    seen: HashSet<String>,
    sender: UnboundedSender<(u64, String)>,
    ready: UnboundedReceiver<Loaded>,
}

impl Loader {
    pub fn create(
        provider: Arc<dyn ImageProvider>,
        size: Size,
        workers: usize,
        repaint: impl Repaint,
    ) -> Self {
        let (tx, ready) = unbounded_channel();
        let (sender, rx) = unbounded_channel::<(u64, String)>();
        let rx = Arc::new(Mutex::new(rx));
        let repaint = repaint.erased();

        for n in 0..workers.max(1) {
            let provider = Arc::clone(&provider);
            let rx = Arc::clone(&rx);
            let tx = tx.clone();
            let repaint = Arc::clone(&repaint);

            let spawned = std::thread::Builder::new()
                .name(format!("thumbnail-loader-{n}"))
                .spawn(move || loop {
                    let Some((generation, id)) = rx.lock().blocking_recv() else { break };
                    let thumbnail = provider.request_image(&id, size);
                    if tx.send((generation, id, thumbnail)).is_err() {
                        break;
                    }
                    repaint();
                });

            if let Err(err) = spawned {
                tracing::error!(%err, "cannot spawn loader thread");
            }
        }

        Self {
            generation: 0,
            seen: HashSet::new(),
            sender,
            ready,
        }
    }

    pub fn request(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string());
        self.sender.send((self.generation, id.to_string())).is_ok()
    }

    // results of requests queued before a reset are dropped by `poll`
    pub fn reset(&mut self) {
        self.generation += 1;
        self.seen.clear();
    }

    pub fn poll(&mut self) -> Option<(String, Option<Thumbnail>)> {
        while let Ok((generation, id, thumbnail)) = self.ready.try_recv() {
            if generation == self.generation {
                return Some((id, thumbnail));
            }
            tracing::debug!(id = %id, generation, "dropping stale thumbnail");
        }
        None
    }
}
