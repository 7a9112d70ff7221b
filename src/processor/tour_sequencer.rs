use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use uuid::Uuid;

type Tails = Arc<Mutex<HashMap<Uuid, (u64, oneshot::Receiver<()>)>>>;

/// Hands out turns per tour in reservation order. A turn may run once every
/// earlier turn for the same tour has been dropped. Different tours never wait
/// on each other.
#[derive(Default)]
pub struct TourSequencer {
    tails: Tails,
    next_seq: AtomicU64,
}

#[must_use = "a turn releases the next one when dropped"]
pub struct TourTurn {
    tails: Tails,
    tour_id: Uuid,
    seq: u64,
    previous: Option<oneshot::Receiver<()>>,
    _done: oneshot::Sender<()>,
}

impl TourSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next turn for `tour_id`. Synchronous, so the caller fixes
    /// the order before handing work to other tasks.
    pub fn reserve(&self, tour_id: Uuid) -> TourTurn {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (done, finished) = oneshot::channel();
        let previous = self
            .tails
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tour_id, (seq, finished))
            .map(|(_, rx)| rx);
        TourTurn {
            tails: self.tails.clone(),
            tour_id,
            seq,
            previous,
            _done: done,
        }
    }

    pub fn pending_tours(&self) -> usize {
        self.tails
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl TourTurn {
    pub fn tour_id(&self) -> Uuid {
        self.tour_id
    }

    /// Waits until the previous turn on this tour is dropped. Cancel-safe.
    pub async fn wait(&mut self) {
        if let Some(previous) = self.previous.as_mut() {
            // The sender is never used; Err is the release signal.
            let _ = previous.await;
            self.previous = None;
        }
    }
}

impl Drop for TourTurn {
    fn drop(&mut self) {
        let mut tails = self.tails.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(tails.get(&self.tour_id), Some((seq, _)) if *seq == self.seq) {
            tails.remove(&self.tour_id);
        }
    }
}
