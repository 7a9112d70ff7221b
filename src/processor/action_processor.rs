use crate::models::action::{GuideAction, GuideActionMessage};
use crate::processor::progress_engine::{Confirmation, ProgressEngine, ProgressError};
use crate::processor::tour_sequencer::{TourSequencer, TourTurn};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Applied,
    /// Valid action that found the tour already in the requested state.
    Unchanged,
    Skipped,
}

/// Applies guide actions. Actions for one tour run in the order they were
/// reserved, so each sees the state left by the previous one.
pub struct ActionProcessor {
    engine: Arc<ProgressEngine>,
    sequencer: TourSequencer,
}

impl ActionProcessor {
    pub fn new(engine: Arc<ProgressEngine>) -> Self {
        Self {
            engine,
            sequencer: TourSequencer::new(),
        }
    }

    /// Undecodable payloads are logged and dropped.
    pub fn decode(payload: &[u8]) -> Option<GuideActionMessage> {
        match serde_json::from_slice(payload) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("Failed to parse guide action: {}", e);
                None
            }
        }
    }

    /// Takes the next turn for the message's tour. Call in consumption order.
    pub fn reserve(&self, message: &GuideActionMessage) -> TourTurn {
        self.sequencer.reserve(message.tour_id)
    }

    pub async fn process_action(&self, payload: &[u8]) -> anyhow::Result<ActionOutcome> {
        let Some(message) = Self::decode(payload) else {
            return Ok(ActionOutcome::Skipped);
        };
        let turn = self.reserve(&message);
        self.apply(message, turn).await
    }

    pub async fn apply(&self, message: GuideActionMessage, mut turn: TourTurn) -> anyhow::Result<ActionOutcome> {
        // 1. Wait for earlier actions on this tour; the turn is held until persisted or rolled back
        turn.wait().await;
        info!("Processing {:?} for tour {}", message.action, message.tour_id);

        // 2. Load current tour state
        let mut tour = match self.engine.load_tour(message.tour_id).await? {
            Some(t) => t,
            None => {
                warn!("Tour {} not found, skipping", message.tour_id);
                return Ok(ActionOutcome::Skipped);
            }
        };

        // 3. Apply
        let result = match message.action {
            GuideAction::ConfirmMeetingPoint => {
                self.engine
                    .confirm_meeting_point(&mut tour)
                    .await
                    .map(|confirmation| match confirmation {
                        Confirmation::Confirmed => ActionOutcome::Applied,
                        Confirmation::AlreadyConfirmed => ActionOutcome::Unchanged,
                    })
            }
            GuideAction::ConfirmStop { order } => self
                .engine
                .confirm_stop(&mut tour, order)
                .await
                .map(|_| ActionOutcome::Applied),
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(ProgressError::Store(e)) => Err(e.into()),
            Err(e) => {
                warn!("Rejected guide action: {}", e);
                Ok(ActionOutcome::Skipped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stop::Stop;
    use crate::models::tour::Tour;
    use crate::processor::progress_engine::ConfirmationPolicy;
    use crate::store::memory::MemoryTourStore;
    use crate::store::{StoreError, TourStore};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    /// Yields after every load so concurrent actions interleave between read and write.
    struct InterleavingStore(Arc<MemoryTourStore>);

    #[async_trait]
    impl TourStore for InterleavingStore {
        async fn load_tour(&self, tour_id: Uuid) -> Result<Option<Tour>, StoreError> {
            let tour = self.0.load_tour(tour_id).await;
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            tour
        }

        async fn save_meeting_point(
            &self,
            tour_id: Uuid,
            confirmed: bool,
            confirmed_at: Option<DateTime<Utc>>,
        ) -> Result<(), StoreError> {
            self.0.save_meeting_point(tour_id, confirmed, confirmed_at).await
        }

        async fn save_stop_completion(
            &self,
            tour_id: Uuid,
            order: i32,
            completed: bool,
            completed_at: Option<DateTime<Utc>>,
        ) -> Result<(), StoreError> {
            self.0
                .save_stop_completion(tour_id, order, completed, completed_at)
                .await
        }
    }

    fn sample_tour() -> Tour {
        Tour::new(
            Uuid::new_v4(),
            "Muelle",
            None,
            vec![
                Stop::new(1, "Isla Taquile", -15.7725, -69.6836),
                Stop::new(2, "Uros", -15.8193, -69.9706),
            ],
        )
        .unwrap()
    }

    fn setup() -> (ActionProcessor, Arc<MemoryTourStore>, Uuid) {
        let tour = sample_tour();
        let tour_id = tour.tour_id;
        let store = Arc::new(MemoryTourStore::with_tour(tour));
        let engine = ProgressEngine::new(store.clone(), ConfirmationPolicy::default(), 8);
        (ActionProcessor::new(Arc::new(engine)), store, tour_id)
    }

    fn interleaving_setup(policy: ConfirmationPolicy) -> (Arc<ActionProcessor>, Arc<MemoryTourStore>, Uuid) {
        let tour = sample_tour();
        let tour_id = tour.tour_id;
        let memory = Arc::new(MemoryTourStore::with_tour(tour));
        let store = Arc::new(InterleavingStore(memory.clone()));
        let engine = ProgressEngine::new(store, policy, 8);
        (Arc::new(ActionProcessor::new(Arc::new(engine))), memory, tour_id)
    }

    fn payload(tour_id: Uuid, action: &str, order: Option<i32>) -> Vec<u8> {
        let mut value = serde_json::json!({ "tourId": tour_id, "action": action });
        if let Some(order) = order {
            value["order"] = serde_json::json!(order);
        }
        serde_json::to_vec(&value).unwrap()
    }

    fn spawn_action(
        processor: &Arc<ActionProcessor>,
        payload: Vec<u8>,
    ) -> tokio::task::JoinHandle<anyhow::Result<ActionOutcome>> {
        let message = ActionProcessor::decode(&payload).unwrap();
        let turn = processor.reserve(&message);
        let processor = processor.clone();
        tokio::spawn(async move { processor.apply(message, turn).await })
    }

    #[tokio::test]
    async fn test_applies_stop_confirmation() {
        let (processor, store, tour_id) = setup();
        let outcome = processor
            .process_action(&payload(tour_id, "confirm_stop", Some(2)))
            .await
            .unwrap();
        assert_eq!(outcome, ActionOutcome::Applied);
        assert!(store.stored(tour_id).unwrap().stop(2).unwrap().completed);
    }

    #[tokio::test]
    async fn test_applies_meeting_point_confirmation() {
        let (processor, store, tour_id) = setup();
        let confirm = payload(tour_id, "confirm_meeting_point", None);
        assert_eq!(
            processor.process_action(&confirm).await.unwrap(),
            ActionOutcome::Applied
        );
        assert!(store.stored(tour_id).unwrap().meeting_point_confirmed);

        assert_eq!(
            processor.process_action(&confirm).await.unwrap(),
            ActionOutcome::Unchanged
        );
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_skips_garbage_and_unknown_tours() {
        let (processor, _store, _tour_id) = setup();
        assert_eq!(
            processor.process_action(b"{not json").await.unwrap(),
            ActionOutcome::Skipped
        );
        assert_eq!(
            processor
                .process_action(&payload(Uuid::new_v4(), "confirm_stop", Some(1)))
                .await
                .unwrap(),
            ActionOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn test_skips_rejected_actions() {
        let (processor, store, tour_id) = setup();
        let confirm = payload(tour_id, "confirm_stop", Some(1));
        processor.process_action(&confirm).await.unwrap();
        let writes = store.write_count();

        assert_eq!(
            processor.process_action(&confirm).await.unwrap(),
            ActionOutcome::Skipped
        );
        assert_eq!(
            processor
                .process_action(&payload(tour_id, "confirm_stop", Some(9)))
                .await
                .unwrap(),
            ActionOutcome::Skipped
        );
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_store_failure_is_returned() {
        let (processor, store, tour_id) = setup();
        store.set_fail_writes(true);
        let result = processor
            .process_action(&payload(tour_id, "confirm_stop", Some(1)))
            .await;
        assert!(result.is_err());
        assert!(!store.stored(tour_id).unwrap().stop(1).unwrap().completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_in_order_confirmations_both_apply() {
        let policy = ConfirmationPolicy {
            enforce_stop_order: true,
            ..Default::default()
        };
        let (processor, store, tour_id) = interleaving_setup(policy);

        let first = spawn_action(&processor, payload(tour_id, "confirm_stop", Some(1)));
        let second = spawn_action(&processor, payload(tour_id, "confirm_stop", Some(2)));

        assert_eq!(first.await.unwrap().unwrap(), ActionOutcome::Applied);
        assert_eq!(second.await.unwrap().unwrap(), ActionOutcome::Applied);

        let stored = store.stored(tour_id).unwrap();
        assert!(stored.stop(1).unwrap().completed);
        assert!(stored.stop(2).unwrap().completed);
        assert!(stored.is_finished());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_duplicate_meeting_point_is_unchanged() {
        let (processor, store, tour_id) = interleaving_setup(ConfirmationPolicy::default());
        let confirm = payload(tour_id, "confirm_meeting_point", None);

        let first = spawn_action(&processor, confirm.clone());
        let second = spawn_action(&processor, confirm);

        assert_eq!(first.await.unwrap().unwrap(), ActionOutcome::Applied);
        assert_eq!(second.await.unwrap().unwrap(), ActionOutcome::Unchanged);
        assert_eq!(store.write_count(), 1);
        assert!(store.stored(tour_id).unwrap().meeting_point_confirmed);
    }
}
