use crate::types::StageEvent;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const REPLAY_EVENTS_PER_TASK: usize = 64;
const REPLAY_TRACKED_TASKS: usize = 256;

/// Process-wide fan-out broadcaster for stage events.
///
/// Delivery is fire-and-forget: an event published while no observer is
/// subscribed is dropped, not queued. A bounded per-task replay buffer keeps
/// the last transitions so a late-attaching observer can catch up.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StageEvent>,
    seq: Arc<AtomicI64>,
    replay: Arc<Mutex<ReplayBuffer>>,
}

struct ReplayBuffer {
    order: VecDeque<String>,
    by_task: HashMap<String, VecDeque<StageEvent>>,
}

impl ReplayBuffer {
    fn push(&mut self, event: StageEvent) {
        let task_id = event.task_id.clone();
        let entry = self.by_task.entry(task_id.clone()).or_insert_with(|| {
            self.order.push_back(task_id);
            VecDeque::with_capacity(REPLAY_EVENTS_PER_TASK)
        });
        if entry.len() == REPLAY_EVENTS_PER_TASK {
            entry.pop_front();
        }
        entry.push_back(event);
        while self.order.len() > REPLAY_TRACKED_TASKS {
            if let Some(evicted) = self.order.pop_front() {
                self.by_task.remove(&evicted);
            }
        }
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            seq: Arc::new(AtomicI64::new(0)),
            replay: Arc::new(Mutex::new(ReplayBuffer {
                order: VecDeque::new(),
                by_task: HashMap::new(),
            })),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.sender.subscribe()
    }

    /// Stamps the event with the next sequence number, records it in the
    /// replay buffer, and fans it out to every current subscriber. Never
    /// fails: with zero subscribers the event is silently dropped.
    pub fn publish(&self, mut event: StageEvent) -> StageEvent {
        event.seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut buffer) = self.replay.lock() {
            buffer.push(event.clone());
        }
        let _ = self.sender.send(event.clone());
        event
    }

    /// All buffered events across tasks, in publish order.
    pub fn replay(&self) -> Vec<StageEvent> {
        let Ok(buffer) = self.replay.lock() else {
            return Vec::new();
        };
        let mut events: Vec<StageEvent> = buffer
            .by_task
            .values()
            .flat_map(|queue| queue.iter().cloned())
            .collect();
        events.sort_by_key(|event| event.seq);
        events
    }

    /// Buffered events for one task, in publish order.
    pub fn replay_task(&self, task_id: &str) -> Vec<StageEvent> {
        let Ok(buffer) = self.replay.lock() else {
            return Vec::new();
        };
        buffer
            .by_task
            .get(task_id)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnalysisStage, StageEvent};

    #[test]
    fn publish_without_observers_does_not_fail() {
        let bus = EventBus::new(16);
        let event = bus.publish(StageEvent::start(
            "task_a",
            AnalysisStage::SourceCodeAnalysis,
            "starting",
        ));
        assert_eq!(event.seq, 1);
    }

    #[test]
    fn subscribers_receive_published_events() {
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();
        bus.publish(StageEvent::progress(
            "task_a",
            AnalysisStage::DiffAnalysis,
            "working",
        ));
        let received = receiver.try_recv().unwrap();
        assert_eq!(received.task_id, "task_a");
        assert_eq!(received.step, AnalysisStage::DiffAnalysis);
    }

    #[test]
    fn replay_preserves_publish_order_across_tasks() {
        let bus = EventBus::new(16);
        bus.publish(StageEvent::start(
            "task_a",
            AnalysisStage::SourceCodeAnalysis,
            "a1",
        ));
        bus.publish(StageEvent::start(
            "task_b",
            AnalysisStage::SourceCodeAnalysis,
            "b1",
        ));
        bus.publish(StageEvent::progress(
            "task_a",
            AnalysisStage::SourceCodeAnalysis,
            "a2",
        ));
        let replayed = bus.replay();
        let messages: Vec<&str> = replayed.iter().map(|event| event.message.as_str()).collect();
        assert_eq!(messages, vec!["a1", "b1", "a2"]);
    }

    #[test]
    fn replay_buffer_is_bounded_per_task() {
        let bus = EventBus::new(16);
        for index in 0..(REPLAY_EVENTS_PER_TASK + 10) {
            bus.publish(StageEvent::progress(
                "task_a",
                AnalysisStage::SourceCodeAnalysis,
                format!("message {index}"),
            ));
        }
        let replayed = bus.replay_task("task_a");
        assert_eq!(replayed.len(), REPLAY_EVENTS_PER_TASK);
        assert_eq!(replayed[0].message, "message 10");
    }

    #[test]
    fn replay_of_unknown_task_is_empty() {
        let bus = EventBus::new(16);
        assert!(bus.replay_task("task_missing").is_empty());
    }
}
