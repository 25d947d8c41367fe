use {
    crate::error::TrainError,
    rand::thread_rng,
    serde::{
        Deserialize,
        Serialize,
    },
    unzip_n::unzip_n,
};

unzip_n!(5);

/// One recorded step of environment interaction.
///
/// Immutable once created; after insertion it is owned exclusively by the
/// [`ReplayBuffer`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transition {
    pub state: Vec<f64>,
    pub action: Vec<f64>,
    pub reward: f64,
    pub next_state: Vec<f64>,
    pub done: bool,
}

/// The five parallel sequences returned by [`ReplayBuffer::sample`], in the
/// sampled order.
pub struct TransitionBatch {
    pub states: Vec<Vec<f64>>,
    pub actions: Vec<Vec<f64>>,
    pub rewards: Vec<f64>,
    pub next_states: Vec<Vec<f64>>,
    pub dones: Vec<bool>,
}

/// A bounded replay buffer for off-policy algorithms.
///
/// Implemented as a ring buffer: the write cursor wraps modulo capacity, so
/// once the buffer is full every insertion overwrites the oldest transition.
/// Single-writer, single-reader; the training loop is single-threaded so no
/// internal synchronization is needed.
#[derive(Clone, Serialize, Deserialize)]
pub struct ReplayBuffer {
    capacity: usize,
    storage: Vec<Transition>,
    cursor: usize,
}

impl ReplayBuffer {
    /// Create a new replay buffer with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            storage: Vec::with_capacity(capacity),
            cursor: 0,
        }
    }

    /// Current occupied count, at most the capacity.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.storage.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Push a transition into the buffer, evicting the oldest one when full.
    ///
    /// O(1), never blocks, never fails.
    pub fn add_sample(&mut self, transition: Transition) {
        if self.capacity == 0 {
            return;
        }
        if self.storage.len() == self.capacity {
            self.storage[self.cursor] = transition;
        } else {
            self.storage.push(transition);
        }
        self.cursor = (self.cursor + 1) % self.capacity;
    }

    /// Draw `batch_size` transitions uniformly at random without replacement
    /// from the currently occupied range.
    ///
    /// Fails with [`TrainError::InsufficientData`] when fewer than
    /// `batch_size` transitions have been collected, without any partial read.
    pub fn sample(&self, batch_size: usize) -> Result<TransitionBatch, TrainError> {
        if self.storage.len() < batch_size {
            return Err(TrainError::InsufficientData {
                have: self.storage.len(),
                need: batch_size,
            });
        }

        let (states, actions, rewards, next_states, dones) =
            rand::seq::index::sample(&mut thread_rng(), self.storage.len(), batch_size)
                .iter()
                .map(|i| {
                    let t = &self.storage[i];
                    (
                        t.state.clone(),
                        t.action.clone(),
                        t.reward,
                        t.next_state.clone(),
                        t.done,
                    )
                })
                .unzip_n_vec();

        Ok(TransitionBatch {
            states,
            actions,
            rewards,
            next_states,
            dones,
        })
    }

    /// Iterate over the stored transitions, oldest first.
    pub fn iter_in_order(&self) -> impl Iterator<Item = &Transition> {
        let split = if self.storage.len() == self.capacity {
            self.cursor
        } else {
            0
        };
        self.storage[split..]
            .iter()
            .chain(self.storage[..split].iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(tag: f64) -> Transition {
        Transition {
            state: vec![tag, tag],
            action: vec![tag],
            reward: tag,
            next_state: vec![tag + 1.0, tag + 1.0],
            done: false,
        }
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        let mut buffer = ReplayBuffer::new(8);
        for i in 0..30 {
            buffer.add_sample(transition(i as f64));
            assert!(buffer.len() <= 8);
        }
        assert!(buffer.is_full());
    }

    #[test]
    fn test_fifo_eviction_keeps_most_recent() {
        let mut buffer = ReplayBuffer::new(4);
        for i in 0..7 {
            buffer.add_sample(transition(i as f64));
        }
        // After 7 inserts into capacity 4, transitions 3..=6 remain.
        let rewards: Vec<f64> = buffer.iter_in_order().map(|t| t.reward).collect();
        assert_eq!(rewards, vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_sample_without_replacement() {
        let mut buffer = ReplayBuffer::new(100);
        for i in 0..10 {
            buffer.add_sample(transition(i as f64));
        }
        // Sampling the full occupied range must return each transition
        // exactly once, and only draw from the occupied range.
        let batch = buffer.sample(10).unwrap();
        let mut rewards = batch.rewards.clone();
        rewards.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(rewards, (0..10).map(|i| i as f64).collect::<Vec<f64>>());
    }

    #[test]
    fn test_sample_insufficient_data() {
        let mut buffer = ReplayBuffer::new(100);
        for i in 0..3 {
            buffer.add_sample(transition(i as f64));
        }
        match buffer.sample(4) {
            Err(TrainError::InsufficientData { have, need }) => {
                assert_eq!((have, need), (3, 4));
            }
            _ => panic!("expected InsufficientData"),
        }
    }

    #[test]
    fn test_batch_rows_stay_parallel() {
        let mut buffer = ReplayBuffer::new(16);
        for i in 0..16 {
            buffer.add_sample(transition(i as f64));
        }
        let batch = buffer.sample(8).unwrap();
        for row in 0..8 {
            assert_eq!(batch.states[row][0], batch.rewards[row]);
            assert_eq!(batch.next_states[row][0], batch.rewards[row] + 1.0);
        }
    }
}
