mod ddpg;

pub use ddpg::DdpgConfig;

use std::time::Duration;

/// The configuration surface the training loop needs from any algorithm.
pub trait AlgorithmConfig {
    /// Number of episodes to run; 0 means run until externally terminated.
    fn max_episodes(&self) -> usize;
    /// Persist a checkpoint every this many episodes (and on episode 1).
    fn store_interval(&self) -> usize;
    /// Backoff between goal-status polls while waiting in evaluation mode.
    fn goal_poll_backoff(&self) -> Duration;
}

pub trait OffPolicyConfig: AlgorithmConfig {
    fn replay_buffer_capacity(&self) -> usize;
    fn training_batch_size(&self) -> usize;
    /// Whether checkpoints include the serialized replay buffer and noise
    /// state for exact resume, or only network weights.
    fn persist_replay_buffer(&self) -> bool;
}
