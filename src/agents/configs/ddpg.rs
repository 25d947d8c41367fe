use {
    super::{
        AlgorithmConfig,
        OffPolicyConfig,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::time::Duration,
};

/// Hyperparameters for the DDPG navigation agent.
///
/// Serialized verbatim into every checkpoint so a session can be resumed with
/// exactly the settings it was trained under.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DdpgConfig {
    // Which simulation stage the agent is trained against.
    pub stage: usize,
    // Dimensions of the state and action vectors.
    pub state_size: usize,
    pub action_size: usize,
    // The number of neurons in the hidden layers of both networks.
    pub hidden_1_size: usize,
    pub hidden_2_size: usize,
    // The learning rates for the actor and critic networks.
    pub actor_learning_rate: f64,
    pub critic_learning_rate: f64,
    // The impact of the next state's q value on the current q value.
    pub gamma: f64,
    // The weight for the soft target-network updates.
    pub tau: f64,
    // The capacity of the replay buffer used for sampling training data.
    pub replay_buffer_capacity: usize,
    // The training batch size for each learning step.
    pub training_batch_size: usize,
    // Ornstein-Uhlenbeck process parameters.
    pub ou_theta: f64,
    pub ou_sigma_max: f64,
    pub ou_sigma_min: f64,
    pub ou_decay_period: usize,
    // Action bounds: forward speed in [0, v] and angular speed in [-w, w].
    pub action_limit_v: f64,
    pub action_limit_w: f64,
    // Episode schedule; max_episodes 0 runs until externally terminated.
    pub max_episodes: usize,
    pub store_interval: usize,
    pub goal_poll_millis: u64,
    // Whether checkpoints carry the replay buffer and noise state.
    pub persist_replay_buffer: bool,
}

impl DdpgConfig {
    /// The TurtleBot3 burger defaults: 12 laser readings plus goal distance
    /// and angle as state, (linear, angular) velocity as action.
    pub fn turtlebot3() -> Self {
        Self {
            stage: 1,
            state_size: 14,
            action_size: 2,
            hidden_1_size: 512,
            hidden_2_size: 512,
            actor_learning_rate: 1e-4,
            critic_learning_rate: 1e-4,
            gamma: 0.90,
            tau: 0.001,
            replay_buffer_capacity: 100_000,
            training_batch_size: 128,
            ou_theta: 0.15,
            ou_sigma_max: 0.1,
            ou_sigma_min: 0.1,
            ou_decay_period: 8_000_000,
            action_limit_v: 0.22,
            action_limit_w: 2.0,
            max_episodes: 10_000,
            store_interval: 100,
            goal_poll_millis: 1000,
            persist_replay_buffer: true,
        }
    }
}

impl AlgorithmConfig for DdpgConfig {
    fn max_episodes(&self) -> usize {
        self.max_episodes
    }
    fn store_interval(&self) -> usize {
        self.store_interval
    }
    fn goal_poll_backoff(&self) -> Duration {
        Duration::from_millis(self.goal_poll_millis)
    }
}

impl OffPolicyConfig for DdpgConfig {
    fn replay_buffer_capacity(&self) -> usize {
        self.replay_buffer_capacity
    }
    fn training_batch_size(&self) -> usize {
        self.training_batch_size
    }
    fn persist_replay_buffer(&self) -> bool {
        self.persist_replay_buffer
    }
}
