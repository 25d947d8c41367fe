pub mod configs;
mod ddpg;

pub use ddpg::Ddpg;

use {
    crate::{
        components::{
            OuNoise,
            ReplayBuffer,
            Transition,
        },
        error::TrainError,
    },
    candle_core::Device,
    serde::{
        Deserialize,
        Serialize,
    },
    std::{
        fmt::Display,
        path::Path,
    },
};

/// The execution mode of an agent is either training or evaluation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RunMode {
    Train,
    Eval,
}

impl Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Train => write!(f, "Train"),
            RunMode::Eval => write!(f, "Eval"),
        }
    }
}

/// The two loss scalars produced by one learning step, accumulated per
/// episode for the results log.
#[derive(Clone, Copy, Debug)]
pub struct LearnStep {
    pub critic_loss: f64,
    pub actor_loss: f64,
}

pub trait Algorithm {
    type Config;

    fn from_config(device: &Device, config: &Self::Config) -> Result<Box<Self>, TrainError>;
    fn config(&self) -> &Self::Config;

    /// Select an action for the given state, perturbed by exploration noise
    /// in training mode and clamped to the valid action bounds.
    fn select_action(&mut self, state: &[f64], mode: RunMode) -> Result<Vec<f64>, TrainError>;

    /// Run one learning step against the replay buffer.
    ///
    /// Returns `Ok(None)` when the buffer does not yet hold a full batch;
    /// that is the expected state early in training, not a failure.
    fn learn(&mut self) -> Result<Option<LearnStep>, TrainError>;

    /// Reset the exploration-noise process; called at episode boundaries.
    fn reset_noise(&mut self);

    fn action_size(&self) -> usize;
}

pub trait OffPolicyAlgorithm: Algorithm {
    fn remember(&mut self, transition: Transition);
    fn replay_buffer(&self) -> &ReplayBuffer;
}

/// The mutable state of an agent beyond its network weights, persisted in
/// checkpoints when exact resume is configured.
#[derive(Serialize, Deserialize)]
pub struct AgentState {
    pub replay_buffer: ReplayBuffer,
    pub noise: OuNoise,
    pub global_step: usize,
}

pub trait SaveableAlgorithm: Algorithm {
    fn save_weights(&self, dir: &Path) -> Result<(), TrainError>;
    fn load_weights(&mut self, dir: &Path) -> Result<(), TrainError>;
    fn snapshot_state(&self) -> AgentState;
    fn restore_state(&mut self, state: AgentState);
}
