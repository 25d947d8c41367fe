mod ou_noise;
mod replay_buffer;

pub use {
    ou_noise::OuNoise,
    replay_buffer::{
        ReplayBuffer,
        Transition,
        TransitionBatch,
    },
};
