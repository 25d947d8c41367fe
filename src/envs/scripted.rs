use {
    super::{
        EnvironmentService,
        StepRequest,
        StepResponse,
    },
    anyhow::Result,
};

/// A deterministic stand-in for the robot's environment service.
///
/// Episodes run a fixed number of steps and end in success; states are a
/// simple function of the step index. Used by the training-loop tests and by
/// the binary's dry-run mode; real transports implement
/// [`EnvironmentService`] out of crate.
pub struct ScriptedEnv {
    state_size: usize,
    episode_len: usize,
    step_count: usize,
    pub episodes_started: usize,
    pub steps_served: usize,
}

impl ScriptedEnv {
    pub fn new(state_size: usize, episode_len: usize) -> Self {
        Self {
            state_size,
            episode_len,
            step_count: 0,
            episodes_started: 0,
            steps_served: 0,
        }
    }

    fn state_at(&self, step: usize) -> Vec<f64> {
        (0..self.state_size)
            .map(|i| (step as f64 * 0.1 + i as f64 * 0.01).sin())
            .collect()
    }
}

impl EnvironmentService for ScriptedEnv {
    fn call_step(&mut self, request: &StepRequest) -> Result<StepResponse> {
        self.steps_served += 1;
        match &request.action {
            // empty action: start a new episode, report only its state
            None => {
                self.step_count = 0;
                self.episodes_started += 1;
                Ok(StepResponse {
                    state: self.state_at(0),
                    reward: 0.0,
                    done: false,
                    success: false,
                })
            }
            Some(action) => {
                self.step_count += 1;
                let done = self.step_count >= self.episode_len;
                Ok(StepResponse {
                    state: self.state_at(self.step_count),
                    // reward follows the commanded forward speed so that
                    // episode totals are predictable in tests
                    reward: 1.0 + action[0],
                    done,
                    success: done,
                })
            }
        }
    }

    fn call_goal_status(&mut self) -> Result<bool> {
        Ok(true)
    }
}
