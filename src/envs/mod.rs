mod scripted;

pub use scripted::ScriptedEnv;

use {
    crate::error::TrainError,
    anyhow::Result,
    std::{
        thread,
        time::Duration,
    },
    tracing::warn,
};

/// One request to the environment collaborator.
///
/// `action: None` asks only for the initial state of a new episode; the
/// environment is expected to treat it as a neutral no-op.
#[derive(Clone, Debug)]
pub struct StepRequest {
    pub action: Option<Vec<f64>>,
    pub previous_action: Vec<f64>,
}

/// The environment's answer to a [`StepRequest`].
#[derive(Clone, Debug)]
pub struct StepResponse {
    pub state: Vec<f64>,
    pub reward: f64,
    pub done: bool,
    pub success: bool,
}

/// The narrow, blocking interface to the environment collaborator.
///
/// Implementations wrap whatever transport talks to the simulator or robot;
/// a failed call is transient from the trainer's point of view and is
/// retried by [`RetryingClient`].
pub trait EnvironmentService {
    fn call_step(&mut self, request: &StepRequest) -> Result<StepResponse>;

    /// Whether a new goal has been placed; polled between episodes in
    /// evaluation mode.
    fn call_goal_status(&mut self) -> Result<bool>;
}

/// Bounded retry with fixed backoff for environment calls.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Wraps an [`EnvironmentService`] with the retry policy: every failure is
/// logged and retried after the backoff, never silently dropped, and the
/// attempt budget is bounded.
pub struct RetryingClient<S> {
    service: S,
    policy: RetryPolicy,
}

impl<S: EnvironmentService> RetryingClient<S> {
    pub fn new(service: S, policy: RetryPolicy) -> Self {
        Self { service, policy }
    }

    pub fn into_inner(self) -> S {
        self.service
    }

    fn call_with_retry<T>(
        &mut self,
        what: &'static str,
        mut call: impl FnMut(&mut S) -> Result<T>,
    ) -> Result<T, TrainError> {
        let mut last = String::new();
        for attempt in 1..=self.policy.max_attempts {
            match call(&mut self.service) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "{what} not available, waiting again: {e:#}",
                    );
                    last = format!("{e:#}");
                    if attempt < self.policy.max_attempts {
                        thread::sleep(self.policy.backoff);
                    }
                }
            }
        }
        Err(TrainError::EnvironmentUnavailable {
            attempts: self.policy.max_attempts,
            last,
        })
    }

    pub fn step(&mut self, request: &StepRequest) -> Result<StepResponse, TrainError> {
        self.call_with_retry("env step service", |service| service.call_step(request))
    }

    pub fn goal_status(&mut self) -> Result<bool, TrainError> {
        self.call_with_retry("new goal service", |service| service.call_goal_status())
    }
}
