use {
    crate::{
        agents::{
            configs::{
                AlgorithmConfig,
                OffPolicyConfig,
            },
            Algorithm,
            OffPolicyAlgorithm,
            RunMode,
            SaveableAlgorithm,
        },
        components::Transition,
        envs::{
            EnvironmentService,
            RetryingClient,
            StepRequest,
        },
        session::{
            EpisodeRecord,
            Session,
        },
    },
    anyhow::Result,
    serde::Serialize,
    std::{
        thread,
        time::Instant,
    },
    tracing::warn,
};

/// Drive episodes against the environment collaborator until the episode
/// budget runs out (`max_episodes == 0` runs until externally terminated).
///
/// Per episode: reset the noise process, fetch the initial state with an
/// empty-action request, then step/record/learn until the environment
/// reports `done`. The initial request only obtains the state and is never
/// recorded as a transition, so an episode of `n + 1` service calls records
/// exactly `n` transitions; episode loss averages are divided by that
/// recorded count.
///
/// In training mode a checkpoint is stored every `store_interval` episodes
/// and on episode 1; in evaluation mode the loop instead waits for a new
/// goal between episodes, polling with the configured backoff.
pub fn training_loop<Alg, S>(
    client: &mut RetryingClient<S>,
    agent: &mut Alg,
    mode: RunMode,
    session: &Session,
    start_episode: usize,
) -> Result<Vec<EpisodeRecord>>
where
    Alg: Algorithm + OffPolicyAlgorithm + SaveableAlgorithm,
    Alg::Config: Serialize + OffPolicyConfig,
    S: EnvironmentService,
{
    let max_episodes = agent.config().max_episodes();
    let store_interval = agent.config().store_interval().max(1);
    let goal_poll_backoff = agent.config().goal_poll_backoff();

    let mut success_count = 0;
    let mut records = Vec::new();
    let mut episode = start_episode;

    loop {
        episode += 1;
        if max_episodes != 0 && episode > max_episodes {
            break;
        }

        // EPISODE_START: fresh accumulators, reset noise, and request only
        // the initial state with a neutral no-op action.
        let mut past_action = vec![0.0; agent.action_size()];
        agent.reset_noise();
        let initial = client.step(&StepRequest {
            action: None,
            previous_action: past_action.clone(),
        })?;
        let mut state = initial.state;

        let episode_start = Instant::now();
        let mut total_reward = 0.0;
        let mut critic_loss_sum = 0.0;
        let mut actor_loss_sum = 0.0;
        let mut recorded = 0;
        let success;

        // STEP loop, until the environment reports done.
        loop {
            let action = agent.select_action(&state, mode)?;
            let response = client.step(&StepRequest {
                action: Some(action.clone()),
                previous_action: past_action.clone(),
            })?;
            total_reward += response.reward;

            agent.remember(Transition {
                state: state.clone(),
                action: action.clone(),
                reward: response.reward,
                next_state: response.state.clone(),
                done: response.done,
            });
            recorded += 1;

            if let RunMode::Train = mode {
                if let Some(step) = agent.learn()? {
                    critic_loss_sum += step.critic_loss;
                    actor_loss_sum += step.actor_loss;
                }
            }

            past_action = action;
            state = response.state;
            if response.done {
                success = response.success;
                if success {
                    success_count += 1;
                }
                break;
            }
        }

        // EPISODE_DONE: averages over the recorded transition count.
        let divisor = recorded.max(1) as f64;
        let record = EpisodeRecord {
            episode,
            total_reward,
            success,
            duration_seconds: episode_start.elapsed().as_secs_f64(),
            n_steps: recorded,
            success_count,
            buffer_len: agent.replay_buffer().len(),
            avg_critic_loss: critic_loss_sum / divisor,
            avg_actor_loss: actor_loss_sum / divisor,
        };
        warn!(
            "episode {episode} with total reward of {total_reward} \
             (success: {success}, steps: {recorded})",
        );
        session.append_result(&record)?;
        records.push(record);

        match mode {
            RunMode::Train => {
                if episode % store_interval == 0 || episode == 1 {
                    session.save_checkpoint(&*agent, episode)?;
                }
            }
            RunMode::Eval => {
                // wait for a new goal before starting the next episode
                while !client.goal_status()? {
                    thread::sleep(goal_poll_backoff);
                }
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agents::{
            configs::DdpgConfig,
            Ddpg,
        },
        envs::{
            RetryPolicy,
            ScriptedEnv,
        },
        session::SessionStore,
    };
    use candle_core::Device;
    use std::time::Duration;
    use tempfile::tempdir;

    fn tiny_config(max_episodes: usize, store_interval: usize) -> DdpgConfig {
        DdpgConfig {
            state_size: 3,
            action_size: 2,
            hidden_1_size: 8,
            hidden_2_size: 8,
            replay_buffer_capacity: 64,
            training_batch_size: 4,
            max_episodes,
            store_interval,
            goal_poll_millis: 1,
            ..DdpgConfig::turtlebot3()
        }
    }

    fn client(episode_len: usize) -> RetryingClient<ScriptedEnv> {
        RetryingClient::new(
            ScriptedEnv::new(3, episode_len),
            RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
        )
    }

    #[test]
    fn test_initial_call_is_not_recorded() {
        let base = tempdir().unwrap();
        let session = SessionStore::new(base.path()).new_session().unwrap();
        let device = Device::Cpu;
        let mut agent = Ddpg::from_config(&device, &tiny_config(1, 100)).unwrap();
        let mut client = client(4);

        let records =
            training_loop(&mut client, &mut *agent, RunMode::Train, &session, 0).unwrap();

        // 5 service calls per episode: 1 initial-state call + 4 action steps
        assert_eq!(client.into_inner().steps_served, 5);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].n_steps, 4);
        assert_eq!(records[0].buffer_len, 4);
        assert!(records[0].avg_critic_loss.is_finite());
    }

    #[test]
    fn test_eval_mode_never_learns_or_checkpoints() {
        let base = tempdir().unwrap();
        let session = SessionStore::new(base.path()).new_session().unwrap();
        let device = Device::Cpu;
        let mut agent = Ddpg::from_config(&device, &tiny_config(2, 1)).unwrap();
        let mut client = client(6);

        let records =
            training_loop(&mut client, &mut *agent, RunMode::Eval, &session, 0).unwrap();

        assert_eq!(records.len(), 2);
        for record in &records {
            assert_eq!(record.avg_critic_loss, 0.0);
            assert_eq!(record.avg_actor_loss, 0.0);
        }
        assert!(!session.dir().join("episode_1").exists());
        assert!(!session.dir().join("episode_2").exists());
    }

    #[test]
    fn test_checkpoints_follow_store_interval() {
        let base = tempdir().unwrap();
        let session = SessionStore::new(base.path()).new_session().unwrap();
        let device = Device::Cpu;
        let mut agent = Ddpg::from_config(&device, &tiny_config(3, 2)).unwrap();
        let mut client = client(3);

        training_loop(&mut client, &mut *agent, RunMode::Train, &session, 0).unwrap();

        // episode 1 always stores, then every store_interval-th episode
        assert!(session.dir().join("episode_1").exists());
        assert!(session.dir().join("episode_2").exists());
        assert!(!session.dir().join("episode_3").exists());
    }

    #[test]
    fn test_resume_continues_episode_numbering() {
        let base = tempdir().unwrap();
        let session = SessionStore::new(base.path()).new_session().unwrap();
        let device = Device::Cpu;
        let mut agent = Ddpg::from_config(&device, &tiny_config(5, 100)).unwrap();
        let mut client = client(3);

        let records =
            training_loop(&mut client, &mut *agent, RunMode::Train, &session, 3).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].episode, 4);
        assert_eq!(records[1].episode, 5);
    }

    #[test]
    fn test_success_count_accumulates_across_episodes() {
        let base = tempdir().unwrap();
        let session = SessionStore::new(base.path()).new_session().unwrap();
        let device = Device::Cpu;
        let mut agent = Ddpg::from_config(&device, &tiny_config(3, 100)).unwrap();
        let mut client = client(3);

        let records =
            training_loop(&mut client, &mut *agent, RunMode::Train, &session, 0).unwrap();

        // the scripted environment ends every episode in success
        assert_eq!(records[2].success_count, 3);
        let text = std::fs::read_to_string(session.dir().join("results.csv")).unwrap();
        assert_eq!(text.lines().count(), 4);
    }
}
