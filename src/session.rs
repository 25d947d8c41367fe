use {
    crate::{
        agents::{
            configs::OffPolicyConfig,
            SaveableAlgorithm,
        },
        error::TrainError,
    },
    serde::{
        de::DeserializeOwned,
        Serialize,
    },
    std::{
        fs,
        io::Write,
        path::{
            Path,
            PathBuf,
        },
    },
    tracing::warn,
};

/// One line of the append-only results log, written after every episode.
#[derive(Clone, Debug)]
pub struct EpisodeRecord {
    pub episode: usize,
    pub total_reward: f64,
    pub success: bool,
    pub duration_seconds: f64,
    pub n_steps: usize,
    pub success_count: usize,
    pub buffer_len: usize,
    pub avg_critic_loss: f64,
    pub avg_actor_loss: f64,
}

const RESULTS_HEADER: &str = "episode, reward, success, duration, n_steps, \
success_count, memory length, avg_critic_loss, avg_actor_loss";

impl EpisodeRecord {
    fn to_line(&self) -> String {
        format!(
            "{}, {}, {}, {}, {}, {}, {}, {}, {}",
            self.episode,
            self.total_reward,
            self.success,
            self.duration_seconds,
            self.n_steps,
            self.success_count,
            self.buffer_len,
            self.avg_critic_loss,
            self.avg_actor_loss,
        )
    }
}

fn write_ron<T: Serialize>(value: &T, path: &Path) -> Result<(), TrainError> {
    let text = ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(path, text)?;
    Ok(())
}

fn read_ron<T: DeserializeOwned>(path: &Path) -> Result<T, TrainError> {
    let text = fs::read_to_string(path)?;
    ron::from_str(&text).map_err(|e| TrainError::CorruptCheckpoint {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Allocates and reopens session directories under one base directory.
pub struct SessionStore {
    base: PathBuf,
}

impl SessionStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Allocate a fresh `ddpg_{n}` session directory, never colliding with
    /// an existing session.
    pub fn new_session(&self) -> Result<Session, TrainError> {
        fs::create_dir_all(&self.base)?;
        let next = fs::read_dir(&self.base)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("ddpg_"))
                    .and_then(|n| n.parse::<usize>().ok())
            })
            .max()
            .map_or(0, |n| n + 1);

        let dir = self.base.join(format!("ddpg_{next}"));
        fs::create_dir_all(&dir)?;
        warn!("starting new session at {}", dir.display());
        Ok(Session { dir })
    }

    /// Reopen an existing session for resumption at the given episode.
    pub fn open_session(&self, name: &str, episode: usize) -> Result<Session, TrainError> {
        let dir = self.base.join(name);
        if !dir.is_dir() {
            return Err(TrainError::SessionNotFound { path: dir, episode });
        }
        Ok(Session { dir })
    }
}

/// One training session: a directory holding per-episode checkpoints and the
/// append-only results log.
pub struct Session {
    dir: PathBuf,
}

impl Session {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn checkpoint_dir(&self, episode: usize) -> PathBuf {
        self.dir.join(format!("episode_{episode}"))
    }

    /// Persist a checkpoint for `episode`: network weights, the
    /// hyperparameter record, and (when configured) the serialized replay
    /// buffer and noise state.
    ///
    /// Everything is written into a temporary directory first and published
    /// with a single rename, so a concurrent reader never observes a
    /// half-written or mixed-episode checkpoint.
    pub fn save_checkpoint<Alg>(&self, agent: &Alg, episode: usize) -> Result<(), TrainError>
    where
        Alg: SaveableAlgorithm,
        Alg::Config: Serialize + OffPolicyConfig,
    {
        let staging = self.dir.join(format!(".episode_{episode}.tmp"));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        agent.save_weights(&staging)?;
        write_ron(agent.config(), &staging.join("hyperparameters.ron"))?;
        if agent.config().persist_replay_buffer() {
            write_ron(&agent.snapshot_state(), &staging.join("agent_state.ron"))?;
        }

        let target = self.checkpoint_dir(episode);
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(&staging, &target)?;
        warn!("stored checkpoint for episode {episode} at {}", target.display());
        Ok(())
    }

    /// Read back the hyperparameter record of a checkpoint, used to rebuild
    /// the agent before loading its weights.
    pub fn load_hyperparameters<C: DeserializeOwned>(
        &self,
        episode: usize,
    ) -> Result<C, TrainError> {
        let dir = self.checkpoint_dir(episode);
        let path = dir.join("hyperparameters.ron");
        if !path.is_file() {
            return Err(TrainError::SessionNotFound { path, episode });
        }
        read_ron(&path)
    }

    /// Restore an agent from the checkpoint for `episode`.
    ///
    /// Weights load first and atomically per varmap; any failure aborts
    /// before mutable state is touched, so the agent is never left with
    /// mismatched online/target weights or a half-restored buffer.
    pub fn load_checkpoint<Alg>(&self, agent: &mut Alg, episode: usize) -> Result<(), TrainError>
    where
        Alg: SaveableAlgorithm,
    {
        let dir = self.checkpoint_dir(episode);
        for artifact in ["actor.safetensors", "critic.safetensors"] {
            let path = dir.join(artifact);
            if !path.is_file() {
                return Err(TrainError::SessionNotFound { path, episode });
            }
        }

        agent
            .load_weights(&dir)
            .map_err(|e| TrainError::CorruptCheckpoint {
                path: dir.clone(),
                reason: e.to_string(),
            })?;

        let state_path = dir.join("agent_state.ron");
        if state_path.is_file() {
            agent.restore_state(read_ron(&state_path)?);
        }
        Ok(())
    }

    /// Append one episode record to the line-oriented results log, writing
    /// the header when the log is first created.
    pub fn append_result(&self, record: &EpisodeRecord) -> Result<(), TrainError> {
        let path = self.dir.join("results.csv");
        let new_file = !path.exists();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        if new_file {
            writeln!(file, "{RESULTS_HEADER}")?;
        }
        writeln!(file, "{}", record.to_line())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agents::{
            configs::DdpgConfig,
            Algorithm,
            Ddpg,
            OffPolicyAlgorithm,
            RunMode,
        },
        components::Transition,
    };
    use candle_core::Device;
    use tempfile::tempdir;

    fn tiny_config() -> DdpgConfig {
        DdpgConfig {
            state_size: 3,
            action_size: 2,
            hidden_1_size: 8,
            hidden_2_size: 8,
            replay_buffer_capacity: 64,
            training_batch_size: 4,
            ..DdpgConfig::turtlebot3()
        }
    }

    fn transition(tag: f64) -> Transition {
        Transition {
            state: vec![tag, tag, tag],
            action: vec![0.1, 0.2],
            reward: tag,
            next_state: vec![tag, tag, tag],
            done: false,
        }
    }

    #[test]
    fn test_new_sessions_do_not_collide() {
        let base = tempdir().unwrap();
        let store = SessionStore::new(base.path());

        let first = store.new_session().unwrap();
        let second = store.new_session().unwrap();
        assert!(first.dir().ends_with("ddpg_0"));
        assert!(second.dir().ends_with("ddpg_1"));
    }

    #[test]
    fn test_open_session_missing_directory() {
        let base = tempdir().unwrap();
        let store = SessionStore::new(base.path());
        match store.open_session("ddpg_7", 100) {
            Err(TrainError::SessionNotFound { episode, .. }) => assert_eq!(episode, 100),
            _ => panic!("expected SessionNotFound"),
        }
    }

    #[test]
    fn test_checkpoint_roundtrip_restores_behavior() {
        let base = tempdir().unwrap();
        let store = SessionStore::new(base.path());
        let session = store.new_session().unwrap();
        let device = Device::Cpu;

        let mut agent = Ddpg::from_config(&device, &tiny_config()).unwrap();
        for i in 0..8 {
            agent.remember(transition(i as f64 / 10.0));
        }
        agent.learn().unwrap().expect("batch was available");
        session.save_checkpoint(&*agent, 5).unwrap();

        // no staging directory must survive a successful save
        assert!(!session.dir().join(".episode_5.tmp").exists());

        let config: DdpgConfig = session.load_hyperparameters(5).unwrap();
        let mut resumed = Ddpg::from_config(&device, &config).unwrap();
        session.load_checkpoint(&mut *resumed, 5).unwrap();

        let probe = [0.3, -0.1, 0.7];
        let original = agent.select_action(&probe, RunMode::Eval).unwrap();
        let restored = resumed.select_action(&probe, RunMode::Eval).unwrap();
        assert_eq!(original, restored);
        assert_eq!(agent.replay_buffer().len(), resumed.replay_buffer().len());
    }

    #[test]
    fn test_load_missing_episode() {
        let base = tempdir().unwrap();
        let store = SessionStore::new(base.path());
        let session = store.new_session().unwrap();
        let device = Device::Cpu;

        let mut agent = Ddpg::from_config(&device, &tiny_config()).unwrap();
        match session.load_checkpoint(&mut *agent, 42) {
            Err(TrainError::SessionNotFound { episode, .. }) => assert_eq!(episode, 42),
            _ => panic!("expected SessionNotFound"),
        }
    }

    #[test]
    fn test_corrupt_hyperparameters_are_reported() {
        let base = tempdir().unwrap();
        let store = SessionStore::new(base.path());
        let session = store.new_session().unwrap();

        let dir = session.dir().join("episode_3");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("hyperparameters.ron"), "not ron at all {{{").unwrap();

        match session.load_hyperparameters::<DdpgConfig>(3) {
            Err(TrainError::CorruptCheckpoint { .. }) => (),
            _ => panic!("expected CorruptCheckpoint"),
        }
    }

    #[test]
    fn test_results_log_appends_with_single_header() {
        let base = tempdir().unwrap();
        let store = SessionStore::new(base.path());
        let session = store.new_session().unwrap();

        let record = EpisodeRecord {
            episode: 1,
            total_reward: 12.5,
            success: true,
            duration_seconds: 3.25,
            n_steps: 40,
            success_count: 1,
            buffer_len: 39,
            avg_critic_loss: 0.5,
            avg_actor_loss: -1.5,
        };
        session.append_result(&record).unwrap();
        session
            .append_result(&EpisodeRecord {
                episode: 2,
                ..record.clone()
            })
            .unwrap();

        let text = fs::read_to_string(session.dir().join("results.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("episode,"));
        assert!(lines[1].starts_with("1, 12.5, true"));
        assert!(lines[2].starts_with("2, 12.5, true"));
    }
}
