use {
    super::{
        configs::DdpgConfig,
        AgentState,
        Algorithm,
        LearnStep,
        OffPolicyAlgorithm,
        RunMode,
        SaveableAlgorithm,
    },
    crate::{
        components::{
            OuNoise,
            ReplayBuffer,
            Transition,
            TransitionBatch,
        },
        error::TrainError,
    },
    candle_core::{
        DType,
        Device,
        Error,
        Module,
        Result,
        Tensor,
        Var,
    },
    candle_nn::{
        linear,
        sequential::seq,
        Activation,
        AdamW,
        Linear,
        Optimizer,
        ParamsAdamW,
        Sequential,
        VarBuilder,
        VarMap,
    },
    std::path::Path,
    tracing::info,
};

/// Exponentially-smoothed parameter copy from the online network into its
/// target copy: `target = tau * online + (1 - tau) * target`, per parameter.
///
/// With `tau = 1` this is the hard copy used to initialize the targets at
/// construction. Must stay exact: no momentum, no clipping.
fn soft_update(
    varmap: &mut VarMap,
    vb: &VarBuilder,
    target_prefix: &str,
    network_prefix: &str,
    dims: &[(usize, usize)],
    tau: f64,
) -> Result<()> {
    for (i, &(in_dim, out_dim)) in dims.iter().enumerate() {
        let target_w = vb.get((out_dim, in_dim), &format!("{target_prefix}-fc{i}.weight"))?;
        let network_w = vb.get((out_dim, in_dim), &format!("{network_prefix}-fc{i}.weight"))?;
        varmap.set_one(
            format!("{target_prefix}-fc{i}.weight"),
            ((tau * network_w)? + ((1.0 - tau) * target_w)?)?,
        )?;

        let target_b = vb.get(out_dim, &format!("{target_prefix}-fc{i}.bias"))?;
        let network_b = vb.get(out_dim, &format!("{network_prefix}-fc{i}.bias"))?;
        varmap.set_one(
            format!("{target_prefix}-fc{i}.bias"),
            ((tau * network_b)? + ((1.0 - tau) * target_b)?)?,
        )?;
    }
    Ok(())
}

/// The bootstrapped critic regression target:
/// `r + (1 - done) * gamma * Q'(s', P'(s'))`.
///
/// `not_done` is 0 on terminal transitions, so those targets are exactly the
/// reward and no future value propagates past an episode boundary.
fn bootstrap_targets(
    rewards: &Tensor,
    not_done: &Tensor,
    gamma: f64,
    next_q: &Tensor,
) -> Result<Tensor> {
    rewards + (not_done * (next_q * gamma)?)?
}

/// Smooth-L1 (Huber) regression loss, mean-reduced over the batch.
fn smooth_l1(pred: &Tensor, target: &Tensor) -> Result<Tensor> {
    let diff = (pred - target)?;
    let abs = diff.abs()?;
    let quadratic = (diff.sqr()? * 0.5)?;
    let linear = (&abs - 0.5)?;
    let mask = abs.le(&abs.ones_like()?)?;
    mask.where_cond(&quadratic, &linear)?.mean_all()
}

/// Clamp a proposed (linear, angular) velocity pair to the robot's bounds:
/// forward speed in `[0, v_max]`, turn rate in `[-w_max, w_max]`.
fn clamp_action(action: &mut [f64], v_max: f64, w_max: f64) {
    action[0] = action[0].clamp(0.0, v_max);
    action[1] = action[1].clamp(-w_max, w_max);
}

/// The policy network: a two-hidden-layer MLP whose head maps the first
/// output through a sigmoid scaled to `[0, v_max]` (forward speed) and the
/// second through a tanh scaled to `[-w_max, w_max]` (angular speed).
struct PolicyNet {
    fc0: Linear,
    fc1: Linear,
    fc2: Linear,
}

impl PolicyNet {
    fn forward(&self, state: &Tensor, v_max: f64, w_max: f64) -> Result<Tensor> {
        let xs = self.fc0.forward(state)?.relu()?;
        let xs = self.fc1.forward(&xs)?.relu()?;
        let xs = self.fc2.forward(&xs)?;
        let v = (candle_nn::ops::sigmoid(&xs.narrow(1, 0, 1)?)? * v_max)?;
        let w = (xs.narrow(1, 1, 1)?.tanh()? * w_max)?;
        Tensor::cat(&[&v, &w], 1)
    }
}

#[allow(dead_code)]
struct Actor<'a> {
    varmap: VarMap,
    vb: VarBuilder<'a>,
    network: PolicyNet,
    target_network: PolicyNet,
    dims: Vec<(usize, usize)>,
    action_limit_v: f64,
    action_limit_w: f64,
}

impl Actor<'_> {
    fn new(
        device: &Device,
        dtype: DType,
        dims: &[(usize, usize)],
        action_limit_v: f64,
        action_limit_w: f64,
    ) -> Result<Self> {
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, dtype, device);

        let make_network = |prefix: &str| {
            Ok::<PolicyNet, Error>(PolicyNet {
                fc0: linear(dims[0].0, dims[0].1, vb.pp(format!("{prefix}-fc0")))?,
                fc1: linear(dims[1].0, dims[1].1, vb.pp(format!("{prefix}-fc1")))?,
                fc2: linear(dims[2].0, dims[2].1, vb.pp(format!("{prefix}-fc2")))?,
            })
        };

        let network = make_network("actor")?;
        let target_network = make_network("target-actor")?;

        // hard copy, the targets start out equal to the online networks
        soft_update(&mut varmap, &vb, "target-actor", "actor", dims, 1.0)?;

        Ok(Self {
            varmap,
            vb,
            network,
            target_network,
            dims: dims.to_vec(),
            action_limit_v,
            action_limit_w,
        })
    }

    fn forward(&self, state: &Tensor) -> Result<Tensor> {
        self.network
            .forward(state, self.action_limit_v, self.action_limit_w)
    }

    fn target_forward(&self, state: &Tensor) -> Result<Tensor> {
        self.target_network
            .forward(state, self.action_limit_v, self.action_limit_w)
    }

    fn track(&mut self, tau: f64) -> Result<()> {
        soft_update(
            &mut self.varmap,
            &self.vb,
            "target-actor",
            "actor",
            &self.dims,
            tau,
        )
    }
}

#[allow(dead_code)]
struct Critic<'a> {
    varmap: VarMap,
    vb: VarBuilder<'a>,
    network: Sequential,
    target_network: Sequential,
    dims: Vec<(usize, usize)>,
}

impl Critic<'_> {
    fn new(device: &Device, dtype: DType, dims: &[(usize, usize)]) -> Result<Self> {
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, dtype, device);

        let make_network = |prefix: &str| {
            let seq = seq()
                .add(linear(
                    dims[0].0,
                    dims[0].1,
                    vb.pp(format!("{prefix}-fc0")),
                )?)
                .add(Activation::Relu)
                .add(linear(
                    dims[1].0,
                    dims[1].1,
                    vb.pp(format!("{prefix}-fc1")),
                )?)
                .add(Activation::Relu)
                .add(linear(
                    dims[2].0,
                    dims[2].1,
                    vb.pp(format!("{prefix}-fc2")),
                )?);
            Ok::<Sequential, Error>(seq)
        };

        let network = make_network("critic")?;
        let target_network = make_network("target-critic")?;

        // hard copy, the targets start out equal to the online networks
        soft_update(&mut varmap, &vb, "target-critic", "critic", dims, 1.0)?;

        Ok(Self {
            varmap,
            vb,
            network,
            target_network,
            dims: dims.to_vec(),
        })
    }

    fn forward(&self, state: &Tensor, action: &Tensor) -> Result<Tensor> {
        let xs = Tensor::cat(&[action, state], 1)?;
        self.network.forward(&xs)
    }

    fn target_forward(&self, state: &Tensor, action: &Tensor) -> Result<Tensor> {
        let xs = Tensor::cat(&[action, state], 1)?;
        self.target_network.forward(&xs)
    }

    fn track(&mut self, tau: f64) -> Result<()> {
        soft_update(
            &mut self.varmap,
            &self.vb,
            "target-critic",
            "critic",
            &self.dims,
            tau,
        )
    }
}

/// A DDPG agent for differential-drive navigation: owns the replay buffer,
/// the exploration-noise process and both actor-critic network pairs.
pub struct Ddpg<'a> {
    config: DdpgConfig,
    actor: Actor<'a>,
    actor_optim: AdamW,
    critic: Critic<'a>,
    critic_optim: AdamW,
    replay_buffer: ReplayBuffer,
    ou_noise: OuNoise,
    global_step: usize,
    device: Device,
}

impl Ddpg<'_> {
    fn batch_to_tensors(
        &self,
        batch: &TransitionBatch,
    ) -> std::result::Result<(Tensor, Tensor, Tensor, Tensor, Tensor), TrainError> {
        let batch_size = batch.rewards.len();
        let state_size = self.config.state_size;
        let action_size = self.config.action_size;

        // Validate every row before touching either network, so a malformed
        // batch can never partially apply an update.
        for row in batch.states.iter().chain(batch.next_states.iter()) {
            if row.len() != state_size {
                return Err(TrainError::ShapeMismatch {
                    context: "batch state",
                    expected: state_size,
                    got: row.len(),
                });
            }
        }
        for row in batch.actions.iter() {
            if row.len() != action_size {
                return Err(TrainError::ShapeMismatch {
                    context: "batch action",
                    expected: action_size,
                    got: row.len(),
                });
            }
        }

        let flatten =
            |rows: &[Vec<f64>]| rows.iter().flatten().copied().collect::<Vec<f64>>();

        let states = Tensor::from_vec(
            flatten(&batch.states),
            (batch_size, state_size),
            &self.device,
        )?;
        let actions = Tensor::from_vec(
            flatten(&batch.actions),
            (batch_size, action_size),
            &self.device,
        )?;
        let rewards =
            Tensor::from_vec(batch.rewards.clone(), (batch_size, 1), &self.device)?;
        let next_states = Tensor::from_vec(
            flatten(&batch.next_states),
            (batch_size, state_size),
            &self.device,
        )?;
        let not_done = Tensor::from_vec(
            batch
                .dones
                .iter()
                .map(|done| if *done { 0.0 } else { 1.0 })
                .collect::<Vec<f64>>(),
            (batch_size, 1),
            &self.device,
        )?;

        Ok((states, actions, rewards, next_states, not_done))
    }
}

impl Algorithm for Ddpg<'_> {
    type Config = DdpgConfig;

    fn from_config(
        device: &Device,
        config: &DdpgConfig,
    ) -> std::result::Result<Box<Self>, TrainError> {
        // The policy head is a (linear, angular) velocity pair.
        if config.action_size != 2 {
            return Err(TrainError::ShapeMismatch {
                context: "policy head",
                expected: 2,
                got: config.action_size,
            });
        }

        let filter_by_prefix = |varmap: &VarMap, prefix: &str| {
            varmap
                .data()
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(name, var)| name.starts_with(prefix).then_some(var.clone()))
                .collect::<Vec<Var>>()
        };

        let actor = Actor::new(
            device,
            DType::F64,
            &[
                (config.state_size, config.hidden_1_size),
                (config.hidden_1_size, config.hidden_2_size),
                (config.hidden_2_size, config.action_size),
            ],
            config.action_limit_v,
            config.action_limit_w,
        )?;
        let actor_optim = AdamW::new(
            filter_by_prefix(&actor.varmap, "actor"),
            ParamsAdamW {
                lr: config.actor_learning_rate,
                ..Default::default()
            },
        )?;

        let critic = Critic::new(
            device,
            DType::F64,
            &[
                (config.state_size + config.action_size, config.hidden_1_size),
                (config.hidden_1_size, config.hidden_2_size),
                (config.hidden_2_size, 1),
            ],
        )?;
        let critic_optim = AdamW::new(
            filter_by_prefix(&critic.varmap, "critic"),
            ParamsAdamW {
                lr: config.critic_learning_rate,
                ..Default::default()
            },
        )?;

        Ok(Box::new(Self {
            actor,
            actor_optim,
            critic,
            critic_optim,
            replay_buffer: ReplayBuffer::new(config.replay_buffer_capacity),
            ou_noise: OuNoise::new(
                config.action_size,
                config.ou_theta,
                config.ou_sigma_max,
                config.ou_sigma_min,
                config.ou_decay_period,
            ),
            global_step: 0,
            device: device.clone(),
            config: config.clone(),
        }))
    }

    fn config(&self) -> &DdpgConfig {
        &self.config
    }

    fn select_action(
        &mut self,
        state: &[f64],
        mode: RunMode,
    ) -> std::result::Result<Vec<f64>, TrainError> {
        if state.len() != self.config.state_size {
            return Err(TrainError::ShapeMismatch {
                context: "state vector",
                expected: self.config.state_size,
                got: state.len(),
            });
        }

        // Candle assumes a batch dimension, so pretend we have one.
        let state = Tensor::from_slice(state, (1, self.config.state_size), &self.device)?;
        let mut action = self.actor.forward(&state)?.squeeze(0)?.to_vec1::<f64>()?;

        if let RunMode::Train = mode {
            let noise = self.ou_noise.sample(self.global_step);
            action[0] += noise[0] * self.config.action_limit_v / 2.0;
            action[1] += noise[1] * self.config.action_limit_w;
            self.global_step += 1;
        }
        clamp_action(
            &mut action,
            self.config.action_limit_v,
            self.config.action_limit_w,
        );
        Ok(action)
    }

    fn learn(&mut self) -> std::result::Result<Option<LearnStep>, TrainError> {
        let batch = match self.replay_buffer.sample(self.config.training_batch_size) {
            Ok(batch) => batch,
            Err(TrainError::InsufficientData { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        let (states, actions, rewards, next_states, not_done) =
            self.batch_to_tensors(&batch)?;

        // Critic regression against the slowly-moving target pair.
        let next_actions = self.actor.target_forward(&next_states)?.detach()?;
        let next_q = self.critic.target_forward(&next_states, &next_actions)?.detach()?;
        let q_target = bootstrap_targets(&rewards, &not_done, self.config.gamma, &next_q)?;
        let q = self.critic.forward(&states, &actions)?;
        let critic_loss = smooth_l1(&q, &q_target)?;
        self.critic_optim.backward_step(&critic_loss)?;

        // Deterministic policy gradient: ascend the critic's score of the
        // policy's own action.
        let actor_loss = self
            .critic
            .forward(&states, &self.actor.forward(&states)?)?
            .mean_all()?
            .neg()?;
        self.actor_optim.backward_step(&actor_loss)?;

        self.critic.track(self.config.tau)?;
        self.actor.track(self.config.tau)?;

        Ok(Some(LearnStep {
            critic_loss: critic_loss.to_scalar::<f64>()?,
            actor_loss: actor_loss.to_scalar::<f64>()?,
        }))
    }

    fn reset_noise(&mut self) {
        self.ou_noise.reset();
    }

    fn action_size(&self) -> usize {
        self.config.action_size
    }
}

impl OffPolicyAlgorithm for Ddpg<'_> {
    fn remember(&mut self, transition: Transition) {
        info!(
            reward = transition.reward,
            done = transition.done,
            "pushing transition to replay buffer",
        );
        self.replay_buffer.add_sample(transition);
    }

    fn replay_buffer(&self) -> &ReplayBuffer {
        &self.replay_buffer
    }
}

impl SaveableAlgorithm for Ddpg<'_> {
    /// Write both varmaps as safetensors; each carries the online and target
    /// tensors of its pair, so a resumed agent gets both back exactly.
    fn save_weights(&self, dir: &Path) -> std::result::Result<(), TrainError> {
        self.actor.varmap.save(dir.join("actor.safetensors"))?;
        self.critic.varmap.save(dir.join("critic.safetensors"))?;
        Ok(())
    }

    fn load_weights(&mut self, dir: &Path) -> std::result::Result<(), TrainError> {
        self.actor.varmap.load(dir.join("actor.safetensors"))?;
        self.critic.varmap.load(dir.join("critic.safetensors"))?;
        Ok(())
    }

    fn snapshot_state(&self) -> AgentState {
        AgentState {
            replay_buffer: self.replay_buffer.clone(),
            noise: self.ou_noise.clone(),
            global_step: self.global_step,
        }
    }

    fn restore_state(&mut self, state: AgentState) {
        self.replay_buffer = state.replay_buffer;
        self.ou_noise = state.noise;
        self.global_step = state.global_step;
    }
}
