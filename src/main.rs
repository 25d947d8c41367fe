use {
    anyhow::Result,
    candle_core::Device,
    clap::{
        Parser,
        ValueEnum,
    },
    nav_rl::{
        agents::{
            configs::DdpgConfig,
            Algorithm,
            Ddpg,
            RunMode,
        },
        engines::training_loop,
        envs::{
            RetryPolicy,
            RetryingClient,
            ScriptedEnv,
        },
        logging::setup_logging,
        session::SessionStore,
    },
    std::path::PathBuf,
    tracing::Level,
};

#[derive(ValueEnum, Debug, Clone)]
enum Mode {
    Train,
    Eval,
}

#[derive(ValueEnum, Debug, Clone)]
enum Loglevel {
    Error, // put these only during active debugging and then downgrade later
    Warn,  // main events in the program
    Info,  // all the little details
    None,  // don't log anything
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run on CPU rather than on GPU.
    #[arg(long)]
    cpu: bool,

    /// Setup logging
    #[arg(long, value_enum, default_value_t = Loglevel::Warn)]
    log: Loglevel,

    /// Train the policy or evaluate a stored one.
    #[arg(long, value_enum, default_value_t = Mode::Train)]
    mode: Mode,

    /// Directory holding the model sessions.
    #[arg(long, default_value = "model")]
    base_dir: PathBuf,

    /// Resume from an existing session, e.g. "ddpg_0".
    #[arg(long)]
    session: Option<String>,

    /// The checkpoint episode to resume from.
    #[arg(long, default_value_t = 0)]
    episode: usize,

    /// Override the configured number of episodes (0 runs forever).
    #[arg(long)]
    episodes: Option<usize>,

    /// Which simulation stage to train against.
    #[arg(long, default_value_t = 1)]
    stage: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.log {
        Loglevel::Error => setup_logging(&"debug.log", Some(Level::ERROR), Some(Level::ERROR))?,
        Loglevel::Warn => setup_logging(&"debug.log", Some(Level::WARN), Some(Level::WARN))?,
        Loglevel::Info => setup_logging(&"debug.log", Some(Level::INFO), Some(Level::INFO))?,
        Loglevel::None => (),
    };

    let device = if args.cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available(0)?
    };

    let store = SessionStore::new(&args.base_dir);
    let (session, mut agent, start_episode) = match &args.session {
        // resume: rebuild the agent from the checkpoint's own hyperparameters
        Some(name) => {
            let session = store.open_session(name, args.episode)?;
            let mut config: DdpgConfig = session.load_hyperparameters(args.episode)?;
            if let Some(n) = args.episodes {
                config.max_episodes = n;
            }
            let mut agent = Ddpg::from_config(&device, &config)?;
            session.load_checkpoint(&mut *agent, args.episode)?;
            (session, agent, args.episode)
        }
        None => {
            let mut config = DdpgConfig::turtlebot3();
            config.stage = args.stage;
            if let Some(n) = args.episodes {
                config.max_episodes = n;
            }
            let agent = Ddpg::from_config(&device, &config)?;
            (store.new_session()?, agent, 0)
        }
    };

    let mode = match args.mode {
        Mode::Train => RunMode::Train,
        Mode::Eval => RunMode::Eval,
    };

    // The scripted service stands in for the robot transport; a real
    // deployment wires its own EnvironmentService implementation here.
    let mut client = RetryingClient::new(
        ScriptedEnv::new(agent.config().state_size, 500),
        RetryPolicy::default(),
    );

    training_loop(&mut client, &mut *agent, mode, &session, start_episode)?;
    Ok(())
}
