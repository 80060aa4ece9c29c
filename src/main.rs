use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use xorshift_recover::app_config::AppConfig;
use xorshift_recover::predict::{
    find_backward, ticks_elapsed, BlinkKind, BlinkSchedule, IntervalSchedule,
};
use xorshift_recover::simulate::{simulate_blinks, simulate_intervals};
use xorshift_recover::{
    BlinkObservation, RecoveryError, Reidentifier, SearchBounds, StateRecovery, Xorshift,
};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// TOML file overriding the built-in tuning values
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// JSON array of blink types (true = double), oldest first
    Blinks,
    /// JSON array of raw tick gaps, warm-up gap first
    Intervals,
    /// JSON array of per-tick blink flags with unobserved advances in between
    Noisy,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SimKind {
    Blinks,
    Intervals,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recovers the state from player blinks
    RecoverBlinks {
        /// JSON array of `{"double": bool, "gap": ticks}` objects
        #[clap(short, long, required = true)]
        input: PathBuf,

        /// Uncontrolled actors drawing one output per tick after the player
        #[clap(long, default_value_t = 0)]
        actors: usize,
    },
    /// Recovers the state from an uncontrolled actor's blink intervals
    RecoverIntervals {
        /// JSON array of durations in seconds
        #[clap(short, long, required = true)]
        input: PathBuf,
    },
    /// Finds how far a known state has advanced
    Reidentify {
        /// Known state: four words or two 64-bit pairs
        #[clap(long, required = true)]
        state: Xorshift,

        #[clap(long, value_enum, default_value = "blinks")]
        mode: Mode,

        #[clap(short, long, required = true)]
        input: PathBuf,

        #[clap(long)]
        min: Option<u64>,

        #[clap(long)]
        max: Option<u64>,

        #[clap(long, default_value_t = 0)]
        actors: usize,
    },
    /// Steps a state forward or backward
    Advance {
        #[clap(long, required = true)]
        state: Xorshift,

        #[clap(short, long, default_value_t = 1)]
        count: u64,

        /// Step backward instead
        #[clap(long)]
        back: bool,
    },
    /// Lists upcoming blinks or actor waits
    Predict {
        #[clap(long, required = true)]
        state: Xorshift,

        #[clap(short, long, default_value_t = 20)]
        count: usize,

        #[clap(long, default_value_t = 0)]
        actors: usize,

        /// Predict uncontrolled actor waits instead of player blinks
        #[clap(long)]
        intervals: bool,

        /// Seconds already elapsed since the state was current
        #[clap(long)]
        elapsed: Option<f64>,
    },
    /// Walks backward to the output that produced a displayed trainer ID
    FindTid {
        #[clap(long, required = true)]
        state: Xorshift,

        /// Six-digit displayed ID
        #[clap(long, required = true)]
        g7tid: u32,

        #[clap(long, default_value_t = 100_000)]
        limit: u64,
    },
    /// Generates observations from a known or random state
    Simulate {
        #[clap(long, value_enum, default_value = "blinks")]
        kind: SimKind,

        /// Starting state, random if omitted
        #[clap(long)]
        state: Option<Xorshift>,

        #[clap(short, long, default_value_t = 40)]
        count: usize,

        #[clap(long, default_value_t = 0)]
        actors: usize,

        /// Write the observations here instead of stdout
        #[clap(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct StateReport {
    words: [String; 4],
    pairs: [String; 2],
    advances: u64,
    distance: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    extras: Option<u64>,
}

impl StateReport {
    fn new(state: &Xorshift, advances: u64, distance: usize, extras: Option<u64>) -> Self {
        Self {
            words: state.words_hex(),
            pairs: state.pairs_hex(),
            advances,
            distance,
            extras,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn Error>> {
    let cfg = match path {
        Some(p) => {
            info!("loading config from {}", p.display());
            AppConfig::from_file(p)?
        }
        None => AppConfig::default(),
    };
    cfg.validate().map_err(RecoveryError::Config)?;
    Ok(cfg)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn Error>> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let cfg = load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::RecoverBlinks { input, actors } => {
            let observations: Vec<BlinkObservation> = read_json(input)?;
            let recovered =
                StateRecovery::new(cfg.recovery).recover_from_blinks(&observations, *actors)?;
            print_json(&StateReport::new(
                &recovered.state,
                recovered.advances,
                recovered.distance,
                None,
            ))
        }
        Commands::RecoverIntervals { input } => {
            let intervals: Vec<f64> = read_json(input)?;
            let recovered = StateRecovery::new(cfg.recovery).recover_from_intervals(&intervals)?;
            print_json(&StateReport::new(
                &recovered.state,
                recovered.advances,
                recovered.distance,
                None,
            ))
        }
        Commands::Reidentify {
            state,
            mode,
            input,
            min,
            max,
            actors,
        } => {
            let default_max = match mode {
                Mode::Noisy => cfg.search.noisy_max,
                _ => cfg.search.bounds.max(),
            };
            let bounds = SearchBounds::new(
                min.unwrap_or(cfg.search.bounds.min()),
                max.unwrap_or(default_max),
            );
            let reident = Reidentifier::new(bounds).with_actors(*actors);
            let found = match mode {
                Mode::Blinks => reident.by_blinks(state, &read_json::<Vec<bool>>(input)?)?,
                Mode::Intervals => reident.by_intervals(state, &read_json::<Vec<u64>>(input)?)?,
                Mode::Noisy => reident.noisy(state, &read_json::<Vec<bool>>(input)?)?,
            };
            let extras = (*mode == Mode::Noisy).then_some(found.extras);
            print_json(&StateReport::new(
                &found.state,
                found.advances,
                found.distance,
                extras,
            ))
        }
        Commands::Advance { state, count, back } => {
            let mut rng = *state;
            if *back {
                rng.retreat(*count);
            } else {
                rng.advance(*count);
            }
            print_json(&StateReport::new(&rng, *count, 0, None))
        }
        Commands::Predict {
            state,
            count,
            actors,
            intervals,
            elapsed,
        } => {
            let mut rng = *state;
            if let Some(secs) = elapsed {
                let ticks = ticks_elapsed(*secs, cfg.timing.tick_seconds);
                info!("skipping {} ticks for {:.3}s elapsed", ticks, secs);
                rng.advance(ticks * (*actors as u64 + 1));
            }
            if *intervals {
                for (i, (wait, at)) in IntervalSchedule::new(rng, cfg.timing.interval_offset)
                    .take(*count)
                    .enumerate()
                {
                    println!("{:>6} wait {:>7.3}s at {:>9.3}s", i + 1, wait, at);
                }
            } else {
                BlinkSchedule::new(rng, cfg.timing.tick_seconds)
                    .with_actors(*actors)
                    .filter(|p| p.kind != BlinkKind::None)
                    .take(*count)
                    .for_each(|p| {
                        println!(
                            "{:>8} {:08X} {:?} at {:>9.3}s",
                            p.advance, p.output, p.kind, p.at
                        )
                    });
            }
            Ok(())
        }
        Commands::FindTid {
            state,
            g7tid,
            limit,
        } => {
            let (steps, found, ids) = find_backward(state, *g7tid, *limit)?;
            println!(
                "{} steps back: g7tid {:06} tid {} sid {}",
                steps, ids.g7tid, ids.tid, ids.sid
            );
            print_json(&StateReport::new(&found, steps, 0, None))
        }
        Commands::Simulate {
            kind,
            state,
            count,
            actors,
            output,
        } => {
            let start = state.unwrap_or_else(|| Xorshift::from_words(rand::random()));
            info!("simulating from {}", start);
            let json = match kind {
                SimKind::Blinks => {
                    let run = simulate_blinks(start, *count, *actors, 1);
                    info!("state before last blink {}", run.last_blink_state);
                    serde_json::to_string_pretty(&run.observations)?
                }
                SimKind::Intervals => {
                    let run =
                        simulate_intervals(start, *count, cfg.recovery.latency_correction);
                    info!("final state {}", run.final_state);
                    serde_json::to_string_pretty(&run.intervals)?
                }
            };
            match output {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{}", json),
            }
            Ok(())
        }
    }
}
