use std::{fmt, str::FromStr};

use crate::{actor::ActorId, error::AutonomyError, request::RandomizationOverride};

use super::AutonomyService;

/// Debug command accepted by the autonomy console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `autonomy.queue_depth`
    QueueDepth,
    /// `autonomy.list_queue`
    ListQueue,
    /// `autonomy.log_next <actor>`
    LogNext(ActorId),
    /// `autonomy.randomization <on|off|inherit>`
    Randomization(RandomizationOverride),
    /// `stats.lock_decay <stat>`
    LockDecay(String),
    /// `stats.unlock_decay <stat>`
    UnlockDecay(String),
    /// `autonomy.metrics`
    Metrics,
}

impl FromStr for ConsoleCommand {
    type Err = AutonomyError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words
            .next()
            .ok_or_else(|| AutonomyError::Config("empty console command".into()))?;
        let arg = words.next();
        if words.next().is_some() {
            return Err(AutonomyError::Config(format!("too many arguments for {name}")));
        }
        let required = |what: &str| {
            arg.ok_or_else(|| AutonomyError::Config(format!("{name} expects {what}")))
        };
        let command = match name {
            "autonomy.queue_depth" => Self::QueueDepth,
            "autonomy.list_queue" => Self::ListQueue,
            "autonomy.metrics" => Self::Metrics,
            "autonomy.log_next" => {
                let raw = required("an actor id")?;
                let actor = raw
                    .parse()
                    .map_err(|_| AutonomyError::Config(format!("invalid actor id '{raw}'")))?;
                Self::LogNext(actor)
            }
            "autonomy.randomization" => {
                let raw = required("on, off or inherit")?;
                let setting = RandomizationOverride::parse(raw).ok_or_else(|| {
                    AutonomyError::Config(format!("invalid randomization setting '{raw}'"))
                })?;
                Self::Randomization(setting)
            }
            "stats.lock_decay" => Self::LockDecay(required("a stat name")?.to_owned()),
            "stats.unlock_decay" => Self::UnlockDecay(required("a stat name")?.to_owned()),
            other => return Err(AutonomyError::Config(format!("unknown command '{other}'"))),
        };
        if arg.is_some()
            && matches!(command, Self::QueueDepth | Self::ListQueue | Self::Metrics)
        {
            return Err(AutonomyError::Config(format!("{name} takes no arguments")));
        }
        Ok(command)
    }
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueDepth => f.write_str("autonomy.queue_depth"),
            Self::ListQueue => f.write_str("autonomy.list_queue"),
            Self::LogNext(actor) => write!(f, "autonomy.log_next {actor}"),
            Self::Randomization(setting) => write!(f, "autonomy.randomization {setting:?}"),
            Self::LockDecay(stat) => write!(f, "stats.lock_decay {stat}"),
            Self::UnlockDecay(stat) => write!(f, "stats.unlock_decay {stat}"),
            Self::Metrics => f.write_str("autonomy.metrics"),
        }
    }
}

impl ConsoleCommand {
    /// Runs the command and returns printable output.
    pub fn execute(&self, service: &AutonomyService) -> Result<String, AutonomyError> {
        let output = match self {
            Self::QueueDepth => format!("autonomy queue depth: {}", service.queue_depth()),
            Self::ListQueue => {
                let queued = service.queued_actor_ids();
                if queued.is_empty() {
                    "autonomy queue is empty".to_owned()
                } else {
                    let active = service
                        .active_actor()
                        .map_or_else(String::new, |actor| format!(" (active: {actor})"));
                    let ids: Vec<String> = queued.iter().map(ToString::to_string).collect();
                    format!("autonomy queue{active}: {}", ids.join(", "))
                }
            }
            Self::LogNext(actor) => {
                service.log_next_decision(*actor);
                format!("next decision for actor {actor} will be logged")
            }
            Self::Randomization(setting) => {
                service.set_randomization_override(*setting);
                format!("autonomy randomization override: {setting:?}")
            }
            Self::LockDecay(stat) => {
                if service.lock_decay(stat) {
                    format!("decay locked for {stat}")
                } else {
                    format!("decay already locked for {stat}")
                }
            }
            Self::UnlockDecay(stat) => {
                if service.unlock_decay(stat) {
                    format!("decay unlocked for {stat}")
                } else {
                    format!("decay was not locked for {stat}")
                }
            }
            Self::Metrics => serde_json::to_string_pretty(&service.metrics())
                .map_err(|err| AutonomyError::Internal(err.to_string()))?,
        };
        Ok(output)
    }
}

/// Parses and runs one console line.
pub fn run_command(service: &AutonomyService, line: &str) -> Result<String, AutonomyError> {
    line.parse::<ConsoleCommand>()?.execute(service)
}
