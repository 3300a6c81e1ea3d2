//! Run configuration: search mode and thresholds, set once before any
//! worker starts and shared by reference for the rest of the process.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const MIN_SEED_LENGTH: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Maximal exact matches, accepted by minimum length.
    Mem,
    /// Seed-and-extend with BLOSUM-scored mismatches, accepted by minimum score.
    Greedy,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Mem => write!(f, "mem"),
            Mode::Greedy => write!(f, "greedy"),
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mem" => Ok(Mode::Mem),
            // kaiju accepts both spellings
            "greedy" | "greedyblosum" => Ok(Mode::Greedy),
            other => Err(ConfigError::Mode(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("run mode (-a) must be \"mem\" or \"greedy\", got {0:?}")]
    Mode(String),
    #[error("minimum match length (-m) must be greater than 0")]
    MinMatchLength,
    #[error("minimum match score (-s) must be greater than 0")]
    MinScore,
    #[error("seed length (-l) must be at least {MIN_SEED_LENGTH}")]
    SeedLength,
    #[error("number of threads (-z) must be greater than 0")]
    NumThreads,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: Mode,
    /// Minimum accepted match length in MEM mode.
    pub min_match_length: usize,
    /// Minimum accepted BLOSUM score in greedy mode.
    pub min_score: i32,
    pub seed_length: usize,
    /// Maximum substitutions permitted within one greedy match.
    pub mismatches: u32,
    pub num_threads: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            mode: Mode::Mem,
            min_match_length: 11,
            min_score: 65,
            seed_length: 7,
            mismatches: 0,
            num_threads: 1,
        }
    }
}

impl RunConfig {
    /// Startup-time validation; violating any constraint is a
    /// configuration error, never a runtime one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_match_length == 0 {
            return Err(ConfigError::MinMatchLength);
        }
        if self.min_score <= 0 {
            return Err(ConfigError::MinScore);
        }
        if self.seed_length < MIN_SEED_LENGTH {
            return Err(ConfigError::SeedLength);
        }
        if self.num_threads == 0 {
            return Err(ConfigError::NumThreads);
        }
        Ok(())
    }
}
