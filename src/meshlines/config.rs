//! Runtime configuration.

use crate::meshlines::error::{MeshError, MeshResult};

/// Environment variable naming the default world size
pub const RANKS_ENV: &str = "MESHLINES_RANKS";

/// Settings for the in-process rank world
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of ranks operations run across
    pub ranks: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig { ranks: 1 }
    }
}

impl RuntimeConfig {
    /// Resolve the world size from the environment, falling back to one rank
    pub fn from_env() -> Self {
        match std::env::var(RANKS_ENV) {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(ranks) if ranks >= 1 => RuntimeConfig { ranks },
                _ => {
                    log::warn!(
                        "ignoring {}={:?}: expected a positive rank count",
                        RANKS_ENV,
                        raw
                    );
                    RuntimeConfig::default()
                }
            },
            Err(_) => RuntimeConfig::default(),
        }
    }

    /// Explicit world size, validated
    pub fn with_ranks(ranks: usize) -> MeshResult<Self> {
        if ranks == 0 {
            return Err(MeshError::configuration(
                "world size must be at least one rank",
            ));
        }
        Ok(RuntimeConfig { ranks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_ranks_is_rejected() {
        assert!(RuntimeConfig::with_ranks(0).is_err());
        assert_eq!(RuntimeConfig::with_ranks(4).unwrap().ranks, 4);
    }

    #[test]
    fn default_is_a_single_rank() {
        assert_eq!(RuntimeConfig::default().ranks, 1);
    }
}
