use std::fmt;
use std::str::FromStr;

/// Errors raised while building a limiter. Fatal at startup, never per request.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("capacity must be a positive finite number, got {0}")]
    InvalidCapacity(f64),

    #[error("rate must be a positive finite number, got {0}")]
    InvalidRate(f64),

    #[error("unknown algorithm {0:?}, expected \"token\" or \"leaky\"")]
    UnknownAlgorithm(String),
}

/// Which bucket algorithm a [`crate::Limiter`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Tokens refill continuously; a request spends one.
    Token,
    /// Water drains continuously; a request pours one unit in.
    Leaky,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Leaky => "leaky",
        }
    }

    /// Human readable name, e.g. `Token Bucket`.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Token => "Token Bucket",
            Self::Leaky => "Leaky Bucket",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(Self::Token),
            "leaky" => Ok(Self::Leaky),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Validated limiter configuration, read once at construction.
///
/// `rate` is the refill rate for [`Algorithm::Token`] and the leak rate for
/// [`Algorithm::Leaky`], in units per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LimiterConfig {
    algorithm: Algorithm,
    capacity: f64,
    rate: f64,
}

impl LimiterConfig {
    pub fn new(algorithm: Algorithm, capacity: f64, rate: f64) -> Result<Self, ConfigError> {
        validate(capacity, rate)?;
        Ok(Self {
            algorithm,
            capacity,
            rate,
        })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

pub(crate) fn validate(capacity: f64, rate: f64) -> Result<(), ConfigError> {
    if !(capacity.is_finite() && capacity > 0.0) {
        return Err(ConfigError::InvalidCapacity(capacity));
    }
    if !(rate.is_finite() && rate > 0.0) {
        return Err(ConfigError::InvalidRate(rate));
    }
    Ok(())
}
