use std::net::SocketAddr;
use std::time::Duration;

use bucket_limit::ConfigError;
use bucket_limit::LimiterConfig;
use clap::Parser;

/// Command line and environment configuration, read once at startup.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "HTTP endpoint with per-identity rate limiting")]
pub struct Cli {
    /// Rate limiting algorithm: "token" or "leaky"
    #[arg(long, env = "BUCKET_ALGORITHM", default_value = "leaky")]
    pub algorithm: String,

    /// Largest burst a single identity may send
    #[arg(long, env = "BUCKET_CAPACITY", default_value_t = 5.0)]
    pub capacity: f64,

    /// Refill (token) or leak (leaky) rate, per second
    #[arg(long, env = "BUCKET_RATE", default_value_t = 1.0)]
    pub rate: f64,

    /// Address to listen on
    #[arg(long, env = "BUCKET_LISTEN", default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    /// How often idle identities are swept, e.g. "30s" or "5m"
    #[arg(
        long,
        env = "BUCKET_SWEEP_INTERVAL",
        default_value = "60s",
        value_parser = humantime::parse_duration
    )]
    pub sweep_interval: Duration,
}

impl Cli {
    /// Validates the limiter part of the configuration.
    pub fn limiter_config(&self) -> Result<LimiterConfig, ConfigError> {
        LimiterConfig::new(self.algorithm.parse()?, self.capacity, self.rate)
    }
}
