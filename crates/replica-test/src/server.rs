//! Simulated replication server clock
//!
//! Runs a network frame clock at a fixed frequency with an optional drift relative to
//! the client's wall clock, and produces `MsgSceneClock` samples the way a server does.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use replica_core::{MsgSceneClock, NetworkTime};

use crate::chaos::JitterDistribution;

/// Server clock configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Network frames per second
    pub update_frequency: u32,
    /// First frame of the session
    pub start_frame: u64,
    /// Server clock rate relative to client wall time (1.0 = perfect)
    pub drift_rate: f64,
    /// One-way latency the server measures to the client
    pub base_latency: Duration,
    /// Jitter of the server's round trip measurement
    pub rtt_jitter: JitterDistribution,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            update_frequency: 30,
            start_frame: 1000,
            drift_rate: 1.0,
            base_latency: Duration::from_millis(50),
            rtt_jitter: JitterDistribution::None,
        }
    }
}

/// Server frame clock
pub struct SimulatedServer {
    config: ServerConfig,
    rng: StdRng,
    /// Client wall time
    wall_time: Duration,
    last_sent_frame: Option<u64>,
}

impl SimulatedServer {
    pub fn new(config: ServerConfig, seed: u64) -> Self {
        SimulatedServer {
            config,
            rng: StdRng::seed_from_u64(seed),
            wall_time: Duration::ZERO,
            last_sent_frame: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Advance client wall time
    pub fn advance(&mut self, dt: Duration) {
        self.wall_time += dt;
    }

    pub fn wall_time(&self) -> Duration {
        self.wall_time
    }

    /// Exact server time at the current wall time
    pub fn time(&self) -> NetworkTime {
        let frames = self.wall_time.as_secs_f64()
            * self.config.update_frequency as f64
            * self.config.drift_rate;
        NetworkTime::from_server_frame(self.config.start_frame) + frames
    }

    /// Clock sample describing the current server time
    pub fn sample(&mut self) -> MsgSceneClock {
        let now = self.time();
        let frame = u64::try_from(now.frame()).unwrap_or(0);
        let rtt = 2 * self.config.base_latency
            + self.config.rtt_jitter.sample(&mut self.rng)
            + self.config.rtt_jitter.sample(&mut self.rng);

        MsgSceneClock::new(frame)
            .with_sub_frame((now.fraction() as f32).min(MAX_SUB_FRAME))
            .with_round_trip_ms(rtt.as_millis() as u32)
    }

    /// Sample to send if a new frame started since the last one sent
    pub fn poll_frame(&mut self) -> Option<MsgSceneClock> {
        let frame = u64::try_from(self.time().frame()).unwrap_or(0);
        if self.last_sent_frame.is_some_and(|last| last >= frame) {
            return None;
        }
        self.last_sent_frame = Some(frame);
        Some(self.sample())
    }
}

/// Largest f32 below 1.0; an f64 fraction close to 1 would otherwise round up
const MAX_SUB_FRAME: f32 = 1.0 - f32::EPSILON / 2.0;
