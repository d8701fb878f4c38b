//! Replica clock simulator - closed-loop harness for clock testing
//!
//! Simulates:
//! - A server frame clock with drift
//! - Clock samples travelling over a chaos link (encoded on the wire)
//! - A client render loop with irregular frame times
//! - Invariant checks of the client clock on every frame

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use replica_core::{ConfigError, MsgSceneClock, ServerSettings};
use replica_time::{ClientReplicaClock, ClockEvent, ClockSettings};
use replica_wire::WireMessage;
use tracing::info;

use crate::chaos::{ChaosConfig, ChaosLink, JitterDistribution};
use crate::server::{ServerConfig, SimulatedServer};

/// Client render loop timing
#[derive(Clone, Debug)]
pub struct FrameTiming {
    /// Nominal frame duration
    pub frame_time: Duration,
    /// Random variation added to each frame
    pub frame_jitter: JitterDistribution,
    /// Probability of a long frame (hitch)
    pub hitch_prob: f64,
    pub hitch_time: Duration,
}

impl FrameTiming {
    /// Steady 60 FPS
    pub fn steady() -> Self {
        FrameTiming {
            frame_time: Duration::from_micros(16_667),
            frame_jitter: JitterDistribution::None,
            hitch_prob: 0.0,
            hitch_time: Duration::ZERO,
        }
    }

    /// 60 FPS with frame time noise and occasional hitches
    pub fn uneven() -> Self {
        FrameTiming {
            frame_time: Duration::from_micros(14_000),
            frame_jitter: JitterDistribution::Uniform {
                min_ms: 0,
                max_ms: 6,
            },
            hitch_prob: 0.01,
            hitch_time: Duration::from_millis(120),
        }
    }

    fn sample(&self, rng: &mut StdRng) -> Duration {
        let mut dt = self.frame_time + self.frame_jitter.sample(rng);
        if self.hitch_prob > 0.0 && rng.gen::<f64>() < self.hitch_prob {
            dt += self.hitch_time;
        }
        dt
    }
}

/// Simulation scenario
#[derive(Clone, Debug)]
pub struct SimulationConfig {
    pub server: ServerConfig,
    pub link: ChaosConfig,
    pub timing: FrameTiming,
    pub clock: ClockSettings,
    /// Wall time excluded from error statistics while the clock settles
    pub warmup: Duration,
    pub seed: u64,
}

impl SimulationConfig {
    fn with_link(link: ChaosConfig, timing: FrameTiming, seed: u64) -> Self {
        let server = ServerConfig {
            base_latency: link.base_latency + link.jitter.mean(),
            ..ServerConfig::default()
        };
        SimulationConfig {
            server,
            link,
            timing,
            clock: ClockSettings::default(),
            warmup: Duration::from_secs(3),
            seed,
        }
    }

    pub fn good(seed: u64) -> Self {
        Self::with_link(ChaosConfig::good(), FrameTiming::steady(), seed)
    }

    pub fn poor(seed: u64) -> Self {
        let mut config = Self::with_link(ChaosConfig::poor(), FrameTiming::uneven(), seed);
        config.server.rtt_jitter = JitterDistribution::Uniform {
            min_ms: 0,
            max_ms: 20,
        };
        config
    }

    pub fn hostile(seed: u64) -> Self {
        let mut config = Self::with_link(ChaosConfig::hostile(), FrameTiming::uneven(), seed);
        config.server.drift_rate = 1.002;
        config.server.rtt_jitter = JitterDistribution::Pareto {
            scale_ms: 30.0,
            shape: 1.5,
        };
        config
    }
}

/// Statistics of one simulation run
#[derive(Clone, Debug, Default)]
pub struct SimulationResult {
    pub frames: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub malformed_messages: u64,
    /// Frames where `replica <= server <= input` did not hold
    pub ordering_violations: u64,
    /// Frames where input time led server time by less than one frame
    pub input_lead_violations: u64,
    /// Largest server time error after warm-up, in seconds
    pub max_server_error: f64,
    server_error_sum: f64,
    server_error_samples: u64,
    pub new_input_frames: u64,
    pub stale_updates: u64,
    pub desyncs: u64,
    pub final_input_delay: u32,
}

impl SimulationResult {
    /// Mean absolute server time error after warm-up, in seconds
    pub fn avg_server_error(&self) -> f64 {
        if self.server_error_samples == 0 {
            0.0
        } else {
            self.server_error_sum / self.server_error_samples as f64
        }
    }

    fn record_error(&mut self, error: f64) {
        self.max_server_error = self.max_server_error.max(error);
        self.server_error_sum += error;
        self.server_error_samples += 1;
    }
}

/// Closed-loop clock simulation
pub struct ClockSimulator {
    config: SimulationConfig,
    server: SimulatedServer,
    link: ChaosLink<Vec<u8>>,
    clock: ClientReplicaClock,
    rng: StdRng,
    pending: Vec<MsgSceneClock>,
}

impl ClockSimulator {
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        let mut server = SimulatedServer::new(config.server.clone(), config.seed);
        let mut link = ChaosLink::new(config.link.clone(), config.seed.wrapping_add(1));
        let settings: ServerSettings = config.clock.to_server_settings();

        // The session starts when the first sample reaches the client
        let initial = server.sample();
        server.advance(config.link.base_latency);
        link.tick(config.link.base_latency);
        let clock = ClientReplicaClock::new(&initial, &settings)?;

        Ok(ClockSimulator {
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(2)),
            config,
            server,
            link,
            clock,
            pending: Vec::new(),
        })
    }

    pub fn clock(&self) -> &ClientReplicaClock {
        &self.clock
    }

    pub fn server(&self) -> &SimulatedServer {
        &self.server
    }

    pub fn link(&self) -> &ChaosLink<Vec<u8>> {
        &self.link
    }

    /// Run the simulation for a duration of wall time
    pub fn run(&mut self, duration: Duration) -> SimulationResult {
        let mut result = SimulationResult::default();
        while self.server.wall_time() < duration {
            self.step(&mut result);
        }

        result.final_input_delay = self.clock.input_delay();
        info!(
            frames = result.frames,
            max_error_ms = result.max_server_error * 1000.0,
            avg_error_ms = result.avg_server_error() * 1000.0,
            desyncs = result.desyncs,
            stale = result.stale_updates,
            "Clock simulation finished"
        );
        result
    }

    /// Simulate one client frame
    pub fn step(&mut self, result: &mut SimulationResult) {
        let dt = self.config.timing.sample(&mut self.rng);

        self.server.advance(dt);
        for packet in self.link.tick(dt) {
            result.messages_received += 1;
            match MsgSceneClock::decode(&packet.payload) {
                Ok(msg) => self.pending.push(msg),
                Err(_) => result.malformed_messages += 1,
            }
        }

        self.clock
            .apply_time_step(dt.as_secs_f32(), &mut self.pending);
        result.frames += 1;
        self.check(result);

        if let Some(msg) = self.server.poll_frame() {
            if let Ok(body) = msg.to_bytes() {
                self.link.send(body.to_vec());
                result.messages_sent += 1;
            }
        }
    }

    fn check(&mut self, result: &mut SimulationResult) {
        let clock = &self.clock;
        let (replica, server, input) = (
            clock.replica_time(),
            clock.server_time(),
            clock.input_time(),
        );
        if !(replica <= server && server <= input) {
            result.ordering_violations += 1;
        }
        if input - server < 1.0 - 1e-6 {
            result.input_lead_violations += 1;
        }
        if clock.is_new_input_frame() {
            result.new_input_frames += 1;
        }

        for event in self.clock.take_events() {
            match event {
                ClockEvent::StaleUpdate { .. } => result.stale_updates += 1,
                ClockEvent::Desync { .. } => result.desyncs += 1,
            }
        }

        if self.server.wall_time() >= self.config.warmup {
            let error = (self.clock.server_time() - self.server.time()).abs()
                / self.config.server.update_frequency as f64;
            result.record_error(error);
        }
    }
}
