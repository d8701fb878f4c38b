//! Chaos link for replication testing
//!
//! Simulates hostile network conditions on a one-way link:
//! - Jitter
//! - Packet loss (random and burst)
//! - Reordering
//! - Duplication

use std::time::Duration;

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Jitter distribution type
#[derive(Clone, Debug)]
pub enum JitterDistribution {
    /// No jitter
    None,
    /// Uniform distribution
    Uniform { min_ms: u32, max_ms: u32 },
    /// Normal distribution (mean, stddev)
    Normal { mean_ms: f64, stddev_ms: f64 },
    /// Pareto distribution (heavy tail)
    Pareto { scale_ms: f64, shape: f64 },
}

impl JitterDistribution {
    /// Sample a jitter value
    pub fn sample(&self, rng: &mut StdRng) -> Duration {
        match self {
            JitterDistribution::None => Duration::ZERO,
            JitterDistribution::Uniform { min_ms, max_ms } => {
                let dist = Uniform::new_inclusive(*min_ms, (*max_ms).max(*min_ms));
                Duration::from_millis(dist.sample(rng) as u64)
            }
            JitterDistribution::Normal { mean_ms, stddev_ms } => {
                // Box-Muller transform
                let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                let u2: f64 = rng.gen();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                let value = mean_ms + stddev_ms * z;
                Duration::from_micros((value.max(0.0) * 1000.0) as u64)
            }
            JitterDistribution::Pareto { scale_ms, shape } => {
                let u: f64 = rng.gen_range(f64::EPSILON..1.0);
                let value = scale_ms / u.powf(1.0 / shape) - scale_ms;
                // Cap at 1 second
                Duration::from_micros((value.min(1000.0) * 1000.0) as u64)
            }
        }
    }

    /// Expected jitter, used to model what the server reports as round trip
    pub fn mean(&self) -> Duration {
        let ms = match self {
            JitterDistribution::None => 0.0,
            JitterDistribution::Uniform { min_ms, max_ms } => (*min_ms + *max_ms) as f64 / 2.0,
            JitterDistribution::Normal { mean_ms, .. } => mean_ms.max(0.0),
            JitterDistribution::Pareto { scale_ms, shape } if *shape > 1.0 => {
                scale_ms / (shape - 1.0)
            }
            JitterDistribution::Pareto { .. } => 1000.0,
        };
        Duration::from_micros((ms * 1000.0) as u64)
    }
}

/// Link chaos configuration
#[derive(Clone, Debug)]
pub struct ChaosConfig {
    /// Base one-way latency
    pub base_latency: Duration,
    /// Jitter distribution
    pub jitter: JitterDistribution,
    /// Packet loss rate (0.0 - 1.0)
    pub loss_rate: f64,
    /// Burst loss probability
    pub burst_loss_prob: f64,
    /// Burst loss length range
    pub burst_length: (u32, u32),
    /// Reorder probability
    pub reorder_prob: f64,
    /// Extra delay applied to a reordered packet
    pub reorder_delay: Duration,
    /// Duplicate probability
    pub duplicate_prob: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(50),
            jitter: JitterDistribution::Uniform {
                min_ms: 0,
                max_ms: 20,
            },
            loss_rate: 0.01,
            burst_loss_prob: 0.01,
            burst_length: (2, 5),
            reorder_prob: 0.02,
            reorder_delay: Duration::from_millis(40),
            duplicate_prob: 0.01,
        }
    }
}

impl ChaosConfig {
    /// Lossless link with fixed latency
    pub fn ideal(latency: Duration) -> Self {
        ChaosConfig {
            base_latency: latency,
            jitter: JitterDistribution::None,
            loss_rate: 0.0,
            burst_loss_prob: 0.0,
            burst_length: (0, 0),
            reorder_prob: 0.0,
            reorder_delay: Duration::ZERO,
            duplicate_prob: 0.0,
        }
    }

    /// Good network conditions
    pub fn good() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(20),
            jitter: JitterDistribution::Uniform {
                min_ms: 0,
                max_ms: 10,
            },
            loss_rate: 0.001,
            burst_loss_prob: 0.001,
            burst_length: (1, 2),
            reorder_prob: 0.01,
            reorder_delay: Duration::from_millis(15),
            duplicate_prob: 0.001,
        }
    }

    /// Poor network conditions
    pub fn poor() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(80),
            jitter: JitterDistribution::Normal {
                mean_ms: 20.0,
                stddev_ms: 15.0,
            },
            loss_rate: 0.05,
            burst_loss_prob: 0.02,
            burst_length: (3, 8),
            reorder_prob: 0.05,
            reorder_delay: Duration::from_millis(50),
            duplicate_prob: 0.02,
        }
    }

    /// Hostile network conditions
    pub fn hostile() -> Self {
        ChaosConfig {
            base_latency: Duration::from_millis(150),
            jitter: JitterDistribution::Pareto {
                scale_ms: 30.0,
                shape: 1.5,
            },
            loss_rate: 0.15,
            burst_loss_prob: 0.05,
            burst_length: (5, 15),
            reorder_prob: 0.2,
            reorder_delay: Duration::from_millis(100),
            duplicate_prob: 0.05,
        }
    }
}

/// Packet travelling through the link
#[derive(Clone, Debug)]
pub struct ChaosPacket<T> {
    pub payload: T,
    /// Scheduled delivery time (relative to start)
    pub delivery_time: Duration,
    /// Original send time
    pub send_time: Duration,
    /// Sequence number (for tracking)
    pub seq: u64,
}

/// Link statistics
#[derive(Clone, Debug, Default)]
pub struct ChaosStats {
    pub packets_sent: u64,
    pub packets_delivered: u64,
    pub packets_lost: u64,
    pub packets_reordered: u64,
    pub packets_duplicated: u64,
    pub total_latency_ms: u64,
    pub max_latency_ms: u64,
}

impl ChaosStats {
    pub fn loss_rate(&self) -> f64 {
        if self.packets_sent == 0 {
            0.0
        } else {
            self.packets_lost as f64 / self.packets_sent as f64
        }
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.packets_delivered == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.packets_delivered as f64
        }
    }
}

/// One-way chaos link
pub struct ChaosLink<T> {
    config: ChaosConfig,
    rng: StdRng,
    /// Packets in flight, in send order
    in_flight: Vec<ChaosPacket<T>>,
    /// Current time
    current_time: Duration,
    /// Burst loss counter
    burst_remaining: u32,
    next_seq: u64,
    stats: ChaosStats,
}

impl<T: Clone> ChaosLink<T> {
    /// Create a new link with seed
    pub fn new(config: ChaosConfig, seed: u64) -> Self {
        ChaosLink {
            config,
            rng: StdRng::seed_from_u64(seed),
            in_flight: Vec::new(),
            current_time: Duration::ZERO,
            burst_remaining: 0,
            next_seq: 0,
            stats: ChaosStats::default(),
        }
    }

    pub fn config(&self) -> &ChaosConfig {
        &self.config
    }

    /// Send a packet at the current time
    pub fn send(&mut self, payload: T) {
        self.stats.packets_sent += 1;
        let seq = self.next_seq;
        self.next_seq += 1;

        if self.should_drop() {
            self.stats.packets_lost += 1;
            return;
        }

        let mut latency = self.config.base_latency + self.config.jitter.sample(&mut self.rng);
        if self.rng.gen::<f64>() < self.config.reorder_prob {
            latency += self.config.reorder_delay;
            self.stats.packets_reordered += 1;
        }

        if self.rng.gen::<f64>() < self.config.duplicate_prob {
            let dup_latency = latency + self.config.jitter.sample(&mut self.rng);
            self.in_flight.push(ChaosPacket {
                payload: payload.clone(),
                delivery_time: self.current_time + dup_latency,
                send_time: self.current_time,
                seq,
            });
            self.stats.packets_duplicated += 1;
        }

        self.in_flight.push(ChaosPacket {
            payload,
            delivery_time: self.current_time + latency,
            send_time: self.current_time,
            seq,
        });
    }

    fn should_drop(&mut self) -> bool {
        if self.burst_remaining > 0 {
            self.burst_remaining -= 1;
            return true;
        }

        if self.rng.gen::<f64>() < self.config.burst_loss_prob {
            let (min, max) = self.config.burst_length;
            self.burst_remaining = self.rng.gen_range(min..=max.max(min));
            return true;
        }

        self.rng.gen::<f64>() < self.config.loss_rate
    }

    /// Advance time and receive delivered packets, in arrival order
    pub fn tick(&mut self, dt: Duration) -> Vec<ChaosPacket<T>> {
        self.current_time += dt;
        let now = self.current_time;

        let (mut delivered, pending): (Vec<_>, Vec<_>) = self
            .in_flight
            .drain(..)
            .partition(|packet| packet.delivery_time <= now);
        self.in_flight = pending;
        delivered.sort_by_key(|packet| packet.delivery_time);

        for packet in &delivered {
            let latency = (packet.delivery_time - packet.send_time).as_millis() as u64;
            self.stats.packets_delivered += 1;
            self.stats.total_latency_ms += latency;
            self.stats.max_latency_ms = self.stats.max_latency_ms.max(latency);
        }

        delivered
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> &ChaosStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ChaosStats::default();
    }

    pub fn current_time(&self) -> Duration {
        self.current_time
    }
}
