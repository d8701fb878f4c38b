//! Real-time replica clock demo.
//!
//! A server task streams clock samples through a chaos link; a receiver task hands
//! them to the client loop through the clock inbox; the client loop runs the network
//! manager at 60 FPS and logs the clock state once per second.
//!
//! Usage: `replica-sim [seconds] [good|poor|hostile]`. Set `RUST_LOG` to change the
//! log filter (e.g. `RUST_LOG=replica_time=debug`).

use std::time::{Duration, Instant};

use replica_client::{ClientNetworkManager, ClockInbox, Connection, NetworkObject};
use replica_core::{
    ComponentType, ConnectionId, MessageId, MsgSceneClock, NetworkId, Reliability, ReplicaResult,
};
use replica_test::{ChaosLink, SimulatedServer, SimulationConfig};
use replica_wire::WireMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const SERVER_TICK: Duration = Duration::from_millis(2);
const CLIENT_FRAME: Duration = Duration::from_micros(16_667);

/// Connection that only counts outgoing feedback
struct CountingConnection {
    id: ConnectionId,
    sent: u64,
}

impl Connection for CountingConnection {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    fn send_message(
        &mut self,
        message_id: MessageId,
        payload: &[u8],
        _reliability: Reliability,
    ) -> ReplicaResult<()> {
        self.sent += 1;
        debug!(?message_id, len = payload.len(), "Feedback sent");
        Ok(())
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,replica_time=info,replica_client=info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn parse_args() -> (Duration, SimulationConfig) {
    let mut args = std::env::args().skip(1);
    let seconds = args
        .next()
        .and_then(|arg| arg.parse::<u64>().ok())
        .unwrap_or(10);
    let seed = 42;
    let config = match args.next().as_deref() {
        Some("poor") => SimulationConfig::poor(seed),
        Some("hostile") => SimulationConfig::hostile(seed),
        Some("good") | None => SimulationConfig::good(seed),
        Some(other) => {
            warn!(preset = other, "Unknown preset, using good");
            SimulationConfig::good(seed)
        }
    };
    (Duration::from_secs(seconds), config)
}

/// Advance the server clock in real time and push encoded samples through the link
async fn run_server(
    mut server: SimulatedServer,
    mut link: ChaosLink<Vec<u8>>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
) {
    let mut interval = tokio::time::interval(SERVER_TICK);
    let mut last = Instant::now();
    loop {
        interval.tick().await;
        let now = Instant::now();
        let dt = now - last;
        last = now;

        server.advance(dt);
        if let Some(msg) = server.poll_frame() {
            match msg.to_bytes() {
                Ok(body) => link.send(body.to_vec()),
                Err(err) => warn!(error = %err, "Cannot encode clock sample"),
            }
        }
        for packet in link.tick(dt) {
            if tx.send(packet.payload).is_err() {
                let stats = link.stats();
                info!(
                    sent = stats.packets_sent,
                    lost = stats.packets_lost,
                    reordered = stats.packets_reordered,
                    "Server stopped"
                );
                return;
            }
        }
    }
}

/// Decode samples off the client's I/O path and queue them for the next frame
async fn run_receiver(mut rx: mpsc::UnboundedReceiver<Vec<u8>>, inbox: ClockInbox) {
    while let Some(body) = rx.recv().await {
        match MsgSceneClock::decode(&body) {
            Ok(msg) => inbox.push(msg),
            Err(err) => warn!(error = %err, "Dropping malformed clock sample"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let (duration, config) = parse_args();

    let seed = config.seed;
    let mut server = SimulatedServer::new(config.server.clone(), seed);
    let mut link = ChaosLink::new(config.link.clone(), seed.wrapping_add(1));
    let settings = config.clock.to_server_settings();

    // The first sample arrives one link latency after it was taken
    let initial = server.sample();
    tokio::time::sleep(config.link.base_latency).await;
    server.advance(config.link.base_latency);
    link.tick(config.link.base_latency);

    let connection = CountingConnection {
        id: ConnectionId(1),
        sent: 0,
    };
    let mut manager = ClientNetworkManager::new(
        connection,
        // Clock-only session: no object types are known
        Box::new(|_: NetworkId, _: ComponentType| -> Option<Box<dyn NetworkObject>> { None }),
        &initial,
        &settings,
    )?;
    info!(
        frame = initial.frame,
        rtt_ms = initial.round_trip_ms,
        "Session started"
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let server_task = tokio::spawn(run_server(server, link, tx));
    let receiver_task = tokio::spawn(run_receiver(rx, manager.clock_inbox()));

    let start = Instant::now();
    let mut interval = tokio::time::interval(CLIENT_FRAME);
    let mut last = Instant::now();
    let mut next_report = Duration::from_secs(1);
    let mut desyncs = 0u64;

    while start.elapsed() < duration {
        interval.tick().await;
        let now = Instant::now();
        let dt = (now - last).as_secs_f32();
        last = now;

        manager.update(dt)?;
        desyncs += manager
            .clock_mut()
            .take_events()
            .into_iter()
            .filter(|event| event.is_desync())
            .count() as u64;

        if start.elapsed() >= next_report {
            next_report += Duration::from_secs(1);
            let clock = manager.clock();
            info!(
                server = %clock.server_time(),
                replica = %clock.replica_time(),
                input = %clock.input_time(),
                input_delay = clock.input_delay(),
                rtt_ms = clock.latency().median_round_trip() * 1000.0,
                state = ?clock.state(),
                "Clock"
            );
        }
    }

    server_task.abort();
    receiver_task.abort();

    info!(
        latest_frame = manager.clock().latest_server_frame(),
        stale = manager.clock().stale_updates(),
        desyncs,
        feedback_sent = manager.connection().sent,
        "Simulation finished"
    );
    println!("{}", manager.debug_info());
    Ok(())
}
