/// Wires configuration, transport, and MIDI devices together and runs the
/// relay until interrupted.
///
/// One task per long-running concern (network reader, MIDI ingress,
/// scheduled release, main clock-sync/status loop); `tokio::signal::ctrl_c()`
/// aborts every `JoinHandle` on shutdown rather than a cooperative
/// cancellation token.
use std::io::{self, BufRead, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use midinet_protocol::Packet;
use midinet_transport::{hmac, tcp, udp, Transport};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::clocksync::ClockEstimators;
use crate::config::{ConnectionKind, Configuration, Endpoint};
use crate::ingress::{self, Outcome};
use crate::received::ReceivedSet;
use crate::scheduler;
use crate::sessionlog::SessionLog;
use crate::state::RelayState;

/// Main loop period: how often a `ClockSync` is sent, status is logged, and
/// the session log is flushed.
const MAIN_LOOP_PERIOD: Duration = Duration::from_millis(200);

/// Session-log stats line cadence, in main-loop ticks (every 10s at 200ms).
const STATS_EVERY_N_TICKS: u64 = 50;

/// Build the transport described by `config.connection`, HMAC-wrapping it
/// when a key is configured and the connection kind supports it.
async fn build_transport(config: &Configuration) -> anyhow::Result<Transport> {
    let transport = match &config.connection {
        ConnectionKind::Udp { local, remote } => {
            udp::symmetric(resolve(local)?, resolve(remote)?).await?
        }
        ConnectionKind::UdpServer { listen } => udp::server(resolve(listen)?).await?,
        ConnectionKind::UdpClient { remote } => {
            let remote_addr = resolve(remote)?;
            udp::client(unspecified_like(remote_addr), remote_addr).await?
        }
        ConnectionKind::TcpServer { listen } => tcp::server(resolve(listen)?).await?,
        ConnectionKind::TcpClient { remote } => tcp::client(resolve(remote)?).await?,
    };

    Ok(match &config.hmac_key {
        Some(key) if config.connection.supports_hmac() => hmac::wrap(transport, key.clone()),
        Some(_) => {
            warn!("hmac key configured but the selected connection type does not support it, ignoring");
            transport
        }
        None => transport,
    })
}

fn resolve(endpoint: &Endpoint) -> anyhow::Result<SocketAddr> {
    format!("{}:{}", endpoint.host, endpoint.port)
        .to_socket_addrs()
        .with_context(|| format!("resolving {endpoint}"))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("no addresses found for {endpoint}"))
}

fn unspecified_like(remote: SocketAddr) -> SocketAddr {
    if remote.is_ipv6() {
        "[::]:0".parse().unwrap()
    } else {
        "0.0.0.0:0".parse().unwrap()
    }
}

fn log_available_ports(kind: &str, names: &[String]) {
    info!("available {kind} ports:");
    for (i, name) in names.iter().enumerate() {
        info!("  [{i}] {name}");
    }
}

/// Interactively prompt on stdin for zero or more port indices, terminated
/// by a negative number.
fn prompt_indices(kind: &str, available: &[String]) -> anyhow::Result<Vec<usize>> {
    println!("select {kind} ports by number, one per line (negative number to stop):");
    for (i, name) in available.iter().enumerate() {
        println!("  [{i}] {name}");
    }

    let stdin = io::stdin();
    let mut indices = Vec::new();
    loop {
        print!("{kind}> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.parse::<i64>() {
            Ok(choice) if choice < 0 => break,
            Ok(choice) => indices.push(choice as usize),
            Err(_) => println!("not a number, try again"),
        }
    }
    Ok(indices)
}

fn open_inputs(config: &Configuration) -> anyhow::Result<Vec<Box<dyn midinet_device::MidiInput>>> {
    let available = midinet_device::list_inputs()?;
    log_available_ports("input", &available);

    let mut indices = config.input_devices.clone();
    if config.input_ask {
        indices.extend(prompt_indices("input", &available)?);
    }
    indices.into_iter().map(midinet_device::open_input).collect()
}

fn open_outputs(config: &Configuration) -> anyhow::Result<Vec<Box<dyn midinet_device::MidiOutput>>> {
    let available = midinet_device::list_outputs()?;
    log_available_ports("output", &available);

    let mut indices = config.output_devices.clone();
    if config.output_ask {
        indices.extend(prompt_indices("output", &available)?);
    }
    let mut outputs: Vec<Box<dyn midinet_device::MidiOutput>> =
        indices.into_iter().map(midinet_device::open_output).collect::<anyhow::Result<_>>()?;

    for name in &config.virtual_ports {
        outputs.push(midinet_device::create_virtual_output(name)?);
    }
    Ok(outputs)
}

/// Spawn one polling task per input port (`MidiInput::recv` is non-blocking)
/// and funnel whatever they produce into a single channel the MIDI-ingress
/// task consumes.
fn spawn_input_pollers(inputs: Vec<Box<dyn midinet_device::MidiInput>>) -> mpsc::UnboundedReceiver<Vec<u8>> {
    const POLL_PERIOD: Duration = Duration::from_millis(1);
    let (tx, rx) = mpsc::unbounded_channel();
    for input in inputs {
        let tx = tx.clone();
        tokio::spawn(async move {
            let mut input = input;
            loop {
                match input.recv() {
                    Some(bytes) => {
                        if tx.send(bytes).is_err() {
                            break;
                        }
                    }
                    None => tokio::time::sleep(POLL_PERIOD).await,
                }
            }
        });
    }
    rx
}

/// Construct the relay from `config` and run it until `ctrl_c` or a fatal
/// setup error. Runs forever on success; the caller's `main` decides what a
/// clean shutdown means for the process exit code.
pub async fn run(config: Configuration) -> anyhow::Result<()> {
    let transport = build_transport(&config).await?;
    let Transport {
        outbound,
        mut inbound,
    } = transport;

    let inputs = open_inputs(&config)?;
    let outputs = Arc::new(open_outputs(&config)?);

    let state = Arc::new(RelayState::new(config.latency, config.auto_latency, config.duplication));

    let session_log: Arc<Option<Mutex<SessionLog>>> = Arc::new(match &config.log_file {
        Some(path) => Some(Mutex::new(
            SessionLog::open(Path::new(path), midinet_protocol::clock::now())
                .with_context(|| format!("opening session log {path}"))?,
        )),
        None => None,
    });

    let mut handles = Vec::new();

    {
        let outbound = outbound.clone();
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            let mut received = ReceivedSet::default();
            let mut estimators = ClockEstimators::default();
            while let Some(data) = inbound.recv().await {
                let now = midinet_protocol::clock::now();
                match ingress::dispatch_packet(&data, now, &state, &mut received, &mut estimators) {
                    Outcome::Ignored => {}
                    Outcome::Reply(bytes) => {
                        let _ = outbound.send(bytes);
                    }
                    Outcome::PlayLocal { timestamp, bytes } => state.queue.push(timestamp, bytes),
                }
            }
        }));
    }

    {
        let mut midi_rx = spawn_input_pollers(inputs);
        let outbound = outbound.clone();
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            while let Some(bytes) = midi_rx.recv().await {
                let now = midinet_protocol::clock::now();
                if let Some(local) = ingress::handle_local_midi(&bytes, now, &state) {
                    for _ in 0..state.duplication.max(1) {
                        let _ = outbound.send(local.wire.clone());
                    }
                    state.queue.push(local.local_timestamp, local.local_bytes);
                }
            }
        }));
    }

    handles.push(tokio::spawn(scheduler::run(state.clone(), outputs.clone())));

    let main_handle = {
        let state = state.clone();
        let outbound = outbound.clone();
        let session_log = session_log.clone();
        tokio::spawn(async move { main_loop(state, outbound, session_log).await })
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested, stopping relay tasks");
    main_handle.abort();
    for handle in handles {
        handle.abort();
    }
    Ok(())
}

async fn main_loop(
    state: Arc<RelayState>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    session_log: Arc<Option<Mutex<SessionLog>>>,
) {
    let mut tick: u64 = 0;
    loop {
        tokio::time::sleep(MAIN_LOOP_PERIOD).await;
        let now = midinet_protocol::clock::now();
        let _ = outbound.send(Packet::ClockSync { timestamp_sent: now }.encode());

        let delta = state.delta.load();
        let network_latency = state.network_latency.load();
        let playback_latency = state.playback_latency.load();
        let packets = state.num_packets.load(Ordering::Relaxed);
        let midi_messages = state.num_midi_messages.load(Ordering::Relaxed);

        print!(
            "\rlatency {playback_latency:.4}  network {network_latency:.4}  delta {delta:.4}  packets {packets}  midi {midi_messages}   "
        );
        let _ = io::stdout().flush();

        info!(delta, network_latency, playback_latency, packets, midi_messages, "status");

        if let Some(log) = session_log.as_ref() {
            let drained = state.queue.drain_log();
            if !drained.is_empty() {
                let mut log = log.lock().expect("session log mutex poisoned");
                if let Err(e) = log.log_messages(&drained) {
                    warn!(error = %e, "failed to write session log");
                }
            }
        }

        tick += 1;
        if tick % STATS_EVERY_N_TICKS == 0 {
            if let Some(log) = session_log.as_ref() {
                let mut log = log.lock().expect("session log mutex poisoned");
                if let Err(e) = log.log_stats(playback_latency, network_latency, delta) {
                    warn!(error = %e, "failed to write session log stats");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_like_matches_remote_family() {
        let v4: SocketAddr = "93.184.216.34:80".parse().unwrap();
        assert!(!unspecified_like(v4).is_ipv6());

        let v6: SocketAddr = "[2001:db8::1]:80".parse().unwrap();
        assert!(unspecified_like(v6).is_ipv6());
    }

    #[test]
    fn resolve_handles_a_literal_ip() {
        let endpoint = Endpoint {
            host: "127.0.0.1".to_string(),
            port: 9000,
        };
        let addr = resolve(&endpoint).unwrap();
        assert_eq!(addr, "127.0.0.1:9000".parse().unwrap());
    }
}
