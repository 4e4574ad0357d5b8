//! Load test for the greennet relay.
//!
//! Spawns multiple fake clients that:
//! - Register and open a handful of channels
//! - Keep one long poll outstanding on /listen
//! - Periodically transmit a message on a random channel
//!
//! The client parses JSON responses, so run the server with
//! `GREENNET_WIRE_FORMAT=json`.
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --clients N      Number of clients to spawn (default: 100)
//!   --duration S     Test duration in seconds (default: 30)
//!   --send-rate R    Transmits per second per client (default: 0.5)
//!   --channels C     Size of the shared channel pool (default: 16)
//!   --url URL        Server base URL (default: http://127.0.0.1:9001)

use greennet_shared::{DeliveredMessage, OutboundMessage, RegisterResponse};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// === Metrics ===

#[derive(Default)]
struct Metrics {
    registered: AtomicU64,
    transmits_sent: AtomicU64,
    polls_completed: AtomicU64,
    empty_polls: AtomicU64,
    messages_received: AtomicU64,
    errors: AtomicU64,
    latency_sum_ms: AtomicU64,
    latency_count: AtomicU64,
}

struct Options {
    num_clients: u32,
    duration_secs: u64,
    send_rate: f64,
    channel_pool: u16,
    url: String,
}

impl Options {
    fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let mut options = Self {
            num_clients: 100,
            duration_secs: 30,
            send_rate: 0.5,
            channel_pool: 16,
            url: "http://127.0.0.1:9001".to_string(),
        };

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--clients" => {
                    i += 1;
                    options.num_clients = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(100);
                }
                "--duration" => {
                    i += 1;
                    options.duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
                }
                "--send-rate" => {
                    i += 1;
                    options.send_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(0.5);
                }
                "--channels" => {
                    i += 1;
                    options.channel_pool = args
                        .get(i)
                        .and_then(|s| s.parse().ok())
                        .filter(|&n| n > 0)
                        .unwrap_or(16);
                }
                "--url" => {
                    i += 1;
                    if let Some(url) = args.get(i) {
                        options.url = url.trim_end_matches('/').to_string();
                    }
                }
                _ => {}
            }
            i += 1;
        }
        options
    }
}

// === Client task ===

async fn register(http: &reqwest::Client, url: &str) -> Result<String, reqwest::Error> {
    let resp: RegisterResponse = http
        .get(format!("{url}/register"))
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(resp.user)
}

async fn post_data(
    http: &reqwest::Client,
    url: &str,
    route: &str,
    user: &str,
    data: &str,
) -> Result<(), reqwest::Error> {
    http.post(format!("{url}/{route}"))
        .form(&[("user", user), ("data", data)])
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

async fn run_listener(
    http: reqwest::Client,
    url: String,
    user: String,
    test_end: Instant,
    metrics: Arc<Metrics>,
) {
    while Instant::now() < test_end {
        let result = async {
            http.post(format!("{url}/listen"))
                .form(&[("user", user.as_str())])
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<DeliveredMessage>>()
                .await
        }
        .await;

        match result {
            Ok(messages) => {
                metrics.polls_completed.fetch_add(1, Ordering::Relaxed);
                if messages.is_empty() {
                    metrics.empty_polls.fetch_add(1, Ordering::Relaxed);
                }
                metrics
                    .messages_received
                    .fetch_add(messages.len() as u64, Ordering::Relaxed);
            }
            Err(e) => {
                eprintln!("Listen failed: {}", e);
                metrics.errors.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }
}

async fn run_client(
    client_id: u32,
    http: reqwest::Client,
    options: Arc<Options>,
    metrics: Arc<Metrics>,
) {
    let connect_start = Instant::now();
    let user = match register(&http, &options.url).await {
        Ok(user) => user,
        Err(e) => {
            if client_id < 5 {
                eprintln!("Client {} failed to register: {}", client_id, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    metrics
        .latency_sum_ms
        .fetch_add(connect_start.elapsed().as_millis() as u64, Ordering::Relaxed);
    metrics.latency_count.fetch_add(1, Ordering::Relaxed);
    metrics.registered.fetch_add(1, Ordering::Relaxed);

    let channels: Vec<u16> = {
        let mut rng = rand::thread_rng();
        (0..4).map(|_| rng.gen_range(0..options.channel_pool)).collect()
    };
    let open_data = serde_json::to_string(&channels).unwrap_or_else(|_| "[]".to_string());
    if let Err(e) = post_data(&http, &options.url, "open", &user, &open_data).await {
        if client_id < 5 {
            eprintln!("Client {} failed to open channels: {}", client_id, e);
        }
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        return;
    }

    let test_end = Instant::now() + Duration::from_secs(options.duration_secs);
    let listener = tokio::spawn(run_listener(
        http.clone(),
        options.url.clone(),
        user.clone(),
        test_end,
        Arc::clone(&metrics),
    ));

    let send_interval = if options.send_rate > 0.0 {
        Duration::from_secs_f64(1.0 / options.send_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };
    let mut send_timer = tokio::time::interval(send_interval);
    send_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    while Instant::now() < test_end {
        send_timer.tick().await;

        let channel = rand::thread_rng().gen_range(0..options.channel_pool);
        let batch = vec![OutboundMessage::new(
            channel,
            channel,
            format!("client {client_id}"),
        )];
        let Ok(data) = serde_json::to_string(&batch) else {
            continue;
        };
        match post_data(&http, &options.url, "transmit", &user, &data).await {
            Ok(()) => {
                metrics.transmits_sent.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                if client_id < 5 {
                    eprintln!("Client {} transmit failed: {}", client_id, e);
                }
                metrics.errors.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    let _ = listener.await;
}

// === Main ===

#[tokio::main]
async fn main() {
    let options = Arc::new(Options::from_args());

    println!("=== Greennet Relay Load Test ===");
    println!("Clients: {}", options.num_clients);
    println!("Duration: {}s", options.duration_secs);
    println!("Send rate: {}/s per client", options.send_rate);
    println!("Channel pool: {}", options.channel_pool);
    println!("URL: {}", options.url);
    println!();

    // Each client holds a long poll open while transmitting.
    let http = match reqwest::Client::builder()
        .pool_max_idle_per_host(options.num_clients as usize * 2)
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            eprintln!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    let metrics = Arc::new(Metrics::default());
    let mut handles = Vec::with_capacity(options.num_clients as usize);

    println!("Spawning {} clients...", options.num_clients);
    let spawn_start = Instant::now();

    for client_id in 0..options.num_clients {
        handles.push(tokio::spawn(run_client(
            client_id,
            http.clone(),
            Arc::clone(&options),
            Arc::clone(&metrics),
        )));

        // Stagger spawns slightly to avoid thundering herd
        if client_id % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let duration_secs = options.duration_secs;
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();

        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            if elapsed >= duration_secs + 25 {
                break;
            }

            println!(
                "[{:3}s] registered={}, transmits={}, polls={}, empty_polls={}, received={}, errors={}",
                elapsed,
                metrics_clone.registered.load(Ordering::Relaxed),
                metrics_clone.transmits_sent.load(Ordering::Relaxed),
                metrics_clone.polls_completed.load(Ordering::Relaxed),
                metrics_clone.empty_polls.load(Ordering::Relaxed),
                metrics_clone.messages_received.load(Ordering::Relaxed),
                metrics_clone.errors.load(Ordering::Relaxed),
            );
        }
    });

    // Wait for all clients to finish
    for handle in handles {
        let _ = handle.await;
    }

    stats_handle.abort();

    // Final stats
    println!();
    println!("=== Final Results ===");
    let transmits = metrics.transmits_sent.load(Ordering::Relaxed);
    let polls = metrics.polls_completed.load(Ordering::Relaxed);
    let empty = metrics.empty_polls.load(Ordering::Relaxed);
    let received = metrics.messages_received.load(Ordering::Relaxed);
    let errors = metrics.errors.load(Ordering::Relaxed);
    let latency_sum = metrics.latency_sum_ms.load(Ordering::Relaxed);
    let latency_count = metrics.latency_count.load(Ordering::Relaxed);

    println!("Total transmits sent: {}", transmits);
    println!("Total polls completed: {} ({} empty)", polls, empty);
    println!("Total messages received: {}", received);
    println!("Total errors: {}", errors);

    if latency_count > 0 {
        println!("Average register latency: {}ms", latency_sum / latency_count);
    }

    if transmits > 0 {
        println!(
            "Average fan-out per transmit: {:.1}",
            received as f64 / transmits as f64
        );
    }
    println!(
        "Messages/sec received (total): {:.0}",
        received as f64 / options.duration_secs.max(1) as f64
    );
}
