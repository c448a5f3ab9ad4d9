use clap::Parser;
use hdrhistogram::Histogram;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

use confstore::follower_client::{ClientUpdate, FollowerClient};
use confstore::wire::pb;
use pb::config_follower_client::ConfigFollowerClient;
use pb::config_writer_client::ConfigWriterClient;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of concurrent writers
    #[arg(short, long, default_value = "1")]
    concurrency: usize,

    /// INTERVAL ms
    #[arg(short, long, default_value = "100")]
    interval: u64,

    /// Duration of the benchmark in seconds
    #[arg(short, long, default_value = "30")]
    duration: u64,

    /// Server address
    #[arg(short, long, default_value = "grpc://127.0.0.1:4000")]
    server: String,

    /// Seconds between compactions (0 disables compaction)
    #[arg(long, default_value = "10")]
    compact_every: u64,

    /// Versions kept behind the head when compacting
    #[arg(long, default_value = "32")]
    retain: i64,
}

fn random_mutation() -> pb::Mutation {
    let key = format!("knob/{}", rand::random::<u32>() % 64).into_bytes();
    let config_class = match rand::random::<u8>() % 3 {
        0 => Some(b"storage".to_vec()),
        1 => Some(b"proxy".to_vec()),
        _ => None,
    };
    if rand::random::<u8>() % 8 == 0 {
        pb::Mutation {
            kind: pb::MutationKind::Clear as i32,
            key,
            value: Vec::new(),
            config_class,
        }
    } else {
        pb::Mutation {
            kind: pb::MutationKind::Set as i32,
            key,
            value: rand::random::<u64>().to_string().into_bytes(),
            config_class,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let server_addr = args.server.clone();
    let histogram = Arc::new(Mutex::new(Histogram::<u64>::new(3).unwrap()));
    let total_commits = Arc::new(Mutex::new(0u64));
    let follower_stats = Arc::new(Mutex::new((0u64, 0u64))); // (mutations, resyncs)

    println!(
        "Starting benchmark with {} concurrent writers, commit interval {} ms",
        args.concurrency, args.interval
    );

    // Spawn writer tasks
    let mut handles = vec![];
    for _ in 0..args.concurrency {
        let server_addr = server_addr.clone();
        let histogram = histogram.clone();
        let total_commits = total_commits.clone();
        let interval = args.interval;

        let handle = tokio::spawn(async move {
            let mut client = match ConfigWriterClient::connect(server_addr).await {
                Ok(client) => client,
                Err(e) => {
                    eprintln!("Failed to connect to server: {}", e);
                    return;
                }
            };

            loop {
                let start = Instant::now();
                let batch = (0..1 + rand::random::<usize>() % 3)
                    .map(|_| random_mutation())
                    .collect();
                let request = tonic::Request::new(pb::CommitRequest { mutations: batch });

                match client.commit(request).await {
                    Ok(_) => {
                        let duration = start.elapsed();
                        let mut hist = histogram.lock().await;
                        hist.record(duration.as_micros() as u64).unwrap();
                        let mut total = total_commits.lock().await;
                        *total += 1;
                    }
                    Err(e) => eprintln!("Commit failed: {}", e),
                }

                tokio::time::sleep(Duration::from_millis(interval)).await;
            }
        });

        handles.push(handle);
    }

    // Spawn one follower that tracks the store incrementally
    {
        let server_addr = server_addr.clone();
        let follower_stats = follower_stats.clone();
        let interval = args.interval;
        handles.push(tokio::spawn(async move {
            let mut follower = match FollowerClient::connect(server_addr, None).await {
                Ok(follower) => follower,
                Err(e) => {
                    eprintln!("Failed to connect follower: {}", e);
                    return;
                }
            };
            loop {
                match follower.poll().await {
                    Ok(ClientUpdate::Changes { mutations, .. }) => {
                        let mut stats = follower_stats.lock().await;
                        stats.0 += mutations.len() as u64;
                    }
                    Ok(ClientUpdate::Resynced { version, .. }) => {
                        let mut stats = follower_stats.lock().await;
                        stats.1 += 1;
                        println!("Follower resynced at version {}", version);
                    }
                    Err(e) => eprintln!("Poll failed: {}", e),
                }
                tokio::time::sleep(Duration::from_millis(interval)).await;
            }
        }));
    }

    // Spawn the compaction driver standing in for the coordination layer
    if args.compact_every > 0 {
        let server_addr = server_addr.clone();
        let compact_every = args.compact_every;
        let retain = args.retain;
        handles.push(tokio::spawn(async move {
            let mut client = match ConfigFollowerClient::connect(server_addr).await {
                Ok(client) => client,
                Err(e) => {
                    eprintln!("Failed to connect compactor: {}", e);
                    return;
                }
            };
            loop {
                tokio::time::sleep(Duration::from_secs(compact_every)).await;
                let version = match client.get_version(pb::GetVersionRequest {}).await {
                    Ok(reply) => reply.into_inner().version,
                    Err(e) => {
                        eprintln!("GetVersion failed: {}", e);
                        continue;
                    }
                };
                if version <= retain {
                    continue;
                }
                let request = pb::CompactRequest {
                    last_truncated_version: version - retain,
                };
                match client.compact(request).await {
                    Ok(_) => println!("Compacted up to version {}", version - retain),
                    Err(e) => eprintln!("Compact failed: {}", e),
                }
            }
        }));
    }

    // Run for specified duration
    sleep(Duration::from_secs(args.duration)).await;

    // Cancel all tasks
    for handle in handles {
        handle.abort();
    }

    // Print statistics
    let total = *total_commits.lock().await;
    let (received, resyncs) = *follower_stats.lock().await;
    let hist = histogram.lock().await;

    println!("\nBenchmark Results:");
    println!("Total Commits: {}", total);
    println!("Average TPS: {:.2}", total as f64 / args.duration as f64);
    println!("Follower mutations received: {}", received);
    println!("Follower resyncs: {}", resyncs);
    println!("\nCommit Latency Distribution (microseconds):");
    println!("p50: {}", hist.value_at_percentile(50.0));
    println!("p90: {}", hist.value_at_percentile(90.0));
    println!("p95: {}", hist.value_at_percentile(95.0));
    println!("p99: {}", hist.value_at_percentile(99.0));
    println!("p99.9: {}", hist.value_at_percentile(99.9));

    Ok(())
}
