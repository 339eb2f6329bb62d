//! Load config and start a cache node.
use std::process::exit;
use std::time::Duration;

use clap::{App, Arg};
use demo::{
    config::{NodeConfig, TestConfig},
    run_local_cluster,
    utils::{init_logger, split_command},
    CacheHandle,
};
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Time a scripted node keeps serving after it converged, so that late
/// members still get their commits.
const LINGER: Duration = Duration::from_secs(3);

fn main() {
    // Example:
    //  ./node_admin --config=./test-output/alice-config.yml
    let matches = App::new("paxos-cache-admin")
        .version("0.1.0")
        .author("tsuko")
        .about("start replicated cache node")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .required(true)
                .help("Node configuration in YAML"),
        )
        .arg(
            Arg::with_name("log-dir")
                .long("log-dir")
                .takes_value(true)
                .help("Directory for the log file, default is the working directory"),
        )
        .get_matches();

    let path = matches.value_of("config").unwrap_or_default();
    let config = match NodeConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("can't load {}: {}", path, e);
            exit(-1);
        }
    };

    let log_dir = std::path::Path::new(matches.value_of("log-dir").unwrap_or("."));
    if let Err(e) = init_logger(log_dir.join(format!("paxos-{}.log", config.node_name))) {
        eprintln!("can't create log file: {}", e);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("can't start runtime: {}", e);
            exit(-1);
        }
    };
    let ok = rt.block_on(async move {
        let cache = match CacheHandle::start_udp(&config).await {
            Ok(cache) => cache,
            Err(e) => {
                error!("can't start {}: {}", config.node_name, e);
                eprintln!("can't start {}: {}", config.node_name, e);
                return false;
            }
        };
        info!("init cache node: {}", config.node_name);

        let ok = match config.test_config {
            TestConfig::NonTest => {
                serve_stdin(&cache).await;
                true
            }
            TestConfig::LocalCluster {
                put_num,
                timeout_ms,
            } => {
                let ok = run_local_cluster(
                    &cache,
                    config.my_position,
                    config.members.len(),
                    put_num,
                    Duration::from_millis(timeout_ms),
                )
                .await;
                tokio::time::sleep(LINGER).await;
                ok
            }
        };
        cache.close().await;
        ok
    });
    if !ok {
        exit(1);
    }
}

/// Reads `put k v`, `rm k`, `get k`, `clear`, `list`, `status` and `quit`.
async fn serve_stdin(cache: &CacheHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("stdin: {}", e);
                break;
            }
        };
        let (cmd, args) = split_command(&line);
        let res = match (cmd, args.as_slice()) {
            ("", _) => continue,
            ("put", [key, value]) => cache.put(key, value).await.map(|id| id.to_string()),
            ("rm", [key]) => cache.remove(key).await.map(|id| id.to_string()),
            ("clear", []) => cache.clear().await.map(|id| id.to_string()),
            ("get", [key]) => Ok(cache.get(key).unwrap_or_else(|| "(nil)".to_string())),
            ("list", []) => Ok(cache
                .entries()
                .into_iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("\n")),
            ("status", []) => cache
                .status()
                .await
                .and_then(|s| serde_json::to_string(&s).map_err(Into::into)),
            ("quit", []) => break,
            _ => {
                println!("usage: put <k> <v> | rm <k> | get <k> | clear | list | status | quit");
                continue;
            }
        };
        match res {
            Ok(out) => println!("{}", out),
            Err(e) => println!("err: {}", e),
        }
    }
}
