//! Generate node configurations for a local cluster.

use std::{io::Write, process::exit};

use clap::{App, Arg};
use demo::config::{NodeConfig, TestConfig, DEFAULT_BASE_PORT, NODE_NAME_LIST};

const SC_NODE_CONFIG: &str = "node-config";

const NODE_CONFIG_NAME: &str = "with-name";

fn main() {
    let matches = App::new("cache test kit")
        .version("0.1.0")
        .author("tsuko")
        .about("Testing suite")
        .subcommand(
            App::new(SC_NODE_CONFIG)
                .about("Generate node configurations for N nodes")
                .arg(
                    Arg::with_name("num")
                        .short("n")
                        .long("num")
                        .takes_value(true)
                        .required(true)
                        .help("The number of group members"),
                )
                .arg(
                    Arg::with_name("puts")
                        .short("p")
                        .long("puts")
                        .takes_value(true)
                        .help("Run scripted: each node puts this many keys and exits"),
                )
                .arg(
                    Arg::with_name("timeout")
                        .short("t")
                        .long("timeout")
                        .takes_value(true)
                        .help("Milliseconds a scripted node waits for the others"),
                )
                .arg(
                    Arg::with_name("port")
                        .long("port")
                        .takes_value(true)
                        .help("First UDP port, members use consecutive ports"),
                )
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .takes_value(true)
                        .help("Output configs to specified dir"),
                )
                .arg(
                    Arg::with_name(NODE_CONFIG_NAME)
                        .long("with-name")
                        .takes_value(false)
                        .help("Use name: Alice, Bob, Carol, Dave..."),
                ),
        )
        .get_matches();

    if let Some(sub) = matches.subcommand_matches(SC_NODE_CONFIG) {
        gen_node_config(sub)
    }
}

fn parse_or_exit<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str, default: T) -> T {
    match matches.value_of(name) {
        None => default,
        Some(v) => v.parse::<T>().unwrap_or_else(|_| {
            eprintln!("invalid --{}: {}", name, v);
            exit(-1);
        }),
    }
}

fn gen_node_config(matches: &clap::ArgMatches) {
    let with_name = matches.is_present(NODE_CONFIG_NAME);
    let num: usize = parse_or_exit(matches, "num", 0);
    let base_port: u16 = parse_or_exit(matches, "port", DEFAULT_BASE_PORT);
    let timeout_ms: u64 = parse_or_exit(matches, "timeout", 30_000);

    if num == 0 {
        eprintln!("expect at least one node");
        exit(-1);
    }
    if num > NODE_NAME_LIST.len() && with_name {
        eprintln!(
            "There should be at most {} named nodes, got {}",
            NODE_NAME_LIST.len(),
            num
        );
        exit(-1);
    }

    let mut configs = NodeConfig::local_cluster(num, base_port, with_name);
    if matches.is_present("puts") {
        let put_num: usize = parse_or_exit(matches, "puts", 4);
        for conf in configs.iter_mut() {
            conf.test_config = TestConfig::LocalCluster {
                put_num,
                timeout_ms,
            };
        }
    }

    if let Some(output_dir) = matches.value_of("output") {
        // -> files
        let path = std::path::Path::new(output_dir);
        if let Err(e) = std::fs::create_dir_all(path) {
            eprintln!("can't create {}: {}", output_dir, e);
            exit(-1);
        }
        for config in configs.iter() {
            let file = path.join(format!("{}-config.yml", config.node_name.to_lowercase()));
            if let Err(e) = config.save(&file) {
                eprintln!("failed to write {:?}: {}", file, e);
                exit(-1);
            }
        }
    } else {
        // -> stdout
        let mut to = std::io::stdout();
        for config in configs.iter() {
            if serde_yaml::to_writer(&mut to, config).is_err() || to.write_all(b"\n\n").is_err() {
                exit(-1);
            }
        }
    }
}
