use log::LevelFilter;
use simplelog::{CombinedLogger, ConfigBuilder, WriteLogger};
use std::path::Path;

/// Sends debug logs of this node to `path`.
pub fn init_logger(path: impl AsRef<Path>) -> std::io::Result<()> {
    let file = std::fs::File::create(path)?;
    let _ = CombinedLogger::init(vec![WriteLogger::new(
        LevelFilter::Debug,
        ConfigBuilder::new()
            .add_filter_ignore("mio".to_string())
            .build(),
        file,
    )]);
    Ok(())
}

/// Splits a command line into its first word and the rest.
pub fn split_command(line: &str) -> (&str, Vec<&str>) {
    let mut words = line.split_whitespace();
    let cmd = words.next().unwrap_or("");
    (cmd, words.collect())
}

#[test]
fn test_split_command() {
    assert_eq!(split_command("  put  k v "), ("put", vec!["k", "v"]));
    assert_eq!(split_command(""), ("", vec![]));
}
