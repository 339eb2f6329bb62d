//! Utility for testing.
use simplelog::{CombinedLogger, Config, LevelFilter, WriteLogger};

const DEBUG_MODE: bool = false;

#[allow(dead_code)]
pub(crate) fn init_logger(path: &str) {
    if DEBUG_MODE {
        let _ = std::fs::create_dir_all("./test-output");
        if let Ok(f) = std::fs::File::create(path) {
            let _ = CombinedLogger::init(vec![WriteLogger::new(
                LevelFilter::Debug,
                Config::default(),
                f,
            )]);
        }
    }
}
