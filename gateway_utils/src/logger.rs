use std::env;
use std::sync::Once;

use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

const DEFAULT_LOG_PATH: &str = "logs/gateway.log";
const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {l} [{T}] {t} - {m}{n}";
const ROLL_SIZE_BYTES: u64 = 50 * 1024 * 1024;

/// Initializes process-wide logging once. Safe to call from both the binary's
/// `main` and from integration tests; later calls are no-ops.
pub fn init_logger() {
    if env::var("GATEWAY_NO_LOGS").is_ok() {
        return;
    }

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let log_path =
            env::var("GATEWAY_LOG_PATH").unwrap_or_else(|_| DEFAULT_LOG_PATH.to_string());

        let config = build_config(&log_path).expect("unable to build logging config");
        log4rs::init_config(config).expect("unable to initialize logger");
    });

    log::info!("logger initialized, writing to {}", DEFAULT_LOG_PATH);
}

fn build_config(log_path: &str) -> anyhow::Result<Config> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let roller = FixedWindowRoller::builder().build(&format!("{log_path}.{{}}.gz"), 5)?;
    let trigger = SizeTrigger::new(ROLL_SIZE_BYTES);
    let policy = CompoundPolicy::new(Box::new(trigger), Box::new(roller));

    let file = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build(log_path, Box::new(policy))?;

    let config = Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .appender(Appender::builder().build("file", Box::new(file)))
        // the HTTP/WS stacks are noisy at debug; keep them above the root level
        .logger(Logger::builder().build("tokio_tungstenite", log::LevelFilter::Warn))
        .logger(Logger::builder().build("hyper", log::LevelFilter::Warn))
        .build(
            Root::builder()
                .appender("stdout")
                .appender("file")
                .build(log::LevelFilter::Info),
        )?;

    Ok(config)
}
