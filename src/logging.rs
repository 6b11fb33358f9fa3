use std::io::Write;

use log::LevelFilter;

/// Install the global logger. `RUST_LOG`, when set, takes precedence over `level`.
///
/// Safe to call more than once; only the first call has an effect.
pub fn init_logging(level: LevelFilter) {
    let _ = env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .parse_default_env()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init_logging(LevelFilter::Debug);
        init_logging(LevelFilter::Info);
        log::info!("logger initialised");
    }
}
