use env_logger::{Builder, Env};
use log::LevelFilter;

/// Map `-q`/`-v` counts onto a level: quiet wins, default is `info`.
pub fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Warn;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Initialise `env_logger` once per process.
///
/// An explicit `-v`/`-q` wins; otherwise `RUST_LOG` is honoured when set.
pub fn init_logging(verbose: u8, quiet: bool) {
    let use_env = verbose == 0 && !quiet && std::env::var_os("RUST_LOG").is_some();
    let mut builder = if use_env {
        Builder::from_env(Env::default())
    } else {
        let mut b = Builder::new();
        b.filter_level(level_for(verbose, quiet));
        b
    };
    builder.format_timestamp(None).format_target(false);
    // A second call (e.g. from tests) keeps the first logger.
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(0, false), LevelFilter::Info);
        assert_eq!(level_for(1, false), LevelFilter::Debug);
        assert_eq!(level_for(5, false), LevelFilter::Trace);
        assert_eq!(level_for(3, true), LevelFilter::Warn);
    }
}
