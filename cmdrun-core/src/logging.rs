/// Install `env_logger` as the `log` backend.
///
/// `RUST_LOG` still wins when set. Returns `false` if a logger was already
/// installed, which is harmless (tests call this repeatedly).
pub fn init(debug: bool) -> bool {
    let level = if debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .try_init()
        .is_ok()
}
