use env_logger::{Builder, Env};
use std::io::Write;

/// Initializes the global logger. Messages at `info` and above are shown by
/// default, `debug` and above when `debug` is set; `RUST_LOG` overrides both.
pub fn init(debug: bool) {
    let default_filter = if debug { "debug" } else { "info" };
    Builder::from_env(Env::default().filter_or("RUST_LOG", default_filter))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}
