//! Logging setup for the drivers.
//!
//! The library itself only emits through the `log` facade macros, so any
//! backend works; severities below the compiled-in `log::STATIC_MAX_LEVEL`
//! cost nothing. The drivers install this env_logger backend: WARN by
//! default, overridable through `RUST_LOG` (e.g. `RUST_LOG=trace` to see
//! every emitted IR word annotated with its SSA id and operands).

use std::io::Write;

use env_logger::Env;

pub fn init() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .format(|formatter, record| {
            writeln!(
                formatter,
                "[{}] [{}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
