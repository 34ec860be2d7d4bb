// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Structured logging setup.
//!
//! Every core entry point logs an `info!`/`debug!`/`trace!` line on
//! entry/exit and a `warn!` on locally-recovered failure (e.g. a single
//! self-cal interval failing to converge). This module only wires up the
//! `fern` dispatcher; callers choose verbosity.

use log::LevelFilter;

/// Install a `fern` logger with colourised, timestamped output on stderr.
///
/// `verbosity` follows the common CLI convention: 0 = warn, 1 = info,
/// 2 = debug, 3+ = trace.
pub fn init(verbosity: u8) -> Result<(), fern::InitError> {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let colors = fern::colors::ColoredLevelConfig::new()
        .error(fern::colors::Color::Red)
        .warn(fern::colors::Color::Yellow)
        .info(fern::colors::Color::Green)
        .debug(fern::colors::Color::Blue)
        .trace(fern::colors::Color::BrightBlack);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}
