//! Forwarding of FFmpeg's own diagnostics into the `log` facade
//!
//! FFmpeg prints to stderr by default. Once the bridge is installed, its messages
//! (probe notes, decoder warnings, the swscale deprecated-format warning) show up
//! in the same stream as the crate's own records, under the `ffmpeg` target.

use log::Level;
use once_cell::sync::OnceCell;

static BRIDGE: OnceCell<()> = OnceCell::new();

// libavutil/log.h
const AV_LOG_ERROR: i32 = 16;
const AV_LOG_WARNING: i32 = 24;
const AV_LOG_INFO: i32 = 32;
const AV_LOG_VERBOSE: i32 = 40;
const AV_LOG_DEBUG: i32 = 48;

/// Install the FFmpeg log bridge. Subsequent calls are no-ops.
pub fn install() {
    BRIDGE.get_or_init(|| {
        ac_ffmpeg::set_log_callback(|level, message| forward(level, message));
    });
}

pub fn is_installed() -> bool {
    BRIDGE.get().is_some()
}

fn forward(level: i32, message: &str) {
    let message = message.trim_end();
    if message.is_empty() {
        return;
    }

    if let Some(level) = map_level(level) {
        log::log!(target: "ffmpeg", level, "{}", message);
    }
}

/// Map an FFmpeg log level to a `log` level. `None` drops the message.
fn map_level(level: i32) -> Option<Level> {
    match level {
        i32::MIN..=AV_LOG_ERROR => Some(Level::Error),
        l if l <= AV_LOG_WARNING => Some(Level::Warn),
        l if l <= AV_LOG_INFO => Some(Level::Info),
        l if l <= AV_LOG_VERBOSE => Some(Level::Debug),
        l if l <= AV_LOG_DEBUG => Some(Level::Trace),
        // AV_LOG_TRACE is far too chatty even for trace
        _ => None,
    }
}
