//! Logging utilities
//!
//! One `env_logger` per process. Filters are expressed as an `env_logger`
//! spec string so the supervisor can hand its own filter to every listener
//! process it starts.

use log::LevelFilter;

use crate::config::LogConfig;

/// Environment variable carrying the filter spec to listener processes.
pub const LOG_SPEC_ENV: &str = "RAX_SHARE_LOG_SPEC";

const CRATE_TARGET: &str = "rax_share";

/// Engine crates whose own logging is only shown from `warn` up.
const THIRD_PARTY: [&str; 4] = ["libunftp", "unftp_sbe_fs", "russh", "russh_sftp"];

/// Log target prefix of a configurable component.
pub fn component_target(component: &str) -> Option<&'static str> {
    match component.to_ascii_lowercase().as_str() {
        "supervisor" => Some("rax_share::supervisor"),
        "server" => Some("rax_share::server"),
        "http" => Some("rax_share::http"),
        "ingest" => Some("rax_share::ingest"),
        "ftp" => Some("rax_share::engines::ftp"),
        "sftp" => Some("rax_share::engines::sftp"),
        "smb" => Some("rax_share::engines::smb"),
        "security" => Some("rax_share::security"),
        _ => None,
    }
}

/// Builds the filter spec for `log`. Each `-v` raises the crate-wide level
/// one step above the configured one.
pub fn filter_spec(log: &LogConfig, verbosity: u8) -> String {
    let mut level = log.level.parse().unwrap_or(LevelFilter::Info);
    for _ in 0..verbosity {
        level = match level {
            LevelFilter::Off | LevelFilter::Error => LevelFilter::Warn,
            LevelFilter::Warn => LevelFilter::Info,
            LevelFilter::Info => LevelFilter::Debug,
            LevelFilter::Debug | LevelFilter::Trace => LevelFilter::Trace,
        };
    }

    let mut directives = vec![format!("{}={}", CRATE_TARGET, level)];
    directives.extend(THIRD_PARTY.iter().map(|krate| format!("{}=warn", krate)));

    let mut components: Vec<_> = log.components.iter().collect();
    components.sort();
    for (component, component_level) in components {
        match (
            component_target(component),
            component_level.parse::<LevelFilter>(),
        ) {
            (Some(target), Ok(component_level)) => {
                directives.push(format!("{}={}", target, component_level))
            }
            _ => eprintln!(
                "Ignoring log setting {} = {:?}",
                component, component_level
            ),
        }
    }

    format!("warn,{}", directives.join(","))
}

/// Initialize logging from a filter spec. `RUST_LOG`, when set, is applied
/// after the spec and wins.
pub fn init(spec: &str) {
    let _ = env_logger::Builder::new()
        .parse_filters(spec)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}
