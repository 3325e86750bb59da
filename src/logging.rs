// Logger setup
//
// env_logger behind the `log` facade. The level comes from config.toml and
// RUST_LOG overrides it. With `log_to_file` every line also goes to the
// (truncated) log file, which is handy for capturing validation output.

use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};

use crate::config::DebugConfig;

/// Writes every byte to both sinks
pub struct TeeWriter<A, B> {
    primary: A,
    mirror: B,
}

impl<A: Write, B: Write> TeeWriter<A, B> {
    pub fn new(primary: A, mirror: B) -> Self {
        Self { primary, mirror }
    }
}

impl<A: Write, B: Write> Write for TeeWriter<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.primary.write_all(buf)?;
        self.mirror.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.mirror.flush()
    }
}

/// Unknown names fall back to `info`
pub fn parse_level(name: &str) -> LevelFilter {
    name.parse().unwrap_or(LevelFilter::Info)
}

fn open_log_file(path: &str) -> io::Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    writeln!(file, "=== vkframe log ===")?;
    writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
    writeln!(file)?;
    Ok(file)
}

/// Install the global logger. Later calls are ignored.
pub fn init_logging(config: &DebugConfig) {
    let level = parse_level(&config.log_level);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(level).parse_default_env();

    let file_error = if config.log_to_file {
        match open_log_file(&config.log_file) {
            Ok(file) => {
                let tee = TeeWriter::new(io::stderr(), file);
                builder.target(env_logger::Target::Pipe(Box::new(tee)));
                None
            }
            Err(e) => Some(e),
        }
    } else {
        None
    };

    if builder.try_init().is_err() {
        return;
    }

    if level.to_string() != config.log_level.to_uppercase() {
        log::warn!("Unknown log level '{}', using {}", config.log_level, level);
    }
    if let Some(e) = file_error {
        log::warn!("Could not open log file {}: {}", config.log_file, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tee_writes_both_sinks() {
        let mut tee = TeeWriter::new(Vec::new(), Vec::new());

        write!(tee, "validation: {}", 42).unwrap();
        tee.flush().unwrap();

        assert_eq!(tee.primary, b"validation: 42");
        assert_eq!(tee.mirror, b"validation: 42");
    }

    #[test]
    fn level_names_parse() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
        assert_eq!(parse_level("WARN"), LevelFilter::Warn);
        assert_eq!(parse_level("off"), LevelFilter::Off);
        assert_eq!(parse_level("loud"), LevelFilter::Info);
    }

    #[test]
    fn repeated_init_is_harmless() {
        let config = DebugConfig::default();

        init_logging(&config);
        init_logging(&config);
        log::info!("still logging");
    }
}
