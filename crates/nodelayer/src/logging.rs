use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Append-only log file that is reopened if something deletes it underneath
/// a long-running server.
struct ReopeningFileWriter {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl ReopeningFileWriter {
    fn open(path: PathBuf) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    fn with_file<T>(&self, op: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut guard = self
            .file
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if guard.is_none() || !self.path.exists() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            *guard = Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?,
            );
        }

        match guard.as_mut() {
            Some(file) => op(file),
            None => Err(io::Error::other("log file not available")),
        }
    }
}

impl Write for ReopeningFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(File::flush)
    }
}

/// Keep the newest half of `log_path`, cut at a line boundary, once it grows
/// past `max_size` bytes.
fn trim_oversized_log(log_path: &Path, max_size: u64) {
    if let Ok(metadata) = std::fs::metadata(log_path)
        && metadata.len() > max_size
        && let Ok(contents) = std::fs::read(log_path)
    {
        let half = contents.len() / 2;
        let keep_from = contents[half..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(half, |pos| half + pos + 1);
        let _ = std::fs::write(log_path, &contents[keep_from..]);
    }
}

/// Open the log file for appending, first trimming it when `trim_above` is
/// set and the file is larger.
fn open_log_file(log_path: &Path, trim_above: Option<u64>) -> io::Result<ReopeningFileWriter> {
    if let Some(max_size) = trim_above {
        trim_oversized_log(log_path, max_size);
    }
    ReopeningFileWriter::open(log_path.to_path_buf())
}

fn level_for(debug_enabled: bool) -> LevelFilter {
    if debug_enabled {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Install the global logger: stderr when `terminal` is set, plus an
/// optional log file.
///
/// Stdout is never written to, a job child reports its archive path there.
/// Only the process that owns the log file passes `trim_above`; job children
/// append to it while the server is running.
pub fn init_logging(
    debug_enabled: bool,
    terminal: bool,
    log_path: Option<&Path>,
    trim_above: Option<u64>,
) {
    let level = level_for(debug_enabled);
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("nodelayer")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    if terminal {
        loggers.push(TermLogger::new(
            level,
            config.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }

    if let Some(log_path) = log_path {
        match open_log_file(log_path, trim_above) {
            Ok(writer) => loggers.push(WriteLogger::new(level, config, writer)),
            Err(error) => eprintln!("Log file {} unavailable: {error}", log_path.display()),
        }
    }

    let _ = CombinedLogger::init(loggers);
    log::set_max_level(level);

    if debug_enabled && let Some(log_path) = log_path {
        log::debug!("Debug logging enabled, log file: {}", log_path.display());
    }
}
