//! Logging backend which writes to a file next to the plugin.

use chrono::Local;
use log::{Level, Metadata, Record};
use once_cell::sync::OnceCell;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::{mpsc, Mutex},
};

struct Message {
    module: String,
    level: Level,
    string: String,
    time: String,
}

impl Message {
    fn from_record(record: &Record) -> Message {
        Message {
            module: record
                .module_path()
                .and_then(|path| path.split("::").last())
                .unwrap_or("unknown")
                .to_string(),
            level: record.level(),
            string: format!("{}", record.args()),
            time: Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        }
    }

    fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        let level_name = match self.level {
            Level::Error => "error",
            Level::Warn => "warning",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        };

        //      [date time] [module] [level] Text
        writeln!(
            out,
            "[{}] [{}] [{}] {}",
            self.time, self.module, level_name, self.string
        )
    }
}

pub struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        if let Some(sender) = MSG_SENDER.get() {
            if let Ok(sender) = sender.lock() {
                // The writer thread only goes away with the process.
                let _ = sender.send(Message::from_record(record));
            }
        }
    }

    fn flush(&self) {}
}

static LOGGER: Logger = Logger;
static MSG_SENDER: OnceCell<Mutex<mpsc::Sender<Message>>> = OnceCell::new();

fn panic_report(location: &str, message: &str, backtrace: &backtrace::Backtrace) -> String {
    format!("panic at {location}: {message}\nBacktrace:\n{backtrace:?}")
}

fn panic_hook(info: &std::panic::PanicHookInfo) {
    let message = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "no message".to_string());

    let location = info
        .location()
        .map(|location| location.to_string())
        .unwrap_or_else(|| "unknown location".to_string());

    log::error!(
        "{}",
        panic_report(&location, &message, &backtrace::Backtrace::new())
    );
}

/// Writes the header line that starts every log file.
fn write_header(out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "SC4NoKickOut v{}", env!("CARGO_PKG_VERSION"))?;
    out.flush()
}

/// Starts logging to the file at `path`, replacing anything from a previous session.
pub fn init(path: &Path, level: log::LevelFilter) -> eyre::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    write_header(&mut file)?;

    log::set_logger(&LOGGER)?;

    let (sender, receiver) = mpsc::channel::<Message>();

    if MSG_SENDER.set(Mutex::new(sender)).is_err() {
        eyre::bail!("logging is already initialised");
    }

    log::set_max_level(if cfg!(feature = "debug") {
        log::LevelFilter::Trace
    } else {
        level
    });

    // Keep file writes off the game's thread.
    std::thread::spawn(move || {
        for msg in receiver {
            let _ = msg.write_to(&mut file);
            let _ = file.flush();
        }
    });

    std::panic::set_hook(Box::new(panic_hook));

    Ok(())
}
