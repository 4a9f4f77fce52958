use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Utc;
use once_cell::sync::OnceCell;

/// Optional file sink; messages always go to the console regardless.
static FILE_SINK: OnceCell<Mutex<FileSink>> = OnceCell::new();

struct FileSink {
    log_path: PathBuf,
    err_path: PathBuf,
}

/// Attach a file sink to the logger. Errors and warnings go to `err_path`,
/// everything else to `log_path`. May be called at most once; later calls
/// are ignored.
pub fn init_file_sink(log_path: PathBuf, err_path: PathBuf) -> Result<(), String> {
    for path in [&log_path, &err_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create log directory: {}", e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("Cannot write to log file {}: {}", path.display(), e))?;
    }
    let _ = FILE_SINK.set(Mutex::new(FileSink { log_path, err_path }));
    Ok(())
}

pub fn write(level: &str, message: &str) {
    match level {
        "ERROR" | "WARN" => eprintln!("[{}] {}", level, message),
        _ => println!("[{}] {}", level, message),
    }

    if let Some(sink) = FILE_SINK.get() {
        if let Ok(sink) = sink.lock() {
            let path = match level {
                "ERROR" | "WARN" => &sink.err_path,
                _ => &sink.log_path,
            };
            let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
            let entry = format!("[{}] [{}] {}\n", stamp, level, message);
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = file.write_all(entry.as_bytes());
            }
        }
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::write("INFO", &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::write("WARN", &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::write("ERROR", &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::write("DEBUG", &format!($($arg)*))
    };
}
