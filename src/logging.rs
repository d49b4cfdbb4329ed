use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Logging for one run: stderr plus `<dir>/<start time>.log`.
/// Events stop reaching the file once this is dropped.
pub struct RunLog {
    path: Option<PathBuf>,
    started: Instant,
    _guard: DefaultGuard,
}

impl RunLog {
    pub fn start(log_dir: Option<&Path>) -> Result<Self> {
        let started_at = Local::now();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

        let (file_layer, path) = match log_dir {
            Some(dir) => {
                fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
                let path = dir.join(format!("{}.log", started_at.format("%Y-%m-%d_%H-%M-%S")));
                let file =
                    File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
                let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
                (Some(layer), Some(path))
            }
            None => (None, None),
        };

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(file_layer);
        let guard = tracing::subscriber::set_default(subscriber);

        Ok(RunLog {
            path,
            started: Instant::now(),
            _guard: guard,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Log the total running time and tear the run's logging down.
    pub fn finish(self) {
        info!("---End of Script---");
        info!("Running time: {}", format_duration(self.started.elapsed()));
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
