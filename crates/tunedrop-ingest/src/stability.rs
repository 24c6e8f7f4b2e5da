//! Espera a que un archivo deje de cambiar antes de tocarlo.
//!
//! El estado vive en [`StabilityTracker`], alimentado por un [`Sampler`];
//! [`StabilityDetector`] sólo pone el reloj.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use tokio::task::spawn_blocking;
use tracing::trace;

use crate::{config::WatcherConfig, error::StabilityError};

/// Observación de tamaño + mtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilitySample {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Fuente de muestras. `None` = la ruta ya no es un fichero regular.
/// Puede bloquear: el detector la llama desde `spawn_blocking`.
pub trait Sampler: Send + Sync {
    fn sample(&self, path: &Path) -> Option<StabilitySample>;
}

/// Muestras leídas del sistema de ficheros
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSampler;

impl Sampler for FsSampler {
    fn sample(&self, path: &Path) -> Option<StabilitySample> {
        let meta = std::fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        Some(StabilitySample {
            size: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pending,
    Ready,
    Vanished,
}

#[derive(Debug, Clone)]
pub struct StabilityTracker {
    path: PathBuf,
    last: Option<StabilitySample>,
    consecutive: u32,
    threshold: u32,
}

impl StabilityTracker {
    pub fn new(path: impl Into<PathBuf>, threshold: u32) -> Self {
        StabilityTracker {
            path: path.into(),
            last: None,
            consecutive: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn observe(&mut self, sample: Option<StabilitySample>) -> Verdict {
        let Some(sample) = sample else {
            return Verdict::Vanished;
        };

        match self.last {
            Some(prev) if prev == sample => self.consecutive += 1,
            _ => self.consecutive = 1,
        }
        self.last = Some(sample);

        if self.consecutive >= self.threshold {
            Verdict::Ready
        } else {
            Verdict::Pending
        }
    }
}

#[derive(Clone)]
pub struct StabilityDetector {
    sampler: Arc<dyn Sampler>,
    interval: Duration,
    threshold: u32,
    timeout: Option<Duration>,
}

impl fmt::Debug for StabilityDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StabilityDetector")
            .field("interval", &self.interval)
            .field("threshold", &self.threshold)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StabilityDetector {
    pub fn new(interval: Duration, threshold: u32) -> Self {
        StabilityDetector {
            sampler: Arc::new(FsSampler),
            interval,
            threshold,
            timeout: None,
        }
    }

    pub fn from_config(config: &WatcherConfig) -> Self {
        Self::new(config.poll_interval, config.stable_polls).with_timeout(config.stability_timeout)
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resuelve cuando `path` lleva `threshold` sondeos seguidos sin cambios.
    pub async fn await_stable(&self, path: &Path) -> Result<(), StabilityError> {
        match self.timeout {
            Some(after) => tokio::time::timeout(after, self.poll(path))
                .await
                .map_err(|_| StabilityError::TimedOut {
                    path: path.to_path_buf(),
                    after,
                })?,
            None => self.poll(path).await,
        }
    }

    async fn poll(&self, path: &Path) -> Result<(), StabilityError> {
        let mut tracker = StabilityTracker::new(path, self.threshold);

        loop {
            tokio::time::sleep(self.interval).await;

            match tracker.observe(self.sample(path).await) {
                Verdict::Pending => {
                    trace!(path = %path.display(), stable = tracker.consecutive(), "aún cambiando");
                }
                Verdict::Ready => return Ok(()),
                Verdict::Vanished => return Err(StabilityError::Vanished(path.to_path_buf())),
            }
        }
    }

    async fn sample(&self, path: &Path) -> Option<StabilitySample> {
        let sampler = self.sampler.clone();
        let owned = path.to_path_buf();
        match spawn_blocking(move || sampler.sample(&owned)).await {
            Ok(sample) => sample,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            // Runtime apagándose
            Err(_) => None,
        }
    }
}
