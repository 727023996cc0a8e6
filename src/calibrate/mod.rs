use std::fs;
use std::hint::black_box;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// File name of the per-user calibration cache.
pub const CACHE_FILE_NAME: &str = ".wk-calibrate";

/// Duration the cached calibration is measured against.
pub const CALIBRATION_TARGET: Duration = Duration::from_millis(10);

/// Turns the 10ms calibration into units per millisecond.
pub const CALIBRATION_DIVISOR: u64 = 10;

/// Used when the clock cannot resolve the calibration loop at all.
pub const DEFAULT_UNITS_PER_MS: u64 = 100_000;

const CALIBRATION_SEED: u64 = 1 << 10;
const CALIBRATION_CEILING: u64 = 1 << 30;

/// Burns `units` iterations of a trivial loop.
pub fn hog(units: u64) -> u64 {
    let mut acc = 0u64;
    for _ in 0..units {
        acc = black_box(acc + 1);
    }
    acc
}

/// Returns how many `hog` iterations take roughly `target` on this machine.
///
/// The loop length doubles until a single measurement covers at least a
/// quarter of the target, then the count is scaled linearly.
pub fn calibrate(target: Duration) -> u64 {
    calibrate_with(target, |units| {
        let start = Instant::now();
        hog(units);
        start.elapsed()
    })
}

/// Calibration against an arbitrary timing of `units` iterations. Gives up
/// doubling at `CALIBRATION_CEILING` units and falls back to
/// `DEFAULT_UNITS_PER_MS` when no run was measurable.
fn calibrate_with<F>(target: Duration, mut measure: F) -> u64
where
    F: FnMut(u64) -> Duration,
{
    let target_nanos = target.as_nanos();
    let mut units = CALIBRATION_SEED;

    loop {
        let elapsed = measure(units).as_nanos();
        let at_ceiling = units >= CALIBRATION_CEILING;

        if elapsed > 0 && (elapsed * 4 >= target_nanos || at_ceiling) {
            let scaled = units as u128 * target_nanos / elapsed;
            debug!(units, elapsed_ns = elapsed as u64, scaled = scaled as u64, "calibration sample");
            return u64::try_from(scaled).unwrap_or(u64::MAX).max(1);
        }

        if at_ceiling {
            warn!("clock did not resolve calibration loop, using default");
            return DEFAULT_UNITS_PER_MS * (target.as_millis() as u64).max(1);
        }
        units *= 2;
    }
}

/// Location of the persisted calibration value.
#[derive(Debug, Clone)]
pub struct CalibrationCache {
    path: Option<PathBuf>,
}

impl CalibrationCache {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// `$HOME/.wk-calibrate`, or no cache when there is no home directory.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME")
            .filter(|home| !home.is_empty())
            .map(|home| PathBuf::from(home).join(CACHE_FILE_NAME))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the cached units-per-millisecond value, computing and storing
    /// it first when no cache file exists. Cache I/O failures only cost a
    /// recalibration. Concurrent first runs are not serialized; the last
    /// writer wins.
    pub fn load_or_compute(&self) -> u64 {
        let Some(path) = self.path.as_deref() else {
            debug!("no calibration cache path, calibrating");
            return fresh_units_per_ms();
        };
        info!("Calibration cache at {}", path.display());

        if path.is_file() {
            match read_cached(path) {
                Ok(units) => {
                    debug!(units, "reusing cached calibration");
                    return units;
                }
                Err(e) => {
                    warn!("Ignoring unreadable calibration cache {}: {}", path.display(), e);
                    return fresh_units_per_ms();
                }
            }
        }

        let units = fresh_units_per_ms();
        if let Err(e) = fs::write(path, units.to_ne_bytes()) {
            warn!("Could not write calibration cache {}: {}", path.display(), e);
        }
        units
    }
}

fn fresh_units_per_ms() -> u64 {
    (calibrate(CALIBRATION_TARGET) / CALIBRATION_DIVISOR).max(1)
}

fn read_cached(path: &Path) -> io::Result<u64> {
    let bytes = fs::read(path)?;
    let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected 8 bytes, found {}", bytes.len()),
        )
    })?;
    Ok(u64::from_ne_bytes(raw))
}
