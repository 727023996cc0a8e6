use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default output file, relative to the working directory.
pub const DEFAULT_OUTPUT_FILE: &str = "rpc-stats.out";

/// One send timestamp per iteration. Sized once up front and filled in order.
#[derive(Debug)]
pub struct TimingSamples {
    stamps: Vec<Instant>,
    slots: usize,
}

impl TimingSamples {
    pub fn with_capacity(repeat: usize) -> Self {
        Self {
            stamps: Vec::with_capacity(repeat),
            slots: repeat,
        }
    }

    /// Records the current instant in the next free slot. Returns `None`
    /// without recording once every slot is taken; the sequence never grows.
    pub fn sample(&mut self) -> Option<Instant> {
        if self.stamps.len() >= self.slots {
            return None;
        }
        let now = Instant::now();
        self.stamps.push(now);
        Some(now)
    }

    pub fn capacity(&self) -> usize {
        self.slots
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Time between each pair of consecutive samples.
    pub fn deltas(&self) -> impl Iterator<Item = Duration> + '_ {
        self.stamps
            .windows(2)
            .map(|pair| pair[1].saturating_duration_since(pair[0]))
    }

    /// Writes `index,seconds.nanoseconds` for every consecutive pair.
    pub fn write_deltas<W: Write>(&self, out: &mut W) -> io::Result<usize> {
        let mut lines = 0;
        for (i, delta) in self.deltas().enumerate() {
            writeln!(out, "{},{}.{:09}", i, delta.as_secs(), delta.subsec_nanos())?;
            lines += 1;
        }
        Ok(lines)
    }

    /// Creates (or truncates) `path` and writes the deltas to it. Runs with
    /// fewer than two samples leave the file system untouched.
    pub fn save(&self, path: &Path) -> io::Result<usize> {
        if self.stamps.len() < 2 {
            return Ok(0);
        }
        let mut out = BufWriter::new(File::create(path)?);
        let lines = self.write_deltas(&mut out)?;
        out.flush()?;
        debug!("Wrote {} deltas to {}", lines, path.display());
        Ok(lines)
    }
}
