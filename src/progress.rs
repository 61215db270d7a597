//! Progress reporting shared by the download engine and the export pipeline.

/// Which step of an operation a progress update belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Bytes arriving from the network.
    Transfer,
    StageBundle,
    StageContainer,
    WriteDescriptor,
    /// Packing the staged workspace into the output archive.
    Compress,
    /// The operation finished; always reported with `1.0`.
    Done,
}

/// A single `{phase, fraction}` event. `fraction` is always within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub phase: Phase,
    pub fraction: f64,
}

impl ProgressUpdate {
    pub fn new(phase: Phase, fraction: f64) -> Self {
        Self {
            phase,
            fraction: fraction.clamp(0.0, 1.0),
        }
    }
}

/// Wraps a caller's progress callback.
///
/// Reported fractions never decrease, and the callback is released as soon
/// as a fraction of `1.0` has been delivered; later reports are dropped.
pub struct ProgressReporter<'a> {
    callback: Option<Box<dyn FnMut(ProgressUpdate) + Send + 'a>>,
    last: f64,
}

impl<'a> ProgressReporter<'a> {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(ProgressUpdate) + Send + 'a,
    {
        Self {
            callback: Some(Box::new(callback)),
            last: 0.0,
        }
    }

    pub fn report(&mut self, phase: Phase, fraction: f64) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };

        let update = ProgressUpdate::new(phase, fraction.max(self.last));
        self.last = update.fraction;
        callback(update);

        if update.fraction >= 1.0 {
            self.callback = None;
        }
    }
}

/// Fraction of a transfer, or `None` while the total size is unknown.
pub fn transfer_fraction(received: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(0) | None => None,
        Some(total) => Some((received as f64 / total as f64).min(1.0)),
    }
}
