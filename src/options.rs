//! Collector configuration, grounded on the teacher crate's
//! `SerialOptions` (a plain struct with a `Default` impl, set up once
//! at construction time — no file-format parsing, matching the
//! teacher's ambient-config style).

pub struct CollectorOptions {
    /// Initial size, in bytes, of each copying-region semispace.
    pub semispace_size: usize,
    /// Payloads at or above this size go to the large region (C6)
    /// instead of the copying region (C4).
    pub large_threshold: usize,
    /// Print one line per collection to stderr (pause kind, bytes
    /// reclaimed, elapsed time), matching the teacher's
    /// `verbose: bool` + `eprintln!()` logging idiom.
    pub verbose: bool,
    /// Forces `Header::check()` validation on every arena scan, even in
    /// release builds. Off by default per the "`check()` vs.
    /// performance" design note.
    pub force_checks: bool,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            semispace_size: 16 * 1024 * 1024,
            large_threshold: 128 * 1024,
            verbose: false,
            force_checks: false,
        }
    }
}

impl CollectorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_large_threshold(mut self, bytes: usize) -> Self {
        self.large_threshold = bytes.max(4 * 1024);
        self
    }

    pub fn with_semispace_size(mut self, bytes: usize) -> Self {
        self.semispace_size = bytes;
        self
    }
}
