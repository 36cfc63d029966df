//! Collector statistics (component C12), grounded on the reference
//! implementation's `private/gcstat.hxx` (`statistics::report`) and the
//! teacher crate's `statistics::HeapStatistics` (byte-size formatting,
//! multi-line `Display` report).

use std::fmt;
use std::time::Duration;

#[derive(Default)]
pub struct Statistics {
    pub num_allocs: u64,
    pub num_deallocs: u64,
    pub num_freezes: u64,
    pub num_unfreezes: u64,
    pub num_gc: u64,
    pub bytes_allocated_total: u64,
    pub bytes_allocated_current: u64,
    pub bytes_reclaimed_total: u64,
    pub time_gc: Duration,
    pub in_gc: bool,
}

impl Statistics {
    pub fn record_alloc(&mut self, sz: usize) {
        self.num_allocs += 1;
        self.bytes_allocated_total += sz as u64;
        self.bytes_allocated_current += sz as u64;
    }

    pub fn record_dealloc(&mut self, sz: usize) {
        self.num_deallocs += 1;
        self.bytes_allocated_current = self.bytes_allocated_current.saturating_sub(sz as u64);
        self.bytes_reclaimed_total += sz as u64;
    }

    pub fn record_freeze(&mut self) {
        self.num_freezes += 1;
    }

    pub fn record_unfreeze(&mut self) {
        self.num_unfreezes += 1;
    }

    pub fn record_gc(&mut self, elapsed: Duration) {
        self.num_gc += 1;
        self.time_gc += elapsed;
    }
}

struct FormattedSize(u64);

impl fmt::Display for FormattedSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ksize = self.0 as f64 / 1024.0;
        if ksize < 1.0 {
            return write!(f, "{}B", self.0);
        }
        let msize = ksize / 1024.0;
        if msize < 1.0 {
            return write!(f, "{:.1}K", ksize);
        }
        let gsize = msize / 1024.0;
        if gsize < 1.0 {
            write!(f, "{:.1}M", msize)
        } else {
            write!(f, "{:.1}G", gsize)
        }
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "driftgc statistics:")?;
        writeln!(f, "  allocations: {}", self.num_allocs)?;
        writeln!(f, "  deallocations: {}", self.num_deallocs)?;
        writeln!(f, "  freezes: {}", self.num_freezes)?;
        writeln!(f, "  unfreezes: {}", self.num_unfreezes)?;
        writeln!(f, "  collections: {}", self.num_gc)?;
        writeln!(
            f,
            "  currently allocated: {}",
            FormattedSize(self.bytes_allocated_current)
        )?;
        writeln!(
            f,
            "  total allocated: {}",
            FormattedSize(self.bytes_allocated_total)
        )?;
        writeln!(
            f,
            "  total reclaimed: {}",
            FormattedSize(self.bytes_reclaimed_total)
        )?;
        writeln!(f, "  time in gc: {:?}", self.time_gc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_report_without_panicking() {
        let mut stats = Statistics::default();
        stats.record_alloc(128);
        stats.record_gc(Duration::from_millis(1));
        let rendered = format!("{}", stats);
        assert!(rendered.contains("collections: 1"));
    }
}
