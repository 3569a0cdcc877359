use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicU64, Ordering};

use engine_logging::engine_info;

/// Named counters tracked for every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    RecordsProcessed,
    RecordsParsingFailed,
    RecordsNonHtml,
    WarcInputProcessed,
    WarcInputFailed,
}

impl Counter {
    pub const ALL: [Counter; 5] = [
        Counter::WarcInputProcessed,
        Counter::WarcInputFailed,
        Counter::RecordsProcessed,
        Counter::RecordsParsingFailed,
        Counter::RecordsNonHtml,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Counter::RecordsProcessed => "records_processed",
            Counter::RecordsParsingFailed => "records_parsing_failed",
            Counter::RecordsNonHtml => "records_non_html",
            Counter::WarcInputProcessed => "warc_input_processed",
            Counter::WarcInputFailed => "warc_input_failed",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Counter::RecordsProcessed => "WARC/WAT/WET records processed",
            Counter::RecordsParsingFailed => "records failed to parse",
            Counter::RecordsNonHtml => "records not HTML",
            Counter::WarcInputProcessed => "WARC/WAT/WET input files processed",
            Counter::WarcInputFailed => "WARC/WAT/WET input files failed",
        }
    }

    fn index(self) -> usize {
        match self {
            Counter::RecordsProcessed => 0,
            Counter::RecordsParsingFailed => 1,
            Counter::RecordsNonHtml => 2,
            Counter::WarcInputProcessed => 3,
            Counter::WarcInputFailed => 4,
        }
    }
}

/// Increment-only counters, safe to update from many threads at once.
///
/// Increments are relaxed: no ordering is promised between counters, and values
/// are only meaningful once every writer has finished.
#[derive(Debug, Default)]
pub struct Counters {
    values: [AtomicU64; 5],
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, counter: Counter) {
        self.add(counter, 1);
    }

    pub fn add(&self, counter: Counter, amount: u64) {
        self.values[counter.index()].fetch_add(amount, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let read = |counter: Counter| self.values[counter.index()].load(Ordering::Relaxed);
        CounterSnapshot {
            records_processed: read(Counter::RecordsProcessed),
            records_parsing_failed: read(Counter::RecordsParsingFailed),
            records_non_html: read(Counter::RecordsNonHtml),
            warc_input_processed: read(Counter::WarcInputProcessed),
            warc_input_failed: read(Counter::WarcInputFailed),
        }
    }
}

/// Plain counter values, combined across partitions by summation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterSnapshot {
    pub records_processed: u64,
    pub records_parsing_failed: u64,
    pub records_non_html: u64,
    pub warc_input_processed: u64,
    pub warc_input_failed: u64,
}

impl CounterSnapshot {
    pub fn get(&self, counter: Counter) -> u64 {
        match counter {
            Counter::RecordsProcessed => self.records_processed,
            Counter::RecordsParsingFailed => self.records_parsing_failed,
            Counter::RecordsNonHtml => self.records_non_html,
            Counter::WarcInputProcessed => self.warc_input_processed,
            Counter::WarcInputFailed => self.warc_input_failed,
        }
    }

    /// Logs every counter on its own line, e.g. `records not HTML = 4`.
    pub fn log_summary(&self) {
        for counter in Counter::ALL {
            engine_info!("{} = {}", counter.description(), self.get(counter));
        }
    }
}

impl Add for CounterSnapshot {
    type Output = CounterSnapshot;

    fn add(mut self, rhs: CounterSnapshot) -> CounterSnapshot {
        self += rhs;
        self
    }
}

impl AddAssign for CounterSnapshot {
    fn add_assign(&mut self, rhs: CounterSnapshot) {
        self.records_processed += rhs.records_processed;
        self.records_parsing_failed += rhs.records_parsing_failed;
        self.records_non_html += rhs.records_non_html;
        self.warc_input_processed += rhs.warc_input_processed;
        self.warc_input_failed += rhs.warc_input_failed;
    }
}

impl Sum for CounterSnapshot {
    fn sum<I: Iterator<Item = CounterSnapshot>>(iter: I) -> Self {
        iter.fold(CounterSnapshot::default(), Add::add)
    }
}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for counter in Counter::ALL {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}={}", counter.name(), self.get(counter))?;
        }
        Ok(())
    }
}
