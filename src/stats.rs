use colored::Colorize;
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fmt;

/// Counters for one demultiplexing run.
///
/// Every worker keeps its own copy and the copies are merged once all workers are done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Stats {
    pub reads_total: usize,
    /// At least one adapter was found.
    pub matched: usize,
    pub unmatched: usize,
    /// Confidently decoded tags.
    pub decoded: usize,
    pub unassigned: usize,
    /// Tags changed to a whitelist barcode.
    pub corrected: usize,
    pub whitelist_misses: usize,
    /// Reads whose bucket did not fit in the routing table.
    pub overflow: usize,
    pub malformed: usize,
    pub too_short: usize,
    /// Reads longer than the configured cap, left unsearched.
    pub too_long: usize,
    pub reversed: usize,
    /// Reads with an adapter hanging off one of the ends.
    pub partial: usize,
    pub with_umi: usize,
    pub written: usize,
    /// Reads written per bucket, after overflow redirection.
    pub buckets: BTreeMap<String, usize>,
    /// Reading stopped early because the input could not be parsed any further.
    pub truncated: bool,
}

impl Stats {
    pub fn merge(&mut self, other: &Stats) {
        self.reads_total += other.reads_total;
        self.matched += other.matched;
        self.unmatched += other.unmatched;
        self.decoded += other.decoded;
        self.unassigned += other.unassigned;
        self.corrected += other.corrected;
        self.whitelist_misses += other.whitelist_misses;
        self.overflow += other.overflow;
        self.malformed += other.malformed;
        self.too_short += other.too_short;
        self.too_long += other.too_long;
        self.reversed += other.reversed;
        self.partial += other.partial;
        self.with_umi += other.with_umi;
        self.written += other.written;
        for (bucket, count) in &other.buckets {
            *self.buckets.entry(bucket.clone()).or_default() += count;
        }
        self.truncated |= other.truncated;
    }

    pub fn add_to_bucket(&mut self, bucket: &[u8]) {
        *self
            .buckets
            .entry(String::from_utf8_lossy(bucket).into_owned())
            .or_default() += 1;
    }

    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(self)
    }
}

fn pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * count as f64 / total as f64
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let total = self.reads_total;
        writeln!(f, "{} {}", "reads".bold(), total)?;
        if self.truncated {
            writeln!(f, "  {}", "input truncated by unparsable records".red())?;
        }

        let rows = [
            ("matched", self.matched),
            ("unmatched", self.unmatched),
            ("decoded", self.decoded),
            ("unassigned", self.unassigned),
            ("corrected", self.corrected),
            ("whitelist misses", self.whitelist_misses),
            ("overflow", self.overflow),
            ("malformed", self.malformed),
            ("too short", self.too_short),
            ("too long", self.too_long),
            ("reversed", self.reversed),
            ("partial", self.partial),
            ("with umi", self.with_umi),
            ("written", self.written),
        ];
        for (name, count) in rows {
            writeln!(f, "  {:<18}{:>10} {:>6.2}%", name, count, pct(count, total))?;
        }

        writeln!(f, "{} {}", "buckets".bold(), self.buckets.len())?;
        for (bucket, count) in &self.buckets {
            writeln!(f, "  {:<18}{:>10}", bucket.green(), count)?;
        }
        Ok(())
    }
}
