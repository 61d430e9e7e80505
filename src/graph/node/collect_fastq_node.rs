use log::trace;
use thread_local::*;

use std::cell::RefCell;
use std::sync::Arc;

use crate::fastq::*;
use crate::graph::*;
use crate::read::Correction;
use crate::routing::*;
use crate::stats::Stats;

const UNMATCHED: &[u8] = b"unmatched";
const UNASSIGNED: &[u8] = b"unassigned";

pub struct CollectFastqNode {
    routing: Arc<RoutingTable>,
    stats: ThreadLocal<RefCell<Stats>>,
}

impl CollectFastqNode {
    const NAME: &'static str = "CollectFastqNode";

    /// Write every surviving read to the file of its bucket and count what happened to it.
    pub fn new(routing: Arc<RoutingTable>) -> Self {
        Self {
            routing,
            stats: ThreadLocal::new(),
        }
    }

    /// Merge the counts of all threads.
    pub fn stats(&mut self) -> Stats {
        let mut res = Stats::default();
        for s in self.stats.iter_mut() {
            res.merge(&s.borrow());
        }
        res
    }

    fn count(stats: &mut Stats, read: &Read) {
        stats.reads_total += 1;
        match read.status {
            Status::Malformed(_) => {
                stats.malformed += 1;
                return;
            }
            Status::TooShort => stats.too_short += 1,
            Status::Unmatched => stats.unmatched += 1,
            Status::TooLong => stats.too_long += 1,
            Status::Unassigned => stats.unassigned += 1,
            Status::Pending | Status::Assigned => (),
        }

        if read.hit5.is_some() || read.hit3.is_some() {
            stats.matched += 1;
        }
        if read.reversed {
            stats.reversed += 1;
        }
        if [&read.hit5, &read.hit3]
            .iter()
            .any(|h| h.as_ref().is_some_and(|h| h.overhang > 0))
        {
            stats.partial += 1;
        }
        if read.barcode.is_some() || read.correction.is_some() {
            stats.decoded += 1;
        }
        match read.correction {
            Some(Correction::Corrected(_)) => stats.corrected += 1,
            Some(Correction::Miss) => stats.whitelist_misses += 1,
            _ => (),
        }
        if read.umi.is_some() {
            stats.with_umi += 1;
        }
    }
}

/// Bucket a read belongs in, before the routing table has a say.
fn bucket(read: &Read) -> &[u8] {
    match (&read.status, &read.barcode) {
        (Status::Unmatched | Status::TooLong, _) => UNMATCHED,
        (_, Some(barcode)) => barcode.as_slice(),
        _ => UNASSIGNED,
    }
}

impl GraphNode for CollectFastqNode {
    fn run(&self, read: Option<Read>) -> Result<(Option<Read>, bool)> {
        let Some(read) = read else { panic!("Expected some read!") };

        let stats = self.stats.get_or(|| RefCell::new(Stats::default()));
        let mut stats = stats.borrow_mut();
        Self::count(&mut stats, &read);
        if read.status.is_dropped() {
            return Ok((Some(read), false));
        }

        let wanted = bucket(&read);
        let route = self.routing.route(wanted)?;
        {
            let mut writer = route.writer.lock().unwrap();
            write_fastq_record(&mut *writer, &read.name, &read.tags, &read.seq, &read.qual)
                .map_err(|e| Error::FileIo {
                    file: self.routing.path(wanted).display().to_string(),
                    source: Box::new(e),
                })?;
        }

        trace!(
            "read {} written to \"{}\" after {:?}",
            read.idx,
            utf8(if route.overflow { OVERFLOW } else { wanted }),
            read.start_time.elapsed()
        );

        stats.written += 1;
        if route.overflow {
            stats.overflow += 1;
            stats.add_to_bucket(OVERFLOW);
        } else {
            stats.add_to_bucket(wanted);
        }

        Ok((Some(read), false))
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(seq: &[u8], status: Status, barcode: Option<&[u8]>) -> Read {
        let qual = vec![b'I'; seq.len()];
        let mut read = Read::from_fastq(b"r", seq, Some(&qual[..]), Arc::new(Origin::Bytes), 0);
        read.status = status;
        read.barcode = barcode.map(|b| b.to_owned());
        read
    }

    #[test]
    fn writes_buckets_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let routing = Arc::new(RoutingTable::new(dir.path(), "", false, 8).unwrap());
        let mut node = CollectFastqNode::new(Arc::clone(&routing));

        for r in [
            read(b"ACGT", Status::Assigned, Some(&b"GTCA"[..])),
            read(b"ACGA", Status::Assigned, Some(&b"GTCA"[..])),
            read(b"CCCC", Status::Unmatched, None),
            read(b"GGGG", Status::Unassigned, None),
            read(b"TT", Status::TooShort, Some(&b"GTCA"[..])),
            read(b"", Status::Malformed("empty sequence"), None),
            read(b"ACGTACGT", Status::TooLong, None),
        ] {
            node.run(Some(r)).unwrap();
        }
        routing.close().unwrap();

        let stats = node.stats();
        assert_eq!(stats.reads_total, 7);
        assert_eq!(stats.written, 5);
        assert_eq!(stats.too_long, 1);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.too_short, 1);
        assert_eq!(stats.unmatched, 1);
        assert_eq!(stats.unassigned, 1);
        assert_eq!(stats.buckets["GTCA"], 2);
        assert_eq!(stats.buckets["unmatched"], 2);
        assert_eq!(stats.buckets["unassigned"], 1);

        let gtca = std::fs::read_to_string(dir.path().join("GTCA.fastq")).unwrap();
        assert_eq!(gtca, "@r\nACGT\n+\nIIII\n@r\nACGA\n+\nIIII\n");
    }

    #[test]
    fn counts_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let routing = Arc::new(RoutingTable::new(dir.path(), "", false, 2).unwrap());
        let mut node = CollectFastqNode::new(Arc::clone(&routing));

        for b in [&b"AAAA"[..], b"CCCC", b"GGGG"] {
            node.run(Some(read(b"ACGT", Status::Assigned, Some(b)))).unwrap();
        }
        routing.close().unwrap();

        let stats = node.stats();
        assert_eq!(stats.overflow, 2);
        assert_eq!(stats.buckets["AAAA"], 1);
        assert_eq!(stats.buckets["overflow"], 2);
        assert!(dir.path().join("overflow.fastq").exists());
    }
}
