use log::trace;

use std::sync::Arc;

use crate::graph::*;
use crate::locate::*;
use crate::primers::*;

pub struct LocateAdaptersNode {
    locator: Locator,
    five_prime: Arc<PrimerSet>,
    three_prime: Arc<PrimerSet>,
    // tag length plus the largest drift
    tag_span: usize,
    max_read_bases: Option<usize>,
}

impl LocateAdaptersNode {
    const NAME: &'static str = "LocateAdaptersNode";

    /// Find the 5' adapter, orient the read so that it is on the forward strand, then look
    /// for the 3' adapter right after the tag.
    ///
    /// Reads longer than `max_read_bases` are not searched.
    pub fn new(
        locator: Locator,
        five_prime: Arc<PrimerSet>,
        three_prime: Arc<PrimerSet>,
        tag_span: usize,
        max_read_bases: Option<usize>,
    ) -> Self {
        Self {
            locator,
            five_prime,
            three_prime,
            tag_span,
            max_read_bases,
        }
    }

    /// Window after the 5' adapter where the 3' adapter can start and end.
    fn three_prime_window(&self, h5: &Hit) -> std::ops::Range<usize> {
        let longest = self.three_prime.max_len();
        h5.end..h5.end + self.tag_span + longest + self.locator.budget(longest)
    }
}

impl GraphNode for LocateAdaptersNode {
    fn run(&self, read: Option<Read>) -> Result<(Option<Read>, bool)> {
        let Some(mut read) = read else { panic!("Expected some read!") };
        if read.status.is_dropped() {
            return Ok((Some(read), false));
        }
        if self.max_read_bases.is_some_and(|max| read.len() > max) {
            trace!("read {}: {} bases, not searched", read.idx, read.len());
            read.status = Status::TooLong;
            return Ok((Some(read), false));
        }

        let mut h5 = self.locator.locate(&read.seq, &self.five_prime);
        if h5.as_ref().is_some_and(|h| h.reverse) {
            read.reverse_complement();
            h5 = self.locator.locate(&read.seq, &self.five_prime);
        }

        let h3 = match &h5 {
            Some(h5) => self.locator.locate_within(
                &read.seq,
                self.three_prime_window(h5),
                &self.three_prime,
                Strand::Forward,
            ),
            None => {
                let h3 = self.locator.locate(&read.seq, &self.three_prime);
                if h3.as_ref().is_some_and(|h| h.reverse) {
                    read.reverse_complement();
                    let len = read.len();
                    self.locator
                        .locate_within(&read.seq, 0..len, &self.three_prime, Strand::Forward)
                } else {
                    h3
                }
            }
        };

        if h5.is_none() && h3.is_none() {
            read.status = Status::Unmatched;
        }
        trace!(
            "read {}: 5' {:?} 3' {:?} reversed {}",
            read.idx,
            h5.as_ref().map(|h| h.range()),
            h3.as_ref().map(|h| h.range()),
            read.reversed
        );

        read.hit5 = h5;
        read.hit3 = h3;
        Ok((Some(read), false))
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}
