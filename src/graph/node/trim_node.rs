use std::sync::Arc;

use crate::config::{HeaderFormat, HeaderOpts, JoinLevel, UmiConfig};
use crate::graph::*;
use crate::locate::*;
use crate::primers::*;

pub struct TrimNode {
    join_level: JoinLevel,
    min_out_len: usize,
    umi: Option<UmiConfig>,
    header: HeaderOpts,
    locator: Locator,
    five_prime: Arc<PrimerSet>,
}

impl TrimNode {
    const NAME: &'static str = "TrimNode";

    /// Extract the UMI, record header tags and cut the read down to the insert.
    ///
    /// Reads that end up shorter than `min_out_len` are marked as too short. The locator and
    /// 5' primers are used to find the reverse complemented 5' adapter at the tail.
    pub fn new(
        join_level: JoinLevel,
        min_out_len: usize,
        umi: Option<UmiConfig>,
        header: HeaderOpts,
        locator: Locator,
        five_prime: Arc<PrimerSet>,
    ) -> Self {
        Self {
            join_level,
            min_out_len,
            umi,
            header,
            locator,
            five_prime,
        }
    }

    /// UMI window after the end of the 3' adapter, if it fits in the read.
    fn umi_range(&self, read: &Read) -> Option<std::ops::Range<usize>> {
        let umi = self.umi.as_ref()?;
        let anchor = read.hit3.as_ref()?.end as i64;
        let start = anchor + umi.context_from;
        let end = start + umi.nom_len as i64;
        let limit = anchor + umi.context_to.unwrap_or(umi.context_from + umi.nom_len as i64);

        if start < 0 || end > limit || end > read.len() as i64 {
            return None;
        }
        Some(start as usize..end as usize)
    }

    fn add_tags(&self, read: &mut Read) {
        if self.header.print_start {
            let len = read.len();
            let start = read.hit5.as_ref().map(|h| match read.reversed {
                true => len - h.end.min(len),
                false => h.start,
            });
            if let Some(start) = start {
                read.push_tag("ST:i", start.to_string().as_bytes());
            }
        }
        if self.header.preserve_tags {
            self.add_result_tags(read);
        }
        if self.header.format == HeaderFormat::Flames {
            if let Some(barcode) = &read.barcode {
                let mut name = barcode.clone();
                name.push(b'_');
                name.extend_from_slice(read.umi.as_deref().unwrap_or_default());
                name.push(b'#');
                name.extend_from_slice(&read.name);
                read.name = name;
            }
        }
    }

    fn add_result_tags(&self, read: &mut Read) {
        if let Some(decoded) = read.decoded.take() {
            read.push_tag("TG:Z", &decoded.tag);
            read.push_tag("CF:f", format!("{:.3}", decoded.confidence).as_bytes());
            read.decoded = Some(decoded);
        }
        if let Some(barcode) = read.barcode.take() {
            read.push_tag("BC:Z", &barcode);
            read.barcode = Some(barcode);
        }
        if let Some(umi) = read.umi.take() {
            read.push_tag("UM:Z", &umi);
            read.umi = Some(umi);
        }
    }

    /// End of the prefix that is cut away.
    fn cut_point(&self, read: &Read) -> usize {
        use JoinLevel::*;
        let h5 = read.hit5.as_ref().map(|h| h.end);
        let h3 = read.hit3.as_ref().map(|h| h.end);
        match self.join_level {
            Keep => 0,
            FivePrime => h5.unwrap_or(0),
            Tag | Tail => h3.or(h5).unwrap_or(0),
        }
    }
}

impl GraphNode for TrimNode {
    fn run(&self, read: Option<Read>) -> Result<(Option<Read>, bool)> {
        let Some(mut read) = read else { panic!("Expected some read!") };
        if read.status.is_dropped() {
            return Ok((Some(read), false));
        }

        if let Some(range) = self.umi_range(&read) {
            read.umi = Some(read.seq[range].to_owned());
        }
        self.add_tags(&mut read);

        if !matches!(read.status, Status::Unmatched | Status::TooLong) {
            let cut = self.cut_point(&read);

            if self.join_level == JoinLevel::Tail {
                let len = read.len();
                if let Some(tail) =
                    self.locator
                        .locate_within(&read.seq, cut..len, &self.five_prime, Strand::Reverse)
                {
                    read.splice_out(tail.start, len);
                }
            }
            read.splice_out(0, cut);
        }

        if read.len() < self.min_out_len {
            read.status = Status::TooShort;
        }

        Ok((Some(read), false))
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}
