use serde::{Deserialize, Serialize};

use std::ops::Index;

use crate::errors::*;
use crate::fastq::revcomp;
use crate::parse_utils::read_file;

/// Longest primer the bit-parallel search can hold in one word.
pub const MAX_PRIMER_LEN: usize = 64;

/// Orientations in which a primer may appear in a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strand {
    Forward,
    Reverse,
    #[default]
    Both,
}

impl Strand {
    pub fn allows(&self, reverse: bool) -> bool {
        match self {
            Strand::Forward => !reverse,
            Strand::Reverse => reverse,
            Strand::Both => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Primer {
    pub id: String,
    pub seq: String,
    /// Only search the 5' end of reads.
    #[serde(default)]
    pub anchor_5p: bool,
    #[serde(default)]
    pub strand: Strand,
}

impl Primer {
    pub fn new(id: impl Into<String>, seq: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            seq: seq.into(),
            anchor_5p: false,
            strand: Strand::Both,
        }
    }
}

/// Non-empty set of primers sorted by length, then sequence.
#[derive(Debug, Clone)]
pub struct PrimerSet {
    primers: Vec<Primer>,
    seqs: Vec<Vec<u8>>,
    revcomps: Vec<Vec<u8>>,
}

impl PrimerSet {
    /// Validate and sort primers. `kind` names the set in errors.
    pub fn new(kind: &'static str, mut primers: Vec<Primer>) -> Result<Self> {
        if primers.is_empty() {
            return Err(Error::EmptyPrimers(kind));
        }

        for p in &mut primers {
            p.seq.make_ascii_uppercase();
            if p.seq.is_empty() {
                return Err(Error::InvalidPrimer {
                    id: p.id.clone(),
                    reason: "empty sequence",
                });
            }
            if !p.seq.bytes().all(|c| matches!(c, b'A' | b'C' | b'G' | b'T' | b'N')) {
                return Err(Error::InvalidPrimer {
                    id: p.id.clone(),
                    reason: "sequence must only contain A, C, G, T or N",
                });
            }
            if p.seq.len() > MAX_PRIMER_LEN {
                return Err(Error::InvalidPrimer {
                    id: p.id.clone(),
                    reason: "sequence is longer than 64 bases",
                });
            }
        }

        primers.sort_by(|a, b| (a.seq.len(), &a.seq).cmp(&(b.seq.len(), &b.seq)));

        let seqs = primers.iter().map(|p| p.seq.as_bytes().to_owned()).collect::<Vec<_>>();
        let revcomps = seqs.iter().map(|s| revcomp(s)).collect();

        Ok(Self {
            primers,
            seqs,
            revcomps,
        })
    }

    pub fn len(&self) -> usize {
        self.primers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Primer> {
        self.primers.iter()
    }

    /// Sequence of primer `i`, reverse complemented if `reverse`.
    pub fn seq(&self, i: usize, reverse: bool) -> &[u8] {
        if reverse {
            &self.revcomps[i]
        } else {
            &self.seqs[i]
        }
    }

    pub fn max_len(&self) -> usize {
        self.seqs.iter().map(|s| s.len()).max().unwrap_or(0)
    }
}

impl Index<usize> for PrimerSet {
    type Output = Primer;

    fn index(&self, i: usize) -> &Primer {
        &self.primers[i]
    }
}

/// Primers on both sides of the tag, as written in YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrimerDefs {
    #[serde(default)]
    pub five_prime: Vec<Primer>,
    #[serde(default)]
    pub three_prime: Vec<Primer>,
}

impl PrimerDefs {
    pub fn from_yaml(yaml: impl AsRef<[u8]>) -> Result<Self> {
        serde_yaml::from_slice(yaml.as_ref()).map_err(|e| Error::Config {
            context: "primers".to_owned(),
            source: Box::new(e),
        })
    }

    pub fn from_file(file: &str) -> Result<Self> {
        serde_yaml::from_slice(&read_file(file)?).map_err(|e| Error::Config {
            context: file.to_owned(),
            source: Box::new(e),
        })
    }

    /// Validated 5' and 3' sets.
    pub fn into_sets(self) -> Result<(PrimerSet, PrimerSet)> {
        Ok((
            PrimerSet::new("5'", self.five_prime)?,
            PrimerSet::new("3'", self.three_prime)?,
        ))
    }
}
