use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::codebook::*;
use super::fixed::*;
use super::gf::Field;
use crate::errors::*;
use crate::parse_utils::*;

/// Highest phred score that gets its own emission row when rows are derived from qualities.
const MAX_PHRED: usize = 60;

/// Interpretation of the quality characters of a read.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualParams {
    /// ASCII value of quality zero.
    pub offset: u8,
    /// Multiplier from phred score to emission row.
    pub scale: f64,
}

impl Default for QualParams {
    fn default() -> Self {
        Self {
            offset: 33,
            scale: 1.0,
        }
    }
}

/// User facing channel and code parameters, usually the `channel` section of a config file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelParams {
    /// Field order.
    pub q: usize,
    /// Codeword length in field symbols.
    pub n: usize,
    /// Message length in field symbols.
    pub k: usize,
    /// Marker length.
    #[serde(default)]
    pub m: usize,
    /// Largest drift in bases that is tracked.
    #[serde(default = "default_u")]
    pub u: usize,
    /// Passes of the outer decoder.
    #[serde(default = "default_iter")]
    pub iter: usize,
    /// Most insertions per codeword symbol.
    #[serde(default = "default_imax")]
    pub imax: usize,
    #[serde(default)]
    pub ps: f64,
    #[serde(default)]
    pub pd: f64,
    #[serde(default)]
    pub pi: f64,
    /// Ties between offsets within this many bits keep the earlier offset.
    #[serde(default)]
    pub tie_epsilon: f64,
    /// Row major 4x4 substitution weights over A, C, G, T. The diagonal is ignored.
    #[serde(default)]
    pub substitution: Option<Vec<f64>>,
    #[serde(default)]
    pub substitution_file: Option<String>,
    /// Reliability of each symbol (columns) per quality bin (rows).
    #[serde(default)]
    pub emission: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub emission_file: Option<String>,
    /// Derive the emission rows from phred scores when no table is given.
    #[serde(default)]
    pub use_quality: bool,
    #[serde(default)]
    pub qual: QualParams,
    /// Two numbers, the quality offset and scale. Overrides `qual`.
    #[serde(default)]
    pub qual_file: Option<String>,
    /// DNA word for every field symbol.
    #[serde(default)]
    pub inner_codebook: Option<Vec<String>>,
    /// One inner codebook word per line.
    #[serde(default)]
    pub inner_codebook_file: Option<String>,
    #[serde(default)]
    pub watermark: Option<String>,
    /// Watermark sequence, possibly split over several lines.
    #[serde(default)]
    pub watermark_file: Option<String>,
    #[serde(default)]
    pub watermark_seed: Option<u64>,
    #[serde(default)]
    pub marker: Option<String>,
}

fn default_u() -> usize {
    2
}

fn default_iter() -> usize {
    2
}

fn default_imax() -> usize {
    1
}

impl ChannelParams {
    /// Parameters for a code with no noise, no marker and the default inner words.
    pub fn new(q: usize, n: usize, k: usize) -> Self {
        Self {
            q,
            n,
            k,
            m: 0,
            u: default_u(),
            iter: default_iter(),
            imax: default_imax(),
            ps: 0.0,
            pd: 0.0,
            pi: 0.0,
            tie_epsilon: 0.0,
            substitution: None,
            substitution_file: None,
            emission: None,
            emission_file: None,
            use_quality: false,
            qual: QualParams::default(),
            qual_file: None,
            inner_codebook: None,
            inner_codebook_file: None,
            watermark: None,
            watermark_file: None,
            watermark_seed: None,
            marker: None,
        }
    }

    /// Fill the inline quality parameters, inner codebook and watermark from their files.
    ///
    /// Inline values win over files, except for `qual_file`, which always wins.
    pub fn load_files(&mut self) -> Result<()> {
        if let Some(file) = &self.qual_file {
            let table = parse_table(&read_file(file)?, file)?;
            let values = table.into_iter().flatten().collect::<Vec<_>>();
            let &[offset, scale] = values.as_slice() else {
                return Err(channel_err(format!(
                    "{file} needs a quality offset and scale, got {} values",
                    values.len()
                )));
            };
            if !(0.0..=255.0).contains(&offset) || offset.fract() != 0.0 || !scale.is_finite() {
                return Err(channel_err(format!("{file} has an invalid quality offset or scale")));
            }
            self.qual = QualParams {
                offset: offset as u8,
                scale,
            };
        }
        if let (None, Some(file)) = (&self.inner_codebook, &self.inner_codebook_file) {
            let words = content_lines(&read_file(file)?).map(utf8).collect();
            self.inner_codebook = Some(words);
        }
        if let (None, Some(file)) = (&self.watermark, &self.watermark_file) {
            let watermark = content_lines(&read_file(file)?).map(utf8).collect();
            self.watermark = Some(watermark);
        }
        Ok(())
    }
}

/// Validated channel model with every probability converted to a fixed-point cost.
///
/// Built once and shared by all workers.
#[derive(Debug, Clone)]
pub struct ChannelModel {
    params: ChannelParams,
    codebook: Codebook,
    keep: Cost,
    del: Cost,
    ins: Cost,
    tie_epsilon: Cost,
    // emit[bin][x][y] for transmitted x and received y, where 4 is an unknown base on either side
    emit: Vec<[[Cost; 5]; 5]>,
}

fn channel_err(msg: impl Into<String>) -> Error {
    Error::Channel(msg.into())
}

fn dna_codes(s: &str, what: &str) -> Result<Vec<u8>> {
    s.bytes()
        .map(|b| match base_code(b) {
            UNKNOWN_BASE => Err(channel_err(format!("{what} \"{s}\" is not A/C/G/T only"))),
            c => Ok(c),
        })
        .collect()
}

fn check_prob(p: f64, name: &str) -> Result<()> {
    if !(0.0..1.0).contains(&p) {
        return Err(channel_err(format!("{name} = {p} must be in [0, 1)")));
    }
    Ok(())
}

impl ChannelModel {
    pub fn new(mut params: ChannelParams) -> Result<Self> {
        params.load_files()?;
        let field = Field::new(params.q)
            .ok_or_else(|| channel_err(format!("field order q = {} is not 4, 8 or 16", params.q)))?;

        check_prob(params.ps, "ps")?;
        check_prob(params.pd, "pd")?;
        check_prob(params.pi, "pi")?;
        if params.pd + params.pi >= 1.0 {
            return Err(channel_err("pd + pi must be below 1"));
        }
        if params.iter == 0 {
            return Err(channel_err("iter must be at least 1"));
        }
        if params.tie_epsilon.is_nan() || params.tie_epsilon < 0.0 {
            return Err(channel_err("tie_epsilon must not be negative"));
        }

        let words = match &params.inner_codebook {
            Some(words) => words
                .iter()
                .map(|w| dna_codes(w, "inner codebook word"))
                .collect::<Result<Vec<_>>>()?,
            None => {
                let len = if params.q == 4 { 1 } else { 2 };
                (0..params.q).map(|s| default_inner_word(s, len)).collect()
            }
        };
        let word_len = words.first().map(|w| w.len()).unwrap_or(0);

        let watermark = match (&params.watermark, params.watermark_seed) {
            (Some(w), _) => dna_codes(w, "watermark")?,
            (None, Some(seed)) => {
                let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
                (0..params.n * word_len).map(|_| rng.gen_range(0..4u8)).collect()
            }
            // all A is the additive identity
            (None, None) => vec![0; params.n * word_len],
        };

        let marker = match &params.marker {
            Some(m) => dna_codes(m, "marker")?,
            None => Vec::new(),
        };
        if marker.len() != params.m {
            return Err(channel_err(format!(
                "marker has {} bases but m = {}",
                marker.len(),
                params.m
            )));
        }

        let codebook = Codebook::new(field, params.n, params.k, words, &watermark, &marker)?;

        let substitution = Self::substitution(&params)?;
        let emission = Self::emission(&params)?;

        let n_cost = float2fix(2.0);
        let emit = emission
            .iter()
            .map(|row| {
                let mut costs = [[n_cost; 5]; 5];
                for (x, c) in costs.iter_mut().take(4).enumerate() {
                    for y in 0..4 {
                        let reliable = (1.0 - params.ps) * row[y];
                        let p = if x == y {
                            reliable
                        } else {
                            (1.0 - reliable) * substitution[x][y]
                        };
                        c[y] = prob2cost(p);
                    }
                }
                costs
            })
            .collect();

        Ok(Self {
            keep: prob2cost(1.0 - params.pd - params.pi),
            del: prob2cost(params.pd),
            ins: prob2cost(params.pi / 4.0),
            tie_epsilon: float2fix(params.tie_epsilon),
            codebook,
            emit,
            params,
        })
    }

    /// Off-diagonal substitution probabilities, each row normalized to sum to 1.
    fn substitution(params: &ChannelParams) -> Result<[[f64; 4]; 4]> {
        let values = match (&params.substitution, &params.substitution_file) {
            (Some(s), _) => s.clone(),
            (None, Some(file)) => parse_table(&read_file(file)?, file)?
                .into_iter()
                .flatten()
                .collect(),
            (None, None) => vec![1.0; 16],
        };
        if values.len() != 16 {
            return Err(channel_err(format!(
                "substitution matrix needs 16 values, got {}",
                values.len()
            )));
        }

        let mut res = [[0.0; 4]; 4];
        for (x, row) in res.iter_mut().enumerate() {
            let total = (0..4)
                .filter(|&y| y != x)
                .map(|y| values[x * 4 + y])
                .sum::<f64>();
            if values[x * 4..x * 4 + 4].iter().any(|v| !v.is_finite() || *v < 0.0) || total <= 0.0 {
                return Err(channel_err(format!(
                    "substitution row {} must be non-negative with a positive off-diagonal sum",
                    BASES[x] as char
                )));
            }
            for y in (0..4).filter(|&y| y != x) {
                row[y] = values[x * 4 + y] / total;
            }
        }
        Ok(res)
    }

    fn emission(params: &ChannelParams) -> Result<Vec<[f64; 4]>> {
        let rows = match (&params.emission, &params.emission_file) {
            (Some(e), _) => e.clone(),
            (None, Some(file)) => parse_table(&read_file(file)?, file)?,
            (None, None) if params.use_quality => (0..=MAX_PHRED)
                .map(|q| {
                    let p = (1.0 - 10f64.powf(-(q as f64) / 10.0)).max(0.25);
                    vec![p; 4]
                })
                .collect(),
            (None, None) => vec![vec![1.0; 4]],
        };
        if rows.is_empty() {
            return Err(channel_err("emission table is empty"));
        }

        rows.iter()
            .enumerate()
            .map(|(i, row)| {
                if row.len() != 4 {
                    return Err(channel_err(format!(
                        "emission row {i} needs 4 values, got {}",
                        row.len()
                    )));
                }
                if row.iter().any(|p| !(0.0..=1.0).contains(p)) {
                    return Err(channel_err(format!("emission row {i} must be in [0, 1]")));
                }
                Ok([row[0], row[1], row[2], row[3]])
            })
            .collect()
    }

    pub fn params(&self) -> &ChannelParams {
        &self.params
    }

    pub fn codebook(&self) -> &Codebook {
        &self.codebook
    }

    /// Expected number of bases of a tag.
    pub fn tag_len(&self) -> usize {
        self.codebook.tag_len()
    }

    pub fn u(&self) -> usize {
        self.params.u
    }

    pub fn imax(&self) -> usize {
        self.params.imax
    }

    pub fn iter(&self) -> usize {
        self.params.iter
    }

    pub fn tie_epsilon(&self) -> Cost {
        self.tie_epsilon
    }

    /// Cost of a transmitted base that is neither deleted nor followed by an insertion.
    #[inline]
    pub fn keep(&self) -> Cost {
        self.keep
    }

    #[inline]
    pub fn del(&self) -> Cost {
        self.del
    }

    /// Cost of one inserted base, including its uniform emission.
    #[inline]
    pub fn ins(&self) -> Cost {
        self.ins
    }

    /// Emission row for a quality character.
    #[inline]
    pub fn qual_bin(&self, c: u8) -> usize {
        let QualParams { offset, scale } = self.params.qual;
        let b = (c.saturating_sub(offset) as f64 * scale).round();
        (b.max(0.0) as usize).min(self.emit.len() - 1)
    }

    /// Cost of receiving base `y` (a base code) for transmitted code `x` in quality bin `bin`.
    ///
    /// An unknown transmitted base, such as an `N` in an adapter, emits every base uniformly.
    #[inline]
    pub fn emit(&self, bin: usize, x: u8, y: u8) -> Cost {
        self.emit[bin][x.min(UNKNOWN_BASE) as usize][y.min(UNKNOWN_BASE) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noiseless_costs() {
        let model = ChannelModel::new(ChannelParams::new(4, 4, 4)).unwrap();
        assert_eq!(model.keep(), 0);
        assert_eq!(model.del(), COST_MAX);
        assert_eq!(model.ins(), COST_MAX);
        assert_eq!(model.emit(0, 1, 1), 0);
        assert_eq!(model.emit(0, 1, 2), COST_MAX);
        assert_eq!(model.emit(0, 1, UNKNOWN_BASE), float2fix(2.0));
        for y in 0..=UNKNOWN_BASE {
            assert_eq!(model.emit(0, UNKNOWN_BASE, y), float2fix(2.0));
        }
        assert_eq!(model.tag_len(), 4);
    }

    #[test]
    fn substitution_rows_are_normalized() {
        let mut params = ChannelParams::new(4, 4, 2);
        params.ps = 0.3;
        params.substitution = Some(vec![
            0.0, 1.0, 3.0, 0.0, //
            1.0, 0.0, 1.0, 2.0, //
            1.0, 1.0, 0.0, 1.0, //
            1.0, 1.0, 1.0, 0.0,
        ]);
        let model = ChannelModel::new(params).unwrap();

        let p = |x, y| cost2prob(model.emit(0, x, y));
        assert!((p(0, 0) - 0.7).abs() < 1e-3);
        assert!((p(0, 2) - 0.3 * 0.75).abs() < 1e-3);
        assert_eq!(p(0, 3), 0.0);
        let row1 = (0..4).map(|y| p(1, y)).sum::<f64>();
        assert!((row1 - 1.0).abs() < 1e-3);
    }

    #[test]
    fn quality_bins() {
        let mut params = ChannelParams::new(4, 4, 2);
        params.use_quality = true;
        params.ps = 0.0;
        let model = ChannelModel::new(params).unwrap();

        assert_eq!(model.qual_bin(b'!'), 0);
        assert_eq!(model.qual_bin(b'+'), 10);
        assert_eq!(model.qual_bin(b'~'), MAX_PHRED);
        // phred 10 is right 90% of the time
        assert!((cost2prob(model.emit(10, 2, 2)) - 0.9).abs() < 1e-3);
        assert!(model.emit(0, 2, 2) > model.emit(30, 2, 2));
    }

    #[test]
    fn seeded_watermark_is_deterministic() {
        let mut params = ChannelParams::new(16, 4, 2);
        params.watermark_seed = Some(7);
        let a = ChannelModel::new(params.clone()).unwrap();
        let b = ChannelModel::new(params).unwrap();
        let cw = a.codebook().codeword(3).to_owned();
        assert_eq!(a.codebook().transmit(&cw), b.codebook().transmit(&cw));
    }

    #[test]
    fn rejects_bad_params() {
        assert!(ChannelModel::new(ChannelParams::new(5, 4, 2)).is_err());
        assert!(ChannelModel::new(ChannelParams::new(4, 4, 5)).is_err());

        let mut params = ChannelParams::new(4, 4, 2);
        params.pd = 0.6;
        params.pi = 0.5;
        assert!(ChannelModel::new(params).is_err());

        let mut params = ChannelParams::new(4, 4, 2);
        params.m = 1;
        assert!(ChannelModel::new(params.clone()).is_err());
        params.marker = Some("G".to_owned());
        assert!(ChannelModel::new(params).is_ok());

        let mut params = ChannelParams::new(4, 4, 2);
        params.emission = Some(vec![vec![1.0, 1.0, 1.0]]);
        assert!(ChannelModel::new(params).is_err());

        let mut params = ChannelParams::new(4, 4, 2);
        params.watermark = Some("ACGN".to_owned());
        assert!(ChannelModel::new(params).is_err());
    }

    #[test]
    fn loads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = |name: &str| dir.path().join(name).display().to_string();
        std::fs::write(path("qual.txt"), "# offset scale\n64 0.5\n").unwrap();
        std::fs::write(path("inner.txt"), "AC\nGT\n# comment\nTA\nCG\n").unwrap();
        std::fs::write(path("watermark.txt"), "ACGT\nTTGG\n").unwrap();

        let mut params = ChannelParams::new(4, 4, 2);
        params.qual_file = Some(path("qual.txt"));
        params.inner_codebook_file = Some(path("inner.txt"));
        params.watermark_file = Some(path("watermark.txt"));
        let model = ChannelModel::new(params).unwrap();

        assert_eq!(model.params().qual.offset, 64);
        assert_eq!(model.params().qual.scale, 0.5);
        assert_eq!(
            model.params().inner_codebook.as_deref(),
            Some(&["AC".to_owned(), "GT".to_owned(), "TA".to_owned(), "CG".to_owned()][..])
        );
        assert_eq!(model.params().watermark.as_deref(), Some("ACGTTTGG"));
        assert_eq!(model.tag_len(), 8);

        // inline values win over files
        let mut params = ChannelParams::new(4, 4, 2);
        params.watermark = Some("AAAAAAAA".to_owned());
        params.watermark_file = Some(path("watermark.txt"));
        params.inner_codebook_file = Some(path("inner.txt"));
        let model = ChannelModel::new(params).unwrap();
        assert_eq!(model.params().watermark.as_deref(), Some("AAAAAAAA"));

        std::fs::write(path("bad_qual.txt"), "33\n").unwrap();
        let mut params = ChannelParams::new(4, 4, 2);
        params.qual_file = Some(path("bad_qual.txt"));
        assert!(matches!(ChannelModel::new(params), Err(Error::Channel(_))));

        let mut params = ChannelParams::new(4, 4, 2);
        params.watermark_file = Some(path("missing.txt"));
        assert!(matches!(ChannelModel::new(params), Err(Error::FileIo { .. })));
    }

    #[test]
    fn from_yaml() {
        let params: ChannelParams = serde_yaml::from_str(
            "q: 8\nn: 4\nk: 2\nm: 1\nmarker: G\nps: 0.01\nqual:\n  offset: 64\n",
        )
        .unwrap();
        assert_eq!(params.u, 2);
        assert_eq!(params.qual.offset, 64);
        assert_eq!(params.qual.scale, 1.0);
        let model = ChannelModel::new(params).unwrap();
        assert_eq!(model.tag_len(), 4 * 2 + 3);
    }
}
