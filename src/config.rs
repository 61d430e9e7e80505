use serde::{Deserialize, Serialize};

use crate::errors::*;
use crate::locate::*;
use crate::parse_utils::read_file;
use crate::primers::*;
use crate::watermark::*;
use crate::whitelist::*;

/// How much of the read around the tag is cut away before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum JoinLevel {
    /// Write the read unchanged.
    #[default]
    Keep = 0,
    /// Remove everything up to the end of the 5' adapter.
    FivePrime = 1,
    /// Remove everything up to the end of the 3' adapter.
    Tag = 2,
    /// Like `Tag`, and cut the tail at the reverse complement of the 5' adapter.
    Tail = 3,
}

impl TryFrom<u8> for JoinLevel {
    type Error = String;

    fn try_from(level: u8) -> std::result::Result<Self, String> {
        use JoinLevel::*;
        match level {
            0 => Ok(Keep),
            1 => Ok(FivePrime),
            2 => Ok(Tag),
            3 => Ok(Tail),
            _ => Err(format!("join level {level} is not between 0 and 3")),
        }
    }
}

impl From<JoinLevel> for u8 {
    fn from(level: JoinLevel) -> u8 {
        level as u8
    }
}

/// Position of the UMI relative to the end of the 3' adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UmiConfig {
    pub nom_len: usize,
    #[serde(default)]
    pub context_from: i64,
    /// End of the window the UMI must fit in. Defaults to `context_from + nom_len`.
    #[serde(default)]
    pub context_to: Option<i64>,
}

/// Layout of the demultiplexing results in output record headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderFormat {
    /// `KEY:TYPE:VALUE` tags after the read name.
    #[default]
    Sam,
    /// Read names rewritten to `BARCODE_UMI#NAME`, as FLAMES expects.
    Flames,
}

/// What goes into the header of a written record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderOpts {
    pub format: HeaderFormat,
    /// Tags with the decoded tag, its confidence, the barcode and the UMI.
    pub preserve_tags: bool,
    /// A tag with the 5' adapter start on the strand the read was sequenced from.
    pub print_start: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhitelistConfig {
    pub file: String,
    #[serde(default = "default_max_dist")]
    pub max_dist: usize,
    #[serde(default)]
    pub on_miss: OnMiss,
}

fn default_max_dist() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: String,
    pub prefix: String,
    pub compress: bool,
    /// Most files that are open at once, including the overflow bucket.
    pub capacity: usize,
    pub header: HeaderFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: ".".to_owned(),
            prefix: String::new(),
            compress: false,
            capacity: 512,
            header: HeaderFormat::default(),
        }
    }
}

/// Primers given inline, in a separate YAML file, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrimerConfig {
    pub file: Option<String>,
    pub five_prime: Vec<Primer>,
    pub three_prime: Vec<Primer>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DemuxConfig {
    /// Below 1 a fraction of the primer length, otherwise a count.
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance: f64,
    #[serde(default)]
    pub partial_ends: bool,
    #[serde(default = "default_partial_min_frac")]
    pub partial_min_frac: f64,
    #[serde(default = "default_end_window")]
    pub end_window: usize,
    #[serde(default)]
    pub join_level: JoinLevel,
    #[serde(default)]
    pub preserve_tags: bool,
    #[serde(default)]
    pub print_start: bool,
    /// Reads longer than this are written unsearched with the unmatched reads.
    #[serde(default)]
    pub max_read_bases: Option<usize>,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    #[serde(default)]
    pub min_out_len: usize,
    #[serde(default)]
    pub umi: Option<UmiConfig>,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default)]
    pub whitelist: Option<WhitelistConfig>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub primers: PrimerConfig,
    pub channel: ChannelParams,
}

fn default_max_edit_distance() -> f64 {
    0.2
}

fn default_partial_min_frac() -> f64 {
    0.5
}

fn default_end_window() -> usize {
    200
}

fn default_num_threads() -> usize {
    1
}

fn default_min_confidence() -> f64 {
    0.5
}

fn config_err(context: &str, msg: &str) -> Error {
    Error::Config {
        context: context.to_owned(),
        source: msg.into(),
    }
}

impl DemuxConfig {
    /// Config with default settings around the given channel.
    pub fn new(channel: ChannelParams) -> Self {
        Self {
            max_edit_distance: default_max_edit_distance(),
            partial_ends: false,
            partial_min_frac: default_partial_min_frac(),
            end_window: default_end_window(),
            join_level: JoinLevel::default(),
            preserve_tags: false,
            print_start: false,
            max_read_bases: None,
            num_threads: default_num_threads(),
            min_out_len: 0,
            umi: None,
            min_confidence: default_min_confidence(),
            whitelist: None,
            output: OutputConfig::default(),
            primers: PrimerConfig::default(),
            channel,
        }
    }

    pub fn from_yaml(yaml: impl AsRef<[u8]>) -> Result<Self> {
        Self::parse(yaml.as_ref(), "config")
    }

    pub fn from_file(file: &str) -> Result<Self> {
        Self::parse(&read_file(file)?, file)
    }

    fn parse(yaml: &[u8], context: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_slice(yaml).map_err(|e| Error::Config {
            context: context.to_owned(),
            source: Box::new(e),
        })?;
        config.validate(context)?;
        Ok(config)
    }

    fn validate(&self, context: &str) -> Result<()> {
        if !self.max_edit_distance.is_finite() || self.max_edit_distance < 0.0 {
            return Err(config_err(context, "max_edit_distance must be finite and not negative"));
        }
        if self.max_read_bases == Some(0) {
            return Err(config_err(context, "max_read_bases must be at least 1"));
        }
        if !(self.partial_min_frac > 0.0 && self.partial_min_frac <= 1.0) {
            return Err(config_err(context, "partial_min_frac must be in (0, 1]"));
        }
        if self.num_threads == 0 {
            return Err(config_err(context, "num_threads must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(config_err(context, "min_confidence must be in [0, 1]"));
        }
        if let Some(umi) = &self.umi {
            if umi.nom_len == 0 {
                return Err(config_err(context, "umi.nom_len must be at least 1"));
            }
        }
        Ok(())
    }

    pub fn header_opts(&self) -> HeaderOpts {
        HeaderOpts {
            format: self.output.header,
            preserve_tags: self.preserve_tags,
            print_start: self.print_start,
        }
    }

    pub fn locate_opts(&self) -> LocateOpts {
        LocateOpts {
            max_edit_distance: Threshold::from(self.max_edit_distance),
            partial_ends: self.partial_ends,
            partial_min_frac: self.partial_min_frac,
            end_window: self.end_window,
        }
    }

    /// Validated 5' and 3' primer sets from the inline lists and the primer file.
    pub fn primer_sets(&self) -> Result<(PrimerSet, PrimerSet)> {
        let mut defs = match &self.primers.file {
            Some(file) => PrimerDefs::from_file(file)?,
            None => PrimerDefs::default(),
        };
        defs.five_prime.extend(self.primers.five_prime.iter().cloned());
        defs.three_prime.extend(self.primers.three_prime.iter().cloned());
        defs.into_sets()
    }

    pub fn whitelist(&self) -> Result<Option<Whitelist>> {
        self.whitelist
            .as_ref()
            .map(|w| Whitelist::from_file(&w.file, w.max_dist))
            .transpose()
    }

    pub fn channel_model(&self) -> Result<ChannelModel> {
        ChannelModel::new(self.channel.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "
max_edit_distance: 1
join_level: 2
preserve_tags: true
umi:
  nom_len: 6
  context_from: 2
output:
  dir: out
  compress: true
primers:
  five_prime:
    - id: p5
      seq: AATT
  three_prime:
    - id: p3
      seq: TTAA
channel:
  q: 4
  n: 4
  k: 4
  u: 1
";

    #[test]
    fn parse_with_defaults() {
        let config = DemuxConfig::from_yaml(CONFIG).unwrap();
        assert_eq!(config.join_level, JoinLevel::Tag);
        assert_eq!(config.num_threads, 1);
        assert_eq!(config.min_confidence, 0.5);
        assert_eq!(config.output.capacity, 512);
        assert_eq!(config.output.prefix, "");
        assert_eq!(config.umi.unwrap().context_to, None);
        assert_eq!(config.locate_opts().max_edit_distance, Count(1));
        assert_eq!(config.channel.imax, 1);
        assert_eq!(config.max_read_bases, None);
        assert_eq!(
            config.header_opts(),
            HeaderOpts {
                format: HeaderFormat::Sam,
                preserve_tags: true,
                print_start: false,
            }
        );

        let (p5, p3) = config.primer_sets().unwrap();
        assert_eq!(p5[0].seq, "AATT");
        assert_eq!(p3[0].seq, "TTAA");
        assert!(config.whitelist().unwrap().is_none());
        assert_eq!(config.channel_model().unwrap().tag_len(), 4);
    }

    #[test]
    fn rejects_bad_configs() {
        assert!(DemuxConfig::from_yaml(CONFIG.replace("join_level: 2", "join_level: 4")).is_err());
        assert!(DemuxConfig::from_yaml(CONFIG.replace("preserve_tags", "preserve_tag")).is_err());
        assert!(DemuxConfig::from_yaml(format!("{CONFIG}num_threads: 0\n")).is_err());
        assert!(DemuxConfig::from_yaml("max_edit_distance: 1\n").is_err());
        for bad in [".inf", ".nan", "-1"] {
            let yaml = CONFIG.replace("max_edit_distance: 1", &format!("max_edit_distance: {bad}"));
            assert!(DemuxConfig::from_yaml(yaml).is_err(), "{bad}");
        }
        assert!(DemuxConfig::from_yaml(format!("{CONFIG}max_read_bases: 0\n")).is_err());

        let config = DemuxConfig::new(ChannelParams::new(4, 4, 4));
        assert!(matches!(config.primer_sets(), Err(Error::EmptyPrimers(_))));
    }

    #[test]
    fn header_and_read_cap() {
        let yaml = CONFIG.replace("  compress: true", "  compress: true\n  header: flames");
        let config = DemuxConfig::from_yaml(format!("{yaml}print_start: true\nmax_read_bases: 5000\n")).unwrap();
        assert_eq!(config.output.header, HeaderFormat::Flames);
        assert!(config.header_opts().print_start);
        assert_eq!(config.max_read_bases, Some(5000));

        let yaml = CONFIG.replace("  compress: true", "  compress: true\n  header: bam");
        assert!(DemuxConfig::from_yaml(yaml).is_err());
    }
}
