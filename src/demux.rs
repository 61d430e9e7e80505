use log::{debug, info};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::config::*;
use crate::errors::*;
use crate::graph::*;
use crate::locate::*;
use crate::primers::*;
use crate::routing::*;
use crate::stats::Stats;
use crate::watermark::*;
use crate::whitelist::*;

/// Everything needed to demultiplex reads, built once and reused across runs.
pub struct Demultiplexer {
    config: DemuxConfig,
    locator: Locator,
    five_prime: Arc<PrimerSet>,
    three_prime: Arc<PrimerSet>,
    model: Arc<ChannelModel>,
    whitelist: Option<Arc<Whitelist>>,
}

impl Demultiplexer {
    pub fn new(
        config: DemuxConfig,
        five_prime: PrimerSet,
        three_prime: PrimerSet,
        model: ChannelModel,
        whitelist: Option<Whitelist>,
    ) -> Self {
        Self {
            locator: Locator::new(config.locate_opts()),
            config,
            five_prime: Arc::new(five_prime),
            three_prime: Arc::new(three_prime),
            model: Arc::new(model),
            whitelist: whitelist.map(Arc::new),
        }
    }

    /// Load the primers, channel model and whitelist named by a config.
    pub fn from_config(config: DemuxConfig) -> Result<Self> {
        let (five_prime, three_prime) = config.primer_sets()?;
        let model = config.channel_model()?;
        let whitelist = config.whitelist()?;
        info!(
            "Loaded {} 5' and {} 3' primers, {} codewords of {} bases",
            five_prime.len(),
            three_prime.len(),
            model.codebook().num_codewords(),
            model.tag_len()
        );
        Ok(Self::new(config, five_prime, three_prime, model, whitelist))
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    /// Demultiplex a fastq file, plain or gzipped.
    pub fn run_file(&self, file: &str) -> Result<Stats> {
        info!("Demultiplexing \"{}\"", file);
        self.run(InputFastqNode::new(file)?)
    }

    /// Demultiplex fastq records held in memory.
    pub fn run_bytes(&self, bytes: Vec<u8>) -> Result<Stats> {
        self.run(InputFastqNode::from_bytes(bytes)?)
    }

    /// Path of the summary file written after each run.
    pub fn summary_path(&self) -> PathBuf {
        PathBuf::from(&self.config.output.dir)
            .join(format!("{}summary.yaml", self.config.output.prefix))
    }

    fn run(&self, input: InputFastqNode) -> Result<Stats> {
        let start = Instant::now();
        let output = &self.config.output;
        let routing = Arc::new(RoutingTable::new(
            &output.dir,
            output.prefix.clone(),
            output.compress,
            output.capacity,
        )?);

        let mut graph = Graph::new();
        let input = graph.add(input);
        graph.add(LocateAdaptersNode::new(
            self.locator,
            Arc::clone(&self.five_prime),
            Arc::clone(&self.three_prime),
            self.model.tag_len() + self.model.u(),
            self.config.max_read_bases,
        ));
        graph.add(DecodeTagNode::new(
            Arc::clone(&self.model),
            Arc::clone(&self.five_prime),
            Arc::clone(&self.three_prime),
            self.config.min_confidence,
        ));
        if let Some(whitelist) = &self.whitelist {
            let on_miss = self
                .config
                .whitelist
                .as_ref()
                .map(|w| w.on_miss)
                .unwrap_or_default();
            graph.add(CorrectBarcodeNode::new(Arc::clone(whitelist), on_miss));
        }
        graph.add(TrimNode::new(
            self.config.join_level,
            self.config.min_out_len,
            self.config.umi,
            self.config.header_opts(),
            self.locator,
            Arc::clone(&self.five_prime),
        ));
        let mut collect = graph.add(CollectFastqNode::new(Arc::clone(&routing)));

        debug!(
            "Running {} on {} threads",
            graph.node_names().join(" -> "),
            self.config.num_threads
        );
        graph.run_with_threads(self.config.num_threads)?;
        drop(graph);
        routing.close()?;

        let mut stats = Arc::get_mut(&mut collect)
            .ok_or(Error::WorkerPanicked("merging statistics"))?
            .stats();
        stats.truncated = input.truncated();

        let summary = self.summary_path();
        let yaml = stats.to_yaml().map_err(|e| Error::Config {
            context: "summary".to_owned(),
            source: Box::new(e),
        })?;
        std::fs::write(&summary, yaml).map_err(|e| Error::FileIo {
            file: summary.display().to_string(),
            source: Box::new(e),
        })?;

        info!(
            "Wrote {} of {} reads in {:.2}s, summary in \"{}\"",
            stats.written,
            stats.reads_total,
            start.elapsed().as_secs_f64(),
            summary.display()
        );
        Ok(stats)
    }
}
