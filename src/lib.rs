//! Rust library for demultiplexing reads by watermark tags.
//!
//! # Overview
//! Each read carries a short tag between a 5' and a 3' adapter. The tag is a codeword of a
//! Reed-Solomon-like code over GF(4), GF(8) or GF(16), with every symbol written as a short
//! DNA word that is masked by a watermark. Sequencing errors (substitutions, insertions and
//! deletions) are undone by decoding the tag under a channel model, and every read is written
//! to a fastq file named after its barcode.
//!
//! The pipeline for each read is:
//! 1. Parse the fastq record ([`InputFastqNode`]).
//! 2. Find the adapters near the read ends, flipping reads that come from the reverse strand
//!    ([`LocateAdaptersNode`]).
//! 3. Decode the tag between the adapters ([`DecodeTagNode`]).
//! 4. Optionally snap the barcode to a whitelist ([`CorrectBarcodeNode`]).
//! 5. Extract the UMI, add header tags and trim the read ([`TrimNode`]).
//! 6. Write the read to its bucket and count it ([`CollectFastqNode`]).
//!
//! Steps are nodes of a [`Graph`] that is run by a fixed number of threads.
//! [`Demultiplexer`] builds and runs the whole pipeline from a [`DemuxConfig`]:
//! ```no_run
//! use taggy::*;
//!
//! let config = DemuxConfig::from_file("config.yaml").unwrap();
//! let demux = Demultiplexer::from_config(config).unwrap();
//! let stats = demux.run_file("reads.fastq.gz").unwrap();
//! println!("{}", stats);
//! ```
//!
//! ## Output
//! Reads end up in `<dir>/<prefix><bucket>.fastq`, where the bucket is the barcode,
//! `unmatched` when no adapter was found, or `unassigned` when the tag could not be decoded
//! confidently. At most `capacity` files are open at once, and buckets that do not fit are
//! sent to `overflow`. Merged statistics are written to `<dir>/<prefix>summary.yaml`.

pub mod config;
pub mod demux;
pub mod errors;
pub mod fastq;
pub mod graph;
pub mod locate;
pub mod primers;
pub mod read;
pub mod routing;
pub mod stats;
pub mod watermark;
pub mod whitelist;

mod parse_utils;

// commonly used functions and types

pub use crate::config::*;
pub use crate::demux::*;
pub use crate::errors::{Error, Result};
pub use crate::fastq::*;
pub use crate::graph::*;
pub use crate::locate::*;
pub use crate::primers::*;
pub use crate::read::*;
pub use crate::stats::*;
pub use crate::watermark::{ChannelModel, ChannelParams, Codebook, DecodeResult, WatermarkDecoder};
pub use crate::whitelist::*;
