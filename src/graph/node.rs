/// Graph nodes that process reads.

pub mod input_fastq_node;
pub use input_fastq_node::*;

pub mod locate_adapters_node;
pub use locate_adapters_node::*;

pub mod decode_tag_node;
pub use decode_tag_node::*;

pub mod correct_barcode_node;
pub use correct_barcode_node::*;

pub mod trim_node;
pub use trim_node::*;

pub mod collect_fastq_node;
pub use collect_fastq_node::*;
