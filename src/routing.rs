use flate2::{write::GzEncoder, Compression};
use log::{debug, warn};
use rustc_hash::FxHashMap;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::*;

/// Bucket that receives reads once the routing table is full.
pub const OVERFLOW: &[u8] = b"overflow";

pub type Writer = Arc<Mutex<dyn Write + Send>>;

/// Output stream chosen for a bucket.
pub struct Route {
    /// The bucket did not fit and was sent to [`OVERFLOW`].
    pub overflow: bool,
    pub writer: Writer,
}

/// Bounded map from bucket names to lazily opened fastq files.
///
/// One slot is reserved for the overflow bucket, so at most `capacity` files are ever open.
pub struct RoutingTable {
    dir: PathBuf,
    prefix: String,
    compress: bool,
    capacity: usize,
    writers: Mutex<FxHashMap<Vec<u8>, Writer>>,
    overflowed: AtomicBool,
}

impl RoutingTable {
    pub fn new(
        dir: impl AsRef<Path>,
        prefix: impl Into<String>,
        compress: bool,
        capacity: usize,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_owned();
        if capacity == 0 {
            return Err(Error::Config {
                context: "output".to_owned(),
                source: "capacity must be at least 1".into(),
            });
        }
        std::fs::create_dir_all(&dir).map_err(|e| Error::FileIo {
            file: dir.display().to_string(),
            source: Box::new(e),
        })?;

        Ok(Self {
            dir,
            prefix: prefix.into(),
            compress,
            capacity,
            writers: Mutex::new(FxHashMap::default()),
            overflowed: AtomicBool::new(false),
        })
    }

    /// Path of the file that holds a bucket.
    pub fn path(&self, bucket: &[u8]) -> PathBuf {
        let ext = if self.compress { "fastq.gz" } else { "fastq" };
        self.dir
            .join(format!("{}{}.{}", self.prefix, utf8(bucket), ext))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of open files.
    pub fn len(&self) -> usize {
        self.writers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the writer for a bucket, opening its file on first use.
    ///
    /// Writers are handed out so that writing to different files can happen in parallel.
    pub fn route(&self, bucket: &[u8]) -> Result<Route> {
        let mut writers = self.writers.lock().unwrap();

        if let Some(w) = writers.get(bucket) {
            return Ok(Route {
                overflow: false,
                writer: Arc::clone(w),
            });
        }

        let open = writers.len() - usize::from(writers.contains_key(OVERFLOW));
        let (name, overflow) = if bucket != OVERFLOW && open + 1 < self.capacity {
            (bucket, false)
        } else {
            if bucket != OVERFLOW && !self.overflowed.swap(true, Ordering::Relaxed) {
                warn!(
                    "Routing table is full ({} files), sending new buckets to \"{}\"",
                    self.capacity,
                    utf8(OVERFLOW)
                );
            }
            (OVERFLOW, bucket != OVERFLOW)
        };

        if let Some(w) = writers.get(name) {
            return Ok(Route {
                overflow,
                writer: Arc::clone(w),
            });
        }

        let writer = self.open(name)?;
        writers.insert(name.to_owned(), Arc::clone(&writer));
        Ok(Route { overflow, writer })
    }

    fn open(&self, bucket: &[u8]) -> Result<Writer> {
        let path = self.path(bucket);
        debug!("Opening \"{}\" for bucket \"{}\"", path.display(), utf8(bucket));

        let file = File::create(&path).map_err(|e| Error::FileIo {
            file: path.display().to_string(),
            source: Box::new(e),
        })?;

        let writer: Writer = if self.compress {
            Arc::new(Mutex::new(BufWriter::new(GzEncoder::new(
                file,
                Compression::default(),
            ))))
        } else {
            Arc::new(Mutex::new(BufWriter::new(file)))
        };
        Ok(writer)
    }

    /// Flush and close every open file.
    pub fn close(&self) -> Result<()> {
        let mut writers = self.writers.lock().unwrap();
        for (bucket, w) in writers.iter() {
            w.lock().unwrap().flush().map_err(|e| Error::FileIo {
                file: self.path(bucket).display().to_string(),
                source: Box::new(e),
            })?;
        }
        // dropping the encoders writes the gzip trailers
        writers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserves_a_slot_for_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let table = RoutingTable::new(dir.path(), "out_", false, 3).unwrap();

        assert!(!table.route(b"AAAA").unwrap().overflow);
        assert!(!table.route(b"CCCC").unwrap().overflow);
        assert!(table.route(b"GGGG").unwrap().overflow);
        assert!(table.route(b"TTTT").unwrap().overflow);
        assert!(!table.route(b"AAAA").unwrap().overflow);
        assert_eq!(table.len(), 3);

        table.close().unwrap();
        assert!(dir.path().join("out_AAAA.fastq").exists());
        assert!(dir.path().join("out_overflow.fastq").exists());
        assert!(!dir.path().join("out_GGGG.fastq").exists());
    }

    #[test]
    fn writes_gzip() {
        use std::io::Read;

        let dir = tempfile::tempdir().unwrap();
        let table = RoutingTable::new(dir.path(), "", true, 4).unwrap();
        let route = table.route(b"GTCA").unwrap();
        route.writer.lock().unwrap().write_all(b"@r\nA\n+\nI\n").unwrap();
        drop(route);
        table.close().unwrap();

        let file = File::open(dir.path().join("GTCA.fastq.gz")).unwrap();
        let mut out = String::new();
        flate2::read::GzDecoder::new(file).read_to_string(&mut out).unwrap();
        assert_eq!(out, "@r\nA\n+\nI\n");
    }

    #[test]
    fn capacity_of_one_is_overflow_only() {
        let dir = tempfile::tempdir().unwrap();
        let table = RoutingTable::new(dir.path(), "", false, 1).unwrap();
        assert!(table.route(b"AAAA").unwrap().overflow);
        assert_eq!(table.len(), 1);
        assert!(RoutingTable::new(dir.path(), "", false, 0).is_err());
    }
}
