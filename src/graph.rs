use std::marker::{Send, Sync};
use std::sync::Arc;
use std::thread;

use crate::errors::*;
use crate::read::*;

pub mod node;
pub use node::*;

/// Pipeline of read operations, where each operation is a node.
pub struct Graph {
    nodes: Vec<Arc<dyn GraphNode>>,
}

pub trait GraphNode: Send + Sync {
    /// Process one read. The boolean is whether the input is exhausted.
    fn run(&self, read: Option<Read>) -> Result<(Option<Read>, bool)>;
    fn name(&self) -> &'static str;
}

impl Graph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Add a read operation node to the graph and return the node.
    pub fn add<G: GraphNode + 'static>(&mut self, node: G) -> Arc<G> {
        let a = Arc::new(node);
        let b = Arc::clone(&a);
        self.nodes.push(a);
        b
    }

    /// Run a graph until all reads processed.
    pub fn run(&self) -> Result<()> {
        loop {
            let (_, done) = self.run_one(None)?;
            if done {
                break;
            }
        }

        Ok(())
    }

    /// Run a graph in parallel (multithreading) until all reads processed.
    ///
    /// The first error of any thread is returned once every thread has stopped.
    pub fn run_with_threads(&self, threads: usize) -> Result<()> {
        assert!(threads >= 1, "Number of threads must be greater than zero");

        if threads == 1 {
            return self.run();
        }

        thread::scope(|s| {
            let handles = (0..threads)
                .map(|_| s.spawn(|| self.run()))
                .collect::<Vec<_>>();

            // join everything before reporting so no panic is left behind in the scope
            let results = handles.into_iter().map(|h| h.join()).collect::<Vec<_>>();
            results.into_iter().try_for_each(|r| {
                r.map_err(|_| Error::WorkerPanicked("running the pipeline"))?
            })
        })
    }

    /// Run a single read through the graph.
    ///
    /// Returns an additional boolean indicating whether the graph is done executing.
    pub fn run_one(&self, mut curr: Option<Read>) -> Result<(Option<Read>, bool)> {
        for node in &self.nodes {
            let (c, done) = node.run(curr)?;
            curr = c;

            if done {
                return Ok((curr, done));
            }
            if curr.is_none() {
                break;
            }
        }

        Ok((curr, false))
    }

    /// Names of the nodes in order.
    pub fn node_names(&self) -> Vec<&'static str> {
        self.nodes.iter().map(|n| n.name()).collect()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
