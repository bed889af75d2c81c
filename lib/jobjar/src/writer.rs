use anyhow::{anyhow, Context, Result};
use crossbeam_channel as channel;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::debug;

// Map tasks hand finished spill chunks to the pool; one IO thread per
// partition owns the files of that partition. Senders are bounded for
// backpressure.
pub struct WriterPool {
    senders: Vec<channel::Sender<WriterMsg>>,
    metrics: Arc<Vec<PartitionCounters>>,
}

enum WriterMsg {
    Data { task: usize, bytes: Vec<u8> },
    Close,
}

pub struct WriterJoiner {
    handles: Vec<thread::JoinHandle<Result<()>>>,
}

impl WriterJoiner {
    /// Waits for every IO thread; the first write error is returned.
    pub fn join_all(&mut self) -> Result<()> {
        let mut first = Ok(());
        for h in self.handles.drain(..) {
            let res = h.join().map_err(|_| anyhow!("spill writer thread panicked")).and_then(|r| r);
            if first.is_ok() {
                first = res;
            }
        }
        first
    }
}

/// `map-<task>-part-<partition>.bin`; zero padded so name order is task order.
pub fn spill_path(base_dir: &Path, task: usize, partition: usize) -> PathBuf {
    base_dir.join(format!("map-{:05}-part-{:05}.bin", task, partition))
}

pub fn spill_glob(base_dir: &Path, partition: usize) -> String {
    format!("{}/map-*-part-{:05}.bin", glob::Pattern::escape(&base_dir.to_string_lossy()), partition)
}

impl WriterPool {
    pub fn new(base_dir: &Path, num_partitions: usize, flush_bytes: usize, queue_cap: usize) -> Result<(Self, WriterJoiner)> {
        crate::io::ensure_dir(base_dir)?;
        let mut senders = Vec::with_capacity(num_partitions);
        let mut handles = Vec::with_capacity(num_partitions);
        let metrics: Arc<Vec<PartitionCounters>> = Arc::new((0..num_partitions).map(|_| PartitionCounters::default()).collect());
        for part in 0..num_partitions {
            let (tx, rx) = channel::bounded::<WriterMsg>(queue_cap.max(1));
            let base_dir = base_dir.to_path_buf();
            let metrics = Arc::clone(&metrics);
            let handle = thread::spawn(move || -> Result<()> {
                let counters = &metrics[part];
                let mut buffers: HashMap<usize, Vec<u8>> = HashMap::new();
                let mut writers: HashMap<usize, BufWriter<File>> = HashMap::new();
                let mut write_out = |task: usize, buf: &mut Vec<u8>| -> Result<()> {
                    if buf.is_empty() {
                        return Ok(());
                    }
                    let writer = match writers.entry(task) {
                        std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
                        std::collections::hash_map::Entry::Vacant(e) => {
                            counters.files.fetch_add(1, Ordering::Relaxed);
                            e.insert(crate::io::open_writer(spill_path(&base_dir, task, part))?)
                        }
                    };
                    writer.write_all(buf).with_context(|| format!("writing spill for task {} partition {}", task, part))?;
                    counters.bytes_written.fetch_add(buf.len() as u64, Ordering::Relaxed);
                    counters.write_calls.fetch_add(1, Ordering::Relaxed);
                    buf.clear();
                    Ok(())
                };
                // A disconnected channel is treated like Close.
                while let Ok(WriterMsg::Data { task, bytes }) = rx.recv() {
                    let buf = buffers.entry(task).or_default();
                    buf.extend_from_slice(&bytes);
                    if buf.len() >= flush_bytes {
                        counters.flush_by_size.fetch_add(1, Ordering::Relaxed);
                        write_out(task, buf)?;
                    }
                }
                for (task, buf) in buffers.iter_mut() {
                    write_out(*task, buf)?;
                }
                for (task, mut w) in writers {
                    w.flush().with_context(|| format!("flushing spill for task {} partition {}", task, part))?;
                }
                Ok(())
            });
            senders.push(tx);
            handles.push(handle);
        }
        Ok((Self { senders, metrics }, WriterJoiner { handles }))
    }

    pub fn num_partitions(&self) -> usize {
        self.senders.len()
    }

    // The pool takes ownership of the chunk; the IO thread batches it.
    pub fn write_chunk(&self, task: usize, partition: usize, bytes: Vec<u8>) -> Result<()> {
        let counters = &self.metrics[partition];
        counters.enq_count.fetch_add(1, Ordering::Relaxed);
        counters.enq_bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.senders[partition]
            .send(WriterMsg::Data { task, bytes })
            .map_err(|e| anyhow!("send failed: {}", e))
    }

    pub fn close_all(&self) {
        for tx in &self.senders {
            let _ = tx.send(WriterMsg::Close);
        }
    }

    pub fn make_thread_writer(&self, task: usize, local_batch_bytes: usize) -> ThreadWriter<'_> {
        ThreadWriter::new(self, task, local_batch_bytes)
    }
}

/// Per-task aggregation in front of the pool, so small records do not each
/// cost a channel send.
pub struct ThreadWriter<'a> {
    pool: &'a WriterPool,
    task: usize,
    local_buffers: Vec<Vec<u8>>,
    batch_bytes: usize,
    flushes: u64,
    bytes_sent: u64,
}

impl<'a> ThreadWriter<'a> {
    fn new(pool: &'a WriterPool, task: usize, batch_bytes: usize) -> Self {
        let local_buffers = (0..pool.num_partitions()).map(|_| Vec::new()).collect();
        Self { pool, task, local_buffers, batch_bytes, flushes: 0, bytes_sent: 0 }
    }

    /// Mutable access to a partition's buffer; records are appended in place
    /// and `maybe_flush` sends the buffer once it is large enough.
    pub fn buffer(&mut self, partition: usize) -> &mut Vec<u8> {
        &mut self.local_buffers[partition]
    }

    pub fn maybe_flush(&mut self, partition: usize) -> Result<()> {
        if self.local_buffers[partition].len() >= self.batch_bytes {
            self.flush_partition(partition)?;
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> Result<()> {
        for p in 0..self.local_buffers.len() {
            if !self.local_buffers[p].is_empty() {
                self.flush_partition(p)?;
            }
        }
        Ok(())
    }

    fn flush_partition(&mut self, partition: usize) -> Result<()> {
        let chunk = std::mem::take(&mut self.local_buffers[partition]);
        self.bytes_sent += chunk.len() as u64;
        self.flushes += 1;
        self.pool.write_chunk(self.task, partition, chunk)
    }

    pub fn stats(&self) -> (u64, u64) {
        (self.flushes, self.bytes_sent)
    }
}

#[derive(Default)]
struct PartitionCounters {
    enq_count: AtomicU64,
    enq_bytes: AtomicU64,
    flush_by_size: AtomicU64,
    bytes_written: AtomicU64,
    write_calls: AtomicU64,
    files: AtomicU64,
}

#[derive(Clone, Debug)]
pub struct WriterPartitionMetrics {
    pub partition: usize,
    pub enq_count: u64,
    pub enq_bytes: u64,
    pub flush_by_size: u64,
    pub bytes_written: u64,
    pub write_calls: u64,
    pub files: u64,
}

impl WriterPool {
    pub fn metrics_snapshot(&self) -> Vec<WriterPartitionMetrics> {
        self.metrics
            .iter()
            .enumerate()
            .map(|(partition, c)| WriterPartitionMetrics {
                partition,
                enq_count: c.enq_count.load(Ordering::Relaxed),
                enq_bytes: c.enq_bytes.load(Ordering::Relaxed),
                flush_by_size: c.flush_by_size.load(Ordering::Relaxed),
                bytes_written: c.bytes_written.load(Ordering::Relaxed),
                write_calls: c.write_calls.load(Ordering::Relaxed),
                files: c.files.load(Ordering::Relaxed),
            })
            .collect()
    }

    pub fn log_metrics(&self) {
        for m in self.metrics_snapshot() {
            debug!(
                partition = m.partition,
                enq_count = m.enq_count,
                enq_bytes = m.enq_bytes,
                flush_by_size = m.flush_by_size,
                bytes_written = m.bytes_written,
                write_calls = m.write_calls,
                files = m.files,
                "spill writer metrics"
            );
        }
    }
}
