// ## 📂 File: `src/stream/fanout.rs`
// ## Block copy engine: one source, N sinks, one barrier per block

//! Design notes:
//! - One sink: plain loop on the calling thread.
//! - N sinks: one scoped worker thread per sink, fed through a bounded(1)
//!   crossbeam channel. Every block goes to every worker; the next block is
//!   read only after all workers acknowledged the current one. Memory is
//!   bounded by `buffer_size × sinks` and all sinks see identical bytes.
//! - Fail fast: the first failing sink (in registration order) is reported and
//!   no further block is read. Remaining sinks are dropped without `close`.
//! - On EOF every sink is flushed, then closed in registration order; each
//!   close is attempted even after an earlier one failed.

use std::io::{self, Read};
use std::thread;

use bytes::Bytes;
use crossbeam::channel::{bounded, Receiver, Sender};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::DEFAULT_BUFFER_SIZE;
use crate::stream::io::{read_exact_or_eof, BlockSink};

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("no sinks registered")]
    NoSinks,

    #[error("reading source failed: {0}")]
    Source(#[source] io::Error),

    #[error("sink #{index} write failed: {source}")]
    Sink { index: usize, #[source] source: io::Error },

    #[error("sink #{index} close failed: {source}")]
    Close { index: usize, #[source] source: io::Error },

    #[error("sink #{index} worker terminated unexpectedly")]
    WorkerLost { index: usize },
}

impl FanoutError {
    /// The underlying I/O error, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            FanoutError::Source(e) => Some(e),
            FanoutError::Sink { source, .. } | FanoutError::Close { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Consume into the underlying I/O error, if any.
    pub fn into_io_error(self) -> Result<io::Error, FanoutError> {
        match self {
            FanoutError::Source(e) => Ok(e),
            FanoutError::Sink { source, .. } | FanoutError::Close { source, .. } => Ok(source),
            other => Err(other),
        }
    }
}

enum Command {
    Block(Bytes),
    Flush,
}

/// Generic byte-copy engine. Knows nothing about encryption.
#[derive(Debug, Clone, Copy)]
pub struct PipelineStream {
    buffer_size: usize,
}

impl Default for PipelineStream {
    fn default() -> Self {
        Self { buffer_size: DEFAULT_BUFFER_SIZE }
    }
}

impl PipelineStream {
    pub fn new(buffer_size: usize) -> Self {
        Self { buffer_size: buffer_size.max(1) }
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Copy `source` to every sink. Returns the number of bytes read from the
    /// source (each sink received exactly that many).
    pub fn copy<R>(&self, source: &mut R, sinks: Vec<Box<dyn BlockSink>>) -> Result<u64, FanoutError>
    where
        R: Read + ?Sized,
    {
        match sinks.len() {
            0 => Err(FanoutError::NoSinks),
            1 => self.copy_inline(source, sinks),
            _ => self.copy_parallel(source, sinks),
        }
    }

    fn copy_inline<R: Read + ?Sized>(&self, source: &mut R, mut sinks: Vec<Box<dyn BlockSink>>) -> Result<u64, FanoutError> {
        let mut total = 0u64;
        {
            let sink = &mut sinks[0];
            loop {
                let block = read_exact_or_eof(source, self.buffer_size).map_err(FanoutError::Source)?;
                if block.is_empty() {
                    break;
                }
                sink.write_block(&block).map_err(|source| FanoutError::Sink { index: 0, source })?;
                total += block.len() as u64;
            }
            sink.flush().map_err(|source| FanoutError::Sink { index: 0, source })?;
        }
        close_in_order(sinks)?;
        Ok(total)
    }

    fn copy_parallel<R: Read + ?Sized>(&self, source: &mut R, sinks: Vec<Box<dyn BlockSink>>) -> Result<u64, FanoutError> {
        let count = sinks.len();
        debug!(sinks = count, buffer_size = self.buffer_size, "fan-out copy started");

        let outcome = thread::scope(|scope| {
            let mut block_txs: Vec<Sender<Command>> = Vec::with_capacity(count);
            let mut ack_rxs: Vec<Receiver<io::Result<()>>> = Vec::with_capacity(count);
            let mut handles = Vec::with_capacity(count);

            // ---- Workers: one per sink, each owns its sink until joined ----
            for (index, mut sink) in sinks.into_iter().enumerate() {
                let (block_tx, block_rx) = bounded::<Command>(1);
                let (ack_tx, ack_rx) = bounded::<io::Result<()>>(1);
                block_txs.push(block_tx);
                ack_rxs.push(ack_rx);

                handles.push(scope.spawn(move || {
                    for command in block_rx.iter() {
                        let result = match command {
                            Command::Block(block) => sink.write_block(&block),
                            Command::Flush => sink.flush(),
                        };
                        let failed = result.is_err();
                        if ack_tx.send(result).is_err() || failed {
                            break;
                        }
                    }
                    debug!(index, "fan-out worker finished");
                    sink
                }));
            }

            // ---- Reader + barrier ----
            let mut total = 0u64;
            let mut failure: Option<FanoutError> = None;
            loop {
                let command = match read_exact_or_eof(source, self.buffer_size) {
                    Ok(block) if block.is_empty() => Command::Flush,
                    Ok(block) => {
                        total += block.len() as u64;
                        Command::Block(block)
                    }
                    Err(e) => {
                        failure = Some(FanoutError::Source(e));
                        break;
                    }
                };
                let is_flush = matches!(command, Command::Flush);

                if let Some(err) = broadcast(&block_txs, &ack_rxs, &command) {
                    failure = Some(err);
                    break;
                }
                if is_flush {
                    break;
                }
            }

            // Closing the channels lets every worker return its sink.
            drop(block_txs);
            let mut returned = Vec::with_capacity(count);
            for (index, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(sink) => returned.push(sink),
                    Err(_) => {
                        failure.get_or_insert(FanoutError::WorkerLost { index });
                    }
                }
            }

            match failure {
                Some(err) => Err(err),
                None => Ok((total, returned)),
            }
        });

        let (total, sinks) = outcome?;
        close_in_order(sinks)?;
        debug!(bytes = total, "fan-out copy finished");
        Ok(total)
    }
}

/// Send one command to every worker, then wait for every acknowledgement.
/// Returns the first failure in registration order.
fn broadcast(
    block_txs: &[Sender<Command>],
    ack_rxs: &[Receiver<io::Result<()>>],
    command: &Command,
) -> Option<FanoutError> {
    let mut sent = Vec::with_capacity(block_txs.len());
    for tx in block_txs {
        let copy = match command {
            Command::Block(block) => Command::Block(block.clone()),
            Command::Flush => Command::Flush,
        };
        sent.push(tx.send(copy).is_ok());
    }

    let mut first: Option<FanoutError> = None;
    for (index, (rx, was_sent)) in ack_rxs.iter().zip(sent).enumerate() {
        let outcome = if was_sent { rx.recv().ok() } else { None };
        let err = match outcome {
            Some(Ok(())) => continue,
            Some(Err(source)) => FanoutError::Sink { index, source },
            None => FanoutError::WorkerLost { index },
        };
        if first.is_none() {
            first = Some(err);
        }
    }
    first
}

/// Close every sink in order; report the first failure after trying all.
fn close_in_order(sinks: Vec<Box<dyn BlockSink>>) -> Result<(), FanoutError> {
    let mut first: Option<FanoutError> = None;
    for (index, mut sink) in sinks.into_iter().enumerate() {
        if let Err(source) = sink.close() {
            warn!(index, error = %source, "closing sink failed");
            if first.is_none() {
                first = Some(FanoutError::Close { index, source });
            }
        }
    }
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
