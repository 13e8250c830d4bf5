// Copyright (C) Microsoft Corporation. All rights reserved.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Background batch I/O for file-backed arrays (§5): a producer thread fills
//! a bounded queue of fixed-size byte batches for reads, and a single-slot
//! ping-pong hands batches to a background writer thread. A zero-length
//! batch is the end-of-stream sentinel on both sides.

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use util::errors::IoError;

/// Size of one background-I/O batch. Chosen to amortize syscall overhead
/// without holding more than a few batches in memory at once.
pub const BATCH_BYTES: usize = 64 * 1024;

/// Reads a file in the background, publishing `BATCH_BYTES` chunks onto a
/// queue of depth 2. The consumer calls `next_batch` until it returns an
/// empty `Vec`, which marks end-of-stream.
pub struct BatchReader {
    receiver: Receiver<Vec<u8>>,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl BatchReader {
    pub fn open(path: PathBuf) -> Result<Self, IoError> {
        let (sender, receiver): (SyncSender<Vec<u8>>, Receiver<Vec<u8>>) = sync_channel(2);
        let handle = thread::spawn(move || -> std::io::Result<()> {
            let mut file = File::open(&path)?;
            loop {
                let mut buf = vec![0u8; BATCH_BYTES];
                let n = read_up_to(&mut file, &mut buf)?;
                buf.truncate(n);
                let done = buf.is_empty();
                if sender.send(buf).is_err() {
                    break;
                }
                if done {
                    break;
                }
            }
            Ok(())
        });
        Ok(BatchReader {
            receiver,
            handle: Some(handle),
        })
    }

    /// Blocks for the next batch; returns an empty `Vec` at end-of-stream.
    pub fn next_batch(&mut self) -> Result<Vec<u8>, IoError> {
        match self.receiver.recv() {
            Ok(batch) => Ok(batch),
            Err(_) => self.join_error(),
        }
    }

    /// Reads the whole file by draining batches until the sentinel.
    pub fn read_all(mut self) -> Result<Vec<u8>, IoError> {
        let mut out = Vec::new();
        loop {
            let batch = self.next_batch()?;
            if batch.is_empty() {
                break;
            }
            out.extend_from_slice(&batch);
        }
        Ok(out)
    }

    fn join_error(&mut self) -> Result<Vec<u8>, IoError> {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Ok(())) => Ok(Vec::new()),
                Ok(Err(e)) => Err(IoError::Io(e)),
                Err(_) => Err(IoError::BackgroundTaskFailed(
                    "batch reader thread panicked".to_string(),
                )),
            }
        } else {
            Ok(Vec::new())
        }
    }
}

fn read_up_to(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

/// Accepts batches for a background writer thread through a single-slot
/// ping-pong: `write_next` blocks until the previous batch has been handed
/// off, so at most one batch is ever queued.
pub struct BatchWriter {
    sender: Option<SyncSender<Vec<u8>>>,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl BatchWriter {
    pub fn create(path: PathBuf) -> Result<Self, IoError> {
        let (sender, receiver): (SyncSender<Vec<u8>>, Receiver<Vec<u8>>) = sync_channel(1);
        let handle = thread::spawn(move || -> std::io::Result<()> {
            let mut file = File::create(&path)?;
            while let Ok(batch) = receiver.recv() {
                if batch.is_empty() {
                    break;
                }
                file.write_all(&batch)?;
            }
            file.flush()
        });
        Ok(BatchWriter {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    /// Hands `batch` to the background writer, blocking until the prior
    /// batch has been accepted.
    pub fn write_next(&self, batch: Vec<u8>) -> Result<(), IoError> {
        #[allow(clippy::expect_used)]
        let sender = self
            .sender
            .as_ref()
            .expect("write_next called after close");
        sender
            .send(batch)
            .map_err(|_| IoError::BackgroundTaskFailed("batch writer thread exited".to_string()))
    }

    /// Blocks until the pending batch completes and the file is flushed.
    pub fn close(mut self) -> Result<(), IoError> {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Vec::new());
        }
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(IoError::Io(e)),
                Err(_) => Err(IoError::BackgroundTaskFailed(
                    "batch writer thread panicked".to_string(),
                )),
            }
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn round_trips_data_larger_than_one_batch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");

        let payload: Vec<u8> = (0..(BATCH_BYTES * 3 + 17)).map(|i| (i % 251) as u8).collect();

        let writer = BatchWriter::create(path.clone()).unwrap();
        for chunk in payload.chunks(BATCH_BYTES / 2) {
            writer.write_next(chunk.to_vec()).unwrap();
        }
        writer.close().unwrap();

        let reader = BatchReader::open(path).unwrap();
        let read_back = reader.read_all().unwrap();
        assert_eq!(read_back, payload);
    }

    #[test]
    fn empty_file_yields_empty_batch_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        let writer = BatchWriter::create(path.clone()).unwrap();
        writer.close().unwrap();

        let reader = BatchReader::open(path).unwrap();
        assert_eq!(reader.read_all().unwrap(), Vec::<u8>::new());
    }
}
