//! Bounded, non-blocking channel over a shared segment.
//!
//! Single producer, single consumer. The segment starts with two counters
//! that only ever grow: `head` (next slot to read, written by the consumer)
//! and `tail` (next slot to write, written by the producer). The ring holds
//! `tail - head` records; slot `n` lives at index `n % capacity`.
//!
//! ```text
//! 0        64       128
//! ┌────────┬────────┬─────────┬─────────┬─────┬──────────────┐
//! │  head  │  tail  │ slot 0  │ slot 1  │ ... │ slot cap - 1 │
//! └────────┴────────┴─────────┴─────────┴─────┴──────────────┘
//! ```

use super::{Segment, SharedMemoryManager};
use crate::error::{Result, WorkerError};
use crate::payload::{Array, Element, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

const HEAD_OFFSET: usize = 0;
const TAIL_OFFSET: usize = 64;
const HEADER_LEN: usize = 128;

/// Slots are padded to this many bytes so every slot start is aligned for
/// any element type.
pub const SLOT_ALIGN: usize = 16;

/// Non-blocking failure of a channel operation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel is full")]
    Full,

    #[error("channel is empty")]
    Empty,
}

/// A value with a fixed encoded size that can be stored in a channel slot.
///
/// `Descriptor` captures whatever is fixed per channel (for arrays, the
/// layout); it is taken from the example record when the channel is created.
pub trait Record: Sized {
    type Descriptor: Clone + PartialEq + fmt::Debug;

    fn descriptor(&self) -> Self::Descriptor;

    /// Bytes needed to encode one record of this descriptor.
    fn encoded_len(descriptor: &Self::Descriptor) -> usize;

    /// Write the record into `slot` (exactly `encoded_len` bytes).
    fn encode(&self, slot: &mut [u8]);

    fn decode(descriptor: &Self::Descriptor, slot: &[u8]) -> Self;
}

impl<T: Element> Record for Array<T> {
    type Descriptor = Layout;

    fn descriptor(&self) -> Layout {
        self.layout()
    }

    fn encoded_len(descriptor: &Layout) -> usize {
        descriptor.byte_len()
    }

    fn encode(&self, slot: &mut [u8]) {
        slot.copy_from_slice(self.as_bytes());
    }

    fn decode(descriptor: &Layout, slot: &[u8]) -> Self {
        Array::from_bytes(descriptor.shape(), slot)
    }
}

/// Fixed-capacity FIFO of `R` records in shared memory.
pub struct Channel<R: Record> {
    segment: Arc<Segment>,
    descriptor: R::Descriptor,
    capacity: usize,
    record_len: usize,
    slot_size: usize,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Channel<R> {
    /// Allocate a channel whose records all share the descriptor of `example`.
    pub fn create_from_example(
        manager: &SharedMemoryManager,
        example: &R,
        capacity: usize,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(WorkerError::InvalidConfig(
                "channel capacity must be at least 1".into(),
            ));
        }

        let descriptor = example.descriptor();
        let record_len = R::encoded_len(&descriptor);
        let slot_size = record_len.max(1).next_multiple_of(SLOT_ALIGN);
        let segment = manager.allocate(HEADER_LEN + capacity * slot_size)?;

        Ok(Self {
            segment,
            descriptor,
            capacity,
            record_len,
            slot_size,
            _record: PhantomData,
        })
    }

    /// Another handle on the same ring, e.g. for a thread playing the
    /// other side. The single-producer, single-consumer rule still applies
    /// across all handles.
    pub fn clone_handle(&self) -> Self {
        Self {
            segment: Arc::clone(&self.segment),
            descriptor: self.descriptor.clone(),
            capacity: self.capacity,
            record_len: self.record_len,
            slot_size: self.slot_size,
            _record: PhantomData,
        }
    }

    pub fn descriptor(&self) -> &R::Descriptor {
        &self.descriptor
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records currently buffered.
    pub fn len(&self) -> usize {
        let head = self.head().load(Ordering::Acquire);
        let tail = self.tail().load(Ordering::Acquire);
        tail.saturating_sub(head) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue a record, or fail with [`ChannelError::Full`] without blocking.
    pub fn put(&mut self, record: &R) -> std::result::Result<(), ChannelError> {
        debug_assert_eq!(
            record.descriptor(),
            self.descriptor,
            "record does not match channel"
        );

        let tail = self.tail().load(Ordering::Relaxed);
        let head = self.head().load(Ordering::Acquire);
        if tail - head >= self.capacity as u64 {
            return Err(ChannelError::Full);
        }

        // Safety: slot `tail` is outside [head, tail), so the consumer is
        // not reading it, and only this producer writes slots.
        record.encode(unsafe { self.slot_mut(tail) });
        self.tail().store(tail + 1, Ordering::Release);
        Ok(())
    }

    /// Drain every buffered record in enqueue order.
    pub fn get_all(&mut self) -> std::result::Result<Vec<R>, ChannelError> {
        self.drain(None)
    }

    /// Drain the buffer, returning at most the `k` most recent records in
    /// enqueue order. Older records are consumed and discarded. `k` is
    /// treated as at least 1.
    pub fn get_k(&mut self, k: usize) -> std::result::Result<Vec<R>, ChannelError> {
        self.drain(Some(k.max(1)))
    }

    fn drain(&mut self, keep: Option<usize>) -> std::result::Result<Vec<R>, ChannelError> {
        let head = self.head().load(Ordering::Relaxed);
        let tail = self.tail().load(Ordering::Acquire);
        if tail == head {
            return Err(ChannelError::Empty);
        }

        let available = tail - head;
        let skip = keep.map_or(0, |k| available.saturating_sub(k as u64));
        let records = (head + skip..tail)
            // Safety: [head, tail) was published by the producer with
            // Release and is not rewritten until head moves past it.
            .map(|pos| R::decode(&self.descriptor, unsafe { self.slot(pos) }))
            .collect();

        self.head().store(tail, Ordering::Release);
        Ok(records)
    }

    fn head(&self) -> &AtomicU64 {
        // Safety: HEADER_LEN bytes are always mapped and 64-byte aligned.
        unsafe { self.segment.at(HEAD_OFFSET) }
    }

    fn tail(&self) -> &AtomicU64 {
        // Safety: as for `head`.
        unsafe { self.segment.at(TAIL_OFFSET) }
    }

    fn slot_offset(&self, pos: u64) -> usize {
        HEADER_LEN + (pos % self.capacity as u64) as usize * self.slot_size
    }

    /// # Safety
    /// The caller must ensure the producer is not writing this slot.
    unsafe fn slot(&self, pos: u64) -> &[u8] {
        let offset = self.slot_offset(pos);
        unsafe { std::slice::from_raw_parts(self.segment.as_ptr().add(offset), self.record_len) }
    }

    /// # Safety
    /// The caller must ensure the consumer is not reading this slot.
    unsafe fn slot_mut(&mut self, pos: u64) -> &mut [u8] {
        let offset = self.slot_offset(pos);
        unsafe {
            std::slice::from_raw_parts_mut(self.segment.as_ptr().add(offset), self.record_len)
        }
    }
}

impl<R: Record> fmt::Debug for Channel<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("descriptor", &self.descriptor)
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Whatever the interleaving of puts and drains, the channel never
        /// holds more than its capacity and never reorders what it kept.
        #[test]
        fn bounded_fifo(ops in prop::collection::vec(prop::option::of(any::<i16>()), 0..64),
                        capacity in 1usize..10) {
            let manager = SharedMemoryManager::start();
            let mut ch: Channel<Array<i16>> =
                Channel::create_from_example(&manager, &Array::zeros([1]), capacity).unwrap();
            let mut model: std::collections::VecDeque<i16> = Default::default();

            for op in ops {
                match op {
                    Some(v) => {
                        let record = Array::from_vec([1], vec![v]).unwrap();
                        let result = ch.put(&record);
                        if model.len() < capacity {
                            prop_assert!(result.is_ok());
                            model.push_back(v);
                        } else {
                            prop_assert_eq!(result, Err(ChannelError::Full));
                        }
                    }
                    None => {
                        let expected: Vec<i16> = model.drain(..).collect();
                        match ch.get_all() {
                            Ok(got) => {
                                let got: Vec<i16> = got.iter().map(|a| a.as_slice()[0]).collect();
                                prop_assert_eq!(got, expected);
                            }
                            Err(e) => {
                                prop_assert_eq!(e, ChannelError::Empty);
                                prop_assert!(expected.is_empty());
                            }
                        }
                    }
                }
                prop_assert!(ch.len() <= capacity);
            }
        }
    }
}
