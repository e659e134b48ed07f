use std::collections::VecDeque;
use std::time::Duration;

use crate::codec::packet::Packet;
use crate::models::error::RecorderError;
use crate::models::rational::Rational;
use crate::processing::rescale::rescale;

const MICROSECOND_TIME_BASE: Rational = Rational::new(1, 1_000_000);

fn micros(packet: &Packet) -> i64 {
    rescale(packet.pts, packet.time_base, MICROSECOND_TIME_BASE)
}

/// Orders packets from several streams by presentation time.
///
/// Each stream's packets must arrive in its own timestamp order. A packet is
/// released once every other stream has either queued something later or
/// ended. When one stream stalls, packets are forced out after the queued
/// span exceeds `max_delta`.
#[derive(Debug)]
pub struct Interleaver {
    queues: Vec<VecDeque<Packet>>,
    ended: Vec<bool>,
    max_delta_us: i64,
}

impl Interleaver {
    pub fn new(streams: usize, max_delta: Duration) -> Self {
        Self {
            queues: (0..streams).map(|_| VecDeque::new()).collect(),
            ended: vec![false; streams],
            max_delta_us: max_delta.as_micros().min(i64::MAX as u128) as i64,
        }
    }

    /// Queue `packet` and return the packets that are now safe to write.
    pub fn push(&mut self, packet: Packet) -> Result<Vec<Packet>, RecorderError> {
        let index = packet.stream_index;
        let queue = self
            .queues
            .get_mut(index)
            .ok_or_else(|| RecorderError::StorageError(format!("packet for unknown stream {}", index)))?;
        if self.ended[index] {
            return Err(RecorderError::StorageError(format!(
                "packet for stream {} after it ended",
                index
            )));
        }
        queue.push_back(packet);
        Ok(self.release())
    }

    /// Mark a stream as having no more packets.
    pub fn end_stream(&mut self, index: usize) -> Vec<Packet> {
        if let Some(ended) = self.ended.get_mut(index) {
            *ended = true;
        }
        self.release()
    }

    /// Release everything still queued, in timestamp order.
    pub fn drain(&mut self) -> Vec<Packet> {
        let mut out = Vec::new();
        while let Some(packet) = self.pop_earliest() {
            out.push(packet);
        }
        out
    }

    pub fn queued(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    fn release(&mut self) -> Vec<Packet> {
        let mut out = Vec::new();
        loop {
            let ready = self
                .queues
                .iter()
                .zip(&self.ended)
                .all(|(queue, &ended)| ended || !queue.is_empty());
            if !(ready || self.span_exceeded()) {
                break;
            }
            match self.pop_earliest() {
                Some(packet) => out.push(packet),
                None => break,
            }
        }
        out
    }

    fn span_exceeded(&self) -> bool {
        let oldest = self.queues.iter().filter_map(|q| q.front()).map(micros).min();
        let newest = self.queues.iter().filter_map(|q| q.back()).map(micros).max();
        match (oldest, newest) {
            (Some(oldest), Some(newest)) => newest.saturating_sub(oldest) > self.max_delta_us,
            _ => false,
        }
    }

    fn pop_earliest(&mut self) -> Option<Packet> {
        let (index, _) = self
            .queues
            .iter()
            .enumerate()
            .filter_map(|(i, q)| q.front().map(|p| (i, micros(p))))
            .min_by_key(|&(i, ts)| (ts, i))?;
        self.queues[index].pop_front()
    }
}
