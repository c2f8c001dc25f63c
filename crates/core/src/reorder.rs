//! Sequence reordering for RTP packets.
//!
//! UDP multicast may deliver packets slightly out of order. The
//! [`ReorderBuffer`] holds packets that arrive ahead of the next expected
//! sequence number and releases them once the gap fills, or once too many
//! are waiting, in which case the gap is declared lost.
//!
//! Sequence numbers are 16-bit and wrap: `b` is ahead of `a` when
//! `(b - a) mod 2^16` lies in `1..=32767`.
//!
//! ```text
//! arrival:   100 101 103 102 104
//! emitted:   100 101  -  102,103 104
//! held:       -   -  [103] -   -
//! ```

use std::collections::VecDeque;

/// What happened to one pushed packet.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Packets released to the caller, including held ones drained behind it.
    pub emitted: usize,
    /// Sequence numbers skipped over and declared lost.
    pub lost: u64,
    /// The packet was behind the expected sequence or a duplicate, and was discarded.
    pub late: bool,
}

/// Bounded, sequence-ordered holding area.
///
/// `held` stays sorted by distance ahead of `next_expected` and never
/// holds more than `depth - 1` packets between pushes.
#[derive(Debug)]
pub struct ReorderBuffer<T> {
    next_expected: Option<u16>,
    held: VecDeque<(u16, T)>,
    depth: usize,
}

impl<T> ReorderBuffer<T> {
    /// Create a buffer holding at most `depth` packets. A depth below 1 is
    /// treated as 1.
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            next_expected: None,
            held: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// The sequence number that would be emitted immediately, once known.
    pub fn next_expected(&self) -> Option<u16> {
        self.next_expected
    }

    pub fn held_len(&self) -> usize {
        self.held.len()
    }

    /// Accept one packet, passing every packet that becomes deliverable to
    /// `emit` in sequence order.
    ///
    /// The first packet after construction or [`reset`](Self::reset) sets
    /// the expected sequence.
    pub fn push(&mut self, sequence: u16, item: T, mut emit: impl FnMut(u16, T)) -> Progress {
        let mut progress = Progress::default();
        let next = *self.next_expected.get_or_insert(sequence);
        let ahead = sequence.wrapping_sub(next);

        if ahead == 0 {
            emit(sequence, item);
            progress.emitted += 1;
            self.next_expected = Some(sequence.wrapping_add(1));
            self.drain(&mut emit, &mut progress);
        } else if (ahead as i16) > 0 {
            let pos = self
                .held
                .partition_point(|(held, _)| held.wrapping_sub(next) < ahead);
            if matches!(self.held.get(pos), Some((held, _)) if *held == sequence) {
                progress.late = true;
                return progress;
            }
            self.held.insert(pos, (sequence, item));

            if self.held.len() >= self.depth {
                self.release_oldest(&mut emit, &mut progress);
                self.drain(&mut emit, &mut progress);
            }
        } else {
            progress.late = true;
        }

        if progress.lost > 0 {
            tracing::warn!(
                lost = progress.lost,
                next_expected = ?self.next_expected,
                "sequence gap declared lost"
            );
        }
        progress
    }

    /// Release every held packet in order, counting the gaps between them.
    pub fn flush(&mut self, mut emit: impl FnMut(u16, T)) -> Progress {
        let mut progress = Progress::default();
        while !self.held.is_empty() {
            self.release_oldest(&mut emit, &mut progress);
        }
        progress
    }

    /// Forget all state. The next pushed packet starts a new sequence.
    pub fn reset(&mut self) {
        self.held.clear();
        self.next_expected = None;
    }

    fn release_oldest(&mut self, emit: &mut impl FnMut(u16, T), progress: &mut Progress) {
        let Some((sequence, item)) = self.held.pop_front() else {
            return;
        };
        if let Some(next) = self.next_expected {
            progress.lost += u64::from(sequence.wrapping_sub(next));
        }
        emit(sequence, item);
        progress.emitted += 1;
        self.next_expected = Some(sequence.wrapping_add(1));
    }

    fn drain(&mut self, emit: &mut impl FnMut(u16, T), progress: &mut Progress) {
        while let Some(next) = self.next_expected {
            match self.held.front() {
                Some((sequence, _)) if *sequence == next => {
                    if let Some((sequence, item)) = self.held.pop_front() {
                        emit(sequence, item);
                        progress.emitted += 1;
                        self.next_expected = Some(sequence.wrapping_add(1));
                    }
                }
                _ => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;

    /// Push `sequences` (item = sequence) and collect emissions and totals.
    fn run(depth: usize, sequences: &[u16]) -> (Vec<u16>, u64, usize, ReorderBuffer<u16>) {
        let mut buffer = ReorderBuffer::new(depth);
        let mut out = Vec::new();
        let mut lost = 0;
        let mut late = 0;
        for &seq in sequences {
            let p = buffer.push(seq, seq, |_, item| out.push(item));
            lost += p.lost;
            late += p.late as usize;
        }
        (out, lost, late, buffer)
    }

    #[test]
    fn in_order_passes_through() {
        let (out, lost, late, buffer) = run(32, &[7, 8, 9, 10]);
        assert_eq!(out, vec![7, 8, 9, 10]);
        assert_eq!((lost, late), (0, 0));
        assert_eq!(buffer.next_expected(), Some(11));
    }

    #[test]
    fn single_swap_is_restored() {
        let (out, lost, _, buffer) = run(32, &[100, 101, 103, 102, 104]);
        assert_eq!(out, vec![100, 101, 102, 103, 104]);
        assert_eq!(lost, 0);
        assert_eq!(buffer.held_len(), 0);
    }

    #[test]
    fn missing_packet_released_at_depth() {
        let (out, lost, _, _) = run(2, &[100, 102, 103]);
        assert_eq!(out, vec![100, 102, 103]);
        assert_eq!(lost, 1);
    }

    #[test]
    fn missing_packet_waits_below_depth() {
        let (out, lost, _, mut buffer) = run(32, &[100, 102, 103]);
        assert_eq!(out, vec![100]);
        assert_eq!(lost, 0);
        assert_eq!(buffer.held_len(), 2);

        let mut flushed = Vec::new();
        let p = buffer.flush(|_, item| flushed.push(item));
        assert_eq!(flushed, vec![102, 103]);
        assert_eq!(p.lost, 1);
        assert_eq!(buffer.next_expected(), Some(104));
    }

    #[test]
    fn late_arrival_after_release_is_discarded() {
        let (out, lost, late, _) = run(2, &[100, 102, 103, 101]);
        assert_eq!(out, vec![100, 102, 103]);
        assert_eq!(lost, 1);
        assert_eq!(late, 1);
    }

    #[test]
    fn sequence_rollover_is_continuous() {
        let (out, lost, late, buffer) = run(32, &[65534, 65535, 0, 1]);
        assert_eq!(out, vec![65534, 65535, 0, 1]);
        assert_eq!((lost, late), (0, 0));
        assert_eq!(buffer.next_expected(), Some(2));
    }

    #[test]
    fn reorder_across_rollover() {
        let (out, lost, _, _) = run(32, &[65534, 0, 65535, 1]);
        assert_eq!(out, vec![65534, 65535, 0, 1]);
        assert_eq!(lost, 0);
    }

    #[test]
    fn gap_across_rollover_counts_exactly() {
        let (out, lost, _, _) = run(1, &[65534, 1]);
        assert_eq!(out, vec![65534, 1]);
        assert_eq!(lost, 2);
    }

    #[test]
    fn duplicates_discarded() {
        let (out, _, late, _) = run(32, &[5, 5, 7, 7, 6, 6]);
        assert_eq!(out, vec![5, 6, 7]);
        assert_eq!(late, 3);
    }

    #[test]
    fn far_behind_is_late() {
        // 32768 behind is not "ahead", so it is discarded.
        let (out, _, late, _) = run(32, &[40000, 40001, 7234]);
        assert_eq!(out, vec![40000, 40001]);
        assert_eq!(late, 1);
    }

    #[test]
    fn depth_one_emits_in_arrival_order() {
        let (out, lost, late, buffer) = run(1, &[10, 12, 11, 13]);
        assert_eq!(out, vec![10, 12, 13]);
        assert_eq!(lost, 1);
        assert_eq!(late, 1);
        assert_eq!(buffer.held_len(), 0);
    }

    #[test]
    fn zero_depth_behaves_as_one() {
        let (out, lost, _, _) = run(0, &[1, 3]);
        assert_eq!(out, vec![1, 3]);
        assert_eq!(lost, 1);
    }

    #[test]
    fn held_never_reaches_depth() {
        let mut buffer = ReorderBuffer::new(4);
        buffer.push(0, (), |_, _| {});
        for seq in 2..50u16 {
            buffer.push(seq, (), |_, _| {});
            assert!(buffer.held_len() < 4);
        }
    }

    #[test]
    fn reset_restarts_sequencing() {
        let (_, _, _, mut buffer) = run(32, &[500, 502]);
        buffer.reset();
        assert_eq!(buffer.next_expected(), None);
        let mut out = Vec::new();
        buffer.push(9, 9, |_, item| out.push(item));
        assert_eq!(out, vec![9]);
        assert_eq!(buffer.next_expected(), Some(10));
    }

    #[test]
    fn shuffled_within_depth_is_sorted_and_lossless() {
        let depth = 8;
        let mut rng = StdRng::seed_from_u64(0x5EED);
        for start in [0u16, 1000, 65_500] {
            let mut sequences: Vec<u16> = (0..400u16).map(|i| start.wrapping_add(i)).collect();
            // The first packet fixes the expected sequence, so keep it first.
            for chunk in sequences[1..].chunks_mut(depth) {
                chunk.shuffle(&mut rng);
            }
            let (out, lost, late, buffer) = run(depth, &sequences);
            let expected: Vec<u16> = (0..400u16).map(|i| start.wrapping_add(i)).collect();
            assert_eq!(out, expected, "start {start}");
            assert_eq!((lost, late), (0, 0));
            assert_eq!(buffer.held_len(), 0);
        }
    }

    #[test]
    fn shuffled_with_loss_stays_ordered_and_unique() {
        let depth = 6;
        let mut rng = StdRng::seed_from_u64(42);
        let all: Vec<u32> = (0..600u32).collect();
        let mut sent: Vec<u32> = all.iter().copied().filter(|i| *i == 0 || i % 37 != 0).collect();
        for chunk in sent[1..].chunks_mut(depth) {
            chunk.shuffle(&mut rng);
        }
        let dropped = (all.len() - sent.len()) as u64;

        let mut buffer = ReorderBuffer::new(depth);
        let mut out: Vec<u32> = Vec::new();
        let mut lost = 0;
        for &i in &sent {
            lost += buffer.push(i as u16, i, |_, item| out.push(item)).lost;
        }
        lost += buffer.flush(|_, item| out.push(item)).lost;

        assert!(out.windows(2).all(|w| w[0] < w[1]), "not strictly increasing");
        assert!(lost >= dropped);
        assert_eq!(out.len() as u64 + lost, all.len() as u64);
    }

    #[test]
    fn in_order_with_loss_counts_each_gap() {
        let sequences: Vec<u16> = (0..200u16).filter(|i| i % 10 != 5).collect();
        let (out, lost, _, mut buffer) = run(3, &sequences);
        let mut out = out;
        let flushed = buffer.flush(|_, item| out.push(item));
        assert_eq!(out, sequences);
        assert_eq!(lost + flushed.lost, 20);
    }
}
