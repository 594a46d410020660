//! 수신 시퀀스 추적기
//!
//! 수신한 seq_no를 닫힌 구간 `[first, last]`의 정렬된 목록으로 보관한다.
//! 인접하거나 겹치는 구간은 항상 병합되므로 메모리는 패킷 수가 아니라
//! 구멍(gap) 수에 비례하고, 완료 판정은 구간 하나의 경계 검사로 끝난다.
//!
//! 수신 연결당 하나씩 만들어지고 Sequencing 스레드만 변경한다.

/// 수신 완료된 seq_no 구간 (양 끝 포함)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceRange {
    pub first: u32,
    pub last: u32,
}

impl SequenceRange {
    pub fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    pub fn contains(&self, seq_no: u32) -> bool {
        self.first <= seq_no && seq_no <= self.last
    }

    /// `next`가 이 구간 바로 뒤에 붙는지
    fn touches(&self, next: &SequenceRange) -> bool {
        self.last.checked_add(1) == Some(next.first)
    }
}

/// 구간 집합 기반 시퀀서
#[derive(Debug, Default)]
pub struct Sequencer {
    /// 오름차순, 겹침/인접 없음
    ranges: Vec<SequenceRange>,

    /// 지금까지 본 가장 큰 seq_no
    max_seq_no: u32,

    /// END 패킷의 seq_no (수신 전에는 None)
    expected_last_seq_no: Option<u32>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// seq_no 수신 기록
    ///
    /// 이미 기록된 번호면 아무것도 바꾸지 않고 `false`를 반환한다.
    pub fn add(&mut self, seq_no: u32, is_last: bool) -> bool {
        if is_last {
            self.expected_last_seq_no = Some(seq_no);
            self.max_seq_no = seq_no;
        } else if seq_no > self.max_seq_no {
            self.max_seq_no = seq_no;
        }

        // seq_no 이상에서 끝나는 첫 구간
        let idx = self.ranges.partition_point(|r| r.last < seq_no);
        if idx < self.ranges.len() && self.ranges[idx].first <= seq_no {
            return false;
        }

        // 여기서 ranges[idx - 1].last < seq_no < ranges[idx].first
        let joins_prev = idx > 0 && self.ranges[idx - 1].last + 1 == seq_no;
        let joins_next = idx < self.ranges.len() && seq_no + 1 == self.ranges[idx].first;

        match (joins_prev, joins_next) {
            (true, true) => {
                let absorbed = self.ranges.remove(idx);
                self.ranges[idx - 1].last = absorbed.last;
            }
            (true, false) => self.ranges[idx - 1].last = seq_no,
            (false, true) => self.ranges[idx].first = seq_no,
            (false, false) => self.ranges.insert(idx, SequenceRange::new(seq_no, seq_no)),
        }

        true
    }

    /// seq_no가 기록된 구간에 포함되는지
    pub fn check(&self, seq_no: u32) -> bool {
        let idx = self.ranges.partition_point(|r| r.last < seq_no);
        self.ranges
            .get(idx)
            .map_or(false, |range| range.contains(seq_no))
    }

    /// `[0, max_seq_no)` 중 아직 기록되지 않은 번호들
    ///
    /// 현재 구간 상태에서 매번 새로 계산되므로, 기록되기 전까지는
    /// 같은 번호가 반복해서 보고된다.
    pub fn missing_segments(&self) -> MissingSegments<'_> {
        MissingSegments {
            ranges: &self.ranges,
            next_range: 0,
            cursor: Some(0),
            end: self.max_seq_no,
        }
    }

    /// 전체 수신 완료 여부
    ///
    /// 인접 구간을 한 번 더 병합한 뒤, `[0, expected_last]`를 덮는
    /// 단일 구간만 남았는지 확인한다.
    pub fn is_complete(&mut self) -> bool {
        self.coalesce();

        match (self.expected_last_seq_no, self.ranges.as_slice()) {
            (Some(expected_last), [only]) => only.first == 0 && only.last == expected_last,
            _ => false,
        }
    }

    fn coalesce(&mut self) {
        let mut merged: Vec<SequenceRange> = Vec::with_capacity(self.ranges.len());
        for range in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(prev) if prev.touches(&range) || prev.last >= range.first => {
                    prev.last = prev.last.max(range.last);
                }
                _ => merged.push(range),
            }
        }
        self.ranges = merged;
    }

    pub fn ranges(&self) -> &[SequenceRange] {
        &self.ranges
    }

    pub fn max_seq_no(&self) -> u32 {
        self.max_seq_no
    }

    pub fn expected_last_seq_no(&self) -> Option<u32> {
        self.expected_last_seq_no
    }
}

/// [`Sequencer::missing_segments`] 반복자
#[derive(Debug, Clone)]
pub struct MissingSegments<'a> {
    ranges: &'a [SequenceRange],
    next_range: usize,
    cursor: Option<u32>,
    end: u32,
}

impl Iterator for MissingSegments<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            let cursor = self.cursor.filter(|&c| c < self.end)?;

            match self.ranges.get(self.next_range) {
                Some(range) if range.first <= cursor => {
                    // 구간 건너뛰기
                    self.next_range += 1;
                    if range.last >= cursor {
                        self.cursor = range.last.checked_add(1);
                    }
                }
                _ => {
                    self.cursor = cursor.checked_add(1);
                    return Some(cursor);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariant(seq: &Sequencer) {
        for pair in seq.ranges().windows(2) {
            assert!(pair[0].first <= pair[0].last);
            assert!(
                pair[0].last + 1 < pair[1].first,
                "ranges overlap or touch: {:?}",
                pair
            );
        }
    }

    #[test]
    fn test_gap_detection() {
        let mut seq = Sequencer::new();
        for n in [0, 1, 2, 5] {
            assert!(seq.add(n, false));
        }
        assert!(seq.add(6, true));

        assert_eq!(
            seq.ranges(),
            &[SequenceRange::new(0, 2), SequenceRange::new(5, 6)]
        );
        assert_eq!(seq.missing_segments().collect::<Vec<_>>(), vec![3, 4]);
        assert!(!seq.is_complete());

        seq.add(3, false);
        seq.add(4, false);
        assert_eq!(seq.ranges(), &[SequenceRange::new(0, 6)]);
        assert!(seq.missing_segments().next().is_none());
        assert!(seq.is_complete());
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let mut seq = Sequencer::new();
        assert!(seq.add(4, false));
        assert!(seq.add(5, false));
        let before = seq.ranges().to_vec();

        assert!(!seq.add(4, false));
        assert!(!seq.add(5, false));
        assert_eq!(seq.ranges(), before.as_slice());
    }

    #[test]
    fn test_merge_both_sides() {
        let mut seq = Sequencer::new();
        seq.add(10, false);
        seq.add(12, false);
        seq.add(8, false);
        assert_eq!(seq.ranges().len(), 3);

        seq.add(11, false);
        assert_eq!(
            seq.ranges(),
            &[SequenceRange::new(8, 8), SequenceRange::new(10, 12)]
        );

        seq.add(9, false);
        assert_eq!(seq.ranges(), &[SequenceRange::new(8, 12)]);
        assert_invariant(&seq);
    }

    #[test]
    fn test_out_of_order_keeps_invariant() {
        let mut seq = Sequencer::new();
        let order = [17, 3, 9, 0, 4, 16, 2, 8, 1, 15, 5, 10, 7, 14, 6, 11, 13, 12];
        for (i, &n) in order.iter().enumerate() {
            seq.add(n, n == 17);
            assert_invariant(&seq);
            assert_eq!(seq.is_complete(), i == order.len() - 1);
        }
        assert_eq!(seq.ranges(), &[SequenceRange::new(0, 17)]);
    }

    #[test]
    fn test_shuffled_arrivals_keep_invariant() {
        use rand::rngs::StdRng;
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        for seed in 0..8u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut order: Vec<u32> = (0..64).collect();
            order.shuffle(&mut rng);
            // 재전송 흉내: 일부는 두 번 도착
            let duplicates: Vec<u32> = order.iter().copied().step_by(5).collect();
            order.extend(duplicates);

            let mut seq = Sequencer::new();
            for &n in &order {
                seq.add(n, n == 63);
                assert_invariant(&seq);
            }
            assert!(seq.is_complete(), "seed {}", seed);
            assert_eq!(seq.ranges(), &[SequenceRange::new(0, 63)]);
        }
    }

    #[test]
    fn test_check() {
        let mut seq = Sequencer::new();
        seq.add(2, false);
        seq.add(3, false);
        seq.add(7, false);

        assert!(!seq.check(0));
        assert!(seq.check(2));
        assert!(seq.check(3));
        assert!(!seq.check(4));
        assert!(seq.check(7));
        assert!(!seq.check(8));
    }

    #[test]
    fn test_incomplete_without_last() {
        let mut seq = Sequencer::new();
        for n in 0..10 {
            seq.add(n, false);
        }
        assert_eq!(seq.ranges().len(), 1);
        assert_eq!(seq.expected_last_seq_no(), None);
        assert!(!seq.is_complete());

        seq.add(10, true);
        assert!(seq.is_complete());
        assert_eq!(seq.expected_last_seq_no(), Some(10));
    }

    #[test]
    fn test_missing_segments_is_restartable() {
        let mut seq = Sequencer::new();
        seq.add(1, false);
        seq.add(4, false);

        let first: Vec<u32> = seq.missing_segments().collect();
        let second: Vec<u32> = seq.missing_segments().collect();
        assert_eq!(first, vec![0, 2, 3]);
        assert_eq!(first, second);

        // max 이상은 보고하지 않음
        seq.add(9, false);
        assert_eq!(
            seq.missing_segments().collect::<Vec<_>>(),
            vec![0, 2, 3, 5, 6, 7, 8]
        );
    }

    #[test]
    fn test_completeness_matches_missing() {
        let mut seq = Sequencer::new();
        seq.add(3, true);
        seq.add(0, false);
        seq.add(1, false);
        assert_eq!(seq.missing_segments().collect::<Vec<_>>(), vec![2]);
        assert!(!seq.is_complete());

        seq.add(2, false);
        assert!(seq.missing_segments().next().is_none());
        assert!(seq.is_complete());
    }

    #[test]
    fn test_extreme_seq_numbers() {
        let mut seq = Sequencer::new();
        seq.add(u32::MAX, false);
        seq.add(u32::MAX - 1, false);
        assert_eq!(seq.ranges(), &[SequenceRange::new(u32::MAX - 1, u32::MAX)]);
        assert!(seq.check(u32::MAX));
        assert_eq!(seq.missing_segments().take(3).collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
