//! 송신 윈도우 관리
//!
//! 파티션 흐름 하나가 독점하는 pending(재전송 대기) / in-flight(전송 후 미확인)
//! 두 큐. 흐름 간에 공유하지 않으므로 잠금이 필요 없다.

use std::collections::VecDeque;

use crate::packet::{CtrlFlag, CtrlPacket, DataPacket};
use crate::Result;

/// 새 DATA 패킷 공급원 (파티션 파일 읽기 커서)
pub trait SegmentSource {
    /// 다음 순차 세그먼트. 파일이 끝났으면 `None`.
    fn next_segment(&mut self) -> Result<Option<DataPacket>>;
}

/// `next_packet`이 패킷을 꺼낸 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// NACK으로 예약된 재전송
    Pending,
    /// 파일에서 새로 읽은 세그먼트
    Fresh,
    /// 파일 소진 후 미확인 패킷 재제공
    Inflight,
}

/// CTRL 패킷 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlOutcome {
    /// in-flight에서 제거됨
    Acked,
    /// pending으로 이동됨
    Rescheduled,
    /// 해당 seq_no 없음 (중복/지연 ACK·NACK)
    Unknown,
    /// 수신측 완료
    Finished,
}

/// 흐름별 송신 윈도우
#[derive(Debug, Default)]
pub struct Window {
    pending: VecDeque<DataPacket>,
    inflight: VecDeque<DataPacket>,
}

impl Window {
    pub fn new() -> Self {
        Self::default()
    }

    /// 다음에 보낼 패킷
    ///
    /// 우선순위: pending 앞 → 파일의 다음 세그먼트 → in-flight 앞.
    /// 세 곳이 모두 비면 흐름의 송신이 끝난 것이다.
    pub fn next_packet<S: SegmentSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> Result<Option<(DataPacket, Origin)>> {
        if let Some(packet) = self.pending.pop_front() {
            return Ok(Some((packet, Origin::Pending)));
        }

        if let Some(packet) = source.next_segment()? {
            return Ok(Some((packet, Origin::Fresh)));
        }

        Ok(self
            .inflight
            .pop_front()
            .map(|packet| (packet, Origin::Inflight)))
    }

    /// 전송한 패킷을 in-flight 뒤에 추가
    pub fn mark_sent(&mut self, packet: DataPacket) {
        self.inflight.push_back(packet);
    }

    /// ACK/NACK/FIN 반영
    pub fn on_ctrl(&mut self, ctrl: &CtrlPacket) -> CtrlOutcome {
        match ctrl.flag {
            CtrlFlag::Fin => CtrlOutcome::Finished,
            CtrlFlag::Ack => match self.take_inflight(ctrl.seq_no) {
                Some(_) => CtrlOutcome::Acked,
                None => CtrlOutcome::Unknown,
            },
            CtrlFlag::Nack => match self.take_inflight(ctrl.seq_no) {
                Some(packet) => {
                    self.pending.push_back(packet);
                    CtrlOutcome::Rescheduled
                }
                None => CtrlOutcome::Unknown,
            },
        }
    }

    fn take_inflight(&mut self, seq_no: u32) -> Option<DataPacket> {
        let idx = self.inflight.iter().position(|p| p.seq_no == seq_no)?;
        self.inflight.remove(idx)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.inflight.is_empty()
    }
}
