//! 연결별 시퀀싱 이벤트 큐
//!
//! Receiving 스레드(생산자)와 Sequencing 스레드(소비자)가 공유하는 유일한
//! 구조. push/pop 모두 뮤텍스 안에서 수행하고, 비어 있으면 pop이 대기한다.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::packet::CtrlFlag;

/// Receiving 스레드가 넘기는 수신 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencingEvent {
    pub seq_no: u32,

    /// ACK: 저장 성공, NACK: 저장 실패
    pub flag: CtrlFlag,

    /// END 세그먼트 여부
    pub is_last: bool,
}

impl SequencingEvent {
    pub fn ack(seq_no: u32, is_last: bool) -> Self {
        Self {
            seq_no,
            flag: CtrlFlag::Ack,
            is_last,
        }
    }

    pub fn nack(seq_no: u32) -> Self {
        Self {
            seq_no,
            flag: CtrlFlag::Nack,
            is_last: false,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<SequencingEvent>,
    closed: bool,
}

/// 스레드 안전 이벤트 큐 (복제하면 같은 큐를 가리킨다)
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Arc<(Mutex<QueueState>, Condvar)>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 이벤트 추가. 닫힌 큐에는 추가되지 않는다.
    pub fn push(&self, event: SequencingEvent) {
        let (state, ready) = &*self.inner;
        let mut state = state.lock();
        if state.closed {
            return;
        }
        state.events.push_back(event);
        ready.notify_one();
    }

    /// 이벤트 하나 꺼내기
    ///
    /// 비어 있으면 도착할 때까지 대기한다. 큐가 닫히고 남은 이벤트도
    /// 없으면 `None`.
    pub fn pop(&self) -> Option<SequencingEvent> {
        let (state, ready) = &*self.inner;
        let mut state = state.lock();
        loop {
            if let Some(event) = state.events.pop_front() {
                return Some(event);
            }
            if state.closed {
                return None;
            }
            ready.wait(&mut state);
        }
    }

    /// 생산자 종료 알림. 대기 중인 소비자를 깨운다.
    pub fn close(&self) {
        let (state, ready) = &*self.inner;
        state.lock().closed = true;
        ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.0.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.0.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
