//! 협조적 정지 신호
//!
//! 스레드를 강제로 끊지 않고, 정해진 확인 지점에서 신호를 보고 스스로
//! 정리 후 종료하게 한다. [`StopHandle`]이 트리거되거나 drop되면
//! 대응하는 [`StopSignal`]이 켜진다 (채널 닫힘 기반, 한 번만 켜짐).

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// 정지 요청 측
#[derive(Debug)]
pub struct StopHandle {
    _tx: Sender<()>,
}

impl StopHandle {
    /// 정지 요청 (drop과 같음)
    pub fn trigger(self) {}
}

/// 정지 관찰 측
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: Receiver<()>,
}

impl StopSignal {
    /// 정지가 요청되었는지
    pub fn is_raised(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// 정지 신호 쌍 생성
pub fn stop_pair() -> (StopHandle, StopSignal) {
    let (tx, rx) = bounded(0);
    (StopHandle { _tx: tx }, StopSignal { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_raises_signal() {
        let (handle, signal) = stop_pair();
        assert!(!signal.is_raised());
        handle.trigger();
        assert!(signal.is_raised());
        assert!(signal.is_raised());
    }

    #[test]
    fn test_drop_raises_signal() {
        let (handle, signal) = stop_pair();
        let observer = signal.clone();
        drop(handle);
        assert!(observer.is_raised());
    }
}
