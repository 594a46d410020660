//! 에러 타입 정의

use std::io;

use thiserror::Error;

use crate::packet::PacketKind;

/// UCP 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("잘못된 패킷: {reason}")]
    MalformedPacket { reason: &'static str },

    #[error("버퍼 부족: {needed} 바이트 필요, 용량 {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("페이로드 초과: {len} 바이트 (최대 {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("전송 에러: {0}")]
    Transport(#[source] io::Error),

    #[error("파일 저장 실패: offset={offset}: {source}")]
    Persistence {
        offset: u32,
        #[source]
        source: io::Error,
    },

    #[error("프로토콜 위반: {channel} 채널에 {kind:?} 패킷")]
    ProtocolViolation {
        channel: &'static str,
        kind: PacketKind,
    },

    #[error("연결 종료")]
    ConnectionClosed,

    #[error("파티션 {index} 크기 초과: {size} 바이트")]
    PartitionTooLarge { index: u8, size: u64 },

    #[error("유효하지 않은 대상 파일 이름: {0:?}")]
    InvalidDestination(String),

    #[error("흐름 {index} 스레드 패닉")]
    FlowPanicked { index: u8 },

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("IO 에러: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// 소켓 타임아웃 여부 (협조적 취소 루프에서 재시도 대상)
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Transport(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
