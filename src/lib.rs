//! # UCP (UDP Control Protocol)
//!
//! UDP 데이터 + TCP 역방향 제어 채널 기반 분할 파일 전송 프로토콜
//!
//! ## 핵심 특징
//! - **파티션 병렬 전송**: 파일을 N개 구간으로 나눠 구간마다 독립된 UDP 흐름
//! - **선택적 확인**: 수신측이 TCP로 ACK/NACK/FIN 송신
//! - **능동적 빈칸 채우기**: 수신할 때마다 빠진 seq_no 전부 NACK
//! - **절대 오프셋 기록**: 도착 순서와 무관하게 바로 파일에 기록
//! - **구간 병합 Sequencer**: 메모리는 패킷 수가 아니라 빈칸 수에 비례

pub mod config;
pub mod control;
pub mod error;
pub mod link;
pub mod packet;
pub mod partition;
pub mod queue;
pub mod receiver;
pub mod sender;
pub mod sequencer;
pub mod shutdown;
pub mod stats;
pub mod window;

pub use config::Config;
pub use control::ControlChannel;
pub use error::{Error, Result};
pub use packet::{CtrlFlag, CtrlPacket, DataFlag, DataPacket, MetadataPacket, Packet, PacketKind};
pub use partition::{split_file, PartitionReader, PartitionWriter};
pub use receiver::{receive_file, ReceiveSummary, Receiver};
pub use sender::{send_file, SendReport, SenderFlow};
pub use sequencer::{SequenceRange, Sequencer};
pub use stats::{FlowStats, ReceiveReport, TransferStats};
pub use window::{SegmentSource, Window};

/// 송신측 역방향 TCP 기준 포트 (+ 파티션 인덱스)
pub const CLIENT_BASE_PORT: u16 = 6341;

/// 수신측 UDP 기준 포트 (+ 파티션 인덱스)
pub const SERVER_BASE_PORT: u16 = 6342;

/// 헤더 여유분 (바이트)
pub const UDP_PACKET_OVERHEAD_MARGIN: usize = 50;

/// DATA 패킷 최대 페이로드 (바이트)
pub const UDP_PACKET_DATA_SIZE: usize = 9 * 1024 - UDP_PACKET_OVERHEAD_MARGIN;

/// 인코딩/디코딩 버퍼 크기
pub const UDP_PACKET_SIZE: usize = UDP_PACKET_DATA_SIZE + UDP_PACKET_OVERHEAD_MARGIN;

/// 기본 파티션 수
pub const DEFAULT_PARTITIONS: u8 = 10;

/// METADATA 대상 이름 필드 길이
pub const DESTINATION_NAME_LEN: usize = 20;
