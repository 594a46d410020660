//! 프로토콜 설정

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::{
    Error, Result, CLIENT_BASE_PORT, DEFAULT_PARTITIONS, SERVER_BASE_PORT, UDP_PACKET_DATA_SIZE,
};

/// UCP 설정 (송신/수신 공용)
#[derive(Debug, Clone)]
pub struct Config {
    /// 파티션(흐름) 수
    pub partitions: u8,

    /// DATA 패킷 최대 페이로드 (바이트)
    pub segment_size: usize,

    /// 송신측 UDP/TCP 기준 포트 (0이면 OS 할당)
    pub client_base_port: u16,

    /// 수신측 UDP 기준 포트
    pub server_base_port: u16,

    /// 바인드 주소
    pub bind_ip: IpAddr,

    /// 수신 파일 저장 디렉터리
    pub output_dir: PathBuf,

    /// 수신 대기 상한 (밀리초)
    /// 이 간격마다 정지 신호를 확인한다
    pub recv_timeout_ms: u64,

    /// 데이터그램 없이 이만큼 지나면 수신 포기 (밀리초)
    pub idle_timeout_ms: u64,

    /// 역방향 TCP 연결 수락 대기 상한 (밀리초)
    pub accept_timeout_ms: u64,

    /// 역방향 TCP 연결 시도 상한 (밀리초)
    pub connect_timeout_ms: u64,

    /// 역방향 연결을 기다리는 동안 METADATA 재전송 간격 (밀리초)
    pub handshake_retry_ms: u64,

    /// accept 폴링 간격 (밀리초)
    pub accept_poll_ms: u64,

    /// in-flight 재제공 패킷 전송 간격 (마이크로초)
    /// 0이면 간격 없이 재전송
    pub fallback_interval_us: u64,

    /// 인위적 UDP 손실률 (0.0 ~ 1.0, 테스트용)
    pub drop_rate: f64,

    /// 손실 RNG 시드 (None이면 엔트로피)
    pub loss_seed: Option<u64>,

    /// 병합 후 파티션 파일 보존 여부
    pub keep_partitions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS,
            segment_size: UDP_PACKET_DATA_SIZE,
            client_base_port: CLIENT_BASE_PORT,
            server_base_port: SERVER_BASE_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            output_dir: PathBuf::from("."),
            recv_timeout_ms: 50,
            idle_timeout_ms: 30_000,     // 30초
            accept_timeout_ms: 30_000,   // 30초
            connect_timeout_ms: 5_000,   // 5초
            handshake_retry_ms: 200,
            accept_poll_ms: 1,
            fallback_interval_us: 200,
            drop_rate: 0.0,
            loss_seed: None,
            keep_partitions: false,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 루프백 전용 설정 (로컬 테스트)
    pub fn loopback() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            client_base_port: 0,
            idle_timeout_ms: 10_000,
            accept_timeout_ms: 10_000,
            connect_timeout_ms: 2_000,
            handshake_retry_ms: 50,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            segment_size: 1200,           // IP 단편화 회피
            recv_timeout_ms: 100,
            idle_timeout_ms: 120_000,
            accept_timeout_ms: 60_000,
            connect_timeout_ms: 15_000,
            handshake_retry_ms: 500,
            fallback_interval_us: 1_000,
            ..Self::default()
        }
    }

    /// 인위적 손실률 지정
    pub fn with_drop_rate(mut self, drop_rate: f64) -> Self {
        self.drop_rate = drop_rate;
        self
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(Error::InvalidConfig("partitions must be at least 1".into()));
        }
        if self.segment_size == 0 || self.segment_size > UDP_PACKET_DATA_SIZE {
            return Err(Error::InvalidConfig(format!(
                "segment_size must be in 1..={}, got {}",
                UDP_PACKET_DATA_SIZE, self.segment_size
            )));
        }
        if !(0.0..=1.0).contains(&self.drop_rate) {
            return Err(Error::InvalidConfig(format!(
                "drop_rate must be in 0.0..=1.0, got {}",
                self.drop_rate
            )));
        }
        if self.server_base_port.checked_add(self.partitions as u16 - 1).is_none()
            || self.client_base_port.checked_add(self.partitions as u16 - 1).is_none()
        {
            return Err(Error::InvalidConfig("base port + partitions overflows u16".into()));
        }
        if self.recv_timeout_ms == 0 {
            return Err(Error::InvalidConfig("recv_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    /// 파티션 `index`의 송신측 포트 (0이면 OS 할당)
    pub fn client_port(&self, index: u8) -> u16 {
        if self.client_base_port == 0 {
            0
        } else {
            self.client_base_port + index as u16
        }
    }

    /// 파티션 `index`의 수신측 포트
    pub fn server_port(&self, index: u8) -> u16 {
        self.server_base_port + index as u16
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_retry(&self) -> Duration {
        Duration::from_millis(self.handshake_retry_ms)
    }

    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    pub fn fallback_interval(&self) -> Duration {
        Duration::from_micros(self.fallback_interval_us)
    }
}
