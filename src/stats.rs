//! 전송 통계

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// 송신 흐름(파티션) 하나의 통계
#[derive(Debug, Clone)]
pub struct FlowStats {
    /// 파티션 인덱스
    pub index: u8,

    /// 파티션 크기 (바이트)
    pub part_size: u32,

    /// TRANSFERRING 진입 시각
    pub started_at: Instant,

    /// DONE 진입 시각
    pub finished_at: Instant,

    /// 송신 시도한 DATA 패킷 수 (손실 모델이 버린 것 포함)
    pub packets_sent: u64,

    /// 새로 읽은 세그먼트 수
    pub fresh_packets: u64,

    /// NACK으로 예약된 재전송 수
    pub retransmissions: u64,

    /// in-flight 재제공으로 보낸 수
    pub fallback_resends: u64,

    /// 손실 모델이 버린 데이터그램 수
    pub dropped: u64,

    /// 수신한 ACK/NACK 수
    pub acks_received: u64,
    pub nacks_received: u64,

    /// FIN으로 종료했는지 (아니면 윈도우 소진으로 종료)
    pub fin_received: bool,
}

impl FlowStats {
    pub fn new(index: u8, part_size: u32) -> Self {
        let now = Instant::now();
        Self {
            index,
            part_size,
            started_at: now,
            finished_at: now,
            packets_sent: 0,
            fresh_packets: 0,
            retransmissions: 0,
            fallback_resends: 0,
            dropped: 0,
            acks_received: 0,
            nacks_received: 0,
            fin_received: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }
}

/// 수신 연결 하나의 결과
#[derive(Debug, Clone)]
pub struct ReceiveReport {
    pub index: u8,

    /// METADATA의 대상 이름 (정리된 형태)
    pub destination: String,

    /// 기록한 파티션 파일
    pub path: PathBuf,

    pub part_size: u32,

    /// 새로 기록된 seq_no 수
    pub segments: u64,

    /// 이미 기록된 seq_no의 재수신
    pub duplicates: u64,

    pub acks_sent: u64,
    pub nacks_sent: u64,

    /// FIN에 실린 마지막 seq_no
    pub last_seq_no: Option<u32>,

    pub elapsed: Duration,
}

/// 전체 전송 통계 (모든 흐름 합산)
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 흐름 수
    pub flows: usize,

    /// 파티션 크기 합
    pub total_bytes: u64,

    /// 가장 늦은 종료 - 가장 이른 시작
    pub elapsed: Duration,

    pub packets_sent: u64,
    pub retransmissions: u64,
    pub dropped: u64,
    pub nacks_received: u64,
}

impl TransferStats {
    /// 흐름별 통계 합산
    pub fn aggregate(flows: &[FlowStats]) -> Self {
        let start = flows.iter().map(|f| f.started_at).min();
        let end = flows.iter().map(|f| f.finished_at).max();
        let elapsed = match (start, end) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        };

        Self {
            flows: flows.len(),
            total_bytes: flows.iter().map(|f| f.part_size as u64).sum(),
            elapsed,
            packets_sent: flows.iter().map(|f| f.packets_sent).sum(),
            retransmissions: flows
                .iter()
                .map(|f| f.retransmissions + f.fallback_resends)
                .sum(),
            dropped: flows.iter().map(|f| f.dropped).sum(),
            nacks_received: flows.iter().map(|f| f.nacks_received).sum(),
        }
    }

    /// 처리율 (bits/sec)
    pub fn throughput_bps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        (self.total_bytes * 8) as f64 / secs
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Flows: {} | Bytes: {} | Time: {} | Rate: {} | Packets: {} | Retransmits: {} | Dropped: {} | NACKs: {}",
            self.flows,
            self.total_bytes,
            format_duration(self.elapsed),
            format_rate(self.throughput_bps()),
            self.packets_sent,
            self.retransmissions,
            self.dropped,
            self.nacks_received,
        )
    }
}

/// us / ms / s 단위 표기
pub fn format_duration(elapsed: Duration) -> String {
    let micros = elapsed.as_secs_f64() * 1e6;
    if micros < 1e3 {
        format!("{:.2} us", micros)
    } else if micros < 1e6 {
        format!("{:.2} ms", micros / 1e3)
    } else {
        format!("{:.2} s", micros / 1e6)
    }
}

/// bps / Kbps / Mbps / Gbps 단위 표기
pub fn format_rate(bps: f64) -> String {
    if bps >= 1e9 {
        format!("{:.2} Gbps", bps / 1e9)
    } else if bps >= 1e6 {
        format!("{:.2} Mbps", bps / 1e6)
    } else if bps >= 1e3 {
        format!("{:.2} Kbps", bps / 1e3)
    } else {
        format!("{:.2} bps", bps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_spans_all_flows() {
        let base = Instant::now();

        let mut a = FlowStats::new(0, 1000);
        a.started_at = base + Duration::from_millis(10);
        a.finished_at = base + Duration::from_millis(300);
        a.packets_sent = 5;
        a.retransmissions = 1;

        let mut b = FlowStats::new(1, 3000);
        b.started_at = base;
        b.finished_at = base + Duration::from_millis(500);
        b.packets_sent = 7;
        b.fallback_resends = 2;
        b.nacks_received = 4;

        let stats = TransferStats::aggregate(&[a, b]);
        assert_eq!(stats.flows, 2);
        assert_eq!(stats.total_bytes, 4000);
        assert_eq!(stats.elapsed, Duration::from_millis(500));
        assert_eq!(stats.packets_sent, 12);
        assert_eq!(stats.retransmissions, 3);
        assert_eq!(stats.nacks_received, 4);

        // 4000 bytes * 8 / 0.5s
        assert!((stats.throughput_bps() - 64_000.0).abs() < 1e-6);
        assert!(stats.summary().contains("64.00 Kbps"));
    }

    #[test]
    fn test_empty_aggregate() {
        let stats = TransferStats::aggregate(&[]);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.throughput_bps(), 0.0);
    }

    #[test]
    fn test_units() {
        assert_eq!(format_duration(Duration::from_micros(250)), "250.00 us");
        assert_eq!(format_duration(Duration::from_millis(12)), "12.00 ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.50 s");

        assert_eq!(format_rate(512.0), "512.00 bps");
        assert_eq!(format_rate(2_500.0), "2.50 Kbps");
        assert_eq!(format_rate(40_000_000.0), "40.00 Mbps");
        assert_eq!(format_rate(1.2e9), "1.20 Gbps");
    }
}
