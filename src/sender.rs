//! 송신자 (클라이언트측)
//!
//! - 파티션마다 독립된 흐름(스레드) 하나
//! - 흐름마다 자체 윈도우: 공유 상태 없음
//! - NACK 우선 재전송, 파일 소진 후 in-flight 재제공

use std::net::{IpAddr, SocketAddr, TcpListener, UdpSocket};
use std::path::Path;
use std::thread;
use std::time::Instant;

use tracing::{debug, info, info_span, trace, warn};

use crate::control::ControlChannel;
use crate::link::{LossModel, UdpLink};
use crate::packet::{CtrlFlag, MetadataPacket, Packet, METADATA_PACKET_LEN};
use crate::partition::{split_file, PartitionReader};
use crate::stats::{FlowStats, TransferStats};
use crate::window::{CtrlOutcome, Origin, Window};
use crate::{Config, Error, Result, DESTINATION_NAME_LEN, UDP_PACKET_SIZE};

/// 송신 흐름 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// METADATA 송신
    Handshake,
    /// 수신측의 역방향 TCP 연결 대기
    ConnectingBackchannel,
    /// DATA 송신 + CTRL 처리
    Transferring,
    Done,
}

/// 파티션 하나를 담당하는 송신 흐름
pub struct SenderFlow {
    index: u8,
    config: Config,

    /// 수신측에 알릴 대상 파일 이름
    destination: String,

    reader: PartitionReader,
    window: Window,

    link: UdpLink,

    /// 역방향 연결용 리스너 (UDP 소켓과 같은 포트)
    listener: TcpListener,

    state: FlowState,
    stats: FlowStats,
}

impl SenderFlow {
    /// 소켓 준비
    ///
    /// UDP 소켓을 먼저 바인드하고, 수신측이 UDP 출발지 주소로 역방향
    /// 연결하므로 같은 주소/포트에 TCP 리스너를 연다.
    pub fn bind(
        config: &Config,
        reader: PartitionReader,
        remote_ip: IpAddr,
        destination: &str,
    ) -> Result<Self> {
        let index = reader.index();

        let socket = UdpSocket::bind((config.bind_ip, config.client_port(index)))
            .map_err(Error::Transport)?;
        let local = socket.local_addr().map_err(Error::Transport)?;
        let listener = TcpListener::bind(local).map_err(Error::Transport)?;

        let remote = SocketAddr::new(remote_ip, config.server_port(index));
        let loss = LossModel::new(
            config.drop_rate,
            config.loss_seed.map(|seed| seed.wrapping_add(index as u64)),
        );

        debug!("흐름 {}: {} -> {}", index, local, remote);

        Ok(Self {
            index,
            config: config.clone(),
            destination: destination.to_owned(),
            stats: FlowStats::new(index, reader.size()),
            reader,
            window: Window::new(),
            link: UdpLink::new(socket, remote, loss),
            listener,
            state: FlowState::Handshake,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.link.local_addr()
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// 흐름 실행 (HANDSHAKE → CONNECTING_BACKCHANNEL → TRANSFERRING → DONE)
    pub fn run(mut self) -> Result<FlowStats> {
        let mut control = self.handshake()?;

        self.enter(FlowState::Transferring);
        self.stats.started_at = Instant::now();

        self.transfer(&mut control)?;

        self.stats.finished_at = Instant::now();
        self.stats.dropped = self.link.dropped();
        self.enter(FlowState::Done);

        info!(
            "파티션 {} 완료: {} bytes, {} 패킷 (재전송 {}, 폐기 {}), FIN {}",
            self.index,
            self.stats.part_size,
            self.stats.packets_sent,
            self.stats.retransmissions + self.stats.fallback_resends,
            self.stats.dropped,
            if self.stats.fin_received { "수신" } else { "없음" },
        );

        Ok(self.stats)
    }

    fn enter(&mut self, state: FlowState) {
        debug!("흐름 {}: {:?} -> {:?}", self.index, self.state, state);
        self.state = state;
    }

    /// METADATA 송신 후 역방향 연결 수락
    ///
    /// 대기 중에는 `handshake_retry` 간격으로 METADATA를 다시 보낸다.
    fn handshake(&mut self) -> Result<ControlChannel> {
        let metadata = Packet::Metadata(MetadataPacket::new(
            &self.destination,
            self.index,
            self.reader.size(),
        ));
        let mut buf = [0u8; METADATA_PACKET_LEN];
        let len = metadata.encode(&mut buf)?;

        self.link.send(&buf[..len])?;
        self.enter(FlowState::ConnectingBackchannel);

        let retry = self.config.handshake_retry();
        let mut last_sent = Instant::now();
        let link = &mut self.link;

        let control = ControlChannel::accept(
            &self.listener,
            self.config.accept_timeout(),
            self.config.accept_poll(),
            || {
                if last_sent.elapsed() >= retry {
                    trace!("METADATA 재전송");
                    link.send(&buf[..len])?;
                    last_sent = Instant::now();
                }
                Ok(())
            },
        )?;

        info!(
            "파티션 {}: 역방향 연결 수립 ({}), {} bytes",
            self.index,
            control.peer(),
            self.reader.size()
        );
        Ok(control)
    }

    /// 윈도우가 비고 파일이 소진되거나 FIN을 받을 때까지 송신
    fn transfer(&mut self, control: &mut ControlChannel) -> Result<()> {
        let mut buf = [0u8; UDP_PACKET_SIZE];
        let fallback_interval = self.config.fallback_interval();

        while let Some((packet, origin)) = self.window.next_packet(&mut self.reader)? {
            match origin {
                Origin::Fresh => self.stats.fresh_packets += 1,
                Origin::Pending => self.stats.retransmissions += 1,
                Origin::Inflight => {
                    self.stats.fallback_resends += 1;
                    if !fallback_interval.is_zero() {
                        thread::sleep(fallback_interval);
                    }
                }
            }

            let seq_no = packet.seq_no;
            let len = Packet::Data(packet.clone()).encode(&mut buf)?;
            self.link.send(&buf[..len])?;
            self.stats.packets_sent += 1;
            trace!("DATA seq={} offset={} ({:?})", seq_no, packet.offset, origin);

            self.window.mark_sent(packet);

            if self.poll_control(control)? {
                self.stats.fin_received = true;
                break;
            }
        }

        Ok(())
    }

    /// 도착한 CTRL 패킷 모두 처리. FIN을 받으면 `true`.
    fn poll_control(&mut self, control: &mut ControlChannel) -> Result<bool> {
        while let Some(ctrl) = control.try_recv()? {
            match ctrl.flag {
                CtrlFlag::Ack => self.stats.acks_received += 1,
                CtrlFlag::Nack => self.stats.nacks_received += 1,
                CtrlFlag::Fin => {}
            }

            match self.window.on_ctrl(&ctrl) {
                CtrlOutcome::Finished => {
                    debug!("FIN 수신 (마지막 seq={})", ctrl.seq_no);
                    return Ok(true);
                }
                CtrlOutcome::Rescheduled => debug!("NACK seq={}: 재전송 예약", ctrl.seq_no),
                CtrlOutcome::Acked => {}
                CtrlOutcome::Unknown => {
                    trace!("{:?} seq={}: 대상 없음", ctrl.flag, ctrl.seq_no)
                }
            }
        }
        Ok(false)
    }
}

/// 파일 송신 결과
#[derive(Debug, Default)]
pub struct SendReport {
    /// 완료된 흐름 통계 (파티션 순)
    pub flows: Vec<FlowStats>,

    /// 실패한 흐름
    pub failures: Vec<(u8, Error)>,
}

impl SendReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// 완료된 흐름 합산 통계
    pub fn stats(&self) -> TransferStats {
        TransferStats::aggregate(&self.flows)
    }
}

/// 파일을 `config.partitions`개로 나눠 병렬 송신
///
/// 흐름 하나의 실패는 다른 흐름을 멈추지 않는다. 실패는
/// [`SendReport::failures`]에 모인다.
pub fn send_file(
    config: &Config,
    source: impl AsRef<Path>,
    remote_ip: IpAddr,
    destination: &str,
) -> Result<SendReport> {
    config.validate()?;
    if destination.is_empty() {
        return Err(Error::InvalidDestination(destination.to_owned()));
    }
    if destination.len() > DESTINATION_NAME_LEN {
        warn!(
            "대상 이름이 {}바이트로 잘림: {}",
            DESTINATION_NAME_LEN, destination
        );
    }

    let source = source.as_ref();
    let readers = split_file(source, config.partitions, config.segment_size)?;
    info!(
        "송신 시작: {} -> {}:{} ({} 파티션)",
        source.display(),
        remote_ip,
        destination,
        readers.len()
    );

    let mut handles = Vec::with_capacity(readers.len());
    for reader in readers {
        let index = reader.index();
        let config = config.clone();
        let destination = destination.to_owned();

        let handle = thread::Builder::new()
            .name(format!("ucp-send-{}", index))
            .spawn(move || {
                let span = info_span!("send", part = index);
                let _guard = span.enter();
                SenderFlow::bind(&config, reader, remote_ip, &destination)?.run()
            })?;
        handles.push((index, handle));
    }

    let mut report = SendReport::default();
    for (index, handle) in handles {
        match handle.join() {
            Ok(Ok(stats)) => report.flows.push(stats),
            Ok(Err(e)) => {
                warn!("파티션 {} 송신 실패: {}", index, e);
                report.failures.push((index, e));
            }
            Err(_) => report.failures.push((index, Error::FlowPanicked { index })),
        }
    }

    Ok(report)
}
