//! 수신자 (서버측)
//!
//! 연결 하나당 스레드 두 개:
//! - Receiving: UDP DATA 수신 → 파티션 파일 기록 → 이벤트 큐
//! - Sequencing: 이벤트 큐 → Sequencer 갱신 → ACK/NACK/FIN
//!
//! Sequencer는 Sequencing 스레드가 소유하고, 두 스레드는 이벤트 큐로만
//! 통신한다. Receiving 스레드는 정지 신호와 수신 타임아웃으로 협조적으로
//! 종료된다.

use std::fs;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, trace, warn, Span};

use crate::control::ControlChannel;
use crate::packet::{CtrlFlag, CtrlPacket, MetadataPacket, Packet};
use crate::partition::{merge_partitions, partition_path, PartitionWriter};
use crate::queue::{EventQueue, SequencingEvent};
use crate::sequencer::Sequencer;
use crate::shutdown::{stop_pair, StopHandle, StopSignal};
use crate::stats::ReceiveReport;
use crate::{Config, Error, Result, UDP_PACKET_SIZE};

/// Sequencing 스레드 집계
#[derive(Debug, Default)]
struct SequencingTally {
    segments: u64,
    duplicates: u64,
    acks_sent: u64,
    nacks_sent: u64,
    last_seq_no: Option<u32>,
}

/// 파티션 하나를 받는 수신자
pub struct Receiver {
    index: u8,
    config: Config,
    socket: UdpSocket,
}

impl Receiver {
    /// `server_base_port + index`에 UDP 바인드
    pub fn bind(config: &Config, index: u8) -> Result<Self> {
        let socket = UdpSocket::bind((config.bind_ip, config.server_port(index)))
            .map_err(Error::Transport)?;

        Ok(Self {
            index,
            config: config.clone(),
            socket,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Error::Transport)
    }

    /// 연결 하나를 끝까지 처리
    ///
    /// METADATA를 기다려 파티션 파일을 준비하고, 송신측으로 역방향 TCP
    /// 연결을 맺은 뒤 Receiving/Sequencing 스레드를 돌린다.
    pub fn run(self) -> Result<ReceiveReport> {
        let (metadata, sender_addr) = self.wait_metadata()?;
        let destination = sanitize_destination(&metadata.destination_lossy())?;
        if metadata.part_index != self.index {
            warn!(
                "METADATA 파티션 인덱스 {}가 수신자 {}와 다름",
                metadata.part_index, self.index
            );
        }

        let path = partition_path(&self.config.output_dir, &destination, self.index);
        let writer = PartitionWriter::create(&path, metadata.part_size)?;
        let mut control = ControlChannel::connect(sender_addr, self.config.connect_timeout())?;

        info!(
            "파티션 {}: {} bytes from {} -> {}",
            self.index,
            metadata.part_size,
            sender_addr,
            path.display()
        );

        let started = Instant::now();
        let mut report = ReceiveReport {
            index: self.index,
            destination,
            path,
            part_size: metadata.part_size,
            segments: 0,
            duplicates: 0,
            acks_sent: 0,
            nacks_sent: 0,
            last_seq_no: None,
            elapsed: Duration::ZERO,
        };

        // 빈 파티션: 받을 DATA가 없다
        if metadata.part_size == 0 {
            send_fin(&mut control, 0);
            report.last_seq_no = Some(0);
            return Ok(report);
        }

        self.socket
            .set_read_timeout(Some(self.config.recv_timeout()))
            .map_err(Error::Transport)?;

        let queue = EventQueue::new();
        let (stop_handle, stop_signal) = stop_pair();
        let span = Span::current();

        let receiving = {
            let queue = queue.clone();
            let span = span.clone();
            let socket = self.socket;
            let idle_timeout = self.config.idle_timeout();
            thread::Builder::new()
                .name(format!("ucp-recv-{}", self.index))
                .spawn(move || {
                    let _guard = span.enter();
                    let result =
                        receive_segments(&socket, writer, &queue, &stop_signal, idle_timeout);
                    queue.close();
                    result
                })?
        };

        let sequencing = thread::Builder::new()
            .name(format!("ucp-seq-{}", self.index))
            .spawn(move || {
                let _guard = span.enter();
                sequence_events(&queue, control, stop_handle)
            })?;

        let tally = sequencing
            .join()
            .unwrap_or(Err(Error::FlowPanicked { index: self.index }));
        let received = receiving
            .join()
            .unwrap_or(Err(Error::FlowPanicked { index: self.index }));

        let tally = match (tally, received) {
            (Ok(tally), Err(e)) => {
                warn!("완료 후 수신 스레드 에러: {}", e);
                tally
            }
            (Ok(tally), Ok(())) => tally,
            (Err(_), Err(e)) | (Err(e), Ok(())) => return Err(e),
        };

        report.segments = tally.segments;
        report.duplicates = tally.duplicates;
        report.acks_sent = tally.acks_sent;
        report.nacks_sent = tally.nacks_sent;
        report.last_seq_no = tally.last_seq_no;
        report.elapsed = started.elapsed();

        info!(
            "파티션 {} 수신 완료: {} 세그먼트 (중복 {}), ACK {}, NACK {}",
            report.index, report.segments, report.duplicates, report.acks_sent, report.nacks_sent
        );
        Ok(report)
    }

    /// 첫 METADATA까지 대기 (다른 종류는 버림)
    fn wait_metadata(&self) -> Result<(MetadataPacket, SocketAddr)> {
        let mut buf = [0u8; UDP_PACKET_SIZE];
        self.socket.set_read_timeout(None).map_err(Error::Transport)?;

        loop {
            let (len, from) = self.socket.recv_from(&mut buf).map_err(Error::Transport)?;
            match Packet::decode(&buf[..len]) {
                Ok(Packet::Metadata(metadata)) => return Ok((metadata, from)),
                Ok(other) => warn!(
                    "{}",
                    Error::ProtocolViolation {
                        channel: "handshake",
                        kind: other.kind(),
                    }
                ),
                Err(e) => warn!("데이터그램 폐기 ({}): {}", from, e),
            }
        }
    }
}

/// Receiving 스레드 본체
///
/// 정지 신호가 켜지거나 `idle_timeout` 동안 데이터그램이 없으면 끝난다.
/// 기록 실패 시 NACK 이벤트를 넣고 에러로 끝난다.
fn receive_segments(
    socket: &UdpSocket,
    mut writer: PartitionWriter,
    queue: &EventQueue,
    stop: &StopSignal,
    idle_timeout: Duration,
) -> Result<()> {
    let mut buf = [0u8; UDP_PACKET_SIZE];
    let mut last_datagram = Instant::now();

    while !stop.is_raised() {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _)) => len,
            Err(e) => {
                let e = Error::Transport(e);
                if !e.is_timeout() {
                    return Err(e);
                }
                if last_datagram.elapsed() >= idle_timeout {
                    return Err(Error::Transport(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "no datagram within idle timeout",
                    )));
                }
                continue;
            }
        };
        last_datagram = Instant::now();

        match Packet::decode(&buf[..len]) {
            Ok(Packet::Data(data)) => {
                if let Err(e) = writer.write_segment(data.offset, &data.payload) {
                    queue.push(SequencingEvent::nack(data.seq_no));
                    return Err(e);
                }
                trace!("DATA seq={} offset={} 기록", data.seq_no, data.offset);
                queue.push(SequencingEvent::ack(data.seq_no, data.is_last()));
            }
            // 역방향 연결 전 재전송된 METADATA
            Ok(Packet::Metadata(_)) => trace!("중복 METADATA 무시"),
            Ok(other) => warn!(
                "{}",
                Error::ProtocolViolation {
                    channel: "data",
                    kind: other.kind(),
                }
            ),
            Err(e) => warn!("데이터그램 폐기: {}", e),
        }
    }

    debug!("{} 기록 종료", writer.path().display());
    Ok(())
}

/// Sequencing 스레드 본체
///
/// 완료될 때까지 이벤트마다 CTRL을 보내고, 매번 빈 seq_no 전부에 NACK을
/// 보낸다. 완료되면 FIN을 보내고 `stop`을 drop해 Receiving 스레드를 멈춘다.
fn sequence_events(
    queue: &EventQueue,
    mut control: ControlChannel,
    stop: StopHandle,
) -> Result<SequencingTally> {
    let mut sequencer = Sequencer::new();
    let mut tally = SequencingTally::default();

    while !sequencer.is_complete() {
        let event = queue.pop().ok_or(Error::ConnectionClosed)?;

        match event.flag {
            CtrlFlag::Ack => {
                control.send(CtrlPacket::ack(event.seq_no))?;
                tally.acks_sent += 1;

                if sequencer.add(event.seq_no, event.is_last) {
                    tally.segments += 1;
                } else {
                    tally.duplicates += 1;
                }
            }
            // 기록 실패: 송신측에 알리기만 하고 Sequencer에는 넣지 않는다
            CtrlFlag::Nack => {
                control.send(CtrlPacket::nack(event.seq_no))?;
                tally.nacks_sent += 1;
                continue;
            }
            CtrlFlag::Fin => continue,
        }

        for missing in sequencer.missing_segments() {
            control.send(CtrlPacket::nack(missing))?;
            tally.nacks_sent += 1;
        }
    }

    let last_seq_no = sequencer.expected_last_seq_no().unwrap_or_default();
    send_fin(&mut control, last_seq_no);
    tally.last_seq_no = Some(last_seq_no);

    stop.trigger();
    Ok(tally)
}

/// FIN 송신. 송신측이 모든 ACK를 받고 먼저 끝났을 수 있어 실패는 경고만.
fn send_fin(control: &mut ControlChannel, last_seq_no: u32) {
    match control.send(CtrlPacket::fin(last_seq_no)) {
        Ok(()) => debug!("FIN 송신 (마지막 seq={})", last_seq_no),
        Err(e) => warn!("FIN 송신 실패 ({}): {}", control.peer(), e),
    }
}

/// METADATA 대상 이름에서 마지막 경로 요소만 남김
pub fn sanitize_destination(raw: &str) -> Result<String> {
    Path::new(raw.trim_end_matches('\0'))
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .ok_or_else(|| Error::InvalidDestination(raw.to_owned()))
}

/// 다중 파티션 수신 결과
#[derive(Debug, Default)]
pub struct ReceiveSummary {
    /// 완료된 연결 (파티션 순)
    pub reports: Vec<ReceiveReport>,

    /// 실패한 연결
    pub failures: Vec<(u8, Error)>,

    /// 병합된 출력 파일 (모든 파티션 성공 시)
    pub output: Option<PathBuf>,

    /// 병합된 바이트 수
    pub bytes: u64,
}

impl ReceiveSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.output.is_some()
    }
}

/// 파티션 `0..config.partitions`를 병렬로 받아 하나의 파일로 병합
///
/// 연결 하나의 실패는 다른 연결을 멈추지 않는다. 실패가 있으면 병합하지
/// 않고 받은 파티션 파일은 남겨 둔다.
pub fn receive_file(config: &Config) -> Result<ReceiveSummary> {
    config.validate()?;

    let receivers = (0..config.partitions)
        .map(|index| Receiver::bind(config, index))
        .collect::<Result<Vec<_>>>()?;

    info!(
        "수신 대기: {}:{}..{} ({} 파티션)",
        config.bind_ip,
        config.server_port(0),
        config.server_port(config.partitions - 1),
        receivers.len()
    );

    let mut handles = Vec::with_capacity(receivers.len());
    for receiver in receivers {
        let index = receiver.index;
        let handle = thread::Builder::new()
            .name(format!("ucp-conn-{}", index))
            .spawn(move || {
                let span = info_span!("recv", part = index);
                let _guard = span.enter();
                receiver.run()
            })?;
        handles.push((index, handle));
    }

    let mut summary = ReceiveSummary::default();
    for (index, handle) in handles {
        match handle.join() {
            Ok(Ok(report)) => summary.reports.push(report),
            Ok(Err(e)) => {
                warn!("파티션 {} 수신 실패: {}", index, e);
                summary.failures.push((index, e));
            }
            Err(_) => summary.failures.push((index, Error::FlowPanicked { index })),
        }
    }

    if !summary.failures.is_empty() {
        return Ok(summary);
    }

    let destination = match summary.reports.first() {
        Some(report) => report.destination.clone(),
        None => return Ok(summary),
    };
    if let Some(other) = summary
        .reports
        .iter()
        .find(|report| report.destination != destination)
    {
        return Err(Error::InvalidDestination(format!(
            "partitions disagree on destination: {} vs {}",
            destination, other.destination
        )));
    }

    let parts: Vec<PathBuf> = summary.reports.iter().map(|r| r.path.clone()).collect();
    let output = config.output_dir.join(&destination);
    summary.bytes = merge_partitions(&parts, &output)?;

    if !config.keep_partitions {
        for part in &parts {
            if let Err(e) = fs::remove_file(part) {
                warn!("파티션 파일 삭제 실패 {}: {}", part.display(), e);
            }
        }
    }

    info!("병합 완료: {} ({} bytes)", output.display(), summary.bytes);
    summary.output = Some(output);
    Ok(summary)
}
