//! 역방향 제어 채널 (TCP)
//!
//! 파티션 흐름마다 TCP 연결 하나가 CTRL 패킷(ACK/NACK/FIN)만 나른다.
//! CTRL 패킷은 고정 6바이트이므로 그 크기로 프레이밍한다.
//! 수신측이 송신측으로 접속(dial back)하고, 송신측은 논블로킹으로 폴링한다.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::packet::{CtrlPacket, Packet, CTRL_PACKET_LEN};
use crate::{Error, Result};

/// CTRL 패킷 전용 TCP 채널
#[derive(Debug)]
pub struct ControlChannel {
    stream: TcpStream,
    peer: SocketAddr,

    /// 부분 수신된 프레임
    rx_buf: [u8; CTRL_PACKET_LEN],
    rx_filled: usize,

    nonblocking: bool,
}

impl ControlChannel {
    /// 송신측으로 역방향 연결 (수신측에서 호출)
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(Error::Transport)?;
        Self::from_stream(stream)
    }

    /// 수신측의 역방향 연결 수락 (송신측에서 호출)
    ///
    /// 논블로킹 리스너를 `poll` 간격으로 확인하며, 대기 중에는 `on_wait`을
    /// 호출한다 (METADATA 재전송 등). `timeout`이 지나면 `TimedOut`.
    pub fn accept<F>(
        listener: &TcpListener,
        timeout: Duration,
        poll: Duration,
        mut on_wait: F,
    ) -> Result<Self>
    where
        F: FnMut() -> Result<()>,
    {
        listener.set_nonblocking(true).map_err(Error::Transport)?;
        let deadline = Instant::now() + timeout;

        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    debug!("제어 채널 수락: {}", addr);
                    stream.set_nonblocking(false).map_err(Error::Transport)?;
                    return Self::from_stream(stream);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(Error::Transport(io::Error::new(
                            io::ErrorKind::TimedOut,
                            "back-channel accept timed out",
                        )));
                    }
                    on_wait()?;
                    thread::sleep(poll);
                }
                Err(e) => return Err(Error::Transport(e)),
            }
        }
    }

    fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true).map_err(Error::Transport)?;
        let peer = stream.peer_addr().map_err(Error::Transport)?;

        Ok(Self {
            stream,
            peer,
            rx_buf: [0; CTRL_PACKET_LEN],
            rx_filled: 0,
            nonblocking: false,
        })
    }

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()> {
        if self.nonblocking != nonblocking {
            self.stream
                .set_nonblocking(nonblocking)
                .map_err(Error::Transport)?;
            self.nonblocking = nonblocking;
        }
        Ok(())
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// CTRL 패킷 송신 (전송 계층 확인 없음)
    pub fn send(&mut self, ctrl: CtrlPacket) -> Result<()> {
        let mut buf = [0u8; CTRL_PACKET_LEN];
        let len = Packet::Ctrl(ctrl).encode(&mut buf)?;
        self.set_nonblocking(false)?;
        self.stream.write_all(&buf[..len]).map_err(Error::Transport)
    }

    /// 논블로킹 폴링으로 CTRL 패킷 하나 수신
    ///
    /// 완성된 프레임이 없으면 `Ok(None)`. 상대가 연결을 닫으면
    /// `ConnectionClosed`.
    pub fn try_recv(&mut self) -> Result<Option<CtrlPacket>> {
        self.set_nonblocking(true)?;

        loop {
            match self.stream.read(&mut self.rx_buf[self.rx_filled..]) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => {
                    self.rx_filled += n;
                    if self.rx_filled < CTRL_PACKET_LEN {
                        continue;
                    }
                    self.rx_filled = 0;

                    match Packet::decode(&self.rx_buf) {
                        Ok(Packet::Ctrl(ctrl)) => return Ok(Some(ctrl)),
                        Ok(other) => {
                            let violation = Error::ProtocolViolation {
                                channel: "control",
                                kind: other.kind(),
                            };
                            warn!("{}", violation);
                        }
                        Err(e) => warn!("제어 프레임 폐기: {}", e),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Transport(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::CtrlFlag;

    fn pair() -> (ControlChannel, ControlChannel) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let dialer = thread::spawn(move || {
            ControlChannel::connect(addr, Duration::from_secs(2)).unwrap()
        });
        let accepted = ControlChannel::accept(
            &listener,
            Duration::from_secs(2),
            Duration::from_millis(1),
            || Ok(()),
        )
        .unwrap();

        (dialer.join().unwrap(), accepted)
    }

    fn recv_blocking(channel: &mut ControlChannel) -> CtrlPacket {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(ctrl) = channel.try_recv().unwrap() {
                return ctrl;
            }
            assert!(Instant::now() < deadline, "no ctrl packet arrived");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_ctrl_packets_in_order() {
        let (mut receiver_side, mut sender_side) = pair();

        receiver_side.send(CtrlPacket::ack(1)).unwrap();
        receiver_side.send(CtrlPacket::nack(2)).unwrap();
        receiver_side.send(CtrlPacket::fin(3)).unwrap();

        assert_eq!(recv_blocking(&mut sender_side), CtrlPacket::ack(1));
        assert_eq!(recv_blocking(&mut sender_side), CtrlPacket::nack(2));
        let fin = recv_blocking(&mut sender_side);
        assert_eq!((fin.flag, fin.seq_no), (CtrlFlag::Fin, 3));
        assert!(sender_side.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_closed_peer() {
        let (receiver_side, mut sender_side) = pair();
        drop(receiver_side);

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            match sender_side.try_recv() {
                Err(Error::ConnectionClosed) => break,
                Ok(None) => {
                    assert!(Instant::now() < deadline);
                    thread::sleep(Duration::from_millis(1));
                }
                other => panic!("unexpected: {:?}", other),
            }
        }
    }

    #[test]
    fn test_accept_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut waits = 0;
        let result = ControlChannel::accept(
            &listener,
            Duration::from_millis(30),
            Duration::from_millis(5),
            || {
                waits += 1;
                Ok(())
            },
        );

        assert!(matches!(result, Err(Error::Transport(ref e)) if e.kind() == io::ErrorKind::TimedOut));
        assert!(waits > 0);
    }
}
