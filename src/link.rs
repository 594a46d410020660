//! 송신측 UDP 링크
//!
//! 실제 소켓 송신 앞에 인위적 손실 모델을 끼워 넣을 수 있다.
//! 손실률 0이면 그대로 통과한다.

use std::net::{SocketAddr, UdpSocket};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::{Error, Result};

/// 인위적 패킷 손실 모델
#[derive(Debug)]
pub struct LossModel {
    drop_rate: f64,
    rng: StdRng,
}

impl LossModel {
    /// 시드가 없으면 엔트로피로 초기화
    pub fn new(drop_rate: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            drop_rate: drop_rate.clamp(0.0, 1.0),
            rng,
        }
    }

    /// 손실 없는 모델
    pub fn lossless() -> Self {
        Self::new(0.0, Some(0))
    }

    /// 이번 데이터그램을 버릴지
    pub fn should_drop(&mut self) -> bool {
        self.drop_rate > 0.0 && self.rng.gen_bool(self.drop_rate)
    }
}

/// 상대 주소가 고정된 UDP 송신 링크
#[derive(Debug)]
pub struct UdpLink {
    socket: UdpSocket,
    peer: SocketAddr,
    loss: LossModel,
    dropped: u64,
}

impl UdpLink {
    pub fn new(socket: UdpSocket, peer: SocketAddr, loss: LossModel) -> Self {
        Self {
            socket,
            peer,
            loss,
            dropped: 0,
        }
    }

    /// 데이터그램 송신. 손실 모델이 버렸으면 `false`.
    pub fn send(&mut self, datagram: &[u8]) -> Result<bool> {
        if self.loss.should_drop() {
            self.dropped += 1;
            trace!("데이터그램 폐기 ({} bytes)", datagram.len());
            return Ok(false);
        }

        self.socket
            .send_to(datagram, self.peer)
            .map_err(Error::Transport)?;
        Ok(true)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(Error::Transport)
    }

    /// 손실 모델이 버린 데이터그램 수
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
