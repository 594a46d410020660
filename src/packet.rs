//! UCP 패킷 정의 및 인코딩/디코딩
//!
//! 세 종류의 패킷이 고정 오프셋 레이아웃으로 직렬화된다.
//!
//! | 종류     | 레이아웃                                                     |
//! |----------|--------------------------------------------------------------|
//! | CTRL     | tag(1) flag(1) seq_no(4, LE)                                 |
//! | DATA     | tag(1) flag(1) seq_no(4, LE) offset(4, LE) length(2, LE) data |
//! | METADATA | tag(1) part_index(1) part_size(4, **BE**) name(20, NUL 패딩) |
//!
//! METADATA의 part_size만 빅엔디언이다. 기존 구현과의 호환을 위해 유지한다.

use bytes::{Buf, BufMut, Bytes};

use crate::{Error, Result, DESTINATION_NAME_LEN, UDP_PACKET_DATA_SIZE};

/// CTRL 패킷 전체 크기
pub const CTRL_PACKET_LEN: usize = 6;

/// DATA 패킷 헤더 크기 (페이로드 제외)
pub const DATA_HEADER_LEN: usize = 12;

/// METADATA 패킷 전체 크기
pub const METADATA_PACKET_LEN: usize = 6 + DESTINATION_NAME_LEN;

/// 패킷 종류 태그 (바이트 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketKind {
    Ctrl = 1,
    Data = 2,
    Metadata = 3,
}

impl TryFrom<u8> for PacketKind {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(PacketKind::Ctrl),
            2 => Ok(PacketKind::Data),
            3 => Ok(PacketKind::Metadata),
            _ => Err(Error::MalformedPacket {
                reason: "unknown packet kind",
            }),
        }
    }
}

/// CTRL 패킷 플래그
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CtrlFlag {
    Ack = 1,
    Nack = 2,
    Fin = 3,
}

impl TryFrom<u8> for CtrlFlag {
    type Error = Error;

    fn try_from(flag: u8) -> Result<Self> {
        match flag {
            1 => Ok(CtrlFlag::Ack),
            2 => Ok(CtrlFlag::Nack),
            3 => Ok(CtrlFlag::Fin),
            _ => Err(Error::MalformedPacket {
                reason: "unknown ctrl flag",
            }),
        }
    }
}

/// DATA 패킷 플래그
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DataFlag {
    /// 파티션 중간 세그먼트
    Segment = 0,
    /// offset 0 세그먼트
    Start = 1,
    /// 파티션 끝에 도달하는 세그먼트
    End = 2,
}

impl TryFrom<u8> for DataFlag {
    type Error = Error;

    fn try_from(flag: u8) -> Result<Self> {
        match flag {
            0 => Ok(DataFlag::Segment),
            1 => Ok(DataFlag::Start),
            2 => Ok(DataFlag::End),
            _ => Err(Error::MalformedPacket {
                reason: "unknown data flag",
            }),
        }
    }
}

/// 전송 알림 패킷 (흐름당 한 번)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataPacket {
    /// 대상 파일 이름 (최대 20바이트)
    pub destination: Bytes,

    /// 파티션 인덱스
    pub part_index: u8,

    /// 파티션 크기 (바이트)
    pub part_size: u32,
}

impl MetadataPacket {
    /// 새 메타데이터 패킷 생성. 이름은 20바이트로 잘린다.
    pub fn new(destination: &str, part_index: u8, part_size: u32) -> Self {
        let name = destination.as_bytes();
        let len = name.len().min(DESTINATION_NAME_LEN);
        Self {
            destination: Bytes::copy_from_slice(&name[..len]),
            part_index,
            part_size,
        }
    }

    /// 대상 이름을 문자열로 (UTF-8이 아니면 손실 변환)
    pub fn destination_lossy(&self) -> String {
        String::from_utf8_lossy(&self.destination).into_owned()
    }
}

/// 데이터 세그먼트 패킷
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub flag: DataFlag,

    /// 흐름 내 단조 증가 카운터 (offset과 무관)
    pub seq_no: u32,

    /// 파티션 파일 내 절대 오프셋
    pub offset: u32,

    pub payload: Bytes,
}

impl DataPacket {
    pub fn new(flag: DataFlag, seq_no: u32, offset: u32, payload: Bytes) -> Self {
        Self {
            flag,
            seq_no,
            offset,
            payload,
        }
    }

    pub fn is_last(&self) -> bool {
        self.flag == DataFlag::End
    }
}

/// ACK/NACK/FIN 제어 패킷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtrlPacket {
    pub seq_no: u32,
    pub flag: CtrlFlag,
}

impl CtrlPacket {
    pub fn ack(seq_no: u32) -> Self {
        Self {
            seq_no,
            flag: CtrlFlag::Ack,
        }
    }

    pub fn nack(seq_no: u32) -> Self {
        Self {
            seq_no,
            flag: CtrlFlag::Nack,
        }
    }

    pub fn fin(seq_no: u32) -> Self {
        Self {
            seq_no,
            flag: CtrlFlag::Fin,
        }
    }
}

/// 통합 패킷 enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Metadata(MetadataPacket),
    Data(DataPacket),
    Ctrl(CtrlPacket),
}

impl Packet {
    /// 패킷 종류 반환
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::Metadata(_) => PacketKind::Metadata,
            Packet::Data(_) => PacketKind::Data,
            Packet::Ctrl(_) => PacketKind::Ctrl,
        }
    }

    /// 인코딩 후 크기
    pub fn encoded_len(&self) -> usize {
        match self {
            Packet::Metadata(_) => METADATA_PACKET_LEN,
            Packet::Data(data) => DATA_HEADER_LEN + data.payload.len(),
            Packet::Ctrl(_) => CTRL_PACKET_LEN,
        }
    }

    /// 호출자 버퍼에 인코딩하고 기록한 바이트 수를 반환
    pub fn encode(&self, buf: &mut [u8]) -> Result<usize> {
        if let Packet::Data(data) = self {
            if data.payload.len() > UDP_PACKET_DATA_SIZE {
                return Err(Error::PayloadTooLarge {
                    len: data.payload.len(),
                    max: UDP_PACKET_DATA_SIZE,
                });
            }
        }

        let needed = self.encoded_len();
        if buf.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                capacity: buf.len(),
            });
        }

        let mut out = &mut buf[..needed];
        out.put_u8(self.kind() as u8);

        match self {
            Packet::Ctrl(ctrl) => {
                out.put_u8(ctrl.flag as u8);
                out.put_u32_le(ctrl.seq_no);
            }
            Packet::Data(data) => {
                out.put_u8(data.flag as u8);
                out.put_u32_le(data.seq_no);
                out.put_u32_le(data.offset);
                out.put_u16_le(data.payload.len() as u16);
                out.put_slice(&data.payload);
            }
            Packet::Metadata(meta) => {
                out.put_u8(meta.part_index);
                out.put_u32(meta.part_size);
                let len = meta.destination.len().min(DESTINATION_NAME_LEN);
                out.put_slice(&meta.destination[..len]);
                out.put_bytes(0, DESTINATION_NAME_LEN - len);
            }
        }

        Ok(needed)
    }

    /// 버퍼에서 패킷 디코딩
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut input = buf;
        if input.is_empty() {
            return Err(Error::MalformedPacket {
                reason: "empty datagram",
            });
        }

        match PacketKind::try_from(input.get_u8())? {
            PacketKind::Ctrl => {
                if buf.len() < CTRL_PACKET_LEN {
                    return Err(Error::MalformedPacket {
                        reason: "short ctrl packet",
                    });
                }
                let flag = CtrlFlag::try_from(input.get_u8())?;
                let seq_no = input.get_u32_le();
                Ok(Packet::Ctrl(CtrlPacket { seq_no, flag }))
            }
            PacketKind::Data => {
                if buf.len() < DATA_HEADER_LEN {
                    return Err(Error::MalformedPacket {
                        reason: "short data header",
                    });
                }
                let flag = DataFlag::try_from(input.get_u8())?;
                let seq_no = input.get_u32_le();
                let offset = input.get_u32_le();
                let length = input.get_u16_le() as usize;

                // 길이 필드를 신뢰하기 전에 용량부터 확인
                if length > UDP_PACKET_DATA_SIZE {
                    return Err(Error::PayloadTooLarge {
                        len: length,
                        max: UDP_PACKET_DATA_SIZE,
                    });
                }
                if input.remaining() < length {
                    return Err(Error::MalformedPacket {
                        reason: "truncated data payload",
                    });
                }

                Ok(Packet::Data(DataPacket {
                    flag,
                    seq_no,
                    offset,
                    payload: Bytes::copy_from_slice(&input[..length]),
                }))
            }
            PacketKind::Metadata => {
                if buf.len() < METADATA_PACKET_LEN {
                    return Err(Error::MalformedPacket {
                        reason: "short metadata packet",
                    });
                }
                let part_index = input.get_u8();
                let part_size = input.get_u32();
                let name = &input[..DESTINATION_NAME_LEN];
                let name_len = name.iter().position(|&b| b == 0).unwrap_or(name.len());

                Ok(Packet::Metadata(MetadataPacket {
                    destination: Bytes::copy_from_slice(&name[..name_len]),
                    part_index,
                    part_size,
                }))
            }
        }
    }
}

impl From<MetadataPacket> for Packet {
    fn from(packet: MetadataPacket) -> Self {
        Packet::Metadata(packet)
    }
}

impl From<DataPacket> for Packet {
    fn from(packet: DataPacket) -> Self {
        Packet::Data(packet)
    }
}

impl From<CtrlPacket> for Packet {
    fn from(packet: CtrlPacket) -> Self {
        Packet::Ctrl(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UDP_PACKET_SIZE;

    fn round_trip(packet: Packet) -> Packet {
        let mut buf = [0u8; UDP_PACKET_SIZE];
        let len = packet.encode(&mut buf).unwrap();
        assert_eq!(len, packet.encoded_len());
        Packet::decode(&buf[..len]).unwrap()
    }

    #[test]
    fn test_ctrl_layout() {
        let mut buf = [0u8; 16];
        let len = Packet::from(CtrlPacket::nack(0x0403_0201)).encode(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[1, 2, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_data_layout() {
        let packet = DataPacket::new(DataFlag::End, 7, 0x0102_0304, Bytes::from_static(b"abc"));
        let mut buf = [0u8; 32];
        let len = Packet::from(packet).encode(&mut buf).unwrap();
        assert_eq!(len, 15);
        assert_eq!(
            &buf[..len],
            &[2, 2, 7, 0, 0, 0, 0x04, 0x03, 0x02, 0x01, 3, 0, b'a', b'b', b'c']
        );
    }

    #[test]
    fn test_metadata_part_size_is_big_endian() {
        let packet = MetadataPacket::new("out.bin", 4, 0x0A0B_0C0D);
        let mut buf = [0xFFu8; 32];
        let len = Packet::from(packet).encode(&mut buf).unwrap();
        assert_eq!(len, METADATA_PACKET_LEN);
        assert_eq!(&buf[..6], &[3, 4, 0x0A, 0x0B, 0x0C, 0x0D]);
        assert_eq!(&buf[6..13], b"out.bin");
        assert!(buf[13..26].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_round_trip_each_kind() {
        let packets = vec![
            Packet::from(CtrlPacket::fin(u32::MAX)),
            Packet::from(DataPacket::new(DataFlag::Start, 0, 0, Bytes::new())),
            Packet::from(DataPacket::new(
                DataFlag::Segment,
                12,
                9166,
                Bytes::from(vec![0x5A; UDP_PACKET_DATA_SIZE]),
            )),
            Packet::from(MetadataPacket::new("twenty-bytes-exactly", 9, 123_456)),
        ];

        for packet in packets {
            assert_eq!(round_trip(packet.clone()), packet);
        }
    }

    #[test]
    fn test_metadata_name_truncated() {
        let packet = MetadataPacket::new("a-very-long-destination-name.bin", 0, 1);
        assert_eq!(packet.destination.len(), DESTINATION_NAME_LEN);
        assert_eq!(round_trip(packet.clone().into()), Packet::Metadata(packet));
    }

    #[test]
    fn test_encode_rejects_small_buffer() {
        let packet = Packet::from(DataPacket::new(DataFlag::Segment, 1, 0, Bytes::from_static(b"xyz")));
        let mut buf = [0u8; 14];
        assert!(matches!(
            packet.encode(&mut buf),
            Err(Error::BufferTooSmall { needed: 15, capacity: 14 })
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let packet = Packet::from(DataPacket::new(
            DataFlag::Segment,
            1,
            0,
            Bytes::from(vec![0; UDP_PACKET_DATA_SIZE + 1]),
        ));
        let mut buf = vec![0u8; UDP_PACKET_SIZE * 2];
        assert!(matches!(
            packet.encode(&mut buf),
            Err(Error::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_short_buffers() {
        assert!(matches!(Packet::decode(&[]), Err(Error::MalformedPacket { .. })));
        assert!(matches!(Packet::decode(&[1, 1, 0]), Err(Error::MalformedPacket { .. })));
        assert!(matches!(Packet::decode(&[2; 11]), Err(Error::MalformedPacket { .. })));
        assert!(matches!(Packet::decode(&[3; 25]), Err(Error::MalformedPacket { .. })));
        assert!(matches!(Packet::decode(&[9; 30]), Err(Error::MalformedPacket { .. })));
    }

    #[test]
    fn test_decode_validates_length_field() {
        // length = 0xFFFF, 용량 초과
        let mut buf = [0u8; 12];
        buf[0] = 2;
        buf[10] = 0xFF;
        buf[11] = 0xFF;
        assert!(matches!(Packet::decode(&buf), Err(Error::PayloadTooLarge { .. })));

        // length = 8 이지만 실제 페이로드 4바이트
        let mut buf = [0u8; 16];
        buf[0] = 2;
        buf[10] = 8;
        assert!(matches!(Packet::decode(&buf), Err(Error::MalformedPacket { .. })));
    }
}
