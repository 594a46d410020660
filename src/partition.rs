//! 파일 파티션 분할/저장/병합
//!
//! - 송신측: 원본 파일을 연속 바이트 구간 N개로 나누고, 구간마다 독립된
//!   파일 핸들과 읽기 커서, seq_no 카운터를 가진 [`PartitionReader`]를 만든다.
//! - 수신측: [`PartitionWriter`]가 미리 크기를 잡은 파티션 파일에 절대
//!   오프셋으로 세그먼트를 기록한다. 순서가 뒤바뀐 쓰기도 안전하다.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tracing::debug;

use crate::packet::{DataFlag, DataPacket};
use crate::window::SegmentSource;
use crate::{Error, Result};

/// 파티션 읽기 핸들 (송신측)
#[derive(Debug)]
pub struct PartitionReader {
    index: u8,
    file: File,

    /// 원본 파일 내 시작 위치
    start: u64,

    /// 파티션 크기
    size: u32,

    /// 파티션 내 다음 읽기 위치
    cursor: u32,

    /// 다음 새 세그먼트에 붙일 seq_no
    next_seq_no: u32,

    segment_size: usize,
}

impl PartitionReader {
    /// 파일의 `[start, start + size)` 구간을 여는 핸들
    pub fn open(
        path: impl AsRef<Path>,
        index: u8,
        start: u64,
        size: u32,
        segment_size: usize,
    ) -> Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;

        Ok(Self {
            index,
            file,
            start,
            size,
            cursor: 0,
            next_seq_no: 0,
            segment_size,
        })
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.size
    }
}

impl SegmentSource for PartitionReader {
    fn next_segment(&mut self) -> Result<Option<DataPacket>> {
        if self.is_exhausted() {
            return Ok(None);
        }

        let offset = self.cursor;
        let len = (self.size - offset).min(self.segment_size as u32) as usize;

        let mut buf = BytesMut::zeroed(len);
        self.file.seek(SeekFrom::Start(self.start + offset as u64))?;
        self.file.read_exact(&mut buf)?;

        self.cursor += len as u32;

        // 한 패킷이 파티션 전체면 END가 우선 (수신측이 마지막 seq_no를 알아야 함)
        let flag = if self.cursor == self.size {
            DataFlag::End
        } else if offset == 0 {
            DataFlag::Start
        } else {
            DataFlag::Segment
        };

        let seq_no = self.next_seq_no;
        self.next_seq_no += 1;

        Ok(Some(DataPacket::new(flag, seq_no, offset, buf.freeze())))
    }
}

/// 파일을 `count`개의 연속 구간으로 분할
///
/// 구간 크기는 `len / count`이고 나머지는 마지막 구간에 붙는다.
pub fn split_file(
    path: impl AsRef<Path>,
    count: u8,
    segment_size: usize,
) -> Result<Vec<PartitionReader>> {
    let path = path.as_ref();
    let total = fs::metadata(path)?.len();
    let count = count.max(1);
    let base = total / count as u64;

    (0..count)
        .map(|index| {
            let start = base * index as u64;
            let size = if index == count - 1 {
                total - start
            } else {
                base
            };
            let size = u32::try_from(size).map_err(|_| Error::PartitionTooLarge { index, size })?;

            debug!("파티션 {}: start={}, size={}", index, start, size);
            PartitionReader::open(path, index, start, size, segment_size)
        })
        .collect()
}

/// 파티션 쓰기 핸들 (수신측)
#[derive(Debug)]
pub struct PartitionWriter {
    file: File,
    path: PathBuf,
    size: u32,
}

impl PartitionWriter {
    /// `size` 바이트로 미리 채운 파티션 파일 생성
    pub fn create(path: impl Into<PathBuf>, size: u32) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(size as u64)?;

        Ok(Self { file, path, size })
    }

    /// 절대 오프셋에 세그먼트 기록
    pub fn write_segment(&mut self, offset: u32, payload: &[u8]) -> Result<()> {
        let end = offset as u64 + payload.len() as u64;
        if end > self.size as u64 {
            return Err(Error::Persistence {
                offset,
                source: io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("segment ends at {} beyond partition size {}", end, self.size),
                ),
            });
        }

        self.file
            .seek(SeekFrom::Start(offset as u64))
            .and_then(|_| self.file.write_all(payload))
            .and_then(|_| self.file.flush())
            .map_err(|source| Error::Persistence { offset, source })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 수신측 파티션 파일 경로: `<dir>/<name>.partNN`
pub fn partition_path(dir: impl AsRef<Path>, name: &str, index: u8) -> PathBuf {
    dir.as_ref().join(format!("{}.part{:02}", name, index))
}

/// 파티션 파일들을 순서대로 이어 붙여 `output` 생성
pub fn merge_partitions(parts: &[PathBuf], output: impl AsRef<Path>) -> Result<u64> {
    let mut out = File::create(output.as_ref())?;
    let mut total = 0;

    for part in parts {
        let mut input = File::open(part)?;
        total += io::copy(&mut input, &mut out)?;
    }
    out.flush()?;

    Ok(total)
}
