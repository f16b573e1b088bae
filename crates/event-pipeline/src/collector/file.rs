//! 파일 기반 로그 테일러
//!
//! 다른 프로세스가 잠금 없이 추가 기록 중인 로그 파일을 순차적으로 읽습니다.
//! `tail -f`와 유사한 동작을 폴링 방식으로 구현합니다.
//!
//! # 동작
//! - 파일이 아직 없으면 생길 때까지 주기적으로 확인합니다.
//! - 개행으로 끝난 완전한 라인만 반환하고, 끝의 부분 라인은 버퍼에 남깁니다.
//! - EOF에서 완성된 라인이 없으면 `None`을 반환합니다. 대기(backoff)는 호출자 몫입니다.
//!
//! # 치명적 상황
//! - 테일링 중 파일이 사라짐
//! - 파일 크기가 읽기 위치보다 작아짐 (truncation)
//! - 그 외 모든 I/O 에러

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use zdstats_core::metrics as zm;

use super::TailerStatus;
use crate::error::EventPipelineError;

/// 한 번의 read 호출로 읽을 최대 바이트 수
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// 테일러 설정
#[derive(Debug, Clone)]
pub struct TailerOptions {
    /// 파일 생성 대기 중 폴링 간격
    pub open_poll_interval: Duration,
    /// 파일 생성 대기 제한 시간. `None`이면 무제한
    pub open_timeout: Option<Duration>,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,
}

impl Default for TailerOptions {
    fn default() -> Self {
        Self {
            open_poll_interval: Duration::from_secs(1),
            open_timeout: None,
            max_line_length: 64 * 1024, // 64KB
        }
    }
}

/// 로그 테일러
///
/// 한 실행(run)에 하나씩 생성되고, 실행이 끝날 때 한 번 닫힙니다.
/// 읽기 위치와 버퍼는 내부에서만 관리합니다.
#[derive(Debug)]
pub struct LogTailer {
    /// 로그 파일 경로
    path: PathBuf,
    /// 열린 파일 핸들 (닫히면 None)
    file: Option<File>,
    /// 아직 개행을 만나지 못한 바이트
    buf: BytesMut,
    /// 파일에서 읽은 총 바이트 수 (읽기 위치)
    offset: u64,
    /// 최대 라인 길이
    max_line_length: usize,
    /// 너무 긴 라인을 다음 개행까지 버리는 중
    discarding: bool,
    /// 반환한 라인 수
    lines_read: u64,
    /// 길이 초과로 버린 라인 수
    lines_discarded: u64,
    /// 현재 상태
    status: TailerStatus,
}

impl LogTailer {
    /// 로그 파일을 엽니다.
    ///
    /// 파일이 없으면 `open_poll_interval` 간격으로 재시도합니다.
    /// 대기 중 `cancel`이 취소되면 [`EventPipelineError::Cancelled`],
    /// `open_timeout`이 지나면 [`EventPipelineError::LogFileNotFound`]를 반환합니다.
    pub async fn open(
        path: impl AsRef<Path>,
        options: &TailerOptions,
        cancel: &CancellationToken,
    ) -> Result<Self, EventPipelineError> {
        let path = path.as_ref().to_path_buf();
        let started = Instant::now();
        let mut announced = false;

        let file = loop {
            match File::open(&path).await {
                Ok(file) => break file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    if !announced {
                        tracing::info!(path = %path.display(), "waiting for log file to appear");
                        announced = true;
                    }

                    let waited = started.elapsed();
                    if let Some(timeout) = options.open_timeout {
                        if waited >= timeout {
                            return Err(EventPipelineError::LogFileNotFound {
                                path: path.display().to_string(),
                                waited_secs: waited.as_secs(),
                            });
                        }
                    }

                    tokio::select! {
                        () = cancel.cancelled() => {
                            return Err(EventPipelineError::Cancelled(format!(
                                "stopped waiting for {}",
                                path.display()
                            )));
                        }
                        () = tokio::time::sleep(options.open_poll_interval) => {}
                    }
                }
                Err(e) => {
                    return Err(EventPipelineError::Tailer {
                        path: path.display().to_string(),
                        reason: format!("failed to open: {e}"),
                    });
                }
            }
        };

        tracing::info!(path = %path.display(), "log file opened");

        Ok(Self {
            path,
            file: Some(file),
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            offset: 0,
            max_line_length: options.max_line_length,
            discarding: false,
            lines_read: 0,
            lines_discarded: 0,
            status: TailerStatus::Tailing,
        })
    }

    /// 다음 완전한 라인을 반환합니다.
    ///
    /// 버퍼에 완전한 라인이 없으면 라인이 완성되거나 EOF에 닿을 때까지 읽습니다.
    /// EOF에서 라인이 완성되지 않았으면 `Ok(None)`을 반환하며 대기하지 않습니다.
    /// 라인 끝의 `\n`과 그 앞의 `\r`은 제거되고, 잘못된 UTF-8은 U+FFFD로 대체됩니다.
    pub async fn next_line(&mut self) -> Result<Option<String>, EventPipelineError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        if self.status.is_terminal() {
            return Err(EventPipelineError::Tailer {
                path: self.path.display().to_string(),
                reason: format!("tailer is no longer readable ({:?})", self.status),
            });
        }

        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }

            let Some(file) = self.file.as_mut() else {
                return Err(EventPipelineError::Tailer {
                    path: self.path.display().to_string(),
                    reason: "tailer is closed".to_owned(),
                });
            };

            let n = match file.read(&mut chunk).await {
                Ok(n) => n,
                Err(e) => return Err(self.fail(format!("read failed: {e}"))),
            };

            if n == 0 {
                self.check_file_intact().await?;
                return Ok(None);
            }

            self.offset += n as u64;
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// 파일 핸들을 해제합니다. 여러 번 호출해도 안전합니다.
    ///
    /// 버퍼에 남은 부분 라인은 버려집니다.
    pub fn close(&mut self) {
        if self.file.take().is_some() {
            if !self.buf.is_empty() {
                tracing::debug!(
                    path = %self.path.display(),
                    bytes = self.buf.len(),
                    "dropping unterminated trailing line"
                );
            }
            self.buf.clear();
            self.status = TailerStatus::Closed;
            tracing::debug!(
                path = %self.path.display(),
                offset = self.offset,
                lines = self.lines_read,
                "tailer closed"
            );
        }
    }

    /// 로그 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 현재 읽기 위치 (바이트)
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 반환한 라인 수
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// 길이 초과로 버린 라인 수
    pub fn lines_discarded(&self) -> u64 {
        self.lines_discarded
    }

    /// 현재 상태를 반환합니다.
    pub fn status(&self) -> &TailerStatus {
        &self.status
    }

    /// 버퍼에서 완전한 라인 하나를 꺼냅니다.
    fn take_line(&mut self) -> Option<String> {
        loop {
            let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                // CRLF의 `\r`은 라인 길이에 포함되지 않음
                let pending = self.buf.len() - usize::from(self.buf.last() == Some(&b'\r'));
                if pending > self.max_line_length {
                    if !self.discarding {
                        self.discard_oversized(pending);
                        self.discarding = true;
                    }
                    self.buf.clear();
                }
                return None;
            };

            let mut line = self.buf.split_to(pos + 1);

            if self.discarding {
                // 이미 버린 라인의 나머지 부분
                self.discarding = false;
                continue;
            }

            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }

            if line.len() > self.max_line_length {
                self.discard_oversized(line.len());
                continue;
            }

            self.lines_read += 1;
            return Some(String::from_utf8_lossy(&line).into_owned());
        }
    }

    fn discard_oversized(&mut self, len: usize) {
        tracing::warn!(
            path = %self.path.display(),
            len,
            max = self.max_line_length,
            "line exceeds max length, discarding"
        );
        self.lines_discarded += 1;
        metrics::counter!(zm::LINES_DISCARDED_TOTAL).increment(1);
    }

    /// EOF에서 파일이 여전히 같은 파일인지 확인합니다.
    async fn check_file_intact(&mut self) -> Result<(), EventPipelineError> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.len() < self.offset => Err(self.fail(format!(
                "log file truncated: size {} is below read position {}",
                meta.len(),
                self.offset
            ))),
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(self.fail("log file disappeared".to_owned()))
            }
            Err(e) => Err(self.fail(format!("failed to stat log file: {e}"))),
        }
    }

    fn fail(&mut self, reason: String) -> EventPipelineError {
        self.status = TailerStatus::Error(reason.clone());
        EventPipelineError::Tailer {
            path: self.path.display().to_string(),
            reason,
        }
    }
}

impl Drop for LogTailer {
    fn drop(&mut self) {
        self.close();
    }
}
