//! 이벤트 스트림 출력
//!
//! 이벤트를 하나씩 직렬화하여 출력 대상에 바로 기록하고, 이벤트마다 flush합니다.
//! 메모리에 이벤트를 모아두지 않습니다.
//!
//! # 프레이밍
//! - [`OutputFormat::JsonArray`]: `{"events": [` ... `]}` 단일 문서.
//!   닫기 전에 비정상 종료되면 문서가 닫히지 않은 채로 남습니다.
//! - [`OutputFormat::JsonLines`]: 한 줄에 이벤트 하나. 언제 끊겨도 완성된 줄은 유효합니다.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use zdstats_core::config::OutputFormat;
use zdstats_core::types::Event;

use crate::error::EventPipelineError;

/// JSON 배열 문서 머리
const ARRAY_HEADER: &[u8] = b"{\"events\": [\n";
/// 이벤트 사이 구분자
const ARRAY_SEPARATOR: &[u8] = b",\n";
/// 이벤트 앞 들여쓰기
const ARRAY_INDENT: &[u8] = b"    ";
/// JSON 배열 문서 꼬리
const ARRAY_FOOTER: &[u8] = b"\n]}\n";

/// 출력 파일명 시각 포맷
const FILE_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `<prefix>-YYYYMMDD_HHMMSS.<ext>` 형식의 출력 파일명을 만듭니다.
pub fn output_file_name(prefix: &str, format: OutputFormat, started: &DateTime<Local>) -> String {
    format!(
        "{prefix}-{}.{}",
        started.format(FILE_TIME_FORMAT),
        format.extension()
    )
}

/// 이벤트 스트림 출력기
///
/// 실행마다 하나씩 생성되고 실행 종료 시 한 번 닫힙니다.
pub struct EventWriter<W> {
    sink: W,
    format: OutputFormat,
    /// 아직 이벤트를 하나도 쓰지 않았는지 (구분자 판단용)
    first: bool,
    closed: bool,
    events_written: u64,
}

impl EventWriter<File> {
    /// 출력 디렉토리에 새 출력 파일을 만들고 출력기를 엽니다.
    ///
    /// 같은 이름의 파일이 있으면 덮어씁니다.
    pub async fn create(
        dir: impl AsRef<Path>,
        prefix: &str,
        format: OutputFormat,
        started: &DateTime<Local>,
    ) -> Result<(Self, PathBuf), EventPipelineError> {
        let path = dir.as_ref().join(output_file_name(prefix, format, started));

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| {
                EventPipelineError::Writer(format!("failed to create {}: {e}", path.display()))
            })?;

        let writer = Self::open(file, format).await?;
        tracing::info!(path = %path.display(), format = format.as_str(), "event output opened");
        Ok((writer, path))
    }
}

impl<W> EventWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// 출력 대상을 감싸고 문서 머리를 기록합니다.
    pub async fn open(sink: W, format: OutputFormat) -> Result<Self, EventPipelineError> {
        let mut writer = Self {
            sink,
            format,
            first: true,
            closed: false,
            events_written: 0,
        };

        if format == OutputFormat::JsonArray {
            writer.put(ARRAY_HEADER).await?;
            writer.flush().await?;
        }

        Ok(writer)
    }

    /// 이벤트 하나를 기록하고 flush합니다.
    pub async fn write(&mut self, event: &Event) -> Result<(), EventPipelineError> {
        if self.closed {
            return Err(EventPipelineError::Writer("write after close".to_owned()));
        }

        let json = serde_json::to_vec(event)?;

        match self.format {
            OutputFormat::JsonArray => {
                if !self.first {
                    self.put(ARRAY_SEPARATOR).await?;
                }
                self.put(ARRAY_INDENT).await?;
                self.put(&json).await?;
            }
            OutputFormat::JsonLines => {
                self.put(&json).await?;
                self.put(b"\n").await?;
            }
        }
        self.flush().await?;

        self.first = false;
        self.events_written += 1;
        Ok(())
    }

    /// 문서 꼬리를 기록하고 출력 대상을 닫습니다. 여러 번 호출해도 안전합니다.
    pub async fn close(&mut self) -> Result<(), EventPipelineError> {
        if self.closed {
            return Ok(());
        }
        // 꼬리 기록이 실패해도 다시 시도하지 않음
        self.closed = true;

        if self.format == OutputFormat::JsonArray {
            self.put(ARRAY_FOOTER).await?;
        }
        self.flush().await?;
        self.sink
            .shutdown()
            .await
            .map_err(|e| EventPipelineError::Writer(format!("failed to close sink: {e}")))?;

        tracing::debug!(events = self.events_written, "event output closed");
        Ok(())
    }

    /// 기록한 이벤트 수
    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    /// 닫혔는지 여부
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 출력 형식
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    async fn put(&mut self, bytes: &[u8]) -> Result<(), EventPipelineError> {
        self.sink
            .write_all(bytes)
            .await
            .map_err(|e| EventPipelineError::Writer(format!("write failed: {e}")))
    }

    async fn flush(&mut self) -> Result<(), EventPipelineError> {
        self.sink
            .flush()
            .await
            .map_err(|e| EventPipelineError::Writer(format!("flush failed: {e}")))
    }
}

impl<W> Drop for EventWriter<W> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(
                events = self.events_written,
                format = self.format.as_str(),
                "event writer dropped without close, output left unterminated"
            );
        }
    }
}
