//! 파이프라인 trait — 외부 협력자와 분류 로직의 확장 포인트 정의

use std::fmt;

use crate::types::CandidateEvent;

/// 라인 분류 trait
///
/// 새로운 로그 문법을 지원하려면 이 trait을 구현합니다.
/// 구현체는 라인 간 상태를 가지지 않아야 합니다.
pub trait LineClassifier: Send + Sync {
    /// 분류기 이름
    fn name(&self) -> &str;

    /// 한 라인을 분류합니다. 매칭되는 규칙이 없으면 `None`
    fn classify(&self, line: &str) -> Option<CandidateEvent>;
}

/// 외부 프로세스 종료 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// 종료 코드 (시그널로 종료된 경우 None)
    pub code: Option<i32>,
}

impl ProcessExit {
    /// 정상 종료(코드 0) 여부
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// 로그를 생성하는 외부 프로세스의 생존 여부 조회
///
/// 코디네이터는 이 trait만으로 외부 프로세스를 관찰합니다.
/// 프로세스 실행 인자 구성과 실행 자체는 호출자의 책임입니다.
pub trait ProcessMonitor: Send {
    /// 비블로킹으로 종료 여부를 확인합니다.
    ///
    /// - `Ok(None)`: 아직 실행 중
    /// - `Ok(Some(exit))`: 종료됨
    /// - `Err(_)`: 핸들을 더 이상 사용할 수 없음 (치명적)
    fn try_exit_status(&mut self) -> std::io::Result<Option<ProcessExit>>;
}

impl<T: ProcessMonitor + ?Sized> ProcessMonitor for &mut T {
    fn try_exit_status(&mut self) -> std::io::Result<Option<ProcessExit>> {
        (**self).try_exit_status()
    }
}

impl ProcessMonitor for tokio::process::Child {
    fn try_exit_status(&mut self) -> std::io::Result<Option<ProcessExit>> {
        Ok(self
            .try_wait()?
            .map(|status| ProcessExit { code: status.code() }))
    }
}
