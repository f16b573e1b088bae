//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 분류기, 필터, 타임스탬프 산출기, 출력기가 주고받는 이벤트 구조를 정의합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 이벤트 카테고리 (닫힌 집합)
///
/// ZDaemon 클라이언트 로그의 이벤트를 큰 단위로 구분합니다.
/// 세부 구분은 [`Event::event_type`]이 담당합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// 콘솔 명령 에코 및 맵 변경 알림
    Command,
    /// 플레이어 접속
    Connect,
    /// 플레이어 접속 해제
    Disconnect,
    /// 다른 플레이어에 의한 사망
    Frag,
    /// 환경/자살에 의한 사망
    Death,
    /// 채팅 메시지
    Chat,
    /// CTF 깃발 이벤트
    Flag,
    /// 팀 변경
    Team,
    /// 기타 게임 진행 메시지
    Game,
}

impl Category {
    /// 모든 카테고리
    pub const ALL: [Category; 9] = [
        Category::Command,
        Category::Connect,
        Category::Disconnect,
        Category::Frag,
        Category::Death,
        Category::Chat,
        Category::Flag,
        Category::Team,
        Category::Game,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Frag => "frag",
            Self::Death => "death",
            Self::Chat => "chat",
            Self::Flag => "flag",
            Self::Team => "team",
            Self::Game => "game",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// 분류 결과 -- 아직 타임스탬프가 없는 후보 이벤트
///
/// 분류기가 생성하고, 필터를 통과하면 [`Event`]로 변환됩니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEvent {
    /// 카테고리
    pub category: Category,
    /// 세부 타입 (예: `map_change`)
    pub event_type: String,
    /// 추출된 필드
    pub data: BTreeMap<String, String>,
}

impl CandidateEvent {
    /// 타임스탬프를 붙여 최종 이벤트로 변환합니다.
    pub fn into_event(self, timestamp: String) -> Event {
        Event {
            timestamp,
            event_type: self.event_type,
            data: self.data,
            category: self.category,
        }
    }
}

/// 출력 이벤트
///
/// 직렬화 시 필드 순서는 `timestamp`, `type`, `data`, `category`입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 경과 시간 `"<초>.<마이크로초>"` (정밀도 손실 방지를 위해 문자열)
    pub timestamp: String,
    /// 세부 타입
    #[serde(rename = "type")]
    pub event_type: String,
    /// 추출된 필드 (키 중복 없음)
    pub data: BTreeMap<String, String>,
    /// 카테고리
    pub category: Category,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}/{}", self.timestamp, self.category, self.event_type)
    }
}
