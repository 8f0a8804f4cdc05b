//! 정책 그래프 타입 — 참조가 모두 해소된 최종 형태
//!
//! [`Evaluation`]의 `inputs`/`outputs`는 선언 블록의 복사본(값)으로
//! 저장됩니다. 디코딩 이후 정책은 불변이므로 공유 가변 포인터 대신
//! 값 복사로 그래프의 불변성을 보존합니다.

use serde::{Deserialize, Serialize};

/// 디코딩이 끝난 정책 문서
///
/// `name`은 원본 파일명이며, 블록 목록은 문서에 선언된 순서를 유지합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// 정책 이름 (원본 파일명)
    pub name: String,
    /// 선언된 소스 블록
    pub sources: Vec<Source>,
    /// 선언된 평가 블록 (참조 해소 완료)
    pub evaluations: Vec<Evaluation>,
    /// 선언된 출력 블록
    pub outputs: Vec<Output>,
}

/// 소스 블록 — 로그를 공급하는 수집원 라벨
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// 소스 유형 (예: "aws_cloudtrail")
    pub source_type: String,
    /// 소스 이름 (예: "account-x")
    pub name: String,
    /// 소스 플러그인 버전 (선언된 경우)
    pub version: Option<String>,
}

/// 출력 블록 — 매칭된 레코드를 받을 대상 라벨
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// 출력 유형 (예: "console")
    pub output_type: String,
    /// 출력 이름
    pub name: String,
    /// 출력 플러그인 버전 (선언된 경우)
    pub version: Option<String>,
}

/// 평가 블록 — 어떤 소스의 레코드에 어떤 조건을 적용해 어디로 보낼지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 평가 유형
    pub eval_type: String,
    /// 평가 이름
    pub name: String,
    /// 입력 소스 (해소된 참조의 복사본)
    pub inputs: Vec<Source>,
    /// 조건 목록
    pub conditions: Vec<Condition>,
    /// 출력 대상 (해소된 참조의 복사본)
    pub outputs: Vec<Output>,
}

/// 조건 — JSON-path 표현식과 기대 문자열
///
/// 조건의 평가 의미론은 별도의 평가기 컴포넌트에 속합니다.
/// 여기서는 그래프 구성만 담당합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// JSON-path 표현식 (예: "$.userIdentity.type")
    pub path: String,
    /// 기대 값
    pub value: String,
}

impl Source {
    /// 정책 문서 안에서 이 블록을 가리키는 정규 참조 문자열을 반환합니다.
    pub fn reference(&self) -> String {
        format!("source.{}.{}", self.source_type, self.name)
    }
}

impl Output {
    /// 정책 문서 안에서 이 블록을 가리키는 정규 참조 문자열을 반환합니다.
    pub fn reference(&self) -> String {
        format!("output.{}.{}", self.output_type, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_reference_format() {
        let source = Source {
            source_type: "aws_cloudtrail".to_owned(),
            name: "account-x".to_owned(),
            version: None,
        };
        assert_eq!(source.reference(), "source.aws_cloudtrail.account-x");
    }

    #[test]
    fn output_reference_format() {
        let output = Output {
            output_type: "console".to_owned(),
            name: "log_cloudtrail_user_actions".to_owned(),
            version: None,
        };
        assert_eq!(
            output.reference(),
            "output.console.log_cloudtrail_user_actions"
        );
    }

    #[test]
    fn policy_serializes() {
        let policy = Policy {
            name: "p.hcl".to_owned(),
            sources: vec![],
            evaluations: vec![],
            outputs: vec![],
        };
        let json = serde_json::to_string(&policy).unwrap();
        let back: Policy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }
}
