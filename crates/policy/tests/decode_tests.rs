//! 통합 테스트 -- 정책 문서 디코딩부터 PolicySet 구성까지의 흐름 검증

use kytheron_policy::{decode, PolicySet};

const CLOUDTRAIL_POLICY: &str = r#"
source "aws_cloudtrail" "account-x" {}

evaluation "aws_cloudtrail" "any_action" {
  inputs = [source.aws_cloudtrail.account-x]

  condition {
    path  = "$.userIdentity.type"
    value = "IAMUser"
  }

  outputs = [output.console.log_cloudtrail_user_actions]
}

output "console" "log_cloudtrail_user_actions" {}
"#;

const SYSLOG_POLICY: &str = r#"
source "syslog" "edge" {
  version = "v0.1.0"
}

evaluation "syslog" "auth_failures" {
  inputs = [source.syslog.edge]

  condition {
    path  = "$.message"
    value = "Failed password"
  }

  outputs = [output.console.auth_sink]
}

output "console" "auth_sink" {}
"#;

/// 여러 정책 파일을 디코딩하여 하나의 세트로 모으는 데몬 기동 흐름
#[test]
fn decode_multiple_policies_into_set() {
    let mut set = PolicySet::new();
    set.insert(decode("cloudtrail.hcl", CLOUDTRAIL_POLICY).unwrap());
    set.insert(decode("syslog.hcl", SYSLOG_POLICY).unwrap());

    assert_eq!(set.len(), 2);
    assert_eq!(
        set.policies_for("aws_cloudtrail", "account-x"),
        ["cloudtrail.hcl".to_owned()]
    );
    assert_eq!(set.policies_for("syslog", "edge"), ["syslog.hcl".to_owned()]);
}

/// 평가 입력은 항상 선언된 소스의 복사본으로 해소된다
#[test]
fn resolved_references_match_declarations() {
    let policy = decode("syslog.hcl", SYSLOG_POLICY).unwrap();

    for eval in &policy.evaluations {
        for input in &eval.inputs {
            assert!(
                policy.sources.contains(input),
                "input {input:?} not found in declared sources"
            );
        }
        for output in &eval.outputs {
            assert!(
                policy.outputs.contains(output),
                "output {output:?} not found in declared outputs"
            );
        }
    }

    // 선언에 적힌 버전이 해소된 복사본까지 전달된다
    assert_eq!(
        policy.evaluations[0].inputs[0].version.as_deref(),
        Some("v0.1.0")
    );
}

/// 디코딩은 결정적이다: 같은 문서를 두 번 디코딩하면 같은 그래프
#[test]
fn decode_is_deterministic() {
    let first = decode("cloudtrail.hcl", CLOUDTRAIL_POLICY).unwrap();
    let second = decode("cloudtrail.hcl", CLOUDTRAIL_POLICY).unwrap();
    assert_eq!(first, second);
}

/// 하나의 평가가 여러 입력과 여러 출력을 가질 수 있다
#[test]
fn evaluation_with_multiple_references() {
    let input = r#"
source "aws_cloudtrail" "a" {}
source "aws_cloudtrail" "b" {}

evaluation "aws_cloudtrail" "fan" {
  inputs  = [source.aws_cloudtrail.a, source.aws_cloudtrail.b]
  outputs = [output.console.x, output.console.y]
}

output "console" "x" {}
output "console" "y" {}
"#;
    let policy = decode("fan.hcl", input).unwrap();
    let eval = &policy.evaluations[0];
    assert_eq!(eval.inputs.len(), 2);
    assert_eq!(eval.outputs.len(), 2);
    assert_eq!(eval.inputs[0].name, "a");
    assert_eq!(eval.inputs[1].name, "b");
}
