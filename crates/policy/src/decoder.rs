//! 정책 디코더 — HCL 문서를 2-pass로 정책 그래프로 변환합니다.
//!
//! # 2-pass 알고리즘
//!
//! 1차 패스는 모든 블록을 구조적으로 디코딩합니다 (라벨과 스칼라 속성만
//! 읽고, `inputs`/`outputs` 표현식은 평가하지 않고 보관).
//! 2차 패스는 선언된 모든 블록으로 평가 컨텍스트를 구성합니다:
//!
//! - `source` — type별 객체, 그 아래 name별 객체, 리프는 정규 참조 문자열
//!   `"source.<type>.<name>"`
//! - `evaluation`, `output` — 대칭 구조
//!
//! 각 평가 블록의 `inputs`/`outputs` 표현식을 이 컨텍스트에서 평가하면
//! 참조 문자열의 리스트가 되고, 각 문자열을 선언 테이블에서 조회하여
//! 해소된 [`Source`]/[`Output`] 복사본을 얻습니다. 선언되지 않은 참조는
//! 디코딩 전체를 실패시킵니다.

use hcl::eval::{Context, Evaluate};
use hcl::expr::TraversalOperator;
use hcl::{Block, Expression, Map, Structure, Value};

use kytheron_core::error::PolicyError;

use crate::policy::{Condition, Evaluation, Output, Policy, Source};

/// 1차 패스 결과 — 표현식이 아직 평가되지 않은 평가 블록
#[derive(Debug)]
struct RawEvaluation {
    eval_type: String,
    name: String,
    inputs: Option<Expression>,
    conditions: Vec<Condition>,
    outputs: Option<Expression>,
}

/// 1차 패스 결과 — 문서 전체의 구조적 디코딩
#[derive(Debug, Default)]
struct RawPolicy {
    sources: Vec<Source>,
    evaluations: Vec<RawEvaluation>,
    outputs: Vec<Output>,
}

/// 정책 문서를 파싱하고 모든 참조를 해소하여 [`Policy`]를 생성합니다.
///
/// 어휘/구문 에러, 라벨 수 불일치, 속성 타입 오류, 미해소 참조는 모두
/// 원본 파일명을 포함한 에러로 보고됩니다. 부분 정책은 반환되지 않습니다.
pub fn decode(filename: &str, input: &str) -> Result<Policy, PolicyError> {
    let body = hcl::parse(input).map_err(|e| PolicyError::Parse {
        file: filename.to_owned(),
        reason: e.to_string(),
    })?;

    // 1차 패스: 구조 디코딩
    let raw = decode_structure(filename, &body)?;

    // 2차 패스: 심볼 테이블 구성 후 참조 해소.
    // source/evaluation/output 변수는 type → name → 정규 참조 문자열의
    // 중첩 객체다.
    let mut ctx = Context::new();
    ctx.declare_var(
        "source",
        nested_reference_object(
            "source",
            raw.sources.iter().map(|s| (&s.source_type, &s.name)),
        ),
    );
    ctx.declare_var(
        "evaluation",
        nested_reference_object(
            "evaluation",
            raw.evaluations.iter().map(|e| (&e.eval_type, &e.name)),
        ),
    );
    ctx.declare_var(
        "output",
        nested_reference_object(
            "output",
            raw.outputs.iter().map(|o| (&o.output_type, &o.name)),
        ),
    );

    let mut evaluations = Vec::with_capacity(raw.evaluations.len());
    for re in &raw.evaluations {
        let inputs = match &re.inputs {
            Some(expr) => resolve_source_references(filename, expr, &ctx, &raw)?,
            None => Vec::new(),
        };
        let outputs = match &re.outputs {
            Some(expr) => resolve_output_references(filename, expr, &ctx, &raw)?,
            None => Vec::new(),
        };

        evaluations.push(Evaluation {
            eval_type: re.eval_type.clone(),
            name: re.name.clone(),
            inputs,
            conditions: re.conditions.clone(),
            outputs,
        });
    }

    Ok(Policy {
        name: filename.to_owned(),
        sources: raw.sources,
        evaluations,
        outputs: raw.outputs,
    })
}

/// 1차 패스: 블록 구조와 스칼라 속성만 디코딩합니다.
fn decode_structure(filename: &str, body: &hcl::Body) -> Result<RawPolicy, PolicyError> {
    let mut raw = RawPolicy::default();

    for structure in body.iter() {
        let block = match structure {
            Structure::Block(block) => block,
            // 최상위 속성은 정책 문서에서 의미가 없으므로 무시
            Structure::Attribute(_) => continue,
        };

        match block.identifier.as_str() {
            "source" => {
                let (block_type, name) = block_labels(filename, block)?;
                ensure_unique(
                    filename,
                    "source",
                    &block_type,
                    &name,
                    raw.sources
                        .iter()
                        .any(|s| s.source_type == block_type && s.name == name),
                )?;
                raw.sources.push(Source {
                    source_type: block_type,
                    name,
                    version: optional_string_attr(filename, block, "version")?,
                });
            }
            "output" => {
                let (block_type, name) = block_labels(filename, block)?;
                ensure_unique(
                    filename,
                    "output",
                    &block_type,
                    &name,
                    raw.outputs
                        .iter()
                        .any(|o| o.output_type == block_type && o.name == name),
                )?;
                raw.outputs.push(Output {
                    output_type: block_type,
                    name,
                    version: optional_string_attr(filename, block, "version")?,
                });
            }
            "evaluation" => {
                let (block_type, name) = block_labels(filename, block)?;
                ensure_unique(
                    filename,
                    "evaluation",
                    &block_type,
                    &name,
                    raw.evaluations
                        .iter()
                        .any(|e| e.eval_type == block_type && e.name == name),
                )?;
                raw.evaluations
                    .push(decode_evaluation(filename, block, block_type, name)?);
            }
            // destination 블록은 예약되어 있으며 현재는 무시
            "destination" => {
                let _ = block_labels(filename, block)?;
            }
            other => {
                tracing::debug!(file = filename, block = other, "skipping unknown block");
            }
        }
    }

    Ok(raw)
}

/// 평가 블록의 본문을 디코딩합니다.
///
/// `inputs`/`outputs` 속성은 표현식 그대로 보관하고, `condition`
/// 하위 블록은 필수 `path`/`value` 문자열 속성으로 디코딩합니다.
fn decode_evaluation(
    filename: &str,
    block: &Block,
    eval_type: String,
    name: String,
) -> Result<RawEvaluation, PolicyError> {
    let mut inputs = None;
    let mut outputs = None;
    let mut conditions = Vec::new();

    for structure in block.body.iter() {
        match structure {
            Structure::Attribute(attr) => match attr.key.as_str() {
                "inputs" => inputs = Some(attr.expr.clone()),
                "outputs" => outputs = Some(attr.expr.clone()),
                other => {
                    tracing::debug!(
                        file = filename,
                        attribute = other,
                        "skipping unknown evaluation attribute"
                    );
                }
            },
            Structure::Block(inner) if inner.identifier.as_str() == "condition" => {
                conditions.push(decode_condition(filename, inner, &eval_type, &name)?);
            }
            Structure::Block(inner) => {
                tracing::debug!(
                    file = filename,
                    block = inner.identifier.as_str(),
                    "skipping unknown evaluation block"
                );
            }
        }
    }

    Ok(RawEvaluation {
        eval_type,
        name,
        inputs,
        conditions,
        outputs,
    })
}

/// condition 블록을 디코딩합니다. `path`와 `value`는 필수 문자열입니다.
fn decode_condition(
    filename: &str,
    block: &Block,
    eval_type: &str,
    eval_name: &str,
) -> Result<Condition, PolicyError> {
    let path = required_string_attr(filename, block, "path", eval_type, eval_name)?;
    let value = required_string_attr(filename, block, "value", eval_type, eval_name)?;
    Ok(Condition { path, value })
}

/// 블록에서 (type, name) 라벨 쌍을 추출합니다.
fn block_labels(filename: &str, block: &Block) -> Result<(String, String), PolicyError> {
    if block.labels.len() != 2 {
        return Err(PolicyError::Decode {
            file: filename.to_owned(),
            reason: format!(
                "{} block requires exactly two labels (type, name), got {}",
                block.identifier.as_str(),
                block.labels.len()
            ),
        });
    }
    Ok((
        block.labels[0].as_str().to_owned(),
        block.labels[1].as_str().to_owned(),
    ))
}

fn ensure_unique(
    filename: &str,
    kind: &str,
    block_type: &str,
    name: &str,
    duplicate: bool,
) -> Result<(), PolicyError> {
    if duplicate {
        return Err(PolicyError::DuplicateBlock {
            file: filename.to_owned(),
            kind: kind.to_owned(),
            block_type: block_type.to_owned(),
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// 선택적 문자열 속성을 읽습니다. 존재하지만 문자열이 아니면 에러입니다.
fn optional_string_attr(
    filename: &str,
    block: &Block,
    key: &str,
) -> Result<Option<String>, PolicyError> {
    for structure in block.body.iter() {
        if let Structure::Attribute(attr) = structure {
            if attr.key.as_str() == key {
                return match &attr.expr {
                    Expression::String(s) => Ok(Some(s.clone())),
                    _ => Err(PolicyError::Decode {
                        file: filename.to_owned(),
                        reason: format!("attribute '{key}' must be a string"),
                    }),
                };
            }
        }
    }
    Ok(None)
}

/// 필수 문자열 속성을 읽습니다.
fn required_string_attr(
    filename: &str,
    block: &Block,
    key: &str,
    eval_type: &str,
    eval_name: &str,
) -> Result<String, PolicyError> {
    optional_string_attr(filename, block, key)?.ok_or_else(|| PolicyError::Decode {
        file: filename.to_owned(),
        reason: format!(
            "condition in evaluation {eval_type}.{eval_name} is missing required attribute '{key}'"
        ),
    })
}

/// (type, name) 쌍들을 type별 객체 안의 name별 참조 문자열로 접습니다.
fn nested_reference_object<'a>(
    kind: &str,
    pairs: impl Iterator<Item = (&'a String, &'a String)>,
) -> Value {
    let mut by_type: Map<String, Value> = Map::new();
    for (block_type, name) in pairs {
        let entry = by_type
            .entry(block_type.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(names) = entry {
            names.insert(
                name.clone(),
                Value::String(format!("{kind}.{block_type}.{name}")),
            );
        }
    }
    Value::Object(by_type)
}

/// `inputs` 표현식을 평가하고 각 참조를 소스 선언 테이블에서 해소합니다.
fn resolve_source_references(
    filename: &str,
    expr: &Expression,
    ctx: &Context,
    raw: &RawPolicy,
) -> Result<Vec<Source>, PolicyError> {
    let refs = evaluate_reference_list(filename, "inputs", expr, ctx)?;
    refs.into_iter()
        .map(|reference| {
            raw.sources
                .iter()
                .find(|s| s.reference() == reference)
                .cloned()
                .ok_or_else(|| PolicyError::UnresolvedReference {
                    file: filename.to_owned(),
                    reference,
                })
        })
        .collect()
}

/// `outputs` 표현식을 평가하고 각 참조를 출력 선언 테이블에서 해소합니다.
fn resolve_output_references(
    filename: &str,
    expr: &Expression,
    ctx: &Context,
    raw: &RawPolicy,
) -> Result<Vec<Output>, PolicyError> {
    let refs = evaluate_reference_list(filename, "outputs", expr, ctx)?;
    refs.into_iter()
        .map(|reference| {
            raw.outputs
                .iter()
                .find(|o| o.reference() == reference)
                .cloned()
                .ok_or_else(|| PolicyError::UnresolvedReference {
                    file: filename.to_owned(),
                    reference,
                })
        })
        .collect()
}

/// 표현식을 평가하여 참조 문자열 리스트를 얻습니다.
///
/// 결과는 문자열의 리스트/튜플이어야 합니다. 선언되지 않은 블록을
/// 가리키는 참조는 컨텍스트에 없으므로 여기서 평가 에러로 잡히며,
/// 에러에는 참조 전체(`kind.type.name`)가 담깁니다.
fn evaluate_reference_list(
    filename: &str,
    attr: &str,
    expr: &Expression,
    ctx: &Context,
) -> Result<Vec<String>, PolicyError> {
    let elements = match expr {
        Expression::Array(elements) => elements,
        other => {
            return Err(PolicyError::Decode {
                file: filename.to_owned(),
                reason: format!("'{attr}' must be a list of references, got {other:?}"),
            });
        }
    };

    let mut refs = Vec::with_capacity(elements.len());
    for element in elements {
        match element.evaluate(ctx) {
            Ok(Value::String(s)) => refs.push(s),
            Ok(other) => {
                return Err(PolicyError::Decode {
                    file: filename.to_owned(),
                    reason: format!("'{attr}' entries must be references, got {other:?}"),
                });
            }
            Err(e) => {
                return Err(PolicyError::UnresolvedReference {
                    file: filename.to_owned(),
                    reference: traversal_text(element).unwrap_or_else(|| e.to_string()),
                });
            }
        }
    }
    Ok(refs)
}

/// `kind.type.name` 형태의 트래버설 표현식을 원문 그대로 복원합니다.
///
/// 평가에 실패한 참조를 에러 메시지에 그대로 싣기 위한 것으로, 다른
/// 형태의 표현식에는 `None`을 반환합니다.
fn traversal_text(expr: &Expression) -> Option<String> {
    let Expression::Traversal(traversal) = expr else {
        return None;
    };
    let Expression::Variable(root) = &traversal.expr else {
        return None;
    };

    let mut parts = vec![root.as_str().to_owned()];
    for operator in &traversal.operators {
        match operator {
            TraversalOperator::GetAttr(ident) => parts.push(ident.as_str().to_owned()),
            _ => return None,
        }
    }
    Some(parts.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY_HCL: &str = r#"
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

    #[test]
    fn decode_happy_path() {
        let policy = decode("test_policy.hcl", POLICY_HCL).unwrap();

        assert_eq!(policy.name, "test_policy.hcl");

        assert_eq!(policy.sources.len(), 1);
        assert_eq!(policy.sources[0].source_type, "aws_cloudtrail");
        assert_eq!(policy.sources[0].name, "account-x");

        assert_eq!(policy.outputs.len(), 1);
        assert_eq!(policy.outputs[0].output_type, "console");
        assert_eq!(policy.outputs[0].name, "log_cloudtrail_user_actions");

        assert_eq!(policy.evaluations.len(), 1);
        let eval = &policy.evaluations[0];
        assert_eq!(eval.eval_type, "aws_cloudtrail");
        assert_eq!(eval.name, "any_action");

        assert_eq!(eval.inputs.len(), 1);
        assert_eq!(eval.inputs[0].source_type, "aws_cloudtrail");
        assert_eq!(eval.inputs[0].name, "account-x");

        assert_eq!(eval.conditions.len(), 1);
        assert_eq!(eval.conditions[0].path, "$.userIdentity.type");
        assert_eq!(eval.conditions[0].value, "IAMUser");

        assert_eq!(eval.outputs.len(), 1);
        assert_eq!(eval.outputs[0].output_type, "console");
        assert_eq!(eval.outputs[0].name, "log_cloudtrail_user_actions");
    }

    #[test]
    fn decode_unknown_source_reference_fails() {
        let input = POLICY_HCL.replace(
            "inputs = [source.aws_cloudtrail.account-x]",
            "inputs = [source.aws_cloudtrail.missing]",
        );
        let err = decode("test_policy.hcl", &input).unwrap_err();
        assert!(matches!(err, PolicyError::UnresolvedReference { .. }));
        assert!(err.to_string().contains("missing"));
        assert!(err.to_string().contains("test_policy.hcl"));
    }

    #[test]
    fn decode_unknown_output_reference_fails() {
        let input = POLICY_HCL.replace(
            "outputs = [output.console.log_cloudtrail_user_actions]",
            "outputs = [output.console.nonexistent]",
        );
        let err = decode("test_policy.hcl", &input).unwrap_err();
        assert!(matches!(err, PolicyError::UnresolvedReference { .. }));
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn decode_empty_reference_lists() {
        let input = r#"
evaluation "aws_cloudtrail" "noop" {
  inputs  = []
  outputs = []
}
"#;
        let policy = decode("empty.hcl", input).unwrap();
        assert_eq!(policy.evaluations.len(), 1);
        assert!(policy.evaluations[0].inputs.is_empty());
        assert!(policy.evaluations[0].outputs.is_empty());
    }

    #[test]
    fn decode_missing_reference_attributes() {
        let input = r#"
evaluation "aws_cloudtrail" "bare" {
  condition {
    path  = "$.a"
    value = "b"
  }
}
"#;
        let policy = decode("bare.hcl", input).unwrap();
        assert!(policy.evaluations[0].inputs.is_empty());
        assert!(policy.evaluations[0].outputs.is_empty());
        assert_eq!(policy.evaluations[0].conditions.len(), 1);
    }

    #[test]
    fn decode_version_attribute() {
        let input = r#"
source "aws_cloudtrail" "account-x" {
  version = "v0.2.0"
}
"#;
        let policy = decode("versioned.hcl", input).unwrap();
        assert_eq!(policy.sources[0].version.as_deref(), Some("v0.2.0"));
    }

    #[test]
    fn decode_syntax_error_names_file() {
        let err = decode("broken.hcl", "source \"a\" {").unwrap_err();
        assert!(matches!(err, PolicyError::Parse { .. }));
        assert!(err.to_string().contains("broken.hcl"));
    }

    #[test]
    fn decode_wrong_label_count_fails() {
        let err = decode("labels.hcl", r#"source "only-one" {}"#).unwrap_err();
        assert!(matches!(err, PolicyError::Decode { .. }));
        assert!(err.to_string().contains("two labels"));
    }

    #[test]
    fn decode_non_string_version_fails() {
        let input = r#"
source "aws_cloudtrail" "account-x" {
  version = 2
}
"#;
        let err = decode("badver.hcl", input).unwrap_err();
        assert!(matches!(err, PolicyError::Decode { .. }));
    }

    #[test]
    fn decode_condition_missing_value_fails() {
        let input = r#"
evaluation "aws_cloudtrail" "incomplete" {
  condition {
    path = "$.a"
  }
}
"#;
        let err = decode("cond.hcl", input).unwrap_err();
        assert!(err.to_string().contains("value"));
    }

    #[test]
    fn decode_duplicate_source_fails() {
        let input = r#"
source "aws_cloudtrail" "account-x" {}
source "aws_cloudtrail" "account-x" {}
"#;
        let err = decode("dup.hcl", input).unwrap_err();
        assert!(matches!(err, PolicyError::DuplicateBlock { .. }));
    }

    #[test]
    fn decode_same_pair_across_kinds_is_allowed() {
        let input = r#"
source "console" "main" {}
output "console" "main" {}
"#;
        let policy = decode("pair.hcl", input).unwrap();
        assert_eq!(policy.sources.len(), 1);
        assert_eq!(policy.outputs.len(), 1);
    }

    #[test]
    fn decode_ignores_destination_blocks() {
        let input = r#"
source "aws_cloudtrail" "account-x" {}
destination "s3" "archive" {}
"#;
        let policy = decode("dest.hcl", input).unwrap();
        assert_eq!(policy.sources.len(), 1);
        assert!(policy.outputs.is_empty());
    }

    #[test]
    fn decode_is_idempotent() {
        let first = decode("test_policy.hcl", POLICY_HCL).unwrap();
        let second = decode("test_policy.hcl", POLICY_HCL).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn decode_preserves_declaration_order() {
        let input = r#"
source "t" "a" {}
source "t" "b" {}
source "t" "c" {}
"#;
        let policy = decode("order.hcl", input).unwrap();
        let names: Vec<&str> = policy.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
