//! 정책 디코더 벤치마크

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use kytheron_policy::decode;

const SMALL_POLICY: &str = r#"
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

fn build_large_policy(sources: usize) -> String {
    let mut doc = String::new();
    for i in 0..sources {
        doc.push_str(&format!("source \"aws_cloudtrail\" \"account-{i}\" {{}}\n"));
    }
    doc.push_str("output \"console\" \"sink\" {}\n");
    for i in 0..sources {
        doc.push_str(&format!(
            r#"
evaluation "aws_cloudtrail" "eval-{i}" {{
  inputs = [source.aws_cloudtrail.account-{i}]

  condition {{
    path  = "$.eventName"
    value = "ConsoleLogin"
  }}

  outputs = [output.console.sink]
}}
"#
        ));
    }
    doc
}

fn bench_decode(c: &mut Criterion) {
    c.bench_function("decode_small_policy", |b| {
        b.iter(|| decode("bench.hcl", black_box(SMALL_POLICY)).unwrap());
    });

    let large = build_large_policy(100);
    c.bench_function("decode_policy_100_sources", |b| {
        b.iter(|| decode("bench.hcl", black_box(&large)).unwrap());
    });
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
