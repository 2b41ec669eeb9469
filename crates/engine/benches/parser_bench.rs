//! 로그 파서 벤치마크
//!
//! 지시자 파서와 정규식 파서의 라인 처리량을 측정합니다.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use logwarden_engine::parser::FormatResolver;

/// combined 형식 표준 라인
const COMBINED_LINE: &str = r#"203.0.113.7 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326 "http://www.example.com/start.html" "Mozilla/4.08 [en] (Win98; I ;Nav)""#;

/// common 형식 짧은 라인
const COMMON_LINE: &str =
    r#"127.0.0.1 - - [25/Dec/1995:10:00:00 +0000] "GET /index.html HTTP/1.0" 404 -"#;

/// 매칭되지 않는 라인 (실패 경로)
const GARBAGE_LINE: &str = "this is not an access log line at all, just some text";

/// combined와 동등한 커스텀 정규식
const COMBINED_REGEX: &str = r#"(?P<remote_host>\S+) (?P<remote_logname>\S+) (?P<remote_user>\S+) \[(?P<timestamp>[^\]]+)\] "(?P<request_line>[^"]*)" (?P<status_code>\d+) (?P<response_size>\S+) "(?P<referer>[^"]*)" "(?P<user_agent>[^"]*)""#;

fn bench_directive_parser(c: &mut Criterion) {
    let mut group = c.benchmark_group("directive_parser");
    let parser = FormatResolver::build("combined").unwrap();

    for (name, line) in [("combined", COMBINED_LINE), ("garbage", GARBAGE_LINE)] {
        group.throughput(Throughput::Bytes(line.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), line, |b, line| {
            b.iter(|| {
                let _ = parser.parse_line(black_box(line));
            });
        });
    }
    group.finish();
}

fn bench_common_format(c: &mut Criterion) {
    let parser = FormatResolver::build("common").unwrap();
    c.bench_function("common_parser/short_line", |b| {
        b.iter(|| {
            let _ = parser.parse_line(black_box(COMMON_LINE));
        });
    });
}

fn bench_regex_parser(c: &mut Criterion) {
    let parser = FormatResolver::build(COMBINED_REGEX).unwrap();
    c.bench_function("regex_parser/combined_line", |b| {
        b.iter(|| {
            let _ = parser.parse_line(black_box(COMBINED_LINE));
        });
    });
}

fn bench_parser_construction(c: &mut Criterion) {
    c.bench_function("format_resolver/build_combined", |b| {
        b.iter(|| {
            let _ = FormatResolver::build(black_box("combined"));
        });
    });
}

criterion_group!(
    benches,
    bench_directive_parser,
    bench_common_format,
    bench_regex_parser,
    bench_parser_construction
);
criterion_main!(benches);
