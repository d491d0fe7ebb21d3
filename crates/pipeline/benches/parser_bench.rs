//! 레코드 파서 벤치마크
//!
//! JSON, 레거시, message 2차 추출 경로의 처리량을 측정합니다.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use libtrail_pipeline::keypair::{JsonDecoder, KeyPairDecoder, LegacyDecoder, RecordParser};

/// JSON 라이브러리 로딩 이벤트
const JSON_LIBRARY_LOAD: &str = r#"{"jarPath":"/opt/app/lib/log4j-core-2.14.1.jar","loadMethod":"URLClassLoader","sha256":"a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90"}"#;

/// JSON 긴 이벤트 (중첩 값 포함)
const JSON_LONG: &str = r#"{"jarPath":"/opt/app/lib/jackson-databind-2.13.4.2.jar","loadMethod":"AppClassLoader","sha256":"ffeeddccbbaa99887766554433221100ffeeddccbbaa99887766554433221100","manifest":{"Implementation-Title":"jackson-databind","Implementation-Vendor":"FasterXML"},"packages":["com.fasterxml.jackson.databind","com.fasterxml.jackson.databind.node"],"size":1591312,"signed":false,"thread":"main"}"#;

/// 레거시 구분자 이벤트
const LEGACY_LIBRARY_LOAD: &str = "{jarPath=/opt/app/lib/commons-text-1.9.jar, loadMethod=URLClassLoader, sha256=00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff}";

/// message 내장 key-value
const JSON_MESSAGE: &str =
    r#"{"user":"alice","message":"Environment Setting: JAVA_OPTS=-Xmx2g -Dlog4j2.formatMsgNoLookups"}"#;

fn bench_decoders(c: &mut Criterion) {
    let mut group = c.benchmark_group("decoders");
    group.throughput(Throughput::Elements(1));

    group.bench_function("json_short", |b| {
        b.iter(|| JsonDecoder.decode(black_box(JSON_LIBRARY_LOAD)).unwrap())
    });
    group.bench_function("json_long", |b| {
        b.iter(|| JsonDecoder.decode(black_box(JSON_LONG)).unwrap())
    });
    group.bench_function("legacy", |b| {
        b.iter(|| LegacyDecoder.decode(black_box(LEGACY_LIBRARY_LOAD)).unwrap())
    });

    group.finish();
}

fn bench_router(c: &mut Criterion) {
    let parser = RecordParser::with_defaults();
    let mut group = c.benchmark_group("record_parser");

    group.throughput(Throughput::Elements(1));
    group.bench_function("json", |b| b.iter(|| parser.parse(black_box(JSON_LIBRARY_LOAD))));
    // JSON 실패 후 레거시 fallback
    group.bench_function("legacy_fallback", |b| {
        b.iter(|| parser.parse(black_box(LEGACY_LIBRARY_LOAD)))
    });
    group.bench_function("message_extraction", |b| {
        b.iter(|| parser.parse(black_box(JSON_MESSAGE)))
    });

    group.throughput(Throughput::Elements(1000));
    group.bench_function("throughput_1000_mixed", |b| {
        b.iter(|| {
            for i in 0..1000 {
                let payload = if i % 2 == 0 {
                    JSON_LIBRARY_LOAD
                } else {
                    LEGACY_LIBRARY_LOAD
                };
                black_box(parser.parse(black_box(payload)));
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decoders, bench_router);
criterion_main!(benches);
