use std::hint::black_box;
use bencher::{TestCase, TestFile};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use micro_h1::codec::{MessageParser, PayloadDecoder};
use micro_h1::config::MessageConstraints;
use micro_h1::io::CharCodingConfig;
use micro_h1::protocol::{PayloadItem, RequestHead};
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

static SMALL_HEADER: TestFile = TestFile::new("request/get_small.txt", include_str!("../resources/request/get_small.txt"));
static LARGE_HEADER: TestFile = TestFile::new("request/get_large.txt", include_str!("../resources/request/get_large.txt"));
static CHUNKED_BODY: TestFile = TestFile::new("body/chunked.txt", include_str!("../resources/body/chunked.txt"));

fn header_cases() -> Vec<TestCase> {
    vec![TestCase::small("small_header_parser", SMALL_HEADER), TestCase::normal("large_header_parser", LARGE_HEADER)]
}

fn benchmark_message_parser(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("message_parser");

    for case in header_cases() {
        group.throughput(case.throughput());
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            let mut parser = MessageParser::<RequestHead>::new(MessageConstraints::default(), CharCodingConfig::default());
            b.iter_batched_ref(
                || BytesMut::from(case.file().content()),
                |bytes_mut| {
                    let head = parser
                        .decode(bytes_mut)
                        .unwrap_or_else(|e| panic!("{} is not a valid request head: {e}", case.file().path()))
                        .unwrap();
                    black_box(head);
                },
                case.batch_size(),
            );
        });
    }

    group.finish();
}

fn benchmark_chunked_decoder(criterion: &mut Criterion) {
    let case = TestCase::large("chunked_body_decoder", CHUNKED_BODY);
    let mut group = criterion.benchmark_group("payload_decoder");
    group.throughput(case.throughput());

    group.bench_function(case.name(), |b| {
        b.iter_batched_ref(
            || {
                let decoder = PayloadDecoder::chunked(MessageConstraints::default(), CharCodingConfig::default());
                (decoder, BytesMut::from(case.file().content()))
            },
            |(decoder, bytes_mut)| {
                let mut received = 0;
                while let Some(item) = decoder
                    .decode(bytes_mut)
                    .unwrap_or_else(|e| panic!("{} is not a valid chunked body: {e}", case.file().path()))
                {
                    match item {
                        PayloadItem::Chunk(bytes) => received += bytes.len(),
                        PayloadItem::Eof => break,
                    }
                }
                black_box(received);
            },
            case.batch_size(),
        );
    });

    group.finish();
}

criterion_group!(decoder, benchmark_message_parser, benchmark_chunked_decoder);
criterion_main!(decoder);
