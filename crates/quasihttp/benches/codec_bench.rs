use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio_util::codec::{Decoder, Encoder};

use quasi_http::codec::body::{TlvDecoder, TlvEncoder};
use quasi_http::codec::framing::{decode_length, decode_tag, encode_tag_length, TAG_BODY};
use quasi_http::codec::{decode_lead_chunk, encode_lead_chunk, LeadKind};
use quasi_http::protocol::{LeadChunk, PayloadItem, DEFAULT_PROTOCOL_VERSION};

fn sample_lead() -> LeadChunk {
    let mut lead = LeadChunk {
        method: Some("POST".into()),
        target: Some("/api/v1/items/12345".into()),
        version: Some(DEFAULT_PROTOCOL_VERSION.into()),
        content_length: 2048,
        ..Default::default()
    };
    lead.headers.insert("accept".into(), vec!["text/plain".into(), "text/csv".into()]);
    lead.headers.insert("content-type".into(), vec!["application/octet-stream".into()]);
    lead.headers.insert("x-request-id".into(), vec!["e5b2c3d4-0000-4f5a-9c3d-aaaa5555".into()]);
    lead.headers.insert("x-forwarded-for".into(), vec!["10.0.0.1".into(), "10.0.0.2".into()]);
    lead
}

fn bench_framing(c: &mut Criterion) {
    c.bench_function("encode_tag_length", |b| {
        b.iter(|| encode_tag_length(black_box(TAG_BODY), black_box(8192)).unwrap())
    });

    let header = encode_tag_length(TAG_BODY, 8192).unwrap();
    c.bench_function("decode_tag_length", |b| {
        b.iter(|| {
            let tag = decode_tag(black_box(&header[..4])).unwrap();
            let length = decode_length(black_box(&header[4..])).unwrap();
            (tag, length)
        })
    });
}

fn bench_lead_chunk(c: &mut Criterion) {
    let lead = sample_lead();
    c.bench_function("encode_lead_chunk", |b| {
        b.iter(|| encode_lead_chunk(black_box(&lead), LeadKind::Request, 8192).unwrap())
    });

    let encoded = encode_lead_chunk(&lead, LeadKind::Request, 8192).unwrap();
    c.bench_function("decode_lead_chunk", |b| {
        b.iter(|| decode_lead_chunk(black_box(&encoded), LeadKind::Request).unwrap())
    });
}

fn bench_body_records(c: &mut Criterion) {
    let payload = vec![0xabu8; 8 * 1024];

    c.bench_function("tlv_encode_8k", |b| {
        b.iter(|| {
            let mut encoder = TlvEncoder::new(TAG_BODY);
            let mut dst = BytesMut::with_capacity(payload.len() + 16);
            encoder
                .encode(PayloadItem::Chunk(bytes::Bytes::from(payload.clone())), &mut dst)
                .unwrap();
            encoder.encode(PayloadItem::Eof, &mut dst).unwrap();
            dst
        })
    });

    let mut encoder = TlvEncoder::new(TAG_BODY);
    let mut wire = BytesMut::new();
    encoder.encode(PayloadItem::Chunk(bytes::Bytes::from(payload.clone())), &mut wire).unwrap();
    encoder.encode(PayloadItem::Eof, &mut wire).unwrap();
    let wire = wire.freeze();

    c.bench_function("tlv_decode_8k", |b| {
        b.iter(|| {
            let mut decoder = TlvDecoder::new(TAG_BODY, 64 * 1024);
            let mut src = BytesMut::from(&wire[..]);
            let mut total = 0usize;
            while let Some(item) = decoder.decode(&mut src).unwrap() {
                match item {
                    PayloadItem::Chunk(bytes) => total += bytes.len(),
                    PayloadItem::Eof => break,
                }
            }
            total
        })
    });
}

criterion_group!(benches, bench_framing, bench_lead_chunk, bench_body_records);
criterion_main!(benches);
