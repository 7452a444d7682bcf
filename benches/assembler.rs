use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use fileserv::assembler::RequestAssembler;

fn simple_get() -> Vec<u8> {
    b"GET /static/app.css HTTP/1.1\r\n\
      Host: bench.local\r\n\
      User-Agent: bench/1.0\r\n\
      Accept: */*\r\n\
      Connection: keep-alive\r\n\r\n"
        .to_vec()
}

fn content_length_post(body_len: usize) -> Vec<u8> {
    let body = vec![b'x'; body_len];
    let mut wire = format!(
        "POST /upload HTTP/1.1\r\nHost: bench.local\r\nContent-Length: {}\r\n\r\n",
        body_len
    )
    .into_bytes();
    wire.extend_from_slice(&body);
    wire
}

fn chunked_post(chunk_len: usize, chunks: usize) -> Vec<u8> {
    let mut wire =
        b"POST /upload HTTP/1.1\r\nHost: bench.local\r\nTransfer-Encoding: chunked\r\n\r\n"
            .to_vec();
    let data = vec![b'x'; chunk_len];
    for _ in 0..chunks {
        wire.extend_from_slice(format!("{:x}\r\n", chunk_len).as_bytes());
        wire.extend_from_slice(&data);
        wire.extend_from_slice(b"\r\n");
    }
    wire.extend_from_slice(b"0\r\n\r\n");
    wire
}

fn bench_single_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_one_call");

    let get = simple_get();
    group.throughput(Throughput::Bytes(get.len() as u64));
    group.bench_function("get_no_body", |b| {
        b.iter(|| {
            let mut asm = RequestAssembler::new();
            assert!(asm.append(black_box(&get)).unwrap());
            asm.take_request().unwrap()
        })
    });

    let post = content_length_post(16 * 1024);
    group.throughput(Throughput::Bytes(post.len() as u64));
    group.bench_function("post_16k_content_length", |b| {
        b.iter(|| {
            let mut asm = RequestAssembler::new();
            assert!(asm.append(black_box(&post)).unwrap());
            asm.take_request().unwrap()
        })
    });

    let chunked = chunked_post(1024, 16);
    group.throughput(Throughput::Bytes(chunked.len() as u64));
    group.bench_function("post_16k_chunked", |b| {
        b.iter(|| {
            let mut asm = RequestAssembler::new();
            assert!(asm.append(black_box(&chunked)).unwrap());
            asm.take_request().unwrap()
        })
    });

    group.finish();
}

fn bench_fragmented_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble_fragmented");

    let post = content_length_post(16 * 1024);
    group.throughput(Throughput::Bytes(post.len() as u64));
    group.bench_function("post_16k_in_512b_segments", |b| {
        b.iter(|| {
            let mut asm = RequestAssembler::new();
            let mut done = false;
            for segment in post.chunks(512) {
                done = asm.append(black_box(segment)).unwrap();
            }
            assert!(done);
            asm.take_request().unwrap()
        })
    });

    let chunked = chunked_post(1024, 16);
    group.throughput(Throughput::Bytes(chunked.len() as u64));
    group.bench_function("chunked_16k_in_512b_segments", |b| {
        b.iter(|| {
            let mut asm = RequestAssembler::new();
            for segment in chunked.chunks(512) {
                asm.append(black_box(segment)).unwrap();
            }
            assert!(asm.is_complete());
            asm.take_request().unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_single_append, bench_fragmented_append);
criterion_main!(benches);
