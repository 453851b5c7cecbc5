use divan::{black_box, Bencher};
use formgram::{lint::lint_grammar, parse::parse_binary, reader::SliceReader};

const GRAMMAR: &str = "
format: record_stream
endian: little
framing: { repeat: until_eof }
types:
  R:
    fields:
      - { name: t, type: u16 }
      - { name: n, type: u8 }
      - { name: p, type: bytes, length: n }
record:
  use: R
";

fn main() {
    divan::main();
}

fn sample_input(records: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for _ in 0..records {
        data.extend_from_slice(&[0x01, 0x00, 0x03, b'A', b'B', b'C']);
    }
    data
}

#[divan::bench(args = [16, 256, 4096])]
fn parse_record_stream(bencher: Bencher, records: usize) {
    let (grammar, errors, _) = lint_grammar(GRAMMAR);
    assert!(errors.is_empty());
    let grammar = grammar.unwrap();
    let input = sample_input(records);
    bencher.bench_local(|| {
        let reader = SliceReader::new(&input);
        black_box(parse_binary(&grammar, &reader, 0, None, None));
    });
}

#[divan::bench]
fn lint_cold(bencher: Bencher) {
    bencher.bench_local(|| black_box(lint_grammar(GRAMMAR)));
}
