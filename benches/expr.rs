use divan::{black_box, Bencher};
use formgram::expr::{eval, Context};

fn main() {
    divan::main();
}

const EXPRESSIONS: &[&str] = &["1 + 2", "header_len - 4", "(payload_size + 3) * 2 / header_len"];

#[divan::bench(args = EXPRESSIONS)]
fn eval_expression(bencher: Bencher, text: &str) {
    let mut context = Context::new();
    context.insert("header_len".to_owned(), 12);
    context.insert("payload_size".to_owned(), 48);
    bencher.bench_local(|| black_box(eval(text, &context)));
}
