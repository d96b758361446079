use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dbc_core::parser::parse_expression;
use dbc_core::{Ambient, Contract, ContractSpec, EnforcementMode, Environment, ExpressionEvaluator, Functions, Value};

const BLOCK: &str = "
    pre:
      - isinstance(x, int) and isinstance(y, int)
      - 0 <= x < 1000
    post:
      - RETURN == x + y
    invariant:
      - len(items)
";

fn bench_parse_block(c: &mut Criterion) {
    c.bench_function("parse_contract_block", |b| {
        b.iter(|| {
            let _ = ContractSpec::parse(black_box(BLOCK)).unwrap();
        });
    });
}

fn bench_evaluate(c: &mut Criterion) {
    let expr = parse_expression("x * x + y * y < 1.000000001 and len(items) > 2").unwrap();
    let ambient = Ambient::new().with_value("items", vec![1, 2, 3]);
    let mut env = Environment::new(&ambient);
    env.bind("x", Value::Float(0.5));
    env.bind("y", Value::Float(0.5));
    let functions = Functions::new();
    let evaluator = ExpressionEvaluator::new(&functions);
    c.bench_function("evaluate_expression", |b| {
        b.iter(|| {
            let _ = evaluator.check(black_box(&expr), &env).unwrap();
        });
    });
}

fn bench_contracted_call(c: &mut Criterion) {
    let add = Contract::parse(BLOCK)
        .unwrap()
        .with_ambient(Ambient::new().with_value("items", vec![1, 2, 3]))
        .with_mode(EnforcementMode::Full)
        .wrap("add", &["x", "y"], |(x, y): (i64, i64)| x + y)
        .unwrap();
    c.bench_function("contracted_call", |b| {
        b.iter(|| {
            let _ = add.call(black_box((3, 5))).unwrap();
        });
    });
}

criterion_group!(benches, bench_parse_block, bench_evaluate, bench_contracted_call);
criterion_main!(benches);
