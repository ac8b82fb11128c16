use criterion::{black_box, criterion_group, criterion_main, Criterion};
use trellis_common::Scope;
use trellis_evaluator::{bind_interpolations, evaluate, plan, Document, Environment, Markup, Value};
use trellis_parser::parse;

fn evaluate_expressions(c: &mut Criterion) {
    let env: Environment = [
        (
            "user",
            Value::object([("profile", Value::object([("name", Value::string("Ada"))]))]),
        ),
        ("count", Value::Number(3.0)),
        ("price", Value::Number(2.5)),
    ]
    .into_iter()
    .collect();

    let chain = parse("user.profile.name").unwrap();
    let mixed =
        parse("user?.profile?.name ?? (count > 0 ? count * price + ' total' : 'none')").unwrap();

    c.bench_function("evaluate_member_chain", |b| {
        b.iter(|| evaluate(black_box(&chain), &env))
    });

    c.bench_function("evaluate_mixed_expression", |b| {
        b.iter(|| evaluate(black_box(&mixed), &env))
    });
}

fn row_markup() -> Markup {
    Markup::element("li")
        .attr("class", "row {item.kind}")
        .child(Markup::element("strong").child(Markup::text("{item.title}")))
        .child(Markup::text(" by {item.author} ({item.year})"))
}

fn plan_reuse(c: &mut Criterion) {
    let mut doc = Document::new("bench", "/");
    let template = doc.instantiate(&row_markup());
    let clone = doc.deep_clone(template);

    c.bench_function("plan_build", |b| {
        b.iter(|| plan::build(black_box(&doc), template))
    });

    c.bench_function("plan_fingerprint", |b| {
        b.iter(|| plan::fingerprint(black_box(&doc), template))
    });

    plan::plan_for(&doc, template);
    c.bench_function("plan_cached_lookup", |b| {
        b.iter(|| plan::plan_for(black_box(&doc), clone))
    });
}

fn bind_rows(c: &mut Criterion) {
    let env: Environment = [(
        "item",
        Value::object([
            ("kind", Value::string("book")),
            ("title", Value::string("Dune")),
            ("author", Value::string("Herbert")),
            ("year", Value::Number(1965.0)),
        ]),
    )]
    .into_iter()
    .collect();

    c.bench_function("bind_static_row", |b| {
        b.iter_with_setup(
            || {
                let dom = Document::new("bench", "/").into_handle();
                let row = dom.borrow_mut().instantiate(&row_markup());
                (dom, row)
            },
            |(dom, row)| bind_interpolations(&dom, row, &env, &Scope::new()),
        )
    });
}

criterion_group!(benches, evaluate_expressions, plan_reuse, bind_rows);
criterion_main!(benches);
