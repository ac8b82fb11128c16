//! Field arrays: index paths on form rows

use trellis_common::Signal;
use trellis_directives::MountContext;
use trellis_evaluator::{Document, DomHandle, Environment, Markup, NodeId, Value};

fn line(id: i32, sku: &str, notes: &[&str]) -> Value {
    Value::object([
        ("id", Value::Number(id as f64)),
        ("sku", Value::string(sku)),
        (
            "notes",
            Value::array(notes.iter().map(|text| Value::object([("text", Value::string(text))]))),
        ),
    ])
}

fn order(lines: Vec<Value>) -> Value {
    Value::object([("lines", Value::array(lines))])
}

fn order_form() -> Markup {
    Markup::element("fieldset")
        .attr("field-array", "order.lines")
        .attr("as", "line")
        .attr("key", "id")
        .child(Markup::element("input").attr("field", "sku"))
        .child(Markup::element("span").attr("field-error", "sku"))
        .child(
            Markup::element("div")
                .attr("field-array", "notes")
                .attr("key", "$index")
                .child(Markup::element("input").attr("field", "text")),
        )
}

fn mount(form: Markup, env: &Environment) -> anyhow::Result<(DomHandle, NodeId)> {
    let dom = Document::new("checkout", "/cart").into_handle();
    let container = {
        let mut doc = dom.borrow_mut();
        let root = doc.root();
        doc.append_markup(root, &form)
    };
    let root = dom.borrow().root();
    MountContext::new(dom.clone()).mount(root, env)?;
    Ok((dom, container))
}

/// `(name, value)` of every named input under `root`, in document order
fn inputs(dom: &DomHandle, root: NodeId) -> Vec<(String, String)> {
    let doc = dom.borrow();
    let fields = doc
        .descendants(root)
        .into_iter()
        .filter(|node| doc.tag(*node) == Some("input"))
        .map(|node| {
            (
                doc.attribute(node, "name").unwrap_or_default().to_string(),
                doc.attribute(node, "value").unwrap_or_default().to_string(),
            )
        })
        .collect();
    fields
}

fn attribute_values(dom: &DomHandle, root: NodeId, name: &str) -> Vec<String> {
    let doc = dom.borrow();
    let values = doc
        .descendants(root)
        .into_iter()
        .filter_map(|node| doc.attribute(node, name).map(str::to_string))
        .collect();
    values
}

#[test]
fn test_rows_get_index_paths() -> anyhow::Result<()> {
    let state = Signal::new(order(vec![line(1, "A-1", &["gift"]), line(2, "B-2", &[])]));
    let env: Environment = [("order", Value::Signal(state.clone()))].into_iter().collect();
    let (dom, form) = mount(order_form(), &env)?;

    assert_eq!(
        inputs(&dom, form),
        vec![
            ("order.lines.0.sku".to_string(), "A-1".to_string()),
            ("order.lines.0.notes.0.text".to_string(), "gift".to_string()),
            ("order.lines.1.sku".to_string(), "B-2".to_string()),
        ]
    );
    assert_eq!(
        attribute_values(&dom, form, "id"),
        vec!["order.lines.0.sku-error", "order.lines.1.sku-error"]
    );
    assert_eq!(
        attribute_values(&dom, form, "data-array-path"),
        vec!["order.lines.0.notes", "order.lines.1.notes"]
    );
    Ok(())
}

#[test]
fn test_reorder_rewrites_paths_in_place() -> anyhow::Result<()> {
    let (first, second) = (line(1, "A-1", &["gift"]), line(2, "B-2", &["rush"]));
    let state = Signal::new(order(vec![first.clone(), second.clone()]));
    let env: Environment = [("order", Value::Signal(state.clone()))].into_iter().collect();
    let (dom, form) = mount(order_form(), &env)?;

    let sku_input = |dom: &DomHandle, sku: &str| -> Option<NodeId> {
        let doc = dom.borrow();
        let found = doc
            .descendants(form)
            .into_iter()
            .find(|node| doc.attribute(*node, "value") == Some(sku));
        found
    };
    let before = sku_input(&dom, "B-2");
    dom.borrow_mut().reset_stats();

    state.set(order(vec![second, first]));

    assert_eq!(sku_input(&dom, "B-2"), before);
    assert_eq!(dom.borrow().stats().moves, 3);
    assert_eq!(
        inputs(&dom, form),
        vec![
            ("order.lines.0.sku".to_string(), "B-2".to_string()),
            ("order.lines.0.notes.0.text".to_string(), "rush".to_string()),
            ("order.lines.1.sku".to_string(), "A-1".to_string()),
            ("order.lines.1.notes.0.text".to_string(), "gift".to_string()),
        ]
    );
    assert_eq!(
        attribute_values(&dom, form, "id"),
        vec!["order.lines.0.sku-error", "order.lines.1.sku-error"]
    );
    Ok(())
}

#[test]
fn test_removal_shifts_later_paths() -> anyhow::Result<()> {
    let lines = vec![line(1, "A", &[]), line(2, "B", &[]), line(3, "C", &[])];
    let state = Signal::new(order(lines.clone()));
    let env: Environment = [("order", Value::Signal(state.clone()))].into_iter().collect();
    let (dom, form) = mount(order_form(), &env)?;

    state.set(order(vec![lines[0].clone(), lines[2].clone()]));

    assert_eq!(
        inputs(&dom, form),
        vec![
            ("order.lines.0.sku".to_string(), "A".to_string()),
            ("order.lines.1.sku".to_string(), "C".to_string()),
        ]
    );
    Ok(())
}

#[test]
fn test_reactive_field_values() -> anyhow::Result<()> {
    let sku = Signal::new(Value::string("draft"));
    let row = Value::object([
        ("id", Value::Number(1.0)),
        ("sku", Value::Signal(sku.clone())),
    ]);
    let env: Environment = [("lines", Value::array([row]))].into_iter().collect();
    let form = Markup::element("fieldset")
        .attr("field-array", "lines")
        .child(Markup::element("input").attr("field", "sku"));
    let (dom, container) = mount(form, &env)?;

    assert_eq!(
        inputs(&dom, container),
        vec![("lines.0.sku".to_string(), "draft".to_string())]
    );
    sku.set(Value::string("final"));
    assert_eq!(
        inputs(&dom, container),
        vec![("lines.0.sku".to_string(), "final".to_string())]
    );
    Ok(())
}

#[test]
fn test_row_bindings_in_text() -> anyhow::Result<()> {
    let env: Environment = [(
        "items",
        Value::array([
            Value::object([("id", Value::Number(4.0)), ("label", Value::string("four"))]),
            Value::object([("id", Value::Number(5.0)), ("label", Value::string("five"))]),
        ]),
    )]
    .into_iter()
    .collect();
    let form = Markup::element("ol")
        .attr("field-array", "items")
        .attr("as", "entry")
        .child(Markup::element("li").child(Markup::text("{$path}={entry.label}")));
    let (dom, container) = mount(form, &env)?;

    let doc = dom.borrow();
    assert_eq!(doc.text_content(container), "items.0=fouritems.1=five");
    Ok(())
}
