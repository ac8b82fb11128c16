/// Binding interpolation points to environments
use crate::*;
use trellis_common::{diagnostics_of, reset_diagnostics, DiagnosticKind, Scope, Signal};

fn mount_text(doc: &DomHandle, markup: Markup) -> NodeId {
    let mut doc = doc.borrow_mut();
    let root = doc.root();
    doc.append_markup(root, &markup)
}

#[test]
fn test_missing_identifier_renders_raw_token() {
    reset_diagnostics();
    let dom = Document::new("doc", "/").into_handle();
    let node = mount_text(&dom, Markup::element("p").child(Markup::text("{count}")));

    let binding = bind_interpolations(&dom, node, &Environment::new(), &Scope::new());
    assert_eq!(binding.static_bindings, 1);
    assert_eq!(dom.borrow().text_content(node), "{count}");

    let warnings = diagnostics_of(DiagnosticKind::MissingIdentifier);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].key.ends_with(":count"));
}

#[test]
fn test_reactive_text_follows_signal() {
    let dom = Document::new("doc", "/").into_handle();
    let node = mount_text(
        &dom,
        Markup::element("p").child(Markup::text("{name} has {count} items")),
    );
    let count = Signal::new(Value::Number(1.0));
    let env: Environment = [
        ("name", Value::string("Ada")),
        ("count", Value::Signal(count.clone())),
    ]
    .into_iter()
    .collect();

    let binding = bind_interpolations(&dom, node, &env, &Scope::new());
    assert_eq!(binding.reactive_bindings, 1);
    assert_eq!(dom.borrow().text_content(node), "Ada has 1 items");

    count.set(Value::Number(5.0));
    assert_eq!(dom.borrow().text_content(node), "Ada has 5 items");
}

#[test]
fn test_static_binding_creates_no_subscription() {
    let dom = Document::new("doc", "/").into_handle();
    let node = mount_text(&dom, Markup::element("p").child(Markup::text("{title}")));
    let other = Signal::new(Value::Null);
    let env: Environment = [("title", Value::string("Hi")), ("other", Value::Signal(other.clone()))]
        .into_iter()
        .collect();

    let binding = bind_interpolations(&dom, node, &env, &Scope::new());
    assert_eq!(binding.reactive_bindings, 0);
    assert_eq!(binding.static_bindings, 1);
    assert_eq!(other.subscriber_count(), 0);
    assert_eq!(dom.borrow().text_content(node), "Hi");
}

#[test]
fn test_attribute_interpolation() {
    let dom = Document::new("doc", "/").into_handle();
    let node = mount_text(
        &dom,
        Markup::element("a").attr("href", "/users/{user.id}").attr("class", "link"),
    );
    let user = Signal::new(Value::object([("id", Value::Number(7.0))]));
    let env: Environment = [("user", Value::Signal(user.clone()))].into_iter().collect();

    bind_interpolations(&dom, node, &env, &Scope::new());
    assert_eq!(dom.borrow().attribute(node, "href"), Some("/users/7"));

    user.set(Value::object([("id", Value::Number(9.0))]));
    assert_eq!(dom.borrow().attribute(node, "href"), Some("/users/9"));
    assert_eq!(dom.borrow().attribute(node, "class"), Some("link"));
}

#[test]
fn test_disposed_scope_stops_updates() {
    let dom = Document::new("doc", "/").into_handle();
    let node = mount_text(&dom, Markup::element("p").child(Markup::text("{count}")));
    let count = Signal::new(Value::Number(1.0));
    let env: Environment = [("count", Value::Signal(count.clone()))].into_iter().collect();
    let scope = Scope::new();

    bind_interpolations(&dom, node, &env, &scope);
    scope.dispose();
    count.set(Value::Number(2.0));
    assert_eq!(dom.borrow().text_content(node), "1");
    assert_eq!(count.subscriber_count(), 0);
}

#[test]
fn test_bound_root_is_skipped_by_outer_binding() {
    let dom = Document::new("doc", "/").into_handle();
    let outer = mount_text(
        &dom,
        Markup::element("div")
            .child(Markup::text("{a}"))
            .child(Markup::element("p").child(Markup::text("{b}"))),
    );
    let inner = dom.borrow().children(outer)[1];
    let inner_env: Environment = [("b", Value::string("inner"))].into_iter().collect();
    bind_interpolations(&dom, inner, &inner_env, &Scope::new());

    let outer_env: Environment = [("a", Value::string("outer"))].into_iter().collect();
    let binding = bind_interpolations(&dom, outer, &outer_env, &Scope::new());
    assert_eq!(binding.plan.entries.len(), 1);
    assert_eq!(dom.borrow().text_content(outer), "outerinner");
}

#[test]
fn test_short_circuit_skips_missing_identifier() {
    reset_diagnostics();
    let dom = Document::new("doc", "/").into_handle();
    let node = mount_text(
        &dom,
        Markup::element("p").child(Markup::text("{flag && missing}|{name ?? missing}|{nothing?.deep}")),
    );
    let env: Environment = [
        ("flag", Value::Boolean(false)),
        ("name", Value::string("n")),
        ("nothing", Value::Null),
    ]
    .into_iter()
    .collect();

    bind_interpolations(&dom, node, &env, &Scope::new());
    assert_eq!(dom.borrow().text_content(node), "false|n|");
    assert!(diagnostics_of(DiagnosticKind::MissingIdentifier).is_empty());
}
