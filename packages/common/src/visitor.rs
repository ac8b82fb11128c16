use trellis_parser::ast::{Expr, Literal};

/// Visitor pattern for traversing expression ASTs immutably
///
/// This trait provides default implementations that walk the entire tree.
/// Override specific visit_* methods to perform custom actions on nodes.
pub trait Visitor: Sized {
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }

    fn visit_literal(&mut self, _literal: &Literal) {
        // Leaf node, no children to walk
    }

    fn visit_identifier(&mut self, _name: &str) {
        // Leaf node, no children to walk
    }

    fn visit_member(&mut self, object: &Expr, property: &Expr, computed: bool, _optional: bool) {
        walk_member(self, object, property, computed);
    }
}

pub fn walk_expr<V: Visitor>(visitor: &mut V, expr: &Expr) {
    match expr {
        Expr::Literal { value } => visitor.visit_literal(value),
        Expr::Identifier { name } => visitor.visit_identifier(name),
        Expr::Unary { operand, .. } => visitor.visit_expr(operand),
        Expr::Binary { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            visitor.visit_expr(test);
            visitor.visit_expr(consequent);
            visitor.visit_expr(alternate);
        }
        Expr::Member {
            object,
            property,
            computed,
            optional,
        } => visitor.visit_member(object, property, *computed, *optional),
    }
}

/// Walk the object, and the key expression only when it is computed
/// (a dotted property name is not an identifier reference)
pub fn walk_member<V: Visitor>(visitor: &mut V, object: &Expr, property: &Expr, computed: bool) {
    visitor.visit_expr(object);
    if computed {
        visitor.visit_expr(property);
    }
}

struct IdentifierCollector {
    names: Vec<String>,
}

impl Visitor for IdentifierCollector {
    fn visit_identifier(&mut self, name: &str) {
        if !self.names.iter().any(|existing| existing == name) {
            self.names.push(name.to_string());
        }
    }
}

/// Distinct identifiers referenced by an expression, in first-use order
pub fn collect_identifiers(expr: &Expr) -> Vec<String> {
    let mut collector = IdentifierCollector { names: Vec::new() };
    collector.visit_expr(expr);
    collector.names
}
