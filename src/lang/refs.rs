//! Reference extraction: which addresses does an expression read?

use std::collections::BTreeSet;

use crate::addrs::{Address, ModulePath, Reference, Subject, parse_ref};
use crate::diagnostics::{Diagnostic, Diagnostics};

use super::expr::Expr;
use super::traversal::Traversal;

/// Returns the addresses read by `expr`, using `parse` to turn each
/// traversal into a reference.
///
/// Malformed references never fail the call: they are returned as
/// diagnostics for the node owning the expression to report. Instance
/// references are widened to their resource, and `count.index` is dropped
/// because it is supplied by the evaluating resource rather than another
/// node.
pub fn resolve_references<F>(expr: &Expr, parse: F) -> (BTreeSet<Address>, Diagnostics)
where
    F: Fn(&Traversal) -> Result<Reference, Diagnostic>,
{
    let mut addresses = BTreeSet::new();
    let mut diags = Diagnostics::new();
    for traversal in expr.traversals() {
        match parse(traversal) {
            Ok(reference) if reference.subject.subject == Subject::CountIndex => {}
            Ok(reference) => {
                addresses.insert(reference.subject.containing_resource());
            }
            Err(diag) => diags.push(diag),
        }
    }
    (addresses, diags)
}

/// Returns the addresses read by `expr` when written inside `module`.
#[must_use]
pub fn references_in_expr(expr: &Expr, module: &ModulePath) -> (BTreeSet<Address>, Diagnostics) {
    resolve_references(expr, |t| parse_ref(t, module))
}

/// Merges the references of several expressions into one set.
#[must_use]
pub fn references_in_exprs<'a, I>(exprs: I, module: &ModulePath) -> (BTreeSet<Address>, Diagnostics)
where
    I: IntoIterator<Item = &'a Expr>,
{
    let mut addresses = BTreeSet::new();
    let mut diags = Diagnostics::new();
    for expr in exprs {
        let (found, problems) = references_in_expr(expr, module);
        addresses.extend(found);
        diags.extend(problems);
    }
    (addresses, diags)
}

/// Removes `own` from `addresses`.
#[must_use]
pub fn filter_self(mut addresses: BTreeSet<Address>, own: &Address) -> BTreeSet<Address> {
    addresses.remove(own);
    addresses
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::expr::{parse_expression, parse_template};

    fn addrs(src: &str) -> Vec<String> {
        let expr = parse_expression(src).expect("parses");
        let (found, diags) = references_in_expr(&expr, &ModulePath::root());
        assert!(diags.is_empty(), "{diags:?}");
        found.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_duplicates_collapse() {
        assert_eq!(addrs("var.a + var.a * local.b"), vec!["var.a", "local.b"]);
    }

    #[test]
    fn test_instances_widen_to_resource() {
        assert_eq!(
            addrs("test_resource.web[0].id == test_resource.web[1].id"),
            vec!["test_resource.web"]
        );
    }

    #[test]
    fn test_count_index_is_not_a_dependency() {
        assert_eq!(addrs("var.names[count.index]"), vec!["var.names"]);
    }

    #[test]
    fn test_bad_reference_is_a_diagnostic() {
        let expr = parse_expression("var + local.ok").expect("parses");
        let (found, diags) = references_in_expr(&expr, &ModulePath::root());
        assert_eq!(found.len(), 1);
        assert!(diags.has_errors());
    }

    #[test]
    fn test_merge_and_filter_self() {
        let condition = parse_expression("var.v > 0 && var.limit > var.v").expect("parses");
        let message = parse_template("${var.v} is below ${var.limit}").expect("parses");
        let (found, _) = references_in_exprs([&condition, &message], &ModulePath::root());
        assert_eq!(found.len(), 2);

        let own = Address::root_variable("v");
        let filtered = filter_self(found, &own);
        assert_eq!(filtered.into_iter().collect::<Vec<_>>(), vec![Address::root_variable("limit")]);
    }
}
