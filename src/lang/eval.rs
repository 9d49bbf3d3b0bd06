//! Expression evaluation.

use std::collections::BTreeMap;

use crate::addrs::{Address, ModulePath, Subject, parse_ref};
use crate::diagnostics::Diagnostic;

use super::expr::{BinaryOp, Expr, TemplatePart, UnaryOp};
use super::functions::call_builtin;
use super::traversal::TraversalStep;
use super::value::Value;

/// Values visible to an expression.
pub trait Scope {
    /// Module the expression is written in.
    fn module(&self) -> &ModulePath;

    /// Value of a referenced entity. Resource addresses (never instance
    /// addresses) are looked up for resource references.
    fn lookup(&self, address: &Address) -> Option<Value>;

    /// Value of `count.index`, when evaluating one instance of a counted
    /// resource.
    fn count_index(&self) -> Option<i64> {
        None
    }

    /// Calls a provider-defined function.
    ///
    /// # Errors
    ///
    /// Returns an error message when the call fails.
    fn call_provider_function(&self, provider: &str, name: &str, _args: &[Value]) -> Result<Value, String> {
        Err(format!("provider::{provider}::{name} is not available here"))
    }
}

/// A scope backed by a plain map, for static contexts and tests.
#[derive(Debug, Clone, Default)]
pub struct MapScope {
    module: ModulePath,
    values: BTreeMap<Address, Value>,
    count_index: Option<i64>,
}

impl MapScope {
    /// Creates an empty scope for `module`.
    #[must_use]
    pub fn new(module: ModulePath) -> Self {
        Self {
            module,
            ..Self::default()
        }
    }

    /// Adds a value.
    #[must_use]
    pub fn with(mut self, address: Address, value: Value) -> Self {
        self.values.insert(address, value);
        self
    }

    /// Sets `count.index`.
    #[must_use]
    pub const fn with_count_index(mut self, index: i64) -> Self {
        self.count_index = Some(index);
        self
    }
}

impl Scope for MapScope {
    fn module(&self) -> &ModulePath {
        &self.module
    }

    fn lookup(&self, address: &Address) -> Option<Value> {
        self.values.get(address).cloned()
    }

    fn count_index(&self) -> Option<i64> {
        self.count_index
    }
}

/// Evaluates an expression.
///
/// Unknown operands propagate to an unknown result, except where the
/// known operand alone decides the outcome (`false && x`, `true || x`).
///
/// # Errors
///
/// Returns an error diagnostic for type errors, missing references and
/// failed function calls.
pub fn evaluate(expr: &Expr, scope: &dyn Scope) -> Result<Value, Diagnostic> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Traversal(traversal) => {
            let reference = parse_ref(traversal, scope.module())?;
            let root = match &reference.subject.subject {
                Subject::CountIndex => scope.count_index().map(count_value).ok_or_else(|| {
                    Diagnostic::error(
                        "Reference to \"count\" in non-counted context",
                        "count.index is only available inside a resource that sets count",
                    )
                })?,
                Subject::ResourceInstance(_, key) => {
                    let resource = reference.subject.containing_resource();
                    let whole = lookup(scope, &resource)?;
                    let step = match key {
                        crate::addrs::InstanceKey::Int(i) => Value::Number(int_to_f64(*i)),
                        crate::addrs::InstanceKey::Str(s) => Value::String(s.clone()),
                        crate::addrs::InstanceKey::NoKey | crate::addrs::InstanceKey::Wildcard => Value::Unknown,
                    };
                    index(&whole, &step)?
                }
                _ => lookup(scope, &reference.subject)?,
            };
            reference.remaining.iter().try_fold(root, |value, step| match step {
                TraversalStep::Attr(name) => get_attr(&value, name),
                TraversalStep::Index(key) => index(&value, key),
            })
        }
        Expr::List(items) => items
            .iter()
            .map(|e| evaluate(e, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Object(attrs) => attrs
            .iter()
            .map(|(k, e)| evaluate(e, scope).map(|v| (k.clone(), v)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Value::Object),
        Expr::GetAttr { object, name } => get_attr(&evaluate(object, scope)?, name),
        Expr::Index { collection, key } => index(&evaluate(collection, scope)?, &evaluate(key, scope)?),
        Expr::Unary { op, operand } => unary(*op, evaluate(operand, scope)?),
        Expr::Binary { op, lhs, rhs } => binary(*op, evaluate(lhs, scope)?, evaluate(rhs, scope)?),
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => match evaluate(condition, scope)? {
            Value::Bool(true) => evaluate(then, scope),
            Value::Bool(false) => evaluate(otherwise, scope),
            Value::Unknown => Ok(Value::Unknown),
            other => Err(type_error("condition", "bool", &other)),
        },
        Expr::Call { function, args } => {
            let args = args
                .iter()
                .map(|e| evaluate(e, scope))
                .collect::<Result<Vec<_>, _>>()?;
            let result = match &function.provider {
                Some(provider) => scope.call_provider_function(provider, &function.name, &args),
                None => call_builtin(&function.name, &args),
            };
            result.map_err(|message| Diagnostic::error("Error in function call", message))
        }
        Expr::Template(parts) => {
            let mut out = String::new();
            for part in parts {
                match part {
                    TemplatePart::Literal(s) => out.push_str(s),
                    TemplatePart::Interpolation(e) => match evaluate(e, scope)? {
                        Value::Unknown => return Ok(Value::Unknown),
                        Value::Null => {
                            return Err(Diagnostic::error(
                                "Invalid template interpolation value",
                                "the expression result is null",
                            ));
                        }
                        v @ (Value::List(_) | Value::Object(_)) => {
                            return Err(type_error("template interpolation", "string", &v));
                        }
                        v => out.push_str(&v.to_string()),
                    },
                }
            }
            Ok(Value::String(out))
        }
    }
}

fn lookup(scope: &dyn Scope, address: &Address) -> Result<Value, Diagnostic> {
    scope.lookup(address).ok_or_else(|| {
        Diagnostic::error(
            "Reference to unavailable value",
            format!("{address} has no value in this context"),
        )
    })
}

fn get_attr(value: &Value, name: &str) -> Result<Value, Diagnostic> {
    match value {
        Value::Object(attrs) => attrs.get(name).cloned().ok_or_else(|| {
            Diagnostic::error("Unsupported attribute", format!("this object has no attribute named \"{name}\""))
        }),
        Value::Unknown => Ok(Value::Unknown),
        other => Err(Diagnostic::error(
            "Unsupported attribute",
            format!("cannot read \"{name}\" from a {} value", other.type_name()),
        )),
    }
}

fn index(value: &Value, key: &Value) -> Result<Value, Diagnostic> {
    match (value, key) {
        (Value::Unknown, _) | (_, Value::Unknown) => Ok(Value::Unknown),
        (Value::List(items), Value::Number(n)) => {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let i = *n as usize;
            if n.fract() != 0.0 || *n < 0.0 || i >= items.len() {
                return Err(Diagnostic::error(
                    "Invalid index",
                    format!("index {key} is out of range for a list of {} elements", items.len()),
                ));
            }
            Ok(items[i].clone())
        }
        (Value::Object(attrs), Value::String(k)) => attrs
            .get(k)
            .cloned()
            .ok_or_else(|| Diagnostic::error("Invalid index", format!("the given key {k:?} does not exist"))),
        (collection, key) => Err(Diagnostic::error(
            "Invalid index",
            format!("cannot index a {} with a {}", collection.type_name(), key.type_name()),
        )),
    }
}

fn unary(op: UnaryOp, operand: Value) -> Result<Value, Diagnostic> {
    match (op, operand) {
        (_, Value::Unknown) => Ok(Value::Unknown),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Not, other) => Err(type_error("operand of !", "bool", &other)),
        (UnaryOp::Negate, other) => Err(type_error("operand of -", "number", &other)),
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, Diagnostic> {
    match op {
        BinaryOp::And => match (lhs, rhs) {
            (Value::Bool(false), _) | (_, Value::Bool(false)) => Ok(Value::Bool(false)),
            (Value::Bool(true), Value::Bool(true)) => Ok(Value::Bool(true)),
            (Value::Unknown | Value::Bool(_), Value::Unknown | Value::Bool(_)) => Ok(Value::Unknown),
            (l, r) => Err(type_error("operand of &&", "bool", if l.as_bool().is_none() { &l } else { &r })),
        },
        BinaryOp::Or => match (lhs, rhs) {
            (Value::Bool(true), _) | (_, Value::Bool(true)) => Ok(Value::Bool(true)),
            (Value::Bool(false), Value::Bool(false)) => Ok(Value::Bool(false)),
            (Value::Unknown | Value::Bool(_), Value::Unknown | Value::Bool(_)) => Ok(Value::Unknown),
            (l, r) => Err(type_error("operand of ||", "bool", if l.as_bool().is_none() { &l } else { &r })),
        },
        BinaryOp::Equal | BinaryOp::NotEqual => {
            if !lhs.is_wholly_known() || !rhs.is_wholly_known() {
                return Ok(Value::Unknown);
            }
            Ok(Value::Bool((lhs == rhs) == (op == BinaryOp::Equal)))
        }
        _ => {
            let (l, r) = match (&lhs, &rhs) {
                (Value::Unknown, _) | (_, Value::Unknown) => return Ok(Value::Unknown),
                (Value::Number(l), Value::Number(r)) => (*l, *r),
                (Value::Number(_), other) | (other, _) => return Err(type_error("arithmetic operand", "number", other)),
            };
            Ok(match op {
                BinaryOp::Less => Value::Bool(l < r),
                BinaryOp::LessEqual => Value::Bool(l <= r),
                BinaryOp::Greater => Value::Bool(l > r),
                BinaryOp::GreaterEqual => Value::Bool(l >= r),
                BinaryOp::Add => Value::Number(l + r),
                BinaryOp::Subtract => Value::Number(l - r),
                BinaryOp::Multiply => Value::Number(l * r),
                BinaryOp::Divide | BinaryOp::Modulo if r == 0.0 => {
                    return Err(Diagnostic::error("Division by zero", "the right operand is zero"));
                }
                BinaryOp::Divide => Value::Number(l / r),
                BinaryOp::Modulo => Value::Number(l % r),
                BinaryOp::And | BinaryOp::Or | BinaryOp::Equal | BinaryOp::NotEqual => Value::Unknown,
            })
        }
    }
}

fn type_error(what: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(
        "Invalid value type",
        format!("{what} must be a {expected}, got {}", got.type_name()),
    )
}

#[allow(clippy::cast_precision_loss)]
const fn int_to_f64(i: i64) -> f64 {
    i as f64
}

#[allow(clippy::cast_precision_loss)]
fn count_value(i: i64) -> Value {
    Value::Number(i as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::ResourceAddr;
    use crate::lang::expr::{parse_expression, parse_template};

    fn scope() -> MapScope {
        let web = Address::new(ModulePath::root(), Subject::Resource(ResourceAddr::managed("test_resource", "web")));
        MapScope::new(ModulePath::root())
            .with(Address::root_variable("v"), Value::Number(5.0))
            .with(Address::root_variable("pending"), Value::Unknown)
            .with(
                web,
                Value::List(vec![
                    Value::object([("id", Value::string("a"))]),
                    Value::object([("id", Value::Unknown)]),
                ]),
            )
    }

    fn eval(src: &str) -> Value {
        evaluate(&parse_expression(src).expect("parses"), &scope()).expect("evaluates")
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        assert_eq!(eval("var.v > 0"), Value::Bool(true));
        assert_eq!(eval("var.v * 2 - 1"), Value::Number(9.0));
        assert_eq!(eval("-var.v % 3 == -2"), Value::Bool(true));
    }

    #[test]
    fn test_unknown_propagation() {
        assert_eq!(eval("var.pending + 1"), Value::Unknown);
        assert_eq!(eval("false && var.pending"), Value::Bool(false));
        assert_eq!(eval("var.pending || true"), Value::Bool(true));
        assert_eq!(eval("var.pending ? 1 : 2"), Value::Unknown);
        assert_eq!(eval("test_resource.web[1].id"), Value::Unknown);
    }

    #[test]
    fn test_resource_instances() {
        assert_eq!(eval("test_resource.web[0].id"), Value::string("a"));
        assert_eq!(eval("length(test_resource.web)"), Value::Number(2.0));
    }

    #[test]
    fn test_template_rendering() {
        let expr = parse_template("v=${var.v}!").expect("parses");
        assert_eq!(evaluate(&expr, &scope()).expect("evaluates"), Value::string("v=5!"));
    }

    #[test]
    fn test_count_index() {
        let expr = parse_expression("count.index + 1").expect("parses");
        assert!(evaluate(&expr, &scope()).is_err());
        let counted = scope().with_count_index(2);
        assert_eq!(evaluate(&expr, &counted).expect("evaluates"), Value::Number(3.0));
    }

    #[test]
    fn test_errors_are_diagnostics() {
        let s = scope();
        for src in ["var.missing", "var.v + \"x\"", "var.v.attr", "test_resource.web[5]", "1 / 0"] {
            let expr = parse_expression(src).expect("parses");
            assert!(evaluate(&expr, &s).is_err(), "{src} should fail");
        }
    }

    #[test]
    fn test_provider_functions_unavailable_by_default() {
        let expr = parse_expression("provider::test::is_true(true)").expect("parses");
        assert!(evaluate(&expr, &scope()).is_err());
    }
}
