//! Built-in functions and the provider function result cache.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::value::{DynamicValue, Value};

/// Calls a built-in function.
///
/// Unknown arguments make the result unknown.
///
/// # Errors
///
/// Returns an error for unknown functions and invalid arguments.
pub fn call_builtin(name: &str, args: &[Value]) -> Result<Value, String> {
    if name != "coalesce" && args.iter().any(|a| !a.is_known()) {
        return Ok(Value::Unknown);
    }
    match (name, args) {
        ("length", [Value::List(items)]) => Ok(count(items.len())),
        ("length", [Value::Object(attrs)]) => Ok(count(attrs.len())),
        ("length", [Value::String(s)]) => Ok(count(s.chars().count())),
        ("length", [other]) => Err(format!("cannot take the length of {}", other.type_name())),
        ("upper", [Value::String(s)]) => Ok(Value::String(s.to_uppercase())),
        ("lower", [Value::String(s)]) => Ok(Value::String(s.to_lowercase())),
        ("upper" | "lower", [other]) => Err(format!("expected a string, got {}", other.type_name())),
        ("tostring", [Value::Null]) => Ok(Value::Null),
        ("tostring", [v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))]) => Ok(Value::String(v.to_string())),
        ("tostring", [other]) => Err(format!("cannot convert {} to string", other.type_name())),
        ("coalesce", args) => {
            for arg in args {
                match arg {
                    Value::Unknown => return Ok(Value::Unknown),
                    Value::Null => {}
                    Value::String(s) if s.is_empty() => {}
                    other => return Ok(other.clone()),
                }
            }
            Err(String::from("no non-null, non-empty argument"))
        }
        ("length" | "upper" | "lower" | "tostring", _) => Err(format!("{name} takes exactly one argument")),
        _ => Err(format!("there is no function named \"{name}\"")),
    }
}

#[allow(clippy::cast_precision_loss)]
fn count(n: usize) -> Value {
    Value::Number(n as f64)
}

/// Hash identifying one provider function call: provider, function and
/// encoded arguments.
#[must_use]
pub fn call_hash(provider: &str, name: &str, args: &[Value]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update([0]);
    hasher.update(name.as_bytes());
    hasher.update([0]);
    for arg in args {
        hasher.update(arg.to_json().to_string().as_bytes());
        hasher.update([0]);
    }
    hex::encode(hasher.finalize())
}

/// Results of provider function calls, keyed by [`call_hash`].
///
/// Planning starts empty and records every call. Apply starts from the
/// results stored in the plan, so any call that returns something else the
/// second time is detected.
#[derive(Debug, Default)]
pub struct FunctionResults {
    results: Mutex<BTreeMap<String, DynamicValue>>,
}

impl FunctionResults {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache pre-filled with earlier results.
    #[must_use]
    pub fn from_recorded(results: BTreeMap<String, DynamicValue>) -> Self {
        Self {
            results: Mutex::new(results),
        }
    }

    /// Records a call result, or checks it against an earlier one.
    ///
    /// # Errors
    ///
    /// Returns an error when the same call produced a different result before.
    pub fn check_and_record(&self, provider: &str, name: &str, args: &[Value], result: &Value) -> Result<(), String> {
        let key = call_hash(provider, name, args);
        let encoded = DynamicValue::encode(result);
        let mut results = self.results.lock();
        match results.get(&key) {
            Some(previous) if *previous != encoded => {
                Err(format!("provider::{provider}::{name} returned a different result than before"))
            }
            Some(_) => Ok(()),
            None => {
                results.insert(key, encoded);
                Ok(())
            }
        }
    }

    /// Returns a copy of every recorded result.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, DynamicValue> {
        self.results.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins() {
        assert_eq!(
            call_builtin("length", &[Value::List(vec![Value::Null, Value::Null])]),
            Ok(Value::Number(2.0))
        );
        assert_eq!(call_builtin("upper", &[Value::string("ab")]), Ok(Value::string("AB")));
        assert_eq!(call_builtin("tostring", &[Value::Number(3.0)]), Ok(Value::string("3")));
        assert_eq!(
            call_builtin("coalesce", &[Value::Null, Value::string(""), Value::string("x")]),
            Ok(Value::string("x"))
        );
        assert_eq!(call_builtin("lower", &[Value::Unknown]), Ok(Value::Unknown));
        assert!(call_builtin("nope", &[]).is_err());
        assert!(call_builtin("length", &[]).is_err());
    }

    #[test]
    fn test_results_detect_inconsistency() {
        let results = FunctionResults::new();
        let args = [Value::string("yes")];
        results
            .check_and_record("test", "is_true", &args, &Value::Bool(true))
            .expect("first call records");
        results
            .check_and_record("test", "is_true", &args, &Value::Bool(true))
            .expect("same result is fine");
        assert!(
            results
                .check_and_record("test", "is_true", &args, &Value::Bool(false))
                .is_err()
        );
        assert_eq!(results.snapshot().len(), 1);
    }

    #[test]
    fn test_hash_depends_on_arguments() {
        assert_ne!(
            call_hash("test", "f", &[Value::Number(1.0)]),
            call_hash("test", "f", &[Value::Number(2.0)])
        );
    }
}
