//! Turning traversals into addresses.

use crate::diagnostics::Diagnostic;
use crate::lang::traversal::{Traversal, TraversalStep};
use crate::lang::value::Value;

use super::address::{Address, InstanceKey, ResourceAddr, Subject};
use super::module::ModulePath;

/// A traversal split into the address it reads and the steps that go
/// further into that address's value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    /// The referenced entity.
    pub subject: Address,
    /// Attribute and index steps below the entity.
    pub remaining: Vec<TraversalStep>,
}

/// Parses a traversal written inside `module` into a reference.
///
/// # Errors
///
/// Returns an error diagnostic when the traversal does not name a
/// referenceable entity.
pub fn parse_ref(traversal: &Traversal, module: &ModulePath) -> Result<Reference, Diagnostic> {
    let steps = traversal.steps.as_slice();
    let at = |subject: Subject, consumed: usize| Reference {
        subject: Address::new(module.clone(), subject),
        remaining: steps[consumed..].to_vec(),
    };

    match traversal.root.as_str() {
        "var" => {
            let name = attr_name(traversal, steps, 0, "variable name")?;
            Ok(at(Subject::Variable(name), 1))
        }
        "local" => {
            let name = attr_name(traversal, steps, 0, "local value name")?;
            Ok(at(Subject::Local(name), 1))
        }
        "check" => {
            let name = attr_name(traversal, steps, 0, "check name")?;
            Ok(at(Subject::Check(name), 1))
        }
        "count" => match steps.first() {
            Some(TraversalStep::Attr(attr)) if attr == "index" => Ok(at(Subject::CountIndex, 1)),
            _ => Err(invalid(traversal, "the only attribute of \"count\" is \"index\"")),
        },
        "module" => {
            let call = attr_name(traversal, steps, 0, "module call name")?;
            let name = attr_name(
                traversal,
                steps,
                1,
                "module output name; a whole module cannot be referenced",
            )?;
            Ok(at(Subject::ModuleCallOutput { call, name }, 2))
        }
        "action" => {
            let type_name = attr_name(traversal, steps, 0, "action type")?;
            let name = attr_name(traversal, steps, 1, "action name")?;
            Ok(at(Subject::Action { type_name, name }, 2))
        }
        "data" => {
            let type_name = attr_name(traversal, steps, 0, "data source type")?;
            let name = attr_name(traversal, steps, 1, "data source name")?;
            resource_ref(traversal, module, ResourceAddr::data(type_name, name), 2)
        }
        "self" | "path" | "terraform" | "each" => Err(invalid(
            traversal,
            &format!("the \"{}\" object is not supported", traversal.root),
        )),
        type_name => {
            let name = attr_name(traversal, steps, 0, "resource name")?;
            resource_ref(traversal, module, ResourceAddr::managed(type_name, name), 1)
        }
    }
}

fn resource_ref(
    traversal: &Traversal,
    module: &ModulePath,
    resource: ResourceAddr,
    consumed: usize,
) -> Result<Reference, Diagnostic> {
    let steps = &traversal.steps[consumed..];
    let (subject, consumed) = match steps.first() {
        Some(TraversalStep::Index(key)) => {
            let key = instance_key(key).ok_or_else(|| invalid(traversal, "instance keys must be whole numbers or strings"))?;
            (Subject::ResourceInstance(resource, key), 1)
        }
        _ => (Subject::Resource(resource), 0),
    };
    Ok(Reference {
        subject: Address::new(module.clone(), subject),
        remaining: steps[consumed..].to_vec(),
    })
}

fn instance_key(key: &Value) -> Option<InstanceKey> {
    match key {
        #[allow(clippy::cast_possible_truncation)]
        Value::Number(n) if n.fract() == 0.0 => Some(InstanceKey::Int(*n as i64)),
        Value::String(s) => Some(InstanceKey::Str(s.clone())),
        _ => None,
    }
}

fn attr_name(traversal: &Traversal, steps: &[TraversalStep], at: usize, what: &str) -> Result<String, Diagnostic> {
    match steps.get(at) {
        Some(TraversalStep::Attr(name)) => Ok(name.clone()),
        _ => Err(invalid(traversal, &format!("expected {what}"))),
    }
}

fn invalid(traversal: &Traversal, detail: &str) -> Diagnostic {
    Diagnostic::error(format!("Invalid reference \"{traversal}\""), detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(t: &Traversal) -> Reference {
        parse_ref(t, &ModulePath::root()).expect("valid reference")
    }

    #[test]
    fn test_variable_with_remaining_steps() {
        let r = parse(&Traversal::root("var").attr("settings").attr("zone"));
        assert_eq!(r.subject.to_string(), "var.settings");
        assert_eq!(r.remaining, vec![TraversalStep::Attr(String::from("zone"))]);
    }

    #[test]
    fn test_resource_instance() {
        let r = parse(
            &Traversal::root("test_resource")
                .attr("web")
                .index(Value::Number(1.0))
                .attr("id"),
        );
        assert_eq!(r.subject.to_string(), "test_resource.web[1]");
        assert_eq!(r.subject.containing_resource().to_string(), "test_resource.web");
        assert_eq!(r.remaining.len(), 1);
    }

    #[test]
    fn test_data_and_module_output() {
        let r = parse(&Traversal::root("data").attr("test_data_source").attr("x").attr("id"));
        assert_eq!(r.subject.to_string(), "data.test_data_source.x");

        let module = ModulePath::root().child("net");
        let r = parse_ref(&Traversal::root("module").attr("inner").attr("ip"), &module).expect("valid reference");
        assert_eq!(r.subject.to_string(), "module.net.module.inner.ip");
    }

    #[test]
    fn test_invalid_references_are_diagnostics() {
        let module = ModulePath::root();
        assert!(parse_ref(&Traversal::root("var"), &module).is_err());
        assert!(parse_ref(&Traversal::root("module").attr("net"), &module).is_err());
        assert!(parse_ref(&Traversal::root("count").attr("value"), &module).is_err());
        assert!(parse_ref(&Traversal::root("self").attr("id"), &module).is_err());

        let diag = parse_ref(
            &Traversal::root("test_resource").attr("a").index(Value::Bool(true)),
            &module,
        )
        .expect_err("bool key");
        assert!(diag.is_error());
    }
}
