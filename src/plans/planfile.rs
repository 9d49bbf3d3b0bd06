//! Binary plan file codec.
//!
//! Layout:
//!
//! ```text
//! +----------+----------------+-------------------+-----------------+
//! | PLANGRPH | version (u32be)| bincode plan body | sha256 (32 B)   |
//! +----------+----------------+-------------------+-----------------+
//! ```
//!
//! The version is read and checked before anything else is interpreted.
//! The checksum covers everything before it.

use bincode::Options;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

use crate::error::CodecError;
use crate::lang::value::UNRECOGNIZED_ENCODING_PREFIX;

use super::plan::{PLAN_FORMAT_VERSION, Plan};

/// File signature.
pub const PLAN_MAGIC: &[u8; 8] = b"PLANGRPH";

const VERSION_LEN: usize = 4;
const CHECKSUM_LEN: usize = 32;
const HEADER_LEN: usize = PLAN_MAGIC.len() + VERSION_LEN;

fn body_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Encodes a sealed plan.
///
/// # Errors
///
/// Returns an error if the plan's flags disagree with its contents or the
/// body cannot be encoded.
pub fn encode(plan: &Plan) -> Result<Vec<u8>, CodecError> {
    plan.verify().map_err(|message| CodecError::Unsealed { message })?;

    let body = body_options().serialize(plan).map_err(|e| CodecError::Encode {
        message: e.to_string(),
    })?;

    let mut out = Vec::with_capacity(HEADER_LEN + body.len() + CHECKSUM_LEN);
    out.extend_from_slice(PLAN_MAGIC);
    out.extend_from_slice(&PLAN_FORMAT_VERSION.to_be_bytes());
    out.extend_from_slice(&body);
    let checksum = Sha256::digest(&out);
    out.extend_from_slice(&checksum);

    debug!("Encoded plan: {} bytes", out.len());
    Ok(out)
}

/// Reads the format version from the header without decoding the body.
///
/// # Errors
///
/// Returns an error if the input is not a plan file or is too short.
pub fn peek_version(bytes: &[u8]) -> Result<u32, CodecError> {
    if bytes.len() < PLAN_MAGIC.len() {
        return Err(CodecError::Truncated {
            message: String::from("missing signature"),
        });
    }
    if &bytes[..PLAN_MAGIC.len()] != PLAN_MAGIC {
        return Err(CodecError::BadMagic);
    }
    let raw: [u8; VERSION_LEN] = bytes
        .get(PLAN_MAGIC.len()..HEADER_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| CodecError::Truncated {
            message: String::from("missing format version"),
        })?;
    Ok(u32::from_be_bytes(raw))
}

/// Decodes a plan file.
///
/// # Errors
///
/// Returns an error for a foreign or truncated file, a version other than
/// [`PLAN_FORMAT_VERSION`], a checksum mismatch, an undecodable body, a
/// stored value with no recognised encoding, or flags that disagree with
/// the decoded contents.
pub fn decode(bytes: &[u8]) -> Result<Plan, CodecError> {
    let found = peek_version(bytes)?;
    if found != PLAN_FORMAT_VERSION {
        return Err(CodecError::VersionMismatch {
            expected: PLAN_FORMAT_VERSION,
            found,
        });
    }

    if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(CodecError::Truncated {
            message: String::from("missing checksum"),
        });
    }
    let (content, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if Sha256::digest(content).as_slice() != checksum {
        return Err(CodecError::ChecksumMismatch);
    }

    let body = &content[HEADER_LEN..];
    let plan: Plan = body_options()
        .with_limit(body.len() as u64)
        .deserialize(body)
        .map_err(|e| classify_body_error(&e.to_string()))?;

    if plan.version() != found {
        return Err(CodecError::corrupt(format!(
            "body declares version {} under a version {found} header",
            plan.version()
        )));
    }
    plan.verify().map_err(CodecError::corrupt)?;

    debug!("Decoded plan with {} resource changes", plan.resource_changes().len());
    Ok(plan)
}

fn classify_body_error(message: &str) -> CodecError {
    message.find(UNRECOGNIZED_ENCODING_PREFIX).map_or_else(
        || CodecError::corrupt(message),
        |at| CodecError::UnrecognizedEncoding {
            found: message[at + UNRECOGNIZED_ENCODING_PREFIX.len()..].to_string(),
        },
    )
}

/// Writes a plan file.
///
/// # Errors
///
/// Returns an error if the plan cannot be encoded or the file cannot be written.
pub async fn write_plan_file(path: &Path, plan: &Plan) -> crate::error::Result<()> {
    let bytes = encode(plan)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &bytes).await?;
    info!("Plan saved to {}", path.display());
    Ok(())
}

/// Reads a plan file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded.
pub async fn read_plan_file(path: &Path) -> crate::error::Result<Plan> {
    let bytes = tokio::fs::read(path).await?;
    let plan = decode(&bytes)?;
    info!("Plan loaded from {}", path.display());
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{Address, InstanceKey, ModulePath, ResourceAddr};
    use crate::lang::{AttributePath, DynamicValue, Value};
    use crate::plans::{
        Action, Backend, Change, CheckKind, CheckResult, Contribution, DeferredReason,
        DeferredResourceInstanceChange, PlanBuilder, PlanContext, ResourceInstanceChange,
    };
    use std::collections::{BTreeMap, BTreeSet};

    fn instance(name: &str) -> Address {
        Address::instance(
            ModulePath::root(),
            ResourceAddr::managed("test_resource", name),
            InstanceKey::NoKey,
        )
    }

    fn known(value: &Value) -> DynamicValue {
        DynamicValue::encode(value)
    }

    fn sample_plan() -> Plan {
        let builder = PlanBuilder::new();
        let a = instance("a");
        let b = instance("b");
        let provider = Address::provider("test", None);

        builder.changes().record(Contribution::Object(a.clone()));
        builder.changes().record(Contribution::ResourceChange(
            ResourceInstanceChange::new(
                a.clone(),
                provider.clone(),
                Change::create(known(&Value::object([("value", Value::string("x")), ("id", Value::Unknown)])))
                    .with_sensitive_paths(vec![], vec![AttributePath::attr("secret")]),
            ),
        ));
        builder.changes().record(Contribution::Object(b.clone()));
        builder.changes().record(Contribution::Deferred(DeferredResourceInstanceChange {
            reason: DeferredReason::ResourceConfigUnknown,
            change: ResourceInstanceChange::new(b, provider, Change::create(DynamicValue::Unknown)),
        }));
        builder.changes().record(Contribution::Check(CheckResult::pass(
            Address::root_variable("v"),
            CheckKind::InputVariable,
        )));
        builder.changes().record(Contribution::Variable {
            name: String::from("v"),
            value: known(&Value::Number(5.0)),
        });

        builder.seal(PlanContext {
            prior_objects: BTreeSet::new(),
            function_results: BTreeMap::from([(String::from("abc"), known(&Value::Bool(true)))]),
            backend: Backend {
                kind: String::from("local"),
                path: String::from("state.json"),
                workspace: String::from("default"),
            },
            config_fingerprint: String::from("deadbeef"),
            skipped: BTreeMap::from([(Address::root_variable("late"), Address::root_variable("v"))]),
            ..PlanContext::default()
        })
    }

    #[test]
    fn test_round_trip() {
        let plan = sample_plan();
        let bytes = encode(&plan).expect("encode");
        assert_eq!(&bytes[..8], PLAN_MAGIC);
        let decoded = decode(&bytes).expect("decode");
        assert_eq!(decoded, plan);
        assert_eq!(decoded.resource_changes()[0].action(), Action::Create);
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut bytes = encode(&sample_plan()).expect("encode");
        bytes[8..12].copy_from_slice(&(PLAN_FORMAT_VERSION + 1).to_be_bytes());
        match decode(&bytes) {
            Err(CodecError::VersionMismatch { expected, found }) => {
                assert_eq!(expected, PLAN_FORMAT_VERSION);
                assert_eq!(found, PLAN_FORMAT_VERSION + 1);
            }
            other => panic!("expected version mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_foreign_and_short_input() {
        assert!(matches!(decode(b"NOTAPLAN\0\0\0\x03"), Err(CodecError::BadMagic)));
        assert!(matches!(decode(b"PLAN"), Err(CodecError::Truncated { .. })));
        assert!(matches!(decode(b"PLANGRPH\0\0"), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn test_flipped_byte_detected() {
        let mut bytes = encode(&sample_plan()).expect("encode");
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        assert!(matches!(decode(&bytes), Err(CodecError::ChecksumMismatch)));
    }

    #[test]
    fn test_truncated_body_detected() {
        let bytes = encode(&sample_plan()).expect("encode");
        let mut content = bytes[..bytes.len() - CHECKSUM_LEN - 10].to_vec();
        let checksum = Sha256::digest(&content);
        content.extend_from_slice(&checksum);
        assert!(matches!(decode(&content), Err(CodecError::Corrupt { .. })));
    }

    #[test]
    fn test_unrecognized_encoding_classified() {
        let err = classify_body_error("unrecognized value encoding: [cbor]");
        match err {
            CodecError::UnrecognizedEncoding { found } => assert_eq!(found, "[cbor]"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plan_file_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out").join("plan.bin");
        let plan = sample_plan();
        write_plan_file(&path, &plan).await.expect("write");
        let loaded = read_plan_file(&path).await.expect("read");
        assert_eq!(loaded, plan);
    }
}
