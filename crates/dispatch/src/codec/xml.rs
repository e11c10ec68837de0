//! XML codec.
//!
//! XML documents name their type through the root element. The codec keeps
//! one alias table per instance mapping root element names to type bindings.
//! Each decode first associates the expected alias with the expected type,
//! replacing any binding of a different type under that alias, then resolves
//! the document's actual root element through the table. A root element bound
//! to another type, or to nothing, is a decode failure, never a silent
//! mis-decode.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::{
    decode_with, encode_error, strip_nulls, PayloadCodec, ResponseType, TypeBinding, XmlList,
};
use crate::errors::BoxError;
use crate::payload::{AnyRecord, Payload};
use crate::{DispatchError, PayloadFormat};

/// Effect of associating an alias with a type.
#[derive(Debug, Clone, PartialEq)]
pub enum AliasChange {
    /// The alias was not bound before.
    Added,
    /// The alias was already bound to the same type.
    Unchanged,
    /// The alias was bound to another type; that binding was dropped.
    Replaced {
        /// Type name of the dropped binding.
        previous: &'static str,
    },
}

#[derive(Debug, Error)]
enum RootError {
    #[error("document has no root element")]
    Missing,
    #[error("root element <{root}> is not associated with any type")]
    Unbound { root: String },
    #[error("root element <{root}> is associated with {bound}, expected {expected}")]
    Mismatch {
        root: String,
        bound: &'static str,
        expected: &'static str,
    },
}

/// XML codec with a per-instance alias table.
#[derive(Debug, Default)]
pub struct XmlCodec {
    aliases: Mutex<HashMap<String, TypeBinding>>,
}

impl XmlCodec {
    /// Creates a codec with an empty alias table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `alias` to `binding`'s type, invalidating a binding of any other type.
    pub fn associate(&self, alias: &str, binding: &TypeBinding) -> AliasChange {
        associate_in(&mut self.aliases.lock(), alias, binding)
    }

    /// Associates `alias` and checks the document root under one lock.
    fn associate_and_check(
        &self,
        alias: &str,
        bytes: &[u8],
        expected: &TypeBinding,
    ) -> Result<(), RootError> {
        // Schemaless documents accept any root.
        let root = if expected.is::<Value>() {
            None
        } else {
            Some(root_element(bytes))
        };

        let mut aliases = self.aliases.lock();
        associate_in(&mut aliases, alias, expected);
        let Some(root) = root else {
            return Ok(());
        };
        let root = root?;
        match aliases.get(&root) {
            None => Err(RootError::Unbound { root }),
            Some(bound) if bound.type_id() != expected.type_id() => Err(RootError::Mismatch {
                bound: bound.type_name(),
                expected: expected.type_name(),
                root,
            }),
            Some(_) => Ok(()),
        }
    }

    /// The binding currently held for `alias`.
    pub fn binding(&self, alias: &str) -> Option<TypeBinding> {
        self.aliases.lock().get(alias).cloned()
    }
}

impl PayloadCodec for XmlCodec {
    fn format(&self) -> PayloadFormat {
        PayloadFormat::Xml
    }

    fn encode_document(&self, root: &str, document: &Value) -> Result<Bytes, DispatchError> {
        quick_xml::se::to_string_with_root(root, &strip_nulls(document))
            .map(Bytes::from)
            .map_err(|source| encode_error(PayloadFormat::Xml, source))
    }

    fn decode(
        &self,
        bytes: Bytes,
        response: Option<&ResponseType>,
        alias: Option<&str>,
    ) -> Result<Payload, BoxError> {
        match response {
            None | Some(ResponseType::Raw) => Ok(Payload::Stream(bytes)),
            Some(concrete @ ResponseType::Concrete(binding)) => {
                let alias = alias.unwrap_or_else(|| binding.alias());
                self.associate_and_check(alias, &bytes, binding)?;
                decode_with(PayloadFormat::Xml, &bytes, concrete)
            }
            // Lists arrive in a wrapper element whose name carries no type.
            Some(list @ ResponseType::ListOf(binding)) => {
                if let Some(alias) = alias {
                    self.associate(alias, binding);
                }
                decode_with(PayloadFormat::Xml, &bytes, list)
            }
        }
    }
}

fn associate_in(
    aliases: &mut HashMap<String, TypeBinding>,
    alias: &str,
    binding: &TypeBinding,
) -> AliasChange {
    let change = match aliases.get(alias) {
        None => AliasChange::Added,
        Some(current) if current.type_id() == binding.type_id() => return AliasChange::Unchanged,
        Some(current) => AliasChange::Replaced {
            previous: current.type_name(),
        },
    };
    if let AliasChange::Replaced { previous } = &change {
        debug!(
            alias,
            previous,
            current = binding.type_name(),
            "Replaced stale XML alias binding"
        );
    }
    aliases.insert(alias.to_owned(), binding.clone().with_alias(alias));
    change
}

fn root_element(bytes: &[u8]) -> Result<String, RootError> {
    let mut reader = Reader::from_reader(bytes);
    let mut buffer = Vec::new();
    loop {
        match reader.read_event_into(&mut buffer) {
            Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                return Ok(String::from_utf8_lossy(start.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) | Err(_) => return Err(RootError::Missing),
            Ok(_) => {}
        }
        buffer.clear();
    }
}

fn as_text(bytes: &[u8]) -> Result<&str, BoxError> {
    Ok(std::str::from_utf8(bytes)?)
}

pub(super) fn decode_one<T: DeserializeOwned + Send + 'static>(
    bytes: &[u8],
) -> Result<AnyRecord, BoxError> {
    let value: T = quick_xml::de::from_str(as_text(bytes)?)?;
    Ok(AnyRecord::new(value))
}

pub(super) fn decode_many<T: DeserializeOwned + Send + 'static>(
    bytes: &[u8],
) -> Result<Vec<AnyRecord>, BoxError> {
    let list: XmlList<T> = quick_xml::de::from_str(as_text(bytes)?)?;
    Ok(list.items.into_iter().map(AnyRecord::new).collect())
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Widget {
        name: String,
    }

    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Gizmo {
        name: String,
        #[serde(default)]
        size: Option<u32>,
    }

    #[derive(Debug, PartialEq, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Batch {
        id: String,
        state: String,
    }

    fn concrete<T: DeserializeOwned + Send + 'static>(alias: &str) -> ResponseType {
        ResponseType::Concrete(TypeBinding::of::<T>(alias))
    }

    #[test]
    fn associating_a_different_type_replaces_the_binding() {
        let codec = XmlCodec::new();
        let widget = TypeBinding::of::<Widget>("Item");
        let gizmo = TypeBinding::of::<Gizmo>("Item");

        assert_eq!(codec.associate("Item", &widget), AliasChange::Added);
        assert_eq!(codec.associate("Item", &widget), AliasChange::Unchanged);
        assert!(matches!(
            codec.associate("Item", &gizmo),
            AliasChange::Replaced { previous } if previous.ends_with("Widget")
        ));
        assert!(codec.binding("Item").expect("bound").is::<Gizmo>());
    }

    #[test]
    fn reused_alias_decodes_as_the_latest_type() {
        let codec = XmlCodec::new();
        let bytes = Bytes::from_static(b"<Item><Name>first</Name><Size>4</Size></Item>");

        let widget = codec
            .decode(bytes.clone(), Some(&concrete::<Widget>("Item")), None)
            .expect("widget")
            .into_record::<Widget>()
            .expect("typed widget");
        assert_eq!(widget.name, "first");

        let gizmo = codec
            .decode(bytes, Some(&concrete::<Gizmo>("Item")), None)
            .expect("gizmo")
            .into_record::<Gizmo>()
            .expect("typed gizmo");
        assert_eq!(gizmo.size, Some(4));
    }

    #[test]
    fn concurrent_decodes_rebinding_one_alias_never_mismatch() {
        let codec = std::sync::Arc::new(XmlCodec::new());
        let bytes = Bytes::from_static(b"<Item><Name>x</Name></Item>");

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let codec = codec.clone();
                let bytes = bytes.clone();
                std::thread::spawn(move || {
                    let mut failures = 0_usize;
                    for round in 0..2_000 {
                        let response = if (worker + round) % 2 == 0 {
                            concrete::<Widget>("Item")
                        } else {
                            concrete::<Gizmo>("Item")
                        };
                        if codec.decode(bytes.clone(), Some(&response), None).is_err() {
                            failures += 1;
                        }
                    }
                    failures
                })
            })
            .collect();

        let failures: usize = workers
            .into_iter()
            .map(|worker| worker.join().expect("worker finished"))
            .sum();
        assert_eq!(failures, 0);
    }

    #[test]
    fn alias_hint_overrides_binding_alias() {
        let codec = XmlCodec::new();
        let bytes = Bytes::from_static(b"<Merchandise__c><Name>hint</Name></Merchandise__c>");

        let widget = codec
            .decode(
                bytes,
                Some(&concrete::<Widget>("Widget")),
                Some("Merchandise__c"),
            )
            .expect("decodes under hinted alias")
            .into_record::<Widget>()
            .expect("typed");
        assert_eq!(widget.name, "hint");
    }

    #[test]
    fn root_bound_to_another_type_is_rejected() {
        let codec = XmlCodec::new();
        codec.associate("Gizmo", &TypeBinding::of::<Gizmo>("Gizmo"));

        let error = codec
            .decode(
                Bytes::from_static(b"<Gizmo><Name>g</Name></Gizmo>"),
                Some(&concrete::<Widget>("Widget")),
                None,
            )
            .expect_err("root belongs to Gizmo");
        assert!(error.to_string().contains("expected"), "{error}");
    }

    #[test]
    fn unbound_root_is_rejected() {
        let codec = XmlCodec::new();
        let error = codec
            .decode(
                Bytes::from_static(b"<Unknown><Name>u</Name></Unknown>"),
                Some(&concrete::<Widget>("Widget")),
                None,
            )
            .expect_err("no binding for root");
        assert!(error.to_string().contains("<Unknown>"), "{error}");
    }

    #[test]
    fn lists_decode_children_of_the_wrapper() {
        let bytes = Bytes::from_static(
            b"<batchInfoList>\
                <batchInfo><id>751A</id><state>Queued</state></batchInfo>\
                <batchInfo><id>751B</id><state>Completed</state></batchInfo>\
              </batchInfoList>",
        );
        let batches = XmlCodec::new()
            .decode(
                bytes,
                Some(&ResponseType::ListOf(TypeBinding::of::<Batch>("batchInfo"))),
                None,
            )
            .expect("list")
            .into_records::<Batch>()
            .expect("typed list");

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].state, "Completed");
    }

    #[test]
    fn encoding_uses_the_requested_root_and_drops_nulls() {
        let bytes = XmlCodec::new()
            .encode_document(
                "jobInfo",
                &serde_json::json!({"operation": "insert", "object": "Account", "state": null}),
            )
            .expect("encodes");
        let text = std::str::from_utf8(&bytes).expect("utf8");

        assert!(text.starts_with("<jobInfo>"), "{text}");
        assert!(text.contains("<object>Account</object>"), "{text}");
        assert!(!text.contains("state"), "{text}");
    }
}
