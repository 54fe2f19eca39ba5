//! `OpenAPI` `$ref` resolver.
//!
//! The `openapiv3` crate models `$ref`s using `ReferenceOr<T>` but does not resolve them.
//! Real-world specs frequently split definitions across files (or URLs).
//!
//! This resolver supports:
//! - Local refs (`#/...`)
//! - File refs (`./common.yaml#/...`, `/abs/path/spec.yaml#/...`, `file:///...#/...`)
//! - URL refs (`https://example.com/common.yaml#/...`)
//!
//! `$ref` resolution is **relative to the document that contains the `$ref`**, so callers pass
//! the current document id (`DocId`) when resolving. External documents are loaded through the
//! same [`SpecSourceProvider`] as the root spec.

use crate::error::{OpenApiToolsError, Result};
use crate::source::{SpecSource, SpecSourceProvider, parse_document};
use openapiv3::{OpenAPI, Parameter, PathItem, ReferenceOr, RequestBody, Response, Schema};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use url::Url;

/// Nested `$ref`s inside schemas are inlined up to this depth.
const MAX_INLINE_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocId {
    Url(Url),
    File(PathBuf),
    /// Root document supplied as text; relative refs resolve against the working directory.
    Inline,
}

impl DocId {
    #[must_use]
    pub fn for_source(source: &SpecSource) -> Self {
        match source {
            SpecSource::Url(u) => DocId::Url(strip_fragment(u.clone())),
            SpecSource::File(p) => DocId::File(canonicalize_best_effort(p.clone())),
            SpecSource::Inline(_) => DocId::Inline,
        }
    }

    fn display(&self) -> String {
        match self {
            DocId::Url(u) => u.to_string(),
            DocId::File(p) => p.display().to_string(),
            DocId::Inline => "inline".to_string(),
        }
    }
}

fn strip_fragment(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

fn canonicalize_best_effort(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

pub struct OpenApiResolver<'a> {
    root_doc: DocId,
    provider: &'a dyn SpecSourceProvider,
    docs: RwLock<HashMap<DocId, Arc<Value>>>,
}

impl<'a> OpenApiResolver<'a> {
    /// Create a new resolver for a root `OpenAPI` document.
    ///
    /// # Errors
    ///
    /// Returns an error if the root spec cannot be converted into JSON for caching.
    pub fn new(root_doc: DocId, spec: &OpenAPI, provider: &'a dyn SpecSourceProvider) -> Result<Self> {
        let root_value =
            serde_json::to_value(spec).map_err(|e| OpenApiToolsError::Reference(e.to_string()))?;
        let mut docs = HashMap::new();
        docs.insert(root_doc.clone(), Arc::new(root_value));
        Ok(Self {
            root_doc,
            provider,
            docs: RwLock::new(docs),
        })
    }

    #[must_use]
    pub fn root_doc(&self) -> &DocId {
        &self.root_doc
    }

    /// Resolve a `$ref` for a parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved, or if the referenced document
    /// cannot be loaded/parsed.
    pub async fn resolve_parameter(
        &self,
        current_doc: &DocId,
        param: &ReferenceOr<Parameter>,
    ) -> Result<(DocId, Parameter)> {
        self.resolve_reference_or(current_doc, param).await
    }

    /// Resolve a `$ref` for a request body.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub async fn resolve_request_body(
        &self,
        current_doc: &DocId,
        body: &ReferenceOr<RequestBody>,
    ) -> Result<(DocId, RequestBody)> {
        self.resolve_reference_or(current_doc, body).await
    }

    /// Resolve a `$ref` for a schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub async fn resolve_schema(
        &self,
        current_doc: &DocId,
        schema: &ReferenceOr<Schema>,
    ) -> Result<(DocId, Schema)> {
        self.resolve_reference_or(current_doc, schema).await
    }

    /// Resolve a `$ref` for a response.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub async fn resolve_response(
        &self,
        current_doc: &DocId,
        response: &ReferenceOr<Response>,
    ) -> Result<(DocId, Response)> {
        self.resolve_reference_or(current_doc, response).await
    }

    /// Resolve a `$ref` for a path item.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub async fn resolve_path_item(
        &self,
        current_doc: &DocId,
        item: &ReferenceOr<PathItem>,
    ) -> Result<(DocId, PathItem)> {
        self.resolve_reference_or(current_doc, item).await
    }

    /// Resolve a schema reference and return it as JSON with nested `$ref`s inlined.
    ///
    /// Unresolvable nested refs are left as `{"$ref": ...}`; recursive refs become `{}`.
    pub async fn schema_json(&self, current_doc: &DocId, schema: &ReferenceOr<Schema>) -> Value {
        let raw = match schema {
            ReferenceOr::Item(s) => serde_json::to_value(s).unwrap_or_else(|_| json!({})),
            ReferenceOr::Reference { reference } => json!({ "$ref": reference }),
        };
        let mut active = Vec::new();
        self.inline_refs(current_doc.clone(), raw, &mut active, 0).await
    }

    fn inline_refs<'b>(
        &'b self,
        doc: DocId,
        value: Value,
        active: &'b mut Vec<String>,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Value> + Send + 'b>> {
        Box::pin(async move {
            match value {
                Value::Object(map) => {
                    if let Some(Value::String(reference)) = map.get("$ref") {
                        let reference = reference.clone();
                        let Ok(key) = Self::canonical_ref_key(&doc, &reference) else {
                            return Value::Object(map);
                        };
                        if active.contains(&key) {
                            return json!({});
                        }
                        if depth >= MAX_INLINE_DEPTH {
                            return Value::Object(map);
                        }
                        let Ok((target_doc, target)) = self.resolve_ref_value(&doc, &reference).await
                        else {
                            return Value::Object(map);
                        };
                        active.push(key);
                        let inlined = self.inline_refs(target_doc, target, active, depth + 1).await;
                        active.pop();
                        return inlined;
                    }

                    let mut out = serde_json::Map::with_capacity(map.len());
                    for (k, v) in map {
                        let v = self.inline_refs(doc.clone(), v, active, depth).await;
                        out.insert(k, v);
                    }
                    Value::Object(out)
                }
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for v in items {
                        out.push(self.inline_refs(doc.clone(), v, active, depth).await);
                    }
                    Value::Array(out)
                }
                other => other,
            }
        })
    }

    async fn resolve_reference_or<T>(
        &self,
        current_doc: &DocId,
        r: &ReferenceOr<T>,
    ) -> Result<(DocId, T)>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut doc = current_doc.clone();
        let mut cur: ReferenceOr<T> = r.clone();

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok((doc, item)),
                ReferenceOr::Reference { reference } => {
                    let key = Self::canonical_ref_key(&doc, &reference)?;
                    if !seen.insert(key) {
                        return Err(OpenApiToolsError::Reference(format!(
                            "Cyclic $ref detected while resolving: {reference}",
                        )));
                    }

                    let (target_doc, value) = self.resolve_ref_value(&doc, &reference).await?;
                    let next: ReferenceOr<T> = serde_json::from_value(value).map_err(|e| {
                        OpenApiToolsError::Reference(format!(
                            "Failed to deserialize referenced value '{}' (doc {}) as expected type: {}",
                            reference,
                            target_doc.display(),
                            e
                        ))
                    })?;

                    doc = target_doc;
                    cur = next;
                }
            }
        }
    }

    async fn resolve_ref_value(
        &self,
        current_doc: &DocId,
        reference: &str,
    ) -> Result<(DocId, Value)> {
        let (target_doc, pointer) = Self::parse_ref(current_doc, reference)?;
        let doc_value = self.load_doc(&target_doc).await?;

        let selected = if let Some(ptr) = pointer {
            doc_value.pointer(&ptr).cloned().ok_or_else(|| {
                OpenApiToolsError::Reference(format!(
                    "Unresolved $ref '{}' (doc {}, missing pointer '{}')",
                    reference,
                    target_doc.display(),
                    ptr
                ))
            })?
        } else {
            (*doc_value).clone()
        };

        Ok((target_doc, selected))
    }

    fn parse_ref(current_doc: &DocId, reference: &str) -> Result<(DocId, Option<String>)> {
        if let Some(frag) = reference.strip_prefix('#') {
            let ptr = if frag.is_empty() {
                None
            } else if frag.starts_with('/') {
                Some(frag.to_string())
            } else {
                return Err(OpenApiToolsError::Reference(format!(
                    "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}",
                )));
            };
            return Ok((current_doc.clone(), ptr));
        }

        let (doc_part, frag_part) = match reference.split_once('#') {
            Some((d, f)) => (d, Some(f)),
            None => (reference, None),
        };

        let target_doc = Self::resolve_doc(current_doc, doc_part)?;

        let ptr = match frag_part {
            Some("") | None => None,
            Some(frag) if frag.starts_with('/') => Some(frag.to_string()),
            Some(_) => {
                return Err(OpenApiToolsError::Reference(format!(
                    "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}",
                )));
            }
        };

        Ok((target_doc, ptr))
    }

    fn resolve_doc(current_doc: &DocId, doc_part: &str) -> Result<DocId> {
        if doc_part.is_empty() {
            return Ok(current_doc.clone());
        }

        if doc_part.starts_with("http://") || doc_part.starts_with("https://") {
            let url = Url::parse(doc_part).map_err(|e| {
                OpenApiToolsError::Reference(format!("Bad $ref URL '{doc_part}': {e}"))
            })?;
            return Ok(DocId::Url(strip_fragment(url)));
        }

        if doc_part.starts_with("file://") {
            let url = Url::parse(doc_part).map_err(|e| {
                OpenApiToolsError::Reference(format!("Bad $ref file URL '{doc_part}': {e}"))
            })?;
            let path = url.to_file_path().map_err(|()| {
                OpenApiToolsError::Reference(format!("Bad $ref file URL (not a path): {doc_part}"))
            })?;
            return Ok(DocId::File(canonicalize_best_effort(path)));
        }

        match current_doc {
            DocId::Url(base) => {
                let joined = base.join(doc_part).map_err(|e| {
                    OpenApiToolsError::Reference(format!(
                        "Failed to resolve relative $ref '{doc_part}' against base {base}: {e}",
                    ))
                })?;
                Ok(DocId::Url(strip_fragment(joined)))
            }
            DocId::File(base) => {
                let resolved = if Path::new(doc_part).is_absolute() {
                    PathBuf::from(doc_part)
                } else {
                    base.parent()
                        .unwrap_or_else(|| Path::new("."))
                        .join(doc_part)
                };
                Ok(DocId::File(canonicalize_best_effort(resolved)))
            }
            DocId::Inline => Ok(DocId::File(canonicalize_best_effort(PathBuf::from(
                doc_part,
            )))),
        }
    }

    fn canonical_ref_key(current_doc: &DocId, reference: &str) -> Result<String> {
        let (target_doc, pointer) = Self::parse_ref(current_doc, reference)?;
        let mut key = match &target_doc {
            DocId::Url(u) => format!("url:{u}"),
            DocId::File(p) => format!("file:{}", p.display()),
            DocId::Inline => "inline:".to_string(),
        };
        if let Some(ptr) = pointer {
            key.push('#');
            key.push_str(&ptr);
        }
        Ok(key)
    }

    async fn load_doc(&self, doc: &DocId) -> Result<Arc<Value>> {
        if let Some(v) = self.docs.read().get(doc).cloned() {
            return Ok(v);
        }

        let source = match doc {
            DocId::File(path) => SpecSource::File(path.clone()),
            DocId::Url(url) => SpecSource::Url(url.clone()),
            DocId::Inline => {
                return Err(OpenApiToolsError::Reference(
                    "inline root document is not loaded".to_string(),
                ));
            }
        };
        let content = self.provider.load(&source).await.map_err(|e| {
            OpenApiToolsError::Reference(format!(
                "Failed to load referenced document {}: {e}",
                doc.display()
            ))
        })?;

        let parsed = parse_document(&content).map_err(|e| {
            OpenApiToolsError::Reference(format!(
                "Failed to parse referenced document {}: {e}",
                doc.display(),
            ))
        })?;

        let parsed = Arc::new(parsed);
        self.docs.write().insert(doc.clone(), Arc::clone(&parsed));
        Ok(parsed)
    }
}
