//! # Spec Module
//!
//! OpenAPI 3.1 document loading and indexing. The document stays a raw JSON
//! tree (so keyword locations are honest pointers into the source) and is
//! indexed exactly once: an ordered path-template list for routing and an
//! `operationId` map for caller hints. Structural defects — duplicate
//! capture names in a template, duplicate `operationId`s, unresolvable
//! `$ref`s — fail construction; everything after load is read-only.

mod load;
mod types;

pub use load::{Document, SpecError};
pub use types::{
    OperationMeta, ParameterLocation, ParameterMeta, ParameterStyle, PathTemplate,
    RequestBodyMeta, ResponseKey, ResponseMeta,
};
