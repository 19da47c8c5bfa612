//! # oascheck
//!
//! **oascheck** validates HTTP requests and responses against an
//! [OpenAPI 3.1](https://spec.openapis.org/oas/v3.1.0) document. Given a
//! loaded description it answers two questions for any message: which
//! operation does it target, and does it conform — path parameters, query
//! parameters, headers, body by media type, status code, and response
//! headers. Every error carries two synchronized JSON pointers: an
//! *instance location* into a synthetic `/request/...` or `/response/...`
//! tree and a *keyword location* into the document itself.
//!
//! ## Architecture
//!
//! - **[`spec`]** - document loading and one-shot indexing (path templates,
//!   `operationId` map)
//! - **[`router`]** - reverse path matching with per-template regexes and
//!   caller-hint verification
//! - **[`validate`]** - request/response orchestration
//! - **[`media_type`]** - media-type matching with wildcard precedence and
//!   payload decoders
//! - **[`schema`]** - draft 2020-12 evaluation of document subschemas, the
//!   `readOnly`/`writeOnly` policy walk, and the recursion guard
//! - **[`result`]** - the error/annotation model and its stable JSON shape
//! - **[`message`]** - minimal HTTP message traits, implemented for the
//!   `http` crate types
//! - **[`coerce`]** - wire-string to number coercion
//! - **[`location`]** - JSON pointer and absolute-location helpers
//!
//! ## Quick Start
//!
//! ```no_run
//! use oascheck::{Document, PathHints, Validator};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = Document::from_file("openapi.yaml")?;
//! let validator = Validator::new(document)?;
//!
//! let request = http::Request::builder()
//!     .method("POST")
//!     .uri("https://api.example.com/pets")
//!     .header("Content-Type", "application/json")
//!     .body(br#"{"name":"Fido"}"#.to_vec())?;
//!
//! // Resolve the operation once, validate both sides of the exchange.
//! let matched = validator
//!     .find_path(&request, &PathHints::default())
//!     .map_err(|result| format!("{:?}", result.errors()))?;
//! let outcome = validator.validate_request_with(&request, &matched);
//! if !outcome.is_valid() {
//!     for error in outcome.errors() {
//!         eprintln!("{error}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - Validation never panics and never returns partial results: runtime
//!   failures are error records inside a `ValidationResult`; only document
//!   construction returns `Err`.
//! - Error order is deterministic: matching, path parameters, query
//!   parameters (declaration order), headers (canonical sorted), body.
//! - After construction a [`Validator`] is immutable (aside from its
//!   compiled-schema cache) and safe to share across threads.

pub mod coerce;
pub mod location;
pub mod media_type;
pub mod message;
pub mod result;
pub mod router;
pub mod schema;
pub mod spec;
pub mod validate;

pub use message::{HttpRequest, HttpResponse};
pub use result::{Annotation, ErrorKind, ValidationError, ValidationResult};
pub use router::{PathHints, PathMatch};
pub use spec::{Document, SpecError};
pub use validate::Validator;
