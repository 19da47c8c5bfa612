//! # Validate Module
//!
//! The conformance facade. A [`Validator`] is built once from a loaded
//! [`Document`] and is then a pure function over messages: after
//! construction nothing is mutated except the compiled-validator cache, so
//! one instance can serve any number of threads.
//!
//! The three public operations share the [`PathMatch`] value as their
//! memoization channel: `find_path` produces it, `validate_request_with`
//! and `validate_response` consume it, and everything a caller supplies is
//! cross-checked against the message rather than trusted.

mod body;
mod params;
mod request;
mod response;

use crate::media_type::MediaTypeRegistry;
use crate::message::{HttpRequest, HttpResponse};
use crate::result::{ResultBuilder, ValidationError, ValidationResult};
use crate::router::{PathHints, PathMatch, Router};
use crate::schema::SchemaEvaluator;
use crate::spec::{Document, SpecError};

use request::{request_facts, validate_request_inner};
use response::validate_response_inner;

/// Shared read-only state for one validation call.
pub(crate) struct ValidateCx<'a> {
    pub document: &'a Document,
    pub evaluator: &'a SchemaEvaluator,
    pub registry: &'a MediaTypeRegistry,
}

pub struct Validator {
    document: Document,
    router: Router,
    evaluator: SchemaEvaluator,
    registry: MediaTypeRegistry,
}

impl Validator {
    pub fn new(document: Document) -> Result<Self, SpecError> {
        Self::with_registry(document, MediaTypeRegistry::new())
    }

    /// Build with a custom media-type registry (extra decoders).
    pub fn with_registry(
        document: Document,
        registry: MediaTypeRegistry,
    ) -> Result<Self, SpecError> {
        let evaluator = SchemaEvaluator::new(&document)?;
        let router = Router::new(&document);
        Ok(Validator {
            document,
            router,
            evaluator,
            registry,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    fn cx(&self) -> ValidateCx<'_> {
        ValidateCx {
            document: &self.document,
            evaluator: &self.evaluator,
            registry: &self.registry,
        }
    }

    fn invalid(&self, errors: Vec<ValidationError>, host: Option<&str>) -> ValidationResult {
        let mut out = ResultBuilder::new();
        for error in errors {
            out.push(error);
        }
        out.finish_resolved(self.document.uri(), host)
    }

    /// Resolve which operation `request` targets, honoring and verifying
    /// `hints`. On success every output field of the returned [`PathMatch`]
    /// is populated; on failure the result carries the matching errors.
    pub fn find_path(
        &self,
        request: &impl HttpRequest,
        hints: &PathHints,
    ) -> Result<PathMatch, ValidationResult> {
        let facts = request_facts(request);
        self.router
            .resolve(&self.document, Some(&facts), hints)
            .map_err(|errors| self.invalid(errors, facts.host.as_deref()))
    }

    /// The request-less form of [`find_path`](Self::find_path): resolve a
    /// match purely from hints (template or operation id plus method),
    /// taking any supplied captures at face value. Useful when only a
    /// response is available for validation.
    pub fn resolve_hints(&self, hints: &PathHints) -> Result<PathMatch, ValidationResult> {
        self.router
            .resolve(&self.document, None, hints)
            .map_err(|errors| self.invalid(errors, None))
    }

    /// Validate a request against the document.
    pub fn validate_request(&self, request: &impl HttpRequest) -> ValidationResult {
        self.validate_request_hinted(request, &PathHints::default())
    }

    /// Validate a request, reusing (and re-verifying) a previously resolved
    /// [`PathMatch`].
    pub fn validate_request_with(
        &self,
        request: &impl HttpRequest,
        matched: &PathMatch,
    ) -> ValidationResult {
        self.validate_request_hinted(request, &matched.as_hints())
    }

    fn validate_request_hinted(
        &self,
        request: &impl HttpRequest,
        hints: &PathHints,
    ) -> ValidationResult {
        let cx = self.cx();
        let (out, _) = validate_request_inner(&cx, &self.router, request, hints);
        out.finish_resolved(self.document.uri(), request.host())
    }

    /// Validate a response against the operation identified by `matched`.
    pub fn validate_response(
        &self,
        response: &impl HttpResponse,
        matched: &PathMatch,
    ) -> ValidationResult {
        let cx = self.cx();
        let mut out = ResultBuilder::new();
        validate_response_inner(&cx, matched, response, &mut out);
        out.finish_resolved(self.document.uri(), matched.host.as_deref())
    }

    /// Validate a response when no match is memoized, resolving the path
    /// from the paired request first.
    pub fn validate_response_for(
        &self,
        response: &impl HttpResponse,
        request: &impl HttpRequest,
    ) -> ValidationResult {
        match self.find_path(request, &PathHints::default()) {
            Ok(matched) => self.validate_response(response, &matched),
            Err(result) => result,
        }
    }
}
