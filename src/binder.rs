//! Binder: the public entry point
//!
//! A [`Binder`] owns the traversal level, the two error factories and the
//! plan cache. It is `Send + Sync`; share one instance across request
//! handlers.
//!
//! ```
//! use apibind::{bind_record, Binder};
//!
//! #[derive(Debug, Default)]
//! struct Search {
//!     page: u32,
//!     token: String,
//! }
//!
//! bind_record!(Search {
//!     page => "query:'page'; required",
//!     token => "header:'X-Token'",
//! });
//!
//! let req = http::Request::builder()
//!     .uri("/search?page=2")
//!     .header("X-Token", "abc")
//!     .body(Vec::new())
//!     .unwrap();
//!
//! let binder = Binder::new();
//! let mut search = Search::default();
//! binder.bind(&mut search, &req, &()).unwrap();
//! assert_eq!(search.page, 2);
//! assert_eq!(search.token, "abc");
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::Request;

use crate::cache::PlanCache;
use crate::config::{BinderConfig, Level};
use crate::dispatch;
use crate::error::{
    default_bind_error_factory, default_validation_error_factory, BindFailure, BoxError,
    ErrorFactory,
};
use crate::plan::{self, Plan};
use crate::record::Record;
use crate::request::{PathParams, RequestView};
use crate::validate;

/// Monomorphized entry for one registered record type.
type ErasedBind = fn(&Binder, &mut dyn Any, &RequestView<'_>, bool) -> Result<(), BoxError>;

pub struct Binder {
    level: Level,
    cache: PlanCache,
    bind_error: ErrorFactory,
    validation_error: ErrorFactory,
    registry: HashMap<TypeId, ErasedBind>,
}

impl Default for Binder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("level", &self.level)
            .field("cached_plans", &self.cache.len())
            .field("registered", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Binder {
    /// `FirstAndTagged` traversal, default error factories.
    pub fn new() -> Self {
        BinderBuilder::new().build()
    }

    pub fn builder() -> BinderBuilder {
        BinderBuilder::new()
    }

    pub fn from_config(config: &BinderConfig) -> Self {
        BinderBuilder::new().config(config).build()
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Number of record types with a cached plan.
    pub fn cached_plans(&self) -> usize {
        self.cache.len()
    }

    /// Cached plan for `R`, building it on first use.
    pub fn plan<R: Record>(&self) -> Result<Arc<Plan>, BoxError> {
        self.cache
            .get_or_try_insert_with(TypeId::of::<R>(), || plan::build_for::<R>(self.level))
            .map_err(|failure| self.bind_failure(&failure))
    }

    /// Populate `dest` from `req`. Validation rules are not run.
    pub fn bind<R, B>(
        &self,
        dest: &mut R,
        req: &Request<B>,
        path_params: &dyn PathParams,
    ) -> Result<(), BoxError>
    where
        R: Record,
        B: AsRef<[u8]>,
    {
        self.bind_view(dest, &RequestView::new(req, path_params), false)
    }

    /// Populate `dest`, then validate it if its type carries `vd` rules.
    pub fn bind_and_validate<R, B>(
        &self,
        dest: &mut R,
        req: &Request<B>,
        path_params: &dyn PathParams,
    ) -> Result<(), BoxError>
    where
        R: Record,
        B: AsRef<[u8]>,
    {
        self.bind_view(dest, &RequestView::new(req, path_params), true)
    }

    /// Run validation rules against an already populated value.
    ///
    /// Checks live in the type's plan, so a type whose plan cannot be built
    /// (conflicting sources, unsettable field, bad rule text) fails here too,
    /// through the bind factory. Only checks on fields the traversal level
    /// visits are run.
    pub fn validate<R: Record>(&self, value: &R) -> Result<(), BoxError> {
        let plan = self.plan::<R>()?;
        self.check(&plan, value)
    }

    /// [`bind`](Self::bind) for a destination known only as `dyn Any`.
    ///
    /// The concrete type must have been registered with
    /// [`BinderBuilder::register`].
    pub fn bind_any<B: AsRef<[u8]>>(
        &self,
        dest: &mut dyn Any,
        req: &Request<B>,
        path_params: &dyn PathParams,
    ) -> Result<(), BoxError> {
        self.bind_erased(dest, &RequestView::new(req, path_params), false)
    }

    /// [`bind_and_validate`](Self::bind_and_validate) for a `dyn Any` destination.
    pub fn bind_and_validate_any<B: AsRef<[u8]>>(
        &self,
        dest: &mut dyn Any,
        req: &Request<B>,
        path_params: &dyn PathParams,
    ) -> Result<(), BoxError> {
        self.bind_erased(dest, &RequestView::new(req, path_params), true)
    }

    fn bind_erased(
        &self,
        dest: &mut dyn Any,
        req: &RequestView<'_>,
        validate: bool,
    ) -> Result<(), BoxError> {
        match self.registry.get(&(*dest).type_id()) {
            Some(entry) => entry(self, dest, req, validate),
            None => Err(self.bind_failure(&BindFailure::NotARecord)),
        }
    }

    fn bind_view<R: Record>(
        &self,
        dest: &mut R,
        req: &RequestView<'_>,
        validate: bool,
    ) -> Result<(), BoxError> {
        let plan = self.plan::<R>()?;
        dispatch::bind_fields(&plan, dest, req).map_err(|failure| self.bind_failure(&failure))?;
        if validate && plan.has_validation() {
            self.check(&plan, dest)?;
        }
        Ok(())
    }

    fn check<R: Record>(&self, plan: &Plan, value: &R) -> Result<(), BoxError> {
        match validate::first_violation(plan, value) {
            Some(check) => Err((self.validation_error)(check.selector(), check.msg())),
            None => Ok(()),
        }
    }

    fn bind_failure(&self, failure: &BindFailure) -> BoxError {
        (self.bind_error)(failure.selector(), &failure.to_string())
    }
}

fn erased_entry<R: Record>(
    binder: &Binder,
    dest: &mut dyn Any,
    req: &RequestView<'_>,
    validate: bool,
) -> Result<(), BoxError> {
    match dest.downcast_mut::<R>() {
        Some(dest) => binder.bind_view(dest, req, validate),
        None => Err(binder.bind_failure(&BindFailure::NotARecord)),
    }
}

/// Builder for [`Binder`]
pub struct BinderBuilder {
    level: Level,
    bind_error: Option<ErrorFactory>,
    validation_error: Option<ErrorFactory>,
    registry: HashMap<TypeId, ErasedBind>,
}

impl Default for BinderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BinderBuilder {
    pub fn new() -> Self {
        Self {
            level: Level::default(),
            bind_error: None,
            validation_error: None,
            registry: HashMap::new(),
        }
    }

    /// Set the traversal level
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Apply a loaded configuration
    pub fn config(mut self, config: &BinderConfig) -> Self {
        self.level = config.level;
        self
    }

    /// Factory for binding failures; `None` restores the default.
    pub fn bind_error_factory(mut self, factory: Option<ErrorFactory>) -> Self {
        self.bind_error = factory;
        self
    }

    /// Factory for validation failures; `None` restores the default.
    pub fn validation_error_factory(mut self, factory: Option<ErrorFactory>) -> Self {
        self.validation_error = factory;
        self
    }

    /// Allow `R` as a destination of [`Binder::bind_any`].
    pub fn register<R: Record>(mut self) -> Self {
        self.registry
            .insert(TypeId::of::<R>(), erased_entry::<R> as ErasedBind);
        self
    }

    pub fn build(self) -> Binder {
        Binder {
            level: self.level,
            cache: PlanCache::new(),
            bind_error: self.bind_error.unwrap_or_else(default_bind_error_factory),
            validation_error: self
                .validation_error
                .unwrap_or_else(default_validation_error_factory),
            registry: self.registry,
        }
    }
}
