use crate::error::CacheResult;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};

/// A resolved cache key.
///
/// # Examples
///
/// ```
/// use tiercache_core::CacheKey;
///
/// let key = CacheKey::from_invocation("OrderService", "find", &[&42u64, &"eu"]);
/// assert_eq!(key.as_str(), "OrderService.find(42|\"eu\")");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        CacheKey(key.into())
    }

    /// Default key for a call: the target and method names followed by the
    /// `Debug` rendering of each argument, joined with `|`.
    pub fn from_invocation(target: &str, method: &str, args: &[&dyn Debug]) -> Self {
        let args: Vec<String> = args.iter().map(|arg| format!("{:?}", arg)).collect();
        CacheKey(format!("{}.{}({})", target, method, args.join("|")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        CacheKey(key)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        CacheKey(key.to_string())
    }
}

/// Evaluates key, condition and unless expressions against a call context.
///
/// The engine never parses expressions itself; the host supplies the
/// evaluator and the engine only sees the resulting key or boolean.
pub trait KeyExpressionEvaluator<Ctx: ?Sized>: Send + Sync {
    fn resolve_key(&self, context: &Ctx) -> CacheResult<CacheKey>;

    /// `true` if the call should go through the cache at all.
    fn evaluate_condition(&self, expr: &str, context: &Ctx) -> bool;

    /// `true` if a freshly computed `result` must not be kept in the cache.
    /// `None` is a "not found" result.
    fn evaluate_unless(&self, expr: &str, context: &Ctx, result: Option<&[u8]>) -> bool;
}

/// [`KeyExpressionEvaluator`] built from closures.
///
/// # Examples
///
/// ```
/// use tiercache_core::{CacheKey, FnKeyEvaluator, KeyExpressionEvaluator};
///
/// let evaluator = FnKeyEvaluator::new(|id: &u64| Ok(CacheKey::new(format!("order:{}", id))))
///     .with_condition(|_expr, id| *id != 0)
///     .with_unless(|_expr, _id, result| result.is_none());
///
/// assert_eq!(evaluator.resolve_key(&42).unwrap().as_str(), "order:42");
/// assert!(!evaluator.evaluate_condition("id != 0", &0));
/// assert!(evaluator.evaluate_unless("result == null", &42, None));
/// ```
pub struct FnKeyEvaluator<Ctx: ?Sized> {
    key: Box<dyn Fn(&Ctx) -> CacheResult<CacheKey> + Send + Sync>,
    condition: Box<dyn Fn(&str, &Ctx) -> bool + Send + Sync>,
    unless: Box<dyn Fn(&str, &Ctx, Option<&[u8]>) -> bool + Send + Sync>,
}

impl<Ctx: ?Sized> FnKeyEvaluator<Ctx> {
    /// Conditions default to `true` and unless-expressions to `false`.
    pub fn new(key: impl Fn(&Ctx) -> CacheResult<CacheKey> + Send + Sync + 'static) -> Self {
        Self {
            key: Box::new(key),
            condition: Box::new(|_, _| true),
            unless: Box::new(|_, _, _| false),
        }
    }

    pub fn with_condition(mut self, condition: impl Fn(&str, &Ctx) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Box::new(condition);
        self
    }

    pub fn with_unless(
        mut self,
        unless: impl Fn(&str, &Ctx, Option<&[u8]>) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.unless = Box::new(unless);
        self
    }
}

impl<Ctx: ?Sized> KeyExpressionEvaluator<Ctx> for FnKeyEvaluator<Ctx> {
    fn resolve_key(&self, context: &Ctx) -> CacheResult<CacheKey> {
        (self.key)(context)
    }

    fn evaluate_condition(&self, expr: &str, context: &Ctx) -> bool {
        (self.condition)(expr, context)
    }

    fn evaluate_unless(&self, expr: &str, context: &Ctx, result: Option<&[u8]>) -> bool {
        (self.unless)(expr, context, result)
    }
}
