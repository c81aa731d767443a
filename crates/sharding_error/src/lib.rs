//! Error type shared by every sharding crate.
//!
//! Errors are a message plus a classification, with optional key/value fields
//! carrying enough context (table, column, data source, SQL fragment) to
//! reconstruct a failure without re-running the statement.

use std::borrow::Cow;
use std::error::Error;
use std::fmt;

pub type Result<T, E = ShardingError> = std::result::Result<T, E>;

/// Broad classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    /// Invalid rule configuration or kernel properties.
    #[error("configuration error")]
    Config,
    /// A logical table has no rule and there's no default data source.
    #[error("table not found")]
    TableNotFound,
    /// A sharding algorithm couldn't pick a target, or binding tables
    /// disagreed on a shard.
    #[error("sharding algorithm error")]
    ShardingAlgorithm,
    /// Statement shape the kernel refuses to route.
    #[error("unsupported")]
    Unsupported,
    /// Rewrite tokens that don't line up with the SQL text. Always a bug
    /// upstream.
    #[error("rewrite contract violation")]
    RewriteContract,
    /// Failure reported by a physical shard.
    #[error("execution error")]
    Execution,
    /// Failure while advancing or reading a physical cursor during merge.
    #[error("merge error")]
    Merge,
    #[error("internal error")]
    Internal,
}

#[derive(Debug)]
struct ErrorField {
    key: Cow<'static, str>,
    value: String,
}

/// The error type.
///
/// Boxed inner so that `Result<T>` stays small on the happy path.
pub struct ShardingError {
    inner: Box<ShardingErrorInner>,
}

struct ShardingErrorInner {
    kind: ErrorKind,
    msg: String,
    fields: Vec<ErrorField>,
    source: Option<Box<dyn Error + Send + Sync>>,
}

impl ShardingError {
    /// Creates a new error with the `Internal` kind.
    pub fn new(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Internal, msg)
    }

    pub fn with_kind(kind: ErrorKind, msg: impl Into<String>) -> Self {
        ShardingError {
            inner: Box::new(ShardingErrorInner {
                kind,
                msg: msg.into(),
                fields: Vec::new(),
                source: None,
            }),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Config, msg)
    }

    pub fn table_not_found(table: impl fmt::Display) -> Self {
        Self::with_kind(ErrorKind::TableNotFound, "Cannot find table rule or default data source")
            .with_field("table", table)
    }

    pub fn sharding_algorithm(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::ShardingAlgorithm, msg)
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Unsupported, msg)
    }

    pub fn rewrite_contract(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::RewriteContract, msg)
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Execution, msg)
    }

    pub fn merge(msg: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Merge, msg)
    }

    /// Attach a key/value field to the error.
    ///
    /// Fields are rendered in insertion order.
    pub fn with_field<V>(mut self, key: impl Into<Cow<'static, str>>, value: V) -> Self
    where
        V: fmt::Display,
    {
        self.inner.fields.push(ErrorField {
            key: key.into(),
            value: value.to_string(),
        });
        self
    }

    pub fn with_source(mut self, source: Box<dyn Error + Send + Sync>) -> Self {
        self.inner.source = Some(source);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.inner.kind
    }

    pub fn message(&self) -> &str {
        &self.inner.msg
    }

    /// Get the value for a field if it exists.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.inner
            .fields
            .iter()
            .find(|f| f.key == key)
            .map(|f| f.value.as_str())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .fields
            .iter()
            .map(|f| (f.key.as_ref(), f.value.as_str()))
    }
}

impl fmt::Display for ShardingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.msg)?;
        for field in &self.inner.fields {
            write!(f, "\n  {}: {}", field.key, field.value)?;
        }
        if let Some(source) = &self.inner.source {
            write!(f, "\nError source: {source}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ShardingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardingError")
            .field("kind", &self.inner.kind)
            .field("msg", &self.inner.msg)
            .field("fields", &self.inner.fields)
            .field("source", &self.inner.source)
            .finish()
    }
}

impl Error for ShardingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner
            .source
            .as_deref()
            .map(|e| e as &(dyn Error + 'static))
    }
}

impl From<fmt::Error> for ShardingError {
    fn from(value: fmt::Error) -> Self {
        ShardingError::new("Format error").with_source(Box::new(value))
    }
}

impl From<std::num::ParseIntError> for ShardingError {
    fn from(value: std::num::ParseIntError) -> Self {
        ShardingError::config("Failed to parse integer").with_source(Box::new(value))
    }
}

pub trait ResultExt<T, E> {
    /// Wrap an error with a message, keeping the original as the source.
    fn context(self, msg: &'static str) -> Result<T>;

    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T, E> for std::result::Result<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| ShardingError::new(msg).with_source(Box::new(e)))
    }

    fn context_fn<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| ShardingError::new(f()).with_source(Box::new(e)))
    }
}

pub trait OptionExt<T> {
    /// Return an internal error if the option is `None`.
    fn required(self, msg: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, msg: &'static str) -> Result<T> {
        self.ok_or_else(|| ShardingError::new(format!("Missing required value: {msg}")))
    }
}

/// Return early with an `Unsupported` error.
#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)+) => {
        return Err($crate::ShardingError::unsupported(format!("Not yet implemented: {}", format!($($arg)+))))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_fields_in_order() {
        let err = ShardingError::sharding_algorithm("Binding tables routed to different shards")
            .with_field("table", "t_order")
            .with_field("other_table", "t_order_item");

        assert_eq!(ErrorKind::ShardingAlgorithm, err.kind());
        assert_eq!(
            "Binding tables routed to different shards\n  table: t_order\n  other_table: t_order_item",
            err.to_string()
        );
        assert_eq!(Some("t_order_item"), err.field("other_table"));
    }

    #[test]
    fn context_keeps_source() {
        let res: std::result::Result<i64, _> = "abc".parse::<i64>();
        let err = res.context("Failed to parse sharding value").unwrap_err();
        assert!(err.source().is_some());
        assert!(err.to_string().contains("Error source"));
    }

    #[test]
    fn required_on_none() {
        let err = None::<u8>.required("route unit").unwrap_err();
        assert_eq!(ErrorKind::Internal, err.kind());
    }

    #[test]
    fn not_implemented_macro() {
        fn f() -> Result<()> {
            not_implemented!("routing for {}", "hint strategy");
        }
        let err = f().unwrap_err();
        assert_eq!(ErrorKind::Unsupported, err.kind());
        assert!(err.message().contains("hint strategy"));
    }
}
