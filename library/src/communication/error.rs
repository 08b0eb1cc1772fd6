use crate::BoxedError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Type erased, cloneable error which retains the error chain information
///
/// Errors raised while handling a delivery are usually nested several levels deep (a decode
/// error inside a resolver error inside a message error). Logging them with their `Display`
/// implementation only shows the outermost layer, so this type walks the [`source`](Error::source)
/// chain once and keeps every cause as a string.
///
/// It is also used wherever an error has to be handed to more than one party, e.g. the cause of
/// a lost broker connection which is observed by every consumer of a gateway.
///
/// When the error from which this is created contains another `BlackboxError` in its
/// source chain, it will be consumed and integrated so that one flat list of causes results.
///
/// The regular `Display` output joins all causes on one line (`outer: inner: root`) which keeps
/// structured log output readable. The alternate form (`{:#}`) renders one cause per line.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct BlackboxError(Vec<String>);

impl BlackboxError {
    /// Creates a new instance from any error type
    ///
    /// Due to std providing default implementations for the `From<T> where T: T` trait,
    /// we can't both implement `Error` and `From<Error>` and have to decide on one.
    pub fn new<E: Error + 'static>(e: E) -> Self {
        (&e as &(dyn Error + 'static)).into()
    }

    /// Creates a new instance from a boxed error type
    pub fn from_boxed(e: BoxedError) -> Self {
        (e.as_ref() as &(dyn Error + 'static)).into()
    }

    /// Creates a new instance from a plain message without any further causes
    pub fn from_message<S: Into<String>>(message: S) -> Self {
        Self(vec![message.into()])
    }

    /// List of causes, beginning with the outermost error
    pub fn causes(&self) -> &[String] {
        &self.0
    }

    /// Innermost cause of the chain
    pub fn root_cause(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Consumes the error and returns the underlying list of causes
    pub fn into_causes(self) -> Vec<String> {
        self.0
    }
}

impl Error for BlackboxError {}

impl Display for BlackboxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (first, rest) = match self.0.split_first() {
            Some(split) => split,
            None => return write!(f, "unknown error"),
        };

        if !f.alternate() {
            write!(f, "{}", first)?;
            for cause in rest {
                write!(f, ": {}", cause)?;
            }
            return Ok(());
        }

        writeln!(f, "Error: {}", first)?;

        if !rest.is_empty() {
            writeln!(f, "\nCaused by:")?;
            for (index, cause) in rest.iter().enumerate() {
                writeln!(f, "    {}: {}", index, cause)?;
            }
        }

        Ok(())
    }
}

impl From<&(dyn Error + 'static)> for BlackboxError {
    fn from(e: &(dyn Error + 'static)) -> Self {
        let mut source: Option<&(dyn Error + 'static)> = Some(e);
        let mut causes: Vec<String> = Vec::new();

        while let Some(error) = source {
            // Integrate any child BlackboxErrors and use ToString for anything else
            if let Some(blackbox_error) = error.downcast_ref::<BlackboxError>() {
                causes.extend(blackbox_error.0.iter().cloned());
            } else {
                causes.push(error.to_string());
            }

            source = error.source();
        }

        Self(causes)
    }
}
