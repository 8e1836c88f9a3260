use std::fmt;

#[allow(unused_macros)]
macro_rules! err {
    ($base:ident, $msg:literal) => {
        DexError::with_context($base, $msg)
    };
    ($base:ident, $fmtstr:literal, $($args:tt)*) => {
        DexError::with_context($base, format!($fmtstr, $($args)*))
    };
    ($msg:literal) => {
        DexError::new($msg)
    };
    ($fmtstr:literal, $($args:tt)*) => {
        DexError::new(format!($fmtstr, $($args)*))
    };
}


#[macro_export]
macro_rules! fail {
    ($msg:literal) => {
        return Err(DexError::new($msg))
    };
    (($msg:literal), ($context:literal)) => {
        return Err(DexError::with_context(DexError::new($msg), $context))
    };
    ($fmtstr:literal, $($args:tt)*) => {
        return Err(DexError::new(format!($fmtstr, $($args)*)))
    };
    (($fmtstr:literal, $($args:tt)*), ($contextfmt:literal, $($contextargs:tt)*)) => {
        return Err(DexError::with_context(DexError::new(format!($fmtstr, $($args)*)), format!($contextfmt, $($contextargs)*)))
    };
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexError
{
    msg: String,
    contexts: Vec<String>,
}

impl DexError
{
    pub(crate) fn new(msg: impl Into<String>) -> Self
    {
        DexError {
            msg: msg.into(),
            contexts: Vec::new(),
        }
    }

    pub(crate) fn with_context(base: DexError, context: impl Into<String>) -> Self
    {
        let mut contexts = base.contexts;
        contexts.push(context.into());
        DexError { msg: base.msg, contexts }
    }

    /// The innermost message, without any context.
    pub fn message(&self) -> &str
    {
        &self.msg
    }
}

impl fmt::Display for DexError
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.msg)?;
        let mut connector = " for ";
        for context in &self.contexts
        {
            write!(f, "{}{}", connector, context)?;
            connector = " of ";
        }
        Ok(())
    }
}

impl std::error::Error for DexError {}
