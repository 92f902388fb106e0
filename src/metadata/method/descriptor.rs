//! The unit of translation: a method body together with its declared signature.

use crate::metadata::{
    method::{ExceptionHandler, MethodBody},
    token::Token,
    typesystem::TacType,
};

/// Everything the pipeline needs to know about one method.
///
/// Parameter types include the implicit `this` of instance methods as parameter 0, matching
/// the numbering used by `ldarg`.
///
/// # Examples
///
/// ```rust
/// use ciltac::metadata::{method::MethodDescriptor, token::Token, typesystem::TacType};
///
/// let method = MethodDescriptor::new("Add", Token::new(0x0600_0001))
///     .with_params(vec![TacType::I32, TacType::I32])
///     .with_return(TacType::I32)
///     .with_code(vec![0x02, 0x03, 0x58, 0x2A]);
/// assert_eq!(method.params.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    /// Name used in diagnostics and batch reports
    pub name: String,
    /// Metadata token of the method, passed to the member resolver
    pub token: Token,
    /// Parameter types, `this` first for instance methods
    pub params: Vec<TacType>,
    /// Return type, [`TacType::Void`] if none
    pub return_type: TacType,
    /// Local variable types in slot order
    pub locals: Vec<TacType>,
    /// The instruction stream
    pub code: Vec<u8>,
    /// Exception handling clauses in declaration order
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodDescriptor {
    /// Creates an empty `void` method without parameters, locals or code.
    #[must_use]
    pub fn new(name: impl Into<String>, token: Token) -> Self {
        MethodDescriptor {
            name: name.into(),
            token,
            params: Vec::new(),
            return_type: TacType::Void,
            locals: Vec::new(),
            code: Vec::new(),
            exception_handlers: Vec::new(),
        }
    }

    /// Creates a descriptor from a parsed method body.
    #[must_use]
    pub fn from_body(
        name: impl Into<String>,
        token: Token,
        params: Vec<TacType>,
        return_type: TacType,
        locals: Vec<TacType>,
        body: MethodBody,
    ) -> Self {
        MethodDescriptor {
            name: name.into(),
            token,
            params,
            return_type,
            locals,
            code: body.code,
            exception_handlers: body.exception_handlers,
        }
    }

    /// Sets the parameter types.
    #[must_use]
    pub fn with_params(mut self, params: Vec<TacType>) -> Self {
        self.params = params;
        self
    }

    /// Sets the return type.
    #[must_use]
    pub fn with_return(mut self, return_type: TacType) -> Self {
        self.return_type = return_type;
        self
    }

    /// Sets the local variable types.
    #[must_use]
    pub fn with_locals(mut self, locals: Vec<TacType>) -> Self {
        self.locals = locals;
        self
    }

    /// Sets the instruction stream.
    #[must_use]
    pub fn with_code(mut self, code: Vec<u8>) -> Self {
        self.code = code;
        self
    }

    /// Sets the exception handling clauses.
    #[must_use]
    pub fn with_handlers(mut self, handlers: Vec<ExceptionHandler>) -> Self {
        self.exception_handlers = handlers;
        self
    }
}
