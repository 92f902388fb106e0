//! Metadata token resolution.
//!
//! The translator never reads metadata tables itself. Every token operand is handed to a
//! [`MemberResolver`] together with the token of the method being translated, which allows
//! implementations to resolve generic context or module-specific tables.
//!
//! Two implementations are provided:
//!
//! - [`MemoryResolver`] - an in-memory table, filled by the caller
//! - [`CachingResolver`] - wraps any resolver with a concurrent cache that hands out one shared
//!   representation per token, no matter how many threads resolve it at the same time
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use ciltac::metadata::{
//!     resolver::{CachingResolver, MemberResolver, MemoryResolver},
//!     token::Token,
//!     typesystem::TacType,
//! };
//!
//! let mut tables = MemoryResolver::new();
//! tables.add_type(Token::new(0x0100_0001), TacType::class("System.Exception"));
//!
//! let resolver = CachingResolver::new(tables);
//! let method = Token::new(0x0600_0001);
//! let first = resolver.resolve_type(method, Token::new(0x0100_0001))?;
//! let second = resolver.resolve_type(method, Token::new(0x0100_0001))?;
//! assert!(Arc::ptr_eq(&first, &second));
//! # Ok::<(), ciltac::Error>(())
//! ```

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;

use crate::{
    metadata::{
        members::{CallSiteSig, FieldSig, MethodSig},
        token::Token,
        typesystem::TacType,
    },
    Error, Result,
};

/// Resolves metadata tokens into typed members.
///
/// Implementations must be safe for concurrent reads, since independent methods may be
/// translated in parallel against the same resolver. A failed lookup returns
/// [`crate::Error::UnresolvedMember`]; callers substitute a placeholder and continue.
pub trait MemberResolver: Send + Sync {
    /// Resolves a `TypeDef`, `TypeRef` or `TypeSpec` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedMember`] if the token is unknown.
    fn resolve_type(&self, method: Token, token: Token) -> Result<Arc<TacType>>;

    /// Resolves a `MethodDef`, `MemberRef` or `MethodSpec` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedMember`] if the token is unknown.
    fn resolve_method(&self, method: Token, token: Token) -> Result<Arc<MethodSig>>;

    /// Resolves a `Field` or `MemberRef` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedMember`] if the token is unknown.
    fn resolve_field(&self, method: Token, token: Token) -> Result<Arc<FieldSig>>;

    /// Resolves a user string token.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedMember`] if the token is unknown.
    fn resolve_string(&self, method: Token, token: Token) -> Result<Arc<str>>;

    /// Resolves a `StandAloneSig` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnresolvedMember`] if the token is unknown.
    fn resolve_signature(&self, method: Token, token: Token) -> Result<Arc<CallSiteSig>>;
}

/// A resolver backed by in-memory tables.
///
/// Lookups ignore the requesting method; every token has exactly one meaning.
#[derive(Debug, Default, Clone)]
pub struct MemoryResolver {
    types: HashMap<Token, Arc<TacType>>,
    methods: HashMap<Token, Arc<MethodSig>>,
    fields: HashMap<Token, Arc<FieldSig>>,
    strings: HashMap<Token, Arc<str>>,
    signatures: HashMap<Token, Arc<CallSiteSig>>,
}

impl MemoryResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type token.
    pub fn add_type(&mut self, token: Token, ty: TacType) -> &mut Self {
        self.types.insert(token, Arc::new(ty));
        self
    }

    /// Registers a method token.
    pub fn add_method(&mut self, token: Token, method: MethodSig) -> &mut Self {
        self.methods.insert(token, Arc::new(method));
        self
    }

    /// Registers a field token.
    pub fn add_field(&mut self, token: Token, field: FieldSig) -> &mut Self {
        self.fields.insert(token, Arc::new(field));
        self
    }

    /// Registers a user string token.
    pub fn add_string(&mut self, token: Token, value: &str) -> &mut Self {
        self.strings.insert(token, Arc::from(value));
        self
    }

    /// Registers a standalone signature token.
    pub fn add_signature(&mut self, token: Token, signature: CallSiteSig) -> &mut Self {
        self.signatures.insert(token, Arc::new(signature));
        self
    }
}

fn lookup<T: ?Sized>(table: &HashMap<Token, Arc<T>>, token: Token) -> Result<Arc<T>> {
    table
        .get(&token)
        .cloned()
        .ok_or(Error::UnresolvedMember(token))
}

impl MemberResolver for MemoryResolver {
    fn resolve_type(&self, _method: Token, token: Token) -> Result<Arc<TacType>> {
        lookup(&self.types, token)
    }

    fn resolve_method(&self, _method: Token, token: Token) -> Result<Arc<MethodSig>> {
        lookup(&self.methods, token)
    }

    fn resolve_field(&self, _method: Token, token: Token) -> Result<Arc<FieldSig>> {
        lookup(&self.fields, token)
    }

    fn resolve_string(&self, _method: Token, token: Token) -> Result<Arc<str>> {
        lookup(&self.strings, token)
    }

    fn resolve_signature(&self, _method: Token, token: Token) -> Result<Arc<CallSiteSig>> {
        lookup(&self.signatures, token)
    }
}

/// A concurrent cache in front of another resolver.
///
/// The first successful resolution of a token is stored and returned to every later caller,
/// so all translations share one `Arc` per token. When two threads race on the same token, both
/// may consult the inner resolver, but only the first insertion is kept and returned to both.
/// Failures are not cached.
pub struct CachingResolver<R> {
    inner: R,
    types: DashMap<Token, Arc<TacType>>,
    methods: DashMap<Token, Arc<MethodSig>>,
    fields: DashMap<Token, Arc<FieldSig>>,
    strings: DashMap<Token, Arc<str>>,
    signatures: DashMap<Token, Arc<CallSiteSig>>,
}

impl<R: MemberResolver> CachingResolver<R> {
    /// Wraps `inner` with an empty cache.
    pub fn new(inner: R) -> Self {
        CachingResolver {
            inner,
            types: DashMap::new(),
            methods: DashMap::new(),
            fields: DashMap::new(),
            strings: DashMap::new(),
            signatures: DashMap::new(),
        }
    }

    /// Returns the wrapped resolver.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of cached entries across all member kinds.
    pub fn cached(&self) -> usize {
        self.types.len()
            + self.methods.len()
            + self.fields.len()
            + self.strings.len()
            + self.signatures.len()
    }
}

fn cached<T: ?Sized>(
    cache: &DashMap<Token, Arc<T>>,
    token: Token,
    resolve: impl FnOnce() -> Result<Arc<T>>,
) -> Result<Arc<T>> {
    if let Some(hit) = cache.get(&token) {
        return Ok(hit.value().clone());
    }

    let resolved = resolve()?;
    Ok(cache.entry(token).or_insert(resolved).value().clone())
}

impl<R: MemberResolver> MemberResolver for CachingResolver<R> {
    fn resolve_type(&self, method: Token, token: Token) -> Result<Arc<TacType>> {
        cached(&self.types, token, || self.inner.resolve_type(method, token))
    }

    fn resolve_method(&self, method: Token, token: Token) -> Result<Arc<MethodSig>> {
        cached(&self.methods, token, || self.inner.resolve_method(method, token))
    }

    fn resolve_field(&self, method: Token, token: Token) -> Result<Arc<FieldSig>> {
        cached(&self.fields, token, || self.inner.resolve_field(method, token))
    }

    fn resolve_string(&self, method: Token, token: Token) -> Result<Arc<str>> {
        cached(&self.strings, token, || self.inner.resolve_string(method, token))
    }

    fn resolve_signature(&self, method: Token, token: Token) -> Result<Arc<CallSiteSig>> {
        cached(&self.signatures, token, || {
            self.inner.resolve_signature(method, token)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rayon::prelude::*;

    use super::*;

    const METHOD: Token = Token::new(0x0600_0001);

    /// Hands out a fresh allocation on every call, so sharing can only come from the cache.
    struct Fresh {
        calls: AtomicUsize,
    }

    impl MemberResolver for Fresh {
        fn resolve_type(&self, _method: Token, token: Token) -> Result<Arc<TacType>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if token.row() == 0 {
                return Err(Error::UnresolvedMember(token));
            }
            Ok(Arc::new(TacType::class(format!("T{}", token.row()))))
        }

        fn resolve_method(&self, _method: Token, token: Token) -> Result<Arc<MethodSig>> {
            Err(Error::UnresolvedMember(token))
        }

        fn resolve_field(&self, _method: Token, token: Token) -> Result<Arc<FieldSig>> {
            Err(Error::UnresolvedMember(token))
        }

        fn resolve_string(&self, _method: Token, token: Token) -> Result<Arc<str>> {
            Ok(Arc::from(format!("s{}", token.row()).as_str()))
        }

        fn resolve_signature(&self, _method: Token, token: Token) -> Result<Arc<CallSiteSig>> {
            Err(Error::UnresolvedMember(token))
        }
    }

    #[test]
    fn memory_resolver_lookup() {
        let mut resolver = MemoryResolver::new();
        resolver
            .add_type(Token::new(0x0200_0001), TacType::I32)
            .add_string(Token::new(0x7000_0001), "hello");

        assert_eq!(
            *resolver
                .resolve_type(METHOD, Token::new(0x0200_0001))
                .unwrap(),
            TacType::I32
        );
        assert_eq!(
            &*resolver
                .resolve_string(METHOD, Token::new(0x7000_0001))
                .unwrap(),
            "hello"
        );
        assert!(matches!(
            resolver.resolve_method(METHOD, Token::new(0x0A00_0001)),
            Err(Error::UnresolvedMember(t)) if t == Token::new(0x0A00_0001)
        ));
    }

    #[test]
    fn caching_shares_one_representation() {
        let resolver = CachingResolver::new(Fresh {
            calls: AtomicUsize::new(0),
        });
        let token = Token::new(0x0200_0007);

        let a = resolver.resolve_type(METHOD, token).unwrap();
        let b = resolver.resolve_type(Token::new(0x0600_0002), token).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(resolver.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cached(), 1);
    }

    #[test]
    fn caching_does_not_store_failures() {
        let resolver = CachingResolver::new(Fresh {
            calls: AtomicUsize::new(0),
        });
        let token = Token::new(0x0200_0000);
        assert!(resolver.resolve_type(METHOD, token).is_err());
        assert!(resolver.resolve_type(METHOD, token).is_err());
        assert_eq!(resolver.inner().calls.load(Ordering::SeqCst), 2);
        assert_eq!(resolver.cached(), 0);
    }

    #[test]
    fn concurrent_resolution_converges() {
        let resolver = CachingResolver::new(Fresh {
            calls: AtomicUsize::new(0),
        });
        let token = Token::new(0x7000_0042);

        let results: Vec<Arc<str>> = (0..64)
            .into_par_iter()
            .map(|_| resolver.resolve_string(METHOD, token).unwrap())
            .collect();

        let first = &results[0];
        assert!(results.iter().all(|r| Arc::ptr_eq(r, first)));
        assert_eq!(&**first, "s66");
    }
}
