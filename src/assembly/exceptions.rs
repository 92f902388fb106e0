//! Exception region import.
//!
//! Converts the byte-offset clauses of a method body into [`ExceptionClause`] records whose
//! boundaries are nodes of the decoded [`crate::assembly::InstructionList`]. Ranges are closed on
//! both ends: the last node of a range is the node preceding the one at `offset + length`. A
//! range ending at the end of the method resolves through the sentinel, which the list always
//! maps at its code length.

use std::{fmt, sync::Arc};

use log::debug;

use crate::{
    assembly::{instruction::InstrId, list::InstructionList},
    metadata::{
        method::ExceptionHandler, resolver::MemberResolver, token::Token, typesystem::TacType,
    },
    Error, Result,
};

/// What kind of handler a clause installs.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerKind {
    /// Typed handler, entered with an exception of the given type
    Catch(Arc<TacType>),
    /// Filtered handler; the predicate starts at `entry`
    Filter {
        /// First instruction of the filter predicate
        entry: InstrId,
    },
    /// Handler run on every exit from the protected range
    Finally,
    /// Handler run only when the protected range exits with an exception
    Fault,
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerKind::Catch(ty) => write!(f, "catch({ty})"),
            HandlerKind::Filter { entry } => write!(f, "filter({entry})"),
            HandlerKind::Finally => write!(f, "finally"),
            HandlerKind::Fault => write!(f, "fault"),
        }
    }
}

/// One exception handling clause over decoded instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionClause {
    /// Position of the clause in the method's clause table
    pub index: usize,
    /// First protected instruction
    pub try_begin: InstrId,
    /// Last protected instruction
    pub try_end: InstrId,
    /// First handler instruction
    pub handler_begin: InstrId,
    /// Last handler instruction
    pub handler_end: InstrId,
    /// Handler kind
    pub kind: HandlerKind,
}

impl ExceptionClause {
    /// Returns `true` for `finally` clauses.
    #[must_use]
    pub fn is_finally(&self) -> bool {
        self.kind == HandlerKind::Finally
    }

    /// Entry of the filter predicate, for filter clauses.
    #[must_use]
    pub fn filter_entry(&self) -> Option<InstrId> {
        match self.kind {
            HandlerKind::Filter { entry } => Some(entry),
            _ => None,
        }
    }

    /// Type of the exception on the stack when the handler or filter is entered.
    #[must_use]
    pub fn exception_type(&self) -> TacType {
        match &self.kind {
            HandlerKind::Catch(ty) => (**ty).clone(),
            _ => TacType::exception(),
        }
    }

    /// Returns `true` if `id` lies in the protected range.
    #[must_use]
    pub fn protects(&self, id: InstrId) -> bool {
        self.try_begin <= id && id <= self.try_end
    }

    /// Returns `true` if `id` lies in the handler.
    #[must_use]
    pub fn handles(&self, id: InstrId) -> bool {
        self.handler_begin <= id && id <= self.handler_end
    }
}

impl fmt::Display for ExceptionClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "try [{}, {}] {} [{}, {}]",
            self.try_begin, self.try_end, self.kind, self.handler_begin, self.handler_end
        )
    }
}

/// Resolves the clauses of `method` against its decoded instructions.
///
/// # Errors
/// Returns [`crate::Error::UnresolvableClause`] if a boundary does not fall on an instruction or a
/// range ends before it begins.
pub fn import_clauses(
    list: &InstructionList,
    handlers: &[ExceptionHandler],
    method: Token,
    resolver: &dyn MemberResolver,
) -> Result<Vec<ExceptionClause>> {
    handlers
        .iter()
        .enumerate()
        .map(|(index, handler)| import_clause(list, index, handler, method, resolver))
        .collect()
}

fn import_clause(
    list: &InstructionList,
    index: usize,
    handler: &ExceptionHandler,
    method: Token,
    resolver: &dyn MemberResolver,
) -> Result<ExceptionClause> {
    let (try_begin, try_end) = resolve_range(
        list,
        index,
        "try",
        handler.try_offset,
        handler.try_end(),
    )?;
    let (handler_begin, handler_end) = resolve_range(
        list,
        index,
        "handler",
        handler.handler_offset,
        handler.handler_end(),
    )?;

    let kind = if handler.is_filter() {
        HandlerKind::Filter {
            entry: resolve_begin(list, index, "filter", handler.filter_offset)?,
        }
    } else if handler.is_finally() {
        HandlerKind::Finally
    } else if handler.is_fault() {
        HandlerKind::Fault
    } else {
        let token = handler.class_token();
        let caught = resolver.resolve_type(method, token).unwrap_or_else(|error| {
            debug!("{method}: clause {index} catches unresolved {token} ({error})");
            Arc::new(TacType::exception())
        });
        HandlerKind::Catch(caught)
    };

    Ok(ExceptionClause {
        index,
        try_begin,
        try_end,
        handler_begin,
        handler_end,
        kind,
    })
}

fn resolve_begin(list: &InstructionList, index: usize, what: &str, offset: u32) -> Result<InstrId> {
    match list.node_at(offset) {
        Some(node) if !node.is_back() => Ok(node),
        _ => Err(Error::UnresolvableClause(format!(
            "clause {index}: {what} begins at IL_{offset:04X}, which is not an instruction"
        ))),
    }
}

fn resolve_range(
    list: &InstructionList,
    index: usize,
    what: &str,
    begin: u32,
    end: u64,
) -> Result<(InstrId, InstrId)> {
    let first = resolve_begin(list, index, what, begin)?;
    let after = u32::try_from(end)
        .ok()
        .and_then(|end| list.node_at(end))
        .ok_or_else(|| {
            Error::UnresolvableClause(format!(
                "clause {index}: {what} ends at IL_{end:04X}, which is not an instruction boundary"
            ))
        })?;

    let last = list.prev(after);
    if last.is_back() || last < first {
        return Err(Error::UnresolvableClause(format!(
            "clause {index}: {what} range IL_{begin:04X}..IL_{end:04X} is empty"
        )));
    }
    Ok((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::decoder::decode_method, metadata::resolver::MemoryResolver};

    const METHOD: Token = Token::new(0x0600_0001);

    // 0: nop ; 1: leave.s +3 (6) ; 3: pop ; 4: leave.s +0 (6) ; 6: ret
    const CODE: [u8; 7] = [0x00, 0xDE, 0x03, 0x26, 0xDE, 0x00, 0x2A];

    fn import(handlers: &[ExceptionHandler], resolver: &MemoryResolver) -> Result<Vec<ExceptionClause>> {
        let list = decode_method(&CODE, METHOD, resolver)?;
        import_clauses(&list, handlers, METHOD, resolver)
    }

    #[test]
    fn catch_clause_resolves_nodes_and_type() {
        let mut resolver = MemoryResolver::new();
        resolver.add_type(
            Token::new(0x0100_0005),
            TacType::class("System.DivideByZeroException"),
        );
        let clauses = import(
            &[ExceptionHandler::catch(0, 3, 3, 3, Token::new(0x0100_0005))],
            &resolver,
        )
        .unwrap();

        let clause = &clauses[0];
        assert_eq!(clause.try_begin, InstrId(0));
        assert_eq!(clause.try_end, InstrId(1));
        assert_eq!(clause.handler_begin, InstrId(2));
        assert_eq!(clause.handler_end, InstrId(3));
        assert_eq!(
            clause.exception_type(),
            TacType::class("System.DivideByZeroException")
        );
        assert!(clause.protects(InstrId(1)));
        assert!(!clause.protects(InstrId(2)));
        assert!(clause.handles(InstrId(3)));
    }

    #[test]
    fn handler_ending_at_method_end() {
        let clauses = import(&[ExceptionHandler::finally(0, 3, 3, 4)], &MemoryResolver::new()).unwrap();
        assert_eq!(clauses[0].handler_end, InstrId(4));
        assert!(clauses[0].is_finally());
        assert_eq!(clauses[0].exception_type(), TacType::exception());
    }

    #[test]
    fn unresolved_catch_type_falls_back() {
        let clauses = import(
            &[ExceptionHandler::catch(0, 3, 3, 3, Token::new(0x0100_0009))],
            &MemoryResolver::new(),
        )
        .unwrap();
        assert_eq!(clauses[0].exception_type(), TacType::exception());
    }

    #[test]
    fn filter_entry() {
        let clauses = import(&[ExceptionHandler::filter(0, 1, 4, 2, 3)], &MemoryResolver::new()).unwrap();
        assert_eq!(clauses[0].filter_entry(), Some(InstrId(2)));
    }

    #[test]
    fn invalid_ranges() {
        let resolver = MemoryResolver::new();
        // ends in the middle of leave.s
        assert!(matches!(
            import(&[ExceptionHandler::finally(0, 2, 3, 3)], &resolver),
            Err(Error::UnresolvableClause(_))
        ));
        // empty try
        assert!(matches!(
            import(&[ExceptionHandler::finally(1, 0, 3, 3)], &resolver),
            Err(Error::UnresolvableClause(_))
        ));
        // past the end
        assert!(matches!(
            import(&[ExceptionHandler::fault(0, 3, 3, 40)], &resolver),
            Err(Error::UnresolvableClause(_))
        ));
        // handler begins at the end of the method
        assert!(matches!(
            import(&[ExceptionHandler::fault(0, 3, 7, 0)], &resolver),
            Err(Error::UnresolvableClause(_))
        ));
    }
}
