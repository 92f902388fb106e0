//! Exception handling scopes in TAC line coordinates.

use std::{fmt, ops::Range};

use crate::{
    analysis::tac::value::VarId,
    assembly::{ExceptionClause, HandlerKind, InstrId},
};

/// The translator's view of one exception clause.
///
/// A scope keeps the instruction ranges it was built from and the half-open line ranges the
/// clause covers in the statement list. Line ranges are maintained by
/// [`crate::analysis::tac::LineTransformer`] whenever statements are inserted or removed. Scopes
/// nest by containment of their try ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct EhScope {
    /// Index of the clause in the method's clause table
    pub clause: usize,
    /// Handler kind of the clause
    pub kind: HandlerKind,
    /// First and last protected instruction
    pub try_range: (InstrId, InstrId),
    /// First and last handler instruction
    pub handler_range: (InstrId, InstrId),
    /// Protected lines
    pub try_lines: Range<usize>,
    /// Handler lines
    pub handler_lines: Range<usize>,
    /// Lines of the filter predicate, for filter clauses
    pub filter_lines: Option<Range<usize>>,
    /// Variable receiving the exception at handler entry
    pub exception: Option<VarId>,
    /// `true` for copies made while inlining an enclosing `finally`
    pub duplicate: bool,
}

impl EhScope {
    pub(crate) fn new(
        clause: &ExceptionClause,
        try_lines: Range<usize>,
        handler_lines: Range<usize>,
        filter_lines: Option<Range<usize>>,
        exception: Option<VarId>,
    ) -> Self {
        EhScope {
            clause: clause.index,
            kind: clause.kind.clone(),
            try_range: (clause.try_begin, clause.try_end),
            handler_range: (clause.handler_begin, clause.handler_end),
            try_lines,
            handler_lines,
            filter_lines,
            exception,
            duplicate: false,
        }
    }

    /// Returns `true` for `finally` scopes.
    #[must_use]
    pub fn is_finally(&self) -> bool {
        self.kind == HandlerKind::Finally
    }

    /// Returns `true` for `finally` and `fault` scopes, whose handlers end in `endfinally`.
    #[must_use]
    pub fn ends_in_endfinally(&self) -> bool {
        matches!(self.kind, HandlerKind::Finally | HandlerKind::Fault)
    }

    /// All line ranges of the scope.
    pub fn ranges(&self) -> impl Iterator<Item = &Range<usize>> {
        [&self.try_lines, &self.handler_lines]
            .into_iter()
            .chain(self.filter_lines.as_ref())
    }

    pub(crate) fn ranges_mut(&mut self) -> impl Iterator<Item = &mut Range<usize>> {
        [&mut self.try_lines, &mut self.handler_lines]
            .into_iter()
            .chain(self.filter_lines.as_mut())
    }
}

impl fmt::Display for EhScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "try {}..{} {} {}..{}",
            self.try_lines.start,
            self.try_lines.end,
            self.kind,
            self.handler_lines.start,
            self.handler_lines.end
        )?;
        if let Some(filter) = &self.filter_lines {
            write!(f, " filter {}..{}", filter.start, filter.end)?;
        }
        Ok(())
    }
}
