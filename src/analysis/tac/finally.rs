//! Inlining of `finally` handlers into the normal control flow.
//!
//! Every `leave` that exits the protected range of a `finally` scope is redirected through a
//! private copy of the handler body placed right after the handler. The copy ends by
//! continuing to the original `leave` target. Once no `leave` crosses a `finally` boundary,
//! the original handler is kept only for the exceptional path, so its `endfinally` becomes
//! inert, and every remaining `leave` is an ordinary `goto`.
//!
//! Scopes are processed innermost first, so an exit crossing several `finally` scopes runs
//! the inner copy before the outer one. `fault` handlers never run on normal exits and are
//! left as they are.

use std::ops::Range;

use log::debug;

use crate::{
    analysis::tac::{
        lines::LineTransformer,
        scope::EhScope,
        statement::{EhStatement, Statement},
    },
    Result,
};

/// Counters reported by [`inline_finally`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineStats {
    /// Handler bodies copied
    pub duplicated_bodies: usize,
    /// `leave` statements turned into `goto`
    pub rewritten_leaves: usize,
}

/// Inlines every `finally` handler at the exits crossing it.
///
/// Running the pass on its own output changes nothing.
///
/// # Errors
/// Returns [`crate::Error::InconsistentBlockGraph`] if a scope's line ranges do not fit the
/// statement list.
///
/// # Examples
///
/// ```rust
/// use ciltac::analysis::tac::{inline_finally, EhStatement, LineTransformer, Statement};
///
/// let mut statements = vec![Statement::Eh(EhStatement::Leave(1)), Statement::Return(None)];
/// let mut scopes = Vec::new();
/// let stats = inline_finally(&mut LineTransformer::new(&mut statements, &mut scopes))?;
/// assert_eq!(stats.rewritten_leaves, 1);
/// assert_eq!(statements[0], Statement::Goto(1));
/// # Ok::<(), ciltac::Error>(())
/// ```
pub fn inline_finally(lines: &mut LineTransformer<'_>) -> Result<InlineStats> {
    let mut stats = InlineStats::default();

    while let Some((scope, leave)) = next_crossing(lines) {
        let handler = lines.scopes()[scope].handler_lines.clone();
        let at = handler.end;
        let copy = lines.duplicate(handler, at)?;
        let leave = if leave >= at { leave + copy.len() } else { leave };
        let Some(target) = lines.statements()[leave].target() else {
            return Err(graph_error!("line {} lost its leave while inlining", leave));
        };

        for line in own_end_finally(lines, scope, &copy) {
            lines.replace(line, Statement::Eh(EhStatement::Leave(target)))?;
        }
        lines.replace(leave, Statement::Goto(copy.start))?;

        debug!(
            "inlined finally {} at line {} for the exit to line {}",
            lines.scopes()[scope].clause,
            leave,
            target
        );
        stats.duplicated_bodies += 1;
    }

    let finally_scopes: Vec<usize> = (0..lines.scopes().len())
        .filter(|index| lines.scopes()[*index].is_finally())
        .collect();
    for scope in finally_scopes {
        let handler = lines.scopes()[scope].handler_lines.clone();
        for line in own_end_finally(lines, scope, &handler) {
            lines.replace(line, Statement::Eh(EhStatement::InertEndFinally))?;
        }
    }

    let leaves: Vec<usize> = (0..lines.len())
        .filter(|line| lines.statements()[*line].is_leave())
        .collect();
    for line in leaves {
        if let Some(target) = lines.statements()[line].target() {
            lines.replace(line, Statement::Goto(target))?;
            stats.rewritten_leaves += 1;
        }
    }

    Ok(stats)
}

/// Innermost `finally` scope with a `leave` exiting its protected lines, and that `leave`.
fn next_crossing(lines: &LineTransformer<'_>) -> Option<(usize, usize)> {
    let mut order: Vec<usize> = (0..lines.scopes().len())
        .filter(|index| lines.scopes()[*index].is_finally())
        .collect();
    order.sort_by_key(|index| {
        let scope = &lines.scopes()[*index];
        (scope.try_lines.len(), scope.clause, scope.try_lines.start)
    });

    order.into_iter().find_map(|index| {
        let protected = &lines.scopes()[index].try_lines;
        protected
            .clone()
            .find(|line| match &lines.statements()[*line] {
                Statement::Eh(EhStatement::Leave(target)) => !protected.contains(target),
                _ => false,
            })
            .map(|line| (index, line))
    })
}

/// Live `endfinally` lines in `range` that belong to `scope` rather than to a nested
/// `finally` or `fault` handler.
fn own_end_finally(lines: &LineTransformer<'_>, scope: usize, range: &Range<usize>) -> Vec<usize> {
    let nested: Vec<&EhScope> = lines
        .scopes()
        .iter()
        .enumerate()
        .filter(|(index, other)| {
            *index != scope
                && other.ends_in_endfinally()
                && range.start <= other.handler_lines.start
                && other.handler_lines.end <= range.end
                && other.handler_lines != *range
        })
        .map(|(_, other)| other)
        .collect();

    range
        .clone()
        .filter(|line| lines.statements()[*line].is_end_finally())
        .filter(|line| {
            !nested
                .iter()
                .any(|other| other.handler_lines.contains(line))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::tac::{
            statement::{CallExpr, CallTarget},
            value::Value,
        },
        assembly::{HandlerKind, InstrId, Opcode},
    };

    fn scope(clause: usize, kind: HandlerKind, try_lines: Range<usize>, handler: Range<usize>) -> EhScope {
        EhScope {
            clause,
            kind,
            try_range: (InstrId(0), InstrId(0)),
            handler_range: (InstrId(0), InstrId(0)),
            try_lines,
            handler_lines: handler,
            filter_lines: None,
            exception: None,
            duplicate: false,
        }
    }

    fn marker() -> Statement {
        Statement::Call(CallExpr::new(CallTarget::Intrinsic(Opcode::Break), vec![Value::i4(7)]))
    }

    fn count_markers(statements: &[Statement]) -> usize {
        statements.iter().filter(|s| **s == marker()).count()
    }

    #[test]
    fn single_exit_runs_the_copy() {
        let mut statements = vec![
            Statement::Eh(EhStatement::Leave(3)),
            marker(),
            Statement::Eh(EhStatement::EndFinally),
            Statement::Return(None),
        ];
        let mut scopes = vec![scope(0, HandlerKind::Finally, 0..1, 1..3)];
        let mut lines = LineTransformer::new(&mut statements, &mut scopes);
        let stats = inline_finally(&mut lines).unwrap();

        assert_eq!(stats.duplicated_bodies, 1);
        assert_eq!(stats.rewritten_leaves, 1);
        assert_eq!(
            statements,
            vec![
                Statement::Goto(3),
                marker(),
                Statement::Eh(EhStatement::InertEndFinally),
                marker(),
                Statement::Goto(5),
                Statement::Return(None),
            ]
        );
    }

    #[test]
    fn two_exits_two_copies() {
        let mut statements = vec![
            Statement::If {
                cond: crate::analysis::tac::statement::Condition::True(Value::Param(0)),
                target: 2,
            },
            Statement::Eh(EhStatement::Leave(5)),
            Statement::Eh(EhStatement::Leave(6)),
            marker(),
            Statement::Eh(EhStatement::EndFinally),
            Statement::Return(None),
            Statement::Return(Some(Value::i4(1))),
        ];
        let mut scopes = vec![scope(0, HandlerKind::Finally, 0..3, 3..5)];
        let stats = inline_finally(&mut LineTransformer::new(&mut statements, &mut scopes)).unwrap();

        assert_eq!(stats.duplicated_bodies, 2);
        assert_eq!(count_markers(&statements), 3);
        assert!(!statements.iter().any(Statement::is_leave));
        assert!(!statements.iter().any(Statement::is_end_finally));

        // both exits still reach their returns
        for start in [1, 2] {
            let mut line = start;
            while let Some(target) = statements[line].target() {
                line = if matches!(statements[line], Statement::Goto(_)) {
                    target
                } else {
                    line + 1
                };
                while statements[line] == marker() {
                    line += 1;
                }
            }
            assert!(matches!(statements[line], Statement::Return(_)));
        }
    }

    #[test]
    fn fault_handlers_are_kept() {
        let mut statements = vec![
            Statement::Eh(EhStatement::Leave(3)),
            marker(),
            Statement::Eh(EhStatement::EndFinally),
            Statement::Return(None),
        ];
        let mut scopes = vec![scope(0, HandlerKind::Fault, 0..1, 1..3)];
        let stats = inline_finally(&mut LineTransformer::new(&mut statements, &mut scopes)).unwrap();

        assert_eq!(stats.duplicated_bodies, 0);
        assert_eq!(statements[0], Statement::Goto(3));
        assert_eq!(statements[2], Statement::Eh(EhStatement::EndFinally));
    }

    #[test]
    fn nested_finally_runs_inner_then_outer() {
        // outer try 0..5 { inner try 0..1 { leave 7 } inner finally 1..3 } outer finally 5..7
        let inner = Statement::Call(CallExpr::new(
            CallTarget::Intrinsic(Opcode::Break),
            vec![Value::i4(1)],
        ));
        let mut statements = vec![
            Statement::Eh(EhStatement::Leave(7)),
            inner.clone(),
            Statement::Eh(EhStatement::EndFinally),
            Statement::Return(None),
            Statement::Return(None),
            marker(),
            Statement::Eh(EhStatement::EndFinally),
            Statement::Return(None),
        ];
        let mut scopes = vec![
            scope(0, HandlerKind::Finally, 0..1, 1..3),
            scope(1, HandlerKind::Finally, 0..5, 5..7),
        ];
        let stats = inline_finally(&mut LineTransformer::new(&mut statements, &mut scopes)).unwrap();
        assert_eq!(stats.duplicated_bodies, 2);

        let mut line = 0;
        let mut seen = Vec::new();
        for _ in 0..statements.len() {
            match &statements[line] {
                Statement::Goto(target) => line = *target,
                Statement::Return(_) => break,
                other => {
                    seen.push(other.clone());
                    line += 1;
                }
            }
        }
        assert_eq!(seen, vec![inner, marker()]);
        assert_eq!(line, statements.len() - 1);
    }

    #[test]
    fn idempotent() {
        let mut statements = vec![
            Statement::Eh(EhStatement::Leave(3)),
            marker(),
            Statement::Eh(EhStatement::EndFinally),
            Statement::Return(None),
        ];
        let mut scopes = vec![scope(0, HandlerKind::Finally, 0..1, 1..3)];
        inline_finally(&mut LineTransformer::new(&mut statements, &mut scopes)).unwrap();
        let once = (statements.clone(), scopes.clone());

        let stats = inline_finally(&mut LineTransformer::new(&mut statements, &mut scopes)).unwrap();
        assert_eq!(stats, InlineStats::default());
        assert_eq!((statements, scopes), once);
    }
}
