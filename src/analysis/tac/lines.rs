//! The single mutation primitive over a translated statement list.
//!
//! Statement indices double as jump targets and as the coordinates of every [`EhScope`]. Any
//! insertion or removal therefore has to shift jump targets and scope ranges in the same
//! operation. [`LineTransformer`] owns both for the duration of a rewrite and is the only type
//! that changes the number of lines.

use std::ops::Range;

use crate::{
    analysis::tac::{scope::EhScope, statement::Statement},
    Result,
};

/// Exclusive access to a statement list and its scopes, with target and range bookkeeping.
///
/// # Examples
///
/// ```rust
/// use ciltac::analysis::tac::{LineTransformer, Statement};
///
/// let mut statements = vec![Statement::Goto(1), Statement::Return(None)];
/// let mut scopes = Vec::new();
/// let mut lines = LineTransformer::new(&mut statements, &mut scopes);
/// lines.insert(1, vec![Statement::Return(None)])?;
///
/// assert_eq!(statements[0], Statement::Goto(2));
/// # Ok::<(), ciltac::Error>(())
/// ```
#[derive(Debug)]
pub struct LineTransformer<'a> {
    statements: &'a mut Vec<Statement>,
    scopes: &'a mut Vec<EhScope>,
}

impl<'a> LineTransformer<'a> {
    /// Takes over `statements` and `scopes` until the transformer is dropped.
    pub fn new(statements: &'a mut Vec<Statement>, scopes: &'a mut Vec<EhScope>) -> Self {
        LineTransformer { statements, scopes }
    }

    /// Current statements.
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        self.statements.as_slice()
    }

    /// Current scopes, including copies made by [`LineTransformer::duplicate`].
    #[must_use]
    pub fn scopes(&self) -> &[EhScope] {
        self.scopes.as_slice()
    }

    /// Number of lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns `true` if there are no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Replaces one line in place, returning the previous statement.
    ///
    /// The replacement's jump target is taken as is.
    ///
    /// # Errors
    /// Returns [`crate::Error::InconsistentBlockGraph`] if `line` does not exist.
    pub fn replace(&mut self, line: usize, statement: Statement) -> Result<Statement> {
        let len = self.statements.len();
        match self.statements.get_mut(line) {
            Some(slot) => Ok(std::mem::replace(slot, statement)),
            None => Err(graph_error!("line {} out of {}", line, len)),
        }
    }

    /// Inserts `lines` before line `at`.
    ///
    /// Existing jump targets at or after `at` move with the lines they point to. Scope ranges
    /// starting at or after `at` move as a whole, ranges spanning `at` grow. The inserted
    /// statements' own targets are taken as final.
    ///
    /// # Errors
    /// Returns [`crate::Error::InconsistentBlockGraph`] if `at` is past the end.
    pub fn insert(&mut self, at: usize, lines: Vec<Statement>) -> Result<Range<usize>> {
        if at > self.statements.len() {
            return Err(graph_error!(
                "insertion point {} out of {}",
                at,
                self.statements.len()
            ));
        }
        let count = lines.len();
        if count == 0 {
            return Ok(at..at);
        }

        self.shift(at, count, None);
        self.statements.splice(at..at, lines);
        Ok(at..at + count)
    }

    /// Copies the lines in `source` to position `at` and returns the range of the copy.
    ///
    /// Jumps inside the copy that pointed into `source` point into the copy; all other targets
    /// are shifted like [`LineTransformer::insert`] does. Scope ranges that strictly contain
    /// `source` and end exactly at `at` grow over the copy, and scopes lying entirely inside
    /// `source` are copied along with it.
    ///
    /// # Errors
    /// Returns [`crate::Error::InconsistentBlockGraph`] if a range is out of bounds or `at`
    /// falls strictly inside `source`.
    pub fn duplicate(&mut self, source: Range<usize>, at: usize) -> Result<Range<usize>> {
        let len = self.statements.len();
        if source.start > source.end || source.end > len || at > len {
            return Err(graph_error!(
                "cannot copy lines {}..{} to {} out of {}",
                source.start,
                source.end,
                at,
                len
            ));
        }
        if source.start < at && at < source.end {
            return Err(graph_error!(
                "copy destination {} lies inside {}..{}",
                at,
                source.start,
                source.end
            ));
        }
        let count = source.len();
        if count == 0 {
            return Ok(at..at);
        }

        let relocate = |line: usize| at + (line - source.start);
        let copy: Vec<Statement> = self.statements[source.clone()]
            .iter()
            .map(|statement| {
                let mut statement = statement.clone();
                statement.retarget(|target| {
                    if source.contains(&target) {
                        relocate(target)
                    } else if target >= at {
                        target + count
                    } else {
                        target
                    }
                });
                statement
            })
            .collect();

        let nested: Vec<EhScope> = self
            .scopes
            .iter()
            .filter(|scope| {
                scope
                    .ranges()
                    .all(|range| source.start <= range.start && range.end <= source.end)
                    && scope.ranges().all(|range| *range != source)
            })
            .map(|scope| {
                let mut copy = scope.clone();
                for range in copy.ranges_mut() {
                    *range = relocate(range.start)..relocate(range.end);
                }
                copy.duplicate = true;
                copy
            })
            .collect();

        self.shift(at, count, Some(&source));
        self.statements.splice(at..at, copy);
        self.scopes.extend(nested);
        Ok(at..at + count)
    }

    /// Deletes the lines in `range`.
    ///
    /// Jumps into the removed lines land on the first line after them.
    ///
    /// # Errors
    /// Returns [`crate::Error::InconsistentBlockGraph`] if `range` is out of bounds.
    pub fn remove(&mut self, range: Range<usize>) -> Result<()> {
        if range.start > range.end || range.end > self.statements.len() {
            return Err(graph_error!(
                "cannot remove lines {}..{} out of {}",
                range.start,
                range.end,
                self.statements.len()
            ));
        }
        let count = range.len();
        let squeeze = |line: usize| {
            if line >= range.end {
                line - count
            } else if line > range.start {
                range.start
            } else {
                line
            }
        };

        self.statements.drain(range.clone());
        for statement in self.statements.iter_mut() {
            statement.retarget(squeeze);
        }
        for scope in self.scopes.iter_mut() {
            for bounds in scope.ranges_mut() {
                *bounds = squeeze(bounds.start)..squeeze(bounds.end);
            }
        }
        Ok(())
    }

    fn shift(&mut self, at: usize, count: usize, copied: Option<&Range<usize>>) {
        for statement in self.statements.iter_mut() {
            statement.retarget(|target| if target >= at { target + count } else { target });
        }
        for scope in self.scopes.iter_mut() {
            for range in scope.ranges_mut() {
                let encloses_copy = copied.is_some_and(|source| {
                    range.start <= source.start && source.end <= range.end && *range != *source
                });
                if range.start >= at {
                    range.start += count;
                }
                if range.end > at || (range.end == at && encloses_copy) {
                    range.end += count;
                }
            }
        }
    }
}
