//! Translation of a single method body.

use std::{collections::BTreeMap, fmt};

use log::{debug, trace};

use crate::{
    analysis::{
        cfg::ControlFlowGraph,
        tac::{
            config::TranslationConfig,
            finally::{inline_finally, InlineStats},
            lines::LineTransformer,
            scope::EhScope,
            statement::Statement,
            translator::{translate_blocks, Merge, Translation},
            value::{Value, VarId, Variable},
        },
    },
    assembly::{decode_method, import_clauses, ExceptionClause, InstrId, InstructionList},
    metadata::{
        method::MethodDescriptor, resolver::MemberResolver, token::Token, typesystem::TypeJoin,
    },
    Result,
};

/// A method translated into three-address code.
///
/// Keeps the intermediate artifacts of the pipeline next to the statements, so consumers can
/// relate lines back to instructions, blocks and exception clauses.
#[derive(Debug, Clone)]
pub struct TacMethod {
    /// Method name
    pub name: String,
    /// Method token
    pub token: Token,
    /// Decoded instruction stream
    pub instructions: InstructionList,
    /// Imported exception clauses, in table order
    pub clauses: Vec<ExceptionClause>,
    /// Block graph of the instruction stream
    pub cfg: ControlFlowGraph,
    /// First line of every translated block, before `finally` inlining
    pub block_lines: BTreeMap<InstrId, usize>,
    /// Abstract stack each translated block was entered with
    pub entry_stacks: BTreeMap<InstrId, Vec<Value>>,
    /// The statements; jump targets are indices into this list
    pub statements: Vec<Statement>,
    /// Variable inventory: parameters, locals, then temporaries, merges and caught exceptions
    /// in order of creation
    pub variables: Vec<Variable>,
    /// Merge placeholders with their contributing values
    pub merges: Vec<Merge>,
    /// Exception scopes in line coordinates, including copies made by `finally` inlining
    pub scopes: Vec<EhScope>,
    /// Outcome of `finally` inlining, `None` if the pass was disabled
    pub inline_stats: Option<InlineStats>,
}

impl TacMethod {
    /// Looks up a variable of the inventory.
    #[must_use]
    pub fn variable(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.index())
    }

    /// Entry stack of the block starting at `block`, if it was translated.
    #[must_use]
    pub fn entry_stack(&self, block: InstrId) -> Option<&[Value]> {
        self.entry_stacks.get(&block).map(Vec::as_slice)
    }

    /// Entry stack of the handler of clause `index`.
    #[must_use]
    pub fn handler_stack(&self, index: usize) -> Option<&[Value]> {
        self.clauses
            .get(index)
            .and_then(|clause| self.entry_stack(clause.handler_begin))
    }

    /// Scopes built from the clause table, without inlined copies.
    pub fn original_scopes(&self) -> impl Iterator<Item = &EhScope> {
        self.scopes.iter().filter(|scope| !scope.duplicate)
    }
}

impl fmt::Display for TacMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "method {} ({})", self.name, self.token)?;
        for variable in &self.variables {
            writeln!(f, "  var {variable}")?;
        }
        for scope in &self.scopes {
            writeln!(f, "  {scope}")?;
        }
        let width = self.statements.len().to_string().len();
        for (line, statement) in self.statements.iter().enumerate() {
            writeln!(f, "{line:>width$}: {statement}")?;
        }
        Ok(())
    }
}

/// Translates one method body into TAC.
///
/// Runs the full pipeline: decoding, exception clause import, block graph construction and
/// optional verification, abstract stack translation, layout and optional `finally` inlining.
///
/// # Errors
/// Returns the first fatal error of any stage; the method produces no TAC in that case.
/// Unresolved tokens are not fatal unless the translation needs the member's shape.
///
/// # Examples
///
/// ```rust
/// use ciltac::{
///     analysis::tac::{translate_method, TranslationConfig},
///     metadata::{
///         method::MethodDescriptor, resolver::MemoryResolver, token::Token,
///         typesystem::{TacType, TypeHierarchy},
///     },
/// };
///
/// // ldarg.0; ldarg.1; add; ret
/// let method = MethodDescriptor::new("Add", Token::new(0x0600_0001))
///     .with_params(vec![TacType::I32, TacType::I32])
///     .with_return(TacType::I32)
///     .with_code(vec![0x02, 0x03, 0x58, 0x2A]);
///
/// let tac = translate_method(
///     &method,
///     &MemoryResolver::new(),
///     &TypeHierarchy::new(),
///     &TranslationConfig::default(),
/// )?;
/// assert_eq!(tac.statements[0].to_string(), "t2 = arg0 + arg1");
/// assert_eq!(tac.statements[1].to_string(), "return t2");
/// # Ok::<(), ciltac::Error>(())
/// ```
pub fn translate_method(
    method: &MethodDescriptor,
    resolver: &dyn MemberResolver,
    join: &dyn TypeJoin,
    config: &TranslationConfig,
) -> Result<TacMethod> {
    let instructions = decode_method(&method.code, method.token, resolver)?;
    let clauses = import_clauses(
        &instructions,
        &method.exception_handlers,
        method.token,
        resolver,
    )?;

    let cfg = ControlFlowGraph::build(&instructions, &clauses)?;
    if config.verify_block_graph {
        cfg.verify(&instructions, &clauses)?;
    }

    let Translation {
        mut statements,
        block_lines,
        line_of,
        entry_stacks,
        variables,
        merges,
        exceptions,
    } = translate_blocks(
        method,
        &instructions,
        &cfg,
        &clauses,
        join,
        config.max_stack_depth,
    )?;

    let line_at = |id: InstrId| -> Result<usize> {
        if id.is_back() {
            return Ok(statements.len());
        }
        line_of
            .get(&id)
            .copied()
            .ok_or_else(|| graph_error!("{} does not start a block", id))
    };

    let mut scopes = Vec::with_capacity(clauses.len());
    for clause in &clauses {
        let try_lines = line_at(clause.try_begin)?..line_at(instructions.next(clause.try_end))?;
        let handler_lines =
            line_at(clause.handler_begin)?..line_at(instructions.next(clause.handler_end))?;
        let filter_lines = match clause.filter_entry() {
            Some(entry) => Some(line_at(entry)?..line_at(clause.handler_begin)?),
            None => None,
        };
        let inverted = [Some(&try_lines), Some(&handler_lines), filter_lines.as_ref()]
            .into_iter()
            .flatten()
            .any(|range| range.start > range.end);
        if inverted {
            return Err(graph_error!("clause {} is laid out out of order", clause.index));
        }
        trace!("clause {} covers try {:?} handler {:?}", clause, try_lines, handler_lines);

        let exception = exceptions.get(&clause.handler_begin).copied();
        scopes.push(EhScope::new(
            clause,
            try_lines,
            handler_lines,
            filter_lines,
            exception,
        ));
    }

    let inline_stats = if config.inline_finally {
        Some(inline_finally(&mut LineTransformer::new(
            &mut statements,
            &mut scopes,
        ))?)
    } else {
        None
    };

    debug!(
        "translated {} ({}): {} blocks, {} statements, {} variables, {} merges",
        method.name,
        method.token,
        cfg.block_count(),
        statements.len(),
        variables.len(),
        merges.len()
    );

    Ok(TacMethod {
        name: method.name.clone(),
        token: method.token,
        instructions,
        clauses,
        cfg,
        block_lines,
        entry_stacks,
        statements,
        variables,
        merges,
        scopes,
        inline_stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::tac::{
            statement::{EhStatement, Expr, Place},
            value::{Literal, VariableKind},
        },
        assembly::InstructionEncoder,
        metadata::{
            members::MethodSig,
            method::ExceptionHandler,
            resolver::MemoryResolver,
            typesystem::{TacType, TypeHierarchy},
        },
        Error,
    };

    fn method(build: impl FnOnce(&mut InstructionEncoder) -> Result<()>) -> MethodDescriptor {
        let mut encoder = InstructionEncoder::new();
        build(&mut encoder).unwrap();
        let (code, _) = encoder.finalize().unwrap();
        MethodDescriptor::new("Test", Token::new(0x0600_0001)).with_code(code)
    }

    fn translate(method: &MethodDescriptor, resolver: &MemoryResolver) -> Result<TacMethod> {
        translate_method(
            method,
            resolver,
            &TypeHierarchy::new(),
            &TranslationConfig::default(),
        )
    }

    fn lines(tac: &TacMethod) -> Vec<String> {
        tac.statements.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn empty_body() {
        let method = MethodDescriptor::new("Empty", Token::new(0x0600_0001));
        let tac = translate(&method, &MemoryResolver::new()).unwrap();
        assert!(tac.statements.is_empty());
        assert!(tac.cfg.is_empty());
    }

    #[test]
    fn diamond_creates_one_merge() {
        let method = method(|e| {
            e.emit_ldarg(0)?;
            e.emit_branch("brtrue.s", "two")?;
            e.emit_ldc_i4(1)?;
            e.emit_branch("br.s", "join")?;
            e.define_label("two")?;
            e.emit_ldc_i4(2)?;
            e.define_label("join")?;
            e.emit_stloc(0)?;
            e.emit_instruction("ret", None)
        })
        .with_params(vec![TacType::Bool])
        .with_locals(vec![TacType::I32]);

        let tac = translate(&method, &MemoryResolver::new()).unwrap();
        assert_eq!(tac.merges.len(), 1);
        let merge = &tac.merges[0];
        assert_eq!(
            merge.contributions,
            vec![Value::i4(1), Value::i4(2)]
        );
        assert_eq!(tac.variable(merge.var).unwrap().kind, VariableKind::Merge);
        assert_eq!(tac.variable(merge.var).unwrap().ty, TacType::I32);
        assert!(lines(&tac).contains(&format!("loc0 = m{}", merge.var.0)));
    }

    #[test]
    fn dead_predecessor_does_not_merge() {
        // the ldc.i4.2 block is never reached but still falls into the join
        let method = method(|e| {
            e.emit_ldc_i4(1)?;
            e.emit_branch("br.s", "join")?;
            e.emit_ldc_i4(2)?;
            e.define_label("join")?;
            e.emit_instruction("pop", None)?;
            e.emit_instruction("ret", None)
        });

        let tac = translate(&method, &MemoryResolver::new()).unwrap();
        assert!(tac.merges.is_empty());

        let join = tac
            .instructions
            .iter()
            .find(|i| i.is(crate::assembly::Opcode::Pop))
            .unwrap();
        assert_eq!(tac.cfg.predecessors(join.id).len(), 2);
        assert_eq!(tac.entry_stack(join.id).unwrap(), &[Value::i4(1)]);
        assert_eq!(lines(&tac).last().map(String::as_str), Some("return"));
    }

    #[test]
    fn loop_header_gets_merges_before_translation() {
        // the back edge proposes a new value for the counter kept on the stack
        let method = method(|e| {
            e.emit_ldc_i4(0)?;
            e.define_label("head")?;
            e.emit_instruction("ldc.i4.1", None)?;
            e.emit_instruction("add", None)?;
            e.emit_instruction("dup", None)?;
            e.emit_ldarg(0)?;
            e.emit_branch("blt.s", "head")?;
            e.emit_instruction("ret", None)
        })
        .with_params(vec![TacType::I32])
        .with_return(TacType::I32);

        let tac = translate(&method, &MemoryResolver::new()).unwrap();
        assert_eq!(tac.merges.len(), 1);
        let merge = &tac.merges[0];
        assert_eq!(merge.contributions.len(), 2);
        assert_eq!(merge.contributions[0], Value::i4(0));
        assert_eq!(tac.variable(merge.var).unwrap().ty, TacType::I32);
        assert!(lines(&tac)[0].ends_with(&format!("= m{} + 1", merge.var.0)));
    }

    #[test]
    fn store_spills_stack_aliases() {
        let method = method(|e| {
            e.emit_ldloc(0)?;
            e.emit_ldc_i4(1)?;
            e.emit_stloc(0)?;
            e.emit_instruction("ret", None)
        })
        .with_locals(vec![TacType::I32])
        .with_return(TacType::I32);

        let tac = translate(&method, &MemoryResolver::new()).unwrap();
        assert_eq!(lines(&tac), vec!["t1 = loc0", "loc0 = 1", "return t1"]);
    }

    #[test]
    fn switch_lowers_to_comparisons() {
        let method = method(|e| {
            e.emit_ldarg(0)?;
            e.emit_switch(&["a", "b"])?;
            e.emit_ldc_i4(0)?;
            e.emit_instruction("ret", None)?;
            e.define_label("a")?;
            e.emit_ldc_i4(1)?;
            e.emit_instruction("ret", None)?;
            e.define_label("b")?;
            e.emit_ldc_i4(2)?;
            e.emit_instruction("ret", None)
        })
        .with_params(vec![TacType::I32])
        .with_return(TacType::I32);

        let tac = translate(&method, &MemoryResolver::new()).unwrap();
        assert_eq!(
            lines(&tac),
            vec![
                "if arg0 == 0 goto 3",
                "if arg0 == 1 goto 4",
                "return 0",
                "return 1",
                "return 2",
            ]
        );
    }

    #[test]
    fn calls_pop_their_arity() {
        let mut resolver = MemoryResolver::new();
        resolver.add_method(
            Token::new(0x0A00_0001),
            MethodSig::new_static(
                TacType::class("Math"),
                "Max",
                vec![TacType::I32, TacType::I32],
                TacType::I32,
            ),
        );
        let method = method(|e| {
            e.emit_ldarg(0)?;
            e.emit_ldc_i4(3)?;
            e.emit_token("call", Token::new(0x0A00_0001))?;
            e.emit_instruction("ret", None)
        })
        .with_params(vec![TacType::I32])
        .with_return(TacType::I32);

        let tac = translate(&method, &resolver).unwrap();
        assert_eq!(tac.statements.len(), 2);
        match &tac.statements[0] {
            Statement::Assign {
                dest: Place::Temp(_),
                expr: Expr::Call(call),
            } => assert_eq!(call.args, vec![Value::Param(0), Value::i4(3)]),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn unresolved_call_fails_the_method() {
        let method = method(|e| {
            e.emit_token("call", Token::new(0x0A00_0001))?;
            e.emit_instruction("ret", None)
        });
        let err = translate(&method, &MemoryResolver::new()).unwrap_err();
        assert!(matches!(err, Error::OperandArityMismatch(_)));
    }

    #[test]
    fn unresolved_string_is_a_placeholder() {
        let method = method(|e| {
            e.emit_token("ldstr", Token::new(0x7000_0001))?;
            e.emit_instruction("ret", None)
        })
        .with_return(TacType::String);
        let tac = translate(&method, &MemoryResolver::new()).unwrap();
        assert_eq!(
            tac.statements[0],
            Statement::Return(Some(Value::Literal(Literal::UnresolvedString(Token::new(
                0x7000_0001
            )))))
        );
    }

    #[test]
    fn stack_underflow() {
        let method = method(|e| {
            e.emit_ldc_i4(1)?;
            e.emit_instruction("add", None)?;
            e.emit_instruction("ret", None)
        })
        .with_return(TacType::I32);
        let err = translate(&method, &MemoryResolver::new()).unwrap_err();
        assert!(matches!(err, Error::StackUnderflow { offset: 1 }));
    }

    #[test]
    fn stack_limit() {
        let method = method(|e| {
            for _ in 0..4 {
                e.emit_ldc_i4(1)?;
            }
            e.emit_instruction("ret", None)
        });
        let config = TranslationConfig {
            max_stack_depth: 3,
            ..TranslationConfig::default()
        };
        let err = translate_method(
            &method,
            &MemoryResolver::new(),
            &TypeHierarchy::new(),
            &config,
        )
        .unwrap_err();
        assert!(matches!(err, Error::StackLimit(3)));
    }

    #[test]
    fn catch_handler_receives_the_exception() {
        let mut resolver = MemoryResolver::new();
        resolver.add_type(
            Token::new(0x0100_0001),
            TacType::class("System.DivideByZeroException"),
        );

        let mut encoder = InstructionEncoder::new();
        encoder.emit_ldarg(0).unwrap();
        encoder.emit_ldarg(1).unwrap();
        encoder.emit_instruction("div", None).unwrap();
        encoder.emit_instruction("pop", None).unwrap();
        encoder.emit_branch("leave.s", "end").unwrap();
        encoder.define_label("handler").unwrap();
        encoder.emit_instruction("pop", None).unwrap();
        encoder.emit_branch("leave.s", "end").unwrap();
        encoder.define_label("end").unwrap();
        encoder.emit_instruction("ret", None).unwrap();
        let (code, labels) = encoder.finalize().unwrap();

        let handler = labels["handler"];
        let end = labels["end"];
        let method = MethodDescriptor::new("Divide", Token::new(0x0600_0002))
            .with_params(vec![TacType::I32, TacType::I32])
            .with_code(code)
            .with_handlers(vec![ExceptionHandler::catch(
                0,
                handler,
                handler,
                end - handler,
                Token::new(0x0100_0001),
            )]);

        let tac = translate(&method, &resolver).unwrap();
        let stack = tac.handler_stack(0).unwrap();
        assert_eq!(stack.len(), 1);
        let var = stack[0].var().unwrap();
        let variable = tac.variable(var).unwrap();
        assert_eq!(variable.kind, VariableKind::CaughtException);
        assert_eq!(variable.ty, TacType::class("System.DivideByZeroException"));
        assert_eq!(tac.scopes[0].exception, Some(var));
        assert!(!tac.statements.iter().any(Statement::is_leave));
        assert_eq!(tac.inline_stats.unwrap().rewritten_leaves, 2);
    }

    #[test]
    fn raw_config_keeps_leave() {
        let mut encoder = InstructionEncoder::new();
        encoder.emit_branch("leave.s", "end").unwrap();
        encoder.define_label("handler").unwrap();
        encoder.emit_instruction("endfinally", None).unwrap();
        encoder.define_label("end").unwrap();
        encoder.emit_instruction("ret", None).unwrap();
        let (code, labels) = encoder.finalize().unwrap();

        let method = MethodDescriptor::new("Raw", Token::new(0x0600_0003))
            .with_code(code)
            .with_handlers(vec![ExceptionHandler::finally(
                0,
                labels["handler"],
                labels["handler"],
                labels["end"] - labels["handler"],
            )]);

        let tac = translate_method(
            &method,
            &MemoryResolver::new(),
            &TypeHierarchy::new(),
            &TranslationConfig::raw(),
        )
        .unwrap();
        assert_eq!(tac.inline_stats, None);
        assert_eq!(tac.statements[0], Statement::Eh(EhStatement::Leave(2)));
        assert_eq!(tac.statements[1], Statement::Eh(EhStatement::EndFinally));
        assert_eq!(tac.scopes[0].try_lines, 0..1);
        assert_eq!(tac.scopes[0].handler_lines, 1..2);
        assert!(tac.to_string().contains("0: leave 2"));
    }
}
