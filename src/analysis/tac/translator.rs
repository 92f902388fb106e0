//! Abstract stack translation of basic blocks into TAC.
//!
//! Blocks are processed from a worklist ordered by entry instruction. Each block is replayed
//! once against the abstract stack it is entered with, and its outgoing stack is proposed to
//! every successor. When two proposals for the same block disagree in a slot, the slot is
//! replaced by a merge placeholder before the block is translated; later proposals only add
//! contributing values to existing merges.
//!
//! A block popped while one of its predecessors is still untranslated receives merges for all
//! of its entry slots up front, since a later proposal could otherwise disagree with code that
//! was already emitted.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    mem,
    sync::Arc,
};

use log::{debug, trace};

use crate::{
    analysis::{
        cfg::{BasicBlock, ControlFlowGraph},
        tac::{
            statement::{
                BinaryOp, CallExpr, CallTarget, CompareOp, Condition, EhStatement, Expr, Place,
                Statement, TypeOp, UnaryOp,
            },
            typing::{access_type, binary_result, conversion, unary_result},
            value::{Literal, Value, VarId, Variable, VariableKind},
        },
    },
    assembly::{ExceptionClause, Immediate, InstrId, Instruction, InstructionList, NodeKind, Opcode},
    metadata::{
        members::{CallSiteSig, Member, MethodSig},
        method::MethodDescriptor,
        typesystem::{TacType, TypeJoin},
    },
    Error, Result,
};

/// A merge placeholder and the values flowing into it.
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    /// Inventory variable of the placeholder
    pub var: VarId,
    /// Entry of the block whose entry stack holds the placeholder
    pub block: InstrId,
    /// Stack slot, counted from the bottom
    pub slot: usize,
    /// Distinct values proposed for the slot by predecessors
    pub contributions: Vec<Value>,
}

/// How control leaves a translated block.
#[derive(Debug, Clone)]
enum Exit {
    Fallthrough,
    Terminal,
    Goto(InstrId),
    If(Condition, InstrId),
    Switch(Value, Vec<InstrId>),
    Leave(InstrId),
}

#[derive(Debug)]
struct BlockCode {
    statements: Vec<Statement>,
    exit: Exit,
}

/// Per-block translation state.
#[derive(Default)]
struct Frame {
    stack: Vec<Value>,
    statements: Vec<Statement>,
    tail: bool,
    constrained: Option<TacType>,
    switch: Option<(Value, Vec<InstrId>)>,
}

/// Result of translating and laying out all reachable blocks.
#[derive(Debug)]
pub(crate) struct Translation {
    pub statements: Vec<Statement>,
    /// First line of every translated block
    pub block_lines: BTreeMap<InstrId, usize>,
    /// First line of every block; untranslated blocks share the line of the next block
    pub line_of: BTreeMap<InstrId, usize>,
    pub entry_stacks: BTreeMap<InstrId, Vec<Value>>,
    pub variables: Vec<Variable>,
    pub merges: Vec<Merge>,
    /// Caught exception variable of every handler and filter entry block
    pub exceptions: BTreeMap<InstrId, VarId>,
}

/// Translates every block reachable from the method entry or an exception handler.
///
/// # Errors
/// Fails with [`Error::StackUnderflow`], [`Error::OperandArityMismatch`], [`Error::StackLimit`],
/// [`Error::IncompatibleMerge`] or [`Error::InconsistentBlockGraph`] for the whole method.
pub(crate) fn translate_blocks(
    method: &MethodDescriptor,
    list: &InstructionList,
    cfg: &ControlFlowGraph,
    clauses: &[ExceptionClause],
    join: &dyn TypeJoin,
    max_stack_depth: usize,
) -> Result<Translation> {
    let mut translator = Translator::new(method, list, cfg, join, max_stack_depth);
    translator.schedule_entries(clauses);
    translator.run()?;
    translator.finish()
}

struct Translator<'a> {
    method: &'a MethodDescriptor,
    list: &'a InstructionList,
    cfg: &'a ControlFlowGraph,
    join: &'a dyn TypeJoin,
    max_depth: usize,
    variables: Vec<Variable>,
    merges: Vec<Merge>,
    merge_slots: HashMap<(InstrId, usize), usize>,
    merge_of: HashMap<VarId, usize>,
    resolved: HashSet<VarId>,
    entry_stacks: BTreeMap<InstrId, Vec<Value>>,
    pending: BTreeSet<InstrId>,
    reachable: HashSet<InstrId>,
    blocks: BTreeMap<InstrId, BlockCode>,
    exceptions: BTreeMap<InstrId, VarId>,
}

impl<'a> Translator<'a> {
    fn new(
        method: &'a MethodDescriptor,
        list: &'a InstructionList,
        cfg: &'a ControlFlowGraph,
        join: &'a dyn TypeJoin,
        max_depth: usize,
    ) -> Self {
        let mut translator = Translator {
            method,
            list,
            cfg,
            join,
            max_depth,
            variables: Vec::new(),
            merges: Vec::new(),
            merge_slots: HashMap::new(),
            merge_of: HashMap::new(),
            resolved: HashSet::new(),
            entry_stacks: BTreeMap::new(),
            pending: BTreeSet::new(),
            reachable: HashSet::new(),
            blocks: BTreeMap::new(),
            exceptions: BTreeMap::new(),
        };
        for (slot, ty) in method.params.iter().enumerate() {
            translator.variable(VariableKind::Parameter(slot_index(slot)), ty.clone());
        }
        for (slot, ty) in method.locals.iter().enumerate() {
            translator.variable(VariableKind::Local(slot_index(slot)), ty.clone());
        }
        translator
    }

    fn variable(&mut self, kind: VariableKind, ty: TacType) -> VarId {
        let id = VarId(u32::try_from(self.variables.len()).unwrap_or(u32::MAX));
        self.variables.push(Variable { id, kind, ty });
        id
    }

    /// Seeds the worklist with the method entry and every handler and filter entry.
    fn schedule_entries(&mut self, clauses: &[ExceptionClause]) {
        if self.cfg.is_empty() {
            return;
        }
        let entry = self.cfg.entry();
        self.entry_stacks.insert(entry, Vec::new());
        self.pending.insert(entry);

        for clause in clauses {
            let entries = [Some(clause.handler_begin), clause.filter_entry()];
            for block in entries.into_iter().flatten() {
                if self.entry_stacks.contains_key(&block) {
                    continue;
                }
                let var = self.variable(VariableKind::CaughtException, clause.exception_type());
                self.entry_stacks.insert(block, vec![Value::Temp(var)]);
                self.exceptions.insert(block, var);
                self.pending.insert(block);
            }
        }
        self.mark_reachable();
    }

    /// Collects every block reachable from a scheduled entry; dead code never feeds a merge.
    fn mark_reachable(&mut self) {
        let mut work: Vec<InstrId> = self.pending.iter().copied().collect();
        while let Some(entry) = work.pop() {
            if !self.reachable.insert(entry) {
                continue;
            }
            work.extend(
                self.cfg
                    .successors(entry)
                    .iter()
                    .filter(|succ| !self.reachable.contains(*succ)),
            );
        }
    }

    fn run(&mut self) -> Result<()> {
        while let Some(entry) = self.pending.pop_first() {
            let cfg = self.cfg;
            let Some(block) = cfg.block(entry) else {
                return Err(graph_error!("scheduled {} does not start a block", entry));
            };

            self.prepare_entry(block)?;
            let stack = self.entry_stacks.get(&entry).cloned().unwrap_or_default();
            let (code, stack) = self.translate_block(block, stack)?;
            trace!(
                "translated block {}: {} statements, {} values left on the stack",
                entry,
                code.statements.len(),
                stack.len()
            );
            self.blocks.insert(entry, code);

            for successor in &block.successors {
                self.propose(*successor, stack.clone())?;
            }
        }

        let open: Vec<usize> = (0..self.merges.len())
            .filter(|index| !self.resolved.contains(&self.merges[*index].var))
            .collect();
        for index in open {
            self.resolve_merge(index)?;
        }
        Ok(())
    }

    /// Places merges a block needs before it is translated and types the merges that can no
    /// longer receive contributions.
    fn prepare_entry(&mut self, block: &BasicBlock) -> Result<()> {
        let waiting = block
            .predecessors
            .iter()
            .any(|pred| self.reachable.contains(pred) && !self.blocks.contains_key(pred));
        let depth = self.entry_stacks.get(&block.entry).map_or(0, Vec::len);

        if waiting {
            for slot in 0..depth {
                self.merge_slot(block.entry, slot)?;
            }
        } else {
            for slot in 0..depth {
                if let Some(&index) = self.merge_slots.get(&(block.entry, slot)) {
                    self.resolve_merge(index)?;
                }
            }
        }
        Ok(())
    }

    /// Returns the merge of `(block, slot)`, creating it from the current entry value.
    fn merge_slot(&mut self, block: InstrId, slot: usize) -> Result<usize> {
        if let Some(&index) = self.merge_slots.get(&(block, slot)) {
            return Ok(index);
        }
        let Some(current) = self
            .entry_stacks
            .get(&block)
            .and_then(|stack| stack.get(slot))
            .cloned()
        else {
            return Err(graph_error!("block {} has no entry slot {}", block, slot));
        };

        let var = self.variable(VariableKind::Merge, TacType::Unknown);
        let index = self.merges.len();
        self.merges.push(Merge {
            var,
            block,
            slot,
            contributions: vec![current],
        });
        self.merge_slots.insert((block, slot), index);
        self.merge_of.insert(var, index);
        if let Some(value) = self
            .entry_stacks
            .get_mut(&block)
            .and_then(|stack| stack.get_mut(slot))
        {
            *value = Value::Merge(var);
        }
        debug!("merge m{} placed at block {} slot {}", var.0, block, slot);
        Ok(index)
    }

    /// Records `stack` as a proposed entry stack of `target`.
    fn propose(&mut self, target: InstrId, stack: Vec<Value>) -> Result<()> {
        let translated = self.blocks.contains_key(&target);
        let Some(existing) = self.entry_stacks.get(&target) else {
            if translated {
                return Err(graph_error!("block {} translated without entry stack", target));
            }
            self.entry_stacks.insert(target, stack);
            self.pending.insert(target);
            return Ok(());
        };

        if existing.len() != stack.len() {
            return Err(Error::OperandArityMismatch(format!(
                "block {} entered with {} and with {} stack values",
                target,
                existing.len(),
                stack.len()
            )));
        }

        for (slot, value) in stack.into_iter().enumerate() {
            if let Some(&index) = self.merge_slots.get(&(target, slot)) {
                let merge = &mut self.merges[index];
                if value != Value::Merge(merge.var) && !merge.contributions.contains(&value) {
                    merge.contributions.push(value);
                }
                continue;
            }

            let differs = self
                .entry_stacks
                .get(&target)
                .and_then(|stack| stack.get(slot))
                .is_some_and(|current| *current != value);
            if differs {
                if translated {
                    return Err(graph_error!(
                        "slot {} of translated block {} received a new value",
                        slot,
                        target
                    ));
                }
                let index = self.merge_slot(target, slot)?;
                self.merges[index].contributions.push(value);
            }
        }

        if !translated {
            self.pending.insert(target);
        }
        Ok(())
    }

    fn resolve_merge(&mut self, index: usize) -> Result<()> {
        let var = self.merges[index].var;
        if self.resolved.contains(&var) {
            return Ok(());
        }
        let ty = self.merge_type(var, &mut Vec::new())?;
        debug!("merge m{} resolved to {}", var.0, ty);
        self.variables[var.index()].ty = ty;
        self.resolved.insert(var);
        Ok(())
    }

    /// Join of the contributions of a merge; cycles through other open merges contribute
    /// nothing.
    fn merge_type(&self, var: VarId, visiting: &mut Vec<VarId>) -> Result<TacType> {
        if visiting.contains(&var) {
            return Ok(TacType::Unknown);
        }
        let Some(&index) = self.merge_of.get(&var) else {
            return Ok(TacType::Unknown);
        };
        visiting.push(var);

        let mut joined: Option<TacType> = None;
        for contribution in &self.merges[index].contributions {
            let ty = match contribution {
                Value::Merge(other) if !self.resolved.contains(other) => {
                    self.merge_type(*other, visiting)?
                }
                other => self.type_of(other)?,
            };
            joined = Some(match joined {
                None => ty,
                Some(acc) => self.join.join(&acc, &ty)?,
            });
        }
        Ok(joined.unwrap_or(TacType::Unknown))
    }

    fn type_of(&self, value: &Value) -> Result<TacType> {
        Ok(match value {
            Value::Local(slot) => self
                .method
                .locals
                .get(usize::from(*slot))
                .cloned()
                .unwrap_or_default(),
            Value::Param(slot) => self
                .method
                .params
                .get(usize::from(*slot))
                .cloned()
                .unwrap_or_default(),
            Value::Literal(literal) => literal.ty(),
            Value::Temp(var) => self
                .variables
                .get(var.index())
                .map(|variable| variable.ty.clone())
                .unwrap_or_default(),
            Value::Merge(var) => {
                if self.resolved.contains(var) {
                    self.variables
                        .get(var.index())
                        .map(|variable| variable.ty.clone())
                        .unwrap_or_default()
                } else {
                    self.merge_type(*var, &mut Vec::new())?
                }
            }
        })
    }

    // ========================================================================
    // Block replay
    // ========================================================================

    fn translate_block(
        &mut self,
        block: &BasicBlock,
        stack: Vec<Value>,
    ) -> Result<(BlockCode, Vec<Value>)> {
        let list = self.list;
        let mut frame = Frame {
            stack,
            ..Frame::default()
        };
        let mut exit = Exit::Fallthrough;

        let mut id = block.entry;
        loop {
            let Some(instruction) = list.get(id) else {
                return Err(graph_error!("block {} runs past the end of the method", block.entry));
            };
            match instruction.kind {
                NodeKind::Op(opcode) => {
                    if let Some(found) = self.step(opcode, instruction, &mut frame)? {
                        exit = found;
                    }
                }
                NodeKind::SwitchCase => match (&mut frame.switch, instruction.target()) {
                    (Some((_, cases)), Some(target)) => cases.push(target),
                    _ => {
                        return Err(graph_error!(
                            "switch case {} without its switch",
                            instruction.id
                        ))
                    }
                },
                NodeKind::Back => {
                    return Err(graph_error!("block {} contains the sentinel", block.entry))
                }
            }
            if id == block.exit {
                break;
            }
            id = list.next(id);
        }

        if let Some((value, cases)) = frame.switch.take() {
            exit = Exit::Switch(value, cases);
        }
        Ok((
            BlockCode {
                statements: frame.statements,
                exit,
            },
            frame.stack,
        ))
    }

    fn pop(&self, frame: &mut Frame, instruction: &Instruction) -> Result<Value> {
        frame.stack.pop().ok_or(Error::StackUnderflow {
            offset: instruction.offset,
        })
    }

    /// Pops `count` values and returns them in the order they were pushed.
    fn pop_n(&self, frame: &mut Frame, count: usize, instruction: &Instruction) -> Result<Vec<Value>> {
        let Some(split) = frame.stack.len().checked_sub(count) else {
            return Err(Error::StackUnderflow {
                offset: instruction.offset,
            });
        };
        Ok(frame.stack.split_off(split))
    }

    fn push(&self, frame: &mut Frame, value: Value) -> Result<()> {
        if frame.stack.len() >= self.max_depth {
            return Err(Error::StackLimit(self.max_depth));
        }
        frame.stack.push(value);
        Ok(())
    }

    /// Emits `t = expr` for a fresh temporary and pushes it.
    fn define(&mut self, frame: &mut Frame, ty: TacType, expr: Expr) -> Result<()> {
        let var = self.variable(VariableKind::Temporary, ty);
        frame.statements.push(Statement::Assign {
            dest: Place::Temp(var),
            expr,
        });
        self.push(frame, Value::Temp(var))
    }

    /// Emits a call, as an assignment if it produces a value.
    fn call(&mut self, frame: &mut Frame, call: CallExpr, returns: &TacType) -> Result<()> {
        if returns.is_void() {
            frame.statements.push(Statement::Call(call));
            Ok(())
        } else {
            self.define(frame, returns.clone(), Expr::Call(call))
        }
    }

    fn intrinsic(opcode: Opcode, args: Vec<Value>) -> CallExpr {
        CallExpr::new(CallTarget::Intrinsic(opcode), args)
    }

    /// Pops the value to store and spills stack slots still aliasing the destination.
    fn store(
        &mut self,
        frame: &mut Frame,
        instruction: &Instruction,
        target: Value,
        dest: Place,
    ) -> Result<()> {
        let value = self.pop(frame, instruction)?;
        if frame.stack.contains(&target) {
            let var = self.variable(VariableKind::Temporary, self.type_of(&target)?);
            frame.statements.push(Statement::Assign {
                dest: Place::Temp(var),
                expr: Expr::Value(target.clone()),
            });
            for slot in frame.stack.iter_mut().filter(|slot| **slot == target) {
                *slot = Value::Temp(var);
            }
        }
        frame.statements.push(Statement::Assign {
            dest,
            expr: Expr::Value(value),
        });
        Ok(())
    }

    fn local(&self, instruction: &Instruction, slot: u16) -> Result<u16> {
        if usize::from(slot) < self.method.locals.len() {
            Ok(slot)
        } else {
            Err(Error::OperandArityMismatch(format!(
                "IL_{:04X} uses local {} of {}",
                instruction.offset,
                slot,
                self.method.locals.len()
            )))
        }
    }

    fn param(&self, instruction: &Instruction, slot: u16) -> Result<u16> {
        if usize::from(slot) < self.method.params.len() {
            Ok(slot)
        } else {
            Err(Error::OperandArityMismatch(format!(
                "IL_{:04X} uses argument {} of {}",
                instruction.offset,
                slot,
                self.method.params.len()
            )))
        }
    }

    /// Replays one instruction, returning how it leaves the block if it does.
    #[allow(clippy::too_many_lines)]
    fn step(
        &mut self,
        opcode: Opcode,
        instruction: &Instruction,
        frame: &mut Frame,
    ) -> Result<Option<Exit>> {
        match opcode {
            Opcode::Nop
            | Opcode::Volatile
            | Opcode::Unaligned
            | Opcode::Readonly
            | Opcode::No => {}
            Opcode::Tail => frame.tail = true,
            Opcode::Constrained => frame.constrained = Some(member(instruction)?.as_type()),
            Opcode::Break => {
                frame
                    .statements
                    .push(Statement::Call(Self::intrinsic(opcode, Vec::new())));
            }

            // ========== Loads and stores ==========
            Opcode::Ldarg0
            | Opcode::Ldarg1
            | Opcode::Ldarg2
            | Opcode::Ldarg3
            | Opcode::LdargS
            | Opcode::Ldarg => {
                let slot = self.param(instruction, slot_of(opcode, instruction)?)?;
                self.push(frame, Value::Param(slot))?;
            }
            Opcode::Ldloc0
            | Opcode::Ldloc1
            | Opcode::Ldloc2
            | Opcode::Ldloc3
            | Opcode::LdlocS
            | Opcode::Ldloc => {
                let slot = self.local(instruction, slot_of(opcode, instruction)?)?;
                self.push(frame, Value::Local(slot))?;
            }
            Opcode::LdargaS | Opcode::Ldarga => {
                let slot = self.param(instruction, slot_of(opcode, instruction)?)?;
                let ty = TacType::by_ref(self.type_of(&Value::Param(slot))?);
                self.define(frame, ty, Expr::AddressOf(Value::Param(slot)))?;
            }
            Opcode::LdlocaS | Opcode::Ldloca => {
                let slot = self.local(instruction, slot_of(opcode, instruction)?)?;
                let ty = TacType::by_ref(self.type_of(&Value::Local(slot))?);
                self.define(frame, ty, Expr::AddressOf(Value::Local(slot)))?;
            }
            Opcode::StargS | Opcode::Starg => {
                let slot = self.param(instruction, slot_of(opcode, instruction)?)?;
                self.store(frame, instruction, Value::Param(slot), Place::Param(slot))?;
            }
            Opcode::Stloc0
            | Opcode::Stloc1
            | Opcode::Stloc2
            | Opcode::Stloc3
            | Opcode::StlocS
            | Opcode::Stloc => {
                let slot = self.local(instruction, slot_of(opcode, instruction)?)?;
                self.store(frame, instruction, Value::Local(slot), Place::Local(slot))?;
            }

            // ========== Constants ==========
            Opcode::Ldnull => self.push(frame, Value::Literal(Literal::Null))?,
            Opcode::LdcI4M1
            | Opcode::LdcI4_0
            | Opcode::LdcI4_1
            | Opcode::LdcI4_2
            | Opcode::LdcI4_3
            | Opcode::LdcI4_4
            | Opcode::LdcI4_5
            | Opcode::LdcI4_6
            | Opcode::LdcI4_7
            | Opcode::LdcI4_8 => {
                let value = i32::from(opcode.code()) - 0x16;
                self.push(frame, Value::i4(value))?;
            }
            Opcode::LdcI4S | Opcode::LdcI4 | Opcode::LdcI8 | Opcode::LdcR4 | Opcode::LdcR8 => {
                let literal = match instruction.immediate() {
                    Some(Immediate::Int8(v)) => Literal::I4(i32::from(v)),
                    Some(Immediate::Int32(v)) => Literal::I4(v),
                    Some(Immediate::Int64(v)) => Literal::I8(v),
                    Some(Immediate::Float32(v)) => Literal::R4(v),
                    Some(Immediate::Float64(v)) => Literal::R8(v),
                    _ => {
                        return Err(malformed_error!(
                            "{} carries no constant of its own type",
                            instruction
                        ))
                    }
                };
                self.push(frame, Value::Literal(literal))?;
            }
            Opcode::Ldstr => {
                let literal = match member(instruction)? {
                    Member::String(value) => Literal::String(Arc::clone(value)),
                    Member::Unknown(token) => Literal::UnresolvedString(*token),
                    other => return Err(malformed_error!("ldstr operand {} is no string", other)),
                };
                self.push(frame, Value::Literal(literal))?;
            }
            Opcode::Ldtoken => {
                let handle = Literal::Handle(member(instruction)?.clone());
                self.push(frame, Value::Literal(handle))?;
            }

            // ========== Stack ==========
            Opcode::Dup => {
                let value = self.pop(frame, instruction)?;
                self.push(frame, value.clone())?;
                self.push(frame, value)?;
            }
            Opcode::Pop => {
                self.pop(frame, instruction)?;
            }

            // ========== Arithmetic, comparison, conversion ==========
            Opcode::Add
            | Opcode::AddOvf
            | Opcode::AddOvfUn
            | Opcode::Sub
            | Opcode::SubOvf
            | Opcode::SubOvfUn
            | Opcode::Mul
            | Opcode::MulOvf
            | Opcode::MulOvfUn
            | Opcode::Div
            | Opcode::DivUn
            | Opcode::Rem
            | Opcode::RemUn
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Shl
            | Opcode::Shr
            | Opcode::ShrUn => {
                let Some(op) = BinaryOp::from_opcode(opcode) else {
                    return Err(malformed_error!("{} is no binary operator", opcode));
                };
                let right = self.pop(frame, instruction)?;
                let left = self.pop(frame, instruction)?;
                let ty = binary_result(op, &self.type_of(&left)?, &self.type_of(&right)?);
                self.define(frame, ty, Expr::Binary { op, left, right })?;
            }
            Opcode::Neg | Opcode::Not => {
                let op = if opcode == Opcode::Neg {
                    UnaryOp::Neg
                } else {
                    UnaryOp::Not
                };
                let operand = self.pop(frame, instruction)?;
                let ty = unary_result(op, &self.type_of(&operand)?);
                self.define(frame, ty, Expr::Unary { op, operand })?;
            }
            Opcode::Ceq | Opcode::Cgt | Opcode::CgtUn | Opcode::Clt | Opcode::CltUn => {
                let (op, unsigned) = match opcode {
                    Opcode::Ceq => (CompareOp::Eq, false),
                    Opcode::Cgt => (CompareOp::Gt, false),
                    Opcode::CgtUn => (CompareOp::Gt, true),
                    Opcode::Clt => (CompareOp::Lt, false),
                    _ => (CompareOp::Lt, true),
                };
                let right = self.pop(frame, instruction)?;
                let left = self.pop(frame, instruction)?;
                let expr = Expr::Compare {
                    op,
                    unsigned,
                    left,
                    right,
                };
                self.define(frame, TacType::I32, expr)?;
            }
            op if conversion(op).is_some() => {
                let Some((to, checked, unsigned)) = conversion(op) else {
                    return Ok(None);
                };
                let operand = self.pop(frame, instruction)?;
                let expr = Expr::Convert {
                    to: to.clone(),
                    checked,
                    unsigned,
                    operand,
                };
                self.define(frame, to, expr)?;
            }
            Opcode::Ckfinite => {
                let value = self.pop(frame, instruction)?;
                let call = Self::intrinsic(opcode, vec![value]);
                self.define(frame, TacType::F64, Expr::Call(call))?;
            }

            // ========== Control flow ==========
            Opcode::Br | Opcode::BrS => return Ok(Some(Exit::Goto(target(instruction)?))),
            Opcode::Brfalse | Opcode::BrfalseS | Opcode::Brtrue | Opcode::BrtrueS => {
                let value = self.pop(frame, instruction)?;
                let cond = if matches!(opcode, Opcode::Brtrue | Opcode::BrtrueS) {
                    Condition::True(value)
                } else {
                    Condition::False(value)
                };
                return Ok(Some(Exit::If(cond, target(instruction)?)));
            }
            Opcode::Beq
            | Opcode::BeqS
            | Opcode::Bge
            | Opcode::BgeS
            | Opcode::Bgt
            | Opcode::BgtS
            | Opcode::Ble
            | Opcode::BleS
            | Opcode::Blt
            | Opcode::BltS
            | Opcode::BneUn
            | Opcode::BneUnS
            | Opcode::BgeUn
            | Opcode::BgeUnS
            | Opcode::BgtUn
            | Opcode::BgtUnS
            | Opcode::BleUn
            | Opcode::BleUnS
            | Opcode::BltUn
            | Opcode::BltUnS => {
                let (op, unsigned) = branch_comparison(opcode);
                let right = self.pop(frame, instruction)?;
                let left = self.pop(frame, instruction)?;
                let cond = Condition::Compare {
                    op,
                    unsigned,
                    left,
                    right,
                };
                return Ok(Some(Exit::If(cond, target(instruction)?)));
            }
            Opcode::Switch => {
                let value = self.pop(frame, instruction)?;
                frame.switch = Some((value, Vec::new()));
            }
            Opcode::Ret => {
                let value = if self.method.return_type.is_void() {
                    None
                } else {
                    Some(self.pop(frame, instruction)?)
                };
                frame.statements.push(Statement::Return(value));
                return Ok(Some(Exit::Terminal));
            }

            // ========== Calls ==========
            Opcode::Call | Opcode::Callvirt => {
                let (callee, sig) = method_of(instruction)?;
                let args = self.pop_n(frame, sig.arity(), instruction)?;
                let call = CallExpr {
                    target: CallTarget::Method(callee.clone()),
                    args,
                    virtual_call: opcode == Opcode::Callvirt,
                    tail: mem::take(&mut frame.tail),
                    constrained: frame.constrained.take(),
                };
                self.call(frame, call, &sig.return_type)?;
            }
            Opcode::Calli => {
                let (signature, sig) = signature_of(instruction)?;
                let pointer = self.pop(frame, instruction)?;
                let args = self.pop_n(frame, sig.arity(), instruction)?;
                let call = CallExpr {
                    tail: mem::take(&mut frame.tail),
                    ..CallExpr::new(
                        CallTarget::Indirect {
                            pointer,
                            signature: signature.clone(),
                        },
                        args,
                    )
                };
                self.call(frame, call, &sig.return_type)?;
            }
            Opcode::Newobj => {
                let (ctor, sig) = method_of(instruction)?;
                let args = self.pop_n(frame, sig.params.len(), instruction)?;
                let expr = Expr::New {
                    ctor: ctor.clone(),
                    args,
                };
                self.define(frame, sig.declaring_type.clone(), expr)?;
            }
            Opcode::Jmp => {
                let (callee, _) = method_of(instruction)?;
                let args = (0..self.method.params.len())
                    .map(|slot| Value::Param(slot_index(slot)))
                    .collect();
                let call = CallExpr {
                    tail: true,
                    ..CallExpr::new(CallTarget::Method(callee.clone()), args)
                };
                let returns = self.method.return_type.clone();
                self.call(frame, call, &returns)?;
                let value = if returns.is_void() {
                    None
                } else {
                    Some(self.pop(frame, instruction)?)
                };
                frame.statements.push(Statement::Return(value));
                return Ok(Some(Exit::Terminal));
            }
            Opcode::Ldftn => {
                let expr = Expr::FunctionPointer {
                    method: member(instruction)?.clone(),
                    object: None,
                };
                self.define(frame, TacType::FnPtr, expr)?;
            }
            Opcode::Ldvirtftn => {
                let object = self.pop(frame, instruction)?;
                let expr = Expr::FunctionPointer {
                    method: member(instruction)?.clone(),
                    object: Some(object),
                };
                self.define(frame, TacType::FnPtr, expr)?;
            }

            // ========== Objects ==========
            Opcode::Castclass | Opcode::Isinst | Opcode::Box | Opcode::Unbox | Opcode::UnboxAny => {
                let ty = member(instruction)?.as_type();
                let (op, result) = match opcode {
                    Opcode::Castclass => (TypeOp::Castclass, ty.clone()),
                    Opcode::Isinst => (TypeOp::Isinst, ty.clone()),
                    Opcode::Box => (TypeOp::Box, TacType::Object),
                    Opcode::Unbox => (TypeOp::Unbox, TacType::by_ref(ty.clone())),
                    _ => (TypeOp::UnboxAny, ty.clone()),
                };
                let operand = self.pop(frame, instruction)?;
                self.define(frame, result, Expr::TypeOp { op, ty, operand })?;
            }
            Opcode::Ldobj => {
                let ty = member(instruction)?.as_type();
                let address = self.pop(frame, instruction)?;
                self.define(frame, ty.clone(), Expr::Indirect { address, ty })?;
            }
            Opcode::Stobj => {
                let ty = member(instruction)?.as_type();
                let value = self.pop(frame, instruction)?;
                let address = self.pop(frame, instruction)?;
                frame.statements.push(Statement::Assign {
                    dest: Place::Indirect { address, ty },
                    expr: Expr::Value(value),
                });
            }
            Opcode::Cpobj | Opcode::Initobj => {
                let handle = Value::Literal(Literal::Handle(member(instruction)?.clone()));
                let operands = if opcode == Opcode::Cpobj { 2 } else { 1 };
                let mut args = self.pop_n(frame, operands, instruction)?;
                args.push(handle);
                frame
                    .statements
                    .push(Statement::Call(Self::intrinsic(opcode, args)));
            }
            Opcode::Cpblk | Opcode::Initblk => {
                let args = self.pop_n(frame, 3, instruction)?;
                frame
                    .statements
                    .push(Statement::Call(Self::intrinsic(opcode, args)));
            }
            Opcode::Localloc => {
                let size = self.pop(frame, instruction)?;
                let call = Self::intrinsic(opcode, vec![size]);
                self.define(frame, TacType::NativeInt, Expr::Call(call))?;
            }
            Opcode::Arglist => {
                let call = Self::intrinsic(opcode, Vec::new());
                let ty = TacType::value_type("System.RuntimeArgumentHandle");
                self.define(frame, ty, Expr::Call(call))?;
            }
            Opcode::Sizeof => {
                let handle = Value::Literal(Literal::Handle(member(instruction)?.clone()));
                let call = Self::intrinsic(opcode, vec![handle]);
                self.define(frame, TacType::U32, Expr::Call(call))?;
            }
            Opcode::Mkrefany | Opcode::Refanyval => {
                let operand = member(instruction)?;
                let ty = if opcode == Opcode::Mkrefany {
                    TacType::TypedReference
                } else {
                    TacType::by_ref(operand.as_type())
                };
                let handle = Value::Literal(Literal::Handle(operand.clone()));
                let value = self.pop(frame, instruction)?;
                let call = Self::intrinsic(opcode, vec![value, handle]);
                self.define(frame, ty, Expr::Call(call))?;
            }
            Opcode::Refanytype => {
                let value = self.pop(frame, instruction)?;
                let call = Self::intrinsic(opcode, vec![value]);
                let ty = TacType::value_type("System.RuntimeTypeHandle");
                self.define(frame, ty, Expr::Call(call))?;
            }

            // ========== Fields ==========
            Opcode::Ldfld | Opcode::Ldsfld | Opcode::Ldflda | Opcode::Ldsflda => {
                let field = member(instruction)?.clone();
                let object = if matches!(opcode, Opcode::Ldfld | Opcode::Ldflda) {
                    Some(self.pop(frame, instruction)?)
                } else {
                    None
                };
                let ty = field_type(&field);
                if matches!(opcode, Opcode::Ldfld | Opcode::Ldsfld) {
                    self.define(frame, ty, Expr::Field { object, field })?;
                } else {
                    let expr = Expr::FieldAddress { object, field };
                    self.define(frame, TacType::by_ref(ty), expr)?;
                }
            }
            Opcode::Stfld | Opcode::Stsfld => {
                let field = member(instruction)?.clone();
                let value = self.pop(frame, instruction)?;
                let object = if opcode == Opcode::Stfld {
                    Some(self.pop(frame, instruction)?)
                } else {
                    None
                };
                frame.statements.push(Statement::Assign {
                    dest: Place::Field { object, field },
                    expr: Expr::Value(value),
                });
            }

            // ========== Arrays ==========
            Opcode::Newarr => {
                let element = member(instruction)?.as_type();
                let length = self.pop(frame, instruction)?;
                let ty = TacType::vector(element.clone());
                self.define(frame, ty, Expr::NewArray { element, length })?;
            }
            Opcode::Ldlen => {
                let array = self.pop(frame, instruction)?;
                self.define(frame, TacType::NativeUInt, Expr::ArrayLength(array))?;
            }
            Opcode::Ldelema => {
                let ty = member(instruction)?.as_type();
                let index = self.pop(frame, instruction)?;
                let array = self.pop(frame, instruction)?;
                let expr = Expr::ElementAddress {
                    array,
                    index,
                    ty: ty.clone(),
                };
                self.define(frame, TacType::by_ref(ty), expr)?;
            }
            Opcode::LdelemI1
            | Opcode::LdelemU1
            | Opcode::LdelemI2
            | Opcode::LdelemU2
            | Opcode::LdelemI4
            | Opcode::LdelemU4
            | Opcode::LdelemI8
            | Opcode::LdelemI
            | Opcode::LdelemR4
            | Opcode::LdelemR8
            | Opcode::LdelemRef
            | Opcode::Ldelem => {
                let index = self.pop(frame, instruction)?;
                let array = self.pop(frame, instruction)?;
                let ty = self.element_of(opcode, instruction, &array)?;
                let expr = Expr::Element {
                    array,
                    index,
                    ty: ty.clone(),
                };
                self.define(frame, ty, expr)?;
            }
            Opcode::StelemI
            | Opcode::StelemI1
            | Opcode::StelemI2
            | Opcode::StelemI4
            | Opcode::StelemI8
            | Opcode::StelemR4
            | Opcode::StelemR8
            | Opcode::StelemRef
            | Opcode::Stelem => {
                let value = self.pop(frame, instruction)?;
                let index = self.pop(frame, instruction)?;
                let array = self.pop(frame, instruction)?;
                let ty = self.element_of(opcode, instruction, &array)?;
                frame.statements.push(Statement::Assign {
                    dest: Place::Element { array, index, ty },
                    expr: Expr::Value(value),
                });
            }

            // ========== Indirect access ==========
            Opcode::LdindI1
            | Opcode::LdindU1
            | Opcode::LdindI2
            | Opcode::LdindU2
            | Opcode::LdindI4
            | Opcode::LdindU4
            | Opcode::LdindI8
            | Opcode::LdindI
            | Opcode::LdindR4
            | Opcode::LdindR8
            | Opcode::LdindRef => {
                let address = self.pop(frame, instruction)?;
                let ty = self.pointee_of(opcode, &address)?;
                self.define(frame, ty.clone(), Expr::Indirect { address, ty })?;
            }
            Opcode::StindRef
            | Opcode::StindI1
            | Opcode::StindI2
            | Opcode::StindI4
            | Opcode::StindI8
            | Opcode::StindR4
            | Opcode::StindR8
            | Opcode::StindI => {
                let value = self.pop(frame, instruction)?;
                let address = self.pop(frame, instruction)?;
                let ty = self.pointee_of(opcode, &address)?;
                frame.statements.push(Statement::Assign {
                    dest: Place::Indirect { address, ty },
                    expr: Expr::Value(value),
                });
            }

            // ========== Exception handling ==========
            Opcode::Throw => {
                let value = self.pop(frame, instruction)?;
                frame.statements.push(Statement::Eh(EhStatement::Throw(value)));
                return Ok(Some(Exit::Terminal));
            }
            Opcode::Rethrow => {
                frame.statements.push(Statement::Eh(EhStatement::Rethrow));
                return Ok(Some(Exit::Terminal));
            }
            Opcode::Endfinally => {
                frame.statements.push(Statement::Eh(EhStatement::EndFinally));
                return Ok(Some(Exit::Terminal));
            }
            Opcode::Endfilter => {
                let value = self.pop(frame, instruction)?;
                frame
                    .statements
                    .push(Statement::Eh(EhStatement::EndFilter(value)));
                return Ok(Some(Exit::Terminal));
            }
            Opcode::Leave | Opcode::LeaveS => {
                frame.stack.clear();
                return Ok(Some(Exit::Leave(target(instruction)?)));
            }

            _ => {
                return Err(malformed_error!(
                    "{} is not supported by the translator",
                    instruction
                ))
            }
        }
        Ok(None)
    }

    fn element_of(&self, opcode: Opcode, instruction: &Instruction, array: &Value) -> Result<TacType> {
        if let Some(ty) = access_type(opcode) {
            return Ok(ty);
        }
        if matches!(opcode, Opcode::Ldelem | Opcode::Stelem) {
            return Ok(member(instruction)?.as_type());
        }
        Ok(self
            .type_of(array)?
            .element_type()
            .cloned()
            .unwrap_or(TacType::Object))
    }

    fn pointee_of(&self, opcode: Opcode, address: &Value) -> Result<TacType> {
        if let Some(ty) = access_type(opcode) {
            return Ok(ty);
        }
        Ok(self
            .type_of(address)?
            .pointee_type()
            .cloned()
            .unwrap_or(TacType::Object))
    }

    // ========================================================================
    // Layout
    // ========================================================================

    fn finish(self) -> Result<Translation> {
        let order: Vec<InstrId> = self.cfg.blocks().map(|block| block.entry).collect();
        let translated: Vec<InstrId> = order
            .iter()
            .copied()
            .filter(|entry| self.blocks.contains_key(entry))
            .collect();

        let mut statements = Vec::new();
        let mut block_lines = BTreeMap::new();
        let mut fixups: Vec<(usize, InstrId)> = Vec::new();

        for (position, entry) in translated.iter().enumerate() {
            let Some(code) = self.blocks.get(entry) else {
                continue;
            };
            let next = translated.get(position + 1).copied();
            block_lines.insert(*entry, statements.len());
            statements.extend(code.statements.iter().cloned());

            let falls_through = match &code.exit {
                Exit::Terminal => false,
                Exit::Fallthrough => true,
                Exit::Goto(target) => {
                    fixups.push((statements.len(), *target));
                    statements.push(Statement::Goto(0));
                    false
                }
                Exit::If(cond, target) => {
                    fixups.push((statements.len(), *target));
                    statements.push(Statement::If {
                        cond: cond.clone(),
                        target: 0,
                    });
                    true
                }
                Exit::Switch(value, cases) => {
                    for (case, target) in cases.iter().enumerate() {
                        let Ok(case) = i32::try_from(case) else {
                            return Err(Error::OperandArityMismatch(format!(
                                "switch in block {} has too many cases",
                                entry
                            )));
                        };
                        fixups.push((statements.len(), *target));
                        statements.push(Statement::If {
                            cond: Condition::Compare {
                                op: CompareOp::Eq,
                                unsigned: false,
                                left: value.clone(),
                                right: Value::i4(case),
                            },
                            target: 0,
                        });
                    }
                    true
                }
                Exit::Leave(target) => {
                    fixups.push((statements.len(), *target));
                    statements.push(Statement::Eh(EhStatement::Leave(0)));
                    false
                }
            };

            if falls_through {
                if let Some(block) = self.cfg.block(*entry) {
                    let following = self.list.next(block.exit);
                    if !following.is_back() && Some(following) != next {
                        fixups.push((statements.len(), following));
                        statements.push(Statement::Goto(0));
                    }
                }
            }
        }

        let mut line_of = BTreeMap::new();
        let mut following = statements.len();
        for entry in order.iter().rev() {
            if let Some(line) = block_lines.get(entry) {
                following = *line;
            }
            line_of.insert(*entry, following);
        }

        for (line, target) in fixups {
            let resolved = match line_of.get(&target) {
                Some(resolved) if *resolved < statements.len() => *resolved,
                _ => {
                    return Err(graph_error!(
                        "jump at line {} to {} has no statement to land on",
                        line,
                        target
                    ))
                }
            };
            if let Some(statement) = statements.get_mut(line) {
                statement.retarget(|_| resolved);
            }
        }

        Ok(Translation {
            statements,
            block_lines,
            line_of,
            entry_stacks: self.entry_stacks,
            variables: self.variables,
            merges: self.merges,
            exceptions: self.exceptions,
        })
    }
}

fn slot_index(slot: usize) -> u16 {
    u16::try_from(slot).unwrap_or(u16::MAX)
}

/// Local or argument slot addressed by a load, store or address opcode.
fn slot_of(opcode: Opcode, instruction: &Instruction) -> Result<u16> {
    match opcode {
        Opcode::Ldarg0 | Opcode::Ldloc0 | Opcode::Stloc0 => Ok(0),
        Opcode::Ldarg1 | Opcode::Ldloc1 | Opcode::Stloc1 => Ok(1),
        Opcode::Ldarg2 | Opcode::Ldloc2 | Opcode::Stloc2 => Ok(2),
        Opcode::Ldarg3 | Opcode::Ldloc3 | Opcode::Stloc3 => Ok(3),
        _ => instruction
            .immediate()
            .and_then(|imm| imm.as_index())
            .ok_or_else(|| malformed_error!("{} carries no slot index", instruction)),
    }
}

fn target(instruction: &Instruction) -> Result<InstrId> {
    instruction
        .target()
        .ok_or_else(|| malformed_error!("{} carries no resolved target", instruction))
}

fn member(instruction: &Instruction) -> Result<&Member> {
    instruction
        .member()
        .ok_or_else(|| malformed_error!("{} carries no metadata operand", instruction))
}

/// The callee of a call-family instruction; unresolved callees have no known arity.
fn method_of(instruction: &Instruction) -> Result<(&Member, Arc<MethodSig>)> {
    let callee = member(instruction)?;
    match callee {
        Member::Method(sig) => Ok((callee, Arc::clone(sig))),
        other => Err(Error::OperandArityMismatch(format!(
            "IL_{:04X} calls {}, whose arguments are unknown",
            instruction.offset, other
        ))),
    }
}

fn signature_of(instruction: &Instruction) -> Result<(&Member, Arc<CallSiteSig>)> {
    let signature = member(instruction)?;
    match signature {
        Member::Signature(sig) => Ok((signature, Arc::clone(sig))),
        other => Err(Error::OperandArityMismatch(format!(
            "IL_{:04X} calls through {}, whose arguments are unknown",
            instruction.offset, other
        ))),
    }
}

fn field_type(field: &Member) -> TacType {
    field
        .as_field()
        .map(|sig| sig.field_type.clone())
        .unwrap_or_default()
}

fn branch_comparison(opcode: Opcode) -> (CompareOp, bool) {
    match opcode {
        Opcode::Beq | Opcode::BeqS => (CompareOp::Eq, false),
        Opcode::Bge | Opcode::BgeS => (CompareOp::Ge, false),
        Opcode::Bgt | Opcode::BgtS => (CompareOp::Gt, false),
        Opcode::Ble | Opcode::BleS => (CompareOp::Le, false),
        Opcode::Blt | Opcode::BltS => (CompareOp::Lt, false),
        Opcode::BneUn | Opcode::BneUnS => (CompareOp::Ne, true),
        Opcode::BgeUn | Opcode::BgeUnS => (CompareOp::Ge, true),
        Opcode::BgtUn | Opcode::BgtUnS => (CompareOp::Gt, true),
        Opcode::BleUn | Opcode::BleUnS => (CompareOp::Le, true),
        _ => (CompareOp::Lt, true),
    }
}
