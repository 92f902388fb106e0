//! `finally` lowering on compiler-shaped method bodies.

use std::collections::HashMap;

use ciltac::{
    analysis::tac::{inline_finally, CallTarget, InlineStats, LineTransformer},
    prelude::*,
};

const CLEANUP: u32 = 0x0A00_0002;

fn resolver() -> MemoryResolver {
    let console = TacType::class("System.Console");
    let mut resolver = MemoryResolver::new();
    resolver
        .add_type(
            Token::new(0x0100_0001),
            TacType::class("System.DivideByZeroException"),
        )
        .add_method(
            Token::new(0x0A00_0001),
            MethodSig::new_static(
                console.clone(),
                "Log",
                vec![TacType::exception()],
                TacType::Void,
            ),
        )
        .add_method(
            Token::new(CLEANUP),
            MethodSig::new_static(console, "Cleanup", Vec::new(), TacType::Void),
        );
    resolver
}

fn encode(build: impl FnOnce(&mut InstructionEncoder) -> Result<()>) -> (Vec<u8>, HashMap<String, u32>) {
    let mut encoder = InstructionEncoder::new();
    build(&mut encoder).expect("encoding failed");
    encoder.finalize().expect("finalize failed")
}

fn is_cleanup(statement: &Statement) -> bool {
    match statement {
        Statement::Call(call) => match &call.target {
            CallTarget::Method(member) => member
                .as_method()
                .is_some_and(|method| method.name == "Cleanup"),
            _ => false,
        },
        _ => false,
    }
}

/// Follows straight-line control from `line` until a return, collecting the calls on the way.
fn walk(statements: &[Statement], mut line: usize) -> (usize, Option<Value>) {
    let mut cleanups = 0;
    for _ in 0..statements.len() {
        match &statements[line] {
            Statement::Goto(target) => line = *target,
            Statement::Return(value) => return (cleanups, value.clone()),
            statement => {
                if is_cleanup(statement) {
                    cleanups += 1;
                }
                line += 1;
            }
        }
    }
    panic!("no return reached from line {line}");
}

/// `if (arg0) { return 1; } else { return 2; }` inside `try { } finally { Cleanup(); }`
fn two_exits() -> MethodDescriptor {
    let (code, labels) = encode(|e| {
        e.emit_ldarg(0)?;
        e.emit_branch("brfalse.s", "second")?;
        e.emit_branch("leave.s", "one")?;
        e.define_label("second")?;
        e.emit_branch("leave.s", "two")?;
        e.define_label("finally")?;
        e.emit_token("call", Token::new(CLEANUP))?;
        e.emit_instruction("endfinally", None)?;
        e.define_label("one")?;
        e.emit_ldc_i4(1)?;
        e.emit_instruction("ret", None)?;
        e.define_label("two")?;
        e.emit_ldc_i4(2)?;
        e.emit_instruction("ret", None)
    });
    let finally = labels["finally"];
    MethodDescriptor::new("TwoExits", Token::new(0x0600_0001))
        .with_params(vec![TacType::Bool])
        .with_return(TacType::I32)
        .with_code(code)
        .with_handlers(vec![ExceptionHandler::finally(
            0,
            finally,
            finally,
            labels["one"] - finally,
        )])
}

#[test]
fn every_exit_runs_its_own_copy() {
    let tac = translate_method(
        &two_exits(),
        &resolver(),
        &TypeHierarchy::new(),
        &TranslationConfig::default(),
    )
    .unwrap();

    assert_eq!(tac.statements.iter().filter(|s| is_cleanup(s)).count(), 3);
    assert_eq!(
        tac.inline_stats,
        Some(InlineStats {
            duplicated_bodies: 2,
            rewritten_leaves: 2,
        })
    );
    assert!(!tac.statements.iter().any(Statement::is_leave));
    assert!(!tac.statements.iter().any(Statement::is_end_finally));

    // both branches of the condition reach their return through exactly one cleanup
    let Statement::If { target, .. } = &tac.statements[0] else {
        panic!("expected a conditional jump, got {}", tac.statements[0]);
    };
    assert_eq!(walk(&tac.statements, 1), (1, Some(Value::i4(1))));
    assert_eq!(walk(&tac.statements, *target), (1, Some(Value::i4(2))));

    assert_eq!(tac.scopes.iter().filter(|s| s.duplicate).count(), 0);
    assert_eq!(tac.original_scopes().count(), 1);
}

#[test]
fn inlining_twice_changes_nothing() {
    let tac = translate_method(
        &two_exits(),
        &resolver(),
        &TypeHierarchy::new(),
        &TranslationConfig::default(),
    )
    .unwrap();

    let mut statements = tac.statements.clone();
    let mut scopes = tac.scopes.clone();
    let stats = inline_finally(&mut LineTransformer::new(&mut statements, &mut scopes)).unwrap();
    assert_eq!(stats, InlineStats::default());
    assert_eq!(statements, tac.statements);
    assert_eq!(scopes, tac.scopes);
}

#[test]
fn raw_translation_keeps_the_handler_protocol() {
    let tac = translate_method(
        &two_exits(),
        &resolver(),
        &TypeHierarchy::new(),
        &TranslationConfig::raw(),
    )
    .unwrap();

    assert!(tac.inline_stats.is_none());
    assert_eq!(tac.statements.iter().filter(|s| is_cleanup(s)).count(), 1);
    assert_eq!(tac.statements.iter().filter(|s| s.is_leave()).count(), 2);
    assert_eq!(tac.statements.iter().filter(|s| s.is_end_finally()).count(), 1);
}

/// ```csharp
/// try {
///     try { x = 1 / 0; }
///     catch (DivideByZeroException e) { Log(e); }
/// } finally {
///     Cleanup();
/// }
/// return;
/// ```
#[test]
fn nested_catch_inside_finally() {
    let (code, labels) = encode(|e| {
        e.emit_ldc_i4(1)?;
        e.emit_ldc_i4(0)?;
        e.emit_instruction("div", None)?;
        e.emit_stloc(0)?;
        e.emit_branch("leave.s", "after_catch")?;
        e.define_label("catch")?;
        e.emit_stloc(1)?;
        e.emit_ldloc(1)?;
        e.emit_token("call", Token::new(0x0A00_0001))?;
        e.emit_branch("leave.s", "after_catch")?;
        e.define_label("after_catch")?;
        e.emit_branch("leave.s", "end")?;
        e.define_label("finally")?;
        e.emit_token("call", Token::new(CLEANUP))?;
        e.emit_instruction("endfinally", None)?;
        e.define_label("end")?;
        e.emit_instruction("ret", None)
    });
    let (catch, after_catch, finally, end) = (
        labels["catch"],
        labels["after_catch"],
        labels["finally"],
        labels["end"],
    );
    let method = MethodDescriptor::new("Guarded", Token::new(0x0600_0002))
        .with_locals(vec![
            TacType::I32,
            TacType::class("System.DivideByZeroException"),
        ])
        .with_code(code)
        .with_handlers(vec![
            ExceptionHandler::catch(0, catch, catch, after_catch - catch, Token::new(0x0100_0001)),
            ExceptionHandler::finally(0, finally, finally, end - finally),
        ]);

    let tac = translate_method(
        &method,
        &resolver(),
        &TypeHierarchy::new(),
        &TranslationConfig::default(),
    )
    .unwrap();

    // the catch handler starts with the caught exception as its only stack entry
    let handler_stack = tac.handler_stack(0).unwrap();
    assert_eq!(handler_stack.len(), 1);
    let exception = tac.variable(handler_stack[0].var().unwrap()).unwrap();
    assert_eq!(exception.kind, VariableKind::CaughtException);
    assert_eq!(exception.ty, TacType::class("System.DivideByZeroException"));
    assert_eq!(tac.scopes[0].exception, handler_stack[0].var());

    // the original handler body plus one copy for the single exit crossing the finally
    assert_eq!(tac.statements.iter().filter(|s| is_cleanup(s)).count(), 2);
    assert_eq!(tac.inline_stats.unwrap().duplicated_bodies, 1);
    assert_eq!(walk(&tac.statements, 0), (1, None));

    let catch_lines = tac.scopes[0].handler_lines.clone();
    assert_eq!(walk(&tac.statements, catch_lines.start), (1, None));

    let rendered = tac.to_string();
    assert!(rendered.contains("endfinally (inert)"));
    assert!(!rendered.contains("leave"));
}

#[test]
fn fault_handlers_survive_lowering() {
    let (code, labels) = encode(|e| {
        e.emit_ldarg(0)?;
        e.emit_instruction("pop", None)?;
        e.emit_branch("leave.s", "end")?;
        e.define_label("fault")?;
        e.emit_token("call", Token::new(CLEANUP))?;
        e.emit_instruction("endfinally", None)?;
        e.define_label("end")?;
        e.emit_instruction("ret", None)
    });
    let fault = labels["fault"];
    let method = MethodDescriptor::new("Faulty", Token::new(0x0600_0003))
        .with_params(vec![TacType::I32])
        .with_code(code)
        .with_handlers(vec![ExceptionHandler::fault(0, fault, fault, labels["end"] - fault)]);

    let tac = translate_method(
        &method,
        &resolver(),
        &TypeHierarchy::new(),
        &TranslationConfig::default(),
    )
    .unwrap();

    assert_eq!(tac.statements.iter().filter(|s| is_cleanup(s)).count(), 1);
    assert_eq!(tac.statements.iter().filter(|s| s.is_end_finally()).count(), 1);
    assert_eq!(walk(&tac.statements, 0), (0, None));
}
